//! This module contains the execution graph: the labeled directed multigraph
//! derived from one execution trace, and the unit of similarity comparison.
//!
//! A graph is built once per trace by [`builder::build`] and is read-only
//! thereafter, so it can be shared freely across concurrent comparisons.

pub mod builder;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::{
    memory::{
        heap::StringValue,
        stack::{Operator, StackType, StackValue},
    },
    signature::{QualifiedMethodSignature, TypeSignature},
};

pub use builder::build;

/// The classification of a node.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NodeKind {
    Value,
    Object,
    Operator,
    EntryPoint,
    MethodCall,
}

/// The classification of an edge.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EdgeKind {
    Scope,
    Supplies,
    Parameter,
    Aggregation,
    Transformation,
}

/// One node of the execution graph, carrying its kind and the attributes the
/// matcher consults.
#[derive(Clone, Debug)]
pub struct Node {
    /// The node's kind.
    pub kind: NodeKind,

    /// A short human-readable label.
    pub label: String,

    /// The stack value the node represents, for value nodes.
    pub value: Option<StackValue>,

    /// The string value the node represents, for string value nodes.
    pub string: Option<StringValue>,

    /// The declared type, for object nodes.
    pub ty: Option<TypeSignature>,

    /// The represented type, for class-literal object nodes.
    pub representing: Option<TypeSignature>,

    /// The operator, for operator nodes.
    pub operator: Option<Operator>,

    /// The cast target, for cast operator nodes.
    ///
    /// Carried separately from the operator so that all casts compare equal.
    pub cast_type: Option<StackType>,

    /// The method signature, for entry-point and method-call nodes.
    pub signature: Option<QualifiedMethodSignature>,

    /// Whether the node represents concrete data.
    pub concrete: bool,

    /// Whether the node represents symbolic data.
    pub symbolic: bool,

    /// Whether the node represents a source literal.
    pub literal: bool,

    /// Whether the node's data was synthesized rather than computed.
    pub synthetic: bool,

    /// Whether the node's value was written to a static field.
    pub static_field: bool,

    /// Whether the node is a method-call node for a static call.
    pub static_call: bool,

    /// Whether the node was an argument to the entry point.
    pub entry_parameter: bool,
}

impl Node {
    /// Constructs a bare node of the provided kind with no attributes set.
    #[must_use]
    pub fn new(kind: NodeKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            value: None,
            string: None,
            ty: None,
            representing: None,
            operator: None,
            cast_type: None,
            signature: None,
            concrete: false,
            symbolic: false,
            literal: false,
            synthetic: false,
            static_field: false,
            static_call: false,
            entry_parameter: false,
        }
    }

    /// Checks whether this is a value node.
    #[must_use]
    pub fn is_value(&self) -> bool {
        self.kind == NodeKind::Value
    }

    /// Checks whether this is an object node.
    #[must_use]
    pub fn is_object(&self) -> bool {
        self.kind == NodeKind::Object
    }

    /// Checks whether this is an operator node.
    #[must_use]
    pub fn is_operator(&self) -> bool {
        self.kind == NodeKind::Operator
    }

    /// Checks whether this is the entry-point node.
    #[must_use]
    pub fn is_entry_point(&self) -> bool {
        self.kind == NodeKind::EntryPoint
    }

    /// Checks whether this is a method-call node.
    #[must_use]
    pub fn is_method_call(&self) -> bool {
        self.kind == NodeKind::MethodCall
    }

    /// Checks whether this node carries data (a value or an object).
    #[must_use]
    pub fn is_data(&self) -> bool {
        self.is_value() || self.is_object()
    }

    /// Checks whether this is a string value node.
    #[must_use]
    pub fn is_string(&self) -> bool {
        self.string.is_some()
    }
}

/// One edge of the execution graph.
#[derive(Clone, Debug)]
pub struct Edge {
    /// The edge's kind.
    pub kind: EdgeKind,

    /// An optional label (a field name, a parameter index).
    pub label: Option<String>,
}

impl Edge {
    /// Constructs an unlabeled edge of the provided kind.
    #[must_use]
    pub fn new(kind: EdgeKind) -> Self {
        Self { kind, label: None }
    }

    /// Constructs a labeled edge of the provided kind.
    #[must_use]
    pub fn labeled(kind: EdgeKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: Some(label.into()),
        }
    }
}

/// The execution graph for one trace.
#[derive(Clone, Debug)]
pub struct ExecutionGraph {
    /// A title identifying the trace the graph was built from.
    pub title: String,

    /// The underlying multigraph.
    pub graph: DiGraph<Node, Edge>,

    /// The branch assertions of the trace, in recording order.
    pub assertions: Vec<(StackValue, bool)>,
}

impl ExecutionGraph {
    /// Gets the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Gets the number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Gets the node weight at the provided index.
    ///
    /// # Panics
    ///
    /// Panics if the index does not name a node of this graph, which is a
    /// programmer error.
    #[must_use]
    pub fn node(&self, index: NodeIndex) -> &Node {
        self.graph
            .node_weight(index)
            .expect("Node indices handed out by this graph are always valid")
    }

    /// Iterates over the node indices of the graph.
    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    /// Gets the total degree (incoming plus outgoing) of a node.
    #[must_use]
    pub fn degree(&self, index: NodeIndex) -> usize {
        self.graph
            .edges_directed(index, petgraph::Direction::Outgoing)
            .count()
            + self
                .graph
                .edges_directed(index, petgraph::Direction::Incoming)
                .count()
    }

    /// Finds the entry-point node, if the trace recorded one.
    #[must_use]
    pub fn entry_point(&self) -> Option<NodeIndex> {
        self.graph
            .node_indices()
            .find(|index| self.node(*index).is_entry_point())
    }

    /// Iterates over a node's incident edges in both directions, yielding the
    /// edge weight, the opposite node, and whether the node is the edge's
    /// source.
    pub fn incident_edges(&self, index: NodeIndex) -> Vec<(&Edge, NodeIndex, bool)> {
        let mut edges = Vec::new();
        for edge in self.graph.edges_directed(index, petgraph::Direction::Outgoing) {
            edges.push((edge.weight(), edge.target(), true));
        }
        for edge in self.graph.edges_directed(index, petgraph::Direction::Incoming) {
            edges.push((edge.weight(), edge.source(), false));
        }
        edges
    }
}
