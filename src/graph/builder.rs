//! This module contains the execution graph builder: a deterministic,
//! stateless-per-trace transform that replays a trace's records in order and
//! materializes graph elements for them.
//!
//! Nodes are materialized lazily with caching rules chosen to maximize later
//! matchability:
//!
//! - concrete primitive values cache by creation identity, so equal literals
//!   created at different points stay distinct;
//! - symbolic values and strings cache by symbol, globally within the trace;
//! - computed values and composite strings cache by structural equality;
//! - concrete strings intern by text;
//! - heap references resolve through the trace's heap snapshot and
//!   deduplicate by heap identifier, with boxed objects delegating to their
//!   payload.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};

use crate::{
    graph::{Edge, EdgeKind, ExecutionGraph, Node, NodeKind},
    memory::{
        heap::{HeapArea, HeapValue, StringValue},
        stack::{Operator, ReferenceValue, StackValue},
    },
    signature::QualifiedMethodSignature,
    trace::{ExecutionTrace, TraceRecord},
};

/// Builds the execution graph for the provided trace.
#[must_use]
pub fn build(title: impl Into<String>, trace: &ExecutionTrace) -> ExecutionGraph {
    let mut builder = Builder::new(&trace.heap);
    for record in &trace.records {
        builder.visit(record);
    }

    ExecutionGraph {
        title: title.into(),
        graph: builder.graph,
        assertions: trace
            .assertions()
            .map(|(condition, truth)| (condition.clone(), truth))
            .collect(),
    }
}

struct Builder<'a> {
    heap: &'a HeapArea,
    graph: DiGraph<Node, Edge>,

    entry: Option<NodeIndex>,
    null_node: Option<NodeIndex>,

    concrete_values: HashMap<u64, NodeIndex>,
    symbolic_values: HashMap<u64, NodeIndex>,
    computed_values: HashMap<StackValue, NodeIndex>,
    objects: HashMap<u64, NodeIndex>,

    string_literals: HashMap<String, NodeIndex>,
    wrapped_strings: HashMap<StackValue, NodeIndex>,
    composite_strings: HashMap<StringValue, NodeIndex>,
}

impl<'a> Builder<'a> {
    fn new(heap: &'a HeapArea) -> Self {
        Self {
            heap,
            graph: DiGraph::new(),
            entry: None,
            null_node: None,
            concrete_values: HashMap::new(),
            symbolic_values: HashMap::new(),
            computed_values: HashMap::new(),
            objects: HashMap::new(),
            string_literals: HashMap::new(),
            wrapped_strings: HashMap::new(),
            composite_strings: HashMap::new(),
        }
    }

    //
    //  Node materialization
    //

    fn value_node(&mut self, value: &StackValue) -> NodeIndex {
        match value {
            StackValue::Concrete(concrete) => {
                if let Some(index) = self.concrete_values.get(&concrete.id) {
                    return *index;
                }
                let mut node = Node::new(NodeKind::Value, value.label());
                node.value = Some(value.clone());
                node.literal = true;
                node.concrete = true;
                let index = self.graph.add_node(node);
                self.concrete_values.insert(concrete.id, index);
                index
            }

            StackValue::Symbolic(symbolic) => {
                if let Some(index) = self.symbolic_values.get(&symbolic.symbol) {
                    return *index;
                }
                let mut node = Node::new(NodeKind::Value, value.label());
                node.value = Some(value.clone());
                node.symbolic = true;
                let index = self.graph.add_node(node);
                self.symbolic_values.insert(symbolic.symbol, index);
                index
            }

            StackValue::Computed(_) => {
                if let Some(index) = self.computed_values.get(value) {
                    return *index;
                }
                let mut node = Node::new(NodeKind::Value, value.label());
                node.value = Some(value.clone());
                let index = self.graph.add_node(node);
                self.computed_values.insert(value.clone(), index);
                index
            }

            StackValue::Reference(reference) => self.reference_node(*reference),
        }
    }

    fn reference_node(&mut self, reference: ReferenceValue) -> NodeIndex {
        if reference.is_nil() {
            if let Some(index) = self.null_node {
                return index;
            }
            let mut node = Node::new(NodeKind::Value, "null");
            node.concrete = true;
            let index = self.graph.add_node(node);
            self.null_node = Some(index);
            return index;
        }

        let object = self
            .heap
            .dereference(reference)
            .expect("The trace heap snapshot contains every recorded reference");

        match object {
            HeapValue::ConcreteObject { id, .. } => self.object_node(*id, object, true, false),
            HeapValue::SymbolicObject { id, .. } => self.object_node(*id, object, false, true),

            HeapValue::SymbolicArray { id, length, .. } => {
                if let Some(index) = self.objects.get(id) {
                    return *index;
                }
                let index = self.object_node(*id, object, false, true);

                // Arrays carry a synthetic length value aggregated into them.
                let length = StackValue::Symbolic(*length);
                let length_node = self.value_node(&length);
                self.graph.add_edge(
                    length_node,
                    index,
                    Edge::labeled(EdgeKind::Aggregation, "length"),
                );
                index
            }

            HeapValue::BoxedString { value, .. } => self.string_node(&value.clone()),
            HeapValue::BoxedStackValue { value, .. } => self.value_node(&value.clone()),

            HeapValue::ClassObject {
                id, representing, ..
            } => {
                if let Some(index) = self.objects.get(id) {
                    return *index;
                }
                let mut node = Node::new(NodeKind::Object, format!("{id}@{representing}"));
                node.ty = Some(object.type_signature());
                node.representing = Some(representing.clone());
                node.concrete = true;
                let index = self.graph.add_node(node);
                self.objects.insert(*id, index);
                index
            }
        }
    }

    fn object_node(
        &mut self,
        id: u64,
        object: &HeapValue,
        concrete: bool,
        symbolic: bool,
    ) -> NodeIndex {
        if let Some(index) = self.objects.get(&id) {
            return *index;
        }
        let ty = object.type_signature();
        let mut node = Node::new(NodeKind::Object, format!("{id}@{ty}"));
        node.ty = Some(ty);
        node.concrete = concrete;
        node.symbolic = symbolic;
        let index = self.graph.add_node(node);
        self.objects.insert(id, index);
        index
    }

    fn string_node(&mut self, string: &StringValue) -> NodeIndex {
        match string {
            StringValue::Concrete(text) => {
                if let Some(index) = self.string_literals.get(text) {
                    return *index;
                }
                let mut node = Node::new(NodeKind::Value, string.label());
                node.string = Some(string.clone());
                node.literal = true;
                node.concrete = true;
                let index = self.graph.add_node(node);
                self.string_literals.insert(text.clone(), index);
                index
            }

            StringValue::Symbolic(symbol) => {
                if let Some(index) = self.symbolic_values.get(symbol) {
                    return *index;
                }
                let mut node = Node::new(NodeKind::Value, string.label());
                node.string = Some(string.clone());
                node.symbolic = true;
                let index = self.graph.add_node(node);
                self.symbolic_values.insert(*symbol, index);
                index
            }

            StringValue::FromStackValue(inner) => {
                if let Some(index) = self.wrapped_strings.get(inner) {
                    return *index;
                }
                let mut node = Node::new(NodeKind::Value, string.label());
                node.string = Some(string.clone());
                node.concrete = true;
                let index = self.graph.add_node(node);
                self.wrapped_strings.insert(inner.clone(), index);
                index
            }

            StringValue::Composite { .. } => {
                if let Some(index) = self.composite_strings.get(string) {
                    return *index;
                }
                let mut node = Node::new(NodeKind::Value, string.label());
                node.string = Some(string.clone());
                node.concrete = true;
                let index = self.graph.add_node(node);
                self.composite_strings.insert(string.clone(), index);
                index
            }
        }
    }

    fn method_node(&mut self, signature: &QualifiedMethodSignature) -> NodeIndex {
        let mut node = Node::new(NodeKind::MethodCall, signature.method.to_string());
        node.signature = Some(signature.clone());
        self.graph.add_node(node)
    }

    fn operator_node(&mut self, operator: Operator) -> NodeIndex {
        let mut node = Node::new(NodeKind::Operator, operator.to_string());
        node.operator = Some(operator);
        self.graph.add_node(node)
    }

    fn entry_node(&mut self) -> NodeIndex {
        if let Some(index) = self.entry {
            return index;
        }
        let index = self.graph.add_node(Node::new(NodeKind::EntryPoint, "ENTRY"));
        self.entry = Some(index);
        index
    }

    fn edge(&mut self, from: NodeIndex, to: NodeIndex, edge: Edge) {
        self.graph.add_edge(from, to, edge);
    }

    //
    //  Record replay
    //

    #[allow(clippy::too_many_lines)] // One arm per record kind
    fn visit(&mut self, record: &TraceRecord) {
        match record {
            TraceRecord::EntryMethod { signature } => {
                let index = self.entry_node();
                let node = &mut self.graph[index];
                node.label = format!("ENTRY {signature}");
                node.signature = Some(signature.clone());
            }

            TraceRecord::EntryScope { reference } => {
                let node = self.reference_node(*reference);
                let entry = self.entry_node();
                self.edge(node, entry, Edge::new(EdgeKind::Scope));
            }

            TraceRecord::EntryParameter { value } => {
                let node = self.value_node(value);
                let entry = self.entry_node();
                self.graph[node].entry_parameter = true;
                self.edge(node, entry, Edge::new(EdgeKind::Supplies));
            }

            TraceRecord::StaticLibraryMethodCall {
                method,
                arguments,
                result,
            } => {
                let call = self.method_node(method);
                self.graph[call].static_call = true;
                self.link_call(call, None, arguments, result.as_ref());
            }

            TraceRecord::InstanceLibraryMethodCall {
                method,
                scope,
                arguments,
                result,
            } => {
                let call = self.method_node(method);
                self.link_call(call, Some(*scope), arguments, result.as_ref());
            }

            TraceRecord::SynthesisedReturnValue { result, .. } => {
                let node = self.value_node(result);
                self.graph[node].synthetic = true;
            }

            TraceRecord::StaticFieldPut { new_value, .. } => {
                let node = self.value_node(new_value);
                self.graph[node].static_field = true;
            }

            TraceRecord::ObjectFieldPut {
                reference,
                field,
                new_value,
                ..
            } => {
                let owner = self.reference_node(*reference);
                let value = self.value_node(new_value);
                self.edge(value, owner, Edge::labeled(EdgeKind::Aggregation, field.clone()));
            }

            TraceRecord::ArrayMemberPut {
                reference,
                index,
                new_value,
                ..
            } => {
                let owner = self.reference_node(*reference);
                let value = self.value_node(new_value);
                self.edge(
                    value,
                    owner,
                    Edge::labeled(EdgeKind::Aggregation, format!("${}", index.label())),
                );
            }

            TraceRecord::ArrayMemberGet { index, value, .. } => {
                let index_node = self.value_node(index);
                let value_node = self.value_node(value);
                self.edge(index_node, value_node, Edge::new(EdgeKind::Transformation));
            }

            TraceRecord::DefaultInstanceFieldValue {
                reference,
                field,
                value,
            } => {
                let owner = self.reference_node(*reference);
                let node = self.value_node(value);
                self.graph[node].synthetic = true;
                self.edge(node, owner, Edge::labeled(EdgeKind::Aggregation, field.clone()));
            }

            // Untouched static defaults add nothing to the graph.
            TraceRecord::DefaultStaticFieldValue { .. } => {}

            TraceRecord::StackTransformation {
                lhs,
                rhs,
                result,
                operator,
            } => {
                let op = self.operator_node(Operator::Binary(*operator));
                let lhs = self.value_node(lhs);
                let rhs = self.value_node(rhs);
                let result = self.value_node(result);
                self.edge(lhs, op, Edge::new(EdgeKind::Transformation));
                self.edge(rhs, op, Edge::new(EdgeKind::Transformation));
                self.edge(op, result, Edge::new(EdgeKind::Transformation));
            }

            TraceRecord::NotValueTransformation { input, output } => {
                let op = self.operator_node(Operator::Not);
                let input = self.value_node(input);
                let output = self.value_node(output);
                self.edge(input, op, Edge::new(EdgeKind::Transformation));
                self.edge(op, output, Edge::new(EdgeKind::Transformation));
            }

            TraceRecord::StackCast { input, output } => {
                let op = self.operator_node(Operator::Cast);
                self.graph[op].cast_type = Some(output.stack_type());
                let input = self.value_node(input);
                let output = self.value_node(output);
                self.edge(input, op, Edge::new(EdgeKind::Transformation));
                self.edge(op, output, Edge::new(EdgeKind::Transformation));
            }

            TraceRecord::StringConcat { lhs, rhs, result } => {
                let op = self.operator_node(Operator::Concat);
                let lhs = self.string_node(lhs);
                let rhs = self.string_node(rhs);
                let result = self.string_node(result);
                self.edge(lhs, op, Edge::new(EdgeKind::Transformation));
                self.edge(rhs, op, Edge::new(EdgeKind::Transformation));
                self.edge(op, result, Edge::new(EdgeKind::Transformation));
            }

            TraceRecord::Stringification { value, result } => {
                let op = self.operator_node(Operator::Stringify);
                let value = self.value_node(value);
                let result = self.string_node(result);
                self.edge(value, op, Edge::new(EdgeKind::Transformation));
                self.edge(op, result, Edge::new(EdgeKind::Transformation));
            }

            // Assertions are carried on the graph itself; halts and uncaught
            // exceptions terminate a path without adding elements.
            TraceRecord::Assertion { .. }
            | TraceRecord::Halt { .. }
            | TraceRecord::UncaughtException { .. } => {}
        }
    }

    fn link_call(
        &mut self,
        call: NodeIndex,
        scope: Option<ReferenceValue>,
        arguments: &[StackValue],
        result: Option<&StackValue>,
    ) {
        if let Some(scope) = scope {
            let receiver = self.reference_node(scope);
            self.edge(receiver, call, Edge::new(EdgeKind::Scope));
        }

        for (position, argument) in arguments.iter().enumerate() {
            let node = self.value_node(argument);
            self.edge(
                node,
                call,
                Edge::labeled(EdgeKind::Parameter, format!("${position}")),
            );
        }

        if let Some(result) = result {
            let node = self.value_node(result);
            self.edge(call, node, Edge::new(EdgeKind::Supplies));
        }
    }
}
