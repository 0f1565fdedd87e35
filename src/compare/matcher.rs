//! This module contains the element matcher: the pure, side-effect-free
//! compatibility predicate over pairs of graph elements.
//!
//! The matcher answers compatible/incompatible, never a degree of similarity;
//! scoring over these answers is the comparator's job.

use petgraph::graph::NodeIndex;

use crate::{
    compare::values,
    graph::{Edge, EdgeKind, ExecutionGraph},
    memory::stack::{ReferenceValue, StackValue},
    signature::TypeSignature,
};

/// Checks whether two edges play compatible roles.
///
/// Parameters and captured scopes are treated as interchangeable roles: a
/// receiver in one program often surfaces as an explicit argument in another.
#[must_use]
pub fn match_edges(lhs: &Edge, rhs: &Edge) -> bool {
    matches!(
        (lhs.kind, rhs.kind),
        (EdgeKind::Aggregation, EdgeKind::Aggregation)
            | (EdgeKind::Transformation, EdgeKind::Transformation)
            | (EdgeKind::Supplies, EdgeKind::Supplies)
            | (EdgeKind::Scope, EdgeKind::Scope)
            | (EdgeKind::Parameter, EdgeKind::Parameter)
            | (EdgeKind::Parameter, EdgeKind::Scope)
            | (EdgeKind::Scope, EdgeKind::Parameter)
    )
}

/// Checks whether two nodes are compatible.
#[must_use]
pub fn match_nodes(
    lhs_graph: &ExecutionGraph,
    lhs: NodeIndex,
    rhs_graph: &ExecutionGraph,
    rhs: NodeIndex,
) -> bool {
    let left = lhs_graph.node(lhs);
    let right = rhs_graph.node(rhs);

    if left.is_entry_point() && right.is_entry_point() {
        return true;
    }

    if left.is_operator() && right.is_operator() {
        return left.operator.is_some() && left.operator == right.operator;
    }

    if left.is_method_call() && right.is_method_call() {
        if let (Some(lsig), Some(rsig)) = (&left.signature, &right.signature) {
            if lsig == rsig {
                return true;
            }

            if lsig.declaring_class == rsig.declaring_class
                && lsig.method.name == rsig.method.name
            {
                return true;
            }

            // Tolerates renamed overloads and mechanical obfuscation: equal
            // names, or one name a prefix of the other, in either order.
            if lsig.method.name == rsig.method.name
                || lsig.method.name.starts_with(&rsig.method.name)
                || rsig.method.name.starts_with(&lsig.method.name)
            {
                return true;
            }

            // The weakest fallback: the calls produce the same kind of thing.
            if lsig.method.return_type == rsig.method.return_type {
                return true;
            }
        }
        return false;
    }

    if left.is_data() && right.is_data() {
        if left.is_value() && right.is_value() {
            if left.is_string() && right.is_string() {
                if let (Some(l), Some(r)) = (&left.string, &right.string) {
                    return values::compare_strings(l, r);
                }
            }

            // Value nodes without a payload (the shared null node) compare
            // as null.
            let nil = StackValue::Reference(ReferenceValue::Nil);
            let l = left.value.as_ref().unwrap_or(&nil);
            let r = right.value.as_ref().unwrap_or(&nil);
            return values::compare_values(l, r);
        }

        if left.is_object() && right.is_object() {
            // Concrete objects only ever match concrete objects, and
            // symbolic only symbolic.
            let same_mode = left.concrete && right.concrete || left.symbolic && right.symbolic;
            if !same_mode {
                return false;
            }

            let types_match = match (&left.ty, &right.ty) {
                (Some(l), Some(r)) => compare_types(l, r),
                _ => false,
            };

            return types_match || compare_composition(lhs_graph, lhs, rhs_graph, rhs);
        }
    }

    false
}

/// Checks whether two type signatures are compatible: equal signatures,
/// arrays with compatible component types, any two primitives, or classes
/// with equal qualified names.
#[must_use]
pub fn compare_types(lhs: &TypeSignature, rhs: &TypeSignature) -> bool {
    if lhs == rhs {
        return true;
    }

    match (lhs, rhs) {
        (TypeSignature::Array(l), TypeSignature::Array(r)) => compare_types(l, r),
        (TypeSignature::Primitive(_), TypeSignature::Primitive(_)) => true,
        (TypeSignature::Class(l), TypeSignature::Class(r)) => l.name() == r.name(),
        _ => false,
    }
}

/// Compares two objects by composition: the sets of types aggregated into
/// each object (its owned fields) must be non-empty, equally sized, and
/// equal.
///
/// This lets structurally similar but nominally-untyped or obfuscated
/// objects still match.
#[must_use]
pub fn compare_composition(
    lhs_graph: &ExecutionGraph,
    lhs: NodeIndex,
    rhs_graph: &ExecutionGraph,
    rhs: NodeIndex,
) -> bool {
    let left_owned = aggregated_types(lhs_graph, lhs);
    let right_owned = aggregated_types(rhs_graph, rhs);

    if left_owned.is_empty() || left_owned.len() != right_owned.len() {
        return false;
    }

    let left_types: std::collections::BTreeSet<_> = left_owned.into_iter().collect();
    let right_types: std::collections::BTreeSet<_> = right_owned.into_iter().collect();
    left_types == right_types
}

/// The types of the data nodes aggregated into `node`, one entry per
/// aggregation edge.
fn aggregated_types(graph: &ExecutionGraph, node: NodeIndex) -> Vec<String> {
    use petgraph::visit::EdgeRef;

    graph
        .graph
        .edges_directed(node, petgraph::Direction::Incoming)
        .filter(|edge| edge.weight().kind == EdgeKind::Aggregation)
        .filter_map(|edge| {
            let source = graph.node(edge.source());
            source
                .ty
                .as_ref()
                .map(std::string::ToString::to_string)
                .or_else(|| source.value.as_ref().map(|value| format!("{:?}", value.stack_type())))
        })
        .collect()
}

#[cfg(test)]
mod test {
    use crate::{
        compare::matcher::{compare_types, match_edges},
        graph::{Edge, EdgeKind},
        signature::{ClassSignature, PrimitiveKind, TypeSignature},
    };

    #[test]
    fn parameter_and_scope_edges_are_interchangeable() {
        let parameter = Edge::new(EdgeKind::Parameter);
        let scope = Edge::new(EdgeKind::Scope);
        let supplies = Edge::new(EdgeKind::Supplies);

        assert!(match_edges(&parameter, &scope));
        assert!(match_edges(&scope, &parameter));
        assert!(!match_edges(&parameter, &supplies));
        assert!(match_edges(&supplies, &supplies));
    }

    #[test]
    fn primitives_always_compare_compatible() {
        assert!(compare_types(
            &TypeSignature::Primitive(PrimitiveKind::Int),
            &TypeSignature::Primitive(PrimitiveKind::Double),
        ));
    }

    #[test]
    fn arrays_compare_by_component_type() {
        let ints = TypeSignature::Primitive(PrimitiveKind::Int).array_of(1);
        let doubles = TypeSignature::Primitive(PrimitiveKind::Double).array_of(1);
        let strings = TypeSignature::Class(ClassSignature::string()).array_of(1);
        let objects = TypeSignature::Class(ClassSignature::object()).array_of(1);

        assert!(compare_types(&ints, &doubles));
        assert!(!compare_types(&strings, &objects));
    }
}
