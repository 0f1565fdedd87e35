//! Tests for the execution graph builder: caching regimes, per-record edge
//! patterns, and build idempotence.

mod common;

use common::{abs_program, graphs_of, infix, name, num, run};
use concolic_comparator::{
    graph::{self, EdgeKind, NodeKind},
    memory::stack::BinaryOperator,
};

#[test]
fn building_the_same_trace_twice_is_idempotent() -> anyhow::Result<()> {
    let (resolver, entry) = abs_program("x");
    let traces = run(resolver, entry)?;

    let first = graph::build("a", &traces.traces[0]);
    let second = graph::build("b", &traces.traces[0]);

    assert_eq!(first.node_count(), second.node_count());
    assert_eq!(first.edge_count(), second.edge_count());
    assert_eq!(first.assertions.len(), second.assertions.len());

    Ok(())
}

#[test]
fn entry_records_produce_the_entry_pattern() -> anyhow::Result<()> {
    let (resolver, entry) = abs_program("x");
    let traces = run(resolver, entry)?;
    let graphs = graphs_of(&traces);
    let graph = &graphs[0];

    let entry_node = graph.entry_point().expect("the trace has an entry marker");

    // The symbolic argument supplies the entry point and is flagged as an
    // entry parameter.
    let suppliers: Vec<_> = graph
        .incident_edges(entry_node)
        .into_iter()
        .filter(|(edge, _, outgoing)| !outgoing && edge.kind == EdgeKind::Supplies)
        .map(|(_, opposite, _)| opposite)
        .collect();
    assert_eq!(suppliers.len(), 1);
    assert!(graph.node(suppliers[0]).entry_parameter);
    assert!(graph.node(suppliers[0]).symbolic);

    Ok(())
}

#[test]
fn transformations_produce_operator_nodes_with_three_edges() -> anyhow::Result<()> {
    let (resolver, entry) = common::expression_program(
        "sample/Maths",
        "addOne",
        "x",
        infix(BinaryOperator::Add, name("x"), num(1)),
    );
    let traces = run(resolver, entry)?;
    let graphs = graphs_of(&traces);
    let graph = &graphs[0];

    let operator = graph
        .node_indices()
        .find(|index| graph.node(*index).is_operator())
        .expect("the addition produced an operator node");

    let incident = graph.incident_edges(operator);
    let inbound = incident.iter().filter(|(_, _, outgoing)| !outgoing).count();
    let outbound = incident.iter().filter(|(_, _, outgoing)| *outgoing).count();

    assert_eq!(inbound, 2);
    assert_eq!(outbound, 1);
    assert!(incident
        .iter()
        .all(|(edge, _, _)| edge.kind == EdgeKind::Transformation));

    Ok(())
}

#[test]
fn equal_literals_created_at_different_points_stay_distinct() -> anyhow::Result<()> {
    // `x + 1` evaluated on two paths of the same trace would share the
    // literal; two separate occurrences of `1` in the source must not.
    let (resolver, entry) = common::expression_program(
        "sample/Maths",
        "twoOnes",
        "x",
        infix(
            BinaryOperator::Add,
            infix(BinaryOperator::Add, name("x"), num(1)),
            num(1),
        ),
    );
    let traces = run(resolver, entry)?;
    let graphs = graphs_of(&traces);
    let graph = &graphs[0];

    let literal_ones = graph
        .node_indices()
        .filter(|index| {
            let node = graph.node(*index);
            node.kind == NodeKind::Value && node.literal && node.label == "1"
        })
        .count();
    assert_eq!(literal_ones, 2);

    Ok(())
}

#[test]
fn symbolic_values_share_one_node_per_symbol() -> anyhow::Result<()> {
    // `x + x`: both uses of the symbolic argument resolve to one node.
    let (resolver, entry) = common::expression_program(
        "sample/Maths",
        "double",
        "x",
        infix(BinaryOperator::Add, name("x"), name("x")),
    );
    let traces = run(resolver, entry)?;
    let graphs = graphs_of(&traces);
    let graph = &graphs[0];

    let symbolic_values = graph
        .node_indices()
        .filter(|index| {
            let node = graph.node(*index);
            node.kind == NodeKind::Value && node.symbolic
        })
        .count();
    assert_eq!(symbolic_values, 1);

    Ok(())
}

#[test]
fn library_calls_produce_the_call_pattern() -> anyhow::Result<()> {
    let builder_ty =
        concolic_comparator::signature::TypeSignature::Class(
            concolic_comparator::signature::ClassSignature::new("sample/Builder"),
        );

    let mut resolver = concolic_comparator::resolve::MapResolver::new();
    let body = vec![common::ret(common::call_virtual(
        name("sb"),
        "sample/Builder",
        "wrap",
        vec![common::int_ty()],
        concolic_comparator::signature::TypeSignature::Class(
            concolic_comparator::signature::ClassSignature::new("sample/Box"),
        ),
        vec![name("x")],
    ))];
    let entry = common::add_static_method(
        &mut resolver,
        "sample/Maths",
        "wrapIt",
        &[("sb", builder_ty), ("x", common::int_ty())],
        concolic_comparator::signature::TypeSignature::Class(
            concolic_comparator::signature::ClassSignature::new("sample/Box"),
        ),
        Some(body),
    );

    let traces = run(resolver, entry)?;
    let graphs = graphs_of(&traces);
    let graph = &graphs[0];

    let call = graph
        .node_indices()
        .find(|index| graph.node(*index).is_method_call())
        .expect("the opaque call produced a method-call node");

    let incident = graph.incident_edges(call);
    let scopes = incident
        .iter()
        .filter(|(edge, _, outgoing)| !outgoing && edge.kind == EdgeKind::Scope)
        .count();
    let parameters = incident
        .iter()
        .filter(|(edge, _, outgoing)| !outgoing && edge.kind == EdgeKind::Parameter)
        .count();
    let supplies = incident
        .iter()
        .filter(|(edge, _, outgoing)| *outgoing && edge.kind == EdgeKind::Supplies)
        .count();

    assert_eq!(scopes, 1);
    assert_eq!(parameters, 1);
    assert_eq!(supplies, 1);

    // The synthesized result is flagged as such.
    let supplied = incident
        .iter()
        .find(|(edge, _, outgoing)| *outgoing && edge.kind == EdgeKind::Supplies)
        .map(|(_, opposite, _)| *opposite)
        .expect("the result node exists");
    assert!(graph.node(supplied).synthetic);

    Ok(())
}

#[test]
fn field_puts_aggregate_values_into_their_owner() -> anyhow::Result<()> {
    use std::sync::Arc;

    use concolic_comparator::ast::{Expression, Statement};

    let mut resolver = concolic_comparator::resolve::MapResolver::new();
    let thing = concolic_comparator::signature::ClassSignature::new("sample/Thing");

    // new Thing().count = x;
    let body = vec![
        Statement::VariableDeclaration {
            name: "t".to_string(),
            ty: concolic_comparator::signature::TypeSignature::Class(thing.clone()),
            initializer: Some(Arc::new(Expression::New {
                ty: thing.clone(),
                constructor: concolic_comparator::signature::MethodSignature::new(
                    "<init>",
                    vec![],
                    concolic_comparator::signature::TypeSignature::Primitive(
                        concolic_comparator::signature::PrimitiveKind::Void,
                    ),
                ),
                arguments: vec![],
            })),
        },
        Statement::Expression(Arc::new(Expression::Assignment {
            target: Arc::new(Expression::FieldAccess {
                target: name("t"),
                name: "count".to_string(),
                ty: common::int_ty(),
            }),
            operator: None,
            value: name("x"),
        })),
    ];
    let entry = common::add_static_method(
        &mut resolver,
        "sample/Maths",
        "fill",
        &[("x", common::int_ty())],
        concolic_comparator::signature::TypeSignature::Primitive(
            concolic_comparator::signature::PrimitiveKind::Void,
        ),
        Some(body),
    );

    let traces = run(resolver, entry)?;
    let graphs = graphs_of(&traces);
    let graph = &graphs[0];

    let aggregation = graph
        .node_indices()
        .flat_map(|index| graph.incident_edges(index))
        .find(|(edge, _, _)| edge.kind == EdgeKind::Aggregation)
        .map(|(edge, _, _)| edge.label.clone());
    assert_eq!(aggregation, Some(Some("count".to_string())));

    let object = graph
        .node_indices()
        .find(|index| graph.node(*index).is_object())
        .expect("the created object has a node");
    assert!(graph.node(object).concrete);

    Ok(())
}
