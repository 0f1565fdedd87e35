//! Tests for the element matcher and the iterative graph comparator.

mod common;

use common::{abs_program, graphs_of, infix, name, num, run};
use concolic_comparator::{
    compare::{self, matcher},
    graph::ExecutionGraph,
    memory::stack::BinaryOperator,
};

fn single_graph(
    program: (
        concolic_comparator::resolve::MapResolver,
        concolic_comparator::signature::QualifiedMethodSignature,
    ),
) -> anyhow::Result<ExecutionGraph> {
    let traces = run(program.0, program.1)?;
    Ok(graphs_of(&traces).remove(0))
}

#[test]
fn comparing_a_graph_with_itself_is_total() -> anyhow::Result<()> {
    let (resolver, entry) = abs_program("x");
    let traces = run(resolver, entry)?;
    let graphs = graphs_of(&traces);

    for graph in &graphs {
        let result = compare::compare(graph, graph);
        assert!((result.union_sim - 1.0).abs() < f64::EPSILON);
        assert!((result.lr_sim - 1.0).abs() < f64::EPSILON);
        assert!((result.rl_sim - 1.0).abs() < f64::EPSILON);
        assert!(result.l_disjoint.abs() < f64::EPSILON);
        assert!(result.r_disjoint.abs() < f64::EPSILON);
        assert_eq!(result.node_mappings.len(), graph.node_count());
    }

    Ok(())
}

#[test]
fn renaming_locals_does_not_change_the_score() -> anyhow::Result<()> {
    // The same program with different local names produces the same graphs,
    // since locals are not node-labeled for matching purposes.
    let original = single_graph(abs_program("x"))?;
    let original_again = single_graph(abs_program("x"))?;
    let renamed = single_graph(abs_program("totallyDifferent"))?;

    let identical = compare::compare(&original, &original_again);
    let against_renamed = compare::compare(&original, &renamed);

    assert!((identical.union_sim - against_renamed.union_sim).abs() < f64::EPSILON);
    assert!((against_renamed.union_sim - 1.0).abs() < f64::EPSILON);

    Ok(())
}

#[test]
fn swapped_commutative_operands_outscore_unrelated_programs() -> anyhow::Result<()> {
    let plus = single_graph(common::expression_program(
        "sample/A",
        "calc",
        "x",
        infix(BinaryOperator::Add, name("x"), num(1)),
    ))?;
    let swapped = single_graph(common::expression_program(
        "sample/B",
        "calc",
        "x",
        infix(BinaryOperator::Add, num(1), name("x")),
    ))?;
    let unrelated = single_graph(common::expression_program(
        "sample/C",
        "calc",
        "x",
        infix(BinaryOperator::Multiply, name("x"), num(3)),
    ))?;

    let swapped_score = compare::compare(&plus, &swapped);
    let unrelated_score = compare::compare(&plus, &unrelated);

    assert!(swapped_score.union_sim >= unrelated_score.union_sim);
    assert!(swapped_score.union_sim > 0.9);

    Ok(())
}

#[test]
fn sibling_assertion_traces_keep_their_truth_values_apart() -> anyhow::Result<()> {
    // A fork produces one trace asserting the condition true and a sibling
    // asserting it false. The graphs carry those assertions, and comparing
    // each sibling against a third program must not collapse them: the
    // assertion conditions stay attached to their own truth values.
    let (resolver, entry) = abs_program("x");
    let traces = run(resolver, entry)?;
    let graphs = graphs_of(&traces);

    assert_eq!(graphs.len(), 2);
    let (condition_a, truth_a) = graphs[0].assertions[0].clone();
    let (condition_b, truth_b) = graphs[1].assertions[0].clone();
    assert_eq!(condition_a, condition_b);
    assert_ne!(truth_a, truth_b);

    let third = single_graph(common::expression_program(
        "sample/C",
        "calc",
        "x",
        infix(BinaryOperator::Multiply, name("x"), num(3)),
    ))?;

    let first = compare::compare(&graphs[0], &third);
    let second = compare::compare(&graphs[1], &third);

    // Each sibling is scored independently; their assertion records are
    // preserved unmodified on the graphs after comparison.
    assert_eq!(graphs[0].assertions[0].1, truth_a);
    assert_eq!(graphs[1].assertions[0].1, truth_b);
    assert!(first.union_sim <= 1.0);
    assert!(second.union_sim <= 1.0);

    Ok(())
}

#[test]
fn the_matcher_is_symmetric_across_node_pairs() -> anyhow::Result<()> {
    // Symmetry holds for every rule; the method-name-prefix heuristic is the
    // one rule whose asymmetric formulation requires checking both
    // directions, so both orders are exercised explicitly here.
    let left = single_graph(abs_program("x"))?;
    let right = single_graph(common::expression_program(
        "sample/B",
        "calc",
        "x",
        infix(BinaryOperator::Add, num(1), name("x")),
    ))?;

    for l in left.node_indices() {
        for r in right.node_indices() {
            assert_eq!(
                matcher::match_nodes(&left, l, &right, r),
                matcher::match_nodes(&right, r, &left, l),
                "matcher must answer the same in both orders",
            );
        }
    }

    Ok(())
}

#[test]
fn method_call_matching_tolerates_renames_by_prefix() -> anyhow::Result<()> {
    // `calc` vs `calcObfuscated`: names are prefix-related, so the call
    // nodes stay compatible in both orders.
    let sink_args = vec![common::int_ty()];
    let build = |method: &str| -> anyhow::Result<ExecutionGraph> {
        let mut resolver = concolic_comparator::resolve::MapResolver::new();
        let body = vec![common::ret(common::call_virtual(
            name("b"),
            "sample/Builder",
            method,
            sink_args.clone(),
            common::int_ty(),
            vec![name("x")],
        ))];
        let entry = common::add_static_method(
            &mut resolver,
            "sample/Maths",
            "drive",
            &[
                (
                    "b",
                    concolic_comparator::signature::TypeSignature::Class(
                        concolic_comparator::signature::ClassSignature::new("sample/Builder"),
                    ),
                ),
                ("x", common::int_ty()),
            ],
            common::int_ty(),
            Some(body),
        );
        let traces = run(resolver, entry)?;
        Ok(graphs_of(&traces).remove(0))
    };

    let plain = build("calc")?;
    let obfuscated = build("calcObfuscated")?;

    let plain_call = plain
        .node_indices()
        .find(|index| plain.node(*index).is_method_call())
        .expect("call node exists");
    let obfuscated_call = obfuscated
        .node_indices()
        .find(|index| obfuscated.node(*index).is_method_call())
        .expect("call node exists");

    assert!(matcher::match_nodes(
        &plain,
        plain_call,
        &obfuscated,
        obfuscated_call
    ));
    assert!(matcher::match_nodes(
        &obfuscated,
        obfuscated_call,
        &plain,
        plain_call
    ));

    Ok(())
}

#[test]
fn disjoint_scores_complement_the_mapped_fractions() -> anyhow::Result<()> {
    let left = single_graph(abs_program("x"))?;
    let unrelated = single_graph(common::expression_program(
        "sample/C",
        "calc",
        "x",
        infix(BinaryOperator::Multiply, name("x"), num(3)),
    ))?;

    let result = compare::compare(&left, &unrelated);
    assert!((result.lr_sim + result.l_disjoint - 1.0).abs() < 1e-9);
    assert!((result.rl_sim + result.r_disjoint - 1.0).abs() < 1e-9);
    assert!(result.union_sim <= 1.0);

    Ok(())
}
