//! Tests for the concolic execution engine: forking, loop bounding, library
//! call synthesis, and the failure modes of the error taxonomy.

mod common;

use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};

use common::{
    abs_program,
    add_static_method,
    call_static,
    call_virtual,
    infix,
    int_ty,
    name,
    num,
    ret,
    run,
    run_with_config,
    string_lit,
    sum_program,
};
use concolic_comparator::{
    ast::Statement,
    error::execution::Error,
    interpreter::{Config, ConcolicInterpreter},
    memory::stack::{BinaryOperator, StackValue},
    resolve::MapResolver,
    signature::{ClassSignature, PrimitiveKind, TypeSignature},
    trace::TraceRecord,
    watchdog::FlagWatchdog,
};

#[test]
fn a_straight_line_program_yields_one_trace() -> anyhow::Result<()> {
    let (resolver, entry) = common::expression_program(
        "sample/Maths",
        "addOne",
        "x",
        infix(BinaryOperator::Add, name("x"), num(1)),
    );

    let traces = run(resolver, entry.clone())?;
    assert_eq!(traces.traces.len(), 1);

    let trace = &traces.traces[0];
    assert!(matches!(
        trace.records.first(),
        Some(TraceRecord::EntryMethod { signature }) if *signature == entry
    ));

    // The addition over a symbolic operand defers to a computed value and
    // appends exactly one transformation.
    let transformations = trace
        .records
        .iter()
        .filter(|record| matches!(record, TraceRecord::StackTransformation { .. }))
        .count();
    assert_eq!(transformations, 1);
    assert_eq!(trace.assertions().count(), 0);

    Ok(())
}

#[test]
fn a_symbolic_branch_forks_into_two_paths() -> anyhow::Result<()> {
    let (resolver, entry) = abs_program("x");
    let traces = run(resolver, entry)?;

    assert_eq!(traces.traces.len(), 2);

    // The two children differ only in the truth they assumed for the same
    // condition.
    let first: Vec<_> = traces.traces[0].assertions().collect();
    let second: Vec<_> = traces.traces[1].assertions().collect();
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(first[0].0, second[0].0);
    assert_ne!(first[0].1, second[0].1);

    Ok(())
}

#[test]
fn forked_paths_share_no_mutable_heap_state() -> anyhow::Result<()> {
    // Each side of the fork writes a different field value into an object
    // created before the branch; the sibling's snapshot must not see it.
    let mut resolver = MapResolver::new();
    let sink = add_static_method(
        &mut resolver,
        "sample/Sink",
        "consume",
        &[("v", int_ty())],
        TypeSignature::Primitive(PrimitiveKind::Void),
        None,
    );
    let body = vec![common::if_else(
        infix(BinaryOperator::Less, name("x"), num(0)),
        Statement::Expression(call_static(&sink, vec![num(1)])),
        Statement::Expression(call_static(&sink, vec![num(2)])),
    )];
    let entry = add_static_method(
        &mut resolver,
        "sample/Maths",
        "branch",
        &[("x", int_ty())],
        TypeSignature::Primitive(PrimitiveKind::Void),
        Some(body),
    );

    let traces = run(resolver, entry)?;
    assert_eq!(traces.traces.len(), 2);

    let calls_of = |index: usize| -> Vec<i64> {
        traces.traces[index]
            .records
            .iter()
            .filter_map(|record| match record {
                TraceRecord::StaticLibraryMethodCall { arguments, .. } => match &arguments[0] {
                    StackValue::Concrete(concrete) => Some(concrete.literal.as_i64()),
                    _ => None,
                },
                _ => None,
            })
            .collect()
    };

    // One path called with 2 (branch not taken first), the other with 1;
    // neither observed the sibling's call.
    let mut seen = vec![calls_of(0), calls_of(1)];
    seen.sort();
    assert_eq!(seen, vec![vec![1], vec![2]]);

    Ok(())
}

#[test]
fn loop_forking_is_bounded_per_branch_site() -> anyhow::Result<()> {
    let (resolver, entry) = sum_program();
    let config = Config::default().with_max_loop_executions(2);
    let traces = run_with_config(resolver, entry, config)?;

    // Exit immediately, after one iteration, or after two: the site may fork
    // at most `max_loop_executions` times in a single path.
    assert_eq!(traces.traces.len(), 3);
    for trace in &traces.traces {
        let forks_assumed_true = trace.assertions().filter(|(_, truth)| *truth).count();
        assert!(forks_assumed_true <= 2);
    }

    Ok(())
}

#[test]
fn opaque_calls_synthesize_results_and_reuse_fluent_receivers() -> anyhow::Result<()> {
    // `sb.append(x)` on an opaque Builder whose append returns Builder: the
    // synthesized result must be the receiver itself.
    let mut resolver = MapResolver::new();
    let builder_ty = TypeSignature::Class(ClassSignature::new("sample/Builder"));
    let body = vec![ret(call_virtual(
        name("sb"),
        "sample/Builder",
        "append",
        vec![int_ty()],
        builder_ty.clone(),
        vec![name("x")],
    ))];
    let entry = add_static_method(
        &mut resolver,
        "sample/Maths",
        "chain",
        &[("sb", builder_ty), ("x", int_ty())],
        TypeSignature::Class(ClassSignature::new("sample/Builder")),
        Some(body),
    );

    let traces = run(resolver, entry)?;
    assert_eq!(traces.traces.len(), 1);

    let call = traces.traces[0]
        .records
        .iter()
        .find_map(|record| match record {
            TraceRecord::InstanceLibraryMethodCall { scope, result, .. } => {
                Some((*scope, result.clone()))
            }
            _ => None,
        })
        .expect("the opaque call must be recorded");

    let (scope, result) = call;
    assert_eq!(result, Some(StackValue::Reference(scope)));

    Ok(())
}

#[test]
fn string_concatenation_builds_composite_values() -> anyhow::Result<()> {
    let mut resolver = MapResolver::new();
    let body = vec![ret(infix(
        BinaryOperator::Add,
        string_lit("Hello "),
        name("who"),
    ))];
    let entry = add_static_method(
        &mut resolver,
        "sample/Greeter",
        "greet",
        &[("who", common::string_ty())],
        common::string_ty(),
        Some(body),
    );

    let traces = run(resolver, entry)?;
    let records = &traces.traces[0].records;

    assert!(records.iter().any(|record| matches!(
        record,
        TraceRecord::StringConcat {
            result: concolic_comparator::memory::heap::StringValue::Composite { .. },
            ..
        }
    )));

    Ok(())
}

#[test]
fn unbounded_recursion_is_fatal_to_the_entry_point() {
    let mut resolver = MapResolver::new();
    let signature = {
        // Forward-declare the signature so the body can call it.
        let mut scratch = MapResolver::new();
        add_static_method(
            &mut scratch,
            "sample/Maths",
            "spin",
            &[],
            TypeSignature::Primitive(PrimitiveKind::Void),
            None,
        )
    };
    let body = vec![Statement::Expression(call_static(&signature, vec![]))];
    let entry = add_static_method(
        &mut resolver,
        "sample/Maths",
        "spin",
        &[],
        TypeSignature::Primitive(PrimitiveKind::Void),
        Some(body),
    );

    let result = run(resolver, entry);
    let error = result.unwrap_err();
    assert!(matches!(
        error.downcast_ref::<Error>(),
        Some(Error::TooManyContexts { .. })
    ));
}

#[test]
fn unsupported_constructs_fail_fast_at_decode_time() {
    let mut resolver = MapResolver::new();
    let body = vec![Statement::Switch {
        selector: num(1),
        body: vec![],
    }];
    let entry = add_static_method(
        &mut resolver,
        "sample/Maths",
        "dispatch",
        &[],
        TypeSignature::Primitive(PrimitiveKind::Void),
        Some(body),
    );

    let result = run(resolver, entry);
    let error = result.unwrap_err();
    assert!(matches!(
        error.downcast_ref::<Error>(),
        Some(Error::UnsupportedLanguageFeature { .. })
    ));
}

#[test]
fn entry_points_without_bodies_are_rejected() {
    let mut resolver = MapResolver::new();
    let entry = add_static_method(
        &mut resolver,
        "sample/Maths",
        "opaque",
        &[],
        TypeSignature::Primitive(PrimitiveKind::Void),
        None,
    );

    let resolver = Arc::new(resolver);
    let result = ConcolicInterpreter::new(
        entry,
        resolver.clone(),
        resolver,
        Config::default(),
        concolic_comparator::watchdog::LazyWatchdog.in_arc(),
    );
    assert!(matches!(
        result,
        Err(Error::EntryPointNotInterpretable { .. })
    ));
}

#[test]
fn the_watchdog_stops_a_running_analysis() -> anyhow::Result<()> {
    let (resolver, entry) = abs_program("x");
    let resolver = Arc::new(resolver);

    let flag = Arc::new(AtomicBool::new(true));
    flag.store(true, Ordering::Relaxed);

    let interpreter = ConcolicInterpreter::new(
        entry,
        resolver.clone(),
        resolver,
        Config::default(),
        FlagWatchdog::new(flag).polling_every(1).in_arc(),
    )?;

    assert!(matches!(
        interpreter.execute(),
        Err(Error::StoppedByWatchdog)
    ));
    Ok(())
}

#[test]
fn null_dereferences_halt_only_their_own_path() -> anyhow::Result<()> {
    // Calling a method on null halts the path with a record rather than
    // failing the analysis.
    let mut resolver = MapResolver::new();
    let body = vec![ret(call_virtual(
        Arc::new(concolic_comparator::ast::Expression::NullLiteral),
        "sample/Thing",
        "poke",
        vec![],
        int_ty(),
        vec![],
    ))];
    let entry = add_static_method(
        &mut resolver,
        "sample/Maths",
        "npe",
        &[],
        int_ty(),
        Some(body),
    );

    let traces = run(resolver, entry)?;
    assert_eq!(traces.traces.len(), 1);
    assert!(traces.traces[0]
        .records
        .iter()
        .any(|record| matches!(record, TraceRecord::Halt { .. })));

    Ok(())
}

#[test]
fn uncaught_exceptions_terminate_with_a_record() -> anyhow::Result<()> {
    let mut resolver = MapResolver::new();
    let body = vec![Statement::Throw(Arc::new(
        concolic_comparator::ast::Expression::New {
            ty: ClassSignature::new("java/lang/IllegalStateException"),
            constructor: concolic_comparator::signature::MethodSignature::new(
                "<init>",
                vec![],
                TypeSignature::Primitive(PrimitiveKind::Void),
            ),
            arguments: vec![],
        },
    ))];
    let entry = add_static_method(
        &mut resolver,
        "sample/Maths",
        "boom",
        &[],
        TypeSignature::Primitive(PrimitiveKind::Void),
        Some(body),
    );

    let traces = run(resolver, entry)?;
    assert!(traces.traces[0].records.iter().any(|record| matches!(
        record,
        TraceRecord::UncaughtException { ty } if ty.name() == "java/lang/IllegalStateException"
    )));

    Ok(())
}

#[test]
fn try_blocks_catch_assignable_exceptions() -> anyhow::Result<()> {
    use concolic_comparator::ast::{Block, CatchClause, Expression};

    let mut resolver = MapResolver::new();
    resolver.add_superclass(
        ClassSignature::new("sample/Fault"),
        ClassSignature::new("java/lang/Exception"),
    );

    let throw = Statement::Throw(Arc::new(Expression::New {
        ty: ClassSignature::new("sample/Fault"),
        constructor: concolic_comparator::signature::MethodSignature::new(
            "<init>",
            vec![],
            TypeSignature::Primitive(PrimitiveKind::Void),
        ),
        arguments: vec![],
    }));
    let body = vec![
        Statement::Try {
            body: Arc::new(Block::new(vec![throw])),
            handlers: vec![CatchClause {
                name: "e".to_string(),
                ty: ClassSignature::new("java/lang/Exception"),
                body: Arc::new(Block::new(vec![ret(num(1))])),
            }],
        },
        ret(num(0)),
    ];
    let entry = add_static_method(
        &mut resolver,
        "sample/Maths",
        "guarded",
        &[],
        int_ty(),
        Some(body),
    );

    let traces = run(resolver, entry)?;
    let trace = &traces.traces[0];

    // The handler ran: the path ends normally, with no uncaught-exception
    // record.
    assert!(!trace
        .records
        .iter()
        .any(|record| matches!(record, TraceRecord::UncaughtException { .. })));
    assert!(!trace
        .records
        .iter()
        .any(|record| matches!(record, TraceRecord::Halt { .. })));

    Ok(())
}
