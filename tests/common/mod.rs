//! Utilities for building small in-memory programs and running them through
//! the engine in tests.

#![allow(dead_code)] // Not every suite uses every fixture.

use std::sync::Arc;

use concolic_comparator::{
    ast::{Block, CallKind, Expression, Statement},
    graph::{self, ExecutionGraph},
    interpreter::{Config, ConcolicInterpreter},
    memory::stack::BinaryOperator,
    resolve::{MapResolver, MethodDescriptor},
    signature::{
        ClassSignature,
        MethodSignature,
        PrimitiveKind,
        QualifiedMethodSignature,
        TypeSignature,
    },
    trace::EntryPointTraces,
    watchdog::LazyWatchdog,
};

pub fn int_ty() -> TypeSignature {
    TypeSignature::Primitive(PrimitiveKind::Int)
}

pub fn string_ty() -> TypeSignature {
    TypeSignature::Class(ClassSignature::string())
}

pub fn num(value: i64) -> Arc<Expression> {
    Arc::new(Expression::NumberLiteral {
        literal: value.to_string(),
        kind: PrimitiveKind::Int,
    })
}

pub fn name(identifier: &str) -> Arc<Expression> {
    Arc::new(Expression::Name(identifier.to_string()))
}

pub fn string_lit(text: &str) -> Arc<Expression> {
    Arc::new(Expression::StringLiteral(text.to_string()))
}

pub fn infix(
    operator: BinaryOperator,
    lhs: Arc<Expression>,
    rhs: Arc<Expression>,
) -> Arc<Expression> {
    Arc::new(Expression::Infix { operator, lhs, rhs })
}

pub fn assign(target: Arc<Expression>, value: Arc<Expression>) -> Statement {
    Statement::Expression(Arc::new(Expression::Assignment {
        target,
        operator: None,
        value,
    }))
}

pub fn declare(name: &str, ty: TypeSignature, initializer: Arc<Expression>) -> Statement {
    Statement::VariableDeclaration {
        name: name.to_string(),
        ty,
        initializer: Some(initializer),
    }
}

pub fn ret(value: Arc<Expression>) -> Statement {
    Statement::Return(Some(value))
}

pub fn if_else(
    condition: Arc<Expression>,
    then_branch: Statement,
    else_branch: Statement,
) -> Statement {
    Statement::If {
        condition,
        then_branch: Arc::new(then_branch),
        else_branch: Some(Arc::new(else_branch)),
    }
}

/// Registers a static method on `resolver` and returns its signature.
pub fn add_static_method(
    resolver: &mut MapResolver,
    class: &str,
    method: &str,
    parameters: &[(&str, TypeSignature)],
    return_type: TypeSignature,
    body: Option<Vec<Statement>>,
) -> QualifiedMethodSignature {
    let signature = QualifiedMethodSignature::new(
        ClassSignature::new(class),
        MethodSignature::new(
            method,
            parameters.iter().map(|(_, ty)| ty.clone()).collect(),
            return_type,
        ),
    );
    resolver.add_method(
        MethodDescriptor {
            signature: signature.clone(),
            is_static: true,
            parameter_names: parameters.iter().map(|(name, _)| (*name).to_string()).collect(),
        },
        body.map(Block::new),
    );
    signature
}

/// A static call expression on a previously registered method.
pub fn call_static(
    signature: &QualifiedMethodSignature,
    arguments: Vec<Arc<Expression>>,
) -> Arc<Expression> {
    Arc::new(Expression::MethodCall {
        target: None,
        declaring_class: signature.declaring_class.clone(),
        method: signature.method.clone(),
        arguments,
        kind: CallKind::Static,
    })
}

/// A virtual call expression; the callee need not be registered, in which
/// case the engine synthesizes a library call.
pub fn call_virtual(
    target: Arc<Expression>,
    class: &str,
    method: &str,
    argument_types: Vec<TypeSignature>,
    return_type: TypeSignature,
    arguments: Vec<Arc<Expression>>,
) -> Arc<Expression> {
    Arc::new(Expression::MethodCall {
        target: Some(target),
        declaring_class: ClassSignature::new(class),
        method: MethodSignature::new(method, argument_types, return_type),
        arguments,
        kind: CallKind::Virtual,
    })
}

/// Runs every bounded path of `entry` against `resolver` with the default
/// configuration.
pub fn run(
    resolver: MapResolver,
    entry: QualifiedMethodSignature,
) -> anyhow::Result<EntryPointTraces> {
    run_with_config(resolver, entry, Config::default())
}

/// Runs every bounded path of `entry` against `resolver`.
pub fn run_with_config(
    resolver: MapResolver,
    entry: QualifiedMethodSignature,
    config: Config,
) -> anyhow::Result<EntryPointTraces> {
    let resolver = Arc::new(resolver);
    let interpreter = ConcolicInterpreter::new(
        entry,
        resolver.clone(),
        resolver,
        config,
        LazyWatchdog.in_arc(),
    )?;
    Ok(interpreter.execute()?)
}

/// Builds the graphs for every trace of an exploration.
pub fn graphs_of(traces: &EntryPointTraces) -> Vec<ExecutionGraph> {
    traces
        .traces
        .iter()
        .enumerate()
        .map(|(index, trace)| graph::build(format!("path-{index}"), trace))
        .collect()
}

/// A one-parameter absolute-value program: forks once on its symbolic
/// argument.
///
/// ```text
/// static int abs(int x) { if (x < 0) return 0 - x; else return x; }
/// ```
pub fn abs_program(variable: &str) -> (MapResolver, QualifiedMethodSignature) {
    let mut resolver = MapResolver::new();
    let body = vec![if_else(
        infix(BinaryOperator::Less, name(variable), num(0)),
        ret(infix(BinaryOperator::Subtract, num(0), name(variable))),
        ret(name(variable)),
    )];
    let entry = add_static_method(
        &mut resolver,
        "sample/Maths",
        "abs",
        &[(variable, int_ty())],
        int_ty(),
        Some(body),
    );
    (resolver, entry)
}

/// A counting-loop program: forks at the loop head until the bound
/// suppresses it.
///
/// ```text
/// static int sum(int n) {
///     int s = 0;
///     for (int i = 0; i < n; i = i + 1) { s = s + i; }
///     return s;
/// }
/// ```
pub fn sum_program() -> (MapResolver, QualifiedMethodSignature) {
    let mut resolver = MapResolver::new();
    let body = vec![
        declare("s", int_ty(), num(0)),
        Statement::For {
            initializers: vec![Arc::new(declare("i", int_ty(), num(0)))],
            condition: Some(infix(BinaryOperator::Less, name("i"), name("n"))),
            updaters: vec![Arc::new(Expression::Assignment {
                target: name("i"),
                operator: None,
                value: infix(BinaryOperator::Add, name("i"), num(1)),
            })],
            body: Arc::new(assign(name("s"), infix(BinaryOperator::Add, name("s"), name("i")))),
        },
        ret(name("s")),
    ];
    let entry = add_static_method(
        &mut resolver,
        "sample/Maths",
        "sum",
        &[("n", int_ty())],
        int_ty(),
        Some(body),
    );
    (resolver, entry)
}

/// A single-expression program `return <expression>;` over one int
/// parameter.
pub fn expression_program(
    class: &str,
    method: &str,
    parameter: &str,
    expression: Arc<Expression>,
) -> (MapResolver, QualifiedMethodSignature) {
    let mut resolver = MapResolver::new();
    let entry = add_static_method(
        &mut resolver,
        class,
        method,
        &[(parameter, int_ty())],
        int_ty(),
        Some(vec![ret(expression)]),
    );
    (resolver, entry)
}
