//! This module contains the abstract syntax the engine executes: a closed sum
//! type over the modeled subset of the language.
//!
//! Parsing is out of scope — a source resolver supplies method bodies already
//! in this form. Child nodes are reference-counted so that the decoder can
//! carry subtrees into pending instructions, and forked contexts can share
//! them, without deep copies.
//!
//! Constructs that are representable here but have no modeled instruction
//! (switch statements, labeled statements, lambdas) are rejected by the
//! decoder with an unsupported-feature error rather than silently
//! misinterpreted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    memory::stack::BinaryOperator,
    signature::{ClassSignature, MethodSignature, PrimitiveKind, TypeSignature},
};

/// A sequence of statements forming a lexical scope.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Block {
    pub statements: Vec<Arc<Statement>>,
}

impl Block {
    /// Constructs a block from the provided statements.
    #[must_use]
    pub fn new(statements: Vec<Statement>) -> Self {
        let statements = statements.into_iter().map(Arc::new).collect();
        Self { statements }
    }
}

/// One handler clause of a try statement.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CatchClause {
    /// The name the caught exception is bound to.
    pub name: String,

    /// The exception type this clause handles.
    pub ty: ClassSignature,

    /// The handler body.
    pub body: Arc<Block>,
}

/// One instance field initializer of a class, run when an instance is
/// created concretely.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FieldInitializer {
    /// The field being initialized.
    pub name: String,

    /// The declared type of the field.
    pub ty: TypeSignature,

    /// The initializer expression.
    pub initializer: Arc<Expression>,
}

/// The kind of dispatch a method invocation uses.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum CallKind {
    /// A static invocation on the declaring class.
    Static,

    /// A virtual invocation dispatched on the receiver's runtime type.
    Virtual,

    /// A direct invocation (constructors).
    Special,

    /// A virtual invocation dispatched on the superclass of the receiver.
    Super,
}

/// A statement of the modeled language subset.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Statement {
    Block(Arc<Block>),

    /// An expression evaluated for effect; a non-void result is discarded.
    Expression(Arc<Expression>),

    /// A local variable declaration, optionally initialized.
    VariableDeclaration {
        name: String,
        ty: TypeSignature,
        initializer: Option<Arc<Expression>>,
    },

    If {
        condition: Arc<Expression>,
        then_branch: Arc<Statement>,
        else_branch: Option<Arc<Statement>>,
    },

    While {
        condition: Arc<Expression>,
        body: Arc<Statement>,
    },

    For {
        initializers: Vec<Arc<Statement>>,
        condition: Option<Arc<Expression>>,
        updaters: Vec<Arc<Expression>>,
        body: Arc<Statement>,
    },

    /// An enhanced for loop over an array or collection.
    ForEach {
        variable: String,
        ty: TypeSignature,
        iterable: Arc<Expression>,
        body: Arc<Statement>,
    },

    Return(Option<Arc<Expression>>),

    Throw(Arc<Expression>),

    Try {
        body: Arc<Block>,
        handlers: Vec<CatchClause>,
    },

    Break,

    Continue,

    Empty,

    /// A labeled statement. Not modeled; rejected at decode time.
    Labeled { label: String, body: Arc<Statement> },

    /// A switch statement. Not modeled; rejected at decode time.
    Switch {
        selector: Arc<Expression>,
        body: Vec<Arc<Statement>>,
    },
}

/// An expression of the modeled language subset.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Expression {
    BooleanLiteral(bool),

    CharLiteral(char),

    /// A numeric literal carried as source text together with its declared
    /// primitive kind; it is parsed into a concrete value at execution time.
    NumberLiteral { literal: String, kind: PrimitiveKind },

    StringLiteral(String),

    NullLiteral,

    /// A class literal (`Foo.class`).
    TypeLiteral(TypeSignature),

    /// A reference to a local variable (or parameter) by name.
    Name(String),

    /// The receiver of the enclosing method.
    This,

    /// An instance field access on an explicit target.
    FieldAccess {
        target: Arc<Expression>,
        name: String,
        ty: TypeSignature,
    },

    /// A static field access on the declaring class.
    StaticFieldAccess {
        declaring_class: ClassSignature,
        name: String,
        ty: TypeSignature,
    },

    ArrayAccess {
        array: Arc<Expression>,
        index: Arc<Expression>,
    },

    /// The `length` pseudo-field of an array.
    ArrayLength { array: Arc<Expression> },

    MethodCall {
        /// The receiver; [`None`] for static calls and implicit-this calls on
        /// the declaring class.
        target: Option<Arc<Expression>>,
        declaring_class: ClassSignature,
        method: MethodSignature,
        arguments: Vec<Arc<Expression>>,
        kind: CallKind,
    },

    /// An object creation (`new Foo(…)`).
    New {
        ty: ClassSignature,
        constructor: MethodSignature,
        arguments: Vec<Arc<Expression>>,
    },

    /// An array creation, with either a length expression or an initializer
    /// list.
    NewArray {
        component: TypeSignature,
        length: Option<Arc<Expression>>,
        initializer: Option<Vec<Arc<Expression>>>,
    },

    Infix {
        operator: BinaryOperator,
        lhs: Arc<Expression>,
        rhs: Arc<Expression>,
    },

    Prefix {
        operator: PrefixOperator,
        operand: Arc<Expression>,
    },

    Postfix {
        operator: PostfixOperator,
        operand: Arc<Expression>,
    },

    /// An assignment, optionally compound (`+=` carries `Some(Add)`).
    Assignment {
        target: Arc<Expression>,
        operator: Option<BinaryOperator>,
        value: Arc<Expression>,
    },

    /// A ternary conditional expression.
    Conditional {
        condition: Arc<Expression>,
        then_value: Arc<Expression>,
        else_value: Arc<Expression>,
    },

    Cast {
        ty: TypeSignature,
        operand: Arc<Expression>,
    },

    InstanceOf {
        operand: Arc<Expression>,
        ty: ClassSignature,
    },

    /// A lambda expression. Not modeled; rejected at decode time.
    Lambda,

    /// An anonymous class creation. Not modeled; rejected at decode time.
    AnonymousClass,

    /// A method reference. Not modeled; rejected at decode time.
    MethodReference,

    /// A varargs invocation marker. Not modeled; rejected at decode time.
    Varargs,
}

impl Expression {
    /// Checks whether evaluating this expression leaves a value on the
    /// operand stack.
    ///
    /// Assignments and void method calls evaluate purely for effect in the
    /// decoded instruction stream.
    #[must_use]
    pub fn leaves_value(&self) -> bool {
        match self {
            Self::Assignment { .. } => false,
            Self::MethodCall { method, .. } => !method.return_type.is_void(),
            _ => true,
        }
    }
}

/// The modeled prefix operators.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum PrefixOperator {
    /// Logical negation.
    Not,

    /// Arithmetic negation.
    Minus,

    /// Pre-increment.
    Increment,

    /// Pre-decrement.
    Decrement,
}

/// The modeled postfix operators.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum PostfixOperator {
    /// Post-increment.
    Increment,

    /// Post-decrement.
    Decrement,
}
