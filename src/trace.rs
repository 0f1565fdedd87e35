//! This module contains the trace record model: the append-only semantic
//! event log produced as a side effect of execution.
//!
//! Every state-changing primitive appends exactly one immutable record before
//! returning control. No record is ever mutated or removed. At path
//! termination the full ordered log for the terminal context is packaged,
//! together with that context's final heap snapshot, as one
//! [`ExecutionTrace`].

use serde::{Deserialize, Serialize};

use crate::{
    memory::{
        heap::{HeapArea, StringValue},
        stack::{BinaryOperator, ReferenceValue, StackValue},
    },
    signature::{ClassSignature, QualifiedMethodSignature, TypeSignature},
};

/// One immutable event in the execution log.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum TraceRecord {
    /// The entry point method of this execution.
    EntryMethod { signature: QualifiedMethodSignature },

    /// The receiver the entry point was invoked on.
    EntryScope { reference: ReferenceValue },

    /// One synthesized argument the entry point was invoked with.
    EntryParameter { value: StackValue },

    /// A call to a static method with no available body.
    StaticLibraryMethodCall {
        method: QualifiedMethodSignature,
        arguments: Vec<StackValue>,
        result: Option<StackValue>,
    },

    /// A call to an instance method with no available body.
    InstanceLibraryMethodCall {
        method: QualifiedMethodSignature,
        scope: ReferenceValue,
        arguments: Vec<StackValue>,
        result: Option<StackValue>,
    },

    /// A return value synthesized for a call that was not executed.
    SynthesisedReturnValue {
        method: QualifiedMethodSignature,
        result: StackValue,
    },

    /// A write to a static field.
    StaticFieldPut {
        declaring_class: ClassSignature,
        field: String,
        ty: TypeSignature,
        old_value: StackValue,
        new_value: StackValue,
    },

    /// A write to an instance field.
    ObjectFieldPut {
        reference: ReferenceValue,
        field: String,
        ty: TypeSignature,
        old_value: StackValue,
        new_value: StackValue,
    },

    /// A write to an array member.
    ArrayMemberPut {
        reference: ReferenceValue,
        index: StackValue,
        old_value: StackValue,
        new_value: StackValue,
    },

    /// A read of an array member.
    ArrayMemberGet {
        reference: ReferenceValue,
        index: StackValue,
        value: StackValue,
    },

    /// The synthesis of a default value for a first-touched instance field.
    DefaultInstanceFieldValue {
        reference: ReferenceValue,
        field: String,
        value: StackValue,
    },

    /// The synthesis of a default value for a first-touched static field.
    DefaultStaticFieldValue {
        declaring_class: ClassSignature,
        field: String,
        value: StackValue,
    },

    /// A binary operation applied to two operands.
    StackTransformation {
        lhs: StackValue,
        rhs: StackValue,
        result: StackValue,
        operator: BinaryOperator,
    },

    /// A logical negation applied to an operand.
    NotValueTransformation { input: StackValue, output: StackValue },

    /// A primitive cast applied to an operand.
    StackCast { input: StackValue, output: StackValue },

    /// A string concatenation.
    StringConcat {
        lhs: StringValue,
        rhs: StringValue,
        result: StringValue,
    },

    /// The stringification of a non-string value.
    Stringification { value: StackValue, result: StringValue },

    /// The truth value this path assumed for a branch condition it could not
    /// decide concretely.
    Assertion { condition: StackValue, truth: bool },

    /// An explicit termination of this path.
    Halt { message: String },

    /// An exception that unwound past the entry point.
    UncaughtException { ty: ClassSignature },
}

/// The complete log of one explored path, paired with the heap snapshot the
/// path terminated with.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ExecutionTrace {
    /// The ordered record log.
    pub records: Vec<TraceRecord>,

    /// The heap as it stood when the path terminated.
    pub heap: HeapArea,
}

impl ExecutionTrace {
    /// Constructs a new execution trace from its parts.
    #[must_use]
    pub fn new(records: Vec<TraceRecord>, heap: HeapArea) -> Self {
        Self { records, heap }
    }

    /// Iterates over the branch assertions recorded on this path, in order.
    pub fn assertions(&self) -> impl Iterator<Item = (&StackValue, bool)> {
        self.records.iter().filter_map(|record| match record {
            TraceRecord::Assertion { condition, truth } => Some((condition, *truth)),
            _ => None,
        })
    }
}

/// The traces produced by exploring all bounded paths from one entry point.
///
/// Trace identity is positional; no semantic ordering of paths is guaranteed.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct EntryPointTraces {
    /// The entry point that was explored.
    pub entry_point: QualifiedMethodSignature,

    /// One trace per explored path.
    pub traces: Vec<ExecutionTrace>,
}
