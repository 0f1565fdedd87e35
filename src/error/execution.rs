//! This module contains errors pertaining to the concolic execution of a
//! program entry point.
//!
//! Failures that terminate only a single path of execution (an uncaught
//! exception, an explicit halt, a null dereference) are not errors: they are
//! recorded in the path's trace, which is still produced. The errors here
//! abort the analysis of the current entry point.

use thiserror::Error;

use crate::signature::QualifiedMethodSignature;

/// Errors that occur during decoding and execution.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("The language construct {construct:?} has no modeled instruction")]
    UnsupportedLanguageFeature { construct: String },

    #[error("The opcode {opcode:#04x} at offset {offset} is not modeled")]
    UnsupportedOpcode { opcode: u8, offset: usize },

    #[error("The signature {signature:?} could not be resolved by any backend")]
    UnresolvableDescriptor { signature: String },

    #[error("Recursive invocation of {method} exceeded the configured depth of {limit}")]
    TooManyContexts {
        method: QualifiedMethodSignature,
        limit: usize,
    },

    #[error("Heap identifier {id} does not name an allocated value")]
    InvalidReference { id: u64 },

    #[error("Dereference of the null reference")]
    NullDereference,

    #[error("The name {name:?} is not allocated in any enclosing scope")]
    UnallocatedReference { name: String },

    #[error("The operand stack was empty when an operand was required")]
    OperandStackUnderflow,

    #[error("Expected {expected} on the operand stack but found {found:?}")]
    UnexpectedOperand {
        expected: &'static str,
        found: String,
    },

    #[error("Encountered a {construct} with no registered target scope")]
    InvalidControlFlow { construct: &'static str },

    #[error("The entry point {signature} has no interpretable body")]
    EntryPointNotInterpretable { signature: QualifiedMethodSignature },

    #[error("Execution was stopped by the watchdog")]
    StoppedByWatchdog,
}

/// The result type for operations that can fail with an execution error.
pub type Result<T> = std::result::Result<T, Error>;
