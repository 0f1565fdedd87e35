//! This module contains the call-frame representation: a closed union over
//! the three frame kinds the engine executes.

pub mod bytecode;
pub mod interpreted;
pub mod synthetic;

use crate::{
    ctx::{ExecutionContext, Interrupt, StepResult},
    error::execution::Error,
    memory::stack::StackValue,
    signature::QualifiedMethodSignature,
};

pub use bytecode::BytecodeFrame;
pub use interpreted::InterpretedFrame;
pub use synthetic::SyntheticFrame;

/// One frame on the call stack.
///
/// A closed union rather than a trait object so that the frame stack is plain
/// data: forking a context deep-copies it with an ordinary clone.
#[derive(Clone, Debug)]
pub enum Frame {
    /// A frame executing a pre-decoded instruction sequence produced from an
    /// AST method body.
    Interpreted(InterpretedFrame),

    /// A frame executing raw bytecode one opcode at a time.
    Bytecode(BytecodeFrame),

    /// A synthetic frame used to bootstrap an entry point.
    Synthetic(SyntheticFrame),
}

impl Frame {
    /// Pushes a value onto this frame's operand stack.
    pub fn push(&mut self, value: StackValue) {
        self.operands_mut().push(value);
    }

    /// Pops a value from this frame's operand stack.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the operand stack is empty, which is an engine bug.
    pub fn pop(&mut self) -> Result<StackValue, Error> {
        self.operands_mut().pop().ok_or(Error::OperandStackUnderflow)
    }

    /// Peeks at the top value of this frame's operand stack.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the operand stack is empty, which is an engine bug.
    pub fn peek(&self) -> Result<&StackValue, Error> {
        self.operands().last().ok_or(Error::OperandStackUnderflow)
    }

    /// Checks whether this frame has no more instructions to execute.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        match self {
            Self::Interpreted(frame) => frame.is_finished(),
            Self::Bytecode(frame) => frame.is_finished(),
            Self::Synthetic(frame) => frame.is_finished(),
        }
    }

    /// Gets the method this frame executes, where the frame is bound to one.
    #[must_use]
    pub fn method(&self) -> Option<&QualifiedMethodSignature> {
        match self {
            Self::Interpreted(frame) => Some(&frame.method),
            Self::Bytecode(frame) => Some(&frame.method),
            Self::Synthetic(_) => None,
        }
    }

    /// Gets this frame's operand stack.
    #[must_use]
    pub fn operands(&self) -> &Vec<StackValue> {
        match self {
            Self::Interpreted(frame) => &frame.operands,
            Self::Bytecode(frame) => &frame.operands,
            Self::Synthetic(frame) => &frame.operands,
        }
    }

    /// Gets this frame's operand stack for modification.
    #[must_use]
    pub fn operands_mut(&mut self) -> &mut Vec<StackValue> {
        match self {
            Self::Interpreted(frame) => &mut frame.operands,
            Self::Bytecode(frame) => &mut frame.operands,
            Self::Synthetic(frame) => &mut frame.operands,
        }
    }

    /// Executes the next instruction of this frame against the provided
    /// context.
    ///
    /// The frame is detached from the context's frame stack while it
    /// executes; the execution loop reattaches it afterwards unless the
    /// instruction transferred control.
    pub(crate) fn execute_next(&mut self, ctx: &mut ExecutionContext) -> StepResult {
        match self {
            Self::Interpreted(frame) => frame.execute_next(ctx),
            Self::Bytecode(frame) => frame.execute_next(ctx),
            Self::Synthetic(frame) => frame.execute_next(ctx),
        }
    }

    /// Gets the control transfer that completes this frame once it has run
    /// out of instructions.
    pub(crate) fn completion_interrupt(&self) -> Interrupt {
        match self {
            Self::Interpreted(frame) => frame.completion_interrupt(),
            Self::Bytecode(_) | Self::Synthetic(_) => Interrupt::Return(None),
        }
    }
}

impl From<InterpretedFrame> for Frame {
    fn from(value: InterpretedFrame) -> Self {
        Self::Interpreted(value)
    }
}

impl From<BytecodeFrame> for Frame {
    fn from(value: BytecodeFrame) -> Self {
        Self::Bytecode(value)
    }
}

impl From<SyntheticFrame> for Frame {
    fn from(value: SyntheticFrame) -> Self {
        Self::Synthetic(value)
    }
}
