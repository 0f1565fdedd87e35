//! This module contains the synthetic frame used to bootstrap an entry
//! point: it allocates symbolic stand-ins for the receiver and arguments,
//! records the entry markers, and invokes the entry method.

use crate::{
    ctx::{ExecutionContext, Interrupt, StepResult},
    error::execution::Error,
    memory::stack::StackValue,
    signature::{QualifiedMethodSignature, TypeSignature},
    trace::TraceRecord,
};

/// The instructions a synthetic frame can execute.
#[derive(Clone, Debug)]
pub enum SyntheticInstruction {
    /// Allocates a symbolic value of the provided type onto the operand
    /// stack.
    AllocateSymbolic(TypeSignature),

    /// Records the entry-point marker.
    RecordEntryMethod(QualifiedMethodSignature),

    /// Records the value on top of the stack as the entry receiver.
    RecordEntryScope,

    /// Records the value on top of the stack as one entry argument.
    RecordEntryParameter,

    /// Invokes the entry method, consuming the receiver and arguments from
    /// the operand stack.
    InvokeEntry {
        signature: QualifiedMethodSignature,
        is_static: bool,
    },
}

/// A frame executing synthetic bootstrap instructions.
#[derive(Clone, Debug)]
pub struct SyntheticFrame {
    /// A label describing the frame's purpose, for logging.
    pub label: &'static str,

    /// The pending instruction stack.
    pub instructions: Vec<SyntheticInstruction>,

    /// The operand stack.
    pub operands: Vec<StackValue>,
}

impl SyntheticFrame {
    /// Constructs a new, empty synthetic frame.
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            instructions: Vec::new(),
            operands: Vec::new(),
        }
    }

    /// Checks whether this frame has run out of instructions.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Executes the next pending instruction.
    pub(crate) fn execute_next(&mut self, ctx: &mut ExecutionContext) -> StepResult {
        let instruction = self
            .instructions
            .pop()
            .expect("execute_next must not be called on a finished frame");

        match instruction {
            SyntheticInstruction::AllocateSymbolic(ty) => {
                let value = ctx.heap.allocate_symbolic(&ty);
                self.operands.push(value);
                Ok(())
            }
            SyntheticInstruction::RecordEntryMethod(signature) => {
                ctx.records.push(TraceRecord::EntryMethod { signature });
                Ok(())
            }
            SyntheticInstruction::RecordEntryScope => {
                let value = self
                    .operands
                    .last()
                    .ok_or(Interrupt::Fatal(Error::OperandStackUnderflow))?;
                let reference = value.as_reference().ok_or_else(|| {
                    Interrupt::Fatal(Error::UnexpectedOperand {
                        expected: "a reference for the entry receiver",
                        found: value.label(),
                    })
                })?;
                ctx.records.push(TraceRecord::EntryScope { reference });
                Ok(())
            }
            SyntheticInstruction::RecordEntryParameter => {
                let value = self
                    .operands
                    .last()
                    .cloned()
                    .ok_or(Interrupt::Fatal(Error::OperandStackUnderflow))?;
                ctx.records.push(TraceRecord::EntryParameter { value });
                Ok(())
            }
            SyntheticInstruction::InvokeEntry {
                signature,
                is_static,
            } => {
                let count = signature.method.argument_types.len();
                let mut arguments = Vec::with_capacity(count);
                for _ in 0..count {
                    arguments.push(
                        self.operands
                            .pop()
                            .ok_or(Interrupt::Fatal(Error::OperandStackUnderflow))?,
                    );
                }
                arguments.reverse();

                let receiver = if is_static {
                    None
                } else {
                    let value = self
                        .operands
                        .pop()
                        .ok_or(Interrupt::Fatal(Error::OperandStackUnderflow))?;
                    Some(value.as_reference().ok_or_else(|| {
                        Interrupt::Fatal(Error::UnexpectedOperand {
                            expected: "a reference for the entry receiver",
                            found: value.label(),
                        })
                    })?)
                };

                ctx.invoke(&signature, receiver, arguments, &mut self.operands)
            }
        }
    }
}
