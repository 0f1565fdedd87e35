//! This module contains the bytecode execution frame: the frame kind that
//! fetches raw bytecode one opcode at a time through a dispatch table keyed
//! by hex opcode.
//!
//! Only a subset of the instruction set is modeled — constants, local loads
//! and stores, stack management, arithmetic, conversions, comparisons with
//! the fork algorithm, and returns. Unimplemented opcodes fail fast rather
//! than being silently misinterpreted. Symbolic conditions at the conditional
//! branches fork exactly as in the interpreted frame, with the branch's code
//! offset as its bounded branch site.

use std::sync::Arc;

use crate::{
    ctx::{
        frame::interpreted::operators,
        BranchSite,
        ExecutionContext,
        Interrupt,
        StepResult,
    },
    error::execution::Error,
    memory::stack::{
        BinaryOperator,
        ComputedValue,
        PrimitiveLiteral,
        StackType,
        StackValue,
    },
    signature::QualifiedMethodSignature,
    trace::TraceRecord,
};

/// A frame executing raw bytecode.
#[derive(Clone, Debug)]
pub struct BytecodeFrame {
    /// The method this frame executes.
    pub method: QualifiedMethodSignature,

    /// The raw code attribute bytes.
    code: Arc<[u8]>,

    /// The program counter into `code`.
    pc: usize,

    /// The operand stack.
    pub operands: Vec<StackValue>,

    /// The local variable slots, grown on demand.
    pub locals: Vec<StackValue>,
}

impl BytecodeFrame {
    /// Constructs a frame over `code` with the provided initial local slots
    /// (the receiver, if any, followed by the arguments).
    #[must_use]
    pub fn new(method: QualifiedMethodSignature, code: Arc<[u8]>, locals: Vec<StackValue>) -> Self {
        Self {
            method,
            code,
            pc: 0,
            operands: Vec::new(),
            locals,
        }
    }

    /// Checks whether the program counter has run off the end of the code.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.pc >= self.code.len()
    }

    /// Gets the current program counter.
    #[must_use]
    pub fn pc(&self) -> usize {
        self.pc
    }

    fn pop(&mut self) -> StepResult<StackValue> {
        self.operands
            .pop()
            .ok_or(Interrupt::Fatal(Error::OperandStackUnderflow))
    }

    fn byte_at(&self, offset: usize) -> StepResult<u8> {
        self.code
            .get(offset)
            .copied()
            .ok_or(Interrupt::Fatal(Error::UnsupportedOpcode {
                opcode: 0,
                offset,
            }))
    }

    fn operand_i16(&self, offset: usize) -> StepResult<i16> {
        let high = self.byte_at(offset)?;
        let low = self.byte_at(offset + 1)?;
        Ok(i16::from_be_bytes([high, low]))
    }

    fn load_local(&mut self, ctx: &mut ExecutionContext, index: usize) -> StackValue {
        if index >= self.locals.len() {
            self.locals
                .resize_with(index + 1, || ctx.new_concrete(PrimitiveLiteral::Int(0)));
        }
        self.locals[index].clone()
    }

    fn store_local(&mut self, ctx: &mut ExecutionContext, index: usize, value: StackValue) {
        if index >= self.locals.len() {
            self.locals
                .resize_with(index + 1, || ctx.new_concrete(PrimitiveLiteral::Int(0)));
        }
        self.locals[index] = value;
    }

    fn push_constant(&mut self, ctx: &mut ExecutionContext, literal: PrimitiveLiteral) {
        let value = ctx.new_concrete(literal);
        self.operands.push(value);
    }

    fn arithmetic(&mut self, ctx: &mut ExecutionContext, operator: BinaryOperator) -> StepResult {
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        let result = operators::binary(ctx, operator, lhs, rhs)?;
        self.operands.push(result);
        self.pc += 1;
        Ok(())
    }

    fn negate(&mut self, ctx: &mut ExecutionContext) -> StepResult {
        let value = self.pop()?;
        let zero = ctx.new_concrete(PrimitiveLiteral::Int(0));
        let result = operators::binary(ctx, BinaryOperator::Subtract, zero, value)?;
        self.operands.push(result);
        self.pc += 1;
        Ok(())
    }

    fn convert(&mut self, ctx: &mut ExecutionContext, target: StackType) -> StepResult {
        let input = self.pop()?;
        let output = match &input {
            StackValue::Concrete(concrete) => {
                let literal = operators::convert_literal(concrete.literal, target);
                ctx.new_concrete(literal)
            }
            _ => StackValue::Computed(ComputedValue::Cast {
                inner: Box::new(input.clone()),
                ty: target,
            }),
        };
        ctx.records.push(TraceRecord::StackCast {
            input,
            output: output.clone(),
        });
        self.operands.push(output);
        self.pc += 1;
        Ok(())
    }

    /// Takes or skips a conditional branch on the provided condition value,
    /// forking when the condition is not concrete.
    fn branch(
        &mut self,
        ctx: &mut ExecutionContext,
        condition: &StackValue,
        target: usize,
        fall_through: usize,
    ) -> StepResult {
        #[allow(clippy::cast_possible_truncation)]
        let site = BranchSite::Bytecode(self.pc as u32);

        match condition.as_concrete_boolean() {
            Some(true) => {
                self.pc = target;
                Ok(())
            }
            Some(false) => {
                self.pc = fall_through;
                Ok(())
            }
            None => {
                ctx.fork_branch(&*self, site, condition, move |_, child: &mut BytecodeFrame| {
                    child.pc = target;
                });
                self.pc = fall_through;
                Ok(())
            }
        }
    }

    /// Computes the absolute target of a relative signed 16-bit branch
    /// offset.
    fn branch_target(&self, offset: i16) -> usize {
        self.pc.wrapping_add_signed(isize::from(offset))
    }

    fn conditional_zero(
        &mut self,
        ctx: &mut ExecutionContext,
        operator: BinaryOperator,
    ) -> StepResult {
        let offset = self.operand_i16(self.pc + 1)?;
        let value = self.pop()?;
        let zero = ctx.new_concrete(PrimitiveLiteral::Int(0));
        let condition = operators::binary(ctx, operator, value, zero)?;
        let target = self.branch_target(offset);
        let fall_through = self.pc + 3;
        self.branch(ctx, &condition, target, fall_through)
    }

    fn conditional_compare(
        &mut self,
        ctx: &mut ExecutionContext,
        operator: BinaryOperator,
    ) -> StepResult {
        let offset = self.operand_i16(self.pc + 1)?;
        let rhs = self.pop()?;
        let lhs = self.pop()?;
        let condition = operators::binary(ctx, operator, lhs, rhs)?;
        let target = self.branch_target(offset);
        let fall_through = self.pc + 3;
        self.branch(ctx, &condition, target, fall_through)
    }

    /// Executes the opcode at the current program counter.
    #[allow(clippy::too_many_lines)] // The dispatch table is clearest in one place
    pub(crate) fn execute_next(&mut self, ctx: &mut ExecutionContext) -> StepResult {
        let opcode = self.byte_at(self.pc)?;

        match opcode {
            // nop
            0x00 => {
                self.pc += 1;
                Ok(())
            }

            // aconst_null
            0x01 => {
                self.operands
                    .push(StackValue::Reference(crate::memory::stack::ReferenceValue::Nil));
                self.pc += 1;
                Ok(())
            }

            // iconst_m1 .. iconst_5
            0x02..=0x08 => {
                let value = i32::from(opcode) - 0x03;
                self.push_constant(ctx, PrimitiveLiteral::Int(value));
                self.pc += 1;
                Ok(())
            }

            // lconst_0, lconst_1
            0x09 | 0x0a => {
                self.push_constant(ctx, PrimitiveLiteral::Long(i64::from(opcode - 0x09)));
                self.pc += 1;
                Ok(())
            }

            // fconst_0 .. fconst_2
            0x0b..=0x0d => {
                #[allow(clippy::cast_lossless)]
                self.push_constant(ctx, PrimitiveLiteral::Float((opcode - 0x0b) as f32));
                self.pc += 1;
                Ok(())
            }

            // dconst_0, dconst_1
            0x0e | 0x0f => {
                self.push_constant(ctx, PrimitiveLiteral::Double(f64::from(opcode - 0x0e)));
                self.pc += 1;
                Ok(())
            }

            // bipush
            0x10 => {
                #[allow(clippy::cast_possible_wrap)]
                let value = self.byte_at(self.pc + 1)? as i8;
                self.push_constant(ctx, PrimitiveLiteral::Int(i32::from(value)));
                self.pc += 2;
                Ok(())
            }

            // sipush
            0x11 => {
                let value = self.operand_i16(self.pc + 1)?;
                self.push_constant(ctx, PrimitiveLiteral::Int(i32::from(value)));
                self.pc += 3;
                Ok(())
            }

            // iload, lload, fload, dload, aload
            0x15..=0x19 => {
                let index = usize::from(self.byte_at(self.pc + 1)?);
                let value = self.load_local(ctx, index);
                self.operands.push(value);
                self.pc += 2;
                Ok(())
            }

            // iload_0 .. aload_3
            0x1a..=0x2d => {
                let index = usize::from((opcode - 0x1a) % 4);
                let value = self.load_local(ctx, index);
                self.operands.push(value);
                self.pc += 1;
                Ok(())
            }

            // istore, lstore, fstore, dstore, astore
            0x36..=0x3a => {
                let index = usize::from(self.byte_at(self.pc + 1)?);
                let value = self.pop()?;
                self.store_local(ctx, index, value);
                self.pc += 2;
                Ok(())
            }

            // istore_0 .. astore_3
            0x3b..=0x4e => {
                let index = usize::from((opcode - 0x3b) % 4);
                let value = self.pop()?;
                self.store_local(ctx, index, value);
                self.pc += 1;
                Ok(())
            }

            // pop
            0x57 => {
                self.pop()?;
                self.pc += 1;
                Ok(())
            }

            // dup
            0x59 => {
                let value = self.pop()?;
                self.operands.push(value.clone());
                self.operands.push(value);
                self.pc += 1;
                Ok(())
            }

            // swap
            0x5f => {
                let first = self.pop()?;
                let second = self.pop()?;
                self.operands.push(first);
                self.operands.push(second);
                self.pc += 1;
                Ok(())
            }

            // iadd .. dadd
            0x60..=0x63 => self.arithmetic(ctx, BinaryOperator::Add),
            // isub .. dsub
            0x64..=0x67 => self.arithmetic(ctx, BinaryOperator::Subtract),
            // imul .. dmul
            0x68..=0x6b => self.arithmetic(ctx, BinaryOperator::Multiply),
            // idiv .. ddiv
            0x6c..=0x6f => self.arithmetic(ctx, BinaryOperator::Divide),
            // irem .. drem
            0x70..=0x73 => self.arithmetic(ctx, BinaryOperator::Remainder),
            // ineg .. dneg
            0x74..=0x77 => self.negate(ctx),
            // ishl, lshl
            0x78 | 0x79 => self.arithmetic(ctx, BinaryOperator::ShiftLeft),
            // ishr, lshr
            0x7a | 0x7b => self.arithmetic(ctx, BinaryOperator::ShiftRight),
            // iushr, lushr
            0x7c | 0x7d => self.arithmetic(ctx, BinaryOperator::ShiftRightUnsigned),
            // iand, land
            0x7e | 0x7f => self.arithmetic(ctx, BinaryOperator::And),
            // ior, lor
            0x80 | 0x81 => self.arithmetic(ctx, BinaryOperator::Or),
            // ixor, lxor
            0x82 | 0x83 => self.arithmetic(ctx, BinaryOperator::Xor),

            // iinc
            0x84 => {
                let index = usize::from(self.byte_at(self.pc + 1)?);
                #[allow(clippy::cast_possible_wrap)]
                let constant = self.byte_at(self.pc + 2)? as i8;
                let current = self.load_local(ctx, index);
                let increment = ctx.new_concrete(PrimitiveLiteral::Int(i32::from(constant)));
                let updated = operators::binary(ctx, BinaryOperator::Add, current, increment)?;
                self.store_local(ctx, index, updated);
                self.pc += 3;
                Ok(())
            }

            // i2l, i2f, i2d
            0x85 => self.convert(ctx, StackType::Long),
            0x86 => self.convert(ctx, StackType::Float),
            0x87 => self.convert(ctx, StackType::Double),
            // l2i, l2f, l2d
            0x88 => self.convert(ctx, StackType::Int),
            0x89 => self.convert(ctx, StackType::Float),
            0x8a => self.convert(ctx, StackType::Double),
            // f2i, f2l, f2d
            0x8b => self.convert(ctx, StackType::Int),
            0x8c => self.convert(ctx, StackType::Long),
            0x8d => self.convert(ctx, StackType::Double),
            // d2i, d2l, d2f
            0x8e => self.convert(ctx, StackType::Int),
            0x8f => self.convert(ctx, StackType::Long),
            0x90 => self.convert(ctx, StackType::Float),
            // i2b, i2c, i2s
            0x91 => self.convert(ctx, StackType::Byte),
            0x92 => self.convert(ctx, StackType::Char),
            0x93 => self.convert(ctx, StackType::Short),

            // ifeq .. ifle
            0x99 => self.conditional_zero(ctx, BinaryOperator::Equals),
            0x9a => self.conditional_zero(ctx, BinaryOperator::NotEquals),
            0x9b => self.conditional_zero(ctx, BinaryOperator::Less),
            0x9c => self.conditional_zero(ctx, BinaryOperator::GreaterEquals),
            0x9d => self.conditional_zero(ctx, BinaryOperator::Greater),
            0x9e => self.conditional_zero(ctx, BinaryOperator::LessEquals),

            // if_icmpeq .. if_icmple
            0x9f => self.conditional_compare(ctx, BinaryOperator::Equals),
            0xa0 => self.conditional_compare(ctx, BinaryOperator::NotEquals),
            0xa1 => self.conditional_compare(ctx, BinaryOperator::Less),
            0xa2 => self.conditional_compare(ctx, BinaryOperator::GreaterEquals),
            0xa3 => self.conditional_compare(ctx, BinaryOperator::Greater),
            0xa4 => self.conditional_compare(ctx, BinaryOperator::LessEquals),
            // if_acmpeq, if_acmpne
            0xa5 => self.conditional_compare(ctx, BinaryOperator::Equals),
            0xa6 => self.conditional_compare(ctx, BinaryOperator::NotEquals),

            // goto
            0xa7 => {
                let offset = self.operand_i16(self.pc + 1)?;
                self.pc = self.branch_target(offset);
                Ok(())
            }

            // ireturn .. areturn
            0xac..=0xb0 => {
                let value = self.pop()?;
                Err(Interrupt::Return(Some(value)))
            }

            // return
            0xb1 => Err(Interrupt::Return(None)),

            opcode => Err(Interrupt::Fatal(Error::UnsupportedOpcode {
                opcode,
                offset: self.pc,
            })),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        ctx::frame::bytecode::BytecodeFrame,
        signature::{
            ClassSignature,
            MethodSignature,
            PrimitiveKind,
            QualifiedMethodSignature,
            TypeSignature,
        },
    };

    fn frame(code: &[u8]) -> BytecodeFrame {
        let method = QualifiedMethodSignature::new(
            ClassSignature::new("foo/Bar"),
            MethodSignature::new("run", vec![], TypeSignature::Primitive(PrimitiveKind::Int)),
        );
        BytecodeFrame::new(method, Arc::from(code.to_vec().into_boxed_slice()), vec![])
    }

    #[test]
    fn branch_targets_are_relative_to_the_branch_opcode() {
        let mut f = frame(&[0x00, 0x00, 0x00, 0x00, 0x00]);
        f.pc = 1;
        assert_eq!(f.branch_target(3), 4);
        assert_eq!(f.branch_target(-1), 0);
    }

    #[test]
    fn a_frame_finishes_when_the_counter_runs_off_the_code() {
        let mut f = frame(&[0x00]);
        assert!(!f.is_finished());
        f.pc = 1;
        assert!(f.is_finished());
    }
}
