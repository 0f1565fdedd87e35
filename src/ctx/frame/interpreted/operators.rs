//! This module contains the semantics of the primitive operators: concrete
//! evaluation under the numeric widening precedence, deferral to computed
//! values when an operand is not concrete, and the lowering of `+` on
//! references to string concatenation.

use crate::{
    ctx::{ExecutionContext, Interrupt, StepResult},
    error::execution::Error,
    memory::{
        heap::{HeapValue, StringValue},
        stack::{
            BinaryOperator,
            ComputedValue,
            PrimitiveLiteral,
            ReferenceValue,
            StackType,
            StackValue,
        },
    },
    trace::TraceRecord,
};

/// Applies a binary operator to two operands.
///
/// Concrete operand pairs are computed immediately; any other pair defers to
/// a computed value. Either way, one `StackTransformation` record is appended
/// (string concatenation appends its own records instead).
pub(crate) fn binary(
    ctx: &mut ExecutionContext,
    operator: BinaryOperator,
    lhs: StackValue,
    rhs: StackValue,
) -> StepResult<StackValue> {
    // Reference equality compares heap identifiers directly.
    if matches!(operator, BinaryOperator::Equals | BinaryOperator::NotEquals) {
        if let (Some(left), Some(right)) = (lhs.as_reference(), rhs.as_reference()) {
            let equal = left.id() == right.id();
            let value = match operator {
                BinaryOperator::Equals => equal,
                _ => !equal,
            };
            let result = ctx.new_concrete(PrimitiveLiteral::Boolean(value));
            ctx.records.push(TraceRecord::StackTransformation {
                lhs,
                rhs,
                result: result.clone(),
                operator,
            });
            return Ok(result);
        }
    }

    // `+` over a string reference is concatenation.
    if operator == BinaryOperator::Add && involves_string(ctx, &lhs)? | involves_string(ctx, &rhs)? {
        return concat(ctx, &lhs, &rhs);
    }

    // Unbox boxed operands so that arithmetic over wrappers behaves like
    // arithmetic over their payloads.
    let lhs = unbox(ctx, lhs)?;
    let rhs = unbox(ctx, rhs)?;

    let result = match (&lhs, &rhs) {
        (StackValue::Concrete(left), StackValue::Concrete(right)) => {
            compute_concrete(ctx, operator, left.literal, right.literal)?
        }
        _ => StackValue::Computed(ComputedValue::BinaryOperation {
            ty: result_type(operator, &lhs, &rhs)?,
            lhs: Box::new(lhs.clone()),
            rhs: Box::new(rhs.clone()),
            operator,
        }),
    };

    ctx.records.push(TraceRecord::StackTransformation {
        lhs,
        rhs,
        result: result.clone(),
        operator,
    });
    Ok(result)
}

/// Applies logical negation to an operand.
pub(crate) fn not(ctx: &mut ExecutionContext, value: StackValue) -> StepResult<StackValue> {
    let input = unbox(ctx, value)?;
    let output = match &input {
        StackValue::Concrete(concrete) => match concrete.literal {
            PrimitiveLiteral::Boolean(value) => {
                ctx.new_concrete(PrimitiveLiteral::Boolean(!value))
            }
            other => {
                return Err(Interrupt::Fatal(Error::UnexpectedOperand {
                    expected: "a boolean for negation",
                    found: other.to_string(),
                }))
            }
        },
        _ => StackValue::Computed(ComputedValue::Not {
            inner: Box::new(input.clone()),
        }),
    };

    ctx.records.push(TraceRecord::NotValueTransformation {
        input,
        output: output.clone(),
    });
    Ok(output)
}

/// Converts a concrete literal to the provided stack type for a primitive
/// cast. Narrowing truncates, as the cast semantic requires.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn convert_literal(literal: PrimitiveLiteral, target: StackType) -> PrimitiveLiteral {
    match target {
        StackType::Boolean => PrimitiveLiteral::Boolean(literal.as_i64() != 0),
        StackType::Byte => PrimitiveLiteral::Byte(literal.as_i64() as i8),
        StackType::Short => PrimitiveLiteral::Short(literal.as_i64() as i16),
        StackType::Char => PrimitiveLiteral::Char(
            u32::try_from(literal.as_i64() & 0xFFFF)
                .ok()
                .and_then(char::from_u32)
                .unwrap_or('\0'),
        ),
        StackType::Int => PrimitiveLiteral::Int(literal.as_i32()),
        StackType::Long => PrimitiveLiteral::Long(literal.as_i64()),
        StackType::Float => PrimitiveLiteral::Float(literal.as_f64() as f32),
        StackType::Double => PrimitiveLiteral::Double(literal.as_f64()),
        StackType::Reference => literal,
    }
}

/// Checks whether a value is a reference to a boxed string.
fn involves_string(ctx: &ExecutionContext, value: &StackValue) -> StepResult<bool> {
    match value.as_reference() {
        Some(ReferenceValue::Nil) | None => Ok(false),
        Some(reference) => Ok(matches!(
            ctx.heap.dereference(reference)?,
            HeapValue::BoxedString { .. }
        )),
    }
}

/// Replaces a reference to a boxed stack value with its payload; other values
/// pass through unchanged.
fn unbox(ctx: &ExecutionContext, value: StackValue) -> StepResult<StackValue> {
    match value.as_reference() {
        Some(reference) if !reference.is_nil() => match ctx.heap.dereference(reference)? {
            HeapValue::BoxedStackValue { value, .. } => Ok(value.clone()),
            _ => Ok(value),
        },
        _ => Ok(value),
    }
}

/// Produces the string value of an operand for concatenation, recording the
/// stringification of anything that is not already a string.
fn string_value_of(ctx: &mut ExecutionContext, value: &StackValue) -> StepResult<StringValue> {
    match value.as_reference() {
        Some(ReferenceValue::Nil) => Ok(StringValue::Concrete("null".to_string())),
        Some(reference) => {
            let string = match ctx.heap.dereference(reference)? {
                HeapValue::BoxedString { value, .. } => return Ok(value.clone()),
                HeapValue::BoxedStackValue { value, .. } => match value {
                    StackValue::Concrete(concrete) => {
                        StringValue::Concrete(plain_text(concrete.literal))
                    }
                    other => StringValue::FromStackValue(other.clone()),
                },
                _ => StringValue::FromStackValue(StackValue::Reference(reference)),
            };
            ctx.records.push(TraceRecord::Stringification {
                value: value.clone(),
                result: string.clone(),
            });
            Ok(string)
        }
        None => {
            let string = match value {
                StackValue::Concrete(concrete) => StringValue::Concrete(plain_text(concrete.literal)),
                other => StringValue::FromStackValue(other.clone()),
            };
            ctx.records.push(TraceRecord::Stringification {
                value: value.clone(),
                result: string.clone(),
            });
            Ok(string)
        }
    }
}

/// Concatenates two operands as strings, producing a fresh boxed string.
fn concat(
    ctx: &mut ExecutionContext,
    lhs: &StackValue,
    rhs: &StackValue,
) -> StepResult<StackValue> {
    let left = string_value_of(ctx, lhs)?;
    let right = string_value_of(ctx, rhs)?;

    let result = match (&left, &right) {
        (StringValue::Concrete(l), StringValue::Concrete(r)) => {
            StringValue::Concrete(format!("{l}{r}"))
        }
        _ => StringValue::Composite {
            lhs: Box::new(left.clone()),
            rhs: Box::new(right.clone()),
        },
    };

    ctx.records.push(TraceRecord::StringConcat {
        lhs: left,
        rhs: right,
        result: result.clone(),
    });

    let reference = ctx.heap.allocate_string(result);
    Ok(StackValue::Reference(reference))
}

/// The textual form a value takes when stringified.
fn plain_text(literal: PrimitiveLiteral) -> String {
    match literal {
        PrimitiveLiteral::Boolean(value) => value.to_string(),
        PrimitiveLiteral::Byte(value) => value.to_string(),
        PrimitiveLiteral::Short(value) => value.to_string(),
        PrimitiveLiteral::Char(value) => value.to_string(),
        PrimitiveLiteral::Int(value) => value.to_string(),
        PrimitiveLiteral::Long(value) => value.to_string(),
        PrimitiveLiteral::Float(value) => value.to_string(),
        PrimitiveLiteral::Double(value) => value.to_string(),
    }
}

/// The widening rank of a numeric stack type, wider types ranking higher.
/// `char` ranks as `int`.
fn numeric_rank(ty: StackType) -> Option<u8> {
    let rank = match ty {
        StackType::Byte => 1,
        StackType::Short => 2,
        StackType::Char | StackType::Int => 3,
        StackType::Long => 4,
        StackType::Float => 5,
        StackType::Double => 6,
        StackType::Boolean | StackType::Reference => return None,
    };
    Some(rank)
}

fn widened_type(lhs: StackType, rhs: StackType) -> Option<StackType> {
    let left = numeric_rank(lhs)?;
    let right = numeric_rank(rhs)?;
    let widest = left.max(right);
    let ty = match widest {
        1 => StackType::Byte,
        2 => StackType::Short,
        3 => StackType::Int,
        4 => StackType::Long,
        5 => StackType::Float,
        _ => StackType::Double,
    };
    Some(ty)
}

/// The static result type of a deferred binary operation.
fn result_type(
    operator: BinaryOperator,
    lhs: &StackValue,
    rhs: &StackValue,
) -> StepResult<StackType> {
    if operator.is_comparison() {
        return Ok(StackType::Boolean);
    }

    let left = lhs.stack_type();
    let right = rhs.stack_type();
    if left == StackType::Boolean && right == StackType::Boolean {
        return Ok(StackType::Boolean);
    }

    widened_type(left, right).ok_or(Interrupt::Fatal(Error::UnexpectedOperand {
        expected: "numeric operands",
        found: format!("{left:?} and {right:?}"),
    }))
}

/// Computes a binary operation over two concrete literals under the widening
/// precedence: `char` widens to `int`; among the remaining numerics the
/// widest present type wins (double > float > long > int > short > byte).
/// Booleans never mix with numerics.
fn compute_concrete(
    ctx: &mut ExecutionContext,
    operator: BinaryOperator,
    lhs: PrimitiveLiteral,
    rhs: PrimitiveLiteral,
) -> StepResult<StackValue> {
    use BinaryOperator as Op;

    let lhs_boolean = matches!(lhs, PrimitiveLiteral::Boolean(_));
    let rhs_boolean = matches!(rhs, PrimitiveLiteral::Boolean(_));

    // Boolean pairs support the logical and equality operators only.
    if lhs_boolean && rhs_boolean {
        let (PrimitiveLiteral::Boolean(l), PrimitiveLiteral::Boolean(r)) = (lhs, rhs) else {
            unreachable!("Both operands were just matched as booleans");
        };
        let value = match operator {
            Op::And => l & r,
            Op::Or => l | r,
            Op::Xor => l ^ r,
            Op::Equals => l == r,
            Op::NotEquals => l != r,
            _ => {
                return Err(Interrupt::Fatal(Error::UnexpectedOperand {
                    expected: "numeric operands",
                    found: format!("{lhs} and {rhs}"),
                }))
            }
        };
        return Ok(ctx.new_concrete(PrimitiveLiteral::Boolean(value)));
    }

    if lhs_boolean || rhs_boolean {
        return Err(Interrupt::Fatal(Error::UnexpectedOperand {
            expected: "operands of matching kinds",
            found: format!("{lhs} and {rhs}"),
        }));
    }

    // Comparisons evaluate over the widened double view.
    if operator.is_comparison() {
        let l = lhs.as_f64();
        let r = rhs.as_f64();
        #[allow(clippy::float_cmp)] // Exact equality is the comparison semantic
        let value = match operator {
            Op::Equals => l == r,
            Op::NotEquals => l != r,
            Op::Less => l < r,
            Op::Greater => l > r,
            Op::LessEquals => l <= r,
            Op::GreaterEquals => l >= r,
            _ => unreachable!("Only comparisons reach this point"),
        };
        return Ok(ctx.new_concrete(PrimitiveLiteral::Boolean(value)));
    }

    let target = widened_type(lhs.stack_type(), rhs.stack_type()).ok_or(Interrupt::Fatal(
        Error::UnexpectedOperand {
            expected: "numeric operands",
            found: format!("{lhs} and {rhs}"),
        },
    ))?;

    // Integer division and remainder by zero terminate the path the way the
    // modeled language would.
    if matches!(operator, Op::Divide | Op::Remainder)
        && matches!(target, StackType::Byte | StackType::Short | StackType::Int | StackType::Long)
        && rhs.as_i64() == 0
    {
        return Err(Interrupt::Halt("Arithmetic exception: division by zero".into()));
    }

    #[allow(clippy::cast_possible_truncation)] // Results narrow to the widened type
    let literal = match target {
        StackType::Double => {
            let (l, r) = (lhs.as_f64(), rhs.as_f64());
            let value = match operator {
                Op::Add => l + r,
                Op::Subtract => l - r,
                Op::Multiply => l * r,
                Op::Divide => l / r,
                Op::Remainder => l % r,
                _ => return integral_only(operator, lhs, rhs),
            };
            PrimitiveLiteral::Double(value)
        }
        StackType::Float => {
            let (l, r) = (lhs.as_f64() as f32, rhs.as_f64() as f32);
            let value = match operator {
                Op::Add => l + r,
                Op::Subtract => l - r,
                Op::Multiply => l * r,
                Op::Divide => l / r,
                Op::Remainder => l % r,
                _ => return integral_only(operator, lhs, rhs),
            };
            PrimitiveLiteral::Float(value)
        }
        StackType::Long => PrimitiveLiteral::Long(integral_compute(operator, lhs.as_i64(), rhs.as_i64())?),
        StackType::Int => PrimitiveLiteral::Int(
            integral_compute(operator, lhs.as_i64(), rhs.as_i64())? as i32,
        ),
        StackType::Short => PrimitiveLiteral::Short(
            integral_compute(operator, lhs.as_i64(), rhs.as_i64())? as i16,
        ),
        StackType::Byte => PrimitiveLiteral::Byte(
            integral_compute(operator, lhs.as_i64(), rhs.as_i64())? as i8,
        ),
        StackType::Boolean | StackType::Char | StackType::Reference => {
            unreachable!("Widening never targets these types")
        }
    };

    Ok(ctx.new_concrete(literal))
}

fn integral_only(
    operator: BinaryOperator,
    lhs: PrimitiveLiteral,
    rhs: PrimitiveLiteral,
) -> StepResult<StackValue> {
    Err(Interrupt::Fatal(Error::UnexpectedOperand {
        expected: "integral operands",
        found: format!("{lhs} {} {rhs}", operator.symbol()),
    }))
}

fn integral_compute(operator: BinaryOperator, l: i64, r: i64) -> StepResult<i64> {
    use BinaryOperator as Op;

    let value = match operator {
        Op::Add => l.wrapping_add(r),
        Op::Subtract => l.wrapping_sub(r),
        Op::Multiply => l.wrapping_mul(r),
        Op::Divide => l.wrapping_div(r),
        Op::Remainder => l.wrapping_rem(r),
        Op::ShiftLeft => l.wrapping_shl(u32::try_from(r & 0x3F).unwrap_or(0)),
        Op::ShiftRight => l.wrapping_shr(u32::try_from(r & 0x3F).unwrap_or(0)),
        Op::ShiftRightUnsigned => {
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
            let shifted = ((l as u64) >> (r & 0x3F)) as i64;
            shifted
        }
        Op::And => l & r,
        Op::Or => l | r,
        Op::Xor => l ^ r,
        _ => {
            return Err(Interrupt::Fatal(Error::UnexpectedOperand {
                expected: "an integral operator",
                found: operator.symbol().to_string(),
            }))
        }
    };
    Ok(value)
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        ctx::frame::interpreted::operators::{binary, convert_literal, widened_type},
        ctx::ExecutionContext,
        interpreter::Config,
        memory::stack::{BinaryOperator, PrimitiveLiteral, StackType, StackValue},
        resolve::MapResolver,
    };

    fn context() -> ExecutionContext {
        let resolver = Arc::new(MapResolver::new());
        ExecutionContext::new(Config::default(), resolver.clone(), resolver)
    }

    fn literal(ctx: &mut ExecutionContext, literal: PrimitiveLiteral) -> StackValue {
        ctx.new_concrete(literal)
    }

    #[test]
    fn concrete_evaluation_widens_regardless_of_operand_order() -> anyhow::Result<()> {
        let mut ctx = context();

        for (lhs, rhs) in [
            (PrimitiveLiteral::Int(2), PrimitiveLiteral::Double(3.5)),
            (PrimitiveLiteral::Double(3.5), PrimitiveLiteral::Int(2)),
        ] {
            let l = literal(&mut ctx, lhs);
            let r = literal(&mut ctx, rhs);
            let result = binary(&mut ctx, BinaryOperator::Add, l, r)
                .map_err(|interrupt| anyhow::anyhow!("{interrupt:?}"))?;
            match result {
                StackValue::Concrete(concrete) => {
                    assert_eq!(concrete.literal, PrimitiveLiteral::Double(5.5));
                }
                other => panic!("expected a concrete double, got {other:?}"),
            }
        }

        Ok(())
    }

    #[test]
    fn char_operands_compute_as_ints() -> anyhow::Result<()> {
        let mut ctx = context();
        let c = literal(&mut ctx, PrimitiveLiteral::Char('A'));
        let one = literal(&mut ctx, PrimitiveLiteral::Int(1));

        let result = binary(&mut ctx, BinaryOperator::Add, c, one)
            .map_err(|interrupt| anyhow::anyhow!("{interrupt:?}"))?;
        match result {
            StackValue::Concrete(concrete) => {
                assert_eq!(concrete.literal, PrimitiveLiteral::Int(66));
            }
            other => panic!("expected a concrete int, got {other:?}"),
        }

        Ok(())
    }

    #[test]
    fn the_widest_present_type_wins_regardless_of_order() {
        assert_eq!(
            widened_type(StackType::Int, StackType::Double),
            Some(StackType::Double)
        );
        assert_eq!(
            widened_type(StackType::Double, StackType::Int),
            Some(StackType::Double)
        );
        assert_eq!(
            widened_type(StackType::Byte, StackType::Byte),
            Some(StackType::Byte)
        );
        assert_eq!(
            widened_type(StackType::Float, StackType::Long),
            Some(StackType::Float)
        );
    }

    #[test]
    fn char_widens_to_int() {
        assert_eq!(
            widened_type(StackType::Char, StackType::Byte),
            Some(StackType::Int)
        );
        assert_eq!(
            widened_type(StackType::Char, StackType::Char),
            Some(StackType::Int)
        );
    }

    #[test]
    fn booleans_never_mix_with_numerics() {
        assert_eq!(widened_type(StackType::Boolean, StackType::Int), None);
    }

    #[test]
    fn literal_conversion_narrows() {
        assert_eq!(
            convert_literal(PrimitiveLiteral::Double(3.9), StackType::Int),
            PrimitiveLiteral::Int(3)
        );
        assert_eq!(
            convert_literal(PrimitiveLiteral::Int(65), StackType::Char),
            PrimitiveLiteral::Char('A')
        );
    }
}
