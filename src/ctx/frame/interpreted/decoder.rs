//! This module contains the single-pass decoder that lowers the AST into the
//! flat instruction set.
//!
//! Decoding is lazy: a `DecodeStatement`/`DecodeExpression` instruction runs
//! the decoder for one node, pushing the lowered instructions (and further
//! decode instructions for child nodes) onto the frame's instruction stack.
//! Instructions execute from the back of that stack, so everything here is
//! pushed in reverse execution order.
//!
//! Assignment targets are decoded by re-visiting the left-hand side in store
//! mode. Constructs with no modeled instruction fail fast with an
//! unsupported-feature error: it is better to abort an analysis than to
//! silently misinterpret it.

use std::sync::Arc;

use crate::{
    ast::{CallKind, Expression, PostfixOperator, PrefixOperator, Statement},
    ctx::{
        frame::interpreted::{
            instruction::{for_continuation, while_continuation},
            BreakScope,
            ContinueScope,
            ExceptionHandler,
            ExceptionScope,
            Instruction,
            InterpretedFrame,
            Watermarks,
        },
        ExecutionContext,
        Interrupt,
        StepResult,
    },
    error::execution::Error,
    memory::stack::BinaryOperator,
    signature::{PrimitiveKind, QualifiedMethodSignature},
};

fn unsupported(construct: impl Into<String>) -> Interrupt {
    Interrupt::Fatal(Error::UnsupportedLanguageFeature {
        construct: construct.into(),
    })
}

/// Lowers one statement onto the frame's instruction stack.
#[allow(clippy::too_many_lines)] // The exhaustive lowering is clearest in one place
pub(crate) fn decode_statement(
    ctx: &mut ExecutionContext,
    frame: &mut InterpretedFrame,
    statement: &Arc<Statement>,
) -> StepResult {
    match statement.as_ref() {
        Statement::Block(block) => {
            frame.instructions.push(Instruction::BlockPop);
            for statement in block.statements.iter().rev() {
                frame
                    .instructions
                    .push(Instruction::DecodeStatement(statement.clone()));
            }
            frame.instructions.push(Instruction::BlockPush);
            Ok(())
        }

        Statement::Expression(expression) => {
            if expression.leaves_value() {
                frame.instructions.push(Instruction::Pop);
            }
            frame
                .instructions
                .push(Instruction::DecodeExpression(expression.clone()));
            Ok(())
        }

        Statement::VariableDeclaration {
            name,
            ty,
            initializer,
        } => {
            if let Some(initializer) = initializer {
                frame.instructions.push(Instruction::Store { name: name.clone() });
                frame
                    .instructions
                    .push(Instruction::DecodeExpression(initializer.clone()));
            }
            frame.instructions.push(Instruction::Allocate {
                name: name.clone(),
                ty: ty.clone(),
            });
            Ok(())
        }

        Statement::If {
            condition,
            then_branch,
            else_branch,
        } => {
            frame.instructions.push(Instruction::ConditionalIf {
                site: ctx.next_branch_site(),
                then_branch: then_branch.clone(),
                else_branch: else_branch.clone(),
            });
            frame
                .instructions
                .push(Instruction::DecodeExpression(condition.clone()));
            Ok(())
        }

        Statement::While { condition, body } => {
            let site = ctx.next_branch_site();
            let watermarks = frame.watermarks();

            // Pushed first so that a normal exit unregisters both scopes.
            frame.instructions.push(Instruction::ContinuePop);
            frame.instructions.push(Instruction::BreakPop);

            let continue_scope = ContinueScope {
                watermarks: Watermarks {
                    // A continue preserves the two scope-pop instructions
                    // pushed above.
                    instructions: watermarks.instructions + 2,
                    ..watermarks
                },
                exceptions: frame.exceptions.len(),
                continuation: while_continuation(site, condition, body, false),
            };
            let break_scope = BreakScope {
                watermarks,
                continues: frame.continues.len(),
                exceptions: frame.exceptions.len(),
            };

            frame.instructions.push(Instruction::WhileLoop {
                site,
                condition: condition.clone(),
                body: body.clone(),
            });
            frame
                .instructions
                .push(Instruction::DecodeExpression(condition.clone()));
            frame.instructions.push(Instruction::ContinuePush(continue_scope));
            frame.instructions.push(Instruction::BreakPush(break_scope));
            Ok(())
        }

        Statement::For {
            initializers,
            condition,
            updaters,
            body,
        } => {
            let site = ctx.next_branch_site();
            let watermarks = frame.watermarks();
            let condition = condition
                .clone()
                .unwrap_or_else(|| Arc::new(Expression::BooleanLiteral(true)));

            frame.instructions.push(Instruction::BlockPop);
            frame.instructions.push(Instruction::ContinuePop);
            frame.instructions.push(Instruction::BreakPop);

            let continue_scope = ContinueScope {
                watermarks: Watermarks {
                    // A continue preserves the three pop instructions above
                    // and runs inside the loop's own block scope.
                    instructions: watermarks.instructions + 3,
                    operands: watermarks.operands,
                    locals: watermarks.locals + 1,
                },
                exceptions: frame.exceptions.len(),
                continuation: for_continuation(site, &condition, updaters, body, false),
            };
            let break_scope = BreakScope {
                watermarks,
                continues: frame.continues.len(),
                exceptions: frame.exceptions.len(),
            };

            frame.instructions.push(Instruction::ForLoop {
                site,
                condition: condition.clone(),
                updaters: updaters.clone(),
                body: body.clone(),
            });
            frame
                .instructions
                .push(Instruction::DecodeExpression(condition));
            frame.instructions.push(Instruction::ContinuePush(continue_scope));
            frame.instructions.push(Instruction::BreakPush(break_scope));
            for initializer in initializers.iter().rev() {
                frame
                    .instructions
                    .push(Instruction::DecodeStatement(initializer.clone()));
            }
            frame.instructions.push(Instruction::BlockPush);
            Ok(())
        }

        Statement::ForEach {
            variable,
            ty,
            iterable,
            body,
        } => {
            let watermarks = frame.watermarks();

            frame.instructions.push(Instruction::BreakPop);

            let break_scope = BreakScope {
                watermarks,
                continues: frame.continues.len(),
                exceptions: frame.exceptions.len(),
            };

            frame.instructions.push(Instruction::ForEach {
                variable: variable.clone(),
                ty: ty.clone(),
                body: body.clone(),
            });
            frame
                .instructions
                .push(Instruction::DecodeExpression(iterable.clone()));
            frame.instructions.push(Instruction::BreakPush(break_scope));
            Ok(())
        }

        Statement::Return(value) => {
            match value {
                Some(value) => {
                    frame.instructions.push(Instruction::ReturnValue);
                    frame
                        .instructions
                        .push(Instruction::DecodeExpression(value.clone()));
                }
                None => frame.instructions.push(Instruction::ReturnVoid),
            }
            Ok(())
        }

        Statement::Throw(value) => {
            frame.instructions.push(Instruction::Throw);
            frame
                .instructions
                .push(Instruction::DecodeExpression(value.clone()));
            Ok(())
        }

        Statement::Try { body, handlers } => {
            let watermarks = frame.watermarks();
            frame.instructions.push(Instruction::ExceptionPop);
            frame.instructions.push(Instruction::DecodeStatement(Arc::new(
                Statement::Block(body.clone()),
            )));
            frame.instructions.push(Instruction::ExceptionPush(ExceptionScope {
                watermarks,
                handlers: handlers
                    .iter()
                    .map(|handler| ExceptionHandler {
                        name: handler.name.clone(),
                        ty: handler.ty.clone(),
                        body: handler.body.clone(),
                    })
                    .collect(),
                breaks: frame.breaks.len(),
                continues: frame.continues.len(),
            }));
            Ok(())
        }

        Statement::Break => {
            frame.instructions.push(Instruction::BreakStatement);
            Ok(())
        }

        Statement::Continue => {
            frame.instructions.push(Instruction::ContinueStatement);
            Ok(())
        }

        Statement::Empty => Ok(()),

        Statement::Labeled { label, .. } => Err(unsupported(format!("labeled statement {label:?}"))),

        Statement::Switch { .. } => Err(unsupported("switch statement")),
    }
}

/// Lowers one expression onto the frame's instruction stack.
#[allow(clippy::too_many_lines)] // The exhaustive lowering is clearest in one place
pub(crate) fn decode_expression(
    ctx: &mut ExecutionContext,
    frame: &mut InterpretedFrame,
    expression: &Arc<Expression>,
) -> StepResult {
    match expression.as_ref() {
        Expression::BooleanLiteral(value) => {
            frame.instructions.push(Instruction::LdcBoolean(*value));
            Ok(())
        }
        Expression::CharLiteral(value) => {
            frame.instructions.push(Instruction::LdcChar(*value));
            Ok(())
        }
        Expression::NumberLiteral { literal, kind } => {
            frame.instructions.push(Instruction::LdcNumber {
                literal: literal.clone(),
                kind: *kind,
            });
            Ok(())
        }
        Expression::StringLiteral(text) => {
            frame.instructions.push(Instruction::LdcString(text.clone()));
            Ok(())
        }
        Expression::NullLiteral => {
            frame.instructions.push(Instruction::LdcNull);
            Ok(())
        }
        Expression::TypeLiteral(ty) => {
            frame.instructions.push(Instruction::LdcType(ty.clone()));
            Ok(())
        }

        Expression::Name(name) => {
            frame.instructions.push(Instruction::Load { name: name.clone() });
            Ok(())
        }
        Expression::This => {
            frame.instructions.push(Instruction::Load {
                name: "this".to_string(),
            });
            Ok(())
        }

        Expression::FieldAccess { target, name, ty } => {
            frame.instructions.push(Instruction::ObjectGet {
                name: name.clone(),
                ty: ty.clone(),
            });
            frame
                .instructions
                .push(Instruction::DecodeExpression(target.clone()));
            Ok(())
        }
        Expression::StaticFieldAccess {
            declaring_class,
            name,
            ty,
        } => {
            frame.instructions.push(Instruction::StaticGet {
                declaring_class: declaring_class.clone(),
                name: name.clone(),
                ty: ty.clone(),
            });
            Ok(())
        }

        Expression::ArrayAccess { array, index } => {
            frame.instructions.push(Instruction::ArrayLoad);
            frame
                .instructions
                .push(Instruction::DecodeExpression(index.clone()));
            frame
                .instructions
                .push(Instruction::DecodeExpression(array.clone()));
            Ok(())
        }
        Expression::ArrayLength { array } => {
            frame.instructions.push(Instruction::ArrayLength);
            frame
                .instructions
                .push(Instruction::DecodeExpression(array.clone()));
            Ok(())
        }

        Expression::MethodCall {
            target,
            declaring_class,
            method,
            arguments,
            kind,
        } => {
            let signature =
                QualifiedMethodSignature::new(declaring_class.clone(), method.clone());
            let invoke = match kind {
                CallKind::Static => Instruction::InvokeStatic(signature),
                CallKind::Virtual => Instruction::InvokeVirtual(signature),
                CallKind::Special => Instruction::InvokeSpecial(signature),
                CallKind::Super => Instruction::InvokeSuper(signature),
            };
            frame.instructions.push(invoke);
            for argument in arguments.iter().rev() {
                frame
                    .instructions
                    .push(Instruction::DecodeExpression(argument.clone()));
            }
            match (kind, target) {
                (CallKind::Static, _) => {}
                (_, Some(target)) => frame
                    .instructions
                    .push(Instruction::DecodeExpression(target.clone())),
                (_, None) => frame.instructions.push(Instruction::Load {
                    name: "this".to_string(),
                }),
            }
            Ok(())
        }

        Expression::New {
            ty,
            constructor,
            arguments,
        } => {
            let signature = QualifiedMethodSignature::new(ty.clone(), constructor.clone());
            frame.instructions.push(Instruction::InvokeSpecial(signature));
            for argument in arguments.iter().rev() {
                frame
                    .instructions
                    .push(Instruction::DecodeExpression(argument.clone()));
            }
            frame.instructions.push(Instruction::Dup);
            frame
                .instructions
                .push(Instruction::ObjectAllocate { ty: ty.clone() });
            Ok(())
        }

        Expression::NewArray {
            component,
            length,
            initializer,
        } => {
            if let Some(elements) = initializer {
                for (index, element) in elements.iter().enumerate().rev() {
                    frame.instructions.push(Instruction::ArrayStore);
                    frame
                        .instructions
                        .push(Instruction::DecodeExpression(element.clone()));
                    frame.instructions.push(Instruction::LdcNumber {
                        literal: index.to_string(),
                        kind: PrimitiveKind::Int,
                    });
                    frame.instructions.push(Instruction::Dup);
                }
            }
            frame.instructions.push(Instruction::ArrayAllocate {
                component: component.clone(),
            });
            if let Some(length) = length {
                // The length expression runs for its effects only; symbolic
                // arrays carry a symbolic length.
                frame.instructions.push(Instruction::Pop);
                frame
                    .instructions
                    .push(Instruction::DecodeExpression(length.clone()));
            }
            Ok(())
        }

        Expression::Infix { operator, lhs, rhs } => {
            // `!=` lowers to equality followed by negation, mirroring the
            // trace records both produce.
            if *operator == BinaryOperator::NotEquals {
                frame.instructions.push(Instruction::Not);
                frame.instructions.push(Instruction::Binary(BinaryOperator::Equals));
            } else {
                frame.instructions.push(Instruction::Binary(*operator));
            }
            frame
                .instructions
                .push(Instruction::DecodeExpression(rhs.clone()));
            frame
                .instructions
                .push(Instruction::DecodeExpression(lhs.clone()));
            Ok(())
        }

        Expression::Prefix { operator, operand } => match operator {
            PrefixOperator::Not => {
                frame.instructions.push(Instruction::Not);
                frame
                    .instructions
                    .push(Instruction::DecodeExpression(operand.clone()));
                Ok(())
            }
            PrefixOperator::Minus => {
                frame.instructions.push(Instruction::Binary(BinaryOperator::Subtract));
                frame
                    .instructions
                    .push(Instruction::DecodeExpression(operand.clone()));
                frame.instructions.push(Instruction::LdcNumber {
                    literal: "0".to_string(),
                    kind: PrimitiveKind::Int,
                });
                Ok(())
            }
            PrefixOperator::Increment => decode_step_operator(frame, operand, BinaryOperator::Add, true),
            PrefixOperator::Decrement => {
                decode_step_operator(frame, operand, BinaryOperator::Subtract, true)
            }
        },

        Expression::Postfix { operator, operand } => match operator {
            PostfixOperator::Increment => {
                decode_step_operator(frame, operand, BinaryOperator::Add, false)
            }
            PostfixOperator::Decrement => {
                decode_step_operator(frame, operand, BinaryOperator::Subtract, false)
            }
        },

        Expression::Assignment {
            target,
            operator,
            value,
        } => decode_assignment(frame, target, *operator, value),

        Expression::Conditional {
            condition,
            then_value,
            else_value,
        } => {
            frame.instructions.push(Instruction::ConditionalTernary {
                site: ctx.next_branch_site(),
                then_value: then_value.clone(),
                else_value: else_value.clone(),
            });
            frame
                .instructions
                .push(Instruction::DecodeExpression(condition.clone()));
            Ok(())
        }

        Expression::Cast { ty, operand } => {
            frame.instructions.push(Instruction::Cast { ty: ty.clone() });
            frame
                .instructions
                .push(Instruction::DecodeExpression(operand.clone()));
            Ok(())
        }

        Expression::InstanceOf { operand, ty } => {
            frame.instructions.push(Instruction::InstanceOf { ty: ty.clone() });
            frame
                .instructions
                .push(Instruction::DecodeExpression(operand.clone()));
            Ok(())
        }

        Expression::Lambda => Err(unsupported("lambda expression")),
        Expression::AnonymousClass => Err(unsupported("anonymous class")),
        Expression::MethodReference => Err(unsupported("method reference")),
        Expression::Varargs => Err(unsupported("varargs invocation")),
    }
}

/// Lowers `++`/`--` on a local variable; other targets are not modeled.
///
/// The prefix forms leave the updated value on the stack, the postfix forms
/// the original value.
fn decode_step_operator(
    frame: &mut InterpretedFrame,
    operand: &Arc<Expression>,
    operator: BinaryOperator,
    prefix: bool,
) -> StepResult {
    let Expression::Name(name) = operand.as_ref() else {
        return Err(unsupported("increment of a non-local target"));
    };

    let one = Instruction::LdcNumber {
        literal: "1".to_string(),
        kind: PrimitiveKind::Int,
    };

    frame.instructions.push(Instruction::Store { name: name.clone() });
    if prefix {
        // load, 1, add, dup, store: the new value remains.
        frame.instructions.push(Instruction::Dup);
        frame.instructions.push(Instruction::Binary(operator));
        frame.instructions.push(one);
        frame.instructions.push(Instruction::Load { name: name.clone() });
    } else {
        // load, dup, 1, add, store: the old value remains.
        frame.instructions.push(Instruction::Binary(operator));
        frame.instructions.push(one);
        frame.instructions.push(Instruction::Dup);
        frame.instructions.push(Instruction::Load { name: name.clone() });
    }
    Ok(())
}

/// Lowers an assignment by re-visiting the target in store mode.
fn decode_assignment(
    frame: &mut InterpretedFrame,
    target: &Arc<Expression>,
    operator: Option<BinaryOperator>,
    value: &Arc<Expression>,
) -> StepResult {
    match target.as_ref() {
        Expression::Name(name) => {
            frame.instructions.push(Instruction::Store { name: name.clone() });
            if let Some(operator) = operator {
                frame.instructions.push(Instruction::Binary(operator));
                frame
                    .instructions
                    .push(Instruction::DecodeExpression(value.clone()));
                frame.instructions.push(Instruction::Load { name: name.clone() });
            } else {
                frame
                    .instructions
                    .push(Instruction::DecodeExpression(value.clone()));
            }
            Ok(())
        }

        Expression::FieldAccess {
            target: object,
            name,
            ty,
        } => {
            if let Some(operator) = operator {
                // object, dup, get, value, op, swap, put
                frame.instructions.push(Instruction::ObjectPut {
                    name: name.clone(),
                    ty: ty.clone(),
                });
                frame.instructions.push(Instruction::Swap);
                frame.instructions.push(Instruction::Binary(operator));
                frame
                    .instructions
                    .push(Instruction::DecodeExpression(value.clone()));
                frame.instructions.push(Instruction::ObjectGet {
                    name: name.clone(),
                    ty: ty.clone(),
                });
                frame.instructions.push(Instruction::Dup);
                frame
                    .instructions
                    .push(Instruction::DecodeExpression(object.clone()));
            } else {
                // value, object, put
                frame.instructions.push(Instruction::ObjectPut {
                    name: name.clone(),
                    ty: ty.clone(),
                });
                frame
                    .instructions
                    .push(Instruction::DecodeExpression(object.clone()));
                frame
                    .instructions
                    .push(Instruction::DecodeExpression(value.clone()));
            }
            Ok(())
        }

        Expression::StaticFieldAccess {
            declaring_class,
            name,
            ty,
        } => {
            frame.instructions.push(Instruction::StaticPut {
                declaring_class: declaring_class.clone(),
                name: name.clone(),
                ty: ty.clone(),
            });
            if let Some(operator) = operator {
                frame.instructions.push(Instruction::Binary(operator));
                frame
                    .instructions
                    .push(Instruction::DecodeExpression(value.clone()));
                frame.instructions.push(Instruction::StaticGet {
                    declaring_class: declaring_class.clone(),
                    name: name.clone(),
                    ty: ty.clone(),
                });
            } else {
                frame
                    .instructions
                    .push(Instruction::DecodeExpression(value.clone()));
            }
            Ok(())
        }

        Expression::ArrayAccess { array, index } => {
            frame.instructions.push(Instruction::ArrayStore);
            if let Some(operator) = operator {
                // array, index, dup2, load, value, op, store
                frame.instructions.push(Instruction::Binary(operator));
                frame
                    .instructions
                    .push(Instruction::DecodeExpression(value.clone()));
                frame.instructions.push(Instruction::ArrayLoad);
                frame.instructions.push(Instruction::Dup2);
            } else {
                frame
                    .instructions
                    .push(Instruction::DecodeExpression(value.clone()));
            }
            frame
                .instructions
                .push(Instruction::DecodeExpression(index.clone()));
            frame
                .instructions
                .push(Instruction::DecodeExpression(array.clone()));
            Ok(())
        }

        _ => Err(unsupported("assignment to an unmodeled target")),
    }
}
