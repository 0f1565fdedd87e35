//! This module contains the flat instruction set that interpreted frames
//! execute, and the execution semantics of each instruction.
//!
//! Instructions are a closed union with an exhaustive match rather than a
//! visitor hierarchy; decoding lowers the AST into these in operand-first
//! order so execution never recurses into the AST.

use std::sync::Arc;

use crate::{
    ast::{Expression, Statement},
    ctx::{BranchSite, ExecutionContext, Interrupt, StepResult},
    ctx::frame::{
        interpreted::{
            decoder,
            operators,
            BreakScope,
            ContinueScope,
            ExceptionScope,
            InterpretedFrame,
            Locals,
        },
        Frame,
    },
    error::execution::Error,
    memory::{
        heap::{primitive_stack_type, HeapValue},
        stack::{BinaryOperator, PrimitiveLiteral, ReferenceValue, StackValue},
    },
    signature::{
        ClassSignature,
        MethodSignature,
        PrimitiveKind,
        QualifiedMethodSignature,
        TypeSignature,
    },
    trace::TraceRecord,
};

/// One decoded instruction.
#[derive(Clone, Debug)]
pub enum Instruction {
    //
    //  Decoding
    //
    /// Lowers a statement into further instructions at execution time.
    DecodeStatement(Arc<Statement>),

    /// Lowers an expression into further instructions at execution time.
    DecodeExpression(Arc<Expression>),

    //
    //  Scoping
    //
    BlockPush,
    BlockPop,
    BreakPush(BreakScope),
    BreakPop,
    ContinuePush(ContinueScope),
    ContinuePop,
    ExceptionPush(ExceptionScope),
    ExceptionPop,

    //
    //  Locals
    //
    Allocate { name: String, ty: TypeSignature },
    Store { name: String },
    Load { name: String },

    //
    //  Objects
    //
    ObjectAllocate { ty: ClassSignature },
    ObjectGet { name: String, ty: TypeSignature },
    ObjectPut { name: String, ty: TypeSignature },

    //
    //  Statics
    //
    StaticGet {
        declaring_class: ClassSignature,
        name: String,
        ty: TypeSignature,
    },
    StaticPut {
        declaring_class: ClassSignature,
        name: String,
        ty: TypeSignature,
    },

    //
    //  Arrays
    //
    ArrayAllocate { component: TypeSignature },
    ArrayStore,
    ArrayLoad,
    ArrayLength,

    //
    //  Invocation
    //
    InvokeStatic(QualifiedMethodSignature),
    InvokeSpecial(QualifiedMethodSignature),
    InvokeVirtual(QualifiedMethodSignature),
    InvokeSuper(QualifiedMethodSignature),

    //
    //  Linkage
    //
    ReturnVoid,
    ReturnValue,
    Throw,
    BreakStatement,
    ContinueStatement,

    //
    //  Stack management
    //
    Push(StackValue),
    Pop,
    Dup,
    Dup2,
    Swap,

    //
    //  Operators
    //
    Binary(BinaryOperator),
    Not,

    //
    //  Constants
    //
    LdcBoolean(bool),
    LdcChar(char),
    LdcNumber { literal: String, kind: PrimitiveKind },
    LdcString(String),
    LdcNull,
    LdcType(TypeSignature),

    //
    //  Introspection
    //
    Cast { ty: TypeSignature },
    InstanceOf { ty: ClassSignature },

    //
    //  Loops and conditionals
    //
    WhileLoop {
        site: BranchSite,
        condition: Arc<Expression>,
        body: Arc<Statement>,
    },
    ForLoop {
        site: BranchSite,
        condition: Arc<Expression>,
        updaters: Vec<Arc<Expression>>,
        body: Arc<Statement>,
    },
    ForEach {
        variable: String,
        ty: TypeSignature,
        body: Arc<Statement>,
    },
    ConditionalIf {
        site: BranchSite,
        then_branch: Arc<Statement>,
        else_branch: Option<Arc<Statement>>,
    },
    ConditionalTernary {
        site: BranchSite,
        then_value: Arc<Expression>,
        else_value: Arc<Expression>,
    },
}

fn pop(frame: &mut InterpretedFrame) -> StepResult<StackValue> {
    frame
        .operands
        .pop()
        .ok_or(Interrupt::Fatal(Error::OperandStackUnderflow))
}

fn pop_reference(frame: &mut InterpretedFrame) -> StepResult<ReferenceValue> {
    let value = pop(frame)?;
    value.as_reference().ok_or_else(|| {
        Interrupt::Fatal(Error::UnexpectedOperand {
            expected: "a reference",
            found: value.label(),
        })
    })
}

/// Builds the loop-head continuation for a `for` loop in push order: the head
/// itself, then the condition, then the updaters (each discarded if it leaves
/// a value).
pub(crate) fn for_continuation(
    site: BranchSite,
    condition: &Arc<Expression>,
    updaters: &[Arc<Expression>],
    body: &Arc<Statement>,
    include_body: bool,
) -> Vec<Instruction> {
    let mut instructions = vec![
        Instruction::ForLoop {
            site,
            condition: condition.clone(),
            updaters: updaters.to_vec(),
            body: body.clone(),
        },
        Instruction::DecodeExpression(condition.clone()),
    ];
    for updater in updaters.iter().rev() {
        if updater.leaves_value() {
            instructions.push(Instruction::Pop);
        }
        instructions.push(Instruction::DecodeExpression(updater.clone()));
    }
    if include_body {
        instructions.push(Instruction::DecodeStatement(body.clone()));
    }
    instructions
}

/// Builds the loop-head continuation for a `while` loop in push order.
pub(crate) fn while_continuation(
    site: BranchSite,
    condition: &Arc<Expression>,
    body: &Arc<Statement>,
    include_body: bool,
) -> Vec<Instruction> {
    let mut instructions = vec![
        Instruction::WhileLoop {
            site,
            condition: condition.clone(),
            body: body.clone(),
        },
        Instruction::DecodeExpression(condition.clone()),
    ];
    if include_body {
        instructions.push(Instruction::DecodeStatement(body.clone()));
    }
    instructions
}

/// Executes one instruction against the provided context and frame.
#[allow(clippy::too_many_lines)] // The exhaustive dispatch is clearest in one place
pub(crate) fn execute(
    instruction: Instruction,
    ctx: &mut ExecutionContext,
    frame: &mut InterpretedFrame,
) -> StepResult {
    match instruction {
        //
        //  Decoding
        //
        Instruction::DecodeStatement(statement) => decoder::decode_statement(ctx, frame, &statement),
        Instruction::DecodeExpression(expression) => {
            decoder::decode_expression(ctx, frame, &expression)
        }

        //
        //  Scoping
        //
        Instruction::BlockPush => {
            frame.locals.push_scope();
            Ok(())
        }
        Instruction::BlockPop => {
            frame.locals.pop_scope();
            Ok(())
        }
        Instruction::BreakPush(scope) => {
            frame.breaks.push(scope);
            Ok(())
        }
        Instruction::BreakPop => {
            frame.breaks.pop();
            Ok(())
        }
        Instruction::ContinuePush(scope) => {
            frame.continues.push(scope);
            Ok(())
        }
        Instruction::ContinuePop => {
            frame.continues.pop();
            Ok(())
        }
        Instruction::ExceptionPush(scope) => {
            frame.exceptions.push(scope);
            Ok(())
        }
        Instruction::ExceptionPop => {
            frame.exceptions.pop();
            Ok(())
        }

        //
        //  Locals
        //
        Instruction::Allocate { name, ty } => {
            let id = ctx.next_id();
            let value = crate::memory::heap::default_value(&ty, id);
            frame.locals.allocate(name, ty, value);
            Ok(())
        }
        Instruction::Store { name } => {
            let value = pop(frame)?;
            frame.locals.assign(&name, value).map_err(Interrupt::Fatal)
        }
        Instruction::Load { name } => {
            let value = frame.locals.resolve(&name).map_err(Interrupt::Fatal)?;
            frame.operands.push(value);
            Ok(())
        }

        //
        //  Objects
        //
        Instruction::ObjectAllocate { ty } => {
            let reference = ctx.heap.allocate_object(&ty);
            frame.operands.push(StackValue::Reference(reference));
            run_field_initializers(ctx, &ty, reference);
            Ok(())
        }
        Instruction::ObjectGet { name, ty } => {
            let reference = pop_reference(frame)?;
            let value = ctx.object_field_load(reference, &name, &ty)?;
            frame.operands.push(value);
            Ok(())
        }
        Instruction::ObjectPut { name, ty } => {
            let reference = pop_reference(frame)?;
            let old_value = ctx.object_field_load(reference, &name, &ty)?;
            let new_value = pop(frame)?;
            ctx.heap
                .set_field(reference, &name, &ty, new_value.clone())?;
            ctx.records.push(TraceRecord::ObjectFieldPut {
                reference,
                field: name,
                ty,
                old_value,
                new_value,
            });
            Ok(())
        }

        //
        //  Statics
        //
        Instruction::StaticGet {
            declaring_class,
            name,
            ty,
        } => {
            let value = ctx.static_field_load(&declaring_class, &name, &ty);
            frame.operands.push(value);
            Ok(())
        }
        Instruction::StaticPut {
            declaring_class,
            name,
            ty,
        } => {
            let old_value = ctx.static_field_load(&declaring_class, &name, &ty);
            let new_value = pop(frame)?;
            ctx.statics
                .store(&declaring_class, &name, &ty, new_value.clone());
            ctx.records.push(TraceRecord::StaticFieldPut {
                declaring_class,
                field: name,
                ty,
                old_value,
                new_value,
            });
            Ok(())
        }

        //
        //  Arrays
        //
        Instruction::ArrayAllocate { component } => {
            let ty = component.array_of(1);
            let reference = ctx.heap.allocate_symbolic_array(&ty);
            frame.operands.push(StackValue::Reference(reference));
            Ok(())
        }
        Instruction::ArrayStore => {
            let new_value = pop(frame)?;
            let index = pop(frame)?;
            let reference = pop_reference(frame)?;

            let old_value = ctx.array_member_load(reference, index.clone())?;
            ctx.heap
                .set_array_member(reference, index.clone(), new_value.clone())?;
            ctx.records.push(TraceRecord::ArrayMemberPut {
                reference,
                index,
                old_value,
                new_value,
            });
            Ok(())
        }
        Instruction::ArrayLoad => {
            let index = pop(frame)?;
            let reference = pop_reference(frame)?;
            let value = ctx.array_member_load(reference, index.clone())?;
            ctx.records.push(TraceRecord::ArrayMemberGet {
                reference,
                index,
                value: value.clone(),
            });
            frame.operands.push(value);
            Ok(())
        }
        Instruction::ArrayLength => {
            let reference = pop_reference(frame)?;
            let length = ctx.heap.array_length(reference)?;
            frame.operands.push(length);
            Ok(())
        }

        //
        //  Invocation
        //
        Instruction::InvokeStatic(signature) => {
            let arguments = pop_arguments(frame, signature.method.argument_types.len())?;
            ctx.invoke(&signature, None, arguments, &mut frame.operands)
        }
        Instruction::InvokeSpecial(signature) => {
            let arguments = pop_arguments(frame, signature.method.argument_types.len())?;
            let receiver = receiver_reference(ctx, frame)?;
            ctx.invoke(&signature, Some(receiver), arguments, &mut frame.operands)
        }
        Instruction::InvokeVirtual(signature) => {
            let arguments = pop_arguments(frame, signature.method.argument_types.len())?;
            let receiver = receiver_reference(ctx, frame)?;
            let lookup = ctx.heap.dereference(receiver)?.lookup_type();
            let target = ctx.dispatch_target(&lookup, &signature);
            ctx.invoke(&target, Some(receiver), arguments, &mut frame.operands)
        }
        Instruction::InvokeSuper(signature) => {
            let arguments = pop_arguments(frame, signature.method.argument_types.len())?;
            let receiver = receiver_reference(ctx, frame)?;
            let lookup = ctx.heap.dereference(receiver)?.lookup_type();
            let parent = ctx
                .descriptors
                .superclass(&lookup)
                .unwrap_or_else(ClassSignature::object);
            let target = ctx.dispatch_target(&parent, &signature);
            ctx.invoke(&target, Some(receiver), arguments, &mut frame.operands)
        }

        //
        //  Linkage
        //
        Instruction::ReturnVoid => Err(Interrupt::Return(None)),
        Instruction::ReturnValue => {
            let value = pop(frame)?;
            Err(Interrupt::Return(Some(value)))
        }
        Instruction::Throw => {
            let value = pop(frame)?;
            match value.as_reference() {
                Some(ReferenceValue::Nil) | None => {
                    Err(Interrupt::Halt("Null pointer dereference in throw".into()))
                }
                Some(reference) => Err(Interrupt::Throw(reference)),
            }
        }
        Instruction::BreakStatement => {
            let scope = frame.breaks.pop().ok_or(Interrupt::Fatal(
                Error::InvalidControlFlow {
                    construct: "break outside of a loop",
                },
            ))?;
            frame.instructions.truncate(scope.watermarks.instructions);
            frame.operands.truncate(scope.watermarks.operands);
            frame.locals.truncate_depth(scope.watermarks.locals);
            frame.continues.truncate(scope.continues);
            frame.exceptions.truncate(scope.exceptions);
            Ok(())
        }
        Instruction::ContinueStatement => {
            let scope = frame.continues.last().cloned().ok_or(Interrupt::Fatal(
                Error::InvalidControlFlow {
                    construct: "continue outside of a loop",
                },
            ))?;
            frame.instructions.truncate(scope.watermarks.instructions);
            frame.operands.truncate(scope.watermarks.operands);
            frame.locals.truncate_depth(scope.watermarks.locals);
            frame.exceptions.truncate(scope.exceptions);
            frame.instructions.extend(scope.continuation);
            Ok(())
        }

        //
        //  Stack management
        //
        Instruction::Push(value) => {
            frame.operands.push(value);
            Ok(())
        }
        Instruction::Pop => {
            pop(frame)?;
            Ok(())
        }
        Instruction::Dup => {
            let value = pop(frame)?;
            frame.operands.push(value.clone());
            frame.operands.push(value);
            Ok(())
        }
        Instruction::Dup2 => {
            let first = pop(frame)?;
            let second = pop(frame)?;
            frame.operands.push(second.clone());
            frame.operands.push(first.clone());
            frame.operands.push(second);
            frame.operands.push(first);
            Ok(())
        }
        Instruction::Swap => {
            let first = pop(frame)?;
            let second = pop(frame)?;
            frame.operands.push(first);
            frame.operands.push(second);
            Ok(())
        }

        //
        //  Operators
        //
        Instruction::Binary(operator) => {
            let rhs = pop(frame)?;
            let lhs = pop(frame)?;
            let result = operators::binary(ctx, operator, lhs, rhs)?;
            frame.operands.push(result);
            Ok(())
        }
        Instruction::Not => {
            let value = pop(frame)?;
            let result = operators::not(ctx, value)?;
            frame.operands.push(result);
            Ok(())
        }

        //
        //  Constants
        //
        Instruction::LdcBoolean(value) => {
            let concrete = ctx.new_concrete(PrimitiveLiteral::Boolean(value));
            frame.operands.push(concrete);
            Ok(())
        }
        Instruction::LdcChar(value) => {
            let concrete = ctx.new_concrete(PrimitiveLiteral::Char(value));
            frame.operands.push(concrete);
            Ok(())
        }
        Instruction::LdcNumber { literal, kind } => {
            let parsed = parse_number(&literal, kind).ok_or_else(|| {
                Interrupt::Fatal(Error::UnsupportedLanguageFeature {
                    construct: format!("numeric literal {literal:?}"),
                })
            })?;
            let concrete = ctx.new_concrete(parsed);
            frame.operands.push(concrete);
            Ok(())
        }
        Instruction::LdcString(text) => {
            let reference = ctx.heap.get_or_allocate_string(&text);
            frame.operands.push(StackValue::Reference(reference));
            Ok(())
        }
        Instruction::LdcNull => {
            frame.operands.push(StackValue::Reference(ReferenceValue::Nil));
            Ok(())
        }
        Instruction::LdcType(ty) => {
            let reference = ctx.heap.get_or_allocate_class_object(&ty);
            frame.operands.push(StackValue::Reference(reference));
            Ok(())
        }

        //
        //  Introspection
        //
        Instruction::Cast { ty } => execute_cast(ctx, frame, &ty),
        Instruction::InstanceOf { ty } => {
            let value = pop(frame)?;
            let result = match value.as_reference() {
                Some(ReferenceValue::Nil) => false,
                Some(reference) => {
                    let lookup = ctx.heap.dereference(reference)?.lookup_type();
                    crate::ctx::assignable(ctx.descriptors.as_ref(), &lookup, &ty)
                }
                None => {
                    return Err(Interrupt::Fatal(Error::UnexpectedOperand {
                        expected: "a reference for instanceof",
                        found: value.label(),
                    }))
                }
            };
            let concrete = ctx.new_concrete(PrimitiveLiteral::Boolean(result));
            frame.operands.push(concrete);
            Ok(())
        }

        //
        //  Loops and conditionals
        //
        Instruction::WhileLoop { site, condition, body } => {
            let value = pop(frame)?;
            match value.as_concrete_boolean() {
                Some(true) => {
                    if ctx.site_count(site) < ctx.config.max_loop_executions {
                        ctx.bump_site(site);
                        frame
                            .instructions
                            .extend(while_continuation(site, &condition, &body, true));
                    }
                    Ok(())
                }
                Some(false) => Ok(()),
                None => {
                    let continuation = while_continuation(site, &condition, &body, true);
                    ctx.fork_branch(&*frame, site, &value, move |_, child| {
                        child.instructions.extend(continuation);
                    });
                    Ok(())
                }
            }
        }
        Instruction::ForLoop {
            site,
            condition,
            updaters,
            body,
        } => {
            let value = pop(frame)?;
            match value.as_concrete_boolean() {
                Some(true) => {
                    if ctx.site_count(site) < ctx.config.max_loop_executions {
                        ctx.bump_site(site);
                        frame.instructions.extend(for_continuation(
                            site, &condition, &updaters, &body, true,
                        ));
                    }
                    Ok(())
                }
                Some(false) => Ok(()),
                None => {
                    let continuation = for_continuation(site, &condition, &updaters, &body, true);
                    ctx.fork_branch(&*frame, site, &value, move |_, child| {
                        child.instructions.extend(continuation);
                    });
                    Ok(())
                }
            }
        }
        Instruction::ForEach { variable, ty, body } => {
            execute_for_each(ctx, frame, &variable, &ty, &body)
        }
        Instruction::ConditionalIf {
            site,
            then_branch,
            else_branch,
        } => {
            let condition = pop(frame)?;
            match condition.as_concrete_boolean() {
                Some(true) => {
                    frame.instructions.push(Instruction::DecodeStatement(then_branch));
                    Ok(())
                }
                Some(false) => {
                    if let Some(else_branch) = else_branch {
                        frame.instructions.push(Instruction::DecodeStatement(else_branch));
                    }
                    Ok(())
                }
                None => {
                    let taken = then_branch.clone();
                    ctx.fork_branch(&*frame, site, &condition, move |_, child| {
                        child.instructions.push(Instruction::DecodeStatement(taken));
                    });
                    if let Some(else_branch) = else_branch {
                        frame.instructions.push(Instruction::DecodeStatement(else_branch));
                    }
                    Ok(())
                }
            }
        }
        Instruction::ConditionalTernary {
            site,
            then_value,
            else_value,
        } => {
            let condition = pop(frame)?;
            match condition.as_concrete_boolean() {
                Some(true) => {
                    frame.instructions.push(Instruction::DecodeExpression(then_value));
                    Ok(())
                }
                Some(false) => {
                    frame.instructions.push(Instruction::DecodeExpression(else_value));
                    Ok(())
                }
                None => {
                    let taken = then_value.clone();
                    ctx.fork_branch(&*frame, site, &condition, move |_, child| {
                        child.instructions.push(Instruction::DecodeExpression(taken));
                    });
                    frame.instructions.push(Instruction::DecodeExpression(else_value));
                    Ok(())
                }
            }
        }
    }
}

fn pop_arguments(frame: &mut InterpretedFrame, count: usize) -> StepResult<Vec<StackValue>> {
    let mut arguments = Vec::with_capacity(count);
    for _ in 0..count {
        arguments.push(pop(frame)?);
    }
    arguments.reverse();
    Ok(arguments)
}

/// Pops an invocation receiver, boxing a primitive receiver so that calls on
/// literals behave uniformly.
fn receiver_reference(
    ctx: &mut ExecutionContext,
    frame: &mut InterpretedFrame,
) -> StepResult<ReferenceValue> {
    let value = pop(frame)?;
    match value.as_reference() {
        Some(reference) => Ok(reference),
        None => Ok(ctx.heap.get_or_box(&value)),
    }
}

fn run_field_initializers(
    ctx: &mut ExecutionContext,
    ty: &ClassSignature,
    reference: ReferenceValue,
) {
    let initializers = ctx.sources.field_initializers(ty);
    if initializers.is_empty() {
        return;
    }

    let mut locals = Locals::new();
    locals.allocate(
        "this",
        TypeSignature::Class(ty.clone()),
        StackValue::Reference(reference),
    );
    let signature = QualifiedMethodSignature::new(
        ty.clone(),
        MethodSignature::new("<scinit>", vec![], TypeSignature::Primitive(PrimitiveKind::Void)),
    );
    let mut init_frame = InterpretedFrame::new(signature, locals);

    for initializer in initializers.iter().rev() {
        init_frame.instructions.push(Instruction::ObjectPut {
            name: initializer.name.clone(),
            ty: initializer.ty.clone(),
        });
        init_frame.instructions.push(Instruction::Load {
            name: "this".to_string(),
        });
        init_frame
            .instructions
            .push(Instruction::DecodeExpression(initializer.initializer.clone()));
    }

    ctx.frames.push(Frame::Interpreted(init_frame));
}

fn execute_cast(
    ctx: &mut ExecutionContext,
    frame: &mut InterpretedFrame,
    ty: &TypeSignature,
) -> StepResult {
    let value = pop(frame)?;

    match ty {
        TypeSignature::Primitive(kind) => {
            let target = primitive_stack_type(*kind).ok_or(Interrupt::Fatal(
                Error::UnexpectedOperand {
                    expected: "a non-void cast target",
                    found: ty.to_string(),
                },
            ))?;

            let input = match &value {
                StackValue::Reference(reference) => match ctx.heap.dereference(*reference)? {
                    HeapValue::BoxedStackValue { value, .. } => value.clone(),
                    other => {
                        return Err(Interrupt::Fatal(Error::UnexpectedOperand {
                            expected: "a boxed value for a primitive cast",
                            found: format!("heap value {}", other.id()),
                        }))
                    }
                },
                other => other.clone(),
            };

            let output = match &input {
                StackValue::Concrete(concrete) => {
                    let literal = operators::convert_literal(concrete.literal, target);
                    ctx.new_concrete(literal)
                }
                _ => StackValue::Computed(crate::memory::stack::ComputedValue::Cast {
                    inner: Box::new(input.clone()),
                    ty: target,
                }),
            };

            ctx.records.push(TraceRecord::StackCast {
                input,
                output: output.clone(),
            });
            frame.operands.push(output);
            Ok(())
        }
        TypeSignature::Class(_) | TypeSignature::Array(_) => {
            match value.as_reference() {
                // A null reference passes any reference cast unchanged.
                Some(ReferenceValue::Nil) => {
                    frame.operands.push(value);
                    Ok(())
                }
                Some(reference) => {
                    let will_succeed = match (ty, ctx.heap.dereference(reference)?) {
                        (TypeSignature::Class(target), object) => crate::ctx::assignable(
                            ctx.descriptors.as_ref(),
                            &object.lookup_type(),
                            target,
                        ),
                        (_, object) => object.type_signature() == *ty,
                    };
                    if !will_succeed {
                        ctx.heap.promote(reference, ty)?;
                    }
                    frame.operands.push(value);
                    Ok(())
                }
                // Casting a primitive to a reference type boxes it.
                None => {
                    let reference = ctx.heap.get_or_box(&value);
                    frame.operands.push(StackValue::Reference(reference));
                    Ok(())
                }
            }
        }
    }
}

fn execute_for_each(
    ctx: &mut ExecutionContext,
    frame: &mut InterpretedFrame,
    variable: &str,
    ty: &TypeSignature,
    body: &Arc<Statement>,
) -> StepResult {
    let reference = pop_reference(frame)?;

    enum Iterable {
        EmptyArray(TypeSignature),
        Array,
        Collection,
    }

    let iterable = match ctx.heap.dereference(reference)? {
        array @ HeapValue::SymbolicArray { storage, .. } => {
            if storage.is_empty() {
                let component = array
                    .component_type()
                    .cloned()
                    .unwrap_or_else(|| TypeSignature::Class(ClassSignature::object()));
                Iterable::EmptyArray(component)
            } else {
                Iterable::Array
            }
        }
        HeapValue::ConcreteObject { .. } | HeapValue::SymbolicObject { .. } => {
            Iterable::Collection
        }
        other => {
            return Err(Interrupt::Fatal(Error::UnexpectedOperand {
                expected: "an iterable value",
                found: format!("heap value {}", other.id()),
            }))
        }
    };

    if let Iterable::EmptyArray(component) = &iterable {
        // An untouched symbolic array still yields one symbolic element so
        // the body's behavior is captured.
        let index = ctx
            .heap
            .allocate_symbolic(&TypeSignature::Primitive(PrimitiveKind::Int));
        let item = ctx.heap.allocate_symbolic(component);
        let old_value = ctx.array_member_load(reference, index.clone())?;
        ctx.heap
            .set_array_member(reference, index.clone(), item.clone())?;
        ctx.records.push(TraceRecord::ArrayMemberPut {
            reference,
            index,
            old_value,
            new_value: item,
        });
    }

    let values: Vec<StackValue> = match iterable {
        Iterable::EmptyArray(_) | Iterable::Array => match ctx.heap.dereference(reference)? {
            HeapValue::SymbolicArray { storage, .. } => {
                storage.iter().map(|(_, value)| value.clone()).collect()
            }
            _ => unreachable!("The dereferenced array cannot change kind"),
        },
        Iterable::Collection => {
            // Assume the object is a collection: replay the values passed to
            // its `add`-family library calls.
            ctx.records
                .iter()
                .filter_map(|record| match record {
                    TraceRecord::InstanceLibraryMethodCall {
                        method,
                        scope,
                        arguments,
                        ..
                    } if *scope == reference && method.method.name.starts_with("add") => {
                        arguments.last().cloned()
                    }
                    _ => None,
                })
                .collect()
        }
    };

    for value in values.into_iter().rev() {
        frame.instructions.push(Instruction::BlockPop);
        frame
            .instructions
            .push(Instruction::DecodeStatement(body.clone()));
        frame.instructions.push(Instruction::Store {
            name: variable.to_string(),
        });
        frame.instructions.push(Instruction::Push(value));
        frame.instructions.push(Instruction::Allocate {
            name: variable.to_string(),
            ty: ty.clone(),
        });
        frame.instructions.push(Instruction::BlockPush);
    }

    Ok(())
}

fn parse_number(literal: &str, kind: PrimitiveKind) -> Option<PrimitiveLiteral> {
    let text = literal.trim();
    let parsed = match kind {
        PrimitiveKind::Byte => PrimitiveLiteral::Byte(text.parse().ok()?),
        PrimitiveKind::Short => PrimitiveLiteral::Short(text.parse().ok()?),
        PrimitiveKind::Int => PrimitiveLiteral::Int(text.parse().ok()?),
        PrimitiveKind::Long => {
            PrimitiveLiteral::Long(text.trim_end_matches(['L', 'l']).parse().ok()?)
        }
        PrimitiveKind::Float => {
            PrimitiveLiteral::Float(text.trim_end_matches(['F', 'f']).parse().ok()?)
        }
        PrimitiveKind::Double => {
            PrimitiveLiteral::Double(text.trim_end_matches(['D', 'd']).parse().ok()?)
        }
        PrimitiveKind::Boolean | PrimitiveKind::Char | PrimitiveKind::Void => return None,
    };
    Some(parsed)
}

#[cfg(test)]
mod test {
    use crate::{
        ctx::frame::interpreted::instruction::parse_number,
        memory::stack::PrimitiveLiteral,
        signature::PrimitiveKind,
    };

    #[test]
    fn numeric_literals_parse_with_their_suffixes() {
        assert_eq!(
            parse_number("42", PrimitiveKind::Int),
            Some(PrimitiveLiteral::Int(42))
        );
        assert_eq!(
            parse_number("7L", PrimitiveKind::Long),
            Some(PrimitiveLiteral::Long(7))
        );
        assert_eq!(
            parse_number("1.5f", PrimitiveKind::Float),
            Some(PrimitiveLiteral::Float(1.5))
        );
        assert_eq!(
            parse_number("-3", PrimitiveKind::Int),
            Some(PrimitiveLiteral::Int(-3))
        );
        assert_eq!(parse_number("x", PrimitiveKind::Int), None);
    }
}
