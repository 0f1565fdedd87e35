//! This module contains the execution context: the exclusively-owned state of
//! one path of execution, together with the execution loop and the fork
//! primitive at the heart of the concolic exploration.
//!
//! A context owns exactly one heap, one static-field area, a frame stack, and
//! a trace record log. Forking deep-copies all of it — a fork is a plain data
//! clone queued for later execution, so the two sides share no mutable state.

pub mod frame;

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    error::execution::Error,
    interpreter::Config,
    memory::{
        heap::{Field, HeapArea},
        stack::{ConcreteValue, PrimitiveLiteral, ReferenceValue, StackValue, ValueId},
    },
    resolve::{DescriptorResolver, SourceResolver},
    signature::{ClassSignature, QualifiedMethodSignature, TypeSignature},
    trace::{ExecutionTrace, TraceRecord},
    watchdog::DynWatchdog,
};

use frame::{BytecodeFrame, Frame, InterpretedFrame, SyntheticFrame};
use frame::interpreted::{Instruction, Locals};

/// The identity of one branch site, used to bound how many times the site may
/// fork within a single path.
///
/// Decoded sites are numbered as the decoder first encounters them; bytecode
/// sites are identified by their code offset.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum BranchSite {
    /// A branch site in decoded AST instructions.
    Decoded(u64),

    /// A branch site at a bytecode offset.
    Bytecode(u32),
}

/// A control transfer raised out of instruction execution.
#[derive(Clone, Debug)]
pub enum Interrupt {
    /// A return from the current frame, with the returned value if any.
    Return(Option<StackValue>),

    /// A thrown exception that must unwind to a handler.
    Throw(ReferenceValue),

    /// A termination of this path; the message becomes a halt record.
    Halt(String),

    /// A fatal error aborting the analysis of the entry point.
    Fatal(Error),
}

/// Heap and resolution errors surface as path halts where the modeled
/// language would raise a null pointer exception, and as fatal errors
/// everywhere else.
impl From<Error> for Interrupt {
    fn from(value: Error) -> Self {
        match value {
            Error::NullDereference => Self::Halt("Null pointer dereference".to_string()),
            other => Self::Fatal(other),
        }
    }
}

/// The result type for one step of execution.
pub type StepResult<T = ()> = std::result::Result<T, Interrupt>;

/// Checks whether `sub` is assignable to `sup` under the known class
/// hierarchy.
///
/// Everything is assignable to `java/lang/Object`; beyond that the resolver's
/// superclass chain decides. The walk is bounded to guard against malformed
/// cyclic hierarchies.
pub(crate) fn assignable(
    resolver: &dyn DescriptorResolver,
    sub: &ClassSignature,
    sup: &ClassSignature,
) -> bool {
    if sub == sup || *sup == ClassSignature::object() {
        return true;
    }

    let mut current = sub.clone();
    for _ in 0..64 {
        match resolver.superclass(&current) {
            Some(parent) if parent == *sup => return true,
            Some(parent) => current = parent,
            None => break,
        }
    }
    false
}

/// The static-field area of one execution context.
#[derive(Clone, Debug, Default)]
pub struct ClassArea {
    statics: BTreeMap<(ClassSignature, String), Field>,
}

impl ClassArea {
    /// Gets the current value of a static field, if it has been touched
    /// before.
    #[must_use]
    pub fn load(&self, declaring_class: &ClassSignature, name: &str) -> Option<StackValue> {
        self.statics
            .get(&(declaring_class.clone(), name.to_string()))
            .map(|field| field.value.clone())
    }

    /// Sets the value of a static field.
    pub fn store(
        &mut self,
        declaring_class: &ClassSignature,
        name: &str,
        ty: &TypeSignature,
        value: StackValue,
    ) {
        self.statics.insert(
            (declaring_class.clone(), name.to_string()),
            Field {
                name: name.to_string(),
                ty: ty.clone(),
                value,
            },
        );
    }
}

/// The exclusively-owned state of one path of execution.
#[derive(Debug)]
pub struct ExecutionContext {
    /// The engine configuration.
    pub(crate) config: Config,

    /// The heap area.
    pub(crate) heap: HeapArea,

    /// The static-field area.
    pub(crate) statics: ClassArea,

    /// The call stack.
    pub(crate) frames: Vec<Frame>,

    /// The append-only trace record log.
    pub(crate) records: Vec<TraceRecord>,

    /// Fork counts per branch site, owned by this path.
    pub(crate) fork_counts: BTreeMap<BranchSite, usize>,

    /// The next decoded branch-site number.
    branch_sites: u64,

    /// Contexts forked from this one, awaiting transfer to the work queue.
    pub(crate) pending_forks: Vec<ExecutionContext>,

    /// The descriptor resolver boundary.
    pub(crate) descriptors: Arc<dyn DescriptorResolver>,

    /// The source resolver boundary.
    pub(crate) sources: Arc<dyn SourceResolver>,
}

impl ExecutionContext {
    /// Constructs a new context with an empty heap and frame stack.
    #[must_use]
    pub fn new(
        config: Config,
        descriptors: Arc<dyn DescriptorResolver>,
        sources: Arc<dyn SourceResolver>,
    ) -> Self {
        Self {
            config,
            heap: HeapArea::new(),
            statics: ClassArea::default(),
            frames: Vec::new(),
            records: Vec::new(),
            fork_counts: BTreeMap::new(),
            branch_sites: 0,
            pending_forks: Vec::new(),
            descriptors,
            sources,
        }
    }

    /// Pushes a frame onto the call stack.
    pub fn push_frame(&mut self, frame: impl Into<Frame>) {
        self.frames.push(frame.into());
    }

    //
    //  Identifiers
    //

    /// Hands out the next unused identifier from the run-wide counter.
    pub(crate) fn next_id(&mut self) -> ValueId {
        self.heap.next_id()
    }

    /// Creates a concrete value with a fresh creation identity.
    pub(crate) fn new_concrete(&mut self, literal: PrimitiveLiteral) -> StackValue {
        let id = self.next_id();
        StackValue::Concrete(ConcreteValue::new(id, literal))
    }

    /// Hands out the next decoded branch-site identity.
    pub(crate) fn next_branch_site(&mut self) -> BranchSite {
        let site = BranchSite::Decoded(self.branch_sites);
        self.branch_sites += 1;
        site
    }

    /// Gets the number of times the provided site has re-entered or forked on
    /// this path.
    pub(crate) fn site_count(&self, site: BranchSite) -> usize {
        self.fork_counts.get(&site).copied().unwrap_or(0)
    }

    /// Bumps the counter of the provided site.
    pub(crate) fn bump_site(&mut self, site: BranchSite) {
        *self.fork_counts.entry(site).or_insert(0) += 1;
    }

    //
    //  Forking
    //

    /// Deep-copies this context for a fork. The clone carries no pending
    /// forks of its own.
    fn fork_clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            heap: self.heap.clone(),
            statics: self.statics.clone(),
            frames: self.frames.clone(),
            records: self.records.clone(),
            fork_counts: self.fork_counts.clone(),
            branch_sites: self.branch_sites,
            pending_forks: Vec::new(),
            descriptors: Arc::clone(&self.descriptors),
            sources: Arc::clone(&self.sources),
        }
    }

    /// Forks this context at a symbolic branch.
    ///
    /// The child assumes the branch is taken: it records
    /// `Assertion(condition, true)`, receives a clone of the current frame
    /// mutated by `taken`, and is parked for the work queue. This context
    /// assumes the branch is not taken and records
    /// `Assertion(condition, false)`.
    ///
    /// Once the site's fork count exceeds the configured bound, forking is
    /// suppressed: only the not-taken side proceeds, deterministically.
    /// Returns whether a child was actually created.
    pub(crate) fn fork_branch<F>(
        &mut self,
        current_frame: &F,
        site: BranchSite,
        condition: &StackValue,
        taken: impl FnOnce(&mut ExecutionContext, &mut F),
    ) -> bool
    where
        F: Clone + Into<Frame>,
    {
        let forked = if self.site_count(site) < self.config.max_loop_executions {
            self.bump_site(site);

            let mut child = self.fork_clone();
            child.records.push(TraceRecord::Assertion {
                condition: condition.clone(),
                truth: true,
            });
            let mut child_frame = current_frame.clone();
            taken(&mut child, &mut child_frame);
            child.frames.push(child_frame.into());

            debug!(?site, "forking execution");
            self.pending_forks.push(child);
            true
        } else {
            debug!(?site, "fork suppressed at bounded site");
            false
        };

        self.records.push(TraceRecord::Assertion {
            condition: condition.clone(),
            truth: false,
        });
        forked
    }

    //
    //  Execution
    //

    /// Runs this context to termination, producing its trace and any contexts
    /// forked along the way.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] on a fatal engine error or when stopped by the
    /// watchdog; either aborts the analysis of the whole entry point.
    pub fn execute(
        mut self,
        watchdog: &DynWatchdog,
    ) -> Result<(ExecutionTrace, Vec<ExecutionContext>), Error> {
        let poll_interval = watchdog.poll_every().max(1);
        let mut counter = 0_usize;

        while !self.frames.is_empty() {
            if counter % poll_interval == 0 && watchdog.should_stop() {
                return Err(Error::StoppedByWatchdog);
            }
            counter += 1;

            let depth = self.frames.len() - 1;
            let mut current = self.frames.pop().expect("The frame stack is not empty");

            let result = if current.is_finished() {
                Err(current.completion_interrupt())
            } else {
                if self.config.logging_enabled {
                    trace!(method = ?current.method(), "executing instruction");
                }
                current.execute_next(&mut self)
            };

            match result {
                Ok(()) => self.frames.insert(depth, current),
                Err(Interrupt::Return(value)) => {
                    if let (Some(value), Some(caller)) = (value, self.frames.last_mut()) {
                        caller.push(value);
                    }
                }
                Err(Interrupt::Throw(reference)) => {
                    self.frames.insert(depth, current);
                    self.handle_throw(reference)?;
                }
                Err(Interrupt::Halt(message)) => {
                    self.records.push(TraceRecord::Halt { message });
                    break;
                }
                Err(Interrupt::Fatal(error)) => return Err(error),
            }
        }

        debug!(records = self.records.len(), "path terminated");
        Ok((
            ExecutionTrace::new(self.records, self.heap),
            self.pending_forks,
        ))
    }

    /// Unwinds the frame stack for a thrown exception, entering the first
    /// registered handler whose type the exception is assignable to.
    ///
    /// If no frame handles the exception, an uncaught-exception record is
    /// appended and the path terminates.
    fn handle_throw(&mut self, reference: ReferenceValue) -> Result<(), Error> {
        let ty = match self.heap.dereference(reference) {
            Ok(value) => value.lookup_type(),
            Err(Error::NullDereference) => {
                self.records.push(TraceRecord::Halt {
                    message: "Null pointer dereference".to_string(),
                });
                self.frames.clear();
                return Ok(());
            }
            Err(error) => return Err(error),
        };

        loop {
            match self.frames.last() {
                None => break,
                Some(Frame::Interpreted(_)) => {}
                Some(_) => {
                    self.frames.pop();
                    continue;
                }
            }

            let Some(Frame::Interpreted(current)) = self.frames.last_mut() else {
                unreachable!("The top frame was just checked to be interpreted")
            };

            let mut handled = false;
            while let Some(scope) = current.exceptions.pop() {
                current.instructions.truncate(scope.watermarks.instructions);
                current.operands.truncate(scope.watermarks.operands);
                current.locals.truncate_depth(scope.watermarks.locals);
                current.breaks.truncate(scope.breaks);
                current.continues.truncate(scope.continues);

                let handler = scope
                    .handlers
                    .iter()
                    .find(|handler| assignable(self.descriptors.as_ref(), &ty, &handler.ty));

                if let Some(handler) = handler {
                    let body = Arc::new(crate::ast::Statement::Block(handler.body.clone()));
                    current.instructions.push(Instruction::BlockPop);
                    current.instructions.push(Instruction::DecodeStatement(body));
                    current.instructions.push(Instruction::Store {
                        name: handler.name.clone(),
                    });
                    current
                        .instructions
                        .push(Instruction::Push(StackValue::Reference(reference)));
                    current.instructions.push(Instruction::Allocate {
                        name: handler.name.clone(),
                        ty: TypeSignature::Class(handler.ty.clone()),
                    });
                    current.instructions.push(Instruction::BlockPush);
                    handled = true;
                    break;
                }
            }

            if handled {
                return Ok(());
            }
            self.frames.pop();
        }

        self.records.push(TraceRecord::UncaughtException { ty });
        Ok(())
    }

    //
    //  Field and array access
    //

    /// Loads an instance field, synthesizing a symbolic default on first
    /// touch.
    pub(crate) fn object_field_load(
        &mut self,
        reference: ReferenceValue,
        name: &str,
        ty: &TypeSignature,
    ) -> StepResult<StackValue> {
        if let Some(value) = self.heap.field_value(reference, name)? {
            return Ok(value);
        }

        let default = self.heap.allocate_symbolic(ty);
        self.heap.set_field(reference, name, ty, default.clone())?;
        self.records.push(TraceRecord::DefaultInstanceFieldValue {
            reference,
            field: name.to_string(),
            value: default.clone(),
        });
        Ok(default)
    }

    /// Loads a static field, synthesizing a symbolic default on first touch.
    pub(crate) fn static_field_load(
        &mut self,
        declaring_class: &ClassSignature,
        name: &str,
        ty: &TypeSignature,
    ) -> StackValue {
        if let Some(value) = self.statics.load(declaring_class, name) {
            return value;
        }

        let default = self.heap.allocate_symbolic(ty);
        self.statics.store(declaring_class, name, ty, default.clone());
        self.records.push(TraceRecord::DefaultStaticFieldValue {
            declaring_class: declaring_class.clone(),
            field: name.to_string(),
            value: default.clone(),
        });
        default
    }

    /// Loads an array member, synthesizing a symbolic member for an index
    /// that has not been touched.
    pub(crate) fn array_member_load(
        &mut self,
        reference: ReferenceValue,
        index: StackValue,
    ) -> StepResult<StackValue> {
        if let Some(value) = self.heap.array_member(reference, &index)? {
            return Ok(value);
        }

        let component = self
            .heap
            .dereference(reference)?
            .component_type()
            .cloned()
            .unwrap_or_else(|| TypeSignature::Class(ClassSignature::object()));
        let value = self.heap.allocate_symbolic(&component);
        self.heap.set_array_member(reference, index, value.clone())?;
        Ok(value)
    }

    //
    //  Invocation
    //

    /// Finds the signature virtual dispatch should invoke for a receiver
    /// class: the first class up the superclass chain with an available body,
    /// falling back to the statically declared signature.
    pub(crate) fn dispatch_target(
        &self,
        receiver_class: &ClassSignature,
        declared: &QualifiedMethodSignature,
    ) -> QualifiedMethodSignature {
        let mut current = receiver_class.clone();
        for _ in 0..64 {
            let candidate =
                QualifiedMethodSignature::new(current.clone(), declared.method.clone());
            if self.sources.method_body(&candidate).is_some()
                || self.sources.method_bytecode(&candidate).is_some()
            {
                return candidate;
            }
            match self.descriptors.superclass(&current) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        declared.clone()
    }

    /// Invokes a method: an interpreted frame when an AST body is available,
    /// a bytecode frame when only bytecode is, and library-call synthesis
    /// otherwise.
    ///
    /// `caller_operands` is the operand stack of the invoking frame, which
    /// receives a synthesized result for opaque non-void calls.
    pub(crate) fn invoke(
        &mut self,
        signature: &QualifiedMethodSignature,
        receiver: Option<ReferenceValue>,
        arguments: Vec<StackValue>,
        caller_operands: &mut Vec<StackValue>,
    ) -> StepResult {
        if let Some(body) = self.sources.method_body(signature) {
            self.check_recursion(signature)?;
            let descriptor = self
                .descriptors
                .resolve_method(signature)
                .map_err(Interrupt::Fatal)?;

            let mut locals = Locals::new();
            if let Some(receiver) = receiver {
                locals.allocate(
                    "this",
                    TypeSignature::Class(signature.declaring_class.clone()),
                    StackValue::Reference(receiver),
                );
            }
            for (index, value) in arguments.into_iter().enumerate() {
                let name = descriptor
                    .parameter_names
                    .get(index)
                    .cloned()
                    .unwrap_or_else(|| format!("arg{index}"));
                let ty = signature
                    .method
                    .argument_types
                    .get(index)
                    .cloned()
                    .unwrap_or_else(|| TypeSignature::Class(ClassSignature::object()));
                locals.allocate(name, ty, value);
            }

            let mut frame = InterpretedFrame::new(signature.clone(), locals);
            frame.instructions.push(Instruction::DecodeStatement(Arc::new(
                crate::ast::Statement::Block(body),
            )));
            self.frames.push(Frame::Interpreted(frame));
            Ok(())
        } else if let Some(code) = self.sources.method_bytecode(signature) {
            self.check_recursion(signature)?;

            let mut locals = Vec::new();
            if let Some(receiver) = receiver {
                locals.push(StackValue::Reference(receiver));
            }
            locals.extend(arguments);

            let frame = BytecodeFrame::new(signature.clone(), code, locals);
            self.frames.push(Frame::Bytecode(frame));
            Ok(())
        } else {
            self.synthesize_library_call(signature, receiver, arguments, caller_operands);
            Ok(())
        }
    }

    /// Raises a fatal error when the same method already occupies more frames
    /// than the configured recursion bound.
    fn check_recursion(&self, signature: &QualifiedMethodSignature) -> StepResult {
        let depth = self
            .frames
            .iter()
            .filter(|frame| frame.method() == Some(signature))
            .count();
        if depth > self.config.max_recursive_calls {
            return Err(Interrupt::Fatal(Error::TooManyContexts {
                method: signature.clone(),
                limit: self.config.max_recursive_calls,
            }));
        }
        Ok(())
    }

    /// Models a call to a method with no available body.
    ///
    /// Such calls never fork or recurse: a non-void call synthesizes a fresh
    /// symbolic result — reusing the receiver reference when the declared
    /// return type equals the receiver's type, which models fluent APIs
    /// without spending extra symbols — and the call is captured as a library
    /// call record.
    fn synthesize_library_call(
        &mut self,
        signature: &QualifiedMethodSignature,
        receiver: Option<ReferenceValue>,
        arguments: Vec<StackValue>,
        caller_operands: &mut Vec<StackValue>,
    ) {
        let return_type = &signature.method.return_type;
        let result = if return_type.is_void() {
            None
        } else {
            let declared_class = TypeSignature::Class(signature.declaring_class.clone());
            let value = match receiver {
                Some(receiver) if !receiver.is_nil() && *return_type == declared_class => {
                    StackValue::Reference(receiver)
                }
                _ => self.heap.allocate_symbolic(return_type),
            };
            caller_operands.push(value.clone());
            self.records.push(TraceRecord::SynthesisedReturnValue {
                method: signature.clone(),
                result: value.clone(),
            });
            Some(value)
        };

        match receiver {
            Some(scope) => self.records.push(TraceRecord::InstanceLibraryMethodCall {
                method: signature.clone(),
                scope,
                arguments,
                result,
            }),
            None => self.records.push(TraceRecord::StaticLibraryMethodCall {
                method: signature.clone(),
                arguments,
                result,
            }),
        }
    }

    /// Bootstraps this context for the provided entry point: a synthetic
    /// frame that allocates symbolic receiver and arguments, records the
    /// entry markers, and invokes the method.
    pub(crate) fn bootstrap(&mut self, entry: &QualifiedMethodSignature, is_static: bool) {
        let mut frame = SyntheticFrame::new("bootstrap");

        frame.instructions.push(frame::synthetic::SyntheticInstruction::InvokeEntry {
            signature: entry.clone(),
            is_static,
        });
        for ty in entry.method.argument_types.iter().rev() {
            frame
                .instructions
                .push(frame::synthetic::SyntheticInstruction::RecordEntryParameter);
            frame
                .instructions
                .push(frame::synthetic::SyntheticInstruction::AllocateSymbolic(ty.clone()));
        }
        if !is_static {
            frame
                .instructions
                .push(frame::synthetic::SyntheticInstruction::RecordEntryScope);
            frame
                .instructions
                .push(frame::synthetic::SyntheticInstruction::AllocateSymbolic(
                    TypeSignature::Class(entry.declaring_class.clone()),
                ));
        }
        frame
            .instructions
            .push(frame::synthetic::SyntheticInstruction::RecordEntryMethod(entry.clone()));

        self.frames.push(Frame::Synthetic(frame));
    }
}
