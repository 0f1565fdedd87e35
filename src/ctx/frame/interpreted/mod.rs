//! This module contains the interpreted execution frame: the frame kind that
//! executes a flat, pre-decoded instruction sequence produced from an AST
//! method body.

pub mod decoder;
pub mod instruction;
pub mod operators;

use std::sync::Arc;

use crate::{
    ast,
    ctx::{ExecutionContext, Interrupt, StepResult},
    error::execution::Error,
    memory::stack::StackValue,
    signature::{ClassSignature, QualifiedMethodSignature, TypeSignature},
};

pub use instruction::Instruction;

/// One local variable slot.
#[derive(Clone, Debug)]
pub struct Local {
    /// The declared name.
    pub name: String,

    /// The declared type.
    pub ty: TypeSignature,

    /// The current value.
    pub value: StackValue,
}

/// One lexical scope of local variables.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    storage: Vec<Local>,
}

impl Scope {
    fn get(&self, name: &str) -> Option<&Local> {
        self.storage.iter().find(|local| local.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Local> {
        self.storage.iter_mut().find(|local| local.name == name)
    }
}

/// The chain of lexical scopes of one interpreted frame.
///
/// A lookup walks outward to the nearest enclosing scope that declared the
/// name; lookups on undeclared names are engine errors.
#[derive(Clone, Debug)]
pub struct Locals {
    scopes: Vec<Scope>,
}

impl Locals {
    /// Constructs a locals chain holding only the root scope.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    /// Gets the current scope depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Enters a new innermost scope.
    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Leaves the innermost scope.
    pub fn pop_scope(&mut self) {
        self.scopes.pop();
        debug_assert!(!self.scopes.is_empty(), "The root scope must never be popped");
    }

    /// Drops scopes until the chain is at the provided depth.
    pub fn truncate_depth(&mut self, depth: usize) {
        self.scopes.truncate(depth.max(1));
    }

    /// Declares a name in the innermost scope with the provided initial
    /// value.
    ///
    /// Redeclaration in the same scope replaces the slot, shadowing in an
    /// inner scope hides the outer slot.
    pub fn allocate(&mut self, name: impl Into<String>, ty: TypeSignature, value: StackValue) {
        let name = name.into();
        let scope = self.scopes.last_mut().expect("The root scope always exists");
        if let Some(local) = scope.get_mut(&name) {
            local.ty = ty;
            local.value = value;
        } else {
            scope.storage.push(Local { name, ty, value });
        }
    }

    /// Assigns a value to the nearest enclosing declaration of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnallocatedReference`] if no enclosing scope declares
    /// the name.
    pub fn assign(&mut self, name: &str, value: StackValue) -> Result<(), Error> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(local) = scope.get_mut(name) {
                local.value = value;
                return Ok(());
            }
        }
        Err(Error::UnallocatedReference {
            name: name.to_string(),
        })
    }

    /// Resolves the value of the nearest enclosing declaration of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnallocatedReference`] if no enclosing scope declares
    /// the name.
    pub fn resolve(&self, name: &str) -> Result<StackValue, Error> {
        for scope in self.scopes.iter().rev() {
            if let Some(local) = scope.get(name) {
                return Ok(local.value.clone());
            }
        }
        Err(Error::UnallocatedReference {
            name: name.to_string(),
        })
    }

    /// Gets the declared type of the nearest enclosing declaration of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnallocatedReference`] if no enclosing scope declares
    /// the name.
    pub fn type_of(&self, name: &str) -> Result<TypeSignature, Error> {
        for scope in self.scopes.iter().rev() {
            if let Some(local) = scope.get(name) {
                return Ok(local.ty.clone());
            }
        }
        Err(Error::UnallocatedReference {
            name: name.to_string(),
        })
    }
}

impl Default for Locals {
    fn default() -> Self {
        Self::new()
    }
}

/// The stack heights a control scope restores on transfer.
#[derive(Clone, Copy, Debug)]
pub struct Watermarks {
    /// The instruction-stack height to truncate to.
    pub instructions: usize,

    /// The operand-stack height to truncate to.
    pub operands: usize,

    /// The locals-chain depth to truncate to.
    pub locals: usize,
}

/// One registered exception handler.
#[derive(Clone, Debug)]
pub struct ExceptionHandler {
    /// The name the caught exception is bound to.
    pub name: String,

    /// The exception type this handler accepts.
    pub ty: ClassSignature,

    /// The handler body.
    pub body: Arc<ast::Block>,
}

/// A registered try scope with its handlers.
#[derive(Clone, Debug)]
pub struct ExceptionScope {
    pub watermarks: Watermarks,
    pub handlers: Vec<ExceptionHandler>,
    pub breaks: usize,
    pub continues: usize,
}

/// A registered break target.
#[derive(Clone, Debug)]
pub struct BreakScope {
    pub watermarks: Watermarks,
    pub continues: usize,
    pub exceptions: usize,
}

/// A registered continue target.
///
/// The continuation holds the loop-head instructions to re-push, in push
/// order, when a continue transfers here.
#[derive(Clone, Debug)]
pub struct ContinueScope {
    pub watermarks: Watermarks,
    pub exceptions: usize,
    pub continuation: Vec<Instruction>,
}

/// The interpreted execution frame.
///
/// Instructions execute from the back of `instructions`; decoding pushes
/// pending work there so that execution never recurses into the AST.
#[derive(Clone, Debug)]
pub struct InterpretedFrame {
    /// The method this frame executes.
    pub method: QualifiedMethodSignature,

    /// The pending instruction stack.
    pub instructions: Vec<Instruction>,

    /// The operand stack.
    pub operands: Vec<StackValue>,

    /// The scoped local variables.
    pub locals: Locals,

    /// The registered try scopes.
    pub exceptions: Vec<ExceptionScope>,

    /// The registered break targets.
    pub breaks: Vec<BreakScope>,

    /// The registered continue targets.
    pub continues: Vec<ContinueScope>,
}

impl InterpretedFrame {
    /// Constructs a frame for `method` with the provided pre-seeded locals.
    #[must_use]
    pub fn new(method: QualifiedMethodSignature, locals: Locals) -> Self {
        Self {
            method,
            instructions: Vec::new(),
            operands: Vec::new(),
            locals,
            exceptions: Vec::new(),
            breaks: Vec::new(),
            continues: Vec::new(),
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
        instruction::execute(instruction, ctx, self)
    }

    /// Gets the control transfer that completes this frame once it has run
    /// out of instructions: an implicit void return, or a halt for a
    /// non-void method that never returned.
    pub(crate) fn completion_interrupt(&self) -> Interrupt {
        if self.method.method.return_type.is_void() {
            Interrupt::Return(None)
        } else {
            Interrupt::Halt(format!(
                "Expected a return statement from non-void method {}",
                self.method
            ))
        }
    }

    /// Captures the current stack heights for a control scope.
    #[must_use]
    pub fn watermarks(&self) -> Watermarks {
        Watermarks {
            instructions: self.instructions.len(),
            operands: self.operands.len(),
            locals: self.locals.depth(),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        ctx::frame::interpreted::Locals,
        error::execution::Error,
        memory::stack::{ReferenceValue, StackValue},
        signature::{ClassSignature, TypeSignature},
    };

    fn nil() -> StackValue {
        StackValue::Reference(ReferenceValue::Nil)
    }

    fn reference(id: u64) -> StackValue {
        StackValue::Reference(ReferenceValue::Reference(id))
    }

    fn object_type() -> TypeSignature {
        TypeSignature::Class(ClassSignature::object())
    }

    #[test]
    fn lookups_walk_outward_through_enclosing_scopes() -> anyhow::Result<()> {
        let mut locals = Locals::new();
        locals.allocate("a", object_type(), nil());
        locals.push_scope();
        locals.allocate("b", object_type(), reference(1));

        assert_eq!(locals.resolve("a")?, nil());
        assert_eq!(locals.resolve("b")?, reference(1));

        // Assignment through an inner scope updates the outer slot.
        locals.assign("a", reference(2))?;
        locals.pop_scope();
        assert_eq!(locals.resolve("a")?, reference(2));

        Ok(())
    }

    #[test]
    fn undeclared_names_fail_with_unallocated_reference() {
        let locals = Locals::new();
        assert!(matches!(
            locals.resolve("missing"),
            Err(Error::UnallocatedReference { .. })
        ));
    }

    #[test]
    fn inner_declarations_shadow_and_die_with_their_scope() -> anyhow::Result<()> {
        let mut locals = Locals::new();
        locals.allocate("x", object_type(), reference(1));
        locals.push_scope();
        locals.allocate("x", object_type(), reference(2));
        assert_eq!(locals.resolve("x")?, reference(2));

        locals.pop_scope();
        assert_eq!(locals.resolve("x")?, reference(1));
        Ok(())
    }
}
