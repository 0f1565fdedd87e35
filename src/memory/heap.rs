//! This module contains the heap model: the arena of heap values addressed by
//! monotonically-increasing integer identifiers, and the string value model
//! used for `java/lang/String` semantics.
//!
//! The heap is never compacted during a run. References are plain integers
//! into the arena, never owning pointers, so object graphs with cycles are
//! represented without issue.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    constant::{FIRST_ALLOCATION_ID, NULL_REFERENCE_ID},
    error::execution::{Error, Result},
    memory::stack::{
        ConcreteValue,
        PrimitiveLiteral,
        ReferenceValue,
        StackType,
        StackValue,
        SymbolicValue,
        ValueId,
    },
    signature::{ClassSignature, PrimitiveKind, TypeSignature},
};

/// Gets the stack type that values of the provided primitive kind have at
/// runtime, or [`None`] for `void`.
#[must_use]
pub fn primitive_stack_type(kind: PrimitiveKind) -> Option<StackType> {
    let ty = match kind {
        PrimitiveKind::Boolean => StackType::Boolean,
        PrimitiveKind::Byte => StackType::Byte,
        PrimitiveKind::Char => StackType::Char,
        PrimitiveKind::Short => StackType::Short,
        PrimitiveKind::Int => StackType::Int,
        PrimitiveKind::Long => StackType::Long,
        PrimitiveKind::Float => StackType::Float,
        PrimitiveKind::Double => StackType::Double,
        PrimitiveKind::Void => return None,
    };
    Some(ty)
}

/// Constructs the default value for an uninitialized local or field of the
/// provided type.
///
/// Primitive defaults are the fixed constants of the language
/// (`false`/`0`/`'\0'`/`0.0`); reference types default to null. The `id` is
/// the creation identity for the concrete default.
#[must_use]
pub fn default_value(ty: &TypeSignature, id: ValueId) -> StackValue {
    let literal = match ty {
        TypeSignature::Primitive(PrimitiveKind::Boolean) => PrimitiveLiteral::Boolean(false),
        TypeSignature::Primitive(PrimitiveKind::Byte) => PrimitiveLiteral::Byte(0),
        TypeSignature::Primitive(PrimitiveKind::Short) => PrimitiveLiteral::Short(0),
        TypeSignature::Primitive(PrimitiveKind::Char) => PrimitiveLiteral::Char('\0'),
        TypeSignature::Primitive(PrimitiveKind::Int) => PrimitiveLiteral::Int(0),
        TypeSignature::Primitive(PrimitiveKind::Long) => PrimitiveLiteral::Long(0),
        TypeSignature::Primitive(PrimitiveKind::Float) => PrimitiveLiteral::Float(0.0),
        TypeSignature::Primitive(PrimitiveKind::Double) => PrimitiveLiteral::Double(0.0),
        TypeSignature::Primitive(PrimitiveKind::Void)
        | TypeSignature::Class(_)
        | TypeSignature::Array(_) => return StackValue::Reference(ReferenceValue::Nil),
    };
    StackValue::Concrete(ConcreteValue::new(id, literal))
}

/// The value model for `java/lang/String` semantics.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum StringValue {
    /// A string with known text.
    Concrete(String),

    /// An unconstrained string input, identified by its symbol.
    Symbolic(u64),

    /// A string wrapping a stringified stack value.
    FromStackValue(StackValue),

    /// A concatenation tree.
    ///
    /// Order-sensitive at construction, but compared commutatively by the
    /// value comparator.
    Composite {
        lhs: Box<StringValue>,
        rhs: Box<StringValue>,
    },
}

impl StringValue {
    /// Gets a short human-readable label for the string, used on graph nodes.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Concrete(text) if text.is_empty() => "EMPTY".to_string(),
            Self::Concrete(text) => text.clone(),
            Self::Symbolic(symbol) => format!("#{symbol} STRING"),
            Self::FromStackValue(value) => value.label(),
            Self::Composite { lhs, rhs } => format!("{} + {}", lhs.label(), rhs.label()),
        }
    }
}

/// One named field of an object.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Field {
    /// The declared name of the field.
    pub name: String,

    /// The declared type of the field.
    pub ty: TypeSignature,

    /// The current value of the field.
    pub value: StackValue,
}

/// A value stored on the heap.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum HeapValue {
    /// An object created concretely during execution.
    ConcreteObject {
        id: u64,
        ty: ClassSignature,
        fields: BTreeMap<String, Field>,
    },

    /// An object standing in for an unknown input.
    SymbolicObject {
        id: u64,
        ty: ClassSignature,
        fields: BTreeMap<String, Field>,
    },

    /// An array with sparse storage and a symbolic length.
    ///
    /// Storage preserves insertion order so that replay is deterministic.
    SymbolicArray {
        id: u64,
        ty: TypeSignature,
        storage: Vec<(StackValue, StackValue)>,
        length: SymbolicValue,
    },

    /// A boxed string value.
    BoxedString {
        id: u64,
        ty: ClassSignature,
        value: StringValue,
    },

    /// A boxed primitive (or other stack) value.
    BoxedStackValue {
        id: u64,
        ty: ClassSignature,
        value: StackValue,
    },

    /// A class literal (`Foo.class`).
    ClassObject {
        id: u64,
        ty: ClassSignature,
        representing: TypeSignature,
    },
}

impl HeapValue {
    /// Gets the heap identifier of this value.
    #[must_use]
    pub fn id(&self) -> u64 {
        match self {
            Self::ConcreteObject { id, .. }
            | Self::SymbolicObject { id, .. }
            | Self::SymbolicArray { id, .. }
            | Self::BoxedString { id, .. }
            | Self::BoxedStackValue { id, .. }
            | Self::ClassObject { id, .. } => *id,
        }
    }

    /// Gets the declared type signature of this value.
    #[must_use]
    pub fn type_signature(&self) -> TypeSignature {
        match self {
            Self::ConcreteObject { ty, .. }
            | Self::SymbolicObject { ty, .. }
            | Self::BoxedString { ty, .. }
            | Self::BoxedStackValue { ty, .. }
            | Self::ClassObject { ty, .. } => TypeSignature::Class(ty.clone()),
            Self::SymbolicArray { ty, .. } => ty.clone(),
        }
    }

    /// Gets the class used for virtual-dispatch lookup on this value.
    ///
    /// Arrays dispatch as `java/lang/Object`.
    #[must_use]
    pub fn lookup_type(&self) -> ClassSignature {
        match self {
            Self::ConcreteObject { ty, .. }
            | Self::SymbolicObject { ty, .. }
            | Self::BoxedString { ty, .. }
            | Self::BoxedStackValue { ty, .. }
            | Self::ClassObject { ty, .. } => ty.clone(),
            Self::SymbolicArray { .. } => ClassSignature::object(),
        }
    }

    /// Gets a reference value pointing at this heap value.
    #[must_use]
    pub fn reference(&self) -> ReferenceValue {
        ReferenceValue::Reference(self.id())
    }

    /// Gets the field storage of this value, if it has fields.
    #[must_use]
    pub fn fields(&self) -> Option<&BTreeMap<String, Field>> {
        match self {
            Self::ConcreteObject { fields, .. } | Self::SymbolicObject { fields, .. } => {
                Some(fields)
            }
            _ => None,
        }
    }

    /// Gets the component type if this value is an array.
    #[must_use]
    pub fn component_type(&self) -> Option<&TypeSignature> {
        match self {
            Self::SymbolicArray {
                ty: TypeSignature::Array(component),
                ..
            } => Some(component),
            _ => None,
        }
    }
}

/// Pool equality for interned literals: concrete values pool by their literal
/// payload irrespective of creation identity.
fn pool_equal(lhs: &StackValue, rhs: &StackValue) -> bool {
    match (lhs, rhs) {
        (StackValue::Concrete(l), StackValue::Concrete(r)) => l.literal == r.literal,
        (l, r) => l == r,
    }
}

/// The heap area owned by one execution context.
///
/// The identifier counter is shared between heap allocations, symbols, and
/// concrete-value identities; identifiers are unique within one run and are
/// never reused.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HeapArea {
    counter: u64,
    storage: BTreeMap<u64, HeapValue>,
    string_literals: BTreeMap<String, u64>,
    value_literals: Vec<(StackValue, u64)>,
    class_literals: Vec<(TypeSignature, u64)>,
}

impl HeapArea {
    /// Constructs a new, empty heap area.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counter: FIRST_ALLOCATION_ID,
            storage: BTreeMap::new(),
            string_literals: BTreeMap::new(),
            value_literals: Vec::new(),
            class_literals: Vec::new(),
        }
    }

    /// Hands out the next unused identifier.
    pub fn next_id(&mut self) -> u64 {
        let id = self.counter;
        self.counter += 1;
        id
    }

    /// Gets the identifier that the next allocation would receive.
    #[must_use]
    pub fn current_id(&self) -> u64 {
        self.counter
    }

    /// Iterates over the allocated heap values in identifier order.
    pub fn values(&self) -> impl Iterator<Item = &HeapValue> {
        self.storage.values()
    }

    /// Resolves a reference to the heap value it names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullDereference`] for the null reference (which
    /// terminates only the current path) and [`Error::InvalidReference`] for
    /// an unknown identifier (which is an engine bug and fatal).
    pub fn dereference(&self, reference: ReferenceValue) -> Result<&HeapValue> {
        let id = reference.id();
        if id == NULL_REFERENCE_ID {
            return Err(Error::NullDereference);
        }
        self.storage.get(&id).ok_or(Error::InvalidReference { id })
    }

    fn insert(&mut self, value: HeapValue) -> ReferenceValue {
        let reference = value.reference();
        self.storage.insert(value.id(), value);
        reference
    }

    //
    //  Symbolic allocation
    //

    /// Allocates a fresh symbol of the provided stack type.
    pub fn allocate_symbol(&mut self, ty: StackType) -> SymbolicValue {
        SymbolicValue::new(self.next_id(), ty)
    }

    /// Allocates a symbolic stand-in for an unknown input of the provided
    /// type: a fresh symbol for primitives, a symbolic object (or boxed
    /// wrapper) for class types, and a symbolic array for array types.
    ///
    /// # Panics
    ///
    /// Panics if asked for a symbolic value of type `void`, which is a
    /// programmer error.
    pub fn allocate_symbolic(&mut self, ty: &TypeSignature) -> StackValue {
        match ty {
            TypeSignature::Primitive(kind) => {
                let stack_type = primitive_stack_type(*kind)
                    .unwrap_or_else(|| panic!("Cannot allocate a symbolic value of type void"));
                StackValue::Symbolic(self.allocate_symbol(stack_type))
            }
            TypeSignature::Class(class) => {
                StackValue::Reference(self.allocate_symbolic_object(class))
            }
            TypeSignature::Array(_) => StackValue::Reference(self.allocate_symbolic_array(ty)),
        }
    }

    /// Allocates a symbolic object of the provided class.
    ///
    /// Boxed wrapper classes allocate a boxed symbolic primitive, and
    /// `java/lang/String` allocates a boxed symbolic string, so that unboxing
    /// and string operations behave uniformly.
    pub fn allocate_symbolic_object(&mut self, class: &ClassSignature) -> ReferenceValue {
        if let Some(kind) = class.unboxed() {
            return self.allocate_symbolic_boxed(class, kind);
        }

        if class.is_string() {
            return self.allocate_symbolic_string();
        }

        let id = self.next_id();
        self.insert(HeapValue::SymbolicObject {
            id,
            ty: class.clone(),
            fields: BTreeMap::new(),
        })
    }

    /// Allocates a symbolic array of the provided array type.
    pub fn allocate_symbolic_array(&mut self, ty: &TypeSignature) -> ReferenceValue {
        let id = self.next_id();
        let length = self.allocate_symbol(StackType::Int);
        self.insert(HeapValue::SymbolicArray {
            id,
            ty: ty.clone(),
            storage: Vec::new(),
            length,
        })
    }

    /// Allocates a boxed symbolic primitive of the provided kind.
    ///
    /// # Panics
    ///
    /// Panics if `kind` is `void`, which is a programmer error.
    pub fn allocate_symbolic_boxed(
        &mut self,
        class: &ClassSignature,
        kind: PrimitiveKind,
    ) -> ReferenceValue {
        let stack_type = primitive_stack_type(kind)
            .unwrap_or_else(|| panic!("Cannot box a symbolic value of type void"));
        let symbol = self.allocate_symbol(stack_type);
        let id = self.next_id();
        self.insert(HeapValue::BoxedStackValue {
            id,
            ty: class.clone(),
            value: StackValue::Symbolic(symbol),
        })
    }

    /// Allocates a boxed symbolic string.
    pub fn allocate_symbolic_string(&mut self) -> ReferenceValue {
        let id = self.next_id();
        let symbol = self.next_id();
        self.insert(HeapValue::BoxedString {
            id,
            ty: ClassSignature::string(),
            value: StringValue::Symbolic(symbol),
        })
    }

    //
    //  Concrete allocation
    //

    /// Allocates a concrete object of the provided class.
    ///
    /// Allocating a `java/lang/String` yields the interned empty string.
    pub fn allocate_object(&mut self, class: &ClassSignature) -> ReferenceValue {
        if class.is_string() {
            return self.get_or_allocate_string("");
        }

        let id = self.next_id();
        self.insert(HeapValue::ConcreteObject {
            id,
            ty: class.clone(),
            fields: BTreeMap::new(),
        })
    }

    /// Allocates a boxed string with the provided value.
    pub fn allocate_string(&mut self, value: StringValue) -> ReferenceValue {
        let id = self.next_id();
        self.insert(HeapValue::BoxedString {
            id,
            ty: ClassSignature::string(),
            value,
        })
    }

    /// Gets the interned box for a string literal, allocating it on first
    /// use.
    pub fn get_or_allocate_string(&mut self, text: &str) -> ReferenceValue {
        if let Some(id) = self.string_literals.get(text) {
            return ReferenceValue::Reference(*id);
        }

        let id = self.next_id();
        self.string_literals.insert(text.to_string(), id);
        self.insert(HeapValue::BoxedString {
            id,
            ty: ClassSignature::string(),
            value: StringValue::Concrete(text.to_string()),
        })
    }

    /// Gets the interned class-literal object for a type, allocating it on
    /// first use.
    pub fn get_or_allocate_class_object(&mut self, ty: &TypeSignature) -> ReferenceValue {
        if let Some((_, id)) = self.class_literals.iter().find(|(t, _)| t == ty) {
            return ReferenceValue::Reference(*id);
        }

        let id = self.next_id();
        self.class_literals.push((ty.clone(), id));
        self.insert(HeapValue::ClassObject {
            id,
            ty: ClassSignature::class(),
            representing: ty.clone(),
        })
    }

    /// Gets the interned box for a stack value, allocating it on first use.
    ///
    /// Concrete values pool by their literal payload, so boxing the same
    /// literal twice yields the same box.
    pub fn get_or_box(&mut self, value: &StackValue) -> ReferenceValue {
        if let Some((_, id)) = self.value_literals.iter().find(|(v, _)| pool_equal(v, value)) {
            return ReferenceValue::Reference(*id);
        }

        let boxed_kind = match value.stack_type() {
            StackType::Reference => None,
            StackType::Boolean => Some(PrimitiveKind::Boolean),
            StackType::Byte => Some(PrimitiveKind::Byte),
            StackType::Short => Some(PrimitiveKind::Short),
            StackType::Char => Some(PrimitiveKind::Char),
            StackType::Int => Some(PrimitiveKind::Int),
            StackType::Long => Some(PrimitiveKind::Long),
            StackType::Float => Some(PrimitiveKind::Float),
            StackType::Double => Some(PrimitiveKind::Double),
        };
        let class = boxed_kind
            .and_then(ClassSignature::boxed)
            .unwrap_or_else(ClassSignature::object);

        let id = self.next_id();
        self.value_literals.push((value.clone(), id));
        self.insert(HeapValue::BoxedStackValue {
            id,
            ty: class,
            value: value.clone(),
        })
    }

    //
    //  Fields
    //

    /// Gets the current value of a field on an object, if the field has been
    /// touched before.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the reference does not name an object with fields.
    pub fn field_value(&self, reference: ReferenceValue, name: &str) -> Result<Option<StackValue>> {
        let object = self.dereference(reference)?;
        let fields = object.fields().ok_or(Error::UnexpectedOperand {
            expected: "an object with fields",
            found: format!("heap value {}", object.id()),
        })?;
        Ok(fields.get(name).map(|field| field.value.clone()))
    }

    /// Sets the value of a field on an object.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the reference does not name an object with fields.
    pub fn set_field(
        &mut self,
        reference: ReferenceValue,
        name: &str,
        ty: &TypeSignature,
        value: StackValue,
    ) -> Result<()> {
        let id = reference.id();
        if id == NULL_REFERENCE_ID {
            return Err(Error::NullDereference);
        }
        let object = self.storage.get_mut(&id).ok_or(Error::InvalidReference { id })?;
        match object {
            HeapValue::ConcreteObject { fields, .. } | HeapValue::SymbolicObject { fields, .. } => {
                fields.insert(
                    name.to_string(),
                    Field {
                        name: name.to_string(),
                        ty: ty.clone(),
                        value,
                    },
                );
                Ok(())
            }
            _ => Err(Error::UnexpectedOperand {
                expected: "an object with fields",
                found: format!("heap value {id}"),
            }),
        }
    }

    //
    //  Arrays
    //

    /// Gets the member of an array at the provided index, if that index has
    /// been touched before.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the reference does not name an array.
    pub fn array_member(
        &self,
        reference: ReferenceValue,
        index: &StackValue,
    ) -> Result<Option<StackValue>> {
        match self.dereference(reference)? {
            HeapValue::SymbolicArray { storage, .. } => Ok(storage
                .iter()
                .find(|(i, _)| i == index)
                .map(|(_, value)| value.clone())),
            other => Err(Error::UnexpectedOperand {
                expected: "an array",
                found: format!("heap value {}", other.id()),
            }),
        }
    }

    /// Sets the member of an array at the provided index.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the reference does not name an array.
    pub fn set_array_member(
        &mut self,
        reference: ReferenceValue,
        index: StackValue,
        value: StackValue,
    ) -> Result<()> {
        let id = reference.id();
        if id == NULL_REFERENCE_ID {
            return Err(Error::NullDereference);
        }
        let object = self.storage.get_mut(&id).ok_or(Error::InvalidReference { id })?;
        match object {
            HeapValue::SymbolicArray { storage, .. } => {
                if let Some(slot) = storage.iter_mut().find(|(i, _)| *i == index) {
                    slot.1 = value;
                } else {
                    storage.push((index, value));
                }
                Ok(())
            }
            _ => Err(Error::UnexpectedOperand {
                expected: "an array",
                found: format!("heap value {id}"),
            }),
        }
    }

    /// Gets the length of an array.
    ///
    /// The length is the array's symbolic length symbol unless the array
    /// contains only concretely-indexed members, in which case it is the
    /// concrete member count.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the reference does not name an array.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn array_length(&mut self, reference: ReferenceValue) -> Result<StackValue> {
        let (length, concrete_count) = match self.dereference(reference)? {
            HeapValue::SymbolicArray { storage, length, .. } => {
                let only_concrete_indices = !storage.is_empty()
                    && storage.iter().all(|(index, _)| index.is_concrete());
                let count = only_concrete_indices.then_some(storage.len());
                (*length, count)
            }
            other => {
                return Err(Error::UnexpectedOperand {
                    expected: "an array",
                    found: format!("heap value {}", other.id()),
                })
            }
        };

        match concrete_count {
            Some(count) => {
                let id = self.next_id();
                Ok(StackValue::Concrete(ConcreteValue::new(
                    id,
                    PrimitiveLiteral::Int(count as i32),
                )))
            }
            None => Ok(StackValue::Symbolic(length)),
        }
    }

    //
    //  Promotion
    //

    /// Rewrites the heap slot named by `reference` to a value of the target
    /// type, preserving fields where both representations carry them.
    ///
    /// Promotion models the narrowing of a checked cast that static analysis
    /// could not prove.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the reference does not name an allocated value.
    pub fn promote(&mut self, reference: ReferenceValue, ty: &TypeSignature) -> Result<()> {
        let id = reference.id();
        let existing = self.dereference(reference)?;
        let fields = existing.fields().cloned().unwrap_or_default();

        let promoted = match ty {
            TypeSignature::Class(class) => {
                if let Some(kind) = class.unboxed() {
                    let stack_type = primitive_stack_type(kind)
                        .unwrap_or_else(|| panic!("Cannot box a symbolic value of type void"));
                    let symbol = self.allocate_symbol(stack_type);
                    HeapValue::BoxedStackValue {
                        id,
                        ty: class.clone(),
                        value: StackValue::Symbolic(symbol),
                    }
                } else if class.is_string() {
                    let symbol = self.next_id();
                    HeapValue::BoxedString {
                        id,
                        ty: class.clone(),
                        value: StringValue::Symbolic(symbol),
                    }
                } else {
                    HeapValue::SymbolicObject {
                        id,
                        ty: class.clone(),
                        fields,
                    }
                }
            }
            TypeSignature::Array(_) => {
                let length = self.allocate_symbol(StackType::Int);
                HeapValue::SymbolicArray {
                    id,
                    ty: ty.clone(),
                    storage: Vec::new(),
                    length,
                }
            }
            TypeSignature::Primitive(_) => {
                return Err(Error::UnexpectedOperand {
                    expected: "a reference type for promotion",
                    found: ty.to_string(),
                })
            }
        };

        self.storage.insert(id, promoted);
        Ok(())
    }
}

impl Default for HeapArea {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use crate::{
        error::execution::Error,
        memory::{
            heap::{default_value, HeapArea, HeapValue, StringValue},
            stack::{PrimitiveLiteral, ReferenceValue, StackType, StackValue},
        },
        signature::{ClassSignature, PrimitiveKind, TypeSignature},
    };

    #[test]
    fn dereferencing_null_and_unknown_ids_fails_loudly() {
        let heap = HeapArea::new();
        assert_eq!(
            heap.dereference(ReferenceValue::Nil),
            Err(Error::NullDereference)
        );
        assert_eq!(
            heap.dereference(ReferenceValue::Reference(42)),
            Err(Error::InvalidReference { id: 42 })
        );
    }

    #[test]
    fn string_literals_are_interned() {
        let mut heap = HeapArea::new();
        let first = heap.get_or_allocate_string("hello");
        let second = heap.get_or_allocate_string("hello");
        let other = heap.get_or_allocate_string("world");
        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[test]
    fn symbolic_allocation_dispatches_on_type() -> anyhow::Result<()> {
        let mut heap = HeapArea::new();

        let primitive = heap.allocate_symbolic(&TypeSignature::Primitive(PrimitiveKind::Int));
        assert!(matches!(primitive, StackValue::Symbolic(s) if s.ty == StackType::Int));

        let boxed = heap.allocate_symbolic(&TypeSignature::Class(ClassSignature::boxed(
            PrimitiveKind::Double,
        )
        .unwrap()));
        let reference = boxed.as_reference().unwrap();
        assert!(matches!(
            heap.dereference(reference)?,
            HeapValue::BoxedStackValue { .. }
        ));

        let string = heap.allocate_symbolic(&TypeSignature::Class(ClassSignature::string()));
        let reference = string.as_reference().unwrap();
        assert!(matches!(
            heap.dereference(reference)?,
            HeapValue::BoxedString {
                value: StringValue::Symbolic(_),
                ..
            }
        ));

        let array = heap
            .allocate_symbolic(&TypeSignature::Primitive(PrimitiveKind::Int).array_of(1));
        let reference = array.as_reference().unwrap();
        assert!(matches!(
            heap.dereference(reference)?,
            HeapValue::SymbolicArray { .. }
        ));

        Ok(())
    }

    #[test]
    fn array_length_prefers_the_concrete_count() -> anyhow::Result<()> {
        let mut heap = HeapArea::new();
        let ty = TypeSignature::Primitive(PrimitiveKind::Int).array_of(1);
        let array = heap.allocate_symbolic_array(&ty);

        // An untouched array has a symbolic length.
        assert!(matches!(heap.array_length(array)?, StackValue::Symbolic(_)));

        // Writing through concrete indices makes the length concrete.
        let index = default_value(&TypeSignature::Primitive(PrimitiveKind::Int), heap.next_id());
        let value = default_value(&TypeSignature::Primitive(PrimitiveKind::Int), heap.next_id());
        heap.set_array_member(array, index, value)?;
        assert!(matches!(
            heap.array_length(array)?,
            StackValue::Concrete(c) if c.literal == PrimitiveLiteral::Int(1)
        ));

        Ok(())
    }

    #[test]
    fn promotion_preserves_the_identifier_and_fields() -> anyhow::Result<()> {
        let mut heap = HeapArea::new();
        let class = ClassSignature::new("foo/Bar");
        let reference = heap.allocate_object(&class);

        let value = heap.allocate_symbolic(&TypeSignature::Primitive(PrimitiveKind::Int));
        heap.set_field(
            reference,
            "x",
            &TypeSignature::Primitive(PrimitiveKind::Int),
            value,
        )?;

        let target = TypeSignature::Class(ClassSignature::new("foo/Baz"));
        heap.promote(reference, &target)?;

        let promoted = heap.dereference(reference)?;
        assert_eq!(promoted.reference(), reference);
        assert!(matches!(promoted, HeapValue::SymbolicObject { .. }));
        assert!(promoted.fields().unwrap().contains_key("x"));

        Ok(())
    }
}
