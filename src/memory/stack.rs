//! This module contains the stack value model: the tagged union of concrete,
//! symbolic, computed, and reference values that flows through the operand
//! stacks, the locals, and the heap.
//!
//! Values are structurally immutable. New values are created and old ones are
//! never mutated, which makes them safe to share freely across forked
//! execution contexts.

use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::constant::NULL_REFERENCE_ID;

/// The identity of a value creation event.
///
/// Two concrete values with equal payloads but different identities were
/// created at different points during execution and are deliberately kept
/// apart by the graph builder's node cache.
pub type ValueId = u64;

/// The runtime type tag of a stack value.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum StackType {
    Reference,
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
}

impl StackType {
    /// Checks whether this type participates in numeric widening.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        !matches!(self, Self::Reference | Self::Boolean)
    }
}

/// The payload of a concrete value: one literal of a primitive type.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub enum PrimitiveLiteral {
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Char(char),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl PrimitiveLiteral {
    /// Gets the stack type of this literal.
    #[must_use]
    pub fn stack_type(self) -> StackType {
        match self {
            Self::Boolean(_) => StackType::Boolean,
            Self::Byte(_) => StackType::Byte,
            Self::Short(_) => StackType::Short,
            Self::Char(_) => StackType::Char,
            Self::Int(_) => StackType::Int,
            Self::Long(_) => StackType::Long,
            Self::Float(_) => StackType::Float,
            Self::Double(_) => StackType::Double,
        }
    }

    /// Gets the numeric representation of this literal as a double, with
    /// booleans mapping to 0/1 and chars to their code point.
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Boolean(value) => {
                if value {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Byte(value) => f64::from(value),
            Self::Short(value) => f64::from(value),
            Self::Char(value) => f64::from(u32::from(value)),
            Self::Int(value) => f64::from(value),
            #[allow(clippy::cast_precision_loss)] // Widening for comparison purposes only
            Self::Long(value) => value as f64,
            Self::Float(value) => f64::from(value),
            Self::Double(value) => value,
        }
    }

    /// Gets the numeric representation of this literal as a truncated 64-bit
    /// integer.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Truncation is the documented semantic
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Boolean(value) => i64::from(value),
            Self::Byte(value) => i64::from(value),
            Self::Short(value) => i64::from(value),
            Self::Char(value) => i64::from(u32::from(value)),
            Self::Int(value) => i64::from(value),
            Self::Long(value) => value,
            Self::Float(value) => value as i64,
            Self::Double(value) => value as i64,
        }
    }

    /// Gets the numeric representation of this literal as a truncated 32-bit
    /// integer.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Truncation is the documented semantic
    pub fn as_i32(self) -> i32 {
        self.as_i64() as i32
    }
}

/// Equality over literals is bit-exact for the floating-point payloads so that
/// the implementation remains a lawful [`Eq`] for use in hashed caches.
impl PartialEq for PrimitiveLiteral {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Boolean(l), Self::Boolean(r)) => l == r,
            (Self::Byte(l), Self::Byte(r)) => l == r,
            (Self::Short(l), Self::Short(r)) => l == r,
            (Self::Char(l), Self::Char(r)) => l == r,
            (Self::Int(l), Self::Int(r)) => l == r,
            (Self::Long(l), Self::Long(r)) => l == r,
            (Self::Float(l), Self::Float(r)) => l.to_bits() == r.to_bits(),
            (Self::Double(l), Self::Double(r)) => l.to_bits() == r.to_bits(),
            _ => false,
        }
    }
}

impl Eq for PrimitiveLiteral {}

impl Hash for PrimitiveLiteral {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Boolean(value) => value.hash(state),
            Self::Byte(value) => value.hash(state),
            Self::Short(value) => value.hash(state),
            Self::Char(value) => value.hash(state),
            Self::Int(value) => value.hash(state),
            Self::Long(value) => value.hash(state),
            Self::Float(value) => value.to_bits().hash(state),
            Self::Double(value) => value.to_bits().hash(state),
        }
    }
}

impl Display for PrimitiveLiteral {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Byte(value) => write!(f, "{value}"),
            Self::Short(value) => write!(f, "{value}"),
            Self::Char(value) => write!(f, "'{value}'"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Long(value) => write!(f, "{value}L"),
            Self::Float(value) => write!(f, "{value}f"),
            Self::Double(value) => write!(f, "{value}"),
        }
    }
}

/// A concrete value: a primitive literal together with the identity of its
/// creation event.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ConcreteValue {
    /// The creation identity of this value.
    pub id: ValueId,

    /// The literal payload.
    pub literal: PrimitiveLiteral,
}

impl ConcreteValue {
    /// Constructs a new concrete value with creation identity `id`.
    #[must_use]
    pub fn new(id: ValueId, literal: PrimitiveLiteral) -> Self {
        Self { id, literal }
    }

    /// Gets the stack type of this value.
    #[must_use]
    pub fn stack_type(&self) -> StackType {
        self.literal.stack_type()
    }
}

/// An unconstrained placeholder for an unknown input.
///
/// Any two symbolic values with the same symbol denote the same unknown.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct SymbolicValue {
    /// The symbol identifying the unknown.
    pub symbol: u64,

    /// The runtime type the unknown is assumed to have.
    pub ty: StackType,
}

impl SymbolicValue {
    /// Constructs a new symbolic value for the unknown `symbol`.
    #[must_use]
    pub fn new(symbol: u64, ty: StackType) -> Self {
        Self { symbol, ty }
    }
}

/// A reference to a value on the heap, or the null reference.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ReferenceValue {
    /// A reference to the heap value with the contained identifier.
    Reference(u64),

    /// The null reference.
    Nil,
}

impl ReferenceValue {
    /// Gets the heap identifier of this reference; the null reference has the
    /// reserved identifier 0.
    #[must_use]
    pub fn id(self) -> u64 {
        match self {
            Self::Reference(id) => id,
            Self::Nil => NULL_REFERENCE_ID,
        }
    }

    /// Checks whether this is the null reference.
    #[must_use]
    pub fn is_nil(self) -> bool {
        matches!(self, Self::Nil)
    }
}

/// The binary operators that can appear in computed values and on operator
/// nodes in the execution graph.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    ShiftLeft,
    ShiftRight,
    ShiftRightUnsigned,
    Equals,
    NotEquals,
    And,
    Or,
    Xor,
    Less,
    Greater,
    LessEquals,
    GreaterEquals,
}

impl BinaryOperator {
    /// Gets the source-level symbol for this operator.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Remainder => "%",
            Self::ShiftLeft => "<<",
            Self::ShiftRight => ">>",
            Self::ShiftRightUnsigned => ">>>",
            Self::Equals => "==",
            Self::NotEquals => "!=",
            Self::And => "&",
            Self::Or => "|",
            Self::Xor => "^",
            Self::Less => "<",
            Self::Greater => ">",
            Self::LessEquals => "<=",
            Self::GreaterEquals => ">=",
        }
    }

    /// Checks whether this operator produces a boolean result regardless of
    /// its operand types.
    #[must_use]
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Equals
                | Self::NotEquals
                | Self::Less
                | Self::Greater
                | Self::LessEquals
                | Self::GreaterEquals
        )
    }
}

/// The operators that label operator nodes in the execution graph.
///
/// Cast operators deliberately carry no target type here; the cast target is
/// a separate node attribute, so all casts compare equal to one another.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Operator {
    Binary(BinaryOperator),
    Not,
    Concat,
    Stringify,
    Cast,
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binary(operator) => write!(f, "{}", operator.symbol()),
            Self::Not => write!(f, "!"),
            Self::Concat => write!(f, "CONCAT"),
            Self::Stringify => write!(f, "toString"),
            Self::Cast => write!(f, "(cast)"),
        }
    }
}

/// A lazily-recorded expression over values that could not be computed
/// concretely.
///
/// Computed values are never evaluated; their resolution is deferred to the
/// graph comparison.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ComputedValue {
    /// The result of a binary operation on two operands.
    BinaryOperation {
        lhs: Box<StackValue>,
        rhs: Box<StackValue>,
        ty: StackType,
        operator: BinaryOperator,
    },

    /// The logical negation of a value.
    Not { inner: Box<StackValue> },

    /// A primitive cast of a value.
    Cast { inner: Box<StackValue>, ty: StackType },
}

impl ComputedValue {
    /// Gets the stack type of the computed result.
    #[must_use]
    pub fn stack_type(&self) -> StackType {
        match self {
            Self::BinaryOperation { ty, .. } | Self::Cast { ty, .. } => *ty,
            Self::Not { inner } => inner.stack_type(),
        }
    }
}

/// A value on the operand stack.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum StackValue {
    Concrete(ConcreteValue),
    Symbolic(SymbolicValue),
    Computed(ComputedValue),
    Reference(ReferenceValue),
}

impl StackValue {
    /// Gets the runtime type tag of this value.
    #[must_use]
    pub fn stack_type(&self) -> StackType {
        match self {
            Self::Concrete(value) => value.stack_type(),
            Self::Symbolic(value) => value.ty,
            Self::Computed(value) => value.stack_type(),
            Self::Reference(_) => StackType::Reference,
        }
    }

    /// Checks whether this value is concrete.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        matches!(self, Self::Concrete(_))
    }

    /// Checks whether this value is a reference.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference(_))
    }

    /// Gets the reference payload if this value is a reference.
    #[must_use]
    pub fn as_reference(&self) -> Option<ReferenceValue> {
        match self {
            Self::Reference(reference) => Some(*reference),
            _ => None,
        }
    }

    /// Gets the concrete boolean payload if this value is a concrete boolean.
    #[must_use]
    pub fn as_concrete_boolean(&self) -> Option<bool> {
        match self {
            Self::Concrete(ConcreteValue {
                literal: PrimitiveLiteral::Boolean(value),
                ..
            }) => Some(*value),
            _ => None,
        }
    }

    /// Gets a short human-readable label for the value, used on graph nodes.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Concrete(value) => value.literal.to_string(),
            Self::Symbolic(value) => format!("#{} {:?}", value.symbol, value.ty),
            Self::Computed(ComputedValue::BinaryOperation { lhs, rhs, operator, .. }) => {
                format!("({} {} {})", lhs.label(), operator.symbol(), rhs.label())
            }
            Self::Computed(ComputedValue::Not { inner }) => format!("!{}", inner.label()),
            Self::Computed(ComputedValue::Cast { inner, ty }) => {
                format!("({ty:?}){}", inner.label())
            }
            Self::Reference(ReferenceValue::Reference(id)) => format!("@{id}"),
            Self::Reference(ReferenceValue::Nil) => "null".to_string(),
        }
    }
}

impl From<ConcreteValue> for StackValue {
    fn from(value: ConcreteValue) -> Self {
        Self::Concrete(value)
    }
}

impl From<SymbolicValue> for StackValue {
    fn from(value: SymbolicValue) -> Self {
        Self::Symbolic(value)
    }
}

impl From<ReferenceValue> for StackValue {
    fn from(value: ReferenceValue) -> Self {
        Self::Reference(value)
    }
}

impl From<ComputedValue> for StackValue {
    fn from(value: ComputedValue) -> Self {
        Self::Computed(value)
    }
}

#[cfg(test)]
mod test {
    use crate::memory::stack::{
        BinaryOperator,
        ComputedValue,
        ConcreteValue,
        PrimitiveLiteral,
        ReferenceValue,
        StackType,
        StackValue,
        SymbolicValue,
    };

    #[test]
    fn concrete_values_with_different_identities_are_distinct() {
        let first = ConcreteValue::new(1, PrimitiveLiteral::Int(42));
        let second = ConcreteValue::new(2, PrimitiveLiteral::Int(42));
        assert_ne!(first, second);
        assert_eq!(first, first);
    }

    #[test]
    fn computed_values_compare_structurally() {
        let lhs = StackValue::Symbolic(SymbolicValue::new(7, StackType::Int));
        let rhs = StackValue::Concrete(ConcreteValue::new(3, PrimitiveLiteral::Int(1)));

        let first = ComputedValue::BinaryOperation {
            lhs: Box::new(lhs.clone()),
            rhs: Box::new(rhs.clone()),
            ty: StackType::Int,
            operator: BinaryOperator::Add,
        };
        let second = ComputedValue::BinaryOperation {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            ty: StackType::Int,
            operator: BinaryOperator::Add,
        };
        assert_eq!(first, second);
    }

    #[test]
    fn the_null_reference_has_the_reserved_identifier() {
        assert_eq!(ReferenceValue::Nil.id(), 0);
        assert_eq!(ReferenceValue::Reference(9).id(), 9);
        assert!(ReferenceValue::Nil.is_nil());
    }

    #[test]
    fn literal_numeric_views_widen_as_documented() {
        assert_eq!(PrimitiveLiteral::Char('A').as_f64(), 65.0);
        assert_eq!(PrimitiveLiteral::Double(1.9).as_i32(), 1);
        assert_eq!(PrimitiveLiteral::Boolean(true).as_i64(), 1);
    }
}
