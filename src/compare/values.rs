//! This module contains the value comparator: the pure compatibility
//! predicate over the stack and string values carried on value nodes.
//!
//! The comparator decides whether two values *could* denote the same data,
//! not whether they are equal: symbolic values are compatible with any other
//! symbolic value, and concatenation trees and binary operations compare
//! their operands commutatively.

use crate::memory::{
    heap::StringValue,
    stack::{ComputedValue, ConcreteValue, PrimitiveLiteral, ReferenceValue, StackValue},
};

/// Checks whether two string values are compatible.
#[must_use]
pub fn compare_strings(lhs: &StringValue, rhs: &StringValue) -> bool {
    match (lhs, rhs) {
        (StringValue::Concrete(l), StringValue::Concrete(r)) => l == r,

        // Two unknowns can always denote the same string.
        (StringValue::Symbolic(_), StringValue::Symbolic(_)) => true,

        (StringValue::FromStackValue(l), StringValue::FromStackValue(r)) => compare_values(l, r),

        // Concatenation trees compare commutatively: either pairing of the
        // operands suffices.
        (
            StringValue::Composite { lhs: ll, rhs: lr },
            StringValue::Composite { lhs: rl, rhs: rr },
        ) => {
            compare_strings(ll, rl) && compare_strings(lr, rr)
                || compare_strings(ll, rr) && compare_strings(lr, rl)
        }

        _ => false,
    }
}

/// Checks whether two stack values are compatible.
#[must_use]
pub fn compare_values(lhs: &StackValue, rhs: &StackValue) -> bool {
    match (lhs, rhs) {
        (StackValue::Reference(ReferenceValue::Nil), StackValue::Reference(ReferenceValue::Nil)) => {
            true
        }
        (
            StackValue::Reference(ReferenceValue::Reference(l)),
            StackValue::Reference(ReferenceValue::Reference(r)),
        ) => l == r,

        // Two unknowns can always denote the same value.
        (StackValue::Symbolic(_), StackValue::Symbolic(_)) => true,

        (StackValue::Computed(l), StackValue::Computed(r)) => compare_computed(l, r),

        (StackValue::Concrete(l), StackValue::Concrete(r)) => compare_concrete(l, r),

        _ => false,
    }
}

/// Checks whether two computed values are compatible.
///
/// Binary operations require the same operator and compatible operands in
/// either pairing. The commutative pairing applies to non-commutative
/// operators too; this matching heuristic is deliberately preserved.
#[must_use]
pub fn compare_computed(lhs: &ComputedValue, rhs: &ComputedValue) -> bool {
    match (lhs, rhs) {
        (ComputedValue::Not { inner: l }, ComputedValue::Not { inner: r }) => compare_values(l, r),

        (ComputedValue::Cast { inner: l, .. }, ComputedValue::Cast { inner: r, .. }) => {
            compare_values(l, r)
        }

        (
            ComputedValue::BinaryOperation {
                lhs: ll,
                rhs: lr,
                operator: lop,
                ..
            },
            ComputedValue::BinaryOperation {
                lhs: rl,
                rhs: rr,
                operator: rop,
                ..
            },
        ) => {
            lop == rop
                && (compare_values(ll, rl) && compare_values(lr, rr)
                    || compare_values(ll, rr) && compare_values(lr, rl))
        }

        _ => false,
    }
}

/// Checks whether two concrete values are compatible.
///
/// Booleans compare exactly and never match numerics; numerics are
/// compatible if they are equal after widening to double *or* after
/// truncation to int — either match suffices.
#[must_use]
pub fn compare_concrete(lhs: &ConcreteValue, rhs: &ConcreteValue) -> bool {
    match (lhs.literal, rhs.literal) {
        (PrimitiveLiteral::Boolean(l), PrimitiveLiteral::Boolean(r)) => l == r,
        (PrimitiveLiteral::Boolean(_), _) | (_, PrimitiveLiteral::Boolean(_)) => false,
        (l, r) => l.as_f64() == r.as_f64() || l.as_i32() == r.as_i32(),
    }
}

#[cfg(test)]
mod test {
    use crate::{
        compare::values::{compare_computed, compare_strings, compare_values},
        memory::{
            heap::StringValue,
            stack::{
                BinaryOperator,
                ComputedValue,
                ConcreteValue,
                PrimitiveLiteral,
                ReferenceValue,
                StackType,
                StackValue,
                SymbolicValue,
            },
        },
    };

    fn symbolic(symbol: u64) -> StackValue {
        StackValue::Symbolic(SymbolicValue::new(symbol, StackType::Int))
    }

    fn concrete(id: u64, literal: PrimitiveLiteral) -> StackValue {
        StackValue::Concrete(ConcreteValue::new(id, literal))
    }

    fn operation(operator: BinaryOperator, lhs: StackValue, rhs: StackValue) -> ComputedValue {
        ComputedValue::BinaryOperation {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            ty: StackType::Int,
            operator,
        }
    }

    #[test]
    fn symbolic_values_always_match_each_other() {
        assert!(compare_values(&symbolic(1), &symbolic(2)));
        assert!(!compare_values(
            &symbolic(1),
            &StackValue::Reference(ReferenceValue::Nil)
        ));
    }

    #[test]
    fn numerics_match_after_widening_to_double_or_int() {
        let int = concrete(1, PrimitiveLiteral::Int(3));
        let double = concrete(2, PrimitiveLiteral::Double(3.0));
        let nearly = concrete(3, PrimitiveLiteral::Double(3.7));

        assert!(compare_values(&int, &double));
        // 3.7 truncates to 3, so the int view matches even though the double
        // view does not.
        assert!(compare_values(&int, &nearly));
        assert!(!compare_values(
            &int,
            &concrete(4, PrimitiveLiteral::Double(4.5))
        ));
    }

    #[test]
    fn booleans_never_match_numerics() {
        let boolean = concrete(1, PrimitiveLiteral::Boolean(true));
        let one = concrete(2, PrimitiveLiteral::Int(1));
        assert!(!compare_values(&boolean, &one));
    }

    #[test]
    fn binary_operations_compare_operands_commutatively() {
        let left = operation(BinaryOperator::Add, symbolic(1), concrete(9, PrimitiveLiteral::Int(2)));
        let swapped =
            operation(BinaryOperator::Add, concrete(9, PrimitiveLiteral::Int(2)), symbolic(1));
        assert!(compare_computed(&left, &swapped));
    }

    /// The commutative operand pairing deliberately applies to
    /// non-commutative operators as well: `a - b` is treated as compatible
    /// with `b - a`. This is a matching heuristic, not an evaluation rule.
    #[test]
    fn commutative_comparison_applies_to_noncommutative_operators() {
        let left = operation(
            BinaryOperator::Subtract,
            symbolic(1),
            concrete(9, PrimitiveLiteral::Int(2)),
        );
        let swapped = operation(
            BinaryOperator::Subtract,
            concrete(9, PrimitiveLiteral::Int(2)),
            symbolic(1),
        );
        assert!(compare_computed(&left, &swapped));
    }

    #[test]
    fn composite_strings_compare_commutatively() {
        let hello = StringValue::Concrete("hello".to_string());
        let world = StringValue::Concrete("world".to_string());

        let left = StringValue::Composite {
            lhs: Box::new(hello.clone()),
            rhs: Box::new(world.clone()),
        };
        let swapped = StringValue::Composite {
            lhs: Box::new(world),
            rhs: Box::new(hello),
        };
        assert!(compare_strings(&left, &swapped));
        assert!(!compare_strings(
            &left,
            &StringValue::Concrete("helloworld".to_string())
        ));
    }
}
