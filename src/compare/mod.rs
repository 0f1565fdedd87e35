//! This module contains the graph comparison machinery: the local
//! compatibility predicates over graph elements and the iterative,
//! locally-greedy global comparator built on top of them.

pub mod batch;
pub mod iterative;
pub mod matcher;
pub mod values;

pub use batch::{compare_all_pairs, compare_async, ComparisonHandle};
pub use iterative::{compare, ComparisonResult};
