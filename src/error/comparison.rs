//! This module contains errors pertaining to the pairwise comparison of
//! execution graphs.
//!
//! A comparison failure is always scoped to one pairwise comparison; the
//! batch helpers catch these, log them, and record the pair as having no
//! score rather than aborting sibling comparisons.

use thiserror::Error;

/// Errors that occur while comparing a pair of execution graphs.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("The comparison task panicked: {reason}")]
    TaskPanicked { reason: String },

    #[error("The comparison task was cancelled before producing a result")]
    TaskCancelled,
}

/// A container of comparison errors used for aggregation across a batch.
pub type Errors = crate::error::container::Errors<Error>;

/// The result type for operations that can fail with a comparison error.
pub type Result<T> = std::result::Result<T, Error>;
