//! This module contains the asynchronous and batch comparison helpers.
//!
//! Heavy comparisons are gated behind a bounded thread pool: each comparison
//! loads full graphs into memory, so the pool size is a deliberate
//! backpressure mechanism. A failure in one comparison task is caught and
//! logged, and must never abort its siblings; the failed pair simply has no
//! score.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{mpsc, Arc},
};

use rayon::prelude::*;
use tracing::warn;

use crate::{
    compare::iterative::{compare, ComparisonResult},
    error::comparison::{Error, Errors, Result},
    graph::ExecutionGraph,
};

/// A handle to a comparison running on a worker pool.
#[derive(Debug)]
pub struct ComparisonHandle {
    receiver: mpsc::Receiver<Result<ComparisonResult>>,
}

impl ComparisonHandle {
    /// Blocks until the comparison completes and returns its result.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the comparison task panicked or its worker was torn
    /// down before producing a result.
    pub fn join(self) -> Result<ComparisonResult> {
        self.receiver.recv().map_err(|_| Error::TaskCancelled)?
    }
}

/// Starts a comparison of two graphs on the provided pool, returning a handle
/// to collect the result later.
pub fn compare_async(
    lhs: Arc<ExecutionGraph>,
    rhs: Arc<ExecutionGraph>,
    pool: &rayon::ThreadPool,
) -> ComparisonHandle {
    let (sender, receiver) = mpsc::channel();

    pool.spawn(move || {
        let result = guarded_compare(&lhs, &rhs);
        // The caller may have dropped the handle; that is not an error.
        let _ = sender.send(result);
    });

    ComparisonHandle { receiver }
}

/// Compares every pair on the provided pool, bounded by the pool's
/// concurrency.
///
/// The result is positional: entry `i` corresponds to `pairs[i]`, and is
/// [`None`] for pairs whose comparison failed. Failures never abort sibling
/// comparisons; they are aggregated and reported once at the end of the
/// batch.
#[must_use]
pub fn compare_all_pairs(
    pairs: &[(Arc<ExecutionGraph>, Arc<ExecutionGraph>)],
    pool: &rayon::ThreadPool,
) -> Vec<Option<ComparisonResult>> {
    let outcomes: Vec<Result<ComparisonResult>> = pool.install(|| {
        pairs
            .par_iter()
            .map(|(lhs, rhs)| guarded_compare(lhs, rhs))
            .collect()
    });

    let mut errors = Errors::new();
    let results = outcomes
        .into_iter()
        .map(|outcome| match outcome {
            Ok(result) => Some(result),
            Err(error) => {
                errors.add(error);
                None
            }
        })
        .collect();

    if !errors.is_empty() {
        warn!(%errors, "batch comparison finished with failed pairs");
    }
    results
}

/// Runs one comparison, converting a panic into a per-pair error.
fn guarded_compare(lhs: &ExecutionGraph, rhs: &ExecutionGraph) -> Result<ComparisonResult> {
    catch_unwind(AssertUnwindSafe(|| compare(lhs, rhs))).map_err(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        warn!(lhs = %lhs.title, rhs = %rhs.title, %reason, "comparison task failed");
        Error::TaskPanicked { reason }
    })
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        compare::batch::{compare_all_pairs, compare_async},
        graph::ExecutionGraph,
        memory::heap::HeapArea,
        trace::ExecutionTrace,
    };

    fn empty_graph(title: &str) -> Arc<ExecutionGraph> {
        let trace = ExecutionTrace::new(vec![], HeapArea::new());
        Arc::new(crate::graph::build(title, &trace))
    }

    #[test]
    fn async_comparisons_join_with_a_result() -> anyhow::Result<()> {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build()?;
        let handle = compare_async(empty_graph("a"), empty_graph("b"), &pool);
        let result = handle.join()?;
        assert!((result.union_sim - 1.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn batch_results_are_positional() -> anyhow::Result<()> {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build()?;
        let pairs = vec![
            (empty_graph("a"), empty_graph("b")),
            (empty_graph("c"), empty_graph("d")),
        ];
        let results = compare_all_pairs(&pairs, &pool);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(Option::is_some));
        Ok(())
    }
}
