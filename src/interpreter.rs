//! This module contains the concolic interpreter: the work queue of execution
//! contexts that drives path exploration for one entry point.
//!
//! Exploration is a tree of independent continuations. Each context runs to
//! termination and surrenders the contexts it forked, which join the queue;
//! the loop drains the queue until every bounded path has produced a trace.

use std::{collections::VecDeque, sync::Arc};

use tracing::debug;

use crate::{
    constant::{
        DEFAULT_LOGGING_ENABLED,
        DEFAULT_MAX_LOOP_EXECUTIONS,
        DEFAULT_MAX_RECURSIVE_CALLS,
    },
    ctx::ExecutionContext,
    error::execution::{Error, Result},
    resolve::{DescriptorResolver, SourceResolver},
    signature::QualifiedMethodSignature,
    trace::EntryPointTraces,
    watchdog::DynWatchdog,
};

/// The configuration for the concolic execution engine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// The maximum number of times a single branch site may fork (or a loop
    /// head may re-enter its body) within one path.
    ///
    /// Defaults to [`DEFAULT_MAX_LOOP_EXECUTIONS`].
    pub max_loop_executions: usize,

    /// The maximum number of live frames for the same method signature;
    /// beyond it the analysis of the entry point is aborted.
    ///
    /// Defaults to [`DEFAULT_MAX_RECURSIVE_CALLS`].
    pub max_recursive_calls: usize,

    /// Whether per-instruction logging of the execution loop is emitted.
    ///
    /// Defaults to [`DEFAULT_LOGGING_ENABLED`].
    pub logging_enabled: bool,
}

impl Config {
    /// Sets the `max_loop_executions` config parameter to `value`.
    #[must_use]
    pub fn with_max_loop_executions(mut self, value: usize) -> Self {
        self.max_loop_executions = value;
        self
    }

    /// Sets the `max_recursive_calls` config parameter to `value`.
    #[must_use]
    pub fn with_max_recursive_calls(mut self, value: usize) -> Self {
        self.max_recursive_calls = value;
        self
    }

    /// Sets the `logging_enabled` config parameter to `value`.
    #[must_use]
    pub fn with_logging_enabled(mut self, value: bool) -> Self {
        self.logging_enabled = value;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        let max_loop_executions = DEFAULT_MAX_LOOP_EXECUTIONS;
        let max_recursive_calls = DEFAULT_MAX_RECURSIVE_CALLS;
        let logging_enabled = DEFAULT_LOGGING_ENABLED;
        Self {
            max_loop_executions,
            max_recursive_calls,
            logging_enabled,
        }
    }
}

/// The concolic interpreter for one entry point.
#[derive(Debug)]
pub struct ConcolicInterpreter {
    /// The entry point being explored.
    entry_point: QualifiedMethodSignature,

    /// The queue of contexts awaiting execution.
    queue: VecDeque<ExecutionContext>,

    /// A watchdog polled at intervals to check whether the analysis needs to
    /// exit.
    watchdog: DynWatchdog,
}

impl ConcolicInterpreter {
    /// Constructs an interpreter for `entry_point`, with an initial context
    /// bootstrapped to invoke it on symbolic receiver and arguments.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the entry point cannot be resolved, or if it has
    /// neither an AST body nor bytecode and therefore cannot be explored.
    pub fn new(
        entry_point: QualifiedMethodSignature,
        descriptors: Arc<dyn DescriptorResolver>,
        sources: Arc<dyn SourceResolver>,
        config: Config,
        watchdog: DynWatchdog,
    ) -> Result<Self> {
        let descriptor = descriptors.resolve_method(&entry_point)?;

        if sources.method_body(&entry_point).is_none()
            && sources.method_bytecode(&entry_point).is_none()
        {
            return Err(Error::EntryPointNotInterpretable {
                signature: entry_point,
            });
        }

        let mut context = ExecutionContext::new(config, descriptors, sources);
        context.bootstrap(&entry_point, descriptor.is_static);

        let mut queue = VecDeque::new();
        queue.push_back(context);

        Ok(Self {
            entry_point,
            queue,
            watchdog,
        })
    }

    /// Gets the entry point this interpreter explores.
    #[must_use]
    pub fn entry_point(&self) -> &QualifiedMethodSignature {
        &self.entry_point
    }

    /// Gets the count of contexts currently awaiting execution.
    #[must_use]
    pub fn remaining_context_count(&self) -> usize {
        self.queue.len()
    }

    /// Runs every bounded path of the entry point to termination.
    ///
    /// Trace identity in the result is positional; no semantic ordering of
    /// paths is guaranteed.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] on a fatal engine error or a watchdog stop; a fatal
    /// error aborts the whole entry point and no traces are returned.
    pub fn execute(mut self) -> Result<EntryPointTraces> {
        let mut traces = Vec::new();

        while let Some(context) = self.queue.pop_front() {
            let (trace, forks) = context.execute(&self.watchdog)?;
            traces.push(trace);
            self.queue.extend(forks);
        }

        debug!(
            entry = %self.entry_point,
            paths = traces.len(),
            "entry point exploration complete"
        );

        Ok(EntryPointTraces {
            entry_point: self.entry_point,
            traces,
        })
    }
}
