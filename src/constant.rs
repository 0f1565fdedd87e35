//! This module contains constants that are needed throughout the codebase.

/// The default maximum number of times that a single branch site may trigger a
/// fork (or a loop head may re-enter its body) within one path of execution.
///
/// This bounds the otherwise potentially unbounded path tree to a finite set
/// of traces.
pub const DEFAULT_MAX_LOOP_EXECUTIONS: usize = 2;

/// The default maximum number of frames for the same method signature that may
/// be live on the call stack at once.
///
/// Exceeding this limit is fatal to the analysis of the current entry point.
pub const DEFAULT_MAX_RECURSIVE_CALLS: usize = 2;

/// Whether per-instruction logging of the execution loop is enabled by
/// default.
///
/// The per-instruction events are hot, so they default to off.
pub const DEFAULT_LOGGING_ENABLED: bool = false;

/// The default minimum similarity at which the comparator's catch-all pass
/// accepts a match between two otherwise-unmapped nodes.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.7;

/// The default number of executed instructions the engine will wait before
/// polling the watchdog.
pub const DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS: usize = 100;

/// The heap identifier reserved for the null reference.
///
/// No heap value is ever allocated with this identifier.
pub const NULL_REFERENCE_ID: u64 = 0;

/// The first identifier handed out by a context's monotonic id counter.
///
/// Identifiers are shared between heap values, symbols, and concrete-value
/// identities, and are unique within one execution run.
pub const FIRST_ALLOCATION_ID: u64 = 1;
