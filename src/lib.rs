//! This library implements a behavioral similarity analysis between programs
//! for plagiarism and originality assessment. It never compares source text:
//! it compares what programs *do*.
//!
//! # How it Works
//!
//! From a very high level, a comparison is performed as follows:
//!
//! 1. An entry point is executed concolically by the
//!    [`interpreter::ConcolicInterpreter`]: unknown inputs are modeled as
//!    symbolic values, and execution forks at every branch whose condition
//!    depends on one, bounded per branch site. Every explored path yields one
//!    [`trace::ExecutionTrace`] — an append-only log of the semantic events
//!    of that path plus the final heap snapshot.
//! 2. Each trace is turned into an [`graph::ExecutionGraph`] by
//!    [`graph::build`]: a labeled provenance multigraph whose nodes are the
//!    values, objects, operators, and calls of the path, and whose edges are
//!    the supplies/parameter/aggregation/transformation relations between
//!    them.
//! 3. Two graphs are compared by [`compare::compare`]: an iterative,
//!    locally-greedy matching that seeds a node mapping from operator and
//!    call nodes, grows it by propagation along edges using a minimum-cost
//!    assignment solver, and reports the mapped fraction as the similarity.
//!
//! Programs that merely look different — renamed identifiers, reordered
//! declarations, swapped operands — produce near-identical graphs; programs
//! that behave differently do not.
//!
//! # Basic Usage
//!
//! The front end (parsing and type resolution) is out of scope; the engine
//! consumes method bodies through the [`resolve::SourceResolver`] boundary.
//! With a resolver in hand, an analysis looks like this:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use concolic_comparator::{
//!     compare,
//!     graph,
//!     interpreter::{Config, ConcolicInterpreter},
//!     resolve::MapResolver,
//!     signature::{
//!         ClassSignature,
//!         MethodSignature,
//!         PrimitiveKind,
//!         QualifiedMethodSignature,
//!         TypeSignature,
//!     },
//!     watchdog::LazyWatchdog,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = Arc::new(MapResolver::new());
//! let entry = QualifiedMethodSignature::new(
//!     ClassSignature::new("sample/Calculator"),
//!     MethodSignature::new(
//!         "run",
//!         vec![TypeSignature::Primitive(PrimitiveKind::Int)],
//!         TypeSignature::Primitive(PrimitiveKind::Int),
//!     ),
//! );
//!
//! let interpreter = ConcolicInterpreter::new(
//!     entry,
//!     resolver.clone(),
//!     resolver,
//!     Config::default(),
//!     LazyWatchdog.in_arc(),
//! )?;
//! let traces = interpreter.execute()?;
//!
//! let graphs: Vec<_> = traces
//!     .traces
//!     .iter()
//!     .enumerate()
//!     .map(|(index, trace)| graph::build(format!("path-{index}"), trace))
//!     .collect();
//!
//! let result = compare::compare(&graphs[0], &graphs[0]);
//! assert!((result.union_sim - 1.0).abs() < f64::EPSILON);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming

pub mod algorithm;
pub mod ast;
pub mod compare;
pub mod constant;
pub mod ctx;
pub mod error;
pub mod graph;
pub mod interpreter;
pub mod memory;
pub mod resolve;
pub mod signature;
pub mod trace;
pub mod watchdog;

use std::sync::Arc;

use crate::{
    error::execution::Result,
    resolve::{DescriptorResolver, SourceResolver},
    signature::QualifiedMethodSignature,
    trace::EntryPointTraces,
    watchdog::DynWatchdog,
};

/// Explores every bounded path of the provided entry point and returns its
/// traces.
///
/// This is a convenience wrapper over constructing and executing a
/// [`interpreter::ConcolicInterpreter`].
///
/// # Errors
///
/// Returns [`Err`] if the entry point cannot be resolved or explored, on a
/// fatal engine error, or when stopped by the watchdog.
pub fn analyze_entry(
    entry_point: QualifiedMethodSignature,
    descriptors: Arc<dyn DescriptorResolver>,
    sources: Arc<dyn SourceResolver>,
    config: interpreter::Config,
    watchdog: DynWatchdog,
) -> Result<EntryPointTraces> {
    interpreter::ConcolicInterpreter::new(entry_point, descriptors, sources, config, watchdog)?
        .execute()
}
