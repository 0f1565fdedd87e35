//! This module contains the type definitions necessary to support the
//! monitoring functionality for the engine.
//!
//! # Best-Effort Monitoring
//!
//! Note that the monitoring provided by the watchdog is a best-effort
//! approach: the execution loop polls it between instructions, so a stop
//! request takes effect at the next poll, not instantaneously. A batch driver
//! that needs a hard deadline should combine the watchdog with external
//! supervision of the worker running the analysis.

use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::constant::DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS;

/// A dynamically dispatched [`Watchdog`] instance.
pub type DynWatchdog = Arc<dyn Watchdog>;

/// The interface to an object that can be polled to see if the engine needs
/// to abort its analysis.
///
/// The interface is simple, but it can encapsulate arbitrary logic as far as
/// the engine is concerned, allowing the client to implement complex stop
/// logic.
pub trait Watchdog
where
    Self: Debug + Send + Sync,
{
    /// Checks if the engine should halt its analysis and return an error.
    #[must_use]
    fn should_stop(&self) -> bool;

    /// Gets the number of executed instructions the engine should wait
    /// before polling the watchdog.
    #[must_use]
    fn poll_every(&self) -> usize;
}

/// An implementation of the [`Watchdog`] trait that does not place any
/// restrictions on the execution of the engine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LazyWatchdog;

impl LazyWatchdog {
    /// Wraps `self` into an [`Arc`].
    #[must_use]
    pub fn in_arc(self) -> DynWatchdog {
        Arc::new(self)
    }
}

impl Watchdog for LazyWatchdog {
    fn should_stop(&self) -> bool {
        false
    }

    fn poll_every(&self) -> usize {
        // Something ridiculously huge so it basically never gets checked.
        1_000_000_000_000
    }
}

/// A watchdog that tells the engine when to stop based on a flag in the form
/// of an atomic boolean.
///
/// By default, it requests that the engine poll for watchdog status every
/// [`DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS`]. This is configurable by calling
/// [`Self::polling_every`].
#[derive(Clone, Debug)]
pub struct FlagWatchdog {
    /// The flag that should be set externally to stop the engine.
    flag: Arc<AtomicBool>,

    /// The number of executed instructions the engine should wait before
    /// polling the watchdog.
    poll_loop_iterations: usize,
}

impl FlagWatchdog {
    /// Constructs a new `FlagWatchdog` wrapping the provided `flag`.
    #[must_use]
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        let poll_loop_iterations = DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS;
        Self {
            flag,
            poll_loop_iterations,
        }
    }

    /// Specifies the number of executed instructions that the engine should
    /// wait before polling the watchdog for status.
    #[must_use]
    pub fn polling_every(mut self, iterations: usize) -> Self {
        self.poll_loop_iterations = iterations;
        self
    }

    /// Wraps the watchdog into an [`Arc`].
    #[must_use]
    pub fn in_arc(self) -> DynWatchdog {
        Arc::new(self)
    }
}

impl Watchdog for FlagWatchdog {
    fn should_stop(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn poll_every(&self) -> usize {
        self.poll_loop_iterations
    }
}

#[cfg(test)]
mod test {
    use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};

    use crate::watchdog::{FlagWatchdog, LazyWatchdog, Watchdog};

    #[test]
    fn the_lazy_watchdog_never_stops() {
        assert!(!LazyWatchdog.should_stop());
    }

    #[test]
    fn the_flag_watchdog_stops_when_flagged() {
        let flag = Arc::new(AtomicBool::new(false));
        let watchdog = FlagWatchdog::new(flag.clone()).polling_every(10);

        assert!(!watchdog.should_stop());
        assert_eq!(watchdog.poll_every(), 10);

        flag.store(true, Ordering::Relaxed);
        assert!(watchdog.should_stop());
    }
}
