//! Capability interface between instrumented code and the hit store.
//!
//! The instrumentation side only sees `dyn CoverageRuntime`. One instance is
//! installed at process scope by whoever launches the measured program;
//! tests and tools construct and pass their own.

use super::layout::ClassLayout;
use super::snapshot::Snapshot;
use super::store::{HitStore, LiveClass};
use std::sync::{Arc, OnceLock};

/// What instrumented code may ask of the recording subsystem
pub trait CoverageRuntime: Send + Sync + std::fmt::Debug {
    /// Counter handle for a class whose structure is known at load time
    fn class_hits(&self, name: &str, layout: ClassLayout) -> Arc<LiveClass>;

    /// Flat counter handle for a class recorded without structure
    fn raw_hits_for(&self, name: &str, len: usize) -> Arc<LiveClass>;

    /// A test is starting
    fn test_started(&self, name: &str);

    /// The current test finished; returns what it covered
    fn test_finished(&self) -> Snapshot;

    /// Persist everything recorded; `false` if nothing could be written
    fn flush(&self) -> bool;
}

impl CoverageRuntime for HitStore {
    fn class_hits(&self, name: &str, layout: ClassLayout) -> Arc<LiveClass> {
        self.get_or_create_with(name, || layout)
    }

    fn raw_hits_for(&self, name: &str, len: usize) -> Arc<LiveClass> {
        self.register_raw(name, len)
    }

    fn test_started(&self, name: &str) {
        self.begin_test(name);
    }

    fn test_finished(&self) -> Snapshot {
        self.end_test()
    }

    fn flush(&self) -> bool {
        self.save_on_exit()
    }
}

static INSTALLED: OnceLock<Arc<dyn CoverageRuntime>> = OnceLock::new();

/// Install the process-wide runtime.
///
/// Only the first call wins; later calls get their runtime handed back.
pub fn install(runtime: Arc<dyn CoverageRuntime>) -> Result<(), Arc<dyn CoverageRuntime>> {
    INSTALLED.set(runtime)
}

/// The process-wide runtime, if one was installed
#[must_use]
pub fn installed() -> Option<&'static Arc<dyn CoverageRuntime>> {
    INSTALLED.get()
}
