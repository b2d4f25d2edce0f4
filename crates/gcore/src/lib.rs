//! # gcore - Pluggable Garbage Collector Core
//!
//! gcore is the collector core of a managed runtime: it owns object layout,
//! per-thread allocation queues, epoch bookkeeping, safepoint coordination
//! and the finalizer worker. The collection strategy is a type parameter.
//!
//! ## Overview
//!
//! - **Strategies**: [`NoopCollector`] never collects; [`MarkAndSweep`]
//!   stops the world, traces from the roots and sweeps
//! - **Epochs**: every requested collection gets a number; callers wait
//!   for an epoch to finish or to have its finalizers run
//! - **Thread queues**: objects stay thread-local until published, so the
//!   allocation path takes no global lock
//! - **Extra object data**: optional side records holding weak referents
//!   and associated native objects
//! - **Finalizer worker**: finalizers run on a dedicated thread, outside
//!   the stop-the-world window
//!
//! ## Quick Start
//!
//! ```rust
//! use gcore::object::TypeInfo;
//! use gcore::{Collaborators, GlobalRoots, Gc, GcConfig, MarkAndSweep};
//! use std::sync::Arc;
//!
//! static CELL: TypeInfo = TypeInfo::object("Cell", 8, &[0]);
//!
//! fn main() -> gcore::Result<()> {
//!     let roots = Arc::new(GlobalRoots::new());
//!     let gc = Gc::<MarkAndSweep>::with_collaborators(
//!         GcConfig::default(),
//!         Collaborators::new(roots.clone()),
//!     )?;
//!
//!     let mut thread = gc.register_thread();
//!     let kept = thread.create_object(&CELL);
//!     let _garbage = thread.create_object(&CELL);
//!     let root = roots.register(Some(kept));
//!
//!     // Collections are requested from outside managed code.
//!     let epoch = thread.in_native(|| gc.collect());
//!     assert_eq!(epoch, 1);
//!     assert_eq!(gc.allocator().objects().len(), 1);
//!
//!     roots.unregister(root);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────── mutator threads ──────────────┐
//! │ ThreadData ─ object queue ─ extra queue      │
//! │     │ publish (safepoint / in_native / drop) │
//! └─────┼────────────────────────────────────────┘
//!       ▼
//! ┌────────────── Allocator ────────────────────┐
//! │ ObjectFactory        ExtraObjectDataFactory  │
//! └─────┬────────────────────────────────────────┘
//!       ▼
//! ┌────────────── Collector ────────────────────┐
//! │ GcStateHolder (epochs)  ThreadRegistry       │
//! │ RootScanner ─ mark ─ sweep ─ FinalizerQueue  │
//! └─────┬────────────────────────────────────────┘
//!       ▼
//!   finalizer worker ─> epoch finalized
//! ```
//!
//! ## Feature Flags
//!
//! - `noop-gc`: [`DefaultCollector`] is [`NoopCollector`] instead of
//!   [`MarkAndSweep`]

pub mod alloc;
pub mod config;
pub mod error;
pub mod gc;
pub mod logging;
pub mod object;
pub mod roots;
pub mod runtime;
pub mod scheduler;
pub mod stats;

pub use alloc::Allocator;
pub use config::{AllocatorFlavor, GcConfig};
pub use error::{GcError, Result};
pub use gc::{Collaborators, Collector, Epoch, Gc, MarkAndSweep, NoopCollector, ThreadData};
pub use object::{ArrayRef, ElementKind, ExtraRef, ObjRef, TypeInfo};
pub use roots::{GlobalRoots, RootScanner};
pub use runtime::ThreadRegistry;
pub use scheduler::{GcScheduler, ManualScheduler};
pub use stats::GcStatistics;

/// Strategy selected at build time
#[cfg(feature = "noop-gc")]
pub type DefaultCollector = NoopCollector;

/// Strategy selected at build time
#[cfg(not(feature = "noop-gc"))]
pub type DefaultCollector = MarkAndSweep;

/// GC facade over [`DefaultCollector`]
pub type DefaultGc = Gc<DefaultCollector>;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build the default strategy with the environment's configuration
///
/// Reads `GCORE_*` variables (see [`GcConfig::from_env`]).
pub fn init(collaborators: Collaborators) -> Result<DefaultGc> {
    Gc::with_collaborators(GcConfig::from_env(), collaborators)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_init_default_collector() {
        let gc = init(Collaborators::default()).expect("default configuration is valid");
        assert_eq!(gc.registry().thread_count(), 0);
        gc.stop_finalizer_thread_if_running();
        assert!(!gc.finalizers_thread_is_running());
    }
}
