//! Runtime Module - mutator thread coordination
//!
//! Manages:
//! - Mutator registration
//! - Runnable / native thread states
//! - Stop-the-world suspension at safepoints

pub mod safepoint;
pub mod thread_registry;

pub use safepoint::SafepointManager;
pub use thread_registry::{MutatorState, ThreadRegistry, ThreadState};
