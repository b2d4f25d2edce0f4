//! Error Module - gcore Error Types
//!
//! Two failure categories exist in the collector core:
//!
//! ## Recoverable errors
//! Returned as [`GcError`] from setup paths: configuration validation and
//! construction of components that spawn threads.
//!
//! ## Invariant violations
//! Misuse of mark-phase-only queries, double construction of extra object
//! data, or self-deadlocking collection requests. These are not `Result`s.
//! [`runtime_assert!`] and [`runtime_fail!`] log a diagnostic and panic, in
//! release builds too.

use thiserror::Error;

/// Main error type for gcore operations
///
/// # Examples
///
/// ```rust
/// use gcore::error::GcError;
///
/// fn handle_error(err: GcError) {
///     match err {
///         GcError::Configuration(msg) => eprintln!("bad config: {}", msg),
///         other => eprintln!("gc error: {}", other),
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum GcError {
    /// Configuration error
    ///
    /// **When returned:** `GcConfig::validate` rejected a value
    ///
    /// **Recovery strategy:** Fix the configuration or fall back to defaults
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid argument
    ///
    /// **When returned:** Function argument fails validation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Spawning a collector-owned thread failed
    ///
    /// **When returned:** The OS refused to create the finalizer worker
    ///
    /// **Recovery strategy:** Retry later or run without the worker
    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(String),
}

impl From<crate::config::ConfigError> for GcError {
    fn from(err: crate::config::ConfigError) -> Self {
        GcError::Configuration(err.to_string())
    }
}

/// Result type alias for gcore operations
pub type Result<T> = std::result::Result<T, GcError>;

/// Abort on a broken collector invariant
///
/// Logs the diagnostic under the `gc` target before panicking so the message
/// survives even when the panic output is swallowed by a worker thread.
#[macro_export]
macro_rules! runtime_fail {
    ($($arg:tt)*) => {{
        let message = format!($($arg)*);
        log::error!(target: "gc", "fatal: {}", message);
        panic!("gc invariant violated: {}", message);
    }};
}

/// Assert a collector invariant, aborting with a diagnostic when it does not hold
#[macro_export]
macro_rules! runtime_assert {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            $crate::runtime_fail!(
                "assertion `{}` failed: {}",
                stringify!($cond),
                format!($($arg)*)
            );
        }
    };
}
