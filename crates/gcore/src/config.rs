//! Configuration Module - Collector Parameters
//!
//! Settings chosen once, when the runtime starts. The collector strategy
//! itself is a type parameter (see [`crate::gc::Collector`]); this struct
//! covers what stays a runtime choice: allocator flavor, finalizer worker
//! startup, and bookkeeping sizes.

use serde::{Deserialize, Serialize};

/// Allocator generation backing the object factories
///
/// Decides how extra object data is reclaimed. `ThreadQueues` removes it
/// from its factory immediately; `Custom` only flags it and leaves the
/// physical free to the next sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AllocatorFlavor {
    /// Thread-queue-backed factories, eager extra data reclamation
    #[default]
    ThreadQueues,
    /// Custom allocator, lazy flag-based extra data reclamation
    Custom,
}

/// Main configuration for the collector core
///
/// # Examples
///
/// ```rust
/// use gcore::config::{AllocatorFlavor, GcConfig};
///
/// let config = GcConfig {
///     allocator: AllocatorFlavor::Custom,
///     start_finalizer_thread: true,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcConfig {
    /// Allocator flavor, selects the extra object data reclamation mode
    ///
    /// Default: `ThreadQueues`
    pub allocator: AllocatorFlavor,

    /// Start the finalizer worker when the collector is constructed
    ///
    /// When false the worker starts with the first finalizer batch or an
    /// explicit `start_finalizer_thread_if_needed` call.
    ///
    /// Default: false
    pub start_finalizer_thread: bool,

    /// Name given to the finalizer worker thread
    ///
    /// Default: "gc-finalizer"
    pub finalizer_thread_name: String,

    /// Initial mark stack reservation (entries)
    ///
    /// Default: 1024
    pub mark_stack_capacity: usize,

    /// Number of epochs kept in the statistics history
    ///
    /// Default: 64
    pub stats_history: usize,

    /// Log cycle summaries at info level instead of debug
    ///
    /// Default: false
    pub verbose: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            allocator: AllocatorFlavor::ThreadQueues,
            start_finalizer_thread: false,
            finalizer_thread_name: "gc-finalizer".to_string(),
            mark_stack_capacity: 1024,
            stats_history: 64,
            verbose: false,
        }
    }
}

impl GcConfig {
    /// Validate configuration
    ///
    /// ```rust
    /// use gcore::GcConfig;
    ///
    /// let config = GcConfig {
    ///     stats_history: 0,
    ///     ..Default::default()
    /// };
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mark_stack_capacity == 0 {
            return Err(ConfigError::InvalidMarkStack(
                "mark_stack_capacity must be > 0".to_string(),
            ));
        }

        if self.stats_history == 0 {
            return Err(ConfigError::InvalidStatsHistory(
                "stats_history must be > 0".to_string(),
            ));
        }

        if self.finalizer_thread_name.trim().is_empty() {
            return Err(ConfigError::InvalidThreadName(
                "finalizer_thread_name must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with:
    /// - GCORE_ALLOCATOR (`queues` or `custom`)
    /// - GCORE_FINALIZER_THREAD
    /// - GCORE_STATS_HISTORY
    /// - GCORE_VERBOSE
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("GCORE_ALLOCATOR") {
            match val.to_ascii_lowercase().as_str() {
                "queues" | "thread-queues" => config.allocator = AllocatorFlavor::ThreadQueues,
                "custom" => config.allocator = AllocatorFlavor::Custom,
                other => log::warn!(target: "gc", "ignoring unknown GCORE_ALLOCATOR={}", other),
            }
        }

        if let Ok(val) = std::env::var("GCORE_FINALIZER_THREAD") {
            config.start_finalizer_thread = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("GCORE_STATS_HISTORY") {
            if let Ok(history) = val.parse::<usize>() {
                config.stats_history = history;
            }
        }

        if let Ok(val) = std::env::var("GCORE_VERBOSE") {
            config.verbose = parse_flag(&val);
        }

        config
    }

    /// Log level used for per-cycle summaries
    pub fn cycle_log_level(&self) -> log::Level {
        if self.verbose {
            log::Level::Info
        } else {
            log::Level::Debug
        }
    }
}

fn parse_flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true") || val.eq_ignore_ascii_case("yes")
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid mark stack capacity: {0}")]
    InvalidMarkStack(String),

    #[error("Invalid statistics history: {0}")]
    InvalidStatsHistory(String),

    #[error("Invalid thread name: {0}")]
    InvalidThreadName(String),
}
