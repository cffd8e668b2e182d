// Managed Threads Module - supervised native threads arranged in trees
//
// This module provides:
// - Managed threads wrapping one native thread each, with ready/stopping state
// - Parent/child hierarchies where stop and wait cascade down the tree
// - Cooperative cancellation through per-generation stop tokens
// - Regeneration of terminated threads from their stored work delegate
// - Failure containment that turns worker errors and panics into reports
// - An explicit registry of top-level threads with bulk stop and diagnostics
// - Timing helpers for measured, interruptible and bounded waits

pub mod types;
pub mod logging;
pub mod error;
pub mod cancel;
pub mod metrics;
pub mod config;
pub mod panic;
pub mod thread;
pub mod registry;
pub mod timing;

// Re-export commonly used types for convenience
pub use types::{
    ThreadId, ThreadState, ThreadWork, ThreadParameter, WorkResult, RegistryStats,
    PlainWorkFn, ParameterizedWorkFn,
};

pub use logging::{CorrelationId, ThreadLoggingContext};
pub use error::{ThreadError, Interrupted, DiagnosticsError};
pub use cancel::StopToken;
pub use metrics::ThreadMetrics;
pub use config::{ThreadConfig, DEFAULT_STOP_TIMEOUT};
pub use panic::{ContinuablePanic, PanicOrigin, PanicReporter};
pub use thread::{ManagedThread, ThreadBuilder, ThreadContext};
pub use registry::{ThreadRegistry, BacktraceProvider, ThreadBacktrace, BACKTRACE_EXTENSION};
pub use timing::{sleep_measured, sleep_interruptible, spin_wait_until, wait_for_input};

#[cfg(test)]
mod tests;
