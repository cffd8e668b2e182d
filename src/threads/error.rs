use thiserror::Error;

use crate::threads::types::ThreadId;

/// Structural misuse of the managed thread API
#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("thread '{name}' is not ready to start, stop it and regenerate first")]
    NotReady { name: String, id: ThreadId },

    #[error("illegal state on thread '{name}': {reason}")]
    IllegalState {
        name: String,
        id: ThreadId,
        reason: &'static str,
    },

    #[error("invalid child index {index} for thread '{name}' ({count} children)")]
    InvalidIndex {
        name: String,
        index: usize,
        count: usize,
    },

    #[error("thread '{name}' has no work delegate")]
    NullDelegate { name: String },

    #[error("failed to spawn native thread for '{name}'")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Returned by cancellation-aware blocking calls once a stop was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation interrupted by stop request")]
pub struct Interrupted;

/// Failures raised by optional diagnostics extensions
#[derive(Debug, Error)]
pub enum DiagnosticsError {
    #[error("diagnostics extension '{0}' is not registered")]
    MissingExtension(String),

    #[error("diagnostics extension '{name}' failed: {message}")]
    ExtensionFailed { name: String, message: String },
}
