use std::time::Duration;

/// Ceiling applied to the bounded wait inside `stop`
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration shared by every thread created through a registry
#[derive(Debug, Clone)]
pub struct ThreadConfig {
    /// Per-thread wait ceiling used by `stop`. Exceeding it only logs a warning.
    pub stop_timeout: Duration,
    /// Number of continuable panics the reporter keeps in memory
    pub panic_history_limit: usize,
    /// Log successful worker completion at info level
    pub log_completions: bool,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            panic_history_limit: 10,
            log_completions: true,
        }
    }
}
