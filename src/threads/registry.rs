use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::threads::config::ThreadConfig;
use crate::threads::error::DiagnosticsError;
use crate::threads::panic::PanicReporter;
use crate::threads::thread::ManagedThread;
use crate::threads::types::{RegistryStats, ThreadId, ThreadState};

/// Name under which a backtrace provider is looked up
pub const BACKTRACE_EXTENSION: &str = "backtrace";

/// Optional diagnostics extension producing per-thread backtraces
pub trait BacktraceProvider: Send + Sync {
    fn capture(&self, thread: &ManagedThread) -> Result<Vec<String>, DiagnosticsError>;
}

/// Backtrace captured for one active thread
#[derive(Debug, Clone)]
pub struct ThreadBacktrace {
    pub thread_id: ThreadId,
    pub thread_name: String,
    pub frames: Vec<String>,
}

struct RegistryInner {
    threads: Mutex<Vec<ManagedThread>>,
    extensions: Mutex<HashMap<String, Arc<dyn BacktraceProvider>>>,
    reporter: PanicReporter,
    config: Arc<ThreadConfig>,
}

/// Ordered registry of top-level managed threads.
///
/// Children are never registered here; they are reachable through their
/// parent's child list only.
#[derive(Clone)]
pub struct ThreadRegistry {
    inner: Arc<RegistryInner>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::with_config(ThreadConfig::default())
    }

    pub fn with_config(config: ThreadConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                threads: Mutex::new(Vec::new()),
                extensions: Mutex::new(HashMap::new()),
                reporter: PanicReporter::new(config.panic_history_limit),
                config: Arc::new(config),
            }),
        }
    }

    pub fn config(&self) -> Arc<ThreadConfig> {
        self.inner.config.clone()
    }

    /// Sink receiving every contained worker failure
    pub fn reporter(&self) -> PanicReporter {
        self.inner.reporter.clone()
    }

    /// Append a top-level thread. Threads with a parent are refused.
    pub fn register_top_level(&self, thread: &ManagedThread) -> bool {
        if thread.has_parent() {
            tracing::warn!(
                thread_id = %thread.id(),
                thread_name = %thread.name(),
                "Refusing to register a child thread as top-level"
            );
            return false;
        }

        let mut threads = self.inner.threads.lock();
        if threads.iter().any(|t| t == thread) {
            return true;
        }
        threads.push(thread.clone());

        tracing::debug!(
            thread_id = %thread.id(),
            thread_name = %thread.name(),
            registered = threads.len(),
            "Top-level thread registered"
        );
        true
    }

    pub fn remove(&self, id: &ThreadId) -> Option<ManagedThread> {
        let mut threads = self.inner.threads.lock();
        let index = threads.iter().position(|t| &t.id() == id)?;
        Some(threads.remove(index))
    }

    pub fn get(&self, id: &ThreadId) -> Option<ManagedThread> {
        self.inner
            .threads
            .lock()
            .iter()
            .find(|t| &t.id() == id)
            .cloned()
    }

    /// First registered thread with this name
    pub fn get_by_name(&self, name: &str) -> Option<ManagedThread> {
        self.inner
            .threads
            .lock()
            .iter()
            .find(|t| t.name() == name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.threads.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.threads.lock().is_empty()
    }

    /// Snapshot in registration order
    pub fn threads(&self) -> Vec<ManagedThread> {
        self.inner.threads.lock().clone()
    }

    pub fn active_threads(&self) -> Vec<ManagedThread> {
        self.threads().into_iter().filter(ManagedThread::is_alive).collect()
    }

    /// Stop every registered thread, one after another.
    ///
    /// Each stop may block up to the configured stop timeout.
    pub fn stop_all(&self) {
        let threads = self.threads();
        tracing::info!(thread_count = threads.len(), "Stopping all top-level threads");

        for thread in threads {
            thread.stop();
        }

        tracing::info!("All top-level threads stopped");
    }

    /// Block until every alive non-background top-level thread finishes
    pub fn wait_foreground(&self) {
        for thread in self
            .active_threads()
            .into_iter()
            .filter(|t| !t.is_background())
        {
            thread.wait();
        }
    }

    pub fn register_extension(&self, name: impl Into<String>, provider: Arc<dyn BacktraceProvider>) {
        let name = name.into();
        tracing::debug!(extension = %name, "Diagnostics extension registered");
        self.inner.extensions.lock().insert(name, provider);
    }

    pub fn unregister_extension(&self, name: &str) -> bool {
        self.inner.extensions.lock().remove(name).is_some()
    }

    /// Best-effort backtraces of active threads. Empty when no backtrace
    /// extension is registered.
    pub fn thread_backtraces(&self) -> Vec<ThreadBacktrace> {
        let provider = self.inner.extensions.lock().get(BACKTRACE_EXTENSION).cloned();
        let Some(provider) = provider else {
            tracing::debug!(
                error = %DiagnosticsError::MissingExtension(BACKTRACE_EXTENSION.to_string()),
                "Backtraces unavailable"
            );
            return Vec::new();
        };

        self.active_threads()
            .into_iter()
            .filter_map(|thread| match provider.capture(&thread) {
                Ok(frames) => Some(ThreadBacktrace {
                    thread_id: thread.id(),
                    thread_name: thread.name().to_string(),
                    frames,
                }),
                Err(e) => {
                    tracing::warn!(
                        thread_id = %thread.id(),
                        thread_name = %thread.name(),
                        error = %e,
                        "Failed to capture thread backtrace"
                    );
                    None
                }
            })
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let threads = self.threads();

        let mut threads_by_state = HashMap::new();
        for state in [
            ThreadState::Ready,
            ThreadState::Running,
            ThreadState::Stopping,
            ThreadState::Terminated,
            ThreadState::Stopped,
        ] {
            threads_by_state.insert(state, 0);
        }
        for thread in &threads {
            *threads_by_state.entry(thread.state()).or_insert(0) += 1;
        }

        RegistryStats {
            total_threads: threads.len(),
            active_threads: threads.iter().filter(|t| t.is_alive()).count(),
            critical_threads: threads.iter().filter(|t| t.is_critical()).count(),
            background_threads: threads.iter().filter(|t| t.is_background()).count(),
            stopping_threads: threads.iter().filter(|t| t.is_stopping()).count(),
            threads_by_state,
            reported_panics: self.inner.reporter.total_reported(),
        }
    }
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ThreadRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadRegistry")
            .field("threads", &self.len())
            .field("extensions", &self.inner.extensions.lock().keys().collect::<Vec<_>>())
            .field("config", &self.inner.config)
            .finish()
    }
}
