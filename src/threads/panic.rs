use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::threads::logging::{CorrelationId, now_millis};
use crate::threads::types::ThreadId;

/// How a worker failure escaped the caller's delegate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanicOrigin {
    /// The delegate returned `Err`
    Error,
    /// The delegate unwound with a Rust panic
    Panic,
}

impl std::fmt::Display for PanicOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PanicOrigin::Error => write!(f, "error"),
            PanicOrigin::Panic => write!(f, "panic"),
        }
    }
}

/// A contained worker failure: reported and logged, never fatal to the host
#[derive(Debug, Clone)]
pub struct ContinuablePanic {
    pub thread_id: ThreadId,
    pub thread_name: String,
    pub native_id: u64,
    pub correlation_id: CorrelationId,
    pub message: String,
    pub error_type: String,
    pub error_chain: Vec<String>,
    pub context: HashMap<String, String>,
    pub origin: PanicOrigin,
    pub timestamp: u64,
}

impl ContinuablePanic {
    pub fn from_error(
        error: &dyn std::error::Error,
        thread_id: ThreadId,
        thread_name: &str,
        native_id: u64,
    ) -> Self {
        let mut error_chain = Vec::new();
        let mut current_error = Some(error);

        while let Some(err) = current_error {
            error_chain.push(err.to_string());
            current_error = err.source();
        }

        Self {
            thread_id,
            thread_name: thread_name.to_string(),
            native_id,
            correlation_id: CorrelationId::from_thread_id(&thread_id),
            message: error.to_string(),
            error_type: std::any::type_name_of_val(error).to_string(),
            error_chain,
            context: HashMap::new(),
            origin: PanicOrigin::Error,
            timestamp: now_millis(),
        }
    }

    pub fn from_panic_payload(
        payload: &(dyn Any + Send),
        thread_id: ThreadId,
        thread_name: &str,
        native_id: u64,
    ) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "worker panicked with a non-string payload".to_string()
        };

        Self {
            thread_id,
            thread_name: thread_name.to_string(),
            native_id,
            correlation_id: CorrelationId::from_thread_id(&thread_id),
            error_chain: vec![message.clone()],
            message,
            error_type: "panic".to_string(),
            context: HashMap::new(),
            origin: PanicOrigin::Panic,
            timestamp: now_millis(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn log_structured(&self) {
        tracing::error!(
            correlation_id = %self.correlation_id,
            thread_id = %self.thread_id,
            thread_name = %self.thread_name,
            native_id = self.native_id,
            origin = %self.origin,
            error_type = %self.error_type,
            timestamp = self.timestamp,
            error_chain = ?self.error_chain,
            context = ?self.context,
            "Continuable kernel panic in managed thread: {}", self.message
        );
    }
}

#[derive(Debug)]
struct ReporterInner {
    history: Mutex<VecDeque<ContinuablePanic>>,
    history_limit: usize,
    subscribers: Mutex<Vec<Sender<ContinuablePanic>>>,
    total_reported: AtomicU64,
}

/// Centralized sink for contained worker failures.
///
/// Keeps a bounded history and fans every report out to subscribers.
#[derive(Debug, Clone)]
pub struct PanicReporter {
    inner: Arc<ReporterInner>,
}

impl PanicReporter {
    pub fn new(history_limit: usize) -> Self {
        Self {
            inner: Arc::new(ReporterInner {
                history: Mutex::new(VecDeque::with_capacity(history_limit)),
                history_limit,
                subscribers: Mutex::new(Vec::new()),
                total_reported: AtomicU64::new(0),
            }),
        }
    }

    pub fn report(&self, panic: ContinuablePanic) {
        panic.log_structured();
        self.inner.total_reported.fetch_add(1, Ordering::SeqCst);

        self.inner
            .subscribers
            .lock()
            .retain(|tx| tx.send(panic.clone()).is_ok());

        let mut history = self.inner.history.lock();
        history.push_back(panic);
        while history.len() > self.inner.history_limit {
            history.pop_front();
        }
    }

    /// Receive every report made after this call
    pub fn subscribe(&self) -> Receiver<ContinuablePanic> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.inner.subscribers.lock().push(tx);
        rx
    }

    pub fn history(&self) -> Vec<ContinuablePanic> {
        self.inner.history.lock().iter().cloned().collect()
    }

    pub fn total_reported(&self) -> u64 {
        self.inner.total_reported.load(Ordering::SeqCst)
    }

    pub fn clear_history(&self) {
        self.inner.history.lock().clear();
    }
}

impl Default for PanicReporter {
    fn default() -> Self {
        Self::new(10)
    }
}
