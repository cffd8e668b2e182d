use crate::threads::types::ThreadId;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{Span, field};
use uuid::Uuid;

/// Correlation ID for tracking operations across thread boundaries
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct CorrelationId(Uuid);

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Deterministic correlation ID reusing the thread's UUID
    pub fn from_thread_id(thread_id: &ThreadId) -> Self {
        Self(thread_id.as_uuid())
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Logging context for lifecycle operations on a managed thread
#[derive(Debug, Clone)]
pub struct ThreadLoggingContext {
    pub correlation_id: CorrelationId,
    pub thread_id: ThreadId,
    pub thread_name: String,
    /// Native generation the operation acted on
    pub native_id: u64,
    pub parent_id: Option<ThreadId>,
    pub operation: String,
    pub start_time: u64,
}

impl ThreadLoggingContext {
    pub fn new(thread_id: ThreadId, thread_name: String, native_id: u64, operation: String) -> Self {
        Self {
            correlation_id: CorrelationId::from_thread_id(&thread_id),
            thread_id,
            thread_name,
            native_id,
            parent_id: None,
            operation,
            start_time: now_millis(),
        }
    }

    pub fn with_parent(mut self, parent_id: ThreadId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn elapsed_ms(&self) -> u64 {
        now_millis().saturating_sub(self.start_time)
    }

    pub fn create_span(&self) -> Span {
        let span = tracing::info_span!(
            "thread_operation",
            correlation_id = %self.correlation_id,
            thread_id = %self.thread_id,
            thread_name = %self.thread_name,
            native_id = self.native_id,
            parent_id = field::Empty,
            operation = %self.operation,
            start_time = self.start_time,
            elapsed_ms = field::Empty,
            result = field::Empty,
        );
        if let Some(parent_id) = self.parent_id {
            span.record("parent_id", field::display(parent_id));
        }
        span
    }
}
