use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::threads::thread::ThreadContext;

/// Stable identifier for a managed thread, kept across regenerations
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct ThreadId(Uuid);

impl ThreadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID for correlation ID purposes
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

static NEXT_NATIVE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate the numeric id of a fresh native thread generation
pub(crate) fn next_native_id() -> u64 {
    NEXT_NATIVE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Coarse lifecycle view of a managed thread, derived from its flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadState {
    /// Ready and never started in the current generation
    Ready,
    /// Native thread is running
    Running,
    /// Stop was requested and the thread is being torn down
    Stopping,
    /// Native thread ran to completion, regeneration required to run again
    Terminated,
    /// Stopped without regeneration
    Stopped,
}

impl std::fmt::Display for ThreadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreadState::Ready => write!(f, "ready"),
            ThreadState::Running => write!(f, "running"),
            ThreadState::Stopping => write!(f, "stopping"),
            ThreadState::Terminated => write!(f, "terminated"),
            ThreadState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Type aliases for work delegates and their results
pub type WorkResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
pub type ThreadParameter = Arc<dyn Any + Send + Sync>;
pub type PlainWorkFn = Arc<dyn Fn(&ThreadContext) -> WorkResult + Send + Sync + 'static>;
pub type ParameterizedWorkFn =
    Arc<dyn Fn(&ThreadContext, Option<ThreadParameter>) -> WorkResult + Send + Sync + 'static>;

/// The caller-supplied delegate, stored apart from any native thread so it
/// can be bound to a fresh one on regeneration
#[derive(Clone)]
pub enum ThreadWork {
    Plain(PlainWorkFn),
    Parameterized(ParameterizedWorkFn),
}

impl ThreadWork {
    pub fn plain<F>(f: F) -> Self
    where
        F: Fn(&ThreadContext) -> WorkResult + Send + Sync + 'static,
    {
        ThreadWork::Plain(Arc::new(f))
    }

    pub fn parameterized<F>(f: F) -> Self
    where
        F: Fn(&ThreadContext, Option<ThreadParameter>) -> WorkResult + Send + Sync + 'static,
    {
        ThreadWork::Parameterized(Arc::new(f))
    }

    pub fn is_parameterized(&self) -> bool {
        matches!(self, ThreadWork::Parameterized(_))
    }

    pub(crate) fn invoke(&self, ctx: &ThreadContext) -> WorkResult {
        match self {
            ThreadWork::Plain(f) => f(ctx),
            ThreadWork::Parameterized(f) => f(ctx, ctx.parameter()),
        }
    }
}

impl std::fmt::Debug for ThreadWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreadWork::Plain(_) => write!(f, "ThreadWork::Plain(<function>)"),
            ThreadWork::Parameterized(_) => write!(f, "ThreadWork::Parameterized(<function>)"),
        }
    }
}

/// Statistics for registry monitoring
#[derive(Debug, Clone)]
pub struct RegistryStats {
    pub total_threads: usize,
    pub threads_by_state: HashMap<ThreadState, usize>,
    pub active_threads: usize,
    pub critical_threads: usize,
    pub background_threads: usize,
    pub stopping_threads: usize,
    pub reported_panics: u64,
}
