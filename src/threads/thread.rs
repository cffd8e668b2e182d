use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::field;

use crate::threads::cancel::{Signal, StopToken};
use crate::threads::config::ThreadConfig;
use crate::threads::error::{Interrupted, ThreadError};
use crate::threads::logging::{CorrelationId, ThreadLoggingContext};
use crate::threads::metrics::ThreadMetrics;
use crate::threads::panic::{ContinuablePanic, PanicReporter};
use crate::threads::registry::ThreadRegistry;
use crate::threads::types::{
    ThreadId, ThreadParameter, ThreadState, ThreadWork, WorkResult, next_native_id,
};

/// What a running worker can see of its managed thread
#[derive(Clone)]
pub struct ThreadContext {
    id: ThreadId,
    name: String,
    native_id: u64,
    stop_token: StopToken,
    parameter: Option<ThreadParameter>,
}

impl ThreadContext {
    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn native_id(&self) -> u64 {
        self.native_id
    }

    /// True once `stop` has been called on the owning thread
    pub fn is_stopping(&self) -> bool {
        self.stop_token.is_stopping()
    }

    /// Returns `Err(Interrupted)` if a stop was requested
    pub fn checkpoint(&self) -> Result<(), Interrupted> {
        if self.is_stopping() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }

    /// Sleep that wakes early when the thread is stopped
    pub fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        self.stop_token.sleep(duration)
    }

    pub fn stop_token(&self) -> &StopToken {
        &self.stop_token
    }

    pub fn parameter(&self) -> Option<ThreadParameter> {
        self.parameter.clone()
    }

    /// Downcast the start parameter to a concrete type
    pub fn parameter_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.parameter.clone().and_then(|p| p.downcast::<T>().ok())
    }
}

impl std::fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("native_id", &self.native_id)
            .field("is_stopping", &self.is_stopping())
            .field("has_parameter", &self.parameter.is_some())
            .finish()
    }
}

/// One generation of a native thread. Never restarted once it has run.
#[derive(Debug)]
struct NativeThread {
    native_id: u64,
    stop_token: StopToken,
    exited: Signal,
    handle: Option<JoinHandle<()>>,
    started: bool,
}

impl NativeThread {
    fn fresh() -> Self {
        Self {
            native_id: next_native_id(),
            stop_token: StopToken::new(),
            exited: Signal::new(),
            handle: None,
            started: false,
        }
    }

    fn is_alive(&self) -> bool {
        self.started && !self.exited.is_set()
    }

    fn is_terminated(&self) -> bool {
        self.started && self.exited.is_set()
    }

    fn reap(&mut self) {
        if !self.exited.is_set() {
            return;
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!(native_id = self.native_id, "Native thread unwound past the worker boundary");
            }
        }
    }
}

/// Sets the exit latch when the worker closure returns or unwinds
struct ExitGuard(Signal);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.set();
    }
}

/// Clears the stopping flag however `stop` leaves
struct StoppingGuard<'a>(&'a AtomicBool);

impl Drop for StoppingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct ThreadInner {
    id: ThreadId,
    name: String,
    background: bool,
    critical: AtomicBool,
    ready: AtomicBool,
    stopping: AtomicBool,
    work: ThreadWork,
    parent: Option<Weak<ThreadInner>>,
    children: Mutex<Vec<ManagedThread>>,
    native: Mutex<NativeThread>,
    last_parameter: Mutex<Option<ThreadParameter>>,
    metrics: Arc<Mutex<ThreadMetrics>>,
    reporter: PanicReporter,
    config: Arc<ThreadConfig>,
}

/// Supervised wrapper around one native thread plus its child tree.
///
/// Cloning yields another handle to the same thread. A parent owns its
/// children; a child only keeps a weak back-reference used for lookups.
#[derive(Clone)]
pub struct ManagedThread {
    inner: Arc<ThreadInner>,
}

impl ManagedThread {
    pub fn builder(name: impl Into<String>) -> ThreadBuilder {
        ThreadBuilder::new(name)
    }

    /// Create a top-level thread running `work` and register it
    pub fn create<F>(
        registry: &ThreadRegistry,
        name: impl Into<String>,
        background: bool,
        work: F,
    ) -> Result<Self, ThreadError>
    where
        F: Fn(&ThreadContext) -> WorkResult + Send + Sync + 'static,
    {
        ThreadBuilder::new(name)
            .background(background)
            .work(work)
            .build_in(registry)
    }

    /// Create a top-level thread whose work receives the start parameter
    pub fn create_parameterized<F>(
        registry: &ThreadRegistry,
        name: impl Into<String>,
        background: bool,
        work: F,
    ) -> Result<Self, ThreadError>
    where
        F: Fn(&ThreadContext, Option<ThreadParameter>) -> WorkResult + Send + Sync + 'static,
    {
        ThreadBuilder::new(name)
            .background(background)
            .parameterized_work(work)
            .build_in(registry)
    }

    fn from_parts(
        name: String,
        background: bool,
        critical: bool,
        work: ThreadWork,
        parent: Option<Weak<ThreadInner>>,
        reporter: PanicReporter,
        config: Arc<ThreadConfig>,
    ) -> Self {
        let id = ThreadId::new();
        let native = NativeThread::fresh();

        tracing::info!(
            correlation_id = %CorrelationId::from_thread_id(&id),
            thread_id = %id,
            thread_name = %name,
            native_id = native.native_id,
            background,
            critical,
            is_child = parent.is_some(),
            parameterized = work.is_parameterized(),
            "Managed thread created"
        );

        Self {
            inner: Arc::new(ThreadInner {
                id,
                name,
                background,
                critical: AtomicBool::new(critical),
                ready: AtomicBool::new(true),
                stopping: AtomicBool::new(false),
                work,
                parent,
                children: Mutex::new(Vec::new()),
                native: Mutex::new(native),
                last_parameter: Mutex::new(None),
                metrics: Arc::new(Mutex::new(ThreadMetrics::new())),
                reporter,
                config,
            }),
        }
    }

    pub fn id(&self) -> ThreadId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Numeric id of the current native generation
    pub fn native_id(&self) -> u64 {
        self.inner.native.lock().native_id
    }

    pub fn is_background(&self) -> bool {
        self.inner.background
    }

    /// Advisory flag read by task managers; not enforced here
    pub fn is_critical(&self) -> bool {
        self.inner.critical.load(Ordering::SeqCst)
    }

    pub fn set_critical(&self, critical: bool) {
        self.inner.critical.store(critical, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.stopping.load(Ordering::SeqCst)
    }

    pub fn is_alive(&self) -> bool {
        self.inner.native.lock().is_alive()
    }

    /// The current native generation ran to completion
    pub fn is_terminated(&self) -> bool {
        self.inner.native.lock().is_terminated()
    }

    pub fn state(&self) -> ThreadState {
        if self.is_stopping() {
            return ThreadState::Stopping;
        }
        let native = self.inner.native.lock();
        if native.is_alive() {
            ThreadState::Running
        } else if native.is_terminated() {
            ThreadState::Terminated
        } else if self.is_ready() {
            ThreadState::Ready
        } else {
            ThreadState::Stopped
        }
    }

    pub fn has_parent(&self) -> bool {
        self.inner.parent.is_some()
    }

    /// The parent, if this is a child and the parent still exists
    pub fn parent(&self) -> Option<ManagedThread> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| ManagedThread { inner })
    }

    pub fn child_count(&self) -> usize {
        self.inner.children.lock().len()
    }

    /// Snapshot of the child list in insertion order
    pub fn children(&self) -> Vec<ManagedThread> {
        self.inner.children.lock().clone()
    }

    pub fn get_child(&self, index: usize) -> Result<ManagedThread, ThreadError> {
        let children = self.inner.children.lock();
        children
            .get(index)
            .cloned()
            .ok_or_else(|| ThreadError::InvalidIndex {
                name: self.inner.name.clone(),
                index,
                count: children.len(),
            })
    }

    pub fn metrics(&self) -> ThreadMetrics {
        self.inner.metrics.lock().clone()
    }

    pub fn work(&self) -> &ThreadWork {
        &self.inner.work
    }

    /// Create a child owned by this thread.
    ///
    /// The child is started right away when this thread is alive and not
    /// stopping, using the parameter this thread was last started with.
    pub fn add_child(&self, builder: ThreadBuilder) -> Result<ManagedThread, ThreadError> {
        let ThreadBuilder {
            name,
            background,
            critical,
            work,
            ..
        } = builder;
        let work = work.ok_or_else(|| ThreadError::NullDelegate { name: name.clone() })?;

        let child = ManagedThread::from_parts(
            name,
            background,
            critical,
            work,
            Some(Arc::downgrade(&self.inner)),
            self.inner.reporter.clone(),
            self.inner.config.clone(),
        );
        // Held until the child is started so a concurrent stop either sees
        // the stopping flag here or finds the child alive in its snapshot
        let mut children = self.inner.children.lock();
        children.push(child.clone());

        tracing::debug!(
            thread_id = %self.inner.id,
            thread_name = %self.inner.name,
            child_id = %child.id(),
            child_name = %child.name(),
            child_count = children.len(),
            "Child thread added"
        );

        if self.is_alive() && !self.is_stopping() {
            let parameter = self.inner.last_parameter.lock().clone();
            child.start_inner(parameter)?;
        }

        Ok(child)
    }

    /// Start the native thread, then every child
    pub fn start(&self) -> Result<(), ThreadError> {
        self.start_inner(None)
    }

    /// Start with a parameter that children inherit
    pub fn start_with(&self, parameter: ThreadParameter) -> Result<(), ThreadError> {
        self.start_inner(Some(parameter))
    }

    fn start_inner(&self, parameter: Option<ThreadParameter>) -> Result<(), ThreadError> {
        let context = self.create_logging_context("start");
        let span = context.create_span();
        let _entered = span.enter();

        if !self.spawn_native(parameter.clone())? {
            span.record("result", "skipped");
            tracing::debug!("Thread already alive or terminated, start ignored");
            return Ok(());
        }
        *self.inner.last_parameter.lock() = parameter.clone();

        for child in self.children() {
            if let Err(e) = child.start_inner(parameter.clone()) {
                tracing::warn!(
                    child_id = %child.id(),
                    child_name = %child.name(),
                    error = %e,
                    "Failed to start child thread"
                );
            }
        }

        span.record("result", "started");
        span.record("elapsed_ms", context.elapsed_ms());
        Ok(())
    }

    /// Returns false when there was nothing to spawn
    fn spawn_native(&self, parameter: Option<ThreadParameter>) -> Result<bool, ThreadError> {
        let mut native = self.inner.native.lock();

        if !self.is_ready() {
            return Err(ThreadError::NotReady {
                name: self.inner.name.clone(),
                id: self.inner.id,
            });
        }
        if native.started {
            return Ok(false);
        }

        let run = WorkerRun {
            ctx: ThreadContext {
                id: self.inner.id,
                name: self.inner.name.clone(),
                native_id: native.native_id,
                stop_token: native.stop_token.clone(),
                parameter,
            },
            work: self.inner.work.clone(),
            exited: native.exited.clone(),
            metrics: self.inner.metrics.clone(),
            reporter: self.inner.reporter.clone(),
            log_completions: self.inner.config.log_completions,
        };

        let handle = std::thread::Builder::new()
            .name(self.inner.name.clone())
            .spawn(move || run.execute())
            .map_err(|source| ThreadError::Spawn {
                name: self.inner.name.clone(),
                source,
            })?;

        native.handle = Some(handle);
        native.started = true;
        self.inner.metrics.lock().record_start();

        tracing::info!(native_id = native.native_id, "Native thread started");
        Ok(true)
    }

    /// Stop and regenerate so the thread can be started again
    pub fn stop(&self) {
        self.stop_with(true)
    }

    /// Cooperative stop of this thread and its alive children.
    ///
    /// Waits up to the configured ceiling per thread; an overrun only logs.
    pub fn stop_with(&self, regenerate: bool) {
        let context = self.create_logging_context("stop");
        let span = context.create_span();
        let _entered = span.enter();

        self.inner.stopping.store(true, Ordering::SeqCst);
        let _stopping = StoppingGuard(&self.inner.stopping);

        let token = self.inner.native.lock().stop_token.clone();
        token.stop();

        for child in self.children().into_iter().filter(ManagedThread::is_alive) {
            child.stop_with(regenerate);
        }

        let timeout = self.inner.config.stop_timeout;
        if self.wait_timeout(timeout) {
            span.record("result", "stopped");
        } else {
            span.record("result", "timeout");
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Thread tree did not finish within the stop timeout, continuing cleanup"
            );
        }

        self.inner.ready.store(false, Ordering::SeqCst);
        self.inner.metrics.lock().record_stop();

        if regenerate {
            if let Err(e) = self.regen() {
                tracing::error!(error = %e, "Failed to regenerate thread after stop");
            }
        }

        span.record("elapsed_ms", context.elapsed_ms());
    }

    /// Block until this thread and its alive children finish
    pub fn wait(&self) {
        let exited = {
            let native = self.inner.native.lock();
            native.started.then(|| native.exited.clone())
        };
        if let Some(exited) = exited {
            exited.wait();
            self.inner.native.lock().reap();
        }

        for child in self.children().into_iter().filter(ManagedThread::is_alive) {
            child.wait();
        }
    }

    /// Wait up to `timeout` for this thread, then up to `timeout` again for
    /// each alive child. True only if nothing timed out.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let exited = {
            let native = self.inner.native.lock();
            native.started.then(|| native.exited.clone())
        };

        let mut finished = match exited {
            Some(exited) => exited.wait_timeout(timeout),
            None => true,
        };
        if finished {
            self.inner.native.lock().reap();
        }

        for child in self.children().into_iter().filter(ManagedThread::is_alive) {
            finished &= child.wait_timeout(timeout);
        }

        finished
    }

    /// Bind the stored work to a fresh native thread. Only valid after a stop.
    pub fn regen(&self) -> Result<(), ThreadError> {
        let mut native = self.inner.native.lock();

        if self.is_ready() {
            return Err(ThreadError::IllegalState {
                name: self.inner.name.clone(),
                id: self.inner.id,
                reason: "thread is ready, stop it before regenerating",
            });
        }

        let previous = std::mem::replace(&mut *native, NativeThread::fresh());
        if previous.is_alive() {
            tracing::warn!(
                thread_id = %self.inner.id,
                thread_name = %self.inner.name,
                native_id = previous.native_id,
                "Regenerating while the previous native thread is still running, detaching it"
            );
        }

        self.inner.ready.store(true, Ordering::SeqCst);
        self.inner.metrics.lock().record_regen();

        tracing::debug!(
            thread_id = %self.inner.id,
            thread_name = %self.inner.name,
            previous_native_id = previous.native_id,
            native_id = native.native_id,
            "Thread regenerated"
        );
        Ok(())
    }

    /// Get metadata summary for debugging
    pub fn summary(&self) -> String {
        format!(
            "Thread[{}] '{}' - State: {}, Native: {}, Background: {}, Critical: {}, Children: {}",
            self.inner.id,
            self.inner.name,
            self.state(),
            self.native_id(),
            self.is_background(),
            self.is_critical(),
            self.child_count()
        )
    }

    pub fn create_logging_context(&self, operation: &str) -> ThreadLoggingContext {
        let context = ThreadLoggingContext::new(
            self.inner.id,
            self.inner.name.clone(),
            self.native_id(),
            operation.to_string(),
        );
        match self.parent() {
            Some(parent) => context.with_parent(parent.id()),
            None => context,
        }
    }
}

impl PartialEq for ManagedThread {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ManagedThread {}

impl std::fmt::Debug for ManagedThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedThread")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("background", &self.inner.background)
            .field("critical", &self.is_critical())
            .field("children", &self.child_count())
            .finish()
    }
}

/// Everything the native thread needs, detached from the handle
struct WorkerRun {
    ctx: ThreadContext,
    work: ThreadWork,
    exited: Signal,
    metrics: Arc<Mutex<ThreadMetrics>>,
    reporter: PanicReporter,
    log_completions: bool,
}

impl WorkerRun {
    /// Runs the caller's work behind the failure boundary. Nothing escapes:
    /// errors and panics become continuable panics on the reporter.
    fn execute(self) {
        let _exit = ExitGuard(self.exited.clone());
        let ctx = &self.ctx;

        let span = tracing::info_span!(
            "thread_execution",
            correlation_id = %CorrelationId::from_thread_id(&ctx.id),
            thread_id = %ctx.id,
            thread_name = %ctx.name,
            native_id = ctx.native_id,
            result = field::Empty,
            duration_ms = field::Empty,
        );
        let _entered = span.enter();

        tracing::debug!("Starting managed thread work");
        let start_time = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.work.invoke(ctx)));
        let duration_ms = start_time.elapsed().as_millis() as u64;
        span.record("duration_ms", duration_ms);

        match outcome {
            Ok(Ok(())) => {
                span.record("result", "success");
                self.metrics.lock().record_completion(duration_ms);
                if self.log_completions {
                    tracing::info!(duration_ms, "Managed thread work completed");
                }
            }
            Ok(Err(e)) if e.downcast_ref::<Interrupted>().is_some() => {
                span.record("result", "interrupted");
                self.metrics.lock().record_completion(duration_ms);
                tracing::debug!(duration_ms, "Managed thread work interrupted by stop");
            }
            Ok(Err(e)) => {
                span.record("result", "error");
                self.metrics.lock().record_failure(duration_ms);
                let report =
                    ContinuablePanic::from_error(&*e, ctx.id, &ctx.name, ctx.native_id)
                        .with_context("duration_ms", duration_ms.to_string());
                self.reporter.report(report);
            }
            Err(payload) => {
                span.record("result", "panic");
                self.metrics.lock().record_failure(duration_ms);
                let report = ContinuablePanic::from_panic_payload(
                    &*payload,
                    ctx.id,
                    &ctx.name,
                    ctx.native_id,
                )
                .with_context("duration_ms", duration_ms.to_string());
                self.reporter.report(report);
            }
        }
    }
}

/// Builder for managed threads.
///
/// Top-level threads come out of [`ThreadBuilder::build_in`]; children out of
/// [`ManagedThread::add_child`].
#[derive(Debug)]
pub struct ThreadBuilder {
    name: String,
    background: bool,
    critical: bool,
    child: bool,
    work: Option<ThreadWork>,
}

impl ThreadBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            background: false,
            critical: false,
            child: false,
            work: None,
        }
    }

    pub fn background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Mark as a child. Ignored by `build_in`, which has no parent to attach to.
    pub fn child(mut self, child: bool) -> Self {
        self.child = child;
        self
    }

    pub fn work<F>(mut self, work: F) -> Self
    where
        F: Fn(&ThreadContext) -> WorkResult + Send + Sync + 'static,
    {
        self.work = Some(ThreadWork::plain(work));
        self
    }

    pub fn parameterized_work<F>(mut self, work: F) -> Self
    where
        F: Fn(&ThreadContext, Option<ThreadParameter>) -> WorkResult + Send + Sync + 'static,
    {
        self.work = Some(ThreadWork::parameterized(work));
        self
    }

    pub fn with_work(mut self, work: ThreadWork) -> Self {
        self.work = Some(work);
        self
    }

    /// Build a top-level thread and register it
    pub fn build_in(self, registry: &ThreadRegistry) -> Result<ManagedThread, ThreadError> {
        let work = self.work.ok_or_else(|| ThreadError::NullDelegate {
            name: self.name.clone(),
        })?;

        if self.child {
            tracing::debug!(
                thread_name = %self.name,
                "Thread flagged as child without a parent, demoting to top-level"
            );
        }

        let thread = ManagedThread::from_parts(
            self.name,
            self.background,
            self.critical,
            work,
            None,
            registry.reporter(),
            registry.config(),
        );
        registry.register_top_level(&thread);
        Ok(thread)
    }
}
