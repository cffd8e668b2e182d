use super::super::*;
use super::common::{idle_until_stopped, test_registry};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[test]
fn test_fresh_thread_is_ready_and_not_alive() {
    let registry = test_registry();
    let thread = ManagedThread::create(&registry, "fresh", true, |_| Ok(())).unwrap();

    assert!(thread.is_ready());
    assert!(!thread.is_alive());
    assert!(!thread.is_stopping());
    assert!(!thread.is_terminated());
    assert_eq!(thread.state(), ThreadState::Ready);
    assert!(thread.is_background());
    assert!(!thread.is_critical());
    assert_eq!(thread.child_count(), 0);
}

#[test]
fn test_start_and_stop_looping_thread() {
    let registry = test_registry();
    let thread = ManagedThread::create(&registry, "A", true, idle_until_stopped).unwrap();

    thread.start().unwrap();
    assert!(thread.is_alive());
    assert_eq!(thread.state(), ThreadState::Running);

    thread.stop();
    assert!(!thread.is_alive());
    assert!(!thread.is_stopping());
    assert!(thread.is_ready());
}

#[test]
fn test_start_on_alive_thread_is_noop() {
    let registry = test_registry();
    let runs = Arc::new(AtomicU32::new(0));
    let counter = runs.clone();
    let thread = ManagedThread::create(&registry, "once", false, move |ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        idle_until_stopped(ctx)
    })
    .unwrap();

    thread.start().unwrap();
    let native_id = thread.native_id();
    thread.start().unwrap();
    thread.start().unwrap();
    assert_eq!(thread.native_id(), native_id);

    thread.stop_with(false);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(thread.metrics().start_count, 1);
}

#[test]
fn test_start_on_terminated_thread_is_noop() {
    let registry = test_registry();
    let runs = Arc::new(AtomicU32::new(0));
    let counter = runs.clone();
    let thread = ManagedThread::create(&registry, "short", false, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    thread.start().unwrap();
    assert!(thread.wait_timeout(Duration::from_secs(2)));
    assert!(thread.is_terminated());
    assert_eq!(thread.state(), ThreadState::Terminated);

    thread.start().unwrap();
    assert!(thread.wait_timeout(Duration::from_secs(2)));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_start_without_regen_fails_not_ready() {
    let registry = test_registry();
    let thread = ManagedThread::create(&registry, "no-regen", false, idle_until_stopped).unwrap();

    thread.start().unwrap();
    thread.stop_with(false);
    assert!(!thread.is_ready());
    assert_eq!(thread.state(), ThreadState::Stopped);

    let err = thread.start().unwrap_err();
    assert!(matches!(err, ThreadError::NotReady { .. }));
}

#[test]
fn test_stop_then_restart() {
    let registry = test_registry();
    let runs = Arc::new(AtomicU32::new(0));
    let counter = runs.clone();
    let thread = ManagedThread::create(&registry, "restartable", true, move |ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        idle_until_stopped(ctx)
    })
    .unwrap();

    thread.start().unwrap();
    let first_native = thread.native_id();
    thread.stop();
    assert!(thread.is_ready());
    assert!(!thread.is_alive());
    assert_ne!(thread.native_id(), first_native);

    thread.start().unwrap();
    assert!(thread.is_alive());
    thread.stop();

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    let metrics = thread.metrics();
    assert_eq!(metrics.start_count, 2);
    assert_eq!(metrics.stop_count, 2);
    assert_eq!(metrics.regen_count, 2);
}

#[test]
fn test_regen_on_ready_thread_is_illegal() {
    let registry = test_registry();
    let thread = ManagedThread::create(&registry, "ready", false, |_| Ok(())).unwrap();

    let err = thread.regen().unwrap_err();
    assert!(matches!(err, ThreadError::IllegalState { .. }));
}

#[test]
fn test_regen_on_running_thread_is_illegal() {
    let registry = test_registry();
    let thread = ManagedThread::create(&registry, "running", false, idle_until_stopped).unwrap();

    thread.start().unwrap();
    let err = thread.regen().unwrap_err();
    assert!(matches!(err, ThreadError::IllegalState { .. }));

    thread.stop();
}

#[test]
fn test_manual_regen_after_stop_without_regenerate() {
    let registry = test_registry();
    let thread = ManagedThread::create(&registry, "manual", false, idle_until_stopped).unwrap();

    thread.start().unwrap();
    thread.stop_with(false);
    thread.regen().unwrap();

    assert!(thread.is_ready());
    thread.start().unwrap();
    assert!(thread.is_alive());
    thread.stop();
}

#[test]
fn test_parameterized_work_receives_parameter() {
    let registry = test_registry();
    let seen = Arc::new(AtomicU32::new(0));
    let sink = seen.clone();
    let thread = ManagedThread::create_parameterized(&registry, "param", false, move |_, param| {
        let value = param
            .and_then(|p| p.downcast::<u32>().ok())
            .map(|v| *v)
            .unwrap_or(0);
        sink.store(value, Ordering::SeqCst);
        Ok(())
    })
    .unwrap();

    assert!(thread.work().is_parameterized());
    thread.start_with(Arc::new(42u32)).unwrap();
    assert!(thread.wait_timeout(Duration::from_secs(2)));
    assert_eq!(seen.load(Ordering::SeqCst), 42);
}

#[test]
fn test_parameterized_work_started_without_parameter() {
    let registry = test_registry();
    let got_none = Arc::new(AtomicU32::new(0));
    let flag = got_none.clone();
    let thread = ManagedThread::create_parameterized(&registry, "param-none", false, move |_, param| {
        if param.is_none() {
            flag.store(1, Ordering::SeqCst);
        }
        Ok(())
    })
    .unwrap();

    thread.start().unwrap();
    assert!(thread.wait_timeout(Duration::from_secs(2)));
    assert_eq!(got_none.load(Ordering::SeqCst), 1);
}

#[test]
fn test_context_exposes_identity() {
    let registry = test_registry();
    let names = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = names.clone();
    let thread = ManagedThread::create(&registry, "identity", false, move |ctx| {
        sink.lock().push((ctx.name().to_string(), ctx.id(), ctx.native_id()));
        assert_eq!(std::thread::current().name(), Some("identity"));
        Ok(())
    })
    .unwrap();

    thread.start().unwrap();
    assert!(thread.wait_timeout(Duration::from_secs(2)));

    let names = names.lock();
    assert_eq!(names.len(), 1);
    assert_eq!(names[0].0, "identity");
    assert_eq!(names[0].1, thread.id());
    assert_eq!(names[0].2, thread.native_id());
}

#[test]
fn test_builder_without_work_is_null_delegate() {
    let registry = test_registry();
    let err = ThreadBuilder::new("empty").build_in(&registry).unwrap_err();
    assert!(matches!(err, ThreadError::NullDelegate { .. }));
    assert!(registry.is_empty());
}

#[test]
fn test_critical_flag_is_advisory() {
    let registry = test_registry();
    let thread = ThreadBuilder::new("critical")
        .critical(true)
        .work(idle_until_stopped)
        .build_in(&registry)
        .unwrap();

    assert!(thread.is_critical());
    thread.start().unwrap();
    thread.stop();
    assert!(!thread.is_alive());

    thread.set_critical(false);
    assert!(!thread.is_critical());
}

#[test]
fn test_stop_on_never_started_thread() {
    let registry = test_registry();
    let thread = ManagedThread::create(&registry, "idle", false, idle_until_stopped).unwrap();

    thread.stop();
    assert!(thread.is_ready());
    assert!(!thread.is_alive());
    thread.start().unwrap();
    assert!(thread.is_alive());
    thread.stop();
}

#[test]
fn test_summary_and_logging_context() {
    let registry = test_registry();
    let thread = ManagedThread::create(&registry, "summary", true, |_| Ok(())).unwrap();

    let summary = thread.summary();
    assert!(summary.contains("'summary'"));
    assert!(summary.contains("State: ready"));

    let context = thread.create_logging_context("inspect");
    assert_eq!(context.thread_id, thread.id());
    assert_eq!(context.operation, "inspect");
    assert_eq!(context.correlation_id.to_string(), thread.id().to_string());
    assert_eq!(context.native_id, thread.native_id());
    assert_eq!(context.parent_id, None);
    drop(context.create_span());

    let child = thread
        .add_child(ThreadBuilder::new("inner").work(|_| Ok(())))
        .unwrap();
    let child_context = child.create_logging_context("inspect");
    assert_eq!(child_context.parent_id, Some(thread.id()));
    assert_eq!(child_context.native_id, child.native_id());
    assert_ne!(child_context.native_id, context.native_id);
    drop(child_context.create_span());

    // A regenerated thread logs under its new native generation
    thread.start().unwrap();
    thread.stop();
    assert_ne!(thread.create_logging_context("inspect").native_id, context.native_id);
}

#[test]
fn test_correlation_ids() {
    let first = CorrelationId::new();
    let second = CorrelationId::new();
    assert_ne!(first, second);

    let thread_id = ThreadId::new();
    assert_eq!(
        CorrelationId::from_thread_id(&thread_id),
        CorrelationId::from_thread_id(&thread_id)
    );
    assert_ne!(CorrelationId::from_thread_id(&thread_id), first);
}
