use super::super::*;
use super::common::{idle_until_stopped, test_registry};
use std::sync::Arc;
use std::time::Duration;

struct FixedBacktraces;

impl BacktraceProvider for FixedBacktraces {
    fn capture(&self, thread: &ManagedThread) -> Result<Vec<String>, DiagnosticsError> {
        if thread.name() == "opaque" {
            return Err(DiagnosticsError::ExtensionFailed {
                name: BACKTRACE_EXTENSION.to_string(),
                message: "frames unavailable".to_string(),
            });
        }
        Ok(vec![format!("{}::run", thread.name())])
    }
}

#[test]
fn test_registry_tracks_top_level_threads_in_order() {
    let registry = test_registry();
    let a = ManagedThread::create(&registry, "a", false, |_| Ok(())).unwrap();
    let b = ManagedThread::create(&registry, "b", false, |_| Ok(())).unwrap();
    let dup = ManagedThread::create(&registry, "a", false, |_| Ok(())).unwrap();

    assert_eq!(registry.len(), 3);
    assert_eq!(registry.threads(), vec![a.clone(), b.clone(), dup.clone()]);
    assert_eq!(registry.get(&b.id()).unwrap(), b);
    assert_eq!(registry.get_by_name("a").unwrap(), a);

    // Registering twice keeps one entry
    assert!(registry.register_top_level(&a));
    assert_eq!(registry.len(), 3);

    assert_eq!(registry.remove(&a.id()).unwrap(), a);
    assert_eq!(registry.get_by_name("a").unwrap(), dup);
    assert!(registry.remove(&a.id()).is_none());
}

#[test]
fn test_active_threads_and_stop_all() {
    let registry = test_registry();
    let running = ManagedThread::create(&registry, "running", true, idle_until_stopped).unwrap();
    running
        .add_child(ThreadBuilder::new("child").work(idle_until_stopped))
        .unwrap();
    let _idle = ManagedThread::create(&registry, "idle", true, idle_until_stopped).unwrap();

    running.start().unwrap();
    let active = registry.active_threads();
    assert_eq!(active, vec![running.clone()]);

    registry.stop_all();
    assert!(registry.active_threads().is_empty());
    assert!(registry.threads().iter().all(ManagedThread::is_ready));
    assert!(!running.get_child(0).unwrap().is_alive());
}

#[test]
fn test_stats_reflect_thread_flags() {
    let registry = test_registry();
    let critical = ThreadBuilder::new("critical")
        .critical(true)
        .background(true)
        .work(idle_until_stopped)
        .build_in(&registry)
        .unwrap();
    let _plain = ManagedThread::create(&registry, "plain", false, |_| Ok(())).unwrap();

    critical.start().unwrap();
    let stats = registry.stats();

    assert_eq!(stats.total_threads, 2);
    assert_eq!(stats.active_threads, 1);
    assert_eq!(stats.critical_threads, 1);
    assert_eq!(stats.background_threads, 1);
    assert_eq!(stats.stopping_threads, 0);
    assert_eq!(stats.threads_by_state[&ThreadState::Running], 1);
    assert_eq!(stats.threads_by_state[&ThreadState::Ready], 1);
    assert_eq!(stats.threads_by_state[&ThreadState::Stopped], 0);

    registry.stop_all();
}

#[test]
fn test_backtraces_without_extension_are_empty() {
    let registry = test_registry();
    let thread = ManagedThread::create(&registry, "busy", true, idle_until_stopped).unwrap();
    thread.start().unwrap();

    assert!(registry.thread_backtraces().is_empty());
    thread.stop();
}

#[test]
fn test_backtraces_with_extension() {
    let registry = test_registry();
    registry.register_extension(BACKTRACE_EXTENSION, Arc::new(FixedBacktraces));

    let busy = ManagedThread::create(&registry, "busy", true, idle_until_stopped).unwrap();
    let opaque = ManagedThread::create(&registry, "opaque", true, idle_until_stopped).unwrap();
    let _stopped = ManagedThread::create(&registry, "never-started", true, idle_until_stopped).unwrap();
    busy.start().unwrap();
    opaque.start().unwrap();

    let backtraces = registry.thread_backtraces();
    assert_eq!(backtraces.len(), 1);
    assert_eq!(backtraces[0].thread_id, busy.id());
    assert_eq!(backtraces[0].frames, vec!["busy::run".to_string()]);

    assert!(registry.unregister_extension(BACKTRACE_EXTENSION));
    assert!(registry.thread_backtraces().is_empty());

    registry.stop_all();
}

#[test]
fn test_wait_foreground_ignores_background_threads() {
    let registry = test_registry();
    let foreground = ManagedThread::create(&registry, "fg", false, |ctx| {
        ctx.sleep(Duration::from_millis(30))?;
        Ok(())
    })
    .unwrap();
    let background = ManagedThread::create(&registry, "bg", true, idle_until_stopped).unwrap();

    foreground.start().unwrap();
    background.start().unwrap();
    registry.wait_foreground();

    assert!(!foreground.is_alive());
    assert!(background.is_alive());
    registry.stop_all();
}

#[test]
fn test_registry_config_flows_to_threads() {
    let registry = ThreadRegistry::with_config(ThreadConfig {
        stop_timeout: Duration::from_millis(10),
        panic_history_limit: 1,
        log_completions: false,
    });

    assert_eq!(registry.config().stop_timeout, Duration::from_millis(10));
    assert_eq!(DEFAULT_STOP_TIMEOUT, Duration::from_secs(60));
    assert_eq!(ThreadConfig::default().stop_timeout, DEFAULT_STOP_TIMEOUT);

    let panics = registry.reporter().subscribe();
    let thread = ManagedThread::create(&registry, "fails", false, |_| Err("nope".into())).unwrap();
    thread.start().unwrap();
    assert!(wait_for_input(&panics, Duration::from_secs(2)).is_some());

    let other = ManagedThread::create(&registry, "fails-too", false, |_| Err("again".into())).unwrap();
    other.start().unwrap();
    assert!(wait_for_input(&panics, Duration::from_secs(2)).is_some());

    assert_eq!(registry.reporter().history().len(), 1);
    assert_eq!(registry.reporter().history()[0].message, "again");
}
