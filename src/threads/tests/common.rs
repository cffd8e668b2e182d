use super::super::*;
use std::sync::Once;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

static INIT: Once = Once::new();

pub(super) fn init_tracing() {
    INIT.call_once(|| {
        let _ = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::new("managed_threads=debug"))
            .with_test_writer()
            .try_init();
    });
}

/// Registry whose stop ceiling keeps failing tests short
pub(super) fn test_registry() -> ThreadRegistry {
    init_tracing();
    ThreadRegistry::with_config(ThreadConfig {
        stop_timeout: Duration::from_secs(2),
        ..Default::default()
    })
}

/// Work that ticks until the thread is stopped
pub(super) fn idle_until_stopped(ctx: &ThreadContext) -> WorkResult {
    while !ctx.is_stopping() {
        let _ = ctx.sleep(Duration::from_millis(5));
    }
    Ok(())
}

pub(super) fn wait_until_alive(thread: &ManagedThread) -> bool {
    spin_wait_until(|| thread.is_alive(), Duration::from_secs(2), Duration::from_millis(1))
}
