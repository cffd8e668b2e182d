use crate::threads::logging::now_millis;

/// Lifecycle counters for a managed thread
#[derive(Debug, Clone, Default)]
pub struct ThreadMetrics {
    pub start_count: u32,
    pub stop_count: u32,
    pub regen_count: u32,
    pub completion_count: u32,
    pub failure_count: u32,
    pub last_run_duration_ms: Option<u64>,
    pub last_success_time: Option<u64>,
    pub last_failure_time: Option<u64>,
}

impl ThreadMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_start(&mut self) {
        self.start_count += 1;
    }

    pub fn record_stop(&mut self) {
        self.stop_count += 1;
    }

    pub fn record_regen(&mut self) {
        self.regen_count += 1;
    }

    pub fn record_completion(&mut self, duration_ms: u64) {
        self.completion_count += 1;
        self.last_run_duration_ms = Some(duration_ms);
        self.last_success_time = Some(now_millis());
    }

    pub fn record_failure(&mut self, duration_ms: u64) {
        self.failure_count += 1;
        self.last_run_duration_ms = Some(duration_ms);
        self.last_failure_time = Some(now_millis());
    }
}
