use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::threads::error::Interrupted;

#[derive(Debug, Default)]
struct SignalInner {
    set: Mutex<bool>,
    cond: Condvar,
}

/// One-shot signal that blocked waiters can sleep on.
///
/// Once set it stays set. Each native thread generation owns two of these:
/// a [`StopToken`] that tells the worker to wind down and an exit latch that
/// tells supervisors the worker is gone.
#[derive(Debug, Clone, Default)]
pub(crate) struct Signal {
    inner: Arc<SignalInner>,
}

impl Signal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self) {
        let mut set = self.inner.set.lock();
        if !*set {
            *set = true;
            self.inner.cond.notify_all();
        }
    }

    pub(crate) fn is_set(&self) -> bool {
        *self.inner.set.lock()
    }

    pub(crate) fn wait(&self) {
        let mut set = self.inner.set.lock();
        while !*set {
            self.inner.cond.wait(&mut set);
        }
    }

    /// Returns true if the signal was set before the timeout elapsed
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            // Past the end of the clock, so no deadline at all
            self.wait();
            return true;
        };
        let mut set = self.inner.set.lock();
        while !*set {
            if self.inner.cond.wait_until(&mut set, deadline).timed_out() {
                return *set;
            }
        }
        true
    }
}

/// Cooperative cancellation token handed to worker code.
///
/// A worker that never checks [`StopToken::is_stopping`] and never blocks
/// through [`StopToken::sleep`] cannot be stopped; it runs until its work
/// returns.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    signal: Signal,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every sleeper
    pub fn stop(&self) {
        self.signal.set();
    }

    pub fn is_stopping(&self) -> bool {
        self.signal.is_set()
    }

    /// Sleep for `duration`, waking early with [`Interrupted`] on stop
    pub fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        if self.signal.wait_timeout(duration) {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }

    /// Block until a stop is requested
    pub fn wait(&self) {
        self.signal.wait();
    }
}
