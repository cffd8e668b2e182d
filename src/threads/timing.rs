use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use crate::threads::cancel::StopToken;
use crate::threads::error::Interrupted;

/// Sleep and report how long the sleep actually took
pub fn sleep_measured(duration: Duration) -> Duration {
    let start = Instant::now();
    std::thread::sleep(duration);
    start.elapsed()
}

/// Like [`sleep_measured`], but returns early with [`Interrupted`] on stop
pub fn sleep_interruptible(token: &StopToken, duration: Duration) -> Result<Duration, Interrupted> {
    let start = Instant::now();
    token.sleep(duration)?;
    Ok(start.elapsed())
}

/// Poll `condition` every `poll` until it holds or `timeout` elapses.
///
/// A panicking condition is logged and counts as not yet satisfied.
pub fn spin_wait_until<F>(mut condition: F, timeout: Duration, poll: Duration) -> bool
where
    F: FnMut() -> bool,
{
    // None means the timeout is beyond what the clock can represent
    let deadline = Instant::now().checked_add(timeout);

    loop {
        match panic::catch_unwind(AssertUnwindSafe(|| condition())) {
            Ok(true) => return true,
            Ok(false) => {}
            Err(_) => tracing::warn!("Spin-wait condition panicked, treating as unsatisfied"),
        }

        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                poll.min(deadline - now)
            }
            None => poll,
        };
        std::thread::sleep(pause);
    }
}

/// Wait for one input item, or `None` on timeout or closed channel
pub fn wait_for_input<T>(receiver: &Receiver<T>, timeout: Duration) -> Option<T> {
    match receiver.recv_timeout(timeout) {
        Ok(item) => Some(item),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => {
            tracing::debug!("Input channel closed while waiting");
            None
        }
    }
}
