//! Bounded wait for artifacts appearing on shared storage.
//!
//! The wait is timer-driven: the calling task yields between ticks and the
//! whole future is cancelled by dropping it, so an aborted request never
//! leaves a poller behind.

use std::path::Path;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

/// Poll `condition` every `poll_interval` until it holds or `timeout` has
/// elapsed. The condition is checked once immediately; the timeout outcome is
/// reported no earlier than the bound.
pub async fn await_condition<F>(mut condition: F, poll_interval: Duration, timeout: Duration) -> Readiness
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if condition() {
            return Readiness::Ready;
        }
        if Instant::now() >= deadline {
            return Readiness::TimedOut;
        }
    }
}

/// Wait for a file to exist on shared storage.
pub async fn await_file(path: &Path, poll_interval: Duration, timeout: Duration) -> Readiness {
    await_condition(|| path.exists(), poll_interval, timeout).await
}
