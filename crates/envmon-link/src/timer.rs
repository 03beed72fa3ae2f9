//! Cancellable one-shot and periodic timers.
//!
//! A timer is a spawned task that calls its `fire` callback; the callback
//! only enqueues an event for the manager. Dropping the [`Timer`] cancels it.
//! A timer that already fired may still have an event in flight, so the
//! manager also checks the timer id before acting.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub(crate) struct Timer {
    id: u64,
    cancel: CancellationToken,
}

impl Timer {
    /// Fire once after `delay`.
    pub(crate) fn once<F>(id: u64, delay: Duration, fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        drop(tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => fire(),
            }
        }));
        Self { id, cancel }
    }

    /// Fire every `period`, first after one full period.
    pub(crate) fn every<F>(id: u64, period: Duration, fire: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        drop(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => fire(),
                }
            }
        }));
        Self { id, cancel }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
