//! Decoder start watchdog.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::handle::{TaskEvent, deliver};

/// Single-shot timer that reports [`TaskEvent::WatchdogExpired`] for the
/// attempt it was armed with.
#[derive(Debug, Default)]
pub struct Watchdog {
    timer: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Arm for `attempt`, replacing any running timer.
    pub fn arm(&mut self, attempt: u64, budget: Duration, events: mpsc::WeakSender<TaskEvent>) {
        self.cancel();
        let deadline = Instant::now() + budget;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            deliver(&events, TaskEvent::WatchdogExpired { attempt }).await;
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}
