use std::time::Duration;

use tokio::time::MissedTickBehavior;

use super::handle::AgentHandle;

/// Ask the task machine to poll the controller every `interval`.
/// Exits once the machine is gone.
pub fn spawn_poll_loop(agent: AgentHandle, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip immediate first tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if agent.poll().is_err() {
                tracing::info!("Task machine gone, poll loop exiting");
                break;
            }
        }
    })
}
