//! Background timers that drive the hub's housekeeping.
//!
//! The timers only send messages; the sweeps themselves run inside the hub
//! actor so they never race other operations.

use std::time::Duration;

use hub_core::TaskId;
use ractor::ActorRef;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::messages::HubMessage;

/// Send `message()` to the hub every `period` until the hub stops.
pub(crate) fn spawn_ticker<F>(
    hub: ActorRef<HubMessage>,
    period: Duration,
    loop_name: &'static str,
    message: F,
) -> JoinHandle<()>
where
    F: Fn() -> HubMessage + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            if hub.send_message(message()).is_err() {
                tracing::warn!(loop_name, "Hub stopped, maintenance loop exiting");
                break;
            }
        }
    })
}

/// Ask the hub to evict `task_id`'s history after `delay`, provided nothing
/// newer than `through_seq` has been recorded by then.
pub(crate) fn schedule_eviction(
    hub: ActorRef<HubMessage>,
    delay: Duration,
    task_id: TaskId,
    through_seq: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let task = task_id.clone();
        if hub
            .send_message(HubMessage::EvictTask {
                task_id,
                through_seq,
            })
            .is_err()
        {
            tracing::debug!(task_id = %task, "Hub stopped before deferred eviction");
        }
    })
}
