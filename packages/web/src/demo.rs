//! Simulated long-running job that publishes its progress to the hub.

use std::time::Duration;

use api::{EventHub, HubError, TaskId, payload_from_value};
use serde_json::json;
use tokio::task::JoinHandle;

pub const DEFAULT_STEPS: u32 = 5;
pub const DEFAULT_STEP_MS: u64 = 1000;
pub const MAX_STEPS: u32 = 1000;

fn percent(step: u32, steps: u32) -> u64 {
    u64::from(step) * 100 / u64::from(steps.max(1))
}

pub fn spawn_demo_job(
    hub: EventHub,
    task_id: TaskId,
    steps: u32,
    step_delay: Duration,
    fail: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_demo_job(&hub, &task_id, steps, step_delay, fail).await {
            tracing::warn!(task_id = %task_id, "Demo job stopped: {}", e);
        }
    })
}

/// Publish `started`, one `progress` per step, then `completed` or `failed`.
pub async fn run_demo_job(
    hub: &EventHub,
    task_id: &TaskId,
    steps: u32,
    step_delay: Duration,
    fail: bool,
) -> Result<(), HubError> {
    let steps = steps.clamp(1, MAX_STEPS);
    hub.publish(task_id.clone(), "started", payload_from_value(json!({ "steps": steps })))
        .await?;

    for step in 1..=steps {
        tokio::time::sleep(step_delay).await;
        let pct = percent(step, steps);
        hub.publish(
            task_id.clone(),
            "progress",
            payload_from_value(json!({ "step": step, "pct": pct })),
        )
        .await?;
    }

    if fail {
        hub.publish(
            task_id.clone(),
            "failed",
            payload_from_value(json!({ "error": "Intentional failure" })),
        )
        .await?;
    } else {
        hub.publish(
            task_id.clone(),
            "completed",
            payload_from_value(json!({ "message": format!("Completed {} steps", steps) })),
        )
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;
    use api::{HubConfig, Metadata};
    use futures_util::StreamExt;

    #[test]
    fn test_percent_does_not_overflow() {
        assert_eq!(percent(1, 4), 25);
        assert_eq!(percent(u32::MAX, u32::MAX), 100);
        assert_eq!(percent(0, 0), 0);
    }

    #[tokio::test]
    async fn test_step_count_is_clamped() -> Result<(), Box<dyn Error>> {
        let (hub, _handle) = EventHub::start(HubConfig::default()).await?;
        let task_id = TaskId::from("job-huge");

        run_demo_job(&hub, &task_id, u32::MAX, Duration::ZERO, false).await?;

        // History keeps the tail: the final progress step, then `completed`.
        let stream = hub.attach(task_id, Metadata::new()).await?;
        let records: Vec<_> = stream.collect().await;
        let [.., last_step, done] = records.as_slice() else {
            return Err("too few records".into());
        };
        assert_eq!(last_step.data.get("step"), Some(&json!(MAX_STEPS)));
        assert_eq!(last_step.data.get("pct"), Some(&json!(100)));
        assert_eq!(done.event, "completed");

        hub.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_demo_job_replays_to_late_watcher() -> Result<(), Box<dyn Error>> {
        let (hub, _handle) = EventHub::start(HubConfig::default()).await?;
        let task_id = TaskId::from("job-demo");

        run_demo_job(&hub, &task_id, 3, Duration::ZERO, false).await?;

        let stats = hub.stats().await?;
        assert_eq!(stats.history_size_by_task.get(&task_id), Some(&5));

        let stream = hub.attach(task_id, Metadata::new()).await?;
        let events: Vec<String> = stream.map(|record| record.event).collect().await;
        assert_eq!(
            events,
            vec!["connected", "started", "progress", "progress", "progress", "completed"]
        );

        hub.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_failing_demo_job_ends_with_failed() -> Result<(), Box<dyn Error>> {
        let (hub, _handle) = EventHub::start(HubConfig::default()).await?;
        let task_id = TaskId::from("job-fail");

        let mut stream = hub.attach(task_id.clone(), Metadata::new()).await?;
        spawn_demo_job(hub.clone(), task_id, 2, Duration::from_millis(1), true).await?;

        let mut last = None;
        while let Some(record) = stream.next().await {
            last = Some(record.event);
        }
        assert_eq!(last.as_deref(), Some("failed"));

        hub.shutdown().await?;
        Ok(())
    }
}
