//! Route handlers.

use std::convert::Infallible;
use std::time::Duration;

use api::{
    ChannelTransport, DeliveryReport, Event, EventHub, HubError, HubStats, Metadata, TaskId, pump,
};
use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::demo;

/// Frames buffered between the hub stream and the HTTP body.
const BODY_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct DemoJobRequest {
    #[serde(default)]
    pub steps: Option<u32>,
    #[serde(default)]
    pub step_ms: Option<u64>,
    #[serde(default)]
    pub fail: bool,
}

#[derive(Debug, Serialize)]
pub struct DemoJobResponse {
    pub task_id: TaskId,
}

pub fn router(hub: EventHub) -> Router {
    Router::new()
        .route(
            "/api/tasks/{task_id}/events",
            get(stream_task_events).post(publish_event),
        )
        .route("/api/broadcast", post(broadcast))
        .route("/api/stats", get(stats))
        .route("/api/demo/jobs", post(start_demo_job))
        .with_state(hub)
}

fn error_response(e: HubError) -> (StatusCode, String) {
    let status = match &e {
        HubError::ConnectionNotFound(_) => StatusCode::NOT_FOUND,
        HubError::Unavailable(_) | HubError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
        HubError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        HubError::InvalidEventType(_) => StatusCode::BAD_REQUEST,
        HubError::NotSubscribed { .. }
        | HubError::ConnectionClosed(_)
        | HubError::ReplayFailed { .. }
        | HubError::StreamTaken(_) => StatusCode::CONFLICT,
    };
    (status, e.to_string())
}

fn client_metadata(headers: &HeaderMap) -> Metadata {
    let mut metadata = Metadata::new();
    if let Some(agent) = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
    {
        metadata.insert("user_agent".to_string(), Value::String(agent.to_string()));
    }
    metadata
}

/// Stream a task's events as `text/event-stream`.
pub async fn stream_task_events(
    State(hub): State<EventHub>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, (StatusCode, String)> {
    let stream = hub
        .attach(task_id, client_metadata(&headers))
        .await
        .map_err(error_response)?;

    let (mut transport, rx) = ChannelTransport::channel(BODY_BUFFER);
    tokio::spawn(async move {
        pump(stream, &mut transport).await;
    });

    // The body ends when the pump drops the transport; a client hangup
    // drops `rx`, which fails the next write and stops the pump.
    let frames = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|frame| (Ok::<_, Infallible>(frame), rx))
    });

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(frames),
    )
        .into_response())
}

pub async fn publish_event(
    State(hub): State<EventHub>,
    Path(task_id): Path<String>,
    Json(req): Json<PublishRequest>,
) -> Result<Json<DeliveryReport>, (StatusCode, String)> {
    let event = Event::from_value(req.event_type, req.payload);
    let report = hub
        .publish_event(task_id, event)
        .await
        .map_err(error_response)?;
    Ok(Json(report))
}

pub async fn broadcast(
    State(hub): State<EventHub>,
    Json(req): Json<PublishRequest>,
) -> Result<Json<DeliveryReport>, (StatusCode, String)> {
    let event = Event::from_value(req.event_type, req.payload);
    let report = hub
        .broadcast_all(event.event_type, event.payload)
        .await
        .map_err(error_response)?;
    Ok(Json(report))
}

pub async fn stats(
    State(hub): State<EventHub>,
) -> Result<Json<HubStats>, (StatusCode, String)> {
    let stats = hub.stats().await.map_err(error_response)?;
    Ok(Json(stats))
}

pub async fn start_demo_job(
    State(hub): State<EventHub>,
    Json(req): Json<DemoJobRequest>,
) -> (StatusCode, Json<DemoJobResponse>) {
    let task_id = TaskId::new(format!("job-{}", ulid::Ulid::new()));
    let steps = req.steps.unwrap_or(demo::DEFAULT_STEPS);
    let step_delay = Duration::from_millis(req.step_ms.unwrap_or(demo::DEFAULT_STEP_MS));

    tracing::info!(task_id = %task_id, steps, fail = req.fail, "Starting demo job");
    demo::spawn_demo_job(hub, task_id.clone(), steps, step_delay, req.fail);

    (StatusCode::ACCEPTED, Json(DemoJobResponse { task_id }))
}
