use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::header::HeaderValue;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use drover_client::RpaHttpClient;
use drover_core::{parse_account_rows, StartError, StoreSnapshot};
use drover_types::{WorkflowConfig, WorkflowEvent, WorkflowStatus, WorkflowType};

use crate::AppState;

const STATUS_LOG_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartWorkflowInput {
    api_token: String,
    group_name: String,
    /// CSV/TSV text, header-driven; see the accounts parser.
    account_data: String,
    ig_app_version_id: String,
    concurrency_limit: Option<usize>,
    max_retries_per_stage: Option<u32>,
    base_backoff_seconds: Option<u64>,
    poll_interval_seconds: Option<u64>,
    poll_timeout_seconds: Option<u64>,
    workflow_type: Option<WorkflowType>,
    custom_login_flow_id: Option<String>,
    custom_login_flow_params: Option<Vec<String>>,
    setup_flow_ids: Option<HashMap<String, String>>,
    custom_task_order: Option<Vec<String>>,
    api_base_url: Option<String>,
}

type ApiError = (StatusCode, Json<Value>);

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.into() })),
    )
}

fn conflict(message: impl Into<String>) -> ApiError {
    (
        StatusCode::CONFLICT,
        Json(json!({ "error": message.into() })),
    )
}

async fn start_workflow(
    State(state): State<AppState>,
    Json(input): Json<StartWorkflowInput>,
) -> Result<Json<Value>, ApiError> {
    let accounts =
        parse_account_rows(&input.account_data).map_err(|err| bad_request(err.to_string()))?;

    let mut config = WorkflowConfig::new(
        input.api_token.clone(),
        input.group_name,
        accounts,
        input.ig_app_version_id,
        input.workflow_type.unwrap_or(WorkflowType::Warmup),
    );
    if let Some(limit) = input.concurrency_limit {
        config.concurrency_limit = limit;
    }
    if let Some(retries) = input.max_retries_per_stage {
        config.max_retries_per_stage = retries;
    }
    if let Some(backoff) = input.base_backoff_seconds {
        config.base_backoff_secs = backoff;
    }
    if let Some(interval) = input.poll_interval_seconds {
        config.poll_interval_secs = interval;
    }
    if let Some(timeout) = input.poll_timeout_seconds {
        config.poll_timeout_secs = timeout;
    }
    config.custom_login_flow_id = input.custom_login_flow_id;
    config.custom_login_flow_params = input.custom_login_flow_params.unwrap_or_default();
    config.setup_flow_ids = input.setup_flow_ids.unwrap_or_default();
    config.custom_task_order = input.custom_task_order.unwrap_or_default();

    let base_url = input
        .api_base_url
        .unwrap_or_else(|| state.api_base_url.clone());
    let client = Arc::new(RpaHttpClient::new(base_url, input.api_token));

    let run_id = state
        .orchestrator
        .start(config, client)
        .await
        .map_err(|err| match err {
            StartError::AlreadyRunning => conflict(err.to_string()),
            StartError::NoAccounts | StartError::NoPhones(_) => bad_request(err.to_string()),
            StartError::Rpa(rpa) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": rpa.to_string() })),
            ),
        })?;
    Ok(Json(json!({ "status": "started", "runId": run_id })))
}

/// Idempotent stop. When no orchestrator run is live but the store still
/// claims one, the stored status is reconciled to `stopped`.
async fn stop_workflow(State(state): State<AppState>) -> Json<Value> {
    let stopped = state.orchestrator.stop().await;
    if !stopped && state.store.status().await.is_active() {
        state.store.force_status(WorkflowStatus::Stopped).await;
    }
    Json(json!({ "status": "stopped" }))
}

async fn clear_workflow(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    if state.orchestrator.is_running().await || state.store.status().await.is_active() {
        return Err(conflict("cannot clear while a workflow is running"));
    }
    state.store.reset().await;
    Ok(Json(json!({ "status": "cleared" })))
}

async fn workflow_status(State(state): State<AppState>) -> Json<StoreSnapshot> {
    Json(state.store.snapshot(STATUS_LOG_LIMIT).await)
}

fn sse_event(event: &WorkflowEvent) -> Event {
    Event::default()
        .event(event.topic())
        .data(serde_json::to_string(event).unwrap_or_default())
}

/// Replays the current status and one snapshot per existing job, then follows
/// the live bus.
fn sse_stream(
    snapshot: StoreSnapshot,
    rx: tokio::sync::broadcast::Receiver<WorkflowEvent>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    let mut initial = vec![Ok(sse_event(&WorkflowEvent::WorkflowStatus {
        status: snapshot.status,
        error: snapshot.error,
    }))];
    for job in snapshot.phones {
        initial.push(Ok(sse_event(&WorkflowEvent::PhoneUpdate { job: Box::new(job) })));
    }
    let live = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(event) => Some(Ok(sse_event(&event))),
        // A lagged subscriber just misses the dropped events.
        Err(_) => None,
    });
    tokio_stream::iter(initial).chain(live)
}

async fn events(State(state): State<AppState>) -> Response {
    let snapshot = state.store.snapshot(0).await;
    let rx = state.store.bus().subscribe();
    info!(
        subscribers = state.store.bus().subscriber_count(),
        "event stream client connected"
    );
    let sse = Sse::new(sse_stream(snapshot, rx)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    );
    let mut response = sse.into_response();
    response
        .headers_mut()
        .insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/workflow/start", post(start_workflow))
        .route("/workflow/stop", post(stop_workflow))
        .route("/workflow/clear", post(clear_workflow))
        .route("/workflow/status", get(workflow_status))
        .route("/events", get(events))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = app_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("drover engine listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    fn test_state() -> AppState {
        AppState::new(Some("http://127.0.0.1:0".to_string()))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn status_returns_an_idle_snapshot() {
        let state = test_state();
        let response = app_router(state)
            .oneshot(Request::get("/workflow/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "idle");
        assert_eq!(body["results"]["total"], 0);
        assert!(body["phones"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_is_rejected_while_running() {
        let state = test_state();
        state
            .store
            .set_status(WorkflowStatus::Running, None)
            .await;
        let response = app_router(state.clone())
            .oneshot(Request::post("/workflow/clear").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(state.store.status().await, WorkflowStatus::Running);
    }

    #[tokio::test]
    async fn clear_resets_a_finished_run() {
        let state = test_state();
        state.store.set_status(WorkflowStatus::Running, None).await;
        state.store.set_status(WorkflowStatus::Completed, None).await;
        let response = app_router(state.clone())
            .oneshot(Request::post("/workflow/clear").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.store.status().await, WorkflowStatus::Idle);
    }

    #[tokio::test]
    async fn stop_reconciles_a_stale_running_status() {
        let state = test_state();
        state.store.set_status(WorkflowStatus::Running, None).await;

        let response = app_router(state.clone())
            .oneshot(Request::post("/workflow/stop").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.store.status().await, WorkflowStatus::Stopped);

        // Stopping again changes nothing.
        let response = app_router(state.clone())
            .oneshot(Request::post("/workflow/stop").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.store.status().await, WorkflowStatus::Stopped);
    }

    #[tokio::test]
    async fn start_rejects_malformed_account_data() {
        let state = test_state();
        let body = json!({
            "apiToken": "tok",
            "groupName": "g",
            "accountData": "username\nonly-names\n",
            "igAppVersionId": "app-1",
        });
        let response = app_router(state)
            .oneshot(
                Request::post("/workflow/start")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("password"));
    }

    #[tokio::test]
    async fn events_stream_opens_with_the_current_status() {
        let state = test_state();
        let response = app_router(state)
            .oneshot(Request::get("/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );
        assert_eq!(response.headers().get("x-accel-buffering").unwrap(), "no");

        let mut body = response.into_body().into_data_stream();
        let first = tokio::time::timeout(Duration::from_secs(1), body.next())
            .await
            .expect("first SSE frame")
            .unwrap()
            .unwrap();
        let text = String::from_utf8_lossy(&first);
        assert!(text.contains("event: workflow_status"));
        assert!(text.contains("idle"));
    }
}
