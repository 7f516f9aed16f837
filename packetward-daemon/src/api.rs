//! HTTP query/control surface and WebSocket live-push channel.
//!
//! All bodies are JSON. Client errors use `{"status":"error","message":..}`
//! with 400 for validation failures and 404 for unknown sessions; any other
//! failure is logged and answered with a generic 500.
//!
//! # Routes
//!
//! | Method | Path | |
//! |---|---|---|
//! | GET | `/api/logs` | recent events + stats |
//! | POST | `/api/logs` | append one event to the store |
//! | GET | `/api/logs/history` | stored events by date range / kind |
//! | POST | `/api/logs/clear` | reset stats and recent events |
//! | GET | `/api/capture` | capture state + stats |
//! | POST | `/api/capture/start`, `/api/capture/stop` | capture transitions |
//! | GET, POST | `/api/sessions` | list / save session snapshots |
//! | GET, DELETE | `/api/sessions/:id` | fetch / delete a snapshot |
//! | GET | `/ws` | live-push channel |
//! | GET | `/health` | aggregated component health |

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use packetward_core::error::{SessionError, StorageError};
use packetward_core::pipeline::EventStore;
use packetward_core::types::{
    CaptureState, ClassifiedEvent, EventFilter, EventKind, SessionSnapshot, SessionSummary,
};
use packetward_engine::{
    ControlCommand, EngineError, SessionDraft, SessionManager, StatsSnapshot, TrafficMonitor,
};

use crate::health::{ComponentHealth, DaemonHealth, aggregate_status};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    monitor: Arc<TrafficMonitor>,
    store: Arc<dyn EventStore>,
    sessions: SessionManager,
    started: Instant,
    shutdown: CancellationToken,
}

impl AppState {
    /// `shutdown` closes open WebSocket connections when cancelled.
    pub fn new(
        monitor: Arc<TrafficMonitor>,
        store: Arc<dyn EventStore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sessions: SessionManager::new(Arc::clone(&store)),
            monitor,
            store,
            started: Instant::now(),
            shutdown,
        }
    }

    /// Collect component health into a daemon-wide report.
    pub async fn health(&self) -> DaemonHealth {
        let components = vec![
            ComponentHealth {
                name: "engine".to_owned(),
                enabled: true,
                status: self.monitor.health(),
            },
            ComponentHealth {
                name: format!("store ({})", self.store.name()),
                enabled: true,
                status: self.store.health_check().await,
            },
        ];
        DaemonHealth {
            status: aggregate_status(&components),
            uptime_secs: self.started.elapsed().as_secs(),
            capture_state: self.monitor.capture_state(),
            components,
        }
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/logs", get(get_logs).post(add_log))
        .route("/api/logs/history", get(log_history))
        .route("/api/logs/clear", post(clear_logs))
        .route("/api/capture", get(capture_status))
        .route("/api/capture/start", post(start_capture))
        .route("/api/capture/stop", post(stop_capture))
        .route("/api/sessions", get(list_sessions).post(save_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/ws", get(ws_upgrade))
        .route("/health", get(health))
        .with_state(state)
}

// =============================================================================
// Errors
// =============================================================================

/// Handler error mapped onto the `{status:"error", message}` body.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: &'static str,
    message: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, message) = match &self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message.as_str()),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message.as_str()),
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        };
        (
            code,
            Json(ErrorBody {
                status: "error",
                message,
            }),
        )
            .into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        if matches!(err, EngineError::Session(SessionError::NotFound { .. })) {
            Self::NotFound(message)
        } else if err.is_client_error() {
            Self::BadRequest(message)
        } else {
            Self::Internal(message)
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// =============================================================================
// Response bodies
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct LogsResponse {
    pub logs: Vec<ClassifiedEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusMessage {
    pub status: String,
    pub message: String,
}

impl StatusMessage {
    fn success(message: &str) -> Self {
        Self {
            status: "success".to_owned(),
            message: message.to_owned(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CaptureResponse {
    pub state: CaptureState,
    pub stats: StatsSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransitionResponse {
    pub status: String,
    pub stats: StatsSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionSaved {
    pub status: String,
    pub id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionList {
    pub sessions: Vec<SessionSummary>,
}

// =============================================================================
// Logs
// =============================================================================

async fn get_logs(State(state): State<AppState>) -> Json<LogsResponse> {
    Json(LogsResponse {
        logs: state.monitor.recent_events(),
        stats: Some(state.monitor.stats()),
    })
}

async fn add_log(
    State(state): State<AppState>,
    body: Result<Json<ClassifiedEvent>, JsonRejection>,
) -> ApiResult<StatusMessage> {
    let Json(event) = body?;
    state.store.append_event(event).await?;
    Ok(Json(StatusMessage::success("Log saved")))
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub event_type: Option<String>,
}

impl HistoryParams {
    /// Convert raw query parameters into a store filter.
    pub fn into_filter(self) -> Result<EventFilter, ApiError> {
        let start = self
            .start_date
            .as_deref()
            .map(|s| parse_date(s, DateBound::Start))
            .transpose()?;
        let end = self
            .end_date
            .as_deref()
            .map(|s| parse_date(s, DateBound::End))
            .transpose()?;
        let event_type = self
            .event_type
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| {
                EventKind::from_name(s)
                    .ok_or_else(|| ApiError::BadRequest(format!("unknown event_type '{s}'")))
            })
            .transpose()?;
        Ok(EventFilter {
            start,
            end,
            event_type,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum DateBound {
    Start,
    End,
}

/// RFC 3339 timestamps are taken as-is; a plain `YYYY-MM-DD` date covers the whole day.
fn parse_date(raw: &str, bound: DateBound) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("invalid date '{raw}'")))?;
    let time = match bound {
        DateBound::Start => NaiveTime::MIN,
        DateBound::End => NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)
            .ok_or_else(|| ApiError::Internal("end-of-day time out of range".to_owned()))?,
    };
    Ok(date.and_time(time).and_utc())
}

async fn log_history(
    State(state): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> ApiResult<LogsResponse> {
    let Query(params) = params?;
    let filter = params.into_filter()?;
    let logs = state.store.query_events(filter).await?;
    Ok(Json(LogsResponse { logs, stats: None }))
}

async fn clear_logs(State(state): State<AppState>) -> Json<StatusMessage> {
    state.monitor.clear();
    Json(StatusMessage::success("Logs cleared successfully"))
}

// =============================================================================
// Capture
// =============================================================================

async fn capture_status(State(state): State<AppState>) -> Json<CaptureResponse> {
    Json(CaptureResponse {
        state: state.monitor.capture_state(),
        stats: state.monitor.stats(),
    })
}

async fn start_capture(State(state): State<AppState>) -> Json<TransitionResponse> {
    Json(TransitionResponse {
        status: "started".to_owned(),
        stats: state.monitor.start_capture(),
    })
}

async fn stop_capture(State(state): State<AppState>) -> Json<TransitionResponse> {
    Json(TransitionResponse {
        status: "stopped".to_owned(),
        stats: state.monitor.stop_capture(),
    })
}

// =============================================================================
// Sessions
// =============================================================================

async fn save_session(
    State(state): State<AppState>,
    body: Result<Json<SessionDraft>, JsonRejection>,
) -> ApiResult<SessionSaved> {
    let Json(mut draft) = body?;
    if draft.events.is_none() {
        draft.events = Some(state.monitor.recent_events());
    }
    if draft.timestamp.is_none() {
        draft.timestamp = Some(Utc::now());
    }
    let id = state.sessions.save(draft).await?;
    Ok(Json(SessionSaved {
        status: "success".to_owned(),
        id,
    }))
}

async fn list_sessions(State(state): State<AppState>) -> ApiResult<SessionList> {
    let sessions = state.sessions.list().await?;
    Ok(Json(SessionList { sessions }))
}

fn parse_session_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(format!("session not found: {raw}")))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SessionSnapshot> {
    let id = parse_session_id(&id)?;
    Ok(Json(state.sessions.get(id).await?))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusMessage> {
    let id = parse_session_id(&id)?;
    state.sessions.delete(id).await?;
    Ok(Json(StatusMessage::success("Session deleted")))
}

// =============================================================================
// Health
// =============================================================================

async fn health(State(state): State<AppState>) -> Response {
    let report = state.health().await;
    let code = if report.status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(report)).into_response()
}

// =============================================================================
// WebSocket
// =============================================================================

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| observe(socket, state))
}

/// Serve one observer until it disconnects or the daemon shuts down.
async fn observe(mut socket: WebSocket, state: AppState) {
    let hub = Arc::clone(state.monitor.hub());
    let subscription = hub.subscribe();
    tracing::info!(subscriber = subscription.id(), "observer connected");

    loop {
        tokio::select! {
            message = subscription.recv() => {
                let Some(message) = message else { break };
                let text = match serde_json::to_string(&*message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, kind = message.kind(), "failed to encode hub message");
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = handle_command(&state, &text) {
                            let body = serde_json::json!({ "status": "error", "message": e.to_string() });
                            if socket.send(Message::Text(body.to_string())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
            _ = state.shutdown.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        }
    }

    hub.unsubscribe(subscription.id());
    tracing::info!(subscriber = subscription.id(), "observer disconnected");
}

fn handle_command(state: &AppState, text: &str) -> Result<(), EngineError> {
    let command = ControlCommand::parse(text)?;
    state.monitor.handle_command(command);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_plain_end_date_covers_whole_day() {
        let end = parse_date("2024-01-15", DateBound::End).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 23, 59, 59).unwrap();
        assert!(end > expected);
        assert!(end < Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 0).unwrap());

        let start = parse_date("2024-01-15", DateBound::Start).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_rfc3339_dates_are_converted_to_utc() {
        let ts = parse_date("2024-01-15T12:00:00+02:00", DateBound::Start).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_invalid_inputs_are_bad_requests() {
        assert!(matches!(
            parse_date("15/01/2024", DateBound::Start),
            Err(ApiError::BadRequest(_))
        ));

        let params = HistoryParams {
            event_type: Some("port_knock".to_owned()),
            ..Default::default()
        };
        assert!(matches!(params.into_filter(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_empty_event_type_means_any() {
        let params = HistoryParams {
            event_type: Some(String::new()),
            ..Default::default()
        };
        assert!(params.into_filter().unwrap().event_type.is_none());
    }

    #[test]
    fn test_engine_errors_map_to_status_classes() {
        let not_found: ApiError = EngineError::from(SessionError::NotFound {
            id: "x".to_owned(),
        })
        .into();
        assert!(matches!(not_found, ApiError::NotFound(_)));

        let invalid: ApiError = EngineError::from(SessionError::Validation {
            field: "title".to_owned(),
            reason: "must not be empty".to_owned(),
        })
        .into();
        assert!(matches!(invalid, ApiError::BadRequest(_)));

        let internal: ApiError = EngineError::Channel("closed".to_owned()).into();
        assert!(matches!(internal, ApiError::Internal(_)));
    }
}
