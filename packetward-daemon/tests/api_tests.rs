//! HTTP API tests.
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot`,
//! backed by an in-memory store and a real traffic monitor.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use packetward_core::pipeline::EventStore;
use packetward_core::types::{
    ClassifiedEvent, EventKind, Severity, TcpFlags, TrafficRecord, TransportProtocol,
};
use packetward_daemon::api::{self, AppState};
use packetward_engine::{MemoryStore, TrafficMonitor, TrafficMonitorBuilder};

struct Harness {
    app: Router,
    monitor: Arc<TrafficMonitor>,
    store: Arc<MemoryStore>,
    _append_rx: Option<mpsc::Receiver<ClassifiedEvent>>,
}

fn harness() -> Harness {
    let (monitor, append_rx) = TrafficMonitorBuilder::new()
        .build()
        .expect("monitor should build");
    let monitor = Arc::new(monitor);
    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn EventStore> = store.clone();
    let state = AppState::new(Arc::clone(&monitor), dyn_store, CancellationToken::new());
    Harness {
        app: api::router(state),
        monitor,
        store,
        _append_rx: append_rx,
    }
}

fn record(dst_port: u16) -> TrafficRecord {
    TrafficRecord {
        timestamp: Utc::now(),
        src_ip: "192.168.1.10".parse().unwrap(),
        dst_ip: "192.168.1.20".parse().unwrap(),
        src_port: Some(51000),
        dst_port: Some(dst_port),
        transport: TransportProtocol::Tcp,
        length: 60,
        tcp_flags: Some(TcpFlags::from_bits(TcpFlags::ACK)),
        dns_query: None,
    }
}

fn stored_event(kind: EventKind, y: i32, m: u32, d: u32, h: u32) -> ClassifiedEvent {
    ClassifiedEvent {
        timestamp: Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap(),
        src_ip: "10.0.0.5".parse().unwrap(),
        dst_ip: "10.0.0.6".parse().unwrap(),
        protocol: "HTTP".to_owned(),
        event_type: kind,
        severity: Severity::Low,
        details: format!("{kind} at {h}h"),
    }
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body should be JSON")
    };
    (status, value)
}

// --- logs ---

#[tokio::test]
async fn test_get_logs_returns_recent_events_and_stats() {
    // Given: Two records classified while capturing
    let h = harness();
    h.monitor.start_capture();
    h.monitor.process_record(&record(80));
    h.monitor.process_record(&record(443));

    // When: Fetching the recent logs
    let (status, body) = send(&h.app, Method::GET, "/api/logs", None).await;

    // Then: Both events come back with the running stats
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["logs"].as_array().unwrap().len(), 2);
    assert_eq!(body["logs"][0]["protocol"], "HTTP");
    assert_eq!(body["logs"][1]["protocol"], "HTTPS");
    assert_eq!(body["stats"]["packets_analyzed"], 2);
    assert_eq!(body["stats"]["active_ips"], 2);
    assert_eq!(body["stats"]["scan_status"], "Normal");
}

#[tokio::test]
async fn test_clear_logs_resets_events_and_stats() {
    // Given: A monitor with one classified event
    let h = harness();
    h.monitor.start_capture();
    h.monitor.process_record(&record(80));

    // When: Clearing
    let (status, body) = send(&h.app, Method::POST, "/api/logs/clear", None).await;

    // Then: Success message, and the next fetch is empty
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Logs cleared successfully");

    let (_, body) = send(&h.app, Method::GET, "/api/logs", None).await;
    assert!(body["logs"].as_array().unwrap().is_empty());
    assert_eq!(body["stats"]["packets_analyzed"], 0);
}

#[tokio::test]
async fn test_post_log_appends_to_store() {
    // Given: An empty store
    let h = harness();
    let event = stored_event(EventKind::LargePacket, 2024, 1, 15, 9);

    // When: Posting one event
    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api/logs",
        Some(serde_json::to_value(&event).unwrap()),
    )
    .await;

    // Then: It is persisted as-is
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(h.store.event_count(), 1);
}

#[tokio::test]
async fn test_post_log_with_malformed_body_is_bad_request() {
    let h = harness();

    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api/logs",
        Some(json!({ "source_ip": "not-an-ip" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert!(body["message"].is_string());
    assert_eq!(h.store.event_count(), 0);
}

// --- history ---

#[tokio::test]
async fn test_history_filters_by_whole_day_and_kind() {
    // Given: Events on two different days
    let h = harness();
    for event in [
        stored_event(EventKind::NetworkScan, 2024, 1, 15, 10),
        stored_event(EventKind::NormalTraffic, 2024, 1, 15, 23),
        stored_event(EventKind::NetworkScan, 2024, 1, 16, 1),
    ] {
        h.store.append_event(event).await.unwrap();
    }

    // When: Querying a single day
    let (status, body) = send(
        &h.app,
        Method::GET,
        "/api/logs/history?start_date=2024-01-15&end_date=2024-01-15",
        None,
    )
    .await;

    // Then: The late-evening event is included, the next day is not
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["logs"].as_array().unwrap().len(), 2);
    assert!(body.get("stats").is_none());

    // When: Narrowing by kind as well
    let (_, body) = send(
        &h.app,
        Method::GET,
        "/api/logs/history?start_date=2024-01-15&end_date=2024-01-15&event_type=network_scan",
        None,
    )
    .await;

    // Then: Only the scan on that day remains
    let logs = body["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["event_type"], "network_scan");
}

#[tokio::test]
async fn test_history_without_filters_returns_everything() {
    let h = harness();
    h.store
        .append_event(stored_event(EventKind::NormalTraffic, 2023, 6, 1, 12))
        .await
        .unwrap();

    let (status, body) = send(&h.app, Method::GET, "/api/logs/history", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["logs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_history_rejects_unknown_kind_and_bad_date() {
    let h = harness();

    let (status, body) = send(
        &h.app,
        Method::GET,
        "/api/logs/history?event_type=port_knock",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    let (status, _) = send(
        &h.app,
        Method::GET,
        "/api/logs/history?start_date=15-01-2024",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// --- capture ---

#[tokio::test]
async fn test_capture_start_and_stop_transitions() {
    // Given: A fresh monitor (Idle)
    let h = harness();
    let (_, body) = send(&h.app, Method::GET, "/api/capture", None).await;
    assert_eq!(body["state"], "idle");

    // When: Starting capture
    let (status, body) = send(&h.app, Method::POST, "/api/capture/start", None).await;

    // Then: The state is Capturing and stats are fresh
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "started");
    assert_eq!(body["stats"]["packets_analyzed"], 0);
    let (_, body) = send(&h.app, Method::GET, "/api/capture", None).await;
    assert_eq!(body["state"], "capturing");

    // When: Traffic arrives and capture stops
    h.monitor.process_record(&record(22));
    let (status, body) = send(&h.app, Method::POST, "/api/capture/stop", None).await;

    // Then: Stats are preserved by default, state is Idle
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "stopped");
    assert_eq!(body["stats"]["packets_analyzed"], 1);
    let (_, body) = send(&h.app, Method::GET, "/api/capture", None).await;
    assert_eq!(body["state"], "idle");
}

#[tokio::test]
async fn test_records_while_idle_do_not_change_logs() {
    let h = harness();
    h.monitor.process_record(&record(80));

    let (_, body) = send(&h.app, Method::GET, "/api/logs", None).await;

    assert!(body["logs"].as_array().unwrap().is_empty());
    assert_eq!(body["stats"]["packets_analyzed"], 0);
}

// --- sessions ---

#[tokio::test]
async fn test_session_lifecycle() {
    // Given: One classified event in the recent ring
    let h = harness();
    h.monitor.start_capture();
    h.monitor.process_record(&record(53));

    // When: Saving a session with only a title
    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api/sessions",
        Some(json!({ "title": "morning run" })),
    )
    .await;

    // Then: The current recent events are captured into it
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    let id = body["id"].as_str().unwrap().to_owned();

    let (_, body) = send(&h.app, Method::GET, "/api/sessions", None).await;
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["title"], "morning run");
    assert_eq!(sessions[0]["event_count"], 1);

    let (status, body) = send(&h.app, Method::GET, &format!("/api/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["events"].as_array().unwrap().len(), 1);
    assert_eq!(body["events"][0]["protocol"], "DNS");

    // When: Deleting it
    let (status, body) =
        send(&h.app, Method::DELETE, &format!("/api/sessions/{id}"), None).await;

    // Then: It is gone
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    let (status, body) = send(&h.app, Method::GET, &format!("/api/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_session_with_explicit_events_keeps_them() {
    let h = harness();
    let events = vec![
        stored_event(EventKind::NetworkScan, 2024, 2, 1, 8),
        stored_event(EventKind::ExternalConnection, 2024, 2, 1, 9),
    ];

    let (status, body) = send(
        &h.app,
        Method::POST,
        "/api/sessions",
        Some(json!({
            "title": "imported",
            "events": events,
            "timestamp": "2024-02-01T10:00:00Z",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let id = body["id"].as_str().unwrap();
    let (_, body) = send(&h.app, Method::GET, &format!("/api/sessions/{id}"), None).await;
    let roundtrip: Vec<ClassifiedEvent> = serde_json::from_value(body["events"].clone()).unwrap();
    assert_eq!(roundtrip, events);
    assert_eq!(body["timestamp"], "2024-02-01T10:00:00Z");
}

#[tokio::test]
async fn test_session_without_title_is_rejected() {
    // Given: An empty store
    let h = harness();

    // When: Saving with a blank or missing title
    for payload in [json!({ "title": "  " }), json!({})] {
        let (status, body) = send(&h.app, Method::POST, "/api/sessions", Some(payload)).await;

        // Then: 400 and nothing persisted
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }
    let (_, body) = send(&h.app, Method::GET, "/api/sessions", None).await;
    assert!(body["sessions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_or_malformed_session_id_is_not_found() {
    let h = harness();

    let unknown = uuid::Uuid::new_v4();
    let (status, _) = send(&h.app, Method::GET, &format!("/api/sessions/{unknown}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&h.app, Method::DELETE, "/api/sessions/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
}

// --- health ---

#[tokio::test]
async fn test_health_reports_components() {
    let h = harness();
    h.monitor.start_capture();

    let (status, body) = send(&h.app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"]["status"], "healthy");
    assert_eq!(body["capture_state"], "capturing");
    let names: Vec<&str> = body["components"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["engine", "store (memory)"]);
}
