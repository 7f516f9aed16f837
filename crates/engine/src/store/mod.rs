//! 영속 저장소 구현과 비동기 기록 큐
//!
//! - [`MemoryStore`]: 프로세스 내 저장소 (기본값)
//! - [`JsonFileStore`]: JSON lines + 세션별 JSON 파일
//! - [`run_append_writer`]: 분류 경로가 `try_send`로 넣은 이벤트를 저장소에 기록하는 태스크
//!
//! 분류 경로는 저장소 I/O를 기다리지 않습니다. 큐가 가득 차면 이벤트는 버려지고
//! 메트릭으로만 보고됩니다.

mod file;
mod memory;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use packetward_core::config::StorageConfig;
use packetward_core::error::StorageError;
use packetward_core::metrics as m;
use packetward_core::pipeline::EventStore;
use packetward_core::types::ClassifiedEvent;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

/// 설정된 백엔드로 저장소를 엽니다.
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn EventStore>, StorageError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryStore::with_event_limit(
            config.memory_event_limit,
        ))),
        "file" => Ok(Arc::new(JsonFileStore::open(&config.data_dir).await?)),
        other => Err(StorageError::Unavailable(format!(
            "unknown storage backend '{other}'"
        ))),
    }
}

/// 기록 큐를 소비하여 저장소에 이벤트를 추가합니다.
///
/// 취소되면 큐를 닫고 이미 들어와 있는 이벤트까지 기록한 뒤 종료합니다.
/// 기록에 성공한 이벤트 수를 반환합니다.
pub async fn run_append_writer(
    store: Arc<dyn EventStore>,
    mut rx: mpsc::Receiver<ClassifiedEvent>,
    cancel: CancellationToken,
) -> u64 {
    let mut written = 0u64;
    info!(store = store.name(), "append writer started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("append writer cancelled, draining queue");
                break;
            }
            received = rx.recv() => match received {
                Some(event) => {
                    if append_one(store.as_ref(), event).await {
                        written += 1;
                    }
                }
                None => {
                    info!(written, "append queue closed");
                    return written;
                }
            }
        }
    }

    rx.close();
    while let Some(event) = rx.recv().await {
        if append_one(store.as_ref(), event).await {
            written += 1;
        }
    }
    info!(written, "append writer stopped");
    written
}

async fn append_one(store: &dyn EventStore, event: ClassifiedEvent) -> bool {
    match store.append_event(event).await {
        Ok(()) => {
            metrics::counter!(m::STORE_EVENTS_APPENDED_TOTAL, m::LABEL_STORE => store.name().to_owned())
                .increment(1);
            true
        }
        Err(e) => {
            metrics::counter!(m::STORE_APPEND_FAILURES_TOTAL, m::LABEL_STORE => store.name().to_owned())
                .increment(1);
            warn!(store = store.name(), error = %e, "failed to persist event");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use packetward_core::types::{EventKind, Severity};

    fn event() -> ClassifiedEvent {
        ClassifiedEvent {
            timestamp: Utc::now(),
            src_ip: "10.0.0.1".parse().unwrap(),
            dst_ip: "10.0.0.2".parse().unwrap(),
            protocol: "HTTP".to_owned(),
            event_type: EventKind::NormalTraffic,
            severity: Severity::Low,
            details: "Normal network traffic".to_owned(),
        }
    }

    #[tokio::test]
    async fn writer_drains_buffered_events_on_cancel() {
        let store = Arc::new(MemoryStore::new());
        let (tx, rx) = mpsc::channel(16);
        for _ in 0..5 {
            tx.try_send(event()).unwrap();
        }
        let cancel = CancellationToken::new();
        cancel.cancel();

        let written = run_append_writer(store.clone(), rx, cancel).await;
        assert_eq!(written, 5);
        assert_eq!(store.event_count(), 5);
    }

    #[tokio::test]
    async fn writer_stops_when_senders_dropped() {
        let store = Arc::new(MemoryStore::new());
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(run_append_writer(
            store.clone(),
            rx,
            CancellationToken::new(),
        ));
        tx.send(event()).await.unwrap();
        drop(tx);

        assert_eq!(task.await.unwrap(), 1);
        assert_eq!(store.event_count(), 1);
    }

    #[tokio::test]
    async fn open_store_memory_backend_honors_event_limit() {
        let config = StorageConfig {
            memory_event_limit: 2,
            ..Default::default()
        };
        let store = open_store(&config).await.unwrap();
        for _ in 0..3 {
            store.append_event(event()).await.unwrap();
        }

        let kept = store
            .query_events(packetward_core::types::EventFilter::default())
            .await
            .unwrap();
        assert_eq!(kept.len(), 2);
    }

    #[tokio::test]
    async fn open_store_rejects_unknown_backend() {
        let config = StorageConfig {
            backend: "redis".to_owned(),
            ..Default::default()
        };
        assert!(open_store(&config).await.is_err());
    }

    #[tokio::test]
    async fn open_store_file_backend_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: "file".to_owned(),
            data_dir: dir.path().join("data").display().to_string(),
            ..Default::default()
        };
        let store = open_store(&config).await.unwrap();
        assert_eq!(store.name(), "file");
        assert!(dir.path().join("data").join("sessions").is_dir());
    }
}
