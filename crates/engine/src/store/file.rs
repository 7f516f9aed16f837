//! JSON 파일 저장소
//!
//! 디렉토리 구조:
//!
//! ```text
//! <data_dir>/
//!   events.jsonl          # 분류 이벤트, 한 줄에 하나 (append-only)
//!   sessions/<uuid>.json  # 세션 스냅샷, 파일 하나에 하나
//! ```
//!
//! 세션 파일은 임시 파일에 쓴 뒤 rename하므로 읽는 쪽이 반쯤 쓰인 파일을 보지 않습니다.
//! 손상된 줄이나 파일은 경고 로그를 남기고 건너뜁니다.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use packetward_core::error::StorageError;
use packetward_core::pipeline::{BoxFuture, EventStore, HealthStatus};
use packetward_core::types::{
    ClassifiedEvent, EventFilter, NewSession, SessionSnapshot, SessionSummary,
};

const EVENTS_FILE: &str = "events.jsonl";
const SESSIONS_DIR: &str = "sessions";

#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
    events_path: PathBuf,
    sessions_dir: PathBuf,
    // events.jsonl 쓰기 직렬화
    append_lock: Mutex<()>,
}

impl JsonFileStore {
    /// 데이터 디렉토리를 열고 필요한 하위 디렉토리를 생성합니다.
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = data_dir.as_ref().to_path_buf();
        let sessions_dir = root.join(SESSIONS_DIR);
        tokio::fs::create_dir_all(&sessions_dir).await.map_err(|e| {
            StorageError::Unavailable(format!("cannot create {}: {e}", sessions_dir.display()))
        })?;
        debug!(path = %root.display(), "file store opened");
        Ok(Self {
            events_path: root.join(EVENTS_FILE),
            sessions_dir,
            root,
            append_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_path(&self, id: Uuid) -> PathBuf {
        self.sessions_dir.join(format!("{id}.json"))
    }

    async fn read_session(&self, path: &Path) -> Result<Option<SessionSnapshot>, StorageError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Query(format!("{}: {e}", path.display()))),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::Corrupted {
                location: path.display().to_string(),
                reason: e.to_string(),
            })
    }
}

impl EventStore for JsonFileStore {
    fn name(&self) -> &str {
        "file"
    }

    fn append_event(&self, event: ClassifiedEvent) -> BoxFuture<'_, Result<(), StorageError>> {
        Box::pin(async move {
            let mut line =
                serde_json::to_vec(&event).map_err(|e| StorageError::Write(e.to_string()))?;
            line.push(b'\n');

            let _guard = self.append_lock.lock().await;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.events_path)
                .await
                .map_err(|e| StorageError::Write(format!("{}: {e}", self.events_path.display())))?;
            file.write_all(&line)
                .await
                .map_err(|e| StorageError::Write(e.to_string()))?;
            file.flush()
                .await
                .map_err(|e| StorageError::Write(e.to_string()))
        })
    }

    fn query_events(
        &self,
        filter: EventFilter,
    ) -> BoxFuture<'_, Result<Vec<ClassifiedEvent>, StorageError>> {
        Box::pin(async move {
            let content = match tokio::fs::read_to_string(&self.events_path).await {
                Ok(content) => content,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
                Err(e) => return Err(StorageError::Query(e.to_string())),
            };

            let mut matched = Vec::new();
            for (index, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ClassifiedEvent>(line) {
                    Ok(event) if filter.matches(&event) => matched.push(event),
                    Ok(_) => {}
                    Err(e) => warn!(line = index + 1, error = %e, "skipping corrupted event line"),
                }
            }
            Ok(matched)
        })
    }

    fn save_session(&self, session: NewSession) -> BoxFuture<'_, Result<Uuid, StorageError>> {
        Box::pin(async move {
            let id = Uuid::new_v4();
            let snapshot = SessionSnapshot::from_new(id, session);
            let body = serde_json::to_vec_pretty(&snapshot)
                .map_err(|e| StorageError::Write(e.to_string()))?;

            let path = self.session_path(id);
            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, &body)
                .await
                .map_err(|e| StorageError::Write(format!("{}: {e}", tmp.display())))?;
            tokio::fs::rename(&tmp, &path)
                .await
                .map_err(|e| StorageError::Write(format!("{}: {e}", path.display())))?;
            Ok(id)
        })
    }

    fn list_sessions(&self) -> BoxFuture<'_, Result<Vec<SessionSummary>, StorageError>> {
        Box::pin(async move {
            let mut entries = tokio::fs::read_dir(&self.sessions_dir)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;

            let mut sessions = Vec::new();
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?
            {
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                    continue;
                }
                match self.read_session(&path).await {
                    Ok(Some(snapshot)) => sessions.push(SessionSummary::from(&snapshot)),
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "skipping unreadable session file"),
                }
            }
            Ok(sessions)
        })
    }

    fn get_session(&self, id: Uuid) -> BoxFuture<'_, Result<Option<SessionSnapshot>, StorageError>> {
        Box::pin(async move { self.read_session(&self.session_path(id)).await })
    }

    fn delete_session(&self, id: Uuid) -> BoxFuture<'_, Result<bool, StorageError>> {
        Box::pin(async move {
            match tokio::fs::remove_file(self.session_path(id)).await {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(e) => Err(StorageError::Write(e.to_string())),
            }
        })
    }

    fn health_check(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(async move {
            match tokio::fs::metadata(&self.sessions_dir).await {
                Ok(meta) if meta.is_dir() => HealthStatus::Healthy,
                Ok(_) => HealthStatus::Unhealthy(format!(
                    "{} is not a directory",
                    self.sessions_dir.display()
                )),
                Err(e) => HealthStatus::Unhealthy(format!(
                    "{}: {e}",
                    self.sessions_dir.display()
                )),
            }
        })
    }
}
