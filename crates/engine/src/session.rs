//! 세션 스냅샷 관리자
//!
//! 요청 형태를 검증하고 저장은 [`EventStore`]에 위임합니다.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use packetward_core::error::SessionError;
use packetward_core::pipeline::EventStore;
use packetward_core::types::{ClassifiedEvent, NewSession, SessionSnapshot, SessionSummary};

use crate::error::EngineError;

/// 검증 전 세션 저장 요청
///
/// 필드가 빠진 요청도 역직렬화되며, 누락 여부는 [`SessionManager::save`]에서 판단합니다.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionDraft {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub events: Option<Vec<ClassifiedEvent>>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl SessionDraft {
    pub fn new(title: impl Into<String>, events: Vec<ClassifiedEvent>, timestamp: DateTime<Utc>) -> Self {
        Self {
            title: Some(title.into()),
            events: Some(events),
            timestamp: Some(timestamp),
        }
    }

    fn validate(self) -> Result<NewSession, SessionError> {
        let title = self
            .title
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| invalid("title", "must not be empty"))?;
        let events = self
            .events
            .filter(|e| !e.is_empty())
            .ok_or_else(|| invalid("events", "must contain at least one event"))?;
        let timestamp = self
            .timestamp
            .ok_or_else(|| invalid("timestamp", "is required"))?;
        Ok(NewSession {
            title,
            timestamp,
            events,
        })
    }
}

fn invalid(field: &str, reason: &str) -> SessionError {
    SessionError::Validation {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}

/// 세션 스냅샷 관리자
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn EventStore>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// 세션을 검증하고 저장합니다. 검증에 실패하면 아무것도 저장하지 않습니다.
    pub async fn save(&self, draft: SessionDraft) -> Result<Uuid, EngineError> {
        let session = draft.validate()?;
        let title = session.title.clone();
        let count = session.events.len();
        let id = self.store.save_session(session).await?;
        info!(session_id = %id, title = %title, events = count, "session saved");
        Ok(id)
    }

    /// 저장된 세션 목록을 최신순으로 반환합니다.
    pub async fn list(&self) -> Result<Vec<SessionSummary>, EngineError> {
        let mut sessions = self.store.list_sessions().await?;
        sessions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(sessions)
    }

    pub async fn get(&self, id: Uuid) -> Result<SessionSnapshot, EngineError> {
        self.store
            .get_session(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// 세션을 영구 삭제합니다.
    pub async fn delete(&self, id: Uuid) -> Result<(), EngineError> {
        if self.store.delete_session(id).await? {
            info!(session_id = %id, "session deleted");
            Ok(())
        } else {
            Err(not_found(id))
        }
    }
}

fn not_found(id: Uuid) -> EngineError {
    SessionError::NotFound { id: id.to_string() }.into()
}
