//! 메모리 저장소
//!
//! 프로세스 수명 동안만 유지됩니다. 기본 백엔드이며 테스트에서도 사용합니다.
//! 이벤트는 `event_limit`개까지만 보관하며, 넘치면 가장 오래된 이벤트부터 제거합니다.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use tracing::trace;
use uuid::Uuid;

use packetward_core::config::DEFAULT_MEMORY_EVENT_LIMIT;
use packetward_core::error::StorageError;
use packetward_core::pipeline::{BoxFuture, EventStore};
use packetward_core::types::{
    ClassifiedEvent, EventFilter, NewSession, SessionSnapshot, SessionSummary,
};

#[derive(Debug)]
pub struct MemoryStore {
    events: RwLock<VecDeque<ClassifiedEvent>>,
    event_limit: usize,
    sessions: RwLock<HashMap<Uuid, SessionSnapshot>>,
}

impl MemoryStore {
    /// 기본 보관 한도([`DEFAULT_MEMORY_EVENT_LIMIT`])로 생성합니다.
    pub fn new() -> Self {
        Self::with_event_limit(DEFAULT_MEMORY_EVENT_LIMIT)
    }

    /// 최대 `limit`개의 이벤트를 보관하는 저장소를 생성합니다. 0은 1로 취급합니다.
    pub fn with_event_limit(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            events: RwLock::new(VecDeque::with_capacity(limit.min(1024))),
            event_limit: limit,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// 저장된 이벤트 수
    pub fn event_count(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn event_limit(&self) -> usize {
        self.event_limit
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn append_event(&self, event: ClassifiedEvent) -> BoxFuture<'_, Result<(), StorageError>> {
        Box::pin(async move {
            let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
            if events.len() >= self.event_limit {
                events.pop_front();
                trace!(limit = self.event_limit, "memory store full, oldest event evicted");
            }
            events.push_back(event);
            Ok(())
        })
    }

    fn query_events(
        &self,
        filter: EventFilter,
    ) -> BoxFuture<'_, Result<Vec<ClassifiedEvent>, StorageError>> {
        Box::pin(async move {
            let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
            Ok(events.iter().filter(|e| filter.matches(e)).cloned().collect())
        })
    }

    fn save_session(&self, session: NewSession) -> BoxFuture<'_, Result<Uuid, StorageError>> {
        Box::pin(async move {
            let id = Uuid::new_v4();
            self.sessions
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id, SessionSnapshot::from_new(id, session));
            Ok(id)
        })
    }

    fn list_sessions(&self) -> BoxFuture<'_, Result<Vec<SessionSummary>, StorageError>> {
        Box::pin(async move {
            let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
            Ok(sessions.values().map(SessionSummary::from).collect())
        })
    }

    fn get_session(&self, id: Uuid) -> BoxFuture<'_, Result<Option<SessionSnapshot>, StorageError>> {
        Box::pin(async move {
            let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
            Ok(sessions.get(&id).cloned())
        })
    }

    fn delete_session(&self, id: Uuid) -> BoxFuture<'_, Result<bool, StorageError>> {
        Box::pin(async move {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            Ok(sessions.remove(&id).is_some())
        })
    }
}
