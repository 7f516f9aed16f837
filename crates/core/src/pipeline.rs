//! 파이프라인 trait -- 외부 협력자(레코드 소스, 영속 저장소) 확장 포인트 정의
//!
//! 엔진은 레코드를 어디서 가져오는지, 이벤트를 어디에 저장하는지 알지 못합니다.
//! 새로운 캡처 방식이나 저장소를 추가하려면 이 모듈의 trait을 구현합니다.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use uuid::Uuid;

use crate::error::{SourceError, StorageError};
use crate::types::{
    ClassifiedEvent, EventFilter, NewSession, SessionSnapshot, SessionSummary, TrafficRecord,
};

/// `Send` 가능한 박싱된 Future
///
/// `async fn`을 가진 trait을 `dyn`으로 사용할 수 있도록 반환 타입으로 사용합니다.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ─── 헬스 상태 ──────────────────────────────────────────────────────

/// 컴포넌트 헬스 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 성능 저하 또는 일부 기능 제한
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

// ─── 레코드 소스 ────────────────────────────────────────────────────

/// 레코드 소스 폴링 결과
#[derive(Debug)]
pub enum SourcePoll {
    /// 디코딩된 레코드 하나
    Record(TrafficRecord),
    /// 읽기 타임아웃 내에 도착한 레코드 없음
    Idle,
    /// 더 이상 레코드가 없음 (파일 끝, 채널 닫힘)
    Exhausted,
}

/// 디코딩된 트래픽 레코드를 생산하는 소스
///
/// `poll_next`는 블로킹 호출이며 전용 블로킹 스레드에서 반복 호출됩니다.
/// 구현체는 데이터가 없을 때 무기한 블록하지 말고 읽기 타임아웃 후 [`SourcePoll::Idle`]을
/// 반환해야 종료 신호가 관찰될 수 있습니다.
pub trait RecordSource: Send {
    /// 소스 이름 (로그/헬스 체크용)
    fn name(&self) -> &str;

    /// 다음 레코드를 가져옵니다.
    ///
    /// 에러는 치명적이며 해당 캡처 실행을 종료시킵니다.
    fn poll_next(&mut self) -> Result<SourcePoll, SourceError>;
}

// ─── 영속 저장소 ────────────────────────────────────────────────────

/// 분류된 이벤트와 세션 스냅샷을 보관하는 영속 저장소
///
/// `Arc<dyn EventStore>`로 공유되므로 모든 메서드는 `&self`와 [`BoxFuture`]를 사용합니다.
pub trait EventStore: Send + Sync {
    /// 저장소 이름 (로그/헬스 체크용)
    fn name(&self) -> &str;

    /// 분류된 이벤트 하나를 추가합니다.
    fn append_event(&self, event: ClassifiedEvent) -> BoxFuture<'_, Result<(), StorageError>>;

    /// 필터 조건에 맞는 저장된 이벤트를 저장 순서대로 반환합니다.
    fn query_events(
        &self,
        filter: EventFilter,
    ) -> BoxFuture<'_, Result<Vec<ClassifiedEvent>, StorageError>>;

    /// 세션 스냅샷을 저장하고 부여된 ID를 반환합니다.
    fn save_session(&self, session: NewSession) -> BoxFuture<'_, Result<Uuid, StorageError>>;

    /// 저장된 세션 목록을 반환합니다. 순서는 보장하지 않습니다.
    fn list_sessions(&self) -> BoxFuture<'_, Result<Vec<SessionSummary>, StorageError>>;

    /// 세션 스냅샷을 조회합니다. 없으면 `None`.
    fn get_session(&self, id: Uuid) -> BoxFuture<'_, Result<Option<SessionSnapshot>, StorageError>>;

    /// 세션 스냅샷을 삭제합니다. 없었으면 `false`.
    fn delete_session(&self, id: Uuid) -> BoxFuture<'_, Result<bool, StorageError>>;

    /// 저장소 헬스 상태
    fn health_check(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(async { HealthStatus::Healthy })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_display() {
        assert_eq!(HealthStatus::Healthy.to_string(), "healthy");
        assert_eq!(
            HealthStatus::Degraded("queue 95% full".to_owned()).to_string(),
            "degraded: queue 95% full"
        );
        assert!(HealthStatus::Unhealthy("x".to_owned()).is_unhealthy());
        assert!(!HealthStatus::Degraded("x".to_owned()).is_healthy());
    }

    #[test]
    fn health_status_serializes_with_reason() {
        let json = serde_json::to_value(HealthStatus::Degraded("slow".to_owned())).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["reason"], "slow");

        let json = serde_json::to_value(HealthStatus::Healthy).unwrap();
        assert_eq!(json["status"], "healthy");
    }
}
