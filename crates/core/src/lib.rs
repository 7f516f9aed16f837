//! Packetward 공통 크레이트
//!
//! 트래픽 레코드와 분류 이벤트 데이터 모델, 에러 분류, 설정,
//! 그리고 외부 협력자(레코드 소스, 영속 저장소) trait을 정의합니다.
//! 엔진과 데몬은 모두 이 크레이트의 타입으로 데이터를 주고받습니다.

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{
    ConfigError, PacketwardError, PipelineError, SessionError, SourceError, StorageError,
};

// 설정
pub use config::PacketwardConfig;

// 협력자 trait
pub use pipeline::{BoxFuture, EventStore, HealthStatus, RecordSource, SourcePoll};

// 도메인 타입
pub use types::{
    CaptureState, ClassifiedEvent, EventFilter, EventKind, NewSession, SessionSnapshot,
    SessionSummary, Severity, TcpFlags, TrafficRecord, TransportProtocol,
};
