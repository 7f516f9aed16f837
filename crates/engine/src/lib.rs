//! Packetward 트래픽 분류/집계 엔진
//!
//! # 모듈 구성
//!
//! - [`capture`]: 캡처 상태 머신 (Idle / Capturing)
//! - [`classifier`]: 규칙 기반 레코드 분류기
//! - [`gate`]: 분류 전 레코드 구조 검사
//! - [`stats`]: 누적 통계 집계
//! - [`ring`]: 최근 이벤트 링 버퍼
//! - [`hub`]: 관찰자 브로드캐스트 허브와 제어 명령
//! - [`session`]: 세션 스냅샷 검증/저장
//! - [`store`]: 영속 저장소 구현과 기록 큐
//! - [`source`]: 레코드 소스 구현 (채널, 재생 파일, libpcap)
//! - [`monitor`]: 전체 조립과 처리 경로
//! - [`config`]: 엔진 설정 (core 설정 변환)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! RecordSource -> CaptureController -> gate -> Classifier -> Aggregator
//!                                                   |            |
//!                                               EventRing   BroadcastHub -> observers
//!                                                   |
//!                                             append queue -> EventStore
//! ```

pub mod capture;
pub mod classifier;
pub mod config;
pub mod error;
pub mod gate;
pub mod hub;
pub mod monitor;
pub mod ring;
pub mod session;
pub mod source;
pub mod stats;
pub mod store;

// --- 주요 타입 re-export ---

// 모니터
pub use monitor::{ProcessOutcome, TrafficMonitor, TrafficMonitorBuilder, run_heartbeat};

// 설정
pub use config::{DropPolicy, EngineConfig, ScanStatusMode};

// 에러
pub use error::EngineError;

// 분류/집계
pub use classifier::Classifier;
pub use stats::{Aggregator, StatsSnapshot};
pub use ring::EventRing;

// 허브
pub use hub::{BroadcastHub, CaptureStatus, ControlCommand, HubMessage, Subscription};

// 세션/저장소
pub use session::{SessionDraft, SessionManager};
pub use store::{JsonFileStore, MemoryStore, open_store, run_append_writer};

// 소스
pub use source::{ChannelSource, ReplaySource, open_source};
