//! 엔진 설정
//!
//! [`EngineConfig`]는 core의 문자열 기반 설정을 엔진이 사용하는 타입으로 변환한 것입니다.

use serde::{Deserialize, Serialize};

use packetward_core::config::{MAX_RING_CAPACITY, PacketwardConfig};

use crate::error::EngineError;

/// outbox가 가득 찼을 때의 드롭 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropPolicy {
    /// 가장 오래된 메시지를 드롭 (기본값)
    #[default]
    Oldest,
    /// 새로 들어온 메시지를 드롭 (새 유입 거부)
    Newest,
}

impl DropPolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "oldest" => Some(Self::Oldest),
            "newest" => Some(Self::Newest),
            _ => None,
        }
    }
}

/// scan_status 산출 방식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatusMode {
    /// threats_detected > 0 이면 "Threats Detected" (기본값)
    #[default]
    Derived,
    /// 항상 "Normal"
    Static,
}

impl ScanStatusMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "derived" => Some(Self::Derived),
            "static" => Some(Self::Static),
            _ => None,
        }
    }
}

/// 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 최근 이벤트 링 용량
    pub ring_capacity: usize,
    /// large_packet 판정 기준 길이 (초과 시 해당)
    pub large_packet_threshold: usize,
    /// 활성 주소 집합 상한 (0이면 무제한)
    pub active_address_limit: usize,
    /// 캡처 중지 시 통계/링 초기화 여부
    pub reset_stats_on_stop: bool,
    /// scan_status 산출 방식
    pub scan_status: ScanStatusMode,
    /// 관찰자별 outbox 용량
    pub outbox_capacity: usize,
    /// outbox 드롭 정책
    pub drop_policy: DropPolicy,
    /// 영속 저장소 기록 큐 용량
    pub append_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 1000,
            large_packet_threshold: 1400,
            active_address_limit: 0,
            reset_stats_on_stop: false,
            scan_status: ScanStatusMode::Derived,
            outbox_capacity: 256,
            drop_policy: DropPolicy::Oldest,
            append_queue_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// core의 `PacketwardConfig`에서 엔진 설정을 생성합니다.
    ///
    /// 알 수 없는 열거형 문자열은 기본값으로 대체됩니다.
    /// core 설정의 `validate()`가 먼저 호출되었다면 발생하지 않습니다.
    pub fn from_core(core: &PacketwardConfig) -> Self {
        let capture = &core.capture;
        Self {
            ring_capacity: capture.ring_capacity,
            large_packet_threshold: capture.large_packet_threshold,
            active_address_limit: capture.active_address_limit,
            reset_stats_on_stop: capture.reset_stats_on_stop,
            scan_status: ScanStatusMode::from_name(&capture.scan_status).unwrap_or_default(),
            outbox_capacity: core.broadcast.outbox_capacity,
            drop_policy: DropPolicy::from_name(&core.broadcast.drop_policy).unwrap_or_default(),
            append_queue_capacity: core.storage.append_queue_capacity,
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.ring_capacity == 0 || self.ring_capacity > MAX_RING_CAPACITY {
            return Err(EngineError::Config {
                field: "ring_capacity".to_owned(),
                reason: format!("must be 1-{MAX_RING_CAPACITY}"),
            });
        }

        if self.large_packet_threshold == 0 {
            return Err(EngineError::Config {
                field: "large_packet_threshold".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.outbox_capacity == 0 {
            return Err(EngineError::Config {
                field: "outbox_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.append_queue_capacity == 0 {
            return Err(EngineError::Config {
                field: "append_queue_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        Ok(())
    }
}
