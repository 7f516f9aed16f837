//! 통계 집계기 -- 분류 이벤트 스트림에서 파생되는 카운터와 주소 집합
//!
//! 모든 필드는 하나의 `RwLock` 아래에 있으므로 [`Aggregator::snapshot`]은
//! 카운터와 집합 사이에 찢어진 읽기(torn read)가 발생하지 않습니다.
//! 쓰기 경로는 생산자 스레드(observe)와 캡처 상태 전이(reset)뿐입니다.

use std::collections::{HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use packetward_core::metrics as m;
use packetward_core::types::ClassifiedEvent;

use crate::config::ScanStatusMode;

const SCAN_STATUS_NORMAL: &str = "Normal";
const SCAN_STATUS_THREATS: &str = "Threats Detected";

/// 통계 스냅샷
///
/// 직렬화 필드명은 대시보드가 사용하는 이름을 따릅니다 (`active_ips`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// 분석된 레코드 수
    pub packets_analyzed: u64,
    /// 위협으로 집계된 이벤트 수
    pub threats_detected: u64,
    /// 마지막 초기화 이후 관측된 고유 주소 수
    #[serde(rename = "active_ips")]
    pub active_addresses: usize,
    /// "Normal" 또는 "Threats Detected"
    pub scan_status: String,
    /// 마지막 초기화 이후 경과 시간 (초)
    pub uptime_seconds: u64,
    /// 마지막 초기화 시각
    pub started_at: DateTime<Utc>,
    /// 마지막으로 분석된 이벤트의 시각
    pub last_scan_time: Option<DateTime<Utc>>,
}

/// 활성 주소 집합
///
/// `limit == 0`이면 정확한 무제한 집합, 그 외에는 먼저 들어온 주소부터 제거되는 유한 집합.
#[derive(Debug, Default)]
struct ActiveAddressSet {
    members: HashSet<IpAddr>,
    order: VecDeque<IpAddr>,
    limit: usize,
}

impl ActiveAddressSet {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    fn insert(&mut self, addr: IpAddr) {
        if !self.members.insert(addr) || self.limit == 0 {
            return;
        }
        self.order.push_back(addr);
        while self.order.len() > self.limit {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
    }

    fn len(&self) -> usize {
        self.members.len()
    }

    fn clear(&mut self) {
        self.members.clear();
        self.order.clear();
    }
}

#[derive(Debug)]
struct StatsState {
    packets_analyzed: u64,
    threats_detected: u64,
    active: ActiveAddressSet,
    start: Instant,
    started_at: DateTime<Utc>,
    last_scan_time: Option<DateTime<Utc>>,
}

impl StatsState {
    fn new(active_address_limit: usize) -> Self {
        Self {
            packets_analyzed: 0,
            threats_detected: 0,
            active: ActiveAddressSet::new(active_address_limit),
            start: Instant::now(),
            started_at: Utc::now(),
            last_scan_time: None,
        }
    }
}

/// 동시 접근 안전 통계 집계기
#[derive(Debug)]
pub struct Aggregator {
    state: RwLock<StatsState>,
    scan_status: ScanStatusMode,
}

impl Aggregator {
    /// 새 집계기를 생성합니다.
    pub fn new(scan_status: ScanStatusMode, active_address_limit: usize) -> Self {
        Self {
            state: RwLock::new(StatsState::new(active_address_limit)),
            scan_status,
        }
    }

    /// 분류된 이벤트 하나를 반영합니다.
    pub fn observe(&self, event: &ClassifiedEvent) {
        let mut state = self.write();
        state.packets_analyzed += 1;
        if event.event_type.is_threat() {
            state.threats_detected += 1;
        }
        state.active.insert(event.src_ip);
        state.active.insert(event.dst_ip);
        state.last_scan_time = Some(event.timestamp);

        metrics::gauge!(m::ENGINE_ACTIVE_ADDRESSES).set(state.active.len() as f64);
    }

    /// 현재 통계의 일관된 스냅샷을 반환합니다.
    pub fn snapshot(&self) -> StatsSnapshot {
        let state = self.read();
        let scan_status = match self.scan_status {
            ScanStatusMode::Derived if state.threats_detected > 0 => SCAN_STATUS_THREATS,
            _ => SCAN_STATUS_NORMAL,
        };
        StatsSnapshot {
            packets_analyzed: state.packets_analyzed,
            threats_detected: state.threats_detected,
            active_addresses: state.active.len(),
            scan_status: scan_status.to_owned(),
            uptime_seconds: state.start.elapsed().as_secs(),
            started_at: state.started_at,
            last_scan_time: state.last_scan_time,
        }
    }

    /// 모든 카운터와 주소 집합을 비우고 가동 시간 기준점을 현재로 재설정합니다.
    pub fn reset(&self) {
        let mut state = self.write();
        state.packets_analyzed = 0;
        state.threats_detected = 0;
        state.active.clear();
        state.start = Instant::now();
        state.started_at = Utc::now();
        state.last_scan_time = None;

        metrics::gauge!(m::ENGINE_ACTIVE_ADDRESSES).set(0.0);
    }

    // 패닉한 리더가 생산자를 멈추지 못하도록 poison은 무시합니다.
    fn read(&self) -> RwLockReadGuard<'_, StatsState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StatsState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(ScanStatusMode::default(), 0)
    }
}
