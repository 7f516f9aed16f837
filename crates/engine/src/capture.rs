//! 캡처 컨트롤러 -- Idle/Capturing 상태 머신
//!
//! 상태는 `RwLock` 하나로 보호됩니다. 생산자는 레코드 하나를 처리하는 동안
//! [`CaptureController::admit`]이 돌려준 읽기 가드를 쥐고 있고, 상태 전이는 쓰기 락을 잡습니다.
//! 따라서 레코드는 "Capturing 상태에서 끝까지 처리"되거나 "Idle 상태에서 전부 거부"될 뿐,
//! 전이 도중에 반쯤 처리되는 일이 없습니다.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use tracing::info;

use packetward_core::metrics as m;
use packetward_core::types::CaptureState;

use crate::hub::{BroadcastHub, CaptureStatus, HubMessage};
use crate::ring::EventRing;
use crate::stats::{Aggregator, StatsSnapshot};

/// 캡처 상태 머신
#[derive(Debug)]
pub struct CaptureController {
    state: RwLock<CaptureState>,
    aggregator: Arc<Aggregator>,
    ring: Arc<EventRing>,
    hub: Arc<BroadcastHub>,
    reset_on_stop: bool,
}

/// 레코드 처리 허가
///
/// 살아 있는 동안 상태 전이가 대기합니다.
#[derive(Debug)]
pub struct Admission<'a> {
    _guard: RwLockReadGuard<'a, CaptureState>,
}

impl CaptureController {
    pub fn new(
        aggregator: Arc<Aggregator>,
        ring: Arc<EventRing>,
        hub: Arc<BroadcastHub>,
        reset_on_stop: bool,
    ) -> Self {
        Self {
            state: RwLock::new(CaptureState::Idle),
            aggregator,
            ring,
            hub,
            reset_on_stop,
        }
    }

    /// 현재 상태
    pub fn state(&self) -> CaptureState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_capturing(&self) -> bool {
        self.state() == CaptureState::Capturing
    }

    /// Capturing 상태일 때만 처리 허가를 반환합니다.
    pub fn admit(&self) -> Option<Admission<'_>> {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        (*guard == CaptureState::Capturing).then_some(Admission { _guard: guard })
    }

    /// 통계와 링을 비우고 Capturing으로 전이합니다. 어느 상태에서나 유효합니다.
    ///
    /// 0으로 초기화된 스냅샷을 담은 `capture_status{started}`를 발행합니다.
    pub fn start(&self) -> StatsSnapshot {
        let stats = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            self.aggregator.reset();
            self.ring.clear();
            *state = CaptureState::Capturing;
            let stats = self.aggregator.snapshot();
            // 쓰기 가드 안에서 발행해야 새 구간의 new_log보다 먼저 도착합니다.
            self.announce(CaptureStatus::Started, &stats);
            stats
        };
        metrics::gauge!(m::ENGINE_CAPTURE_ACTIVE).set(1.0);
        info!("capture started");
        stats
    }

    /// Idle로 전이합니다. 어느 상태에서나 유효합니다.
    ///
    /// `reset_on_stop`이 켜져 있으면 통계와 링을 비운 뒤 스냅샷을 보고하고,
    /// 꺼져 있으면 누적된 통계를 그대로 보고합니다.
    pub fn stop(&self) -> StatsSnapshot {
        let stats = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            *state = CaptureState::Idle;
            if self.reset_on_stop {
                self.aggregator.reset();
                self.ring.clear();
            }
            let stats = self.aggregator.snapshot();
            self.announce(CaptureStatus::Stopped, &stats);
            stats
        };
        metrics::gauge!(m::ENGINE_CAPTURE_ACTIVE).set(0.0);
        info!(
            packets_analyzed = stats.packets_analyzed,
            threats_detected = stats.threats_detected,
            reset = self.reset_on_stop,
            "capture stopped"
        );
        stats
    }

    /// 상태는 유지한 채 통계와 링을 비웁니다.
    pub fn clear(&self) -> StatsSnapshot {
        let _state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        self.aggregator.reset();
        self.ring.clear();
        info!("statistics and recent events cleared");
        self.aggregator.snapshot()
    }

    /// 종료 시 Idle로 강제 전이합니다. 알림은 발행하지 않습니다.
    pub fn shutdown(&self) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = CaptureState::Idle;
        metrics::gauge!(m::ENGINE_CAPTURE_ACTIVE).set(0.0);
    }

    fn announce(&self, status: CaptureStatus, stats: &StatsSnapshot) {
        self.hub.publish(HubMessage::CaptureStatus {
            status,
            stats: stats.clone(),
        });
    }
}
