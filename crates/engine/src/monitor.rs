//! 트래픽 모니터 -- 엔진 구성 요소 조립과 레코드 처리 경로
//!
//! # 처리 경로
//! ```text
//! RecordSource -> admit(Capturing?) -> gate -> Classifier
//!     -> Aggregator.observe -> EventRing.push -> Hub.publish(new_log) -> append queue(try_send)
//! ```
//!
//! 레코드 하나는 [`CaptureController::admit`] 허가를 쥔 채 끝까지 처리되므로
//! 캡처 상태 전이와 뒤섞이지 않습니다. 저장소 기록은 유한 큐에 `try_send`로만 넣고 기다리지 않습니다.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use packetward_core::error::SourceError;
use packetward_core::metrics as m;
use packetward_core::pipeline::{HealthStatus, RecordSource, SourcePoll};
use packetward_core::types::{CaptureState, ClassifiedEvent, TrafficRecord};

use crate::capture::CaptureController;
use crate::classifier::Classifier;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::gate::{self, RecordDefect};
use crate::hub::{BroadcastHub, ControlCommand, HubMessage};
use crate::ring::EventRing;
use crate::stats::{Aggregator, StatsSnapshot};

/// 기록 큐 사용률이 이 값을 넘으면 Degraded
const APPEND_QUEUE_DEGRADED_RATIO: f64 = 0.9;

/// 레코드 하나의 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// 분류되어 모든 하위 구성 요소에 반영됨
    Classified(ClassifiedEvent),
    /// Idle 상태라서 버려짐
    Idle,
    /// 구조 결함으로 게이트에서 거부됨
    Rejected(RecordDefect),
}

/// 트래픽 분류/집계 엔진
///
/// # 사용 예시
/// ```ignore
/// let (monitor, append_rx) = TrafficMonitorBuilder::new()
///     .config(EngineConfig::from_core(&config))
///     .build()?;
/// let monitor = Arc::new(monitor);
/// monitor.start_capture();
/// let producer = monitor.spawn_capture(source, cancel.clone());
/// ```
pub struct TrafficMonitor {
    config: EngineConfig,
    classifier: Classifier,
    aggregator: Arc<Aggregator>,
    ring: Arc<EventRing>,
    hub: Arc<BroadcastHub>,
    capture: CaptureController,
    append_tx: mpsc::Sender<ClassifiedEvent>,
    source_failure: Mutex<Option<String>>,
}

impl TrafficMonitor {
    /// 레코드 하나를 처리합니다.
    ///
    /// 생산자 루프에서 순차적으로 호출됩니다. 실패 경로가 없습니다.
    pub fn process_record(&self, record: &TrafficRecord) -> ProcessOutcome {
        let Some(_admission) = self.capture.admit() else {
            metrics::counter!(m::ENGINE_RECORDS_DISCARDED_TOTAL, m::LABEL_REASON => "idle")
                .increment(1);
            return ProcessOutcome::Idle;
        };

        if let Err(defect) = gate::inspect(record) {
            debug!(record = %record, defect = %defect, "record rejected by gate");
            metrics::counter!(m::ENGINE_RECORDS_DISCARDED_TOTAL, m::LABEL_REASON => defect.as_label())
                .increment(1);
            return ProcessOutcome::Rejected(defect);
        }

        let event = self.classifier.classify(record);
        trace!(
            src_ip = %event.src_ip,
            dst_ip = %event.dst_ip,
            protocol = %event.protocol,
            kind = %event.event_type,
            "record classified"
        );

        self.aggregator.observe(&event);
        self.ring.push(event.clone());
        let stats = self.aggregator.snapshot();
        self.hub.publish(HubMessage::NewLog {
            log: event.clone(),
            stats,
        });
        self.enqueue_append(&event);

        metrics::counter!(m::ENGINE_PACKETS_ANALYZED_TOTAL).increment(1);
        metrics::counter!(m::ENGINE_EVENTS_TOTAL, m::LABEL_KIND => event.event_type.as_str())
            .increment(1);
        if event.event_type.is_threat() {
            metrics::counter!(m::ENGINE_THREATS_DETECTED_TOTAL).increment(1);
            debug!(src_ip = %event.src_ip, kind = %event.event_type, details = %event.details, "threat detected");
        }

        ProcessOutcome::Classified(event)
    }

    fn enqueue_append(&self, event: &ClassifiedEvent) {
        if let Err(e) = self.append_tx.try_send(event.clone()) {
            metrics::counter!(m::STORE_APPEND_DROPPED_TOTAL).increment(1);
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    debug!("append queue full, event not persisted");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    trace!("append queue closed, event not persisted");
                }
            }
        }
    }

    // --- 캡처 제어 ---

    /// 통계와 링을 비우고 캡처를 시작합니다.
    pub fn start_capture(&self) -> StatsSnapshot {
        self.capture.start()
    }

    /// 캡처를 중지합니다.
    pub fn stop_capture(&self) -> StatsSnapshot {
        self.capture.stop()
    }

    /// 캡처 상태를 유지한 채 통계와 링을 비웁니다.
    pub fn clear(&self) -> StatsSnapshot {
        self.capture.clear()
    }

    /// 관찰자 제어 명령을 실행합니다.
    pub fn handle_command(&self, command: ControlCommand) -> StatsSnapshot {
        info!(command = ?command, "control command received");
        match command {
            ControlCommand::StartCapture => self.start_capture(),
            ControlCommand::StopCapture => self.stop_capture(),
        }
    }

    /// 종료 시 Idle로 강제 전이합니다.
    pub fn shutdown(&self) {
        self.capture.shutdown();
    }

    // --- 조회 ---

    pub fn capture_state(&self) -> CaptureState {
        self.capture.state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.aggregator.snapshot()
    }

    /// 최근 이벤트 (오래된 순)
    pub fn recent_events(&self) -> Vec<ClassifiedEvent> {
        self.ring.all()
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 캡처 중이면 heartbeat 메시지를 발행합니다. 발행했으면 `true`.
    ///
    /// 발행하는 동안 처리 허가를 쥐고 있으므로 `capture_status{stopped}` 뒤에 도착하지 않습니다.
    pub fn publish_heartbeat(&self) -> bool {
        let Some(_admission) = self.capture.admit() else {
            return false;
        };
        self.hub.publish(HubMessage::Heartbeat {
            timestamp: Utc::now(),
            stats: self.aggregator.snapshot(),
        });
        true
    }

    /// 엔진 헬스 상태
    pub fn health(&self) -> HealthStatus {
        if let Some(reason) = self
            .source_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return HealthStatus::Unhealthy(format!("capture source failed: {reason}"));
        }

        let utilization = self.append_queue_utilization();
        if utilization > APPEND_QUEUE_DEGRADED_RATIO {
            return HealthStatus::Degraded(format!(
                "append queue utilization high: {:.1}%",
                utilization * 100.0
            ));
        }
        HealthStatus::Healthy
    }

    /// 기록 큐 사용률 (0.0 ~ 1.0)
    pub fn append_queue_utilization(&self) -> f64 {
        let max = self.append_tx.max_capacity();
        if max == 0 {
            return 0.0;
        }
        let used = max.saturating_sub(self.append_tx.capacity());
        used as f64 / max as f64
    }

    // --- 생산자 루프 ---

    /// 전용 블로킹 스레드에서 소스를 폴링하며 레코드를 처리합니다.
    ///
    /// 취소되거나 소스가 소진되면 `Ok(분류된 레코드 수)`로 끝나고,
    /// 소스 에러는 치명적이어서 해당 실행을 끝내고 헬스 상태에 반영됩니다.
    /// 소스는 루프가 끝날 때 drop되어 해제됩니다.
    pub fn spawn_capture(
        self: &Arc<Self>,
        source: Box<dyn RecordSource>,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<u64, SourceError>> {
        let monitor = Arc::clone(self);
        tokio::task::spawn_blocking(move || monitor.run_source(source, &cancel))
    }

    fn run_source(
        &self,
        mut source: Box<dyn RecordSource>,
        cancel: &CancellationToken,
    ) -> Result<u64, SourceError> {
        let name = source.name().to_owned();
        info!(source = %name, "record source loop started");
        *self
            .source_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;

        let mut classified = 0u64;
        while !cancel.is_cancelled() {
            match source.poll_next() {
                Ok(SourcePoll::Record(record)) => {
                    if matches!(self.process_record(&record), ProcessOutcome::Classified(_)) {
                        classified += 1;
                    }
                }
                Ok(SourcePoll::Idle) => {}
                Ok(SourcePoll::Exhausted) => {
                    info!(source = %name, classified, "record source exhausted");
                    return Ok(classified);
                }
                Err(e) => {
                    error!(source = %name, error = %e, "record source failed");
                    *self
                        .source_failure
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(e.to_string());
                    return Err(e);
                }
            }
        }

        info!(source = %name, classified, "record source loop cancelled");
        Ok(classified)
    }
}

/// 캡처 중일 때 주기적으로 heartbeat를 발행합니다.
///
/// Idle 상태에서는 아무것도 보내지 않습니다.
pub async fn run_heartbeat(
    monitor: Arc<TrafficMonitor>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // 첫 tick은 즉시 완료되므로 건너뜀
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if monitor.publish_heartbeat() {
                    trace!("heartbeat published");
                }
            }
            _ = cancel.cancelled() => {
                debug!("heartbeat task shutting down");
                break;
            }
        }
    }
}

/// 트래픽 모니터 빌더
///
/// 구성 요소를 조립하고 저장소 기록 큐를 생성합니다.
pub struct TrafficMonitorBuilder {
    config: EngineConfig,
    append_tx: Option<mpsc::Sender<ClassifiedEvent>>,
}

impl TrafficMonitorBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            append_tx: None,
        }
    }

    /// 엔진 설정을 지정합니다.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// 외부 기록 큐 송신 측을 설정합니다.
    ///
    /// 설정하지 않으면 빌더가 `append_queue_capacity` 용량의 새 큐를 생성합니다.
    pub fn append_sender(mut self, tx: mpsc::Sender<ClassifiedEvent>) -> Self {
        self.append_tx = Some(tx);
        self
    }

    /// 모니터를 빌드합니다.
    ///
    /// # Returns
    /// - `TrafficMonitor`: 엔진 인스턴스 (초기 상태 Idle)
    /// - `Option<mpsc::Receiver<ClassifiedEvent>>`: 기록 큐 수신 측
    ///   (외부 append_sender를 설정한 경우 None)
    pub fn build(
        self,
    ) -> Result<(TrafficMonitor, Option<mpsc::Receiver<ClassifiedEvent>>), EngineError> {
        self.config.validate()?;

        let (append_tx, append_rx) = match self.append_tx {
            Some(tx) => (tx, None),
            None => {
                let (tx, rx) = mpsc::channel(self.config.append_queue_capacity);
                (tx, Some(rx))
            }
        };

        let aggregator = Arc::new(Aggregator::new(
            self.config.scan_status,
            self.config.active_address_limit,
        ));
        let ring = Arc::new(EventRing::new(self.config.ring_capacity));
        let hub = Arc::new(BroadcastHub::new(
            self.config.outbox_capacity,
            self.config.drop_policy,
        ));
        let capture = CaptureController::new(
            Arc::clone(&aggregator),
            Arc::clone(&ring),
            Arc::clone(&hub),
            self.config.reset_stats_on_stop,
        );

        if self.config.active_address_limit > 0 {
            warn!(
                limit = self.config.active_address_limit,
                "active address set is bounded; active_ips is approximate above the limit"
            );
        }

        let monitor = TrafficMonitor {
            classifier: Classifier::new(self.config.large_packet_threshold),
            config: self.config,
            aggregator,
            ring,
            hub,
            capture,
            append_tx,
            source_failure: Mutex::new(None),
        };
        Ok((monitor, append_rx))
    }
}

impl Default for TrafficMonitorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
