//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다. 레코더가 설치되지 않은 경우 매크로 호출은 아무 일도 하지 않습니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `packetward_`
//! - 모듈명: `engine_`, `hub_`, `store_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (gauge/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(packetward_core::metrics::ENGINE_PACKETS_ANALYZED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 이벤트 종류 레이블 키 (normal_traffic, network_scan, ...)
pub const LABEL_KIND: &str = "kind";

/// 폐기 사유 레이블 키 (idle, missing_ports, missing_flags)
pub const LABEL_REASON: &str = "reason";

/// 저장소 레이블 키 (memory, file)
pub const LABEL_STORE: &str = "store";

// ─── Engine 메트릭 ──────────────────────────────────────────────────

/// Engine: 분석된 레코드 수 (counter)
pub const ENGINE_PACKETS_ANALYZED_TOTAL: &str = "packetward_engine_packets_analyzed_total";

/// Engine: 위협으로 집계된 이벤트 수 (counter)
pub const ENGINE_THREATS_DETECTED_TOTAL: &str = "packetward_engine_threats_detected_total";

/// Engine: 종류별 분류 이벤트 수 (counter, label: kind)
pub const ENGINE_EVENTS_TOTAL: &str = "packetward_engine_events_total";

/// Engine: 분류 전에 폐기된 레코드 수 (counter, label: reason)
pub const ENGINE_RECORDS_DISCARDED_TOTAL: &str = "packetward_engine_records_discarded_total";

/// Engine: 최근 이벤트 링 크기 (gauge)
pub const ENGINE_RING_SIZE: &str = "packetward_engine_ring_size";

/// Engine: 활성 주소 수 (gauge)
pub const ENGINE_ACTIVE_ADDRESSES: &str = "packetward_engine_active_addresses";

/// Engine: 캡처 중 여부 (gauge, 0 또는 1)
pub const ENGINE_CAPTURE_ACTIVE: &str = "packetward_engine_capture_active";

// ─── Broadcast Hub 메트릭 ───────────────────────────────────────────

/// Hub: 현재 구독자 수 (gauge)
pub const HUB_SUBSCRIBERS: &str = "packetward_hub_subscribers";

/// Hub: outbox 초과로 버려진 메시지 수 (counter)
pub const HUB_MESSAGES_DROPPED_TOTAL: &str = "packetward_hub_messages_dropped_total";

// ─── Store 메트릭 ───────────────────────────────────────────────────

/// Store: 기록 완료된 이벤트 수 (counter, label: store)
pub const STORE_EVENTS_APPENDED_TOTAL: &str = "packetward_store_events_appended_total";

/// Store: 큐가 가득 차 버려진 이벤트 수 (counter)
pub const STORE_APPEND_DROPPED_TOTAL: &str = "packetward_store_append_dropped_total";

/// Store: 기록 실패 수 (counter, label: store)
pub const STORE_APPEND_FAILURES_TOTAL: &str = "packetward_store_append_failures_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "packetward_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, labels: version)
pub const DAEMON_BUILD_INFO: &str = "packetward_daemon_build_info";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `packetward-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    // Engine
    describe_counter!(
        ENGINE_PACKETS_ANALYZED_TOTAL,
        "Total number of traffic records classified while capturing"
    );
    describe_counter!(
        ENGINE_THREATS_DETECTED_TOTAL,
        "Total number of network_scan and large_packet events"
    );
    describe_counter!(ENGINE_EVENTS_TOTAL, "Classified events per event kind");
    describe_counter!(
        ENGINE_RECORDS_DISCARDED_TOTAL,
        "Records discarded before classification, by reason"
    );
    describe_gauge!(
        ENGINE_RING_SIZE,
        "Number of events held in the recent-event ring"
    );
    describe_gauge!(
        ENGINE_ACTIVE_ADDRESSES,
        "Distinct addresses seen since the last reset"
    );
    describe_gauge!(ENGINE_CAPTURE_ACTIVE, "1 while capturing, 0 while idle");

    // Broadcast Hub
    describe_gauge!(HUB_SUBSCRIBERS, "Number of live-push observers");
    describe_counter!(
        HUB_MESSAGES_DROPPED_TOTAL,
        "Messages dropped because an observer outbox was full"
    );

    // Store
    describe_counter!(
        STORE_EVENTS_APPENDED_TOTAL,
        "Total number of events written to the persistence store"
    );
    describe_counter!(
        STORE_APPEND_DROPPED_TOTAL,
        "Events dropped because the append queue was full"
    );
    describe_counter!(
        STORE_APPEND_FAILURES_TOTAL,
        "Failed event writes to the persistence store"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Packetward daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}
