//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 레코드 소스가 만들어내는 [`TrafficRecord`], 분류기가 만들어내는 [`ClassifiedEvent`],
//! 그리고 세션 스냅샷과 이력 조회에 사용되는 타입을 정의합니다.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// 트래픽 레코드
// =============================================================================

/// 전송 계층 프로토콜 태그
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    /// TCP (IP 프로토콜 번호 6)
    Tcp,
    /// UDP (IP 프로토콜 번호 17)
    Udp,
    /// ICMP / ICMPv6 (IP 프로토콜 번호 1, 58)
    Icmp,
    /// 그 밖의 IP 프로토콜 번호
    Other(u8),
}

impl TransportProtocol {
    /// IP 헤더의 프로토콜 번호(IPv6는 next header)로부터 태그를 만듭니다.
    pub fn from_ip_number(number: u8) -> Self {
        match number {
            6 => Self::Tcp,
            17 => Self::Udp,
            1 | 58 => Self::Icmp,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "TCP"),
            Self::Udp => write!(f, "UDP"),
            Self::Icmp => write!(f, "ICMP"),
            Self::Other(n) => write!(f, "IP ({n})"),
        }
    }
}

/// TCP 제어 플래그 비트 집합
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TcpFlags(u8);

impl TcpFlags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;
    pub const ECE: u8 = 0x40;
    pub const CWR: u8 = 0x80;

    const NAMES: [(u8, &'static str); 8] = [
        (Self::FIN, "FIN"),
        (Self::SYN, "SYN"),
        (Self::RST, "RST"),
        (Self::PSH, "PSH"),
        (Self::ACK, "ACK"),
        (Self::URG, "URG"),
        (Self::ECE, "ECE"),
        (Self::CWR, "CWR"),
    ];

    /// 원시 비트값으로부터 생성합니다.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// 원시 비트값을 반환합니다.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// 주어진 플래그 비트가 모두 설정되어 있는지 확인합니다.
    pub const fn contains(self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    /// SYN 하나만 설정되어 있는지 확인합니다 (half-open 스캔 프로브 패턴).
    pub const fn is_syn_only(self) -> bool {
        self.0 == Self::SYN
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (bit, name) in Self::NAMES {
            if self.contains(bit) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        if first {
            write!(f, "-")?;
        }
        Ok(())
    }
}

/// 디코딩된 트래픽 레코드
///
/// 레코드 소스가 생성하며 생성 이후 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficRecord {
    /// 캡처 시각
    pub timestamp: DateTime<Utc>,
    /// 출발지 IP
    pub src_ip: IpAddr,
    /// 목적지 IP
    pub dst_ip: IpAddr,
    /// 출발지 포트 (TCP/UDP만)
    #[serde(default)]
    pub src_port: Option<u16>,
    /// 목적지 포트 (TCP/UDP만)
    #[serde(default)]
    pub dst_port: Option<u16>,
    /// 전송 계층 프로토콜
    pub transport: TransportProtocol,
    /// 전체 길이 (바이트)
    pub length: usize,
    /// TCP 제어 플래그 (TCP만)
    #[serde(default)]
    pub tcp_flags: Option<TcpFlags>,
    /// DNS 질의 이름 (페이로드에서 추출된 경우)
    #[serde(default)]
    pub dns_query: Option<String>,
}

impl fmt::Display for TrafficRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.transport, self.src_ip)?;
        if let Some(port) = self.src_port {
            write!(f, ":{port}")?;
        }
        write!(f, " -> {}", self.dst_ip)?;
        if let Some(port) = self.dst_port {
            write!(f, ":{port}")?;
        }
        write!(f, " len={}", self.length)
    }
}

// =============================================================================
// 분류 결과
// =============================================================================

/// 분류된 이벤트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NormalTraffic,
    NetworkScan,
    LargePacket,
    ExternalConnection,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        Self::NormalTraffic,
        Self::NetworkScan,
        Self::LargePacket,
        Self::ExternalConnection,
    ];

    /// 와이어 포맷 이름을 반환합니다.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NormalTraffic => "normal_traffic",
            Self::NetworkScan => "network_scan",
            Self::LargePacket => "large_packet",
            Self::ExternalConnection => "external_connection",
        }
    }

    /// 와이어 포맷 이름으로부터 파싱합니다.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// `threats_detected` 카운터에 반영되는 종류인지 확인합니다.
    ///
    /// `external_connection`은 심각도는 medium이지만 위협으로 집계하지 않습니다.
    pub fn is_threat(self) -> bool {
        matches!(self, Self::NetworkScan | Self::LargePacket)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 심각도 레벨
///
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Low < Medium < High`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
}

impl Severity {
    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// 분류된 이벤트
///
/// 정확히 하나의 [`TrafficRecord`]로부터 결정적으로 만들어지며 생성 이후 변경되지 않습니다.
/// 직렬화 필드명은 대시보드가 사용하는 이름(`source_ip`, `event_type`, `details`)을 따릅니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    /// 원본 레코드의 캡처 시각
    pub timestamp: DateTime<Utc>,
    /// 출발지 IP
    #[serde(rename = "source_ip")]
    pub src_ip: IpAddr,
    /// 목적지 IP
    #[serde(rename = "destination_ip")]
    pub dst_ip: IpAddr,
    /// 사람이 읽을 수 있는 프로토콜 라벨 (예: "HTTPS", "DNS", "TCP (8443)")
    pub protocol: String,
    /// 이벤트 종류
    pub event_type: EventKind,
    /// 심각도
    pub severity: Severity,
    /// 상세 설명
    pub details: String,
}

impl fmt::Display for ClassifiedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} -> {} ({}): {}",
            self.severity, self.event_type, self.src_ip, self.dst_ip, self.protocol, self.details,
        )
    }
}

// =============================================================================
// 캡처 상태
// =============================================================================

/// 캡처 상태 머신의 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    /// 유입되는 레코드를 버림 (초기 상태)
    #[default]
    Idle,
    /// 유입되는 레코드를 분류
    Capturing,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Capturing => write!(f, "capturing"),
        }
    }
}

// =============================================================================
// 세션 스냅샷 / 이력 조회
// =============================================================================

/// 검증을 통과한 세션 저장 요청
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSession {
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub events: Vec<ClassifiedEvent>,
}

/// 저장된 세션 스냅샷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// 저장소가 부여한 ID
    pub id: Uuid,
    /// 제목
    pub title: String,
    /// 생성 시각
    pub timestamp: DateTime<Utc>,
    /// 저장 당시의 이벤트 시퀀스 (순서 유지)
    pub events: Vec<ClassifiedEvent>,
}

impl SessionSnapshot {
    /// 저장 요청에 ID를 부여하여 스냅샷을 만듭니다.
    pub fn from_new(id: Uuid, session: NewSession) -> Self {
        Self {
            id,
            title: session.title,
            timestamp: session.timestamp,
            events: session.events,
        }
    }
}

/// 세션 목록 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub event_count: usize,
}

impl From<&SessionSnapshot> for SessionSummary {
    fn from(snapshot: &SessionSnapshot) -> Self {
        Self {
            id: snapshot.id,
            title: snapshot.title.clone(),
            timestamp: snapshot.timestamp,
            event_count: snapshot.events.len(),
        }
    }
}

/// 저장된 이벤트 이력 조회 필터
///
/// 모든 조건은 선택적이며, 시간 범위는 양 끝을 포함합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub event_type: Option<EventKind>,
}

impl EventFilter {
    /// 이벤트가 필터 조건을 모두 만족하는지 확인합니다.
    pub fn matches(&self, event: &ClassifiedEvent) -> bool {
        if self.start.is_some_and(|start| event.timestamp < start) {
            return false;
        }
        if self.end.is_some_and(|end| event.timestamp > end) {
            return false;
        }
        self.event_type
            .is_none_or(|kind| kind == event.event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_event(kind: EventKind, secs: i64) -> ClassifiedEvent {
        ClassifiedEvent {
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            src_ip: "192.168.1.10".parse().unwrap(),
            dst_ip: "10.0.0.1".parse().unwrap(),
            protocol: "HTTPS".to_owned(),
            event_type: kind,
            severity: Severity::Low,
            details: "Normal network traffic".to_owned(),
        }
    }

    #[test]
    fn transport_from_ip_number() {
        assert_eq!(TransportProtocol::from_ip_number(6), TransportProtocol::Tcp);
        assert_eq!(TransportProtocol::from_ip_number(17), TransportProtocol::Udp);
        assert_eq!(TransportProtocol::from_ip_number(1), TransportProtocol::Icmp);
        assert_eq!(TransportProtocol::from_ip_number(58), TransportProtocol::Icmp);
        assert_eq!(
            TransportProtocol::from_ip_number(47),
            TransportProtocol::Other(47)
        );
    }

    #[test]
    fn tcp_flags_syn_only() {
        assert!(TcpFlags::from_bits(TcpFlags::SYN).is_syn_only());
        assert!(!TcpFlags::from_bits(TcpFlags::SYN | TcpFlags::ACK).is_syn_only());
        // ECE/CWR가 함께 설정된 SYN도 단독 SYN이 아님
        assert!(!TcpFlags::from_bits(TcpFlags::SYN | TcpFlags::ECE).is_syn_only());
        assert!(!TcpFlags::from_bits(0).is_syn_only());
    }

    #[test]
    fn tcp_flags_display() {
        assert_eq!(
            TcpFlags::from_bits(TcpFlags::SYN | TcpFlags::ACK).to_string(),
            "SYN|ACK"
        );
        assert_eq!(TcpFlags::from_bits(0).to_string(), "-");
    }

    #[test]
    fn event_kind_wire_names() {
        for kind in EventKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            assert_eq!(EventKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_name("port_scan"), None);
    }

    #[test]
    fn only_scan_and_large_packet_are_threats() {
        assert!(EventKind::NetworkScan.is_threat());
        assert!(EventKind::LargePacket.is_threat());
        assert!(!EventKind::ExternalConnection.is_threat());
        assert!(!EventKind::NormalTraffic.is_threat());
    }

    #[test]
    fn severity_ordering_and_display() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert_eq!(Severity::High.to_string(), "high");
        assert_eq!(Severity::from_str_loose("MED"), Some(Severity::Medium));
        assert_eq!(Severity::from_str_loose("critical"), None);
    }

    #[test]
    fn classified_event_uses_dashboard_field_names() {
        let event = sample_event(EventKind::NetworkScan, 0);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["source_ip"], "192.168.1.10");
        assert_eq!(value["destination_ip"], "10.0.0.1");
        assert_eq!(value["event_type"], "network_scan");
        assert_eq!(value["severity"], "low");
        assert!(value.get("details").is_some());
    }

    #[test]
    fn traffic_record_optional_fields_default_to_none() {
        let json = r#"{
            "timestamp": "2024-01-01T00:00:00Z",
            "src_ip": "10.0.0.1",
            "dst_ip": "10.0.0.2",
            "transport": "icmp",
            "length": 84
        }"#;
        let record: TrafficRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.transport, TransportProtocol::Icmp);
        assert!(record.src_port.is_none());
        assert!(record.tcp_flags.is_none());
        assert!(record.dns_query.is_none());
    }

    #[test]
    fn event_filter_time_range_is_inclusive() {
        let filter = EventFilter {
            start: Some(Utc.timestamp_opt(1_700_000_010, 0).unwrap()),
            end: Some(Utc.timestamp_opt(1_700_000_020, 0).unwrap()),
            event_type: None,
        };
        assert!(!filter.matches(&sample_event(EventKind::NormalTraffic, 9)));
        assert!(filter.matches(&sample_event(EventKind::NormalTraffic, 10)));
        assert!(filter.matches(&sample_event(EventKind::NormalTraffic, 20)));
        assert!(!filter.matches(&sample_event(EventKind::NormalTraffic, 21)));
    }

    #[test]
    fn event_filter_by_kind() {
        let filter = EventFilter {
            event_type: Some(EventKind::LargePacket),
            ..Default::default()
        };
        assert!(filter.matches(&sample_event(EventKind::LargePacket, 0)));
        assert!(!filter.matches(&sample_event(EventKind::NetworkScan, 0)));
        assert!(EventFilter::default().matches(&sample_event(EventKind::NetworkScan, 0)));
    }

    #[test]
    fn session_summary_counts_events() {
        let snapshot = SessionSnapshot {
            id: Uuid::new_v4(),
            title: "demo".to_owned(),
            timestamp: Utc::now(),
            events: vec![
                sample_event(EventKind::NormalTraffic, 0),
                sample_event(EventKind::NetworkScan, 1),
            ],
        };
        let summary = SessionSummary::from(&snapshot);
        assert_eq!(summary.event_count, 2);
        assert_eq!(summary.title, "demo");
        assert_eq!(summary.id, snapshot.id);
    }
}
