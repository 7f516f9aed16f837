//! 분류기 -- 레코드 하나를 분류된 이벤트 하나로 변환
//!
//! 분류는 순수 함수입니다. 같은 레코드는 이전 호출 이력과 무관하게 항상 같은 이벤트를 만듭니다.
//! 게이트([`crate::gate`])를 통과한 레코드만 입력으로 받으므로 실패 경로가 없습니다.
//!
//! # 규칙 우선순위 (먼저 매칭된 규칙이 결정)
//! 1. `network_scan` -- TCP, 제어 플래그가 SYN 하나뿐 (high)
//! 2. `large_packet` -- UDP, 전체 길이가 임계값 초과 (medium)
//! 3. `external_connection` -- 목적지가 사설 대역이 아님 (medium)
//! 4. `normal_traffic` (low)

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use packetward_core::types::{
    ClassifiedEvent, EventKind, Severity, TrafficRecord, TransportProtocol,
};

/// large_packet 기본 임계값 (바이트)
pub const DEFAULT_LARGE_PACKET_THRESHOLD: usize = 1400;

/// 포트 -> 프로토콜 라벨 테이블
const WELL_KNOWN_PORTS: [(u16, &str); 15] = [
    (80, "HTTP"),
    (443, "HTTPS"),
    (25, "SMTP"),
    (110, "POP3"),
    (143, "IMAP"),
    (22, "SSH"),
    (21, "FTP"),
    (3389, "RDP"),
    (3306, "MySQL"),
    (5432, "PostgreSQL"),
    (1433, "MSSQL"),
    (8080, "HTTP-ALT"),
    (53, "DNS"),
    (67, "DHCP"),
    (68, "DHCP"),
];

const DNS_LABEL: &str = "DNS";

/// 트래픽 레코드 분류기
#[derive(Debug, Clone)]
pub struct Classifier {
    large_packet_threshold: usize,
}

impl Classifier {
    /// large_packet 임계값을 지정하여 분류기를 생성합니다.
    pub fn new(large_packet_threshold: usize) -> Self {
        Self {
            large_packet_threshold,
        }
    }

    /// 레코드를 분류합니다.
    pub fn classify(&self, record: &TrafficRecord) -> ClassifiedEvent {
        let protocol = protocol_label(record);

        let (event_type, severity, mut details) = if is_syn_scan(record) {
            (
                EventKind::NetworkScan,
                Severity::High,
                format!(
                    "Port scanning detected - SYN packet to port {}",
                    port_or_unknown(record.dst_port)
                ),
            )
        } else if record.transport == TransportProtocol::Udp
            && record.length > self.large_packet_threshold
        {
            (
                EventKind::LargePacket,
                Severity::Medium,
                format!("Unusual packet size: {} bytes", record.length),
            )
        } else if !is_private_addr(record.dst_ip) {
            (
                EventKind::ExternalConnection,
                Severity::Medium,
                format!("External connection to {}", record.dst_ip),
            )
        } else {
            (
                EventKind::NormalTraffic,
                Severity::Low,
                "Normal network traffic".to_owned(),
            )
        };

        if protocol == DNS_LABEL {
            let query = record
                .dns_query
                .as_deref()
                .map(|name| name.trim_end_matches('.'))
                .filter(|name| !name.is_empty())
                .unwrap_or("N/A");
            details.push_str(&format!(" (DNS query: {query})"));
        }

        ClassifiedEvent {
            timestamp: record.timestamp,
            src_ip: record.src_ip,
            dst_ip: record.dst_ip,
            protocol,
            event_type,
            severity,
            details,
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_LARGE_PACKET_THRESHOLD)
    }
}

fn is_syn_scan(record: &TrafficRecord) -> bool {
    record.transport == TransportProtocol::Tcp
        && record.tcp_flags.is_some_and(|flags| flags.is_syn_only())
}

fn port_or_unknown(port: Option<u16>) -> String {
    port.map_or_else(|| "unknown".to_owned(), |p| p.to_string())
}

/// 사람이 읽을 수 있는 프로토콜 라벨을 만듭니다.
///
/// 목적지 포트를 먼저, 출발지 포트를 다음으로 테이블에서 찾습니다
/// (서버 응답 방향의 패킷도 같은 서비스로 라벨링하기 위해).
pub fn protocol_label(record: &TrafficRecord) -> String {
    match record.transport {
        TransportProtocol::Icmp => "ICMP".to_owned(),
        TransportProtocol::Other(number) => format!("IP ({number})"),
        TransportProtocol::Tcp | TransportProtocol::Udp => {
            let known = [record.dst_port, record.src_port]
                .into_iter()
                .flatten()
                .find_map(well_known_label);
            match known {
                Some(label) => label.to_owned(),
                None => format!(
                    "{} ({})",
                    record.transport,
                    port_or_unknown(record.dst_port)
                ),
            }
        }
    }
}

fn well_known_label(port: u16) -> Option<&'static str> {
    WELL_KNOWN_PORTS
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, label)| *label)
}

/// 주소가 사설/비라우팅 대역인지 확인합니다.
///
/// IPv4: 10/8, 172.16/12, 192.168/16, 127/8, 169.254/16, 0/8, 255.255.255.255.
/// IPv6: ::1, ::, fc00::/7, fe80::/10, 그리고 IPv4-mapped 주소는 IPv4 규칙을 따릅니다.
pub fn is_private_addr(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_private_v4(v4),
            None => is_private_v6(v6),
        },
    }
}

fn is_private_v4(addr: Ipv4Addr) -> bool {
    addr.is_private()
        || addr.is_loopback()
        || addr.is_link_local()
        || addr.is_broadcast()
        || addr.octets()[0] == 0
}

fn is_private_v6(addr: Ipv6Addr) -> bool {
    let first = addr.segments()[0];
    addr.is_loopback()
        || addr.is_unspecified()
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80
}
