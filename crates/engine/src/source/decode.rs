//! 링크 계층 프레임 디코더
//!
//! Ethernet II(또는 raw IP) 프레임을 `etherparse`로 잘라 [`TrafficRecord`]를 만듭니다.
//! 네트워크 계층이 없는 프레임(ARP 등)이나 헤더가 손상된 프레임은 `None`으로 버려집니다.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use etherparse::{NetSlice, SlicedPacket, TransportSlice};

use packetward_core::types::{TcpFlags, TrafficRecord, TransportProtocol};

const DNS_PORT: u16 = 53;
const DNS_HEADER_LEN: usize = 12;
const MAX_DNS_NAME_LEN: usize = 255;

/// Ethernet II 프레임을 디코딩합니다.
///
/// `wire_len`은 캡처 길이(snaplen)와 무관한 실제 프레임 길이입니다.
pub fn decode_frame(data: &[u8], wire_len: usize, timestamp: DateTime<Utc>) -> Option<TrafficRecord> {
    let sliced = SlicedPacket::from_ethernet(data).ok()?;
    build_record(&sliced, wire_len, timestamp)
}

/// 링크 계층 헤더가 없는 raw IP 패킷을 디코딩합니다.
pub fn decode_ip_packet(data: &[u8], wire_len: usize, timestamp: DateTime<Utc>) -> Option<TrafficRecord> {
    let sliced = SlicedPacket::from_ip(data).ok()?;
    build_record(&sliced, wire_len, timestamp)
}

fn build_record(
    sliced: &SlicedPacket<'_>,
    wire_len: usize,
    timestamp: DateTime<Utc>,
) -> Option<TrafficRecord> {
    let (src_ip, dst_ip, ip_number) = match &sliced.net {
        Some(NetSlice::Ipv4(ipv4)) => {
            let header = ipv4.header();
            (
                IpAddr::V4(header.source_addr()),
                IpAddr::V4(header.destination_addr()),
                header.protocol().0,
            )
        }
        Some(NetSlice::Ipv6(ipv6)) => {
            let header = ipv6.header();
            (
                IpAddr::V6(header.source_addr()),
                IpAddr::V6(header.destination_addr()),
                header.next_header().0,
            )
        }
        _ => return None,
    };

    let mut record = TrafficRecord {
        timestamp,
        src_ip,
        dst_ip,
        src_port: None,
        dst_port: None,
        transport: TransportProtocol::from_ip_number(ip_number),
        length: wire_len,
        tcp_flags: None,
        dns_query: None,
    };

    match &sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => {
            record.transport = TransportProtocol::Tcp;
            record.src_port = Some(tcp.source_port());
            record.dst_port = Some(tcp.destination_port());
            record.tcp_flags = Some(tcp_flags(tcp));
            if is_dns(&record) {
                // DNS over TCP: 2바이트 길이 접두어
                record.dns_query = tcp.payload().get(2..).and_then(dns_query_name);
            }
        }
        Some(TransportSlice::Udp(udp)) => {
            record.transport = TransportProtocol::Udp;
            record.src_port = Some(udp.source_port());
            record.dst_port = Some(udp.destination_port());
            if is_dns(&record) {
                record.dns_query = dns_query_name(udp.payload());
            }
        }
        Some(TransportSlice::Icmpv4(_)) | Some(TransportSlice::Icmpv6(_)) => {
            record.transport = TransportProtocol::Icmp;
        }
        _ => {}
    }

    Some(record)
}

fn tcp_flags(tcp: &etherparse::TcpSlice<'_>) -> TcpFlags {
    let bits = [
        (tcp.fin(), TcpFlags::FIN),
        (tcp.syn(), TcpFlags::SYN),
        (tcp.rst(), TcpFlags::RST),
        (tcp.psh(), TcpFlags::PSH),
        (tcp.ack(), TcpFlags::ACK),
        (tcp.urg(), TcpFlags::URG),
        (tcp.ece(), TcpFlags::ECE),
        (tcp.cwr(), TcpFlags::CWR),
    ]
    .into_iter()
    .filter(|(set, _)| *set)
    .fold(0u8, |acc, (_, bit)| acc | bit);
    TcpFlags::from_bits(bits)
}

fn is_dns(record: &TrafficRecord) -> bool {
    record.src_port == Some(DNS_PORT) || record.dst_port == Some(DNS_PORT)
}

/// DNS 메시지의 첫 번째 질의 이름을 추출합니다 (예: `"example.com."`).
///
/// 질의 섹션이 없거나 이름이 압축 포인터/잘린 라벨을 포함하면 `None`.
pub fn dns_query_name(message: &[u8]) -> Option<String> {
    if message.len() < DNS_HEADER_LEN {
        return None;
    }
    let qdcount = u16::from_be_bytes([message[4], message[5]]);
    if qdcount == 0 {
        return None;
    }

    let mut name = String::new();
    let mut pos = DNS_HEADER_LEN;
    loop {
        let len = usize::from(*message.get(pos)?);
        pos += 1;
        if len == 0 {
            break;
        }
        // 질의 섹션의 첫 이름에는 압축 포인터가 오지 않음
        if len & 0xC0 != 0 {
            return None;
        }
        let label = message.get(pos..pos + len)?;
        if !label.iter().all(|b| b.is_ascii_graphic()) {
            return None;
        }
        name.push_str(std::str::from_utf8(label).ok()?);
        name.push('.');
        if name.len() > MAX_DNS_NAME_LEN {
            return None;
        }
        pos += len;
    }

    if name.is_empty() {
        // 루트 질의
        name.push('.');
    }
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::PacketBuilder;

    const MAC_A: [u8; 6] = [0x02, 0, 0, 0, 0, 1];
    const MAC_B: [u8; 6] = [0x02, 0, 0, 0, 0, 2];

    fn dns_query(name: &str) -> Vec<u8> {
        let mut msg = vec![0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0];
        for label in name.trim_end_matches('.').split('.') {
            msg.push(label.len() as u8);
            msg.extend_from_slice(label.as_bytes());
        }
        msg.push(0);
        msg.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
        msg
    }

    #[test]
    fn decodes_tcp_syn_over_ipv4() {
        let builder = PacketBuilder::ethernet2(MAC_A, MAC_B)
            .ipv4([192, 168, 1, 10], [192, 168, 1, 1], 64)
            .tcp(51000, 443, 1, 64240)
            .syn();
        let mut frame = Vec::new();
        builder.write(&mut frame, &[]).unwrap();

        let record = decode_frame(&frame, frame.len(), Utc::now()).unwrap();
        assert_eq!(record.transport, TransportProtocol::Tcp);
        assert_eq!(record.src_ip, "192.168.1.10".parse::<IpAddr>().unwrap());
        assert_eq!(record.dst_port, Some(443));
        assert!(record.tcp_flags.unwrap().is_syn_only());
        assert_eq!(record.length, frame.len());
    }

    #[test]
    fn decodes_udp_dns_query_name() {
        let payload = dns_query("example.com");
        let builder = PacketBuilder::ethernet2(MAC_A, MAC_B)
            .ipv4([10, 0, 0, 5], [10, 0, 0, 53], 64)
            .udp(40000, 53);
        let mut frame = Vec::new();
        builder.write(&mut frame, &payload).unwrap();

        let record = decode_frame(&frame, frame.len(), Utc::now()).unwrap();
        assert_eq!(record.transport, TransportProtocol::Udp);
        assert_eq!(record.dns_query.as_deref(), Some("example.com."));
        assert!(record.tcp_flags.is_none());
    }

    #[test]
    fn decodes_ipv6_udp() {
        let src = "fe80::1".parse::<std::net::Ipv6Addr>().unwrap().octets();
        let dst = "2001:db8::2".parse::<std::net::Ipv6Addr>().unwrap().octets();
        let builder = PacketBuilder::ethernet2(MAC_A, MAC_B)
            .ipv6(src, dst, 64)
            .udp(5353, 9999);
        let mut frame = Vec::new();
        builder.write(&mut frame, &[0u8; 32]).unwrap();

        let record = decode_frame(&frame, 1600, Utc::now()).unwrap();
        assert!(record.dst_ip.is_ipv6());
        assert_eq!(record.src_port, Some(5353));
        // 실제 프레임 길이를 그대로 사용
        assert_eq!(record.length, 1600);
        assert!(record.dns_query.is_none());
    }

    #[test]
    fn decodes_icmp_echo() {
        let builder = PacketBuilder::ethernet2(MAC_A, MAC_B)
            .ipv4([10, 0, 0, 1], [8, 8, 8, 8], 64)
            .icmpv4_echo_request(1, 1);
        let mut frame = Vec::new();
        builder.write(&mut frame, &[0u8; 8]).unwrap();

        let record = decode_frame(&frame, frame.len(), Utc::now()).unwrap();
        assert_eq!(record.transport, TransportProtocol::Icmp);
        assert!(record.src_port.is_none());
        assert!(record.dst_port.is_none());
    }

    #[test]
    fn decodes_raw_ip_packet() {
        let builder = PacketBuilder::ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64).udp(1000, 2000);
        let mut packet = Vec::new();
        builder.write(&mut packet, &[1, 2, 3]).unwrap();

        let record = decode_ip_packet(&packet, packet.len(), Utc::now()).unwrap();
        assert_eq!(record.dst_port, Some(2000));
    }

    #[test]
    fn non_ip_frames_are_dropped() {
        // ARP ethertype (0x0806)
        let mut frame = Vec::new();
        frame.extend_from_slice(&MAC_B);
        frame.extend_from_slice(&MAC_A);
        frame.extend_from_slice(&[0x08, 0x06]);
        frame.extend_from_slice(&[0u8; 28]);
        assert!(decode_frame(&frame, frame.len(), Utc::now()).is_none());
    }

    #[test]
    fn truncated_frames_are_dropped() {
        assert!(decode_frame(&[0u8; 10], 10, Utc::now()).is_none());
    }

    #[test]
    fn dns_name_parser_rejects_malformed_messages() {
        assert!(dns_query_name(&[0u8; 4]).is_none());

        // qdcount = 0
        let mut msg = dns_query("example.com");
        msg[5] = 0;
        assert!(dns_query_name(&msg).is_none());

        // 압축 포인터
        let mut msg = vec![0, 0, 1, 0, 0, 1, 0, 0, 0, 0, 0, 0];
        msg.extend_from_slice(&[0xC0, 0x0C]);
        assert!(dns_query_name(&msg).is_none());

        // 라벨 길이가 메시지보다 김
        let mut msg = vec![0, 0, 1, 0, 0, 1, 0, 0, 0, 0, 0, 0];
        msg.extend_from_slice(&[10, b'a', b'b']);
        assert!(dns_query_name(&msg).is_none());
    }

    #[test]
    fn dns_root_query() {
        let msg = vec![0, 0, 1, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 2, 0, 1];
        assert_eq!(dns_query_name(&msg).as_deref(), Some("."));
    }
}
