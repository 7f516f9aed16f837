//! 레코드 게이트 -- 분류 전 구조 검사
//!
//! 분류기는 전체 함수(total function)이므로 실패 경로가 없습니다.
//! 포트가 없는 TCP/UDP 레코드나 플래그가 없는 TCP 레코드는
//! 여기서 걸러지며 카운터에 반영되지 않습니다.

use std::fmt;

use packetward_core::types::{TrafficRecord, TransportProtocol};

/// 분류할 수 없는 레코드의 결함 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordDefect {
    /// TCP/UDP인데 출발지 또는 목적지 포트가 없음
    MissingPorts,
    /// TCP인데 제어 플래그가 없음
    MissingFlags,
}

impl RecordDefect {
    /// 메트릭 레이블 값
    pub fn as_label(self) -> &'static str {
        match self {
            Self::MissingPorts => "missing_ports",
            Self::MissingFlags => "missing_flags",
        }
    }
}

impl fmt::Display for RecordDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// 레코드가 분류 가능한 형태인지 검사합니다.
pub fn inspect(record: &TrafficRecord) -> Result<(), RecordDefect> {
    match record.transport {
        TransportProtocol::Tcp | TransportProtocol::Udp
            if record.src_port.is_none() || record.dst_port.is_none() =>
        {
            Err(RecordDefect::MissingPorts)
        }
        TransportProtocol::Tcp if record.tcp_flags.is_none() => Err(RecordDefect::MissingFlags),
        _ => Ok(()),
    }
}
