//! libpcap 라이브 캡처 소스 (`pcap` feature)
//!
//! 읽기 타임아웃이 지나도 패킷이 없으면 [`SourcePoll::Idle`]을 반환하므로
//! 생산자 루프가 종료 신호를 관찰할 수 있습니다.

use chrono::{DateTime, Utc};
use pcap::{Active, Capture, Device};
use tracing::{debug, info};

use packetward_core::config::CaptureConfig;
use packetward_core::error::SourceError;
use packetward_core::pipeline::{RecordSource, SourcePoll};

use super::decode::{decode_frame, decode_ip_packet};

const LINKTYPE_ETHERNET: i32 = 1;
const LINKTYPE_RAW: i32 = 101;

pub struct PcapSource {
    capture: Capture<Active>,
    device: String,
    raw_ip: bool,
}

impl PcapSource {
    /// 설정된 인터페이스(비어 있으면 기본 장치)에서 캡처를 엽니다.
    pub fn open(config: &CaptureConfig) -> Result<Self, SourceError> {
        let device = if config.interface.is_empty() {
            Device::lookup()
                .map_err(open_err)?
                .ok_or_else(|| SourceError::Open("no capture device available".to_owned()))?
        } else {
            Device::list()
                .map_err(open_err)?
                .into_iter()
                .find(|d| d.name == config.interface)
                .ok_or_else(|| {
                    SourceError::Open(format!("no such interface '{}'", config.interface))
                })?
        };
        let device_name = device.name.clone();

        let mut capture = Capture::from_device(device)
            .map_err(open_err)?
            .promisc(config.promiscuous)
            .snaplen(config.snaplen)
            .timeout(i32::try_from(config.read_timeout_ms).unwrap_or(i32::MAX))
            .immediate_mode(true)
            .open()
            .map_err(open_err)?;

        if !config.bpf_filter.is_empty() {
            capture
                .filter(&config.bpf_filter, true)
                .map_err(|e| SourceError::Open(format!("invalid BPF filter: {e}")))?;
        }

        let linktype = capture.get_datalink().0;
        if linktype != LINKTYPE_ETHERNET && linktype != LINKTYPE_RAW {
            return Err(SourceError::Open(format!(
                "unsupported link type {linktype} on {device_name}"
            )));
        }

        info!(
            device = %device_name,
            filter = %config.bpf_filter,
            promiscuous = config.promiscuous,
            "pcap capture opened"
        );
        Ok(Self {
            capture,
            device: device_name,
            raw_ip: linktype == LINKTYPE_RAW,
        })
    }
}

fn open_err(e: pcap::Error) -> SourceError {
    SourceError::Open(e.to_string())
}

impl RecordSource for PcapSource {
    fn name(&self) -> &str {
        &self.device
    }

    fn poll_next(&mut self) -> Result<SourcePoll, SourceError> {
        loop {
            let packet = match self.capture.next_packet() {
                Ok(packet) => packet,
                Err(pcap::Error::TimeoutExpired) => return Ok(SourcePoll::Idle),
                Err(pcap::Error::NoMorePackets) => return Ok(SourcePoll::Exhausted),
                Err(e) => return Err(SourceError::Read(e.to_string())),
            };

            let header = packet.header;
            let timestamp = DateTime::<Utc>::from_timestamp(
                header.ts.tv_sec as i64,
                (header.ts.tv_usec as u32).saturating_mul(1000),
            )
            .unwrap_or_else(Utc::now);
            let wire_len = header.len as usize;

            let decoded = if self.raw_ip {
                decode_ip_packet(packet.data, wire_len, timestamp)
            } else {
                decode_frame(packet.data, wire_len, timestamp)
            };
            match decoded {
                Some(record) => return Ok(SourcePoll::Record(record)),
                None => debug!(len = wire_len, "dropping frame without network layer"),
            }
        }
    }
}
