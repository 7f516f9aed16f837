//! 레코드 소스 구현
//!
//! 모든 소스는 [`RecordSource`]를 구현하며 생산자 루프의 블로킹 스레드에서 폴링됩니다.
//!
//! - [`ChannelSource`]: `crossbeam-channel`로 주입 (테스트, 임베딩)
//! - [`ReplaySource`]: JSON lines 파일 재생
//! - `PcapSource`: libpcap 라이브 캡처 (`pcap` feature)

mod channel;
pub mod decode;
#[cfg(feature = "pcap")]
mod live;
mod replay;

use packetward_core::config::CaptureConfig;
use packetward_core::error::SourceError;
use packetward_core::pipeline::RecordSource;

pub use channel::{ChannelSource, DEFAULT_POLL_TIMEOUT};
pub use decode::{decode_frame, decode_ip_packet};
#[cfg(feature = "pcap")]
pub use live::PcapSource;
pub use replay::ReplaySource;

/// 설정된 소스를 엽니다. `source = "none"`이면 `None`.
pub fn open_source(config: &CaptureConfig) -> Result<Option<Box<dyn RecordSource>>, SourceError> {
    match config.source.as_str() {
        "none" => Ok(None),
        "replay" => Ok(Some(Box::new(ReplaySource::open(&config.replay_path)?))),
        "pcap" => open_pcap(config).map(Some),
        other => Err(SourceError::Open(format!("unknown capture source '{other}'"))),
    }
}

#[cfg(feature = "pcap")]
fn open_pcap(config: &CaptureConfig) -> Result<Box<dyn RecordSource>, SourceError> {
    Ok(Box::new(PcapSource::open(config)?))
}

#[cfg(not(feature = "pcap"))]
fn open_pcap(_config: &CaptureConfig) -> Result<Box<dyn RecordSource>, SourceError> {
    Err(SourceError::Open(
        "live capture requires the 'pcap' feature".to_owned(),
    ))
}
