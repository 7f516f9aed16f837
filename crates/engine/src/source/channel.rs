//! 채널 기반 레코드 소스
//!
//! 임베딩 코드나 테스트가 `crossbeam-channel`로 레코드를 밀어 넣습니다.
//! 모든 송신자가 drop되면 소스는 [`SourcePoll::Exhausted`]를 반환합니다.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use packetward_core::error::SourceError;
use packetward_core::pipeline::{RecordSource, SourcePoll};
use packetward_core::types::TrafficRecord;

/// 기본 읽기 타임아웃
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(200);

pub struct ChannelSource {
    rx: Receiver<TrafficRecord>,
    timeout: Duration,
}

impl ChannelSource {
    pub fn new(rx: Receiver<TrafficRecord>, timeout: Duration) -> Self {
        Self { rx, timeout }
    }

    /// 용량이 제한된 채널과 그 수신 측 소스를 함께 생성합니다.
    pub fn bounded(capacity: usize) -> (Sender<TrafficRecord>, Self) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (tx, Self::new(rx, DEFAULT_POLL_TIMEOUT))
    }
}

impl RecordSource for ChannelSource {
    fn name(&self) -> &str {
        "channel"
    }

    fn poll_next(&mut self) -> Result<SourcePoll, SourceError> {
        match self.rx.recv_timeout(self.timeout) {
            Ok(record) => Ok(SourcePoll::Record(record)),
            Err(RecvTimeoutError::Timeout) => Ok(SourcePoll::Idle),
            Err(RecvTimeoutError::Disconnected) => Ok(SourcePoll::Exhausted),
        }
    }
}
