//! 엔진 에러 타입
//!
//! [`EngineError`]는 엔진 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<EngineError> for PacketwardError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use packetward_core::error::{
    ConfigError, PacketwardError, PipelineError, SessionError, SourceError, StorageError,
};

/// 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 관찰자 제어 명령 해석 실패
    #[error("invalid command: {0}")]
    Command(String),

    /// 세션 요청 검증 실패 / 존재하지 않는 세션
    #[error(transparent)]
    Session(#[from] SessionError),

    /// 영속 저장소 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 레코드 소스 에러
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// 요청자에게 그대로 알려도 되는 에러인지 확인합니다 (4xx 대상).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Session(_) | Self::Command(_))
    }
}

impl From<EngineError> for PacketwardError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Config { field, reason } => {
                PacketwardError::Config(ConfigError::InvalidValue { field, reason })
            }
            EngineError::Command(msg) => {
                PacketwardError::Pipeline(PipelineError::InvalidCommand(msg))
            }
            EngineError::Session(e) => PacketwardError::Session(e),
            EngineError::Storage(e) => PacketwardError::Storage(e),
            EngineError::Source(e) => PacketwardError::Source(e),
            EngineError::Channel(msg) => PacketwardError::Pipeline(PipelineError::ChannelSend(msg)),
            EngineError::Io(e) => PacketwardError::Io(e),
        }
    }
}
