//! 에러 타입 -- 도메인별 에러 정의

/// Packetward 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum PacketwardError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 세션 스냅샷 요청 에러
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// 레코드 소스 에러
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PacketwardError {
    /// 클라이언트 요청 자체의 문제(검증 실패, 존재하지 않는 ID)인지 확인합니다.
    ///
    /// 그 외 에러는 내부 장애로 취급되어 상세 내용이 외부로 노출되지 않습니다.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Session(_) | Self::Pipeline(PipelineError::InvalidCommand(_))
        )
    }
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 이미 실행 중
    #[error("already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("not running")]
    NotRunning,

    /// 관찰자가 보낸 제어 명령을 해석할 수 없음
    #[error("invalid control command: {0}")]
    InvalidCommand(String),
}

/// 세션 스냅샷 요청 에러
///
/// 쿼리 표면에서 4xx 응답(400, 404)으로 변환됩니다.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// 필수 필드 누락 또는 빈 값
    #[error("invalid session field '{field}': {reason}")]
    Validation { field: String, reason: String },

    /// 알 수 없는 세션 ID
    #[error("session not found: {id}")]
    NotFound { id: String },
}

/// 레코드 소스 에러
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// 소스 열기 실패 (장치 없음, 권한 부족, 파일 없음 등)
    #[error("failed to open source: {0}")]
    Open(String),

    /// 읽기 도중 복구 불가능한 실패
    #[error("source read failed: {0}")]
    Read(String),
}

/// 스토리지 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 저장소 사용 불가
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// 쓰기 실패
    #[error("write failed: {0}")]
    Write(String),

    /// 조회 실패
    #[error("query failed: {0}")]
    Query(String),

    /// 저장된 데이터 손상
    #[error("corrupted record in {location}: {reason}")]
    Corrupted { location: String, reason: String },
}
