//! 설정 관리 -- packetward.toml 파싱 및 런타임 설정
//!
//! [`PacketwardConfig`]는 모든 컴포넌트의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`PACKETWARD_CAPTURE_INTERFACE=eth0` 형식)
//! 3. 설정 파일 (`packetward.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), packetward_core::error::PacketwardError> {
//! use packetward_core::config::PacketwardConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = PacketwardConfig::load("packetward.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = PacketwardConfig::parse("[capture]\nsource = \"replay\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, PacketwardError};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 3] = ["json", "pretty", "compact"];
const CAPTURE_SOURCES: [&str; 3] = ["pcap", "replay", "none"];
const SCAN_STATUS_MODES: [&str; 2] = ["derived", "static"];
const DROP_POLICIES: [&str; 2] = ["oldest", "newest"];
const STORAGE_BACKENDS: [&str; 2] = ["memory", "file"];

/// Packetward 통합 설정
///
/// `packetward.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 컴포넌트는 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PacketwardConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl PacketwardConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PacketwardError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, PacketwardError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PacketwardError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                PacketwardError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, PacketwardError> {
        toml::from_str(toml_str).map_err(|e| {
            PacketwardError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `PACKETWARD_{SECTION}_{FIELD}`
    /// 예: `PACKETWARD_STORAGE_BACKEND=file`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "PACKETWARD_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "PACKETWARD_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "PACKETWARD_GENERAL_PID_FILE");

        // Capture
        let capture = &mut self.capture;
        override_string(&mut capture.source, "PACKETWARD_CAPTURE_SOURCE");
        override_string(&mut capture.interface, "PACKETWARD_CAPTURE_INTERFACE");
        override_string(&mut capture.bpf_filter, "PACKETWARD_CAPTURE_BPF_FILTER");
        override_parsed(&mut capture.snaplen, "PACKETWARD_CAPTURE_SNAPLEN");
        override_parsed(&mut capture.promiscuous, "PACKETWARD_CAPTURE_PROMISCUOUS");
        override_parsed(
            &mut capture.read_timeout_ms,
            "PACKETWARD_CAPTURE_READ_TIMEOUT_MS",
        );
        override_string(&mut capture.replay_path, "PACKETWARD_CAPTURE_REPLAY_PATH");
        override_parsed(&mut capture.autostart, "PACKETWARD_CAPTURE_AUTOSTART");
        override_parsed(
            &mut capture.reset_stats_on_stop,
            "PACKETWARD_CAPTURE_RESET_STATS_ON_STOP",
        );
        override_string(&mut capture.scan_status, "PACKETWARD_CAPTURE_SCAN_STATUS");
        override_parsed(
            &mut capture.large_packet_threshold,
            "PACKETWARD_CAPTURE_LARGE_PACKET_THRESHOLD",
        );
        override_parsed(&mut capture.ring_capacity, "PACKETWARD_CAPTURE_RING_CAPACITY");
        override_parsed(
            &mut capture.active_address_limit,
            "PACKETWARD_CAPTURE_ACTIVE_ADDRESS_LIMIT",
        );

        // Broadcast
        override_parsed(
            &mut self.broadcast.outbox_capacity,
            "PACKETWARD_BROADCAST_OUTBOX_CAPACITY",
        );
        override_string(
            &mut self.broadcast.drop_policy,
            "PACKETWARD_BROADCAST_DROP_POLICY",
        );
        override_parsed(
            &mut self.broadcast.heartbeat_interval_secs,
            "PACKETWARD_BROADCAST_HEARTBEAT_INTERVAL_SECS",
        );

        // Storage
        override_string(&mut self.storage.backend, "PACKETWARD_STORAGE_BACKEND");
        override_string(&mut self.storage.data_dir, "PACKETWARD_STORAGE_DATA_DIR");
        override_parsed(
            &mut self.storage.append_queue_capacity,
            "PACKETWARD_STORAGE_APPEND_QUEUE_CAPACITY",
        );
        override_parsed(
            &mut self.storage.memory_event_limit,
            "PACKETWARD_STORAGE_MEMORY_EVENT_LIMIT",
        );

        // API
        override_parsed(&mut self.api.enabled, "PACKETWARD_API_ENABLED");
        override_string(&mut self.api.listen_addr, "PACKETWARD_API_LISTEN_ADDR");
        override_parsed(&mut self.api.port, "PACKETWARD_API_PORT");

        // Metrics
        override_parsed(&mut self.metrics.enabled, "PACKETWARD_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "PACKETWARD_METRICS_LISTEN_ADDR",
        );
        override_parsed(&mut self.metrics.port, "PACKETWARD_METRICS_PORT");
        override_string(&mut self.metrics.endpoint, "PACKETWARD_METRICS_ENDPOINT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), PacketwardError> {
        one_of("general.log_level", &self.general.log_level, &LOG_LEVELS)?;
        one_of("general.log_format", &self.general.log_format, &LOG_FORMATS)?;

        let capture = &self.capture;
        one_of("capture.source", &capture.source, &CAPTURE_SOURCES)?;
        one_of("capture.scan_status", &capture.scan_status, &SCAN_STATUS_MODES)?;
        if capture.source == "replay" && capture.replay_path.is_empty() {
            return Err(invalid(
                "capture.replay_path",
                "must not be empty when capture.source is \"replay\"",
            ));
        }
        if capture.source == "pcap" && capture.snaplen == 0 {
            return Err(invalid("capture.snaplen", "must be greater than 0"));
        }
        if capture.read_timeout_ms == 0 {
            return Err(invalid("capture.read_timeout_ms", "must be greater than 0"));
        }
        if capture.large_packet_threshold == 0 {
            return Err(invalid(
                "capture.large_packet_threshold",
                "must be greater than 0",
            ));
        }
        if capture.ring_capacity == 0 || capture.ring_capacity > MAX_RING_CAPACITY {
            return Err(invalid(
                "capture.ring_capacity",
                &format!("must be between 1 and {MAX_RING_CAPACITY}"),
            ));
        }

        one_of(
            "broadcast.drop_policy",
            &self.broadcast.drop_policy,
            &DROP_POLICIES,
        )?;
        if self.broadcast.outbox_capacity == 0 {
            return Err(invalid("broadcast.outbox_capacity", "must be greater than 0"));
        }

        one_of("storage.backend", &self.storage.backend, &STORAGE_BACKENDS)?;
        if self.storage.backend == "file" && self.storage.data_dir.is_empty() {
            return Err(invalid(
                "storage.data_dir",
                "must not be empty when storage.backend is \"file\"",
            ));
        }
        if self.storage.append_queue_capacity == 0 {
            return Err(invalid(
                "storage.append_queue_capacity",
                "must be greater than 0",
            ));
        }
        if self.storage.memory_event_limit == 0 {
            return Err(invalid(
                "storage.memory_event_limit",
                "must be greater than 0",
            ));
        }

        if self.api.enabled && self.api.listen_addr.is_empty() {
            return Err(invalid("api.listen_addr", "must not be empty"));
        }

        if self.metrics.enabled {
            if self.metrics.listen_addr.is_empty() {
                return Err(invalid("metrics.listen_addr", "must not be empty"));
            }
            if !self.metrics.endpoint.starts_with('/') {
                return Err(invalid("metrics.endpoint", "must start with '/'"));
            }
        }

        Ok(())
    }
}

/// 최근 이벤트 링의 최대 허용 용량
pub const MAX_RING_CAPACITY: usize = 100_000;

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty, compact)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 생성하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// 캡처 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// 레코드 소스 (pcap, replay, none)
    pub source: String,
    /// 캡처 인터페이스 (빈 문자열이면 기본 장치)
    pub interface: String,
    /// BPF 필터 표현식
    pub bpf_filter: String,
    /// 캡처 길이 (바이트)
    pub snaplen: i32,
    /// 무차별 모드
    pub promiscuous: bool,
    /// 소스 읽기 타임아웃 (밀리초)
    pub read_timeout_ms: u64,
    /// replay 소스의 JSON lines 파일 경로
    pub replay_path: String,
    /// 데몬 시작 시 즉시 캡처 시작
    pub autostart: bool,
    /// 캡처 중지 시 통계와 링을 초기화할지 여부 (기본: 보존)
    pub reset_stats_on_stop: bool,
    /// scan_status 산출 방식 (derived, static)
    pub scan_status: String,
    /// large_packet 판정 기준 길이 (바이트, 초과 시 해당)
    pub large_packet_threshold: usize,
    /// 최근 이벤트 링 용량
    pub ring_capacity: usize,
    /// 활성 주소 집합 상한 (0이면 무제한)
    pub active_address_limit: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: "none".to_owned(),
            interface: String::new(),
            bpf_filter: "ip or ip6".to_owned(),
            snaplen: 65_535,
            promiscuous: false,
            read_timeout_ms: 500,
            replay_path: String::new(),
            autostart: false,
            reset_stats_on_stop: false,
            scan_status: "derived".to_owned(),
            large_packet_threshold: 1400,
            ring_capacity: 1000,
            active_address_limit: 0,
        }
    }
}

/// 브로드캐스트 허브 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// 관찰자별 outbox 용량 (메시지 수)
    pub outbox_capacity: usize,
    /// outbox가 가득 찼을 때 버릴 메시지 (oldest, newest)
    pub drop_policy: String,
    /// 캡처 중 heartbeat 발행 주기 (초, 0이면 비활성화)
    pub heartbeat_interval_secs: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: 256,
            drop_policy: "oldest".to_owned(),
            heartbeat_interval_secs: 5,
        }
    }
}

/// memory 백엔드 이벤트 보관 한도 기본값
pub const DEFAULT_MEMORY_EVENT_LIMIT: usize = 100_000;

/// 영속 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 저장소 백엔드 (memory, file)
    pub backend: String,
    /// file 백엔드 데이터 디렉토리
    pub data_dir: String,
    /// 이벤트 기록 큐 용량
    pub append_queue_capacity: usize,
    /// memory 백엔드가 보관하는 최대 이벤트 수 (초과 시 오래된 것부터 제거)
    pub memory_event_limit: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_owned(),
            data_dir: "/var/lib/packetward".to_owned(),
            append_queue_capacity: 1024,
            memory_event_limit: DEFAULT_MEMORY_EVENT_LIMIT,
        }
    }
}

/// HTTP 쿼리/제어 API 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub listen_addr: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1".to_owned(),
            port: 5000,
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
    pub port: u16,
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 검증 헬퍼 ---

fn invalid(field: &str, reason: &str) -> PacketwardError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
    .into()
}

fn one_of(field: &str, value: &str, allowed: &[&str]) -> Result<(), PacketwardError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(invalid(
            field,
            &format!("must be one of: {}", allowed.join(", ")),
        ))
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T: FromStr>(target: &mut T, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.trim().parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = std::any::type_name::<T>(),
                "failed to parse env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = PacketwardConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.capture.source, "none");
        assert_eq!(config.capture.ring_capacity, 1000);
        assert_eq!(config.capture.large_packet_threshold, 1400);
        assert_eq!(config.capture.scan_status, "derived");
        assert!(!config.capture.reset_stats_on_stop);
        assert_eq!(config.storage.backend, "memory");
        assert!(config.api.enabled);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        PacketwardConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let config = PacketwardConfig::parse("").unwrap();
        assert_eq!(config.api.port, 5000);
        assert_eq!(config.broadcast.drop_policy, "oldest");
    }

    #[test]
    fn parse_partial_toml_merges_with_defaults() {
        let toml = r#"
[capture]
source = "replay"
replay_path = "/tmp/records.jsonl"
reset_stats_on_stop = true
"#;
        let config = PacketwardConfig::parse(toml).unwrap();
        assert_eq!(config.capture.source, "replay");
        assert!(config.capture.reset_stats_on_stop);
        // 나머지는 기본값 유지
        assert_eq!(config.capture.read_timeout_ms, 500);
        assert_eq!(config.general.log_format, "json");
        config.validate().unwrap();
    }

    #[test]
    fn parse_invalid_toml_returns_error() {
        let err = PacketwardConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            PacketwardError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = PacketwardConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_accepts_compact_log_format() {
        let mut config = PacketwardConfig::default();
        config.general.log_format = "compact".to_owned();
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_unknown_source() {
        let mut config = PacketwardConfig::default();
        config.capture.source = "ebpf".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("capture.source"));
    }

    #[test]
    fn validate_requires_replay_path_for_replay_source() {
        let mut config = PacketwardConfig::default();
        config.capture.source = "replay".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("replay_path"));
    }

    #[test]
    fn validate_rejects_zero_ring_capacity() {
        let mut config = PacketwardConfig::default();
        config.capture.ring_capacity = 0;
        assert!(config.validate().is_err());

        config.capture.ring_capacity = MAX_RING_CAPACITY + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_scan_status_mode() {
        let mut config = PacketwardConfig::default();
        config.capture.scan_status = "always".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("scan_status"));
    }

    #[test]
    fn validate_rejects_unknown_drop_policy() {
        let mut config = PacketwardConfig::default();
        config.broadcast.drop_policy = "random".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("drop_policy"));
    }

    #[test]
    fn validate_rejects_zero_outbox_capacity() {
        let mut config = PacketwardConfig::default();
        config.broadcast.outbox_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_memory_event_limit() {
        let mut config = PacketwardConfig::default();
        config.storage.memory_event_limit = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("storage.memory_event_limit"));
    }

    #[test]
    fn validate_rejects_unknown_storage_backend() {
        let mut config = PacketwardConfig::default();
        config.storage.backend = "sqlite".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("storage.backend"));
    }

    #[test]
    fn validate_checks_metrics_endpoint_only_when_enabled() {
        let mut config = PacketwardConfig::default();
        config.metrics.endpoint = "metrics".to_owned();
        config.validate().unwrap();

        config.metrics.enabled = true;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("metrics.endpoint"));
    }

    #[test]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_PACKETWARD_STR", "overridden") };
        override_string(&mut val, "TEST_PACKETWARD_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_PACKETWARD_STR") };
    }

    #[test]
    fn env_override_parsed_valid() {
        let mut val = 10usize;
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_PACKETWARD_USIZE", " 42 ") };
        override_parsed(&mut val, "TEST_PACKETWARD_USIZE");
        assert_eq!(val, 42);
        unsafe { std::env::remove_var("TEST_PACKETWARD_USIZE") };
    }

    #[test]
    fn env_override_parsed_invalid_keeps_original() {
        let mut val = false;
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_PACKETWARD_BOOL_BAD", "not-a-bool") };
        override_parsed(&mut val, "TEST_PACKETWARD_BOOL_BAD");
        assert!(!val); // 원래 값 유지
        unsafe { std::env::remove_var("TEST_PACKETWARD_BOOL_BAD") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = 5000u16;
        override_parsed(&mut val, "TEST_PACKETWARD_NONEXISTENT_12345");
        assert_eq!(val, 5000);
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = PacketwardConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = PacketwardConfig::parse(&toml_str).unwrap();
        assert_eq!(config.capture.bpf_filter, parsed.capture.bpf_filter);
        assert_eq!(config.storage.data_dir, parsed.storage.data_dir);
        assert_eq!(config.metrics.port, parsed.metrics.port);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = PacketwardConfig::from_file("/nonexistent/path/packetward.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PacketwardError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
