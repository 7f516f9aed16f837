//! CLI argument definitions for the packetward daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use packetward_core::config::PacketwardConfig;

/// Packetward traffic classification daemon.
///
/// Classifies captured network traffic, keeps rolling statistics and
/// pushes classified events to connected dashboards.
#[derive(Parser, Debug)]
#[command(name = "packetward")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to packetward.toml configuration file.
    #[arg(short, long, default_value = "/etc/packetward/packetward.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty, compact).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,

    /// Capture live traffic from this interface (selects the pcap source).
    #[arg(short, long, conflicts_with = "replay")]
    pub interface: Option<String>,

    /// Replay records from a JSON lines file (selects the replay source).
    #[arg(long)]
    pub replay: Option<PathBuf>,
}

impl DaemonCli {
    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut PacketwardConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.general.log_format.clone_from(format);
        }
        if let Some(pid_file) = &self.pid_file {
            config.general.pid_file.clone_from(pid_file);
        }
        if let Some(interface) = &self.interface {
            config.capture.source = "pcap".to_owned();
            config.capture.interface.clone_from(interface);
        }
        if let Some(path) = &self.replay {
            config.capture.source = "replay".to_owned();
            config.capture.replay_path = path.display().to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let cli = DaemonCli::try_parse_from(["packetward"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/packetward/packetward.toml"));
        assert!(!cli.validate);
        assert!(cli.interface.is_none());
    }

    #[test]
    fn test_interface_and_replay_conflict() {
        let result =
            DaemonCli::try_parse_from(["packetward", "--interface", "eth0", "--replay", "x.jsonl"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_select_capture_source() {
        let cli = DaemonCli::try_parse_from([
            "packetward",
            "--replay",
            "/tmp/records.jsonl",
            "--log-format",
            "pretty",
            "--pid-file",
            "/run/packetward.pid",
        ])
        .unwrap();
        let mut config = PacketwardConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.capture.source, "replay");
        assert_eq!(config.capture.replay_path, "/tmp/records.jsonl");
        assert_eq!(config.general.log_format, "pretty");
        assert_eq!(config.general.pid_file, "/run/packetward.pid");
    }

    #[test]
    fn test_interface_override() {
        let cli = DaemonCli::try_parse_from(["packetward", "-i", "eth1"]).unwrap();
        let mut config = PacketwardConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.capture.source, "pcap");
        assert_eq!(config.capture.interface, "eth1");
    }
}
