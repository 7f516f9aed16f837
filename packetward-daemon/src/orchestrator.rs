//! Engine orchestration -- assembly, task wiring, and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of the packetward daemon.
//! It validates configuration, opens the store and the record source,
//! builds the traffic monitor, and manages startup/shutdown ordering.
//!
//! # Startup Order
//!
//! 1. PID file
//! 2. Append writer (consumes the persistence queue)
//! 3. Optional autostart of capture
//! 4. Producer loop (record source -> monitor)
//! 5. Heartbeat and uptime tasks
//! 6. API server
//!
//! # Shutdown Order
//!
//! 1. Cancel the producer and background tasks, force capture to Idle
//! 2. Join the producer (the record source is released with it)
//! 3. Close and drain the append queue
//! 4. Stop the API server (graceful)
//! 5. Remove the PID file

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use packetward_core::config::PacketwardConfig;
use packetward_core::pipeline::{EventStore, RecordSource};
use packetward_core::types::ClassifiedEvent;
use packetward_engine::{
    EngineConfig, TrafficMonitor, TrafficMonitorBuilder, open_source, open_store,
    run_append_writer, run_heartbeat,
};

use crate::api::{self, AppState};
use crate::health::DaemonHealth;
use crate::metrics_server;

/// Interval between uptime gauge updates.
const UPTIME_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: PacketwardConfig,
    /// Shared traffic monitor.
    monitor: Arc<TrafficMonitor>,
    /// Persistence store.
    store: Arc<dyn EventStore>,
    /// Append queue receiver, taken by the writer task on run.
    append_rx: Option<mpsc::Receiver<ClassifiedEvent>>,
    /// Record source, moved into the producer loop on run.
    source: Option<Box<dyn RecordSource>>,
    /// Cancels the producer, background tasks and the API server.
    cancel: CancellationToken,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read, parsed or validated
    /// - The store or the record source cannot be opened
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = PacketwardConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    pub async fn build_from_config(config: PacketwardConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        let store = open_store(&config.storage)
            .await
            .with_context(|| format!("failed to open '{}' store", config.storage.backend))?;
        tracing::info!(backend = store.name(), "store opened");

        let (monitor, append_rx) = TrafficMonitorBuilder::new()
            .config(EngineConfig::from_core(&config))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build traffic monitor: {}", e))?;

        let source = open_source(&config.capture)
            .with_context(|| format!("failed to open '{}' record source", config.capture.source))?;
        match &source {
            Some(source) => tracing::info!(source = source.name(), "record source opened"),
            None => tracing::info!("no record source configured"),
        }

        if config.metrics.enabled {
            record_daemon_metrics();
        }

        Ok(Self {
            config,
            monitor: Arc::new(monitor),
            store,
            append_rx,
            source,
            cancel: CancellationToken::new(),
            start_time: Instant::now(),
        })
    }

    /// Run until SIGTERM or SIGINT is received.
    pub async fn run(&mut self) -> Result<()> {
        let signal = shutdown_signal()?;
        self.run_until(async move {
            let name = signal.await;
            tracing::info!(signal = name, "shutdown signal received");
        })
        .await
    }

    /// Start every task, wait for `shutdown` to complete, then stop everything.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let pid_file = (!self.config.general.pid_file.is_empty())
            .then(|| self.config.general.pid_file.clone());
        if let Some(path) = &pid_file {
            write_pid_file(Path::new(path))?;
        }

        let result = self.serve(shutdown).await;

        if let Some(path) = &pid_file {
            remove_pid_file(Path::new(path));
        }
        result
    }

    async fn serve<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let writer_cancel = CancellationToken::new();
        let writer = self.append_rx.take().map(|rx| {
            tokio::spawn(run_append_writer(
                Arc::clone(&self.store),
                rx,
                writer_cancel.clone(),
            ))
        });

        // Before the producer, so a finite replay is not discarded as Idle.
        if self.config.capture.autostart {
            self.monitor.start_capture();
        }

        let producer = self
            .source
            .take()
            .map(|source| self.monitor.spawn_capture(source, self.cancel.clone()));

        let heartbeat = match self.config.broadcast.heartbeat_interval_secs {
            0 => None,
            secs => Some(tokio::spawn(run_heartbeat(
                Arc::clone(&self.monitor),
                Duration::from_secs(secs),
                self.cancel.clone(),
            ))),
        };

        let uptime = self
            .config
            .metrics
            .enabled
            .then(|| spawn_uptime_updater(self.start_time, self.cancel.clone()));

        let (server, outcome) = if self.config.api.enabled {
            match self.spawn_api_server().await {
                Ok(server) => (Some(server), Ok(())),
                Err(e) => (None, Err(e)),
            }
        } else {
            (None, Ok(()))
        };

        // A failed bind skips the run but still tears down what was spawned.
        match &outcome {
            Ok(()) => {
                tracing::info!("packetward running");
                shutdown.await;
            }
            Err(e) => tracing::error!(error = %e, "startup failed, shutting down"),
        }

        // Producer first: no record may be half-processed when the queue closes.
        tracing::info!("stopping capture");
        self.cancel.cancel();
        self.monitor.shutdown();

        if let Some(producer) = producer {
            match producer.await {
                Ok(Ok(classified)) => tracing::info!(classified, "producer stopped"),
                Ok(Err(e)) => tracing::warn!(error = %e, "producer had stopped on source error"),
                Err(e) => tracing::error!(error = %e, "producer task panicked"),
            }
        }

        writer_cancel.cancel();
        if let Some(writer) = writer {
            match writer.await {
                Ok(written) => tracing::info!(written, "append queue drained"),
                Err(e) => tracing::error!(error = %e, "append writer task panicked"),
            }
        }

        for task in [heartbeat, uptime].into_iter().flatten() {
            let _ = task.await;
        }

        if let Some(server) = server {
            match server.await {
                Ok(Ok(())) => tracing::info!("API server stopped"),
                Ok(Err(e)) => tracing::error!(error = %e, "API server failed"),
                Err(e) => tracing::error!(error = %e, "API server task panicked"),
            }
        }

        tracing::info!("packetward shut down");
        outcome
    }

    async fn spawn_api_server(&self) -> Result<JoinHandle<std::io::Result<()>>> {
        let addr: SocketAddr = format!("{}:{}", self.config.api.listen_addr, self.config.api.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid API listen address: {}", e))?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind API listener on {addr}"))?;
        tracing::info!(listen_addr = %addr, "API server listening");

        let app = api::router(self.app_state());
        let cancel = self.cancel.clone();
        Ok(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(cancel.cancelled_owned())
                .await
        }))
    }

    /// Handler state sharing this orchestrator's monitor and store.
    pub fn app_state(&self) -> AppState {
        AppState::new(
            Arc::clone(&self.monitor),
            Arc::clone(&self.store),
            self.cancel.clone(),
        )
    }

    /// Get the current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        self.app_state().health().await
    }

    pub fn monitor(&self) -> &Arc<TrafficMonitor> {
        &self.monitor
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    pub fn config(&self) -> &PacketwardConfig {
        &self.config
    }
}

/// Install SIGTERM/SIGINT handlers and return a future resolving to the
/// name of the first signal received.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
fn shutdown_signal() -> Result<impl Future<Output = &'static str> + Send> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    })
}

/// Write the current process PID to a file.
///
/// Used to prevent duplicate daemon instances.
///
/// # Security
///
/// - Uses `create_new(true)` to atomically create file (prevents TOCTOU races)
/// - Verifies the created file is a regular file
/// - Creates parent directory with restrictive permissions (0o700)
///
/// # Errors
///
/// Returns an error if the PID file exists already or cannot be written.
pub fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            fs::DirBuilder::new()
                .mode(0o700)
                .recursive(true)
                .create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    if !file.metadata()?.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{}", pid)?;

    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on daemon shutdown.
///
/// Logs a warning but does not fail if the file cannot be removed.
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file");
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

/// Record daemon-level metrics (build info).
fn record_daemon_metrics() {
    use packetward_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

/// Spawn a background task that periodically updates the uptime metric.
fn spawn_uptime_updater(start_time: Instant, cancel: CancellationToken) -> JoinHandle<()> {
    use packetward_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_UPDATE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let uptime_secs = start_time.elapsed().as_secs();
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
                }
                _ = cancel.cancelled() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
