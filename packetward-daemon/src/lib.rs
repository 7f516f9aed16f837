//! Packetward daemon library.
//!
//! This library exposes internal modules for integration testing.
//! In production, the daemon is used as the `packetward` binary (main.rs).

pub mod api;
pub mod cli;
pub mod health;
pub mod logging;
pub mod metrics_server;
pub mod orchestrator;
