//! Server configuration and shared state.
//!
//! All persistent state lives in the store behind [`Handshake`]; the server
//! itself keeps nothing in memory between requests.

use std::sync::Arc;

use handshake_core::{Database, Handshake, NotificationDispatcher};

use crate::apns::ApnsConfig;

/// Default database file.
pub const DEFAULT_DATABASE_PATH: &str = "handshake.db";

/// Database path that selects an in-memory store.
pub const IN_MEMORY_DATABASE: &str = ":memory:";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// SQLite file path, or `:memory:`
    pub database: String,
    pub log_format: LogFormat,
    /// `None` when push notifications are only logged
    pub apns: Option<ApnsConfig>,
}

impl ServerConfig {
    /// Path to hand to [`Database::open`]; `None` for in-memory.
    pub fn database_path(&self) -> Option<&str> {
        match self.database.as_str() {
            IN_MEMORY_DATABASE | "" => None,
            path => Some(path),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            database: DEFAULT_DATABASE_PATH.to_string(),
            log_format: LogFormat::Pretty,
            apns: None,
        }
    }
}

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    /// Core services over the shared store.
    pub handshake: Handshake,

    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Create server state over an opened store and a running dispatcher.
    pub fn new(config: ServerConfig, database: Arc<Database>, notifier: NotificationDispatcher) -> Self {
        Self {
            handshake: Handshake::new(database, notifier),
            config: Arc::new(config),
        }
    }

    /// Whether pushes go to APNs rather than the log.
    pub fn push_enabled(&self) -> bool {
        self.config.apns.is_some()
    }
}
