//! Handshake Server
//!
//! HTTP front end for the Handshake contact-introduction service:
//!
//! 1. **Signup and locations**: users register a contact document and
//!    report position samples.
//!
//! 2. **Discovery**: every user can list the people they have not yet been
//!    granted access to.
//!
//! 3. **Contact requests**: a user asks for someone's details; once the
//!    other side grants the request, the full contact document (minus the
//!    device token) becomes visible to the requester.
//!
//! Push notifications go to APNs when a topic and provider token are
//! configured, and to the log otherwise.

mod api;
mod apns;
mod state;

use std::sync::Arc;

use clap::Parser;
use handshake_core::{Database, LogSink, NotificationDispatcher, PushSink};
use tracing_subscriber::EnvFilter;

use apns::{ApnsConfig, ApnsSink, DEFAULT_APNS_ENDPOINT};
use state::{AppState, LogFormat, ServerConfig, DEFAULT_DATABASE_PATH};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "handshake-server", version, about = "Handshake contact-introduction server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "HANDSHAKE_PORT")]
    port: u16,

    /// SQLite database file (":memory:" for a throwaway in-memory store)
    #[arg(long, default_value = DEFAULT_DATABASE_PATH, env = "HANDSHAKE_DATABASE")]
    database: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, env = "LOG_FORMAT")]
    log_format: LogFormat,

    /// APNs base URL
    #[arg(long, default_value = DEFAULT_APNS_ENDPOINT, env = "APNS_ENDPOINT")]
    apns_endpoint: String,

    /// App bundle ID used as the APNs topic. Push is disabled unless both
    /// this and the auth token are set.
    #[arg(long, env = "APNS_TOPIC")]
    apns_topic: Option<String>,

    /// APNs provider authentication token (JWT)
    #[arg(long, env = "APNS_AUTH_TOKEN", hide_env_values = true)]
    apns_auth_token: Option<String>,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            port: self.port,
            database: self.database,
            log_format: self.log_format,
            apns: ApnsConfig::from_parts(&self.apns_endpoint, self.apns_topic, self.apns_auth_token),
        }
    }
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let config = Args::parse().into_config();

    init_tracing(config.log_format);

    let database = match Database::open(config.database_path()) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            tracing::error!(database = config.database.as_str(), error = %e, "Failed to open database");
            std::process::exit(1);
        }
    };
    tracing::info!(database = config.database.as_str(), "Database ready");

    let sink: Arc<dyn PushSink> = match &config.apns {
        Some(apns) => {
            tracing::info!(
                endpoint = apns.endpoint.as_str(),
                topic = apns.topic.as_str(),
                "APNs push enabled"
            );
            Arc::new(ApnsSink::new(apns.clone()))
        }
        None => {
            tracing::info!("APNs push disabled (no topic/token configured), logging notifications");
            Arc::new(LogSink)
        }
    };
    let (notifier, _dispatcher) = NotificationDispatcher::spawn(sink);

    let port = config.port;
    let app = api::router(AppState::new(config, database, notifier));

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("Handshake server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "handshake_server=info,handshake_core=info,tower_http=info".into());

    match format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
