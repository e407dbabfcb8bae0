//! Fully-populated runtime configuration.
//!
//! `gateway-core` never reads an environment variable or a command-line flag
//! itself — the spec treats that as an external collaborator's job. Callers
//! (the `gateway-server` binary, or a test harness) build a `Config` and hand
//! it to [`crate::lifecycle::run`].

use std::path::PathBuf;

/// TLS material: a certificate chain and private key, both PEM-encoded.
#[derive(Debug, Clone)]
pub struct TlsMaterial {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Fully-populated configuration for one gateway process.
#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub https_port: u16,
    pub ws_port: u16,
    pub wss_port: u16,

    /// Present only when both HTTPS and/or WSS listeners should start.
    pub tls: Option<TlsMaterial>,

    /// 0 means "let Tokio pick hardware concurrency".
    pub threads: usize,

    pub places_api_key: Option<String>,

    /// `None` disables the history store entirely.
    pub history_dir: Option<PathBuf>,

    /// Reserved: accepted by `/auth` but never required by any other command.
    pub require_auth: bool,

    /// Bound on each session's outbound queue before messages start dropping.
    pub chat_queue_capacity: usize,

    /// Idle timeout applied to a WS/WSS session that sends nothing at all.
    pub chat_idle_timeout: std::time::Duration,

    /// Per-request read timeout applied to HTTP/HTTPS sessions.
    pub http_read_timeout: std::time::Duration,

    /// Request body ceiling in bytes; larger bodies are rejected with 413.
    pub http_max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 8080,
            https_port: 58080,
            ws_port: 33334,
            wss_port: 33335,
            tls: None,
            threads: 0,
            places_api_key: None,
            history_dir: None,
            require_auth: false,
            chat_queue_capacity: 256,
            chat_idle_timeout: std::time::Duration::from_secs(600),
            http_read_timeout: std::time::Duration::from_secs(30),
            http_max_body_bytes: 1 << 20,
        }
    }
}

impl Config {
    /// Room capacity is a `Room`-level constant rather than a `Config` field:
    /// every room in the process shares it, and the spec names one fixed
    /// default (100) rather than a tunable.
    pub const DEFAULT_ROOM_CAPACITY: usize = 100;
}
