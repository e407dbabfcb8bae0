//! Binary entry point: loads configuration via `clap`/`dotenvy`, wires up
//! structured logging the way `server_speak.rs::setup_logging` does
//! (console layer + optional rolling file layer), builds a
//! `gateway_core::Config`, and hands control to `gateway_core::lifecycle::run`.

use std::path::PathBuf;

use clap::Parser;
use gateway_core::config::{Config, TlsMaterial};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Command-line / environment configuration for one gateway process.
/// `gateway-core` deliberately has no knowledge of `clap` or `.env` files —
/// that parsing lives here, outside the library boundary.
#[derive(Parser, Debug)]
#[command(author, version, about = "Places/chat edge gateway")]
struct AppConfig {
    #[arg(long, env = "HTTP_PORT", default_value_t = 8080)]
    http_port: u16,

    #[arg(long, env = "HTTPS_PORT", default_value_t = 58080)]
    https_port: u16,

    #[arg(long, env = "WS_PORT", default_value_t = 33334)]
    ws_port: u16,

    #[arg(long, env = "WSS_PORT", default_value_t = 33335)]
    wss_port: u16,

    #[arg(long, env = "TLS_CERT")]
    tls_cert: Option<PathBuf>,

    #[arg(long, env = "TLS_KEY")]
    tls_key: Option<PathBuf>,

    #[arg(long, env = "PLACES_API_KEY")]
    places_api_key: Option<String>,

    #[arg(long, env = "HISTORY_DIR")]
    history_dir: Option<PathBuf>,

    #[arg(long, env = "REQUIRE_AUTH", default_value_t = false)]
    require_auth: bool,

    /// Reactor worker threads; 0 lets Tokio pick hardware concurrency.
    #[arg(long, env = "THREADS", default_value_t = 0)]
    threads: usize,

    #[arg(long, env = "LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,
}

impl AppConfig {
    fn into_gateway_config(self) -> Config {
        let tls = match (self.tls_cert, self.tls_key) {
            (Some(cert_path), Some(key_path)) => Some(TlsMaterial { cert_path, key_path }),
            _ => None,
        };

        Config {
            http_port: self.http_port,
            https_port: self.https_port,
            ws_port: self.ws_port,
            wss_port: self.wss_port,
            tls,
            threads: self.threads,
            places_api_key: self.places_api_key,
            history_dir: self.history_dir,
            require_auth: self.require_auth,
            ..Config::default()
        }
    }
}

/// `Builder::new_multi_thread()` with `worker_threads(cfg.threads)` when set,
/// otherwise Tokio's own hardware-concurrency default — the reactor's worker
/// pool, built by hand instead of via `#[tokio::main]` so the thread count is
/// driven by configuration.
fn build_runtime(threads: usize) -> anyhow::Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if threads > 0 {
        builder.worker_threads(threads);
    }
    Ok(builder.enable_all().build()?)
}

fn setup_logging(log_dir: Option<&PathBuf>, log_level: &str) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_level))?;
    let console_layer = fmt::layer().with_target(true);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, "gateway-server");
            let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = fmt::layer().with_ansi(false).with_writer(non_blocking_appender).json();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .with(file_layer)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(env_filter).with(console_layer).init();
            Ok(None)
        }
    }
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let app_config = AppConfig::parse();

    // Held for the process lifetime so the non-blocking file writer keeps flushing.
    let _log_guard = setup_logging(app_config.log_dir.as_ref(), &app_config.log_level)?;

    let config = app_config.into_gateway_config();
    tracing::info!(
        http_port = config.http_port,
        https_port = config.https_port,
        ws_port = config.ws_port,
        wss_port = config.wss_port,
        tls_enabled = config.tls.is_some(),
        places_enabled = config.places_api_key.is_some(),
        worker_threads = config.threads,
        "gateway-server starting"
    );

    let runtime = build_runtime(config.threads)?;
    let exit_code = runtime.block_on(gateway_core::lifecycle::run(config));
    std::process::exit(exit_code);
}
