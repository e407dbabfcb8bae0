//! Process-level startup/shutdown orchestration (spec §5's "process-level
//! shutdown" paragraph). A single `tokio::sync::broadcast::channel(1)` fans a
//! shutdown signal out to every listener, the same primitive `server_yahoo.rs`
//! uses to coordinate its three long-running tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;

use crate::chat::ChatHub;
use crate::config::Config;
use crate::history::HistoryStore;
use crate::http::{build_router, AppState};
use crate::listeners::http::{bind_std, request_shutdown, serve_http, serve_https};
use crate::listeners::ws::{bind as bind_ws, serve_ws, serve_wss};
use crate::places::PlacesClient;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

/// Runs every configured listener until a shutdown signal arrives, then
/// drains them within a bounded grace period. Returns the process exit code
/// spec.md §6 specifies: 0 on a clean shutdown, 1 if any listener failed.
pub async fn run(config: Config) -> i32 {
    // rustls 0.23+ requires an explicit crypto provider; installed once,
    // matching `restream.rs`'s boot sequence.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = Arc::new(config);
    let history = Arc::new(HistoryStore::new(config.history_dir.clone()));
    let hub = ChatHub::new(history, Config::DEFAULT_ROOM_CAPACITY);

    let places = config.places_api_key.clone().map(|key| Arc::new(PlacesClient::new(key)));
    let app_state = AppState {
        places,
        places_api_key: config.places_api_key.clone(),
    };
    let router = build_router(app_state, config.http_max_body_bytes, config.http_read_timeout);

    // Every socket is bound here, synchronously, before any accept loop is
    // spawned: a bind failure (port in use, permission denied) is fatal and
    // must surface to the caller immediately rather than only once the
    // spawned task's future is first polled.
    let http_listener = match bind_std(config.http_port) {
        Ok(l) => l,
        Err(e) => return fatal_bind_error("HTTP", config.http_port, e),
    };
    let ws_listener = match bind_ws(config.ws_port) {
        Ok(l) => l,
        Err(e) => return fatal_bind_error("WS", config.ws_port, e),
    };

    let tls_listeners = match config.tls.clone() {
        Some(tls) => {
            let https_listener = match bind_std(config.https_port) {
                Ok(l) => l,
                Err(e) => return fatal_bind_error("HTTPS", config.https_port, e),
            };
            let wss_listener = match bind_ws(config.wss_port) {
                Ok(l) => l,
                Err(e) => return fatal_bind_error("WSS", config.wss_port, e),
            };
            Some((tls, https_listener, wss_listener))
        }
        None => None,
    };

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let http_handle = axum_server::Handle::new();
    let https_handle = axum_server::Handle::new();

    let mut tasks = Vec::new();

    {
        let router = router.clone();
        let handle = http_handle.clone();
        tasks.push(tokio::spawn(async move { serve_http(router, http_listener, handle).await }));
    }

    {
        let hub = hub.clone();
        let config = config.clone();
        let shutdown = shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move { serve_ws(ws_listener, hub, config, shutdown).await }));
    }

    let tls_enabled = tls_listeners.is_some();
    if let Some((tls, https_listener, wss_listener)) = tls_listeners {
        let router = router.clone();
        let handle = https_handle.clone();
        let https_tls = tls.clone();
        tasks.push(tokio::spawn(async move { serve_https(router, https_listener, &https_tls, handle).await }));

        let hub = hub.clone();
        let config = config.clone();
        let shutdown = shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move { serve_wss(wss_listener, hub, config, &tls, shutdown).await }));
    }

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining listeners");

    request_shutdown(&http_handle);
    if tls_enabled {
        request_shutdown(&https_handle);
    }
    let _ = shutdown_tx.send(());
    hub.stop_all();

    let drain = async {
        for task in tasks {
            if let Ok(Err(e)) = task.await {
                tracing::error!(error = %e, "listener exited with an error");
                return 1;
            }
        }
        0
    };

    match tokio::time::timeout(SHUTDOWN_GRACE, drain).await {
        Ok(code) => code,
        Err(_) => {
            tracing::warn!("shutdown grace period elapsed before all listeners drained");
            1
        }
    }
}

fn fatal_bind_error(listener: &str, port: u16, err: anyhow::Error) -> i32 {
    tracing::error!(%listener, port, error = %err, "failed to bind listener");
    1
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("ctrl-c received"),
        _ = terminate => tracing::info!("sigterm received"),
    }
}
