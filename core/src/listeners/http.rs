//! `HttpListener`/`HttpsListener`: `axum-server` serving the REST router,
//! exactly `restream.rs`'s `axum_server::bind_rustls` call for the TLS case,
//! `axum_server::bind` for plain HTTP. Both take an `axum_server::Handle` so
//! lifecycle shutdown can ask them to stop accepting and drain in-flight
//! requests within a grace period.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;

use crate::config::TlsMaterial;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Binds synchronously so a failure (port in use, permission denied) surfaces
/// to the caller immediately, before any listener task is spawned.
pub fn bind_std(port: u16) -> anyhow::Result<std::net::TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = std::net::TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

pub async fn serve_http(router: Router, listener: std::net::TcpListener, handle: Handle) -> anyhow::Result<()> {
    tracing::info!(addr = ?listener.local_addr()?, "HTTP listener starting");
    axum_server::from_tcp(listener)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}

pub async fn serve_https(
    router: Router,
    listener: std::net::TcpListener,
    tls: &TlsMaterial,
    handle: Handle,
) -> anyhow::Result<()> {
    let tls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path).await?;
    tracing::info!(addr = ?listener.local_addr()?, "HTTPS listener starting");
    axum_server::from_tcp_rustls(listener, tls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}

/// Requests graceful shutdown on a listener handle, bounded by
/// [`SHUTDOWN_GRACE`] — matching `restream.rs`'s `graceful_shutdown(Some(10s))`.
pub fn request_shutdown(handle: &Handle) {
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
