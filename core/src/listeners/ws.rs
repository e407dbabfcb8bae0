//! `WsListener`/`WssListener`: a raw `tokio::net::TcpListener` accept loop,
//! same shape as `server_speak.rs`'s `tokio_main` — per accepted connection,
//! spawn a `tokio-tungstenite` handshake (behind a `tokio-rustls` handshake
//! for the WSS case) and a fresh `ChatSession` actor bound to its own
//! serializer. This is the literal "pairs socket with serializer, constructs
//! session, invokes start()" the hub side expects.

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;

use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;

use crate::chat::{run_session, ChatHub};
use crate::config::{Config, TlsMaterial};

/// Binds synchronously so a bind failure (port in use, permission denied)
/// surfaces to the caller before any listener task is spawned.
pub fn bind(port: u16) -> anyhow::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = std::net::TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    Ok(TcpListener::from_std(listener)?)
}

/// `listener` is already bound by the caller — binding happens synchronously
/// before this task is spawned, so a bind failure surfaces at startup rather
/// than being discovered only once the accept loop is polled.
pub async fn serve_ws(
    listener: TcpListener,
    hub: Arc<ChatHub>,
    config: Arc<Config>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    tracing::info!(addr = ?listener.local_addr()?, "WS listener starting");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "WS accept failed, continuing");
                        continue;
                    }
                };
                let hub = hub.clone();
                let config = config.clone();
                tokio::spawn(async move {
                    if let Err(e) = run_session(stream, peer.to_string(), hub, config, "CherryRecorder-Chat/1.0 (WS)").await {
                        tracing::debug!(%peer, error = %e, "ws session ended with error");
                    }
                });
            }
            _ = shutdown.recv() => {
                tracing::info!("WS listener stopping");
                return Ok(());
            }
        }
    }
}

pub async fn serve_wss(
    listener: TcpListener,
    hub: Arc<ChatHub>,
    config: Arc<Config>,
    tls: &TlsMaterial,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let acceptor = TlsAcceptor::from(Arc::new(load_server_config(tls)?));
    tracing::info!(addr = ?listener.local_addr()?, "WSS listener starting");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "WSS accept failed, continuing");
                        continue;
                    }
                };
                let acceptor = acceptor.clone();
                let hub = hub.clone();
                let config = config.clone();
                tokio::spawn(async move {
                    let tls_stream = match acceptor.accept(stream).await {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::debug!(%peer, error = %e, "TLS handshake failed");
                            return;
                        }
                    };
                    if let Err(e) = run_session(tls_stream, peer.to_string(), hub, config, "CherryRecorder-Chat/1.0 (WSS)").await {
                        tracing::debug!(%peer, error = %e, "wss session ended with error");
                    }
                });
            }
            _ = shutdown.recv() => {
                tracing::info!("WSS listener stopping");
                return Ok(());
            }
        }
    }
}

fn load_server_config(tls: &TlsMaterial) -> anyhow::Result<rustls::ServerConfig> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut BufReader::new(File::open(&tls.cert_path)?))
        .collect::<Result<Vec<_>, _>>()?;
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut BufReader::new(File::open(&tls.key_path)?))?
        .ok_or_else(|| anyhow::anyhow!("no private key found in {}", tls.key_path.display()))?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(config)
}
