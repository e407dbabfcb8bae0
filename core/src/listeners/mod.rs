//! The four listener flavors (spec §4.3/§6): `HttpListener`/`HttpsListener`
//! wrap the REST router behind `axum`/`axum-server`; `WsListener`/
//! `WssListener` run a raw accept loop pairing each socket with a fresh chat
//! session. Bind failures are fatal and bubble up via `anyhow::Result`.

pub mod http;
pub mod ws;

pub use http::{bind_std, serve_http, serve_https};
pub use ws::{bind as bind_ws, serve_wss, serve_ws};
