//! HTTP/HTTPS REST facade: `/health`, `/status`, `/maps/key`, and the
//! Places proxy routes, built with `axum` in the shape of the teacher's
//! `server_sql.rs`/`restream.rs` routers.

pub mod router;

pub use router::{build_router, AppError, AppState};
