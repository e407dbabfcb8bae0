//! Shared error types for the gateway runtime.
//!
//! Each subsystem gets its own `thiserror` enum so callers can match on the
//! failure kind without downcasting; `anyhow` is reserved for the binary's
//! `main` boundary (see `gateway-server`), not for library code.

use thiserror::Error;

/// Errors surfaced by the append-only history store.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced by the outbound Places HTTPS client.
#[derive(Debug, Error)]
pub enum PlacesError {
    #[error("places API key is not configured")]
    MissingApiKey,

    #[error("upstream connect failed after retries: {0}")]
    Connect(#[source] reqwest_middleware::Error),

    #[error("upstream request failed: {0}")]
    Transport(#[source] reqwest_middleware::Error),

    #[error("upstream response was not parseable JSON")]
    MalformedResponse,

    #[error("upstream returned a non-2xx status with an unparseable body")]
    UpstreamError {
        status: u16,
        body: String,
    },

    #[error("photo redirect target was missing a Location header")]
    MissingRedirectLocation,
}

/// Errors surfaced while handling one HTTP request.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("malformed request body: {0}")]
    BadRequest(String),

    #[error("no such route")]
    NotFound,

    #[error("request body too large")]
    PayloadTooLarge,

    #[error(transparent)]
    Places(#[from] PlacesError),
}

/// Errors surfaced while a chat command is being handled.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatCommandError {
    #[error("nickname must be 1-20 characters with no whitespace")]
    InvalidNickname,

    #[error("'{0}' is a reserved nickname")]
    ReservedNickname(String),

    #[error("nickname '{0}' is already in use")]
    NicknameTaken(String),

    #[error("room name must be 1-30 characters with no whitespace")]
    InvalidRoomName,

    #[error("room '{0}' is full")]
    RoomFull(String),

    #[error("no such user '{0}'")]
    UnknownUser(String),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("you are not in a room")]
    NotInRoom,
}
