//! Chat: the WebSocket multi-user chat service (rooms, nicknames, private
//! messages, persisted history). `ChatHub` is the shared registry; each
//! accepted connection gets its own `ChatSessionImpl` actor talking to it
//! through the `ChatTransport` trait object.

pub mod commands;
pub mod hub;
pub mod outbound;
pub mod room;
pub mod session;
pub mod transport;

pub use hub::{ChatHub, RoomJoinOutcome};
pub use session::{run_session, ChatSessionImpl, PlainChatSession, TlsChatSession};
pub use transport::ChatTransport;
