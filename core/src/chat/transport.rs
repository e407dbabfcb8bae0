//! The `ChatHub`'s view of one connected session: an opaque handle, not a
//! concrete session type — the same shape as the teacher's `Dispatcher`,
//! which stores a `ClientHandle` trait object rather than naming the
//! transport underneath it.

use std::sync::{Arc, Mutex};

use crate::serializer::Serializer;

pub trait ChatTransport: Send + Sync {
    fn remote_id(&self) -> &str;
    fn nickname(&self) -> String;
    fn set_nickname(&self, name: String);
    fn current_room(&self) -> Option<String>;
    fn set_current_room(&self, room: Option<String>);
    fn serializer(&self) -> &Serializer;
    fn is_stopped(&self) -> bool;

    /// Enqueues `msg` for delivery on this session's own serializer; see
    /// the outbound write pipeline for the backpressure rules this runs
    /// under.
    fn deliver(self: Arc<Self>, msg: String);

    /// Initiates an orderly close. Safe to call from any serializer and
    /// more than once — the second call is a no-op.
    fn request_stop(self: Arc<Self>);
}

/// Nickname/room bookkeeping shared by `PlainChatSession` and
/// `TlsChatSession`. Guarded by a plain `Mutex` even though the hub
/// serializer is the only writer, because room-broadcast code running on a
/// *different* serializer still needs to read it safely (spec's "some read
/// paths must be safe").
pub struct SessionIdentity {
    pub remote_id: String,
    nickname: Mutex<String>,
    current_room: Mutex<Option<String>>,
}

impl SessionIdentity {
    pub fn new(remote_id: String) -> Self {
        let nickname = remote_id.clone();
        Self {
            remote_id,
            nickname: Mutex::new(nickname),
            current_room: Mutex::new(None),
        }
    }

    pub fn nickname(&self) -> String {
        self.nickname.lock().unwrap().clone()
    }

    pub fn set_nickname(&self, name: String) {
        *self.nickname.lock().unwrap() = name;
    }

    pub fn current_room(&self) -> Option<String> {
        self.current_room.lock().unwrap().clone()
    }

    pub fn set_current_room(&self, room: Option<String>) {
        *self.current_room.lock().unwrap() = room;
    }

    /// True once `/nick` has succeeded at least once: the first success
    /// from a remote-id-default is what triggers the global join notice.
    pub fn has_real_nickname(&self) -> bool {
        self.nickname() != self.remote_id
    }
}
