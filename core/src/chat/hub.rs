//! The chat registry: nickname map, room map, session set, and the
//! broadcast/routing operations that all run on the hub's own serializer
//! (spec §4.7). Nickname and room maps additionally sit behind their own
//! `std::sync::Mutex`es so a *different* serializer (e.g. a room broadcast
//! triggered while iterating a snapshot) can still read them safely.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};

use crate::error::ChatCommandError;
use crate::history::{HistoryScope, HistoryStore};
use crate::serializer::Serializer;

use super::room::Room;
use super::transport::ChatTransport;

const RESERVED_NICKNAMES: &[&str] = &["Server", "system"];

pub struct ChatHub {
    serializer: Serializer,
    sessions: Mutex<Vec<Arc<dyn ChatTransport>>>,
    nicknames: Mutex<HashMap<String, Weak<dyn ChatTransport>>>,
    rooms: Mutex<HashMap<String, Room>>,
    history: Arc<HistoryStore>,
    room_capacity: usize,
}

/// Outcome of a `/join` or `/leave`, handed back to the caller so it can
/// compose the self-confirmation and room-scoped notice.
pub struct RoomJoinOutcome {
    pub members: Vec<String>,
}

impl ChatHub {
    pub fn new(history: Arc<HistoryStore>, room_capacity: usize) -> Arc<Self> {
        let (serializer, _join) = Serializer::spawn();
        Arc::new(Self {
            serializer,
            sessions: Mutex::new(Vec::new()),
            nicknames: Mutex::new(HashMap::new()),
            rooms: Mutex::new(HashMap::new()),
            history,
            room_capacity,
        })
    }

    /// Runs `f` on the hub serializer and awaits its result via a oneshot —
    /// the idiomatic stand-in for the callback-style `cb(...)` the spec
    /// describes: the caller's own task (already suspended at an await
    /// point, which the concurrency model allows) resumes once the hub
    /// posts the reply.
    async fn call<R, F, Fut>(&self, f: F) -> R
    where
        R: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.serializer.dispatch(move || async move {
            let _ = tx.send(f().await);
        }).await;
        rx.await.expect("hub serializer dropped without replying")
    }

    /// Asks every currently-registered session to stop — the hub's part of
    /// process shutdown, run after listeners have stopped accepting new
    /// connections.
    pub fn stop_all(self: &Arc<Self>) {
        let sessions = self.sessions.lock().unwrap().clone();
        for session in sessions {
            session.request_stop();
        }
    }

    pub async fn join(self: &Arc<Self>, session: Arc<dyn ChatTransport>) {
        let this = self.clone();
        self.serializer.post(move || async move {
            this.sessions.lock().unwrap().push(session.clone());
            tracing::info!(remote_id = %session.remote_id(), "session joined hub");
        });
    }

    pub async fn leave(self: &Arc<Self>, session: Arc<dyn ChatTransport>) {
        let this = self.clone();
        self.serializer.post(move || async move {
            let remote_id = session.remote_id().to_string();

            if let Some(room_name) = session.current_room() {
                this.leave_room_locked(&room_name, &remote_id);
            }

            let had_real_nickname = session.nickname() != remote_id;
            let nickname = session.nickname();
            this.with_both_locks(|nicknames, _rooms| {
                if had_real_nickname {
                    nicknames.remove(&nickname);
                }
            });

            this.sessions.lock().unwrap().retain(|s| s.remote_id() != remote_id);

            if had_real_nickname {
                this.broadcast_inner(format!("* 사용자 '{nickname}'님이 퇴장했습니다."), None).await;
            }
            tracing::info!(remote_id, "session left hub");
        });
    }

    pub async fn try_register_nickname(
        self: &Arc<Self>,
        name: String,
        session: Arc<dyn ChatTransport>,
    ) -> Result<(), ChatCommandError> {
        if name.is_empty() || name.len() > 20 || name.chars().any(char::is_whitespace) {
            return Err(ChatCommandError::InvalidNickname);
        }
        if RESERVED_NICKNAMES.contains(&name.as_str()) {
            return Err(ChatCommandError::ReservedNickname(name));
        }

        let this = self.clone();
        self.call(move || async move { this.register_nickname_locked(name, session) }).await
    }

    fn register_nickname_locked(
        self: &Arc<Self>,
        name: String,
        session: Arc<dyn ChatTransport>,
    ) -> Result<(), ChatCommandError> {
        let mut nicknames = self.nicknames.lock().unwrap();

        let acquirable = match nicknames.get(&name) {
            None => true,
            Some(weak) => match weak.upgrade() {
                None => true,
                Some(existing) => existing.remote_id() == session.remote_id(),
            },
        };
        if !acquirable {
            return Err(ChatCommandError::NicknameTaken(name));
        }

        let old_nickname = session.nickname();
        if old_nickname != session.remote_id() && old_nickname != name {
            nicknames.remove(&old_nickname);
        }
        nicknames.insert(name.clone(), Arc::downgrade(&session));
        session.set_nickname(name);
        Ok(())
    }

    pub async fn find_session_by_nickname(self: &Arc<Self>, name: String) -> Option<Arc<dyn ChatTransport>> {
        let this = self.clone();
        self.call(move || async move {
            let mut nicknames = this.nicknames.lock().unwrap();
            match nicknames.get(&name).and_then(Weak::upgrade) {
                Some(session) => Some(session),
                None => {
                    nicknames.remove(&name);
                    None
                }
            }
        })
        .await
    }

    pub async fn get_user_list(self: &Arc<Self>) -> Vec<String> {
        let this = self.clone();
        self.call(move || async move {
            let mut nicknames = this.nicknames.lock().unwrap();
            let live: Vec<(String, Weak<dyn ChatTransport>)> = nicknames
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let mut names = Vec::new();
            for (name, weak) in live {
                if weak.upgrade().is_some() {
                    names.push(name);
                } else {
                    nicknames.remove(&name);
                }
            }
            names
        })
        .await
    }

    pub fn broadcast(self: &Arc<Self>, msg: String, sender: Option<Arc<dyn ChatTransport>>) {
        let this = self.clone();
        self.serializer.post(move || async move {
            this.broadcast_inner(msg, sender).await;
        });
    }

    async fn broadcast_inner(self: &Arc<Self>, msg: String, sender: Option<Arc<dyn ChatTransport>>) {
        let sender_id = sender.as_ref().map(|s| s.remote_id().to_string());
        let sender_nick = sender.as_ref().map(|s| s.nickname());
        let snapshot = self.sessions.lock().unwrap().clone();
        for member in snapshot {
            if Some(member.remote_id().to_string()) == sender_id {
                continue;
            }
            member.deliver(msg.clone());
        }
        self.history.append(&HistoryScope::Global, sender_nick.as_deref(), &msg).await;
    }

    pub fn broadcast_to_room(self: &Arc<Self>, room: String, msg: String, sender: Option<Arc<dyn ChatTransport>>) {
        let this = self.clone();
        self.serializer.post(move || async move {
            let sender_id = sender.as_ref().map(|s| s.remote_id().to_string());
            let sender_nick = sender.as_ref().map(|s| s.nickname());
            let snapshot = this
                .rooms
                .lock()
                .unwrap()
                .get(&room)
                .map(Room::members_snapshot);
            let Some(members) = snapshot else { return };
            for member in members {
                if Some(member.remote_id().to_string()) == sender_id {
                    continue;
                }
                member.deliver(msg.clone());
            }
            this.history
                .append(&HistoryScope::Room(room), sender_nick.as_deref(), &msg)
                .await;
        });
    }

    pub fn send_private(self: &Arc<Self>, sender: Arc<dyn ChatTransport>, receiver_nick: String, body: String) {
        let this = self.clone();
        self.serializer.post(move || async move {
            let receiver = {
                let mut nicknames = this.nicknames.lock().unwrap();
                match nicknames.get(&receiver_nick).and_then(Weak::upgrade) {
                    Some(s) => Some(s),
                    None => {
                        nicknames.remove(&receiver_nick);
                        None
                    }
                }
            };

            let Some(receiver) = receiver else {
                sender.deliver(format!("* No such user '{receiver_nick}'"));
                return;
            };

            let sender_nick = sender.nickname();
            receiver.deliver(format!("[PM from {sender_nick}]: {body}"));
            sender.deliver(format!("* To {receiver_nick}: {body}"));
            this.history
                .append(&HistoryScope::private(&sender_nick, &receiver_nick), Some(&sender_nick), &body)
                .await;
        });
    }

    pub async fn join_room(
        self: &Arc<Self>,
        room_name: String,
        session: Arc<dyn ChatTransport>,
    ) -> Result<RoomJoinOutcome, ChatCommandError> {
        if room_name.is_empty() || room_name.len() > 30 || room_name.chars().any(char::is_whitespace) {
            return Err(ChatCommandError::InvalidRoomName);
        }

        let this = self.clone();
        self.call(move || async move { this.join_room_locked(room_name, session) }).await
    }

    fn join_room_locked(
        self: &Arc<Self>,
        room_name: String,
        session: Arc<dyn ChatTransport>,
    ) -> Result<RoomJoinOutcome, ChatCommandError> {
        if let Some(previous) = session.current_room() {
            self.leave_room_locked(&previous, session.remote_id());
        }

        let mut rooms = self.rooms.lock().unwrap();
        let room = rooms
            .entry(room_name.clone())
            .or_insert_with(|| Room::new(room_name.clone(), self.room_capacity));

        if room.is_full() {
            return Err(ChatCommandError::RoomFull(room_name));
        }

        room.add(session.clone());
        let members = room.member_nicknames();
        session.set_current_room(Some(room_name));
        Ok(RoomJoinOutcome { members })
    }

    pub async fn leave_room(self: &Arc<Self>, session: Arc<dyn ChatTransport>) -> Option<String> {
        let this = self.clone();
        self.call(move || async move {
            let room_name = session.current_room()?;
            this.leave_room_locked(&room_name, session.remote_id());
            session.set_current_room(None);
            Some(room_name)
        })
        .await
    }

    /// Centralizes the nicknames-then-rooms lock order so it can't drift as
    /// call sites are added: every spot that needs both maps goes through
    /// here rather than taking the two mutexes by hand.
    fn with_both_locks<R>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Weak<dyn ChatTransport>>, &mut HashMap<String, Room>) -> R,
    ) -> R {
        let mut nicknames = self.nicknames.lock().unwrap();
        let mut rooms = self.rooms.lock().unwrap();
        f(&mut nicknames, &mut rooms)
    }

    fn leave_room_locked(self: &Arc<Self>, room_name: &str, remote_id: &str) {
        let mut rooms = self.rooms.lock().unwrap();
        if let Some(room) = rooms.get_mut(room_name) {
            room.remove(remote_id);
            if room.is_empty() {
                rooms.remove(room_name);
            }
        }
    }
}
