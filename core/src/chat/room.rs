//! A named room: a capacity-bounded member list. Rooms live inside
//! `ChatHub`'s rooms map and are created on first `/join` and deleted once
//! empty.

use std::sync::Arc;

use super::transport::ChatTransport;

pub struct Room {
    name: String,
    members: Vec<Arc<dyn ChatTransport>>,
    capacity: usize,
}

impl Room {
    pub fn new(name: String, capacity: usize) -> Self {
        Self {
            name,
            members: Vec::new(),
            capacity,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn add(&mut self, session: Arc<dyn ChatTransport>) {
        self.members.push(session);
    }

    pub fn remove(&mut self, remote_id: &str) {
        self.members.retain(|m| m.remote_id() != remote_id);
    }

    /// A stable snapshot for the hub to iterate while posting deliveries —
    /// broadcasting never holds the rooms mutex while touching a member's
    /// own serializer.
    pub fn members_snapshot(&self) -> Vec<Arc<dyn ChatTransport>> {
        self.members.clone()
    }

    pub fn member_nicknames(&self) -> Vec<String> {
        self.members.iter().map(|m| m.nickname()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::Serializer;
    use std::sync::Mutex;

    struct FakeSession {
        id: String,
        nick: Mutex<String>,
        serializer: Serializer,
    }

    impl ChatTransport for FakeSession {
        fn remote_id(&self) -> &str {
            &self.id
        }
        fn nickname(&self) -> String {
            self.nick.lock().unwrap().clone()
        }
        fn set_nickname(&self, name: String) {
            *self.nick.lock().unwrap() = name;
        }
        fn current_room(&self) -> Option<String> {
            None
        }
        fn set_current_room(&self, _room: Option<String>) {}
        fn serializer(&self) -> &Serializer {
            &self.serializer
        }
        fn is_stopped(&self) -> bool {
            false
        }
        fn deliver(self: Arc<Self>, _msg: String) {}
        fn request_stop(self: Arc<Self>) {}
    }

    fn fake(id: &str) -> Arc<dyn ChatTransport> {
        let (serializer, _join) = Serializer::spawn();
        Arc::new(FakeSession {
            id: id.to_string(),
            nick: Mutex::new(id.to_string()),
            serializer,
        })
    }

    #[test]
    fn capacity_is_enforced() {
        let mut room = Room::new("lobby".into(), 2);
        room.add(fake("a"));
        assert!(!room.is_full());
        room.add(fake("b"));
        assert!(room.is_full());
    }

    #[test]
    fn remove_empties_the_room() {
        let mut room = Room::new("lobby".into(), 10);
        room.add(fake("a"));
        assert!(!room.is_empty());
        room.remove("a");
        assert!(room.is_empty());
    }
}
