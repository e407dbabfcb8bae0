//! Per-session outbound state: a bounded queue plus the single-flight-write
//! flag. Owned by the session's serializer — see `session.rs::drain_queue`
//! for the write loop that drains it. `std::sync::Mutex` rather than an
//! async one since every access here is synchronous (push, peek, pop).

use std::collections::VecDeque;

pub struct OutboundQueue {
    queue: VecDeque<String>,
    capacity: usize,
    writing: bool,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity,
            writing: false,
        }
    }

    /// Returns `false` (dropping the message) if the queue is at capacity —
    /// "slow readers must not stall broadcasters".
    pub fn try_push(&mut self, msg: String) -> bool {
        if self.queue.len() >= self.capacity {
            return false;
        }
        self.queue.push_back(msg);
        true
    }

    /// `true` if a drain loop needs to be started; `false` if one is
    /// already running and will pick this message up.
    pub fn begin_write_if_idle(&mut self) -> bool {
        if self.writing {
            return false;
        }
        self.writing = true;
        true
    }

    pub fn front(&self) -> Option<String> {
        self.queue.front().cloned()
    }

    pub fn pop_front(&mut self) {
        self.queue.pop_front();
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn mark_idle(&mut self) {
        self.writing = false;
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_respects_capacity() {
        let mut q = OutboundQueue::new(2);
        assert!(q.try_push("a".into()));
        assert!(q.try_push("b".into()));
        assert!(!q.try_push("c".into()));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn begin_write_is_single_flight() {
        let mut q = OutboundQueue::new(10);
        assert!(q.begin_write_if_idle());
        assert!(!q.begin_write_if_idle());
        q.mark_idle();
        assert!(q.begin_write_if_idle());
    }

    #[test]
    fn messages_leave_only_via_pop_front() {
        let mut q = OutboundQueue::new(10);
        q.try_push("a".into());
        q.try_push("b".into());
        assert_eq!(q.front(), Some("a".to_string()));
        q.pop_front();
        assert_eq!(q.front(), Some("b".to_string()));
    }
}
