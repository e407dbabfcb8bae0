//! The `/`-prefixed command grammar (spec §4.6) plus plain-text broadcast.
//! Every reply — success or error — is delivered to the sender's own queue,
//! never written to the socket directly, so it goes through the same
//! ordering and backpressure rules as any other outbound message.

use std::sync::Arc;

use crate::error::ChatCommandError;

use super::hub::ChatHub;
use super::transport::ChatTransport;

const HELP_TEXT: &str = "\
Commands:
  /nick <name>       change your nickname
  /join <room>       join or create a room
  /leave [room]      leave your current room
  /users             list connected users
  /pm <nick> <body>  send a private message
  /help              show this text
  /quit              disconnect";

pub fn welcome_text(banner: &str) -> String {
    format!("* Welcome. Server: {banner}. Type /help for a list of commands.")
}

/// Returns `true` when the session should close (i.e. `/quit`).
pub async fn process_message(session: &Arc<dyn ChatTransport>, hub: &Arc<ChatHub>, text: &str) -> bool {
    let Some(rest) = text.strip_prefix('/') else {
        broadcast_plain_text(session, hub, text.to_string());
        return false;
    };

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next().unwrap_or("");
    let argument = parts.next().unwrap_or("").trim();

    match command {
        "nick" => handle_nick(session, hub, argument).await,
        "join" => handle_join(session, hub, argument).await,
        "leave" => handle_leave(session, hub).await,
        "users" => handle_users(session, hub).await,
        "pm" => handle_pm(session, hub, argument),
        "auth" => handle_auth(session, argument),
        "help" => {
            session.clone().deliver(HELP_TEXT.to_string());
            false
        }
        "quit" => {
            session.clone().deliver("* Goodbye.".to_string());
            true
        }
        other => {
            session.clone().deliver(format!("* Unknown command '/{other}'"));
            false
        }
    }
}

fn broadcast_plain_text(session: &Arc<dyn ChatTransport>, hub: &Arc<ChatHub>, body: String) {
    let nick = session.nickname();
    match session.current_room() {
        Some(room) => {
            let msg = format!("[{nick} @ {room}]: {body}");
            hub.broadcast_to_room(room, msg, Some(session.clone()));
        }
        None => {
            let msg = format!("[{nick}]: {body}");
            hub.broadcast(msg, Some(session.clone()));
        }
    }
}

async fn handle_nick(session: &Arc<dyn ChatTransport>, hub: &Arc<ChatHub>, name: &str) -> bool {
    let previous_nick = session.nickname();
    let already_has_this_name = previous_nick == name;
    let had_real_nickname = session_has_real_nickname(session);

    match hub.try_register_nickname(name.to_string(), session.clone()).await {
        Ok(()) => {
            session.clone().deliver(format!("* You are now known as {name}"));
            // A re-asserted nickname is a no-op: no rename, and no phantom join.
            if !already_has_this_name {
                if had_real_nickname {
                    hub.broadcast(format!("* '{previous_nick}' is now known as '{name}'"), None);
                } else {
                    hub.broadcast(format!("* 사용자 '{name}'님이 입장했습니다."), None);
                }
            }
            false
        }
        Err(e) => {
            session.clone().deliver(format!("* {e}"));
            false
        }
    }
}

fn session_has_real_nickname(session: &Arc<dyn ChatTransport>) -> bool {
    // `remote_id` is always the pre-`/nick` default; a session that never
    // changed its nickname still equals it.
    session.nickname() != session.remote_id()
}

async fn handle_join(session: &Arc<dyn ChatTransport>, hub: &Arc<ChatHub>, room: &str) -> bool {
    match hub.join_room(room.to_string(), session.clone()).await {
        Ok(outcome) => {
            let roster = outcome
                .members
                .iter()
                .map(|m| if m == &session.nickname() { format!("{m} (You)") } else { m.clone() })
                .collect::<Vec<_>>()
                .join(", ");
            session.clone().deliver(format!("* Joined '{room}'. Members: {roster}"));
            hub.broadcast_to_room(
                room.to_string(),
                format!("* {} joined the room", session.nickname()),
                Some(session.clone()),
            );
            false
        }
        Err(e) => {
            session.clone().deliver(format!("* {e}"));
            false
        }
    }
}

async fn handle_leave(session: &Arc<dyn ChatTransport>, hub: &Arc<ChatHub>) -> bool {
    match hub.leave_room(session.clone()).await {
        Some(room) => {
            hub.broadcast_to_room(room.clone(), format!("* {} left the room", session.nickname()), None);
            session.clone().deliver(format!("* Left '{room}'"));
        }
        None => {
            session.clone().deliver(format!("* {}", ChatCommandError::NotInRoom));
        }
    }
    false
}

async fn handle_users(session: &Arc<dyn ChatTransport>, hub: &Arc<ChatHub>) -> bool {
    let nick = session.nickname();
    let names = hub.get_user_list().await;
    let roster = names
        .iter()
        .map(|n| if n == &nick { format!("{n} (You)") } else { n.clone() })
        .collect::<Vec<_>>()
        .join(", ");
    session.clone().deliver(format!("* Users: {roster}"));
    false
}

fn handle_pm(session: &Arc<dyn ChatTransport>, hub: &Arc<ChatHub>, argument: &str) -> bool {
    let mut parts = argument.splitn(2, ' ');
    let recipient = parts.next().unwrap_or("");
    let body = parts.next().unwrap_or("").trim();

    if recipient.is_empty() || body.is_empty() {
        session.clone().deliver("* Usage: /pm <nick> <message>".to_string());
        return false;
    }

    hub.send_private(session.clone(), recipient.to_string(), body.to_string());
    false
}

fn handle_auth(session: &Arc<dyn ChatTransport>, argument: &str) -> bool {
    // Reserved: accepted but never required by any other command, per spec.
    let mut parts = argument.splitn(2, ' ');
    let user = parts.next().unwrap_or("");
    let pass = parts.next().unwrap_or("");

    const HARDCODED_USER: &str = "admin";
    const HARDCODED_PASS: &str = "changeme";

    if user == HARDCODED_USER && pass == HARDCODED_PASS {
        session.clone().deliver("* Authenticated.".to_string());
    } else {
        session.clone().deliver("* Authentication failed.".to_string());
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryStore;
    use crate::serializer::Serializer;
    use std::sync::Mutex;

    struct FakeSession {
        id: String,
        nick: Mutex<String>,
        room: Mutex<Option<String>>,
        serializer: Serializer,
        delivered: Arc<Mutex<Vec<String>>>,
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
            self.room.lock().unwrap().clone()
        }
        fn set_current_room(&self, room: Option<String>) {
            *self.room.lock().unwrap() = room;
        }
        fn serializer(&self) -> &Serializer {
            &self.serializer
        }
        fn is_stopped(&self) -> bool {
            false
        }
        fn deliver(self: Arc<Self>, msg: String) {
            self.delivered.lock().unwrap().push(msg);
        }
        fn request_stop(self: Arc<Self>) {}
    }

    fn fake(id: &str) -> (Arc<dyn ChatTransport>, Arc<Mutex<Vec<String>>>) {
        let (serializer, _join) = Serializer::spawn();
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let session = Arc::new(FakeSession {
            id: id.to_string(),
            nick: Mutex::new(id.to_string()),
            room: Mutex::new(None),
            serializer,
            delivered: delivered.clone(),
        });
        (session, delivered)
    }

    #[tokio::test]
    async fn nick_rejects_whitespace() {
        let hub = ChatHub::new(Arc::new(HistoryStore::new(None)), 100);
        let (session, inbox) = fake("r1");
        let quit = process_message(&session, &hub, "/nick bad name").await;
        assert!(!quit);
        assert!(inbox.lock().unwrap().iter().any(|m| m.contains("no whitespace")));
    }

    #[tokio::test]
    async fn unknown_command_is_reported_to_sender() {
        let hub = ChatHub::new(Arc::new(HistoryStore::new(None)), 100);
        let (session, inbox) = fake("r1");
        let quit = process_message(&session, &hub, "/frobnicate").await;
        assert!(!quit);
        assert!(inbox.lock().unwrap().iter().any(|m| m.contains("Unknown command")));
    }

    #[tokio::test]
    async fn quit_requests_session_close() {
        let hub = ChatHub::new(Arc::new(HistoryStore::new(None)), 100);
        let (session, _inbox) = fake("r1");
        assert!(process_message(&session, &hub, "/quit").await);
    }

    #[tokio::test]
    async fn pm_to_unknown_user_reports_error() {
        let hub = ChatHub::new(Arc::new(HistoryStore::new(None)), 100);
        let (session, inbox) = fake("r1");
        process_message(&session, &hub, "/pm ghost hello").await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(inbox.lock().unwrap().iter().any(|m| m.contains("No such user")));
    }

    #[tokio::test]
    async fn first_nick_broadcasts_a_join_notice() {
        let hub = ChatHub::new(Arc::new(HistoryStore::new(None)), 100);
        let (alice, _alice_inbox) = fake("r1");
        let (bystander, bystander_inbox) = fake("r2");
        hub.join(alice.clone()).await;
        hub.join(bystander.clone()).await;

        process_message(&alice, &hub, "/nick alice").await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(bystander_inbox
            .lock()
            .unwrap()
            .iter()
            .any(|m| m == "* 사용자 'alice'님이 입장했습니다."));
    }

    #[tokio::test]
    async fn renaming_an_established_nick_broadcasts_a_rename_notice() {
        let hub = ChatHub::new(Arc::new(HistoryStore::new(None)), 100);
        let (alice, _alice_inbox) = fake("r1");
        let (bystander, bystander_inbox) = fake("r2");
        hub.join(alice.clone()).await;
        hub.join(bystander.clone()).await;

        process_message(&alice, &hub, "/nick alice").await;
        process_message(&alice, &hub, "/nick alice2").await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // matches the testable shape: * '<contains alice>'<anything> 'alice2'
        assert!(bystander_inbox.lock().unwrap().iter().any(|m| {
            m.starts_with("* '") && m.contains("alice") && m.contains("'") && m.ends_with("'alice2'")
        }));
    }

    #[tokio::test]
    async fn reasserting_the_same_nick_broadcasts_nothing() {
        let hub = ChatHub::new(Arc::new(HistoryStore::new(None)), 100);
        let (alice, _alice_inbox) = fake("r1");
        let (bystander, bystander_inbox) = fake("r2");
        hub.join(alice.clone()).await;
        hub.join(bystander.clone()).await;

        process_message(&alice, &hub, "/nick alice").await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        bystander_inbox.lock().unwrap().clear();

        process_message(&alice, &hub, "/nick alice").await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(bystander_inbox.lock().unwrap().is_empty());
    }
}
