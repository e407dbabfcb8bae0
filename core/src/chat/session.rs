//! The `ChatSession` actor: owns one accepted WebSocket connection from
//! handshake through close, generic over the underlying stream so a single
//! implementation serves both the plain and TLS-wrapped listeners (spec's
//! `PlainChatSession` / `TlsChatSession`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;

use crate::config::Config;
use crate::serializer::Serializer;

use super::commands::{process_message, welcome_text};
use super::hub::ChatHub;
use super::outbound::OutboundQueue;
use super::transport::{ChatTransport, SessionIdentity};

type Sink<S> = SplitSink<WebSocketStream<S>, Message>;

/// The concrete session type. `PlainChatSession` and `TlsChatSession` are
/// just names for this generalized over `tokio::net::TcpStream` and
/// `tokio_rustls::server::TlsStream<tokio::net::TcpStream>` respectively —
/// see the aliases below.
pub struct ChatSessionImpl<S> {
    identity: SessionIdentity,
    serializer: Serializer,
    outbound: std::sync::Mutex<OutboundQueue>,
    sink: AsyncMutex<Option<Sink<S>>>,
    stopped: AtomicBool,
}

pub type PlainChatSession = ChatSessionImpl<tokio::net::TcpStream>;
pub type TlsChatSession = ChatSessionImpl<tokio_rustls::server::TlsStream<tokio::net::TcpStream>>;

impl<S> ChatTransport for ChatSessionImpl<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn remote_id(&self) -> &str {
        &self.identity.remote_id
    }

    fn nickname(&self) -> String {
        self.identity.nickname()
    }

    fn set_nickname(&self, name: String) {
        self.identity.set_nickname(name);
    }

    fn current_room(&self) -> Option<String> {
        self.identity.current_room()
    }

    fn set_current_room(&self, room: Option<String>) {
        self.identity.set_current_room(room);
    }

    fn serializer(&self) -> &Serializer {
        &self.serializer
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn deliver(self: Arc<Self>, msg: String) {
        let this = self.clone();
        self.serializer.post(move || async move {
            this.handle_deliver(msg).await;
        });
    }

    fn request_stop(self: Arc<Self>) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = self.clone();
        self.serializer.post(move || async move {
            this.outbound.lock().unwrap().clear();
            if let Some(mut sink) = this.sink.lock().await.take() {
                let _ = sink.close().await;
            }
        });
    }
}

impl<S> ChatSessionImpl<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Runs on the session's own serializer (always — `deliver` only ever
    /// posts this). Pushes onto the bounded queue and, if no drain loop is
    /// already running, starts one: at most one outstanding write at a
    /// time, and a message leaves the queue only once its write succeeds.
    async fn handle_deliver(self: Arc<Self>, msg: String) {
        if self.is_stopped() {
            return;
        }

        let should_drain = {
            let mut queue = self.outbound.lock().unwrap();
            if !queue.try_push(msg) {
                tracing::warn!(remote_id = %self.identity.remote_id, "outbound queue full, dropping message");
                return;
            }
            queue.begin_write_if_idle()
        };

        if should_drain {
            self.drain_queue().await;
        }
    }

    async fn drain_queue(self: Arc<Self>) {
        loop {
            let next = { self.outbound.lock().unwrap().front() };
            let Some(msg) = next else {
                self.outbound.lock().unwrap().mark_idle();
                return;
            };
            if self.is_stopped() {
                self.outbound.lock().unwrap().clear();
                return;
            }

            let write_result = {
                let mut guard = self.sink.lock().await;
                match guard.as_mut() {
                    Some(sink) => sink.send(Message::Text(msg.clone().into())).await,
                    None => return,
                }
            };

            match write_result {
                Ok(()) => {
                    self.outbound.lock().unwrap().pop_front();
                }
                Err(e) => {
                    tracing::warn!(remote_id = %self.identity.remote_id, error = %e, "write failed, closing session");
                    self.outbound.lock().unwrap().clear();
                    self.clone().request_stop();
                    return;
                }
            }
        }
    }
}

/// Drives one accepted connection from WebSocket handshake through close.
/// `banner` is the `Server:` string advertised in the welcome text — plain
/// or `(WSS)`, matching which listener accepted the socket.
pub async fn run_session<S>(
    socket: S,
    remote_id: String,
    hub: Arc<ChatHub>,
    config: Arc<Config>,
    banner: &'static str,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ws = tokio_tungstenite::accept_async(socket).await?;
    let (sink, mut stream) = ws.split();
    let (serializer, _join) = Serializer::spawn();

    let session = Arc::new(ChatSessionImpl {
        identity: SessionIdentity::new(remote_id.clone()),
        serializer,
        outbound: std::sync::Mutex::new(OutboundQueue::new(config.chat_queue_capacity)),
        sink: AsyncMutex::new(Some(sink)),
        stopped: AtomicBool::new(false),
    });
    let session: Arc<dyn ChatTransport> = session;

    hub.join(session.clone()).await;
    session.clone().deliver(welcome_text(banner));
    tracing::info!(remote_id = %remote_id, "chat session registered");

    loop {
        let next = tokio::time::timeout(config.chat_idle_timeout, stream.next()).await;
        let message = match next {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(e))) => {
                tracing::debug!(remote_id = %remote_id, error = %e, "read error, closing session");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                tracing::debug!(remote_id = %remote_id, "idle timeout, closing session");
                break;
            }
        };

        match message {
            Message::Text(text) => {
                let should_quit = process_message(&session, &hub, text.as_str()).await;
                if should_quit {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }

        if session.is_stopped() {
            break;
        }
    }

    hub.leave(session.clone()).await;
    session.request_stop();
    Ok(())
}
