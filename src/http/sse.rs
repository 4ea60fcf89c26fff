//! Server-Sent-Events transport
//!
//! Each `GET` on the SSE route opens a session with its own outbound queue. Clients post
//! messages back tagged with their session id; everything posted lands in one shared
//! inbound queue that [`Transport::recv`] drains. Replies find their session again through
//! the `session` metadata the inbound message carried.

use std::{
    collections::HashMap,
    pin::Pin,
    sync::{Arc, PoisonError, RwLock},
    task::{Context, Poll},
};

use async_trait::async_trait;
use futures::stream::Stream;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{errors::RpcError, mcp::rpc::Message, transport::Transport};

/// Metadata key naming the session a message belongs to.
pub const SESSION_KEY: &str = "session";

const QUEUE_CAPACITY: usize = 64;

pub struct SseTransport {
    sessions: RwLock<HashMap<String, mpsc::Sender<Message>>>,
    inbound_tx: mpsc::Sender<Message>,
    inbound_rx: Mutex<mpsc::Receiver<Message>>,
}

impl Default for SseTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SseTransport {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            sessions: RwLock::new(HashMap::new()),
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
        }
    }

    /// Registers a new session and returns its id plus the queue its stream drains.
    pub fn open_session(&self) -> (String, mpsc::Receiver<Message>) {
        let id = Uuid::new_v4().to_string();
        let (outbound_tx, outbound_rx) = mpsc::channel(QUEUE_CAPACITY);
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), outbound_tx);
        info!(session_id = %id, "sse session opened");
        (id, outbound_rx)
    }

    /// Opens a session whose lifetime is tied to the returned stream.
    pub fn stream_session(self: &Arc<Self>) -> SessionStream {
        let (id, outbound) = self.open_session();
        SessionStream {
            id,
            outbound: ReceiverStream::new(outbound),
            transport: Arc::clone(self),
        }
    }

    pub fn has_session(&self, id: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn close_session(&self, id: &str) {
        if self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
        {
            info!(session_id = %id, "sse session closed");
        }
    }

    /// Queues a client-posted message for `recv`, tagged with its session.
    pub async fn push(&self, session_id: &str, mut message: Message) -> Result<(), RpcError> {
        message
            .metadata
            .insert(SESSION_KEY.to_string(), session_id.to_string());
        self.inbound_tx
            .send(message)
            .await
            .map_err(|_| RpcError::Closed)
    }
}

/// Outbound messages of one session. Dropping it closes the session.
pub struct SessionStream {
    id: String,
    outbound: ReceiverStream<Message>,
    transport: Arc<SseTransport>,
}

impl SessionStream {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Stream for SessionStream {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        Pin::new(&mut self.outbound).poll_next(cx)
    }
}

impl Drop for SessionStream {
    fn drop(&mut self) {
        self.transport.close_session(&self.id);
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn recv(&self) -> Result<Message, RpcError> {
        self.inbound_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(RpcError::Closed)
    }

    async fn send(&self, message: Message) -> Result<(), RpcError> {
        let session_id = message
            .metadata
            .get(SESSION_KEY)
            .filter(|id| !id.is_empty())
            .cloned()
            .ok_or_else(|| RpcError::transport("message carries no sse session"))?;

        let outbound = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&session_id)
            .cloned()
            .ok_or_else(|| RpcError::transport(format!("sse session {session_id} not found")))?;

        if outbound.send(message).await.is_err() {
            debug!(session_id = %session_id, "sse stream went away");
            self.close_session(&session_id);
            return Err(RpcError::transport(format!("sse session {session_id} closed")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn pushed_messages_carry_their_session() {
        let transport = SseTransport::new();
        let (session_id, _outbound) = transport.open_session();

        transport
            .push(&session_id, Message::request(1u64, "ping", json!({})))
            .await
            .expect("push");

        let message = transport.recv().await.expect("recv");
        assert_eq!(message.metadata.get(SESSION_KEY), Some(&session_id));
    }

    #[tokio::test]
    async fn send_routes_by_session_metadata() {
        let transport = SseTransport::new();
        let (first, mut first_out) = transport.open_session();
        let (_second, mut second_out) = transport.open_session();

        let mut reply = Message::request(1u64, "ping", json!({})).reply_with_result(json!({}));
        reply.metadata.insert(SESSION_KEY.to_string(), first);
        transport.send(reply).await.expect("send");

        assert!(first_out.recv().await.is_some());
        assert!(second_out.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_without_session_fails() {
        let transport = SseTransport::new();

        let err = transport
            .send(Message::notification("notifications/message", json!({})))
            .await
            .expect_err("no session");
        assert!(matches!(err, RpcError::Transport(_)));
    }

    #[tokio::test]
    async fn dropped_stream_forgets_its_session() {
        let transport = SseTransport::new();
        let (session_id, outbound) = transport.open_session();
        drop(outbound);

        let mut message = Message::notification("notifications/message", json!({}));
        message
            .metadata
            .insert(SESSION_KEY.to_string(), session_id.clone());

        transport.send(message).await.expect_err("stream gone");
        assert!(!transport.has_session(&session_id));
        assert_eq!(transport.session_count(), 0);
    }

    #[tokio::test]
    async fn session_stream_closes_its_session_when_dropped() {
        let transport = Arc::new(SseTransport::new());
        let mut stream = transport.stream_session();
        let session_id = stream.id().to_string();
        assert!(transport.has_session(&session_id));

        let mut message = Message::notification("notifications/message", json!({}));
        message
            .metadata
            .insert(SESSION_KEY.to_string(), session_id.clone());
        transport.send(message).await.expect("send");
        let delivered = stream.next().await.expect("queued message");
        assert_eq!(delivered.method.as_deref(), Some("notifications/message"));

        drop(stream);
        assert!(!transport.has_session(&session_id));
        assert_eq!(transport.session_count(), 0);
    }
}
