//! Stream channel: connection ownership and exchange serialization.
//!
//! A [`StreamChannel`] wraps one logical connection to the provider's
//! stream endpoint. It serializes exchanges through an exchange lock —
//! only one question may be in flight per channel — and manages the
//! physical connection slot shared with the worker: a healthy connection
//! is reused across exchanges, a broken one is discarded and redialed.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{Answer, ChatRequest, ConversationStyle, PROTOCOL_FRAME, encode_frame};

use super::worker::{ConnSlot, FramePump, Worker, WsStream};
use super::wrapper::MessageWrapper;

// ============================================================================
// Constants
// ============================================================================

/// Provider's hard limit on question length, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

// ============================================================================
// StreamChannel
// ============================================================================

/// The live streaming channel of one session.
///
/// Holds the conversation identifiers negotiated by the handshake; they
/// are immutable for the channel's lifetime.
///
/// # Concurrency
///
/// `send` acquires the exchange lock as an owned guard and hands it to
/// the exchange's [`Worker`], which releases it on every exit path. A
/// second `send` on the same channel blocks until the prior exchange
/// reaches its final frame or errors.
pub struct StreamChannel {
    /// Negotiated stream endpoint (includes the access token).
    endpoint: Url,

    /// Conversation id from the handshake.
    conversation_id: String,

    /// Client id from the handshake.
    client_id: String,

    /// Conversation signature from the handshake.
    signature: String,

    /// Exchange lock; held from `send` until terminal-frame-or-error.
    exchange: Arc<tokio::sync::Mutex<()>>,

    /// Physical connection slot, shared with the worker.
    conn: ConnSlot,

    /// Completed-send counter; the first exchange opens the session.
    exchanges: AtomicU64,
}

impl StreamChannel {
    /// Creates a channel for a negotiated conversation.
    pub(crate) fn new(
        endpoint: Url,
        conversation_id: impl Into<String>,
        client_id: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            endpoint,
            conversation_id: conversation_id.into(),
            client_id: client_id.into(),
            signature: signature.into(),
            exchange: Arc::new(tokio::sync::Mutex::new(())),
            conn: Arc::new(tokio::sync::Mutex::new(None)),
            exchanges: AtomicU64::new(0),
        }
    }

    /// Returns the negotiated stream endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Sends one question and returns its wrapper.
    ///
    /// Blocks while a prior exchange on this channel is in flight. The
    /// returned wrapper's worker has not been started; callers either
    /// take and spawn it ([`crate::Session::ask_async`]) or let
    /// [`crate::Session::ask_sync`] drive it.
    ///
    /// # Errors
    ///
    /// - [`Error::MessageTooLong`] before any network I/O
    /// - [`Error::WebSocket`] if dialing or transmitting fails
    pub async fn send(&self, style: ConversationStyle, message: &str) -> Result<MessageWrapper> {
        let length = message.chars().count();
        if length > MAX_MESSAGE_CHARS {
            return Err(Error::message_too_long(length, MAX_MESSAGE_CHARS));
        }

        // Serialize exchanges; the guard travels with the worker.
        let exchange_guard = Arc::clone(&self.exchange).lock_owned().await;

        let mut stream = {
            let mut slot = self.conn.lock().await;
            match slot.take() {
                Some(stream) => {
                    trace!("Reusing stream connection");
                    stream
                }
                None => Self::connect(&self.endpoint).await?,
            }
        };

        let first_exchange = self.exchanges.load(Ordering::SeqCst) == 0;
        let request = ChatRequest::new(
            style,
            message,
            &self.conversation_id,
            &self.client_id,
            &self.signature,
            first_exchange,
        );
        let frame = encode_frame(&request)?;

        stream.send(Message::Text(frame.into())).await?;
        self.exchanges.fetch_add(1, Ordering::SeqCst);

        debug!(
            conversation = %self.conversation_id,
            style = %style,
            chars = length,
            "Question transmitted"
        );

        let (frames_tx, frames_rx) = mpsc::channel(1);
        let answer = Arc::new(Mutex::new(Answer::default()));
        let terminal = Arc::new(AtomicBool::new(false));

        let pump = FramePump::new(frames_tx, Arc::clone(&answer), Arc::clone(&terminal));
        let worker = Worker::new(stream, pump, Arc::clone(&self.conn), exchange_guard);

        Ok(MessageWrapper::new(
            message.to_string(),
            frames_rx,
            answer,
            terminal,
            worker,
        ))
    }

    /// Dials the stream endpoint and negotiates the frame protocol.
    async fn connect(endpoint: &Url) -> Result<WsStream> {
        debug!(endpoint = %endpoint.host_str().unwrap_or_default(), "Dialing stream endpoint");

        let (mut stream, response) = connect_async(endpoint.as_str()).await?;
        trace!(status = %response.status(), "Stream connection established");

        stream.send(Message::Text(PROTOCOL_FRAME.into())).await?;

        // The provider acknowledges negotiation with an empty object frame.
        match stream.next().await {
            Some(Ok(_)) => trace!("Protocol negotiation acknowledged"),
            Some(Err(e)) => return Err(e.into()),
            None => return Err(Error::ConnectionClosed),
        }

        Ok(stream)
    }
}

impl fmt::Debug for StreamChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamChannel")
            .field("conversation_id", &self.conversation_id)
            .field("exchanges", &self.exchanges.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> StreamChannel {
        StreamChannel::new(
            Url::parse("wss://localhost:1/sydney/ChatHub?sec_access_token=t").expect("url"),
            "conv-1",
            "client-1",
            "sig-1",
        )
    }

    #[tokio::test]
    async fn test_too_long_message_rejected_without_io() {
        let channel = channel();
        let message = "x".repeat(MAX_MESSAGE_CHARS + 1);

        // The endpoint is unreachable; reaching I/O would yield a
        // WebSocket error instead of MessageTooLong.
        let result = channel.send(ConversationStyle::Creative, &message).await;
        assert!(matches!(
            result,
            Err(Error::MessageTooLong {
                length,
                max: MAX_MESSAGE_CHARS
            }) if length == MAX_MESSAGE_CHARS + 1
        ));
    }

    #[tokio::test]
    async fn test_limit_counts_characters_not_bytes() {
        let channel = channel();

        // 2000 two-byte scalars: 4000 bytes but exactly at the limit,
        // so the length check passes and the unreachable endpoint fails.
        let message = "é".repeat(MAX_MESSAGE_CHARS);
        let result = channel.send(ConversationStyle::Precise, &message).await;
        assert!(!matches!(result, Err(Error::MessageTooLong { .. })));
        assert!(result.is_err());
    }

    #[test]
    fn test_endpoint_accessor() {
        let channel = channel();
        assert_eq!(channel.endpoint().scheme(), "wss");
    }
}
