//! Session lifecycle: handshake, asking, expiry.
//!
//! A [`Session`] is one authenticated conversation with the provider. It
//! is created by a single HTTP handshake that yields the conversation
//! identifiers and signatures, after which the negotiated stream endpoint
//! is immutable. Sessions expire 120 minutes after creation and are
//! evicted lazily by the [`super::SessionStore`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use url::Url;

use crate::config::SessionConfig;
use crate::credentials::CredentialPool;
use crate::error::{Error, Result};
use crate::protocol::{ConversationDescriptor, ConversationStyle};
use crate::transport::{MessageWrapper, StreamChannel};

// ============================================================================
// Constants
// ============================================================================

/// Session time-to-live after creation.
pub const SESSION_TTL: Duration = Duration::from_secs(120 * 60);

/// Response header carrying the conversation signature.
const SIGNATURE_HEADER: &str = "X-Sydney-Conversationsignature";

/// Response header carrying the encrypted signature used as the stream
/// access token.
const ENCRYPTED_SIGNATURE_HEADER: &str = "X-Sydney-Encryptedconversationsignature";

/// Query parameter carrying the access token on the stream endpoint.
const ACCESS_TOKEN_PARAM: &str = "sec_access_token";

// ============================================================================
// Session
// ============================================================================

/// One authenticated conversation with the provider.
///
/// Either fully initialized or not created at all; a failed handshake
/// never leaves a partially-built session behind.
///
/// # Example
///
/// ```ignore
/// let session = Session::create("chat", &config, &pool).await?;
/// let wrapper = session.ask_sync(ConversationStyle::Creative, "hello").await?;
/// println!("{}", wrapper.answer().text());
/// ```
pub struct Session {
    /// Identity key this session is stored under.
    key: String,

    /// Conversation descriptor from the handshake body.
    descriptor: ConversationDescriptor,

    /// Conversation signature, header value preferred over the body's.
    signature: String,

    /// Negotiated stream endpoint including the access token.
    stream_endpoint: Url,

    /// Creation time.
    created_at: Instant,

    /// Eviction deadline; `created_at` + [`SESSION_TTL`].
    expires_at: Instant,

    /// The session's streaming channel.
    channel: StreamChannel,
}

// ============================================================================
// Session - Handshake
// ============================================================================

impl Session {
    /// Creates a session by performing the conversation handshake.
    ///
    /// Selects the least-used credential set, issues the handshake GET
    /// with the fixed fingerprint headers and the credentials as cookies,
    /// extracts the signatures from the response headers, and builds the
    /// stream endpoint.
    ///
    /// A handshake whose `result.value` is not `"Success"` still yields a
    /// session, but every ask on it fails with [`Error::Unauthorized`]
    /// before any network I/O.
    ///
    /// # Errors
    ///
    /// - [`Error::Credentials`] if no credential set can be selected
    /// - [`Error::HandshakeStatus`] on a non-200 response
    /// - [`Error::Handshake`] if the body is not a conversation descriptor
    /// - [`Error::Http`] on transport failure
    pub async fn create(
        key: impl Into<String>,
        config: &SessionConfig,
        pool: &CredentialPool,
    ) -> Result<Self> {
        let key = key.into();
        let credentials = pool.select()?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let mut request = client.get(config.conversation_url.clone());
        for (name, value) in &config.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request = request.header("Cookie", credentials.cookie_header());

        let response = request.send().await?;
        let status = response.status();
        if status.as_u16() != 200 {
            return Err(Error::handshake_status(status.as_u16()));
        }

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let signature_header = header(SIGNATURE_HEADER);
        let access_token = header(ENCRYPTED_SIGNATURE_HEADER);

        let body = response.bytes().await?;
        let descriptor: ConversationDescriptor = serde_json::from_slice(&body).map_err(|e| {
            Error::handshake(format!("response body is not a conversation descriptor: {e}"))
        })?;

        let signature = signature_header
            .or_else(|| descriptor.conversation_signature.clone())
            .unwrap_or_default();

        let mut stream_endpoint = config.stream_url.clone();
        if let Some(token) = &access_token {
            stream_endpoint
                .query_pairs_mut()
                .append_pair(ACCESS_TOKEN_PARAM, token);
        }

        if descriptor.result.is_success() {
            info!(
                key = %key,
                conversation = %descriptor.conversation_id,
                "New conversation negotiated"
            );
        } else {
            warn!(
                key = %key,
                value = %descriptor.result.value,
                message = descriptor.result.message.as_deref().unwrap_or_default(),
                "Provider rejected the conversation; asks will fail"
            );
        }

        let channel = StreamChannel::new(
            stream_endpoint.clone(),
            descriptor.conversation_id.as_str(),
            descriptor.client_id.as_str(),
            signature.as_str(),
        );

        let created_at = Instant::now();
        Ok(Self {
            key,
            descriptor,
            signature,
            stream_endpoint,
            created_at,
            expires_at: created_at + SESSION_TTL,
            channel,
        })
    }
}

// ============================================================================
// Session - Asking
// ============================================================================

impl Session {
    /// Sends a question and returns its wrapper without starting the
    /// worker.
    ///
    /// The caller takes the worker with
    /// [`MessageWrapper::take_worker`] and spawns it, then drains the
    /// wrapper's channel until it closes.
    ///
    /// # Errors
    ///
    /// - [`Error::Unauthorized`] if the handshake result was not success
    /// - [`Error::MessageTooLong`] for questions over 2000 characters
    /// - [`Error::WebSocket`] if the stream connection fails
    pub async fn ask_async(
        &self,
        style: ConversationStyle,
        message: &str,
    ) -> Result<MessageWrapper> {
        self.ensure_authorized()?;

        debug!(key = %self.key, chars = message.chars().count(), "New ask");
        self.channel.send(style, message).await
    }

    /// Sends a question and drives the exchange to completion.
    ///
    /// Spawns the worker internally and drains the frame channel until
    /// the terminal flag is observed or the channel closes; update and
    /// undefined frames never cause an early return.
    ///
    /// # Errors
    ///
    /// Everything [`Session::ask_async`] returns, plus any worker error
    /// ([`Error::ConnectionClosed`], [`Error::WebSocket`],
    /// [`Error::Json`]) when the exchange ends without a final frame.
    pub async fn ask_sync(
        &self,
        style: ConversationStyle,
        message: &str,
    ) -> Result<MessageWrapper> {
        let mut wrapper = self.ask_async(style, message).await?;

        let worker = wrapper
            .take_worker()
            .ok_or_else(|| Error::stream("exchange worker already taken"))?;
        let handle = tokio::spawn(worker.run());

        while let Some(_frame) = wrapper.next_frame().await {
            if wrapper.is_final() {
                break;
            }
        }

        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(e) => return Err(Error::stream(format!("exchange worker panicked: {e}"))),
        }

        if !wrapper.is_final() {
            // Worker finished without error or a final frame; the
            // connection must have gone away between frames.
            return Err(Error::ConnectionClosed);
        }

        debug!(key = %self.key, "Exchange complete");
        Ok(wrapper)
    }

    /// Rejects asks on a conversation the provider did not accept.
    fn ensure_authorized(&self) -> Result<()> {
        if self.descriptor.result.is_success() {
            Ok(())
        } else {
            Err(Error::unauthorized(self.descriptor.result.value.as_str()))
        }
    }
}

// ============================================================================
// Session - Accessors
// ============================================================================

impl Session {
    /// Returns the identity key of this session.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the conversation id.
    #[inline]
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.descriptor.conversation_id
    }

    /// Returns the client id.
    #[inline]
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.descriptor.client_id
    }

    /// Returns the conversation signature.
    #[inline]
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Returns the negotiated stream endpoint.
    #[inline]
    #[must_use]
    pub fn stream_endpoint(&self) -> &Url {
        &self.stream_endpoint
    }

    /// Returns the provider's handshake result value.
    #[inline]
    #[must_use]
    pub fn result_value(&self) -> &str {
        &self.descriptor.result.value
    }

    /// Returns `true` if the provider accepted the conversation.
    #[inline]
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.descriptor.result.is_success()
    }

    /// Returns the creation time.
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Returns the eviction deadline.
    #[inline]
    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Returns `true` once the session has outlived its TTL.
    #[inline]
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("conversation_id", &self.descriptor.conversation_id)
            .field("authorized", &self.is_authorized())
            .field("expired", &self.is_expired())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Test Support
// ============================================================================

#[cfg(test)]
impl Session {
    /// Builds a session without a handshake, for store and ask-path
    /// tests. The stream endpoint is unreachable on purpose.
    pub(crate) fn stub(key: &str, result_value: &str, ttl: Duration) -> Self {
        use crate::protocol::HandshakeResult;

        let endpoint = Url::parse("wss://localhost:9/sydney/ChatHub").expect("stub url");
        let descriptor = ConversationDescriptor {
            conversation_id: "conv-stub".to_string(),
            client_id: "client-stub".to_string(),
            conversation_signature: None,
            result: HandshakeResult {
                value: result_value.to_string(),
                message: None,
            },
        };

        let channel = StreamChannel::new(
            endpoint.clone(),
            descriptor.conversation_id.as_str(),
            descriptor.client_id.as_str(),
            "sig-stub",
        );

        let created_at = Instant::now();
        Self {
            key: key.to_string(),
            descriptor,
            signature: "sig-stub".to_string(),
            stream_endpoint: endpoint,
            created_at,
            expires_at: created_at + ttl,
            channel,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::RESULT_SUCCESS;
    use crate::transport::MAX_MESSAGE_CHARS;

    #[test]
    fn test_expiry_uses_ttl() {
        let session = Session::stub("chat", RESULT_SUCCESS, SESSION_TTL);
        assert!(!session.is_expired());
        assert_eq!(session.expires_at() - session.created_at(), SESSION_TTL);
    }

    #[test]
    fn test_zero_ttl_is_expired() {
        let session = Session::stub("chat", RESULT_SUCCESS, Duration::ZERO);
        assert!(session.is_expired());
    }

    #[tokio::test]
    async fn test_unauthorized_session_rejects_ask_async() {
        let session = Session::stub("chat", "UnauthorizedRequest", SESSION_TTL);
        assert!(!session.is_authorized());

        let result = session.ask_async(ConversationStyle::Creative, "hello").await;
        assert!(matches!(
            result,
            Err(Error::Unauthorized { value }) if value == "UnauthorizedRequest"
        ));
    }

    #[tokio::test]
    async fn test_unauthorized_session_rejects_ask_sync() {
        let session = Session::stub("chat", "Forbidden", SESSION_TTL);

        let result = session.ask_sync(ConversationStyle::Balanced, "hello").await;
        assert!(matches!(result, Err(Error::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn test_sync_path_rejects_long_message_before_io() {
        let session = Session::stub("chat", RESULT_SUCCESS, SESSION_TTL);
        let message = "y".repeat(MAX_MESSAGE_CHARS + 5);

        // The stub endpoint is unreachable; MessageTooLong proves the
        // check fired before any dial attempt.
        let result = session.ask_sync(ConversationStyle::Precise, &message).await;
        assert!(matches!(result, Err(Error::MessageTooLong { .. })));
    }

    #[test]
    fn test_accessors() {
        let session = Session::stub("chat", RESULT_SUCCESS, SESSION_TTL);
        assert_eq!(session.key(), "chat");
        assert_eq!(session.conversation_id(), "conv-stub");
        assert_eq!(session.client_id(), "client-stub");
        assert_eq!(session.signature(), "sig-stub");
        assert_eq!(session.result_value(), RESULT_SUCCESS);
        assert_eq!(session.stream_endpoint().scheme(), "wss");
    }
}
