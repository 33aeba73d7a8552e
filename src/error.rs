//! Error types for the Sydney chat client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use sydney_chat::{Result, SessionStore};
//!
//! async fn example(store: &SessionStore) -> Result<()> {
//!     let session = store.get_or_create("chat").await?;
//!     let wrapper = session.ask_sync(Default::default(), "hello").await?;
//!     println!("{}", wrapper.answer().text());
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Credentials | [`Error::Credentials`] |
//! | Handshake | [`Error::Handshake`], [`Error::HandshakeStatus`], [`Error::Unauthorized`] |
//! | Asking | [`Error::MessageTooLong`] |
//! | Streaming | [`Error::Stream`], [`Error::ConnectionClosed`] |
//! | Store | [`Error::SessionNotFound`], [`Error::SessionExpired`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Http`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Credential Errors
    // ========================================================================
    /// Credential source is missing or corrupt.
    ///
    /// Returned at pool construction when the cookie file cannot be read
    /// or does not contain a JSON array of cookie records, and at
    /// selection time when the pool is empty.
    #[error("Credential error: {message}")]
    Credentials {
        /// Description of the credential failure.
        message: String,
    },

    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// Conversation handshake failed.
    ///
    /// Returned when the handshake response body cannot be decoded into
    /// the expected conversation descriptor.
    #[error("Handshake failed: {message}")]
    Handshake {
        /// Description of the handshake failure.
        message: String,
    },

    /// Conversation handshake returned a non-200 status.
    #[error("Handshake returned status {status}")]
    HandshakeStatus {
        /// HTTP status code of the handshake response.
        status: u16,
    },

    /// Provider reported a non-success result for this conversation.
    ///
    /// The handshake succeeded transport-wise, but the session cannot be
    /// used for asking questions.
    #[error("Provider rejected the conversation: {value}")]
    Unauthorized {
        /// The provider's result value (e.g. `UnauthorizedRequest`).
        value: String,
    },

    // ========================================================================
    // Ask Errors
    // ========================================================================
    /// Question exceeds the provider's message length limit.
    ///
    /// Rejected before any network I/O.
    #[error("Message too long: {length} characters, max {max}")]
    MessageTooLong {
        /// Character count of the rejected message.
        length: usize,
        /// Maximum allowed character count.
        max: usize,
    },

    // ========================================================================
    // Stream Errors
    // ========================================================================
    /// Read or decode failure mid-exchange.
    ///
    /// Terminates the current exchange only; the session stays usable
    /// for subsequent asks over a fresh connection.
    #[error("Stream error: {message}")]
    Stream {
        /// Description of the stream failure.
        message: String,
    },

    /// Stream connection closed before a final frame was observed.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Store Errors
    // ========================================================================
    /// No session registered under the given key.
    #[error("Session not found: {key}")]
    SessionNotFound {
        /// The missing session key.
        key: String,
    },

    /// Session found but past its time-to-live; it has been evicted.
    #[error("Session expired: {key}")]
    SessionExpired {
        /// Key of the evicted session.
        key: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a credential error.
    #[inline]
    pub fn credentials(message: impl Into<String>) -> Self {
        Self::Credentials {
            message: message.into(),
        }
    }

    /// Creates a handshake error.
    #[inline]
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Creates a handshake status error.
    #[inline]
    pub fn handshake_status(status: u16) -> Self {
        Self::HandshakeStatus { status }
    }

    /// Creates an unauthorized error from the provider's result value.
    #[inline]
    pub fn unauthorized(value: impl Into<String>) -> Self {
        Self::Unauthorized {
            value: value.into(),
        }
    }

    /// Creates a message-too-long error.
    #[inline]
    pub fn message_too_long(length: usize, max: usize) -> Self {
        Self::MessageTooLong { length, max }
    }

    /// Creates a stream error.
    #[inline]
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }

    /// Creates a session-not-found error.
    #[inline]
    pub fn session_not_found(key: impl Into<String>) -> Self {
        Self::SessionNotFound { key: key.into() }
    }

    /// Creates a session-expired error.
    #[inline]
    pub fn session_expired(key: impl Into<String>) -> Self {
        Self::SessionExpired { key: key.into() }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a stream-level error.
    ///
    /// Stream errors abort the current exchange but leave the session
    /// usable for subsequent asks.
    #[inline]
    #[must_use]
    pub fn is_stream_error(&self) -> bool {
        matches!(
            self,
            Self::Stream { .. } | Self::ConnectionClosed | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is a store-level session error.
    ///
    /// Both variants are recoverable by creating a new session under the
    /// same key.
    #[inline]
    #[must_use]
    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound { .. } | Self::SessionExpired { .. }
        )
    }

    /// Returns `true` if this error is recoverable without operator help.
    ///
    /// Recoverable errors may succeed on a retried ask or a fresh session.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.is_stream_error() || self.is_session_error()
    }
}

// ============================================================================
// Tests
// ============================================================================
