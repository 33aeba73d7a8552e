//! Sydney Chat - Streaming client for the Copilot (Sydney) chat service.
//!
//! This library establishes authenticated conversations against the
//! provider, opens a persistent streaming channel, sends questions, and
//! incrementally reconstructs the assistant's answer as it streams in.
//!
//! # Architecture
//!
//! The client follows the provider's two-phase shape:
//!
//! - **Handshake (HTTP)**: one GET creates a conversation and yields the
//!   signatures needed to open the stream
//! - **Exchange (WebSocket)**: one question is transmitted, then a
//!   framed sequence of JSON update/final frames streams back
//!
//! Key design principles:
//!
//! - Each [`Session`] owns: negotiated identifiers + one [`transport`] channel
//! - One exchange in flight per session, serialized by the exchange lock
//! - Frames republished on a single-slot channel (blocking backpressure)
//! - Answer variants are a tagged enum dispatched on the frame's `type`
//!
//! # Quick Start
//!
//! ```no_run
//! use sydney_chat::{ConversationStyle, DeltaTracker, Result, SessionStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Reads $BINGCHAT_COOKIE and $CONVERSATION_ENDPOINT
//!     let store = SessionStore::from_env()?;
//!     let session = store.get_or_create("chat").await?;
//!
//!     // Stream the answer as it arrives
//!     let mut wrapper = session.ask_async(ConversationStyle::Creative, "Hello!").await?;
//!     let worker = wrapper.take_worker().expect("fresh wrapper");
//!     tokio::spawn(worker.run());
//!
//!     let mut deltas = DeltaTracker::new();
//!     while let Some(_frame) = wrapper.next_frame().await {
//!         print!("{}", deltas.advance(wrapper.answer().text()));
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Endpoints, header bundle, environment overrides |
//! | [`credentials`] | Credential pool with least-used rotation |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`protocol`] | Frame formats and the answer model |
//! | [`session`] | Sessions, handshake, keyed storage |
//! | [`transport`] | Stream channel, worker loop, message wrapper |

// ============================================================================
// Modules
// ============================================================================

/// Session configuration: endpoints, header bundle, timeouts.
pub mod config;

/// Credential pool with least-used rotation.
pub mod credentials;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Stream protocol message types.
pub mod protocol;

/// Sessions and their storage.
pub mod session;

/// Stream transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::SessionConfig;

// Credentials
pub use credentials::{CookieRecord, CredentialPool, CredentialSet};

// Error types
pub use error::{Error, Result};

// Protocol types
pub use protocol::{Answer, ChatFinal, ChatMessage, ChatUpdate, ConversationStyle, Usage};

// Session types
pub use session::{SESSION_TTL, Session, SessionStore};

// Transport types
pub use transport::{DeltaTracker, MAX_MESSAGE_CHARS, MessageWrapper, StreamChannel, Worker};
