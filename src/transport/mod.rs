//! Stream transport layer.
//!
//! This module owns the live connection to the provider's stream
//! endpoint and everything that moves across it during an exchange.
//!
//! # Exchange Lifecycle
//!
//! 1. [`StreamChannel::send`] — acquire the exchange lock, reuse or dial
//!    the connection, transmit the chat request
//! 2. [`Worker::run`] — read frames, update the answer snapshot, publish
//!    raw frames with blocking backpressure
//! 3. Final frame — terminal flag set, channel closed, connection
//!    returned for reuse, exchange lock released
//!
//! On a mid-exchange error the lock is still released and the broken
//! connection discarded; the session stays usable.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `channel` | Stream channel and exchange serialization |
//! | `worker` | Per-exchange read loop and frame state machine |
//! | `wrapper` | Message wrapper and delta tracking |

// ============================================================================
// Submodules
// ============================================================================

/// Stream channel: connection ownership and exchange serialization.
pub mod channel;

/// Per-exchange read loop and frame state machine.
pub mod worker;

/// Message wrapper and incremental delta tracking.
pub mod wrapper;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{MAX_MESSAGE_CHARS, StreamChannel};
pub use worker::Worker;
pub use wrapper::{DeltaTracker, MessageWrapper};
