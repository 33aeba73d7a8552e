//! Stream protocol message types.
//!
//! This module defines the wire format spoken over the stream channel and
//! the handshake payloads around it.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | protocol negotiation | Client → Provider | once per connection |
//! | [`ChatRequest`] | Client → Provider | one question |
//! | [`Answer::Update`] | Provider → Client | cumulative partial answer |
//! | [`Answer::Final`] | Provider → Client | complete answer, terminal |
//! | [`Answer::Undefined`] | Provider → Client | anything else, forwarded |
//!
//! Every message is a JSON object terminated by the `0x1e` delimiter byte.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `answer` | Inbound frames and the answer sum type |
//! | `envelope` | Outbound frames, styles, handshake descriptor |

// ============================================================================
// Submodules
// ============================================================================

/// Inbound answer frames and the answer model.
pub mod answer;

/// Outbound frames and handshake payloads.
pub mod envelope;

// ============================================================================
// Re-exports
// ============================================================================

pub use answer::{
    AdaptiveCard, Answer, CardBlock, ChatFinal, ChatMessage, ChatUpdate, Feedback, FinalItem,
    ResultField, Suggestion, Throttling, Undefined, UpdateArgument, Usage, FRAME_DELIMITER,
    TYPE_FINAL, TYPE_UPDATE, decode_answer, truncate_frame,
};
pub use envelope::{
    ChatArgument, ChatRequest, ConversationDescriptor, ConversationStyle, HandshakeResult,
    OutboundMessage, PROTOCOL_FRAME, Participant, RESULT_SUCCESS, encode_frame,
};
