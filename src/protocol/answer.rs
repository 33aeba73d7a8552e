//! Inbound answer frames and the answer model.
//!
//! Frames arrive as raw bytes holding a JSON object terminated by the
//! `0x1e` delimiter. The numeric `type` field selects the variant:
//!
//! | `type` | Variant | Terminal |
//! |--------|---------|----------|
//! | 1 | [`Answer::Update`] | no |
//! | 2 | [`Answer::Final`] | yes |
//! | other | [`Answer::Undefined`] | no |
//!
//! Undefined frames are forwarded as-is so unexpected provider protocol
//! changes stay observable instead of being dropped.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Frame delimiter byte appended to every JSON object on the wire.
pub const FRAME_DELIMITER: u8 = 0x1e;

/// `type` value of update frames.
pub const TYPE_UPDATE: u64 = 1;

/// `type` value of final frames.
pub const TYPE_FINAL: u64 = 2;

// ============================================================================
// Frame Helpers
// ============================================================================

/// Truncates a raw physical message at the first delimiter.
///
/// Each read yields one JSON object followed by `0x1e`; only the prefix
/// before the first delimiter is decoded.
#[inline]
#[must_use]
pub fn truncate_frame(raw: &[u8]) -> &[u8] {
    match raw.iter().position(|&b| b == FRAME_DELIMITER) {
        Some(end) => &raw[..end],
        None => raw,
    }
}

/// Decodes one truncated frame into an [`Answer`] variant.
///
/// # Errors
///
/// Returns [`crate::Error::Json`] if the bytes are not a JSON object or
/// the typed shape for the frame's `type` does not decode.
pub fn decode_answer(frame: &[u8]) -> Result<Answer> {
    let value: Value = serde_json::from_slice(frame)?;
    let kind = value.get("type").and_then(Value::as_u64);

    let answer = match kind {
        Some(TYPE_UPDATE) => Answer::Update(serde_json::from_value(value)?),
        Some(TYPE_FINAL) => Answer::Final(serde_json::from_value(value)?),
        _ => Answer::Undefined(Undefined { raw: value }),
    };

    Ok(answer)
}

// ============================================================================
// Answer
// ============================================================================

/// One decoded answer snapshot, dispatched on the frame's `type` field.
#[derive(Debug, Clone)]
pub enum Answer {
    /// Partial answer; the text is cumulative, not a delta.
    Update(ChatUpdate),
    /// Complete answer; exactly one per exchange, terminates it.
    Final(ChatFinal),
    /// Unrecognized frame shape, kept verbatim for diagnostics.
    Undefined(Undefined),
}

impl Answer {
    /// Returns the assistant text carried by this snapshot.
    ///
    /// Update frames carry the cumulative answer so far; final frames the
    /// complete answer; undefined frames carry no text.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Update(update) => update.text(),
            Self::Final(final_) => final_.text(),
            Self::Undefined(_) => "",
        }
    }

    /// Returns the usage counters known at this snapshot.
    #[must_use]
    pub fn usage(&self) -> Usage {
        match self {
            Self::Final(final_) => final_.usage(),
            Self::Update(_) | Self::Undefined(_) => Usage::default(),
        }
    }

    /// Returns `true` for the terminal (final) variant.
    #[inline]
    #[must_use]
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final(_))
    }

    /// Returns the provider result value, if this snapshot carries one.
    #[must_use]
    pub fn result_value(&self) -> Option<&str> {
        match self {
            Self::Final(final_) => final_.item.result.as_ref().map(|r| r.value.as_str()),
            _ => None,
        }
    }
}

impl Default for Answer {
    /// An empty undefined snapshot; replaced by the first decoded frame.
    fn default() -> Self {
        Self::Undefined(Undefined { raw: Value::Null })
    }
}

// ============================================================================
// Usage
// ============================================================================

/// Conversation usage counters from the provider's throttling block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    /// Questions asked in this conversation so far.
    pub user_unit: u64,
    /// Maximum questions allowed in this conversation.
    pub max_unit: u64,
}

// ============================================================================
// Update Frame
// ============================================================================

/// An update frame (`type: 1`).
#[derive(Debug, Clone, Deserialize)]
pub struct ChatUpdate {
    /// Invocation target, normally `update`.
    #[serde(default)]
    pub target: String,

    /// Update arguments; the first carries the message snapshots.
    #[serde(default)]
    pub arguments: Vec<UpdateArgument>,
}

impl ChatUpdate {
    /// Returns the cumulative answer text of this update.
    #[must_use]
    pub fn text(&self) -> &str {
        self.arguments
            .first()
            .and_then(|a| a.messages.last())
            .map(|m| m.text.as_str())
            .unwrap_or_default()
    }
}

/// One argument object of an update frame.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateArgument {
    /// Message snapshots; the last one is the current answer state.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,

    /// Request id the update belongs to.
    #[serde(rename = "requestId", default)]
    pub request_id: Option<String>,
}

// ============================================================================
// Final Frame
// ============================================================================

/// A final frame (`type: 2`).
#[derive(Debug, Clone, Deserialize)]
pub struct ChatFinal {
    /// Invocation id echoed by the provider.
    #[serde(rename = "invocationId", default)]
    pub invocation_id: Option<String>,

    /// Completed exchange payload.
    #[serde(default)]
    pub item: FinalItem,
}

impl ChatFinal {
    /// Returns the complete answer text.
    ///
    /// Prefers the last bot-authored message; falls back to the last
    /// message of any author.
    #[must_use]
    pub fn text(&self) -> &str {
        self.item
            .messages
            .iter()
            .rev()
            .find(|m| m.author == "bot")
            .or_else(|| self.item.messages.last())
            .map(|m| m.text.as_str())
            .unwrap_or_default()
    }

    /// Returns the usage counters from the throttling block.
    #[must_use]
    pub fn usage(&self) -> Usage {
        self.item
            .throttling
            .as_ref()
            .map(|t| Usage {
                user_unit: t.user_messages,
                max_unit: t.max_user_messages,
            })
            .unwrap_or_default()
    }
}

/// Payload of a final frame.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FinalItem {
    /// All messages of the exchange, both authors.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,

    /// Provider result; `value` is `"Success"` on a normal exchange.
    #[serde(default)]
    pub result: Option<ResultField>,

    /// Conversation usage limits.
    #[serde(default)]
    pub throttling: Option<Throttling>,

    /// Conversation the exchange belongs to.
    #[serde(rename = "conversationId", default)]
    pub conversation_id: Option<String>,

    /// Request id of the exchange.
    #[serde(rename = "requestId", default)]
    pub request_id: Option<String>,
}

/// Provider result block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultField {
    /// Result value, e.g. `Success` or `UnauthorizedRequest`.
    #[serde(default)]
    pub value: String,

    /// Human-readable detail accompanying a failure.
    #[serde(default)]
    pub message: Option<String>,
}

/// Conversation throttling counters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Throttling {
    /// Maximum user messages allowed in this conversation.
    #[serde(rename = "maxNumUserMessagesInConversation", default)]
    pub max_user_messages: u64,

    /// User messages spent in this conversation.
    #[serde(rename = "numUserMessagesInConversation", default)]
    pub user_messages: u64,
}

// ============================================================================
// Undefined Frame
// ============================================================================

/// An unrecognized frame, forwarded verbatim.
#[derive(Debug, Clone)]
pub struct Undefined {
    /// The decoded JSON payload.
    pub raw: Value,
}

impl Undefined {
    /// Returns the frame's numeric `type`, if present.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> Option<u64> {
        self.raw.get("type").and_then(Value::as_u64)
    }
}

// ============================================================================
// Messages
// ============================================================================

/// One message snapshot inside an update or final frame.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatMessage {
    /// Message text; cumulative for streaming updates.
    #[serde(default)]
    pub text: String,

    /// Message author, `user` or `bot`.
    #[serde(default)]
    pub author: String,

    /// Rich-card renderings of the answer.
    #[serde(rename = "adaptiveCards", default)]
    pub adaptive_cards: Vec<AdaptiveCard>,

    /// Follow-up question suggestions.
    #[serde(rename = "suggestedResponses", default)]
    pub suggested_responses: Vec<Suggestion>,
}

/// Adaptive-card rendering attached to a message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdaptiveCard {
    /// Card type marker.
    #[serde(rename = "type", default)]
    pub card_type: String,

    /// Card schema version.
    #[serde(default)]
    pub version: String,

    /// Card body blocks.
    #[serde(default)]
    pub body: Vec<CardBlock>,
}

/// One body block of an adaptive card.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardBlock {
    /// Block type marker.
    #[serde(rename = "type", default)]
    pub block_type: String,

    /// Block text.
    #[serde(default)]
    pub text: String,

    /// Whether the block text wraps.
    #[serde(default)]
    pub wrap: bool,
}

/// A suggested follow-up question.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Suggestion {
    /// Suggestion text.
    #[serde(default)]
    pub text: String,

    /// Suggestion author.
    #[serde(default)]
    pub author: String,

    /// Creation timestamp as reported by the provider.
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,

    /// Provider timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,

    /// Message id of the suggestion.
    #[serde(rename = "messageId", default)]
    pub message_id: Option<String>,

    /// Message type marker.
    #[serde(rename = "messageType", default)]
    pub message_type: Option<String>,

    /// Offense classification.
    #[serde(default)]
    pub offense: Option<String>,

    /// Feedback metadata.
    #[serde(default)]
    pub feedback: Option<Feedback>,

    /// Content origin marker.
    #[serde(rename = "contentOrigin", default)]
    pub content_origin: Option<String>,

    /// Privacy marker, shape owned by the provider.
    #[serde(default)]
    pub privacy: Option<Value>,
}

/// Feedback metadata on a suggestion.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Feedback {
    /// Feedback tag, shape owned by the provider.
    #[serde(default)]
    pub tag: Option<Value>,

    /// Last feedback update, shape owned by the provider.
    #[serde(rename = "updatedOn", default)]
    pub updated_on: Option<Value>,

    /// Feedback type marker.
    #[serde(rename = "type", default)]
    pub feedback_type: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================
