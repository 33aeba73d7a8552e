//! Outbound frames and handshake payloads.
//!
//! Two frames ever leave the client on the stream channel: the one-time
//! protocol negotiation sent right after connecting, and one chat request
//! per exchange. Both are JSON objects terminated by the `0x1e` delimiter.
//!
//! Also defines the conversation descriptor decoded from the handshake
//! HTTP response and the conversation styles with their option-set tags.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

use super::answer::FRAME_DELIMITER;

// ============================================================================
// Constants
// ============================================================================

/// Result value the provider reports for a usable conversation.
pub const RESULT_SUCCESS: &str = "Success";

/// Option flags sent with every chat request, independent of style.
const BASE_OPTION_SETS: &[&str] = &[
    "nlu_direct_response_filter",
    "deepleo",
    "disable_emoji_spoken_text",
    "responsible_ai_policy_235",
    "enablemm",
    "dv3sugg",
];

// ============================================================================
// Frame Encoding
// ============================================================================

/// The one-time protocol negotiation frame.
///
/// Sent immediately after the stream connection is established; the
/// provider acknowledges with an empty object frame.
pub const PROTOCOL_FRAME: &str = concat!(r#"{"protocol":"json","version":1}"#, "\u{1e}");

/// Serializes a payload into a delimiter-terminated text frame.
///
/// # Errors
///
/// Returns [`crate::Error::Json`] if serialization fails.
pub fn encode_frame<T: Serialize>(payload: &T) -> Result<String> {
    let mut frame = serde_json::to_string(payload)?;
    frame.push(FRAME_DELIMITER as char);
    Ok(frame)
}

// ============================================================================
// ConversationStyle
// ============================================================================

/// Conversation style selecting the provider's answer tone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConversationStyle {
    /// Imaginative, longer answers.
    #[default]
    Creative,
    /// Middle-ground answers.
    Balanced,
    /// Short, factual answers.
    Precise,
}

impl ConversationStyle {
    /// Returns the provider's option-set tags for this style.
    #[must_use]
    pub fn tags(&self) -> &'static [&'static str] {
        match self {
            Self::Creative => &["h3imaginative", "clgalileo", "gencontentv3"],
            Self::Balanced => &["galileo"],
            Self::Precise => &["h3precise", "clgalileo"],
        }
    }

    /// Returns the complete option-set list for a chat request.
    #[must_use]
    pub fn option_sets(&self) -> Vec<String> {
        BASE_OPTION_SETS
            .iter()
            .chain(self.tags())
            .map(ToString::to_string)
            .collect()
    }
}

impl fmt::Display for ConversationStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Creative => "creative",
            Self::Balanced => "balanced",
            Self::Precise => "precise",
        };
        f.write_str(name)
    }
}

impl FromStr for ConversationStyle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "creative" => Ok(Self::Creative),
            "balanced" => Ok(Self::Balanced),
            "precise" => Ok(Self::Precise),
            other => Err(Error::stream(format!("unknown conversation style: {other}"))),
        }
    }
}

// ============================================================================
// ConversationDescriptor
// ============================================================================

/// Conversation descriptor decoded from the handshake response body.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationDescriptor {
    /// Conversation id assigned by the provider.
    #[serde(rename = "conversationId", default)]
    pub conversation_id: String,

    /// Client id assigned by the provider.
    #[serde(rename = "clientId", default)]
    pub client_id: String,

    /// Signature from the body; superseded by the response header when
    /// that is present.
    #[serde(rename = "conversationSignature", default)]
    pub conversation_signature: Option<String>,

    /// Handshake result.
    #[serde(default)]
    pub result: HandshakeResult,
}

/// Result block of the handshake response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HandshakeResult {
    /// Result value; [`RESULT_SUCCESS`] for a usable conversation.
    #[serde(default)]
    pub value: String,

    /// Detail accompanying a non-success value.
    #[serde(default)]
    pub message: Option<String>,
}

impl HandshakeResult {
    /// Returns `true` if the provider reported success.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.value == RESULT_SUCCESS
    }
}

// ============================================================================
// ChatRequest
// ============================================================================

/// One chat request envelope, sent once per exchange.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Request arguments; always exactly one.
    pub arguments: Vec<ChatArgument>,

    /// Invocation id within the stream connection.
    #[serde(rename = "invocationId")]
    pub invocation_id: String,

    /// Invocation target.
    pub target: String,

    /// Envelope type; `4` for invocations.
    #[serde(rename = "type")]
    pub kind: u64,
}

impl ChatRequest {
    /// Builds a chat request for one question.
    #[must_use]
    pub fn new(
        style: ConversationStyle,
        message: &str,
        conversation_id: &str,
        client_id: &str,
        signature: &str,
        first_exchange: bool,
    ) -> Self {
        Self {
            arguments: vec![ChatArgument {
                source: "cib".to_string(),
                options_sets: style.option_sets(),
                is_start_of_session: first_exchange,
                message: OutboundMessage {
                    author: "user".to_string(),
                    input_method: "Keyboard".to_string(),
                    text: message.to_string(),
                    message_type: "Chat".to_string(),
                    request_id: Uuid::new_v4().to_string(),
                },
                conversation_signature: signature.to_string(),
                participant: Participant {
                    id: client_id.to_string(),
                },
                conversation_id: conversation_id.to_string(),
            }],
            invocation_id: "0".to_string(),
            target: "chat".to_string(),
            kind: 4,
        }
    }
}

/// Argument object of a chat request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatArgument {
    /// Request source marker.
    pub source: String,

    /// Option flags, base set plus style tags.
    #[serde(rename = "optionsSets")]
    pub options_sets: Vec<String>,

    /// Whether this is the conversation's first exchange.
    #[serde(rename = "isStartOfSession")]
    pub is_start_of_session: bool,

    /// The question being asked.
    pub message: OutboundMessage,

    /// Conversation signature from the handshake.
    #[serde(rename = "conversationSignature")]
    pub conversation_signature: String,

    /// Participant identity.
    pub participant: Participant,

    /// Conversation id from the handshake.
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
}

/// Outbound user message.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    /// Message author; always `user`.
    pub author: String,

    /// Input method marker.
    #[serde(rename = "inputMethod")]
    pub input_method: String,

    /// Question text.
    pub text: String,

    /// Message type marker.
    #[serde(rename = "messageType")]
    pub message_type: String,

    /// Fresh request id for this question.
    #[serde(rename = "requestId")]
    pub request_id: String,
}

/// Participant identity of a chat request.
#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    /// Client id from the handshake.
    pub id: String,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_parsing() {
        assert_eq!(
            "creative".parse::<ConversationStyle>().unwrap(),
            ConversationStyle::Creative
        );
        assert_eq!(
            "BALANCED".parse::<ConversationStyle>().unwrap(),
            ConversationStyle::Balanced
        );
        assert_eq!(
            "Precise".parse::<ConversationStyle>().unwrap(),
            ConversationStyle::Precise
        );
        assert!("chaotic".parse::<ConversationStyle>().is_err());
    }

    #[test]
    fn test_style_round_trip() {
        for style in [
            ConversationStyle::Creative,
            ConversationStyle::Balanced,
            ConversationStyle::Precise,
        ] {
            assert_eq!(style.to_string().parse::<ConversationStyle>().unwrap(), style);
        }
    }

    #[test]
    fn test_option_sets_include_style_tags() {
        let sets = ConversationStyle::Creative.option_sets();
        assert!(sets.contains(&"h3imaginative".to_string()));
        assert!(sets.contains(&"gencontentv3".to_string()));
        assert!(sets.contains(&"deepleo".to_string()));

        let sets = ConversationStyle::Precise.option_sets();
        assert!(sets.contains(&"h3precise".to_string()));
        assert!(!sets.contains(&"h3imaginative".to_string()));
    }

    #[test]
    fn test_protocol_frame_terminated() {
        assert!(PROTOCOL_FRAME.starts_with(r#"{"protocol":"json","version":1}"#));
        assert_eq!(PROTOCOL_FRAME.as_bytes().last(), Some(&FRAME_DELIMITER));
    }

    #[test]
    fn test_encode_frame_appends_delimiter() {
        let request = ChatRequest::new(
            ConversationStyle::Balanced,
            "hello",
            "conv-1",
            "client-1",
            "sig-1",
            true,
        );

        let frame = encode_frame(&request).expect("encode");
        assert_eq!(frame.as_bytes().last(), Some(&FRAME_DELIMITER));
        assert_eq!(
            frame.bytes().filter(|&b| b == FRAME_DELIMITER).count(),
            1
        );
    }

    #[test]
    fn test_chat_request_wire_names() {
        let request = ChatRequest::new(
            ConversationStyle::Balanced,
            "hello",
            "conv-1",
            "client-1",
            "sig-1",
            true,
        );

        let json = serde_json::to_string(&request).expect("serialize");
        assert!(json.contains("\"invocationId\":\"0\""));
        assert!(json.contains("\"target\":\"chat\""));
        assert!(json.contains("\"type\":4"));
        assert!(json.contains("\"optionsSets\""));
        assert!(json.contains("\"isStartOfSession\":true"));
        assert!(json.contains("\"conversationSignature\":\"sig-1\""));
        assert!(json.contains("\"conversationId\":\"conv-1\""));
        assert!(json.contains("\"inputMethod\":\"Keyboard\""));
    }

    #[test]
    fn test_descriptor_decode() {
        let body = r#"{
            "conversationId": "conv-1",
            "clientId": "client-1",
            "result": {"value": "Success", "message": null}
        }"#;

        let descriptor: ConversationDescriptor = serde_json::from_str(body).expect("decode");
        assert_eq!(descriptor.conversation_id, "conv-1");
        assert_eq!(descriptor.client_id, "client-1");
        assert!(descriptor.result.is_success());
    }

    #[test]
    fn test_descriptor_non_success() {
        let body = r#"{
            "conversationId": "conv-1",
            "clientId": "client-1",
            "result": {"value": "UnauthorizedRequest", "message": "blocked"}
        }"#;

        let descriptor: ConversationDescriptor = serde_json::from_str(body).expect("decode");
        assert!(!descriptor.result.is_success());
        assert_eq!(descriptor.result.message.as_deref(), Some("blocked"));
    }
}
