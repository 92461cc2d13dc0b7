//! Outbound message types for the `Courier` delivery core.
//!
//! A [`MessageDraft`] is what the composer hands to the delivery queue; an
//! [`OutboundMessage`] is a draft that passed validation and received a
//! local identifier. Identifiers are opaque strings: generated locally at
//! submission and possibly replaced later by a server-assigned identifier.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of payload a message carries.
///
/// The delivery core only inspects the kind for shallow validation
/// ([`MessageDraft::validate`]); the body itself stays opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text.
    Text,
    /// A code snippet.
    Code,
    /// An image attachment.
    Image,
    /// An audio clip.
    Audio,
    /// A video clip.
    Video,
    /// A generic file attachment.
    File,
    /// A geographic location.
    Location,
    /// A contact card.
    Card,
    /// A forwarded message bundle.
    Forward,
    /// A login notification.
    Login,
    /// A vote / poll.
    Vote,
    /// A mixed text-and-media message composed of multiple items.
    Mixed,
}

impl MessageKind {
    /// Returns the numeric code used for this kind on the wire.
    #[must_use]
    pub const fn wire_code(self) -> u32 {
        match self {
            Self::Text => 1,
            Self::Code => 2,
            Self::Image => 3,
            Self::Audio => 4,
            Self::Video => 5,
            Self::File => 6,
            Self::Location => 7,
            Self::Card => 8,
            Self::Forward => 9,
            Self::Login => 10,
            Self::Vote => 11,
            Self::Mixed => 12,
        }
    }

    /// Maps a wire code back to a kind. Unknown codes return `None`.
    #[must_use]
    pub const fn from_wire(code: u32) -> Option<Self> {
        Some(match code {
            1 => Self::Text,
            2 => Self::Code,
            3 => Self::Image,
            4 => Self::Audio,
            5 => Self::Video,
            6 => Self::File,
            7 => Self::Location,
            8 => Self::Card,
            9 => Self::Forward,
            10 => Self::Login,
            11 => Self::Vote,
            12 => Self::Mixed,
            _ => return None,
        })
    }
}

/// Whether a conversation is a direct chat or a group chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TalkMode {
    /// One-to-one conversation with a single peer.
    Single,
    /// Group conversation.
    Group,
}

impl TalkMode {
    /// Returns the numeric code used for this mode on the wire.
    #[must_use]
    pub const fn wire_code(self) -> u8 {
        match self {
            Self::Single => 1,
            Self::Group => 2,
        }
    }

    /// Maps a wire code back to a mode. Unknown codes return `None`.
    #[must_use]
    pub const fn from_wire(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Single),
            2 => Some(Self::Group),
            _ => None,
        }
    }
}

/// Identifies a single conversation: a direct peer or a group.
///
/// Rendered as `"<mode>_<target>"` (e.g. `"1_42"`), which is also the key
/// the failure registry persists under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    /// Direct or group conversation.
    pub talk_mode: TalkMode,
    /// Numeric id of the peer or group.
    pub to_from_id: i64,
}

impl ConversationKey {
    /// Creates a key from a mode and a target id.
    #[must_use]
    pub const fn new(talk_mode: TalkMode, to_from_id: i64) -> Self {
        Self {
            talk_mode,
            to_from_id,
        }
    }

    /// Parses a `"<mode>_<target>"` string. Returns `None` for anything
    /// malformed — callers treat that as "no conversation", never an error.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let (mode, target) = raw.split_once('_')?;
        let talk_mode = TalkMode::from_wire(mode.parse().ok()?)?;
        let to_from_id = target.parse().ok()?;
        Some(Self {
            talk_mode,
            to_from_id,
        })
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.talk_mode.wire_code(), self.to_from_id)
    }
}

/// Delivery status of a conversation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Confirmed by the server.
    Sent,
    /// Submitted, awaiting a terminal outcome.
    Pending,
    /// Delivery failed (retry exhaustion or semantic rejection).
    Error,
}

impl MessageStatus {
    /// Returns the numeric code used for this status on the wire.
    #[must_use]
    pub const fn wire_code(self) -> u8 {
        match self {
            Self::Sent => 1,
            Self::Pending => 2,
            Self::Error => 3,
        }
    }

    /// Maps a wire code back to a status. Unknown codes return `None`;
    /// history loading then falls back to [`MessageStatus::Sent`].
    #[must_use]
    pub const fn from_wire(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Sent),
            2 => Some(Self::Pending),
            3 => Some(Self::Error),
            _ => None,
        }
    }
}

/// Error returned when a draft fails submission validation.
///
/// Validation is deliberately shallow: only text and mixed drafts carry a
/// check, everything else is accepted as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A text draft whose content is empty or whitespace-only.
    #[error("message text is empty")]
    EmptyText,
    /// A mixed draft whose item list is missing, not an array, or empty.
    #[error("mixed message has no items")]
    EmptyItems,
}

/// A user-authored message before it enters the delivery queue.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    /// Payload kind.
    pub kind: MessageKind,
    /// Direct or group conversation.
    pub talk_mode: TalkMode,
    /// Numeric id of the peer or group.
    pub to_from_id: i64,
    /// Identifier of a quoted message, if any.
    pub quote_id: Option<String>,
    /// Kind-specific payload, opaque to the core.
    pub body: serde_json::Value,
}

impl MessageDraft {
    /// Validates the draft for submission.
    ///
    /// Text drafts must carry non-blank text under `body.text` (falling
    /// back to `body.content`); mixed drafts must carry a non-empty
    /// `body.items` array. All other kinds pass unconditionally.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyText`] or
    /// [`ValidationError::EmptyItems`] accordingly.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.kind {
            MessageKind::Text => {
                let content = self
                    .body
                    .get("text")
                    .or_else(|| self.body.get("content"))
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default();
                if content.trim().is_empty() {
                    return Err(ValidationError::EmptyText);
                }
            }
            MessageKind::Mixed => {
                let has_items = self
                    .body
                    .get("items")
                    .and_then(serde_json::Value::as_array)
                    .is_some_and(|items| !items.is_empty());
                if !has_items {
                    return Err(ValidationError::EmptyItems);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Consumes the draft, attaching the freshly generated local id.
    #[must_use]
    pub fn into_message(self, msg_id: String) -> OutboundMessage {
        OutboundMessage {
            msg_id,
            kind: self.kind,
            talk_mode: self.talk_mode,
            to_from_id: self.to_from_id,
            quote_id: self.quote_id,
            body: self.body,
        }
    }

    /// The conversation this draft targets.
    #[must_use]
    pub const fn conversation_key(&self) -> ConversationKey {
        ConversationKey::new(self.talk_mode, self.to_from_id)
    }
}

/// A validated message owned by the delivery queue until it reaches a
/// terminal outcome.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Local identifier, unique for the process lifetime. Replaced by the
    /// server identifier in the record store after a successful send.
    pub msg_id: String,
    /// Payload kind.
    pub kind: MessageKind,
    /// Direct or group conversation.
    pub talk_mode: TalkMode,
    /// Numeric id of the peer or group.
    pub to_from_id: i64,
    /// Identifier of a quoted message, if any.
    pub quote_id: Option<String>,
    /// Kind-specific payload, opaque to the core.
    pub body: serde_json::Value,
}

impl OutboundMessage {
    /// The conversation this message belongs to.
    #[must_use]
    pub const fn conversation_key(&self) -> ConversationKey {
        ConversationKey::new(self.talk_mode, self.to_from_id)
    }
}

/// Generates a fresh local message identifier: a random 128-bit value
/// rendered without separator punctuation.
#[must_use]
pub fn fresh_msg_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// What the server returns from a send call.
///
/// Both fields are optional: forward sends return an item list instead of
/// a single id, and `extra` is a serialized side-channel that may carry a
/// business-level rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Server-assigned message identifier, when the server minted one.
    pub msg_id: Option<String>,
    /// Opaque serialized side-channel (JSON), parsed defensively.
    pub extra: Option<String>,
}

impl SendReceipt {
    /// Whether the server flagged the message as semantically invalid
    /// (e.g. the recipient relationship was severed) despite the transport
    /// round-trip succeeding.
    ///
    /// Parse failures in `extra` degrade to `false` — a malformed
    /// side-channel never fails the send.
    #[must_use]
    pub fn invalid_flag(&self) -> bool {
        let Some(raw) = self.extra.as_deref() else {
            return false;
        };
        serde_json::from_str::<serde_json::Value>(raw)
            .ok()
            .and_then(|extra| extra.get("invalid").and_then(serde_json::Value::as_bool))
            .unwrap_or(false)
    }
}
