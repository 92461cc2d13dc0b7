//! Conversation records — the durable, UI-visible projection of messages.
//!
//! [`TalkRecord`] is what the record store holds and the UI renders.
//! [`WireRecord`] is the shape history pages arrive in from the server:
//! `extra` and `quote` are raw JSON strings and `status` is an optional
//! numeric code. [`WireRecord::normalize`] converts between the two,
//! degrading every parse failure to an absent field — a malformed history
//! item must never fail a page load.

use serde::{Deserialize, Serialize};

use crate::message::{MessageKind, MessageStatus};

/// Summary of a quoted message, embedded in the quoting record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSummary {
    /// Identifier of the quoted message.
    pub quote_id: String,
    /// Display name of the quoted message's sender.
    pub nickname: String,
    /// Short textual rendition of the quoted content.
    pub content: String,
}

/// A single message as held in the conversation record store.
///
/// Invariant: at most one record per `msg_id` within a conversation's
/// record list at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TalkRecord {
    /// Message identifier (local until renamed to the server's).
    pub msg_id: String,
    /// Server-assigned ordering token; 0 until known.
    pub sequence: u64,
    /// Payload kind.
    pub kind: MessageKind,
    /// Sender's numeric id.
    pub from_id: i64,
    /// Sender's display name.
    pub nickname: String,
    /// Sender's avatar URL.
    pub avatar: String,
    /// Whether the message was revoked by its sender.
    pub is_revoked: bool,
    /// Human-readable send time.
    pub send_time: String,
    /// Kind-specific rendering payload, opaque to the core.
    pub extra: serde_json::Value,
    /// Quoted-message summary, when the message quotes another.
    pub quote: Option<QuoteSummary>,
    /// Delivery status.
    pub status: MessageStatus,
}

/// Wire code meaning "revoked" in the `is_revoked` field (2 = not revoked).
const WIRE_REVOKED: u8 = 1;

/// A history item exactly as the server ships it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireRecord {
    /// Message identifier.
    pub msg_id: String,
    /// Server-assigned ordering token.
    #[serde(default)]
    pub sequence: u64,
    /// Numeric payload-kind code.
    #[serde(default)]
    pub msg_type: u32,
    /// Sender's numeric id.
    #[serde(default)]
    pub from_id: i64,
    /// Sender's display name.
    #[serde(default)]
    pub nickname: String,
    /// Sender's avatar URL.
    #[serde(default)]
    pub avatar: String,
    /// Revocation flag (1 = revoked, 2 = not).
    #[serde(default)]
    pub is_revoked: u8,
    /// Human-readable send time.
    #[serde(default)]
    pub send_time: String,
    /// Rendering payload as a raw JSON string.
    #[serde(default)]
    pub extra: Option<String>,
    /// Quoted-message summary as a raw JSON string.
    #[serde(default)]
    pub quote: Option<String>,
    /// Numeric status code; absent or out-of-range means Sent.
    #[serde(default)]
    pub status: Option<i64>,
}

impl WireRecord {
    /// Converts the wire shape into a [`TalkRecord`].
    ///
    /// Defensive throughout: unknown kind codes fall back to text, an
    /// absent or unrecognized status falls back to [`MessageStatus::Sent`],
    /// and unparseable `extra`/`quote` strings degrade to an empty payload
    /// and no quote respectively.
    #[must_use]
    pub fn normalize(self) -> TalkRecord {
        let status = self
            .status
            .and_then(MessageStatus::from_wire)
            .unwrap_or(MessageStatus::Sent);

        let extra = self
            .extra
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));

        let quote = self
            .quote
            .as_deref()
            .and_then(|raw| serde_json::from_str::<QuoteSummary>(raw).ok());

        TalkRecord {
            msg_id: self.msg_id,
            sequence: self.sequence,
            kind: MessageKind::from_wire(self.msg_type).unwrap_or(MessageKind::Text),
            from_id: self.from_id,
            nickname: self.nickname,
            avatar: self.avatar,
            is_revoked: self.is_revoked == WIRE_REVOKED,
            send_time: self.send_time,
            extra,
            quote,
            status,
        }
    }
}

/// One page of conversation history, newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WirePage {
    /// History items, newest first.
    pub items: Vec<WireRecord>,
    /// Cursor for the next (older) page.
    pub cursor: u64,
}
