//! Loopback transport for testing and the demo binary.
//!
//! [`LoopbackServer`] plays the server side in-process: send outcomes and
//! history pages are scripted ahead of time, and every call the core makes
//! is recorded so tests can assert on attempt counts and status pushes.

use std::collections::VecDeque;

use parking_lot::Mutex;

use courier_proto::message::{ConversationKey, MessageStatus, OutboundMessage, SendReceipt};
use courier_proto::record::WirePage;

use super::{Transport, TransportError};

/// Scripted outcome for one `send_message` call.
#[derive(Debug, Clone)]
pub enum SendScript {
    /// The server accepts the message and answers with this receipt.
    Deliver(SendReceipt),
    /// The transport fails (connection closed); the core will retry.
    Fail,
}

/// A recorded `push_status` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPush {
    /// Conversation the status was pushed for.
    pub conversation: ConversationKey,
    /// Message the status applies to.
    pub msg_id: String,
    /// The pushed status.
    pub status: MessageStatus,
}

/// A recorded `fetch_page` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Conversation the page was requested for.
    pub conversation: ConversationKey,
    /// Cursor sent with the request.
    pub cursor: u64,
    /// Page size sent with the request.
    pub limit: usize,
}

/// In-process server stand-in with scriptable behavior.
///
/// Send outcomes are consumed front-to-back from the script queue; once
/// the queue is empty every send succeeds with an empty receipt (no server
/// id, no side-channel). History pages are consumed the same way, with an
/// empty page (the last page) as the fallback.
#[derive(Default)]
pub struct LoopbackServer {
    send_script: Mutex<VecDeque<SendScript>>,
    pages: Mutex<VecDeque<WirePage>>,
    sent: Mutex<Vec<OutboundMessage>>,
    pushes: Mutex<Vec<StatusPush>>,
    page_requests: Mutex<Vec<PageRequest>>,
    fail_status_pushes: Mutex<bool>,
    fail_pages: Mutex<bool>,
}

impl LoopbackServer {
    /// Creates a server that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one scripted send outcome.
    pub fn script_send(&self, outcome: SendScript) {
        self.send_script.lock().push_back(outcome);
    }

    /// Queues several scripted send outcomes in order.
    pub fn script_sends(&self, outcomes: impl IntoIterator<Item = SendScript>) {
        self.send_script.lock().extend(outcomes);
    }

    /// Queues one scripted history page.
    pub fn script_page(&self, page: WirePage) {
        self.pages.lock().push_back(page);
    }

    /// Makes subsequent `push_status` calls fail (or succeed again).
    pub fn set_fail_status_pushes(&self, fail: bool) {
        *self.fail_status_pushes.lock() = fail;
    }

    /// Makes subsequent `fetch_page` calls fail (or succeed again).
    pub fn set_fail_pages(&self, fail: bool) {
        *self.fail_pages.lock() = fail;
    }

    /// Number of `send_message` calls observed, including failed ones.
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// All messages handed to `send_message`, in call order.
    #[must_use]
    pub fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    /// All recorded `push_status` calls, in call order.
    #[must_use]
    pub fn status_pushes(&self) -> Vec<StatusPush> {
        self.pushes.lock().clone()
    }

    /// All recorded `fetch_page` calls, in call order.
    #[must_use]
    pub fn page_requests(&self) -> Vec<PageRequest> {
        self.page_requests.lock().clone()
    }
}

impl Transport for LoopbackServer {
    async fn send_message(
        &self,
        message: &OutboundMessage,
    ) -> Result<SendReceipt, TransportError> {
        self.sent.lock().push(message.clone());
        let outcome = self.send_script.lock().pop_front();
        match outcome {
            Some(SendScript::Deliver(receipt)) => Ok(receipt),
            Some(SendScript::Fail) => Err(TransportError::ConnectionClosed),
            None => Ok(SendReceipt::default()),
        }
    }

    async fn push_status(
        &self,
        conversation: &ConversationKey,
        msg_id: &str,
        status: MessageStatus,
    ) -> Result<(), TransportError> {
        if *self.fail_status_pushes.lock() {
            return Err(TransportError::Timeout);
        }
        self.pushes.lock().push(StatusPush {
            conversation: *conversation,
            msg_id: msg_id.to_string(),
            status,
        });
        Ok(())
    }

    async fn fetch_page(
        &self,
        conversation: &ConversationKey,
        cursor: u64,
        limit: usize,
    ) -> Result<WirePage, TransportError> {
        self.page_requests.lock().push(PageRequest {
            conversation: *conversation,
            cursor,
            limit,
        });
        if *self.fail_pages.lock() {
            return Err(TransportError::Server("history unavailable".into()));
        }
        Ok(self.pages.lock().pop_front().unwrap_or_default())
    }
}
