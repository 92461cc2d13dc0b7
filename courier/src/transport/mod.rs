//! Transport boundary for the `Courier` delivery core.
//!
//! Defines the [`Transport`] trait the core speaks through. The core never
//! sees a wire format: messages go out as structured values and come back
//! as a [`SendReceipt`], history as a [`WirePage`]. Concrete
//! implementations live with the embedding application; the in-tree
//! [`loopback::LoopbackServer`] exists for tests and the demo binary.

pub mod loopback;

use courier_proto::message::{ConversationKey, MessageStatus, OutboundMessage, SendReceipt};
use courier_proto::record::WirePage;

/// Errors that can occur during transport operations.
///
/// Every variant is retryable from the delivery queue's perspective; a
/// business-level rejection travels inside a successful [`SendReceipt`]
/// instead (see [`SendReceipt::invalid_flag`]).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection to the server has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The operation timed out before completing.
    #[error("transport operation timed out")]
    Timeout,

    /// The server answered with a transport-level failure.
    #[error("server error: {0}")]
    Server(String),

    /// An underlying I/O error occurred.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Async transport trait for the three server operations the core needs.
///
/// Implementations carry opaque payloads; the core does not prescribe a
/// wire encoding. All methods take `&self` — implementations are expected
/// to be internally synchronized, since multiple delivery tasks call them
/// concurrently.
pub trait Transport: Send + Sync {
    /// Send an outbound message.
    ///
    /// `Ok` means the server processed the request; the receipt may still
    /// carry a semantic rejection. `Err` is a transport failure and will
    /// be retried by the delivery queue.
    fn send_message(
        &self,
        message: &OutboundMessage,
    ) -> impl std::future::Future<Output = Result<SendReceipt, TransportError>> + Send;

    /// Report a message's terminal status to the server.
    ///
    /// Fire-and-forget from the core's perspective: the caller logs
    /// failures and never retries them.
    fn push_status(
        &self,
        conversation: &ConversationKey,
        msg_id: &str,
        status: MessageStatus,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Fetch one page of conversation history, newest first.
    fn fetch_page(
        &self,
        conversation: &ConversationKey,
        cursor: u64,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<WirePage, TransportError>> + Send;
}
