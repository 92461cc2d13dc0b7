//! Status synchronization between the local record store, the failure
//! registry, and the server.
//!
//! The server is the system of record for other viewers, but the sender's
//! own device is the only one entitled to assert terminal status on its
//! own messages — receivers never push status. So every status change
//! lands locally first; the server push is a detached best-effort call
//! whose failure is logged and never retried, since the local badge is
//! already authoritative for the sender's view.

use std::sync::Arc;

use tokio::sync::mpsc;

use courier_proto::message::{ConversationKey, MessageStatus};

use crate::records::RecordStore;
use crate::registry::FailureRegistry;
use crate::transport::Transport;

use super::DeliveryEvent;

/// Reconciles local status changes with the failure registry and the
/// server record of message status.
pub struct StatusSynchronizer<T: Transport> {
    transport: Arc<T>,
    records: Arc<RecordStore>,
    registry: Arc<FailureRegistry>,
    uid: i64,
    event_tx: mpsc::Sender<DeliveryEvent>,
}

impl<T: Transport + 'static> StatusSynchronizer<T> {
    pub(crate) fn new(
        transport: Arc<T>,
        records: Arc<RecordStore>,
        registry: Arc<FailureRegistry>,
        uid: i64,
        event_tx: mpsc::Sender<DeliveryEvent>,
    ) -> Self {
        Self {
            transport,
            records,
            registry,
            uid,
            event_tx,
        }
    }

    /// The failure registry this synchronizer writes to.
    #[must_use]
    pub fn registry(&self) -> &Arc<FailureRegistry> {
        &self.registry
    }

    /// Applies a status change for `msg_id`.
    ///
    /// The in-memory record is always updated (a miss is a no-op). The
    /// registry and server legs use `conversation`, falling back to the
    /// record store's active conversation; with neither available they are
    /// skipped entirely — never an error.
    ///
    /// Error adds the id to the failure registry; Sent clears it. In both
    /// cases the status is additionally pushed to the server, best-effort,
    /// when the matching record was authored by the local user.
    pub fn set_status(
        &self,
        msg_id: &str,
        status: MessageStatus,
        conversation: Option<ConversationKey>,
    ) {
        self.records.update_status(msg_id, status);
        let _ = self.event_tx.try_send(DeliveryEvent::StatusChanged {
            msg_id: msg_id.to_string(),
            status,
        });

        let Some(conversation) = conversation.or_else(|| self.records.active_key()) else {
            return;
        };

        match status {
            MessageStatus::Error => {
                self.registry.mark_failed(&conversation, msg_id);
                if self.locally_authored(msg_id) {
                    self.push_best_effort(conversation, msg_id, status);
                }
            }
            MessageStatus::Sent => {
                self.registry.clear_failed(&conversation, msg_id);
                if self.locally_authored(msg_id) {
                    self.push_best_effort(conversation, msg_id, status);
                }
            }
            MessageStatus::Pending => {}
        }
    }

    /// Pushes a status to the server as a detached task.
    ///
    /// Failures are logged at `warn` and never retried.
    pub(crate) fn push_best_effort(
        &self,
        conversation: ConversationKey,
        msg_id: &str,
        status: MessageStatus,
    ) {
        let transport = Arc::clone(&self.transport);
        let msg_id = msg_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = transport.push_status(&conversation, &msg_id, status).await {
                tracing::warn!(
                    %msg_id,
                    %conversation,
                    ?status,
                    error = %err,
                    "status push failed (best-effort, not retried)"
                );
            }
        });
    }

    fn locally_authored(&self, msg_id: &str) -> bool {
        self.records.sender_of(msg_id) == Some(self.uid)
    }
}
