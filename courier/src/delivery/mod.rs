//! Delivery queue / retry engine.
//!
//! Owns the lifecycle of an outbound message from submission to terminal
//! success or failure: optimistic record insertion, transmission with
//! linear-backoff retry, reconciliation of the local identifier with the
//! server-assigned one, and commitment of exhausted deliveries into the
//! failure registry.
//!
//! Each accepted submission runs as an independently spawned task;
//! completion order between in-flight messages is unspecified, but every
//! record mutation is atomic with respect to concurrent readers (see
//! [`RecordStore`]).

pub mod status;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use courier_proto::message::{
    ConversationKey, MessageDraft, MessageStatus, OutboundMessage, ValidationError, fresh_msg_id,
};
use courier_proto::record::{QuoteSummary, TalkRecord};

use crate::records::RecordStore;
use crate::registry::FailureRegistry;
use crate::transport::Transport;
use status::StatusSynchronizer;

/// Retry schedule for transport failures.
///
/// The delay before retry `n` (zero-based) is `n × backoff_step`: the
/// first retry fires immediately, later ones back off linearly. Backoff is
/// deliberately unjittered — contention is per-user, not global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of retries after the initial attempt.
    pub max_retries: u32,
    /// Linear backoff step between attempts.
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 6,
            backoff_step: Duration::from_millis(1500),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt `attempt` (zero-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }
}

/// Identity of the local user, stamped onto optimistic records.
#[derive(Debug, Clone)]
pub struct SenderIdentity {
    /// Local user's numeric id.
    pub uid: i64,
    /// Local user's display name.
    pub nickname: String,
    /// Local user's avatar URL.
    pub avatar: String,
}

/// Events emitted by the delivery core for the embedding UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryEvent {
    /// An optimistic record was appended for an accepted submission.
    Appended {
        /// Local identifier of the new record.
        msg_id: String,
    },
    /// A record's delivery status changed.
    StatusChanged {
        /// The record's identifier at the time of the change.
        msg_id: String,
        /// The new status.
        status: MessageStatus,
    },
    /// A delivery exhausted its retries; the record now shows Error and
    /// the failure is committed to the registry.
    DeliveryFailed {
        /// Identifier of the failed message.
        msg_id: String,
        /// Conversation the failure belongs to.
        conversation: ConversationKey,
    },
    /// The server accepted the transport round-trip but rejected the
    /// message semantically (e.g. severed recipient relationship).
    /// Distinct from [`DeliveryEvent::DeliveryFailed`] so the UI can show
    /// a different notice.
    RecipientRejected {
        /// Identifier of the rejected message.
        msg_id: String,
    },
}

/// In-memory set of identifiers awaiting terminal resolution.
///
/// Backs the "is this echo one of my own in-flight sends" query used for
/// event deduplication. Renamed in place when the server assigns a new
/// identifier, so concurrent queries keep matching during reconciliation.
#[derive(Default)]
struct PendingIndex {
    ids: Mutex<HashSet<String>>,
}

impl PendingIndex {
    fn insert(&self, msg_id: &str) {
        self.ids.lock().insert(msg_id.to_string());
    }

    fn remove(&self, msg_id: &str) {
        self.ids.lock().remove(msg_id);
    }

    fn rename(&self, old_id: &str, new_id: &str) {
        let mut ids = self.ids.lock();
        if ids.remove(old_id) {
            ids.insert(new_id.to_string());
        }
    }

    fn contains(&self, msg_id: &str) -> bool {
        self.ids.lock().contains(msg_id)
    }
}

/// Accepts submissions and drives each one to a terminal outcome.
pub struct DeliveryQueue<T: Transport> {
    transport: Arc<T>,
    records: Arc<RecordStore>,
    status: Arc<StatusSynchronizer<T>>,
    identity: SenderIdentity,
    retry: RetryPolicy,
    pending: PendingIndex,
    event_tx: mpsc::Sender<DeliveryEvent>,
}

impl<T: Transport + 'static> DeliveryQueue<T> {
    /// Creates a queue wired to the given services.
    ///
    /// Returns the queue and the receiver for [`DeliveryEvent`]s the
    /// embedding UI should consume. The queue constructs its own
    /// [`StatusSynchronizer`] over the same registry and record store;
    /// reach it via [`status`](Self::status) for externally driven status
    /// updates (e.g. server pushes).
    pub fn new(
        transport: Arc<T>,
        records: Arc<RecordStore>,
        registry: Arc<FailureRegistry>,
        identity: SenderIdentity,
        retry: RetryPolicy,
        event_buffer: usize,
    ) -> (Arc<Self>, mpsc::Receiver<DeliveryEvent>) {
        let (event_tx, event_rx) = mpsc::channel(event_buffer);
        let status = Arc::new(StatusSynchronizer::new(
            Arc::clone(&transport),
            Arc::clone(&records),
            registry,
            identity.uid,
            event_tx.clone(),
        ));
        let queue = Arc::new(Self {
            transport,
            records,
            status,
            identity,
            retry,
            pending: PendingIndex::default(),
            event_tx,
        });
        (queue, event_rx)
    }

    /// The status synchronizer sharing this queue's stores.
    #[must_use]
    pub fn status(&self) -> &Arc<StatusSynchronizer<T>> {
        &self.status
    }

    /// Submits a draft for delivery.
    ///
    /// On acceptance the draft gets a fresh local identifier, an
    /// optimistic Pending record is appended, and delivery starts as a
    /// detached task; the local identifier is returned so the caller can
    /// correlate later events. Rejected drafts have no side effect at all.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the draft fails shallow content
    /// validation (blank text, empty mixed items). The caller surfaces
    /// this as a user-visible warning; nothing was recorded or sent.
    pub fn submit(self: &Arc<Self>, draft: MessageDraft) -> Result<String, ValidationError> {
        draft.validate()?;

        let message = draft.into_message(fresh_msg_id());
        let msg_id = message.msg_id.clone();

        self.pending.insert(&msg_id);
        self.records.append(self.optimistic_record(&message));
        let _ = self.event_tx.try_send(DeliveryEvent::Appended {
            msg_id: msg_id.clone(),
        });

        tokio::spawn(Arc::clone(self).deliver(message));

        Ok(msg_id)
    }

    /// Whether `msg_id` is still awaiting a terminal outcome.
    ///
    /// Matches the server-assigned identifier during reconciliation of a
    /// renamed message, so event handlers can deduplicate echoes of the
    /// local user's own sends.
    #[must_use]
    pub fn is_in_flight(&self, msg_id: &str) -> bool {
        self.pending.contains(msg_id)
    }

    /// Drops `msg_id` from the in-flight set.
    ///
    /// For event handlers that consumed an echo and no longer need the
    /// deduplication entry.
    pub fn clear_in_flight(&self, msg_id: &str) {
        self.pending.remove(msg_id);
    }

    /// Builds the optimistic record inserted at submission time.
    fn optimistic_record(&self, message: &OutboundMessage) -> TalkRecord {
        let quote = message
            .quote_id
            .as_deref()
            .and_then(|quote_id| self.quote_summary(quote_id));

        TalkRecord {
            msg_id: message.msg_id.clone(),
            sequence: 0,
            kind: message.kind,
            from_id: self.identity.uid,
            nickname: self.identity.nickname.clone(),
            avatar: self.identity.avatar.clone(),
            is_revoked: false,
            send_time: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            extra: message.body.clone(),
            quote,
            status: MessageStatus::Pending,
        }
    }

    /// Resolves a quoted message from the current record list.
    fn quote_summary(&self, quote_id: &str) -> Option<QuoteSummary> {
        let quoted = self.records.find(quote_id)?;
        let content = quoted
            .extra
            .get("content")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("view message")
            .to_string();
        Some(QuoteSummary {
            quote_id: quoted.msg_id,
            nickname: quoted.nickname,
            content,
        })
    }

    /// Drives one message to a terminal outcome.
    async fn deliver(self: Arc<Self>, message: OutboundMessage) {
        let conversation = message.conversation_key();

        let mut attempt: u32 = 0;
        let receipt = loop {
            match self.transport.send_message(&message).await {
                Ok(receipt) => break receipt,
                Err(err) => {
                    if attempt < self.retry.max_retries {
                        let wait = self.retry.backoff(attempt);
                        tracing::debug!(
                            msg_id = %message.msg_id,
                            attempt,
                            ?wait,
                            error = %err,
                            "send failed, will retry"
                        );
                        tokio::time::sleep(wait).await;
                        attempt += 1;
                    } else {
                        tracing::error!(
                            msg_id = %message.msg_id,
                            attempts = attempt + 1,
                            error = %err,
                            "delivery failed, retries exhausted"
                        );
                        self.status.set_status(
                            &message.msg_id,
                            MessageStatus::Error,
                            Some(conversation),
                        );
                        self.pending.remove(&message.msg_id);
                        let _ = self.event_tx.try_send(DeliveryEvent::DeliveryFailed {
                            msg_id: message.msg_id.clone(),
                            conversation,
                        });
                        return;
                    }
                }
            }
        };

        self.status
            .set_status(&message.msg_id, MessageStatus::Sent, Some(conversation));

        let mut final_id = message.msg_id.clone();
        if let Some(server_id) = receipt.msg_id.as_deref()
            && server_id != message.msg_id
        {
            self.reconcile_server_id(&conversation, &message.msg_id, server_id);
            final_id = server_id.to_string();
        }

        if receipt.invalid_flag() {
            self.status
                .set_status(&final_id, MessageStatus::Error, Some(conversation));
            let _ = self.event_tx.try_send(DeliveryEvent::RecipientRejected {
                msg_id: final_id.clone(),
            });
        }

        self.pending.remove(&final_id);
    }

    /// Replaces the local identifier with the server-assigned one.
    ///
    /// Also migrates a failure mark that landed under the local id after
    /// the send had already succeeded (a late `set_status(Error)` racing
    /// this task): whichever side completed last wins, and the mark moves
    /// to the surviving identifier. The server is told about the Error
    /// under the new identifier so other viewers agree with the badge.
    pub(crate) fn reconcile_server_id(
        &self,
        conversation: &ConversationKey,
        local_id: &str,
        server_id: &str,
    ) {
        self.records.rename(local_id, server_id);
        self.pending.rename(local_id, server_id);

        let registry = self.status.registry();
        if registry.is_failed(conversation, local_id) {
            registry.clear_failed(conversation, local_id);
            registry.mark_failed(conversation, server_id);
            self.status
                .push_best_effort(*conversation, server_id, MessageStatus::Error);
        }
    }
}
