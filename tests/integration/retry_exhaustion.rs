//! Retry scheduling and exhaustion tests, run against a paused clock.
//!
//! Verifies the contract of the retry engine:
//! - a delivery that keeps failing invokes the transport exactly
//!   `max_retries + 1` times (7 by default);
//! - the accumulated backoff is the exact linear schedule
//!   0 + 1500 + 3000 + 4500 + 6000 + 7500 ms;
//! - exhaustion is terminal: Error record, failure registry entry under
//!   `"<mode>_<target>"`, identifier removed from the in-flight set.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use courier::delivery::{DeliveryEvent, DeliveryQueue, RetryPolicy, SenderIdentity};
use courier::records::RecordStore;
use courier::registry::FailureRegistry;
use courier::transport::loopback::{LoopbackServer, SendScript};
use courier_proto::message::{
    ConversationKey, MessageDraft, MessageKind, MessageStatus, SendReceipt, TalkMode,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Total backoff of a full exhaustion run: 0+1500+3000+4500+6000+7500 ms.
const FULL_BACKOFF: Duration = Duration::from_millis(22_500);

#[allow(clippy::type_complexity)]
fn build_core(
    registry: Arc<FailureRegistry>,
) -> (
    Arc<LoopbackServer>,
    Arc<RecordStore>,
    Arc<DeliveryQueue<LoopbackServer>>,
    mpsc::Receiver<DeliveryEvent>,
) {
    let transport = Arc::new(LoopbackServer::new());
    let records = Arc::new(RecordStore::new());
    let (queue, events) = DeliveryQueue::new(
        Arc::clone(&transport),
        Arc::clone(&records),
        registry,
        SenderIdentity {
            uid: 1,
            nickname: "alice".into(),
            avatar: String::new(),
        },
        RetryPolicy::default(),
        64,
    );
    (transport, records, queue, events)
}

fn text_draft(text: &str) -> MessageDraft {
    MessageDraft {
        kind: MessageKind::Text,
        talk_mode: TalkMode::Single,
        to_from_id: 42,
        quote_id: None,
        body: serde_json::json!({ "text": text }),
    }
}

fn conversation() -> ConversationKey {
    ConversationKey::new(TalkMode::Single, 42)
}

/// Receives events until the delivery reports terminal failure.
async fn wait_for_failure(
    events: &mut mpsc::Receiver<DeliveryEvent>,
) -> (String, ConversationKey) {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(120), events.recv())
            .await
            .expect("timed out waiting for delivery failure")
            .expect("event channel closed");
        if let DeliveryEvent::DeliveryFailed {
            msg_id,
            conversation,
        } = event
        {
            return (msg_id, conversation);
        }
    }
}

// ===========================================================================
// Exhaustion
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn exhaustion_takes_seven_attempts_with_linear_backoff() {
    let registry = Arc::new(FailureRegistry::in_memory());
    let (transport, records, queue, mut events) = build_core(Arc::clone(&registry));
    transport.script_sends((0..7).map(|_| SendScript::Fail));

    let start = tokio::time::Instant::now();
    let local_id = queue.submit(text_draft("doomed")).unwrap();
    let (failed_id, failed_conversation) = wait_for_failure(&mut events).await;

    // Exactly the initial attempt plus six retries, spaced by the linear
    // backoff schedule and nothing else.
    assert_eq!(transport.sent_count(), 7);
    assert_eq!(start.elapsed(), FULL_BACKOFF);

    assert_eq!(failed_id, local_id);
    assert_eq!(failed_conversation, conversation());
    assert_eq!(records.status_of(&local_id), Some(MessageStatus::Error));
    assert!(registry.is_failed(&conversation(), &local_id));
    assert!(!queue.is_in_flight(&local_id));
}

#[tokio::test(start_paused = true)]
async fn exhaustion_is_terminal() {
    let registry = Arc::new(FailureRegistry::in_memory());
    let (transport, _records, queue, mut events) = build_core(registry);
    transport.script_sends((0..7).map(|_| SendScript::Fail));

    queue.submit(text_draft("doomed")).unwrap();
    wait_for_failure(&mut events).await;

    // No further automatic transitions: the transport stays quiet.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.sent_count(), 7);
}

#[tokio::test(start_paused = true)]
async fn record_stays_pending_until_exhaustion() {
    let registry = Arc::new(FailureRegistry::in_memory());
    let (transport, records, queue, mut events) = build_core(registry);
    transport.script_sends((0..7).map(|_| SendScript::Fail));

    let local_id = queue.submit(text_draft("doomed")).unwrap();

    // Partway through the schedule the record is still Pending.
    tokio::time::sleep(Duration::from_millis(5000)).await;
    assert_eq!(records.status_of(&local_id), Some(MessageStatus::Pending));
    assert!(queue.is_in_flight(&local_id));

    wait_for_failure(&mut events).await;
    assert_eq!(records.status_of(&local_id), Some(MessageStatus::Error));
}

// ===========================================================================
// Recovery within the retry budget
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn transient_failures_recover_within_budget() {
    let registry = Arc::new(FailureRegistry::in_memory());
    let (transport, records, queue, mut events) = build_core(Arc::clone(&registry));
    transport.script_sends([
        SendScript::Fail,
        SendScript::Fail,
        SendScript::Deliver(SendReceipt {
            msg_id: Some("srv-1".into()),
            extra: None,
        }),
    ]);

    let start = tokio::time::Instant::now();
    let local_id = queue.submit(text_draft("flaky")).unwrap();

    loop {
        let event = tokio::time::timeout(Duration::from_secs(120), events.recv())
            .await
            .expect("timed out waiting for recovery")
            .expect("event channel closed");
        if matches!(
            event,
            DeliveryEvent::StatusChanged {
                status: MessageStatus::Sent,
                ..
            }
        ) {
            break;
        }
        assert!(
            !matches!(event, DeliveryEvent::DeliveryFailed { .. }),
            "delivery must not fail within the retry budget"
        );
    }

    // Two failed attempts cost 0 ms + 1500 ms of backoff.
    assert_eq!(transport.sent_count(), 3);
    assert_eq!(start.elapsed(), Duration::from_millis(1500));

    // Rename still happens after a retried success.
    loop {
        if records.find("srv-1").is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(records.find(&local_id).is_none());
    assert!(!registry.is_failed(&conversation(), "srv-1"));
}

#[tokio::test(start_paused = true)]
async fn single_failure_retries_immediately() {
    let registry = Arc::new(FailureRegistry::in_memory());
    let (transport, _records, queue, mut events) = build_core(registry);
    transport.script_send(SendScript::Fail);

    let start = tokio::time::Instant::now();
    queue.submit(text_draft("once")).unwrap();

    loop {
        let event = tokio::time::timeout(Duration::from_secs(120), events.recv())
            .await
            .expect("timed out")
            .expect("event channel closed");
        if matches!(
            event,
            DeliveryEvent::StatusChanged {
                status: MessageStatus::Sent,
                ..
            }
        ) {
            break;
        }
    }

    // The first retry waits 0 × 1500 ms — it fires immediately.
    assert_eq!(transport.sent_count(), 2);
    assert_eq!(start.elapsed(), Duration::ZERO);
}
