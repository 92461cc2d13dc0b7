//! History loading tests: cursor paging, status normalization, and the
//! failure-registry overlay.
//!
//! The server's word on a message's status is not final for display: any
//! identifier the local failure registry holds for the page's conversation
//! must render as Error, whatever the server reported.

use std::sync::Arc;

use courier::history::{HistoryLoader, PageOutcome};
use courier::records::RecordStore;
use courier::registry::FailureRegistry;
use courier::transport::loopback::LoopbackServer;
use courier_proto::message::{ConversationKey, MessageStatus, TalkMode};
use courier_proto::record::{TalkRecord, WirePage, WireRecord};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const PAGE_SIZE: usize = 3;

#[allow(clippy::type_complexity)]
fn build_loader() -> (
    Arc<LoopbackServer>,
    Arc<RecordStore>,
    Arc<FailureRegistry>,
    HistoryLoader<LoopbackServer>,
) {
    let transport = Arc::new(LoopbackServer::new());
    let records = Arc::new(RecordStore::new());
    let registry = Arc::new(FailureRegistry::in_memory());
    let loader = HistoryLoader::new(
        Arc::clone(&transport),
        Arc::clone(&records),
        Arc::clone(&registry),
        PAGE_SIZE,
    );
    (transport, records, registry, loader)
}

fn wire_record(msg_id: &str, status: Option<i64>) -> WireRecord {
    WireRecord {
        msg_id: msg_id.into(),
        sequence: 1,
        msg_type: 1,
        from_id: 7,
        nickname: "bob".into(),
        avatar: String::new(),
        is_revoked: 2,
        send_time: "2025-06-01 10:00:00".into(),
        extra: Some(r#"{"content":"hi"}"#.into()),
        quote: None,
        status,
    }
}

fn page(items: Vec<WireRecord>, cursor: u64) -> WirePage {
    WirePage { items, cursor }
}

fn conversation() -> ConversationKey {
    ConversationKey::new(TalkMode::Single, 42)
}

fn ids(records: &[TalkRecord]) -> Vec<&str> {
    records.iter().map(|r| r.msg_id.as_str()).collect()
}

// ===========================================================================
// Normalization
// ===========================================================================

#[tokio::test]
async fn server_statuses_normalize_on_load() {
    let (transport, records, _registry, loader) = build_loader();
    transport.script_page(page(
        vec![
            wire_record("m4", None),     // absent -> Sent
            wire_record("m3", Some(99)), // unknown -> Sent
            wire_record("m2", Some(2)),  // Pending passes through
            wire_record("m1", Some(3)),  // Error passes through
        ],
        10,
    ));

    loader.load_page(conversation()).await.unwrap();

    assert_eq!(records.status_of("m4"), Some(MessageStatus::Sent));
    assert_eq!(records.status_of("m3"), Some(MessageStatus::Sent));
    assert_eq!(records.status_of("m2"), Some(MessageStatus::Pending));
    assert_eq!(records.status_of("m1"), Some(MessageStatus::Error));
}

/// The server says Sent, the registry says failed — the local failure
/// knowledge wins for display.
#[tokio::test]
async fn registry_overlay_forces_error_over_server_status() {
    let (transport, records, registry, loader) = build_loader();
    registry.mark_failed(&conversation(), "m2");
    transport.script_page(page(
        vec![
            wire_record("m3", Some(1)),
            wire_record("m2", Some(1)),
            wire_record("m1", Some(1)),
        ],
        10,
    ));

    loader.load_page(conversation()).await.unwrap();

    assert_eq!(records.status_of("m2"), Some(MessageStatus::Error));
    assert_eq!(records.status_of("m3"), Some(MessageStatus::Sent));
    assert_eq!(records.status_of("m1"), Some(MessageStatus::Sent));
}

#[tokio::test]
async fn overlay_is_scoped_to_the_page_conversation() {
    let (transport, records, registry, loader) = build_loader();
    // Failure recorded for a different conversation entirely.
    registry.mark_failed(&ConversationKey::new(TalkMode::Group, 9), "m1");
    transport.script_page(page(vec![wire_record("m1", Some(1))], 10));

    loader.load_page(conversation()).await.unwrap();

    assert_eq!(records.status_of("m1"), Some(MessageStatus::Sent));
}

// ===========================================================================
// Paging
// ===========================================================================

#[tokio::test]
async fn newest_first_pages_are_stored_oldest_first() {
    let (transport, records, _registry, loader) = build_loader();
    transport.script_page(page(
        vec![
            wire_record("m3", Some(1)),
            wire_record("m2", Some(1)),
            wire_record("m1", Some(1)),
        ],
        10,
    ));

    loader.load_page(conversation()).await.unwrap();

    assert_eq!(ids(&records.snapshot()), ["m1", "m2", "m3"]);
}

#[tokio::test]
async fn short_page_signals_the_end() {
    let (transport, _records, _registry, loader) = build_loader();
    transport.script_page(page(
        vec![wire_record("m2", Some(1)), wire_record("m1", Some(1))],
        10,
    ));

    let outcome = loader.load_page(conversation()).await.unwrap();
    assert_eq!(outcome, PageOutcome::End);
}

#[tokio::test]
async fn full_page_signals_more() {
    let (transport, _records, _registry, loader) = build_loader();
    transport.script_page(page(
        vec![
            wire_record("m3", Some(1)),
            wire_record("m2", Some(1)),
            wire_record("m1", Some(1)),
        ],
        10,
    ));

    let outcome = loader.load_page(conversation()).await.unwrap();
    assert_eq!(outcome, PageOutcome::More);
}

#[tokio::test]
async fn older_pages_prepend_in_front_and_advance_the_cursor() {
    let (transport, records, _registry, loader) = build_loader();
    transport.script_page(page(
        vec![
            wire_record("m6", Some(1)),
            wire_record("m5", Some(1)),
            wire_record("m4", Some(1)),
        ],
        10,
    ));
    transport.script_page(page(
        vec![
            wire_record("m3", Some(1)),
            wire_record("m2", Some(1)),
            wire_record("m1", Some(1)),
        ],
        20,
    ));

    assert_eq!(
        loader.load_page(conversation()).await.unwrap(),
        PageOutcome::More
    );
    assert_eq!(
        loader.load_page(conversation()).await.unwrap(),
        PageOutcome::More
    );

    assert_eq!(
        ids(&records.snapshot()),
        ["m1", "m2", "m3", "m4", "m5", "m6"]
    );

    let cursors: Vec<u64> = transport
        .page_requests()
        .iter()
        .map(|request| request.cursor)
        .collect();
    assert_eq!(cursors, [0, 10]);
    assert_eq!(loader.cursor(), 20);
}

#[tokio::test]
async fn first_page_clears_previously_loaded_records() {
    let (transport, records, _registry, loader) = build_loader();

    transport.script_page(page(vec![wire_record("old", Some(1))], 10));
    loader.load_page(conversation()).await.unwrap();
    assert_eq!(records.len(), 1);

    // Switching conversations restarts from cursor 0.
    loader.reset();
    transport.script_page(page(vec![wire_record("new", Some(1))], 10));
    loader
        .load_page(ConversationKey::new(TalkMode::Group, 9))
        .await
        .unwrap();

    assert_eq!(ids(&records.snapshot()), ["new"]);
}

#[tokio::test]
async fn page_requests_carry_the_configured_limit() {
    let (transport, _records, _registry, loader) = build_loader();
    loader.load_page(conversation()).await.unwrap();
    assert_eq!(transport.page_requests()[0].limit, PAGE_SIZE);
}

// ===========================================================================
// Superseded loads and errors
// ===========================================================================

#[tokio::test]
async fn page_for_switched_away_conversation_is_discarded() {
    let (transport, records, _registry, loader) = build_loader();
    transport.script_page(page(
        vec![
            wire_record("m3", Some(1)),
            wire_record("m2", Some(1)),
            wire_record("m1", Some(1)),
        ],
        10,
    ));
    loader.load_page(conversation()).await.unwrap();

    // The user switches to another conversation while an older page for
    // the first one is still in flight.
    records.set_active(ConversationKey::new(TalkMode::Group, 9));
    transport.script_page(page(vec![wire_record("m0", Some(1))], 20));

    let outcome = loader.load_page(conversation()).await.unwrap();

    assert_eq!(outcome, PageOutcome::Superseded);
    assert_eq!(ids(&records.snapshot()), ["m1", "m2", "m3"]);
    assert_eq!(loader.cursor(), 10);
}

#[tokio::test]
async fn fetch_failure_leaves_the_store_untouched() {
    let (transport, records, _registry, loader) = build_loader();
    transport.script_page(page(vec![wire_record("m1", Some(1))], 10));
    loader.load_page(conversation()).await.unwrap();

    transport.set_fail_pages(true);
    let result = loader.load_page(conversation()).await;

    assert!(result.is_err());
    assert_eq!(ids(&records.snapshot()), ["m1"]);
}

#[tokio::test]
async fn reset_restarts_from_the_newest_page() {
    let (transport, records, _registry, loader) = build_loader();
    transport.script_page(page(
        vec![
            wire_record("m3", Some(1)),
            wire_record("m2", Some(1)),
            wire_record("m1", Some(1)),
        ],
        10,
    ));
    loader.load_page(conversation()).await.unwrap();

    loader.reset();
    assert_eq!(loader.cursor(), 0);
    assert!(records.is_empty());

    loader.load_page(conversation()).await.unwrap();
    let cursors: Vec<u64> = transport
        .page_requests()
        .iter()
        .map(|request| request.cursor)
        .collect();
    assert_eq!(cursors, [0, 0]);
}
