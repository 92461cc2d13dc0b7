//! `Courier` — delivery core demo driver.
//!
//! Wires the delivery core against an in-process loopback server and
//! submits a handful of messages, optionally injecting transport failures
//! before each one goes through, then prints the event stream and the
//! final record states.
//!
//! ```bash
//! # Three messages, clean sends
//! cargo run --bin courier
//!
//! # Exercise the retry path: two failures before each success
//! cargo run --bin courier -- --messages 2 --fail-first 2 --log-level debug
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use courier::config::{CliArgs, CoreConfig};
use courier::delivery::{DeliveryQueue, SenderIdentity};
use courier::records::RecordStore;
use courier::registry::FailureRegistry;
use courier::transport::loopback::{LoopbackServer, SendScript};
use courier_proto::message::{MessageDraft, MessageKind, MessageStatus, SendReceipt, TalkMode};

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > config file > defaults).
    let config = match CoreConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            CoreConfig::default()
        }
    };

    init_logging(&cli.log_level);
    tracing::info!("courier demo starting");

    let transport = Arc::new(LoopbackServer::new());
    let records = Arc::new(RecordStore::new());
    let registry = Arc::new(match config.registry_path.clone() {
        Some(path) => FailureRegistry::open(path),
        None => FailureRegistry::in_memory(),
    });

    let identity = SenderIdentity {
        uid: cli.uid,
        nickname: cli.nickname.clone(),
        avatar: String::new(),
    };

    let (queue, mut events) = DeliveryQueue::new(
        Arc::clone(&transport),
        Arc::clone(&records),
        registry,
        identity,
        config.retry.clone(),
        config.event_buffer,
    );

    // More injected failures than the retry budget would exhaust the
    // delivery before its scripted success is reached.
    let fail_first = cli.fail_first.min(config.retry.max_retries);

    let mut accepted: usize = 0;
    for i in 0..cli.messages {
        // Script the server: `fail_first` transport failures, then success
        // with a server-assigned identifier.
        transport.script_sends(
            (0..fail_first)
                .map(|_| SendScript::Fail)
                .chain(std::iter::once(SendScript::Deliver(SendReceipt {
                    msg_id: Some(format!("srv-{i}")),
                    extra: None,
                }))),
        );

        let draft = MessageDraft {
            kind: MessageKind::Text,
            talk_mode: TalkMode::Single,
            to_from_id: 42,
            quote_id: None,
            body: serde_json::json!({ "text": format!("demo message {i}") }),
        };
        match queue.submit(draft) {
            Ok(msg_id) => {
                tracing::info!(%msg_id, "submitted");
                accepted += 1;
            }
            Err(err) => tracing::warn!(%err, "submission rejected"),
        }
    }

    // Print events as they arrive until every record reaches a terminal
    // status.
    while accepted > 0 {
        while let Ok(event) = events.try_recv() {
            println!("event: {event:?}");
        }
        let all_settled = records
            .snapshot()
            .iter()
            .all(|record| record.status != MessageStatus::Pending);
        if all_settled && records.len() == accepted {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    while let Ok(event) = events.try_recv() {
        println!("event: {event:?}");
    }

    println!("\nfinal records:");
    for record in records.snapshot() {
        println!(
            "  {} [{:?}] {}",
            record.msg_id,
            record.status,
            record.extra.get("text").and_then(|t| t.as_str()).unwrap_or("")
        );
    }
    println!("transport saw {} send attempt(s)", transport.sent_count());

    tracing::info!("courier demo exiting");
}

/// Initialize stderr logging with the requested level filter.
fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
