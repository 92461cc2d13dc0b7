//! Cursor-paged history loading with failure-state restoration.
//!
//! Pages arrive from the server newest first and carry whatever status the
//! server last saw. Two corrections are applied before records reach the
//! store: a missing or unrecognized status normalizes to Sent, and any
//! identifier the failure registry holds for the page's conversation is
//! forced to Error — local failure knowledge always overrides the server's
//! report for display purposes.

use std::sync::Arc;

use parking_lot::Mutex;

use courier_proto::message::{ConversationKey, MessageStatus};
use courier_proto::record::{TalkRecord, WireRecord};

use crate::records::RecordStore;
use crate::registry::FailureRegistry;
use crate::transport::{Transport, TransportError};

/// Result of one page load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// A full page was loaded; older history remains.
    More,
    /// A short page was loaded; this was the last page.
    End,
    /// The active conversation changed while the request was in flight;
    /// the response was discarded and the store left untouched.
    Superseded,
}

/// Loads conversation history page by page into a [`RecordStore`].
pub struct HistoryLoader<T: Transport> {
    transport: Arc<T>,
    records: Arc<RecordStore>,
    registry: Arc<FailureRegistry>,
    cursor: Mutex<u64>,
    page_size: usize,
}

impl<T: Transport> HistoryLoader<T> {
    /// Creates a loader over the given services.
    pub fn new(
        transport: Arc<T>,
        records: Arc<RecordStore>,
        registry: Arc<FailureRegistry>,
        page_size: usize,
    ) -> Self {
        Self {
            transport,
            records,
            registry,
            cursor: Mutex::new(0),
            page_size,
        }
    }

    /// Loads the next page of `conversation`'s history.
    ///
    /// The first page (cursor 0) claims the conversation as active and
    /// clears the store before inserting; later pages prepend older
    /// records in front of what is already loaded. A page shorter than the
    /// configured page size signals the end of history.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the page fetch fails; the store is
    /// left untouched in that case.
    pub async fn load_page(
        &self,
        conversation: ConversationKey,
    ) -> Result<PageOutcome, TransportError> {
        let cursor = *self.cursor.lock();
        if cursor == 0 {
            self.records.set_active(conversation);
        }

        let page = self
            .transport
            .fetch_page(&conversation, cursor, self.page_size)
            .await?;

        if self.records.active_key() != Some(conversation) {
            tracing::debug!(%conversation, "discarding history page for inactive conversation");
            return Ok(PageOutcome::Superseded);
        }

        if cursor == 0 {
            self.records.clear();
        }

        let is_last = page.items.len() < self.page_size;

        let mut loaded: Vec<TalkRecord> = page
            .items
            .into_iter()
            .map(WireRecord::normalize)
            .map(|mut record| {
                if self.registry.is_failed(&conversation, &record.msg_id) {
                    record.status = MessageStatus::Error;
                }
                record
            })
            .collect();
        // Server pages are newest first; the store wants oldest first.
        loaded.reverse();
        self.records.prepend_many(loaded);

        *self.cursor.lock() = page.cursor;

        Ok(if is_last {
            PageOutcome::End
        } else {
            PageOutcome::More
        })
    }

    /// Restarts paging from the newest message and clears loaded records.
    pub fn reset(&self) {
        *self.cursor.lock() = 0;
        self.records.clear();
    }

    /// The cursor the next [`load_page`](Self::load_page) will send.
    #[must_use]
    pub fn cursor(&self) -> u64 {
        *self.cursor.lock()
    }
}
