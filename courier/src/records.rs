//! In-memory store of the active conversation's records.
//!
//! Holds the ordered (oldest-first) list of [`TalkRecord`]s the UI renders,
//! plus the key of the conversation currently on screen. Multiple delivery
//! tasks complete concurrently and mutate the same list, so every
//! operation takes the write lock for its full duration: a concurrent
//! reader never observes a record under two identifiers, or under none,
//! while a rename is in progress.

use parking_lot::{Mutex, RwLock};

use courier_proto::message::{ConversationKey, MessageStatus};
use courier_proto::record::TalkRecord;

/// Ordered, mutable record list for the active conversation.
#[derive(Default)]
pub struct RecordStore {
    records: RwLock<Vec<TalkRecord>>,
    active: Mutex<Option<ConversationKey>>,
}

impl RecordStore {
    /// Creates an empty store with no active conversation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record at the newest end.
    pub fn append(&self, record: TalkRecord) {
        self.records.write().push(record);
    }

    /// Inserts a block of older records at the front.
    ///
    /// `records` must already be in oldest-first order; the history loader
    /// reverses the server's newest-first page before calling this.
    pub fn prepend_many(&self, records: Vec<TalkRecord>) {
        let mut list = self.records.write();
        list.splice(0..0, records);
    }

    /// Renames every record carrying `old_id` to `new_id`, atomically with
    /// respect to concurrent readers.
    ///
    /// If a record with `new_id` already exists (the server echoed the
    /// message through an event push before the send response arrived),
    /// the stale `old_id` record is dropped instead — the list never holds
    /// two records with the same identifier.
    pub fn rename(&self, old_id: &str, new_id: &str) {
        let mut list = self.records.write();
        if list.iter().any(|record| record.msg_id == new_id) {
            list.retain(|record| record.msg_id != old_id);
            return;
        }
        for record in list.iter_mut().filter(|record| record.msg_id == old_id) {
            record.msg_id = new_id.to_string();
        }
    }

    /// Updates the status of the record matching `msg_id`.
    ///
    /// Returns whether a record was found; a miss is a no-op.
    pub fn update_status(&self, msg_id: &str, status: MessageStatus) -> bool {
        let mut list = self.records.write();
        let mut found = false;
        for record in list.iter_mut().filter(|record| record.msg_id == msg_id) {
            record.status = status;
            found = true;
        }
        found
    }

    /// Removes every record.
    pub fn clear(&self) {
        self.records.write().clear();
    }

    /// Returns a copy of the record matching `msg_id`.
    #[must_use]
    pub fn find(&self, msg_id: &str) -> Option<TalkRecord> {
        self.records
            .read()
            .iter()
            .find(|record| record.msg_id == msg_id)
            .cloned()
    }

    /// Status of the record matching `msg_id`, if present.
    #[must_use]
    pub fn status_of(&self, msg_id: &str) -> Option<MessageStatus> {
        self.records
            .read()
            .iter()
            .find(|record| record.msg_id == msg_id)
            .map(|record| record.status)
    }

    /// Sender id of the record matching `msg_id`, if present.
    #[must_use]
    pub fn sender_of(&self, msg_id: &str) -> Option<i64> {
        self.records
            .read()
            .iter()
            .find(|record| record.msg_id == msg_id)
            .map(|record| record.from_id)
    }

    /// Returns a copy of the full record list, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TalkRecord> {
        self.records.read().clone()
    }

    /// Number of records currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Marks `conversation` as the one currently on screen.
    pub fn set_active(&self, conversation: ConversationKey) {
        *self.active.lock() = Some(conversation);
    }

    /// The conversation currently on screen, if any.
    #[must_use]
    pub fn active_key(&self) -> Option<ConversationKey> {
        *self.active.lock()
    }
}
