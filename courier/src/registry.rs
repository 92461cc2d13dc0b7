//! Durable registry of failed message identifiers, keyed by conversation.
//!
//! The registry is what keeps a failure badge visible across reloads: the
//! record store is rebuilt from the server on every history load, but the
//! server does not track per-viewer failure state, so the sender's device
//! remembers it here and the history loader overlays it back on.
//!
//! Persisted representation is the bare mapping
//! `{ "<mode>_<target>": ["<msg_id>", ...] }` — nothing else in the
//! registry's state is written out.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use courier_proto::message::ConversationKey;

/// File name the registry persists under inside its data directory.
pub const REGISTRY_FILE: &str = "failed_messages.json";

/// Conversation-keyed set of failed message identifiers.
///
/// All operations are safe to call with stale or unknown keys and ids:
/// misses are no-ops, never errors. A conversation entry is created lazily
/// on first failure and removed entirely once its last id is cleared, so
/// the persisted file stays compact.
pub struct FailureRegistry {
    ids: Mutex<BTreeMap<String, Vec<String>>>,
    path: Option<PathBuf>,
}

impl FailureRegistry {
    /// Creates a registry with no backing file. State is lost on drop;
    /// used by tests and callers that opt out of persistence.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            ids: Mutex::new(BTreeMap::new()),
            path: None,
        }
    }

    /// Opens a registry backed by the given file, restoring any persisted
    /// state.
    ///
    /// A missing file is an empty registry. A file that cannot be read or
    /// parsed is logged and treated as empty — failure badges are advisory
    /// display state and must never block startup.
    #[must_use]
    pub fn open(path: PathBuf) -> Self {
        let ids = load_persisted(&path);
        Self {
            ids: Mutex::new(ids),
            path: Some(path),
        }
    }

    /// Default persistence location:
    /// `<data_local_dir>/courier/failed_messages.json`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join("courier").join(REGISTRY_FILE))
    }

    /// Records `msg_id` as failed in `conversation`.
    ///
    /// Idempotent: marking an already-present id changes nothing. An empty
    /// `msg_id` is a no-op.
    pub fn mark_failed(&self, conversation: &ConversationKey, msg_id: &str) {
        if msg_id.is_empty() {
            return;
        }
        let mut ids = self.ids.lock();
        let entry = ids.entry(conversation.to_string()).or_default();
        if entry.iter().any(|id| id == msg_id) {
            return;
        }
        entry.push(msg_id.to_string());
        self.persist(&ids);
    }

    /// Removes `msg_id` from `conversation`'s failed set, dropping the
    /// conversation entry entirely if the set becomes empty.
    ///
    /// Clearing an absent id or an unknown conversation is a no-op.
    pub fn clear_failed(&self, conversation: &ConversationKey, msg_id: &str) {
        if msg_id.is_empty() {
            return;
        }
        let key = conversation.to_string();
        let mut ids = self.ids.lock();
        let Some(entry) = ids.get_mut(&key) else {
            return;
        };
        let before = entry.len();
        entry.retain(|id| id != msg_id);
        if entry.len() == before {
            return;
        }
        if entry.is_empty() {
            ids.remove(&key);
        }
        self.persist(&ids);
    }

    /// Whether `msg_id` is currently recorded as failed in `conversation`.
    #[must_use]
    pub fn is_failed(&self, conversation: &ConversationKey, msg_id: &str) -> bool {
        self.ids
            .lock()
            .get(&conversation.to_string())
            .is_some_and(|entry| entry.iter().any(|id| id == msg_id))
    }

    /// Number of conversations currently carrying failure marks.
    #[must_use]
    pub fn conversation_count(&self) -> usize {
        self.ids.lock().len()
    }

    /// Writes the mapping to the backing file, if there is one.
    ///
    /// Called with the state lock held so writes cannot land out of order.
    /// Write failures are logged and leave the in-memory state untouched.
    fn persist(&self, ids: &BTreeMap<String, Vec<String>>) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        if let Err(err) = write_mapping(path, ids) {
            tracing::warn!(path = %path.display(), error = %err, "failed to persist failure registry");
        }
    }
}

/// Loads the persisted mapping, degrading every failure to empty.
fn load_persisted(path: &Path) -> BTreeMap<String, Vec<String>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to read failure registry");
            return BTreeMap::new();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(ids) => ids,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failure registry is corrupt, starting empty");
            BTreeMap::new()
        }
    }
}

fn write_mapping(path: &Path, ids: &BTreeMap<String, Vec<String>>) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(ids).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}
