//! Progress Store
//!
//! Single source of truth for quest progress. The whole document is held in
//! memory and written back through one writer task, so saves for different
//! quests are applied in order and never clobber each other. Only the latest
//! unwritten document is kept: while a write is in flight, newer changes
//! replace each other and land together in the next write.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::state::{ProgressBucket, SaveState, UserProfile};
use crate::storage::KeyValueStore;

/// Default key of the progress document
pub const DEFAULT_STORAGE_KEY: &str = "metravel_progress_v1";

/// Latest document waiting for the writer
#[derive(Debug, Clone, Default)]
struct PendingWrite {
    /// Bumped on every change
    seq: u64,
    json: Option<String>,
}

pub struct ProgressStore {
    backend: Arc<dyn KeyValueStore>,
    storage_key: String,
    state: RwLock<SaveState>,
    pending: watch::Sender<PendingWrite>,
    /// Sequence number of the last document the writer attempted
    written: watch::Receiver<u64>,
}

impl ProgressStore {
    /// Load the document once and start the writer task.
    /// Must be called from within a Tokio runtime.
    pub async fn open(backend: Arc<dyn KeyValueStore>, storage_key: &str) -> Arc<Self> {
        let (pending, pending_rx) = watch::channel(PendingWrite::default());
        let (written_tx, written) = watch::channel(0);
        tokio::spawn(run_writer(
            Arc::clone(&backend),
            storage_key.to_string(),
            pending_rx,
            written_tx,
        ));

        let state = read_state(backend.as_ref(), storage_key).await;
        info!(
            "Loaded progress document '{}' ({} cities)",
            storage_key,
            state.progress.len()
        );

        Arc::new(Self {
            backend,
            storage_key: storage_key.to_string(),
            state: RwLock::new(state),
            pending,
            written,
        })
    }

    /// Read the stored document. Missing or unreadable data yields an empty
    /// state; queued writes land before the read.
    pub async fn load_state(&self) -> SaveState {
        self.flush().await;
        read_state(self.backend.as_ref(), &self.storage_key).await
    }

    /// Replace the whole document. The write happens in the background and
    /// failures are only logged.
    pub fn save_state(&self, state: SaveState) {
        let mut current = self.state.write();
        *current = state;
        self.enqueue(&current);
    }

    /// Copy of the in-memory document
    pub fn snapshot(&self) -> SaveState {
        self.state.read().clone()
    }

    pub fn bucket(&self, city_id: &str, storage_key: &str) -> Option<ProgressBucket> {
        self.state.read().bucket(city_id, storage_key).cloned()
    }

    /// Replace one quest's bucket and persist the full document
    pub fn put_bucket(&self, city_id: &str, storage_key: &str, bucket: ProgressBucket) {
        let mut current = self.state.write();
        current.set_bucket(city_id, storage_key, bucket);
        self.enqueue(&current);
    }

    /// Blank one quest's bucket. Nothing is written if it was already blank.
    pub fn reset_bucket(&self, city_id: &str, storage_key: &str) -> bool {
        let mut current = self.state.write();
        let changed = current.reset_bucket(city_id, storage_key);
        if changed {
            self.enqueue(&current);
        }
        changed
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state.read().user.clone()
    }

    pub fn set_user_name(&self, name: &str) {
        let mut current = self.state.write();
        current.user = Some(UserProfile {
            name: name.trim().to_string(),
        });
        self.enqueue(&current);
    }

    /// Wait until every change made so far has been written or failed
    pub async fn flush(&self) {
        let target = self.pending.borrow().seq;
        let mut written = self.written.clone();
        if written.wait_for(|&seq| seq >= target).await.is_err() {
            warn!("Progress writer for '{}' stopped before flushing", self.storage_key);
        }
    }

    // Called with the state lock held so documents are published in mutation order
    fn enqueue(&self, state: &SaveState) {
        match state.to_json() {
            Ok(json) => {
                if self.pending.is_closed() {
                    warn!("Progress writer stopped, change to '{}' not saved", self.storage_key);
                }
                self.pending.send_modify(|pending| {
                    pending.seq += 1;
                    pending.json = Some(json);
                });
            }
            Err(e) => warn!("{}", e),
        }
    }
}

async fn read_state(backend: &dyn KeyValueStore, storage_key: &str) -> SaveState {
    match backend.get(storage_key).await {
        Ok(Some(json)) => SaveState::from_json(&json).unwrap_or_else(|e| {
            warn!("Discarding unreadable progress '{}': {}", storage_key, e);
            SaveState::default()
        }),
        Ok(None) => SaveState::default(),
        Err(e) => {
            warn!("Failed to read progress '{}': {}", storage_key, e);
            SaveState::default()
        }
    }
}

async fn run_writer(
    backend: Arc<dyn KeyValueStore>,
    storage_key: String,
    mut pending: watch::Receiver<PendingWrite>,
    written: watch::Sender<u64>,
) {
    while pending.changed().await.is_ok() {
        let PendingWrite { seq, json } = pending.borrow_and_update().clone();
        if let Some(json) = json {
            match backend.set(&storage_key, &json).await {
                Ok(()) => debug!("Saved progress '{}' #{} ({} bytes)", storage_key, seq, json.len()),
                Err(e) => warn!("Failed to save progress '{}': {}", storage_key, e),
            }
        }
        written.send_replace(seq);
    }
    debug!("Progress writer for '{}' stopped", storage_key);
}
