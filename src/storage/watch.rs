//! Change feed and client-side record cache
//!
//! The datastore pushes change notifications; any change invalidates the
//! whole cached snapshot and triggers an unconditional full re-fetch.
//! Record volumes are small, so consistency wins over bandwidth here.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::records::ContributionRecord;
use super::supabase::RecordStore;

/// Kind of datastore change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    fn parse(kind: &str) -> Option<Self> {
        match kind.to_ascii_uppercase().as_str() {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// A parsed change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    /// Row id carried by the payload, when present; only used for logging
    pub record_id: Option<String>,
}

impl ChangeEvent {
    /// Leniently parse a notification payload.
    ///
    /// Returns `None` for malformed payloads; the watcher logs and ignores
    /// those rather than failing the feed.
    pub fn parse(payload: &serde_json::Value) -> Option<Self> {
        let kind = payload
            .get("eventType")
            .or_else(|| payload.get("type"))
            .and_then(|v| v.as_str())
            .and_then(ChangeKind::parse)?;

        let record_id = payload
            .get("new")
            .or_else(|| payload.get("old"))
            .and_then(|row| row.get("id"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Some(Self { kind, record_id })
    }
}

/// Transient display copy of the persisted records.
///
/// Replaced wholesale on every re-fetch; never written through.
#[derive(Default)]
pub struct RecordCache {
    records: RwLock<Vec<ContributionRecord>>,
}

impl RecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Vec<ContributionRecord> {
        self.records.read().clone()
    }

    /// Replace the snapshot
    pub fn replace(&self, records: Vec<ContributionRecord>) {
        *self.records.write() = records;
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

/// Spawn the watcher task: each change notification triggers a full
/// re-fetch into the cache. Safe to interleave with any read or in-flight
/// write, since it only ever replaces the snapshot.
pub fn spawn_watcher(
    store: Arc<dyn RecordStore>,
    cache: Arc<RecordCache>,
    mut events: mpsc::Receiver<serde_json::Value>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let payload = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("change watcher stopped: cancelled");
                    return;
                }
                payload = events.recv() => match payload {
                    Some(payload) => payload,
                    None => {
                        debug!("change watcher stopped: feed closed");
                        return;
                    }
                },
            };

            let Some(event) = ChangeEvent::parse(&payload) else {
                warn!("ignoring malformed change payload");
                continue;
            };
            debug!(
                "datastore change {:?} (id {:?}), re-fetching",
                event.kind, event.record_id
            );

            match store.fetch_records().await {
                Ok(records) => cache.replace(records),
                Err(err) => warn!("re-fetch after change failed: {}", err),
            }
        }
    })
}
