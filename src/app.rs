//! Application Coordinator
//!
//! Wires configuration into the gateways, owns the record cache and the
//! change-feed watcher, and drives one capture session per scan.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::capture::{CameraManager, FileSource, RetryPolicy};
use crate::config::{AppConfig, CameraSettings};
use crate::extract::ExtractedRecord;
use crate::ocr::{ClovaOcr, Recognizer};
use crate::session::{CaptureSession, RecordDraft, SessionError};
use crate::storage::watch::{self, RecordCache};
use crate::storage::{ContributionRecord, RecordStore, SupabaseStore};

/// Outcome of the edit step: save the (possibly modified) draft or discard
pub enum EditOutcome {
    Save(RecordDraft),
    Discard,
}

/// Main application coordinator
pub struct ScannerApp {
    /// Persistence gateway
    store: Arc<dyn RecordStore>,
    /// Display copy of the stored records, refreshed by the watcher
    cache: Arc<RecordCache>,
    /// Producer side of the change-notification feed
    change_tx: mpsc::Sender<serde_json::Value>,
    /// Cancels the watcher and any pending camera retry
    cancel: CancellationToken,
    watcher: Option<JoinHandle<()>>,
}

impl ScannerApp {
    /// Build the coordinator from configuration.
    ///
    /// Must run inside the async runtime; the change watcher is spawned
    /// immediately.
    pub fn new(config: &AppConfig) -> Result<Self> {
        anyhow::ensure!(
            config.store_configured(),
            "datastore is not configured: set [store] url and SUPABASE_ANON_KEY"
        );

        let store: Arc<dyn RecordStore> =
            Arc::new(SupabaseStore::new(&config.store.url, &config.store.anon_key));
        let cache = Arc::new(RecordCache::new());
        let (change_tx, change_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let watcher = watch::spawn_watcher(store.clone(), cache.clone(), change_rx, cancel.clone());

        Ok(Self {
            store,
            cache,
            change_tx,
            cancel,
            watcher: Some(watcher),
        })
    }

    /// Build the recognition gateway from configuration
    pub fn recognizer(config: &AppConfig) -> Result<ClovaOcr> {
        anyhow::ensure!(
            config.ocr_configured(),
            "recognition service is not configured: set [ocr] invoke_url and CLOVA_OCR_SECRET_KEY"
        );
        Ok(ClovaOcr::new(&config.ocr.invoke_url, &config.ocr.secret_key)
            .with_lang(&config.ocr.lang))
    }

    /// The persistence gateway
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// The cached record snapshot
    pub fn cache(&self) -> &RecordCache {
        &self.cache
    }

    /// Producer handle for the change-notification feed; any payload sent
    /// here triggers a full re-fetch into the cache
    pub fn change_sender(&self) -> mpsc::Sender<serde_json::Value> {
        self.change_tx.clone()
    }

    /// Fetch everything from the datastore and refresh the display cache
    pub async fn refresh(&self) -> Result<Vec<ContributionRecord>> {
        let records = self.store.fetch_records().await?;
        self.cache.replace(records.clone());
        Ok(records)
    }

    /// Run one full capture session over an image file.
    ///
    /// `edit` receives the seeded draft and the raw extraction result, and
    /// decides whether to save or discard. Returns the saved record, or
    /// `None` on discard.
    pub async fn run_scan<F>(
        &self,
        recognizer: &dyn Recognizer,
        image: PathBuf,
        camera: &CameraSettings,
        edit: F,
    ) -> Result<Option<ContributionRecord>>
    where
        F: FnOnce(RecordDraft, &ExtractedRecord) -> EditOutcome,
    {
        anyhow::ensure!(image.exists(), "image file not found: {}", image.display());

        let source = FileSource::single(image);
        let mut manager =
            CameraManager::new(source, camera.facing).with_retry_policy(RetryPolicy {
                max_attempts: camera.max_attempts,
                base_delay: Duration::from_millis(camera.retry_base_ms),
            });

        let mut session = CaptureSession::new();
        if let Err(err) = session.capture(&mut manager).await {
            // Device errors carry a fixed user-facing remediation message
            if let SessionError::Camera(cause) = &err {
                anyhow::bail!("{}", cause.remediation());
            }
            return Err(err).context("frame capture failed");
        }
        let draft = session
            .recognize(recognizer)
            .await
            .context("recognition failed")?
            .clone();
        let extracted = session.extracted().cloned().unwrap_or_default();

        match edit(draft, &extracted) {
            EditOutcome::Save(edited) => {
                if let Some(open) = session.draft_mut() {
                    *open = edited;
                }
                let saved = session.submit(self.store.as_ref()).await?;
                info!("saved record {} ({}원)", saved.name, saved.amount);
                // Local writes invalidate the cache the same way pushed
                // changes do
                let _ = self
                    .change_tx
                    .send(serde_json::json!({
                        "eventType": "INSERT",
                        "new": { "id": saved.id }
                    }))
                    .await;
                Ok(Some(saved))
            }
            EditOutcome::Discard => {
                session.cancel()?;
                info!("scan discarded");
                Ok(None)
            }
        }
    }
}

impl Drop for ScannerApp {
    fn drop(&mut self) {
        // Stops the watcher and abandons any pending camera retry
        self.cancel.cancel();
        if let Some(handle) = self.watcher.take() {
            handle.abort();
        }
    }
}
