//! Per-file upload and classification tracking.
//!
//! The tracker owns the session's collection of [`UploadRecord`]s. Every
//! mutation publishes a freshly built snapshot through a `watch` channel, so
//! observers never see a partially applied update. Each record moves through
//! `Processing -> Completed | Error` independently of its siblings.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use shared::{
    domain::{RecordId, UploadStatus},
    protocol::ClassifyResponse,
};
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    progress::ProgressCallback,
    source_file::{normalize_for_upload, SourceFile},
    DocumentApi,
};

pub const UNKNOWN_CLASSIFICATION: &str = "Unknown";
pub const UNKNOWN_CONFIDENCE: &str = "N/A";

pub type RecordSnapshot = Arc<Vec<UploadRecord>>;

#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub id: RecordId,
    pub name: String,
    pub size: u64,
    pub status: UploadStatus,
    pub progress: u8,
    pub classification: Option<String>,
    /// Percentage with one decimal, e.g. `"87.3"`.
    pub confidence: Option<String>,
    pub error: Option<String>,
    pub original_file: SourceFile,
}

impl UploadRecord {
    fn new(id: RecordId, file: SourceFile) -> Self {
        Self {
            id,
            name: file.name().to_string(),
            size: file.size(),
            status: UploadStatus::Processing,
            progress: 0,
            classification: None,
            confidence: None,
            error: None,
            original_file: file,
        }
    }

    /// Returns false when the update leaves the record unchanged.
    fn apply(&mut self, update: RecordUpdate) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        match update {
            RecordUpdate::Progress(percent) => {
                let percent = percent.min(100);
                if percent <= self.progress {
                    return false;
                }
                self.progress = percent;
            }
            RecordUpdate::Completed {
                classification,
                confidence,
            } => {
                self.status = UploadStatus::Completed;
                self.progress = 100;
                self.classification = Some(classification);
                self.confidence = Some(confidence);
                self.error = None;
            }
            RecordUpdate::Failed { message } => {
                self.status = UploadStatus::Error;
                self.progress = 0;
                self.classification = None;
                self.confidence = None;
                self.error = Some(message);
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
enum RecordUpdate {
    Progress(u8),
    Completed {
        classification: String,
        confidence: String,
    },
    Failed {
        message: String,
    },
}

/// Out-of-band outcome of one `process` call, for surfacing to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerNotification {
    Classified {
        id: RecordId,
        name: String,
        classification: String,
    },
    Failed {
        id: RecordId,
        name: String,
        message: String,
    },
}

impl TrackerNotification {
    pub fn id(&self) -> &RecordId {
        match self {
            TrackerNotification::Classified { id, .. } | TrackerNotification::Failed { id, .. } => {
                id
            }
        }
    }

    pub fn summary(&self) -> String {
        match self {
            TrackerNotification::Classified { name, .. } => {
                format!("Successfully classified: {name}")
            }
            TrackerNotification::Failed { name, message, .. } => {
                format!("Failed to process {name}: {message}")
            }
        }
    }
}

/// Formats a confidence fraction in `[0, 1]` as a one-decimal percentage.
pub fn confidence_percent(fraction: f64) -> String {
    format!("{:.1}", fraction * 100.0)
}

fn completion_fields(response: ClassifyResponse) -> (String, String) {
    let classification = response
        .classification
        .filter(|label| !label.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_CLASSIFICATION.to_string());
    let confidence = response
        .confidence
        .filter(|fraction| fraction.is_finite())
        .map(confidence_percent)
        .unwrap_or_else(|| UNKNOWN_CONFIDENCE.to_string());
    (classification, confidence)
}

pub struct UploadTracker {
    api: Arc<dyn DocumentApi>,
    records: watch::Sender<RecordSnapshot>,
    notifications: broadcast::Sender<TrackerNotification>,
    next_id: AtomicU64,
}

impl UploadTracker {
    pub fn new(api: Arc<dyn DocumentApi>) -> Arc<Self> {
        let (records, _) = watch::channel(Arc::new(Vec::new()));
        let (notifications, _) = broadcast::channel(256);
        Arc::new(Self {
            api,
            records,
            notifications,
            next_id: AtomicU64::new(1),
        })
    }

    fn next_record_id(&self) -> RecordId {
        RecordId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates one `Processing` record per file, appends them in input order
    /// and returns only the new records.
    pub fn register(&self, files: impl IntoIterator<Item = SourceFile>) -> Vec<UploadRecord> {
        let created: Vec<UploadRecord> = files
            .into_iter()
            .map(|file| UploadRecord::new(self.next_record_id(), file))
            .collect();
        if created.is_empty() {
            return created;
        }

        self.records.send_modify(|records| {
            let mut next = Vec::with_capacity(records.len() + created.len());
            next.extend(records.iter().cloned());
            next.extend(created.iter().cloned());
            *records = Arc::new(next);
        });
        debug!(count = created.len(), "registered uploads");
        created
    }

    /// Removes the record if present; absent ids are ignored.
    pub fn remove(&self, id: &RecordId) {
        let removed = self.records.send_if_modified(|records| {
            let Some(index) = records.iter().position(|record| &record.id == id) else {
                return false;
            };
            let mut next = Vec::clone(&**records);
            next.remove(index);
            *records = Arc::new(next);
            true
        });
        if removed {
            debug!(record_id = %id, "removed upload");
        }
    }

    /// True when there is at least one record and all of them completed.
    pub fn all_processed(&self) -> bool {
        let records = self.records.borrow();
        !records.is_empty()
            && records
                .iter()
                .all(|record| record.status == UploadStatus::Completed)
    }

    pub fn records(&self) -> RecordSnapshot {
        Arc::clone(&self.records.borrow())
    }

    pub fn get(&self, id: &RecordId) -> Option<UploadRecord> {
        self.records
            .borrow()
            .iter()
            .find(|record| &record.id == id)
            .cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<RecordSnapshot> {
        self.records.subscribe()
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<TrackerNotification> {
        self.notifications.subscribe()
    }

    /// Resolves once no record is still `Processing`.
    pub async fn wait_until_settled(&self) {
        let mut rx = self.records.subscribe();
        let _ = rx
            .wait_for(|records| records.iter().all(|record| record.status.is_terminal()))
            .await;
    }

    /// Copy-on-write merge of one update into the collection. Updates for
    /// ids that are no longer present are dropped.
    fn apply(&self, id: &RecordId, update: RecordUpdate) -> bool {
        self.records.send_if_modified(|records| {
            let Some(index) = records.iter().position(|record| &record.id == id) else {
                debug!(record_id = %id, "dropping update for removed upload");
                return false;
            };
            let mut record = records[index].clone();
            if !record.apply(update) {
                return false;
            }
            let mut next = Vec::clone(&**records);
            next[index] = record;
            *records = Arc::new(next);
            true
        })
    }

    /// Uploads and classifies one record. Never fails: every outcome ends up
    /// as record state plus a notification.
    pub async fn process(&self, record: UploadRecord) {
        let UploadRecord {
            id,
            name,
            original_file,
            ..
        } = record;

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<u8>();
        let callback: ProgressCallback = Arc::new(move |percent| {
            let _ = progress_tx.send(percent);
        });

        let api = Arc::clone(&self.api);
        let work = async move {
            let file = normalize_for_upload(original_file).await?;
            api.classify(file, callback).await
        };
        tokio::pin!(work);

        let result = loop {
            tokio::select! {
                biased;
                Some(percent) = progress_rx.recv() => {
                    self.apply(&id, RecordUpdate::Progress(percent));
                }
                result = &mut work => break result,
            }
        };
        while let Ok(percent) = progress_rx.try_recv() {
            self.apply(&id, RecordUpdate::Progress(percent));
        }

        let notification = match result {
            Ok(response) => {
                let (classification, confidence) = completion_fields(response);
                info!(
                    record_id = %id,
                    file = %name,
                    classification = %classification,
                    confidence = %confidence,
                    "document classified"
                );
                self.apply(
                    &id,
                    RecordUpdate::Completed {
                        classification: classification.clone(),
                        confidence,
                    },
                );
                TrackerNotification::Classified {
                    id,
                    name,
                    classification,
                }
            }
            Err(err) => {
                let message = err.user_message();
                warn!(
                    record_id = %id,
                    file = %name,
                    error = %err,
                    "document classification failed"
                );
                self.apply(
                    &id,
                    RecordUpdate::Failed {
                        message: message.clone(),
                    },
                );
                TrackerNotification::Failed { id, name, message }
            }
        };

        let _ = self.notifications.send(notification);
    }

    /// Fire-and-forget processing on the runtime.
    pub fn spawn(self: &Arc<Self>, record: UploadRecord) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move { tracker.process(record).await })
    }

    pub fn register_and_spawn(
        self: &Arc<Self>,
        files: impl IntoIterator<Item = SourceFile>,
    ) -> Vec<JoinHandle<()>> {
        self.register(files)
            .into_iter()
            .map(|record| self.spawn(record))
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/tracker_tests.rs"]
mod tests;
