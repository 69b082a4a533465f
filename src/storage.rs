use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use axum::body::Bytes;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{PortalError, Result};
use crate::history::HistoryEntry;
use crate::saving::{append_to_log, read_log, save_upload};
use crate::submission::{
    CivilTime, MealType, SubmissionRecord, format_civil, local_file_name, storage_path,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An uploaded file about to be stored.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Key in object storage.
    pub storage_path: String,
    /// File name of the local copy.
    pub local_name: String,
    pub bytes: Bytes,
}

/// Stores uploaded files. Returns the location the file was written to.
pub trait ObjectSink: Send + Sync {
    fn name(&self) -> &str;
    fn put<'a>(&'a self, object: &'a StoredObject) -> BoxFuture<'a, Result<String>>;
}

/// Stores submission metadata.
pub trait RecordSink: Send + Sync {
    fn name(&self) -> &str;
    fn append<'a>(&'a self, record: &'a SubmissionRecord) -> BoxFuture<'a, Result<()>>;
}

/// Local copies under the upload directory, one per user and meal type.
#[derive(Debug, Clone)]
pub struct LocalUploadStore {
    dir: PathBuf,
}

impl LocalUploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        LocalUploadStore { dir: dir.into() }
    }
}

impl ObjectSink for LocalUploadStore {
    fn name(&self) -> &str {
        "local disk"
    }

    fn put<'a>(&'a self, object: &'a StoredObject) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let dir = self.dir.clone();
            let name = object.local_name.clone();
            let bytes = object.bytes.clone();
            let path = tokio::task::spawn_blocking(move || save_upload(&dir, &name, &bytes))
                .await
                .map_err(|e| PortalError::Io(std::io::Error::other(e)))??;
            Ok(path.display().to_string())
        })
    }
}

/// The local CSV log. Appends are serialised so concurrent submissions never
/// interleave lines.
#[derive(Debug)]
pub struct CsvSubmissionLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvSubmissionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvSubmissionLog { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn entries(&self) -> Result<Vec<HistoryEntry>> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_log(&path))
            .await
            .map_err(|e| PortalError::Io(std::io::Error::other(e)))?
    }
}

impl RecordSink for CsvSubmissionLog {
    fn name(&self) -> &str {
        "local log"
    }

    fn append<'a>(&'a self, record: &'a SubmissionRecord) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let _guard = self.lock.lock().await;
            let path = self.path.clone();
            let entry = HistoryEntry::from_record(record);
            tokio::task::spawn_blocking(move || append_to_log(&path, &entry))
                .await
                .map_err(|e| PortalError::Io(std::io::Error::other(e)))?
        })
    }
}

/// A submission as received from the user.
#[derive(Debug, Clone)]
pub struct Submission {
    pub user: String,
    pub meal_type: MealType,
    pub started_at: Option<CivilTime>,
    pub submitted_at: CivilTime,
    pub original_filename: String,
    pub bytes: Bytes,
}

/// What the user is shown after submitting.
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub record: SubmissionRecord,
    /// File name of the local copy.
    pub saved_as: String,
    pub warnings: Vec<String>,
}

/// Fans a submission out to the configured sinks.
///
/// Sinks are tried in order, each exactly once. A failing sink becomes a
/// warning as long as another sink of the same kind succeeded.
#[derive(Clone, Default)]
pub struct Recorder {
    objects: Vec<Arc<dyn ObjectSink>>,
    records: Vec<Arc<dyn RecordSink>>,
}

impl Recorder {
    pub fn new(objects: Vec<Arc<dyn ObjectSink>>, records: Vec<Arc<dyn RecordSink>>) -> Self {
        Recorder { objects, records }
    }

    pub fn object_sinks(&self) -> impl Iterator<Item = &str> {
        self.objects.iter().map(|s| s.name())
    }

    pub fn record_sinks(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|s| s.name())
    }

    /// Store the file, then the record.
    ///
    /// The record's `storage_path` is the location reported by the first
    /// object sink that succeeded. Fails only when every object sink or
    /// every record sink failed.
    pub async fn record(&self, submission: Submission) -> Result<SubmissionReceipt> {
        let object = StoredObject {
            storage_path: storage_path(
                &submission.user,
                submission.meal_type,
                &submission.submitted_at,
            ),
            local_name: local_file_name(&submission.user, submission.meal_type),
            bytes: submission.bytes,
        };

        let mut warnings = Vec::new();
        let mut location = None;
        for sink in &self.objects {
            match sink.put(&object).await {
                Ok(stored) => {
                    info!("Stored upload of '{}' in {}: {stored}", submission.user, sink.name());
                    if location.is_none() {
                        location = Some(stored);
                    }
                }
                Err(e) => {
                    warn!("Failed to store upload in {}: {e}", sink.name());
                    warnings.push(format!("{} 저장 실패: {e}", sink.name()));
                }
            }
        }

        let Some(location) = location else {
            return Err(PortalError::AllSinksFailed(warnings.join("; ")));
        };

        let record = SubmissionRecord::new(
            &submission.user,
            submission.started_at,
            submission.submitted_at,
            submission.meal_type,
            location,
            &submission.original_filename,
        );

        let mut recorded = false;
        for sink in &self.records {
            match sink.append(&record).await {
                Ok(()) => recorded = true,
                Err(e) => {
                    warn!("Failed to record submission in {}: {e}", sink.name());
                    warnings.push(format!("{} 기록 실패: {e}", sink.name()));
                }
            }
        }

        if !recorded {
            return Err(PortalError::AllSinksFailed(warnings.join("; ")));
        }

        info!(
            "Recorded submission: user={} meal={} duration={}s at {}",
            record.user,
            record.meal_type,
            record.duration_seconds,
            format_civil(&record.submitted_at)
        );

        Ok(SubmissionReceipt { record, saved_as: object.local_name, warnings })
    }
}
