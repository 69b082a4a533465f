use std::fs::{self, File, OpenOptions, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;

use crate::error::{PortalError, Result};
use crate::history::{HistoryEntry, LOG_COLUMNS};

/// Write an uploaded file into `dir`, replacing any previous copy.
pub fn save_upload(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    create_dir_all(dir)?;
    let path = dir.join(file_name);
    let mut file = File::create(&path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(path)
}

/// Read the local submission log.
///
/// Columns are located by header name, so logs written with fewer or more
/// columns still load; absent columns read as `None`. A missing file is an
/// empty history.
pub fn read_log(path: &Path) -> Result<Vec<HistoryEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record?;
        entries.push(HistoryEntry::from_columns(|name| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}') == name)
                .and_then(|i| record.get(i))
        }));
    }

    Ok(entries)
}

/// Append one entry to the local log.
///
/// A log whose header differs from [`LOG_COLUMNS`] is first rewritten with
/// the current header, keeping its rows.
pub fn append_to_log(path: &Path, entry: &HistoryEntry) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent)?;
    }

    if !path.exists() || fs::metadata(path)?.len() == 0 {
        return rewrite_log(path, std::slice::from_ref(entry));
    }

    if !has_current_header(path)? {
        let mut entries = read_log(path)?;
        entries.push(entry.clone());
        return rewrite_log(path, &entries);
    }

    let file = OpenOptions::new().append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    writer.write_record(entry.to_columns())?;
    writer.flush()?;
    Ok(())
}

fn has_current_header(path: &Path) -> Result<bool> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let headers = reader.headers()?;
    Ok(headers.len() == LOG_COLUMNS.len()
        && headers.iter().zip(LOG_COLUMNS.iter()).all(|(a, b)| a == *b))
}

fn rewrite_log(path: &Path, entries: &[HistoryEntry]) -> Result<()> {
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record(LOG_COLUMNS)?;
        for entry in entries {
            writer.write_record(entry.to_columns())?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// A locally stored upload.
#[derive(Debug, Clone, Serialize)]
pub struct LocalUpload {
    pub name: String,
    pub size: u64,
    #[serde(skip)]
    pub modified: SystemTime,
}

/// Local uploads of `user`: files named `{user}_식단표*.xlsx`, sorted by name.
pub fn list_local_uploads(dir: &Path, user: &str) -> Vec<LocalUpload> {
    let prefix = format!("{user}_식단표");
    let mut files = Vec::new();

    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("xlsx") {
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if !name.starts_with(&prefix) {
                continue;
            }
            let metadata = match fs::metadata(&path) {
                Ok(meta) => meta,
                Err(_) => continue,
            };

            files.push(LocalUpload {
                name: name.to_string(),
                size: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    files
}

/// Resolve a bare file name inside the upload directory, refusing anything
/// that could escape it.
pub fn resolve_upload(dir: &Path, file_name: &str) -> Result<PathBuf> {
    let escapes = file_name.is_empty()
        || file_name.contains(['/', '\\'])
        || file_name == "."
        || file_name == "..";
    if escapes {
        return Err(PortalError::Validation(format!("invalid file name '{file_name}'")));
    }

    let path = dir.join(file_name);
    if !path.is_file() {
        return Err(PortalError::NotFound(file_name.to_string()));
    }
    Ok(path)
}
