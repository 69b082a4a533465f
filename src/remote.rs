use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, header::CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::RemoteConfig;
use crate::error::{PortalError, Result};
use crate::history::HistoryEntry;
use crate::storage::{BoxFuture, ObjectSink, RecordSink, StoredObject};
use crate::submission::SubmissionRecord;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Lifetime of signed download links.
pub const SIGNED_URL_SECONDS: u64 = 3600;

const TABLE: &str = "submissions";
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Row shape of the `submissions` table.
#[derive(Debug, Serialize)]
struct SubmissionRow<'a> {
    #[serde(rename = "사용자")]
    user: &'a str,
    #[serde(rename = "시작시간")]
    started_at: String,
    #[serde(rename = "제출시간")]
    submitted_at: String,
    #[serde(rename = "소요시간(초)")]
    duration_seconds: u64,
    #[serde(rename = "식단표종류")]
    meal_type: &'static str,
    #[serde(rename = "파일경로")]
    storage_path: &'a str,
    #[serde(rename = "원본파일명")]
    original_filename: &'a str,
}

impl<'a> From<&'a SubmissionRecord> for SubmissionRow<'a> {
    fn from(record: &'a SubmissionRecord) -> Self {
        SubmissionRow {
            user: &record.user,
            started_at: record.started_at.to_rfc3339(),
            submitted_at: record.submitted_at.to_rfc3339(),
            duration_seconds: record.duration_seconds,
            meal_type: record.meal_type.label(),
            storage_path: &record.storage_path,
            original_filename: &record.original_filename,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SignedUrl {
    #[serde(rename = "signedURL", alias = "signed_url", alias = "signedUrl")]
    signed_url: Option<String>,
}

pub struct RemoteStorage {
    client: Client,
    config: RemoteConfig,
}

impl RemoteStorage {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let client = Client::builder().timeout(CLIENT_TIMEOUT).build()?;
        Ok(RemoteStorage { client, config })
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key)
    }

    fn object_url(&self, prefix: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/{prefix}/{}/{}",
            self.config.url,
            urlencoding::encode(&self.config.bucket),
            encode_path(path)
        )
    }

    /// Upload (or overwrite) an object. Returns its path inside the bucket.
    pub async fn upload(&self, path: &str, bytes: impl Into<reqwest::Body>) -> Result<String> {
        let request = self
            .client
            .post(self.object_url("object", path))
            .header(CONTENT_TYPE, XLSX_CONTENT_TYPE)
            .header("cache-control", "max-age=3600")
            .header("x-upsert", "true")
            .body(bytes);

        check(self.authorized(request).send().await?).await?;
        Ok(path.to_string())
    }

    pub async fn insert(&self, record: &SubmissionRecord) -> Result<()> {
        let request = self
            .client
            .post(format!("{}/rest/v1/{TABLE}", self.config.url))
            .header("Prefer", "return=minimal")
            .json(&SubmissionRow::from(record));

        check(self.authorized(request).send().await?).await?;
        Ok(())
    }

    /// Every stored submission, newest first.
    pub async fn list(&self) -> Result<Vec<HistoryEntry>> {
        let request = self
            .client
            .get(format!("{}/rest/v1/{TABLE}", self.config.url))
            .query(&[("select", "*"), ("order", "제출시간.desc")]);

        let response = check(self.authorized(request).send().await?).await?;
        Ok(response.json().await?)
    }

    /// A time-limited download link for an object.
    pub async fn signed_url(&self, path: &str, expires_in: u64) -> Result<String> {
        let request = self
            .client
            .post(self.object_url("object/sign", path))
            .json(&json!({ "expiresIn": expires_in }));

        let response = check(self.authorized(request).send().await?).await?;
        let signed: SignedUrl = response.json().await?;
        match signed.signed_url.filter(|url| !url.is_empty()) {
            Some(url) => Ok(absolute_signed_url(&self.config.url, &url)),
            None => Err(PortalError::NotFound(format!("signed URL for {path}"))),
        }
    }
}

impl ObjectSink for RemoteStorage {
    fn name(&self) -> &str {
        "remote storage"
    }

    fn put<'a>(&'a self, object: &'a StoredObject) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.upload(&object.storage_path, object.bytes.clone()))
    }
}

impl RecordSink for RemoteStorage {
    fn name(&self) -> &str {
        "remote table"
    }

    fn append<'a>(&'a self, record: &'a SubmissionRecord) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.insert(record))
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PortalError::Remote { status: status.as_u16(), body })
}

/// Percent-encode each segment of an object path, keeping the slashes.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// The service answers with a path relative to `/storage/v1`.
fn absolute_signed_url(base: &str, signed: &str) -> String {
    if signed.starts_with("http://") || signed.starts_with("https://") {
        signed.to_string()
    } else if signed.starts_with("/storage/v1/") {
        format!("{base}{signed}")
    } else {
        format!("{base}/storage/v1/{}", signed.trim_start_matches('/'))
    }
}
