use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use unicode_normalization::UnicodeNormalization;

use crate::error::PortalError;

/// Name of the civil timezone every timestamp is expressed in.
pub const CIVIL_TIMEZONE: &str = "Asia/Seoul";

/// `YYYY-MM-DD HH:MM:SS`, used in the local log and on screen.
pub const CIVIL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

lazy_static! {
    /// Asia/Seoul has been UTC+09:00 without daylight saving since 1988.
    static ref SEOUL: FixedOffset = FixedOffset::east_opt(9 * 3600).unwrap();
    static ref UNSAFE_RUN: Regex = Regex::new(r"[^A-Za-z0-9._-]+").unwrap();
}

/// Wall-clock time in [`CIVIL_TIMEZONE`].
pub type CivilTime = DateTime<FixedOffset>;

pub fn civil_now() -> CivilTime {
    to_civil(Utc::now())
}

pub fn to_civil(instant: DateTime<Utc>) -> CivilTime {
    instant.with_timezone(&*SEOUL)
}

pub fn format_civil(time: &CivilTime) -> String {
    time.format(CIVIL_FORMAT).to_string()
}

/// Parse a stored timestamp: either the civil `YYYY-MM-DD HH:MM:SS` form or
/// RFC 3339 with an explicit offset.
pub fn parse_civil(text: &str) -> Option<CivilTime> {
    let text = text.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, CIVIL_FORMAT) {
        return SEOUL.from_local_datetime(&naive).single();
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|t| t.with_timezone(&*SEOUL))
}

/// Whole seconds between start and submit, never negative.
pub fn duration_seconds(started_at: &CivilTime, submitted_at: &CivilTime) -> u64 {
    submitted_at
        .signed_duration_since(*started_at)
        .num_seconds()
        .max(0) as u64
}

/// The two meal-plan templates users fill in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MealType {
    #[default]
    #[serde(rename = "식단표A")]
    A,
    #[serde(rename = "식단표B")]
    B,
}

impl MealType {
    pub const ALL: [MealType; 2] = [MealType::A, MealType::B];

    /// Label stored in records, e.g. `식단표A`.
    pub fn label(self) -> &'static str {
        match self {
            MealType::A => "식단표A",
            MealType::B => "식단표B",
        }
    }

    pub fn letter(self) -> &'static str {
        match self {
            MealType::A => "A",
            MealType::B => "B",
        }
    }

    /// File name of the blank template in the templates directory.
    pub fn template_file_name(self) -> &'static str {
        match self {
            MealType::A => "식단표 A.xlsx",
            MealType::B => "식단표 B.xlsx",
        }
    }

    /// File name offered to the browser when the template is downloaded.
    pub fn download_file_name(self) -> &'static str {
        match self {
            MealType::A => "식단표_A_템플릿.xlsx",
            MealType::B => "식단표_B_템플릿.xlsx",
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MealType {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" | "식단표A" => Ok(MealType::A),
            "B" | "b" | "식단표B" => Ok(MealType::B),
            other => Err(PortalError::Validation(format!("unknown meal type '{other}'"))),
        }
    }
}

/// Reduce `text` to a storage-safe ASCII slug.
///
/// The text is NFKD-decomposed and whatever is still non-ASCII is dropped,
/// so accented Latin letters keep their base letter. Runs of anything outside
/// `[A-Za-z0-9._-]` become `-`, and leading/trailing `-._` are trimmed.
/// Falls back to `file` when nothing is left.
pub fn ascii_slug(text: &str) -> String {
    let ascii: String = text.trim().nfkd().filter(char::is_ascii).collect();
    let slug = UNSAFE_RUN.replace_all(&ascii, "-");
    let slug = slug.trim_matches(|c| c == '-' || c == '.' || c == '_');

    if slug.is_empty() {
        "file".to_string()
    } else {
        slug.to_string()
    }
}

/// Object-storage key for a submission:
/// `{user}/{YYYY}/{MM}/{user}_{meal}_{YYYYMMDD-HHMMSS}.xlsx`.
pub fn storage_path(user: &str, meal_type: MealType, at: &CivilTime) -> String {
    let user = ascii_slug(user);
    let meal = ascii_slug(meal_type.label());
    let stamp = at.format("%Y%m%d-%H%M%S");

    format!(
        "{user}/{}/{}/{user}_{meal}_{stamp}.xlsx",
        at.format("%Y"),
        at.format("%m")
    )
}

/// File name of the local copy: one file per user and meal type.
pub fn local_file_name(user: &str, meal_type: MealType) -> String {
    let user: String = user
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    format!("{user}_{}.xlsx", meal_type.label())
}

/// Only `.xlsx` and `.xls` uploads are accepted.
pub fn check_upload_name(file_name: &str) -> Result<(), PortalError> {
    let extension = std::path::Path::new(file_name.trim())
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("xlsx") | Some("xls") => Ok(()),
        _ => Err(PortalError::UnsupportedFormat(format!(
            "'{file_name}': xlsx 또는 xls 파일만 업로드할 수 있습니다."
        ))),
    }
}

/// One completed submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub user: String,
    pub started_at: CivilTime,
    pub submitted_at: CivilTime,
    pub duration_seconds: u64,
    pub meal_type: MealType,
    pub storage_path: String,
    pub original_filename: String,
}

impl SubmissionRecord {
    /// Build a record, deriving the clamped duration. A missing start time
    /// means the task was never started and counts as zero seconds.
    pub fn new(
        user: &str,
        started_at: Option<CivilTime>,
        submitted_at: CivilTime,
        meal_type: MealType,
        storage_path: String,
        original_filename: &str,
    ) -> Self {
        let started_at = started_at.unwrap_or(submitted_at);
        SubmissionRecord {
            user: user.to_string(),
            duration_seconds: duration_seconds(&started_at, &submitted_at),
            started_at,
            submitted_at,
            meal_type,
            storage_path,
            original_filename: original_filename.to_string(),
        }
    }
}
