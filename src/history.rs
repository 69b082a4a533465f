use serde::{Deserialize, Deserializer, Serialize};

use crate::submission::{CivilTime, SubmissionRecord, format_civil, parse_civil};

pub const COL_USER: &str = "사용자";
pub const COL_STARTED_AT: &str = "시작시간";
pub const COL_SUBMITTED_AT: &str = "제출시간";
pub const COL_DURATION: &str = "소요시간(초)";
pub const COL_MEAL_TYPE: &str = "식단표종류";
pub const COL_STORAGE_PATH: &str = "파일경로";
pub const COL_ORIGINAL_NAME: &str = "원본파일명";

/// Column order of the local log and of history exports.
pub const LOG_COLUMNS: [&str; 7] = [
    COL_USER,
    COL_STARTED_AT,
    COL_SUBMITTED_AT,
    COL_DURATION,
    COL_MEAL_TYPE,
    COL_STORAGE_PATH,
    COL_ORIGINAL_NAME,
];

/// One stored submission, read back from the local log or the remote table.
///
/// Stored logs may predate some columns or carry extra ones, so every field
/// is optional. Timestamps are kept as stored text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "사용자", default)]
    pub user: Option<String>,
    #[serde(rename = "시작시간", default)]
    pub started_at: Option<String>,
    #[serde(rename = "제출시간", default)]
    pub submitted_at: Option<String>,
    #[serde(rename = "소요시간(초)", default, deserialize_with = "lenient_seconds")]
    pub duration_seconds: Option<u64>,
    #[serde(rename = "식단표종류", default)]
    pub meal_type: Option<String>,
    #[serde(rename = "파일경로", default)]
    pub storage_path: Option<String>,
    #[serde(rename = "원본파일명", default)]
    pub original_filename: Option<String>,
}

impl HistoryEntry {
    /// Entry as written to the local log.
    pub fn from_record(record: &SubmissionRecord) -> Self {
        HistoryEntry {
            user: Some(record.user.clone()),
            started_at: Some(format_civil(&record.started_at)),
            submitted_at: Some(format_civil(&record.submitted_at)),
            duration_seconds: Some(record.duration_seconds),
            meal_type: Some(record.meal_type.label().to_string()),
            storage_path: Some(record.storage_path.clone()),
            original_filename: Some(record.original_filename.clone()),
        }
    }

    /// Build from a header-indexed row; `get` returns the cell under a
    /// column name, or `None` when the column is absent.
    pub fn from_columns<'a>(get: impl Fn(&str) -> Option<&'a str>) -> Self {
        let text = |name: &str| {
            get(name)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        HistoryEntry {
            user: text(COL_USER),
            started_at: text(COL_STARTED_AT),
            submitted_at: text(COL_SUBMITTED_AT),
            duration_seconds: text(COL_DURATION).and_then(|v| parse_seconds(&v)),
            meal_type: text(COL_MEAL_TYPE),
            storage_path: text(COL_STORAGE_PATH),
            original_filename: text(COL_ORIGINAL_NAME),
        }
    }

    /// Cells in [`LOG_COLUMNS`] order, absent values as empty strings.
    pub fn to_columns(&self) -> [String; 7] {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        [
            text(&self.user),
            text(&self.started_at),
            text(&self.submitted_at),
            self.duration_seconds.map(|d| d.to_string()).unwrap_or_default(),
            text(&self.meal_type),
            text(&self.storage_path),
            text(&self.original_filename),
        ]
    }

    pub fn submitted_at_civil(&self) -> Option<CivilTime> {
        self.submitted_at.as_deref().and_then(parse_civil)
    }

    /// Submit time shown on screen, normalised to the civil format when it
    /// parses.
    pub fn submitted_display(&self) -> String {
        match (self.submitted_at_civil(), &self.submitted_at) {
            (Some(t), _) => format_civil(&t),
            (None, Some(raw)) => raw.clone(),
            (None, None) => String::new(),
        }
    }
}

/// Durations arrive as integers, floats (`45.0` from older logs) or text.
fn parse_seconds(text: &str) -> Option<u64> {
    let text = text.trim();
    text.parse::<u64>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u64))
}

fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Some(serde_json::Value::String(s)) => parse_seconds(&s),
        _ => None,
    })
}

/// Figures shown above the history table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    pub total: usize,
    pub users: usize,
    /// Mean duration rounded down; entries without a duration are skipped.
    pub average_seconds: u64,
    pub today: usize,
}

/// Compute the summary figures. `today` is a `YYYY-MM-DD` date in the civil
/// timezone.
pub fn stats(entries: &[HistoryEntry], today: &str) -> HistoryStats {
    let durations: Vec<u64> = entries.iter().filter_map(|e| e.duration_seconds).collect();
    let average_seconds = if durations.is_empty() {
        0
    } else {
        (durations.iter().map(|&d| u128::from(d)).sum::<u128>() / durations.len() as u128) as u64
    };

    let today_count = entries
        .iter()
        .filter(|e| match e.submitted_at_civil() {
            Some(t) => t.format("%Y-%m-%d").to_string() == today,
            None => e.submitted_at.as_deref().is_some_and(|s| s.contains(today)),
        })
        .count();

    HistoryStats {
        total: entries.len(),
        users: distinct_users(entries).len(),
        average_seconds,
        today: today_count,
    }
}

/// Users in order of first appearance.
pub fn distinct_users(entries: &[HistoryEntry]) -> Vec<String> {
    let mut users: Vec<String> = Vec::new();
    for user in entries.iter().filter_map(|e| e.user.as_ref()) {
        if !users.contains(user) {
            users.push(user.clone());
        }
    }
    users
}

/// Entries of one user, most recent first.
pub fn entries_for<'a>(entries: &'a [HistoryEntry], user: &str) -> Vec<&'a HistoryEntry> {
    let mut mine: Vec<&HistoryEntry> = entries
        .iter()
        .filter(|e| e.user.as_deref() == Some(user))
        .collect();
    sort_newest_first(&mut mine);
    mine
}

/// Order by submit time, newest first. Unparseable times sort last.
pub fn sort_newest_first(entries: &mut [&HistoryEntry]) {
    entries.sort_by(|a, b| b.submitted_at_civil().cmp(&a.submitted_at_civil()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(user: &str, submitted: &str, duration: Option<u64>) -> HistoryEntry {
        HistoryEntry {
            user: Some(user.into()),
            submitted_at: Some(submitted.into()),
            duration_seconds: duration,
            ..HistoryEntry::default()
        }
    }

    #[test]
    fn stats_summarise_entries() {
        let entries = vec![
            entry("SR01", "2025-10-01 09:00:00", Some(30)),
            entry("SR02", "2025-10-02 09:00:00", Some(45)),
            entry("SR01", "2025-10-02T01:00:00+00:00", None),
        ];
        let s = stats(&entries, "2025-10-02");
        assert_eq!(s.total, 3);
        assert_eq!(s.users, 2);
        assert_eq!(s.average_seconds, 37);
        assert_eq!(s.today, 2);
    }

    #[test]
    fn stats_of_nothing_are_zero() {
        assert_eq!(stats(&[], "2025-10-02"), HistoryStats::default());
    }

    #[test]
    fn remote_rows_deserialize_leniently() {
        let json = r#"[
            {"사용자":"SR01","제출시간":"2025-10-01T12:00:00+09:00","소요시간(초)":12,"id":7},
            {"사용자":"SR02","소요시간(초)":"40"},
            {"사용자":"SR03","소요시간(초)":null,"파일경로":"SR03/2025/10/x.xlsx"}
        ]"#;
        let entries: Vec<HistoryEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries[0].duration_seconds, Some(12));
        assert_eq!(entries[1].duration_seconds, Some(40));
        assert_eq!(entries[2].duration_seconds, None);
        assert_eq!(entries[2].storage_path.as_deref(), Some("SR03/2025/10/x.xlsx"));
        assert_eq!(entries[1].meal_type, None);
    }

    #[test]
    fn per_user_entries_are_newest_first() {
        let entries = vec![
            entry("SR01", "2025-10-01 09:00:00", None),
            entry("SR02", "2025-10-03 09:00:00", None),
            entry("SR01", "2025-10-02 09:00:00", None),
        ];
        let mine = entries_for(&entries, "SR01");
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].submitted_at.as_deref(), Some("2025-10-02 09:00:00"));
        assert_eq!(distinct_users(&entries), vec!["SR01", "SR02"]);
    }

    #[test]
    fn huge_durations_do_not_overflow_the_average() {
        let e = HistoryEntry::from_columns(|name| match name {
            COL_USER => Some("SR01"),
            COL_DURATION => Some("1e30"),
            _ => None,
        });
        assert_eq!(e.duration_seconds, Some(u64::MAX));

        let s = stats(&[e.clone(), e], "2025-10-02");
        assert_eq!(s.total, 2);
        assert_eq!(s.average_seconds, u64::MAX);
    }

    #[test]
    fn float_durations_from_old_logs() {
        let e = HistoryEntry::from_columns(|name| (name == COL_DURATION).then_some("45.0"));
        assert_eq!(e.duration_seconds, Some(45));
        assert_eq!(e.user, None);
    }
}
