use crate::error::{PortalError, Result};
use crate::menu::{
    HEADER_CATEGORY, HEADER_CODE, HEADER_COOK, HEADER_MAJOR, HEADER_MIDDLE, HEADER_NAME, MenuRow,
};
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where the catalog is looked for when no payload is supplied.
pub const DEFAULT_MENU_CANDIDATES: [&str; 3] = [
    "menu.xlsx",
    "/mnt/data/menu.xlsx",
    "/mnt/data/정선_음식 데이터_간식제외.xlsx",
];

/// Container format of a spreadsheet payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Csv,
    /// xlsx, xlsm, xls, xlsb or ods; calamine detects which.
    Workbook,
}

impl SheetFormat {
    /// Detect the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());

        match extension.as_deref() {
            Some("csv") => Ok(SheetFormat::Csv),
            Some("xlsx") | Some("xlsm") | Some("xls") | Some("xlsb") | Some("ods") => {
                Ok(SheetFormat::Workbook)
            }
            Some(ext) => Err(PortalError::UnsupportedFormat(ext.to_string())),
            None => Err(PortalError::UnsupportedFormat("file has no extension".into())),
        }
    }

    /// Guess the format from magic bytes: zip (xlsx/ods) and OLE (xls)
    /// containers are workbooks, anything else is treated as CSV text.
    pub fn sniff(bytes: &[u8]) -> Self {
        const ZIP: &[u8] = b"PK\x03\x04";
        const OLE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

        if bytes.starts_with(ZIP) || bytes.starts_with(OLE) {
            SheetFormat::Workbook
        } else {
            SheetFormat::Csv
        }
    }
}

/// Where a loaded catalog came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuSource {
    Payload,
    File(PathBuf),
}

impl fmt::Display for MenuSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MenuSource::Payload => write!(f, "uploaded payload"),
            MenuSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Result of a one-shot catalog load. Never an error: a failed load is
/// reported as `Unavailable` and rendered as an empty state.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Loaded { source: MenuSource, rows: Vec<MenuRow> },
    Unavailable { reason: String },
}

/// Parse the first sheet of a spreadsheet into menu rows.
///
/// The first row is the header; columns are matched by exact header name and
/// unknown columns are ignored. Missing cells read as empty strings. Rows
/// whose trimmed name is empty are dropped.
///
/// # Arguments
/// * `bytes` - Raw file contents
/// * `format` - CSV text or a calamine-readable workbook
///
/// # Returns
/// * `Result<Vec<MenuRow>>` - Rows in sheet order, or a parse error
pub fn parse_menu(bytes: &[u8], format: SheetFormat) -> Result<Vec<MenuRow>> {
    let table = match format {
        SheetFormat::Csv => read_csv_table(bytes)?,
        SheetFormat::Workbook => read_workbook_table(bytes)?,
    };

    let mut rows = table.into_iter();
    let header = rows
        .next()
        .ok_or_else(|| PortalError::NoData("spreadsheet is empty".into()))?;

    let column = |name: &str| header.iter().position(|h| h == name);
    let name_col = column(HEADER_NAME);
    let category_col = column(HEADER_CATEGORY);
    let code_col = column(HEADER_CODE);
    let major_col = column(HEADER_MAJOR);
    let middle_col = column(HEADER_MIDDLE);
    let cook_col = column(HEADER_COOK);

    if name_col.is_none() {
        warn!("Spreadsheet has no '{HEADER_NAME}' column; every row will be dropped");
    }

    let menu = rows
        .filter_map(|record| {
            let cell = |col: Option<usize>| {
                col.and_then(|c| record.get(c)).map(String::as_str).unwrap_or("")
            };
            MenuRow::from_raw(
                cell(name_col),
                cell(category_col),
                cell(code_col),
                cell(major_col),
                cell(middle_col),
                cell(cook_col),
            )
        })
        .collect();

    Ok(menu)
}

/// Parse a spreadsheet file, picking the format from its extension.
pub fn parse_menu_file(path: impl AsRef<Path>) -> Result<Vec<MenuRow>> {
    let path = path.as_ref();
    let format = SheetFormat::from_path(path)?;
    let bytes = std::fs::read(path)?;
    parse_menu(&bytes, format)
}

/// Load the catalog from a payload, or else from the first candidate path
/// that exists.
///
/// A payload that does not parse falls through to the candidates.
///
/// # Arguments
/// * `payload` - Bytes of an uploaded catalog, if any
/// * `candidates` - Paths probed in order
///
/// # Returns
/// * `LoadOutcome` - The rows and where they came from, or why none loaded
pub fn load_menu(payload: Option<&[u8]>, candidates: &[PathBuf]) -> LoadOutcome {
    if let Some(bytes) = payload {
        match parse_menu(bytes, SheetFormat::sniff(bytes)) {
            Ok(rows) => {
                info!("Loaded {} menu rows from payload", rows.len());
                return LoadOutcome::Loaded { source: MenuSource::Payload, rows };
            }
            Err(e) => warn!("Menu payload could not be parsed, trying files: {e}"),
        }
    }

    let Some(path) = candidates.iter().find(|p| p.is_file()) else {
        let tried = candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        warn!("No menu spreadsheet found (tried: {tried})");
        return LoadOutcome::Unavailable {
            reason: "menu spreadsheet not found".to_string(),
        };
    };

    match parse_menu_file(path) {
        Ok(rows) => {
            info!("Loaded {} menu rows from {}", rows.len(), path.display());
            LoadOutcome::Loaded { source: MenuSource::File(path.clone()), rows }
        }
        Err(e) => {
            warn!("Failed to load menu from {}: {e}", path.display());
            LoadOutcome::Unavailable { reason: e.to_string() }
        }
    }
}

fn read_csv_table(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut table = Vec::new();
    for record in reader.records() {
        let record = record?;
        table.push(record.iter().map(str::to_string).collect());
    }

    Ok(table)
}

fn read_workbook_table(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    use calamine::{Reader, open_workbook_auto_from_rs};

    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| PortalError::Spreadsheet(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PortalError::Spreadsheet("workbook has no sheets".into()))?
        .map_err(|e| PortalError::Spreadsheet(e.to_string()))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn cell_text(cell: &calamine::Data) -> String {
    use calamine::Data;

    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        // Whole numbers read back without a trailing ".0", as a spreadsheet shows them.
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "Menu,Category,음식 분류코드,대분류,중분류,조리법 유형,비고\n\
                       김치볶음밥,밥,R1,곡류,밥류,볶음,x\n\
                       \"  \",국,S1,국류,국,끓임,\n\
                       된장국,국,S1,국류,국,끓임\n";

    #[test]
    fn csv_rows_are_mapped_by_header() {
        let rows = parse_menu(CSV.as_bytes(), SheetFormat::Csv).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "김치볶음밥");
        assert_eq!(rows[0].classification_code, "R1");
        assert_eq!(rows[1].name, "된장국");
        assert_eq!(rows[1].cook_method, "끓임");
    }

    #[test]
    fn missing_columns_default_to_empty() {
        let rows = parse_menu("Category,Menu\n밥,흰쌀밥\n국\n".as_bytes(), SheetFormat::Csv).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "흰쌀밥");
        assert_eq!(rows[0].category, "밥");
        assert_eq!(rows[0].major_group, "");
    }

    #[test]
    fn header_match_is_case_sensitive() {
        let rows = parse_menu("menu,Category\n흰쌀밥,밥\n".as_bytes(), SheetFormat::Csv).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn bom_is_ignored() {
        let mut bytes = b"\xEF\xBB\xBF".to_vec();
        bytes.extend_from_slice("Menu\n잡곡밥\n".as_bytes());
        let rows = parse_menu(&bytes, SheetFormat::Csv).unwrap();
        assert_eq!(rows[0].name, "잡곡밥");
    }

    #[test]
    fn empty_payload_is_no_data() {
        assert!(matches!(
            parse_menu(b"", SheetFormat::Csv),
            Err(PortalError::NoData(_))
        ));
    }

    #[test]
    fn format_detection() {
        assert_eq!(SheetFormat::from_path(Path::new("a.XLSX")).unwrap(), SheetFormat::Workbook);
        assert_eq!(SheetFormat::from_path(Path::new("a.csv")).unwrap(), SheetFormat::Csv);
        assert!(SheetFormat::from_path(Path::new("a.txt")).is_err());
        assert!(SheetFormat::from_path(Path::new("menu")).is_err());
        assert_eq!(SheetFormat::sniff(b"PK\x03\x04rest"), SheetFormat::Workbook);
        assert_eq!(SheetFormat::sniff(b"Menu,Category"), SheetFormat::Csv);
    }

    #[test]
    fn garbage_workbook_is_an_error() {
        assert!(parse_menu(b"PK\x03\x04not a zip", SheetFormat::Workbook).is_err());
    }

    #[test]
    fn missing_candidates_are_unavailable() {
        let outcome = load_menu(None, &[PathBuf::from("/nonexistent/menu.xlsx")]);
        assert!(matches!(outcome, LoadOutcome::Unavailable { .. }));
    }

    #[test]
    fn payload_takes_priority() {
        let outcome = load_menu(Some(CSV.as_bytes()), &[]);
        match outcome {
            LoadOutcome::Loaded { source, rows } => {
                assert_eq!(source, MenuSource::Payload);
                assert_eq!(rows.len(), 2);
            }
            other => panic!("expected Loaded, got {other:?}"),
        }
    }
}
