use crate::error::{PortalError, Result};
use crate::history::{HistoryEntry, LOG_COLUMNS};

/// Byte order mark so spreadsheet programs open the Korean headers as UTF-8.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Convert submission history to CSV format
///
/// Columns follow [`LOG_COLUMNS`]; absent values are written as empty cells
/// and quoting is left to the `csv` writer. The output starts with a UTF-8
/// byte order mark.
///
/// # Arguments
/// * `entries` - History entries in display order
///
/// # Returns
/// * `Result<Vec<u8>>` - CSV content or an error
pub fn to_csv(entries: &[HistoryEntry]) -> Result<Vec<u8>> {
    let mut buffer = UTF8_BOM.to_vec();
    {
        let mut writer = csv::Writer::from_writer(&mut buffer);
        writer.write_record(LOG_COLUMNS)?;
        for entry in entries {
            writer.write_record(entry.to_columns())?;
        }
        writer.flush()?;
    }
    Ok(buffer)
}

/// Convert submission history to XLSX format
///
/// Writes one worksheet named `submissions` with a bold header row.
/// Durations are stored as numbers, everything else as text.
///
/// # Arguments
/// * `entries` - History entries in display order
///
/// # Returns
/// * `Result<Vec<u8>>` - XLSX file content as bytes or an error
pub fn to_xlsx(entries: &[HistoryEntry]) -> Result<Vec<u8>> {
    use rust_xlsxwriter::{Format, Workbook};

    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("submissions").map_err(xlsx_error)?;

    for (c, name) in LOG_COLUMNS.iter().enumerate() {
        worksheet
            .write_string_with_format(0, c as u16, *name, &header)
            .map_err(xlsx_error)?;
    }

    for (r, entry) in entries.iter().enumerate() {
        let row = (r + 1) as u32;
        for (c, value) in entry.to_columns().iter().enumerate() {
            let col = c as u16;
            if c == 3 {
                if let Some(seconds) = entry.duration_seconds {
                    worksheet.write_number(row, col, seconds as f64).map_err(xlsx_error)?;
                }
            } else if !value.is_empty() {
                worksheet.write_string(row, col, value).map_err(xlsx_error)?;
            }
        }
    }

    workbook.save_to_buffer().map_err(xlsx_error)
}

fn xlsx_error(e: rust_xlsxwriter::XlsxError) -> PortalError {
    PortalError::Spreadsheet(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{Data, Reader, Xlsx};
    use std::io::Cursor;

    fn entries() -> Vec<HistoryEntry> {
        vec![
            HistoryEntry {
                user: Some("SR01".into()),
                submitted_at: Some("2025-10-01 10:00:45".into()),
                duration_seconds: Some(45),
                original_filename: Some("식단, 최종.xlsx".into()),
                ..HistoryEntry::default()
            },
            HistoryEntry { user: Some("SR02".into()), ..HistoryEntry::default() },
        ]
    }

    #[test]
    fn csv_has_bom_header_and_quoting() {
        let text = String::from_utf8(to_csv(&entries()).unwrap()).unwrap();
        let text = text.strip_prefix('\u{feff}').unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), LOG_COLUMNS.join(","));
        assert_eq!(lines.next().unwrap(), "SR01,,2025-10-01 10:00:45,45,,,\"식단, 최종.xlsx\"");
        assert_eq!(lines.next().unwrap(), "SR02,,,,,,");
    }

    #[test]
    fn xlsx_reads_back() {
        let bytes = to_xlsx(&entries()).unwrap();
        let mut workbook: Xlsx<_> = calamine::open_workbook_from_rs(Cursor::new(bytes)).unwrap();
        let range = workbook.worksheet_range("submissions").unwrap();

        assert_eq!(range.get_value((0, 0)), Some(&Data::String("사용자".into())));
        assert_eq!(range.get_value((1, 0)), Some(&Data::String("SR01".into())));
        assert_eq!(range.get_value((1, 3)), Some(&Data::Float(45.0)));
        assert_eq!(range.get_value((2, 0)), Some(&Data::String("SR02".into())));
    }
}
