use mealplan_portal::catalog::{Catalog, CategoryFilter, DependentField, Selection};
use mealplan_portal::loader::{LoadOutcome, MenuSource, SheetFormat, load_menu, parse_menu};
use rust_xlsxwriter::Workbook;
use std::path::PathBuf;
use tempfile::tempdir;

const HEADER: [&str; 6] = ["Menu", "Category", "음식 분류코드", "대분류", "중분류", "조리법 유형"];

/// A workbook with numeric classification codes, blank names and padding.
fn menu_workbook() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (c, name) in HEADER.iter().enumerate() {
        sheet.write_string(0, c as u16, *name).unwrap();
    }

    let rows: [(&str, &str, f64, &str, &str, &str); 5] = [
        (" 김치볶음밥 ", "밥", 101.0, "곡류", "밥류", "볶음"),
        ("된장국", "국", 201.0, "국류", "국", "끓임"),
        ("", "국", 202.0, "국류", "국", "끓임"),
        ("제육볶음", "주찬", 301.0, "육류", "볶음류", "볶음"),
        ("배추김치", "김치", 501.5, "채소류", "김치류", "절임"),
    ];
    for (r, (name, category, code, major, middle, cook)) in rows.iter().enumerate() {
        let r = (r + 1) as u32;
        sheet.write_string(r, 0, *name).unwrap();
        sheet.write_string(r, 1, *category).unwrap();
        sheet.write_number(r, 2, *code).unwrap();
        sheet.write_string(r, 3, *major).unwrap();
        sheet.write_string(r, 4, *middle).unwrap();
        sheet.write_string(r, 5, *cook).unwrap();
    }

    workbook.save_to_buffer().unwrap()
}

#[test]
fn workbook_rows_are_trimmed_and_numbers_render_as_text() {
    let rows = parse_menu(&menu_workbook(), SheetFormat::Workbook).unwrap();

    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].name, "김치볶음밥");
    assert_eq!(rows[0].classification_code, "101");
    assert_eq!(rows[3].classification_code, "501.5");
    assert!(rows.iter().all(|r| !r.name.is_empty()));
}

#[test]
fn first_existing_candidate_is_loaded() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("menu.xlsx");
    std::fs::write(&path, menu_workbook()).unwrap();

    let candidates = vec![dir.path().join("missing.xlsx"), path.clone()];
    match load_menu(None, &candidates) {
        LoadOutcome::Loaded { source, rows } => {
            assert_eq!(source, MenuSource::File(path));
            assert_eq!(rows.len(), 4);
        }
        other => panic!("expected Loaded, got {other:?}"),
    }
}

#[test]
fn unparseable_payload_falls_back_to_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("menu.xlsx");
    std::fs::write(&path, menu_workbook()).unwrap();

    let outcome = load_menu(Some(b"PK\x03\x04broken"), &[path.clone()]);
    assert!(matches!(outcome, LoadOutcome::Loaded { source: MenuSource::File(p), .. } if p == path));
}

#[test]
fn corrupt_file_is_unavailable_not_a_crash() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("menu.xlsx");
    std::fs::write(&path, b"not a workbook").unwrap();

    let catalog = Catalog::from_outcome(load_menu(None, &[path]));
    assert!(catalog.is_empty());
    assert!(catalog.unavailable_reason().is_some());
}

#[test]
fn loaded_workbook_drives_the_filter_engine() {
    let rows = parse_menu(&menu_workbook(), SheetFormat::Workbook).unwrap();
    let catalog = Catalog::new(rows);

    let view = catalog.view(&Selection::new(CategoryFilter::parse("주찬")));
    assert_eq!(view.visible.len(), 1);
    assert_eq!(view.visible[0].row.name, "제육볶음");

    // Search applies to rows but not to option lists.
    let searched = Selection::default().with_search("볶음");
    let names: Vec<_> = catalog.view(&searched).visible.iter().map(|v| v.row.name.clone()).collect();
    assert_eq!(names, vec!["김치볶음밥", "제육볶음"]);

    let cooked = Selection::new(CategoryFilter::parse("국"))
        .with(DependentField::CookMethod, "볶음");
    let view = catalog.view(&cooked);
    assert_eq!(view.selectors[3].selected, None);
    assert_eq!(view.selectors[3].options, vec!["끓임"]);
}

#[test]
fn candidate_list_may_be_empty() {
    let empty: Vec<PathBuf> = Vec::new();
    assert!(matches!(load_menu(None, &empty), LoadOutcome::Unavailable { .. }));
}
