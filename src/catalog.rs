use crate::collation;
use crate::loader::{LoadOutcome, MenuSource};
use crate::menu::{CATEGORIES, HEADER_CODE, HEADER_COOK, HEADER_MAJOR, HEADER_MIDDLE, MenuRow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Category restriction of a selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    All,
    Named(String),
}

impl CategoryFilter {
    /// `""`, `"all"` and `"전체"` all mean no restriction.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "all" | "전체" => CategoryFilter::All,
            name => CategoryFilter::Named(name.to_string()),
        }
    }

    pub fn matches(&self, row: &MenuRow) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Named(name) => row.category == *name,
        }
    }

    /// Value used in query strings.
    pub fn as_param(&self) -> &str {
        match self {
            CategoryFilter::All => "all",
            CategoryFilter::Named(name) => name,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, CategoryFilter::All)
    }
}

/// One of the four mutually constraining selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependentField {
    ClassificationCode,
    MajorGroup,
    MiddleGroup,
    CookMethod,
}

impl DependentField {
    pub const ALL: [DependentField; 4] = [
        DependentField::ClassificationCode,
        DependentField::MajorGroup,
        DependentField::MiddleGroup,
        DependentField::CookMethod,
    ];

    pub fn value_of(self, row: &MenuRow) -> &str {
        match self {
            DependentField::ClassificationCode => &row.classification_code,
            DependentField::MajorGroup => &row.major_group,
            DependentField::MiddleGroup => &row.middle_group,
            DependentField::CookMethod => &row.cook_method,
        }
    }

    /// Query-string parameter name.
    pub fn param(self) -> &'static str {
        match self {
            DependentField::ClassificationCode => "code",
            DependentField::MajorGroup => "major",
            DependentField::MiddleGroup => "middle",
            DependentField::CookMethod => "cook",
        }
    }

    /// Display label, which is also the spreadsheet header.
    pub fn label(self) -> &'static str {
        match self {
            DependentField::ClassificationCode => HEADER_CODE,
            DependentField::MajorGroup => HEADER_MAJOR,
            DependentField::MiddleGroup => HEADER_MIDDLE,
            DependentField::CookMethod => HEADER_COOK,
        }
    }
}

/// Transient filter state of one catalog view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub category: CategoryFilter,
    pub search_text: String,
    pub classification_code: Option<String>,
    pub major_group: Option<String>,
    pub middle_group: Option<String>,
    pub cook_method: Option<String>,
}

impl Selection {
    pub fn new(category: CategoryFilter) -> Self {
        Selection { category, ..Selection::default() }
    }

    pub fn get(&self, field: DependentField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    /// Set a dependent value. Blank values mean "no constraint".
    pub fn set(&mut self, field: DependentField, value: Option<&str>) {
        *self.slot_mut(field) = value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
    }

    /// Builder form of [`Selection::set`].
    pub fn with(mut self, field: DependentField, value: &str) -> Self {
        self.set(field, Some(value));
        self
    }

    pub fn with_search(mut self, text: &str) -> Self {
        self.search_text = text.to_string();
        self
    }

    pub fn clear_dependents(&mut self) {
        for field in DependentField::ALL {
            self.set(field, None);
        }
    }

    fn slot(&self, field: DependentField) -> &Option<String> {
        match field {
            DependentField::ClassificationCode => &self.classification_code,
            DependentField::MajorGroup => &self.major_group,
            DependentField::MiddleGroup => &self.middle_group,
            DependentField::CookMethod => &self.cook_method,
        }
    }

    fn slot_mut(&mut self, field: DependentField) -> &mut Option<String> {
        match field {
            DependentField::ClassificationCode => &mut self.classification_code,
            DependentField::MajorGroup => &mut self.major_group,
            DependentField::MiddleGroup => &mut self.middle_group,
            DependentField::CookMethod => &mut self.cook_method,
        }
    }

    /// Whether `row` satisfies every set dependent constraint except `skip`.
    fn matches_dependents(&self, row: &MenuRow, skip: Option<DependentField>) -> bool {
        DependentField::ALL
            .into_iter()
            .filter(|field| Some(*field) != skip)
            .all(|field| match self.get(field) {
                Some(wanted) => field.value_of(row) == wanted,
                None => true,
            })
    }
}

/// Query-string form of a selection, as sent by the catalog page.
///
/// `from` names the category the client is leaving. When it differs from
/// `category` the request is a category switch and the dependent values
/// are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogQuery {
    pub category: Option<String>,
    pub q: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub major: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub middle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cook: Option<String>,
}

impl From<CatalogQuery> for Selection {
    fn from(query: CatalogQuery) -> Self {
        let mut selection = Selection {
            category: CategoryFilter::parse(query.category.as_deref().unwrap_or("")),
            search_text: query.q.unwrap_or_default(),
            ..Selection::default()
        };
        selection.set(DependentField::ClassificationCode, query.code.as_deref());
        selection.set(DependentField::MajorGroup, query.major.as_deref());
        selection.set(DependentField::MiddleGroup, query.middle.as_deref());
        selection.set(DependentField::CookMethod, query.cook.as_deref());

        match query.from.as_deref().map(CategoryFilter::parse) {
            Some(previous) if previous != selection.category => {
                let category = selection.category.clone();
                switch_category(&selection, category)
            }
            _ => selection,
        }
    }
}

impl Selection {
    /// Query-string form of this selection. `from` marks a category switch.
    pub fn to_query(&self, from: Option<&CategoryFilter>) -> CatalogQuery {
        CatalogQuery {
            category: Some(self.category.as_param().to_string()),
            q: Some(self.search_text.clone()),
            from: from.map(|c| c.as_param().to_string()),
            code: self.classification_code.clone(),
            major: self.major_group.clone(),
            middle: self.middle_group.clone(),
            cook: self.cook_method.clone(),
        }
    }
}

/// Rows shown for `selection`, in load order.
///
/// Category, then case-insensitive name search, then the exact-match
/// dependent constraints.
pub fn compute_visible_rows<'a>(rows: &'a [MenuRow], selection: &Selection) -> Vec<&'a MenuRow> {
    let needle = selection.search_text.trim().to_lowercase();

    rows.iter()
        .filter(|row| selection.category.matches(row))
        .filter(|row| needle.is_empty() || row.name.to_lowercase().contains(&needle))
        .filter(|row| selection.matches_dependents(row, None))
        .collect()
}

/// Legal values for `field` given the category and the other three
/// selections, distinct, non-empty and in Korean collation order.
///
/// The current value of `field` itself plays no part, so a selector never
/// narrows its own list. Text search does not touch option lists.
///
/// # Arguments
/// * `rows` - All loaded rows
/// * `selection` - Current category and dependent selections
/// * `field` - Selector whose options are wanted
///
/// # Returns
/// * `Vec<String>` - The options to offer for `field`
pub fn compute_allowed_values(
    rows: &[MenuRow],
    selection: &Selection,
    field: DependentField,
) -> Vec<String> {
    let distinct: BTreeSet<&str> = rows
        .iter()
        .filter(|row| selection.category.matches(row))
        .filter(|row| selection.matches_dependents(row, Some(field)))
        .map(|row| field.value_of(row))
        .filter(|value| !value.is_empty())
        .collect();

    let mut values: Vec<String> = distinct.into_iter().map(str::to_string).collect();
    collation::sort(&mut values);
    values
}

/// Drop dependent values that are no longer legal.
///
/// All four option lists are computed from the incoming selection first and
/// then every stale value is reset to "no constraint". Under the "all"
/// category the dependent selectors are hidden, so they are cleared.
pub fn reconcile(rows: &[MenuRow], selection: &Selection) -> Selection {
    let mut reconciled = selection.clone();

    if selection.category.is_all() {
        reconciled.clear_dependents();
        return reconciled;
    }

    for field in DependentField::ALL {
        if let Some(current) = selection.get(field) {
            let allowed = compute_allowed_values(rows, selection, field);
            if !allowed.iter().any(|v| v == current) {
                reconciled.set(field, None);
            }
        }
    }

    reconciled
}

/// Move to another category. Dependent selections are reset; the search
/// text is kept.
pub fn switch_category(selection: &Selection, category: CategoryFilter) -> Selection {
    Selection {
        category,
        search_text: selection.search_text.clone(),
        ..Selection::default()
    }
}

/// Option list of one dependent selector.
#[derive(Debug, Clone, Serialize)]
pub struct SelectorOptions {
    pub field: DependentField,
    pub param: &'static str,
    pub label: &'static str,
    pub selected: Option<String>,
    pub options: Vec<String>,
}

/// A visible row with its 1-based position.
#[derive(Debug, Clone, Serialize)]
pub struct VisibleRow<'a> {
    pub number: usize,
    #[serde(flatten)]
    pub row: &'a MenuRow,
}

/// Everything the catalog page renders.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogView<'a> {
    pub category: String,
    pub search_text: String,
    pub categories: Vec<CategoryButton>,
    pub total: usize,
    pub shown: usize,
    pub visible: Vec<VisibleRow<'a>>,
    pub show_dependent: bool,
    pub selectors: Vec<SelectorOptions>,
    pub unavailable: Option<String>,
    #[serde(skip)]
    pub selection: Selection,
}

/// A category button. `query` is the selection after switching to it.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryButton {
    pub label: &'static str,
    pub param: &'static str,
    pub active: bool,
    pub query: CatalogQuery,
}

/// The loaded menu, or the reason it could not be loaded.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    rows: Vec<MenuRow>,
    source: Option<MenuSource>,
    unavailable: Option<String>,
}

impl Catalog {
    pub fn new(rows: Vec<MenuRow>) -> Self {
        Catalog { rows, source: None, unavailable: None }
    }

    pub fn from_outcome(outcome: LoadOutcome) -> Self {
        match outcome {
            LoadOutcome::Loaded { source, rows } => Catalog {
                rows,
                source: Some(source),
                unavailable: None,
            },
            LoadOutcome::Unavailable { reason } => Catalog {
                rows: Vec::new(),
                source: None,
                unavailable: Some(reason),
            },
        }
    }

    pub fn rows(&self) -> &[MenuRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn source(&self) -> Option<&MenuSource> {
        self.source.as_ref()
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable.as_deref()
    }

    /// Reconcile `selection` and compute the page contents for it.
    ///
    /// Nothing is cached; every call recomputes the visible rows and the
    /// four option lists.
    pub fn view(&self, selection: &Selection) -> CatalogView<'_> {
        let selection = reconcile(&self.rows, selection);
        let show_dependent = !selection.category.is_all();

        let selectors = DependentField::ALL
            .into_iter()
            .map(|field| SelectorOptions {
                field,
                param: field.param(),
                label: field.label(),
                selected: selection.get(field).map(str::to_string),
                options: if show_dependent {
                    compute_allowed_values(&self.rows, &selection, field)
                } else {
                    Vec::new()
                },
            })
            .collect();

        let visible: Vec<VisibleRow<'_>> = compute_visible_rows(&self.rows, &selection)
            .into_iter()
            .enumerate()
            .map(|(i, row)| VisibleRow { number: i + 1, row })
            .collect();

        let active = selection.category.as_param();
        let button = |label: &'static str, param: &'static str| CategoryButton {
            label,
            param,
            active: active == param,
            query: switch_category(&selection, CategoryFilter::parse(param))
                .to_query(Some(&selection.category)),
        };
        let categories = std::iter::once(button("전체", "all"))
            .chain(CATEGORIES.iter().map(|&name| button(name, name)))
            .collect();

        CatalogView {
            category: active.to_string(),
            search_text: selection.search_text.clone(),
            categories,
            total: self.rows.len(),
            shown: visible.len(),
            visible,
            show_dependent,
            selectors,
            unavailable: self.unavailable.clone(),
            selection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, category: &str, code: &str, major: &str, middle: &str, cook: &str) -> MenuRow {
        MenuRow::from_raw(name, category, code, major, middle, cook).unwrap()
    }

    fn sample() -> Vec<MenuRow> {
        vec![
            row("김치볶음밥", "밥", "R1", "곡류", "밥류", "볶음"),
            row("된장국", "국", "S1", "국류", "국", "끓임"),
        ]
    }

    fn grid() -> Vec<MenuRow> {
        vec![
            row("흰쌀밥", "밥", "R0", "곡류", "밥류", "찜"),
            row("김치볶음밥", "밥", "R1", "곡류", "밥류", "볶음"),
            row("새우볶음밥", "밥", "R1", "곡류", "볶음밥류", "볶음"),
            row("비빔밥", "밥", "R2", "곡류", "비빔류", "무침"),
            row("누룽지", "밥", "R3", "곡류", "", "굽기"),
            row("된장국", "국", "S1", "국류", "국", "끓임"),
        ]
    }

    #[test]
    fn example_category_filter() {
        let rows = sample();
        let selection = Selection::new(CategoryFilter::parse("밥"));

        let visible = compute_visible_rows(&rows, &selection);
        assert_eq!(visible, vec![&rows[0]]);

        let codes = compute_allowed_values(&rows, &selection, DependentField::ClassificationCode);
        assert_eq!(codes, vec!["R1"]);
    }

    #[test]
    fn all_category_keeps_every_row_in_order() {
        let rows = grid();
        let visible = compute_visible_rows(&rows, &Selection::default());
        assert_eq!(visible.len(), rows.len());
        for (shown, original) in visible.iter().zip(rows.iter()) {
            assert_eq!(*shown, original);
        }
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let rows = vec![
            row("Kimchi Fried Rice", "밥", "", "", "", ""),
            row("Soup", "국", "", "", "", ""),
        ];
        let selection = Selection::default().with_search("  fried ");
        let visible = compute_visible_rows(&rows, &selection);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "Kimchi Fried Rice");
    }

    #[test]
    fn dependent_constraints_are_exact_matches() {
        let rows = grid();
        let selection = Selection::new(CategoryFilter::parse("밥"))
            .with(DependentField::MiddleGroup, "밥류");
        let names: Vec<_> = compute_visible_rows(&rows, &selection)
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["흰쌀밥", "김치볶음밥"]);
    }

    #[test]
    fn visible_rows_are_idempotent() {
        let rows = grid();
        let selection = Selection::new(CategoryFilter::parse("밥"))
            .with(DependentField::CookMethod, "볶음")
            .with_search("볶음");
        assert_eq!(
            compute_visible_rows(&rows, &selection),
            compute_visible_rows(&rows, &selection)
        );
    }

    #[test]
    fn allowed_values_ignore_own_selection() {
        let rows = grid();
        let base = Selection::new(CategoryFilter::parse("밥")).with(DependentField::CookMethod, "볶음");

        let without = compute_allowed_values(&rows, &base, DependentField::ClassificationCode);
        for code in ["R0", "R1", "R2", "R3"] {
            let with = base.clone().with(DependentField::ClassificationCode, code);
            assert_eq!(
                compute_allowed_values(&rows, &with, DependentField::ClassificationCode),
                without
            );
        }
        assert_eq!(without, vec!["R1"]);
    }

    #[test]
    fn allowed_values_narrow_by_other_fields() {
        let rows = grid();
        let selection =
            Selection::new(CategoryFilter::parse("밥")).with(DependentField::ClassificationCode, "R1");

        assert_eq!(
            compute_allowed_values(&rows, &selection, DependentField::MiddleGroup),
            vec!["밥류", "볶음밥류"]
        );
        assert_eq!(
            compute_allowed_values(&rows, &selection, DependentField::CookMethod),
            vec!["볶음"]
        );
    }

    #[test]
    fn allowed_values_skip_empty_and_ignore_search() {
        let rows = grid();
        let selection = Selection::new(CategoryFilter::parse("밥")).with_search("없는메뉴");
        let middle = compute_allowed_values(&rows, &selection, DependentField::MiddleGroup);
        assert_eq!(middle, vec!["밥류", "볶음밥류", "비빔류"]);
    }

    #[test]
    fn allowed_values_are_collated() {
        let rows = vec![
            row("a", "밥", "", "", "", "다"),
            row("b", "밥", "", "", "", "가"),
            row("c", "밥", "", "", "", "나"),
            row("d", "밥", "", "", "", "가"),
        ];
        let selection = Selection::new(CategoryFilter::parse("밥"));
        assert_eq!(
            compute_allowed_values(&rows, &selection, DependentField::CookMethod),
            vec!["가", "나", "다"]
        );
    }

    #[test]
    fn reconcile_resets_stale_values() {
        let rows = grid();
        let selection = Selection::new(CategoryFilter::parse("밥"))
            .with(DependentField::ClassificationCode, "R2")
            .with(DependentField::CookMethod, "볶음");

        // R2 only pairs with 무침 and 볶음 only pairs with R1: both are stale.
        let reconciled = reconcile(&rows, &selection);
        assert_eq!(reconciled.get(DependentField::ClassificationCode), None);
        assert_eq!(reconciled.get(DependentField::CookMethod), None);
    }

    #[test]
    fn reconcile_keeps_consistent_values() {
        let rows = grid();
        let selection = Selection::new(CategoryFilter::parse("밥"))
            .with(DependentField::ClassificationCode, "R1")
            .with(DependentField::CookMethod, "볶음");
        assert_eq!(reconcile(&rows, &selection), selection);
    }

    #[test]
    fn reconcile_drops_values_from_other_categories() {
        let rows = grid();
        let selection =
            Selection::new(CategoryFilter::parse("국")).with(DependentField::ClassificationCode, "R1");
        assert_eq!(reconcile(&rows, &selection).get(DependentField::ClassificationCode), None);
    }

    #[test]
    fn switching_category_resets_dependents() {
        let selection = Selection::new(CategoryFilter::parse("밥"))
            .with(DependentField::MajorGroup, "곡류")
            .with_search("밥");
        let switched = switch_category(&selection, CategoryFilter::parse("국"));
        assert_eq!(switched.category, CategoryFilter::Named("국".into()));
        assert_eq!(switched.search_text, "밥");
        for field in DependentField::ALL {
            assert_eq!(switched.get(field), None);
        }
    }

    #[test]
    fn query_from_another_category_is_a_switch() {
        // 곡류 is legal in both categories, so reconciling alone would keep it.
        let rows = vec![
            row("김치볶음밥", "밥", "R1", "곡류", "밥류", "볶음"),
            row("누룽지탕", "국", "S2", "곡류", "탕", "끓임"),
        ];
        let query = CatalogQuery {
            category: Some("국".into()),
            q: Some("누룽".into()),
            from: Some("밥".into()),
            major: Some("곡류".into()),
            ..CatalogQuery::default()
        };
        let catalog = Catalog::new(rows.clone());
        let view = catalog.view(&Selection::from(query.clone()));
        assert_eq!(view.selectors[1].selected, None);
        assert_eq!(view.search_text, "누룽");

        let same = CatalogQuery { from: Some("국".into()), ..query };
        let catalog = Catalog::new(rows);
        let view = catalog.view(&Selection::from(same));
        assert_eq!(view.selectors[1].selected.as_deref(), Some("곡류"));
    }

    #[test]
    fn category_buttons_carry_the_switched_selection() {
        let catalog = Catalog::new(grid());
        let selection = Selection::new(CategoryFilter::parse("밥"))
            .with(DependentField::MajorGroup, "곡류")
            .with_search("밥");
        let view = catalog.view(&selection);

        let soup = view.categories.iter().find(|c| c.param == "국").unwrap();
        assert_eq!(soup.query.from.as_deref(), Some("밥"));
        assert_eq!(soup.query.q.as_deref(), Some("밥"));
        let switched = Selection::from(soup.query.clone());
        assert_eq!(switched.category, CategoryFilter::Named("국".into()));
        for field in DependentField::ALL {
            assert_eq!(switched.get(field), None);
        }
    }

    #[test]
    fn all_category_hides_and_clears_selectors() {
        let catalog = Catalog::new(grid());
        let selection = Selection::default().with(DependentField::MajorGroup, "곡류");
        let view = catalog.view(&selection);

        assert!(!view.show_dependent);
        assert_eq!(view.visible.len(), 6);
        for selector in &view.selectors {
            assert!(selector.selected.is_none());
            assert!(selector.options.is_empty());
        }
        assert!(view.categories[0].active);
    }

    #[test]
    fn named_category_view_lists_options() {
        let catalog = Catalog::new(grid());
        let view = catalog.view(&Selection::new(CategoryFilter::parse("국")));

        assert!(view.show_dependent);
        assert_eq!(view.visible.len(), 1);
        assert_eq!(view.visible[0].number, 1);
        assert_eq!(view.selectors[0].options, vec!["S1"]);
        assert!(view.categories.iter().any(|c| c.param == "국" && c.active));
    }

    #[test]
    fn query_parsing_normalises_blanks() {
        let selection: Selection = CatalogQuery {
            category: Some("전체".into()),
            q: Some("국".into()),
            code: Some("  ".into()),
            major: Some(" 곡류 ".into()),
            ..CatalogQuery::default()
        }
        .into();
        assert!(selection.category.is_all());
        assert_eq!(selection.get(DependentField::ClassificationCode), None);
        assert_eq!(selection.get(DependentField::MajorGroup), Some("곡류"));
    }

    #[test]
    fn unavailable_catalog_reports_reason() {
        let catalog = Catalog::from_outcome(LoadOutcome::Unavailable { reason: "missing".into() });
        let view = catalog.view(&Selection::default());
        assert_eq!(view.unavailable.as_deref(), Some("missing"));
        assert!(view.visible.is_empty());
    }
}
