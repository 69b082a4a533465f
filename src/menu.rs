use serde::{Deserialize, Serialize};

/// Header of the menu name column.
pub const HEADER_NAME: &str = "Menu";
/// Header of the category column.
pub const HEADER_CATEGORY: &str = "Category";
/// Header of the food classification code column.
pub const HEADER_CODE: &str = "음식 분류코드";
/// Header of the major group column.
pub const HEADER_MAJOR: &str = "대분류";
/// Header of the middle group column.
pub const HEADER_MIDDLE: &str = "중분류";
/// Header of the cooking method column.
pub const HEADER_COOK: &str = "조리법 유형";

/// Categories offered as buttons on the catalog page, after "all".
pub const CATEGORIES: [&str; 5] = ["밥", "국", "주찬", "부찬", "김치"];

/// One catalog entry.
///
/// Every field is trimmed at load time and `name` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuRow {
    pub name: String,
    pub category: String,
    pub classification_code: String,
    pub major_group: String,
    pub middle_group: String,
    pub cook_method: String,
}

impl MenuRow {
    /// Build a row from raw cell text, trimming every field.
    ///
    /// Returns `None` when the trimmed name is empty.
    pub fn from_raw(
        name: &str,
        category: &str,
        classification_code: &str,
        major_group: &str,
        middle_group: &str,
        cook_method: &str,
    ) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        Some(MenuRow {
            name: name.to_string(),
            category: category.trim().to_string(),
            classification_code: classification_code.trim().to_string(),
            major_group: major_group.trim().to_string(),
            middle_group: middle_group.trim().to_string(),
            cook_method: cook_method.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_trims_fields() {
        let row = MenuRow::from_raw(" 된장국 ", " 국", "S1 ", "국류", " 국 ", "끓임").unwrap();
        assert_eq!(row.name, "된장국");
        assert_eq!(row.category, "국");
        assert_eq!(row.classification_code, "S1");
        assert_eq!(row.middle_group, "국");
    }

    #[test]
    fn from_raw_drops_blank_names() {
        assert!(MenuRow::from_raw("   ", "밥", "R1", "곡류", "밥류", "볶음").is_none());
        assert!(MenuRow::from_raw("", "", "", "", "", "").is_none());
    }
}
