//! List filtering, sorting and pagination parameters.

use serde::Serialize;

use crate::models::validator::{permitted_value, Validator};

/// Pagination and sort parameters taken from the query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    pub sort_safelist: &'static [&'static str],
}

impl Filters {
    /// Column name without the direction prefix.
    pub fn sort_column(&self) -> &str {
        self.sort.trim_start_matches('-')
    }

    pub fn sort_descending(&self) -> bool {
        self.sort.starts_with('-')
    }

    pub fn limit(&self) -> usize {
        self.page_size.max(0) as usize
    }

    pub fn offset(&self) -> usize {
        ((self.page - 1).max(0) * self.page_size.max(0)) as usize
    }
}

pub fn validate_filters(v: &mut Validator, filters: &Filters) {
    v.check(filters.page > 0, "page", "must be greater than zero");
    v.check(filters.page <= 10_000_000, "page", "must be a maximum of 10 million");
    v.check(filters.page_size > 0, "page_size", "must be greater than zero");
    v.check(filters.page_size <= 100, "page_size", "must be a maximum of 100");
    v.check(
        permitted_value(filters.sort.as_str(), filters.sort_safelist),
        "sort",
        "invalid sort value",
    );
}

/// Pagination metadata returned with list responses. Serialises to `{}` when
/// there are no records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: i64,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

pub fn calculate_metadata(total_records: i64, page: i64, page_size: i64) -> Metadata {
    if total_records == 0 {
        return Metadata::default();
    }
    Metadata {
        current_page: page,
        page_size,
        first_page: 1,
        last_page: (total_records + page_size - 1) / page_size,
        total_records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAFELIST: &[&str] = &["id", "title", "-id", "-title"];

    fn filters(page: i64, page_size: i64, sort: &str) -> Filters {
        Filters {
            page,
            page_size,
            sort: sort.to_string(),
            sort_safelist: SAFELIST,
        }
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let mut v = Validator::new();
        validate_filters(&mut v, &filters(0, 101, "year"));
        assert_eq!(v.errors()["page"], "must be greater than zero");
        assert_eq!(v.errors()["page_size"], "must be a maximum of 100");
        assert_eq!(v.errors()["sort"], "invalid sort value");

        let mut v = Validator::new();
        validate_filters(&mut v, &filters(3, 20, "-title"));
        assert!(v.valid());
    }

    #[test]
    fn sort_and_offset() {
        let f = filters(3, 20, "-title");
        assert_eq!(f.sort_column(), "title");
        assert!(f.sort_descending());
        assert_eq!((f.offset(), f.limit()), (40, 20));
    }

    #[test]
    fn metadata_rounds_last_page_up() {
        let meta = calculate_metadata(12, 1, 5);
        assert_eq!(meta.last_page, 3);
        assert_eq!(
            serde_json::to_value(calculate_metadata(0, 1, 5)).unwrap(),
            serde_json::json!({})
        );
    }
}
