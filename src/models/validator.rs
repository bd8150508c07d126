//! Field-level validation errors keyed by field name.

use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;

use serde::Serialize;

/// Collects one message per field. The first message for a field wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Validator {
    errors: BTreeMap<String, String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, key: &str, message: &str) {
        self.errors
            .entry(key.to_string())
            .or_insert_with(|| message.to_string());
    }

    /// Record `message` for `key` unless `ok` holds.
    pub fn check(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.add_error(key, message);
        }
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn into_result(self) -> Result<(), Validator> {
        if self.valid() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

pub fn permitted_value<T: PartialEq + ?Sized>(value: &T, permitted: &[&T]) -> bool {
    permitted.iter().any(|candidate| *candidate == value)
}

pub fn unique<T: Eq + Hash>(values: &[T]) -> bool {
    let mut seen = HashSet::with_capacity(values.len());
    values.iter().all(|value| seen.insert(value))
}

/// Pragmatic address check: `local@domain.tld` without whitespace, with
/// non-empty dot-separated domain labels of letters, digits and hyphens.
pub fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || local.len() > 64 || domain.len() > 255 {
        return false;
    }
    if value.chars().any(char::is_whitespace) || domain.contains('@') {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_error_per_field_wins() {
        let mut v = Validator::new();
        v.check(false, "title", "must be provided");
        v.check(false, "title", "must not be more than 500 bytes long");
        v.check(true, "year", "must be provided");

        assert!(!v.valid());
        assert_eq!(v.errors().len(), 1);
        assert_eq!(v.errors()["title"], "must be provided");
        assert_eq!(
            serde_json::to_value(&v).unwrap(),
            serde_json::json!({"title": "must be provided"})
        );
    }

    #[test]
    fn helpers() {
        assert!(unique(&["a", "b"]));
        assert!(!unique(&["a", "b", "a"]));
        assert!(permitted_value("id", &["id", "-id"]));
        assert!(!permitted_value("name", &["id", "-id"]));
    }

    #[test]
    fn email_shapes() {
        assert!(is_email("alice@example.com"));
        assert!(is_email("a.b+tag@mail.example.co"));
        assert!(!is_email("alice"));
        assert!(!is_email("alice@localhost"));
        assert!(!is_email("al ice@example.com"));
        assert!(!is_email("alice@exa_mple.com"));
        assert!(!is_email("@example.com"));
    }
}
