// src/models/statistics.rs

//! One account's result in one contest.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::document::{Document, get_f64};
use crate::models::{AccountId, ContestId, StatisticsId};

/// A statistics row, unique by `(account_id, contest_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(default)]
    pub id: StatisticsId,

    pub account_id: AccountId,

    pub contest_id: ContestId,

    /// Display place, e.g. "1" or "3-5"
    #[serde(default)]
    pub place: Option<String>,

    /// Numeric prefix of `place`
    #[serde(default)]
    pub place_as_int: Option<i64>,

    #[serde(default)]
    pub solving: f64,

    #[serde(default)]
    pub upsolving: Option<f64>,

    /// Per-problem results under `problems` plus contest-specific fields
    #[serde(default)]
    pub addition: Document,
}

impl Statistics {
    /// Per-problem results keyed by short code.
    pub fn problems(&self) -> Option<&serde_json::Map<String, Value>> {
        self.addition.get("problems").and_then(Value::as_object)
    }

    pub fn old_rating(&self) -> Option<f64> {
        get_f64(&self.addition, "old_rating")
    }

    pub fn new_rating(&self) -> Option<f64> {
        get_f64(&self.addition, "new_rating").or_else(|| {
            let old = self.old_rating()?;
            let change = get_f64(&self.addition, "rating_change")?;
            Some(old + change)
        })
    }

    pub fn has_rating_change(&self) -> bool {
        ["old_rating", "rating_change", "new_rating"]
            .iter()
            .any(|key| self.addition.contains_key(*key))
    }
}

/// Numeric prefix of a display place: `"3-5"` gives 3, `"-"` gives none.
pub fn parse_place_as_int(place: Option<&str>) -> Option<i64> {
    static LEADING_NUMBER: LazyLock<Option<Regex>> =
        LazyLock::new(|| Regex::new(r"^\s*(\d+)").ok());
    let pattern = LEADING_NUMBER.as_ref()?;
    pattern.captures(place?)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_place_as_int() {
        assert_eq!(parse_place_as_int(Some("1")), Some(1));
        assert_eq!(parse_place_as_int(Some(" 3-5")), Some(3));
        assert_eq!(parse_place_as_int(Some("12.")), Some(12));
        assert_eq!(parse_place_as_int(Some("-")), None);
        assert_eq!(parse_place_as_int(Some("")), None);
        assert_eq!(parse_place_as_int(None), None);
    }

    #[test]
    fn test_rating_accessors() {
        let stat = Statistics {
            id: 1,
            account_id: 1,
            contest_id: 1,
            place: Some("1".into()),
            place_as_int: Some(1),
            solving: 2.0,
            upsolving: None,
            addition: json!({"old_rating": 1500, "rating_change": 25})
                .as_object()
                .unwrap()
                .clone(),
        };
        assert_eq!(stat.old_rating(), Some(1500.0));
        assert_eq!(stat.new_rating(), Some(1525.0));
        assert!(stat.has_rating_change());
        assert!(stat.problems().is_none());
    }
}
