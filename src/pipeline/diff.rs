// src/pipeline/diff.rs

//! Diff calculation between persisted and freshly built statistics.
//!
//! Rows are matched by account key. Surrogate ids are ignored; two rows are
//! the same when place, scores, and addition are equal.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::models::Statistics;

/// Account keys whose statistics rows change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsDiff {
    /// In current but not in previous
    pub created: Vec<String>,
    /// In both with different content
    pub updated: Vec<String>,
    /// In previous, in scope, and not in current
    pub deleted: Vec<String>,
    pub unchanged: usize,
}

impl StatisticsDiff {
    /// Check if there are any changes.
    pub fn has_changes(&self) -> bool {
        !self.created.is_empty() || !self.updated.is_empty() || !self.deleted.is_empty()
    }

    /// Get the total number of changes.
    pub fn change_count(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }
}

/// Content equality ignoring surrogate ids.
pub fn same_content(a: &Statistics, b: &Statistics) -> bool {
    a.place == b.place
        && a.place_as_int == b.place_as_int
        && a.solving == b.solving
        && a.upsolving == b.upsolving
        && a.addition == b.addition
}

/// Calculator for statistics diffs.
#[derive(Debug, Clone, Default)]
pub struct DiffCalculator {
    /// Keys eligible for deletion; `None` means every previous row
    scope: Option<HashSet<String>>,
}

impl DiffCalculator {
    pub fn new() -> Self {
        Self { scope: None }
    }

    /// Only rows of `keys` may be deleted.
    pub fn scoped<I: IntoIterator<Item = String>>(keys: I) -> Self {
        Self {
            scope: Some(keys.into_iter().collect()),
        }
    }

    /// Calculate the diff between previous and current rows.
    pub fn calculate(
        &self,
        previous: &[(String, Statistics)],
        current: &IndexMap<String, Statistics>,
    ) -> StatisticsDiff {
        let prev_map: HashMap<&str, &Statistics> =
            previous.iter().map(|(key, stat)| (key.as_str(), stat)).collect();

        let mut diff = StatisticsDiff::default();
        for (key, stat) in current {
            match prev_map.get(key.as_str()) {
                None => diff.created.push(key.clone()),
                Some(prev) if same_content(prev, stat) => diff.unchanged += 1,
                Some(_) => diff.updated.push(key.clone()),
            }
        }

        diff.deleted = previous
            .iter()
            .map(|(key, _)| key)
            .filter(|key| !current.contains_key(key.as_str()))
            .filter(|key| self.scope.as_ref().is_none_or(|scope| scope.contains(*key)))
            .cloned()
            .collect();
        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(solving: f64) -> Statistics {
        Statistics {
            id: 0,
            account_id: 0,
            contest_id: 0,
            place: Some("1".into()),
            place_as_int: Some(1),
            solving,
            upsolving: None,
            addition: Default::default(),
        }
    }

    fn previous() -> Vec<(String, Statistics)> {
        let mut kept = stat(1.0);
        kept.id = 10;
        kept.account_id = 20;
        vec![
            ("alice".to_string(), kept),
            ("bob".to_string(), stat(2.0)),
            ("carol".to_string(), stat(3.0)),
        ]
    }

    #[test]
    fn test_calculate_diff() {
        let mut current = IndexMap::new();
        current.insert("alice".to_string(), stat(1.0));
        current.insert("bob".to_string(), stat(5.0));
        current.insert("dave".to_string(), stat(1.0));

        let diff = DiffCalculator::new().calculate(&previous(), &current);
        assert_eq!(diff.created, ["dave"]);
        assert_eq!(diff.updated, ["bob"]);
        assert_eq!(diff.deleted, ["carol"]);
        assert_eq!(diff.unchanged, 1);
        assert_eq!(diff.change_count(), 3);
    }

    #[test]
    fn test_no_changes() {
        let current: IndexMap<String, Statistics> = previous().into_iter().collect();
        let diff = DiffCalculator::new().calculate(&previous(), &current);
        assert!(!diff.has_changes());
        assert_eq!(diff.unchanged, 3);
    }

    #[test]
    fn test_scoped_deletion() {
        let current = IndexMap::new();
        let diff = DiffCalculator::scoped(["bob".to_string()]).calculate(&previous(), &current);
        assert_eq!(diff.deleted, ["bob"]);
    }
}
