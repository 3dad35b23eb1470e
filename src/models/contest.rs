// src/models/contest.rs

//! Contest entity and its free-form info document.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::models::document::Document;
use crate::models::standings::ProblemsSpec;
use crate::models::{ContestId, ResourceId};

/// A contest hosted by a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contest {
    #[serde(default)]
    pub id: ContestId,

    pub resource_id: ResourceId,

    /// Upstream identity, unique within the resource
    pub key: String,

    pub title: String,

    #[serde(default)]
    pub url: String,

    pub start_time: DateTime<Utc>,

    pub end_time: DateTime<Utc>,

    /// Grouping tag (e.g. "div1", "educational")
    #[serde(default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub invisible: bool,

    /// Computed from other contests; never parsed from upstream
    #[serde(default)]
    pub is_stage: bool,

    #[serde(default)]
    pub info: ContestInfo,

    /// Next time the statistics are due for a refresh
    #[serde(default)]
    pub statistic_timing: Option<DateTime<Utc>>,

    /// Last successful reconciliation
    #[serde(default)]
    pub parsed_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub has_hidden_results: bool,

    /// Consecutive failed parses; drives the error backoff
    #[serde(default)]
    pub statistic_errors: u32,

    /// Author account keys
    #[serde(default)]
    pub writers: Vec<String>,

    #[serde(default)]
    pub n_statistics: usize,

    #[serde(default)]
    pub n_problems: usize,
}

impl Contest {
    pub fn duration(&self) -> TimeDelta {
        (self.end_time - self.start_time).max(TimeDelta::zero())
    }

    pub fn is_running(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now && now < self.end_time
    }

    pub fn is_ended(&self, now: DateTime<Utc>) -> bool {
        self.end_time <= now
    }

    /// Identity used in log lines.
    pub fn identity(&self) -> String {
        format!("#{} {} ({})", self.id, self.title, self.key)
    }
}

/// Contest-level document discovered from standings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContestInfo {
    /// Ordered column names discovered from standings rows
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problems: Option<ProblemsSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hidden_fields: Vec<String>,

    #[serde(default, skip_serializing_if = "Document::is_empty")]
    pub fields_types: Document,

    /// Display and engine options merged from plugin output
    #[serde(default, skip_serializing_if = "Document::is_empty")]
    pub standings: Document,

    /// Refresh hint kept from the last successful parse, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing_statistic_delta: Option<i64>,

    /// Content hash of the inputs of the last problem rating run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_rating_hash: Option<String>,

    #[serde(flatten)]
    pub extra: Document,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contest(start: DateTime<Utc>, hours: i64) -> Contest {
        Contest {
            id: 1,
            resource_id: 1,
            key: "round-1".into(),
            title: "Round 1".into(),
            url: String::new(),
            start_time: start,
            end_time: start + TimeDelta::hours(hours),
            kind: None,
            invisible: false,
            is_stage: false,
            info: ContestInfo::default(),
            statistic_timing: None,
            parsed_time: None,
            has_hidden_results: false,
            statistic_errors: 0,
            writers: Vec::new(),
            n_statistics: 0,
            n_problems: 0,
        }
    }

    #[test]
    fn test_lifecycle_predicates() {
        let now = Utc::now();
        let running = contest(now - TimeDelta::hours(1), 2);
        assert!(running.is_running(now));
        assert!(!running.is_ended(now));
        assert_eq!(running.duration(), TimeDelta::hours(2));

        let ended = contest(now - TimeDelta::hours(3), 2);
        assert!(ended.is_ended(now));
        assert!(!ended.is_running(now));
    }

    #[test]
    fn test_info_keeps_unknown_keys() {
        let info: ContestInfo = serde_json::from_value(json!({
            "fields": ["penalty"],
            "custom_flag": true
        }))
        .unwrap();
        assert_eq!(info.fields, vec!["penalty"]);
        assert_eq!(info.extra.get("custom_flag"), Some(&json!(true)));
        let back = serde_json::to_value(&info).unwrap();
        assert_eq!(back["custom_flag"], json!(true));
    }
}
