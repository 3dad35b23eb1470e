// src/models/standings.rs

//! Canonical standings document returned by resource plugins.
//!
//! Field names mirror what plugins emit upstream, so a document written by
//! any plugin round-trips through this type without renames:
//!
//! ```json
//! {
//!   "result": {"alice": {"place": "1", "solving": 3, "problems": {"A": {"result": "+"}}}},
//!   "problems": [{"short": "A", "name": "Problem A"}],
//!   "action": ["url", "https://judge.example/new"]
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::document::{Document, get_f64, lenient, value_as_f64};
use crate::utils::time::parse_time_seconds;

/// The document a plugin returns for one contest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandingsDocument {
    /// Site-local member identifier to standings row
    #[serde(default)]
    pub result: IndexMap<String, StandingsRow>,

    /// Problem descriptors, flat or split by division
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problems: Option<ProblemsSpec>,

    /// Upstream signal about the contest itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<StandingsAction>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invisible: Option<bool>,

    /// Contest duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_in_secs: Option<i64>,

    #[serde(default, skip_serializing_if = "Document::is_empty")]
    pub fields_types: Document,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hidden_fields: Vec<String>,

    /// Author account keys
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub writers: Vec<String>,

    /// Merged into the contest's standings options
    #[serde(default, skip_serializing_if = "Document::is_empty")]
    pub options: Document,

    /// Seconds until the next refresh, overriding the resource policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing_statistic_delta: Option<i64>,
}

impl StandingsDocument {
    /// Parse a document from JSON text, attributing failures to `contest`.
    pub fn from_json(contest: &str, text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| AppError::parse_standings(contest, e))
    }

    /// Rows with `member` filled from the result key when absent.
    pub fn rows(&self) -> impl Iterator<Item = StandingsRow> + '_ {
        self.result.iter().map(|(key, row)| {
            let mut row = row.clone();
            if row.member.is_empty() {
                row.member = key.clone();
            }
            row
        })
    }

    /// Whether any row carries an unrevealed problem result.
    pub fn has_hidden_results(&self) -> bool {
        self.result.values().any(|row| {
            row.problems
                .values()
                .any(|value| ProblemResult::from_value(value).is_hidden())
        })
    }

    /// Problem descriptors flattened across divisions, in display order.
    pub fn flat_problems(&self) -> Vec<ProblemDescriptor> {
        self.problems
            .as_ref()
            .map(ProblemsSpec::flatten)
            .unwrap_or_default()
    }
}

/// Problem list layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProblemsSpec {
    Divisions {
        division: IndexMap<String, Vec<ProblemDescriptor>>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        divisions_order: Vec<String>,
    },
    Flat(Vec<ProblemDescriptor>),
}

impl ProblemsSpec {
    /// Division names in their declared order.
    pub fn division_names(&self) -> Vec<String> {
        match self {
            Self::Flat(_) => Vec::new(),
            Self::Divisions {
                division,
                divisions_order,
            } => {
                let mut names: Vec<String> = divisions_order
                    .iter()
                    .filter(|name| division.contains_key(*name))
                    .cloned()
                    .collect();
                for name in division.keys() {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
                names
            }
        }
    }

    /// All descriptors, each tagged with its division when split.
    ///
    /// A problem shared by several divisions appears once, carrying every
    /// division it belongs to.
    pub fn flatten(&self) -> Vec<ProblemDescriptor> {
        match self {
            Self::Flat(problems) => problems.clone(),
            Self::Divisions { division, .. } => {
                let mut out: Vec<ProblemDescriptor> = Vec::new();
                for name in self.division_names() {
                    let Some(problems) = division.get(&name) else {
                        continue;
                    };
                    for problem in problems {
                        let key = problem.key();
                        match out.iter_mut().find(|p| p.key() == key) {
                            Some(existing) => existing.divisions.push(name.clone()),
                            None => {
                                let mut problem = problem.clone();
                                problem.divisions = vec![name.clone()];
                                out.push(problem);
                            }
                        }
                    }
                }
                out
            }
        }
    }

    /// Mutable access to every descriptor that belongs to `division`.
    pub fn descriptors_mut(&mut self) -> Vec<(Option<&str>, &mut ProblemDescriptor)> {
        match self {
            Self::Flat(problems) => problems.iter_mut().map(|p| (None, p)).collect(),
            Self::Divisions { division, .. } => division
                .iter_mut()
                .flat_map(|(name, problems)| {
                    problems.iter_mut().map(move |p| (Some(name.as_str()), p))
                })
                .collect(),
        }
    }
}

/// One problem as described by the plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProblemDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Stable upstream identity, preferred over `short` as the key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient::opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub full_score: Option<f64>,

    /// Filled when flattened from a division layout
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub divisions: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_teams: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_accepted: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_partial: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_hidden: Option<usize>,

    /// Earliest acceptance time in seconds from contest start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_ac_seconds: Option<i64>,

    #[serde(flatten)]
    pub extra: Document,
}

impl ProblemDescriptor {
    /// Canonical identity of the problem within its contest.
    pub fn key(&self) -> String {
        self.code
            .as_deref()
            .or(self.short.as_deref())
            .or(self.name.as_deref())
            .unwrap_or_default()
            .to_string()
    }

    /// Column code used inside standings rows.
    pub fn short_code(&self) -> String {
        self.short.clone().unwrap_or_else(|| self.key())
    }
}

/// Contest-level instruction carried by a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub enum StandingsAction {
    /// The contest no longer exists upstream
    Delete,
    /// The contest moved to a new URL
    Url(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawAction {
    Name(String),
    Pair(String, String),
}

impl TryFrom<RawAction> for StandingsAction {
    type Error = String;

    fn try_from(raw: RawAction) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawAction::Name(name) if name == "delete" => Ok(Self::Delete),
            RawAction::Pair(name, url) if name == "url" => Ok(Self::Url(url)),
            RawAction::Name(name) | RawAction::Pair(name, _) => {
                Err(format!("unknown standings action '{name}'"))
            }
        }
    }
}

impl From<StandingsAction> for RawAction {
    fn from(action: StandingsAction) -> Self {
        match action {
            StandingsAction::Delete => Self::Name("delete".into()),
            StandingsAction::Url(url) => Self::Pair("url".into(), url),
        }
    }
}

/// One participant's row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandingsRow {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub member: String,

    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub place: Option<String>,

    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub solving: f64,

    #[serde(
        default,
        deserialize_with = "lenient::opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub upsolving: Option<f64>,

    /// Problem short code to raw result object
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub problems: IndexMap<String, Value>,

    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub country: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub team_id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<TeamMember>,

    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub division: Option<String>,

    /// Every other column reported by the plugin
    #[serde(flatten)]
    pub extra: Document,
}

impl StandingsRow {
    /// Ratings reported for this row: `(old, change, new)`.
    pub fn rating_triplet(&self) -> (Option<f64>, Option<f64>, Option<f64>) {
        (
            get_f64(&self.extra, "old_rating"),
            get_f64(&self.extra, "rating_change"),
            get_f64(&self.extra, "new_rating"),
        )
    }

    /// Whether the row carries explicit rating-change data.
    pub fn has_rating_fields(&self) -> bool {
        let (old, change, new) = self.rating_triplet();
        old.is_some() || change.is_some() || new.is_some()
    }
}

/// A team member reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TeamMember {
    Key(String),
    Account {
        account: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl TeamMember {
    pub fn key(&self) -> &str {
        match self {
            Self::Key(key) => key,
            Self::Account { account, .. } => account,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Key(_) => None,
            Self::Account { name, .. } => name.as_deref(),
        }
    }
}

/// How a single problem cell reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// No attempt recorded
    Empty,
    /// Fully solved
    Accepted,
    /// Scored below the full score; carries the score
    Partial(f64),
    /// Frozen or unrevealed result
    Hidden,
    /// Attempted without success
    Failed,
}

/// Typed view over a raw per-problem result object.
#[derive(Debug, Clone, Default)]
pub struct ProblemResult {
    pub result: Value,
    pub partial: Option<bool>,
    pub first_ac: bool,
    pub time_seconds: Option<i64>,
}

impl ProblemResult {
    /// Read a raw cell; a bare scalar is treated as the `result` itself.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self {
                result: value.clone(),
                ..Self::default()
            };
        };
        let time_seconds = obj
            .get("time_in_seconds")
            .and_then(value_as_f64)
            .map(|secs| secs as i64)
            .or_else(|| {
                obj.get("time")
                    .and_then(|t| t.as_str().map(str::to_string).or_else(|| Some(t.to_string())))
                    .and_then(|t| parse_time_seconds(&t))
            });
        Self {
            result: obj.get("result").cloned().unwrap_or(Value::Null),
            partial: obj.get("partial").and_then(Value::as_bool),
            first_ac: obj.get("first_ac").and_then(Value::as_bool).unwrap_or(false),
            time_seconds,
        }
    }

    /// Classify the cell, using `full_score` to detect partial scores.
    pub fn verdict(&self, full_score: Option<f64>) -> Verdict {
        let score = match &self.result {
            Value::Null => return Verdict::Empty,
            Value::String(s) => {
                let s = s.trim();
                if s.is_empty() {
                    return Verdict::Empty;
                }
                if s.starts_with('?') {
                    return Verdict::Hidden;
                }
                if s.starts_with('+') {
                    return if self.partial == Some(true) {
                        Verdict::Partial(value_as_f64(&Value::String(s.into())).unwrap_or(0.0))
                    } else {
                        Verdict::Accepted
                    };
                }
                if s.starts_with('-') {
                    return Verdict::Failed;
                }
                match s.parse::<f64>() {
                    Ok(score) => score,
                    Err(_) => return Verdict::Failed,
                }
            }
            other => match value_as_f64(other) {
                Some(score) => score,
                None => return Verdict::Empty,
            },
        };
        if score <= 0.0 {
            return Verdict::Failed;
        }
        let below_full = full_score.is_some_and(|full| score < full);
        if self.partial == Some(true) || below_full {
            Verdict::Partial(score)
        } else {
            Verdict::Accepted
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.verdict(None) == Verdict::Hidden
    }
}
