// src/models/resource.rs

//! External judge definitions and their refresh policy.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::models::ResourceId;
use crate::models::document::{Document, get_flag};
use crate::utils::time::secs;

/// An external contest-hosting site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub id: ResourceId,

    /// Host name, unique across resources (e.g. "codeforces.com")
    pub host: String,

    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Plugin tag resolved through the plugin registry
    pub module: String,

    /// Primary contest kind; other kinds do not touch rating activity
    #[serde(default)]
    pub major_kind: Option<String>,

    #[serde(default)]
    pub timing: TimingPolicy,

    /// Rating color bands, ordered from lowest
    #[serde(default)]
    pub ratings: Vec<RatingBand>,

    #[serde(default)]
    pub has_rating_history: bool,

    #[serde(default)]
    pub has_problem_rating: bool,

    #[serde(default)]
    pub has_country_rating: bool,

    #[serde(default)]
    pub has_multi_account: bool,

    #[serde(default)]
    pub has_accounts_infos_update: bool,

    /// Allow accounts to be created from standings rows
    #[serde(default = "defaults::enabled")]
    pub accounts_auto_create: bool,

    #[serde(default)]
    pub problem_rating: ProblemRatingPolicy,

    /// Plugin and engine options (e.g. `split_team`, `standings_url`)
    #[serde(default)]
    pub options: Document,

    #[serde(default)]
    pub n_accounts: usize,

    #[serde(default)]
    pub n_contests: usize,
}

impl Resource {
    /// A resource with default policy.
    pub fn new(host: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            id: 0,
            host: host.into(),
            enabled: true,
            module: module.into(),
            major_kind: None,
            timing: TimingPolicy::default(),
            ratings: Vec::new(),
            has_rating_history: false,
            has_problem_rating: false,
            has_country_rating: false,
            has_multi_account: false,
            has_accounts_infos_update: false,
            accounts_auto_create: true,
            problem_rating: ProblemRatingPolicy::default(),
            options: Document::new(),
            n_accounts: 0,
            n_contests: 0,
        }
    }

    /// Whether contests of `kind` count as the resource's rated series.
    pub fn is_major_kind(&self, kind: Option<&str>) -> bool {
        match (&self.major_kind, kind) {
            (None, _) => true,
            (Some(major), Some(kind)) => major == kind,
            (Some(_), None) => false,
        }
    }

    /// Split team rows into one row per member.
    pub fn split_team(&self) -> bool {
        get_flag(&self.options, "split_team")
    }

    /// Color band containing `rating`.
    pub fn rating_band(&self, rating: f64) -> Option<&RatingBand> {
        self.ratings
            .iter()
            .find(|band| band.low <= rating && rating < band.high)
    }
}

/// When statistics of a resource's contests are refreshed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingPolicy {
    /// Earliest refresh after a contest ends
    #[serde(default = "defaults::min_delay_after_end")]
    pub min_delay_after_end_secs: i64,

    /// Ended contests older than this are no longer refreshed
    #[serde(default = "defaults::max_delay_after_end")]
    pub max_delay_after_end_secs: i64,

    /// Base retry delay after a failed parse
    #[serde(default = "defaults::delay_on_error")]
    pub delay_on_error_secs: i64,

    /// Re-check interval for ended contests once past the post-end delay
    #[serde(default = "defaults::delay_on_success")]
    pub delay_on_success_secs: i64,

    /// Contests at least this long are refreshed periodically while running
    #[serde(default = "defaults::long_contest_idle")]
    pub long_contest_idle_secs: i64,

    /// Running contests are refreshed every `duration / divider`
    #[serde(default = "defaults::long_contest_divider")]
    pub long_contest_divider: i64,
}

impl TimingPolicy {
    pub fn min_delay_after_end(&self) -> TimeDelta {
        secs(self.min_delay_after_end_secs)
    }

    pub fn max_delay_after_end(&self) -> TimeDelta {
        secs(self.max_delay_after_end_secs)
    }

    pub fn delay_on_error(&self) -> TimeDelta {
        secs(self.delay_on_error_secs)
    }

    pub fn delay_on_success(&self) -> TimeDelta {
        secs(self.delay_on_success_secs)
    }

    pub fn long_contest_idle(&self) -> TimeDelta {
        secs(self.long_contest_idle_secs)
    }

    pub fn long_contest_divider(&self) -> i32 {
        self.long_contest_divider.clamp(1, i32::MAX as i64) as i32
    }
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            min_delay_after_end_secs: defaults::min_delay_after_end(),
            max_delay_after_end_secs: defaults::max_delay_after_end(),
            delay_on_error_secs: defaults::delay_on_error(),
            delay_on_success_secs: defaults::delay_on_success(),
            long_contest_idle_secs: defaults::long_contest_idle(),
            long_contest_divider: defaults::long_contest_divider(),
        }
    }
}

/// A rating color band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingBand {
    pub low: f64,
    pub high: f64,
    pub color: String,
    #[serde(flatten)]
    pub extra: Document,
}

/// Per-resource knobs of the problem rating calculator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemRatingPolicy {
    /// Drop contestants whose old rating cannot be established
    #[serde(default)]
    pub require_old_rating: bool,

    /// Baseline rating for contestants without history
    #[serde(default = "defaults::initial_rating")]
    pub initial_rating: f64,

    /// Added to the old rating, indexed by the contestant's contest count
    #[serde(default)]
    pub adjustment: Vec<f64>,
}

impl Default for ProblemRatingPolicy {
    fn default() -> Self {
        Self {
            require_old_rating: false,
            initial_rating: defaults::initial_rating(),
            adjustment: Vec::new(),
        }
    }
}

mod defaults {
    pub fn enabled() -> bool {
        true
    }
    pub fn min_delay_after_end() -> i64 {
        10 * 60
    }
    pub fn max_delay_after_end() -> i64 {
        7 * 24 * 3600
    }
    pub fn delay_on_error() -> i64 {
        3600
    }
    pub fn delay_on_success() -> i64 {
        24 * 3600
    }
    pub fn long_contest_idle() -> i64 {
        6 * 3600
    }
    pub fn long_contest_divider() -> i64 {
        12
    }
    pub fn initial_rating() -> f64 {
        1500.0
    }
}
