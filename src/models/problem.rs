// src/models/problem.rs

//! Problems of a contest, possibly shared across contests.

use serde::{Deserialize, Serialize};

use crate::models::document::Document;
use crate::models::standings::ProblemDescriptor;
use crate::models::{ContestId, ProblemId, ResourceId};

/// A problem, unique by `(contest_id, key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(default)]
    pub id: ProblemId,

    pub resource_id: ResourceId,

    /// Owning contest
    #[serde(default)]
    pub contest_id: Option<ContestId>,

    /// Every contest sharing this problem, owning contest included
    #[serde(default)]
    pub contest_ids: Vec<ContestId>,

    /// Position in the contest's problem list
    #[serde(default)]
    pub index: usize,

    pub key: String,

    #[serde(default)]
    pub short: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub divisions: Vec<String>,

    #[serde(default)]
    pub full_score: Option<f64>,

    /// Derived by the problem rating calculator
    #[serde(default)]
    pub rating: Option<f64>,

    #[serde(default)]
    pub n_teams: usize,

    #[serde(default)]
    pub n_accepted: usize,

    #[serde(default)]
    pub n_partial: usize,

    #[serde(default)]
    pub n_hidden: usize,

    /// Attempts that did not end accepted or hidden
    #[serde(default)]
    pub n_tries: usize,

    #[serde(default)]
    pub first_ac_seconds: Option<i64>,

    #[serde(default)]
    pub extra: Document,
}

impl Problem {
    /// Build an unsaved problem from a plugin descriptor.
    pub fn from_descriptor(
        resource_id: ResourceId,
        contest_id: ContestId,
        index: usize,
        descriptor: &ProblemDescriptor,
    ) -> Self {
        let mut problem = Self {
            id: 0,
            resource_id,
            contest_id: Some(contest_id),
            contest_ids: vec![contest_id],
            index,
            key: descriptor.key(),
            short: None,
            name: None,
            url: None,
            divisions: Vec::new(),
            full_score: None,
            rating: None,
            n_teams: 0,
            n_accepted: 0,
            n_partial: 0,
            n_hidden: 0,
            n_tries: 0,
            first_ac_seconds: None,
            extra: Document::new(),
        };
        problem.apply_descriptor(index, descriptor);
        problem
    }

    /// Overwrite descriptive fields from a descriptor. Returns `true` on change.
    pub fn apply_descriptor(&mut self, index: usize, descriptor: &ProblemDescriptor) -> bool {
        let before = self.clone();
        self.index = index;
        self.short = descriptor.short.clone();
        self.name = descriptor.name.clone();
        self.url = descriptor.url.clone();
        self.divisions = descriptor.divisions.clone();
        self.full_score = descriptor.full_score;
        self.n_teams = descriptor.n_teams.unwrap_or_default();
        self.n_accepted = descriptor.n_accepted.unwrap_or_default();
        self.n_partial = descriptor.n_partial.unwrap_or_default();
        self.n_hidden = descriptor.n_hidden.unwrap_or_default();
        self.n_tries = self
            .n_teams
            .saturating_sub(self.n_accepted + self.n_hidden);
        self.first_ac_seconds = descriptor.first_ac_seconds;
        self.extra = descriptor.extra.clone();
        *self != before
    }

    /// Whether `contest_id` references this problem.
    pub fn is_linked_to(&self, contest_id: ContestId) -> bool {
        self.contest_id == Some(contest_id) || self.contest_ids.contains(&contest_id)
    }

    /// Drop the link to `contest_id`. Returns `true` if no link is left.
    pub fn unlink(&mut self, contest_id: ContestId) -> bool {
        self.contest_ids.retain(|id| *id != contest_id);
        if self.contest_id == Some(contest_id) {
            self.contest_id = self.contest_ids.first().copied();
        }
        self.contest_id.is_none() && self.contest_ids.is_empty()
    }
}
