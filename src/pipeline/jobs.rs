// src/pipeline/jobs.rs

//! Downstream job submission.
//!
//! Reconciliation only announces that derived data went stale; the jobs are
//! executed later by whoever drains the queue.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::models::{ContestId, RatingConfig, ResourceId};
use crate::pipeline::summary::JobsSummary;
use crate::rating::country::run_country_rating;
use crate::rating::problem::{ProblemRatingOutcome, run_problem_rating};
use crate::storage::EntityStore;

/// A recalculation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum Job {
    ProblemRating { contest_id: ContestId, force: bool },
    CountryRating { resource_id: ResourceId },
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProblemRating { .. } => "problem_rating",
            Self::CountryRating { .. } => "country_rating",
        }
    }

    pub fn params(&self) -> Value {
        match self {
            Self::ProblemRating { contest_id, force } => {
                json!({"contest_id": contest_id, "force": force})
            }
            Self::CountryRating { resource_id } => json!({"resource_id": resource_id}),
        }
    }
}

/// Sink for jobs.
pub trait JobQueue: Send + Sync {
    /// Queue `job`. Returns `false` if an equal job is already pending.
    fn submit(&self, job: Job) -> bool;
}

/// In-process queue with pending-job deduplication.
#[derive(Debug, Default)]
pub struct MemoryJobQueue {
    pending: Mutex<Vec<Job>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every pending job in submission order.
    pub fn drain(&self) -> Vec<Job> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *pending)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobQueue for MemoryJobQueue {
    fn submit(&self, job: Job) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if pending.contains(&job) {
            return false;
        }
        log::debug!("Job submitted: {} {}", job.name(), job.params());
        pending.push(job);
        true
    }
}

/// Execute `jobs` one by one; a failing job does not stop the rest.
pub async fn run_jobs(
    store: &dyn EntityStore,
    config: &RatingConfig,
    jobs: Vec<Job>,
) -> JobsSummary {
    let mut summary = JobsSummary::default();
    for job in jobs {
        let outcome = match &job {
            Job::ProblemRating { contest_id, force } => {
                run_problem_rating(store, config, *contest_id, *force)
                    .await
                    .map(|outcome| {
                        !matches!(
                            outcome,
                            ProblemRatingOutcome::Unchanged | ProblemRatingOutcome::Skipped(_)
                        )
                    })
            }
            Job::CountryRating { resource_id } => run_country_rating(store, config, *resource_id)
                .await
                .map(|_| true),
        };
        match outcome {
            Ok(true) => summary.executed += 1,
            Ok(false) => summary.unchanged += 1,
            Err(e) => {
                log::error!("Job {} {} failed: {}", job.name(), job.params(), e);
                summary.failed += 1;
            }
        }
    }
    summary
}
