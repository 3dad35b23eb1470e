// src/pipeline/summary.rs

//! Counters reported at the end of a batch run.

use serde::Serialize;

use crate::pipeline::diff::StatisticsDiff;
use crate::storage::CommitReport;

/// Totals of a statistics parse run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Contests selected by the scheduler
    pub total: usize,
    pub parsed: usize,
    pub failed: usize,
    /// Selected but not attempted (resource stopped, plugin missing)
    pub skipped: usize,
    pub deleted_contests: usize,

    pub created_statistics: usize,
    pub updated_statistics: usize,
    pub deleted_statistics: usize,
    pub created_accounts: usize,
    pub created_problems: usize,
    pub deleted_problems: usize,
    pub skipped_rows: usize,

    pub jobs_submitted: usize,

    /// Resources whose pass ended early
    pub stopped_resources: Vec<String>,
}

impl RunSummary {
    pub fn record_commit(&mut self, report: &CommitReport) {
        self.created_statistics += report.created_statistics;
        self.updated_statistics += report.updated_statistics;
        self.deleted_statistics += report.deleted_statistics;
        self.created_accounts += report.created_accounts;
        self.created_problems += report.created_problems;
        self.deleted_problems += report.deleted_problems;
    }

    /// Count a dry-run diff as if it had been committed.
    pub fn record_diff(&mut self, diff: &StatisticsDiff, new_accounts: usize) {
        self.created_statistics += diff.created.len();
        self.updated_statistics += diff.updated.len();
        self.deleted_statistics += diff.deleted.len();
        self.created_accounts += new_accounts;
    }

    pub fn merge(&mut self, other: RunSummary) {
        self.total += other.total;
        self.parsed += other.parsed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.deleted_contests += other.deleted_contests;
        self.created_statistics += other.created_statistics;
        self.updated_statistics += other.updated_statistics;
        self.deleted_statistics += other.deleted_statistics;
        self.created_accounts += other.created_accounts;
        self.created_problems += other.created_problems;
        self.deleted_problems += other.deleted_problems;
        self.skipped_rows += other.skipped_rows;
        self.jobs_submitted += other.jobs_submitted;
        self.stopped_resources.extend(other.stopped_resources);
    }

    pub fn log(&self) {
        log::info!("Parse summary:");
        log::info!(
            "  contests: {} total, {} parsed, {} failed, {} skipped, {} deleted",
            self.total,
            self.parsed,
            self.failed,
            self.skipped,
            self.deleted_contests
        );
        log::info!(
            "  statistics: {} created, {} updated, {} deleted",
            self.created_statistics,
            self.updated_statistics,
            self.deleted_statistics
        );
        log::info!(
            "  accounts created: {}, problems: {} created / {} deleted",
            self.created_accounts,
            self.created_problems,
            self.deleted_problems
        );
        if self.skipped_rows > 0 {
            log::warn!("  skipped rows: {}", self.skipped_rows);
        }
        log::info!("  jobs submitted: {}", self.jobs_submitted);
        for host in &self.stopped_resources {
            log::warn!("  stopped early: {}", host);
        }
    }
}

/// Totals of an accounts refresh run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccountsSummary {
    pub total: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
    /// Statistics rows rewritten from profile data
    pub statistics_updated: usize,
}

impl AccountsSummary {
    pub fn log(&self, host: &str) {
        log::info!(
            "{}: accounts {} total, {} updated, {} deleted, {} skipped ({} statistics updated)",
            host,
            self.total,
            self.updated,
            self.deleted,
            self.skipped,
            self.statistics_updated
        );
    }
}

/// Totals of a job queue drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobsSummary {
    pub executed: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl JobsSummary {
    pub fn log(&self) {
        log::info!(
            "Jobs: {} executed, {} unchanged, {} failed",
            self.executed,
            self.unchanged,
            self.failed
        );
    }
}
