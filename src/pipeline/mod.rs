// src/pipeline/mod.rs

//! Pipeline entry points for batch operations.
//!
//! - `StatisticsRunner`: Parse due contests and reconcile their standings
//! - `AccountsRunner`: Refresh stale account profiles
//! - `run_jobs`: Execute queued rating recalculations

pub mod accounts;
pub mod diff;
pub mod fields;
pub mod jobs;
pub mod reconcile;
pub mod scheduler;
pub mod statistics;
pub mod summary;

pub use accounts::{AccountsOptions, AccountsRunner};
pub use jobs::{Job, JobQueue, MemoryJobQueue, run_jobs};
pub use scheduler::Selection;
pub use statistics::{ParseOptions, StatisticsRunner};
pub use summary::{AccountsSummary, JobsSummary, RunSummary};
