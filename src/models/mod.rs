// src/models/mod.rs

//! Domain models for the standings pipeline.
//!
//! Entities mirror the persisted store; the standings document is what
//! plugins hand to the reconciliation engine.

mod account;
mod config;
mod contest;
mod country;
pub mod document;
mod problem;
mod resource;
pub mod standings;
mod statistics;

pub type ResourceId = u64;
pub type ContestId = u64;
pub type AccountId = u64;
pub type ProblemId = u64;
pub type StatisticsId = u64;

// Re-export all public types
pub use account::Account;
pub use config::{Config, FetcherConfig, RatingConfig, SchedulerConfig, UsersConfig};
pub use contest::{Contest, ContestInfo};
pub use country::CountryAccount;
pub use document::Document;
pub use problem::Problem;
pub use resource::{ProblemRatingPolicy, RatingBand, Resource, TimingPolicy};
pub use standings::{
    ProblemDescriptor, ProblemResult, ProblemsSpec, StandingsAction, StandingsDocument,
    StandingsRow, TeamMember, Verdict,
};
pub use statistics::{Statistics, parse_place_as_int};
