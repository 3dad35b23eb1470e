//! Storage abstractions for the entity store.
//!
//! The reconciliation engine reads prior state through [`EntityStore`] and
//! writes one contest's merge as a single [`ContestChangeSet`]. A commit is
//! all-or-nothing: either every row of the change set is visible afterwards
//! or none is.
//!
//! ## Directory Structure
//!
//! ```text
//! {storage_dir}/
//! ├── config.toml           # Application configuration
//! ├── db.json               # Entity store snapshot
//! ├── cache/                # HTTP response cache (optional)
//! ├── cookies.json          # Cookie jar (optional)
//! └── proxies.json          # Proxy scores (optional)
//! ```

pub mod local;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Account, AccountId, Contest, ContestId, CountryAccount, Problem, ProblemId, Resource,
    ResourceId, Statistics, StatisticsId,
};

// Re-export for convenience
pub use local::{Database, LocalStore};

/// A statistics row addressed by account key; the store resolves the id.
#[derive(Debug, Clone)]
pub struct StatisticsUpsert {
    pub account_key: String,
    pub statistics: Statistics,
}

/// Everything one contest's reconciliation writes.
#[derive(Debug, Clone)]
pub struct ContestChangeSet {
    /// Contest row after metadata, info, and timing sync
    pub contest: Contest,

    /// Problems to create (`id == 0`) or overwrite, unique by `(contest, key)`
    pub problems: Vec<Problem>,

    /// Problems no longer listed; unlinked and deleted once orphaned
    pub stale_problems: Vec<ProblemId>,

    /// Accounts to create (`id == 0`) or overwrite, unique by `(resource, key)`
    pub accounts: Vec<Account>,

    /// Statistics rows to create or overwrite
    pub statistics: Vec<StatisticsUpsert>,

    /// Statistics rows of participants no longer in the standings
    pub deleted_statistics: Vec<StatisticsId>,
}

impl ContestChangeSet {
    /// A change set touching only the contest row.
    pub fn contest_only(contest: Contest) -> Self {
        Self {
            contest,
            problems: Vec::new(),
            stale_problems: Vec::new(),
            accounts: Vec::new(),
            statistics: Vec::new(),
            deleted_statistics: Vec::new(),
        }
    }
}

/// Row counts of an applied commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub created_accounts: usize,
    pub created_problems: usize,
    pub deleted_problems: usize,
    pub created_statistics: usize,
    pub updated_statistics: usize,
    pub deleted_statistics: usize,
}

/// Profile refresh of one account, with backfilled statistics rows.
#[derive(Debug, Clone)]
pub struct AccountUpdate {
    pub account: Account,
    pub statistics: Vec<Statistics>,
}

/// Persisted entity store.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn resources(&self) -> Result<Vec<Resource>>;

    async fn resource(&self, id: ResourceId) -> Result<Option<Resource>>;

    async fn resource_by_host(&self, host: &str) -> Result<Option<Resource>>;

    /// Insert or update by host; counters and id of an existing row are kept.
    async fn upsert_resource(&self, resource: Resource) -> Result<Resource>;

    async fn contests_of(&self, resource_id: ResourceId) -> Result<Vec<Contest>>;

    async fn contest(&self, id: ContestId) -> Result<Option<Contest>>;

    /// Overwrite a single contest row.
    async fn save_contest(&self, contest: Contest) -> Result<Contest>;

    /// Delete a contest with its statistics and orphaned problems.
    async fn delete_contest(&self, id: ContestId) -> Result<bool>;

    /// Insert or update discovered contests by `(resource, key)`.
    ///
    /// Returns the number of newly created contests.
    async fn import_contests(&self, resource_id: ResourceId, contests: Vec<Contest>)
    -> Result<usize>;

    /// Problems linked to a contest, in list order.
    async fn problems_of_contest(&self, contest_id: ContestId) -> Result<Vec<Problem>>;

    async fn statistics_of_contest(&self, contest_id: ContestId) -> Result<Vec<Statistics>>;

    async fn statistics_of_account(&self, account_id: AccountId) -> Result<Vec<Statistics>>;

    async fn account(&self, id: AccountId) -> Result<Option<Account>>;

    async fn accounts_of(&self, resource_id: ResourceId) -> Result<Vec<Account>>;

    /// Existing accounts among `keys`; missing keys are simply absent.
    async fn accounts_by_keys(&self, resource_id: ResourceId, keys: &[String])
    -> Result<Vec<Account>>;

    async fn accounts_by_ids(&self, ids: &[AccountId]) -> Result<Vec<Account>>;

    /// Apply one contest's merge atomically.
    async fn commit_contest(&self, changes: ContestChangeSet) -> Result<CommitReport>;

    /// Apply profile refreshes atomically. Returns the number of accounts written.
    async fn apply_account_updates(&self, updates: Vec<AccountUpdate>) -> Result<usize>;

    /// Delete an account and its statistics.
    async fn delete_account(&self, id: AccountId) -> Result<bool>;

    /// Store problem ratings and the input hash on the contest.
    async fn update_problem_ratings(
        &self,
        contest_id: ContestId,
        ratings: Vec<(ProblemId, Option<f64>)>,
        hash: String,
    ) -> Result<()>;

    async fn country_accounts(&self, resource_id: ResourceId) -> Result<Vec<CountryAccount>>;

    /// Replace every country aggregate of a resource.
    async fn replace_country_accounts(
        &self,
        resource_id: ResourceId,
        rows: Vec<CountryAccount>,
    ) -> Result<()>;
}
