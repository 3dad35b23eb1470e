//! Local filesystem entity store.
//!
//! Keeps the whole database in memory and persists it as a single JSON
//! snapshot. Every mutation is staged on a copy, written to disk, and only
//! then swapped in, so a failed write leaves both the file and the
//! in-memory state as they were.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! └── db.json               # Entity store snapshot
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::models::{
    Account, AccountId, Contest, ContestId, CountryAccount, Problem, ProblemId, Resource,
    ResourceId, Statistics, StatisticsId,
};
use crate::storage::{
    AccountUpdate, CommitReport, ContestChangeSet, EntityStore, StatisticsUpsert,
};

const DB_FILE: &str = "db.json";

/// In-memory tables of the local store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    next_id: u64,

    #[serde(default)]
    pub resources: BTreeMap<ResourceId, Resource>,

    #[serde(default)]
    pub contests: BTreeMap<ContestId, Contest>,

    #[serde(default)]
    pub accounts: BTreeMap<AccountId, Account>,

    #[serde(default)]
    pub problems: BTreeMap<ProblemId, Problem>,

    #[serde(default)]
    pub statistics: BTreeMap<StatisticsId, Statistics>,

    #[serde(default)]
    pub country_accounts: Vec<CountryAccount>,
}

impl Database {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn account_index(&self, resource_id: ResourceId) -> HashMap<String, AccountId> {
        self.accounts
            .values()
            .filter(|a| a.resource_id == resource_id)
            .map(|a| (a.key.clone(), a.id))
            .collect()
    }

    fn find_problem(&self, contest_id: ContestId, key: &str) -> Option<ProblemId> {
        self.problems
            .values()
            .find(|p| p.key == key && p.is_linked_to(contest_id))
            .map(|p| p.id)
    }

    fn apply_contest(&mut self, changes: ContestChangeSet) -> Result<CommitReport> {
        let ContestChangeSet {
            contest,
            problems,
            stale_problems,
            accounts,
            statistics,
            deleted_statistics,
        } = changes;

        let contest_id = contest.id;
        let resource_id = contest.resource_id;
        let previous_writers = match self.contests.get(&contest_id) {
            Some(previous) => previous.writers.clone(),
            None => return Err(AppError::not_found(format!("contest {contest_id}"))),
        };

        let mut report = CommitReport::default();
        let mut touched: HashSet<AccountId> = HashSet::new();

        // Accounts first so statistics can resolve their keys
        let mut account_ids = self.account_index(resource_id);
        for mut account in accounts {
            account.resource_id = resource_id;
            let id = match account_ids.get(&account.key) {
                Some(id) => *id,
                None => {
                    let id = self.allocate_id();
                    account_ids.insert(account.key.clone(), id);
                    report.created_accounts += 1;
                    id
                }
            };
            account.id = id;
            touched.insert(id);
            match self.accounts.get_mut(&id) {
                // Another contest may have committed since this row was read
                Some(stored) => stored.merge_from(account, contest.start_time),
                None => {
                    self.accounts.insert(id, account);
                }
            }
        }
        for key in previous_writers.iter().chain(contest.writers.iter()) {
            if let Some(id) = account_ids.get(key) {
                touched.insert(*id);
            }
        }

        for mut problem in problems {
            problem.resource_id = resource_id;
            if !problem.contest_ids.contains(&contest_id) {
                problem.contest_ids.push(contest_id);
            }
            let existing = if self.problems.contains_key(&problem.id) {
                Some(problem.id)
            } else {
                self.find_problem(contest_id, &problem.key)
            };
            let id = match existing {
                Some(id) => id,
                None => {
                    report.created_problems += 1;
                    self.allocate_id()
                }
            };
            problem.id = id;
            self.problems.insert(id, problem);
        }
        for id in stale_problems {
            let orphaned = match self.problems.get_mut(&id) {
                Some(problem) => problem.unlink(contest_id),
                None => continue,
            };
            if orphaned {
                self.problems.remove(&id);
                report.deleted_problems += 1;
            }
        }

        let mut stat_ids: HashMap<AccountId, StatisticsId> = self
            .statistics
            .values()
            .filter(|s| s.contest_id == contest_id)
            .map(|s| (s.account_id, s.id))
            .collect();
        for id in deleted_statistics {
            if let Some(stat) = self.statistics.remove(&id) {
                stat_ids.remove(&stat.account_id);
                touched.insert(stat.account_id);
                report.deleted_statistics += 1;
            }
        }
        for StatisticsUpsert {
            account_key,
            mut statistics,
        } in statistics
        {
            let account_id = account_ids.get(&account_key).copied().ok_or_else(|| {
                AppError::DataInconsistency(format!(
                    "statistics of {} reference unknown account '{account_key}'",
                    contest.key
                ))
            })?;
            let id = match stat_ids.get(&account_id) {
                Some(id) => {
                    report.updated_statistics += 1;
                    *id
                }
                None => {
                    let id = self.allocate_id();
                    stat_ids.insert(account_id, id);
                    report.created_statistics += 1;
                    id
                }
            };
            statistics.id = id;
            statistics.account_id = account_id;
            statistics.contest_id = contest_id;
            touched.insert(account_id);
            self.statistics.insert(id, statistics);
        }

        self.contests.insert(contest_id, contest);
        self.recount_contest(contest_id);
        self.recount_accounts(&touched);
        self.recount_resource(resource_id);
        Ok(report)
    }

    fn remove_contest(&mut self, id: ContestId) -> bool {
        let Some(contest) = self.contests.remove(&id) else {
            return false;
        };
        let mut touched: HashSet<AccountId> = HashSet::new();
        self.statistics.retain(|_, stat| {
            if stat.contest_id == id {
                touched.insert(stat.account_id);
                false
            } else {
                true
            }
        });
        self.problems.retain(|_, problem| {
            !(problem.is_linked_to(id) && problem.unlink(id))
        });
        let index = self.account_index(contest.resource_id);
        touched.extend(contest.writers.iter().filter_map(|key| index.get(key)));
        self.recount_accounts(&touched);
        self.recount_resource(contest.resource_id);
        true
    }

    fn remove_account(&mut self, id: AccountId) -> bool {
        let Some(account) = self.accounts.remove(&id) else {
            return false;
        };
        let mut contests: HashSet<ContestId> = HashSet::new();
        self.statistics.retain(|_, stat| {
            if stat.account_id == id {
                contests.insert(stat.contest_id);
                false
            } else {
                true
            }
        });
        for contest_id in contests {
            self.recount_contest(contest_id);
        }
        self.recount_resource(account.resource_id);
        true
    }

    fn recount_contest(&mut self, id: ContestId) {
        let n_statistics = self.statistics.values().filter(|s| s.contest_id == id).count();
        let n_problems = self.problems.values().filter(|p| p.is_linked_to(id)).count();
        if let Some(contest) = self.contests.get_mut(&id) {
            contest.n_statistics = n_statistics;
            contest.n_problems = n_problems;
        }
    }

    fn recount_accounts(&mut self, ids: &HashSet<AccountId>) {
        if ids.is_empty() {
            return;
        }
        let mut n_contests: HashMap<AccountId, usize> = HashMap::new();
        for stat in self.statistics.values() {
            if ids.contains(&stat.account_id) {
                *n_contests.entry(stat.account_id).or_default() += 1;
            }
        }

        let keys: HashMap<(ResourceId, String), AccountId> = ids
            .iter()
            .filter_map(|id| self.accounts.get(id))
            .map(|a| ((a.resource_id, a.key.clone()), a.id))
            .collect();
        let mut n_writers: HashMap<AccountId, usize> = HashMap::new();
        for contest in self.contests.values() {
            for writer in &contest.writers {
                if let Some(id) = keys.get(&(contest.resource_id, writer.clone())) {
                    *n_writers.entry(*id).or_default() += 1;
                }
            }
        }

        for id in ids {
            if let Some(account) = self.accounts.get_mut(id) {
                account.n_contests = n_contests.get(id).copied().unwrap_or(0);
                account.n_writers = n_writers.get(id).copied().unwrap_or(0);
            }
        }
    }

    fn recount_resource(&mut self, id: ResourceId) {
        let n_accounts = self.accounts.values().filter(|a| a.resource_id == id).count();
        let n_contests = self.contests.values().filter(|c| c.resource_id == id).count();
        if let Some(resource) = self.resources.get_mut(&id) {
            resource.n_accounts = n_accounts;
            resource.n_contests = n_contests;
        }
    }
}

/// Local filesystem store backend.
pub struct LocalStore {
    root_dir: Option<PathBuf>,
    db: RwLock<Database>,
}

impl LocalStore {
    /// Open the store rooted at the given directory, loading `db.json` if present.
    pub async fn open(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let root_dir = root_dir.into();
        let path = root_dir.join(DB_FILE);
        let db = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No {} in {:?}, starting empty", DB_FILE, root_dir);
                Database::default()
            }
            Err(e) => return Err(AppError::Io(e)),
        };
        Ok(Self {
            root_dir: Some(root_dir),
            db: RwLock::new(db),
        })
    }

    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            root_dir: None,
            db: RwLock::new(Database::default()),
        }
    }

    /// Copy of the current tables.
    pub async fn snapshot(&self) -> Database {
        self.db.read().await.clone()
    }

    pub fn root_dir(&self) -> Option<&Path> {
        self.root_dir.as_deref()
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn persist(&self, db: &Database) -> Result<()> {
        let Some(root_dir) = &self.root_dir else {
            return Ok(());
        };
        let bytes = serde_json::to_vec(db)?;
        Self::write_bytes(&root_dir.join(DB_FILE), &bytes).await
    }

    /// Stage `apply` on a copy, persist it, then swap it in.
    async fn mutate<T, F>(&self, apply: F) -> Result<T>
    where
        T: Send,
        F: FnOnce(&mut Database) -> Result<T> + Send,
    {
        let mut guard = self.db.write().await;
        let mut staged = guard.clone();
        let out = apply(&mut staged)?;
        self.persist(&staged).await?;
        *guard = staged;
        Ok(out)
    }
}

#[async_trait]
impl EntityStore for LocalStore {
    async fn resources(&self) -> Result<Vec<Resource>> {
        Ok(self.db.read().await.resources.values().cloned().collect())
    }

    async fn resource(&self, id: ResourceId) -> Result<Option<Resource>> {
        Ok(self.db.read().await.resources.get(&id).cloned())
    }

    async fn resource_by_host(&self, host: &str) -> Result<Option<Resource>> {
        let db = self.db.read().await;
        Ok(db.resources.values().find(|r| r.host == host).cloned())
    }

    async fn upsert_resource(&self, mut resource: Resource) -> Result<Resource> {
        self.mutate(move |db| {
            let existing = db
                .resources
                .values()
                .find(|r| r.host == resource.host)
                .map(|r| r.id);
            resource.id = match existing {
                Some(id) => id,
                None => db.allocate_id(),
            };
            db.resources.insert(resource.id, resource.clone());
            db.recount_resource(resource.id);
            Ok(db.resources.get(&resource.id).cloned().unwrap_or(resource))
        })
        .await
    }

    async fn contests_of(&self, resource_id: ResourceId) -> Result<Vec<Contest>> {
        let db = self.db.read().await;
        Ok(db
            .contests
            .values()
            .filter(|c| c.resource_id == resource_id)
            .cloned()
            .collect())
    }

    async fn contest(&self, id: ContestId) -> Result<Option<Contest>> {
        Ok(self.db.read().await.contests.get(&id).cloned())
    }

    async fn save_contest(&self, mut contest: Contest) -> Result<Contest> {
        self.mutate(move |db| {
            if contest.id == 0 {
                let duplicate = db
                    .contests
                    .values()
                    .any(|c| c.resource_id == contest.resource_id && c.key == contest.key);
                if duplicate {
                    return Err(AppError::validation(format!(
                        "contest '{}' already exists",
                        contest.key
                    )));
                }
                contest.id = db.allocate_id();
            } else if !db.contests.contains_key(&contest.id) {
                return Err(AppError::not_found(format!("contest {}", contest.id)));
            }
            db.contests.insert(contest.id, contest.clone());
            db.recount_contest(contest.id);
            db.recount_resource(contest.resource_id);
            Ok(db.contests.get(&contest.id).cloned().unwrap_or(contest))
        })
        .await
    }

    async fn delete_contest(&self, id: ContestId) -> Result<bool> {
        self.mutate(move |db| Ok(db.remove_contest(id))).await
    }

    async fn import_contests(
        &self,
        resource_id: ResourceId,
        contests: Vec<Contest>,
    ) -> Result<usize> {
        self.mutate(move |db| {
            if !db.resources.contains_key(&resource_id) {
                return Err(AppError::not_found(format!("resource {resource_id}")));
            }
            let mut created = 0;
            for incoming in contests {
                let existing = db
                    .contests
                    .values_mut()
                    .find(|c| c.resource_id == resource_id && c.key == incoming.key);
                match existing {
                    Some(contest) => {
                        contest.title = incoming.title;
                        contest.url = incoming.url;
                        contest.start_time = incoming.start_time;
                        contest.end_time = incoming.end_time;
                        contest.kind = incoming.kind;
                        contest.is_stage = incoming.is_stage;
                    }
                    None => {
                        let mut contest = incoming;
                        contest.id = db.allocate_id();
                        contest.resource_id = resource_id;
                        db.contests.insert(contest.id, contest);
                        created += 1;
                    }
                }
            }
            db.recount_resource(resource_id);
            Ok(created)
        })
        .await
    }

    async fn problems_of_contest(&self, contest_id: ContestId) -> Result<Vec<Problem>> {
        let db = self.db.read().await;
        let mut problems: Vec<Problem> = db
            .problems
            .values()
            .filter(|p| p.is_linked_to(contest_id))
            .cloned()
            .collect();
        problems.sort_by_key(|p| p.index);
        Ok(problems)
    }

    async fn statistics_of_contest(&self, contest_id: ContestId) -> Result<Vec<Statistics>> {
        let db = self.db.read().await;
        Ok(db
            .statistics
            .values()
            .filter(|s| s.contest_id == contest_id)
            .cloned()
            .collect())
    }

    async fn statistics_of_account(&self, account_id: AccountId) -> Result<Vec<Statistics>> {
        let db = self.db.read().await;
        Ok(db
            .statistics
            .values()
            .filter(|s| s.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn account(&self, id: AccountId) -> Result<Option<Account>> {
        Ok(self.db.read().await.accounts.get(&id).cloned())
    }

    async fn accounts_of(&self, resource_id: ResourceId) -> Result<Vec<Account>> {
        let db = self.db.read().await;
        Ok(db
            .accounts
            .values()
            .filter(|a| a.resource_id == resource_id)
            .cloned()
            .collect())
    }

    async fn accounts_by_keys(
        &self,
        resource_id: ResourceId,
        keys: &[String],
    ) -> Result<Vec<Account>> {
        let wanted: HashSet<&str> = keys.iter().map(String::as_str).collect();
        let db = self.db.read().await;
        Ok(db
            .accounts
            .values()
            .filter(|a| a.resource_id == resource_id && wanted.contains(a.key.as_str()))
            .cloned()
            .collect())
    }

    async fn accounts_by_ids(&self, ids: &[AccountId]) -> Result<Vec<Account>> {
        let db = self.db.read().await;
        Ok(ids.iter().filter_map(|id| db.accounts.get(id)).cloned().collect())
    }

    async fn commit_contest(&self, changes: ContestChangeSet) -> Result<CommitReport> {
        self.mutate(move |db| db.apply_contest(changes)).await
    }

    async fn apply_account_updates(&self, updates: Vec<AccountUpdate>) -> Result<usize> {
        self.mutate(move |db| {
            let mut touched: HashSet<AccountId> = HashSet::new();
            for AccountUpdate {
                account,
                statistics,
            } in updates
            {
                if !db.accounts.contains_key(&account.id) {
                    log::warn!("Skipping update of unknown account {}", account.key);
                    continue;
                }
                for stat in statistics {
                    if stat.account_id == account.id && db.statistics.contains_key(&stat.id) {
                        db.statistics.insert(stat.id, stat);
                    }
                }
                touched.insert(account.id);
                db.accounts.insert(account.id, account);
            }
            db.recount_accounts(&touched);
            Ok(touched.len())
        })
        .await
    }

    async fn delete_account(&self, id: AccountId) -> Result<bool> {
        self.mutate(move |db| Ok(db.remove_account(id))).await
    }

    async fn update_problem_ratings(
        &self,
        contest_id: ContestId,
        ratings: Vec<(ProblemId, Option<f64>)>,
        hash: String,
    ) -> Result<()> {
        self.mutate(move |db| {
            let contest = db
                .contests
                .get_mut(&contest_id)
                .ok_or_else(|| AppError::not_found(format!("contest {contest_id}")))?;
            contest.info.problem_rating_hash = Some(hash);
            for (id, rating) in ratings {
                if let Some(problem) = db.problems.get_mut(&id) {
                    problem.rating = rating;
                }
            }
            Ok(())
        })
        .await
    }

    async fn country_accounts(&self, resource_id: ResourceId) -> Result<Vec<CountryAccount>> {
        let db = self.db.read().await;
        Ok(db
            .country_accounts
            .iter()
            .filter(|c| c.resource_id == resource_id)
            .cloned()
            .collect())
    }

    async fn replace_country_accounts(
        &self,
        resource_id: ResourceId,
        rows: Vec<CountryAccount>,
    ) -> Result<()> {
        self.mutate(move |db| {
            db.country_accounts.retain(|c| c.resource_id != resource_id);
            db.country_accounts.extend(rows);
            Ok(())
        })
        .await
    }
}
