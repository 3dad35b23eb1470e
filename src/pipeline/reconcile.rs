// src/pipeline/reconcile.rs

//! Reconciliation engine.
//!
//! Turns one fetched [`StandingsDocument`] plus the contest's prior state
//! into a [`ContestChangeSet`]: contest metadata, problem rows with
//! aggregate counters, accounts to create or backfill, statistics to upsert,
//! and statistics of departed participants to delete. Nothing here touches
//! the store; the caller commits the change set as one unit.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde_json::{Value, json};

use crate::error::Result;
use crate::models::document::{Document, merge_into};
use crate::models::{
    Account, Contest, Problem, ProblemDescriptor, ProblemResult, Resource,
    StandingsAction, StandingsDocument, StandingsRow, Statistics, TeamMember, Verdict,
    parse_place_as_int,
};
use crate::pipeline::diff::{DiffCalculator, StatisticsDiff};
use crate::pipeline::fields::{is_listed_field, merge_fields, normalize_field};
use crate::storage::{ContestChangeSet, EntityStore, StatisticsUpsert};
use crate::utils::time::secs;

/// Persisted state a reconciliation starts from.
#[derive(Debug, Clone, Default)]
pub struct PriorState {
    pub problems: Vec<Problem>,

    /// Existing statistics rows keyed by account key
    pub statistics: Vec<(String, Statistics)>,

    /// Known accounts by key
    pub accounts: HashMap<String, Account>,
}

impl PriorState {
    /// Load problems and statistics of `contest` with their accounts.
    pub async fn load(store: &dyn EntityStore, contest: &Contest) -> Result<Self> {
        let problems = store.problems_of_contest(contest.id).await?;
        let stats = store.statistics_of_contest(contest.id).await?;
        let ids: Vec<_> = stats.iter().map(|s| s.account_id).collect();
        let by_id: HashMap<_, Account> = store
            .accounts_by_ids(&ids)
            .await?
            .into_iter()
            .map(|a| (a.id, a))
            .collect();

        let mut statistics = Vec::with_capacity(stats.len());
        let mut accounts = HashMap::with_capacity(by_id.len());
        for stat in stats {
            match by_id.get(&stat.account_id) {
                Some(account) => {
                    accounts.insert(account.key.clone(), account.clone());
                    statistics.push((account.key.clone(), stat));
                }
                None => log::warn!(
                    "{}: statistics {} without account {}",
                    contest.identity(),
                    stat.id,
                    stat.account_id
                ),
            }
        }
        Ok(Self {
            problems,
            statistics,
            accounts,
        })
    }

    /// Add the accounts referenced by `document` that are not loaded yet.
    pub async fn load_document_accounts(
        &mut self,
        store: &dyn EntityStore,
        contest: &Contest,
        document: &StandingsDocument,
    ) -> Result<()> {
        let mut keys: Vec<String> = Vec::new();
        for row in document.rows() {
            keys.push(row.member.clone());
            keys.extend(row.members.iter().map(|m| m.key().to_string()));
        }
        keys.extend(document.writers.iter().cloned());
        keys.retain(|key| !key.is_empty() && !self.accounts.contains_key(key));
        keys.sort();
        keys.dedup();
        if keys.is_empty() {
            return Ok(());
        }
        for account in store.accounts_by_keys(contest.resource_id, &keys).await? {
            self.accounts.insert(account.key.clone(), account);
        }
        Ok(())
    }

    /// Previous additions by account key, as handed to plugins.
    pub fn previous_results(&self) -> HashMap<String, Document> {
        self.statistics
            .iter()
            .map(|(key, stat)| (key.clone(), stat.addition.clone()))
            .collect()
    }
}

/// Per-run switches.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    /// Sync contest metadata and problems only
    pub no_stats: bool,

    /// Partial refresh of these account keys; others are left alone
    pub users: Option<Vec<String>>,
}

/// What to do with the contest.
#[derive(Debug, Clone)]
pub enum Reconciliation {
    /// The contest vanished upstream
    Delete,
    Merge(Box<MergePlan>),
}

/// A computed merge, ready to commit.
#[derive(Debug, Clone)]
pub struct MergePlan {
    pub changes: ContestChangeSet,
    pub diff: StatisticsDiff,
    pub new_accounts: usize,
    pub skipped_rows: usize,
}

/// Aggregate counters of one problem.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Counters {
    n_teams: usize,
    n_accepted: usize,
    n_partial: usize,
    n_hidden: usize,
    first_ac_seconds: Option<i64>,
}

impl Counters {
    fn write_to(&self, descriptor: &mut ProblemDescriptor) {
        descriptor.n_teams = Some(self.n_teams);
        descriptor.n_accepted = Some(self.n_accepted);
        descriptor.n_partial = Some(self.n_partial);
        descriptor.n_hidden = Some(self.n_hidden);
        descriptor.first_ac_seconds = self.first_ac_seconds;
    }
}

/// Count attempts per problem key in one pass over the rows.
///
/// A team is counted once per problem, keyed by `team_id` when present.
fn count_problems(
    document: &StandingsDocument,
    problems: &[ProblemDescriptor],
) -> HashMap<String, Counters> {
    let mut lookup: HashMap<(Option<&str>, String), (String, Option<f64>)> = HashMap::new();
    for problem in problems {
        let target = (problem.key(), problem.full_score);
        let short = problem.short_code();
        for division in &problem.divisions {
            lookup.insert((Some(division.as_str()), short.clone()), target.clone());
        }
        lookup.entry((None, short)).or_insert(target);
    }

    let mut counters: HashMap<String, Counters> = HashMap::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    for (member, row) in &document.result {
        let team = row.team_id.clone().unwrap_or_else(|| member.clone());
        for (short, value) in &row.problems {
            let found = lookup
                .get(&(row.division.as_deref(), short.clone()))
                .or_else(|| lookup.get(&(None, short.clone())));
            let Some((key, full_score)) = found else {
                continue;
            };
            let result = ProblemResult::from_value(value);
            let verdict = result.verdict(*full_score);
            if verdict == Verdict::Empty || !seen.insert((team.clone(), key.clone())) {
                continue;
            }
            let counter = counters.entry(key.clone()).or_default();
            counter.n_teams += 1;
            match verdict {
                Verdict::Accepted => {
                    counter.n_accepted += 1;
                    if let Some(t) = result.time_seconds {
                        counter.first_ac_seconds =
                            Some(counter.first_ac_seconds.map_or(t, |best| best.min(t)));
                    }
                }
                Verdict::Partial(_) => counter.n_partial += 1,
                Verdict::Hidden => counter.n_hidden += 1,
                Verdict::Empty | Verdict::Failed => {}
            }
        }
    }
    counters
}

fn sync_metadata(contest: &mut Contest, document: &StandingsDocument) {
    if let Some(url) = &document.url {
        if contest.url != *url {
            contest.url = url.clone();
        }
    }
    if let Some(title) = &document.title {
        if contest.title != *title {
            contest.title = title.clone();
        }
    }
    if let Some(invisible) = document.invisible {
        contest.invisible = invisible;
    }
    if let Some(duration) = document.duration_in_secs {
        let end_time = contest.start_time + secs(duration);
        if end_time != contest.end_time {
            contest.end_time = end_time;
        }
    }

    merge_into(&mut contest.info.standings, &document.options);
    merge_into(&mut contest.info.fields_types, &document.fields_types);
    for field in &document.hidden_fields {
        let field = normalize_field(field);
        if !contest.info.hidden_fields.contains(&field) {
            contest.info.hidden_fields.push(field);
        }
    }
    if !document.writers.is_empty() {
        contest.writers = document.writers.clone();
    }
    contest.info.timing_statistic_delta = document.timing_statistic_delta;
}

/// Problem rows to upsert and ids of problems no longer listed.
fn sync_problems(
    resource: &Resource,
    contest: &mut Contest,
    document: &StandingsDocument,
    prior: &[Problem],
) -> (Vec<Problem>, Vec<u64>) {
    let Some(mut listing) = document.problems.clone() else {
        return (Vec::new(), Vec::new());
    };
    let counters = count_problems(document, &listing.flatten());
    for (_, descriptor) in listing.descriptors_mut() {
        counters
            .get(&descriptor.key())
            .copied()
            .unwrap_or_default()
            .write_to(descriptor);
    }

    let mut existing: HashMap<&str, &Problem> =
        prior.iter().map(|p| (p.key.as_str(), p)).collect();
    let mut upserts = Vec::new();
    for (index, descriptor) in listing.flatten().iter().enumerate() {
        let key = descriptor.key();
        if key.is_empty() {
            log::warn!("{}: problem without key skipped", contest.identity());
            continue;
        }
        match existing.remove(key.as_str()) {
            Some(problem) => {
                let mut problem = problem.clone();
                if problem.apply_descriptor(index, descriptor) {
                    upserts.push(problem);
                }
            }
            None => upserts.push(Problem::from_descriptor(
                resource.id,
                contest.id,
                index,
                descriptor,
            )),
        }
    }
    let mut stale: Vec<u64> = existing.values().map(|p| p.id).collect();
    stale.sort_unstable();

    contest.info.problems = Some(listing);
    (upserts, stale)
}

fn member_value(member: &TeamMember) -> Value {
    match member {
        TeamMember::Key(key) => Value::String(key.clone()),
        TeamMember::Account { account, name } => match name {
            Some(name) => json!({"account": account, "name": name}),
            None => json!({"account": account}),
        },
    }
}

/// Normalized addition of a row, without team bookkeeping.
fn row_addition(row: &StandingsRow) -> Document {
    let mut addition = Document::new();
    if !row.problems.is_empty() {
        let problems: Document = row
            .problems
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        addition.insert("problems".into(), Value::Object(problems));
    }
    let typed = [
        ("name", &row.name),
        ("country", &row.country),
        ("team_id", &row.team_id),
        ("division", &row.division),
    ];
    for (key, value) in typed {
        if let Some(value) = value {
            addition.insert(key.into(), Value::String(value.clone()));
        }
    }
    for (key, value) in &row.extra {
        addition.insert(normalize_field(key), value.clone());
    }
    addition
}

/// One account's share of a row.
struct Target {
    key: String,
    name: Option<String>,
    country: Option<String>,
    addition: Document,
}

fn row_targets(row: &StandingsRow, split_team: bool) -> Vec<Target> {
    let mut addition = row_addition(row);
    if row.members.is_empty() {
        return vec![Target {
            key: row.member.clone(),
            name: row.name.clone(),
            country: row.country.clone(),
            addition,
        }];
    }

    if !split_team {
        let members = row.members.iter().map(member_value).collect();
        addition.insert("_members".into(), Value::Array(members));
        return vec![Target {
            key: row.member.clone(),
            name: row.name.clone(),
            country: row.country.clone(),
            addition,
        }];
    }

    let team_id = row.team_id.clone().unwrap_or_else(|| row.member.clone());
    addition.insert("team_id".into(), Value::String(team_id));
    row.members
        .iter()
        .map(|member| Target {
            key: member.key().to_string(),
            name: member.name().map(str::to_string),
            country: row.country.clone(),
            addition: addition.clone(),
        })
        .collect()
}

/// Compute the change set for one contest.
pub fn reconcile(
    resource: &Resource,
    contest: &Contest,
    document: &StandingsDocument,
    prior: &PriorState,
    options: &ReconcileOptions,
) -> Reconciliation {
    let mut contest = contest.clone();
    match &document.action {
        Some(StandingsAction::Delete) => return Reconciliation::Delete,
        Some(StandingsAction::Url(url)) => contest.url = url.clone(),
        None => {}
    }
    sync_metadata(&mut contest, document);

    let partial = options.users.is_some();
    let (problems, stale_problems) = if partial {
        (Vec::new(), Vec::new())
    } else {
        contest.has_hidden_results = document.has_hidden_results();
        sync_problems(resource, &mut contest, document, &prior.problems)
    };

    let mut working: IndexMap<String, Account> = IndexMap::new();
    for writer in &contest.writers {
        if !prior.accounts.contains_key(writer) && resource.accounts_auto_create {
            working
                .entry(writer.clone())
                .or_insert_with(|| Account::new(resource.id, writer.clone()));
        }
    }

    let mut current: IndexMap<String, Statistics> = IndexMap::new();
    let mut discovered: Vec<String> = Vec::new();
    let mut skipped_rows = 0;
    let prior_ids: HashMap<&str, u64> = prior
        .statistics
        .iter()
        .map(|(key, stat)| (key.as_str(), stat.id))
        .collect();
    let major = resource.is_major_kind(contest.kind.as_deref());

    let rows: Vec<StandingsRow> = if options.no_stats {
        Vec::new()
    } else {
        document.rows().collect()
    };
    for row in &rows {
        for target in row_targets(row, resource.split_team()) {
            if target.key.is_empty() {
                skipped_rows += 1;
                continue;
            }
            if current.contains_key(&target.key) {
                log::warn!(
                    "{}: duplicate row for account '{}'",
                    contest.identity(),
                    target.key
                );
                skipped_rows += 1;
                continue;
            }

            if !working.contains_key(&target.key) {
                let account = match prior.accounts.get(&target.key) {
                    Some(account) => account.clone(),
                    None if resource.accounts_auto_create => {
                        Account::new(resource.id, target.key.clone())
                    }
                    None => {
                        log::debug!(
                            "{}: unknown account '{}' skipped",
                            contest.identity(),
                            target.key
                        );
                        skipped_rows += 1;
                        continue;
                    }
                };
                working.insert(target.key.clone(), account);
            }
            let Some(account) = working.get_mut(&target.key) else {
                continue;
            };

            let place_as_int = parse_place_as_int(row.place.as_deref());
            let stat = Statistics {
                id: prior_ids.get(target.key.as_str()).copied().unwrap_or(0),
                account_id: account.id,
                contest_id: contest.id,
                place: row.place.clone(),
                place_as_int,
                solving: row.solving,
                upsolving: row.upsolving,
                addition: target.addition,
            };

            if let Some(name) = &target.name {
                account.backfill_name(name);
            }
            if let Some(country) = &target.country {
                account.backfill_country(country);
            }
            account.bump_activity(contest.start_time);
            if major && row.has_rating_fields() {
                let latest = account.bump_rating_activity(contest.start_time)
                    || account.last_rating_activity == Some(contest.start_time);
                if latest {
                    if let Some(rating) = stat.new_rating() {
                        account.rating = Some(rating);
                    }
                }
            }

            for key in stat.addition.keys() {
                if is_listed_field(key) && !discovered.contains(key) {
                    discovered.push(key.clone());
                }
            }
            current.insert(target.key, stat);
        }
    }

    let diff = if options.no_stats {
        StatisticsDiff::default()
    } else {
        let calculator = match &options.users {
            Some(users) => DiffCalculator::scoped(users.iter().cloned()),
            None => DiffCalculator::new(),
        };
        calculator.calculate(&prior.statistics, &current)
    };
    contest.info.fields = merge_fields(&contest.info.fields, &discovered);

    let changed: HashSet<&str> = diff
        .created
        .iter()
        .chain(diff.updated.iter())
        .map(String::as_str)
        .collect();
    let statistics: Vec<StatisticsUpsert> = current
        .into_iter()
        .filter(|(key, _)| changed.contains(key.as_str()))
        .map(|(account_key, statistics)| StatisticsUpsert {
            account_key,
            statistics,
        })
        .collect();
    let deleted: HashSet<&str> = diff.deleted.iter().map(String::as_str).collect();
    let deleted_statistics = prior
        .statistics
        .iter()
        .filter(|(key, _)| deleted.contains(key.as_str()))
        .map(|(_, stat)| stat.id)
        .collect();

    // Only accounts a statistics row needs or whose fields moved
    let needed: HashSet<&str> = statistics.iter().map(|s| s.account_key.as_str()).collect();
    let accounts: Vec<Account> = working
        .into_iter()
        .filter(|(key, account)| {
            !account.is_saved()
                || needed.contains(key.as_str())
                || prior.accounts.get(key) != Some(account)
        })
        .map(|(_, account)| account)
        .collect();
    let new_accounts = accounts.iter().filter(|a| !a.is_saved()).count();

    Reconciliation::Merge(Box::new(MergePlan {
        changes: ContestChangeSet {
            contest,
            problems,
            stale_problems,
            accounts,
            statistics,
            deleted_statistics,
        },
        diff,
        new_accounts,
        skipped_rows,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;
    use crate::storage::local::tests::seeded;
    use serde_json::json;

    fn document(value: Value) -> StandingsDocument {
        serde_json::from_value(value).unwrap()
    }

    fn merge(reconciliation: Reconciliation) -> MergePlan {
        match reconciliation {
            Reconciliation::Merge(plan) => *plan,
            Reconciliation::Delete => panic!("unexpected delete"),
        }
    }

    async fn apply(
        store: &LocalStore,
        resource: &Resource,
        contest_id: u64,
        doc: &StandingsDocument,
        options: &ReconcileOptions,
    ) -> MergePlan {
        let contest = store.contest(contest_id).await.unwrap().unwrap();
        let mut prior = PriorState::load(store, &contest).await.unwrap();
        prior
            .load_document_accounts(store, &contest, doc)
            .await
            .unwrap();
        let plan = merge(reconcile(resource, &contest, doc, &prior, options));
        store.commit_contest(plan.changes.clone()).await.unwrap();
        plan
    }

    fn ingest_document() -> StandingsDocument {
        document(json!({
            "result": {"alice": {"place": "1", "solving": 3, "problems": {"A": {"result": "+"}}}},
            "problems": [{"short": "A", "name": "Problem A"}]
        }))
    }

    #[tokio::test]
    async fn test_new_contest_ingest() {
        let store = LocalStore::in_memory();
        let (resource, contest) = seeded(&store).await;
        let plan = apply(&store, &resource, contest.id, &ingest_document(), &Default::default()).await;
        assert_eq!(plan.diff.created, ["alice"]);
        assert_eq!(plan.new_accounts, 1);

        let problems = store.problems_of_contest(contest.id).await.unwrap();
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].key, "A");
        assert_eq!(problems[0].n_teams, 1);
        assert_eq!(problems[0].n_accepted, 1);

        let accounts = store.accounts_of(resource.id).await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].key, "alice");

        let stats = store.statistics_of_contest(contest.id).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].place_as_int, Some(1));
        assert_eq!(stats[0].solving, 3.0);
        assert_eq!(
            Value::Object(stats[0].addition.clone()),
            json!({"problems": {"A": {"result": "+"}}})
        );
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let store = LocalStore::in_memory();
        let (resource, contest) = seeded(&store).await;
        let doc = document(json!({
            "result": {
                "alice": {"place": "1", "solving": 2, "penalty": 30, "new_rating": 1600,
                          "old_rating": 1500, "problems": {"A": "+", "B": "+"}},
                "bob": {"place": "2", "solving": 1, "penalty": 10, "problems": {"A": "-1", "B": "+"}}
            },
            "problems": [{"short": "A"}, {"short": "B"}]
        }));
        apply(&store, &resource, contest.id, &doc, &Default::default()).await;
        let first = store.snapshot().await;

        let plan = apply(&store, &resource, contest.id, &doc, &Default::default()).await;
        assert!(!plan.diff.has_changes());
        assert!(plan.changes.statistics.is_empty());
        assert!(plan.changes.problems.is_empty());
        assert!(plan.changes.accounts.is_empty());

        let second = store.snapshot().await;
        assert_eq!(first.statistics, second.statistics);
        assert_eq!(first.problems, second.problems);
        assert_eq!(first.accounts, second.accounts);
    }

    #[tokio::test]
    async fn test_departed_participants_are_deleted() {
        let store = LocalStore::in_memory();
        let (resource, contest) = seeded(&store).await;
        let doc = document(json!({"result": {
            "alice": {"place": "1", "solving": 1},
            "bob": {"place": "2", "solving": 1},
            "carol": {"place": "3", "solving": 0}
        }}));
        apply(&store, &resource, contest.id, &doc, &Default::default()).await;

        let doc = document(json!({"result": {
            "alice": {"place": "1", "solving": 2},
            "dave": {"place": "2", "solving": 1}
        }}));
        let plan = apply(&store, &resource, contest.id, &doc, &Default::default()).await;
        assert_eq!(plan.diff.deleted, ["bob", "carol"]);

        let stats = store.statistics_of_contest(contest.id).await.unwrap();
        let ids: HashSet<u64> = stats.iter().map(|s| s.account_id).collect();
        let keys: HashSet<String> = store
            .accounts_by_ids(&ids.into_iter().collect::<Vec<_>>())
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.key)
            .collect();
        assert_eq!(keys, HashSet::from(["alice".to_string(), "dave".to_string()]));
        // Accounts outlive their statistics
        assert_eq!(store.accounts_of(resource.id).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_partial_users_refresh_keeps_others() {
        let store = LocalStore::in_memory();
        let (resource, contest) = seeded(&store).await;
        let doc = document(json!({"result": {
            "alice": {"place": "1", "solving": 1},
            "bob": {"place": "2", "solving": 1}
        }}));
        apply(&store, &resource, contest.id, &doc, &Default::default()).await;

        let options = ReconcileOptions {
            users: Some(vec!["alice".into()]),
            ..Default::default()
        };
        let doc = document(json!({"result": {"alice": {"place": "1", "solving": 4}}}));
        let plan = apply(&store, &resource, contest.id, &doc, &options).await;
        assert!(plan.diff.deleted.is_empty());
        assert_eq!(store.statistics_of_contest(contest.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_field_order_puts_rating_triplet_last() {
        let store = LocalStore::in_memory();
        let (resource, contest) = seeded(&store).await;
        let doc = document(json!({"result": {
            "alice": {"place": "1", "New Rating": 1600, "rating_change": 100,
                      "oldRating": 1500, "Penalty": 20, "penalty_time": 5}
        }}));
        apply(&store, &resource, contest.id, &doc, &Default::default()).await;
        let saved = store.contest(contest.id).await.unwrap().unwrap();
        assert_eq!(
            saved.info.fields,
            ["penalty", "penalty_time", "old_rating", "rating_change", "new_rating"]
        );
    }

    #[tokio::test]
    async fn test_team_counted_once_per_problem() {
        let store = LocalStore::in_memory();
        let (resource, contest) = seeded(&store).await;
        let doc = document(json!({
            "result": {
                "t1": {"place": "1", "team_id": "5", "members": ["x", "y"], "problems": {"A": "+"}},
                "t1-copy": {"place": "1", "team_id": "5", "members": ["x", "y"], "problems": {"A": "+"}}
            },
            "problems": [{"short": "A"}]
        }));
        apply(&store, &resource, contest.id, &doc, &Default::default()).await;
        let problems = store.problems_of_contest(contest.id).await.unwrap();
        assert_eq!(problems[0].n_teams, 1);
        assert_eq!(problems[0].n_accepted, 1);
    }

    #[tokio::test]
    async fn test_split_team_rows() {
        let store = LocalStore::in_memory();
        let (mut resource, contest) = seeded(&store).await;
        resource.options.insert("split_team".into(), json!(true));
        let doc = document(json!({"result": {
            "team-7": {"place": "1", "name": "Seven", "team_id": "7", "solving": 2,
                       "members": [{"account": "x", "name": "Xavier"}, "y"]}
        }}));
        apply(&store, &resource, contest.id, &doc, &Default::default()).await;

        let stats = store.statistics_of_contest(contest.id).await.unwrap();
        assert_eq!(stats.len(), 2);
        for stat in &stats {
            assert_eq!(stat.addition["team_id"], json!("7"));
            assert_eq!(stat.addition["name"], json!("Seven"));
        }
        let accounts = store.accounts_of(resource.id).await.unwrap();
        let mut keys: Vec<&str> = accounts.iter().map(|a| a.key.as_str()).collect();
        keys.sort();
        assert_eq!(keys, ["x", "y"]);
        let x = accounts.iter().find(|a| a.key == "x").unwrap();
        assert_eq!(x.name.as_deref(), Some("Xavier"));
    }

    #[tokio::test]
    async fn test_unsplit_team_records_members() {
        let store = LocalStore::in_memory();
        let (resource, contest) = seeded(&store).await;
        let doc = document(json!({"result": {
            "team-7": {"place": "1", "members": ["x", {"account": "y", "name": "Yan"}]}
        }}));
        apply(&store, &resource, contest.id, &doc, &Default::default()).await;
        let stats = store.statistics_of_contest(contest.id).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(
            stats[0].addition["_members"],
            json!(["x", {"account": "y", "name": "Yan"}])
        );
        let saved = store.contest(contest.id).await.unwrap().unwrap();
        assert!(!saved.info.fields.contains(&"_members".to_string()));
    }

    #[tokio::test]
    async fn test_stale_problems_removed() {
        let store = LocalStore::in_memory();
        let (resource, contest) = seeded(&store).await;
        let doc = document(json!({"problems": [{"short": "A"}, {"short": "B"}]}));
        apply(&store, &resource, contest.id, &doc, &Default::default()).await;
        let doc = document(json!({"problems": [{"short": "B"}, {"short": "C"}]}));
        let plan = apply(&store, &resource, contest.id, &doc, &Default::default()).await;
        assert_eq!(plan.changes.stale_problems.len(), 1);

        let keys: Vec<String> = store
            .problems_of_contest(contest.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.key)
            .collect();
        assert_eq!(keys, ["B", "C"]);
    }

    #[tokio::test]
    async fn test_division_problems_counted_per_division() {
        let store = LocalStore::in_memory();
        let (resource, contest) = seeded(&store).await;
        let doc = document(json!({
            "result": {
                "a": {"division": "div1", "problems": {"A": "+"}},
                "b": {"division": "div2", "problems": {"A": "+"}}
            },
            "problems": {"division": {
                "div1": [{"short": "A", "code": "hard"}],
                "div2": [{"short": "A", "code": "easy"}]
            }}
        }));
        apply(&store, &resource, contest.id, &doc, &Default::default()).await;
        let problems = store.problems_of_contest(contest.id).await.unwrap();
        assert_eq!(problems.len(), 2);
        for problem in problems {
            assert_eq!(problem.n_accepted, 1, "{}", problem.key);
        }
    }

    #[tokio::test]
    async fn test_hidden_results_flag() {
        let store = LocalStore::in_memory();
        let (resource, contest) = seeded(&store).await;
        let doc = document(json!({
            "result": {"alice": {"problems": {"A": {"result": "?2"}}}},
            "problems": [{"short": "A"}]
        }));
        apply(&store, &resource, contest.id, &doc, &Default::default()).await;
        let saved = store.contest(contest.id).await.unwrap().unwrap();
        assert!(saved.has_hidden_results);
        let problems = store.problems_of_contest(contest.id).await.unwrap();
        assert_eq!(problems[0].n_hidden, 1);
    }

    #[tokio::test]
    async fn test_metadata_and_url_action() {
        let store = LocalStore::in_memory();
        let (resource, contest) = seeded(&store).await;
        let doc = document(json!({
            "action": ["url", "https://judge.example/moved"],
            "title": "Round One",
            "duration_in_secs": 7200,
            "writers": ["setter"],
            "options": {"medals": [{"name": "gold", "count": 1}]}
        }));
        apply(&store, &resource, contest.id, &doc, &Default::default()).await;
        let saved = store.contest(contest.id).await.unwrap().unwrap();
        assert_eq!(saved.url, "https://judge.example/moved");
        assert_eq!(saved.title, "Round One");
        assert_eq!(saved.end_time, saved.start_time + chrono::TimeDelta::hours(2));
        assert!(saved.info.standings.contains_key("medals"));
        let writer = store
            .accounts_by_keys(resource.id, &["setter".to_string()])
            .await
            .unwrap();
        assert_eq!(writer[0].n_writers, 1);
    }

    #[tokio::test]
    async fn test_delete_action() {
        let store = LocalStore::in_memory();
        let (resource, contest) = seeded(&store).await;
        let doc = document(json!({"action": "delete"}));
        let prior = PriorState::default();
        assert!(matches!(
            reconcile(&resource, &contest, &doc, &prior, &Default::default()),
            Reconciliation::Delete
        ));
    }

    #[tokio::test]
    async fn test_no_stats_leaves_statistics() {
        let store = LocalStore::in_memory();
        let (resource, contest) = seeded(&store).await;
        apply(&store, &resource, contest.id, &ingest_document(), &Default::default()).await;

        let options = ReconcileOptions {
            no_stats: true,
            ..Default::default()
        };
        let doc = document(json!({"result": {}, "problems": [{"short": "A"}], "title": "Renamed"}));
        let plan = apply(&store, &resource, contest.id, &doc, &options).await;
        assert!(plan.changes.deleted_statistics.is_empty());
        assert_eq!(store.statistics_of_contest(contest.id).await.unwrap().len(), 1);
        assert_eq!(store.contest(contest.id).await.unwrap().unwrap().title, "Renamed");
    }

    #[tokio::test]
    async fn test_account_backfill_and_rating_activity() {
        let store = LocalStore::in_memory();
        let (mut resource, contest) = seeded(&store).await;
        resource.major_kind = Some("rated".into());
        let doc = document(json!({"result": {
            "alice": {"name": "Alice", "country": "NL", "old_rating": 1500, "new_rating": 1550}
        }}));
        apply(&store, &resource, contest.id, &doc, &Default::default()).await;
        let alice = &store.accounts_of(resource.id).await.unwrap()[0];
        assert_eq!(alice.name.as_deref(), Some("Alice"));
        assert_eq!(alice.country.as_deref(), Some("NL"));
        assert_eq!(alice.last_activity, Some(contest.start_time));
        // Unrated kind leaves rating state alone
        assert_eq!(alice.last_rating_activity, None);
        assert_eq!(alice.rating, None);

        let mut rated = contest.clone();
        rated.kind = Some("rated".into());
        store.save_contest(rated).await.unwrap();
        apply(&store, &resource, contest.id, &doc, &Default::default()).await;
        let alice = &store.accounts_of(resource.id).await.unwrap()[0];
        assert_eq!(alice.last_rating_activity, Some(contest.start_time));
        assert_eq!(alice.rating, Some(1550.0));
    }

    #[tokio::test]
    async fn test_accounts_not_created_when_disabled() {
        let store = LocalStore::in_memory();
        let (mut resource, contest) = seeded(&store).await;
        resource.accounts_auto_create = false;
        let plan = apply(&store, &resource, contest.id, &ingest_document(), &Default::default()).await;
        assert_eq!(plan.skipped_rows, 1);
        assert!(store.statistics_of_contest(contest.id).await.unwrap().is_empty());
    }
}
