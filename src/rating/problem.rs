// src/rating/problem.rs

//! Problem ratings of a finished contest.
//!
//! Every contest sharing a problem with the target contest contributes its
//! contestants. Each contestant's performance is found by bisection against
//! their own contest and division; the problem's rating is then the rating
//! at which the contestants' expected solves match the credit they earned.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};
use crate::models::document::{Document, get_str};
use crate::models::{
    AccountId, Contest, ContestId, Problem, ProblemId, ProblemResult, RatingConfig, Resource,
    Statistics, Verdict,
};
use crate::rating::{Bisection, RatingCache, get_weighted_rating};
use crate::storage::EntityStore;

/// Result of one problem rating run.
#[derive(Debug, Clone, PartialEq)]
pub enum ProblemRatingOutcome {
    Updated { problems: usize, contestants: usize },
    /// The input hash matched the stored one
    Unchanged,
    Skipped(String),
}

#[derive(Debug)]
struct Contestant {
    contest_id: ContestId,
    contest_key: String,
    division: Option<String>,
    account_id: AccountId,
    place: i64,
    old_rating: f64,
    weight: f64,
    problems: Document,
    rating: f64,
}

/// 1-based ranks for sorted places; a tie block shares its midpoint rank.
pub fn midpoint_ranks(places: &[i64]) -> Vec<f64> {
    let mut ranks = Vec::with_capacity(places.len());
    let mut start = 0;
    while start < places.len() {
        let mut end = start + 1;
        while end < places.len() && places[end] == places[start] {
            end += 1;
        }
        let rank = (start + 1) as f64 + (end - start - 1) as f64 / 2.0;
        ranks.extend(std::iter::repeat_n(rank, end - start));
        start = end;
    }
    ranks
}

/// Credit earned on one problem cell.
fn credit(cell: Option<&serde_json::Value>, full_score: Option<f64>, multiplier: f64) -> f64 {
    let Some(cell) = cell else {
        return 0.0;
    };
    match ProblemResult::from_value(cell).verdict(full_score) {
        Verdict::Accepted => 1.0,
        Verdict::Partial(score) => match full_score {
            Some(full) if full > 0.0 => (score / full).clamp(0.0, 1.0) * multiplier,
            _ => multiplier,
        },
        Verdict::Empty | Verdict::Hidden | Verdict::Failed => 0.0,
    }
}

/// Latest same-kind rating before `contest`, and the number of earlier contests.
async fn rating_history(
    store: &dyn EntityStore,
    contests: &mut HashMap<ContestId, Option<Contest>>,
    account_id: AccountId,
    contest: &Contest,
) -> Result<(Option<f64>, usize)> {
    let mut latest = None;
    let mut count = 0;
    for stat in store.statistics_of_account(account_id).await? {
        if stat.contest_id == contest.id {
            continue;
        }
        if !contests.contains_key(&stat.contest_id) {
            let loaded = store.contest(stat.contest_id).await?;
            contests.insert(stat.contest_id, loaded);
        }
        let Some(Some(other)) = contests.get(&stat.contest_id) else {
            continue;
        };
        if other.start_time >= contest.start_time {
            continue;
        }
        count += 1;
        if other.kind != contest.kind {
            continue;
        }
        if let Some(rating) = stat.new_rating() {
            if latest.is_none_or(|(at, _)| other.start_time > at) {
                latest = Some((other.start_time, rating));
            }
        }
    }
    Ok((latest.map(|(_, rating)| rating), count))
}

struct Gatherer<'a> {
    store: &'a dyn EntityStore,
    resource: &'a Resource,
    config: &'a RatingConfig,
    contests: HashMap<ContestId, Option<Contest>>,
}

impl Gatherer<'_> {
    async fn contestant(
        &mut self,
        contest: &Contest,
        stat: Statistics,
    ) -> Result<Option<Contestant>> {
        // Unsplit team rows cannot be attributed to a single rating
        if stat.addition.contains_key("_members") {
            return Ok(None);
        }
        let Some(place) = stat.place_as_int else {
            return Ok(None);
        };
        let policy = &self.resource.problem_rating;

        let own = stat.old_rating();
        let (previous, count) = if own.is_none() || !policy.adjustment.is_empty() {
            rating_history(self.store, &mut self.contests, stat.account_id, contest).await?
        } else {
            (None, 0)
        };
        let old_rating = match own.or(previous) {
            Some(rating) => rating,
            None if policy.require_old_rating => return Ok(None),
            None => policy.initial_rating,
        };
        let old_rating = old_rating + policy.adjustment.get(count).copied().unwrap_or(0.0);

        let weight = if stat.has_rating_change() {
            1.0
        } else {
            self.config.unrated_weight
        };
        Ok(Some(Contestant {
            contest_id: contest.id,
            contest_key: contest.key.clone(),
            division: get_str(&stat.addition, "division").map(str::to_string),
            account_id: stat.account_id,
            place,
            old_rating,
            weight,
            problems: stat.problems().cloned().unwrap_or_default(),
            rating: old_rating,
        }))
    }
}

/// Performance of every contestant against their contest and division.
fn rate_contestants(contestants: &mut [Contestant], range: &Bisection) {
    let mut groups: BTreeMap<(ContestId, Option<String>), Vec<usize>> = BTreeMap::new();
    for (index, contestant) in contestants.iter().enumerate() {
        groups
            .entry((contestant.contest_id, contestant.division.clone()))
            .or_default()
            .push(index);
    }

    for members in groups.into_values() {
        let mut members = members;
        members.sort_by_key(|&index| contestants[index].place);
        let places: Vec<i64> = members.iter().map(|&i| contestants[i].place).collect();
        let opponents: Vec<(f64, f64)> = members
            .iter()
            .map(|&i| (1.0, contestants[i].old_rating))
            .collect();
        let mut cache = RatingCache::new();
        for (&index, rank) in members.iter().zip(midpoint_ranks(&places)) {
            let performance = get_weighted_rating(&opponents, rank - 0.5, range, &mut cache);
            let contestant = &mut contestants[index];
            contestant.rating = (performance + contestant.old_rating) / 2.0;
        }
    }
}

/// Hash of who attempted which problem, and whether it was credited.
fn input_hash(problems: &[Problem], contestants: &[Contestant], credits: &[Vec<Option<f64>>]) -> String {
    let mut lines: Vec<String> = contestants
        .iter()
        .enumerate()
        .map(|(index, contestant)| {
            let flags: String = credits
                .iter()
                .map(|row| match row[index] {
                    None => '-',
                    Some(credit) if credit > 0.0 => '1',
                    Some(_) => '0',
                })
                .collect();
            format!("{}\t{}\t{}", contestant.contest_key, contestant.account_id, flags)
        })
        .collect();
    lines.sort();

    let mut hasher = Sha256::new();
    for problem in problems {
        hasher.update(problem.key.as_bytes());
        hasher.update(b"\n");
    }
    for line in lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Recompute and store the problem ratings of `contest_id`.
pub async fn run_problem_rating(
    store: &dyn EntityStore,
    config: &RatingConfig,
    contest_id: ContestId,
    force: bool,
) -> Result<ProblemRatingOutcome> {
    let contest = store
        .contest(contest_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("contest {contest_id}")))?;
    let resource = store
        .resource(contest.resource_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("resource {}", contest.resource_id)))?;
    if !resource.has_problem_rating {
        return Ok(ProblemRatingOutcome::Skipped(format!(
            "{}: problem rating disabled",
            resource.host
        )));
    }
    if !contest.is_ended(Utc::now()) {
        return Ok(ProblemRatingOutcome::Skipped(format!(
            "{}: contest is not over",
            contest.identity()
        )));
    }
    let mut problems = store.problems_of_contest(contest.id).await?;
    if problems.is_empty() {
        return Ok(ProblemRatingOutcome::Skipped(format!(
            "{}: no problems",
            contest.identity()
        )));
    }
    problems.sort_by_key(|p| p.index);

    let mut related: Vec<ContestId> = problems
        .iter()
        .flat_map(|p| p.contest_ids.iter().copied())
        .chain([contest.id])
        .collect();
    related.sort_unstable();
    related.dedup();

    let mut gatherer = Gatherer {
        store,
        resource: &resource,
        config,
        contests: HashMap::new(),
    };
    let mut shorts: HashMap<(ContestId, ProblemId), String> = HashMap::new();
    let mut contestants = Vec::new();
    for id in related {
        let other = if id == contest.id {
            Some(contest.clone())
        } else {
            store.contest(id).await?
        };
        let Some(other) = other else {
            continue;
        };
        for problem in store.problems_of_contest(id).await? {
            let short = problem.short.clone().unwrap_or_else(|| problem.key.clone());
            shorts.insert((id, problem.id), short);
        }
        for stat in store.statistics_of_contest(id).await? {
            if let Some(contestant) = gatherer.contestant(&other, stat).await? {
                contestants.push(contestant);
            }
        }
    }
    if contestants.is_empty() {
        return Ok(ProblemRatingOutcome::Skipped(format!(
            "{}: no rated contestants",
            contest.identity()
        )));
    }

    let credits: Vec<Vec<Option<f64>>> = problems
        .iter()
        .map(|problem| {
            contestants
                .iter()
                .map(|c| {
                    if !problem.is_linked_to(c.contest_id) {
                        return None;
                    }
                    if let Some(division) = &c.division {
                        if !problem.divisions.is_empty() && !problem.divisions.contains(division) {
                            return None;
                        }
                    }
                    let short = shorts.get(&(c.contest_id, problem.id))?;
                    Some(credit(
                        c.problems.get(short),
                        problem.full_score,
                        config.partial_multiplier,
                    ))
                })
                .collect()
        })
        .collect();

    let hash = input_hash(&problems, &contestants, &credits);
    if !force && contest.info.problem_rating_hash.as_deref() == Some(hash.as_str()) {
        log::debug!("{}: problem ratings up to date", contest.identity());
        return Ok(ProblemRatingOutcome::Unchanged);
    }

    let range = Bisection::from(config);
    rate_contestants(&mut contestants, &range);

    // Problems with the same solver set share expected scores
    let mut caches: HashMap<Vec<usize>, RatingCache> = HashMap::new();
    let mut ratings = Vec::with_capacity(problems.len());
    for (problem, row) in problems.iter().zip(&credits) {
        let participants: Vec<usize> = (0..contestants.len())
            .filter(|&i| row[i].is_some())
            .collect();
        if participants.is_empty() {
            ratings.push((problem.id, None));
            continue;
        }
        let opponents: Vec<(f64, f64)> = participants
            .iter()
            .map(|&i| (contestants[i].weight, contestants[i].rating))
            .collect();
        let target: f64 = participants
            .iter()
            .map(|&i| contestants[i].weight * row[i].unwrap_or(0.0))
            .sum();
        let cache = caches.entry(participants).or_default();
        let rating = get_weighted_rating(&opponents, target, &range, cache);
        ratings.push((problem.id, Some(rating.round())));
    }

    let rated = ratings.iter().filter(|(_, r)| r.is_some()).count();
    log::info!(
        "{}: rated {} problems from {} contestants",
        contest.identity(),
        rated,
        contestants.len()
    );
    store.update_problem_ratings(contest.id, ratings, hash).await?;
    Ok(ProblemRatingOutcome::Updated {
        problems: rated,
        contestants: contestants.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Account, ProblemDescriptor};
    use crate::storage::local::tests::{contest, seeded};
    use crate::storage::{ContestChangeSet, LocalStore, StatisticsUpsert};
    use chrono::TimeDelta;
    use serde_json::json;

    fn stat(place: i64, addition: serde_json::Value) -> Statistics {
        Statistics {
            id: 0,
            account_id: 0,
            contest_id: 0,
            place: Some(place.to_string()),
            place_as_int: Some(place),
            solving: 0.0,
            upsolving: None,
            addition: addition.as_object().cloned().unwrap_or_default(),
        }
    }

    fn descriptor(short: &str) -> ProblemDescriptor {
        serde_json::from_value(json!({"short": short})).unwrap()
    }

    /// Four rated contestants; everyone but the last solves A, only the winner solves B.
    async fn rated_round(store: &LocalStore) -> Contest {
        let (mut resource, round) = seeded(store).await;
        resource.has_problem_rating = true;
        store.upsert_resource(resource.clone()).await.unwrap();

        let mut changes = ContestChangeSet::contest_only(round.clone());
        for (index, short) in ["A", "B"].iter().enumerate() {
            changes.problems.push(Problem::from_descriptor(
                resource.id,
                round.id,
                index,
                &descriptor(short),
            ));
        }
        let rows = [
            ("alice", 1, 2000, json!({"A": {"result": "+"}, "B": {"result": "+"}})),
            ("bob", 2, 1700, json!({"A": {"result": "+"}, "B": {"result": "-1"}})),
            ("carol", 3, 1500, json!({"A": {"result": "+2"}})),
            ("dave", 4, 1300, json!({"A": {"result": "-3"}})),
        ];
        for (key, place, rating, problems) in rows {
            changes.accounts.push(Account::new(resource.id, key));
            changes.statistics.push(StatisticsUpsert {
                account_key: key.into(),
                statistics: stat(
                    place,
                    json!({"old_rating": rating, "new_rating": rating, "problems": problems}),
                ),
            });
        }
        store.commit_contest(changes).await.unwrap();
        round
    }

    async fn ratings(store: &LocalStore, contest_id: ContestId) -> HashMap<String, Option<f64>> {
        store
            .problems_of_contest(contest_id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| (p.key, p.rating))
            .collect()
    }

    #[test]
    fn test_midpoint_ranks() {
        assert_eq!(midpoint_ranks(&[1, 2, 2, 4]), [1.0, 2.5, 2.5, 4.0]);
        assert_eq!(midpoint_ranks(&[1, 1, 1]), [2.0, 2.0, 2.0]);
        assert!(midpoint_ranks(&[]).is_empty());
    }

    #[test]
    fn test_partial_credit() {
        let cell = json!({"result": "40", "partial": true});
        assert_eq!(credit(Some(&cell), Some(100.0), 0.25), 0.1);
        assert_eq!(credit(Some(&json!({"result": "+"})), None, 0.25), 1.0);
        assert_eq!(credit(Some(&json!({"result": "-2"})), None, 0.25), 0.0);
        assert_eq!(credit(None, None, 0.25), 0.0);
    }

    #[tokio::test]
    async fn test_harder_problem_rates_higher() {
        let store = LocalStore::in_memory();
        let round = rated_round(&store).await;
        let config = RatingConfig::default();

        let outcome = run_problem_rating(&store, &config, round.id, false)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ProblemRatingOutcome::Updated {
                problems: 2,
                contestants: 4
            }
        );
        let ratings = ratings(&store, round.id).await;
        let a = ratings["A"].unwrap();
        let b = ratings["B"].unwrap();
        assert!(a < b, "A={a} B={b}");

        let stored = store.contest(round.id).await.unwrap().unwrap();
        assert!(stored.info.problem_rating_hash.is_some());
    }

    #[tokio::test]
    async fn test_unchanged_input_is_skipped_unless_forced() {
        let store = LocalStore::in_memory();
        let round = rated_round(&store).await;
        let config = RatingConfig::default();

        run_problem_rating(&store, &config, round.id, false).await.unwrap();
        assert_eq!(
            run_problem_rating(&store, &config, round.id, false).await.unwrap(),
            ProblemRatingOutcome::Unchanged
        );
        assert!(matches!(
            run_problem_rating(&store, &config, round.id, true).await.unwrap(),
            ProblemRatingOutcome::Updated { .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_contest_and_disabled_resource() {
        let store = LocalStore::in_memory();
        let err = run_problem_rating(&store, &RatingConfig::default(), 42, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let (_, round) = seeded(&store).await;
        let outcome = run_problem_rating(&store, &RatingConfig::default(), round.id, false)
            .await
            .unwrap();
        assert!(matches!(outcome, ProblemRatingOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn test_require_old_rating_and_history() {
        let store = LocalStore::in_memory();
        let (mut resource, round) = seeded(&store).await;
        resource.has_problem_rating = true;
        resource.problem_rating.require_old_rating = true;
        let resource = store.upsert_resource(resource).await.unwrap();

        let earlier = store
            .save_contest(contest(
                resource.id,
                "round-0",
                round.start_time - TimeDelta::days(7),
            ))
            .await
            .unwrap();
        let mut changes = ContestChangeSet::contest_only(earlier);
        changes.accounts.push(Account::new(resource.id, "veteran"));
        changes.statistics.push(StatisticsUpsert {
            account_key: "veteran".into(),
            statistics: stat(1, json!({"new_rating": 1800})),
        });
        store.commit_contest(changes).await.unwrap();

        let mut changes = ContestChangeSet::contest_only(round.clone());
        changes.problems.push(Problem::from_descriptor(
            resource.id,
            round.id,
            0,
            &descriptor("A"),
        ));
        for (key, place) in [("veteran", 1), ("newcomer", 2)] {
            changes.accounts.push(Account::new(resource.id, key));
            changes.statistics.push(StatisticsUpsert {
                account_key: key.into(),
                statistics: stat(place, json!({"problems": {"A": {"result": "+"}}})),
            });
        }
        store.commit_contest(changes).await.unwrap();

        let outcome = run_problem_rating(&store, &RatingConfig::default(), round.id, false)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ProblemRatingOutcome::Updated {
                problems: 1,
                contestants: 1
            }
        );
    }

    #[tokio::test]
    async fn test_unsplit_team_rows_are_excluded() {
        let store = LocalStore::in_memory();
        let (mut resource, round) = seeded(&store).await;
        resource.has_problem_rating = true;
        let resource = store.upsert_resource(resource).await.unwrap();

        let mut changes = ContestChangeSet::contest_only(round.clone());
        changes.problems.push(Problem::from_descriptor(
            resource.id,
            round.id,
            0,
            &descriptor("A"),
        ));
        changes.accounts.push(Account::new(resource.id, "team"));
        changes.statistics.push(StatisticsUpsert {
            account_key: "team".into(),
            statistics: stat(1, json!({"_members": ["x", "y"], "problems": {"A": {"result": "+"}}})),
        });
        store.commit_contest(changes).await.unwrap();

        let outcome = run_problem_rating(&store, &RatingConfig::default(), round.id, false)
            .await
            .unwrap();
        assert!(matches!(outcome, ProblemRatingOutcome::Skipped(_)));
    }
}
