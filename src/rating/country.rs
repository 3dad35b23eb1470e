// src/rating/country.rs

//! Country aggregates of a resource.

use std::collections::{BTreeMap, HashMap};

use crate::error::{AppError, Result};
use crate::models::document::get_str;
use crate::models::{AccountId, CountryAccount, RatingConfig, ResourceId};
use crate::rating::{Bisection, RatingCache, get_weighted_rating};
use crate::storage::EntityStore;

/// Rating at which the expected number of members beating it is one half.
///
/// Adding members never lowers the result, so both top strength and depth count.
pub fn country_rating(ratings: &[f64], range: &Bisection) -> Option<f64> {
    if ratings.is_empty() {
        return None;
    }
    let opponents: Vec<(f64, f64)> = ratings.iter().map(|r| (1.0, *r)).collect();
    let mut cache = RatingCache::new();
    Some(get_weighted_rating(&opponents, 0.5, range, &mut cache).round())
}

/// Recompute every country aggregate of a resource. Returns the number of countries.
pub async fn run_country_rating(
    store: &dyn EntityStore,
    config: &RatingConfig,
    resource_id: ResourceId,
) -> Result<usize> {
    let resource = store
        .resource(resource_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("resource {resource_id}")))?;

    let mut countries: BTreeMap<String, CountryAccount> = BTreeMap::new();
    let mut ratings: HashMap<String, Vec<f64>> = HashMap::new();
    let mut country_of: HashMap<AccountId, String> = HashMap::new();
    for account in store.accounts_of(resource_id).await? {
        let Some(country) = account.country.as_deref().map(str::trim) else {
            continue;
        };
        if country.is_empty() {
            continue;
        }
        let row = countries
            .entry(country.to_string())
            .or_insert_with(|| CountryAccount {
                resource_id,
                country: country.to_string(),
                n_accounts: 0,
                rating: None,
                n_gold: 0,
                n_silver: 0,
                n_bronze: 0,
            });
        row.n_accounts += 1;
        if let Some(rating) = account.rating {
            ratings.entry(country.to_string()).or_default().push(rating);
        }
        country_of.insert(account.id, country.to_string());
    }

    for contest in store.contests_of(resource_id).await? {
        for stat in store.statistics_of_contest(contest.id).await? {
            let Some(row) = country_of
                .get(&stat.account_id)
                .and_then(|country| countries.get_mut(country))
            else {
                continue;
            };
            match get_str(&stat.addition, "medal").map(str::to_ascii_lowercase).as_deref() {
                Some("gold") => row.n_gold += 1,
                Some("silver") => row.n_silver += 1,
                Some("bronze") => row.n_bronze += 1,
                _ => {}
            }
        }
    }

    let range = Bisection::from(config);
    for (country, row) in countries.iter_mut() {
        if let Some(members) = ratings.get(country) {
            row.rating = country_rating(members, &range);
        }
    }

    let rows: Vec<CountryAccount> = countries.into_values().collect();
    let count = rows.len();
    log::info!("{}: {} countries rated", resource.host, count);
    store.replace_country_accounts(resource_id, rows).await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Account, Statistics};
    use crate::storage::local::tests::seeded;
    use crate::storage::{ContestChangeSet, LocalStore, StatisticsUpsert};
    use serde_json::json;

    #[test]
    fn test_depth_raises_rating() {
        let range = Bisection::from(&RatingConfig::default());
        let single = country_rating(&[2000.0], &range).unwrap();
        let pair = country_rating(&[2000.0, 2000.0], &range).unwrap();
        assert!((single - 2000.0).abs() <= 1.0);
        assert!(pair > single);
        assert_eq!(country_rating(&[], &range), None);
    }

    #[tokio::test]
    async fn test_country_rows_replace_previous() {
        let store = LocalStore::in_memory();
        let (resource, round) = seeded(&store).await;

        let mut changes = ContestChangeSet::contest_only(round);
        let members = [
            ("alice", Some("NL"), Some(2100.0), Some("Gold")),
            ("bob", Some("NL"), Some(1800.0), None),
            ("carol", Some("PL"), None, Some("bronze")),
            ("dave", None, Some(1500.0), Some("silver")),
        ];
        for (key, country, rating, medal) in members {
            let mut account = Account::new(resource.id, key);
            account.country = country.map(str::to_string);
            account.rating = rating;
            changes.accounts.push(account);
            let mut addition = serde_json::Map::new();
            if let Some(medal) = medal {
                addition.insert("medal".into(), json!(medal));
            }
            changes.statistics.push(StatisticsUpsert {
                account_key: key.into(),
                statistics: Statistics {
                    id: 0,
                    account_id: 0,
                    contest_id: 0,
                    place: None,
                    place_as_int: None,
                    solving: 0.0,
                    upsolving: None,
                    addition,
                },
            });
        }
        store.commit_contest(changes).await.unwrap();
        store
            .replace_country_accounts(
                resource.id,
                vec![CountryAccount {
                    resource_id: resource.id,
                    country: "XX".into(),
                    n_accounts: 9,
                    rating: None,
                    n_gold: 0,
                    n_silver: 0,
                    n_bronze: 0,
                }],
            )
            .await
            .unwrap();

        let count = run_country_rating(&store, &RatingConfig::default(), resource.id)
            .await
            .unwrap();
        assert_eq!(count, 2);

        let rows = store.country_accounts(resource.id).await.unwrap();
        let nl = rows.iter().find(|c| c.country == "NL").unwrap();
        assert_eq!(nl.n_accounts, 2);
        assert_eq!(nl.n_gold, 1);
        assert!(nl.rating.unwrap() > 2100.0);

        let pl = rows.iter().find(|c| c.country == "PL").unwrap();
        assert_eq!(pl.rating, None);
        assert_eq!(pl.n_medals(), 1);
        assert!(rows.iter().all(|c| c.country != "XX"));
    }

    #[tokio::test]
    async fn test_unknown_resource() {
        let store = LocalStore::in_memory();
        let err = run_country_rating(&store, &RatingConfig::default(), 7)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
