// src/pipeline/accounts.rs

//! Account profile refresh run.
//!
//! Accounts whose profile is missing or stale are fetched through the
//! resource's plugin by the users-infos runner. Each answer either deletes
//! the account, leaves it alone, or merges the profile and backfills
//! historical fields into the account's past statistics.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{AppError, Result};
use crate::models::document::{Document, get_f64, get_str, merge_into};
use crate::models::{Account, Config, Contest, ContestId};
use crate::pipeline::fields::RATING_TRIPLET;
use crate::pipeline::summary::AccountsSummary;
use crate::services::UsersInfosRunner;
use crate::services::plugin::{ContestAdditionUpdate, PluginRegistry, UserInfo};
use crate::storage::{AccountUpdate, EntityStore};
use crate::utils::time::secs;

/// Options of an accounts refresh.
#[derive(Debug, Clone, Default)]
pub struct AccountsOptions {
    /// Resource host
    pub resource: String,

    /// Explicit account keys; bypasses the staleness filter
    pub users: Vec<String>,

    pub limit: Option<usize>,
}

/// Accounts due for a refresh, least recently refreshed first.
pub fn select_accounts(
    accounts: Vec<Account>,
    options: &AccountsOptions,
    max_age: TimeDelta,
    now: DateTime<Utc>,
) -> Vec<Account> {
    let mut due: Vec<Account> = if options.users.is_empty() {
        accounts
            .into_iter()
            .filter(|a| a.info_updated.is_none_or(|at| at + max_age <= now))
            .collect()
    } else {
        accounts
            .into_iter()
            .filter(|a| options.users.contains(&a.key))
            .collect()
    };
    due.sort_by(|a, b| a.info_updated.cmp(&b.info_updated).then(a.key.cmp(&b.key)));
    if let Some(limit) = options.limit {
        due.truncate(limit);
    }
    due
}

/// Merge a fetched profile; name, country and rating move to typed fields.
pub fn apply_profile(account: &mut Account, mut info: Document, now: DateTime<Utc>) {
    if let Some(name) = get_str(&info, "name").map(str::trim) {
        if !name.is_empty() {
            account.name = Some(name.to_string());
        }
    }
    if let Some(country) = get_str(&info, "country").map(str::trim) {
        if !country.is_empty() {
            account.country = Some(country.to_string());
        }
    }
    if let Some(rating) = get_f64(&info, "rating") {
        account.rating = Some(rating);
    }
    for key in ["name", "country", "rating"] {
        info.remove(key);
    }
    merge_into(&mut account.info, &info);
    account.info_updated = Some(now);
}

/// Runs profile refreshes against a store.
pub struct AccountsRunner<'a> {
    store: &'a dyn EntityStore,
    registry: &'a PluginRegistry,
    config: &'a Config,
}

impl<'a> AccountsRunner<'a> {
    pub fn new(store: &'a dyn EntityStore, registry: &'a PluginRegistry, config: &'a Config) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    pub async fn run(&self, options: &AccountsOptions) -> Result<AccountsSummary> {
        self.run_at(options, Utc::now()).await
    }

    pub async fn run_at(
        &self,
        options: &AccountsOptions,
        now: DateTime<Utc>,
    ) -> Result<AccountsSummary> {
        let resource = self
            .store
            .resource_by_host(&options.resource)
            .await?
            .ok_or_else(|| AppError::not_found(format!("resource {}", options.resource)))?;
        let plugin = self.registry.for_resource(&resource)?;
        if !plugin.has_users_infos() {
            return Err(AppError::Unsupported(format!(
                "{}: plugin {} has no account infos",
                resource.host,
                plugin.name()
            )));
        }

        let accounts = self.store.accounts_of(resource.id).await?;
        let max_age = secs(self.config.users.account_info_refresh_secs);
        let accounts = select_accounts(accounts, options, max_age, now);
        let mut summary = AccountsSummary {
            total: accounts.len(),
            ..AccountsSummary::default()
        };
        if accounts.is_empty() {
            log::info!("{}: no accounts to refresh", resource.host);
            return Ok(summary);
        }
        log::info!("{}: refreshing {} accounts", resource.host, accounts.len());

        let runner = UsersInfosRunner::new(&self.config.users);
        let results = runner.fetch(plugin.as_ref(), &resource, accounts).await?;

        let mut contests: HashMap<ContestId, Option<Contest>> = HashMap::new();
        let mut updates = Vec::new();
        for (mut account, info) in results {
            match info {
                UserInfo::Delete => {
                    log::info!("{}: account {} removed upstream", resource.host, account.key);
                    if self.store.delete_account(account.id).await? {
                        summary.deleted += 1;
                    }
                }
                UserInfo::Skip => summary.skipped += 1,
                UserInfo::Info {
                    info,
                    contest_addition_update_params,
                } => {
                    apply_profile(&mut account, info, now);
                    let statistics = match contest_addition_update_params {
                        Some(params) => {
                            self.backfill_statistics(&account, &params, &mut contests)
                                .await?
                        }
                        None => Vec::new(),
                    };
                    summary.statistics_updated += statistics.len();
                    updates.push(AccountUpdate {
                        account,
                        statistics,
                    });
                }
            }
        }
        summary.updated = self.store.apply_account_updates(updates).await?;
        Ok(summary)
    }

    /// Statistics rows of `account` changed by `params`.
    async fn backfill_statistics(
        &self,
        account: &Account,
        params: &ContestAdditionUpdate,
        contests: &mut HashMap<ContestId, Option<Contest>>,
    ) -> Result<Vec<crate::models::Statistics>> {
        let mut changed = Vec::new();
        for mut stat in self.store.statistics_of_account(account.id).await? {
            if !contests.contains_key(&stat.contest_id) {
                let contest = self.store.contest(stat.contest_id).await?;
                contests.insert(stat.contest_id, contest);
            }
            let Some(Some(contest)) = contests.get(&stat.contest_id) else {
                continue;
            };
            let dirty = match params.update.get(params.by.identifier(contest)) {
                Some(fields) => merge_into(&mut stat.addition, fields),
                None if params.clear_rating_change => RATING_TRIPLET
                    .iter()
                    .fold(false, |dirty, key| stat.addition.remove(*key).is_some() || dirty),
                None => false,
            };
            if dirty {
                changed.push(stat);
            }
        }
        Ok(changed)
    }
}
