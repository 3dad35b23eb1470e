// src/services/users.rs

//! Parallel account profile fetching.
//!
//! Profiles are fetched by a bounded pool sharing one token-bucket rate
//! limiter. A failure budget ("balance") is halved on every failed fetch
//! and grows back on success; concurrency shrinks with it, and the batch is
//! aborted once the balance reaches zero.

use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::sync::Semaphore;

use crate::error::{AppError, Result};
use crate::models::{Account, Resource, UsersConfig};
use crate::services::plugin::{StandingsPlugin, UserInfo};

type GenericRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug)]
struct Balance {
    budget: usize,
    max_budget: usize,
    permits: usize,
    workers: usize,
}

impl Balance {
    fn target(&self) -> usize {
        self.workers.min(self.budget).max(1)
    }
}

/// Fetches account profiles for one resource.
pub struct UsersInfosRunner {
    workers: usize,
    initial_balance: usize,
    limiter: Arc<GenericRateLimiter>,
}

impl UsersInfosRunner {
    pub fn new(config: &UsersConfig) -> Self {
        let burst = NonZeroU32::new(config.rate_limit).unwrap_or(NonZeroU32::MIN);
        let period = Duration::from_secs(config.rate_period_secs.max(1)) / burst.get();
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);
        Self {
            workers: config.workers.max(1),
            initial_balance: config.balance.max(1),
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Fetch profiles of `accounts`, one result per account in input order.
    ///
    /// A failed fetch yields [`UserInfo::Skip`] for that account. Fails with
    /// `BatchAborted` when the balance runs out, or with the plugin's error
    /// when it is fatal for the resource.
    pub async fn fetch(
        &self,
        plugin: &dyn StandingsPlugin,
        resource: &Resource,
        accounts: Vec<Account>,
    ) -> Result<Vec<(Account, UserInfo)>> {
        let semaphore = Semaphore::new(self.workers);
        let balance = Mutex::new(Balance {
            budget: self.initial_balance,
            max_budget: self.initial_balance,
            permits: self.workers,
            workers: self.workers,
        });
        let semaphore = &semaphore;
        let balance = &balance;

        let results: Vec<Result<(Account, UserInfo)>> = stream::iter(accounts)
            .map(|account| async move {
                let permit = semaphore.acquire().await.map_err(|_| {
                    AppError::BatchAborted(format!("{}: users infos stopped", resource.host))
                })?;
                self.limiter.until_ready().await;

                match plugin.get_user_info(resource, &account).await {
                    Ok(info) => {
                        let mut state = balance.lock().unwrap_or_else(|e| e.into_inner());
                        state.budget = (state.budget + 1).min(state.max_budget);
                        if state.permits < state.target() {
                            state.permits += 1;
                            semaphore.add_permits(1);
                        }
                        Ok((account, info))
                    }
                    Err(e) if e.is_fatal_for_resource() => {
                        semaphore.close();
                        Err(e)
                    }
                    Err(e) => {
                        let mut state = balance.lock().unwrap_or_else(|e| e.into_inner());
                        state.budget /= 2;
                        log::warn!(
                            "{}: account {} info failed: {} (balance {})",
                            resource.host,
                            account.key,
                            e,
                            state.budget
                        );
                        if state.budget == 0 {
                            semaphore.close();
                            return Err(AppError::BatchAborted(format!(
                                "{}: too many failed account fetches",
                                resource.host
                            )));
                        }
                        if state.permits > state.target() {
                            state.permits -= 1;
                            permit.forget();
                        }
                        Ok((account, UserInfo::Skip))
                    }
                }
            })
            .buffered(self.workers)
            .collect()
            .await;

        results.into_iter().collect()
    }
}
