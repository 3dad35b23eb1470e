// src/pipeline/statistics.rs

//! Statistics parse run.
//!
//! For every selected resource: pick the due contests, fetch their standings
//! through the resource's plugin, reconcile, and commit one contest at a
//! time. Contests of one resource are processed concurrently up to
//! `scheduler.max_concurrent`; a failure of one contest never touches the
//! others. A resource-fatal error (proxy budget exhausted) stops that
//! resource's pass after the in-flight contests finish.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};

use crate::error::{AppError, Result};
use crate::models::{Config, Contest, Resource};
use crate::pipeline::diff::StatisticsDiff;
use crate::pipeline::jobs::{Job, JobQueue};
use crate::pipeline::reconcile::{PriorState, ReconcileOptions, Reconciliation, reconcile};
use crate::pipeline::scheduler::{
    ParsedState, Selection, next_timing_on_error, next_timing_on_success, select_candidates,
};
use crate::pipeline::summary::RunSummary;
use crate::services::plugin::{PluginRegistry, StandingsPlugin, StandingsRequest};
use crate::storage::{CommitReport, EntityStore};

/// Options of a parse run.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Resource hosts to process; empty means all
    pub resources: Vec<String>,

    pub selection: Selection,

    /// Compute and log changes without writing anything
    pub dry_run: bool,

    /// Sync contest metadata and problems only
    pub no_stats: bool,

    /// Refresh only these account keys
    pub users: Option<Vec<String>>,
}

/// Result of one contest.
#[derive(Debug)]
enum ContestOutcome {
    Parsed {
        report: CommitReport,
        skipped_rows: usize,
        jobs_submitted: usize,
    },
    DryRun {
        diff: StatisticsDiff,
        new_accounts: usize,
        skipped_rows: usize,
    },
    Deleted,
    Failed,
    Skipped,
}

/// Runs statistics parsing against a store.
pub struct StatisticsRunner<'a> {
    store: &'a dyn EntityStore,
    registry: &'a PluginRegistry,
    config: &'a Config,
    jobs: &'a dyn JobQueue,
}

impl<'a> StatisticsRunner<'a> {
    pub fn new(
        store: &'a dyn EntityStore,
        registry: &'a PluginRegistry,
        config: &'a Config,
        jobs: &'a dyn JobQueue,
    ) -> Self {
        Self {
            store,
            registry,
            config,
            jobs,
        }
    }

    /// Process every selected resource.
    pub async fn run(&self, options: &ParseOptions) -> Result<RunSummary> {
        self.run_at(options, Utc::now()).await
    }

    /// [`StatisticsRunner::run`] with an explicit clock.
    pub async fn run_at(&self, options: &ParseOptions, now: DateTime<Utc>) -> Result<RunSummary> {
        let resources = self.store.resources().await?;
        for host in &options.resources {
            if !resources.iter().any(|r| &r.host == host) {
                return Err(AppError::not_found(format!("resource {host}")));
            }
        }

        let mut summary = RunSummary::default();
        for resource in &resources {
            if !options.resources.is_empty() && !options.resources.contains(&resource.host) {
                continue;
            }
            if !resource.enabled {
                log::debug!("{}: disabled, skipping", resource.host);
                continue;
            }
            summary.merge(self.run_resource(resource, options, now).await?);
        }
        Ok(summary)
    }

    async fn run_resource(
        &self,
        resource: &Resource,
        options: &ParseOptions,
        now: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let mut selection = options.selection.clone();
        if selection.limit.is_none() {
            selection.limit = self.config.scheduler.default_limit;
        }
        let contests = self.store.contests_of(resource.id).await?;
        let contests = select_candidates(contests, resource, now, &selection);

        let mut summary = RunSummary {
            total: contests.len(),
            ..RunSummary::default()
        };
        if contests.is_empty() {
            log::debug!("{}: nothing due", resource.host);
            return Ok(summary);
        }

        let plugin = match self.registry.for_resource(resource) {
            Ok(plugin) => plugin,
            Err(e) => {
                log::error!("{}: {}", resource.host, e);
                summary.skipped = summary.total;
                summary.stopped_resources.push(resource.host.clone());
                return Ok(summary);
            }
        };
        log::info!("{}: {} contests due", resource.host, contests.len());

        let stop = AtomicBool::new(false);
        let stop = &stop;
        let plugin = plugin.as_ref();
        let mut outcomes = stream::iter(contests)
            .map(|contest| async move {
                let identity = contest.identity();
                let outcome = self
                    .parse_contest(resource, plugin, contest, options, now, stop)
                    .await;
                (identity, outcome)
            })
            .buffer_unordered(self.config.scheduler.max_concurrent.max(1));

        while let Some((identity, outcome)) = outcomes.next().await {
            match outcome {
                Ok(ContestOutcome::Parsed {
                    report,
                    skipped_rows,
                    jobs_submitted,
                }) => {
                    summary.parsed += 1;
                    summary.record_commit(&report);
                    summary.skipped_rows += skipped_rows;
                    summary.jobs_submitted += jobs_submitted;
                }
                Ok(ContestOutcome::DryRun {
                    diff,
                    new_accounts,
                    skipped_rows,
                }) => {
                    summary.parsed += 1;
                    summary.record_diff(&diff, new_accounts);
                    summary.skipped_rows += skipped_rows;
                }
                Ok(ContestOutcome::Deleted) => summary.deleted_contests += 1,
                Ok(ContestOutcome::Failed) => summary.failed += 1,
                Ok(ContestOutcome::Skipped) => summary.skipped += 1,
                Err(e) if e.is_fatal_for_resource() => {
                    log::error!("{}: {}: {}, stopping", resource.host, identity, e);
                    summary.skipped += 1;
                    if !summary.stopped_resources.contains(&resource.host) {
                        summary.stopped_resources.push(resource.host.clone());
                    }
                }
                Err(e) => {
                    log::error!("{}: {}: {}", resource.host, identity, e);
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn parse_contest(
        &self,
        resource: &Resource,
        plugin: &dyn StandingsPlugin,
        contest: Contest,
        options: &ParseOptions,
        now: DateTime<Utc>,
        stop: &AtomicBool,
    ) -> Result<ContestOutcome> {
        if stop.load(Ordering::SeqCst) {
            return Ok(ContestOutcome::Skipped);
        }
        let label = format!("{}: {}", resource.host, contest.identity());
        log::debug!("{}: parsing", label);

        let mut prior = PriorState::load(self.store, &contest).await?;
        let previous = prior.previous_results();
        let request = StandingsRequest {
            resource,
            contest: &contest,
            users: options.users.as_deref(),
            previous_results: Some(&previous),
        };
        let mut document = match plugin.get_standings(request).await {
            Ok(document) => document,
            Err(e) if e.is_fatal_for_resource() => {
                stop.store(true, Ordering::SeqCst);
                return Err(e);
            }
            Err(e) => {
                log::error!("{}: {}", label, e);
                if !options.dry_run {
                    self.record_failure(resource, contest, now).await?;
                }
                return Ok(ContestOutcome::Failed);
            }
        };
        request.filter_users(&mut document);
        prior
            .load_document_accounts(self.store, &contest, &document)
            .await?;

        let reconcile_options = ReconcileOptions {
            no_stats: options.no_stats,
            users: options.users.clone(),
        };
        let plan = match reconcile(resource, &contest, &document, &prior, &reconcile_options) {
            Reconciliation::Delete => {
                log::warn!("{}: removed upstream, deleting", label);
                if !options.dry_run {
                    self.store.delete_contest(contest.id).await?;
                }
                return Ok(ContestOutcome::Deleted);
            }
            Reconciliation::Merge(plan) => *plan,
        };

        if options.dry_run {
            log::info!(
                "{}: dry run: {} created, {} updated, {} deleted, {} unchanged, {} new accounts",
                label,
                plan.diff.created.len(),
                plan.diff.updated.len(),
                plan.diff.deleted.len(),
                plan.diff.unchanged,
                plan.new_accounts
            );
            return Ok(ContestOutcome::DryRun {
                diff: plan.diff,
                new_accounts: plan.new_accounts,
                skipped_rows: plan.skipped_rows,
            });
        }

        let mut changes = plan.changes;
        let state = ParsedState {
            has_hidden_results: changes.contest.has_hidden_results,
            timing_statistic_delta: document.timing_statistic_delta,
        };
        let next = next_timing_on_success(
            &changes.contest,
            &resource.timing,
            &self.config.scheduler,
            state,
            now,
        );
        changes.contest.statistic_timing = Some(next);
        changes.contest.parsed_time = Some(now);
        changes.contest.statistic_errors = 0;
        let ended = changes.contest.is_ended(now);

        let report = match self.store.commit_contest(changes).await {
            Ok(report) => report,
            Err(e) => {
                log::error!("{}: commit failed: {}", label, e);
                self.record_failure(resource, contest, now).await?;
                return Ok(ContestOutcome::Failed);
            }
        };
        log::info!(
            "{}: {} created, {} updated, {} deleted statistics; next at {}",
            label,
            report.created_statistics,
            report.updated_statistics,
            report.deleted_statistics,
            next.format("%Y-%m-%d %H:%M:%S")
        );

        let mut jobs_submitted = 0;
        if ended && resource.has_problem_rating {
            let job = Job::ProblemRating {
                contest_id: contest.id,
                force: false,
            };
            jobs_submitted += usize::from(self.jobs.submit(job));
        }
        if resource.has_country_rating {
            let job = Job::CountryRating {
                resource_id: resource.id,
            };
            jobs_submitted += usize::from(self.jobs.submit(job));
        }

        Ok(ContestOutcome::Parsed {
            report,
            skipped_rows: plan.skipped_rows,
            jobs_submitted,
        })
    }

    /// Push the contest back with error backoff.
    async fn record_failure(
        &self,
        resource: &Resource,
        mut contest: Contest,
        now: DateTime<Utc>,
    ) -> Result<()> {
        contest.statistic_errors += 1;
        let next = next_timing_on_error(
            &contest,
            &resource.timing,
            &self.config.scheduler,
            contest.statistic_errors,
            now,
        );
        contest.statistic_timing = Some(next);
        log::warn!(
            "{}: {} failed {} time(s), retry at {}",
            resource.host,
            contest.identity(),
            contest.statistic_errors,
            next.format("%Y-%m-%d %H:%M:%S")
        );
        self.store.save_contest(contest).await?;
        Ok(())
    }
}
