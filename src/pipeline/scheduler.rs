// src/pipeline/scheduler.rs

//! Contest refresh scheduling.
//!
//! Every contest carries a `statistic_timing` timestamp: the earliest moment
//! its standings should be fetched again. This module decides which contests
//! are due now and where to move the timestamp after a parse succeeds or
//! fails.

use chrono::{DateTime, TimeDelta, Utc};

use crate::models::{Contest, ContestId, Resource, SchedulerConfig, TimingPolicy};
use crate::utils::time::secs;

/// Selection knobs coming from the command line.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Explicit contests; bypasses the lifecycle windows
    pub contest_ids: Vec<ContestId>,

    /// Ignore `statistic_timing`
    pub force: bool,

    /// Maximum number of contests per resource
    pub limit: Option<usize>,
}

/// Whether `contest` should be refreshed at `now`.
pub fn is_due(contest: &Contest, resource: &Resource, now: DateTime<Utc>, selection: &Selection) -> bool {
    if contest.is_stage || !resource.enabled {
        return false;
    }
    if !selection.force && contest.statistic_timing.is_some_and(|t| t > now) {
        return false;
    }
    if !selection.contest_ids.is_empty() {
        return selection.contest_ids.contains(&contest.id);
    }
    if contest.start_time > now {
        return false;
    }

    let timing = &resource.timing;
    if contest.is_running(now) {
        contest.n_statistics > 0 || contest.duration() >= timing.long_contest_idle()
    } else {
        let oldest = now - timing.max_delay_after_end();
        let newest = now - timing.min_delay_after_end();
        oldest <= contest.end_time && contest.end_time <= newest
    }
}

/// Due contests of one resource, least recently scheduled first.
pub fn select_candidates(
    contests: Vec<Contest>,
    resource: &Resource,
    now: DateTime<Utc>,
    selection: &Selection,
) -> Vec<Contest> {
    let mut due: Vec<Contest> = contests
        .into_iter()
        .filter(|c| is_due(c, resource, now, selection))
        .collect();
    due.sort_by(|a, b| {
        a.statistic_timing
            .cmp(&b.statistic_timing)
            .then(b.end_time.cmp(&a.end_time))
            .then(a.id.cmp(&b.id))
    });
    if let Some(limit) = selection.limit {
        due.truncate(limit);
    }
    due
}

/// Refresh interval of a running contest.
///
/// A slice of the duration; contests shorter than `long_contest_idle` are
/// also refreshed at least every `min_delay_after_end`.
pub fn running_delay(duration: TimeDelta, timing: &TimingPolicy) -> TimeDelta {
    let mut delay = duration / timing.long_contest_divider();
    if duration < timing.long_contest_idle() {
        delay = delay.min(timing.min_delay_after_end());
    }
    delay.max(TimeDelta::zero())
}

/// Outcome of a successful parse that affects scheduling.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParsedState {
    pub has_hidden_results: bool,

    /// Plugin override, in seconds
    pub timing_statistic_delta: Option<i64>,
}

/// Next `statistic_timing` after a successful parse.
pub fn next_timing_on_success(
    contest: &Contest,
    timing: &TimingPolicy,
    scheduler: &SchedulerConfig,
    state: ParsedState,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let after_end = contest.end_time + timing.min_delay_after_end();

    let hidden = secs(scheduler.hidden_results_delay_secs);

    if state.has_hidden_results && !contest.is_running(now) {
        return now.max(contest.end_time) + hidden;
    }
    if let Some(delta) = state.timing_statistic_delta {
        return now + secs(delta);
    }
    if contest.is_running(now) {
        let next = (now + running_delay(contest.duration(), timing)).min(after_end);
        // Hidden results are revealed at the end; be there shortly after
        if state.has_hidden_results {
            return next.min(contest.end_time + hidden);
        }
        return next;
    }
    if now < after_end {
        after_end
    } else {
        now + timing.delay_on_success()
    }
}

/// Error backoff: `delay_on_error` doubled per consecutive failure.
pub fn error_delay(errors: u32, timing: &TimingPolicy, scheduler: &SchedulerConfig) -> TimeDelta {
    let cap = secs(scheduler.max_error_delay_secs).max(timing.delay_on_error());
    let mut delay = timing.delay_on_error();
    for _ in 1..errors {
        delay = match delay.checked_add(&delay) {
            Some(doubled) if doubled < cap => doubled,
            _ => return cap,
        };
    }
    delay.min(cap)
}

/// Next `statistic_timing` after the `errors`-th consecutive failure.
pub fn next_timing_on_error(
    contest: &Contest,
    timing: &TimingPolicy,
    scheduler: &SchedulerConfig,
    errors: u32,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let mut delay = error_delay(errors, timing, scheduler);
    if let Some(hint) = contest.info.timing_statistic_delta {
        delay = delay.min(secs(hint));
    }
    let mut next = now + delay;
    let after_end = contest.end_time + timing.min_delay_after_end();
    if now < after_end {
        next = next.min(after_end);
    }
    next
}
