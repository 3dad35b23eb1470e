//! Standings CLI
//!
//! Local execution entry point for parse runs, account refreshes and rating jobs.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use standings::{
    config,
    error::{AppError, Result},
    models::{Config, Contest},
    pipeline::{
        self, AccountsOptions, AccountsRunner, Job, MemoryJobQueue, ParseOptions, Selection,
        StatisticsRunner,
    },
    services::{PluginRegistry, Requester},
    storage::{EntityStore, LocalStore},
};

/// Contest standings aggregator
#[derive(Parser, Debug)]
#[command(
    name = "standings",
    version,
    about = "Ingests contest standings into a unified rating database"
)]

struct Cli {
    /// Path to storage directory holding config.toml and the entity store
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch and reconcile standings of due contests
    Parse {
        /// Resource host to process (repeatable; default: all)
        #[arg(long = "resource")]
        resources: Vec<String>,

        /// Explicit contest id (repeatable)
        #[arg(long = "contest-id")]
        contest_ids: Vec<u64>,

        /// Maximum contests per resource
        #[arg(long)]
        limit: Option<usize>,

        /// Ignore the scheduled statistic timing
        #[arg(long)]
        force: bool,

        /// Log the change set without writing it
        #[arg(long)]
        dry_run: bool,

        /// Sync contest metadata and problems only
        #[arg(long)]
        no_stats: bool,

        /// Refresh only these account keys (repeatable)
        #[arg(long = "users")]
        users: Vec<String>,

        /// Do not run queued rating jobs afterwards
        #[arg(long)]
        no_jobs: bool,
    },

    /// Refresh account profiles of a resource
    Accounts {
        #[arg(long)]
        resource: String,

        /// Account keys to refresh regardless of age (repeatable)
        #[arg(long = "users")]
        users: Vec<String>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Recompute problem ratings of a contest
    ProblemRating {
        #[arg(long)]
        contest_id: u64,

        /// Recompute even if the inputs are unchanged
        #[arg(long)]
        force: bool,
    },

    /// Recompute country aggregates of a resource
    CountryRating {
        #[arg(long)]
        resource: String,
    },

    /// Import discovered contests from a JSON file
    ImportContests {
        /// `{"resource": HOST, "contests": [...]}`
        file: PathBuf,
    },

    /// Validate configuration and resource bindings
    Validate,

    /// Show entity store counts
    Info,
}

/// Discovery output accepted by `import-contests`.
#[derive(Debug, Deserialize)]
struct ContestImport {
    resource: String,
    contests: Vec<serde_json::Value>,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

async fn resource_id(store: &LocalStore, host: &str) -> Result<u64> {
    store
        .resource_by_host(host)
        .await?
        .map(|r| r.id)
        .ok_or_else(|| AppError::not_found(format!("resource {host}")))
}

/// Execute and report every queued job.
async fn drain_jobs(store: &LocalStore, config: &Config, queue: &MemoryJobQueue) {
    let jobs = queue.drain();
    if jobs.is_empty() {
        return;
    }
    log::info!("Running {} queued jobs", jobs.len());
    pipeline::run_jobs(store, &config.rating, jobs).await.log();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("Standings starting...");

    let (config, store) = config::load_all(&cli.storage_dir).await?;
    log::info!("Loaded configuration from {}", cli.storage_dir.display());

    let requester = Arc::new(Requester::from_config(&config.fetcher)?);
    let registry = PluginRegistry::with_bundled(Arc::clone(&requester));

    match cli.command {
        Command::Parse {
            resources,
            contest_ids,
            limit,
            force,
            dry_run,
            no_stats,
            users,
            no_jobs,
        } => {
            let options = ParseOptions {
                resources,
                selection: Selection {
                    contest_ids,
                    force,
                    limit,
                },
                dry_run,
                no_stats,
                users: (!users.is_empty()).then_some(users),
            };
            let queue = MemoryJobQueue::new();
            let summary = StatisticsRunner::new(&store, &registry, &config, &queue)
                .run(&options)
                .await?;
            summary.log();

            if no_jobs || dry_run {
                if !queue.is_empty() {
                    log::info!("Leaving {} jobs unexecuted", queue.len());
                }
            } else {
                drain_jobs(&store, &config, &queue).await;
            }
        }

        Command::Accounts {
            resource,
            users,
            limit,
        } => {
            let options = AccountsOptions {
                resource,
                users,
                limit,
            };
            let summary = AccountsRunner::new(&store, &registry, &config)
                .run(&options)
                .await?;
            summary.log(&options.resource);
        }

        Command::ProblemRating { contest_id, force } => {
            let job = Job::ProblemRating { contest_id, force };
            let summary = pipeline::run_jobs(&store, &config.rating, vec![job]).await;
            summary.log();
            if summary.failed > 0 {
                return Err(AppError::validation(format!(
                    "problem rating of contest {contest_id} failed"
                )));
            }
        }

        Command::CountryRating { resource } => {
            let resource_id = resource_id(&store, &resource).await?;
            let summary = pipeline::run_jobs(
                &store,
                &config.rating,
                vec![Job::CountryRating { resource_id }],
            )
            .await;
            summary.log();
            if summary.failed > 0 {
                return Err(AppError::validation(format!(
                    "country rating of {resource} failed"
                )));
            }
        }

        Command::ImportContests { file } => {
            let content = std::fs::read_to_string(&file)?;
            let import: ContestImport = serde_json::from_str(&content)?;
            let resource_id = resource_id(&store, &import.resource).await?;

            let mut contests = Vec::with_capacity(import.contests.len());
            for mut value in import.contests {
                if let Some(object) = value.as_object_mut() {
                    object.insert("resource_id".into(), resource_id.into());
                }
                contests.push(serde_json::from_value::<Contest>(value)?);
            }
            let imported = store.import_contests(resource_id, contests).await?;
            log::info!(
                "Imported {} contests into {} from {}",
                imported,
                import.resource,
                file.display()
            );
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");

            let resources = store.resources().await?;
            if let Err(e) = registry.check_resources(&resources) {
                log::error!("Resource validation failed: {}", e);
                return Err(e);
            }
            log::info!(
                "✓ {} resources bound to plugins ({})",
                resources.len(),
                registry.modules().join(", ")
            );

            log::info!("All validations passed!");
        }

        Command::Info => {
            log::info!("Storage directory: {}", cli.storage_dir.display());
            let db = store.snapshot().await;
            log::info!(
                "Entities: {} resources, {} contests, {} accounts, {} problems, {} statistics",
                db.resources.len(),
                db.contests.len(),
                db.accounts.len(),
                db.problems.len(),
                db.statistics.len()
            );
            for resource in db.resources.values() {
                log::info!(
                    "  {} [{}]: {} contests, {} accounts{}",
                    resource.host,
                    resource.module,
                    resource.n_contests,
                    resource.n_accounts,
                    if resource.enabled { "" } else { " (disabled)" }
                );
            }
        }
    }

    requester.save_state().await?;
    log::info!("Done!");

    Ok(())
}
