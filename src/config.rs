// src/config.rs

//! Configuration loading utilities.
//!
//! This module loads `{storage_dir}/config.toml` and seeds the resources it
//! declares into the entity store.

use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::models::Config;
use crate::storage::{EntityStore, LocalStore};

pub const CONFIG_FILE: &str = "config.toml";

pub fn config_path(storage_dir: &Path) -> PathBuf {
    storage_dir.join(CONFIG_FILE)
}

/// Load configuration from the storage directory.
///
/// A missing file gives defaults; a malformed one is an error.
pub fn load_config(storage_dir: &Path) -> Result<Config> {
    let path = config_path(storage_dir);
    let config = if path.exists() {
        Config::load(&path)
            .map_err(|e| AppError::config(format!("Failed to load {path:?}: {e}")))?
    } else {
        log::warn!("No config at {:?}, using defaults", path);
        Config::default()
    };
    config.validate()?;
    Ok(config)
}

/// Upsert every configured resource. Returns how many were written.
pub async fn seed_resources(store: &dyn EntityStore, config: &Config) -> Result<usize> {
    for resource in &config.resources {
        if resource.host.trim().is_empty() {
            return Err(AppError::config("resource with an empty host"));
        }
        let mut seeded = resource.clone();
        // Counters are derived by the store
        if let Some(existing) = store.resource_by_host(&resource.host).await? {
            seeded.n_accounts = existing.n_accounts;
            seeded.n_contests = existing.n_contests;
        }
        let saved = store.upsert_resource(seeded).await?;
        log::debug!("Seeded resource #{} {}", saved.id, saved.host);
    }
    Ok(config.resources.len())
}

/// Load config and open the store, with configured resources seeded.
pub async fn load_all(storage_dir: &Path) -> Result<(Config, LocalStore)> {
    let config = load_config(storage_dir)?;
    let store = LocalStore::open(storage_dir).await?;
    let seeded = seed_resources(&store, &config).await?;
    log::info!("Loaded {} configured resources", seeded);
    Ok((config, store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
[scheduler]
max_concurrent = 2

[[resources]]
host = "judge.example"
module = "local_files"
has_problem_rating = true

[resources.options]
dir = "feeds"
"#;

    #[test]
    fn test_missing_config_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert!(config.resources.is_empty());
    }

    #[test]
    fn test_malformed_config_is_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(config_path(tmp.path()), "[scheduler\n").unwrap();
        assert!(matches!(
            load_config(tmp.path()).unwrap_err(),
            AppError::Config(_)
        ));
    }

    #[tokio::test]
    async fn test_seeding_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(config_path(tmp.path()), CONFIG).unwrap();

        let (config, store) = load_all(tmp.path()).await.unwrap();
        assert_eq!(config.scheduler.max_concurrent, 2);
        let first = store.resource_by_host("judge.example").await.unwrap().unwrap();
        assert!(first.has_problem_rating);

        seed_resources(&store, &config).await.unwrap();
        let resources = store.resources().await.unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].id, first.id);
    }
}
