// src/services/proxy.rs

//! Proxy rotation with success-based scoring.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::services::cache::write_atomic;

/// A proxy and its track record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyEntry {
    /// Proxy URL, e.g. `http://10.0.0.1:3128`
    pub addr: String,

    #[serde(default)]
    pub n_success: u64,

    #[serde(default)]
    pub n_failure: u64,

    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
}

impl ProxyEntry {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            n_success: 0,
            n_failure: 0,
            last_used: None,
        }
    }
}

#[derive(Debug)]
struct PoolState {
    proxies: Vec<ProxyEntry>,
    n_uses: usize,
}

/// Shared proxy pool. Score updates happen under a lock.
#[derive(Debug)]
pub struct ProxyPool {
    path: Option<PathBuf>,
    limit: usize,
    state: Mutex<PoolState>,
}

impl ProxyPool {
    pub fn new(proxies: Vec<ProxyEntry>, limit: usize) -> Self {
        Self {
            path: None,
            limit,
            state: Mutex::new(PoolState {
                proxies,
                n_uses: 0,
            }),
        }
    }

    /// Load proxies and their scores from a JSON file.
    pub fn load(path: impl Into<PathBuf>, limit: usize) -> Result<Self> {
        let path = path.into();
        let bytes = std::fs::read(&path)?;
        let proxies: Vec<ProxyEntry> = serde_json::from_slice(&bytes)?;
        log::info!("Loaded {} proxies from {:?}", proxies.len(), path);
        let mut pool = Self::new(proxies, limit);
        pool.path = Some(path);
        Ok(pool)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_empty(&self) -> bool {
        self.lock().proxies.is_empty()
    }

    /// Uses handed out in this run.
    pub fn n_uses(&self) -> usize {
        self.lock().n_uses
    }

    /// Draw the best proxy: most successes, then most recently used.
    ///
    /// Fails with `ProxyLimitReached` once the per-run budget is spent.
    pub fn acquire(&self) -> Result<Option<String>> {
        let mut state = self.lock();
        if state.proxies.is_empty() {
            return Ok(None);
        }
        if state.n_uses >= self.limit {
            return Err(AppError::ProxyLimitReached { limit: self.limit });
        }
        state.n_uses += 1;
        let best = state
            .proxies
            .iter_mut()
            .max_by_key(|p| (p.n_success, p.last_used));
        Ok(best.map(|proxy| {
            proxy.last_used = Some(Utc::now());
            proxy.addr.clone()
        }))
    }

    pub fn report_success(&self, addr: &str) {
        let mut state = self.lock();
        if let Some(proxy) = state.proxies.iter_mut().find(|p| p.addr == addr) {
            proxy.n_success += 1;
        }
    }

    /// Record a failure; the success score decays by half.
    pub fn report_failure(&self, addr: &str) {
        let mut state = self.lock();
        if let Some(proxy) = state.proxies.iter_mut().find(|p| p.addr == addr) {
            proxy.n_failure += 1;
            proxy.n_success /= 2;
            log::debug!("Proxy {} failed, score now {}", addr, proxy.n_success);
        }
    }

    pub fn entries(&self) -> Vec<ProxyEntry> {
        self.lock().proxies.clone()
    }

    /// Persist scores back to the proxy file, if any.
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(&self.entries())?;
        write_atomic(path, &bytes).await
    }
}
