// src/services/cookies.rs

//! Cookie persistence across requests and runs.
//!
//! The jar is a `cookie_store` shared with every client through
//! `reqwest::ClientBuilder::cookie_provider`; scoping and expiry are the
//! store's business.

use std::path::PathBuf;
use std::sync::{Arc, MutexGuard};

use cookie_store::CookieStore;
use reqwest_cookie_store::CookieStoreMutex;

use crate::error::{AppError, Result};
use crate::services::cache::write_atomic;

/// Cookie jar shared by all clients of a requester, optionally backed by a JSON file.
#[derive(Default)]
pub struct CookieJar {
    path: Option<PathBuf>,
    store: Arc<CookieStoreMutex>,
}

fn store_error(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> AppError {
    AppError::Io(std::io::Error::other(e))
}

impl CookieJar {
    /// A jar that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the jar from `path`; a missing file gives an empty jar.
    ///
    /// Session cookies are kept too, logins survive between runs.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let store = match std::fs::read(&path) {
            Ok(bytes) => cookie_store::serde::json::load_all(bytes.as_slice()).map_err(store_error)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CookieStore::default(),
            Err(e) => return Err(AppError::Io(e)),
        };
        Ok(Self {
            path: Some(path),
            store: Arc::new(CookieStoreMutex::new(store)),
        })
    }

    /// Store handed to `reqwest` clients as their cookie provider.
    pub fn provider(&self) -> Arc<CookieStoreMutex> {
        Arc::clone(&self.store)
    }

    fn lock(&self) -> MutexGuard<'_, CookieStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Value of cookie `name` that would be sent to `url`.
    pub fn value_for(&self, url: &str, name: &str) -> Option<String> {
        let url = url::Url::parse(url).ok()?;
        self.lock()
            .matches(&url)
            .into_iter()
            .find(|cookie| cookie.name() == name)
            .map(|cookie| cookie.value().to_string())
    }

    /// Persist the jar to its file, if any.
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut bytes = Vec::new();
        cookie_store::serde::json::save_incl_expired_and_nonpersistent(&self.lock(), &mut bytes)
            .map_err(store_error)?;
        write_atomic(path, &bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn remember(jar: &CookieJar, url: &str, header: &str) {
        let url = url::Url::parse(url).unwrap();
        let cookie = cookie_store::RawCookie::parse(header.to_string()).unwrap();
        jar.lock().insert_raw(&cookie, &url).unwrap();
    }

    #[test]
    fn test_domain_and_path_scoping() {
        let jar = CookieJar::in_memory();
        remember(&jar, "https://judge.example/api/login", "token=t1; Path=/api");
        remember(&jar, "https://judge.example/", "lang=en; Path=/");

        assert_eq!(
            jar.value_for("https://judge.example/api/standings", "token").as_deref(),
            Some("t1")
        );
        assert!(jar.value_for("https://judge.example/contest/1", "token").is_none());
        assert!(jar.value_for("https://other.example/", "lang").is_none());
    }

    #[test]
    fn test_expired_cookie_removed() {
        let jar = CookieJar::in_memory();
        remember(&jar, "https://judge.example/", "session=abc");
        remember(&jar, "https://judge.example/", "session=; Max-Age=0");
        assert!(jar.value_for("https://judge.example/", "session").is_none());
    }

    #[tokio::test]
    async fn test_session_cookies_survive_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cookies.json");
        let jar = CookieJar::load(&path).unwrap();
        remember(&jar, "https://judge.example/", "session=abc; Path=/");
        jar.save().await.unwrap();

        let reloaded = CookieJar::load(&path).unwrap();
        assert_eq!(
            reloaded.value_for("https://judge.example/me", "session").as_deref(),
            Some("abc")
        );
    }
}
