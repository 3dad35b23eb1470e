// src/utils/http.rs

//! HTTP client utilities.

use std::sync::Arc;
use std::time::Duration;

use reqwest_cookie_store::CookieStoreMutex;

use crate::error::Result;
use crate::models::FetcherConfig;

/// Create a configured asynchronous HTTP client.
///
/// Compressed bodies (gzip, deflate, br) are decoded transparently and
/// cookies go through the shared `cookies` store.
pub fn create_async_client(
    config: &FetcherConfig,
    cookies: Arc<CookieStoreMutex>,
) -> Result<reqwest::Client> {
    build_client(config, cookies, None)
}

/// Create a client routing every request through `proxy`.
pub fn create_proxied_client(
    config: &FetcherConfig,
    cookies: Arc<CookieStoreMutex>,
    proxy: &str,
) -> Result<reqwest::Client> {
    build_client(config, cookies, Some(proxy))
}

fn build_client(
    config: &FetcherConfig,
    cookies: Arc<CookieStoreMutex>,
    proxy: Option<&str>,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .cookie_provider(cookies)
        .timeout(Duration::from_secs(config.timeout_secs))
        .gzip(true)
        .brotli(true)
        .deflate(true);
    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }
    Ok(builder.build()?)
}
