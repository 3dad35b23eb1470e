// src/services/fetcher.rs

//! Resilient HTTP requester used by plugins.
//!
//! Wraps a `reqwest` client with a response cache, a persistent cookie
//! jar, optional proxy rotation, and retries with a linearly growing delay.
//! Bodies are decompressed by the client and decoded to text by
//! [`crate::utils::charset`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::FetcherConfig;
use crate::services::cache::ResponseCache;
use crate::services::cookies::CookieJar;
use crate::services::proxy::ProxyPool;
use crate::utils::charset::decode_body;
use crate::utils::http::{create_async_client, create_proxied_client};

/// Characters of a failed response kept in the error.
const RESPONSE_SNIPPET: usize = 200;

/// Request body of a POST.
#[derive(Debug, Clone)]
pub enum PostBody {
    /// `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
    Json(Value),
    Raw(String),
    /// `multipart/form-data` text parts
    Multipart(Vec<(String, String)>),
}

impl PostBody {
    /// Stable bytes identifying the body in the cache key.
    fn cache_bytes(&self) -> Vec<u8> {
        let pairs = |kind: &str, pairs: &[(String, String)]| {
            let mut out = kind.to_string();
            for (name, value) in pairs {
                out.push_str(&format!("&{name}={value}"));
            }
            out.into_bytes()
        };
        match self {
            Self::Form(fields) => pairs("form", fields),
            Self::Multipart(fields) => pairs("multipart", fields),
            Self::Json(value) => value.to_string().into_bytes(),
            Self::Raw(text) => text.clone().into_bytes(),
        }
    }

    fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::Form(fields) => request.form(fields),
            Self::Json(value) => request.json(value),
            Self::Raw(text) => request.body(text.clone()),
            Self::Multipart(fields) => {
                let form = fields
                    .iter()
                    .fold(reqwest::multipart::Form::new(), |form, (name, value)| {
                        form.text(name.clone(), value.clone())
                    });
                request.multipart(form)
            }
        }
    }
}

/// Extra retries granted for a specific status code.
#[derive(Debug, Clone)]
pub struct AttemptPolicy {
    /// Remaining extra attempts
    pub count: u32,
    /// Only retry when the body contains this text
    pub body_contains: Option<String>,
    /// Wait before the retry; defaults to the regular attempt delay
    pub delay: Option<Duration>,
}

impl AttemptPolicy {
    pub fn new(count: u32) -> Self {
        Self {
            count,
            body_contains: None,
            delay: None,
        }
    }

    pub fn body_contains(mut self, text: impl Into<String>) -> Self {
        self.body_contains = Some(text.into());
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Consume one extra attempt if the policy applies to `body`.
    fn take(&mut self, body: &str) -> bool {
        if self.count == 0 {
            return false;
        }
        if let Some(needle) = &self.body_contains {
            if !body.contains(needle.as_str()) {
                return false;
            }
        }
        self.count -= 1;
        true
    }
}

/// Per-request options.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub post: Option<PostBody>,
    pub headers: Vec<(String, String)>,
    /// Parse the body as JSON into [`Page::json`]
    pub return_json: bool,
    /// Overrides the configured attempt count
    pub n_attempts: Option<u32>,
    pub additional_attempts: HashMap<u16, AttemptPolicy>,
    pub caching: bool,
    pub timeout: Option<Duration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            post: None,
            headers: Vec::new(),
            return_json: false,
            n_attempts: None,
            additional_attempts: HashMap::new(),
            caching: true,
            timeout: None,
        }
    }
}

impl RequestOptions {
    pub fn json() -> Self {
        Self {
            return_json: true,
            ..Self::default()
        }
    }

    pub fn post(mut self, body: PostBody) -> Self {
        self.post = Some(body);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn attempts(mut self, n_attempts: u32) -> Self {
        self.n_attempts = Some(n_attempts);
        self
    }

    pub fn additional_attempt(mut self, code: u16, policy: AttemptPolicy) -> Self {
        self.additional_attempts.insert(code, policy);
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.caching = false;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A fetched page.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub body: String,
    /// Parsed body when JSON was requested
    pub json: Option<Value>,
    pub from_cache: bool,
}

struct Response {
    url: String,
    status: u16,
    body: String,
}

/// Shared HTTP requester.
pub struct Requester {
    config: FetcherConfig,
    client: reqwest::Client,
    cache: Option<ResponseCache>,
    cookies: CookieJar,
    proxies: Option<Arc<ProxyPool>>,
    proxied_clients: Mutex<HashMap<String, reqwest::Client>>,
}

impl Requester {
    /// Build a requester from configuration, loading cookies and proxies.
    pub fn from_config(config: &FetcherConfig) -> Result<Self> {
        let cookies = match &config.cookie_file {
            Some(path) => CookieJar::load(path)?,
            None => CookieJar::in_memory(),
        };
        let proxies = match &config.proxy_file {
            Some(path) => Some(Arc::new(ProxyPool::load(path, config.proxy_limit)?)),
            None => None,
        };
        let cache = config
            .cache_dir
            .as_ref()
            .map(|dir| ResponseCache::new(dir, config.cache_timeout_secs));
        Ok(Self {
            config: config.clone(),
            client: create_async_client(config, cookies.provider())?,
            cache,
            cookies,
            proxies,
            proxied_clients: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_proxies(mut self, pool: Arc<ProxyPool>) -> Self {
        self.proxies = Some(pool);
        self
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn proxies(&self) -> Option<&Arc<ProxyPool>> {
        self.proxies.as_ref()
    }

    /// Fetch `url`, retrying per `options` and the configured policy.
    pub async fn get(&self, url: &str, options: &RequestOptions) -> Result<Page> {
        let post_bytes = options.post.as_ref().map(PostBody::cache_bytes);
        let cache = self.cache.as_ref().filter(|_| options.caching);

        if let Some(cache) = cache {
            match cache.get(url, post_bytes.as_deref()).await {
                Ok(Some(body)) => {
                    log::debug!("Cache hit for {}", url);
                    return Self::page(url.to_string(), 200, body, true, options);
                }
                Ok(None) => {}
                Err(e) => log::warn!("Cache read failed for {}: {}", url, e),
            }
        }

        let n_attempts = options.n_attempts.unwrap_or(self.config.n_attempts).max(1);
        let mut additional = options.additional_attempts.clone();
        let mut attempt = 0;
        loop {
            let err = match self.send_once(url, options).await {
                Ok(response) if (200..300).contains(&response.status) => {
                    if let Some(cache) = cache {
                        if let Err(e) = cache.put(url, post_bytes.as_deref(), &response.body).await {
                            log::warn!("Cache write failed for {}: {}", url, e);
                        }
                    }
                    return Self::page(response.url, response.status, response.body, false, options);
                }
                Ok(response) => {
                    if let Some(policy) = additional.get_mut(&response.status) {
                        if policy.take(&response.body) {
                            let delay = policy.delay.unwrap_or_else(|| self.attempt_delay(1, n_attempts));
                            log::info!(
                                "Extra attempt for {} after code {}, waiting {:?}",
                                url,
                                response.status,
                                delay
                            );
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                    }
                    AppError::FailOnGetResponse {
                        code: response.status,
                        url: response.url,
                        response: response.body.chars().take(RESPONSE_SNIPPET).collect(),
                    }
                }
                Err(e) => e,
            };

            attempt += 1;
            if err.is_fatal_for_resource() || attempt >= n_attempts || !Self::is_retryable(&err) {
                return Err(err);
            }
            let delay = self.attempt_delay(attempt, n_attempts);
            log::warn!(
                "Attempt {}/{} for {} failed: {}. Retrying in {:?}",
                attempt,
                n_attempts,
                url,
                err,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Fetch `url` and deserialize its JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<T> {
        let page = self.get(url, options).await?;
        Ok(serde_json::from_str(&page.body)?)
    }

    /// Persist cookies and proxy scores.
    pub async fn save_state(&self) -> Result<()> {
        self.cookies.save().await?;
        if let Some(pool) = &self.proxies {
            pool.save().await?;
        }
        Ok(())
    }

    fn page(url: String, status: u16, body: String, from_cache: bool, options: &RequestOptions) -> Result<Page> {
        let json = if options.return_json {
            Some(serde_json::from_str(&body)?)
        } else {
            None
        };
        Ok(Page {
            url,
            status,
            body,
            json,
            from_cache,
        })
    }

    fn attempt_delay(&self, attempt: u32, n_attempts: u32) -> Duration {
        Duration::from_millis(self.config.attempt_delay_ms) * attempt / n_attempts.max(1)
    }

    /// Transport errors, timeouts, server errors, and throttling are retried.
    fn is_retryable(err: &AppError) -> bool {
        match err {
            AppError::Http(_) => true,
            AppError::FailOnGetResponse { code, .. } => {
                *code >= 500 || *code == 408 || *code == 429
            }
            _ => false,
        }
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<reqwest::Client> {
        let Some(proxy) = proxy else {
            return Ok(self.client.clone());
        };
        let mut clients = self.proxied_clients.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = clients.get(proxy) {
            return Ok(client.clone());
        }
        let client = create_proxied_client(&self.config, self.cookies.provider(), proxy)?;
        clients.insert(proxy.to_string(), client.clone());
        Ok(client)
    }

    async fn send_once(&self, url: &str, options: &RequestOptions) -> Result<Response> {
        let proxy = match &self.proxies {
            Some(pool) => pool.acquire()?,
            None => None,
        };
        let result = self.send_via(url, options, proxy.as_deref()).await;
        if let (Some(pool), Some(addr)) = (&self.proxies, &proxy) {
            match &result {
                Ok(response) if response.status < 400 => pool.report_success(addr),
                _ => pool.report_failure(addr),
            }
        }
        result
    }

    async fn send_via(
        &self,
        url: &str,
        options: &RequestOptions,
        proxy: Option<&str>,
    ) -> Result<Response> {
        let client = self.client_for(proxy)?;
        let mut request = match &options.post {
            Some(body) => body.apply(client.post(url)),
            None => client.get(url),
        };
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;

        Ok(Response {
            url: final_url,
            status,
            body: decode_body(&bytes, content_type.as_deref()),
        })
    }
}
