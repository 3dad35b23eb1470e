// src/services/plugin/json_feed.rs

//! Plugin for judges that publish canonical standings as JSON.
//!
//! Resource options:
//! - `standings_url`: template with `{key}` and `{url}` placeholders;
//!   the contest URL is used when absent
//! - `account_url`: template with a `{key}` placeholder enabling profile
//!   refresh
//! - `n_attempts`: attempts per request

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::document::{get_f64, get_str};
use crate::models::{Account, Resource, StandingsAction, StandingsDocument};
use crate::services::fetcher::{RequestOptions, Requester};
use crate::services::plugin::{StandingsPlugin, StandingsRequest, UserInfo, ensure_safe_key};
use crate::utils::{encode_component, render_template};

pub struct JsonFeedPlugin {
    requester: Arc<Requester>,
}

impl JsonFeedPlugin {
    pub const NAME: &'static str = "json_feed";

    pub fn new(requester: Arc<Requester>) -> Self {
        Self { requester }
    }

    fn options(resource: &Resource) -> RequestOptions {
        let mut options = RequestOptions::default().no_cache();
        if let Some(n) = get_f64(&resource.options, "n_attempts") {
            options = options.attempts(n.max(1.0) as u32);
        }
        options
    }
}

#[async_trait]
impl StandingsPlugin for JsonFeedPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn get_standings(&self, request: StandingsRequest<'_>) -> Result<StandingsDocument> {
        let label = request.contest_label();
        let contest = request.contest;
        let url = match get_str(&request.resource.options, "standings_url") {
            Some(template) => {
                let key = encode_component(&contest.key);
                render_template(template, &[("key", key.as_str()), ("url", contest.url.as_str())])
            }
            None if !contest.url.is_empty() => contest.url.clone(),
            None => return Err(AppError::parse_standings(&label, "no standings url")),
        };

        let page = match self.requester.get(&url, &Self::options(request.resource)).await {
            Ok(page) => page,
            Err(e) if e.is_not_found() => {
                log::info!("Standings of {} are gone upstream ({})", label, url);
                return Ok(StandingsDocument {
                    action: Some(StandingsAction::Delete),
                    ..StandingsDocument::default()
                });
            }
            Err(e) => return Err(e),
        };

        let mut document = StandingsDocument::from_json(&label, &page.body)?;
        request.filter_users(&mut document);
        Ok(document)
    }

    fn has_users_infos(&self) -> bool {
        true
    }

    async fn get_user_info(&self, resource: &Resource, account: &Account) -> Result<UserInfo> {
        let Some(template) = get_str(&resource.options, "account_url") else {
            return Err(AppError::Unsupported(format!(
                "{} has no account_url",
                resource.host
            )));
        };
        ensure_safe_key(&resource.host, &account.key)?;
        let key = encode_component(&account.key);
        let url = render_template(template, &[("key", key.as_str())]);
        match self.requester.get(&url, &Self::options(resource)).await {
            Ok(page) => UserInfo::from_json(&page.body),
            Err(e) if e.is_not_found() => Ok(UserInfo::Delete),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contest, FetcherConfig};
    use crate::services::testing::{Canned, serve};
    use crate::storage::local::tests::contest;
    use chrono::Utc;
    use serde_json::json;

    fn plugin() -> JsonFeedPlugin {
        let config = FetcherConfig {
            attempt_delay_ms: 1,
            ..FetcherConfig::default()
        };
        JsonFeedPlugin::new(Arc::new(Requester::from_config(&config).unwrap()))
    }

    fn resource(base: &str) -> Resource {
        let mut resource = Resource::new("judge.example", JsonFeedPlugin::NAME);
        resource.options.insert(
            "standings_url".into(),
            json!(format!("{base}/api/{{key}}/standings")),
        );
        resource
            .options
            .insert("account_url".into(), json!(format!("{base}/api/users/{{key}}")));
        resource
    }

    fn request<'a>(resource: &'a Resource, contest: &'a Contest) -> StandingsRequest<'a> {
        StandingsRequest {
            resource,
            contest,
            users: None,
            previous_results: None,
        }
    }

    #[tokio::test]
    async fn test_fetches_document() {
        let body = json!({
            "result": {"alice": {"place": 1, "solving": 2}},
            "problems": [{"short": "A"}]
        });
        let server = serve(vec![Canned::new(200, body.to_string())]).await;
        let resource = resource(&server.base_url);
        let contest = contest(1, "round-1", Utc::now());

        let document = plugin().get_standings(request(&resource, &contest)).await.unwrap();
        assert_eq!(document.result.len(), 1);
        assert!(server.request(0).starts_with("GET /api/round-1/standings"));
    }

    #[tokio::test]
    async fn test_not_found_means_delete() {
        let server = serve(vec![Canned::new(404, "")]).await;
        let resource = resource(&server.base_url);
        let contest = contest(1, "round-1", Utc::now());

        let document = plugin().get_standings(request(&resource, &contest)).await.unwrap();
        assert_eq!(document.action, Some(StandingsAction::Delete));
    }

    #[tokio::test]
    async fn test_garbage_is_parse_failure() {
        let server = serve(vec![Canned::new(200, "<html>maintenance</html>")]).await;
        let resource = resource(&server.base_url);
        let contest = contest(1, "round-1", Utc::now());

        let err = plugin().get_standings(request(&resource, &contest)).await.unwrap_err();
        assert!(matches!(err, AppError::ParseStandings { .. }));
    }

    #[tokio::test]
    async fn test_users_filter() {
        let body = json!({"result": {"alice": {}, "bob": {}}});
        let server = serve(vec![Canned::new(200, body.to_string())]).await;
        let resource = resource(&server.base_url);
        let contest = contest(1, "round-1", Utc::now());
        let users = vec!["bob".to_string()];

        let mut req = request(&resource, &contest);
        req.users = Some(&users);
        let document = plugin().get_standings(req).await.unwrap();
        assert_eq!(document.result.keys().collect::<Vec<_>>(), vec!["bob"]);
    }

    #[tokio::test]
    async fn test_user_info() {
        let server = serve(vec![
            Canned::new(200, r#"{"info": {"name": "Alice"}}"#),
            Canned::new(404, ""),
        ])
        .await;
        let resource = resource(&server.base_url);
        let plugin = plugin();

        let info = plugin
            .get_user_info(&resource, &Account::new(1, "alice"))
            .await
            .unwrap();
        assert!(matches!(info, UserInfo::Info { .. }));
        let gone = plugin
            .get_user_info(&resource, &Account::new(1, "ghost"))
            .await
            .unwrap();
        assert_eq!(gone, UserInfo::Delete);
    }
}
