//! Resource plugin contract.
//!
//! A plugin turns one external site into canonical [`StandingsDocument`]s
//! and, optionally, account profiles. Plugins never write to the store;
//! everything they learn travels through their return values.

mod json_feed;
mod local_files;
mod registry;

use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{Account, Contest, Document, Resource, StandingsDocument};

pub use json_feed::JsonFeedPlugin;
pub use local_files::LocalFilesPlugin;
pub use registry::PluginRegistry;

/// Input of [`StandingsPlugin::get_standings`].
#[derive(Debug, Clone, Copy)]
pub struct StandingsRequest<'a> {
    pub resource: &'a Resource,
    pub contest: &'a Contest,
    /// Restrict the result to these member keys
    pub users: Option<&'a [String]>,
    /// Stored additions of the contest, keyed by account key
    pub previous_results: Option<&'a HashMap<String, Document>>,
}

impl StandingsRequest<'_> {
    /// Contest identity used in errors and logs.
    pub fn contest_label(&self) -> String {
        format!("{}/{}", self.resource.host, self.contest.key)
    }

    /// Drop rows outside the requested user set.
    pub fn filter_users(&self, document: &mut StandingsDocument) {
        if let Some(users) = self.users {
            document
                .result
                .retain(|member, _| users.iter().any(|user| user == member));
        }
    }
}

/// Implemented once per external site.
#[async_trait]
pub trait StandingsPlugin: Send + Sync {
    /// Module tag this plugin is registered under.
    fn name(&self) -> &str;

    /// Fetch and normalize the standings of one contest.
    ///
    /// Unrecoverable per-contest conditions are reported as
    /// [`AppError::ParseStandings`]; HTTP faults as
    /// [`AppError::FailOnGetResponse`].
    async fn get_standings(&self, request: StandingsRequest<'_>) -> Result<StandingsDocument>;

    /// Whether [`StandingsPlugin::get_user_info`] is implemented.
    fn has_users_infos(&self) -> bool {
        false
    }

    /// Fetch the profile of one account.
    async fn get_user_info(&self, resource: &Resource, account: &Account) -> Result<UserInfo> {
        let _ = account;
        Err(AppError::Unsupported(format!(
            "{} does not provide account infos for {}",
            self.name(),
            resource.host
        )))
    }
}

/// Outcome of one account profile fetch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawUserInfo")]
pub enum UserInfo {
    /// The account vanished upstream
    Delete,
    /// Transient failure; leave the account untouched
    Skip,
    Info {
        info: Document,
        contest_addition_update_params: Option<ContestAdditionUpdate>,
    },
}

impl UserInfo {
    pub fn info(info: Document) -> Self {
        Self::Info {
            info,
            contest_addition_update_params: None,
        }
    }

    /// Parse a profile document.
    ///
    /// Objects without `delete`, `skip`, or `info` are taken as the profile itself.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let Some(object) = value.as_object() else {
            return Err(AppError::validation("account info is not an object"));
        };
        if ["delete", "skip", "info"].iter().any(|key| object.contains_key(*key)) {
            Ok(serde_json::from_value(value)?)
        } else {
            Ok(Self::info(object.clone()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawUserInfo {
    #[serde(default)]
    delete: bool,
    #[serde(default)]
    skip: bool,
    #[serde(default)]
    info: Document,
    #[serde(default)]
    contest_addition_update_params: Option<ContestAdditionUpdate>,
}

impl From<RawUserInfo> for UserInfo {
    fn from(raw: RawUserInfo) -> Self {
        if raw.delete {
            Self::Delete
        } else if raw.skip {
            Self::Skip
        } else {
            Self::Info {
                info: raw.info,
                contest_addition_update_params: raw.contest_addition_update_params,
            }
        }
    }
}

/// Historical fields to merge into an account's past statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContestAdditionUpdate {
    /// Contest identifier (per `by`) to fields merged into the addition
    #[serde(default)]
    pub update: IndexMap<String, Document>,

    #[serde(default)]
    pub by: MatchBy,

    /// Remove rating fields from contests not listed in `update`
    #[serde(default)]
    pub clear_rating_change: bool,
}

/// Contest attribute matched against [`ContestAdditionUpdate::update`] keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchBy {
    #[default]
    Key,
    Title,
}

impl MatchBy {
    pub fn identifier<'a>(&self, contest: &'a Contest) -> &'a str {
        match self {
            Self::Key => &contest.key,
            Self::Title => &contest.title,
        }
    }
}

/// Reject keys that could escape a directory or URL path segment.
pub(crate) fn ensure_safe_key(contest: &str, key: &str) -> Result<()> {
    if key.is_empty() || key.contains('/') || key.contains('\\') || key.contains("..") {
        return Err(AppError::parse_standings(
            contest,
            format!("unsafe key '{key}'"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_info_forms() {
        assert_eq!(UserInfo::from_json(r#"{"delete": true}"#).unwrap(), UserInfo::Delete);
        assert_eq!(UserInfo::from_json(r#"{"skip": true}"#).unwrap(), UserInfo::Skip);

        let info = UserInfo::from_json(
            r#"{
                "info": {"name": "Alice", "rating": 1800},
                "contest_addition_update_params": {
                    "update": {"round-1": {"old_rating": 1700, "new_rating": 1800}},
                    "by": "key",
                    "clear_rating_change": true
                }
            }"#,
        )
        .unwrap();
        let UserInfo::Info {
            info,
            contest_addition_update_params: Some(params),
        } = info
        else {
            panic!("expected info with params");
        };
        assert_eq!(info.get("name").and_then(|v| v.as_str()), Some("Alice"));
        assert_eq!(params.by, MatchBy::Key);
        assert!(params.clear_rating_change);
        assert!(params.update.contains_key("round-1"));
    }

    #[test]
    fn test_bare_profile_is_info() {
        let info = UserInfo::from_json(r#"{"name": "Bob", "country": "NL"}"#).unwrap();
        match info {
            UserInfo::Info { info, .. } => assert_eq!(info.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        assert!(UserInfo::from_json("[1]").is_err());
    }

    #[test]
    fn test_safe_keys() {
        assert!(ensure_safe_key("c", "round-1").is_ok());
        assert!(ensure_safe_key("c", "../etc").is_err());
        assert!(ensure_safe_key("c", "a/b").is_err());
    }
}
