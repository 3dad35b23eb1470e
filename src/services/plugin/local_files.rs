// src/services/plugin/local_files.rs

//! Plugin reading canonical documents from a directory.
//!
//! Resource option `dir` names the directory holding `{contest_key}.json`
//! standings and `accounts/{account_key}.json` profiles.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::document::get_str;
use crate::models::{Account, Resource, StandingsDocument};
use crate::services::plugin::{StandingsPlugin, StandingsRequest, UserInfo, ensure_safe_key};

pub struct LocalFilesPlugin;

impl LocalFilesPlugin {
    pub const NAME: &'static str = "local_files";

    fn dir(resource: &Resource) -> Result<PathBuf> {
        get_str(&resource.options, "dir")
            .map(PathBuf::from)
            .ok_or_else(|| AppError::config(format!("{}: option 'dir' is not set", resource.host)))
    }
}

#[async_trait]
impl StandingsPlugin for LocalFilesPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn get_standings(&self, request: StandingsRequest<'_>) -> Result<StandingsDocument> {
        let label = request.contest_label();
        ensure_safe_key(&label, &request.contest.key)?;
        let path = Self::dir(request.resource)?.join(format!("{}.json", request.contest.key));

        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::parse_standings(
                    &label,
                    format!("standings file {path:?} is missing"),
                ));
            }
            Err(e) => return Err(AppError::Io(e)),
        };
        let mut document = StandingsDocument::from_json(&label, &text)?;
        request.filter_users(&mut document);
        Ok(document)
    }

    fn has_users_infos(&self) -> bool {
        true
    }

    async fn get_user_info(&self, resource: &Resource, account: &Account) -> Result<UserInfo> {
        ensure_safe_key(&resource.host, &account.key)?;
        let path = Self::dir(resource)?
            .join("accounts")
            .join(format!("{}.json", account.key));
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => UserInfo::from_json(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(UserInfo::Skip),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StandingsAction;
    use crate::storage::local::tests::contest;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;

    fn resource(dir: &std::path::Path) -> Resource {
        let mut resource = Resource::new("judge.example", LocalFilesPlugin::NAME);
        resource
            .options
            .insert("dir".into(), json!(dir.to_string_lossy()));
        resource
    }

    #[tokio::test]
    async fn test_reads_document() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("round-1.json"),
            r#"{"result": {"alice": {"place": "1"}}, "action": ["url", "https://judge.example/r1"]}"#,
        )
        .unwrap();
        let resource = resource(tmp.path());
        let contest = contest(1, "round-1", Utc::now());

        let document = LocalFilesPlugin
            .get_standings(StandingsRequest {
                resource: &resource,
                contest: &contest,
                users: None,
                previous_results: None,
            })
            .await
            .unwrap();
        assert_eq!(document.result.len(), 1);
        assert_eq!(
            document.action,
            Some(StandingsAction::Url("https://judge.example/r1".into()))
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_parse_failure() {
        let tmp = TempDir::new().unwrap();
        let resource = resource(tmp.path());
        let contest = contest(1, "round-9", Utc::now());
        let err = LocalFilesPlugin
            .get_standings(StandingsRequest {
                resource: &resource,
                contest: &contest,
                users: None,
                previous_results: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_parse_failure());
    }

    #[tokio::test]
    async fn test_user_info_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("accounts")).unwrap();
        std::fs::write(tmp.path().join("accounts/gone.json"), r#"{"delete": true}"#).unwrap();
        let resource = resource(tmp.path());

        let gone = LocalFilesPlugin
            .get_user_info(&resource, &Account::new(1, "gone"))
            .await
            .unwrap();
        assert_eq!(gone, UserInfo::Delete);
        let missing = LocalFilesPlugin
            .get_user_info(&resource, &Account::new(1, "nobody"))
            .await
            .unwrap();
        assert_eq!(missing, UserInfo::Skip);
    }
}
