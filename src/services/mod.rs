//! Service layer for the standings pipeline.
//!
//! This module contains:
//! - HTTP fetching (`Requester`) with its cache, cookie jar, and proxy pool
//! - The resource plugin contract and bundled plugins
//! - Parallel account profile fetching (`UsersInfosRunner`)

pub mod cache;
pub mod cookies;
pub mod fetcher;
pub mod plugin;
pub mod proxy;
#[cfg(test)]
pub(crate) mod testing;
pub mod users;

pub use fetcher::{AttemptPolicy, Page, PostBody, RequestOptions, Requester};
pub use plugin::{
    ContestAdditionUpdate, MatchBy, PluginRegistry, StandingsPlugin, StandingsRequest, UserInfo,
};
pub use proxy::{ProxyEntry, ProxyPool};
pub use users::UsersInfosRunner;
