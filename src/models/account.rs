// src/models/account.rs

//! Judge-specific identities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::document::Document;
use crate::models::{AccountId, ResourceId};

/// An identity on a resource, unique by `(resource_id, key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub id: AccountId,

    pub resource_id: ResourceId,

    pub key: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub country: Option<String>,

    #[serde(default)]
    pub rating: Option<f64>,

    #[serde(default)]
    pub n_contests: usize,

    #[serde(default)]
    pub n_writers: usize,

    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,

    /// Start of the latest major-kind contest with rating data
    #[serde(default)]
    pub last_rating_activity: Option<DateTime<Utc>>,

    /// Judge-reported profile data
    #[serde(default)]
    pub info: Document,

    /// Last profile refresh
    #[serde(default)]
    pub info_updated: Option<DateTime<Utc>>,
}

impl Account {
    /// A fresh, unsaved account.
    pub fn new(resource_id: ResourceId, key: impl Into<String>) -> Self {
        Self {
            id: 0,
            resource_id,
            key: key.into(),
            name: None,
            country: None,
            rating: None,
            n_contests: 0,
            n_writers: 0,
            last_activity: None,
            last_rating_activity: None,
            info: Document::new(),
            info_updated: None,
        }
    }

    pub fn is_saved(&self) -> bool {
        self.id != 0
    }

    /// Apply a reported display name.
    ///
    /// A name that is missing or equal to the key is replaced by anything
    /// else; an existing real name is only replaced by a longer name that
    /// extends it. Returns `true` when the name changed.
    pub fn backfill_name(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.name.as_deref() == Some(name) {
            return false;
        }
        let replace = match self.name.as_deref() {
            None => true,
            Some(current) if current.is_empty() || current == self.key => true,
            Some(current) => name.len() > current.len() && name.starts_with(current),
        };
        if replace {
            self.name = Some(name.to_string());
        }
        replace
    }

    /// Set the country if none is known yet.
    pub fn backfill_country(&mut self, country: &str) -> bool {
        let country = country.trim();
        if country.is_empty() || self.country.is_some() {
            return false;
        }
        self.country = Some(country.to_string());
        true
    }

    /// Move `last_activity` forward; never backwards.
    pub fn bump_activity(&mut self, at: DateTime<Utc>) -> bool {
        if self.last_activity.is_some_and(|current| current >= at) {
            return false;
        }
        self.last_activity = Some(at);
        true
    }

    /// Move `last_rating_activity` forward; never backwards.
    pub fn bump_rating_activity(&mut self, at: DateTime<Utc>) -> bool {
        if self.last_rating_activity.is_some_and(|current| current >= at) {
            return false;
        }
        self.last_rating_activity = Some(at);
        true
    }

    /// Fold an account row built from an older snapshot into this one.
    ///
    /// Names and countries go through the backfill rules, activity only moves
    /// forward and the rating is taken only when `started` is still the latest
    /// rating activity.
    pub fn merge_from(&mut self, incoming: Account, started: DateTime<Utc>) {
        if let Some(name) = incoming.name.as_deref() {
            self.backfill_name(name);
        }
        if let Some(country) = incoming.country.as_deref() {
            self.backfill_country(country);
        }
        if let Some(at) = incoming.last_activity {
            self.bump_activity(at);
        }
        if let Some(at) = incoming.last_rating_activity {
            self.bump_rating_activity(at);
        }
        if incoming.last_rating_activity == Some(started)
            && self.last_rating_activity == Some(started)
        {
            if let Some(rating) = incoming.rating {
                self.rating = Some(rating);
            }
        }
        if incoming.info_updated > self.info_updated {
            self.info = incoming.info;
            self.info_updated = incoming.info_updated;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_backfill_name() {
        let mut account = Account::new(1, "tourist");
        assert!(account.backfill_name("tourist"));
        assert!(account.backfill_name("Gennady"));
        assert!(!account.backfill_name("G"));
        assert!(account.backfill_name("Gennady Korotkevich"));
        assert_eq!(account.name.as_deref(), Some("Gennady Korotkevich"));
        assert!(!account.backfill_name("  "));
    }

    #[test]
    fn test_backfill_country_only_once() {
        let mut account = Account::new(1, "alice");
        assert!(account.backfill_country("NL"));
        assert!(!account.backfill_country("DE"));
        assert_eq!(account.country.as_deref(), Some("NL"));
    }

    #[test]
    fn test_activity_only_moves_forward() {
        let mut account = Account::new(1, "alice");
        let now = Utc::now();
        assert!(account.bump_activity(now));
        assert!(!account.bump_activity(now - TimeDelta::days(1)));
        assert!(account.bump_activity(now + TimeDelta::days(1)));
        assert!(account.bump_rating_activity(now));
        assert!(!account.bump_rating_activity(now));
    }

    #[test]
    fn test_merge_keeps_newer_state() {
        let now = Utc::now();
        let earlier = now - TimeDelta::days(7);

        let mut stored = Account::new(1, "alice");
        stored.name = Some("Alice".into());
        stored.country = Some("NL".into());
        stored.rating = Some(1900.0);
        stored.last_activity = Some(now);
        stored.last_rating_activity = Some(now);

        let mut stale = Account::new(1, "alice");
        stale.country = Some("DE".into());
        stale.rating = Some(1500.0);
        stale.last_activity = Some(earlier);
        stale.last_rating_activity = Some(earlier);
        stored.merge_from(stale, earlier);

        assert_eq!(stored.name.as_deref(), Some("Alice"));
        assert_eq!(stored.country.as_deref(), Some("NL"));
        assert_eq!(stored.rating, Some(1900.0));
        assert_eq!(stored.last_activity, Some(now));

        let mut fresh = Account::new(1, "alice");
        fresh.name = Some("Alice Smith".into());
        fresh.rating = Some(2000.0);
        fresh.last_rating_activity = Some(now + TimeDelta::days(1));
        stored.merge_from(fresh, now + TimeDelta::days(1));
        assert_eq!(stored.name.as_deref(), Some("Alice Smith"));
        assert_eq!(stored.rating, Some(2000.0));
    }
}
