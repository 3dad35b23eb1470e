// src/models/country.rs

use serde::{Deserialize, Serialize};

use crate::models::ResourceId;

/// Per `(resource, country)` aggregate, recomputed wholesale by the country rating job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryAccount {
    pub resource_id: ResourceId,

    pub country: String,

    pub n_accounts: usize,

    #[serde(default)]
    pub rating: Option<f64>,

    #[serde(default)]
    pub n_gold: usize,

    #[serde(default)]
    pub n_silver: usize,

    #[serde(default)]
    pub n_bronze: usize,
}

impl CountryAccount {
    pub fn n_medals(&self) -> usize {
        self.n_gold + self.n_silver + self.n_bronze
    }
}
