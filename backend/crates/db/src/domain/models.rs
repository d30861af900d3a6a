use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use crmsync_common::types::EntityType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregate root for one customer: its connected HubSpot portals plus
/// ambient settings. Loaded once per run, saved once per account pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    pub id: Uuid,
    pub api_key: Option<String>,
    pub accounts: Vec<HubSpotAccount>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubSpotAccount {
    pub hub_id: String,
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub last_pulled_dates: BTreeMap<EntityType, DateTime<Utc>>,
}

impl HubSpotAccount {
    pub fn last_pulled(&self, entity: EntityType) -> Option<DateTime<Utc>> {
        self.last_pulled_dates.get(&entity).copied()
    }
}
