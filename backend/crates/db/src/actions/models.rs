use std::fmt;

use chrono::{DateTime, Utc};
use crmsync_common::types::{ActionKind, EntityType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `"<Entity> <Kind>"`, e.g. `"Meeting Updated"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionName {
    pub entity: EntityType,
    pub kind: ActionKind,
}

impl ActionName {
    pub fn new(entity: EntityType, kind: ActionKind) -> Self {
        Self { entity, kind }
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.entity.singular_label(), self.kind)
    }
}

/// A normalized create/update observed on a CRM record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    pub id: Uuid,
    pub action_name: ActionName,
    pub action_date: DateTime<Utc>,
    pub include_in_analytics: bool,
    pub identity: Option<String>,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl ActionEvent {
    pub fn new(
        action_name: ActionName,
        action_date: DateTime<Utc>,
        identity: Option<String>,
        properties: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_name,
            action_date,
            include_in_analytics: false,
            identity,
            properties,
        }
    }
}
