use std::fmt;

use serde::{Deserialize, Serialize};

/// A category of CRM record synchronized with its own cursor and watermark.
///
/// Serialized as the lowercase plural, which is also the key used for the
/// per-account `last_pulled_dates` map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Contacts,
    Companies,
    Meetings,
}

impl EntityType {
    /// Processing order within one account.
    pub const ALL: [EntityType; 3] = [Self::Contacts, Self::Companies, Self::Meetings];

    /// Object type segment used in CRM API paths.
    pub fn api_name(self) -> &'static str {
        match self {
            Self::Contacts => "contacts",
            Self::Companies => "companies",
            Self::Meetings => "meetings",
        }
    }

    pub fn singular_label(self) -> &'static str {
        match self {
            Self::Contacts => "Contact",
            Self::Companies => "Company",
            Self::Meetings => "Meeting",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Created,
    Updated,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("Created"),
            Self::Updated => f.write_str("Updated"),
        }
    }
}
