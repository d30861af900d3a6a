use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A CRM object as returned by search, read and batch-read endpoints.
///
/// `properties` is `None` when the API omitted the payload entirely; such
/// records are skipped by the transform step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubSpotRecord<P> {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub properties: Option<P>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactProperties {
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub email: Option<String>,
    pub jobtitle: Option<String>,
    pub hubspotscore: Option<String>,
    pub hs_lead_status: Option<String>,
    pub hs_analytics_source: Option<String>,
    pub hs_latest_source: Option<String>,
}

impl ContactProperties {
    pub const SEARCH_FIELDS: &'static [&'static str] = &[
        "firstname",
        "lastname",
        "jobtitle",
        "email",
        "hubspotscore",
        "hs_lead_status",
        "hs_analytics_source",
        "hs_latest_source",
    ];

    /// Fields needed to build [`ContactDetails`] for meeting enrichment.
    pub const DETAIL_FIELDS: &'static [&'static str] = &[
        "firstname",
        "lastname",
        "email",
        "jobtitle",
        "hs_analytics_source",
        "hs_lead_status",
        "hubspotscore",
    ];

    /// First and last name joined by a space, trimmed.
    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.firstname.as_deref().unwrap_or(""),
            self.lastname.as_deref().unwrap_or("")
        )
        .trim()
        .to_string()
    }

    /// Lead score as an integer; missing or malformed scores count as 0.
    pub fn score(&self) -> i64 {
        self.hubspotscore
            .as_deref()
            .and_then(|s| s.trim().split('.').next())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanyProperties {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub country: Option<String>,
    pub industry: Option<String>,
    pub description: Option<String>,
    pub annualrevenue: Option<String>,
    pub numberofemployees: Option<String>,
    pub hs_lead_status: Option<String>,
}

impl CompanyProperties {
    pub const SEARCH_FIELDS: &'static [&'static str] = &[
        "name",
        "domain",
        "country",
        "industry",
        "description",
        "annualrevenue",
        "numberofemployees",
        "hs_lead_status",
    ];
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeetingProperties {
    pub hs_timestamp: Option<String>,
    pub hubspot_owner_id: Option<String>,
    pub hs_meeting_title: Option<String>,
    pub hs_meeting_body: Option<String>,
    pub hs_internal_meeting_notes: Option<String>,
    pub hs_meeting_external_url: Option<String>,
    pub hs_meeting_location: Option<String>,
    pub hs_meeting_start_time: Option<String>,
    pub hs_meeting_end_time: Option<String>,
    pub hs_meeting_outcome: Option<String>,
}

impl MeetingProperties {
    pub const SEARCH_FIELDS: &'static [&'static str] = &[
        "hs_timestamp",
        "hubspot_owner_id",
        "hs_meeting_title",
        "hs_meeting_body",
        "hs_internal_meeting_notes",
        "hs_meeting_external_url",
        "hs_meeting_location",
        "hs_meeting_start_time",
        "hs_meeting_end_time",
        "hs_meeting_outcome",
    ];
}

/// Contact summary attached to meeting events; the enrichment cache value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactDetails {
    pub id: String,
    pub email: Option<String>,
    pub contact_name: String,
    pub contact_title: Option<String>,
    pub contact_source: Option<String>,
    pub contact_status: Option<String>,
    pub contact_score: i64,
}

impl ContactDetails {
    pub fn from_record(record: &HubSpotRecord<ContactProperties>) -> Self {
        let props = record.properties.clone().unwrap_or_default();
        Self {
            id: record.id.clone(),
            contact_name: props.full_name(),
            contact_score: props.score(),
            email: props.email,
            contact_title: props.jobtitle,
            contact_source: props.hs_analytics_source,
            contact_status: props.hs_lead_status,
        }
    }
}

/// Response body of `POST /crm/v3/objects/{type}/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage<P> {
    #[serde(default = "Vec::new")]
    pub results: Vec<HubSpotRecord<P>>,
    pub paging: Option<Paging>,
}

impl<P> SearchPage<P> {
    /// The `after` offset of the next page. Missing, non-numeric and zero
    /// offsets all mean there is no next page.
    pub fn next_after(&self) -> Option<u32> {
        self.paging
            .as_ref()
            .and_then(|p| p.next.as_ref())
            .and_then(|n| n.after.trim().parse::<u32>().ok())
            .filter(|after| *after > 0)
    }

    /// Latest `updatedAt` in the page.
    pub fn max_updated_at(&self) -> Option<DateTime<Utc>> {
        self.results.iter().map(|r| r.updated_at).max()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Paging {
    pub next: Option<NextPage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NextPage {
    pub after: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchReadResponse<P> {
    #[serde(default = "Vec::new")]
    pub results: Vec<HubSpotRecord<P>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssociationList {
    #[serde(default)]
    pub results: Vec<AssociatedObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssociatedObject {
    pub id: String,
}

/// Response body of the batch association read endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchAssociationResponse {
    #[serde(default)]
    pub results: Vec<BatchAssociation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchAssociation {
    pub from: Option<AssociatedObject>,
    #[serde(default)]
    pub to: Vec<AssociatedObject>,
}

impl BatchAssociationResponse {
    /// Map each source id to its first associated target id.
    pub fn first_targets(&self) -> HashMap<String, String> {
        self.results
            .iter()
            .filter_map(|a| {
                let from = a.from.as_ref()?;
                let to = a.to.first()?;
                Some((from.id.clone(), to.id.clone()))
            })
            .collect()
    }
}

/// Response body of `POST /oauth/v1/token`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}
