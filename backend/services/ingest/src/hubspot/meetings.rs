use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{json, Map, Value};

use crmsync_common::types::EntityType;
use crmsync_db::actions::models::{ActionEvent, ActionName};

use super::models::{ContactDetails, ContactProperties, HubSpotRecord, MeetingProperties};
use crate::connector::{missing_properties, EntityConnector, PageOutcome, PassContext};
use crate::error::SyncError;
use crate::pipeline::cache::EnrichmentCache;
use crate::pipeline::properties::clean_properties;
use crate::pipeline::rate_limiter::RateLimiter;

pub type ContactCache = EnrichmentCache<String, ContactDetails>;

/// Meetings enriched with the details of their associated contacts.
///
/// A page is processed in sub-batches of `batch_size` meetings run
/// concurrently; each sub-batch finishes before the next starts. Every
/// association and contact lookup goes through the shared rate limiter,
/// and contact details are served from the cache when present. Lookup
/// failures are logged and leave the meeting with fewer contacts.
pub struct MeetingsConnector {
    limiter: Arc<RateLimiter>,
    cache: Arc<ContactCache>,
    batch_size: usize,
}

impl MeetingsConnector {
    pub fn new(limiter: Arc<RateLimiter>, cache: Arc<ContactCache>, batch_size: usize) -> Self {
        Self {
            limiter,
            cache,
            batch_size: batch_size.max(1),
        }
    }

    async fn build_event(
        &self,
        ctx: &PassContext<'_>,
        record: &HubSpotRecord<MeetingProperties>,
    ) -> Result<ActionEvent, SyncError> {
        let props = record
            .properties
            .as_ref()
            .ok_or_else(|| missing_properties(&record.id))?;

        let (kind, date) = ctx.classify(record);
        let contact_ids = self.associated_contacts(ctx, &record.id).await;
        let contacts = self.contact_details(ctx, &contact_ids).await;
        let contact_details = serde_json::to_value(&contacts).map_err(|e| SyncError::Transform {
            record_id: record.id.clone(),
            reason: e.to_string(),
        })?;

        tracing::debug!(
            meeting_id = %record.id,
            contacts = contacts.len(),
            "meeting enriched"
        );

        let properties: Map<String, Value> = [
            ("meeting_id", json!(record.id)),
            ("meeting_title", json!(props.hs_meeting_title)),
            ("meeting_description", json!(props.hs_meeting_body)),
            ("hs_meeting_outcome", json!(props.hs_meeting_outcome)),
            ("meeting_notes", json!(props.hs_internal_meeting_notes)),
            ("meeting_start_time", json!(props.hs_meeting_start_time)),
            ("meeting_end_time", json!(props.hs_meeting_end_time)),
            ("contact_details", contact_details),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Ok(ActionEvent::new(
            ActionName::new(EntityType::Meetings, kind),
            date,
            Some(record.id.clone()),
            clean_properties(properties),
        ))
    }

    async fn associated_contacts(&self, ctx: &PassContext<'_>, meeting_id: &str) -> Vec<String> {
        let session = ctx.session;
        let token = session.access_token().await;
        let result = self
            .limiter
            .run(|| {
                session
                    .client()
                    .associations(&token, EntityType::Meetings, meeting_id, EntityType::Contacts)
            })
            .await;

        match result {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(
                    hub_id = %session.hub_id(),
                    meeting_id,
                    error = %e,
                    "failed to load meeting contacts"
                );
                Vec::new()
            }
        }
    }

    fn cache_key(ctx: &PassContext<'_>, contact_id: &str) -> String {
        format!("{}:{}", ctx.session.hub_id(), contact_id)
    }

    /// Details for `contact_ids`, in order, omitting any that could not be loaded.
    async fn contact_details(&self, ctx: &PassContext<'_>, contact_ids: &[String]) -> Vec<ContactDetails> {
        let mut found: HashMap<String, ContactDetails> = HashMap::new();
        let mut misses: Vec<String> = Vec::new();
        for id in contact_ids {
            match self.cache.get(&Self::cache_key(ctx, id)).await {
                Some(details) => {
                    found.insert(id.clone(), details);
                }
                None => misses.push(id.clone()),
            }
        }

        if !misses.is_empty() {
            for details in self.fetch_contacts(ctx, &misses).await {
                self.cache
                    .insert(Self::cache_key(ctx, &details.id), details.clone())
                    .await;
                found.insert(details.id.clone(), details);
            }
        }

        contact_ids.iter().filter_map(|id| found.remove(id)).collect()
    }

    async fn fetch_contacts(&self, ctx: &PassContext<'_>, ids: &[String]) -> Vec<ContactDetails> {
        let session = ctx.session;
        let client = session.client();
        let token = session.access_token().await;
        let fields = ContactProperties::DETAIL_FIELDS;

        let result = match ids {
            [id] => self
                .limiter
                .run(|| client.get_by_id::<ContactProperties>(&token, EntityType::Contacts, id, fields))
                .await
                .map(|record| vec![record]),
            _ => {
                self.limiter
                    .run(|| client.batch_read::<ContactProperties>(&token, EntityType::Contacts, ids, fields))
                    .await
            }
        };

        match result {
            Ok(records) => records.iter().map(ContactDetails::from_record).collect(),
            Err(e) => {
                tracing::warn!(
                    hub_id = %session.hub_id(),
                    count = ids.len(),
                    error = %e,
                    "failed to load contact details"
                );
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl EntityConnector for MeetingsConnector {
    type Properties = MeetingProperties;

    fn entity_type(&self) -> EntityType {
        EntityType::Meetings
    }

    fn search_properties(&self) -> &'static [&'static str] {
        MeetingProperties::SEARCH_FIELDS
    }

    async fn transform_page(
        &self,
        ctx: &PassContext<'_>,
        records: Vec<HubSpotRecord<MeetingProperties>>,
    ) -> Result<PageOutcome, SyncError> {
        let mut outcome = PageOutcome::default();
        for batch in records.chunks(self.batch_size) {
            let events = join_all(batch.iter().map(|record| self.build_event(ctx, record))).await;
            let batch_outcome = ctx.emit_all(events).await?;
            outcome.emitted += batch_outcome.emitted;
            outcome.skipped += batch_outcome.skipped;
        }
        Ok(outcome)
    }
}
