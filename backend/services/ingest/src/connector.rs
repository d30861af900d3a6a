use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crmsync_common::types::{ActionKind, EntityType};
use crmsync_db::actions::models::ActionEvent;

use crate::error::SyncError;
use crate::hubspot::models::HubSpotRecord;
use crate::hubspot::session::AccountSession;
use crate::pipeline::batch_queue::BatchQueue;
use crate::pipeline::retry::RetryExecutor;

/// Per-pass state handed to a connector for each page.
pub struct PassContext<'a> {
    pub session: &'a AccountSession,
    /// Watermark read at pass start; `None` on the first sync.
    pub last_pulled: Option<DateTime<Utc>>,
    pub queue: &'a BatchQueue,
    pub retry: &'a RetryExecutor,
}

impl PassContext<'_> {
    /// `Created` (dated `createdAt`) when the record was created after the
    /// watermark or there is no watermark yet, otherwise `Updated` (dated
    /// `updatedAt`).
    pub fn classify<P>(&self, record: &HubSpotRecord<P>) -> (ActionKind, DateTime<Utc>) {
        match self.last_pulled {
            Some(last) if record.created_at <= last => (ActionKind::Updated, record.updated_at),
            _ => (ActionKind::Created, record.created_at),
        }
    }

    /// Push events in order, counting transform skips instead of failing.
    pub async fn emit_all(
        &self,
        results: Vec<Result<ActionEvent, SyncError>>,
    ) -> Result<PageOutcome, SyncError> {
        let mut outcome = PageOutcome::default();
        for result in results {
            match result {
                Ok(event) => {
                    self.queue.push(event).await?;
                    outcome.emitted += 1;
                }
                Err(e @ SyncError::Transform { .. }) => {
                    tracing::debug!(hub_id = %self.session.hub_id(), error = %e, "record skipped");
                    outcome.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(outcome)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageOutcome {
    pub emitted: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassResult {
    pub entity: EntityType,
    pub pages: usize,
    pub emitted: usize,
    pub skipped: usize,
}

impl PassResult {
    pub fn new(entity: EntityType) -> Self {
        Self {
            entity,
            pages: 0,
            emitted: 0,
            skipped: 0,
        }
    }

    pub fn record_page(&mut self, outcome: PageOutcome) {
        self.pages += 1;
        self.emitted += outcome.emitted;
        self.skipped += outcome.skipped;
    }
}

/// One HubSpot object type: what to search for and how a page of records
/// becomes action events.
#[async_trait]
pub trait EntityConnector: Send + Sync {
    type Properties: DeserializeOwned + Send + Sync + 'static;

    fn entity_type(&self) -> EntityType;

    fn search_properties(&self) -> &'static [&'static str];

    /// Property used for the modified-date window and the ascending sort.
    fn modified_date_property(&self) -> &'static str {
        "hs_lastmodifieddate"
    }

    /// Transform one page and push its events into `ctx.queue`.
    async fn transform_page(
        &self,
        ctx: &PassContext<'_>,
        records: Vec<HubSpotRecord<Self::Properties>>,
    ) -> Result<PageOutcome, SyncError>;
}

pub(crate) fn missing_properties(record_id: &str) -> SyncError {
    SyncError::Transform {
        record_id: record_id.to_string(),
        reason: "no properties payload".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use chrono::TimeZone;
    use wiremock::MockServer;

    fn record(created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> HubSpotRecord<()> {
        HubSpotRecord {
            id: "r-1".to_string(),
            created_at,
            updated_at,
            properties: None,
        }
    }

    #[tokio::test]
    async fn classify_compares_creation_strictly_after_watermark() {
        let server = MockServer::start().await;
        let h = Harness::new(&server);
        let watermark = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let updated = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();
        let ctx = h.ctx(Some(watermark));

        assert_eq!(
            ctx.classify(&record(watermark, updated)),
            (ActionKind::Updated, updated),
            "created exactly at the watermark is an update"
        );

        let just_after = watermark + chrono::Duration::milliseconds(1);
        assert_eq!(
            ctx.classify(&record(just_after, updated)),
            (ActionKind::Created, just_after)
        );

        let before = watermark - chrono::Duration::days(30);
        assert_eq!(
            ctx.classify(&record(before, updated)),
            (ActionKind::Updated, updated)
        );
    }

    #[tokio::test]
    async fn classify_without_watermark_is_created() {
        let server = MockServer::start().await;
        let h = Harness::new(&server);
        let created = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let updated = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(
            h.ctx(None).classify(&record(created, updated)),
            (ActionKind::Created, created)
        );
    }
}
