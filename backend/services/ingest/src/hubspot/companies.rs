use async_trait::async_trait;
use chrono::Duration;
use serde_json::{json, Map, Value};

use crmsync_common::types::EntityType;
use crmsync_db::actions::models::{ActionEvent, ActionName};

use super::models::{CompanyProperties, HubSpotRecord};
use crate::connector::{missing_properties, EntityConnector, PageOutcome, PassContext};
use crate::error::SyncError;
use crate::pipeline::properties::clean_properties;

/// Subtracted from company action dates to avoid ordering ties downstream.
const COMPANY_DATE_SKEW_MS: i64 = 2_000;

pub struct CompaniesConnector;

impl CompaniesConnector {
    fn build_event(
        &self,
        ctx: &PassContext<'_>,
        record: &HubSpotRecord<CompanyProperties>,
    ) -> Result<ActionEvent, SyncError> {
        let props = record
            .properties
            .as_ref()
            .ok_or_else(|| missing_properties(&record.id))?;

        let (kind, date) = ctx.classify(record);

        let properties: Map<String, Value> = [
            ("company_id", json!(record.id)),
            ("company_domain", json!(props.domain)),
            ("company_industry", json!(props.industry)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Ok(ActionEvent::new(
            ActionName::new(EntityType::Companies, kind),
            date - Duration::milliseconds(COMPANY_DATE_SKEW_MS),
            None,
            clean_properties(properties),
        ))
    }
}

#[async_trait]
impl EntityConnector for CompaniesConnector {
    type Properties = CompanyProperties;

    fn entity_type(&self) -> EntityType {
        EntityType::Companies
    }

    fn search_properties(&self) -> &'static [&'static str] {
        CompanyProperties::SEARCH_FIELDS
    }

    async fn transform_page(
        &self,
        ctx: &PassContext<'_>,
        records: Vec<HubSpotRecord<CompanyProperties>>,
    ) -> Result<PageOutcome, SyncError> {
        let events = records
            .iter()
            .map(|record| self.build_event(ctx, record))
            .collect::<Vec<_>>();
        ctx.emit_all(events).await
    }
}
