use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crmsync_common::types::EntityType;
use crmsync_db::actions::models::{ActionEvent, ActionName};

use super::models::{ContactProperties, HubSpotRecord};
use crate::connector::{missing_properties, EntityConnector, PageOutcome, PassContext};
use crate::error::SyncError;
use crate::pipeline::properties::clean_properties;

/// Contacts keyed by email, tagged with their primary company.
pub struct ContactsConnector;

impl ContactsConnector {
    fn build_event(
        &self,
        ctx: &PassContext<'_>,
        record: &HubSpotRecord<ContactProperties>,
        companies: &HashMap<String, String>,
    ) -> Result<ActionEvent, SyncError> {
        let props = record
            .properties
            .as_ref()
            .ok_or_else(|| missing_properties(&record.id))?;
        let email = props
            .email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| SyncError::Transform {
                record_id: record.id.clone(),
                reason: "contact has no email".to_string(),
            })?;

        let (kind, action_date) = ctx.classify(record);

        let properties: Map<String, Value> = [
            ("company_id", json!(companies.get(&record.id))),
            ("contact_name", json!(props.full_name())),
            ("contact_title", json!(props.jobtitle)),
            ("contact_source", json!(props.hs_analytics_source)),
            ("contact_status", json!(props.hs_lead_status)),
            ("contact_score", json!(props.score())),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Ok(ActionEvent::new(
            ActionName::new(EntityType::Contacts, kind),
            action_date,
            Some(email.to_string()),
            clean_properties(properties),
        ))
    }
}

#[async_trait]
impl EntityConnector for ContactsConnector {
    type Properties = ContactProperties;

    fn entity_type(&self) -> EntityType {
        EntityType::Contacts
    }

    fn search_properties(&self) -> &'static [&'static str] {
        ContactProperties::SEARCH_FIELDS
    }

    fn modified_date_property(&self) -> &'static str {
        "lastmodifieddate"
    }

    async fn transform_page(
        &self,
        ctx: &PassContext<'_>,
        records: Vec<HubSpotRecord<ContactProperties>>,
    ) -> Result<PageOutcome, SyncError> {
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let ids = ids.as_slice();
        let session = ctx.session;

        let companies = ctx
            .retry
            .execute(
                "contact company associations",
                move || async move {
                    let token = session.access_token().await;
                    session.client().company_associations(&token, ids).await
                },
                || session.refresh_before_retry(),
            )
            .await?;

        let events = records
            .iter()
            .map(|record| self.build_event(ctx, record, &companies))
            .collect::<Vec<_>>();
        ctx.emit_all(events).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{record_json, Harness};
    use chrono::{TimeZone, Utc};
    use crmsync_common::types::ActionKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn contact(id: &str, created: &str, props: Value) -> HubSpotRecord<ContactProperties> {
        serde_json::from_value(record_json(id, created, "2026-03-10T00:00:00Z", props)).unwrap()
    }

    async fn mock_associations(server: &MockServer, body: Value) {
        Mock::given(method("POST"))
            .and(path("/crm/v3/associations/contacts/companies/batch/read"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn builds_contact_events_with_company_and_identity() {
        let server = MockServer::start().await;
        mock_associations(
            &server,
            json!({ "results": [{ "from": { "id": "1" }, "to": [{ "id": "900" }, { "id": "901" }] }] }),
        )
        .await;

        let h = Harness::new(&server);
        let last_pulled = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let records = vec![
            contact(
                "1",
                "2026-03-05T00:00:00Z",
                json!({
                    "email": "ada@example.com",
                    "firstname": "Ada",
                    "lastname": "Lovelace",
                    "jobtitle": "n/a",
                    "hubspotscore": "42",
                    "hs_lead_status": "OPEN"
                }),
            ),
            contact("2", "2026-02-01T00:00:00Z", json!({ "email": "bob@example.com" })),
        ];

        let outcome = ContactsConnector
            .transform_page(&h.ctx(Some(last_pulled)), records)
            .await
            .unwrap();
        assert_eq!(outcome, PageOutcome { emitted: 2, skipped: 0 });

        let events = h.flushed().await;
        assert_eq!(events[0].action_name.kind, ActionKind::Created);
        assert_eq!(events[0].action_name.to_string(), "Contact Created");
        assert_eq!(events[0].identity.as_deref(), Some("ada@example.com"));
        assert_eq!(events[0].action_date, Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 0).unwrap());
        assert_eq!(events[0].properties["company_id"], "900");
        assert_eq!(events[0].properties["contact_name"], "Ada Lovelace");
        assert_eq!(events[0].properties["contact_score"], 42);
        assert!(!events[0].properties.contains_key("contact_title"));

        assert_eq!(events[1].action_name.kind, ActionKind::Updated);
        assert_eq!(events[1].action_date, Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap());
        assert!(!events[1].properties.contains_key("company_id"));
        assert_eq!(events[1].properties["contact_score"], 0);
    }

    #[tokio::test]
    async fn skips_records_without_email_or_properties() {
        let server = MockServer::start().await;
        mock_associations(&server, json!({ "results": [] })).await;

        let h = Harness::new(&server);
        let mut no_props = contact("3", "2026-03-05T00:00:00Z", json!({}));
        no_props.properties = None;
        let records = vec![
            no_props,
            contact("4", "2026-03-05T00:00:00Z", json!({ "firstname": "NoMail" })),
            contact("5", "2026-03-05T00:00:00Z", json!({ "email": "c@example.com" })),
        ];

        let outcome = ContactsConnector.transform_page(&h.ctx(None), records).await.unwrap();
        assert_eq!(outcome, PageOutcome { emitted: 1, skipped: 2 });
        assert_eq!(h.flushed().await.len(), 1);
    }

    #[tokio::test]
    async fn association_failure_aborts_the_page() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/crm/v3/associations/contacts/companies/batch/read"))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&server)
            .await;

        let h = Harness::new(&server);
        let records = vec![contact("6", "2026-03-05T00:00:00Z", json!({ "email": "d@example.com" }))];

        let err = ContactsConnector
            .transform_page(&h.ctx(None), records)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::ExhaustedRetries { attempts: 2, .. }));
        assert!(h.flushed().await.is_empty());
    }
}
