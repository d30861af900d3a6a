use std::sync::Arc;

use chrono::Utc;

use crmsync_common::types::EntityType;
use crmsync_config::SyncConfig;
use crmsync_db::actions::repositories::ActionRepository;
use crmsync_db::domain::models::HubSpotAccount;
use crmsync_db::domain::repositories::DomainRepository;

use crate::connector::{EntityConnector, PassContext, PassResult};
use crate::error::SyncError;
use crate::hubspot::client::HubSpotClient;
use crate::hubspot::companies::CompaniesConnector;
use crate::hubspot::contacts::ContactsConnector;
use crate::hubspot::meetings::{ContactCache, MeetingsConnector};
use crate::hubspot::models::SearchPage;
use crate::hubspot::query::SearchRequest;
use crate::hubspot::session::AccountSession;
use crate::pipeline::batch_queue::{BatchQueue, DrainReport};
use crate::pipeline::paginator::{Advance, Cursor, CursorPaginator};
use crate::pipeline::rate_limiter::RateLimiter;
use crate::pipeline::retry::RetryExecutor;

#[derive(Debug)]
pub struct AccountSummary {
    pub hub_id: String,
    pub passes: Vec<PassResult>,
    pub failed: Vec<EntityType>,
    /// `None` when the final drain failed.
    pub drained: Option<DrainReport>,
    pub saved: bool,
}

impl AccountSummary {
    fn new(hub_id: String) -> Self {
        Self {
            hub_id,
            passes: Vec::new(),
            failed: Vec::new(),
            drained: None,
            saved: false,
        }
    }

    fn record(&mut self, entity: EntityType, result: Result<PassResult, SyncError>) {
        match result {
            Ok(pass) => {
                tracing::info!(
                    hub_id = %self.hub_id,
                    entity = %entity,
                    pages = pass.pages,
                    emitted = pass.emitted,
                    skipped = pass.skipped,
                    "pass completed"
                );
                self.passes.push(pass);
            }
            Err(e) => {
                tracing::error!(hub_id = %self.hub_id, entity = %entity, error = %e, "pass aborted");
                self.failed.push(entity);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub accounts: Vec<AccountSummary>,
}

/// Drives a full sync of every HubSpot account in the domain.
///
/// Per account the entity types run one after another (contacts,
/// companies, meetings), all feeding one batch queue that is drained at
/// the end. A failed pass is logged and leaves its watermark untouched;
/// the remaining passes and accounts still run.
pub struct SyncWorker<D> {
    domains: D,
    sink: Arc<dyn ActionRepository>,
    client: HubSpotClient,
    config: SyncConfig,
    retry: RetryExecutor,
    contacts: ContactsConnector,
    companies: CompaniesConnector,
    meetings: MeetingsConnector,
}

impl<D> SyncWorker<D>
where
    D: DomainRepository,
{
    pub fn new(
        domains: D,
        sink: Arc<dyn ActionRepository>,
        client: HubSpotClient,
        config: SyncConfig,
        limiter: Arc<RateLimiter>,
        cache: Arc<ContactCache>,
    ) -> Self {
        let meetings = MeetingsConnector::new(limiter, cache, config.meeting_batch_size);
        Self {
            domains,
            sink,
            client,
            retry: RetryExecutor::new(config.retry),
            config,
            contacts: ContactsConnector,
            companies: CompaniesConnector,
            meetings,
        }
    }

    pub async fn run(&self) -> Result<RunSummary, SyncError> {
        let mut domain = self.domains.load_domain().await?;
        tracing::info!(domain_id = %domain.id, accounts = domain.accounts.len(), "sync run started");

        let mut summary = RunSummary::default();
        for index in 0..domain.accounts.len() {
            let mut account_summary = self.sync_account(&mut domain.accounts[index]).await;

            domain.updated_at = Utc::now();
            account_summary.saved = match self.domains.save_domain(&domain).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!(hub_id = %account_summary.hub_id, error = %e, "failed to save domain");
                    false
                }
            };
            summary.accounts.push(account_summary);
        }

        tracing::info!(domain_id = %domain.id, "sync run finished");
        Ok(summary)
    }

    async fn sync_account(&self, account: &mut HubSpotAccount) -> AccountSummary {
        let hub_id = account.hub_id.clone();
        let mut summary = AccountSummary::new(hub_id.clone());
        let watermarks_before = account.last_pulled_dates.clone();

        let session = AccountSession::new(
            hub_id.clone(),
            self.client.clone(),
            account.access_token.clone(),
            account.refresh_token.clone(),
        );
        if let Err(e) = session.refresh().await {
            tracing::warn!(hub_id = %hub_id, error = %e, "token refresh failed, continuing with stored token");
        }

        let queue = BatchQueue::new(
            Arc::clone(&self.sink),
            self.config.flush_threshold,
            self.config.queue_capacity,
        );

        let result = self.run_pass(&self.contacts, &session, account, &queue).await;
        summary.record(EntityType::Contacts, result);
        let result = self.run_pass(&self.companies, &session, account, &queue).await;
        summary.record(EntityType::Companies, result);
        let result = self.run_pass(&self.meetings, &session, account, &queue).await;
        summary.record(EntityType::Meetings, result);

        match queue.drain().await {
            Ok(report) => {
                tracing::info!(hub_id = %hub_id, flushes = report.flushes, items = report.items, "queue drained");
                summary.drained = Some(report);
            }
            Err(e) => {
                // events from this run never reached the sink; pull them again next run
                tracing::error!(hub_id = %hub_id, error = %e, "queue drain failed, keeping previous watermarks");
                account.last_pulled_dates = watermarks_before;
            }
        }

        let (access_token, refresh_token) = session.tokens().await;
        account.access_token = access_token;
        account.refresh_token = refresh_token;

        summary
    }

    /// One (account, entity type) pass: page through everything modified
    /// since the watermark, transform each page, and advance the watermark
    /// to the pass start time once the last page is done.
    pub async fn run_pass<C>(
        &self,
        connector: &C,
        session: &AccountSession,
        account: &mut HubSpotAccount,
        queue: &BatchQueue,
    ) -> Result<PassResult, SyncError>
    where
        C: EntityConnector,
    {
        let entity = connector.entity_type();
        let started_at = Utc::now();
        let last_pulled = account.last_pulled(entity);
        let paginator = CursorPaginator::new(
            connector.modified_date_property(),
            self.config.overflow_threshold,
        );
        let ctx = PassContext {
            session,
            last_pulled,
            queue,
            retry: &self.retry,
        };
        let operation = format!("search {entity}");

        tracing::debug!(hub_id = %session.hub_id(), entity = %entity, ?last_pulled, "pass started");

        let mut result = PassResult::new(entity);
        let mut cursor = Cursor::default();
        loop {
            let request = SearchRequest::new(
                paginator.next_filter(&cursor, last_pulled, started_at),
                paginator.property_name(),
                connector.search_properties(),
                self.config.page_limit,
                cursor.after,
            );
            let request = &request;

            let page: SearchPage<C::Properties> = self
                .retry
                .execute(
                    &operation,
                    move || async move {
                        let token = session.access_token().await;
                        session
                            .client()
                            .search::<C::Properties>(&token, entity, request)
                            .await
                    },
                    || session.refresh_before_retry(),
                )
                .await?;

            let next_after = page.next_after();
            let max_updated_at = page.max_updated_at();
            tracing::debug!(
                hub_id = %session.hub_id(),
                entity = %entity,
                after = cursor.after,
                records = page.results.len(),
                "page fetched"
            );

            let outcome = connector.transform_page(&ctx, page.results).await?;
            result.record_page(outcome);

            match paginator.advance(&cursor, next_after, max_updated_at) {
                Advance::Next(next) => cursor = next,
                Advance::Completed => break,
            }
        }

        account.last_pulled_dates.insert(entity, started_at);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hubspot::client::test_config;
    use crate::test_support::RecordingSink;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone};
    use crmsync_common::error::{CrmsyncError, CrmsyncResult};
    use crmsync_config::{LimiterConfig, RetryPolicy};
    use crmsync_db::actions::models::ActionEvent;
    use crmsync_db::domain::models::Domain;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Clone)]
    struct InMemoryDomains {
        domain: Arc<Mutex<Domain>>,
        saves: Arc<AtomicUsize>,
    }

    impl InMemoryDomains {
        fn new(accounts: Vec<HubSpotAccount>) -> Self {
            let now = Utc::now();
            Self {
                domain: Arc::new(Mutex::new(Domain {
                    id: Uuid::new_v4(),
                    api_key: None,
                    accounts,
                    created_at: now,
                    updated_at: now,
                })),
                saves: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn account(&self, index: usize) -> HubSpotAccount {
            self.domain.lock().unwrap().accounts[index].clone()
        }
    }

    #[async_trait]
    impl DomainRepository for InMemoryDomains {
        async fn load_domain(&self) -> CrmsyncResult<Domain> {
            Ok(self.domain.lock().unwrap().clone())
        }

        async fn save_domain(&self, domain: &Domain) -> CrmsyncResult<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.domain.lock().unwrap() = domain.clone();
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl ActionRepository for FailingSink {
        async fn append_actions(&self, _actions: &[ActionEvent]) -> CrmsyncResult<usize> {
            Err(CrmsyncError::Database("sink unavailable".to_string()))
        }
    }

    fn account(last_pulled: BTreeMap<EntityType, DateTime<Utc>>) -> HubSpotAccount {
        HubSpotAccount {
            hub_id: "4411".to_string(),
            access_token: "at-old".to_string(),
            refresh_token: "rt-old".to_string(),
            last_pulled_dates: last_pulled,
        }
    }

    fn worker(
        server: &MockServer,
        domains: InMemoryDomains,
        sink: Arc<dyn ActionRepository>,
    ) -> SyncWorker<InMemoryDomains> {
        let config = SyncConfig {
            retry: RetryPolicy {
                max_retries: 4,
                backoff_base_ms: 1,
            },
            ..SyncConfig::default()
        };
        let limiter = Arc::new(RateLimiter::new(LimiterConfig::default()));
        let cache = Arc::new(ContactCache::new(Duration::from_secs(3_600), 1_000));
        let client = HubSpotClient::new(test_config(&server.uri())).unwrap();
        SyncWorker::new(domains, sink, client, config, limiter, cache)
    }

    fn contacts_page(ids: std::ops::Range<usize>, next_after: Option<&str>) -> Value {
        let results: Vec<Value> = ids
            .map(|i| {
                json!({
                    "id": i.to_string(),
                    "createdAt": "2026-03-05T00:00:00Z",
                    "updatedAt": "2026-03-06T00:00:00Z",
                    "properties": { "email": format!("c{i}@example.com"), "firstname": "C" }
                })
            })
            .collect();
        match next_after {
            Some(after) => json!({ "results": results, "paging": { "next": { "after": after } } }),
            None => json!({ "results": results }),
        }
    }

    async fn mount_oauth(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/oauth/v1/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at-new",
                "refresh_token": "rt-new",
                "expires_in": 1800
            })))
            .mount(server)
            .await;
    }

    async fn mount_empty_search(server: &MockServer, entity: &str) {
        Mock::given(method("POST"))
            .and(path(format!("/crm/v3/objects/{entity}/search")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
            .mount(server)
            .await;
    }

    async fn mount_contact_pages(server: &MockServer) {
        let search = "/crm/v3/objects/contacts/search";
        Mock::given(method("POST"))
            .and(path(search))
            .and(body_partial_json(json!({ "after": "100" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(contacts_page(100..200, Some("200"))))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path(search))
            .and(body_partial_json(json!({ "after": "200" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(contacts_page(0..0, None)))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path(search))
            .respond_with(ResponseTemplate::new(200).set_body_json(contacts_page(0..100, Some("100"))))
            .up_to_n_times(1)
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/crm/v3/associations/contacts/companies/batch/read"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn two_full_contact_pages_yield_two_hundred_events() {
        let server = MockServer::start().await;
        mount_oauth(&server).await;
        mount_contact_pages(&server).await;
        mount_empty_search(&server, "companies").await;
        mount_empty_search(&server, "meetings").await;

        let domains = InMemoryDomains::new(vec![account(BTreeMap::new())]);
        let sink = Arc::new(RecordingSink::default());
        let w = worker(&server, domains.clone(), sink.clone());

        let before = Utc::now();
        let summary = w.run().await.unwrap();
        let after = Utc::now();

        let events = sink.events();
        assert_eq!(events.len(), 200);
        let mut identities: Vec<String> = events.iter().filter_map(|e| e.identity.clone()).collect();
        identities.sort();
        identities.dedup();
        assert_eq!(identities.len(), 200);
        assert!(events.iter().all(|e| e.action_name.to_string() == "Contact Created"));

        assert_eq!(domains.saves.load(Ordering::SeqCst), 1);

        let saved = domains.account(0);
        let contacts_at = saved.last_pulled(EntityType::Contacts).unwrap();
        assert!(contacts_at >= before && contacts_at <= after);
        assert!(saved.last_pulled(EntityType::Companies).is_some());
        assert!(saved.last_pulled(EntityType::Meetings).is_some());
        assert_eq!(saved.access_token, "at-new");
        assert_eq!(saved.refresh_token, "rt-new");

        let account_summary = &summary.accounts[0];
        assert_eq!(account_summary.passes[0].pages, 3);
        assert_eq!(account_summary.passes[0].emitted, 200);
        assert!(account_summary.failed.is_empty());
        assert_eq!(account_summary.drained.map(|d| d.items), Some(200));
        assert!(account_summary.saved);
    }

    #[tokio::test]
    async fn exhausted_pass_keeps_its_watermark_and_siblings_continue() {
        let server = MockServer::start().await;
        mount_oauth(&server).await;
        mount_empty_search(&server, "contacts").await;
        mount_empty_search(&server, "meetings").await;
        Mock::given(method("POST"))
            .and(path("/crm/v3/objects/companies/search"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(5)
            .mount(&server)
            .await;

        let old = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let watermarks: BTreeMap<EntityType, DateTime<Utc>> =
            EntityType::ALL.iter().map(|e| (*e, old)).collect();
        let domains = InMemoryDomains::new(vec![account(watermarks)]);
        let w = worker(&server, domains.clone(), Arc::new(RecordingSink::default()));

        let summary = w.run().await.unwrap();

        let saved = domains.account(0);
        assert_eq!(saved.last_pulled(EntityType::Companies), Some(old));
        assert!(saved.last_pulled(EntityType::Contacts).unwrap() > old);
        assert!(saved.last_pulled(EntityType::Meetings).unwrap() > old);
        assert_eq!(summary.accounts[0].failed, vec![EntityType::Companies]);
        assert_eq!(domains.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_drain_rolls_back_watermarks_but_saves_tokens() {
        let server = MockServer::start().await;
        mount_oauth(&server).await;
        Mock::given(method("POST"))
            .and(path("/crm/v3/objects/contacts/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(contacts_page(0..5, None)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/crm/v3/associations/contacts/companies/batch/read"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
            .mount(&server)
            .await;
        mount_empty_search(&server, "companies").await;
        mount_empty_search(&server, "meetings").await;

        let domains = InMemoryDomains::new(vec![account(BTreeMap::new())]);
        let w = worker(&server, domains.clone(), Arc::new(FailingSink));

        let summary = w.run().await.unwrap();

        let saved = domains.account(0);
        assert!(saved.last_pulled_dates.is_empty());
        assert_eq!(saved.access_token, "at-new");
        assert!(summary.accounts[0].failed.is_empty());
        assert!(summary.accounts[0].drained.is_none());
        assert!(summary.accounts[0].saved);
    }

    #[tokio::test]
    async fn every_account_is_synced_and_saved() {
        let server = MockServer::start().await;
        mount_oauth(&server).await;
        for entity in ["contacts", "companies", "meetings"] {
            mount_empty_search(&server, entity).await;
        }

        let mut second = account(BTreeMap::new());
        second.hub_id = "5522".to_string();
        let domains = InMemoryDomains::new(vec![account(BTreeMap::new()), second]);
        let w = worker(&server, domains.clone(), Arc::new(RecordingSink::default()));

        let summary = w.run().await.unwrap();

        assert_eq!(summary.accounts.len(), 2);
        assert_eq!(summary.accounts[1].hub_id, "5522");
        assert_eq!(domains.saves.load(Ordering::SeqCst), 2);
        assert_eq!(domains.account(1).last_pulled_dates.len(), 3);
    }
}
