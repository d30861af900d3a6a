use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crmsync_common::error::CrmsyncResult;
use crmsync_config::RetryPolicy;
use crmsync_db::actions::models::ActionEvent;
use crmsync_db::actions::repositories::ActionRepository;
use wiremock::MockServer;

use crate::connector::PassContext;
use crate::hubspot::client::{test_config, HubSpotClient};
use crate::hubspot::session::AccountSession;
use crate::pipeline::batch_queue::BatchQueue;
use crate::pipeline::retry::RetryExecutor;

/// Action sink that keeps every flushed event.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<ActionEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ActionEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionRepository for RecordingSink {
    async fn append_actions(&self, actions: &[ActionEvent]) -> CrmsyncResult<usize> {
        self.events.lock().unwrap().extend_from_slice(actions);
        Ok(actions.len())
    }
}

/// Everything a connector needs for one pass, wired to a mock server.
pub struct Harness {
    pub session: AccountSession,
    pub queue: BatchQueue,
    pub retry: RetryExecutor,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new(server: &MockServer) -> Self {
        let client = HubSpotClient::new(test_config(&server.uri())).unwrap();
        let sink = Arc::new(RecordingSink::default());
        Self {
            session: AccountSession::new("hub-1", client, "at", "rt"),
            queue: BatchQueue::new(sink.clone(), 100, 64),
            retry: RetryExecutor::new(RetryPolicy {
                max_retries: 1,
                backoff_base_ms: 1,
            }),
            sink,
        }
    }

    pub fn ctx(&self, last_pulled: Option<DateTime<Utc>>) -> PassContext<'_> {
        PassContext {
            session: &self.session,
            last_pulled,
            queue: &self.queue,
            retry: &self.retry,
        }
    }

    /// Drain the queue and return everything the sink received.
    pub async fn flushed(&self) -> Vec<ActionEvent> {
        self.queue.drain().await.unwrap();
        self.sink.events()
    }
}

pub fn record_json(id: &str, created_at: &str, updated_at: &str, properties: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "createdAt": created_at,
        "updatedAt": updated_at,
        "properties": properties,
    })
}
