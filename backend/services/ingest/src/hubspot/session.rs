use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use super::client::{HubSpotClient, HubSpotClientError};

#[derive(Debug, Clone)]
struct Credentials {
    access_token: String,
    refresh_token: String,
    expires_at: Option<DateTime<Utc>>,
}

/// Credential state for one HubSpot account.
///
/// All refreshes go through one async mutex. Each successful refresh bumps a
/// generation counter; a coalesced caller notes the generation before
/// queueing on the lock and skips its own refresh if it changed meanwhile,
/// so concurrent failures trigger a single refresh.
pub struct AccountSession {
    hub_id: String,
    client: HubSpotClient,
    credentials: Mutex<Credentials>,
    generation: AtomicU64,
}

impl AccountSession {
    pub fn new(
        hub_id: impl Into<String>,
        client: HubSpotClient,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            hub_id: hub_id.into(),
            client,
            credentials: Mutex::new(Credentials {
                access_token: access_token.into(),
                refresh_token: refresh_token.into(),
                expires_at: None,
            }),
            generation: AtomicU64::new(0),
        }
    }

    pub fn hub_id(&self) -> &str {
        &self.hub_id
    }

    pub fn client(&self) -> &HubSpotClient {
        &self.client
    }

    pub async fn access_token(&self) -> String {
        self.credentials.lock().await.access_token.clone()
    }

    /// Current `(access_token, refresh_token)` pair, for writing back to the account.
    pub async fn tokens(&self) -> (String, String) {
        let creds = self.credentials.lock().await;
        (creds.access_token.clone(), creds.refresh_token.clone())
    }

    /// Unconditionally exchange the refresh token for a new access token.
    pub async fn refresh(&self) -> Result<(), HubSpotClientError> {
        let mut creds = self.credentials.lock().await;
        self.refresh_locked(&mut creds).await
    }

    /// Refresh unless another caller completed one while this call waited
    /// for the lock. Returns whether this call performed the refresh.
    pub async fn refresh_coalesced(&self) -> Result<bool, HubSpotClientError> {
        let seen = self.generation.load(Ordering::Acquire);
        let mut creds = self.credentials.lock().await;
        if self.generation.load(Ordering::Acquire) != seen {
            return Ok(false);
        }
        self.refresh_locked(&mut creds).await?;
        Ok(true)
    }

    /// Retry hook: refresh before every retry, logging instead of failing so
    /// the next attempt still runs.
    pub async fn refresh_before_retry(&self) {
        if let Err(e) = self.refresh_coalesced().await {
            tracing::warn!(hub_id = %self.hub_id, error = %e, "token refresh before retry failed");
        }
    }

    async fn refresh_locked(&self, creds: &mut Credentials) -> Result<(), HubSpotClientError> {
        let token = self
            .client
            .refresh_access_token(&creds.refresh_token)
            .await?;

        creds.expires_at = Some(Utc::now() + Duration::seconds(token.expires_in));
        if token.access_token != creds.access_token {
            creds.access_token = token.access_token;
        }
        if let Some(refresh_token) = token.refresh_token {
            creds.refresh_token = refresh_token;
        }
        self.generation.fetch_add(1, Ordering::AcqRel);

        tracing::debug!(hub_id = %self.hub_id, expires_at = ?creds.expires_at, "access token refreshed");
        Ok(())
    }
}
