use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crmsync_common::error::{CrmsyncError, CrmsyncResult};
use crmsync_common::types::EntityType;
use crmsync_config::env::{get_parsed_or, get_var, get_var_or};

use super::models::{
    AssociationList, BatchAssociationResponse, BatchReadResponse, HubSpotRecord, SearchPage,
    TokenResponse,
};
use super::query::SearchRequest;

const DEFAULT_BASE_URL: &str = "https://api.hubapi.com";

#[derive(Debug, Clone)]
pub struct HubSpotClientConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout_secs: u64,
}

impl HubSpotClientConfig {
    /// Load HubSpot OAuth app config from environment.
    ///
    /// `HUBSPOT_CID` and `HUBSPOT_CS` are required.
    pub fn from_env() -> CrmsyncResult<Self> {
        let client_id = get_var("HUBSPOT_CID")?;
        let client_secret = get_var("HUBSPOT_CS")?;
        let base_url = get_var_or("HUBSPOT_BASE_URL", DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        let timeout_secs: u64 = get_parsed_or("HUBSPOT_TIMEOUT_SECS", 30)?;
        if timeout_secs == 0 {
            return Err(CrmsyncError::Config(
                "HUBSPOT_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            client_id,
            client_secret,
            timeout_secs,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HubSpotClientError {
    #[error("access token rejected: {body}")]
    Unauthorized { body: String },

    #[error("HTTP {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),
}

/// Thin HubSpot CRM v3 client. Every method performs exactly one HTTP call;
/// retries and rate limiting are layered on by the sync pipeline.
#[derive(Clone)]
pub struct HubSpotClient {
    client: Client,
    config: HubSpotClientConfig,
}

impl HubSpotClient {
    pub fn new(config: HubSpotClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// One page of records modified inside the request's filter window.
    pub async fn search<P>(
        &self,
        access_token: &str,
        entity: EntityType,
        request: &SearchRequest,
    ) -> Result<SearchPage<P>, HubSpotClientError>
    where
        P: DeserializeOwned,
    {
        let url = format!(
            "{}/crm/v3/objects/{}/search",
            self.config.base_url,
            entity.api_name()
        );
        let req = self.client.post(url).bearer_auth(access_token).json(request);
        send_json(req).await
    }

    pub async fn get_by_id<P>(
        &self,
        access_token: &str,
        entity: EntityType,
        id: &str,
        properties: &[&str],
    ) -> Result<HubSpotRecord<P>, HubSpotClientError>
    where
        P: DeserializeOwned,
    {
        let url = format!(
            "{}/crm/v3/objects/{}/{}",
            self.config.base_url,
            entity.api_name(),
            id
        );
        let req = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .query(&[("properties", properties.join(","))]);
        send_json(req).await
    }

    pub async fn batch_read<P>(
        &self,
        access_token: &str,
        entity: EntityType,
        ids: &[String],
        properties: &[&str],
    ) -> Result<Vec<HubSpotRecord<P>>, HubSpotClientError>
    where
        P: DeserializeOwned,
    {
        let url = format!(
            "{}/crm/v3/objects/{}/batch/read",
            self.config.base_url,
            entity.api_name()
        );
        let body = serde_json::json!({
            "inputs": ids.iter().map(|id| serde_json::json!({ "id": id })).collect::<Vec<_>>(),
            "properties": properties,
        });
        let req = self.client.post(url).bearer_auth(access_token).json(&body);
        let resp: BatchReadResponse<P> = send_json(req).await?;
        Ok(resp.results)
    }

    /// Ids of `target` objects associated with one record.
    pub async fn associations(
        &self,
        access_token: &str,
        entity: EntityType,
        id: &str,
        target: EntityType,
    ) -> Result<Vec<String>, HubSpotClientError> {
        let url = format!(
            "{}/crm/v3/objects/{}/{}/associations/{}",
            self.config.base_url,
            entity.api_name(),
            id,
            target.api_name()
        );
        let req = self.client.get(url).bearer_auth(access_token);
        let list: AssociationList = send_json(req).await?;
        Ok(list.results.into_iter().map(|a| a.id).collect())
    }

    /// Contact id → first associated company id, for one page of contacts.
    pub async fn company_associations(
        &self,
        access_token: &str,
        contact_ids: &[String],
    ) -> Result<HashMap<String, String>, HubSpotClientError> {
        if contact_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let url = format!(
            "{}/crm/v3/associations/contacts/companies/batch/read",
            self.config.base_url
        );
        let body = serde_json::json!({
            "inputs": contact_ids.iter().map(|id| serde_json::json!({ "id": id })).collect::<Vec<_>>(),
        });
        let req = self.client.post(url).bearer_auth(access_token).json(&body);
        let resp: BatchAssociationResponse = send_json(req).await?;
        Ok(resp.first_targets())
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, HubSpotClientError> {
        let url = format!("{}/oauth/v1/token", self.config.base_url);
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];
        let req = self.client.post(url).form(&form);
        send_json(req).await
    }
}

async fn send_json<T>(req: RequestBuilder) -> Result<T, HubSpotClientError>
where
    T: DeserializeOwned,
{
    let response = req.send().await?;
    let status = response.status();

    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(HubSpotClientError::RequestError);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED {
        return Err(HubSpotClientError::Unauthorized { body });
    }
    Err(HubSpotClientError::HttpError { status, body })
}

#[cfg(test)]
pub(crate) fn test_config(base_url: &str) -> HubSpotClientConfig {
    HubSpotClientConfig {
        base_url: base_url.to_string(),
        client_id: "cid".to_string(),
        client_secret: "secret".to_string(),
        timeout_secs: 5,
    }
}
