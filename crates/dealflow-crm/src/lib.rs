//! HTTP client for the CRM system of record
//!
//! Collections live under `{base_url}/{collection}`, records under
//! `{base_url}/{collection}/{id}` and remote computations under
//! `{base_url}/actions/{action}`. Every request carries the caller's bearer
//! token.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use dealflow_core::{Credential, ExternalId, ExternalSystem, Fields, RemoteError, RemoteRecord};

/// Configuration for the CRM client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmClientConfig {
    /// Base URL of the CRM API
    pub base_url: String,
    /// Timeout in seconds for HTTP requests
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Response field holding the id of a created record
    #[serde(default = "default_id_field")]
    pub id_field: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_id_field() -> String {
    "id".to_string()
}

impl Default for CrmClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            timeout_secs: default_timeout_secs(),
            id_field: default_id_field(),
        }
    }
}

/// CRM client over HTTP
#[derive(Debug, Clone)]
pub struct HttpCrmClient {
    config: CrmClientConfig,
    client: Client,
}

impl HttpCrmClient {
    /// Create a client with the given configuration
    pub fn new(config: CrmClientConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RemoteError::unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Create a client for a base URL with default settings
    pub fn with_url(base_url: impl Into<String>) -> Result<Self, RemoteError> {
        Self::new(CrmClientConfig {
            base_url: base_url.into(),
            ..Default::default()
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn send(
        &self,
        request: RequestBuilder,
        credential: &Credential,
    ) -> Result<Response, RemoteError> {
        request
            .bearer_auth(credential.token())
            .send()
            .await
            .map_err(map_http_error)
    }
}

/// Maps a transport error; none of them produced a usable response
fn map_http_error(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::unavailable(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        RemoteError::unavailable(format!("Connection error: {}", error))
    } else {
        RemoteError::unavailable(format!("HTTP error: {}", error))
    }
}

/// Classify a non-success response, preferring the message the CRM returned
async fn error_from_response(response: Response) -> RemoteError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| {
            ["message", "error"]
                .iter()
                .find_map(|key| body.get(key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or(text);
    RemoteError::from_status(status, message)
}

/// Read a JSON body from a success response; an empty body reads as `null`
///
/// The request went through, so an unreadable body is never reported as
/// retryable.
async fn read_json(response: Response) -> Result<Value, RemoteError> {
    let status = response.status().as_u16();
    let text = response.text().await.map_err(map_http_error)?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text)
        .map_err(|e| RemoteError::unusable_success(status, format!("unreadable body: {}", e)))
}

fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[async_trait]
impl ExternalSystem for HttpCrmClient {
    #[instrument(skip(self, credential, payload))]
    async fn create(
        &self,
        credential: &Credential,
        collection: &str,
        payload: &Fields,
    ) -> Result<RemoteRecord, RemoteError> {
        let url = self.endpoint(collection);
        debug!(%url, "Creating remote record");

        let response = self
            .send(self.client.post(&url).json(payload), credential)
            .await?;
        if !response.status().is_success() {
            let err = error_from_response(response).await;
            warn!(%collection, error = %err, "Create rejected");
            return Err(err);
        }

        let status = response.status().as_u16();
        let fields = match read_json(response).await? {
            Value::Object(fields) => fields,
            _ => {
                return Err(RemoteError::unusable_success(
                    status,
                    format!("{} create response is not a JSON object", collection),
                ))
            }
        };
        let external_id = match fields.get(&self.config.id_field).and_then(id_to_string) {
            Some(id) => id,
            None => {
                let err = RemoteError::unusable_success(
                    status,
                    format!("{} create response has no '{}' field", collection, self.config.id_field),
                );
                warn!(%collection, error = %err, "Created record cannot be identified");
                return Err(err);
            }
        };

        Ok(RemoteRecord {
            external_id: ExternalId::from(external_id),
            fields,
        })
    }

    #[instrument(skip(self, credential, payload), fields(external_id = %external_id))]
    async fn update(
        &self,
        credential: &Credential,
        collection: &str,
        external_id: &ExternalId,
        payload: &Fields,
    ) -> Result<Fields, RemoteError> {
        let url = self.endpoint(&format!("{}/{}", collection, external_id));
        let response = self
            .send(self.client.patch(&url).json(payload), credential)
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        match read_json(response).await? {
            Value::Object(fields) => Ok(fields),
            _ => Ok(Fields::new()),
        }
    }

    #[instrument(skip(self, credential), fields(external_id = %external_id))]
    async fn delete(
        &self,
        credential: &Credential,
        collection: &str,
        external_id: &ExternalId,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(&format!("{}/{}", collection, external_id));
        let response = self.send(self.client.delete(&url), credential).await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!(%collection, %external_id, "Record already gone");
                Ok(())
            }
            _ => Err(error_from_response(response).await),
        }
    }

    #[instrument(skip(self, credential, payload))]
    async fn invoke(
        &self,
        credential: &Credential,
        action: &str,
        payload: &Fields,
    ) -> Result<Value, RemoteError> {
        let url = self.endpoint(&format!("actions/{}", action));
        let response = self
            .send(self.client.post(&url).json(payload), credential)
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        read_json(response).await
    }
}
