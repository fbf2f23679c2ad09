//! HTTP client for the status table

use async_trait::async_trait;
use pcgate_api::StatusSnapshot;
use pcgate_config::AuthoritySettings;
use pcgate_host_api::{AuthorityError, AuthorityResult, StatusSource};
use pcgate_util::{DeviceId, ErrorTag};
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::{debug, error, info, warn};

use crate::record::{decode_records, snapshot_from_records};

/// REST client for one authority deployment
#[derive(Clone)]
pub struct StatusClient {
    client: Client,
    base_url: String,
    table: String,
    api_key: Option<String>,
}

impl StatusClient {
    pub fn new(settings: &AuthoritySettings) -> AuthorityResult<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(settings.request_timeout)
            .build()
            .map_err(|e| AuthorityError::Request(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
            table: settings.table.clone(),
            api_key: settings.api_key.clone(),
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn status_url(&self, device_id: DeviceId) -> String {
        format!("{}?select=*&id=eq.{}", self.table_url(), device_id)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }

    /// Query the status table without folding failures into the snapshot
    pub async fn try_fetch(&self, device_id: DeviceId) -> AuthorityResult<StatusSnapshot> {
        let url = self.status_url(device_id);
        debug!(url = %url, "Querying device status");

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthorityError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(map_reqwest_error)?;
        let records = decode_records(&body)?;
        Ok(snapshot_from_records(records))
    }
}

#[async_trait]
impl StatusSource for StatusClient {
    async fn fetch(&self, device_id: DeviceId) -> StatusSnapshot {
        match self.try_fetch(device_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let tag = e.tag();
                if tag == ErrorTag::MalformedData {
                    error!(device_id = %device_id, error = %e, "Authority returned malformed data");
                } else {
                    warn!(device_id = %device_id, error = %e, "Status poll failed");
                }
                StatusSnapshot::unknown(tag)
            }
        }
    }

    async fn register_if_absent(&self, device_id: DeviceId) -> AuthorityResult<()> {
        let body = serde_json::json!({ "id": device_id.as_u64() }).to_string();

        let response = self
            .authorized(self.client.post(self.table_url()))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        // A conflict means the record already exists, which is the goal
        if status.is_success() || status == StatusCode::CONFLICT {
            debug!(device_id = %device_id, status = status.as_u16(), "Registration accepted");
            Ok(())
        } else {
            Err(AuthorityError::Status {
                status: status.as_u16(),
            })
        }
    }

    async fn verify_reachable(&self) -> AuthorityResult<()> {
        let url = format!("{}/rest/v1/", self.base_url);
        // Any HTTP answer proves the endpoint is there
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        info!(url = %url, status = response.status().as_u16(), "Authority reachable");
        Ok(())
    }
}

fn map_reqwest_error(e: reqwest::Error) -> AuthorityError {
    if e.is_timeout() {
        AuthorityError::Timeout
    } else if e.is_connect() {
        AuthorityError::Connect(e.to_string())
    } else if e.is_decode() || e.is_body() {
        AuthorityError::Decode(e.to_string())
    } else {
        AuthorityError::Request(e.to_string())
    }
}
