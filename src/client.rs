//! HTTP client for the incident API, as used by reception and dispatch consoles.

use crate::api::handlers::HealthResponse;
use crate::api::ApiResponse;
use crate::models::{Incident, IncidentPatch, NewIncident, TranscriptMessage};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport or decoding failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with `success: false`
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Server answered `success: true` without a `data` field
    #[error("Response carried no data")]
    MissingData,
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Api { status: 404, .. })
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Typed client for the incident endpoints
#[derive(Clone)]
pub struct IncidentClient {
    http: Client,
    base_url: String,
}

impl IncidentClient {
    /// `base_url` includes any path prefix, e.g. `http://localhost:8080/make-server-dd6e4f12`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Save a new incident
    pub async fn create(&self, payload: &NewIncident) -> ClientResult<Incident> {
        self.send(self.http.post(self.url("/incidents")).json(payload))
            .await
    }

    /// List active-index incidents, optionally filtered by status
    pub async fn list(&self, status: Option<&str>) -> ClientResult<Vec<Incident>> {
        let mut request = self.http.get(self.url("/incidents"));
        if let Some(status) = status {
            request = request.query(&[("status", status)]);
        }
        self.send(request).await
    }

    /// Fetch one incident
    pub async fn get(&self, id: &str) -> ClientResult<Incident> {
        self.send(self.http.get(self.url(&format!("/incidents/{}", id))))
            .await
    }

    /// Append a transcript message
    pub async fn append_transcript(
        &self,
        id: &str,
        message: &TranscriptMessage,
    ) -> ClientResult<Incident> {
        let url = self.url(&format!("/incidents/{}/transcript", id));
        self.send(self.http.post(url).json(message)).await
    }

    /// Apply a partial update
    pub async fn patch(&self, id: &str, updates: &IncidentPatch) -> ClientResult<Incident> {
        let url = self.url(&format!("/incidents/{}", id));
        self.send(self.http.patch(url).json(updates)).await
    }

    /// Mark an incident completed
    pub async fn complete(&self, id: &str) -> ClientResult<Incident> {
        self.patch(id, &IncidentPatch::complete()).await
    }

    /// Check server health
    pub async fn health(&self) -> ClientResult<HealthResponse> {
        let response = self.http.get(self.url("/health")).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = request.send().await?;
        let status = response.status();
        let envelope: ApiResponse<T> = response.json().await?;

        if !envelope.success {
            tracing::debug!(status = status.as_u16(), "API call failed");
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: envelope.error.unwrap_or_default(),
            });
        }

        envelope.data.ok_or(ClientError::MissingData)
    }
}
