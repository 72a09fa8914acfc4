//! Submit / poll / cancel endpoints as seen from the client.

use std::future::Future;

use lightbake_core::bake::BakeRequest;
use lightbake_core::job::{JobSnapshot, JobView, SubmitResponse};
use lightbake_core::types::JobId;
use reqwest::header::CONTENT_TYPE;

use crate::error::ClientError;

/// The three job endpoints a [`JobPoller`](crate::JobPoller) needs.
pub trait JobService: Send + Sync {
    /// Upload `payload` with the request's parameters and return the job id.
    fn submit(
        &self,
        request: &BakeRequest,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<JobId, ClientError>> + Send;

    /// Fetch the job status and every progress event from `offset` on.
    fn poll(
        &self,
        id: JobId,
        offset: usize,
    ) -> impl Future<Output = Result<JobView, ClientError>> + Send;

    /// Ask the server to cancel the job.
    fn cancel(&self, id: JobId) -> impl Future<Output = Result<JobSnapshot, ClientError>> + Send;
}

/// HTTP client for a lightbake server.
#[derive(Debug, Clone)]
pub struct HttpJobService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpJobService {
    /// * `base_url` - Server root, e.g. `http://localhost:3000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a service reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn job_url(&self, id: JobId) -> String {
        format!("{}/api/job/{id}", self.base_url)
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ClientError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

impl JobService for HttpJobService {
    /// POST `/api/bake/{kind}/{game}/{name}?<params>` with the raw payload.
    async fn submit(&self, request: &BakeRequest, payload: Vec<u8>) -> Result<JobId, ClientError> {
        let url = format!(
            "{}/api/bake/{}/{}/{}",
            self.base_url,
            request.kind.as_str(),
            request.game,
            request.name
        );
        let response = self
            .client
            .post(url)
            .query(&request.params)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(payload)
            .send()
            .await?;

        let submitted: SubmitResponse = Self::parse_response(response).await?;
        Ok(submitted.job_id)
    }

    /// GET `/api/job/{id}?offset=N`.
    async fn poll(&self, id: JobId, offset: usize) -> Result<JobView, ClientError> {
        let response = self
            .client
            .get(self.job_url(id))
            .query(&[("offset", offset)])
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// DELETE `/api/job/{id}`.
    async fn cancel(&self, id: JobId) -> Result<JobSnapshot, ClientError> {
        let response = self.client.delete(self.job_url(id)).send().await?;
        Self::parse_response(response).await
    }
}
