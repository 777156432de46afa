//! Backend API access
//!
//! [`Backend`] is the seam between the session controller and the outside
//! world. [`HttpBackend`] talks to the real REST backend with reqwest;
//! tests substitute scripted fakes.

pub mod types;
pub mod upload;

pub use types::{classify_response, ApiOutcome, InitPayload, LockStatus, FORCE_RESET_STATUS};
pub use upload::{chunked_with_progress, no_progress, ProgressFn, UploadBody, UploadProgress};

use crate::flows::FlowSpec;
use async_trait::async_trait;
use festreg_common::events::FlowKind;
use festreg_common::{Error, Result};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("festreg/", env!("CARGO_PKG_VERSION"));

/// Operations the staged session needs from the backend
#[async_trait]
pub trait Backend: Send + Sync {
    /// Registration lock flag for a form
    async fn lock_status(&self, flow: FlowKind) -> ApiOutcome<LockStatus>;

    /// Start a session from the submitted details
    async fn init(&self, flow: FlowKind, form: &Value) -> ApiOutcome<InitPayload>;

    /// PUT a file to a one-time destination URL
    async fn upload(
        &self,
        destination: &str,
        body: UploadBody,
        progress: ProgressFn,
    ) -> ApiOutcome<()>;

    /// Convert the uploaded session into a permanent record
    async fn finalize(&self, flow: FlowKind, body: &Value) -> ApiOutcome<Value>;
}

/// reqwest-backed [`Backend`]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    /// Create a client for `base_url` (no trailing slash)
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request and classify its JSON response
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> ApiOutcome<T> {
        let response = match self.authorized(request).send().await {
            Ok(response) => response,
            Err(e) => return ApiOutcome::NetworkError(e.to_string()),
        };

        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => classify_response(status, &body),
            Err(e) => ApiOutcome::NetworkError(e.to_string()),
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn lock_status(&self, flow: FlowKind) -> ApiOutcome<LockStatus> {
        let request = self
            .http
            .get(self.url("/api/lock-status"))
            .query(&[("form", flow.key())]);
        self.send_json(request).await
    }

    async fn init(&self, flow: FlowKind, form: &Value) -> ApiOutcome<InitPayload> {
        let spec = FlowSpec::for_kind(flow);
        debug!(flow = %flow, path = spec.init_path, "POST init");
        let request = self.http.post(self.url(spec.init_path)).json(form);
        self.send_json(request).await
    }

    async fn upload(
        &self,
        destination: &str,
        body: UploadBody,
        progress: ProgressFn,
    ) -> ApiOutcome<()> {
        let total = body.len();
        let stream = chunked_with_progress(body.data, upload::UPLOAD_CHUNK_BYTES, progress);

        // Pre-signed destinations carry their own authorization
        let result = self
            .http
            .put(destination)
            .header(CONTENT_TYPE, body.content_type)
            .header(CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(stream))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => ApiOutcome::Ok(()),
            Ok(response) => {
                let status = response.status().as_u16();
                warn!(status, "Upload destination refused file");
                ApiOutcome::Rejected(format!("Upload failed (HTTP {})", status))
            }
            Err(e) => ApiOutcome::NetworkError(e.to_string()),
        }
    }

    async fn finalize(&self, flow: FlowKind, body: &Value) -> ApiOutcome<Value> {
        let spec = FlowSpec::for_kind(flow);
        debug!(flow = %flow, path = spec.finalize_path, "POST finalize");
        let request = self.http.post(self.url(spec.finalize_path)).json(body);
        self.send_json(request).await
    }
}
