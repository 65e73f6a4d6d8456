use bytes::Bytes;
use futures::StreamExt;
use futures::TryStreamExt;
use phonepilot_protocol::TaskVariant;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use reqwest::header::USER_AGENT;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ByteStream;
use crate::error::ClientError;
use crate::types::DeviceRef;
use crate::types::ScreenshotResponse;
use crate::types::SwipeRequest;
use crate::types::TapRequest;
use crate::types::TaskRequest;
use crate::types::TypeTextRequest;

/// An open task stream: response status plus the raw chunked body.
///
/// Dropping the stream closes the underlying connection, which is how the
/// session controller stops record delivery on abort.
pub struct TaskStream {
    pub status: StatusCode,
    pub bytes: ByteStream,
}

impl std::fmt::Debug for TaskStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStream")
            .field("status", &self.status)
            .field("bytes", &"<stream>")
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct Client {
    base_url: String,
    http: reqwest::Client,
    user_agent: HeaderValue,
}

impl Client {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url,
            http,
            user_agent: default_user_agent(),
        })
    }

    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        if let Ok(hv) = HeaderValue::from_str(&ua.into()) {
            self.user_agent = hv;
        }
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(USER_AGENT, self.user_agent.clone());
        h
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Opens the chunked task stream for `variant`.
    ///
    /// A non-success status is returned as `ClientError::UnexpectedStatus`
    /// with the body drained for diagnostics; the caller surfaces it as a
    /// terminal error on the target message.
    pub async fn stream_task(
        &self,
        variant: TaskVariant,
        request: &TaskRequest,
    ) -> Result<TaskStream, ClientError> {
        let path = match variant {
            TaskVariant::Direct => "/api/chat/stream",
            TaskVariant::Orchestrated => "/api/agent/stream",
        };
        let response = self
            .http
            .post(self.url(path))
            .headers(self.headers())
            .json(request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::UnexpectedStatus { status, body });
        }
        let bytes: ByteStream = response.bytes_stream().map_err(ClientError::from).boxed();
        Ok(TaskStream { status, bytes })
    }

    /// Companion cancellation call for an in-flight task stream.
    ///
    /// Fire-and-forget from the controller's perspective: the local abort has
    /// already been applied by the time this runs.
    pub async fn cancel_task(&self, device_id: &str) -> Result<(), ClientError> {
        self.post_unit(
            "/api/chat/abort",
            &DeviceRef {
                device_id: device_id.to_string(),
            },
        )
        .await
    }

    /// Fetches one still frame from the device.
    pub async fn screenshot(&self, device_id: &str) -> Result<ScreenshotResponse, ClientError> {
        self.post_json(
            "/api/screenshot",
            &DeviceRef {
                device_id: device_id.to_string(),
            },
        )
        .await
    }

    /// Readiness probe; any 2xx counts as healthy.
    pub async fn health(&self) -> Result<(), ClientError> {
        let response = self
            .http
            .get(self.url("/api/health"))
            .headers(self.headers())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::UnexpectedStatus { status, body });
        }
        Ok(())
    }

    pub async fn tap(&self, device_id: &str, x: i32, y: i32) -> Result<(), ClientError> {
        self.post_unit(&format!("/api/device/{device_id}/tap"), &TapRequest { x, y })
            .await
    }

    pub async fn swipe(&self, device_id: &str, request: &SwipeRequest) -> Result<(), ClientError> {
        self.post_unit(&format!("/api/device/{device_id}/swipe"), request)
            .await
    }

    pub async fn type_text(&self, device_id: &str, text: &str) -> Result<(), ClientError> {
        self.post_unit(
            &format!("/api/device/{device_id}/type_text"),
            &TypeTextRequest {
                text: text.to_string(),
            },
        )
        .await
    }

    pub async fn back(&self, device_id: &str) -> Result<(), ClientError> {
        self.post_unit(&format!("/api/device/{device_id}/back"), &serde_json::json!({}))
            .await
    }

    pub async fn home(&self, device_id: &str) -> Result<(), ClientError> {
        self.post_unit(&format!("/api/device/{device_id}/home"), &serde_json::json!({}))
            .await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let bytes = self.post_raw(path, body).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn post_unit<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), ClientError> {
        let _ = self.post_raw(path, body).await?;
        Ok(())
    }

    async fn post_raw<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Bytes, ClientError> {
        let response = self
            .http
            .post(self.url(path))
            .headers(self.headers())
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!("backend returned {status} for {path}");
            return Err(ClientError::UnexpectedStatus { status, body });
        }
        Ok(response.bytes().await?)
    }
}

fn default_user_agent() -> HeaderValue {
    let ua = format!("phonepilot/{}", env!("CARGO_PKG_VERSION"));
    HeaderValue::from_str(&ua).unwrap_or_else(|_| HeaderValue::from_static("phonepilot"))
}
