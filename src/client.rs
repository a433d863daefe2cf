use crate::classify::StreamKind;
use crate::config::{ClientConfig, join_path, normalize_base_url};
use crate::error::{ClientError, Result};
use crate::protocol::{ChatRequest, ResumeRequest};
use crate::reader::{EventStream, StreamEventReader};
use reqwest::Client as HttpClient;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderValue};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Opens agent chat streams against one backend.
#[derive(Clone)]
pub struct AgentClient {
    base_url: String,
    token: Option<String>,
    chat_path: String,
    resume_path: String,
    http: HttpClient,
}

impl AgentClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base_url = normalize_base_url(&config.base_url)?;
        let http = HttpClient::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            base_url,
            token: config.token,
            chat_path: config.chat_path,
            resume_path: config.resume_path,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Start a fresh chat turn.
    ///
    /// Fails before yielding anything if the backend rejects the request.
    /// Once streaming, `cancel` ends the stream without an error.
    pub async fn chat_stream(
        &self,
        request: &ChatRequest,
        cancel: Option<CancellationToken>,
    ) -> Result<EventStream> {
        self.open(&self.chat_path, request, StreamKind::Chat, cancel)
            .await
    }

    /// Continue a turn that paused on a tool approval.
    pub async fn resume_stream(
        &self,
        request: &ResumeRequest,
        cancel: Option<CancellationToken>,
    ) -> Result<EventStream> {
        self.open(&self.resume_path, request, StreamKind::Resume, cancel)
            .await
    }

    async fn open<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        kind: StreamKind,
        cancel: Option<CancellationToken>,
    ) -> Result<EventStream> {
        let url = join_path(&self.base_url, path);
        let mut request = self
            .http
            .post(&url)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%url, status = status.as_u16(), "agent stream request rejected");
            return Err(ClientError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
                body,
            });
        }

        let status = response.status();
        if matches!(status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT)
            || response.content_length() == Some(0)
        {
            warn!(%url, status = status.as_u16(), "agent stream response has no body");
            return Err(ClientError::EmptyBody {
                status: status.as_u16(),
            });
        }

        info!(%url, ?kind, "agent stream opened");
        Ok(StreamEventReader::new(response.bytes_stream(), kind, cancel).into_stream())
    }
}
