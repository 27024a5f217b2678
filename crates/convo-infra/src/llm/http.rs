//! HTTP implementation of the inference client.

use std::time::Duration;

use async_stream::try_stream;
use futures_util::StreamExt;
use tracing::debug;

use convo_core::llm::{GenerationStream, InferenceClient};
use convo_types::error::UpstreamError;
use convo_types::llm::{GenerationOutput, GenerationRequest};

use super::protocol::{UpstreamChatRequest, UpstreamChatResponse};
use super::streaming::decode_sse;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the upstream generation backend over HTTP.
///
/// Whole-response calls are bounded by `request_timeout`; streaming calls
/// are deliberately unbounded here because the turn coordinator applies
/// its own inter-fragment idle deadline.
pub struct HttpInferenceClient {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpInferenceClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn transport_error(e: reqwest::Error) -> UpstreamError {
    if e.is_connect() {
        UpstreamError::Unavailable(format!("cannot reach backend: {e}"))
    } else {
        UpstreamError::Unavailable(e.to_string())
    }
}

impl InferenceClient for HttpInferenceClient {
    async fn complete(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, UpstreamError> {
        let payload = UpstreamChatRequest::from(request);
        let call = async {
            let response = self
                .client
                .post(self.url("/chat"))
                .json(&payload)
                .send()
                .await
                .map_err(transport_error)?;

            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(UpstreamError::Status {
                    code: status.as_u16(),
                    message,
                });
            }

            let body: UpstreamChatResponse = response
                .json()
                .await
                .map_err(|e| UpstreamError::Decode(e.to_string()))?;
            debug!(chars = body.response.len(), "whole response received");
            Ok(GenerationOutput {
                content: body.response,
                usage: body.usage.map(Into::into),
            })
        };

        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(self.request_timeout)),
        }
    }

    fn stream(&self, request: GenerationRequest) -> GenerationStream {
        let client = self.client.clone();
        let url = self.url("/chat/stream");

        Box::pin(try_stream! {
            let payload = UpstreamChatRequest::from(&request);
            let response = client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .map_err(transport_error)?;

            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                Err(UpstreamError::Status {
                    code: status.as_u16(),
                    message,
                })?;
            } else {
                let mut events = decode_sse(response.bytes_stream());
                while let Some(event) = events.next().await {
                    let event = event?;
                    yield event;
                }
            }
        })
    }

    async fn healthy(&self) -> bool {
        let probe = async {
            self.client
                .get(self.url("/health"))
                .send()
                .await
                .map(|r| r.status().is_success())
                .unwrap_or(false)
        };
        tokio::time::timeout(HEALTH_TIMEOUT, probe)
            .await
            .unwrap_or(false)
    }
}
