use super::http_client::build_http_client_with_timeout;
use super::scrub::error_body;
use super::sse::{SseBuffer, parse_data_lines_without_done};
use super::types::{
    ChatCompletionChunk, ChatRequest, ChatResponse, CompletionDelta, ResponseFormat,
};
use crate::conversation::Message;
use crate::error::{LlmError, StreamDecodeError};
use futures_util::{Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;

pub type CompletionStream =
    Pin<Box<dyn Stream<Item = Result<CompletionDelta, LlmError>> + Send + 'static>>;

pub type CompletionFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LlmError>> + Send + 'a>>;

/// One call to a model deployment.
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub deployment: &'a str,
    pub messages: &'a [Message],
    pub response_format: Option<ResponseFormat>,
    pub headers: Vec<(&'static str, String)>,
}

impl<'a> CompletionRequest<'a> {
    pub fn new(deployment: &'a str, messages: &'a [Message]) -> Self {
        Self {
            deployment,
            messages,
            response_format: None,
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

/// The model completion service as the coordinator consumes it.
pub trait CompletionClient: Send + Sync {
    /// Single-shot completion; returns the first choice's text.
    fn complete<'a>(&'a self, request: CompletionRequest<'a>) -> CompletionFuture<'a, String>;

    /// Streaming completion; deltas arrive in emission order.
    fn stream<'a>(
        &'a self,
        request: CompletionRequest<'a>,
    ) -> CompletionFuture<'a, CompletionStream>;
}

/// Chat-completions endpoint addressed by deployment name.
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    endpoint: String,
    api_version: String,
    api_key: String,
}

impl ChatCompletionsClient {
    pub fn new(endpoint: &str, api_version: &str, api_key: &str, timeout_secs: u64) -> Self {
        Self {
            client: build_http_client_with_timeout(timeout_secs),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_version: api_version.to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn deployment_url(&self, deployment: &str) -> String {
        format!(
            "{}/openai/deployments/{deployment}/chat/completions?api-version={}",
            self.endpoint, self.api_version
        )
    }

    async fn send(
        &self,
        request: &CompletionRequest<'_>,
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        let body = ChatRequest {
            messages: request.messages,
            stream: stream.then_some(true),
            response_format: request.response_format.as_ref(),
        };

        let mut builder = self
            .client
            .post(self.deployment_url(request.deployment))
            .header("Api-Key", &self.api_key)
            .json(&body);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = builder.send().await.map_err(|error| LlmError::Request {
            deployment: request.deployment.to_string(),
            message: error.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Status {
                deployment: request.deployment.to_string(),
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }

        Ok(response)
    }
}

impl CompletionClient for ChatCompletionsClient {
    fn complete<'a>(&'a self, request: CompletionRequest<'a>) -> CompletionFuture<'a, String> {
        Box::pin(async move {
            let response = self.send(&request, false).await?;
            let parsed: ChatResponse = response.json().await.map_err(|error| LlmError::Decode {
                deployment: request.deployment.to_string(),
                message: error.to_string(),
            })?;

            parsed
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .ok_or_else(|| LlmError::EmptyResponse {
                    deployment: request.deployment.to_string(),
                })
        })
    }

    fn stream<'a>(
        &'a self,
        request: CompletionRequest<'a>,
    ) -> CompletionFuture<'a, CompletionStream> {
        Box::pin(async move {
            let response = self.send(&request, true).await?;
            Ok(sse_response_to_delta_stream(
                response,
                request.deployment.to_string(),
            ))
        })
    }
}

/// Decode one SSE `data:` payload into the first choice's delta.
///
/// `Ok(None)` means the chunk was well-formed but carried nothing to apply.
pub fn decode_chunk(data: &str) -> Result<Option<CompletionDelta>, StreamDecodeError> {
    let chunk: ChatCompletionChunk = serde_json::from_str(data)?;
    Ok(chunk.choices.into_iter().next().and_then(|choice| choice.delta))
}

pub(in crate::llm) fn sse_response_to_delta_stream(
    response: reqwest::Response,
    deployment: String,
) -> CompletionStream {
    let mut byte_stream = response.bytes_stream();

    let stream = async_stream::stream! {
        let mut sse_buffer = SseBuffer::new();

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = match chunk_result {
                Ok(chunk) => chunk,
                Err(error) => {
                    yield Err(LlmError::Stream {
                        deployment: deployment.clone(),
                        message: error.to_string(),
                    });
                    return;
                }
            };
            sse_buffer.push_chunk(&chunk);

            while let Some(event_block) = sse_buffer.next_event_block() {
                for data in parse_data_lines_without_done(&event_block) {
                    match decode_chunk(data) {
                        Ok(Some(delta)) => yield Ok(delta),
                        Ok(None) => {}
                        Err(error) => {
                            tracing::debug!(deployment = %deployment, "skipping chunk: {error}");
                        }
                    }
                }
            }
        }

        if let Some(tail) = sse_buffer.take_remainder() {
            for data in parse_data_lines_without_done(&tail) {
                if let Ok(Some(delta)) = decode_chunk(data) {
                    yield Ok(delta);
                }
            }
        }
    };

    Box::pin(stream)
}
