use super::{AgentFuture, AgentGateway, AgentReply, AgentTurn};
use crate::conversation::{AgentState, first_session_id, last_user_message};
use crate::dispatch::AgentName;
use crate::error::{AgentError, StreamDecodeError};
use crate::llm::scrub::error_body;
use crate::llm::sse::{DONE_SENTINEL, SseBuffer, data_payload};
use crate::llm::build_http_client;
use crate::stage::StageHandle;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

pub const DEFAULT_SESSION_TITLE: &str = "Managed User Session";
pub const DEFAULT_BOOTSTRAP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CHAT_TIMEOUT_SECS: u64 = 60;

#[derive(Serialize)]
struct CreateSession<'a> {
    title: &'a str,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    message: ChatMessage<'a>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// One line of the session backend's chat stream, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLine {
    /// Non-data line, undecodable payload, or bookkeeping with no text.
    Ignore,
    Done,
    Content(String),
}

pub fn parse_session_line(line: &str) -> SessionLine {
    let Some(data) = data_payload(line) else {
        return SessionLine::Ignore;
    };
    if data == DONE_SENTINEL {
        return SessionLine::Done;
    }

    let payload: Value = match serde_json::from_str(data) {
        Ok(payload) => payload,
        Err(error) => {
            tracing::debug!("skipping session line: {}", StreamDecodeError::from(error));
            return SessionLine::Ignore;
        }
    };
    // conversation id announcements carry nothing for the reply
    if payload.get("conversation_id").is_some() {
        return SessionLine::Ignore;
    }

    payload
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|content| !content.is_empty())
        .map_or(SessionLine::Ignore, |content| {
            SessionLine::Content(content.to_string())
        })
}

/// Session ids come back from callers inside message state; only plain
/// tokens are ever sent to the backend.
fn is_session_token(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

/// Talks to a backend that keeps its own conversation per session id.
pub struct ManagedSessionAgentGateway {
    client: reqwest::Client,
    endpoint: String,
    session_title: String,
    bootstrap_timeout: Duration,
    chat_timeout: Duration,
}

impl ManagedSessionAgentGateway {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: build_http_client(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            session_title: DEFAULT_SESSION_TITLE.to_string(),
            bootstrap_timeout: Duration::from_secs(DEFAULT_BOOTSTRAP_TIMEOUT_SECS),
            chat_timeout: Duration::from_secs(DEFAULT_CHAT_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn with_session_title(mut self, title: impl Into<String>) -> Self {
        self.session_title = title.into();
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, bootstrap_secs: u64, chat_secs: u64) -> Self {
        self.bootstrap_timeout = Duration::from_secs(bootstrap_secs);
        self.chat_timeout = Duration::from_secs(chat_secs);
        self
    }

    async fn run(&self, turn: AgentTurn<'_>) -> Result<AgentReply, AgentError> {
        let session_id = match first_session_id(turn.conversation) {
            Some(existing) => {
                tracing::debug!(session_id = existing, "resuming backend session");
                existing.to_string()
            }
            None => {
                let created = self.create_session().await?;
                tracing::info!(session_id = %created, "created backend session");
                turn.stage.append_content(&format!(
                    "> **System:** Established new session context: `{created}`\n\n"
                ))?;
                created
            }
        };

        let latest = last_user_message(turn.conversation)
            .ok_or_else(|| AgentError::Protocol("conversation has no user message".into()))?;
        let message = match turn.instructions {
            Some(instructions) => {
                format!("{}\n\n[System Directive]: {instructions}", latest.content)
            }
            None => latest.content.clone(),
        };

        let text = self.chat(&session_id, &message, turn.stage).await?;
        Ok(AgentReply {
            text,
            state: AgentState::Session { session_id },
        })
    }

    async fn create_session(&self) -> Result<String, AgentError> {
        let response = self
            .client
            .post(format!("{}/conversations", self.endpoint))
            .timeout(self.bootstrap_timeout)
            .json(&CreateSession {
                title: &self.session_title,
            })
            .send()
            .await
            .map_err(|error| AgentError::SessionBootstrap(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(AgentError::SessionBootstrap(format!(
                "HTTP {}: {body}",
                status.as_u16()
            )));
        }

        let record: Value = response
            .json()
            .await
            .map_err(|error| AgentError::SessionBootstrap(error.to_string()))?;

        match record.get("id") {
            Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(AgentError::SessionBootstrap(
                "response carried no session id".into(),
            )),
        }
    }

    /// `{endpoint}/conversations/{id}/chat`, with the id kept to one segment.
    fn chat_url(&self, session_id: &str) -> Result<Url, AgentError> {
        if !is_session_token(session_id) {
            return Err(AgentError::Protocol(format!(
                "refusing session id {session_id:?}"
            )));
        }

        let mut url = Url::parse(&self.endpoint)
            .map_err(|error| AgentError::Transport(format!("session endpoint: {error}")))?;
        url.path_segments_mut()
            .map_err(|()| AgentError::Transport("session endpoint cannot take a path".into()))?
            .pop_if_empty()
            .extend(["conversations", session_id, "chat"]);
        Ok(url)
    }

    async fn chat(
        &self,
        session_id: &str,
        message: &str,
        stage: &mut StageHandle,
    ) -> Result<String, AgentError> {
        let url = self.chat_url(session_id)?;
        let response = self
            .client
            .post(url)
            .timeout(self.chat_timeout)
            .json(&ChatBody {
                message: ChatMessage {
                    role: "user",
                    content: message,
                },
                stream: true,
            })
            .send()
            .await
            .map_err(|error| AgentError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Status {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }

        let mut bytes = response.bytes_stream();
        let mut buffer = SseBuffer::new();
        let mut text = String::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|error| AgentError::Transport(error.to_string()))?;
            buffer.push_chunk(&chunk);

            while let Some(line) = buffer.next_line() {
                match parse_session_line(&line) {
                    SessionLine::Done => return Ok(text),
                    SessionLine::Content(content) => {
                        stage.append_content(&content)?;
                        text.push_str(&content);
                    }
                    SessionLine::Ignore => {}
                }
            }
        }

        if let Some(SessionLine::Content(content)) =
            buffer.take_remainder().map(|rest| parse_session_line(&rest))
        {
            stage.append_content(&content)?;
            text.push_str(&content);
        }
        Ok(text)
    }
}

impl AgentGateway for ManagedSessionAgentGateway {
    fn name(&self) -> AgentName {
        AgentName::ManagedSession
    }

    fn respond<'a>(&'a self, turn: AgentTurn<'a>) -> AgentFuture<'a> {
        Box::pin(self.run(turn))
    }
}
