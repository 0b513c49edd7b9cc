#![allow(dead_code)]

use mas_coordinator::Config;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const DISPATCH_DEPLOYMENT: &str = "gpt-4o";
pub const GENERAL_DEPLOYMENT: &str = "general-purpose-agent";

pub fn deployment_path(deployment: &str) -> String {
    format!("/openai/deployments/{deployment}/chat/completions")
}

pub fn sse_body(chunks: &[Value]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

pub fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

pub fn text_chunk(text: &str) -> Value {
    json!({"choices": [{"index": 0, "delta": {"content": text}}]})
}

pub fn custom_chunk(custom_content: Value) -> Value {
    json!({"choices": [{"index": 0, "delta": {"custom_content": custom_content}}]})
}

/// Completion service and session backend, both mocked.
pub struct MockServices {
    pub llm: MockServer,
    pub sessions: MockServer,
}

impl MockServices {
    pub async fn start() -> Self {
        Self {
            llm: MockServer::start().await,
            sessions: MockServer::start().await,
        }
    }

    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.llm.endpoint = self.llm.uri();
        config.llm.request_timeout_secs = 10;
        config.agents.session_endpoint = self.sessions.uri();
        config.agents.bootstrap_timeout_secs = 5;
        config.agents.chat_timeout_secs = 5;
        config
    }

    /// The dispatch call answers with this routing decision.
    pub async fn route(&self, decision: Value) {
        Mock::given(method("POST"))
            .and(path(deployment_path(DISPATCH_DEPLOYMENT)))
            .and(body_partial_json(json!({"response_format": {"type": "json_schema"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": decision.to_string()}}]
            })))
            .expect(1)
            .mount(&self.llm)
            .await;
    }

    /// The streaming synthesis call emits these fragments.
    pub async fn synthesis(&self, fragments: &[&str], expected_calls: u64) {
        let chunks: Vec<Value> = fragments.iter().map(|text| text_chunk(text)).collect();
        Mock::given(method("POST"))
            .and(path(deployment_path(DISPATCH_DEPLOYMENT)))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(sse_response(sse_body(&chunks)))
            .expect(expected_calls)
            .mount(&self.llm)
            .await;
    }

    pub async fn general_agent(&self, response: ResponseTemplate, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path(deployment_path(GENERAL_DEPLOYMENT)))
            .respond_with(response)
            .expect(expected_calls)
            .mount(&self.llm)
            .await;
    }

    pub async fn session_bootstrap(&self, id: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/conversations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": id})))
            .expect(expected_calls)
            .mount(&self.sessions)
            .await;
    }

    pub async fn session_chat(&self, session_id: &str, lines: &[&str]) {
        let mut body = lines.join("\n");
        body.push('\n');
        Mock::given(method("POST"))
            .and(path(format!("/conversations/{session_id}/chat")))
            .respond_with(sse_response(body))
            .expect(1)
            .mount(&self.sessions)
            .await;
    }

    /// Bodies of every request the completion service saw for `deployment`.
    pub async fn bodies_for(&self, deployment: &str) -> Vec<Value> {
        let wanted = deployment_path(deployment);
        self.llm
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request: &&Request| request.url.path() == wanted)
            .filter_map(|request| serde_json::from_slice(&request.body).ok())
            .collect()
    }
}
