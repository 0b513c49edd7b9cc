use crate::conversation::{Attachment, Message};
use crate::stage::StageEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub(in crate::llm) struct ChatRequest<'a> {
    pub(in crate::llm) messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(in crate::llm) stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(in crate::llm) response_format: Option<&'a ResponseFormat>,
}

/// Schema-constrained output, `{"type": "json_schema", "json_schema": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct JsonSchemaFormat {
    name: String,
    schema: Value,
}

impl ResponseFormat {
    pub fn json_schema(name: impl Into<String>, schema: Value) -> Self {
        Self {
            kind: "json_schema",
            json_schema: JsonSchemaFormat {
                name: name.into(),
                schema,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(in crate::llm) struct ChatResponse {
    #[serde(default)]
    pub(in crate::llm) choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub(in crate::llm) struct Choice {
    pub(in crate::llm) message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(in crate::llm) struct ResponseMessage {
    pub(in crate::llm) content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(in crate::llm) struct ChatCompletionChunk {
    #[serde(default)]
    pub(in crate::llm) choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
pub(in crate::llm) struct ChunkChoice {
    #[serde(default)]
    pub(in crate::llm) delta: Option<CompletionDelta>,
}

/// One streamed delta: text, structured metadata, or both.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CompletionDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub custom_content: Option<DeltaCustomContent>,
}

impl CompletionDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            custom_content: None,
        }
    }

    pub fn metadata(custom_content: DeltaCustomContent) -> Self {
        Self {
            content: None,
            custom_content: Some(custom_content),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeltaCustomContent {
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub state: Option<Value>,
    #[serde(default)]
    pub stages: Vec<StageEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_format_serializes_json_schema_envelope() {
        let format = ResponseFormat::json_schema("routing", json!({"type": "object"}));
        assert_eq!(
            serde_json::to_value(format).unwrap(),
            json!({
                "type": "json_schema",
                "json_schema": {"name": "routing", "schema": {"type": "object"}}
            })
        );
    }

    #[test]
    fn request_omits_absent_options() {
        let messages = [Message::user("hi")];
        let request = ChatRequest {
            messages: &messages,
            stream: None,
            response_format: None,
        };
        assert_eq!(
            serde_json::to_value(request).unwrap(),
            json!({"messages": [{"role": "user", "content": "hi"}]})
        );
    }

    #[test]
    fn chunk_with_nested_stages_deserializes() {
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "id": "c1",
            "choices": [{
                "index": 0,
                "delta": {
                    "custom_content": {
                        "state": {"thread": 1},
                        "stages": [{"index": 0, "name": "Search", "status": "completed"}]
                    }
                }
            }]
        }))
        .unwrap();

        let delta = chunk.choices[0].delta.as_ref().unwrap();
        let custom = delta.custom_content.as_ref().unwrap();
        assert_eq!(custom.state, Some(json!({"thread": 1})));
        assert_eq!(custom.stages[0].name.as_deref(), Some("Search"));
        assert!(delta.content.is_none());
    }

    #[test]
    fn chunk_without_choices_deserializes() {
        let chunk: ChatCompletionChunk =
            serde_json::from_value(json!({"usage": {"total_tokens": 3}})).unwrap();
        assert!(chunk.choices.is_empty());
    }
}
