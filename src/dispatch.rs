//! Turn classification: one schema-constrained completion picks the agent.

use crate::conversation::{Message, Role};
use crate::error::ClassificationError;
use crate::llm::{CompletionClient, CompletionRequest, ResponseFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::str::FromStr;
use strum::{Display, EnumString};

/// Name of the JSON schema sent with the dispatch call.
pub const ROUTING_SCHEMA_NAME: &str = "coordination_schema";

/// The closed set of downstream agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum AgentName {
    #[serde(rename = "GPA")]
    #[strum(serialize = "GPA")]
    General,
    #[serde(rename = "UMS")]
    #[strum(serialize = "UMS")]
    ManagedSession,
}

impl AgentName {
    pub const ALL: [Self; 2] = [Self::General, Self::ManagedSession];

    pub fn wire_name(self) -> &'static str {
        match self {
            Self::General => "GPA",
            Self::ManagedSession => "UMS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    pub agent_name: AgentName,
    pub additional_instructions: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDecision {
    agent_name: String,
    #[serde(default)]
    additional_instructions: Option<String>,
}

impl RoutingDecision {
    /// Strictly decode the model's JSON text.
    pub fn parse(raw: &str) -> Result<Self, ClassificationError> {
        let decoded: RawDecision =
            serde_json::from_str(raw).map_err(|source| ClassificationError::InvalidDecision {
                raw: raw.to_string(),
                source,
            })?;

        let agent_name = AgentName::from_str(&decoded.agent_name)
            .map_err(|_| ClassificationError::UnknownAgent(decoded.agent_name.clone()))?;

        Ok(Self {
            agent_name,
            additional_instructions: decoded
                .additional_instructions
                .filter(|text| !text.trim().is_empty()),
        })
    }

    /// Markdown block shown in the route-discovery stage.
    pub fn render(&self) -> String {
        let pretty = serde_json::to_string_pretty(self).unwrap_or_else(|_| {
            format!("{{\"agent_name\": \"{}\"}}", self.agent_name.wire_name())
        });
        format!("### Target Plan\n```json\n{pretty}\n```\n")
    }
}

/// JSON schema for [`RoutingDecision`], built from [`AgentName::ALL`].
pub fn routing_schema() -> Value {
    let names: Vec<&str> = AgentName::ALL.iter().map(|name| name.wire_name()).collect();
    json!({
        "title": "RoutingDecision",
        "type": "object",
        "properties": {
            "agent_name": {
                "type": "string",
                "enum": names,
                "description": "Agent that handles this turn."
            },
            "additional_instructions": {
                "anyOf": [{"type": "string"}, {"type": "null"}],
                "description": "Optional guidance for the chosen agent."
            }
        },
        "required": ["agent_name"],
        "additionalProperties": false
    })
}

/// Policy prompt first, then the turn. User messages with metadata are
/// flattened to text; everything else passes through unchanged.
pub fn prepare_messages(system_prompt: &str, conversation: &[Message]) -> Vec<Message> {
    let mut prepared = Vec::with_capacity(conversation.len() + 1);
    prepared.push(Message::system(system_prompt));
    prepared.extend(conversation.iter().map(|message| {
        if message.role == Role::User && message.custom_content.is_some() {
            message.text_only()
        } else {
            message.clone()
        }
    }));
    prepared
}

pub struct Dispatcher<'a> {
    client: &'a dyn CompletionClient,
    deployment: &'a str,
    system_prompt: &'a str,
}

impl<'a> Dispatcher<'a> {
    pub fn new(client: &'a dyn CompletionClient, deployment: &'a str, system_prompt: &'a str) -> Self {
        Self {
            client,
            deployment,
            system_prompt,
        }
    }

    pub async fn classify(
        &self,
        conversation: &[Message],
    ) -> Result<RoutingDecision, ClassificationError> {
        let messages = prepare_messages(self.system_prompt, conversation);
        let request = CompletionRequest::new(self.deployment, &messages)
            .with_response_format(ResponseFormat::json_schema(ROUTING_SCHEMA_NAME, routing_schema()));

        let raw = self.client.complete(request).await?;
        let decision = RoutingDecision::parse(&raw)?;
        tracing::debug!(agent = %decision.agent_name, "routing decision parsed");
        Ok(decision)
    }
}
