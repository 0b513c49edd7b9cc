//! One coordination turn: DISPATCH → EXECUTE → SYNTHESIZE.
//!
//! Each phase finishes, stage closure included, before the next begins. A
//! failure in DISPATCH or EXECUTE ends the turn; nothing is synthesized from
//! partial agent output.

use crate::agents::{
    AgentRoster, AgentTurn, GeneralAgentGateway, ManagedSessionAgentGateway,
};
use crate::config::Config;
use crate::conversation::{AgentState, Message, Role};
use crate::dispatch::{Dispatcher, RoutingDecision, prepare_messages};
use crate::error::CoordinatorError;
use crate::llm::{ChatCompletionsClient, CompletionClient, CompletionRequest};
use crate::prompts::PromptSet;
use crate::stage::{ResponseSurface, StageHandle, StageMultiplexer, StageStatus};
use futures_util::StreamExt;
use std::sync::Arc;
use strum::Display;
use tracing::Instrument;

pub const ROUTE_STAGE_TITLE: &str = "Route Discovery";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TurnPhase {
    Dispatch,
    Execute,
    Synthesize,
    Done,
}

/// The message persisted for the next turn.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalReply {
    pub text: String,
    /// Always the executing agent's state; synthesis records nothing.
    pub state: AgentState,
}

impl FinalReply {
    pub fn into_message(self) -> Message {
        Message::assistant(self.text).with_state(&self.state)
    }
}

pub struct Coordinator {
    client: Arc<dyn CompletionClient>,
    roster: AgentRoster,
    deployment: String,
    prompts: PromptSet,
}

impl Coordinator {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        roster: AgentRoster,
        deployment: impl Into<String>,
        prompts: PromptSet,
    ) -> Self {
        Self {
            client,
            roster,
            deployment: deployment.into(),
            prompts,
        }
    }

    /// Wire the real services for one request, authenticated with `api_key`.
    pub fn for_request(config: &Config, api_key: &str) -> Self {
        let client: Arc<dyn CompletionClient> = Arc::new(ChatCompletionsClient::new(
            &config.llm.endpoint,
            &config.llm.api_version,
            api_key,
            config.llm.request_timeout_secs,
        ));
        let general = GeneralAgentGateway::new(Arc::clone(&client), &config.agents.general_deployment);
        let managed = ManagedSessionAgentGateway::new(&config.agents.session_endpoint)
            .with_session_title(&config.agents.session_title)
            .with_timeouts(
                config.agents.bootstrap_timeout_secs,
                config.agents.chat_timeout_secs,
            );

        Self::new(
            client,
            AgentRoster::new(Arc::new(general), Arc::new(managed)),
            &config.llm.deployment,
            config.prompt_set(),
        )
    }

    pub async fn handle_turn(
        &self,
        conversation: &[Message],
        conversation_id: Option<&str>,
        surface: Arc<dyn ResponseSurface>,
    ) -> Result<FinalReply, CoordinatorError> {
        let span = tracing::info_span!(
            "turn",
            conversation_id = conversation_id.unwrap_or("unknown"),
        );
        self.run_turn(conversation, conversation_id, surface)
            .instrument(span)
            .await
    }

    async fn run_turn(
        &self,
        conversation: &[Message],
        conversation_id: Option<&str>,
        surface: Arc<dyn ResponseSurface>,
    ) -> Result<FinalReply, CoordinatorError> {
        let stages = StageMultiplexer::new(Arc::clone(&surface));

        tracing::info!(phase = %TurnPhase::Dispatch, messages = conversation.len(), "turn started");
        let mut stage = stages.open(ROUTE_STAGE_TITLE)?;
        let routed = self.dispatch(conversation, &mut stage).await;
        close_for(&mut stage, routed.is_ok());
        let decision = routed.inspect_err(|error| {
            tracing::error!(phase = %TurnPhase::Dispatch, "dispatch failed: {error}");
        })?;

        let agent = decision.agent_name;
        tracing::info!(phase = %TurnPhase::Execute, %agent, "delegating turn");
        let mut stage = stages.open(format!("Agent Execution: {agent}"))?;
        let executed = self
            .roster
            .select(agent)
            .respond(AgentTurn {
                conversation,
                instructions: decision.additional_instructions.as_deref(),
                conversation_id,
                stages: &stages,
                stage: &mut stage,
            })
            .await;
        close_for(&mut stage, executed.is_ok());
        let reply = executed.map_err(|source| {
            tracing::error!(phase = %TurnPhase::Execute, %agent, "agent execution failed: {source}");
            CoordinatorError::AgentExecution { agent, source }
        })?;

        tracing::info!(phase = %TurnPhase::Synthesize, %agent, raw_len = reply.text.len(), "synthesizing reply");
        let text = self
            .synthesize(conversation, &reply.text, surface.as_ref())
            .await?;

        if let Some(state) = reply.state.to_value() {
            surface.set_state(state)?;
        }
        tracing::info!(phase = %TurnPhase::Done, %agent, "turn finished");

        Ok(FinalReply {
            text,
            state: reply.state,
        })
    }

    async fn dispatch(
        &self,
        conversation: &[Message],
        stage: &mut StageHandle,
    ) -> Result<RoutingDecision, CoordinatorError> {
        let decision = Dispatcher::new(self.client.as_ref(), &self.deployment, &self.prompts.dispatch)
            .classify(conversation)
            .await?;
        stage.append_content(&decision.render())?;
        Ok(decision)
    }

    async fn synthesize(
        &self,
        conversation: &[Message],
        agent_output: &str,
        surface: &dyn ResponseSurface,
    ) -> Result<String, CoordinatorError> {
        let messages = synthesis_messages(&self.prompts.synthesis, conversation, agent_output);
        let mut stream = self
            .client
            .stream(CompletionRequest::new(&self.deployment, &messages))
            .await
            .map_err(CoordinatorError::Synthesis)?;

        let mut text = String::new();
        while let Some(delta) = stream.next().await {
            let delta = delta.map_err(CoordinatorError::Synthesis)?;
            if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                surface.append_content(&content)?;
                text.push_str(&content);
            }
        }
        Ok(text)
    }
}

fn close_for(stage: &mut StageHandle, succeeded: bool) {
    let status = if succeeded {
        StageStatus::Completed
    } else {
        StageStatus::Failed
    };
    stage.close_safely_with(status);
}

/// Synthesis policy, the turn, and the agent output placed above the final
/// user request.
pub fn synthesis_messages(
    system_prompt: &str,
    conversation: &[Message],
    agent_output: &str,
) -> Vec<Message> {
    let mut messages = prepare_messages(system_prompt, conversation);
    let target = messages
        .iter()
        .rposition(|message| message.role == Role::User)
        .unwrap_or(messages.len() - 1);
    let original = std::mem::take(&mut messages[target].content);
    messages[target].content =
        format!("## CONTEXT:\n {agent_output}\n ---\n ## USER_REQUEST: \n {original}");
    messages
}
