//! Downstream agents and the closed roster the coordinator picks from.

pub mod general;
pub mod managed;

pub use general::GeneralAgentGateway;
pub use managed::{ManagedSessionAgentGateway, SessionLine, parse_session_line};

use crate::conversation::{AgentState, Message};
use crate::dispatch::AgentName;
use crate::error::AgentError;
use crate::stage::{StageHandle, StageMultiplexer};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type AgentFuture<'a> = Pin<Box<dyn Future<Output = Result<AgentReply, AgentError>> + Send + 'a>>;

/// Everything an agent sees for one invocation.
pub struct AgentTurn<'a> {
    pub conversation: &'a [Message],
    pub instructions: Option<&'a str>,
    /// Front-end correlation id (`x-conversation-id`), forwarded where supported.
    pub conversation_id: Option<&'a str>,
    /// Opens nested stages and reaches the top-level reply surface.
    pub stages: &'a StageMultiplexer,
    /// The execution stage. The caller owns its lifecycle.
    pub stage: &'a mut StageHandle,
}

/// Aggregated agent output plus the state to persist for the next turn.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    pub text: String,
    pub state: AgentState,
}

pub trait AgentGateway: Send + Sync {
    fn name(&self) -> AgentName;

    fn respond<'a>(&'a self, turn: AgentTurn<'a>) -> AgentFuture<'a>;
}

/// Exactly one gateway per [`AgentName`].
#[derive(Clone)]
pub struct AgentRoster {
    general: Arc<dyn AgentGateway>,
    managed_session: Arc<dyn AgentGateway>,
}

impl AgentRoster {
    pub fn new(general: Arc<dyn AgentGateway>, managed_session: Arc<dyn AgentGateway>) -> Self {
        Self {
            general,
            managed_session,
        }
    }

    pub fn select(&self, agent: AgentName) -> &dyn AgentGateway {
        match agent {
            AgentName::General => self.general.as_ref(),
            AgentName::ManagedSession => self.managed_session.as_ref(),
        }
    }
}

impl std::fmt::Debug for AgentRoster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRoster")
            .field("general", &self.general.name())
            .field("managed_session", &self.managed_session.name())
            .finish()
    }
}
