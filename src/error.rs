use crate::dispatch::AgentName;
use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Fatal outcome of one coordination turn.
///
/// Every variant is logged with turn context before it reaches the caller; the
/// HTTP boundary only ever shows the user a generic failure. Recoverable
/// per-event problems never surface here (see [`StreamDecodeError`]).
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("dispatch: {0}")]
    Classification(#[from] ClassificationError),

    #[error("agent {agent} failed: {source}")]
    AgentExecution {
        agent: AgentName,
        #[source]
        source: AgentError,
    },

    #[error("synthesis: {0}")]
    Synthesis(#[source] LlmError),

    #[error("stage: {0}")]
    Stage(#[from] StageError),

    #[error("response surface: {0}")]
    Surface(#[from] SurfaceError),
}

// ─── Model completion errors ────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{deployment} request failed: {message}")]
    Request { deployment: String, message: String },

    #[error("{deployment} returned HTTP {status}: {body}")]
    Status {
        deployment: String,
        status: u16,
        body: String,
    },

    #[error("{deployment} response decode failed: {message}")]
    Decode { deployment: String, message: String },

    #[error("{deployment} returned no choices")]
    EmptyResponse { deployment: String },

    #[error("{deployment} stream broke: {message}")]
    Stream { deployment: String, message: String },
}

// ─── Classification errors ──────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("completion call failed: {0}")]
    Completion(#[from] LlmError),

    #[error("routing decision does not match schema: {source}")]
    InvalidDecision {
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown agent name {0:?}")]
    UnknownAgent(String),
}

// ─── Agent execution errors ─────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model stream: {0}")]
    Llm(#[from] LlmError),

    #[error("transport: {0}")]
    Transport(String),

    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("protocol: {0}")]
    Protocol(String),

    #[error("session bootstrap failed: {0}")]
    SessionBootstrap(String),

    #[error("stage: {0}")]
    Stage(#[from] StageError),

    #[error("response surface: {0}")]
    Surface(#[from] SurfaceError),
}

// ─── Stage / surface errors ─────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StageError {
    #[error("stage {index} is already closed")]
    Closed { index: usize },

    #[error("surface: {0}")]
    Surface(#[from] SurfaceError),
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("response consumer disconnected")]
    Disconnected,
}

// ─── Recovered per-event errors ─────────────────────────────────────────────

/// One malformed stream event. Callers skip the event and keep reading.
#[derive(Debug, Error)]
#[error("undecodable stream event: {message}")]
pub struct StreamDecodeError {
    pub message: String,
}

impl From<serde_json::Error> for StreamDecodeError {
    fn from(error: serde_json::Error) -> Self {
        Self {
            message: error.to_string(),
        }
    }
}
