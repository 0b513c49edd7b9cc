use crate::agents::general::DEFAULT_GENERAL_DEPLOYMENT;
use crate::agents::managed::{
    DEFAULT_BOOTSTRAP_TIMEOUT_SECS, DEFAULT_CHAT_TIMEOUT_SECS, DEFAULT_SESSION_TITLE,
};
use crate::llm::http_client::DEFAULT_TIMEOUT_SECS;
use crate::prompts::PromptSet;
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where this config was read from; not persisted.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    /// tracing level: trace, debug, info, warn or error (default: info)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: None,
            llm: LlmConfig::default(),
            agents: AgentsConfig::default(),
            gateway: GatewayConfig::default(),
            prompts: PromptsConfig::default(),
            log_level: default_log_level(),
        }
    }
}

/// Model completion service used for dispatch and synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the completion service (default: http://localhost:8080)
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    /// Deployment used for dispatch and synthesis (default: gpt-4o)
    #[serde(default = "default_llm_deployment")]
    pub deployment: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            deployment: default_llm_deployment(),
            api_version: default_api_version(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Deployment name of the general-purpose agent
    #[serde(default = "default_general_deployment")]
    pub general_deployment: String,
    /// Base URL of the managed-session agent (default: http://localhost:8042)
    #[serde(default = "default_session_endpoint")]
    pub session_endpoint: String,
    /// Title given to newly created backend sessions
    #[serde(default = "default_session_title")]
    pub session_title: String,
    #[serde(default = "default_bootstrap_timeout_secs")]
    pub bootstrap_timeout_secs: u64,
    #[serde(default = "default_chat_timeout_secs")]
    pub chat_timeout_secs: u64,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            general_deployment: default_general_deployment(),
            session_endpoint: default_session_endpoint(),
            session_title: default_session_title(),
            bootstrap_timeout_secs: default_bootstrap_timeout_secs(),
            chat_timeout_secs: default_chat_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway host (default: 0.0.0.0)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Gateway port (default: 8055)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Deployment name this coordinator answers to (default: mas-coordinator)
    #[serde(default = "default_gateway_deployment")]
    pub deployment: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Time allowed until the response head is sent. A streamed body is
    /// bounded by the upstream client timeouts, not by this.
    #[serde(default = "default_gateway_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            deployment: default_gateway_deployment(),
            max_body_bytes: default_max_body_bytes(),
            request_timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

/// Replacement policy texts; unset fields keep the built-in prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default)]
    pub dispatch: Option<String>,
    #[serde(default)]
    pub synthesis: Option<String>,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_llm_endpoint() -> String {
    "http://localhost:8080".into()
}

fn default_llm_deployment() -> String {
    "gpt-4o".into()
}

fn default_api_version() -> String {
    "2025-01-01-preview".into()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_general_deployment() -> String {
    DEFAULT_GENERAL_DEPLOYMENT.into()
}

fn default_session_endpoint() -> String {
    "http://localhost:8042".into()
}

fn default_session_title() -> String {
    DEFAULT_SESSION_TITLE.into()
}

fn default_bootstrap_timeout_secs() -> u64 {
    DEFAULT_BOOTSTRAP_TIMEOUT_SECS
}

fn default_chat_timeout_secs() -> u64 {
    DEFAULT_CHAT_TIMEOUT_SECS
}

fn default_gateway_host() -> String {
    "0.0.0.0".into()
}

fn default_gateway_port() -> u16 {
    8055
}

fn default_gateway_deployment() -> String {
    "mas-coordinator".into()
}

fn default_max_body_bytes() -> usize {
    1_048_576
}

fn default_gateway_timeout_secs() -> u64 {
    300
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    pub fn prompt_set(&self) -> PromptSet {
        PromptSet::with_overrides(
            self.prompts.dispatch.as_deref(),
            self.prompts.synthesis.as_deref(),
        )
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("llm.endpoint", &self.llm.endpoint),
            ("agents.session_endpoint", &self.agents.session_endpoint),
        ] {
            let parsed = url::Url::parse(value)
                .map_err(|error| anyhow::anyhow!("{field} is not a valid URL ({value}): {error}"))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                bail!("{field} must be an http(s) URL, got {value}");
            }
        }

        for (field, value) in [
            ("llm.deployment", &self.llm.deployment),
            ("agents.general_deployment", &self.agents.general_deployment),
            ("gateway.deployment", &self.gateway.deployment),
        ] {
            if value.trim().is_empty() {
                bail!("{field} must not be empty");
            }
        }

        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            bail!(
                "log_level must be one of {}, got {}",
                LOG_LEVELS.join(", "),
                self.log_level
            );
        }
        Ok(())
    }
}
