use super::Config;

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) =
            std::env::var("MAS_LLM_ENDPOINT").or_else(|_| std::env::var("DIAL_ENDPOINT"))
            && !endpoint.is_empty()
        {
            self.llm.endpoint = endpoint;
        }

        if let Ok(deployment) =
            std::env::var("MAS_DEPLOYMENT").or_else(|_| std::env::var("DEPLOYMENT_NAME"))
            && !deployment.is_empty()
        {
            self.llm.deployment = deployment;
        }

        if let Ok(endpoint) = std::env::var("MAS_SESSION_AGENT_ENDPOINT")
            .or_else(|_| std::env::var("UMS_AGENT_ENDPOINT"))
            && !endpoint.is_empty()
        {
            self.agents.session_endpoint = endpoint;
        }

        if let Ok(level) = std::env::var("MAS_LOG_LEVEL").or_else(|_| std::env::var("LOG_LEVEL"))
            && !level.is_empty()
        {
            self.log_level = level.to_ascii_lowercase();
        }

        if let Ok(host) = std::env::var("MAS_GATEWAY_HOST").or_else(|_| std::env::var("HOST"))
            && !host.is_empty()
        {
            self.gateway.host = host;
        }

        if let Ok(port_str) =
            std::env::var("MAS_GATEWAY_PORT").or_else(|_| std::env::var("PORT"))
            && let Ok(port) = port_str.parse::<u16>()
        {
            self.gateway.port = port;
        }
    }
}
