//! Policy texts for the two model calls the coordinator makes itself.

use serde::{Deserialize, Serialize};

pub const DEFAULT_DISPATCH_PROMPT: &str = "\
You are the dispatcher of a multi-agent system.

## Objective
Work out what the user wants and hand the task to the agent best suited to it.

## Agents
- **GPA (general-purpose agent):** general questions, web search, document analysis, \
running Python for data work, and generating or recognizing images.
- **UMS (user management service agent):** anything about system users. It creates, \
reads, updates and deletes users, searches the user directory, and can look things up \
on the web to enrich a profile.

## Rules
1. Identify the core request in the user's latest message.
2. Pick exactly one agent: GPA or UMS.
3. Only when the request is vague, add a short instruction for the chosen agent in \
`additional_instructions`. Never restate the user's message.
";

pub const DEFAULT_SYNTHESIS_PROMPT: &str = "\
You write the final answer the user sees after an agent has done the work.

## Input
The last message contains:
- **CONTEXT:** what the agent produced.
- **USER_REQUEST:** what the user originally asked.

## Rules
- Answer the USER_REQUEST using only the CONTEXT.
- Keep the tone professional and easy to read.
- If the CONTEXT does not fully answer the request, give the best answer it supports \
and say what is missing.
";

/// Dispatch and synthesis policies, fixed for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSet {
    pub dispatch: String,
    pub synthesis: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            dispatch: DEFAULT_DISPATCH_PROMPT.to_string(),
            synthesis: DEFAULT_SYNTHESIS_PROMPT.to_string(),
        }
    }
}

impl PromptSet {
    /// Built-in texts with optional per-policy overrides.
    pub fn with_overrides(dispatch: Option<&str>, synthesis: Option<&str>) -> Self {
        let defaults = Self::default();
        Self {
            dispatch: dispatch.map_or(defaults.dispatch, str::to_string),
            synthesis: synthesis.map_or(defaults.synthesis, str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_prompt_names_every_agent() {
        let prompts = PromptSet::default();
        assert!(prompts.dispatch.contains("GPA"));
        assert!(prompts.dispatch.contains("UMS"));
        assert!(prompts.synthesis.contains("USER_REQUEST"));
    }

    #[test]
    fn overrides_replace_only_what_is_given() {
        let prompts = PromptSet::with_overrides(Some("route it"), None);
        assert_eq!(prompts.dispatch, "route it");
        assert_eq!(prompts.synthesis, DEFAULT_SYNTHESIS_PROMPT);
    }
}
