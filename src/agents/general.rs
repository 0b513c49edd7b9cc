use super::{AgentFuture, AgentGateway, AgentReply, AgentTurn};
use crate::conversation::{AgentState, CustomContent, Message, delegate_turns, last_user_message};
use crate::dispatch::AgentName;
use crate::error::AgentError;
use crate::llm::{CompletionClient, CompletionRequest};
use crate::stage::SubStages;
use futures_util::StreamExt;
use serde_json::Value;
use std::sync::Arc;

pub const DEFAULT_GENERAL_DEPLOYMENT: &str = "general-purpose-agent";

const CONVERSATION_ID_HEADER: &str = "x-conversation-id";

/// Streams a model-backed agent deployment, replaying its private thread.
pub struct GeneralAgentGateway {
    client: Arc<dyn CompletionClient>,
    deployment: String,
}

impl GeneralAgentGateway {
    pub fn new(client: Arc<dyn CompletionClient>, deployment: impl Into<String>) -> Self {
        Self {
            client,
            deployment: deployment.into(),
        }
    }

    async fn run(&self, turn: AgentTurn<'_>) -> Result<AgentReply, AgentError> {
        let history = build_history(turn.conversation, turn.instructions)?;

        let mut request = CompletionRequest::new(&self.deployment, &history);
        if let Some(id) = turn.conversation_id {
            request = request.with_header(CONVERSATION_ID_HEADER, id);
        }
        let mut stream = self.client.stream(request).await?;

        let mut text = String::new();
        let mut attachments = Vec::new();
        let mut hidden = None;
        let mut sub_stages = SubStages::new(turn.stages);

        while let Some(delta) = stream.next().await {
            let delta = delta?;

            if let Some(content) = delta.content.as_deref().filter(|c| !c.is_empty()) {
                turn.stage.append_content(content)?;
                text.push_str(content);
            }

            let Some(custom) = delta.custom_content else {
                continue;
            };
            attachments.extend(custom.attachments);
            if let Some(state) = custom.state.filter(|state| !state.is_null()) {
                hidden = Some(state);
            }
            for event in &custom.stages {
                sub_stages.apply(event)?;
            }
        }

        tracing::debug!(
            deployment = %self.deployment,
            sub_stages = sub_stages.len(),
            attachments = attachments.len(),
            "general agent stream finished"
        );
        sub_stages.close_all();

        let surface = turn.stages.surface();
        for attachment in attachments {
            surface.add_attachment(attachment)?;
        }

        Ok(AgentReply {
            text,
            state: AgentState::Delegate {
                hidden: hidden.unwrap_or(Value::Null),
            },
        })
    }
}

impl AgentGateway for GeneralAgentGateway {
    fn name(&self) -> AgentName {
        AgentName::General
    }

    fn respond<'a>(&'a self, turn: AgentTurn<'a>) -> AgentFuture<'a> {
        Box::pin(self.run(turn))
    }
}

/// Outbound history: every past delegate exchange with its hidden thread
/// restored, then the latest user message.
pub fn build_history(
    conversation: &[Message],
    instructions: Option<&str>,
) -> Result<Vec<Message>, AgentError> {
    let mut history = Vec::new();

    for turn in delegate_turns(conversation) {
        if let Some(request) = turn.request {
            history.push(request.clone());
        }
        let mut replay = turn.reply.clone();
        let custom = replay.custom_content.get_or_insert_with(CustomContent::default);
        custom.state = (!turn.hidden.is_null()).then(|| turn.hidden.clone());
        history.push(replay);
    }

    let latest = last_user_message(conversation)
        .ok_or_else(|| AgentError::Protocol("conversation has no user message".into()))?;
    let mut latest = latest.clone();
    if let Some(instructions) = instructions {
        latest.content = format!("{}\n\n{instructions}", latest.content);
    }
    history.push(latest);

    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Attachment;
    use crate::error::LlmError;
    use crate::llm::{CompletionDelta, CompletionFuture, CompletionStream, DeltaCustomContent};
    use crate::stage::{
        RecordingSurface, ResponseSurface, StageEvent, StageMultiplexer, StageStatus, SurfaceEvent,
    };
    use serde_json::json;
    use std::sync::Mutex;

    /// Replays a fixed list of stream items and records what was sent.
    struct ScriptedStream {
        items: Mutex<Option<Vec<Result<CompletionDelta, LlmError>>>>,
        sent: Mutex<Vec<(Vec<Message>, Vec<(&'static str, String)>)>>,
    }

    impl ScriptedStream {
        fn new(items: Vec<Result<CompletionDelta, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                items: Mutex::new(Some(items)),
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    impl CompletionClient for ScriptedStream {
        fn complete<'a>(&'a self, request: CompletionRequest<'a>) -> CompletionFuture<'a, String> {
            let deployment = request.deployment.to_string();
            Box::pin(async move { Err(LlmError::EmptyResponse { deployment }) })
        }

        fn stream<'a>(
            &'a self,
            request: CompletionRequest<'a>,
        ) -> CompletionFuture<'a, CompletionStream> {
            self.sent
                .lock()
                .unwrap()
                .push((request.messages.to_vec(), request.headers.clone()));
            let items = self.items.lock().unwrap().take().unwrap_or_default();
            Box::pin(async move {
                Ok(Box::pin(futures_util::stream::iter(items)) as CompletionStream)
            })
        }
    }

    fn stage_delta(event: StageEvent) -> Result<CompletionDelta, LlmError> {
        Ok(CompletionDelta::metadata(DeltaCustomContent {
            stages: vec![event],
            ..DeltaCustomContent::default()
        }))
    }

    async fn respond(
        client: Arc<ScriptedStream>,
        conversation: &[Message],
        instructions: Option<&str>,
    ) -> (Arc<RecordingSurface>, Result<AgentReply, AgentError>) {
        let surface = Arc::new(RecordingSurface::new());
        let stages = StageMultiplexer::new(Arc::clone(&surface) as Arc<dyn ResponseSurface>);
        let mut stage = stages.open("Agent Execution: GPA").unwrap();
        let gateway = GeneralAgentGateway::new(client, DEFAULT_GENERAL_DEPLOYMENT);

        let result = gateway
            .respond(AgentTurn {
                conversation,
                instructions,
                conversation_id: Some("conv-1"),
                stages: &stages,
                stage: &mut stage,
            })
            .await;
        stage.close_safely();
        (surface, result)
    }

    fn closed_indices(events: &[SurfaceEvent]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|event| match event {
                SurfaceEvent::StageClosed { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn history_replays_hidden_threads_and_appends_instructions() {
        let attachment = Attachment {
            url: Some("files/report.pdf".into()),
            ..Attachment::default()
        };
        let conversation = vec![
            Message::user("first"),
            Message::assistant("public answer").with_state(&AgentState::Delegate {
                hidden: json!({"thread": ["tool call", "tool result"]}),
            }),
            Message::user("second"),
            Message::assistant("session answer").with_state(&AgentState::Session {
                session_id: "s".into(),
            }),
            Message {
                custom_content: Some(CustomContent {
                    attachments: vec![attachment.clone()],
                    state: None,
                }),
                ..Message::user("third")
            },
        ];

        let history = build_history(&conversation, Some("be brief")).unwrap();

        assert_eq!(history.len(), 3);
        assert_eq!(history[0], Message::user("first"));
        assert_eq!(history[1].content, "public answer");
        assert_eq!(
            history[1].state(),
            Some(&json!({"thread": ["tool call", "tool result"]}))
        );
        assert_eq!(history[2].content, "third\n\nbe brief");
        assert_eq!(
            history[2].custom_content.as_ref().unwrap().attachments,
            vec![attachment]
        );
    }

    #[test]
    fn history_without_user_message_is_protocol_error() {
        let err = build_history(&[Message::system("s")], None).unwrap_err();
        assert!(matches!(err, AgentError::Protocol(_)));
    }

    #[tokio::test]
    async fn text_accumulates_in_order_across_metadata_chunks() {
        let client = ScriptedStream::new(vec![
            Ok(CompletionDelta::text("one ")),
            stage_delta(StageEvent {
                index: 0,
                name: Some("Search".into()),
                ..StageEvent::default()
            }),
            Ok(CompletionDelta::text("two ")),
            Ok(CompletionDelta::metadata(DeltaCustomContent {
                state: Some(json!({"v": 1})),
                ..DeltaCustomContent::default()
            })),
            Ok(CompletionDelta::text("three")),
            Ok(CompletionDelta::metadata(DeltaCustomContent {
                state: Some(json!({"v": 2})),
                ..DeltaCustomContent::default()
            })),
        ]);

        let (surface, result) =
            respond(Arc::clone(&client), &[Message::user("go")], None).await;
        let reply = result.unwrap();

        assert_eq!(reply.text, "one two three");
        assert_eq!(
            reply.state,
            AgentState::Delegate {
                hidden: json!({"v": 2})
            }
        );
        // outer stage 0 and nested stage 1 both closed
        let mut closed = closed_indices(&surface.events());
        closed.sort_unstable();
        assert_eq!(closed, vec![0, 1]);

        let sent = client.sent.lock().unwrap();
        assert_eq!(sent[0].1, vec![("x-conversation-id", "conv-1".to_string())]);
    }

    #[tokio::test]
    async fn sub_stage_events_are_multiplexed_by_index() {
        let content = |index: usize, text: &str| StageEvent {
            index,
            content: Some(text.into()),
            ..StageEvent::default()
        };
        let client = ScriptedStream::new(vec![
            stage_delta(content(0, "a")),
            stage_delta(content(1, "b")),
            stage_delta(content(0, "c")),
            stage_delta(StageEvent {
                index: 0,
                status: Some("completed".into()),
                ..StageEvent::default()
            }),
        ]);

        let (surface, result) = respond(client, &[Message::user("go")], None).await;
        result.unwrap();
        let events = surface.events();

        let opened: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, SurfaceEvent::StageOpened { .. }))
            .collect();
        // execution stage + two nested
        assert_eq!(opened.len(), 3);

        let text_of = |index: usize| -> String {
            events
                .iter()
                .filter_map(|e| match e {
                    SurfaceEvent::StageContent { index: i, text } if *i == index => {
                        Some(text.as_str())
                    }
                    _ => None,
                })
                .collect()
        };
        assert_eq!(text_of(1), "ac");
        assert_eq!(text_of(2), "b");

        let nested_closes: Vec<_> = closed_indices(&events)
            .into_iter()
            .filter(|index| *index != 0)
            .collect();
        assert_eq!(nested_closes, vec![1, 2]);
    }

    #[tokio::test]
    async fn attachments_are_promoted_to_the_reply() {
        let chart = Attachment {
            title: Some("chart".into()),
            url: Some("files/chart.png".into()),
            ..Attachment::default()
        };
        let client = ScriptedStream::new(vec![
            Ok(CompletionDelta::metadata(DeltaCustomContent {
                attachments: vec![chart.clone()],
                ..DeltaCustomContent::default()
            })),
            Ok(CompletionDelta::text("see chart")),
        ]);

        let (surface, result) = respond(client, &[Message::user("plot")], None).await;
        let reply = result.unwrap();

        assert_eq!(reply.state, AgentState::Delegate { hidden: Value::Null });
        assert!(surface.events().contains(&SurfaceEvent::Attachment(chart)));
    }

    #[tokio::test]
    async fn stream_failure_still_closes_nested_stages() {
        let client = ScriptedStream::new(vec![
            stage_delta(StageEvent {
                index: 4,
                content: Some("working".into()),
                ..StageEvent::default()
            }),
            Err(LlmError::Stream {
                deployment: DEFAULT_GENERAL_DEPLOYMENT.into(),
                message: "reset".into(),
            }),
        ]);

        let (surface, result) = respond(client, &[Message::user("go")], None).await;
        assert!(matches!(result, Err(AgentError::Llm(LlmError::Stream { .. }))));

        let events = surface.events();
        assert!(events.contains(&SurfaceEvent::StageClosed {
            index: 1,
            status: StageStatus::Completed
        }));
        assert_eq!(closed_indices(&events).len(), 2);
    }
}
