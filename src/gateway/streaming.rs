use super::types::{
    ChatCompletion, ChatCompletionChunk, ChoiceMessage, ChunkChoice, ChunkDelta, Choice,
    ErrorBody, ResponseCustomContent,
};
use crate::conversation::Role;
use crate::coordinator::FinalReply;
use crate::error::CoordinatorError;
use crate::stage::{StageEvent, SurfaceEvent};
use axum::body::Body;
use axum::http::{Response, StatusCode, header};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// The only failure text a caller ever sees; details stay in the logs.
pub const GENERIC_FAILURE: &str = "The coordinator failed to process this request.";

/// Shared id/model/timestamp for every chunk of one response.
#[derive(Debug, Clone)]
pub struct ChunkFactory {
    id: String,
    model: String,
    created: i64,
}

impl ChunkFactory {
    pub fn new(model: &str) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            model: model.to_string(),
            created: chrono::Utc::now().timestamp(),
        }
    }

    pub fn chunk(&self, delta: ChunkDelta, finish_reason: Option<&'static str>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk",
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        }
    }

    pub fn completion(&self, message: ChoiceMessage) -> ChatCompletion {
        ChatCompletion {
            id: self.id.clone(),
            object: "chat.completion",
            created: self.created,
            model: self.model.clone(),
            choices: vec![Choice {
                index: 0,
                message,
                finish_reason: "stop",
            }],
        }
    }
}

fn stage_delta(event: StageEvent) -> ChunkDelta {
    metadata_delta(ResponseCustomContent {
        stages: vec![event],
        ..ResponseCustomContent::default()
    })
}

fn metadata_delta(custom_content: ResponseCustomContent) -> ChunkDelta {
    ChunkDelta {
        custom_content: Some(custom_content),
        ..ChunkDelta::default()
    }
}

/// One surface event as a streamed chat-completion delta.
pub fn delta_for_event(event: SurfaceEvent) -> ChunkDelta {
    match event {
        SurfaceEvent::Content(text) => ChunkDelta {
            content: Some(text),
            ..ChunkDelta::default()
        },
        SurfaceEvent::Attachment(attachment) => metadata_delta(ResponseCustomContent {
            attachments: vec![attachment],
            ..ResponseCustomContent::default()
        }),
        SurfaceEvent::State(state) => metadata_delta(ResponseCustomContent {
            state: Some(state),
            ..ResponseCustomContent::default()
        }),
        SurfaceEvent::StageOpened { index, name } => stage_delta(StageEvent {
            index,
            name: Some(name),
            ..StageEvent::default()
        }),
        SurfaceEvent::StageContent { index, text } => stage_delta(StageEvent {
            index,
            content: Some(text),
            ..StageEvent::default()
        }),
        SurfaceEvent::StageAttachment { index, attachment } => stage_delta(StageEvent {
            index,
            attachments: vec![attachment],
            ..StageEvent::default()
        }),
        SurfaceEvent::StageClosed { index, status } => stage_delta(StageEvent {
            index,
            status: Some(status.to_string()),
            ..StageEvent::default()
        }),
    }
}

fn sse_frame(value: &impl Serialize) -> Option<String> {
    serde_json::to_string(value)
        .ok()
        .map(|json| format!("data: {json}\n\n"))
}

/// Stream surface events as they happen, then the turn's outcome, then `[DONE]`.
pub fn build_sse_response(
    factory: ChunkFactory,
    mut events: mpsc::UnboundedReceiver<SurfaceEvent>,
    turn: JoinHandle<Result<FinalReply, CoordinatorError>>,
) -> Response<Body> {
    let stream = async_stream::stream! {
        let opening = ChunkDelta {
            role: Some(Role::Assistant),
            ..ChunkDelta::default()
        };
        if let Some(frame) = sse_frame(&factory.chunk(opening, None)) {
            yield Ok::<_, std::convert::Infallible>(frame);
        }

        while let Some(event) = events.recv().await {
            if let Some(frame) = sse_frame(&factory.chunk(delta_for_event(event), None)) {
                yield Ok(frame);
            }
        }

        let closing = match turn.await {
            Ok(Ok(_)) => sse_frame(&factory.chunk(ChunkDelta::default(), Some("stop"))),
            Ok(Err(_)) => sse_frame(&ErrorBody::new(GENERIC_FAILURE, "server_error")),
            Err(join_error) => {
                tracing::error!("coordinator task aborted: {join_error}");
                sse_frame(&ErrorBody::new(GENERIC_FAILURE, "server_error"))
            }
        };
        if let Some(frame) = closing {
            yield Ok(frame);
        }
        yield Ok("data: [DONE]\n\n".to_string());
    };

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/event-stream"),
    );
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-cache"),
    );
    response
}

fn stage_entry(stages: &mut BTreeMap<usize, StageEvent>, index: usize) -> &mut StageEvent {
    stages.entry(index).or_insert_with(|| StageEvent {
        index,
        ..StageEvent::default()
    })
}

/// Fold recorded events into the metadata of a single non-streamed reply.
pub fn aggregate_events(events: Vec<SurfaceEvent>) -> ResponseCustomContent {
    let mut aggregated = ResponseCustomContent::default();
    let mut stages: BTreeMap<usize, StageEvent> = BTreeMap::new();

    for event in events {
        match event {
            SurfaceEvent::Content(_) => {}
            SurfaceEvent::Attachment(attachment) => aggregated.attachments.push(attachment),
            SurfaceEvent::State(state) => aggregated.state = Some(state),
            SurfaceEvent::StageOpened { index, name } => {
                stage_entry(&mut stages, index).name = Some(name);
            }
            SurfaceEvent::StageContent { index, text } => {
                stage_entry(&mut stages, index)
                    .content
                    .get_or_insert_with(String::new)
                    .push_str(&text);
            }
            SurfaceEvent::StageAttachment { index, attachment } => {
                stage_entry(&mut stages, index).attachments.push(attachment);
            }
            SurfaceEvent::StageClosed { index, status } => {
                stage_entry(&mut stages, index).status = Some(status.to_string());
            }
        }
    }

    aggregated.stages = stages.into_values().collect();
    aggregated
}
