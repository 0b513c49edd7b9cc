use crate::conversation::Attachment;
use crate::error::SurfaceError;
use serde_json::Value;
use std::sync::{Mutex, PoisonError};
use strum::Display;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum StageStatus {
    Completed,
    Failed,
}

/// One observable change on the user-facing response.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Content(String),
    Attachment(Attachment),
    State(Value),
    StageOpened { index: usize, name: String },
    StageContent { index: usize, text: String },
    StageAttachment { index: usize, attachment: Attachment },
    StageClosed { index: usize, status: StageStatus },
}

/// The front end's reply primitives for a single choice.
///
/// Implementors only need [`emit`](Self::emit); the helpers exist so call
/// sites read like the operation they perform.
pub trait ResponseSurface: Send + Sync {
    fn emit(&self, event: SurfaceEvent) -> Result<(), SurfaceError>;

    fn append_content(&self, text: &str) -> Result<(), SurfaceError> {
        self.emit(SurfaceEvent::Content(text.to_string()))
    }

    fn add_attachment(&self, attachment: Attachment) -> Result<(), SurfaceError> {
        self.emit(SurfaceEvent::Attachment(attachment))
    }

    fn set_state(&self, state: Value) -> Result<(), SurfaceError> {
        self.emit(SurfaceEvent::State(state))
    }

    fn open_stage(&self, index: usize, name: &str) -> Result<(), SurfaceError> {
        self.emit(SurfaceEvent::StageOpened {
            index,
            name: name.to_string(),
        })
    }

    fn stage_content(&self, index: usize, text: &str) -> Result<(), SurfaceError> {
        self.emit(SurfaceEvent::StageContent {
            index,
            text: text.to_string(),
        })
    }

    fn stage_attachment(&self, index: usize, attachment: Attachment) -> Result<(), SurfaceError> {
        self.emit(SurfaceEvent::StageAttachment { index, attachment })
    }

    fn close_stage(&self, index: usize, status: StageStatus) -> Result<(), SurfaceError> {
        self.emit(SurfaceEvent::StageClosed { index, status })
    }
}

/// Forwards events to a consumer task (the streaming HTTP response).
#[derive(Debug, Clone)]
pub struct ChannelSurface {
    sender: mpsc::UnboundedSender<SurfaceEvent>,
}

impl ChannelSurface {
    pub fn new(sender: mpsc::UnboundedSender<SurfaceEvent>) -> Self {
        Self { sender }
    }
}

impl ResponseSurface for ChannelSurface {
    fn emit(&self, event: SurfaceEvent) -> Result<(), SurfaceError> {
        self.sender
            .send(event)
            .map_err(|_| SurfaceError::Disconnected)
    }
}

/// Keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    events: Mutex<Vec<SurfaceEvent>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Concatenated top-level content.
    pub fn content(&self) -> String {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SurfaceEvent::Content(text) => Some(text),
                _ => None,
            })
            .collect()
    }
}

impl ResponseSurface for RecordingSurface {
    fn emit(&self, event: SurfaceEvent) -> Result<(), SurfaceError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}
