//! Progress stages shown alongside a reply.
//!
//! A [`StageHandle`] is owned by whoever opened it and is closed exactly once:
//! explicitly through [`StageHandle::close`] / [`StageHandle::close_safely`], or
//! on drop if its owner returned early. Closing twice is a no-op.

mod substages;
mod surface;

pub use substages::{StageEvent, SubStages};
pub use surface::{ChannelSurface, RecordingSurface, ResponseSurface, StageStatus, SurfaceEvent};

use crate::conversation::Attachment;
use crate::error::StageError;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Allocates stage indices for one response and opens stages on its surface.
pub struct StageMultiplexer {
    surface: Arc<dyn ResponseSurface>,
    next_index: AtomicUsize,
}

impl StageMultiplexer {
    pub fn new(surface: Arc<dyn ResponseSurface>) -> Self {
        Self {
            surface,
            next_index: AtomicUsize::new(0),
        }
    }

    pub fn open(&self, title: impl Into<String>) -> Result<StageHandle, StageError> {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let name = title.into();
        self.surface.open_stage(index, &name)?;
        tracing::debug!(stage_index = index, stage = %name, "stage opened");

        Ok(StageHandle {
            index,
            name,
            content: String::new(),
            attachments: Vec::new(),
            closed: None,
            surface: Arc::clone(&self.surface),
        })
    }

    pub fn surface(&self) -> &Arc<dyn ResponseSurface> {
        &self.surface
    }

    /// Number of stages opened so far.
    pub fn opened(&self) -> usize {
        self.next_index.load(Ordering::Relaxed)
    }
}

pub struct StageHandle {
    index: usize,
    name: String,
    content: String,
    attachments: Vec<Attachment>,
    closed: Option<StageStatus>,
    surface: Arc<dyn ResponseSurface>,
}

impl StageHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn is_open(&self) -> bool {
        self.closed.is_none()
    }

    pub fn status(&self) -> Option<StageStatus> {
        self.closed
    }

    pub fn append_content(&mut self, text: &str) -> Result<(), StageError> {
        self.ensure_open()?;
        if text.is_empty() {
            return Ok(());
        }
        self.surface.stage_content(self.index, text)?;
        self.content.push_str(text);
        Ok(())
    }

    pub fn add_attachment(&mut self, attachment: Attachment) -> Result<(), StageError> {
        self.ensure_open()?;
        self.surface
            .stage_attachment(self.index, attachment.clone())?;
        self.attachments.push(attachment);
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), StageError> {
        self.close_with(StageStatus::Completed)
    }

    /// Close with an explicit status. No-op when already closed.
    pub fn close_with(&mut self, status: StageStatus) -> Result<(), StageError> {
        if self.closed.is_some() {
            return Ok(());
        }
        // Terminal even if the surface rejects the close event.
        self.closed = Some(status);
        self.surface.close_stage(self.index, status)?;
        tracing::debug!(stage_index = self.index, %status, "stage closed");
        Ok(())
    }

    /// Close without ever failing.
    pub fn close_safely(&mut self) {
        self.close_safely_with(StageStatus::Completed);
    }

    pub fn close_safely_with(&mut self, status: StageStatus) {
        if let Err(error) = self.close_with(status) {
            tracing::warn!(stage_index = self.index, "failed to close stage: {error}");
        }
    }

    fn ensure_open(&self) -> Result<(), StageError> {
        if self.closed.is_some() {
            return Err(StageError::Closed { index: self.index });
        }
        Ok(())
    }
}

impl std::fmt::Debug for StageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageHandle")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Drop for StageHandle {
    fn drop(&mut self) {
        if self.closed.is_none() {
            self.close_safely_with(StageStatus::Failed);
        }
    }
}
