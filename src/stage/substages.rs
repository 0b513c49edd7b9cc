use super::{StageHandle, StageMultiplexer, StageStatus};
use crate::conversation::Attachment;
use crate::error::StageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// A nested progress event as it travels in `custom_content.stages`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl StageEvent {
    /// Terminal status carried by this event, if any.
    pub fn terminal_status(&self) -> Option<StageStatus> {
        match self.status.as_deref() {
            Some("completed") => Some(StageStatus::Completed),
            Some("failed") => Some(StageStatus::Failed),
            _ => None,
        }
    }
}

/// Upstream stage index → locally opened stage, for one agent invocation.
pub struct SubStages<'m> {
    stages: &'m StageMultiplexer,
    open: BTreeMap<usize, StageHandle>,
}

impl<'m> SubStages<'m> {
    pub fn new(stages: &'m StageMultiplexer) -> Self {
        Self {
            stages,
            open: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Stage reconstructed for an upstream index.
    pub fn get(&self, upstream_index: usize) -> Option<&StageHandle> {
        self.open.get(&upstream_index)
    }

    /// Route one nested event to its stage, opening it on first sight.
    ///
    /// Writes aimed at an already-completed stage are dropped with a warning.
    pub fn apply(&mut self, event: &StageEvent) -> Result<(), StageError> {
        let stage = match self.open.entry(event.index) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let title = event
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("Step {}", event.index + 1));
                entry.insert(self.stages.open(title)?)
            }
        };

        let result = Self::apply_to(stage, event);
        match result {
            Err(StageError::Closed { index }) => {
                tracing::warn!(
                    upstream_index = event.index,
                    stage_index = index,
                    "dropping nested stage event for closed stage"
                );
                Ok(())
            }
            other => other,
        }
    }

    fn apply_to(stage: &mut StageHandle, event: &StageEvent) -> Result<(), StageError> {
        if let Some(content) = event.content.as_deref().filter(|text| !text.is_empty()) {
            stage.append_content(content)?;
        }
        for attachment in &event.attachments {
            stage.add_attachment(attachment.clone())?;
        }
        if let Some(status) = event.terminal_status() {
            stage.close_with(status)?;
        }
        Ok(())
    }

    /// Force-close everything still open. Never fails.
    pub fn close_all(&mut self) {
        for stage in self.open.values_mut() {
            stage.close_safely();
        }
    }
}

impl Drop for SubStages<'_> {
    fn drop(&mut self) {
        self.close_all();
    }
}
