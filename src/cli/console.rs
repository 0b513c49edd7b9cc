use crate::error::SurfaceError;
use crate::stage::{ResponseSurface, StageStatus, SurfaceEvent};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

type Sink = Box<dyn Write + Send>;

struct Console {
    out: Sink,
    err: Sink,
    stage_names: HashMap<usize, String>,
    /// Stage text not yet ended by a newline.
    partial_lines: HashMap<usize, String>,
}

impl Console {
    fn progress(&mut self, line: std::fmt::Arguments<'_>) -> std::io::Result<()> {
        writeln!(self.err, "{line}")
    }

    fn stage_text(&mut self, index: usize, text: &str) -> std::io::Result<()> {
        let mut pending = self.partial_lines.remove(&index).unwrap_or_default();
        pending.push_str(text);

        let complete = pending.rfind('\n').map_or(0, |end| end + 1);
        let rest = pending.split_off(complete);
        for line in pending.lines().filter(|line| !line.trim().is_empty()) {
            self.progress(format_args!("[{index}]   {line}"))?;
        }
        if !rest.is_empty() {
            self.partial_lines.insert(index, rest);
        }
        Ok(())
    }

    fn flush_stage(&mut self, index: usize) -> std::io::Result<()> {
        match self.partial_lines.remove(&index) {
            Some(rest) if !rest.trim().is_empty() => {
                self.progress(format_args!("[{index}]   {}", rest.trim_end()))
            }
            _ => Ok(()),
        }
    }

    fn write(&mut self, event: SurfaceEvent) -> std::io::Result<()> {
        match event {
            SurfaceEvent::Content(text) => {
                self.out.write_all(text.as_bytes())?;
                self.out.flush()
            }
            SurfaceEvent::Attachment(attachment) => {
                let label = attachment
                    .title
                    .or(attachment.url)
                    .unwrap_or_else(|| "attachment".into());
                self.progress(format_args!("[attachment] {label}"))
            }
            SurfaceEvent::State(_) => Ok(()),
            SurfaceEvent::StageOpened { index, name } => {
                self.progress(format_args!("[{index}] > {name}"))?;
                self.stage_names.insert(index, name);
                Ok(())
            }
            SurfaceEvent::StageContent { index, text } => self.stage_text(index, &text),
            SurfaceEvent::StageAttachment { index, attachment } => {
                let label = attachment.title.unwrap_or_else(|| "attachment".into());
                self.progress(format_args!("[{index}]   + {label}"))
            }
            SurfaceEvent::StageClosed { index, status } => {
                self.flush_stage(index)?;
                let mark = match status {
                    StageStatus::Completed => "done",
                    StageStatus::Failed => "failed",
                };
                let name = self
                    .stage_names
                    .get(&index)
                    .cloned()
                    .unwrap_or_else(|| format!("stage {index}"));
                self.progress(format_args!("[{index}] < {name} ({mark})"))
            }
        }
    }
}

/// Terminal surface for `ask`: answer text on stdout, stage progress on stderr.
///
/// Stage text is printed a line at a time; a write failure (closed pipe)
/// ends the turn as a disconnect.
pub struct ConsoleSurface {
    console: Mutex<Console>,
}

impl ConsoleSurface {
    pub fn new() -> Self {
        Self::with_writers(Box::new(std::io::stdout()), Box::new(std::io::stderr()))
    }

    pub fn with_writers(out: Sink, err: Sink) -> Self {
        Self {
            console: Mutex::new(Console {
                out,
                err,
                stage_names: HashMap::new(),
                partial_lines: HashMap::new(),
            }),
        }
    }
}

impl std::fmt::Debug for ConsoleSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSurface").finish_non_exhaustive()
    }
}

impl ResponseSurface for ConsoleSurface {
    fn emit(&self, event: SurfaceEvent) -> Result<(), SurfaceError> {
        self.console
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(event)
            .map_err(|error| {
                tracing::debug!("console write failed: {error}");
                SurfaceError::Disconnected
            })
    }
}
