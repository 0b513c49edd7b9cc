//! Incremental server-sent-event framing over a chunked byte stream.

pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Default)]
pub struct SseBuffer {
    buffer: String,
    /// Trailing bytes of a character split across chunks.
    pending: Vec<u8>,
}

impl SseBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            pending: Vec::new(),
        }
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(error) => {
                    let valid = error.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match error.error_len() {
                        Some(invalid) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + invalid);
                        }
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        // a CR may end one chunk and its LF start the next
        if self.buffer.contains("\r\n") {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
    }

    /// Next complete event block (terminated by a blank line).
    pub fn next_event_block(&mut self) -> Option<String> {
        let boundary = self.buffer.find("\n\n")?;
        let remaining = self.buffer.split_off(boundary + 2);
        Some(std::mem::replace(&mut self.buffer, remaining))
    }

    /// Next complete line, without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let boundary = self.buffer.find('\n')?;
        let remaining = self.buffer.split_off(boundary + 1);
        let mut line = std::mem::replace(&mut self.buffer, remaining);
        line.truncate(boundary);
        Some(line)
    }

    /// Whatever is left once the byte stream has ended.
    pub fn take_remainder(&mut self) -> Option<String> {
        let mut rest = std::mem::take(&mut self.buffer);
        rest.push_str(&String::from_utf8_lossy(&std::mem::take(&mut self.pending)));
        (!rest.trim().is_empty()).then_some(rest)
    }
}

/// Payload of a `data:` line, if the line is one.
pub fn data_payload(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?;
    Some(data.strip_prefix(' ').unwrap_or(data).trim_end())
}

pub fn parse_data_lines(event_block: &str) -> Vec<&str> {
    event_block.lines().filter_map(data_payload).collect()
}

pub fn parse_data_lines_without_done(event_block: &str) -> Vec<&str> {
    parse_data_lines(event_block)
        .into_iter()
        .filter(|data| *data != DONE_SENTINEL)
        .collect()
}
