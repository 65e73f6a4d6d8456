use phonepilot_protocol::TaskEvent;
use tracing::debug;

/// Decodes the chunked task stream into typed records.
///
/// The wire format is newline-delimited `data: <JSON>` lines; everything else
/// (blank keep-alive lines, comment lines) is ignored. Chunk boundaries fall
/// anywhere, so the parser carries both an undecoded-UTF-8 tail and the
/// current unterminated line across calls and only emits complete lines.
/// A line that fails to decode is logged and dropped; it never ends the
/// stream.
#[derive(Debug, Default)]
pub struct EnvelopeParser {
    pending_utf8: Vec<u8>,
    pending_line: String,
}

impl EnvelopeParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk; returns every record completed by it.
    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<TaskEvent> {
        self.decode_chunk(chunk);
        self.drain_complete_lines()
    }

    /// Flush at end of stream. A final record without a trailing newline
    /// still counts.
    pub fn finish(&mut self) -> Vec<TaskEvent> {
        if !self.pending_utf8.is_empty() {
            debug!(
                "stream ended inside a UTF-8 sequence; dropping {} trailing bytes",
                self.pending_utf8.len()
            );
            self.pending_utf8.clear();
        }
        let tail = std::mem::take(&mut self.pending_line);
        match parse_line(tail.trim_end_matches('\r')) {
            Some(event) => vec![event],
            None => Vec::new(),
        }
    }

    /// Appends the decodable prefix of the buffered bytes to `pending_line`,
    /// keeping a partial trailing code point buffered for the next chunk.
    /// Invalid sequences decode to U+FFFD, matching a non-fatal text decoder.
    fn decode_chunk(&mut self, chunk: &[u8]) {
        self.pending_utf8.extend_from_slice(chunk);
        loop {
            let (valid_up_to, error_len) = match std::str::from_utf8(&self.pending_utf8) {
                Ok(_) => (self.pending_utf8.len(), None),
                Err(err) => (err.valid_up_to(), err.error_len()),
            };
            if valid_up_to > 0
                && let Ok(text) = std::str::from_utf8(&self.pending_utf8[..valid_up_to])
            {
                self.pending_line.push_str(text);
            }
            match error_len {
                None => {
                    // Either everything decoded or a partial code point is
                    // left; both end this chunk.
                    self.pending_utf8.drain(..valid_up_to);
                    return;
                }
                Some(len) => {
                    self.pending_line.push(char::REPLACEMENT_CHARACTER);
                    self.pending_utf8.drain(..valid_up_to + len);
                }
            }
        }
    }

    fn drain_complete_lines(&mut self) -> Vec<TaskEvent> {
        let mut events = Vec::new();
        while let Some(newline) = self.pending_line.find('\n') {
            let rest = self.pending_line.split_off(newline + 1);
            let mut line = std::mem::replace(&mut self.pending_line, rest);
            line.truncate(newline);
            if let Some(event) = parse_line(line.trim_end_matches('\r')) {
                events.push(event);
            }
        }
        events
    }
}

fn parse_line(line: &str) -> Option<TaskEvent> {
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload.is_empty() {
        return None;
    }
    match serde_json::from_str::<TaskEvent>(payload) {
        Ok(event) => Some(event),
        Err(err) => {
            let mut end = payload.len().min(256);
            while !payload.is_char_boundary(end) {
                end -= 1;
            }
            debug!(
                "dropping malformed stream record: {err}, data: {}",
                &payload[..end]
            );
            None
        }
    }
}
