//! Incremental line decoding for the streamed query response.
//! Transport fragments arrive at arbitrary boundaries; this reassembles UTF-8
//! below the line-splitting layer so a fragment may end mid-character or
//! mid-line without corrupting content.

/// Turns raw byte fragments into complete text lines.
///
/// Bytes that end in the middle of a multi-byte sequence stay buffered until
/// the rest arrives; text without a trailing newline stays buffered until a
/// terminator arrives. Each complete line is yielded exactly once, in order.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending_bytes: Vec<u8>,
    pending_text: String,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport fragment and drain every line it completes.
    pub fn push(&mut self, fragment: &[u8]) -> Vec<String> {
        self.pending_bytes.extend_from_slice(fragment);
        self.decode_pending_bytes();
        self.drain_lines()
    }

    /// End of source. Returns the buffered unterminated remainder, if any;
    /// the stream is expected to close on a line boundary, so callers discard it.
    pub fn finish(mut self) -> Option<String> {
        self.decode_pending_bytes();
        let mut remainder = self.pending_text;
        if !self.pending_bytes.is_empty() {
            remainder.push_str(&String::from_utf8_lossy(&self.pending_bytes));
        }
        if remainder.is_empty() {
            None
        } else {
            Some(remainder)
        }
    }

    /// Move every decodable byte into `pending_text`, keeping only a trailing
    /// incomplete UTF-8 sequence buffered. Invalid sequences (not merely
    /// truncated ones) are replaced with U+FFFD and skipped.
    fn decode_pending_bytes(&mut self) {
        loop {
            match std::str::from_utf8(&self.pending_bytes) {
                Ok(text) => {
                    self.pending_text.push_str(text);
                    self.pending_bytes.clear();
                    return;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    self.pending_text
                        .push_str(&String::from_utf8_lossy(&self.pending_bytes[..valid]));
                    match err.error_len() {
                        // Truncated sequence at the end: wait for more bytes.
                        None => {
                            self.pending_bytes.drain(..valid);
                            return;
                        }
                        Some(bad) => {
                            self.pending_text.push('\u{FFFD}');
                            self.pending_bytes.drain(..valid + bad);
                        }
                    }
                }
            }
        }
    }

    fn drain_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.pending_text.find('\n') {
            let rest = self.pending_text.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.pending_text, rest);
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }
}
