// Pending partial lines and accumulated event data are both capped so a
// malformed or adversarial stream cannot grow the side buffers without
// bound. Anything past the caps is discarded; the bytes themselves were
// already forwarded to the client.
const MAX_PENDING_LINE_BYTES: usize = 128 * 1024;
const MAX_EVENT_DATA_BYTES: usize = 1024 * 1024;

/// Incremental parser over a server-sent-events byte stream, fed each
/// chunk as it is forwarded to the client. Works as a line state machine:
/// chunks are split on newlines, `data:` field values accumulate per
/// event, and a blank line completes the event and hands the joined
/// payload to the caller.
#[derive(Default)]
pub struct SseScanner {
    line: Vec<u8>,
    data: Vec<u8>,
    skipping_line: bool,
}

impl SseScanner {
    pub fn push(&mut self, chunk: &[u8], mut on_data: impl FnMut(&[u8])) {
        let mut rest = chunk;
        while let Some(newline) = rest.iter().position(|b| *b == b'\n') {
            let (head, tail) = rest.split_at(newline);
            rest = &tail[1..];

            if self.skipping_line {
                self.skipping_line = false;
                continue;
            }
            if self.line.is_empty() {
                self.consume_line(head, &mut on_data);
            } else {
                self.line.extend_from_slice(head);
                let line = std::mem::take(&mut self.line);
                self.consume_line(&line, &mut on_data);
            }
        }

        if rest.is_empty() || self.skipping_line {
            return;
        }
        if self.line.len() + rest.len() > MAX_PENDING_LINE_BYTES {
            // A line this long cannot be a usage event; drop it wholesale
            // and resynchronize at the next newline.
            self.line.clear();
            self.skipping_line = true;
        } else {
            self.line.extend_from_slice(rest);
        }
    }

    fn consume_line(&mut self, line: &[u8], on_data: &mut impl FnMut(&[u8])) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            if !self.data.is_empty() {
                on_data(&self.data);
                self.data.clear();
            }
            return;
        }
        // Only the data field matters here; comments and other fields pass
        // through uninspected.
        let Some(value) = line.strip_prefix(b"data:") else {
            return;
        };
        let value = value.strip_prefix(b" ").unwrap_or(value);
        if self.data.len() + value.len() >= MAX_EVENT_DATA_BYTES {
            self.data.clear();
            return;
        }
        if !self.data.is_empty() {
            self.data.push(b'\n');
        }
        self.data.extend_from_slice(value);
    }
}
