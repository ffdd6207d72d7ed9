//! Incremental server-sent events parser.
//!
//! Only `data:` lines matter for Gemini streams; an event's data lines are
//! joined with `\n`. Carriage returns are dropped so `\r\n\r\n` framing works.

use bytes::Bytes;

#[derive(Default)]
pub(crate) struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    /// Feeds a chunk, returning the data of every event it completed.
    pub(crate) fn process(&mut self, chunk: &Bytes) -> Vec<String> {
        self.buffer
            .extend(chunk.iter().copied().filter(|&b| b != b'\r'));

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let raw: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            if let Some(data) = Self::event_data(&raw[..pos]) {
                events.push(data);
            }
        }
        events
    }

    /// Data of a trailing event not terminated by a blank line.
    pub(crate) fn finish(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.buffer);
        Self::event_data(&raw)
    }

    fn event_data(raw: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(raw);
        let mut data: Option<String> = None;

        for line in text.lines() {
            let Some(value) = line.strip_prefix("data:") else {
                continue;
            };
            let value = value.strip_prefix(' ').unwrap_or(value);
            match data.as_mut() {
                Some(d) => {
                    d.push('\n');
                    d.push_str(value);
                }
                None => data = Some(value.to_string()),
            }
        }
        data
    }
}
