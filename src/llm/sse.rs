//! Server-Sent Events parser for streamed completions.
//!
//! Turns a byte stream into [`SseEvent`]s. Handles multi-line `data:`
//! fields, event types, comment lines, CRLF line endings and the `[DONE]`
//! sentinel. Bytes are buffered until a full line is available, so a
//! multi-byte UTF-8 character split across two network chunks decodes
//! correctly.
//!
//! ```text
//! event: message
//! data: {"key": "value"}
//!
//! data: [DONE]
//! ```

/// A parsed Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The event type (from `event:`), if any.
    pub event_type: Option<String>,
    /// The data payload. Multiple `data:` lines are joined with `\n`.
    pub data: String,
    /// The event ID (from `id:`), if any.
    pub id: Option<String>,
}

impl SseEvent {
    /// Whether this event is the `[DONE]` sentinel.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

#[derive(Debug, Default)]
struct EventBuilder {
    event_type: Option<String>,
    data_lines: Vec<String>,
    id: Option<String>,
}

impl EventBuilder {
    fn has_data(&self) -> bool {
        !self.data_lines.is_empty()
    }

    fn build(&mut self) -> SseEvent {
        SseEvent {
            event_type: self.event_type.take(),
            data: std::mem::take(&mut self.data_lines).join("\n"),
            id: self.id.take(),
        }
    }

    /// Feed one line; an empty line closes the pending event.
    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.has_data().then(|| self.build());
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some((field, value)) = parse_field(line) {
            match field {
                "data" => self.data_lines.push(value.to_owned()),
                "event" => self.event_type = Some(value.to_owned()),
                "id" => self.id = Some(value.to_owned()),
                _ => {}
            }
        }
        None
    }
}

/// Split `field: value`, dropping one leading space from the value.
fn parse_field(line: &str) -> Option<(&str, &str)> {
    let (field, value) = line.split_once(':')?;
    Some((field, value.strip_prefix(' ').unwrap_or(value)))
}

/// Parse a complete SSE body into events.
pub fn parse_sse_text(text: &str) -> Vec<SseEvent> {
    let mut builder = EventBuilder::default();
    let mut events: Vec<SseEvent> = text
        .lines()
        .filter_map(|line| builder.process_line(line))
        .collect();
    if builder.has_data() {
        events.push(builder.build());
    }
    events
}

/// Incremental parser: push byte chunks, collect complete events.
#[derive(Debug, Default)]
pub struct SseLineParser {
    pending: Vec<u8>,
    builder: EventBuilder,
}

impl SseLineParser {
    /// Create an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes, returning the events it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(nl) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=nl).collect();
            let line = String::from_utf8_lossy(&raw[..nl]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(event) = self.builder.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event when the stream ends without a blank line.
    pub fn flush(&mut self) -> Option<SseEvent> {
        if !self.pending.is_empty() {
            let raw = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&raw);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            self.builder.process_line(line);
        }
        self.builder.has_data().then(|| self.builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_field_variants() {
        assert_eq!(parse_field("data: hello"), Some(("data", "hello")));
        assert_eq!(parse_field("data:hello"), Some(("data", "hello")));
        assert_eq!(parse_field("data:"), Some(("data", "")));
        assert_eq!(parse_field("data: {\"k\":\"v\"}"), Some(("data", "{\"k\":\"v\"}")));
        assert_eq!(parse_field("nodatahere"), None);
    }

    #[test]
    fn parse_text_with_multiline_data_and_comments() {
        let input = ": keep-alive\nevent: delta\ndata: a\ndata: b\nid: 7\n\ndata: [DONE]\n\n";
        let events = parse_sse_text(input);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type.as_deref(), Some("delta"));
        assert_eq!(events[0].data, "a\nb");
        assert_eq!(events[0].id.as_deref(), Some("7"));
        assert!(events[1].is_done());
    }

    #[test]
    fn incremental_push_across_chunks() {
        let mut parser = SseLineParser::new();
        assert!(parser.push(b"data: hel").is_empty());
        assert!(parser.push(b"lo\r\n").is_empty());
        let events = parser.push(b"\r\ndata: next\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
        let last = parser.flush().expect("trailing event");
        assert_eq!(last.data, "next");
        assert!(parser.flush().is_none());
    }

    #[test]
    fn multibyte_character_split_between_chunks() {
        let bytes = "data: impôt\n\n".as_bytes();
        let split = bytes.iter().position(|&b| b == 0xC3).expect("multibyte start") + 1;
        let mut parser = SseLineParser::new();
        assert!(parser.push(&bytes[..split]).is_empty());
        let events = parser.push(&bytes[split..]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "impôt");
    }
}
