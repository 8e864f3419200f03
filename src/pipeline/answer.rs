//! The generated answer payload.
//!
//! Generation returns `{"question", "reponse_redigee", "points_cles"}`,
//! possibly fenced or surrounded by chatter. [`parse_answer`] reads the
//! complete payload; [`AnswerStream`] decodes the answer string while the
//! payload is still arriving, so streamed chunks carry readable text rather
//! than JSON.

use serde_json::Value;

use crate::error::{PipelineError, Result};
use crate::structured;

/// Keys holding the answer text, in order of preference.
const ANSWER_KEYS: &[&str] = &["reponse_redigee", "answer"];
/// Keys holding the key points.
const KEY_POINT_KEYS: &[&str] = &["points_cles", "key_points"];

/// Pull the answer text and key points out of the generated payload.
///
/// Text that does not parse as an answer object is used verbatim.
///
/// # Errors
///
/// Returns [`PipelineError::Generation`] if there is no text at all.
pub fn parse_answer(raw: &str) -> Result<(String, Vec<String>)> {
    let value = structured::parse_object(raw);
    let text = ANSWER_KEYS
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map_or_else(|| raw.trim().to_owned(), str::to_owned);
    if text.is_empty() {
        return Err(PipelineError::Generation("empty answer".into()));
    }
    let key_points = KEY_POINT_KEYS
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_array))
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();
    Ok((text, key_points))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Nothing but whitespace seen yet.
    Detect,
    /// Inside a JSON payload, before the answer string.
    SeekKey,
    /// Inside the answer string.
    InValue,
    /// Answer string closed; the rest is dropped.
    Done,
    /// Not JSON: passed through as is.
    Raw,
}

/// Incremental decoder for a streamed answer payload.
///
/// Push raw chunks, get back the newly decoded answer text. Escapes split
/// across chunks are held until complete. A payload that does not start
/// with `{` or a code fence is passed through unchanged.
#[derive(Debug)]
pub struct AnswerStream {
    state: State,
    pending: String,
}

impl Default for AnswerStream {
    fn default() -> Self {
        Self::new()
    }
}

impl AnswerStream {
    pub fn new() -> Self {
        Self {
            state: State::Detect,
            pending: String::new(),
        }
    }

    /// Feed one raw chunk; returns the answer text it completed.
    pub fn push(&mut self, chunk: &str) -> String {
        self.pending.push_str(chunk);
        let mut out = String::new();
        loop {
            match self.state {
                State::Detect => {
                    let trimmed = self.pending.trim_start();
                    let Some(first) = trimmed.chars().next() else {
                        return out;
                    };
                    self.state = if first == '{' || first == '`' {
                        State::SeekKey
                    } else {
                        self.pending = trimmed.to_owned();
                        State::Raw
                    };
                }
                State::SeekKey => match value_start(&self.pending) {
                    Some(start) => {
                        self.pending.drain(..start);
                        self.state = State::InValue;
                    }
                    None => return out,
                },
                State::InValue => {
                    let (consumed, closed) = decode_string(&self.pending, &mut out);
                    self.pending.drain(..consumed);
                    if !closed {
                        return out;
                    }
                    self.state = State::Done;
                }
                State::Done => {
                    self.pending.clear();
                    return out;
                }
                State::Raw => {
                    out.push_str(&self.pending);
                    self.pending.clear();
                    return out;
                }
            }
        }
    }
}

/// Byte offset just past the opening quote of the answer string, once the
/// key, colon and quote have all arrived.
fn value_start(text: &str) -> Option<usize> {
    ANSWER_KEYS.iter().find_map(|key| {
        let quoted = format!("\"{key}\"");
        text.match_indices(&quoted).find_map(|(at, _)| {
            let after_key = at + quoted.len();
            let rest = &text[after_key..];
            let colon = rest.trim_start();
            let value = colon.strip_prefix(':')?.trim_start();
            value
                .starts_with('"')
                .then(|| text.len() - value.len() + 1)
        })
    })
}

/// Decode a JSON string body into `out`, stopping at the closing quote.
///
/// Returns the bytes consumed and whether the string closed. An escape cut
/// by the end of `text` is left unconsumed.
fn decode_string(text: &str, out: &mut String) -> (usize, bool) {
    let mut chars = text.char_indices();
    while let Some((at, ch)) = chars.next() {
        match ch {
            '"' => return (at + 1, true),
            '\\' => {
                let rest = &text[at + 1..];
                let Some(escape) = rest.chars().next() else {
                    return (at, false);
                };
                let skip = match escape {
                    'n' => {
                        out.push('\n');
                        1
                    }
                    't' => {
                        out.push('\t');
                        1
                    }
                    'r' => {
                        out.push('\r');
                        1
                    }
                    'b' | 'f' => 1,
                    'u' => match unicode_escape(rest) {
                        Some((decoded, len)) => {
                            out.push(decoded);
                            len
                        }
                        None => return (at, false),
                    },
                    other => {
                        out.push(other);
                        1
                    }
                };
                for _ in 0..skip {
                    chars.next();
                }
            }
            other => out.push(other),
        }
    }
    (text.len(), false)
}

/// Decode `uXXXX` at the start of `rest`, joining a following low
/// surrogate. Returns the char and the number of chars consumed, or `None`
/// when more input is needed.
fn unicode_escape(rest: &str) -> Option<(char, usize)> {
    if rest.len() < 5 {
        return None;
    }
    let hex = |range: std::ops::Range<usize>| rest.get(range).and_then(|h| u32::from_str_radix(h, 16).ok());
    let Some(code) = hex(1..5) else {
        return Some((char::REPLACEMENT_CHARACTER, 1));
    };
    if !(0xD800..0xDC00).contains(&code) {
        let decoded = char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER);
        return Some((decoded, 5));
    }
    if rest.len() < 11 {
        return None;
    }
    let low = rest
        .get(5..7)
        .filter(|marker| *marker == "\\u")
        .and_then(|_| hex(7..11))
        .filter(|low| (0xDC00..0xE000).contains(low));
    Some(match low {
        Some(low) => (
            char::from_u32(0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00))
                .unwrap_or(char::REPLACEMENT_CHARACTER),
            11,
        ),
        None => (char::REPLACEMENT_CHARACTER, 5),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_all(chunks: &[&str]) -> Vec<String> {
        let mut stream = AnswerStream::new();
        chunks.iter().map(|c| stream.push(c)).collect()
    }

    #[test]
    fn parse_answer_reads_french_keys() {
        let raw = "```json\n{\"question\": \"q\", \"reponse_redigee\": \"## Réponse\", \"points_cles\": [\"a\", \" \", \"b\"]}\n```";
        let (text, points) = parse_answer(raw).expect("answer");
        assert_eq!(text, "## Réponse");
        assert_eq!(points, vec!["a", "b"]);
    }

    #[test]
    fn parse_answer_reads_english_keys() {
        let (text, points) =
            parse_answer("{\"answer\": \"ok\", \"key_points\": [\"x\"]}").expect("answer");
        assert_eq!(text, "ok");
        assert_eq!(points, vec!["x"]);
    }

    #[test]
    fn parse_answer_falls_back_to_raw_text() {
        let (text, points) = parse_answer("  Texte libre sans JSON.  ").expect("answer");
        assert_eq!(text, "Texte libre sans JSON.");
        assert!(points.is_empty());
    }

    #[test]
    fn empty_generation_is_an_error() {
        assert!(matches!(parse_answer("   "), Err(PipelineError::Generation(_))));
    }

    #[test]
    fn stream_yields_only_the_answer_string() {
        let out = stream_all(&[
            "{\"question\": \"TVA ?\", \"repon",
            "se_redigee\" : \"## Régime\\nLa marge",
            " est taxable.\", \"points_cles\": [\"Article 297 A\"]}",
        ]);
        assert_eq!(out, vec!["", "## Régime\nLa marge", " est taxable."]);
    }

    #[test]
    fn streamed_text_matches_parsed_answer() {
        let chunks = [
            "```json\n{\"question\": \"q\", ",
            "\"reponse_redigee\": \"Selon l\\u00e9",
            "gislation, l\\\"abattement\\\" ",
            "s'applique\\\\.\", \"points_cles\": []}\n```",
        ];
        let streamed: String = stream_all(&chunks).concat();
        let (parsed, _) = parse_answer(&chunks.concat()).expect("answer");
        assert_eq!(streamed, parsed);
        assert_eq!(streamed, "Selon législation, l\"abattement\" s'applique\\.");
    }

    #[test]
    fn escapes_split_between_chunks() {
        let chunks = ["{\"answer\": \"a\\", "nb\\u00", "e9\\ud83d", "\\ude00\"}"];
        let out: String = stream_all(&chunks).concat();
        assert_eq!(out, "a\nbé😀");
    }

    #[test]
    fn plain_text_passes_through() {
        let out = stream_all(&["  \n", "Réponse libre", " sans JSON."]);
        assert_eq!(out, vec!["", "Réponse libre", " sans JSON."]);
    }

    #[test]
    fn payload_without_answer_key_streams_nothing() {
        let out: String = stream_all(&["{\"question\": \"q\", ", "\"autre\": \"x\"}"]).concat();
        assert!(out.is_empty());
    }
}
