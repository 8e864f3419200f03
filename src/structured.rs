//! Best-effort extraction of JSON values from language-model output.
//!
//! Model answers are supposed to be JSON but often arrive wrapped in prose,
//! inside a fenced code block, or with single quotes. [`parse`] runs an
//! ordered chain of strategies, cheapest and most precise first, and stops
//! at the first one that yields a value of the expected [`Shape`]. When
//! every strategy fails it returns an empty object or array. It never
//! fails and never returns `null`.
//!
//! # Examples
//!
//! ```
//! use fisca::structured::{parse, Shape};
//!
//! let value = parse("Sure! {\"a\":1}", Shape::Object);
//! assert_eq!(value, serde_json::json!({"a": 1}));
//!
//! let empty = parse("no json here", Shape::Array);
//! assert_eq!(empty, serde_json::json!([]));
//! ```

use serde_json::{Map, Value};

/// Structure a caller expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// A JSON object; the empty result is `{}`.
    Object,
    /// A JSON array; the empty result is `[]`.
    Array,
    /// Either; the empty result is `{}`.
    Any,
}

impl Shape {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::Any => value.is_object() || value.is_array(),
        }
    }

    fn empty(self) -> Value {
        match self {
            Self::Array => Value::Array(Vec::new()),
            Self::Object | Self::Any => Value::Object(Map::new()),
        }
    }

    fn openers(self) -> &'static [char] {
        match self {
            Self::Object => &['{'],
            Self::Array => &['['],
            Self::Any => &['{', '['],
        }
    }
}

/// One link of the chain: returns a value on success, `None` to pass on.
type Strategy = fn(&str, Shape) -> Option<Value>;

const STRATEGIES: &[(&str, Strategy)] = &[
    ("direct", parse_direct as Strategy),
    ("fenced", parse_fenced as Strategy),
    ("balanced", parse_balanced as Strategy),
    ("requoted", parse_requoted as Strategy),
    ("trimmed", parse_trimmed as Strategy),
];

/// Extract the first value of `shape` from `text`.
pub fn parse(text: &str, shape: Shape) -> Value {
    for (name, strategy) in STRATEGIES {
        if let Some(value) = strategy(text, shape)
            && shape.accepts(&value)
        {
            tracing::trace!(strategy = *name, "structured output parsed");
            return value;
        }
    }
    tracing::debug!(len = text.len(), "no structured value found, using empty");
    shape.empty()
}

/// Shorthand for [`parse`] with [`Shape::Object`].
pub fn parse_object(text: &str) -> Value {
    parse(text, Shape::Object)
}

/// Shorthand for [`parse`] with [`Shape::Array`].
pub fn parse_array(text: &str) -> Value {
    parse(text, Shape::Array)
}

fn strict(text: &str, shape: Shape) -> Option<Value> {
    serde_json::from_str::<Value>(text.trim())
        .ok()
        .filter(|v| shape.accepts(v))
}

fn parse_direct(text: &str, shape: Shape) -> Option<Value> {
    strict(text, shape)
}

/// Inner text of every ```` ``` ```` fenced block, language tag removed.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        let Some(close) = after.find("```") else {
            break;
        };
        let block = &after[..close];
        // The first line is a language tag when it holds no bracket.
        let inner = match block.find('\n') {
            Some(nl) if !block[..nl].contains(['{', '[']) => &block[nl + 1..],
            _ => block,
        };
        blocks.push(inner.trim());
        rest = &after[close + 3..];
    }
    blocks
}

fn parse_fenced(text: &str, shape: Shape) -> Option<Value> {
    fenced_blocks(text)
        .into_iter()
        .find_map(|block| strict(block, shape).or_else(|| parse_balanced(block, shape)))
}

/// Byte span of the balanced bracket group opening at `start`.
///
/// Brackets inside string literals are skipped.
fn balanced_span(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_balanced(text: &str, shape: Shape) -> Option<Value> {
    text.match_indices(shape.openers())
        .filter_map(|(start, _)| balanced_span(text, start))
        .find_map(|span| strict(span, shape))
}

fn parse_requoted(text: &str, shape: Shape) -> Option<Value> {
    if !text.contains('\'') {
        return None;
    }
    let requoted = text.replace('\'', "\"");
    strict(&requoted, shape).or_else(|| parse_balanced(&requoted, shape))
}

fn parse_trimmed(text: &str, shape: Shape) -> Option<Value> {
    let pairs: &[(char, char)] = match shape {
        Shape::Object => &[('{', '}')],
        Shape::Array => &[('[', ']')],
        Shape::Any => &[('{', '}'), ('[', ']')],
    };
    pairs.iter().find_map(|&(open, close)| {
        let start = text.find(open)?;
        let end = text.rfind(close)?;
        (end > start)
            .then(|| strict(&text[start..=end], shape))
            .flatten()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn direct_json_is_returned_as_is() {
        assert_eq!(parse_object(r#"{"a": [1, 2]}"#), json!({"a": [1, 2]}));
        assert_eq!(parse_array(" [\"x\"] "), json!(["x"]));
    }

    #[test]
    fn prose_prefix_is_skipped() {
        assert_eq!(parse_object("Sure! {\"a\":1}"), json!({"a": 1}));
    }

    #[test]
    fn fenced_block_with_language_tag() {
        let text = "Voici le résultat :\n```json\n{\"textes_legaux\": [\"Article 150-0 A CGI\"]}\n```\nBonne journée";
        assert_eq!(
            parse_object(text),
            json!({"textes_legaux": ["Article 150-0 A CGI"]})
        );
    }

    #[test]
    fn fenced_block_without_language_tag() {
        let text = "```\n[\"q1\", \"q2\"]\n```";
        assert_eq!(parse_array(text), json!(["q1", "q2"]));
    }

    #[test]
    fn brackets_inside_strings_do_not_break_the_scan() {
        let text = r#"Réponse : {"q": "article 39 } du CGI", "n": 2} fin"#;
        assert_eq!(parse_object(text), json!({"q": "article 39 } du CGI", "n": 2}));
    }

    #[test]
    fn single_quotes_are_normalised() {
        assert_eq!(parse_object("{'scores': {'AGENT_IS': 0.9}}"), json!({"scores": {"AGENT_IS": 0.9}}));
    }

    #[test]
    fn trailing_garbage_after_object() {
        let text = "{\"a\": 1}} extra";
        assert_eq!(parse_object(text), json!({"a": 1}));
    }

    #[test]
    fn shape_mismatch_keeps_looking() {
        let text = "[1, 2] puis {\"ok\": true}";
        assert_eq!(parse_object(text), json!({"ok": true}));
        assert_eq!(parse_array(text), json!([1, 2]));
    }

    #[test]
    fn malformed_input_yields_empty_structure() {
        for text in ["", "   ", "nothing", "{broken", "```json\n{oops\n```", "null", "42"] {
            assert_eq!(parse_object(text), json!({}), "input: {text:?}");
            assert_eq!(parse_array(text), json!([]), "input: {text:?}");
            assert_eq!(parse(text, Shape::Any), json!({}), "input: {text:?}");
        }
    }

    #[test]
    fn unterminated_fence_does_not_panic() {
        assert_eq!(parse_object("```json\n{\"a\": 1}"), json!({"a": 1}));
    }

    #[test]
    fn multibyte_text_around_json() {
        assert_eq!(parse_object("Élément → {\"clé\": \"é\"} ✓"), json!({"clé": "é"}));
    }
}
