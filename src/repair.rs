//! Repair of malformed JSON emitted by a language model.
//!
//! Model output frequently wraps JSON in markdown fences or prose, puts raw
//! newlines inside narrative string values, and quotes speech with bare `"`
//! characters. A strict parser rejects all of these, so the text goes
//! through a repair pass before parsing:
//!
//! 1. Extract the first fenced code block, else the balanced `{...}` or
//!    `[...]` span starting at whichever opener comes first.
//! 2. Normalize typographic quotes.
//! 3. Scan once, escaping control characters and stray backslashes inside
//!    strings, deciding for every `"` whether it terminates the string or
//!    is an embedded quote, and dropping trailing commas outside strings.
//! 4. Parse, degrading to an empty object.
//!
//! # Embedded quotes
//!
//! Step 3 uses lookahead: a quote followed by optional whitespace and then
//! `,` `}` `]` (or `:` for object keys, or end of text) closes the string,
//! as does a quote followed by a `"key":` pattern. Anything else is escaped.
//! This is a best-effort heuristic: a quoted word followed directly by a
//! comma (`"He said "hi", then left"`) is misread as a terminator. Tests pin
//! the current behavior; changing it is a compatibility risk.
use crate::report::Reporter;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Repairs and parses model output; never fails.
pub struct JsonRepairer {
    reporter: Arc<dyn Reporter>,
}

impl JsonRepairer {
    pub fn new(reporter: Arc<dyn Reporter>) -> Self {
        Self { reporter }
    }

    /// Parse `raw` into JSON, repairing common model mistakes.
    ///
    /// Unrecoverable input yields an empty object and one reported warning.
    pub fn repair(&self, raw: &str) -> Value {
        match try_repair(raw) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(error = %err, "repaired text still fails to parse");
                self.reporter.repair_failed(raw);
                Value::Object(Map::new())
            }
        }
    }
}

/// Run the full repair pass and parse the result.
pub fn try_repair(raw: &str) -> Result<Value, serde_json::Error> {
    let span = extract_json_span(raw);
    if let Ok(value) = serde_json::from_str(span) {
        return Ok(value);
    }
    serde_json::from_str(&repair_text(raw))
}

/// Apply steps 1-3 and return the repaired text without parsing it.
pub fn repair_text(raw: &str) -> String {
    let span = extract_json_span(raw);
    let normalized = normalize_punctuation(span);
    escape_string_contents(&normalized)
}

/// Extract the JSON-looking part of a model response.
pub fn extract_json_span(text: &str) -> &str {
    let text = text.trim();

    if let Some(body) = fenced_body(text) {
        return body;
    }

    let span = match (text.find('{'), text.find('[')) {
        (Some(object), Some(array)) if array < object => balanced_span(text, '[', ']'),
        (Some(_), _) => balanced_span(text, '{', '}'),
        (None, Some(_)) => balanced_span(text, '[', ']'),
        (None, None) => None,
    };
    span.unwrap_or(text)
}

fn fenced_body(text: &str) -> Option<&str> {
    let start = text.find("```")? + 3;
    // Skip a language identifier such as `json`.
    let body_start = text[start..]
        .find('\n')
        .map(|i| start + i + 1)
        .unwrap_or(start);
    let end = text[body_start..].find("```")?;
    let body = text[body_start..body_start + end].trim();
    if body.is_empty() {
        None
    } else {
        Some(body)
    }
}

/// Find the first `open ... close` span with balanced nesting.
///
/// Quote tracking is naive here because the text is not yet repaired; if
/// the span never balances, the last `close` character ends it.
fn balanced_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        if ch == '"' {
            in_string = true;
        } else if ch == open {
            depth += 1;
        } else if ch == close {
            depth -= 1;
            if depth == 0 {
                let end = start + offset + ch.len_utf8();
                return Some(&text[start..end]);
            }
        }
    }

    let end = text.rfind(close)?;
    if end > start {
        Some(&text[start..end + close.len_utf8()])
    } else {
        None
    }
}

/// Replace typographic quotes with ASCII ones.
pub fn normalize_punctuation(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' => '"',
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => '\'',
            other => other,
        })
        .collect()
}

/// How a `"` inside a string should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteRole {
    Terminator,
    /// Terminates a value and the next `"key":` is missing its comma.
    TerminatorBeforeKey,
    Embedded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

/// Single-pass scan escaping string contents.
pub fn escape_string_contents(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    let mut containers: Vec<Container> = Vec::new();
    let mut last_structural: Option<char> = None;

    let mut in_string = false;
    let mut escaped = false;
    let mut string_is_key = false;

    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];

        if !in_string {
            match ch {
                '"' => {
                    in_string = true;
                    string_is_key = containers.last() == Some(&Container::Object)
                        && matches!(last_structural, Some('{') | Some(','));
                }
                '{' => {
                    containers.push(Container::Object);
                    last_structural = Some(ch);
                }
                '[' => {
                    containers.push(Container::Array);
                    last_structural = Some(ch);
                }
                '}' | ']' => {
                    containers.pop();
                    last_structural = Some(ch);
                }
                ',' if is_trailing_comma(&chars[i + 1..]) => {
                    i += 1;
                    continue;
                }
                ',' | ':' => last_structural = Some(ch),
                _ => {}
            }
            out.push(ch);
            i += 1;
            continue;
        }

        if escaped {
            out.push(ch);
            escaped = false;
            i += 1;
            continue;
        }

        match ch {
            '\\' => {
                if is_valid_escape(&chars[i + 1..]) {
                    out.push('\\');
                    escaped = true;
                } else {
                    out.push_str("\\\\");
                }
            }
            '"' => match quote_role(&chars[i + 1..], string_is_key) {
                QuoteRole::Terminator => {
                    out.push('"');
                    in_string = false;
                    last_structural = Some('"');
                }
                QuoteRole::TerminatorBeforeKey => {
                    out.push_str("\",");
                    in_string = false;
                    last_structural = Some(',');
                }
                QuoteRole::Embedded => out.push_str("\\\""),
            },
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{0C}' => out.push_str("\\f"),
            '\u{08}' => out.push_str("\\b"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
        i += 1;
    }

    out
}

/// A comma followed only by whitespace and a closer, or by nothing.
fn is_trailing_comma(rest: &[char]) -> bool {
    rest.iter()
        .find(|c| !c.is_whitespace())
        .is_none_or(|c| matches!(c, '}' | ']'))
}

fn is_valid_escape(rest: &[char]) -> bool {
    match rest.first() {
        Some('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't') => true,
        Some('u') => rest.len() >= 5 && rest[1..5].iter().all(|c| c.is_ascii_hexdigit()),
        _ => false,
    }
}

fn quote_role(rest: &[char], string_is_key: bool) -> QuoteRole {
    let mut idx = 0;
    while idx < rest.len() && rest[idx].is_whitespace() {
        idx += 1;
    }
    match rest.get(idx) {
        None => QuoteRole::Terminator,
        Some(',' | '}' | ']') => QuoteRole::Terminator,
        Some(':') if string_is_key => QuoteRole::Terminator,
        Some('"') if starts_with_key(&rest[idx..]) => {
            if string_is_key {
                QuoteRole::Terminator
            } else {
                QuoteRole::TerminatorBeforeKey
            }
        }
        _ => QuoteRole::Embedded,
    }
}

/// True when `rest` starts with `"name"` followed by optional whitespace and `:`.
fn starts_with_key(rest: &[char]) -> bool {
    if rest.first() != Some(&'"') {
        return false;
    }
    let Some(close) = rest[1..]
        .iter()
        .take(80)
        .position(|c| *c == '"' || *c == '\n')
    else {
        return false;
    };
    let close = close + 1;
    if rest[close] != '"' || close == 1 {
        return false;
    }
    rest[close + 1..]
        .iter()
        .find(|c| !c.is_whitespace())
        .is_some_and(|c| *c == ':')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{CollectingReporter, ReportedEvent};
    use serde_json::json;

    fn repairer() -> (JsonRepairer, Arc<CollectingReporter>) {
        let reporter = Arc::new(CollectingReporter::new());
        (JsonRepairer::new(reporter.clone()), reporter)
    }

    #[test]
    fn test_extract_json_with_fences() {
        let text = "Here are the places:\n```json\n{\"places\": []}\n```\nEnjoy!";
        assert_eq!(extract_json_span(text), "{\"places\": []}");
    }

    #[test]
    fn test_extract_json_plain_fences() {
        let text = "```\n{\"places\": []}\n```";
        assert_eq!(extract_json_span(text), "{\"places\": []}");
    }

    #[test]
    fn test_extract_first_object_from_prose() {
        let text = "Sure! {\"a\": {\"b\": 1}} Hope this helps {\"c\": 2}";
        assert_eq!(extract_json_span(text), "{\"a\": {\"b\": 1}}");
    }

    #[test]
    fn test_extract_array_when_no_object() {
        assert_eq!(extract_json_span("list: [1, 2] done"), "[1, 2]");
    }

    #[test]
    fn embedded_quotes_are_escaped() {
        let (repairer, reporter) = repairer();
        let raw = r#"{"name": "Stari Most", "note": "He said "wow" about it"}"#;
        assert_eq!(
            repairer.repair(raw),
            json!({"name": "Stari Most", "note": "He said \"wow\" about it"})
        );
        assert!(reporter.events().is_empty());
    }

    #[test]
    fn literal_control_characters_inside_strings_are_escaped() {
        let (repairer, _) = repairer();
        let raw = "{\"description\": \"First line\nSecond\tcolumn\r\nThird\"}";
        let value = repairer.repair(raw);
        assert_eq!(value["description"], "First line\nSecond\tcolumn\r\nThird");
    }

    #[test]
    fn other_control_bytes_use_unicode_escapes() {
        let repaired = escape_string_contents("{\"a\": \"x\u{01}y\"}");
        assert_eq!(repaired, "{\"a\": \"x\\u0001y\"}");
    }

    #[test]
    fn stray_backslashes_are_doubled_and_valid_escapes_kept() {
        let (repairer, _) = repairer();
        let raw = r#"{"path": "C:\temp\dir", "quote": "a \"b\" c", "bad": "\q \u12"}"#;
        let value = repairer.repair(raw);
        // `\t` is a valid escape and stays one; `\d`, `\q` and a short `\u` do not.
        assert_eq!(value["path"], "C:\temp\\dir");
        assert_eq!(value["quote"], "a \"b\" c");
        assert_eq!(value["bad"], "\\q \\u12");
    }

    #[test]
    fn typographic_quotes_and_trailing_commas_are_normalized() {
        let (repairer, _) = repairer();
        let raw = "{\u{201C}name\u{201D}: \u{201C}Vrelo Bosne\u{201D}, \"tags\": [\"nature\", ],}";
        assert_eq!(
            repairer.repair(raw),
            json!({"name": "Vrelo Bosne", "tags": ["nature"]})
        );
    }

    #[test]
    fn missing_comma_before_next_key_is_inserted() {
        let (repairer, _) = repairer();
        let raw = "{\"name\": \"Kravica\" \"city\": \"Ljubuški\"}";
        assert_eq!(
            repairer.repair(raw),
            json!({"name": "Kravica", "city": "Ljubuški"})
        );
    }

    #[test]
    fn colon_after_embedded_quote_stays_in_value() {
        let (repairer, _) = repairer();
        let raw = r#"{"note": "Sign reads "Stop": turn back"}"#;
        assert_eq!(repairer.repair(raw)["note"], "Sign reads \"Stop\": turn back");
    }

    #[test]
    fn quoted_word_followed_by_comma_is_a_known_false_terminator() {
        // Pinned heuristic behavior: the quote after `hi` is read as the end
        // of the string, so the document cannot be recovered.
        let (repairer, reporter) = repairer();
        let raw = r#"{"note": "He said "hi", then left"}"#;
        assert_eq!(repairer.repair(raw), json!({}));
        assert_eq!(reporter.events(), vec![ReportedEvent::RepairFailed]);
    }

    #[test]
    fn unrecoverable_input_returns_empty_object_and_reports() {
        let (repairer, reporter) = repairer();
        assert_eq!(repairer.repair("I could not find any places."), json!({}));
        assert_eq!(repairer.repair(""), json!({}));
        assert_eq!(reporter.events().len(), 2);
    }

    #[test]
    fn valid_json_passes_through_untouched() {
        let raw = r#"{"a": "x, \"y\"", "b": [1, 2, {"c": null}]}"#;
        assert_eq!(
            try_repair(raw).expect("valid json"),
            json!({"a": "x, \"y\"", "b": [1, 2, {"c": null}]})
        );
    }

    #[test]
    fn fenced_prose_json_with_newlines_repairs() {
        let (repairer, _) = repairer();
        let raw = "```json\n{\n  \"places\": [\n    {\"name\": \"Baščaršija\", \"description\": \"Old bazaar.\nBusy at noon.\"},\n  ]\n}\n```";
        let value = repairer.repair(raw);
        assert_eq!(value["places"][0]["name"], "Baščaršija");
        assert_eq!(
            value["places"][0]["description"],
            "Old bazaar.\nBusy at noon."
        );
    }

    #[test]
    fn top_level_array_keeps_every_item() {
        let raw = r#"[{"name": "Stari Most", "lat": 43.337}, {"name": "Kravica", "lat": 43.156}]"#;
        assert_eq!(extract_json_span(raw), raw);
        let value = try_repair(raw).expect("array");
        assert_eq!(value.as_array().map(Vec::len), Some(2));
        assert_eq!(value[1]["name"], "Kravica");
    }

    #[test]
    fn array_in_prose_keeps_every_item() {
        let (repairer, _) = repairer();
        let raw = "Here you go:\n[{\"name\": \"Stari Most\"}, {\"name\": \"Kravica\"},]\nEnjoy!";
        let value = repairer.repair(raw);
        assert_eq!(value, json!([{"name": "Stari Most"}, {"name": "Kravica"}]));
    }

    #[test]
    fn object_before_array_still_wins() {
        let raw = "Result: {\"places\": [1, 2]} and [3]";
        assert_eq!(extract_json_span(raw), "{\"places\": [1, 2]}");
    }

    #[test]
    fn trailing_comma_patterns_inside_strings_are_kept() {
        let (repairer, _) = repairer();
        let raw = "{\"note\": \"a, ]\", \"tags\": [\"x, }\", ],\n\"other\": \"line\nbreak\",}";
        let value = repairer.repair(raw);
        assert_eq!(value["note"], "a, ]");
        assert_eq!(value["tags"], json!(["x, }"]));
        assert_eq!(value["other"], "line\nbreak");
    }
}
