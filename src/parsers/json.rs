//! Resilient structured-output extraction.
//!
//! Chat models are asked for JSON but routinely wrap it in Markdown fences,
//! stop mid-object, or leave delimiters unbalanced. [`extract`] locates the
//! object, decodes it directly when possible, falls back to a heuristic
//! [`repair_json`], and otherwise fails with enough of the text to diagnose
//! what the provider sent. It never substitutes default data.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::error::Category;

use crate::error::{ExtractError, truncate_chars};

/// Chars of the raw response quoted when no object is found.
pub const NO_OBJECT_PREVIEW_CHARS: usize = 200;
/// Chars of the candidate quoted when the failure has no position.
pub const CANDIDATE_PREVIEW_CHARS: usize = 300;
/// Bytes either side of the failure position shown in the context window.
pub const CONTEXT_RADIUS: usize = 100;

/// A fence token at the start of a line, with or without a language tag.
static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^```[A-Za-z0-9_+.-]*\s*").expect("fence pattern is valid")
});

/// Decode the JSON object embedded in `raw` into `T`.
pub fn extract<T: DeserializeOwned>(raw: &str) -> Result<T, ExtractError> {
    if raw.trim().is_empty() {
        return Err(ExtractError::Empty);
    }

    let cleaned = strip_fences(raw);
    let candidate = object_span(&cleaned).ok_or_else(|| ExtractError::NoJsonObject {
        preview: truncate_chars(raw, NO_OBJECT_PREVIEW_CHARS),
    })?;

    let first_err = match serde_json::from_str::<T>(candidate) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let repaired = repair_json(candidate);
    if repaired != candidate {
        match serde_json::from_str::<T>(&repaired) {
            Ok(value) => {
                tracing::debug!(
                    appended = &repaired[candidate.trim().len().min(repaired.len())..],
                    "structured output repaired"
                );
                return Ok(value);
            }
            Err(e) => tracing::debug!("repair did not yield valid JSON: {e}"),
        }
    }

    Err(decode_error(candidate, &first_err))
}

/// Trim, then drop fence lines (```` ```json ````, ```` ``` ````) at line starts.
pub fn strip_fences(text: &str) -> String {
    FENCE.replace_all(text.trim(), "").trim().to_string()
}

/// Inclusive span from the first `{` to the last `}`.
fn object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Inclusive span from the first `[` to the last `]`.
fn array_span(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

/// Best-effort JSON text from a response: an object span, else an array span,
/// else the fence-stripped text unchanged.
pub fn extract_json_text(text: &str) -> String {
    let cleaned = strip_fences(text);
    object_span(&cleaned)
        .or_else(|| array_span(&cleaned))
        .map(str::to_string)
        .unwrap_or(cleaned)
}

/// Check that `text` is syntactically valid JSON.
pub fn validate_json(text: &str) -> Result<(), serde_json::Error> {
    serde_json::from_str::<IgnoredAny>(text).map(|_| ())
}

/// Heuristic repair of truncated JSON: close a dangling string when the quote
/// count is odd, then close open arrays, then open objects. Counts are purely
/// lexical, so a quote or bracket inside a string value can mislead it.
pub fn repair_json(candidate: &str) -> String {
    let mut repaired = candidate.trim().to_string();

    if repaired.matches('"').count() % 2 != 0 {
        repaired.push('"');
    }

    let open_braces = repaired.matches('{').count();
    let close_braces = repaired.matches('}').count();
    let open_brackets = repaired.matches('[').count();
    let close_brackets = repaired.matches(']').count();

    for _ in close_brackets..open_brackets {
        repaired.push(']');
    }
    for _ in close_braces..open_braces {
        repaired.push('}');
    }

    repaired
}

/// Window of the candidate around a decode failure, with a caret line under
/// the offending byte.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorContext {
    pub offset: usize,
    pub start: usize,
    pub end: usize,
    pub snippet: String,
    pub marker: String,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "near byte {}:\n{}\n{}", self.offset, self.snippet, self.marker)
    }
}

/// Build the `[offset - 100, offset + 100)` window, clamped to the candidate
/// and widened to char boundaries.
pub fn error_context(candidate: &str, offset: usize) -> ErrorContext {
    let offset = offset.min(candidate.len());

    let mut start = offset.saturating_sub(CONTEXT_RADIUS);
    while !candidate.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (offset + CONTEXT_RADIUS).min(candidate.len());
    while !candidate.is_char_boundary(end) {
        end += 1;
    }
    let mut caret_at = offset;
    while !candidate.is_char_boundary(caret_at) {
        caret_at -= 1;
    }

    let pad = candidate[start..caret_at].chars().count();
    ErrorContext {
        offset,
        start,
        end,
        snippet: candidate[start..end].to_string(),
        marker: format!("{}^", " ".repeat(pad)),
    }
}

/// Byte index of the position serde_json reports as `line`/`column` (1-based).
fn byte_offset(text: &str, line: usize, column: usize) -> Option<usize> {
    if line == 0 {
        return None;
    }
    let line_start = if line == 1 {
        0
    } else {
        text.match_indices('\n').nth(line - 2).map(|(i, _)| i + 1)?
    };
    Some((line_start + column.saturating_sub(1)).min(text.len()))
}

fn decode_error(candidate: &str, err: &serde_json::Error) -> ExtractError {
    let positioned = matches!(err.classify(), Category::Syntax | Category::Eof);
    let context = match byte_offset(candidate, err.line(), err.column()).filter(|_| positioned) {
        Some(offset) => error_context(candidate, offset).to_string(),
        None => format!(
            "candidate: {}",
            truncate_chars(candidate, CANDIDATE_PREVIEW_CHARS)
        ),
    };
    ExtractError::Decode {
        message: err.to_string(),
        context,
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Outline {
        title: String,
        tags: Vec<String>,
    }

    #[test]
    fn fenced_object_matches_direct_decode() {
        let inner = r#"{"title": "Night Market", "tags": ["drama", "city"]}"#;
        let fenced = format!("```json\n{inner}\n```");
        let via_extract: Outline = extract(&fenced).unwrap();
        let direct: Outline = serde_json::from_str(inner).unwrap();
        assert_eq!(via_extract, direct);
    }

    #[test]
    fn bare_fence_and_prose_are_skipped() {
        let raw = "Here is the outline:\n```\n{\"title\": \"A\", \"tags\": []}\n```\nEnjoy!";
        let outline: Outline = extract(raw).unwrap();
        assert_eq!(outline.title, "A");
    }

    #[test]
    fn repair_closes_arrays_before_objects() {
        let repaired = repair_json(r#"{"a": "b", "c": [1, 2"#);
        assert_eq!(repaired, r#"{"a": "b", "c": [1, 2]}"#);
        let value: serde_json::Value = serde_json::from_str(&repaired).unwrap();
        assert_eq!(value, json!({"a": "b", "c": [1, 2]}));
    }

    #[test]
    fn repair_closes_dangling_string() {
        let repaired = repair_json(r#"{"title": "unfinis"#);
        assert_eq!(repaired, r#"{"title": "unfinis"}"#);
    }

    #[test]
    fn extract_repairs_truncated_nested_object() {
        // The last `}` closes the inner object, so the span is missing its outer brace.
        let raw = r#"{"meta": {"n": 1}, "tags": ["x""#;
        let value: serde_json::Value = extract(raw).unwrap();
        assert_eq!(value, json!({"meta": {"n": 1}}));
    }

    #[test]
    fn valid_input_is_not_repaired() {
        // A valid object decodes on the first attempt even with a quote-heavy value.
        let value: serde_json::Value = extract(r#"{"q": "say \"hi\""}"#).unwrap();
        assert_eq!(value["q"], "say \"hi\"");
    }

    #[test]
    fn no_object_reports_bounded_preview() {
        let raw = "x".repeat(500);
        match extract::<serde_json::Value>(&raw).unwrap_err() {
            ExtractError::NoJsonObject { preview } => {
                assert_eq!(preview.len(), NO_OBJECT_PREVIEW_CHARS + 3);
                assert!(preview.ends_with("..."));
            }
            other => panic!("expected NoJsonObject, got {other:?}"),
        }
    }

    #[test]
    fn short_input_without_object_is_quoted_whole() {
        match extract::<serde_json::Value>("sorry, I cannot help").unwrap_err() {
            ExtractError::NoJsonObject { preview } => assert_eq!(preview, "sorry, I cannot help"),
            other => panic!("expected NoJsonObject, got {other:?}"),
        }
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            extract::<serde_json::Value>("   ").unwrap_err(),
            ExtractError::Empty
        ));
    }

    #[test]
    fn unrepairable_syntax_error_shows_caret() {
        let raw = r#"{"title": "A", "tags": [1 2]}"#;
        match extract::<serde_json::Value>(raw).unwrap_err() {
            ExtractError::Decode { context, .. } => {
                let lines: Vec<&str> = context.lines().collect();
                assert_eq!(lines[1], raw);
                let caret = lines[2].find('^').unwrap();
                assert_eq!(&raw[caret..caret + 1], "2");
            }
            other => panic!("expected Decode, got {other:?}"),
        }
    }

    #[test]
    fn type_mismatch_quotes_candidate() {
        let raw = r#"{"title": 5, "tags": []}"#;
        match extract::<Outline>(raw).unwrap_err() {
            ExtractError::Decode { context, .. } => {
                assert!(context.starts_with("candidate: "));
                assert!(context.contains(raw));
            }
            other => panic!("expected Decode, got {other:?}"),
        }
    }

    #[test]
    fn context_window_is_clamped() {
        let candidate = "a".repeat(500);
        let ctx = error_context(&candidate, 250);
        assert_eq!((ctx.start, ctx.end), (150, 350));
        assert_eq!(ctx.marker.len(), 101);

        let ctx = error_context(&candidate, 30);
        assert_eq!((ctx.start, ctx.end), (0, 130));
        assert_eq!(ctx.marker, format!("{}^", " ".repeat(30)));

        let ctx = error_context(&candidate, 480);
        assert_eq!((ctx.start, ctx.end), (380, 500));
    }

    #[test]
    fn byte_offset_follows_lines() {
        let text = "{\n  \"a\": x\n}";
        assert_eq!(byte_offset(text, 2, 8), Some(9));
        assert_eq!(&text[9..10], "x");
        assert_eq!(byte_offset(text, 0, 0), None);
    }

    #[test]
    fn extract_json_text_falls_back_to_array() {
        assert_eq!(extract_json_text("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(extract_json_text("noise {\"a\":1} noise"), "{\"a\":1}");
        assert_eq!(extract_json_text("plain"), "plain");
    }

    #[test]
    fn validate_json_accepts_any_value() {
        assert!(validate_json("[1, {\"a\": null}]").is_ok());
        assert!(validate_json("{\"a\": }").is_err());
    }
}
