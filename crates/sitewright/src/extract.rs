//! Defensive extraction of structured output from model text.
//!
//! The generation service wraps answers in code fences, leading prose, or
//! trailing commentary often enough that every consumer goes through this
//! module instead of parsing raw responses.

use thiserror::Error;

/// Error from a failed extraction attempt.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no JSON object found in model output: {0}")]
    NoJson(String),

    #[error("JSON parse failed: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("output does not look like an HTML document")]
    NotHtml,
}

/// Fence tags the models actually emit.
const FENCE_TAGS: &[&str] = &["json", "html", "css", "javascript", "js", "markdown", "md"];

/// Strip leading/trailing markdown code-fence markers.
///
/// Handles a tagged opening fence (```html), a bare fence, and a trailing
/// fence, in any combination. Interior fences are left alone.
pub fn strip_fences(text: &str) -> String {
    let mut out = text.trim();

    if let Some(rest) = out.strip_prefix("```") {
        let rest = FENCE_TAGS
            .iter()
            .find_map(|tag| rest.strip_prefix(tag))
            .unwrap_or(rest);
        out = rest.trim_start_matches(['\r', '\n']).trim_start();
        // Only honor the opening fence if a closing one exists somewhere.
        if let Some(idx) = out.rfind("```") {
            out = out[..idx].trim_end();
        }
    } else if let Some(idx) = out.rfind("```") {
        // No opening fence but a trailing one: drop it.
        if out[idx + 3..].trim().is_empty() {
            out = out[..idx].trim_end();
        }
    }

    out.to_string()
}

/// Extract a JSON object from free-form model output.
///
/// Strips fences, tries a full-text parse, then falls back to the substring
/// between the first `{` and the last `}`.
pub fn extract_json(text: &str) -> Result<serde_json::Value, ExtractError> {
    let cleaned = strip_fences(text);

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&cleaned) {
        return Ok(value);
    }

    let start = cleaned.find('{');
    let end = cleaned.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if s < e => {
            let candidate = &cleaned[s..=e];
            Ok(serde_json::from_str(candidate)?)
        }
        _ => Err(ExtractError::NoJson(truncate_for_error(&cleaned))),
    }
}

/// Extract an HTML document (or main fragment) from model output.
///
/// Accepts anything containing a doctype, an `<html` tag, or a `<main`
/// tag after fence stripping; anything else is rejected.
pub fn extract_html(text: &str) -> Result<String, ExtractError> {
    let cleaned = strip_fences(text);
    let lower = cleaned.to_lowercase();
    if lower.contains("<!doctype") || lower.contains("<html") || lower.contains("<main") {
        Ok(cleaned)
    } else {
        Err(ExtractError::NotHtml)
    }
}

fn truncate_for_error(text: &str) -> String {
    const MAX: usize = 120;
    if text.len() <= MAX {
        text.to_string()
    } else {
        let mut cut = MAX;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &text[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_tagged_fence() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_fences(text), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_bare_fence() {
        assert_eq!(strip_fences("```\nhello\n```"), "hello");
    }

    #[test]
    fn test_strip_no_fence_is_identity() {
        assert_eq!(strip_fences("plain text"), "plain text");
    }

    #[test]
    fn test_extract_json_fenced() {
        let value = extract_json("```json\n{\"pages\": []}\n```").unwrap();
        assert!(value["pages"].is_array());
    }

    #[test]
    fn test_extract_json_embedded_in_prose() {
        let text = "Sure! Here is the blueprint you asked for:\n{\"site_name\": \"Acme\"}\nLet me know if you need changes.";
        let value = extract_json(text).unwrap();
        assert_eq!(value["site_name"], "Acme");
    }

    #[test]
    fn test_extract_json_no_braces_errors() {
        let err = extract_json("I could not produce JSON, sorry.").unwrap_err();
        assert!(matches!(err, ExtractError::NoJson(_)));
    }

    #[test]
    fn test_extract_json_garbage_braces_errors() {
        let err = extract_json("look { at ( this } mess").unwrap_err();
        assert!(matches!(err, ExtractError::JsonParse(_)));
    }

    #[test]
    fn test_extract_html_document() {
        let html = "```html\n<!DOCTYPE html><html><body></body></html>\n```";
        let out = extract_html(html).unwrap();
        assert!(out.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn test_extract_html_main_fragment() {
        assert!(extract_html("<main><h1>Hi</h1></main>").is_ok());
    }

    #[test]
    fn test_extract_html_rejects_prose() {
        assert!(matches!(
            extract_html("Here is a description of the page."),
            Err(ExtractError::NotHtml)
        ));
    }
}
