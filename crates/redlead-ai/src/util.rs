use std::sync::LazyLock;

use regex::Regex;

/// Outermost `{ ... }` span, across newlines.
static JSON_OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid json object regex"));

/// Truncate a string to at most `max_bytes` bytes at a character boundary.
#[must_use]
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

/// Strip markdown code fences from a response.
#[must_use]
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// The JSON object embedded in a model answer, tolerating code fences and
/// prose before or after it.
#[must_use]
pub fn extract_json_object(response: &str) -> Option<&str> {
    let stripped = strip_code_blocks(response);
    if stripped.starts_with('{') && stripped.ends_with('}') {
        return Some(stripped);
    }
    JSON_OBJECT_RE.find(stripped).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_on_char_boundary() {
        let text = "Hello 世界";
        let truncated = truncate_to_char_boundary(text, 8);
        assert!(truncated.len() <= 8);
        assert!(text.starts_with(truncated));
        assert_eq!(truncate_to_char_boundary("Hello", 100), "Hello");
    }

    #[test]
    fn strips_code_fences() {
        assert_eq!(strip_code_blocks("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("```\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("{}"), "{}");
    }

    #[test]
    fn extracts_object_surrounded_by_prose() {
        let raw = "Sure! Here is my answer:\n{\"is_lead\": true}\nHope that helps.";
        assert_eq!(extract_json_object(raw), Some("{\"is_lead\": true}"));
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn extracts_multiline_objects_across_calls() {
        let raw = "Verdict:\n{\n  \"score\": 80\n}\nDone.";
        for _ in 0..3 {
            assert_eq!(extract_json_object(raw), Some("{\n  \"score\": 80\n}"));
        }
    }
}
