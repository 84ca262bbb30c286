//! Parsing of the model's JSON answers.
//!
//! The model is asked for `response_format = json_object`, but answers are
//! still validated field by field: a lead is only accepted on a well-formed
//! verdict.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AiError;
use crate::util::{extract_json_object, truncate_to_char_boundary};

/// How much of an unparseable answer is kept in the error.
const MAX_RAW_BYTES: usize = 500;

/// The model's verdict on one post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Qualification {
    /// 0-100.
    pub relevance_score: i16,
    pub is_lead: bool,
    pub reasoning: String,
    /// Draft public reply, when the model wrote one.
    pub comment: Option<String>,
    /// Draft private message, only requested for campaigns that generate DMs.
    pub dm: Option<String>,
}

#[derive(Deserialize)]
struct RawQualification {
    relevance_score: Option<Value>,
    is_lead: Option<Value>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    dm: Option<String>,
}

#[derive(Deserialize)]
struct RawWarmup {
    comment: Option<String>,
}

/// Parses a qualification answer.
///
/// # Errors
///
/// Returns [`AiError::Parse`] when the answer holds no JSON object, when
/// `relevance_score` or `is_lead` is missing or mistyped, or when the score
/// falls outside 0-100.
pub fn parse_qualification(raw: &str) -> Result<Qualification, AiError> {
    let parsed: RawQualification = decode(raw)?;

    let score = match parsed.relevance_score.as_ref() {
        Some(value) => score_from_value(value)
            .ok_or_else(|| parse_error("relevance_score is not a number", raw))?,
        None => return Err(parse_error("missing relevance_score", raw)),
    };
    let relevance_score = i16::try_from(score)
        .ok()
        .filter(|s| (0..=100).contains(s))
        .ok_or_else(|| parse_error(&format!("relevance_score {score} outside 0-100"), raw))?;

    let is_lead = match parsed.is_lead {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => true,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => false,
        Some(_) => return Err(parse_error("is_lead is not a boolean", raw)),
        None => return Err(parse_error("missing is_lead", raw)),
    };

    Ok(Qualification {
        relevance_score,
        is_lead,
        reasoning: parsed.reasoning.unwrap_or_default().trim().to_string(),
        comment: non_empty(parsed.comment),
        dm: non_empty(parsed.dm),
    })
}

/// Parses a warm-up answer of the form `{"comment": "..."}`.
///
/// # Errors
///
/// Returns [`AiError::Parse`] when the answer holds no JSON object or the
/// comment is missing or blank.
pub fn parse_warmup(raw: &str) -> Result<String, AiError> {
    let parsed: RawWarmup = decode(raw)?;
    non_empty(parsed.comment).ok_or_else(|| parse_error("missing comment", raw))
}

fn decode<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, AiError> {
    let object = extract_json_object(raw).ok_or_else(|| parse_error("no JSON object", raw))?;
    serde_json::from_str(object).map_err(|e| parse_error(&e.to_string(), raw))
}

/// Accepts integers, floats (rounded) and numeric strings.
fn score_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            #[allow(clippy::cast_possible_truncation)]
            n.as_f64().map(|f| f.round() as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

fn parse_error(reason: &str, raw: &str) -> AiError {
    AiError::Parse {
        reason: reason.to_string(),
        raw: truncate_to_char_boundary(raw.trim(), MAX_RAW_BYTES).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_verdict() {
        let raw = r#"{
            "relevance_score": 87,
            "is_lead": true,
            "reasoning": "Founder looking for a contract developer",
            "comment": "  We build MVPs like this, happy to share how we scoped ours. ",
            "dm": ""
        }"#;
        let q = parse_qualification(raw).unwrap();
        assert_eq!(q.relevance_score, 87);
        assert!(q.is_lead);
        assert_eq!(
            q.comment.as_deref(),
            Some("We build MVPs like this, happy to share how we scoped ours.")
        );
        assert_eq!(q.dm, None);
    }

    #[test]
    fn tolerates_fences_floats_and_string_booleans() {
        let raw = "```json\n{\"relevance_score\": 41.6, \"is_lead\": \"false\", \"reasoning\": \"job ad\"}\n```";
        let q = parse_qualification(raw).unwrap();
        assert_eq!(q.relevance_score, 42);
        assert!(!q.is_lead);
        assert_eq!(q.comment, None);
    }

    #[test]
    fn rejects_out_of_range_score() {
        let err = parse_qualification(r#"{"relevance_score": 140, "is_lead": true}"#).unwrap_err();
        assert!(err.to_string().contains("outside 0-100"));
    }

    #[test]
    fn rejects_missing_fields_and_prose() {
        assert!(parse_qualification(r#"{"is_lead": true}"#).is_err());
        assert!(parse_qualification(r#"{"relevance_score": 50}"#).is_err());

        let err = parse_qualification("This post looks like a great lead!").unwrap_err();
        match err {
            AiError::Parse { reason, raw } => {
                assert_eq!(reason, "no JSON object");
                assert_eq!(raw, "This post looks like a great lead!");
            }
            other => panic!("expected Parse, got {other:?}"),
        }
    }

    #[test]
    fn raw_text_is_truncated() {
        let long = "x".repeat(2_000);
        match parse_qualification(&long).unwrap_err() {
            AiError::Parse { raw, .. } => assert_eq!(raw.len(), MAX_RAW_BYTES),
            other => panic!("expected Parse, got {other:?}"),
        }
    }

    #[test]
    fn warmup_requires_non_blank_comment() {
        assert_eq!(
            parse_warmup(r#"{"comment": "Nice write-up, the caching section was useful."}"#)
                .unwrap(),
            "Nice write-up, the caching section was useful."
        );
        assert!(parse_warmup(r#"{"comment": "   "}"#).is_err());
        assert!(parse_warmup("{}").is_err());
    }
}
