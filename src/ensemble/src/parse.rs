use review_oracle::UNKNOWN_LABEL;
use serde_json::Value;

/// Label and rationale extracted from free-form model text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOutput {
    pub label: String,
    pub rationale: String,
}

impl ParsedOutput {
    fn fallback(raw: &str) -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            rationale: raw.to_string(),
        }
    }
}

/// Best-effort extraction of `{"label": ..., "rationale": ...}` from model text.
///
/// Takes the greedy span from the first `{` to the last `}` and parses it as a
/// JSON object. Prose around the object is ignored. On any failure the label
/// is `unknown` and the rationale is the full raw text, so bad output stays
/// diagnosable.
///
/// Known limitation: the span is not brace-balanced. Two separate objects, or
/// a stray `}` after the object, make the span invalid JSON and the output
/// falls back to `unknown`.
///
/// The label is returned as written; it is not checked against a label set.
pub fn parse_model_output(raw: &str) -> ParsedOutput {
    let Some(span) = json_span(raw) else {
        return ParsedOutput::fallback(raw);
    };

    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(span) else {
        return ParsedOutput::fallback(raw);
    };

    let label = match map.get("label") {
        Some(Value::String(s)) => s.clone(),
        _ => return ParsedOutput::fallback(raw),
    };

    let rationale = match map.get("rationale") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    ParsedOutput { label, rationale }
}

fn json_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_json_wrapped_in_prose() {
        let parsed = parse_model_output(r#"blah {"label": "Valid", "rationale": "ok"} blah"#);
        assert_eq!(parsed.label, "Valid");
        assert_eq!(parsed.rationale, "ok");
    }

    #[test]
    fn test_plain_text_falls_back_to_unknown() {
        let parsed = parse_model_output("not json at all");
        assert_eq!(parsed.label, "unknown");
        assert_eq!(parsed.rationale, "not json at all");
    }

    #[test]
    fn test_invalid_json_keeps_raw_text() {
        let raw = "Sure! {label: Valid, rationale: nice}";
        let parsed = parse_model_output(raw);
        assert_eq!(parsed.label, "unknown");
        assert_eq!(parsed.rationale, raw);
    }

    #[test]
    fn test_multiline_json_in_code_fence() {
        let raw = "```json\n{\n  \"label\": \"Advertisement\",\n  \"rationale\": \"links to a promo\"\n}\n```";
        let parsed = parse_model_output(raw);
        assert_eq!(parsed.label, "Advertisement");
        assert_eq!(parsed.rationale, "links to a promo");
    }

    #[test]
    fn test_nested_braces_inside_object_parse() {
        let raw = r#"{"label": "Valid", "rationale": "mentions {the menu}"}"#;
        let parsed = parse_model_output(raw);
        assert_eq!(parsed.label, "Valid");
        assert_eq!(parsed.rationale, "mentions {the menu}");
    }

    #[test]
    fn test_trailing_brace_in_prose_breaks_greedy_span() {
        let raw = r#"{"label": "Valid", "rationale": "ok"} (confidence: high})"#;
        let parsed = parse_model_output(raw);
        assert_eq!(parsed.label, "unknown");
        assert_eq!(parsed.rationale, raw);
    }

    #[test]
    fn test_think_block_before_answer() {
        let raw = "<think>The reviewer mentions the food.</think>\n{\"label\": \"Valid\", \"rationale\": \"talks about food\"}";
        assert_eq!(parse_model_output(raw).label, "Valid");
    }

    #[test]
    fn test_out_of_set_label_is_returned_as_is() {
        let parsed = parse_model_output(r#"{"label": "Spam", "rationale": "looks spammy"}"#);
        assert_eq!(parsed.label, "Spam");
    }

    #[test]
    fn test_missing_or_non_string_label_is_unknown() {
        assert_eq!(parse_model_output(r#"{"rationale": "none"}"#).label, "unknown");
        assert_eq!(parse_model_output(r#"{"label": 3}"#).label, "unknown");
        assert_eq!(parse_model_output("[1, 2]").label, "unknown");
    }

    #[test]
    fn test_missing_rationale_is_empty() {
        let parsed = parse_model_output(r#"{"label": "Irrelevant Content"}"#);
        assert_eq!(parsed.label, "Irrelevant Content");
        assert_eq!(parsed.rationale, "");
    }

    #[test]
    fn test_reversed_braces_fall_back() {
        assert_eq!(parse_model_output("} nothing {").label, "unknown");
        assert_eq!(parse_model_output("").label, "unknown");
    }
}
