//! JSON parsing helpers for AI backend responses
//!
//! Models often wrap the JSON payload in prose or code fences, so the
//! payload is cut out of the response before deserializing.

use crate::error::{Error, Result};

use super::types::{NormalizationResponse, NormalizationSuggestion};

const MAX_RAW_IN_ERROR: usize = 200;

/// Truncate long responses for error messages, on a char boundary
fn truncate(s: &str) -> String {
    if s.chars().count() > MAX_RAW_IN_ERROR {
        format!("{}...", s.chars().take(MAX_RAW_IN_ERROR).collect::<String>())
    } else {
        s.to_string()
    }
}

/// Slice between the first `open` and the last `close`, inclusive
fn extract_between(s: &str, open: char, close: char) -> Option<&str> {
    let start = s.find(open)?;
    let end = s.rfind(close)?;
    (start < end).then(|| &s[start..=end])
}

/// Parse a normalization response and check it has one entry per input
///
/// Accepts `{"normalizations": [...]}` and, from models that ignore the
/// wrapper, a bare array of `{normalized, regex}` objects.
pub fn parse_normalizations(content: &str, expected: usize) -> Result<Vec<NormalizationSuggestion>> {
    let content = content.trim();

    let object = extract_between(content, '{', '}')
        .and_then(|json| serde_json::from_str::<NormalizationResponse>(json).ok())
        .map(|r| r.normalizations);

    // Only a top-level array counts, not one nested inside another object
    let array_first = match (content.find('['), content.find('{')) {
        (Some(a), Some(o)) => a < o,
        (Some(_), None) => true,
        _ => false,
    };

    let normalizations = match object {
        Some(n) => n,
        None => array_first
            .then(|| extract_between(content, '[', ']'))
            .flatten()
            .and_then(|json| serde_json::from_str::<Vec<NormalizationSuggestion>>(json).ok())
            .ok_or_else(|| {
                Error::AIResponse(format!(
                    "No normalizations found in AI response | Raw: {}",
                    truncate(content)
                ))
            })?,
    };

    if normalizations.len() != expected {
        return Err(Error::AIResponse(format!(
            "Expected {} normalizations, got {}",
            expected,
            normalizations.len()
        )));
    }

    Ok(normalizations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_object() {
        let content = r#"{"normalizations":[{"normalized":"Acme Store","regex":"ACME.*"},{"normalized":"Grocery Mart","regex":"GROCERY.*"}]}"#;
        let parsed = parse_normalizations(content, 2).unwrap();
        assert_eq!(parsed[0].normalized, "Acme Store");
        assert_eq!(parsed[1].regex.as_deref(), Some("GROCERY.*"));
    }

    #[test]
    fn test_parse_with_surrounding_text() {
        let content = "Here you go:\n```json\n{\"normalizations\":[{\"normalized\":\"Tesco\",\"regex\":\"TESCO.*\"}]}\n```";
        let parsed = parse_normalizations(content, 1).unwrap();
        assert_eq!(parsed[0].normalized, "Tesco");
    }

    #[test]
    fn test_parse_bare_array() {
        let content = r#"[{"normalized":"Uber","regex":"UBER.*"}]"#;
        let parsed = parse_normalizations(content, 1).unwrap();
        assert_eq!(parsed[0].normalized, "Uber");
    }

    #[test]
    fn test_count_mismatch() {
        let content = r#"{"normalizations":[{"normalized":"A","regex":"A"}]}"#;
        match parse_normalizations(content, 2) {
            Err(Error::AIResponse(msg)) => assert!(msg.contains("Expected 2")),
            other => panic!("expected AIResponse error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(
            parse_normalizations("I cannot help with that", 1),
            Err(Error::AIResponse(_))
        ));
        assert!(matches!(
            parse_normalizations(r#"{"results": []}"#, 0),
            Err(Error::AIResponse(_))
        ));
        assert!(matches!(
            parse_normalizations(r#"{"normalizations":[{"regex":"X"}]}"#, 1),
            Err(Error::AIResponse(_))
        ));
    }

    #[test]
    fn test_truncate_is_char_safe() {
        let long = "é".repeat(300);
        let t = truncate(&long);
        assert!(t.ends_with("..."));
        assert_eq!(t.chars().count(), MAX_RAW_IN_ERROR + 3);
    }
}
