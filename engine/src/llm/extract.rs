//! JSON extraction from oracle text
//!
//! Oracle answers are free text that usually, but not always, carries a JSON
//! document. Extraction runs three stages in order and reports which one
//! succeeded:
//!
//! 1. Direct: the whole (trimmed) answer parses as a JSON object or array
//! 2. Fenced: the body of the first markdown code fence parses
//! 3. Brace scan: the first balanced `{...}` object in the text parses
//!
//! No stage panics or returns an error; a miss falls through to the next.

use serde_json::Value;

/// Outcome of [`extract_json`]
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Direct(Value),
    Fenced(Value),
    BraceScan(Value),
    NotFound,
}

impl Extraction {
    /// The extracted document, if any stage succeeded
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Direct(v) | Self::Fenced(v) | Self::BraceScan(v) => Some(v),
            Self::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        !matches!(self, Self::NotFound)
    }

    /// Name of the stage that produced the value
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Direct(_) => "direct",
            Self::Fenced(_) => "fenced",
            Self::BraceScan(_) => "brace_scan",
            Self::NotFound => "not_found",
        }
    }
}

/// Run the three extraction stages over `content`
pub fn extract_json(content: &str) -> Extraction {
    let trimmed = content.trim();

    if let Some(value) = parse_document(trimmed) {
        return Extraction::Direct(value);
    }

    if let Some(body) = fenced_body(trimmed) {
        if let Some(value) = parse_document(body.trim()) {
            return Extraction::Fenced(value);
        }
    }

    if let Some(value) = scan_first_object(trimmed) {
        return Extraction::BraceScan(value);
    }

    Extraction::NotFound
}

/// Parse `s` if it is a JSON object or array
fn parse_document(s: &str) -> Option<Value> {
    if !(s.starts_with('{') || s.starts_with('[')) {
        return None;
    }
    match serde_json::from_str::<Value>(s) {
        Ok(value) if value.is_object() || value.is_array() => Some(value),
        _ => None,
    }
}

/// Body of the first markdown code fence.
///
/// Works with or without a language tag and with trailing prose after the
/// closing fence.
fn fenced_body(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip a language tag such as `json`
    let tag_len = after_opening
        .char_indices()
        .find(|(_, c)| !c.is_ascii_alphanumeric())
        .map(|(i, _)| i)
        .unwrap_or(after_opening.len());
    let body = &after_opening[tag_len..];

    let closing = body.find("```")?;
    let inner = &body[..closing];
    if inner.trim().is_empty() {
        None
    } else {
        Some(inner)
    }
}

/// First balanced `{...}` candidate that parses as JSON
fn scan_first_object(content: &str) -> Option<Value> {
    let mut offset = 0;
    while let Some(pos) = content[offset..].find('{') {
        let start = offset + pos;
        if let Some(candidate) = balanced_object(&content[start..]) {
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                return Some(value);
            }
        }
        offset = start + 1;
    }
    None
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals, to find the
/// matching close brace.
fn balanced_object(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct_object_and_array() {
        assert_eq!(
            extract_json(r#"  {"steps": []} "#),
            Extraction::Direct(json!({"steps": []}))
        );
        assert_eq!(extract_json("[1,2]"), Extraction::Direct(json!([1, 2])));
    }

    #[test]
    fn test_fenced_with_language_tag_and_trailing_prose() {
        let text = "Here is the plan:\n```json\n{\"steps\": [{\"skill\": \"writeDraft\"}]}\n```\nGood luck!";
        let extraction = extract_json(text);
        assert_eq!(extraction.stage(), "fenced");
        assert_eq!(
            extraction.into_value().unwrap()["steps"][0]["skill"],
            json!("writeDraft")
        );
    }

    #[test]
    fn test_fenced_without_language_tag() {
        let text = "```\n[{\"violated\": true}]\n```";
        assert_eq!(extract_json(text).stage(), "fenced");
    }

    #[test]
    fn test_brace_scan_in_prose() {
        let text = r#"I think {"violated": false, "reason": "fine {really}"} is right."#;
        let extraction = extract_json(text);
        assert_eq!(extraction.stage(), "brace_scan");
        assert_eq!(
            extraction.into_value().unwrap()["reason"],
            json!("fine {really}")
        );
    }

    #[test]
    fn test_brace_scan_skips_unparsable_candidate() {
        let text = r#"{not json} then {"ok": 1}"#;
        assert_eq!(extract_json(text), Extraction::BraceScan(json!({"ok": 1})));
    }

    #[test]
    fn test_escaped_quotes_inside_strings() {
        let text = r#"answer: {"msg": "she said \"}\" twice"} end"#;
        let value = extract_json(text).into_value().unwrap();
        assert_eq!(value["msg"], json!("she said \"}\" twice"));
    }

    #[test]
    fn test_not_found() {
        assert_eq!(extract_json("no structure at all"), Extraction::NotFound);
        assert_eq!(extract_json("{ unterminated"), Extraction::NotFound);
        assert!(!extract_json("42").is_found());
    }
}
