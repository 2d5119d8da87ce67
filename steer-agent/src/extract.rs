//! Free text → [`Action`] extraction.
//!
//! The model is treated as an adversarial serializer: its reply may be clean
//! JSON, fenced JSON, JSON buried in prose, `key: value` fragments, or plain
//! English. Strategies run in fixed priority order and the first candidate
//! that survives normalization + schema validation wins; anything else is
//! `None`, never a partially-typed object.

use regex::Regex;
use serde_json::{Map, Value};

use crate::action::{self, Action};
use crate::strategy::{first_match, NamedStrategy};

/// Convert raw model text into a validated [`Action`], or `None`.
pub fn extract(text: &str) -> Option<Action> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let structured = |t: &&str| try_structured(t).and_then(Action::from_value);
    let key_value = |t: &&str| try_key_value(t).and_then(Action::from_value);
    let loose = |t: &&str| try_loose_pattern(t).and_then(Action::from_value);

    let strategies: &[NamedStrategy<'_, &str, Action>] = &[
        ("structured", &structured),
        ("key-value", &key_value),
        ("loose-pattern", &loose),
    ];

    match first_match(&text, strategies) {
        Some((name, action)) => {
            tracing::debug!(
                target: "agent.extract",
                strategy = name,
                kind = action.kind(),
                "extracted action"
            );
            Some(action)
        }
        None => {
            tracing::warn!(
                target: "agent.extract",
                reply = %crate::util::truncate_chars(text, 200),
                "no strategy yielded a valid action"
            );
            None
        }
    }
}

// ---------- Strategy 1: structured ----------

/// Parse JSON directly, then with fences stripped, then the first `{...}`
/// span, then once more after heuristic repair.
fn try_structured(text: &str) -> Option<Value> {
    if let Some(v) = parse_object(text) {
        return Some(v);
    }

    let fenced = Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").ok()?;
    if let Some(caps) = fenced.captures(text) {
        if let Some(v) = parse_object(&caps[1]) {
            return Some(v);
        }
    }

    let span = Regex::new(r"(?s)\{.*\}").ok()?;
    if let Some(m) = span.find(text) {
        if let Some(v) = parse_object(m.as_str()) {
            return Some(v);
        }
    }

    // Heuristic repair: close an unterminated quoted value and/or append the
    // missing closing braces, then retry exactly once.
    let start = text.find('{')?;
    let mut repaired = text[start..].trim_end().to_string();
    if repaired.chars().filter(|&c| c == '"').count() % 2 == 1 {
        repaired.push('"');
    }
    let opens = repaired.chars().filter(|&c| c == '{').count();
    let closes = repaired.chars().filter(|&c| c == '}').count();
    for _ in closes..opens {
        repaired.push('}');
    }
    parse_object(&repaired)
}

fn parse_object(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(v @ Value::Object(_)) => Some(v),
        _ => None,
    }
}

// ---------- Strategy 2: key-value ----------

/// Scan for `key: value` tokens (quoted, single-quoted, or bare), without
/// requiring valid JSON around them.
fn try_key_value(text: &str) -> Option<Value> {
    let mut obj = Map::new();

    let mut put = |key: &str, captured: Option<String>| {
        if let Some(v) = captured {
            if !v.trim().is_empty() && !obj.contains_key(key) {
                obj.insert(key.to_string(), Value::String(v.trim().to_string()));
            }
        }
    };

    // `type` explicitly beats `action` when both exist; a lone `action`
    // value is promoted to `type`.
    let type_v = scan_value(text, "type");
    let action_v = scan_value(text, "action");
    put("type", type_v.or(action_v));

    put(
        "element",
        scan_value(text, "element").or_else(|| scan_value(text, "selector")),
    );
    put(
        "value",
        scan_value(text, "value").or_else(|| scan_value(text, "url")),
    );
    put("question", scan_value(text, "question"));
    put("direction", scan_value(text, "direction"));
    put("operation", scan_value(text, "operation"));
    put("note", scan_value(text, "note"));
    put("selectorType", scan_value(text, "selectorType"));
    put("maxWait", scan_value(text, "maxWait"));
    put("description", scan_value(text, "description"));

    if obj.contains_key("type") {
        Some(Value::Object(obj))
    } else {
        None
    }
}

/// Find `key: value` case-insensitively; value may be double-quoted,
/// single-quoted, or a bare token.
fn scan_value(text: &str, key: &str) -> Option<String> {
    let pattern = format!(
        r#"(?i)["']?\b{}\b["']?\s*[:=]\s*(?:"([^"]*)"|'([^']*)'|([^\s,"'{{}}]+))"#,
        regex::escape(key)
    );
    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(text)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str().to_string())
}

// ---------- Strategy 3: loose patterns ----------

/// Last resort: look for action verbs as whole words and pull arguments out
/// of the surrounding prose with permissive regexes.
fn try_loose_pattern(text: &str) -> Option<Value> {
    let lower = text.to_lowercase();
    let word = |w: &str| {
        Regex::new(&format!(r"\b{}\b", regex::escape(w)))
            .map(|re| re.is_match(&lower))
            .unwrap_or(false)
    };

    let mut obj = Map::new();

    let kind = if ["ask the user", "ask the human", "need help", "ask for help"]
        .iter()
        .any(|p| lower.contains(p))
        || word("sendhumanmessage")
    {
        "sendHumanMessage"
    } else if word("navigate") || word("goto") || lower.contains("go to") || word("visit") {
        "navigate"
    } else if word("type") || word("input") || word("fill") {
        "input"
    } else if word("click") || word("press") || word("tap") {
        "click"
    } else if word("scroll") {
        "scroll"
    } else if word("wait") || word("pause") {
        "wait"
    } else {
        return None;
    };
    obj.insert("type".to_string(), Value::String(kind.to_string()));

    match kind {
        "navigate" => {
            let url_re = Regex::new(r#"https?://[^\s"'<>)]+"#).ok()?;
            let url = url_re.find(text)?.as_str();
            obj.insert("value".to_string(), Value::String(url.to_string()));
        }
        "click" | "input" => {
            if let Some(element) = loose_element(text) {
                obj.insert("element".to_string(), Value::String(element));
            }
            if kind == "input" {
                if let Some(value) = loose_value(text) {
                    obj.insert("value".to_string(), Value::String(value));
                }
            }
        }
        "scroll" => {
            let dir = if word("up") { "up" } else { "down" };
            obj.insert("direction".to_string(), Value::String(dir.to_string()));
        }
        "sendHumanMessage" => {
            let question = Regex::new(r#"(?i)question\s*[:=]?\s*["']?([^"'\n]+)"#)
                .ok()
                .and_then(|re| re.captures(text).map(|c| c[1].trim().to_string()))
                .unwrap_or_else(|| action::DEFAULT_HELP_QUESTION.to_string());
            obj.insert("question".to_string(), Value::String(question));
        }
        _ => {}
    }

    Some(Value::Object(obj))
}

fn loose_element(text: &str) -> Option<String> {
    // Explicit element/selector mention wins.
    if let Some(caps) = Regex::new(r#"(?i)(?:element|selector)\s*[:=]?\s*["']?([#.\w\[\]='"-]+)"#)
        .ok()
        .and_then(|re| re.captures(text))
    {
        return Some(caps[1].trim_matches(|c| c == '"' || c == '\'').to_string());
    }
    // Otherwise a CSS-looking token (#id or .class) anywhere in the text.
    Regex::new(r"(?:^|\s)([#.][\w-]+)")
        .ok()
        .and_then(|re| re.captures(text))
        .map(|c| c[1].to_string())
}

fn loose_value(text: &str) -> Option<String> {
    Regex::new(r#"(?i)(?:value|text)\s*[:=]?\s*["']([^"']+)["']"#)
        .ok()
        .and_then(|re| re.captures(text))
        .map(|c| c[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::SelectorType;

    #[test]
    fn empty_text_yields_none() {
        assert_eq!(extract(""), None);
        assert_eq!(extract("   \n  "), None);
    }

    #[test]
    fn direct_json_is_extracted() {
        let action = extract(r##"{"type": "click", "element": "#submit"}"##).unwrap();
        assert_eq!(action.kind(), "click");
        assert_eq!(action.element(), Some("#submit"));
    }

    #[test]
    fn json_in_prose_is_extracted() {
        let action =
            extract(r##"I found this: {"type": "click", "selector": "#button"}"##).unwrap();
        assert_eq!(action.kind(), "click");
        assert_eq!(action.element(), Some("#button"));
    }

    #[test]
    fn fenced_json_is_extracted() {
        let text = "Here you go:\n```json\n{\"type\": \"navigate\", \"value\": \"https://example.com\"}\n```\nGood luck!";
        let action = extract(text).unwrap();
        assert_eq!(action.kind(), "navigate");
    }

    #[test]
    fn truncated_json_is_repaired() {
        let action = extract(r##"{"type": "input", "element": "#q", "value": "rust lang"##).unwrap();
        match action {
            Action::Input { element, value, .. } => {
                assert_eq!(element, "#q");
                assert_eq!(value, "rust lang");
            }
            other => panic!("expected input, got {other:?}"),
        }
    }

    #[test]
    fn key_value_fragments_are_extracted() {
        let action = extract("type: click, element: '#login-button'").unwrap();
        assert_eq!(action.kind(), "click");
        assert_eq!(action.element(), Some("#login-button"));
    }

    #[test]
    fn type_beats_action_when_both_present() {
        let action = extract("action: navigate, type: wait").unwrap();
        assert_eq!(action.kind(), "wait");
    }

    #[test]
    fn lone_action_key_is_promoted() {
        let action = extract("action: \"scroll\", direction: \"up\"").unwrap();
        match action {
            Action::Scroll { direction, .. } => {
                assert_eq!(direction, crate::action::ScrollDirection::Up)
            }
            other => panic!("expected scroll, got {other:?}"),
        }
    }

    #[test]
    fn loose_navigate_pulls_the_url() {
        let action =
            extract("I think we should navigate to https://example.com/login next.").unwrap();
        match action {
            Action::Navigate { value, .. } => assert_eq!(value, "https://example.com/login"),
            other => panic!("expected navigate, got {other:?}"),
        }
    }

    #[test]
    fn loose_click_finds_a_css_token() {
        let action = extract("Please click the #search-btn now").unwrap();
        assert_eq!(action.kind(), "click");
        assert_eq!(action.element(), Some("#search-btn"));
        assert_eq!(action.selector_type(), SelectorType::Css);
    }

    #[test]
    fn help_request_without_question_gets_a_default() {
        let action = extract("I'm stuck and need to ask the user").unwrap();
        match action {
            Action::SendHumanMessage { question, .. } => {
                assert!(!question.trim().is_empty());
            }
            other => panic!("expected sendHumanMessage, got {other:?}"),
        }
    }

    #[test]
    fn invalid_json_falls_through_but_garbage_is_none() {
        // A navigate without a URL is invalid regardless of strategy.
        assert_eq!(extract(r#"{"type": "navigate"}"#), None);
        assert_eq!(extract("the weather is lovely today"), None);
    }

    #[test]
    fn extraction_is_total_over_arbitrary_text() {
        let inputs = [
            "{}",
            "{{{{",
            "null",
            "[1,2,3]",
            "\"just a string\"",
            "type:",
            "click",
            "¯\\_(ツ)_/¯",
            "{\"type\": 7}",
        ];
        for input in inputs {
            // Must be Some(valid) or None, never a panic.
            let _ = extract(input);
        }
    }
}
