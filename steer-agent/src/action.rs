//! The closed set of browser instructions the agent may execute.
//!
//! An [`Action`] is a proper tagged union: each kind carries exactly its
//! valid fields, and serde validation is the schema validation. Raw model
//! output never becomes an `Action` except through [`Action::from_value`],
//! which runs [`normalize`] first and rejects anything that does not
//! deserialize cleanly (a `navigate` without a URL is rejected, not
//! defaulted).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Bounds for the shared per-action wait budget, in milliseconds.
pub const MIN_MAX_WAIT_MS: u64 = 2000;
pub const MAX_MAX_WAIT_MS: u64 = 5000;
pub const DEFAULT_MAX_WAIT_MS: u64 = 3000;

fn default_max_wait() -> u64 {
    DEFAULT_MAX_WAIT_MS
}

/// How the `element` field of click/input actions should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorType {
    #[default]
    Css,
    Xpath,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    #[default]
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteOperation {
    #[default]
    Add,
    Read,
}

/// One structured browser instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Action {
    Click {
        element: String,
        #[serde(default)]
        selector_type: SelectorType,
        #[serde(default = "default_max_wait")]
        max_wait: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Input {
        element: String,
        value: String,
        #[serde(default)]
        selector_type: SelectorType,
        #[serde(default = "default_max_wait")]
        max_wait: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Navigate {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous_url: Option<String>,
        #[serde(default = "default_max_wait")]
        max_wait: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Wait {
        #[serde(default = "default_max_wait")]
        max_wait: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Scroll {
        #[serde(default)]
        direction: ScrollDirection,
        #[serde(default = "default_max_wait")]
        max_wait: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Notes {
        #[serde(default)]
        operation: NoteOperation,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
        #[serde(default = "default_max_wait")]
        max_wait: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    SendHumanMessage {
        question: String,
        #[serde(default = "default_max_wait")]
        max_wait: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl Action {
    /// Canonical wire name of this action's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Click { .. } => "click",
            Action::Input { .. } => "input",
            Action::Navigate { .. } => "navigate",
            Action::Wait { .. } => "wait",
            Action::Scroll { .. } => "scroll",
            Action::Notes { .. } => "notes",
            Action::SendHumanMessage { .. } => "sendHumanMessage",
        }
    }

    /// The wait budget for this action, clamped to the allowed band.
    pub fn max_wait(&self) -> Duration {
        let raw = match self {
            Action::Click { max_wait, .. }
            | Action::Input { max_wait, .. }
            | Action::Navigate { max_wait, .. }
            | Action::Wait { max_wait, .. }
            | Action::Scroll { max_wait, .. }
            | Action::Notes { max_wait, .. }
            | Action::SendHumanMessage { max_wait, .. } => *max_wait,
        };
        Duration::from_millis(raw.clamp(MIN_MAX_WAIT_MS, MAX_MAX_WAIT_MS))
    }

    /// Logical selector, for the kinds that target an element.
    pub fn element(&self) -> Option<&str> {
        match self {
            Action::Click { element, .. } | Action::Input { element, .. } => Some(element),
            _ => None,
        }
    }

    pub fn selector_type(&self) -> SelectorType {
        match self {
            Action::Click { selector_type, .. } | Action::Input { selector_type, .. } => {
                *selector_type
            }
            _ => SelectorType::Css,
        }
    }

    /// One-line human-readable rendering for the session history.
    pub fn describe(&self) -> String {
        match self {
            Action::Click { element, .. } => format!("click {element}"),
            Action::Input { element, value, .. } => {
                format!("input \"{value}\" into {element}")
            }
            Action::Navigate { value, .. } => format!("navigate to {value}"),
            Action::Wait { max_wait, .. } => format!("wait {max_wait}ms"),
            Action::Scroll { direction, .. } => match direction {
                ScrollDirection::Up => "scroll up".to_string(),
                ScrollDirection::Down => "scroll down".to_string(),
            },
            Action::Notes { operation, note, .. } => match operation {
                NoteOperation::Add => {
                    format!("note: {}", note.as_deref().unwrap_or("(empty)"))
                }
                NoteOperation::Read => "read notes".to_string(),
            },
            Action::SendHumanMessage { question, .. } => {
                format!("ask human: {question}")
            }
        }
    }

    /// Build a bounded settle-wait, used as the redundancy escape action.
    pub fn settle_wait(reason: &str) -> Action {
        Action::Wait {
            max_wait: DEFAULT_MAX_WAIT_MS,
            description: Some(reason.to_string()),
        }
    }

    /// Normalize then validate a raw JSON value. Returns `None` on any
    /// unrecoverable validation failure.
    pub fn from_value(raw: Value) -> Option<Action> {
        let normalized = normalize(raw);
        let action: Action = serde_json::from_value(normalized).ok()?;
        // Required strings must carry content, not just be present.
        match &action {
            Action::Click { element, .. } if element.trim().is_empty() => None,
            Action::Input { element, .. } if element.trim().is_empty() => None,
            Action::Navigate { value, .. } if value.trim().is_empty() => None,
            Action::SendHumanMessage { question, .. } if question.trim().is_empty() => None,
            _ => Some(action),
        }
    }
}

/// Canonical wire names, in dispatch order.
pub const ACTION_KINDS: [&str; 7] = [
    "click",
    "input",
    "navigate",
    "wait",
    "scroll",
    "notes",
    "sendHumanMessage",
];

/// Map a free-form type string to its canonical wire name.
///
/// Case-insensitive; help-action synonyms all collapse onto
/// `sendHumanMessage`.
pub fn canonical_kind(raw: &str) -> Option<&'static str> {
    let folded = raw.trim().to_ascii_lowercase();
    let folded = folded.trim_matches(|c| c == '"' || c == '\'');
    for kind in ACTION_KINDS {
        if kind.eq_ignore_ascii_case(folded) {
            return Some(kind);
        }
    }
    match folded {
        "ask_human" | "askhuman" | "ask_user" | "askuser" | "ask" | "human" | "help"
        | "send_human_message" | "question" => Some("sendHumanMessage"),
        "goto" | "go_to" | "visit" | "open" | "url" => Some("navigate"),
        "type" | "fill" | "enter_text" => Some("input"),
        "note" => Some("notes"),
        _ => None,
    }
}

/// Best-effort normalization of a raw JSON object toward the Action wire
/// contract. Structural only: collapses field-name variants, canonicalizes
/// the `type` tag, infers a plausible type where the model wrote the
/// literal word "action", and coerces numeric strings. Idempotent.
pub fn normalize(raw: Value) -> Value {
    let Value::Object(mut obj) = raw else {
        return raw;
    };

    // `action`/`nextAction` may hold the real payload or just the type name.
    for key in ["nextAction", "next_action", "action"] {
        match obj.remove(key) {
            Some(Value::Object(inner)) => {
                for (k, v) in inner {
                    obj.entry(k).or_insert(v);
                }
            }
            Some(Value::String(s)) => {
                if !obj.contains_key("type") {
                    obj.insert("type".to_string(), Value::String(s));
                }
            }
            Some(other) => {
                // Unusable shape; drop it rather than poison validation.
                let _ = other;
            }
            None => {}
        }
    }

    // Field-name variants.
    rename_missing(&mut obj, "selector", "element");
    rename_missing(&mut obj, "url", "value");
    rename_missing(&mut obj, "message", "question");

    // Canonicalize the tag.
    let raw_type = obj
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string);
    match raw_type.as_deref() {
        Some("action") => {
            if let Some(inferred) = infer_kind(&obj) {
                obj.insert("type".to_string(), Value::String(inferred.to_string()));
            }
        }
        Some(t) => {
            if let Some(kind) = canonical_kind(t) {
                obj.insert("type".to_string(), Value::String(kind.to_string()));
            }
        }
        None => {}
    }

    // Models frequently quote numbers.
    if let Some(Value::String(s)) = obj.get("maxWait") {
        if let Ok(n) = s.trim().parse::<u64>() {
            obj.insert("maxWait".to_string(), Value::Number(n.into()));
        }
    }

    // A help action must carry a question.
    if obj.get("type").and_then(Value::as_str) == Some("sendHumanMessage")
        && !obj
            .get("question")
            .and_then(Value::as_str)
            .is_some_and(|q| !q.trim().is_empty())
    {
        obj.insert(
            "question".to_string(),
            Value::String(DEFAULT_HELP_QUESTION.to_string()),
        );
    }

    Value::Object(obj)
}

pub const DEFAULT_HELP_QUESTION: &str =
    "I am unsure how to proceed on the current page. What should I do next?";

fn rename_missing(obj: &mut Map<String, Value>, from: &str, to: &str) {
    if !obj.contains_key(to) {
        if let Some(v) = obj.remove(from) {
            obj.insert(to.to_string(), v);
        }
    } else {
        obj.remove(from);
    }
}

/// When the tag is literally "action", guess the kind from the fields
/// that are present.
fn infer_kind(obj: &Map<String, Value>) -> Option<&'static str> {
    let has = |k: &str| obj.get(k).and_then(Value::as_str).is_some_and(|s| !s.is_empty());
    if has("question") {
        return Some("sendHumanMessage");
    }
    if has("element") && has("value") {
        return Some("input");
    }
    if has("element") {
        return Some("click");
    }
    if let Some(value) = obj.get("value").and_then(Value::as_str) {
        if value.starts_with("http://") || value.starts_with("https://") || value.contains('.') {
            return Some("navigate");
        }
    }
    None
}
