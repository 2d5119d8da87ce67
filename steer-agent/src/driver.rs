//! The browser capability consumed by the agent loop.
//!
//! The core never assumes a specific transport; everything it needs from a
//! browser is behind [`PageDriver`], implemented over WebDriver in
//! `steer-browser` and by scripted mocks in tests. Every operation that
//! touches the page carries a timeout at the call site so an unresponsive
//! page produces a local, recoverable failure rather than a hang.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::action::SelectorType;

/// A concrete way of locating elements on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
    /// Visible-text match, resolved by the driver (e.g. via XPath).
    Text(String),
}

impl Locator {
    /// Build a locator from an action's logical selector.
    pub fn from_selector(selector_type: SelectorType, element: &str) -> Locator {
        match selector_type {
            SelectorType::Css => Locator::Css(element.to_string()),
            SelectorType::Xpath => Locator::XPath(element.to_string()),
            SelectorType::Text => Locator::Text(element.to_string()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Locator::Css(s) => format!("css:{s}"),
            Locator::XPath(s) => format!("xpath:{s}"),
            Locator::Text(s) => format!("text:{s}"),
        }
    }
}

/// Compact description of one interactive element, as harvested by the
/// snapshot script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementSummary {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// `type` attribute for inputs.
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub href: Option<String>,
}

impl ElementSummary {
    /// Short rendering used in the planning prompt.
    pub fn render(&self) -> String {
        let mut out = self.tag.clone();
        if let Some(id) = &self.id {
            out.push_str(&format!(" #{id}"));
        }
        if let Some(name) = &self.name {
            out.push_str(&format!(" name={name}"));
        }
        if let Some(kind) = &self.kind {
            out.push_str(&format!(" type={kind}"));
        }
        if let Some(text) = &self.text {
            out.push_str(&format!(" \"{}\"", crate::util::truncate_chars(text, 60)));
        }
        if let Some(href) = &self.href {
            out.push_str(&format!(" -> {}", crate::util::truncate_chars(href, 80)));
        }
        out
    }
}

/// One observation of the page: url, title, and the interactive-element
/// inventory. Opaque input to progress and milestone detection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub buttons: Vec<ElementSummary>,
    #[serde(default)]
    pub inputs: Vec<ElementSummary>,
    #[serde(default)]
    pub links: Vec<ElementSummary>,
    #[serde(default)]
    pub landmarks: Vec<ElementSummary>,
}

impl PageSnapshot {
    /// (buttons, inputs, links) counts, used for delta feedback.
    pub fn interactive_counts(&self) -> (usize, usize, usize) {
        (self.buttons.len(), self.inputs.len(), self.links.len())
    }

    /// Text rendering of the inventory for the planning prompt.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("URL: {}\nTitle: {}\n", self.url, self.title));
        for (label, entries) in [
            ("Buttons", &self.buttons),
            ("Inputs", &self.inputs),
            ("Links", &self.links),
            ("Landmarks", &self.landmarks),
        ] {
            if entries.is_empty() {
                continue;
            }
            out.push_str(&format!("{label}:\n"));
            for e in entries.iter().take(30) {
                out.push_str(&format!("  - {}\n", e.render()));
            }
            if entries.len() > 30 {
                out.push_str(&format!("  … and {} more\n", entries.len() - 30));
            }
        }
        out
    }
}

/// Opaque async browser operations, in program order, one at a time.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Driver-specific element handle.
    type Handle: Clone + Send + Sync;

    async fn navigate(&self, url: &str) -> anyhow::Result<()>;
    async fn current_url(&self) -> anyhow::Result<String>;
    async fn title(&self) -> anyhow::Result<String>;

    /// Locate the first matching element, waiting up to `timeout`.
    /// `Ok(None)` means "not found in time", which is recoverable.
    async fn query(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> anyhow::Result<Option<Self::Handle>>;

    /// All current matches, without waiting.
    async fn query_all(&self, locator: &Locator) -> anyhow::Result<Vec<Self::Handle>>;

    async fn click(&self, handle: &Self::Handle) -> anyhow::Result<()>;
    async fn fill(&self, handle: &Self::Handle, text: &str) -> anyhow::Result<()>;
    async fn press_enter(&self, handle: &Self::Handle) -> anyhow::Result<()>;

    /// Assign a form control's value directly and dispatch a change event.
    /// Needed for `<select>`, radio, and checkbox controls where native
    /// clicks are unreliable.
    async fn set_form_value(&self, handle: &Self::Handle, value: &str) -> anyhow::Result<()>;

    async fn read_value(&self, handle: &Self::Handle) -> anyhow::Result<String>;
    async fn is_displayed(&self, handle: &Self::Handle) -> anyhow::Result<bool>;
    async fn is_enabled(&self, handle: &Self::Handle) -> anyhow::Result<bool>;
    async fn tag_name(&self, handle: &Self::Handle) -> anyhow::Result<String>;
    async fn attr(&self, handle: &Self::Handle, name: &str) -> anyhow::Result<Option<String>>;

    async fn scroll_by(&self, dy: i64) -> anyhow::Result<()>;
    async fn screenshot(&self) -> anyhow::Result<Vec<u8>>;
    async fn evaluate(&self, script: &str) -> anyhow::Result<serde_json::Value>;

    /// Harvest the current [`PageSnapshot`].
    async fn snapshot(&self) -> anyhow::Result<PageSnapshot>;

    /// Release the underlying browser session.
    async fn close(&self) -> anyhow::Result<()>;
}
