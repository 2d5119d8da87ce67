//! Multi-strategy DOM element resolution.
//!
//! The planner's selectors are guesses; this module turns them into real
//! element handles by walking an ordered fallback chain, first hit wins —
//! the same first-match shape the extractor uses, with the order list as
//! plain data. The action's `maxWait` budget is split evenly across the
//! strategies that apply, so a bad selector costs bounded time.

use std::time::Duration;

use crate::action::Action;
use crate::driver::{Locator, PageDriver};
use crate::util::shuffle;

/// What a successful resolution produced.
pub enum Resolution<H> {
    Element(H),
    /// The target is an anchor with an href: prefer direct navigation over
    /// a DOM click, which is often intercepted.
    NavigateTo(String),
}

/// Ordered strategies; `RESOLVE_ORDER` is the canonical chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStrategy {
    Direct,
    IdHeuristics,
    InputSubstitution,
    RoleMatch,
    LinkHref,
    LastVisible,
}

pub const RESOLVE_ORDER: [ResolveStrategy; 6] = [
    ResolveStrategy::Direct,
    ResolveStrategy::IdHeuristics,
    ResolveStrategy::InputSubstitution,
    ResolveStrategy::RoleMatch,
    ResolveStrategy::LinkHref,
    ResolveStrategy::LastVisible,
];

/// Per-resolution scratch record: what was tried, with what budget, and the
/// last driver error seen. Fresh per call.
#[derive(Debug, Default)]
pub struct ElementContext {
    pub previous_attempts: Vec<(&'static str, String)>,
    pub timeout_per_strategy: Duration,
    pub last_error: Option<String>,
}

impl ElementContext {
    fn note_attempt(&mut self, strategy: &'static str, locator: &Locator) {
        self.previous_attempts.push((strategy, locator.describe()));
    }
}

#[derive(Debug, Clone, Default)]
pub struct ElementResolver;

impl ElementResolver {
    pub fn new() -> Self {
        Self
    }

    /// Find a concrete handle for `action`'s logical selector, or report
    /// every attempt made. Never errors: driver failures are recorded and
    /// the chain moves on.
    pub async fn resolve<P: PageDriver>(
        &self,
        driver: &P,
        action: &Action,
    ) -> (Option<Resolution<P::Handle>>, ElementContext) {
        let mut ctx = ElementContext::default();

        let element = match action.element() {
            Some(e) => e.to_string(),
            None => return (None, ctx),
        };

        let applicable: Vec<ResolveStrategy> = RESOLVE_ORDER
            .iter()
            .copied()
            .filter(|s| strategy_applies(*s, action))
            .collect();
        if applicable.is_empty() {
            return (None, ctx);
        }
        ctx.timeout_per_strategy = action.max_wait() / applicable.len() as u32;

        for strategy in applicable {
            let name = strategy_name(strategy);
            for locator in candidate_locators(strategy, action, &element) {
                ctx.note_attempt(name, &locator);
                match driver.query(&locator, ctx.timeout_per_strategy).await {
                    Ok(Some(handle)) => {
                        tracing::debug!(
                            target: "agent.resolve",
                            strategy = name,
                            locator = %locator.describe(),
                            "element resolved"
                        );
                        if strategy == ResolveStrategy::LinkHref {
                            if let Ok(Some(href)) = driver.attr(&handle, "href").await {
                                if !href.is_empty() && !href.starts_with("javascript:") {
                                    return (Some(Resolution::NavigateTo(href)), ctx);
                                }
                            }
                        }
                        return (Some(Resolution::Element(handle)), ctx);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        ctx.last_error = Some(e.to_string());
                    }
                }
            }

            // Last resort runs outside the locator loop: it inspects all
            // visible elements of the expected tag.
            if strategy == ResolveStrategy::LastVisible {
                if let Some(handle) = self.single_visible(driver, action, &mut ctx).await {
                    return (Some(Resolution::Element(handle)), ctx);
                }
            }
        }

        tracing::warn!(
            target: "agent.resolve",
            element = %element,
            attempts = ctx.previous_attempts.len(),
            "no strategy located the element"
        );
        (None, ctx)
    }

    async fn single_visible<P: PageDriver>(
        &self,
        driver: &P,
        action: &Action,
        ctx: &mut ElementContext,
    ) -> Option<P::Handle> {
        let tag = expected_tag(action);
        let locator = Locator::Css(tag.to_string());
        ctx.note_attempt("last-visible", &locator);

        let handles = match driver.query_all(&locator).await {
            Ok(h) => h,
            Err(e) => {
                ctx.last_error = Some(e.to_string());
                return None;
            }
        };

        let mut visible = Vec::new();
        for handle in handles {
            if driver.is_displayed(&handle).await.unwrap_or(false) {
                visible.push(handle);
                if visible.len() > 1 {
                    // Ambiguous; guessing here does more harm than failing.
                    return None;
                }
            }
        }
        visible.pop()
    }

    /// Feedback for the planner after a failed resolution: what was tried,
    /// and a few varied suggestions for the next attempt.
    pub fn failure_feedback(&self, ctx: &ElementContext, element: &str) -> String {
        let tried: Vec<&str> = ctx
            .previous_attempts
            .iter()
            .map(|(_, locator)| locator.as_str())
            .collect();

        let hints = [
            "use a partial attribute match such as [id*='…'] instead of an exact id",
            "target the visible label with selectorType \"text\"",
            "pick a selector straight from the element inventory above",
            "try the element's ARIA role, e.g. [role='button']",
            "if the target is a link, navigate to its href directly",
        ];
        let picked: Vec<String> = shuffle(&hints)
            .into_iter()
            .take(3)
            .map(str::to_string)
            .collect();

        format!(
            "Could not locate \"{}\". Tried: {}. Try instead: {}.",
            element,
            tried.join(", "),
            picked.join("; ")
        )
    }
}

fn strategy_name(s: ResolveStrategy) -> &'static str {
    match s {
        ResolveStrategy::Direct => "direct",
        ResolveStrategy::IdHeuristics => "id-heuristics",
        ResolveStrategy::InputSubstitution => "input-substitution",
        ResolveStrategy::RoleMatch => "role-match",
        ResolveStrategy::LinkHref => "link-href",
        ResolveStrategy::LastVisible => "last-visible",
    }
}

fn strategy_applies(strategy: ResolveStrategy, action: &Action) -> bool {
    match strategy {
        ResolveStrategy::Direct | ResolveStrategy::IdHeuristics | ResolveStrategy::RoleMatch => {
            true
        }
        ResolveStrategy::InputSubstitution => matches!(action, Action::Input { .. }),
        ResolveStrategy::LinkHref | ResolveStrategy::LastVisible => {
            matches!(action, Action::Click { .. })
        }
    }
}

fn expected_tag(action: &Action) -> &'static str {
    match action {
        Action::Input { .. } => "input",
        _ => "button",
    }
}

/// Candidate locators for one strategy, in the order they should be tried.
pub fn candidate_locators(
    strategy: ResolveStrategy,
    action: &Action,
    element: &str,
) -> Vec<Locator> {
    match strategy {
        ResolveStrategy::Direct => {
            vec![Locator::from_selector(action.selector_type(), element)]
        }

        ResolveStrategy::IdHeuristics => {
            // Loosen an exact id/class match into partial attribute-contains
            // matches. Only useful for simple tokens, not full css paths.
            let key = element.trim_start_matches(['#', '.']);
            if !is_simple_token(key) {
                return Vec::new();
            }
            [
                format!("[id*='{key}']"),
                format!("[name*='{key}']"),
                format!("[class*='{key}']"),
                format!("[placeholder*='{key}']"),
                format!("[aria-label*='{key}']"),
                format!("[data-testid*='{key}']"),
            ]
            .into_iter()
            .map(Locator::Css)
            .collect()
        }

        ResolveStrategy::InputSubstitution => [
            "textarea",
            "[role='searchbox']",
            "input[type='search']",
            "input[name='q']",
            "input[type='text']",
            "[contenteditable='true']",
        ]
        .into_iter()
        .map(|s| Locator::Css(s.to_string()))
        .collect(),

        ResolveStrategy::RoleMatch => {
            let mut out = Vec::new();
            match action {
                Action::Input { .. } => {
                    out.push(Locator::Css("[role='textbox']".into()));
                    out.push(Locator::Css("[role='combobox']".into()));
                }
                _ => {
                    if let Some(quoted) = xpath_quote(label_text(element)) {
                        out.push(Locator::XPath(format!(
                            "//button[contains(normalize-space(.), {quoted})] | \
                             //*[@role='button' and contains(normalize-space(.), {quoted})]"
                        )));
                    }
                    out.push(Locator::Css("button[type='submit']".into()));
                    out.push(Locator::Css("input[type='submit']".into()));
                }
            }
            out
        }

        ResolveStrategy::LinkHref => {
            let mut out = Vec::new();
            if let Some(quoted) = xpath_quote(label_text(element)) {
                out.push(Locator::XPath(format!(
                    "//a[contains(normalize-space(.), {quoted})]"
                )));
            }
            let key = element.trim_start_matches(['#', '.']);
            if is_simple_token(key) {
                out.push(Locator::Css(format!("a[href*='{}']", key.to_lowercase())));
            }
            out
        }

        // Handled specially by `single_visible`.
        ResolveStrategy::LastVisible => Vec::new(),
    }
}

fn is_simple_token(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Strip selector punctuation so "#login-button" can still match a label.
fn label_text(element: &str) -> Option<&str> {
    if element.starts_with(['#', '.', '[']) || element.contains(['>', '=']) {
        return None;
    }
    Some(element)
}

/// Embed text in an XPath string literal, picking a quote the text lacks.
fn xpath_quote(text: Option<&str>) -> Option<String> {
    let text = text?;
    if !text.contains('\'') {
        Some(format!("'{text}'"))
    } else if !text.contains('"') {
        Some(format!("\"{text}\""))
    } else {
        None
    }
}
