//! Loop detection over the recent action history.
//!
//! The guard never blocks an action outright; it substitutes an escape
//! action and narrates the repetition so the next planning turn can change
//! course. A redundant wait escalates to the human channel, which is what
//! guarantees the loop cannot spin indefinitely.

use crate::action::Action;

/// Outcome of running the guard against a proposed action.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardVerdict {
    /// Proposed action is fine to dispatch.
    Pass,
    /// Proposed action repeats recent history; dispatch the substitute and
    /// feed the narration back to the planner.
    Substitute { action: Action, feedback: String },
}

#[derive(Debug, Clone)]
pub struct RedundancyGuard {
    window: usize,
}

impl Default for RedundancyGuard {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RedundancyGuard {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(2),
        }
    }

    /// True when at least `window - 1` of the last `window` actions are
    /// equivalent to `action` under the type-specific equality rules.
    pub fn is_redundant(&self, action: &Action, history: &[Action]) -> bool {
        let start = history.len().saturating_sub(self.window);
        let recent = &history[start..];
        let matching = recent
            .iter()
            .filter(|past| actions_equivalent(past, action))
            .count();
        matching >= self.window - 1
    }

    /// Inspect `action` against `history`; on detection return the escape
    /// action in its place.
    pub fn check(&self, action: &Action, history: &[Action]) -> GuardVerdict {
        if !self.is_redundant(action, history) {
            return GuardVerdict::Pass;
        }

        tracing::warn!(
            target: "agent.guard",
            kind = action.kind(),
            "redundant action detected"
        );

        if matches!(action, Action::Wait { .. }) {
            // Waiting again will not change anything; hand over to a human.
            let feedback = format!(
                "Repeatedly waiting has not changed the page. Escalating to a human operator \
                 after {} similar attempts.",
                self.window
            );
            let action = Action::SendHumanMessage {
                question: "The page does not seem to react to my actions and waiting does not \
                           help. How should I proceed?"
                    .to_string(),
                max_wait: crate::action::DEFAULT_MAX_WAIT_MS,
                description: Some("redundancy escalation".to_string()),
            };
            GuardVerdict::Substitute { action, feedback }
        } else {
            let feedback = format!(
                "The action \"{}\" repeats the last attempts without visible progress. \
                 Substituting a single wait so pending page changes can settle; choose a \
                 different approach next turn.",
                action.describe()
            );
            let action = Action::settle_wait("allowing async page changes to settle");
            GuardVerdict::Substitute { action, feedback }
        }
    }
}

/// Type-specific equality used for redundancy checks.
///
/// click/input compare their target (and value); navigate compares the URL;
/// scroll compares direction; any wait counts as matching any other wait.
/// Notes and human messages never count toward redundancy.
pub fn actions_equivalent(a: &Action, b: &Action) -> bool {
    match (a, b) {
        (Action::Click { element: e1, .. }, Action::Click { element: e2, .. }) => e1 == e2,
        (
            Action::Input {
                element: e1,
                value: v1,
                ..
            },
            Action::Input {
                element: e2,
                value: v2,
                ..
            },
        ) => e1 == e2 && v1 == v2,
        (Action::Navigate { value: v1, .. }, Action::Navigate { value: v2, .. }) => v1 == v2,
        (Action::Scroll { direction: d1, .. }, Action::Scroll { direction: d2, .. }) => d1 == d2,
        (Action::Wait { .. }, Action::Wait { .. }) => true,
        _ => false,
    }
}
