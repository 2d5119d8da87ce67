//! The mutable record threading through one automation run.

use uuid::Uuid;

use crate::action::Action;
use crate::driver::PageSnapshot;
use crate::progress::{classify_goal, progress_percent, Milestone};

/// Everything one session knows about itself. Created once at session
/// start, mutated by the state handlers, dropped at the terminal state.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub goal: String,

    /// Append-only human-readable log; becomes corrective context for the
    /// planner.
    pub history: Vec<String>,
    /// Append-only typed log used for redundancy and milestone checks.
    pub action_history: Vec<Action>,

    pub retries: u32,
    pub consecutive_failures: u32,

    pub milestones: Vec<Milestone>,

    pub last_action_success: bool,
    pub success_count: u32,

    pub current_action: Option<Action>,
    pub previous_snapshot: Option<PageSnapshot>,

    /// Feedback lines assembled for the next LLM turn; drained when the
    /// prompt is built.
    pub feedback: Vec<String>,
    /// Scratchpad written by `notes` actions.
    pub notes: Vec<String>,
}

impl Session {
    pub fn new(goal: impl Into<String>) -> Self {
        let goal = goal.into();
        let milestones = classify_goal(&goal);
        tracing::info!(
            target: "agent.session",
            %goal,
            milestones = milestones.len(),
            "session created"
        );
        Self {
            id: Uuid::new_v4(),
            goal,
            history: Vec::new(),
            action_history: Vec::new(),
            retries: 0,
            consecutive_failures: 0,
            milestones,
            last_action_success: false,
            success_count: 0,
            current_action: None,
            previous_snapshot: None,
            feedback: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// Append a line to the human-readable history.
    pub fn log(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::debug!(target: "agent.session", "{line}");
        self.history.push(line);
    }

    /// Queue feedback for the next planning turn.
    pub fn push_feedback(&mut self, line: impl Into<String>) {
        self.feedback.push(line.into());
    }

    /// Drain the queued feedback into one block of text.
    pub fn take_feedback(&mut self) -> String {
        let block = self.feedback.join("\n");
        self.feedback.clear();
        block
    }

    /// Record a dispatched action in both logs.
    pub fn record_action(&mut self, action: &Action) {
        self.log(format!("Action: {}", action.describe()));
        self.action_history.push(action.clone());
        self.current_action = Some(action.clone());
    }

    /// Bookkeeping after a successful execution.
    pub fn mark_success(&mut self) {
        self.last_action_success = true;
        self.success_count += 1;
        self.consecutive_failures = 0;
    }

    /// Bookkeeping after a failed execution.
    pub fn mark_failure(&mut self) {
        self.last_action_success = false;
        self.consecutive_failures += 1;
    }

    pub fn progress_percent(&self) -> f64 {
        progress_percent(&self.milestones)
    }

    /// Last `n` history lines, newest last, for the prompt.
    pub fn recent_history(&self, n: usize) -> &[String] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_session_seeds_milestones_from_the_goal() {
        let session = Session::new("search for rust tutorials");
        assert!(!session.milestones.is_empty());
        assert_eq!(session.retries, 0);
        assert_eq!(session.progress_percent(), 0.0);
    }

    #[test]
    fn feedback_is_drained_once() {
        let mut session = Session::new("test");
        session.push_feedback("first");
        session.push_feedback("second");
        assert_eq!(session.take_feedback(), "first\nsecond");
        assert_eq!(session.take_feedback(), "");
    }

    #[test]
    fn record_action_appends_to_both_logs() {
        let mut session = Session::new("test");
        let action = Action::from_value(json!({"type": "wait"})).unwrap();
        session.record_action(&action);
        assert_eq!(session.action_history.len(), 1);
        assert_eq!(session.history.len(), 1);
        assert!(session.current_action.is_some());
    }
}
