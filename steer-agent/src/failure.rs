//! Failure taxonomy and the bounded retry/escalation policy.
//!
//! Every surfaced failure routes through the orchestrator's single failure
//! state, which consults [`FailureManager`]: the retry budget is the only
//! fatal condition; sustained failure prefers asking a human over silent
//! spinning.

use crate::guard::actions_equivalent;
use crate::session::Session;

/// What can go wrong inside one loop iteration.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// No extraction strategy yielded a schema-valid action.
    #[error("action extraction failed: {0}")]
    Extraction(String),

    /// No resolution strategy located a target element.
    #[error("element resolution failed: {0}")]
    Resolution(String),

    /// The underlying operation threw, or post-action verification failed.
    #[error("action execution failed: {0}")]
    Execution(String),

    /// The redundancy guard tripped and could not recover locally.
    #[error("action loop detected: {0}")]
    LoopDetected(String),

    /// The retry counter exceeded its budget; fatal to the session.
    #[error("retry budget exceeded after {0} retries")]
    BudgetExceeded(u32),

    /// Browser/driver-level error.
    #[error(transparent)]
    Driver(#[from] anyhow::Error),
}

pub type AgentResult<T> = Result<T, AgentError>;

/// Tunable bounds for the loop. Mirrors the `policy` section of the
/// configuration file.
#[derive(Debug, Clone)]
pub struct LoopPolicy {
    /// Fatal retry budget for one session.
    pub max_retries: u32,
    /// How many recent actions the redundancy guard inspects.
    pub redundancy_window: usize,
    /// Retry count beyond which the session counts as stuck.
    pub stuck_threshold: u32,
    /// Consecutive failures before the failure handler asks a human.
    /// Deterministic by design; there is no random roll here.
    pub escalation_threshold: u32,
    /// Default per-action wait bound in milliseconds.
    pub default_max_wait_ms: u64,
}

impl Default for LoopPolicy {
    fn default() -> Self {
        Self {
            max_retries: 7,
            redundancy_window: 3,
            stuck_threshold: 3,
            escalation_threshold: 3,
            default_max_wait_ms: crate::action::DEFAULT_MAX_WAIT_MS,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FailureManager {
    policy: LoopPolicy,
}

impl FailureManager {
    pub fn new(policy: LoopPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &LoopPolicy {
        &self.policy
    }

    /// True once the session has spent its whole retry budget.
    pub fn budget_exhausted(&self, session: &Session) -> bool {
        session.retries > self.policy.max_retries
    }

    /// A session is stuck when its retry count passed the stuck threshold,
    /// or when the recent history is one action repeated over and over.
    pub fn is_stuck(&self, session: &Session) -> bool {
        if session.retries > self.policy.stuck_threshold {
            return true;
        }

        let window = self.policy.redundancy_window + 1;
        let history = &session.action_history;
        if history.len() < window {
            return false;
        }
        let recent = &history[history.len() - window..];
        let first = &recent[0];
        recent.iter().all(|a| actions_equivalent(a, first))
    }

    /// Deterministic escalation decision: hand over to a human after the
    /// configured number of consecutive failures.
    pub fn should_escalate(&self, session: &Session) -> bool {
        session.consecutive_failures >= self.policy.escalation_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, DEFAULT_MAX_WAIT_MS};

    fn click(element: &str) -> Action {
        Action::Click {
            element: element.to_string(),
            selector_type: Default::default(),
            max_wait: DEFAULT_MAX_WAIT_MS,
            description: None,
        }
    }

    #[test]
    fn retries_past_threshold_mean_stuck() {
        let manager = FailureManager::new(LoopPolicy::default());
        let mut session = Session::new("test goal");
        session.retries = 4;
        assert!(manager.is_stuck(&session));
    }

    #[test]
    fn distinct_actions_are_not_stuck() {
        let manager = FailureManager::new(LoopPolicy::default());
        let mut session = Session::new("test goal");
        for i in 0..5 {
            session.action_history.push(click(&format!("#button-{i}")));
        }
        assert!(!manager.is_stuck(&session));
    }

    #[test]
    fn one_action_repeated_is_stuck() {
        let manager = FailureManager::new(LoopPolicy::default());
        let mut session = Session::new("test goal");
        for _ in 0..4 {
            session.action_history.push(click("#same"));
        }
        assert!(manager.is_stuck(&session));
    }

    #[test]
    fn escalation_is_deterministic() {
        let manager = FailureManager::new(LoopPolicy::default());
        let mut session = Session::new("test goal");
        session.consecutive_failures = 2;
        assert!(!manager.should_escalate(&session));
        session.consecutive_failures = 3;
        assert!(manager.should_escalate(&session));
        // Same inputs, same answer, every time.
        assert!(manager.should_escalate(&session));
    }

    #[test]
    fn budget_is_fatal_only_past_the_bound() {
        let manager = FailureManager::new(LoopPolicy::default());
        let mut session = Session::new("test goal");
        session.retries = 7;
        assert!(!manager.budget_exhausted(&session));
        session.retries = 8;
        assert!(manager.budget_exhausted(&session));
    }
}
