//! The Steer agent control loop.
//!
//! This crate is the core of the system: it turns an unreliable text
//! generator into something safe to drive a browser with. It owns the
//! state-machine orchestrator, the multi-strategy text-to-action extractor,
//! the multi-strategy DOM element resolver, and the redundancy / failure /
//! escalation policy. Browser control, LLM transport, human prompting, and
//! pattern persistence are all consumed through traits.
//!
//! - [`action::Action`]: the closed set of browser instructions
//! - [`extract::extract`]: tolerant free-text → [`action::Action`] pipeline
//! - [`resolve::ElementResolver`]: ordered selector fallback chain
//! - [`guard::RedundancyGuard`]: loop detection and escape actions
//! - [`progress`]: milestone classification and page-delta feedback
//! - [`machine::Orchestrator`]: the sequential observe→plan→act→verify loop
pub mod action;
pub mod driver;
pub mod extract;
pub mod failure;
pub mod guard;
pub mod human;
pub mod machine;
pub mod patterns;
pub mod progress;
pub mod prompt;
pub mod resolve;
pub mod session;
pub mod strategy;
pub mod util;

pub use action::{Action, NoteOperation, ScrollDirection, SelectorType};
pub use driver::{ElementSummary, Locator, PageDriver, PageSnapshot};
pub use failure::{AgentError, AgentResult, FailureManager, LoopPolicy};
pub use guard::RedundancyGuard;
pub use human::HumanChannel;
pub use machine::{Orchestrator, SessionReport, State};
pub use patterns::{MemoryPatternStore, PatternStore, SuccessPattern};
pub use session::Session;
