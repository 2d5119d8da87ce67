//! The state-machine orchestrator.
//!
//! One closed enum of states, one handler per state, exactly one handler
//! executing per iteration, strictly sequentially. Any handler error lands
//! in `HandleFailure` — the sole error boundary of the loop — and only an
//! exhausted retry budget is fatal. Cancellation is cooperative: the token
//! is polled once per iteration and forces the next transition to
//! `Terminate`, which releases the browser.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use steer_llm::traits::LlmClient;

use crate::action::{Action, NoteOperation, ScrollDirection, DEFAULT_MAX_WAIT_MS};
use crate::driver::{Locator, PageDriver};
use crate::extract::extract;
use crate::failure::{AgentError, AgentResult, FailureManager, LoopPolicy};
use crate::guard::{GuardVerdict, RedundancyGuard};
use crate::human::HumanChannel;
use crate::patterns::PatternStore;
use crate::progress::{detect_deltas, recognize_next};
use crate::prompt::{build_turn_prompt, SYSTEM_PROMPT};
use crate::resolve::{ElementResolver, Resolution};
use crate::session::Session;

/// Post-action settle delay before verification reads.
const SETTLE_DELAY: Duration = Duration::from_millis(250);
/// Scroll step in pixels for one scroll action.
const SCROLL_STEP: i64 = 600;

/// Closed set of orchestrator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Start,
    SetupBrowser,
    GetPageState,
    ChooseAction,
    Click,
    Input,
    Navigate,
    Wait,
    Scroll,
    Notes,
    SendHumanMessage,
    HandleFailure,
    Terminate,
    Terminated,
}

impl State {
    /// The execution state an action dispatches to.
    fn for_action(action: &Action) -> State {
        match action {
            Action::Click { .. } => State::Click,
            Action::Input { .. } => State::Input,
            Action::Navigate { .. } => State::Navigate,
            Action::Wait { .. } => State::Wait,
            Action::Scroll { .. } => State::Scroll,
            Action::Notes { .. } => State::Notes,
            Action::SendHumanMessage { .. } => State::SendHumanMessage,
        }
    }
}

/// Outcome summary handed back to the caller when the loop terminates.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub goal: String,
    pub retries: u32,
    pub success_count: u32,
    pub progress_percent: f64,
    pub milestones: Vec<(String, bool)>,
    pub history: Vec<String>,
}

impl SessionReport {
    fn from_session(session: &Session) -> Self {
        Self {
            session_id: session.id.to_string(),
            goal: session.goal.clone(),
            retries: session.retries,
            success_count: session.success_count,
            progress_percent: session.progress_percent(),
            milestones: session
                .milestones
                .iter()
                .map(|m| (m.name.clone(), m.recognized))
                .collect(),
            history: session.history.clone(),
        }
    }
}

/// The agent loop: observe → plan → act → verify → repeat.
pub struct Orchestrator<P: PageDriver> {
    driver: P,
    llm: Arc<dyn LlmClient + Send + Sync>,
    human: Arc<dyn HumanChannel>,
    patterns: Arc<dyn PatternStore>,
    guard: RedundancyGuard,
    resolver: ElementResolver,
    failures: FailureManager,
    cancel: CancellationToken,
    start_url: Option<String>,
    session: Session,
}

impl<P: PageDriver> Orchestrator<P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        driver: P,
        llm: Arc<dyn LlmClient + Send + Sync>,
        human: Arc<dyn HumanChannel>,
        patterns: Arc<dyn PatternStore>,
        policy: LoopPolicy,
        cancel: CancellationToken,
        goal: impl Into<String>,
        start_url: Option<String>,
    ) -> Self {
        Self {
            driver,
            llm,
            human,
            patterns,
            guard: RedundancyGuard::new(policy.redundancy_window),
            resolver: ElementResolver::new(),
            failures: FailureManager::new(policy),
            cancel,
            start_url,
            session: Session::new(goal),
        }
    }

    /// Run the loop to termination and return the session report.
    pub async fn run(mut self) -> SessionReport {
        let mut state = State::Start;
        while state != State::Terminated {
            if self.cancel.is_cancelled()
                && !matches!(state, State::Terminate | State::Terminated)
            {
                self.session.log("Stop requested; terminating.");
                state = State::Terminate;
            }
            state = self.step(state).await;
        }
        tracing::info!(
            target: "agent.loop",
            session = %self.session.id,
            progress = self.session.progress_percent(),
            retries = self.session.retries,
            "session finished"
        );
        SessionReport::from_session(&self.session)
    }

    /// Execute exactly one state handler. Errors never propagate past here;
    /// they route to `HandleFailure`.
    async fn step(&mut self, state: State) -> State {
        tracing::debug!(target: "agent.loop", state = ?state, "entering state");

        let result: AgentResult<State> = match state {
            State::Start => {
                self.session.log(format!("Session started. Goal: {}", self.session.goal));
                Ok(State::SetupBrowser)
            }
            State::SetupBrowser => self.setup_browser().await,
            State::GetPageState => self.get_page_state().await,
            State::ChooseAction => self.choose_action().await,
            State::Click => self.exec_click().await,
            State::Input => self.exec_input().await,
            State::Navigate => self.exec_navigate().await,
            State::Wait => self.exec_wait().await,
            State::Scroll => self.exec_scroll().await,
            State::Notes => self.exec_notes(),
            State::SendHumanMessage => self.exec_send_human_message().await,
            State::HandleFailure => Ok(self.handle_failure()),
            State::Terminate => {
                if let Err(e) = self.driver.close().await {
                    tracing::warn!(target: "agent.loop", error = %e, "browser close failed");
                }
                Ok(State::Terminated)
            }
            State::Terminated => Ok(State::Terminated),
        };

        match result {
            Ok(next) => next,
            Err(e) => {
                if state == State::Terminate {
                    // Nothing left to recover; shut down regardless.
                    return State::Terminated;
                }
                self.session.mark_failure();
                let line = format!("Failure in {state:?}: {e}");
                tracing::warn!(target: "agent.loop", "{line}");
                self.session.log(line.clone());
                self.session.push_feedback(line);
                State::HandleFailure
            }
        }
    }

    async fn setup_browser(&mut self) -> AgentResult<State> {
        if let Some(url) = self.start_url.clone() {
            self.driver.navigate(&url).await?;
            self.session.log(format!("Opened start page {url}"));
        }
        Ok(State::ChooseAction)
    }

    /// Post-action observation checkpoint: let the page settle and confirm
    /// the browser is still responsive.
    async fn get_page_state(&mut self) -> AgentResult<State> {
        tokio::time::sleep(SETTLE_DELAY).await;
        let _ = self.driver.current_url().await?;
        Ok(State::ChooseAction)
    }

    /// Snapshot → progress → prompt → extract → guard → dispatch.
    async fn choose_action(&mut self) -> AgentResult<State> {
        let snapshot = self.driver.snapshot().await?;

        if let Some(feedback) = recognize_next(
            &mut self.session.milestones,
            &snapshot,
            self.session.action_history.last(),
        ) {
            self.session.log(feedback.clone());
            self.session.push_feedback(feedback);
        }

        if let Some(previous) = &self.session.previous_snapshot {
            for delta in detect_deltas(previous, &snapshot) {
                self.session.push_feedback(delta);
            }
        }
        self.session.previous_snapshot = Some(snapshot.clone());

        if self.failures.is_stuck(&self.session) {
            self.session.push_feedback(
                "You appear to be stuck: recent attempts did not advance the goal. \
                 Change strategy.",
            );
        }

        let domain = domain_of(&snapshot.url);
        let known_patterns = self.patterns.query(&domain).await.unwrap_or_default();

        let prompt = build_turn_prompt(&mut self.session, &snapshot, &known_patterns);
        let reply = self
            .llm
            .generate(&prompt, Some(SYSTEM_PROMPT), Some(400), Some(0.2))
            .await
            .map_err(|e| AgentError::Execution(format!("planner request failed: {e}")))?;

        let action = extract(&reply.text).ok_or_else(|| {
            AgentError::Extraction(format!(
                "model reply did not contain a valid action: {}",
                crate::util::truncate_chars(&reply.text, 160)
            ))
        })?;

        let action = match self.guard.check(&action, &self.session.action_history) {
            GuardVerdict::Pass => action,
            GuardVerdict::Substitute { action, feedback } => {
                self.session.log(format!("Loop detected: {feedback}"));
                self.session.push_feedback(feedback);
                action
            }
        };

        self.session.record_action(&action);
        Ok(State::for_action(&action))
    }

    async fn exec_click(&mut self) -> AgentResult<State> {
        let action = self.current_action()?;
        let Action::Click { element, .. } = action.clone() else {
            return Err(AgentError::Execution("state expected a click action".into()));
        };

        let url_before = self.driver.current_url().await.unwrap_or_default();
        let (resolution, ctx) = self.resolver.resolve(&self.driver, &action).await;

        match resolution {
            Some(Resolution::NavigateTo(href)) => {
                // Anchor with an href: navigation is more reliable than a
                // click that may be intercepted.
                let target = absolutize(&url_before, &href);
                self.driver.navigate(&target).await?;
                self.session
                    .log(format!("Followed link {element} via {target}"));
            }
            Some(Resolution::Element(handle)) => {
                let displayed_before = self.driver.is_displayed(&handle).await.unwrap_or(true);
                let enabled_before = self.driver.is_enabled(&handle).await.unwrap_or(true);

                self.driver.click(&handle).await?;
                let verified = self
                    .verify_click(&handle, &url_before, displayed_before, enabled_before)
                    .await;
                if !verified {
                    // One bounded retry, then give up on this strategy.
                    self.driver.click(&handle).await?;
                    if !self
                        .verify_click(&handle, &url_before, displayed_before, enabled_before)
                        .await
                    {
                        return Err(AgentError::Execution(format!(
                            "click on {element} had no observable effect"
                        )));
                    }
                }
            }
            None => {
                // Universal submit alias: a submit-ish target that cannot be
                // found is replaced by pressing Enter in a visible input.
                if is_submit_label(&element) {
                    if let Some(input) = self
                        .driver
                        .query(&Locator::Css("input".into()), SETTLE_DELAY)
                        .await?
                    {
                        self.driver.press_enter(&input).await?;
                        self.session
                            .log(format!("Pressed Enter as a stand-in for {element}"));
                        self.finish_action(&action).await;
                        return Ok(State::GetPageState);
                    }
                }
                let feedback = self.resolver.failure_feedback(&ctx, &element);
                self.session.push_feedback(feedback.clone());
                return Err(AgentError::Resolution(feedback));
            }
        }

        self.finish_action(&action).await;
        Ok(State::GetPageState)
    }

    /// A click verifies through a URL delta, an element-state transition, or
    /// the element going stale (all signs the page reacted).
    async fn verify_click(
        &self,
        handle: &P::Handle,
        url_before: &str,
        displayed_before: bool,
        enabled_before: bool,
    ) -> bool {
        tokio::time::sleep(SETTLE_DELAY).await;

        let url_after = self.driver.current_url().await.unwrap_or_default();
        if !url_after.is_empty() && url_after != url_before {
            return true;
        }

        match self.driver.is_displayed(handle).await {
            Ok(displayed) if displayed != displayed_before => true,
            Err(_) => true, // stale handle: the DOM moved on
            Ok(_) => match self.driver.is_enabled(handle).await {
                Ok(enabled) => enabled != enabled_before,
                Err(_) => true,
            },
        }
    }

    async fn exec_input(&mut self) -> AgentResult<State> {
        let action = self.current_action()?;
        let Action::Input { element, value, .. } = action.clone() else {
            return Err(AgentError::Execution("state expected an input action".into()));
        };

        let url_before = self.driver.current_url().await.unwrap_or_default();
        let (resolution, ctx) = self.resolver.resolve(&self.driver, &action).await;
        let handle = match resolution {
            Some(Resolution::Element(handle)) => handle,
            Some(Resolution::NavigateTo(_)) => {
                return Err(AgentError::Execution(
                    "input target resolved to a link".into(),
                ));
            }
            None => {
                let feedback = self.resolver.failure_feedback(&ctx, &element);
                self.session.push_feedback(feedback.clone());
                return Err(AgentError::Resolution(feedback));
            }
        };

        let tag = self
            .driver
            .tag_name(&handle)
            .await
            .unwrap_or_default()
            .to_lowercase();
        let input_kind = self
            .driver
            .attr(&handle, "type")
            .await
            .ok()
            .flatten()
            .unwrap_or_default()
            .to_lowercase();

        // Synthetic form controls get their state set directly plus a
        // change event; native keystrokes are unreliable there.
        let synthetic = tag == "select" || input_kind == "radio" || input_kind == "checkbox";

        // A trailing newline means "submit after typing".
        let (text, submit) = match value.strip_suffix('\n') {
            Some(stripped) => (stripped.to_string(), true),
            None => (value.clone(), false),
        };

        if synthetic {
            self.driver.set_form_value(&handle, &text).await?;
        } else {
            self.driver.fill(&handle, &text).await?;
        }

        // Value read-back with one bounded retry.
        let mut verified = self.verify_value(&handle, &text).await;
        if !verified && !synthetic {
            self.driver.fill(&handle, &text).await?;
            verified = self.verify_value(&handle, &text).await;
        }
        if !verified {
            let url_after = self.driver.current_url().await.unwrap_or_default();
            if url_after == url_before {
                return Err(AgentError::Execution(format!(
                    "value read-back mismatch for {element}"
                )));
            }
            // URL changed underneath us: the input triggered navigation,
            // which counts as success.
        }

        if submit {
            self.driver.press_enter(&handle).await?;
        }

        self.finish_action(&action).await;
        Ok(State::GetPageState)
    }

    async fn verify_value(&self, handle: &P::Handle, expected: &str) -> bool {
        match self.driver.read_value(handle).await {
            Ok(read) => read == expected || read.contains(expected),
            Err(_) => false,
        }
    }

    async fn exec_navigate(&mut self) -> AgentResult<State> {
        let action = self.current_action()?;
        let Action::Navigate { value, .. } = action.clone() else {
            return Err(AgentError::Execution(
                "state expected a navigate action".into(),
            ));
        };

        let target = normalize_url(&value)
            .ok_or_else(|| AgentError::Execution(format!("unusable URL: {value}")))?;
        let url_before = self.driver.current_url().await.unwrap_or_default();

        self.driver.navigate(&target).await?;
        tokio::time::sleep(SETTLE_DELAY).await;

        let url_after = self.driver.current_url().await?;
        let arrived = url_after != url_before || same_host(&url_after, &target);
        if !arrived {
            // One bounded retry.
            self.driver.navigate(&target).await?;
            tokio::time::sleep(SETTLE_DELAY).await;
            let url_after = self.driver.current_url().await?;
            if url_after == url_before && !same_host(&url_after, &target) {
                return Err(AgentError::Execution(format!(
                    "navigation to {target} did not take effect"
                )));
            }
        }

        self.finish_action(&action).await;
        Ok(State::GetPageState)
    }

    async fn exec_wait(&mut self) -> AgentResult<State> {
        let action = self.current_action()?;
        tokio::time::sleep(action.max_wait()).await;
        self.finish_action(&action).await;
        Ok(State::GetPageState)
    }

    async fn exec_scroll(&mut self) -> AgentResult<State> {
        let action = self.current_action()?;
        let Action::Scroll { direction, .. } = &action else {
            return Err(AgentError::Execution("state expected a scroll action".into()));
        };
        let dy = match *direction {
            ScrollDirection::Down => SCROLL_STEP,
            ScrollDirection::Up => -SCROLL_STEP,
        };
        self.driver.scroll_by(dy).await?;
        self.finish_action(&action).await;
        Ok(State::GetPageState)
    }

    fn exec_notes(&mut self) -> AgentResult<State> {
        let action = self.current_action()?;
        let Action::Notes {
            operation, note, ..
        } = action.clone()
        else {
            return Err(AgentError::Execution("state expected a notes action".into()));
        };

        match operation {
            NoteOperation::Add => {
                if let Some(note) = note.filter(|n| !n.trim().is_empty()) {
                    self.session.log(format!("Noted: {note}"));
                    self.session.notes.push(note);
                }
            }
            NoteOperation::Read => {
                let text = if self.session.notes.is_empty() {
                    "No notes recorded yet.".to_string()
                } else {
                    format!("Notes so far: {}", self.session.notes.join("; "))
                };
                self.session.push_feedback(text);
            }
        }

        self.session.mark_success();
        // Notes never touch the page; go straight back to planning.
        Ok(State::ChooseAction)
    }

    async fn exec_send_human_message(&mut self) -> AgentResult<State> {
        let action = self.current_action()?;
        let Action::SendHumanMessage { question, .. } = action.clone() else {
            return Err(AgentError::Execution(
                "state expected a sendHumanMessage action".into(),
            ));
        };

        self.session.log(format!("Asked human: {question}"));
        let answer = self
            .human
            .ask(&question)
            .await
            .map_err(|e| AgentError::Execution(format!("human channel failed: {e}")))?;

        self.session.log(format!("Human answered: {answer}"));
        self.session
            .push_feedback(format!("The human operator answered: {answer}"));
        // A human answer resets the failure streak, but never the retry
        // budget: the budget is the hard bound that guarantees termination.
        self.session.mark_success();
        Ok(State::ChooseAction)
    }

    /// Central failure bookkeeping: bounded retries, deterministic
    /// escalation, otherwise back to planning.
    fn handle_failure(&mut self) -> State {
        self.session.retries += 1;

        if self.failures.budget_exhausted(&self.session) {
            let line = format!(
                "Retry budget exhausted ({} retries); terminating session.",
                self.session.retries
            );
            tracing::error!(target: "agent.loop", "{line}");
            self.session.log(line);
            return State::Terminate;
        }

        if self.failures.should_escalate(&self.session) {
            self.session
                .log("Sustained failures; escalating to the human operator.");
            let question = format!(
                "I have failed {} times in a row while working on \"{}\". The last \
                 problem was: {}. How should I proceed?",
                self.session.consecutive_failures,
                self.session.goal,
                self.session.history.last().cloned().unwrap_or_default()
            );
            let escalation = Action::SendHumanMessage {
                question,
                max_wait: DEFAULT_MAX_WAIT_MS,
                description: Some("failure escalation".into()),
            };
            self.session.record_action(&escalation);
            return State::SendHumanMessage;
        }

        State::ChooseAction
    }

    /// Success bookkeeping shared by the execution handlers.
    async fn finish_action(&mut self, action: &Action) {
        self.session.mark_success();
        self.session
            .log(format!("Completed: {}", action.describe()));

        if action.element().is_some() {
            let domain = self
                .driver
                .current_url()
                .await
                .ok()
                .map(|u| domain_of(&u))
                .unwrap_or_else(|| "unknown".to_string());
            if let Err(e) = self.patterns.record(&domain, action).await {
                tracing::debug!(target: "agent.loop", error = %e, "pattern record failed");
            }
        }
    }

    fn current_action(&self) -> AgentResult<Action> {
        self.session
            .current_action
            .clone()
            .ok_or_else(|| AgentError::Execution("no action staged for execution".into()))
    }
}

fn domain_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Accept bare hostnames from the planner but reject unusable values.
fn normalize_url(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if value.starts_with("http://") || value.starts_with("https://") {
        return Url::parse(value).ok().map(|u| u.to_string());
    }
    Url::parse(&format!("https://{value}"))
        .ok()
        .map(|u| u.to_string())
}

fn same_host(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => a.host_str().is_some() && a.host_str() == b.host_str(),
        _ => false,
    }
}

/// Resolve a possibly-relative href against the current page URL.
fn absolutize(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    Url::parse(base)
        .ok()
        .and_then(|b| b.join(href).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| href.to_string())
}

fn is_submit_label(element: &str) -> bool {
    let lower = element.to_lowercase();
    ["submit", "search", "enter", "go"]
        .iter()
        .any(|kw| lower.contains(kw))
}
