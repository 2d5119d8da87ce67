//! End-to-end tests of the orchestrator over a scripted browser and LLM.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use steer_agent::driver::{Locator, PageDriver, PageSnapshot};
use steer_agent::{
    HumanChannel, LoopPolicy, MemoryPatternStore, Orchestrator, PatternStore, SessionReport,
};
use steer_llm::traits::{LlmClient, LlmResponse};

// ---------- scripted collaborators ----------

#[derive(Default)]
struct MockState {
    url: String,
    titles: HashMap<String, String>,
    resolvable: HashSet<String>,
    click_effects: HashMap<String, String>,
    values: HashMap<String, String>,
    tags: HashMap<String, String>,
    clicks: Vec<String>,
    fills: Vec<(String, String)>,
    enters: Vec<String>,
    navigations: Vec<String>,
    closed: bool,
}

/// Browser double: handles are the locator strings that resolved.
#[derive(Clone, Default)]
struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    fn new(start_url: &str) -> Self {
        let driver = Self::default();
        driver.state.lock().unwrap().url = start_url.to_string();
        driver
    }

    fn resolvable(self, selector: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .resolvable
            .insert(selector.to_string());
        self
    }

    fn click_navigates(self, selector: &str, url: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .click_effects
            .insert(selector.to_string(), url.to_string());
        self
    }

    fn with_title(self, url: &str, title: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .titles
            .insert(url.to_string(), title.to_string());
        self
    }
}

#[async_trait]
impl PageDriver for MockDriver {
    type Handle = String;

    async fn navigate(&self, url: &str) -> anyhow::Result<()> {
        let mut s = self.state.lock().unwrap();
        s.url = url.to_string();
        s.navigations.push(url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> anyhow::Result<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn title(&self) -> anyhow::Result<String> {
        let s = self.state.lock().unwrap();
        Ok(s.titles.get(&s.url).cloned().unwrap_or_default())
    }

    async fn query(
        &self,
        locator: &Locator,
        _timeout: Duration,
    ) -> anyhow::Result<Option<String>> {
        let key = locator.describe();
        let s = self.state.lock().unwrap();
        Ok(s.resolvable.contains(&key).then_some(key))
    }

    async fn query_all(&self, locator: &Locator) -> anyhow::Result<Vec<String>> {
        self.query(locator, Duration::ZERO)
            .await
            .map(|o| o.into_iter().collect())
    }

    async fn click(&self, handle: &String) -> anyhow::Result<()> {
        let mut s = self.state.lock().unwrap();
        s.clicks.push(handle.clone());
        if let Some(target) = s.click_effects.get(handle).cloned() {
            s.url = target;
        }
        Ok(())
    }

    async fn fill(&self, handle: &String, text: &str) -> anyhow::Result<()> {
        let mut s = self.state.lock().unwrap();
        s.fills.push((handle.clone(), text.to_string()));
        s.values.insert(handle.clone(), text.to_string());
        Ok(())
    }

    async fn press_enter(&self, handle: &String) -> anyhow::Result<()> {
        self.state.lock().unwrap().enters.push(handle.clone());
        Ok(())
    }

    async fn set_form_value(&self, handle: &String, value: &str) -> anyhow::Result<()> {
        self.state
            .lock()
            .unwrap()
            .values
            .insert(handle.clone(), value.to_string());
        Ok(())
    }

    async fn read_value(&self, handle: &String) -> anyhow::Result<String> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .values
            .get(handle)
            .cloned()
            .unwrap_or_default())
    }

    async fn is_displayed(&self, _handle: &String) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn is_enabled(&self, _handle: &String) -> anyhow::Result<bool> {
        Ok(true)
    }

    async fn tag_name(&self, handle: &String) -> anyhow::Result<String> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .tags
            .get(handle)
            .cloned()
            .unwrap_or_else(|| "input".to_string()))
    }

    async fn attr(&self, _handle: &String, _name: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    async fn scroll_by(&self, _dy: i64) -> anyhow::Result<()> {
        Ok(())
    }

    async fn screenshot(&self) -> anyhow::Result<Vec<u8>> {
        Ok(Vec::new())
    }

    async fn evaluate(&self, _script: &str) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn snapshot(&self) -> anyhow::Result<PageSnapshot> {
        let s = self.state.lock().unwrap();
        Ok(PageSnapshot {
            url: s.url.clone(),
            title: s.titles.get(&s.url).cloned().unwrap_or_default(),
            ..Default::default()
        })
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Planner double: hands out scripted replies, then cancels the session.
struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    cancel: CancellationToken,
}

impl ScriptedLlm {
    fn new<I: IntoIterator<Item = &'static str>>(replies: I, cancel: CancellationToken) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(str::to_string).collect()),
            cancel,
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(
        &self,
        _prompt: &str,
        _system_prompt: Option<&str>,
        _max_tokens: Option<u32>,
        _temperature: Option<f32>,
    ) -> steer_common::Result<LlmResponse> {
        let next = self.replies.lock().unwrap().pop_front();
        let text = match next {
            Some(text) => text,
            None => {
                // Script exhausted: request a cooperative stop.
                self.cancel.cancel();
                String::new()
            }
        };
        Ok(LlmResponse {
            text,
            model: Some("scripted".into()),
            tokens_used: None,
        })
    }

    async fn health_check(&self) -> steer_common::Result<bool> {
        Ok(true)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
struct RecordingHuman {
    questions: Mutex<Vec<String>>,
    answer: String,
}

impl RecordingHuman {
    fn answering(answer: &str) -> Self {
        Self {
            questions: Mutex::new(Vec::new()),
            answer: answer.to_string(),
        }
    }
}

#[async_trait]
impl HumanChannel for RecordingHuman {
    async fn ask(&self, question: &str) -> anyhow::Result<String> {
        self.questions.lock().unwrap().push(question.to_string());
        Ok(self.answer.clone())
    }
}

// ---------- harness ----------

struct Harness {
    driver: MockDriver,
    human: Arc<RecordingHuman>,
    patterns: Arc<MemoryPatternStore>,
    cancel: CancellationToken,
}

impl Harness {
    fn run_scripted(
        driver: MockDriver,
        goal: &str,
        replies: Vec<&'static str>,
    ) -> (Self, impl std::future::Future<Output = SessionReport>) {
        let cancel = CancellationToken::new();
        let llm = Arc::new(ScriptedLlm::new(replies, cancel.clone()));
        let human = Arc::new(RecordingHuman::answering("keep going"));
        let patterns = Arc::new(MemoryPatternStore::new());

        let orchestrator = Orchestrator::new(
            driver.clone(),
            llm,
            human.clone(),
            patterns.clone(),
            LoopPolicy::default(),
            cancel.clone(),
            goal,
            None,
        );

        let harness = Harness {
            driver,
            human,
            patterns,
            cancel,
        };
        (harness, orchestrator.run())
    }
}

// ---------- tests ----------

#[tokio::test(start_paused = true)]
async fn scripted_login_run_executes_and_tracks_milestones() {
    let driver = MockDriver::new("about:blank")
        .with_title("https://example.com/login", "Sign in")
        .with_title("https://example.com/home", "Home")
        .resolvable("css:#username")
        .resolvable("css:#submit")
        .click_navigates("css:#submit", "https://example.com/home");

    let (harness, run) = Harness::run_scripted(
        driver,
        "login to my account",
        vec![
            r#"{"type": "navigate", "value": "https://example.com/login"}"#,
            r##"{"type": "input", "element": "#username", "value": "ferris"}"##,
            r##"{"type": "click", "element": "#submit"}"##,
        ],
    );
    let report = run.await;

    let state = harness.driver.state.lock().unwrap();
    assert_eq!(state.navigations, vec!["https://example.com/login"]);
    assert_eq!(
        state.fills,
        vec![("css:#username".to_string(), "ferris".to_string())]
    );
    assert_eq!(state.clicks, vec!["css:#submit"]);
    assert!(state.closed, "terminate must release the browser");
    drop(state);

    assert_eq!(report.success_count, 3);
    assert_eq!(report.retries, 0);
    assert!(report
        .history
        .iter()
        .any(|line| line.contains("Milestone achieved") && line.contains("reach_login_page")));

    // reach_login_page, enter_credentials, submit_login out of 4.
    assert_eq!(report.progress_percent, 75.0);

    // Successful element actions were remembered for the domain.
    let remembered = harness.patterns.query("example.com").await.unwrap();
    assert!(remembered.iter().any(|p| p.element == "#submit"));
    assert!(harness.human.questions.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn repeated_clicks_are_replaced_by_waits() {
    // The click resolves but has no effect, so every attempt fails
    // verification; the guard must start substituting waits instead of
    // letting the loop spin.
    let driver = MockDriver::new("https://example.com/app").resolvable("css:#noop");

    let (harness, run) = Harness::run_scripted(
        driver,
        "press the noop button",
        vec![
            r##"{"type": "click", "element": "#noop"}"##,
            r##"{"type": "click", "element": "#noop"}"##,
            r##"{"type": "click", "element": "#noop"}"##,
            r##"{"type": "click", "element": "#noop"}"##,
        ],
    );
    let report = run.await;

    assert!(
        report.history.iter().any(|l| l.contains("Loop detected")),
        "guard should have flagged the repetition: {:#?}",
        report.history
    );
    // The substituted wait is in the typed history via its execution log.
    assert!(report.history.iter().any(|l| l.contains("wait")));
    assert!(harness.human.questions.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn redundant_waits_escalate_to_the_human() {
    let driver = MockDriver::new("https://example.com/app");

    let (harness, run) = Harness::run_scripted(
        driver,
        "observe the page",
        vec![
            r#"{"type": "wait"}"#,
            r#"{"type": "wait"}"#,
            r#"{"type": "wait"}"#,
        ],
    );
    let _report = run.await;

    let questions = harness.human.questions.lock().unwrap();
    assert_eq!(
        questions.len(),
        1,
        "the third wait must escalate instead of waiting again"
    );
}

#[tokio::test(start_paused = true)]
async fn unusable_replies_exhaust_the_budget_and_terminate() {
    let driver = MockDriver::new("https://example.com/app");

    // Twenty garbage replies: more than the retry budget will ever consume.
    let (harness, run) = Harness::run_scripted(
        driver,
        "do the impossible",
        vec!["I would rather write a poem about browsers."; 20],
    );
    let report = run.await;

    assert_eq!(report.retries, 8, "budget bound is MAX_RETRIES + 1 failures");
    assert!(report
        .history
        .iter()
        .any(|l| l.contains("Retry budget exhausted")));
    assert!(harness.driver.state.lock().unwrap().closed);
    // Sustained failure escalated to the operator along the way.
    assert!(!harness.human.questions.lock().unwrap().is_empty());
    // The loop stopped on its own; the cancel token was never needed.
    assert!(!harness.cancel.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn cancellation_forces_orderly_termination() {
    let driver = MockDriver::new("https://example.com/app");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let llm = Arc::new(ScriptedLlm::new(
        [r#"{"type": "wait"}"#],
        CancellationToken::new(),
    ));
    let human = Arc::new(RecordingHuman::answering("n/a"));
    let patterns = Arc::new(MemoryPatternStore::new());

    let report = Orchestrator::new(
        driver.clone(),
        llm,
        human,
        patterns,
        LoopPolicy::default(),
        cancel,
        "anything",
        None,
    )
    .run()
    .await;

    assert!(report.history.iter().any(|l| l.contains("Stop requested")));
    assert_eq!(report.success_count, 0, "no handler ran after cancellation");
    assert!(harness_closed(&driver));
}

fn harness_closed(driver: &MockDriver) -> bool {
    driver.state.lock().unwrap().closed
}

#[tokio::test(start_paused = true)]
async fn fallback_selectors_rescue_a_wrong_direct_selector() {
    // Only the loosened id-contains selector exists on the page.
    let driver = MockDriver::new("https://example.com/app")
        .resolvable("css:[id*='login-button']")
        .click_navigates("css:[id*='login-button']", "https://example.com/dash");

    let (harness, run) = Harness::run_scripted(
        driver,
        "open the dashboard",
        vec![r##"{"type": "click", "element": "#login-button"}"##],
    );
    let report = run.await;

    let state = harness.driver.state.lock().unwrap();
    assert_eq!(state.clicks, vec!["css:[id*='login-button']"]);
    drop(state);
    assert_eq!(report.success_count, 1);
}
