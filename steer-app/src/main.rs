use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use steer_agent::{LoopPolicy, Orchestrator};
use steer_browser::SteerBrowser;
use steer_common::observability::{init_logging, LogConfig};
use steer_config::SteerConfigLoader;
use steer_llm::ensure_llm_ready;

mod console;
mod store;

use console::ConsoleHuman;
use store::JsonPatternStore;

/// Drive a browser toward a natural-language goal.
#[derive(Parser, Debug)]
#[command(name = "steer", version, about)]
struct Cli {
    /// Natural-language goal for this session.
    #[arg(long, short = 'g')]
    goal: String,

    /// Path to the YAML configuration file.
    #[arg(long, default_value = "steer.yaml")]
    config: PathBuf,

    /// Page to open before planning begins (overrides the config).
    #[arg(long)]
    start_url: Option<String>,

    /// Run the browser without a visible window (overrides the config).
    #[arg(long)]
    headless: bool,

    /// Where per-domain success patterns are persisted.
    #[arg(long, default_value = "steer-patterns.json")]
    patterns: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = SteerConfigLoader::new().with_file(&cli.config).load()?;
    let log_path = init_logging(LogConfig {
        emit_stderr: true,
        ..Default::default()
    })?;
    tracing::info!(log_file = %log_path.display(), "steer starting");

    let llm = ensure_llm_ready(&cfg.llm).await?;
    tracing::info!(model = llm.model_name(), "planner ready");

    let headless = cli.headless || cfg.browser.headless;
    let driver = SteerBrowser::connect(&cfg.browser.webdriver_url, headless).await?;

    // Ctrl-C requests a cooperative stop; the loop notices it once per
    // iteration and shuts the browser down in order.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("stop requested via Ctrl-C");
                cancel.cancel();
            }
        });
    }

    let policy = LoopPolicy {
        max_retries: cfg.policy.max_retries,
        redundancy_window: cfg.policy.redundancy_window,
        stuck_threshold: cfg.policy.stuck_threshold,
        escalation_threshold: cfg.policy.escalation_threshold,
        default_max_wait_ms: cfg.policy.default_max_wait_ms,
    };

    let human = Arc::new(ConsoleHuman::new());
    let patterns = Arc::new(JsonPatternStore::open(&cli.patterns)?);
    let start_url = cli.start_url.or(cfg.browser.start_url);

    let report = Orchestrator::new(
        driver,
        llm,
        human,
        patterns,
        policy,
        cancel,
        cli.goal,
        start_url,
    )
    .run()
    .await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
