//! Terminal implementation of the human-in-the-loop channel.

use async_trait::async_trait;
use std::io::{BufRead, Write};

use steer_agent::HumanChannel;

/// Asks on stdout, reads one line from stdin. Blocking IO runs on the
/// blocking pool so the runtime stays responsive.
#[derive(Default)]
pub struct ConsoleHuman;

impl ConsoleHuman {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HumanChannel for ConsoleHuman {
    async fn ask(&self, question: &str) -> anyhow::Result<String> {
        let question = question.to_string();
        let answer = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            writeln!(out, "\n[steer] The agent needs your help:")?;
            writeln!(out, "[steer] {question}")?;
            write!(out, "[steer] Your answer: ")?;
            out.flush()?;

            let stdin = std::io::stdin();
            let mut line = String::new();
            stdin.lock().read_line(&mut line)?;
            Ok(line.trim().to_string())
        })
        .await??;
        Ok(answer)
    }
}
