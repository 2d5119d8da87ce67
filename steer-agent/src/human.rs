//! The human-in-the-loop channel.

use async_trait::async_trait;

/// Single escalation surface: ask a question, await an answer. Terminal/UI
/// details live with the implementor.
#[async_trait]
pub trait HumanChannel: Send + Sync {
    async fn ask(&self, question: &str) -> anyhow::Result<String>;
}
