//! Success-pattern memory: which actions worked where.
//!
//! Append-only per-domain records, consumed as hints by the planning
//! prompt. The storage format is owned by the implementor, not by this
//! crate; the in-memory store below backs tests and single-shot runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::action::Action;

/// One remembered success for a domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessPattern {
    pub action_type: String,
    pub element: String,
    pub success_count: u32,
    pub last_success: DateTime<Utc>,
}

#[async_trait]
pub trait PatternStore: Send + Sync {
    /// Record that `action` succeeded on `domain`.
    async fn record(&self, domain: &str, action: &Action) -> anyhow::Result<()>;

    /// All remembered patterns for `domain`, most-used first.
    async fn query(&self, domain: &str) -> anyhow::Result<Vec<SuccessPattern>>;
}

/// Process-local store; forgets everything on drop.
#[derive(Default)]
pub struct MemoryPatternStore {
    inner: RwLock<HashMap<String, Vec<SuccessPattern>>>,
}

impl MemoryPatternStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PatternStore for MemoryPatternStore {
    async fn record(&self, domain: &str, action: &Action) -> anyhow::Result<()> {
        let element = action.element().unwrap_or_default().to_string();
        if element.is_empty() {
            // Only element-targeting actions are worth remembering.
            return Ok(());
        }

        let mut inner = self.inner.write().await;
        let patterns = inner.entry(domain.to_string()).or_default();
        if let Some(existing) = patterns
            .iter_mut()
            .find(|p| p.action_type == action.kind() && p.element == element)
        {
            existing.success_count += 1;
            existing.last_success = Utc::now();
        } else {
            patterns.push(SuccessPattern {
                action_type: action.kind().to_string(),
                element,
                success_count: 1,
                last_success: Utc::now(),
            });
        }
        Ok(())
    }

    async fn query(&self, domain: &str) -> anyhow::Result<Vec<SuccessPattern>> {
        let inner = self.inner.read().await;
        let mut patterns = inner.get(domain).cloned().unwrap_or_default();
        patterns.sort_by(|a, b| b.success_count.cmp(&a.success_count));
        Ok(patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn record_and_query_round_trip() {
        let store = MemoryPatternStore::new();
        let click = Action::from_value(json!({"type": "click", "element": "#go"})).unwrap();

        store.record("example.com", &click).await.unwrap();
        store.record("example.com", &click).await.unwrap();

        let patterns = store.query("example.com").await.unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].success_count, 2);
        assert_eq!(patterns[0].element, "#go");

        assert!(store.query("other.com").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_element_actions_are_ignored() {
        let store = MemoryPatternStore::new();
        let wait = Action::from_value(json!({"type": "wait"})).unwrap();
        store.record("example.com", &wait).await.unwrap();
        assert!(store.query("example.com").await.unwrap().is_empty());
    }
}
