//! File-backed success-pattern store.
//!
//! One pretty-printed JSON file holds every domain's patterns; it is read
//! once at startup and rewritten after each recorded success. The file is
//! small and append-mostly, so whole-file rewrites are fine.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use steer_agent::{Action, PatternStore, SuccessPattern};

pub struct JsonPatternStore {
    path: PathBuf,
    inner: Mutex<HashMap<String, Vec<SuccessPattern>>>,
}

impl JsonPatternStore {
    /// Load an existing store, or start empty if the file is missing or
    /// unreadable (a corrupt pattern file must never block a session).
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(
                    target: "app.patterns",
                    file = %path.display(),
                    error = %e,
                    "pattern file unreadable; starting empty"
                );
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        Ok(Self {
            path,
            inner: Mutex::new(inner),
        })
    }

    fn persist(&self, snapshot: &HashMap<String, Vec<SuccessPattern>>) {
        match serde_json::to_string_pretty(snapshot) {
            Ok(serialized) => {
                if let Err(e) = std::fs::write(&self.path, serialized) {
                    tracing::warn!(
                        target: "app.patterns",
                        file = %self.path.display(),
                        error = %e,
                        "failed to persist patterns"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(target: "app.patterns", error = %e, "failed to serialize patterns");
            }
        }
    }
}

#[async_trait]
impl PatternStore for JsonPatternStore {
    async fn record(&self, domain: &str, action: &Action) -> anyhow::Result<()> {
        let element = match action.element() {
            Some(e) => e.to_string(),
            None => return Ok(()),
        };

        let snapshot = {
            let mut inner = self.inner.lock().expect("pattern store lock");
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
            inner.clone()
        };

        self.persist(&snapshot);
        Ok(())
    }

    async fn query(&self, domain: &str) -> anyhow::Result<Vec<SuccessPattern>> {
        let inner = self.inner.lock().expect("pattern store lock");
        let mut patterns = inner.get(domain).cloned().unwrap_or_default();
        patterns.sort_by(|a, b| b.success_count.cmp(&a.success_count));
        Ok(patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn click(element: &str) -> Action {
        Action::from_value(json!({"type": "click", "element": element})).unwrap()
    }

    #[tokio::test]
    async fn records_survive_a_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("patterns.json");

        let store = JsonPatternStore::open(&path).unwrap();
        store.record("example.com", &click("#go")).await.unwrap();
        store.record("example.com", &click("#go")).await.unwrap();
        drop(store);

        let reopened = JsonPatternStore::open(&path).unwrap();
        let patterns = reopened.query("example.com").await.unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].success_count, 2);
    }

    #[tokio::test]
    async fn corrupt_files_start_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("patterns.json");
        std::fs::write(&path, "not json at all").unwrap();

        let store = JsonPatternStore::open(&path).unwrap();
        assert!(store.query("example.com").await.unwrap().is_empty());
    }
}
