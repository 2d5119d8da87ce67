//! Loader for workspace configuration with YAML + environment overlays.
//!
//! `steer.yaml` holds the LLM provider, browser endpoint, and loop-policy
//! knobs; any value can be overridden with `STEER_`-prefixed environment
//! variables, and `${VAR}` placeholders inside string values are expanded
//! recursively before the typed config is materialised.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

use steer_common::LlmConfig;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

#[derive(Debug, Deserialize)]
pub struct SteerConfig {
    pub version: Option<String>,
    pub llm: LlmConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Where and how the WebDriver session is established.
#[derive(Debug, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default)]
    pub headless: bool,
    /// Page loaded by the `setupBrowser` state before planning begins.
    #[serde(default)]
    pub start_url: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            headless: false,
            start_url: None,
        }
    }
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".into()
}

/// Tunable bounds for the agent loop.
///
/// Every knob here is a safety bound: the loop must terminate, never spin,
/// and escalate to a human under sustained failure.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Fatal retry budget for one session.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// How many recent actions the redundancy guard inspects.
    #[serde(default = "default_redundancy_window")]
    pub redundancy_window: usize,
    /// Retry count beyond which the session counts as stuck.
    #[serde(default = "default_stuck_threshold")]
    pub stuck_threshold: u32,
    /// Consecutive failures before the failure handler asks a human.
    #[serde(default = "default_escalation_threshold")]
    pub escalation_threshold: u32,
    /// Default per-action wait bound in milliseconds.
    #[serde(default = "default_max_wait_ms")]
    pub default_max_wait_ms: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            redundancy_window: default_redundancy_window(),
            stuck_threshold: default_stuck_threshold(),
            escalation_threshold: default_escalation_threshold(),
            default_max_wait_ms: default_max_wait_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    7
}
fn default_redundancy_window() -> usize {
    3
}
fn default_stuck_threshold() -> u32 {
    3
}
fn default_escalation_threshold() -> u32 {
    3
}
fn default_max_wait_ms() -> u64 {
    3000
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct SteerConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for SteerConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SteerConfigLoader {
    /// Start with sensible defaults: YAML file + `STEER_` env overrides.
    ///
    /// ```
    /// use steer_config::SteerConfigLoader;
    ///
    /// let config = SteerConfigLoader::new()
    ///     .with_yaml_str(
    ///         "llm:\n  provider: ollama\n  model: llama3.2:3b",
    ///     )
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.policy.max_retries, 7);
    /// assert_eq!(config.browser.webdriver_url, "http://localhost:9515");
    /// ```
    pub fn new() -> Self {
        let builder =
            Config::builder().add_source(Environment::with_prefix("STEER").separator("__"));
        Self { builder }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into strongly
    /// typed config, expanding `${VAR}` placeholders first.
    ///
    /// ```
    /// use steer_common::LlmConfig;
    /// use steer_config::SteerConfigLoader;
    ///
    /// std::env::set_var("API_TOKEN", "injected-from-env");
    ///
    /// let config = SteerConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// version: "1"
    /// llm:
    ///   provider: openai
    ///   model: "gpt-4o-mini"
    ///   auth_token: "${API_TOKEN}"
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// match &config.llm {
    ///     LlmConfig::Openai { model, auth_token, endpoint, .. } => {
    ///         assert_eq!(model, "gpt-4o-mini");
    ///         assert_eq!(auth_token, "injected-from-env");
    ///         assert_eq!(endpoint, "https://api.openai.com/v1");
    ///     }
    ///     _ => panic!("expected OpenAI configuration"),
    /// }
    ///
    /// std::env::remove_var("API_TOKEN");
    /// ```
    pub fn load(self) -> Result<SteerConfig, ConfigError> {
        let cfg = self.builder.build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: SteerConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;

        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("FOO", Some("bar"), || {
            let mut v = json!("prefix-${FOO}-suffix");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("prefix-bar-suffix"));
        });
    }

    #[test]
    fn expands_in_array_and_object() {
        temp_env::with_vars([("CITY", Some("Winston")), ("STATE", Some("NC"))], || {
            let mut v = json!([
                "hello-$CITY",
                { "loc": "${CITY}-${STATE}" },
                42,
                true,
                null
            ]);
            expand_env_in_value(&mut v);
            assert_eq!(
                v,
                json!(["hello-Winston", { "loc": "Winston-NC" }, 42, true, null])
            );
        });
    }

    #[test]
    fn expands_recursively_across_env_values() {
        temp_env::with_vars(
            [
                // BAR references BAZ; FOO references BAR — two hops.
                ("BAZ", Some("qux")),
                ("BAR", Some("mid-${BAZ}")),
                ("FOO", Some("start-${BAR}-end")),
            ],
            || {
                let mut v = json!("X=${FOO}");
                expand_env_in_value(&mut v);
                assert_eq!(v, json!("X=start-mid-qux-end"));
            },
        );
    }

    #[test]
    fn stops_on_cycles_and_leaves_value_reasonable() {
        temp_env::with_vars([("A", Some("${B}")), ("B", Some("${A}"))], || {
            let mut v = json!("x=${A}-y");
            // Only termination matters here; the depth cap stops the cycle.
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${DOES_NOT_EXIST}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${DOES_NOT_EXIST}"));
    }

    #[test]
    fn policy_defaults_apply_when_absent() {
        let cfg = SteerConfigLoader::new()
            .with_yaml_str("llm:\n  provider: ollama\n  model: llama3.2:3b")
            .load()
            .unwrap();
        assert_eq!(cfg.policy.redundancy_window, 3);
        assert_eq!(cfg.policy.escalation_threshold, 3);
        assert_eq!(cfg.policy.default_max_wait_ms, 3000);
        assert!(!cfg.browser.headless);
    }
}
