use serial_test::serial;
use std::{fs, path::PathBuf};
use steer_common::LlmConfig;
use steer_config::SteerConfigLoader;
use tempfile::TempDir;

/// Helper to write a YAML file in a temp dir and return its path.
fn write_yaml(tmp: &TempDir, name: &str, yaml: &str) -> PathBuf {
    let p = tmp.path().join(name);
    fs::write(&p, yaml).expect("write yaml");
    p
}

#[test]
#[serial]
fn test_config_load() {
    let tmp = TempDir::new().unwrap();

    let file_yaml = r#"
version: "0.1"
llm:
  provider: openai
  model: "gpt-4o-mini"
  auth_token: "${OPENAI_API_KEY}"
  temperature: 0.2
  max_tokens: 512
browser:
  webdriver_url: "http://localhost:9515"
  headless: true
policy:
  max_retries: 5
  "#;
    let p = write_yaml(&tmp, "steer.yaml", file_yaml);

    let config = SteerConfigLoader::new()
        .with_file(p)
        .load()
        .expect("load system config");

    assert!(matches!(config.llm, LlmConfig::Openai { .. }));
    assert!(config.browser.headless);
    assert_eq!(config.policy.max_retries, 5);
    // Unset knobs keep their defaults.
    assert_eq!(config.policy.redundancy_window, 3);
}
