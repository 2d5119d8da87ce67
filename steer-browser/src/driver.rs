use anyhow::Result;
use fantoccini::{Client, ClientBuilder};
use serde_json::json;
use std::collections::HashMap;
use webdriver::capabilities::Capabilities;

/// Thin wrapper around a `fantoccini` WebDriver client.
///
/// One browser session is exclusively owned by one running agent session;
/// there is no tab or session sharing.
pub struct SteerBrowser {
    pub(crate) client: Client,
}

impl SteerBrowser {
    /// Connect to a running WebDriver service (Chromedriver by default on
    /// `http://localhost:9515`).
    pub async fn connect(webdriver_url: &str, headless: bool) -> Result<Self> {
        let mut caps = Capabilities::new();
        let mut chrome_opts = HashMap::new();

        let mut args = vec![
            "--no-first-run".to_string(),
            "--disable-infobars".to_string(),
        ];
        if headless {
            args.push("--headless".to_string());
            args.push("--disable-gpu".to_string());
        }
        chrome_opts.insert("args".to_string(), json!(args));
        caps.insert("goog:chromeOptions".to_string(), json!(chrome_opts));

        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(webdriver_url)
            .await?;

        tracing::info!(target: "browser.session", %webdriver_url, headless, "browser connected");
        Ok(Self { client })
    }
}
