//! DOM operations backing the [`PageDriver`] contract.

use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::Locator as FLocator;
use serde_json::json;
use std::time::Duration;

use steer_agent::driver::{Locator, PageDriver, PageSnapshot};

use crate::driver::SteerBrowser;

/// WebDriver code point for the Enter key.
const ENTER_KEY: &str = "\u{E007}";

/// Reads the page without mutating it: url, title, and up to 50 visible
/// entries per interactive category.
const SNAPSHOT_JS: &str = r#"
const visible = (el) => {
  const s = window.getComputedStyle(el);
  if (s.display === 'none' || s.visibility === 'hidden') return false;
  const r = el.getBoundingClientRect();
  return r.width > 0 && r.height > 0;
};
const summary = (el) => ({
  tag: el.tagName.toLowerCase(),
  id: el.id || null,
  name: el.getAttribute('name'),
  text: ((el.innerText || el.value || '').trim().slice(0, 80)) || null,
  kind: el.getAttribute('type'),
  href: el.getAttribute('href'),
});
const collect = (sel) =>
  Array.from(document.querySelectorAll(sel)).filter(visible).slice(0, 50).map(summary);
return {
  url: window.location.href,
  title: document.title,
  buttons: collect("button, input[type='submit'], input[type='button'], [role='button']"),
  inputs: collect("input:not([type='hidden']), textarea, select"),
  links: collect("a[href]"),
  landmarks: collect("main, nav, form, [role='main'], [role='navigation'], [role='search']"),
};
"#;

/// Sets a form control's state directly and fires input/change events, for
/// `<select>`, radio, and checkbox controls where native clicks and
/// keystrokes are unreliable.
const SET_FORM_VALUE_JS: &str = r#"
const el = arguments[0];
const value = arguments[1];
if (el.tagName === 'SELECT') {
  el.value = value;
} else if (el.type === 'checkbox') {
  el.checked = (value === 'true' || value === 'on' || value === el.value);
} else if (el.type === 'radio') {
  el.checked = true;
} else {
  el.value = value;
}
el.dispatchEvent(new Event('input', { bubbles: true }));
el.dispatchEvent(new Event('change', { bubbles: true }));
"#;

/// Map the agent's locator onto a fantoccini one. Text selectors become an
/// XPath over direct text nodes.
pub fn to_query(locator: &Locator) -> (String, bool) {
    match locator {
        Locator::Css(css) => (css.clone(), true),
        Locator::XPath(xpath) => (xpath.clone(), false),
        Locator::Text(text) => {
            let quoted = if !text.contains('\'') {
                format!("'{text}'")
            } else {
                format!("\"{}\"", text.replace('"', ""))
            };
            (
                format!("//*[text()[contains(normalize-space(.), {quoted})]]"),
                false,
            )
        }
    }
}

impl SteerBrowser {
    fn locator<'a>(query: &'a (String, bool)) -> FLocator<'a> {
        if query.1 {
            FLocator::Css(&query.0)
        } else {
            FLocator::XPath(&query.0)
        }
    }
}

#[async_trait]
impl PageDriver for SteerBrowser {
    type Handle = Element;

    async fn navigate(&self, url: &str) -> anyhow::Result<()> {
        self.client.goto(url).await?;
        Ok(())
    }

    async fn current_url(&self) -> anyhow::Result<String> {
        Ok(self.client.current_url().await?.to_string())
    }

    async fn title(&self) -> anyhow::Result<String> {
        Ok(self.client.title().await?)
    }

    async fn query(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> anyhow::Result<Option<Element>> {
        let query = to_query(locator);
        let result = self
            .client
            .wait()
            .at_most(timeout)
            .for_element(Self::locator(&query))
            .await;
        match result {
            Ok(element) => Ok(Some(element)),
            Err(CmdError::WaitTimeout) => {
                tracing::debug!(
                    target: "browser.resolve",
                    locator = %locator.describe(),
                    timeout_ms = timeout.as_millis() as u64,
                    "element not found in time"
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn query_all(&self, locator: &Locator) -> anyhow::Result<Vec<Element>> {
        let query = to_query(locator);
        Ok(self.client.find_all(Self::locator(&query)).await?)
    }

    async fn click(&self, handle: &Element) -> anyhow::Result<()> {
        // `click` consumes the element because it may navigate.
        handle.clone().click().await?;
        Ok(())
    }

    async fn fill(&self, handle: &Element, text: &str) -> anyhow::Result<()> {
        handle.clear().await?;
        handle.send_keys(text).await?;
        Ok(())
    }

    async fn press_enter(&self, handle: &Element) -> anyhow::Result<()> {
        handle.send_keys(ENTER_KEY).await?;
        Ok(())
    }

    async fn set_form_value(&self, handle: &Element, value: &str) -> anyhow::Result<()> {
        self.client
            .execute(
                SET_FORM_VALUE_JS,
                vec![serde_json::to_value(handle)?, json!(value)],
            )
            .await?;
        Ok(())
    }

    async fn read_value(&self, handle: &Element) -> anyhow::Result<String> {
        // `value` covers text controls; checked state covers toggles.
        let raw = self
            .client
            .execute(
                "const el = arguments[0]; \
                 if (el.type === 'checkbox' || el.type === 'radio') return String(el.checked); \
                 return String(el.value == null ? '' : el.value);",
                vec![serde_json::to_value(handle)?],
            )
            .await?;
        Ok(raw.as_str().unwrap_or_default().to_string())
    }

    async fn is_displayed(&self, handle: &Element) -> anyhow::Result<bool> {
        Ok(handle.is_displayed().await?)
    }

    async fn is_enabled(&self, handle: &Element) -> anyhow::Result<bool> {
        Ok(handle.is_enabled().await?)
    }

    async fn tag_name(&self, handle: &Element) -> anyhow::Result<String> {
        Ok(handle
            .prop("tagName")
            .await?
            .unwrap_or_default()
            .to_lowercase())
    }

    async fn attr(&self, handle: &Element, name: &str) -> anyhow::Result<Option<String>> {
        Ok(handle.attr(name).await?)
    }

    async fn scroll_by(&self, dy: i64) -> anyhow::Result<()> {
        self.client
            .execute("window.scrollBy(0, arguments[0]);", vec![json!(dy)])
            .await?;
        Ok(())
    }

    async fn screenshot(&self) -> anyhow::Result<Vec<u8>> {
        Ok(self.client.screenshot().await?)
    }

    async fn evaluate(&self, script: &str) -> anyhow::Result<serde_json::Value> {
        Ok(self.client.execute(script, vec![]).await?)
    }

    async fn snapshot(&self) -> anyhow::Result<PageSnapshot> {
        let raw = self.client.execute(SNAPSHOT_JS, vec![]).await?;
        let snapshot: PageSnapshot = serde_json::from_value(raw)?;
        tracing::debug!(
            target: "browser.snapshot",
            url = %snapshot.url,
            buttons = snapshot.buttons.len(),
            inputs = snapshot.inputs.len(),
            links = snapshot.links.len(),
            "page snapshot captured"
        );
        Ok(snapshot)
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.client.clone().close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn css_locators_pass_through() {
        let (q, is_css) = to_query(&Locator::Css("#login".into()));
        assert_eq!(q, "#login");
        assert!(is_css);
    }

    #[test]
    fn text_locators_become_text_node_xpath() {
        let (q, is_css) = to_query(&Locator::Text("Sign in".into()));
        assert!(!is_css);
        assert!(q.contains("normalize-space"));
        assert!(q.contains("'Sign in'"));
    }

    #[test]
    fn text_with_apostrophes_switches_quote_style() {
        let (q, _) = to_query(&Locator::Text("it's here".into()));
        assert!(q.contains("\"it's here\""));
    }
}
