use crate::core::config::BrowserConfig;
use crate::errors::Result;
use crate::utils::javascript;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// What live-DOM introspection reports about one element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementInfo {
    pub tag_name: String,
    pub input_type: Option<String>,
    pub ancestor_classes: Vec<String>,
    pub option_count: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub aria_label: Option<String>,
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookieData {
    pub name: String,
    pub value: String,
    pub domain: String,
}

/// Browser automation primitives the replay pipeline is written against.
///
/// Selectors are CSS unless prefixed with `xpath/`. Scripts passed to
/// [`BrowserDriver::execute_script`] are function bodies that see their
/// arguments as `args` and hand back a value with `return`.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Whether the selector currently matches an element.
    async fn find_element(&self, selector: &str) -> Result<bool>;

    async fn is_visible(&self, selector: &str) -> Result<bool>;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn type_text(&self, selector: &str, value: &str) -> Result<()>;

    async fn clear(&self, selector: &str) -> Result<()>;

    /// `Ok(false)` when the select has no option with that value.
    async fn select_by_value(&self, selector: &str, value: &str) -> Result<bool>;

    /// `Ok(false)` when the select has no option with that visible text.
    async fn select_by_text(&self, selector: &str, text: &str) -> Result<bool>;

    async fn is_checked(&self, selector: &str) -> Result<bool>;

    async fn execute_script(&self, script: &str, args: &[Value]) -> Result<Value>;

    async fn current_url(&self) -> Result<String>;

    async fn page_source(&self) -> Result<String>;

    async fn cookies(&self) -> Result<Vec<CookieData>>;

    async fn screenshot(&self, path: &Path) -> Result<()>;

    async fn close(&self) -> Result<()>;

    async fn describe_element(&self, selector: &str) -> Result<Option<ElementInfo>> {
        let result = self
            .execute_script(
                &javascript::describe_element_script(),
                &[Value::from(selector)],
            )
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(result)?))
    }

    /// Assigns `value` directly and dispatches `input` and `change`.
    async fn set_value_scripted(&self, selector: &str, value: &str) -> Result<bool> {
        let result = self
            .execute_script(
                &javascript::set_value_script(),
                &[Value::from(selector), Value::from(value)],
            )
            .await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    async fn type_char_by_char(&self, selector: &str, value: &str, delay_ms: u64) -> Result<()> {
        self.click(selector).await?;
        self.clear(selector).await?;
        let mut buf = [0u8; 4];
        for c in value.chars() {
            self.type_text(selector, c.encode_utf8(&mut buf)).await?;
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
        Ok(())
    }

    /// Clicks the first visible option-like element whose text matches.
    async fn click_option_with_text(&self, text: &str) -> Result<bool> {
        let result = self
            .execute_script(&javascript::click_option_script(), &[Value::from(text)])
            .await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    /// Returns a selector for the first visible button whose text contains
    /// one of `words`.
    async fn find_clickable_by_text(&self, words: &[&str]) -> Result<Option<String>> {
        let result = self
            .execute_script(
                &javascript::find_clickable_by_text_script(),
                &[serde_json::to_value(words)?],
            )
            .await?;
        Ok(result.as_str().map(|s| s.to_string()))
    }

    /// HTTP status of the current document, when the browser exposes it.
    async fn response_status(&self) -> Result<Option<u16>> {
        let result = self
            .execute_script(javascript::RESPONSE_STATUS_SCRIPT, &[])
            .await?;
        Ok(result
            .as_u64()
            .filter(|status| *status > 0)
            .and_then(|status| u16::try_from(status).ok()))
    }

    async fn watch_mutations(&self) -> Result<()> {
        self.execute_script(javascript::INSTALL_MUTATION_WATCH_SCRIPT, &[])
            .await?;
        Ok(())
    }

    async fn mutations_seen(&self) -> Result<bool> {
        let result = self
            .execute_script(javascript::MUTATIONS_SEEN_SCRIPT, &[])
            .await?;
        Ok(result.as_bool().unwrap_or(false))
    }
}

/// Hands out one browser session per replay.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn acquire(&self, config: &BrowserConfig) -> Result<Arc<dyn BrowserDriver>>;
}
