use crate::core::{BrowserConfig, BrowserDriver, CookieData, DriverFactory};
use crate::errors::{ReplayError, Result};
use crate::utils::javascript::{self, wrap_with_args};
use async_trait::async_trait;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One Chrome process with a single tab, driven through DevTools.
pub struct ChromeDriver {
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeDriver {
    pub fn launch(config: &BrowserConfig) -> Result<Self> {
        let window_size_arg = format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        );

        let user_agent_arg = config
            .user_agent
            .as_ref()
            .map(|ua| format!("--user-agent={}", ua));

        let mut args = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new(&window_size_arg),
        ];

        if let Some(ref ua_arg) = user_agent_arg {
            args.push(OsStr::new(ua_arg));
        }

        if config.disable_images {
            args.push(OsStr::new("--blink-settings=imagesEnabled=false"));
        }

        for arg in &config.args {
            args.push(OsStr::new(arg));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .args(args)
            .idle_browser_timeout(Duration::from_millis(config.timeout_ms.max(1000) * 10))
            .build()
            .map_err(|e| ReplayError::LaunchFailed(e.to_string()))?;

        let browser =
            Browser::new(launch_options).map_err(|e| ReplayError::LaunchFailed(e.to_string()))?;

        let tab = browser
            .new_tab()
            .map_err(|e| ReplayError::LaunchFailed(e.to_string()))?;
        tab.set_default_timeout(Duration::from_millis(config.navigation_timeout_ms));

        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    fn element(&self, selector: &str) -> Result<Element<'_>> {
        let found = match selector.strip_prefix("xpath/") {
            Some(xpath) => self.tab.find_element_by_xpath(xpath),
            None => self
                .tab
                .find_element(selector.strip_prefix("pierce/").unwrap_or(selector)),
        };
        found.map_err(|e| ReplayError::ElementNotFound(format!("{}: {}", selector, e)))
    }

    async fn run_bool(&self, script: &str, args: &[Value]) -> Result<bool> {
        let result = self.execute_script(script, args).await?;
        Ok(result.as_bool().unwrap_or(false))
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| ReplayError::NavigationFailed(e.to_string()))?;

        self.tab
            .wait_until_navigated()
            .map_err(|e| ReplayError::NavigationFailed(e.to_string()))?;

        Ok(())
    }

    async fn find_element(&self, selector: &str) -> Result<bool> {
        self.run_bool(&javascript::exists_script(), &[Value::from(selector)])
            .await
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        self.run_bool(&javascript::is_visible_script(), &[Value::from(selector)])
            .await
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.element(selector)?
            .click()
            .map_err(|e| ReplayError::JavaScriptFailed(format!("click {}: {}", selector, e)))?;
        Ok(())
    }

    async fn type_text(&self, selector: &str, value: &str) -> Result<()> {
        self.element(selector)?
            .type_into(value)
            .map_err(|e| ReplayError::JavaScriptFailed(format!("type {}: {}", selector, e)))?;
        Ok(())
    }

    async fn clear(&self, selector: &str) -> Result<()> {
        if !self
            .run_bool(&javascript::clear_script(), &[Value::from(selector)])
            .await?
        {
            return Err(ReplayError::ElementNotFound(selector.to_string()));
        }
        Ok(())
    }

    async fn select_by_value(&self, selector: &str, value: &str) -> Result<bool> {
        self.run_bool(
            &javascript::select_option_script(),
            &[Value::from(selector), Value::from(value), Value::from("value")],
        )
        .await
    }

    async fn select_by_text(&self, selector: &str, text: &str) -> Result<bool> {
        self.run_bool(
            &javascript::select_option_script(),
            &[Value::from(selector), Value::from(text), Value::from("text")],
        )
        .await
    }

    async fn is_checked(&self, selector: &str) -> Result<bool> {
        self.run_bool(&javascript::is_checked_script(), &[Value::from(selector)])
            .await
    }

    async fn execute_script(&self, script: &str, args: &[Value]) -> Result<Value> {
        let wrapped = wrap_with_args(script, args)?;
        let result = self
            .tab
            .evaluate(&wrapped, false)
            .map_err(|e| ReplayError::JavaScriptFailed(e.to_string()))?;

        Ok(result.value.unwrap_or(Value::Null))
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.tab.get_url())
    }

    async fn page_source(&self) -> Result<String> {
        self.tab
            .get_content()
            .map_err(|e| ReplayError::JavaScriptFailed(e.to_string()))
    }

    async fn cookies(&self) -> Result<Vec<CookieData>> {
        let cookies = self
            .tab
            .get_cookies()
            .map_err(|e| ReplayError::JavaScriptFailed(e.to_string()))?;

        Ok(cookies
            .into_iter()
            .map(|c| CookieData {
                name: c.name,
                value: c.value,
                domain: c.domain,
            })
            .collect())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let png = self
            .tab
            .capture_screenshot(
                headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption::Png,
                None,
                None,
                true,
            )
            .map_err(|e| ReplayError::ScreenshotFailed(e.to_string()))?;

        tokio::fs::write(path, png)
            .await
            .map_err(|e| ReplayError::ScreenshotFailed(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        debug!("closing chrome tab");
        self.tab
            .close(false)
            .map_err(|e| ReplayError::JavaScriptFailed(e.to_string()))?;
        Ok(())
    }
}

/// Launches a fresh Chrome for every replay.
#[derive(Debug, Default, Clone)]
pub struct ChromeDriverFactory;

#[async_trait]
impl DriverFactory for ChromeDriverFactory {
    async fn acquire(&self, config: &BrowserConfig) -> Result<Arc<dyn BrowserDriver>> {
        let config = config.clone();
        let driver = tokio::task::spawn_blocking(move || ChromeDriver::launch(&config))
            .await
            .map_err(|e| ReplayError::LaunchFailed(e.to_string()))??;
        Ok(Arc::new(driver))
    }
}
