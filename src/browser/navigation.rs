use crate::core::BrowserDriver;
use crate::errors::Result;
use std::time::{Duration, Instant};

pub struct NavigationManager;

impl NavigationManager {
    /// Waits until the page reacts to an action: the URL moves away from
    /// `before_url` or the mutation watch records DOM changes. Errors from
    /// the page while it is unloading are treated as "not yet".
    pub async fn wait_for_settle(
        driver: &dyn BrowserDriver,
        before_url: &str,
        timeout_ms: u64,
        poll_interval_ms: u64,
    ) -> Result<NavigationResult> {
        let start_time = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);
        let poll_interval = Duration::from_millis(poll_interval_ms.max(1));

        loop {
            if let Ok(url) = driver.current_url().await {
                if url != before_url {
                    return Ok(NavigationResult::settled("url_changed", url, start_time));
                }
            }
            if driver.mutations_seen().await.unwrap_or(false) {
                let url = driver.current_url().await.unwrap_or_default();
                return Ok(NavigationResult::settled("dom_mutated", url, start_time));
            }
            if start_time.elapsed() >= timeout {
                let url = driver.current_url().await.unwrap_or_default();
                return Ok(NavigationResult {
                    success: false,
                    reason: "timeout".to_string(),
                    url,
                    duration_ms: start_time.elapsed().as_millis() as u64,
                });
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct NavigationResult {
    pub success: bool,
    pub reason: String,
    pub url: String,
    pub duration_ms: u64,
}

impl NavigationResult {
    fn settled(reason: &str, url: String, start_time: Instant) -> Self {
        Self {
            success: true,
            reason: reason.to_string(),
            url,
            duration_ms: start_time.elapsed().as_millis() as u64,
        }
    }
}
