use crate::errors::{ReplayError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserConfig,
    pub replay: ReplayConfig,
    pub store: StoreConfig,
    pub extensions: ExtensionsConfig,
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| ReplayError::Configuration(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    pub disable_images: bool,
    pub args: Vec<String>,
    pub timeout_ms: u64,
    pub navigation_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Pause between two fields of the same form.
    pub field_delay_ms: u64,
    pub char_delay_ms: u64,
    pub dropdown_open_delay_ms: u64,
    /// Longest wait for the form page to report it has loaded.
    pub page_settle_ms: u64,
    pub submit: bool,
    pub submission_wait_ms: u64,
    pub screenshot_dir: Option<PathBuf>,
    pub batch_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// redb database file.
    pub path: PathBuf,
    /// Keep mappings in memory only and ignore `path`.
    pub in_memory: bool,
}

impl StoreConfig {
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("form-replay")
            .join("mappings.redb")
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
            in_memory: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionsConfig {
    /// Extension names in hook order.
    pub enabled: Vec<String>,
    pub preview_mode: bool,
    pub continue_on_error: bool,
    pub screenshot_on_error: bool,
    pub screenshot_on_success: bool,
    pub captcha_auto_solve: bool,
    pub captcha_max_wait_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
            user_agent: None,
            disable_images: false,
            args: vec![],
            timeout_ms: 30000,
            navigation_timeout_ms: 15000,
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            field_delay_ms: 300,
            char_delay_ms: 50,
            dropdown_open_delay_ms: 300,
            page_settle_ms: 3000,
            submit: true,
            submission_wait_ms: 5000,
            screenshot_dir: None,
            batch_concurrency: 2,
        }
    }
}

impl ReplayConfig {
    /// No pauses at all; handy for tests against an in-memory page.
    pub fn immediate() -> Self {
        Self {
            field_delay_ms: 0,
            char_delay_ms: 0,
            dropdown_open_delay_ms: 0,
            page_settle_ms: 0,
            submission_wait_ms: 0,
            ..Self::default()
        }
    }
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            enabled: vec!["data_substitution".to_string(), "logging".to_string()],
            preview_mode: false,
            continue_on_error: true,
            screenshot_on_error: true,
            screenshot_on_success: false,
            captcha_auto_solve: true,
            captcha_max_wait_ms: 120_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [browser]
            headless = false

            [replay]
            field_delay_ms = 10

            [extensions]
            enabled = ["data_substitution", "screenshot"]
            "#,
        )
        .unwrap();

        assert!(!config.browser.headless);
        assert_eq!(config.browser.viewport.width, 1280);
        assert_eq!(config.replay.field_delay_ms, 10);
        assert_eq!(config.replay.char_delay_ms, 50);
        assert!(config.replay.submit);
        assert_eq!(config.extensions.enabled.len(), 2);
        assert!(!config.store.in_memory);
        assert_eq!(config.store.path, StoreConfig::default_path());
        assert!(config.store.path.ends_with("form-replay/mappings.redb"));
    }

    #[test]
    fn test_store_path_from_toml() {
        let config = Config::from_toml_str(
            r#"
            [store]
            path = "/var/lib/form-replay/sites.redb"
            "#,
        )
        .unwrap();
        assert_eq!(config.store.path, PathBuf::from("/var/lib/form-replay/sites.redb"));
        assert!(!config.store.in_memory);
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let err = Config::from_toml_str("replay = 3").unwrap_err();
        assert!(matches!(err, ReplayError::Configuration(_)));
    }
}
