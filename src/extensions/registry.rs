use crate::core::ExtensionsConfig;
use crate::errors::{ReplayError, Result};
use crate::extensions::base::ReplayExtension;
use crate::extensions::captcha::{CaptchaExtension, CaptchaSolver, ManualSolver};
use crate::extensions::data_substitution::DataSubstitutionExtension;
use crate::extensions::logging::LoggingExtension;
use crate::extensions::manager::ExtensionManager;
use crate::extensions::screenshot::ScreenshotExtension;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub type ExtensionFactory = Arc<dyn Fn(&ExtensionsConfig) -> Box<dyn ReplayExtension> + Send + Sync>;

/// Name -> factory map for replay extensions.
///
/// Built once at startup; every replay gets fresh instances from it, so no
/// two replays share extension state.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    factories: HashMap<String, ExtensionFactory>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every shipped extension, using [`ManualSolver`] for
    /// captchas.
    pub fn with_builtin() -> Self {
        Self::with_captcha_solver(Arc::new(ManualSolver::default()))
    }

    pub fn with_captcha_solver(solver: Arc<dyn CaptchaSolver>) -> Self {
        let mut registry = Self::new();
        registry.register("data_substitution", |config| {
            Box::new(
                DataSubstitutionExtension::new()
                    .preview(config.preview_mode)
                    .continue_on_error(config.continue_on_error),
            )
        });
        registry.register("logging", |_| Box::new(LoggingExtension::new()));
        registry.register("screenshot", |config| {
            Box::new(ScreenshotExtension::new(
                config.screenshot_on_error,
                config.screenshot_on_success,
            ))
        });
        registry.register("captcha", move |config| {
            Box::new(CaptchaExtension::new(
                solver.clone(),
                config.captcha_auto_solve,
                Duration::from_millis(config.captcha_max_wait_ms),
            ))
        });
        registry
    }

    /// Register a factory; a later registration under the same name wins.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ExtensionsConfig) -> Box<dyn ReplayExtension> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// List all registered extension names, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Instantiates `config.enabled`, in order, into a fresh manager. A
    /// name listed twice is a configuration error.
    pub fn build(&self, config: &ExtensionsConfig) -> Result<ExtensionManager> {
        let mut manager = ExtensionManager::new();
        for (position, name) in config.enabled.iter().enumerate() {
            if config.enabled[..position].contains(name) {
                return Err(ReplayError::Configuration(format!(
                    "extension enabled twice: {}",
                    name
                )));
            }
            let factory = self.factories.get(name).ok_or_else(|| {
                ReplayError::Configuration(format!("unknown extension: {}", name))
            })?;
            manager.add(factory(config));
        }
        Ok(manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_enabled_extensions_in_order() {
        let registry = ExtensionRegistry::with_builtin();
        let config = ExtensionsConfig {
            enabled: vec!["logging".into(), "data_substitution".into(), "captcha".into()],
            ..ExtensionsConfig::default()
        };
        let manager = registry.build(&config).unwrap();
        assert_eq!(manager.names(), vec!["logging", "data_substitution", "captcha"]);
        assert_eq!(
            registry.list(),
            vec!["captcha", "data_substitution", "logging", "screenshot"]
        );
    }

    #[test]
    fn test_unknown_name_is_configuration_error() {
        let registry = ExtensionRegistry::with_builtin();
        let config = ExtensionsConfig {
            enabled: vec!["telepathy".into()],
            ..ExtensionsConfig::default()
        };
        assert!(matches!(registry.build(&config), Err(ReplayError::Configuration(_))));
    }

    #[test]
    fn test_duplicate_name_is_configuration_error() {
        let registry = ExtensionRegistry::with_builtin();
        let config = ExtensionsConfig {
            enabled: vec!["logging".into(), "captcha".into(), "logging".into()],
            ..ExtensionsConfig::default()
        };
        match registry.build(&config) {
            Err(ReplayError::Configuration(message)) => assert!(message.contains("logging")),
            other => panic!("expected configuration error, got {:?}", other.map(|m| m.names())),
        }
    }

    #[test]
    fn test_each_build_yields_fresh_instances() {
        let mut registry = ExtensionRegistry::new();
        registry.register("logging", |_| Box::new(LoggingExtension::new()));
        let config = ExtensionsConfig {
            enabled: vec!["logging".into()],
            ..ExtensionsConfig::default()
        };
        let first = registry.build(&config).unwrap();
        let second = registry.build(&config).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert!(registry.contains("logging"));
    }
}
