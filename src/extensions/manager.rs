use crate::extensions::base::{ErrorAction, ReplayContext, ReplayExtension, StepData};
use crate::types::FieldResult;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Runs the registered extensions, in registration order, at each hook.
///
/// Hook failures are logged and never interrupt the replay.
#[derive(Default)]
pub struct ExtensionManager {
    extensions: Vec<Box<dyn ReplayExtension>>,
}

impl ExtensionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, extension: Box<dyn ReplayExtension>) {
        self.extensions.push(extension);
    }

    pub fn with(mut self, extension: impl ReplayExtension + 'static) -> Self {
        self.add(Box::new(extension));
        self
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.extensions.iter().map(|e| e.name().to_string()).collect()
    }

    pub async fn before_all_steps(&mut self, ctx: &mut ReplayContext) {
        for ext in self.extensions.iter_mut() {
            if let Err(e) = ext.before_all_steps(ctx).await {
                warn!(extension = ext.name(), error = %e, "before_all_steps failed");
            }
        }
    }

    pub async fn after_all_steps(&mut self, ctx: &mut ReplayContext) {
        for ext in self.extensions.iter_mut() {
            if let Err(e) = ext.after_all_steps(ctx).await {
                warn!(extension = ext.name(), error = %e, "after_all_steps failed");
            }
        }
    }

    pub async fn before_each_step(&mut self, step: &StepData, ctx: &ReplayContext) {
        for ext in self.extensions.iter_mut() {
            if let Err(e) = ext.before_each_step(step, ctx).await {
                warn!(extension = ext.name(), error = %e, "before_each_step failed");
            }
        }
    }

    pub async fn after_each_step(&mut self, step: &StepData, result: &FieldResult, ctx: &ReplayContext) {
        for ext in self.extensions.iter_mut() {
            if let Err(e) = ext.after_each_step(step, result, ctx).await {
                warn!(extension = ext.name(), error = %e, "after_each_step failed");
            }
        }
    }

    /// True if any extension asks to skip. Every extension is asked.
    pub async fn should_skip_step(&mut self, step: &StepData, ctx: &ReplayContext) -> bool {
        let mut skip = false;
        for ext in self.extensions.iter_mut() {
            skip |= ext.should_skip_step(step, ctx).await;
        }
        skip
    }

    /// Feeds the step through each extension's transform in turn.
    pub async fn transform_step(&mut self, step: StepData, ctx: &ReplayContext) -> StepData {
        let mut step = step;
        for ext in self.extensions.iter_mut() {
            step = ext.transform_step(step, ctx).await;
        }
        step
    }

    /// `Stop` if any extension votes to stop.
    pub async fn on_error(&mut self, step: &StepData, error: &str, ctx: &ReplayContext) -> ErrorAction {
        let mut action = ErrorAction::Continue;
        for ext in self.extensions.iter_mut() {
            if ext.on_error(step, error, ctx).await == ErrorAction::Stop {
                action = ErrorAction::Stop;
            }
        }
        action
    }

    /// Stats keyed by extension name. A repeated name gets a `#2`, `#3`...
    /// suffix so no instance's numbers are dropped.
    pub fn collect_stats(&self) -> BTreeMap<String, Value> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut collected = BTreeMap::new();
        for ext in &self.extensions {
            let count = seen.entry(ext.name()).or_default();
            *count += 1;
            let stats = ext.stats();
            if stats.is_null() {
                continue;
            }
            let key = match *count {
                1 => ext.name().to_string(),
                n => format!("{}#{}", ext.name(), n),
            };
            collected.insert(key, stats);
        }
        collected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ReplayError;
    use crate::replay::Profile;
    use crate::testing::MockDriver;
    use crate::types::{FieldMapping, ReplayStats, ValueSource};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct Suffix(&'static str);

    #[async_trait]
    impl ReplayExtension for Suffix {
        fn name(&self) -> &str {
            self.0
        }

        async fn transform_step(&mut self, step: StepData, _ctx: &ReplayContext) -> StepData {
            let value = format!("{}{}", step.value_to_use.clone().unwrap_or_default(), self.0);
            step.with_value(value, ValueSource::Profile)
        }
    }

    struct Voter {
        skip: bool,
        stop: bool,
        asked: usize,
    }

    #[async_trait]
    impl ReplayExtension for Voter {
        fn name(&self) -> &str {
            "voter"
        }

        async fn before_each_step(&mut self, _step: &StepData, _ctx: &ReplayContext) -> crate::errors::Result<()> {
            Err(ReplayError::JavaScriptFailed("observer broke".into()))
        }

        async fn should_skip_step(&mut self, _step: &StepData, _ctx: &ReplayContext) -> bool {
            self.asked += 1;
            self.skip
        }

        async fn on_error(&mut self, _step: &StepData, _error: &str, _ctx: &ReplayContext) -> ErrorAction {
            if self.stop {
                ErrorAction::Stop
            } else {
                ErrorAction::Continue
            }
        }

        fn stats(&self) -> Value {
            json!({ "asked": self.asked })
        }
    }

    fn context() -> ReplayContext {
        ReplayContext::new(
            Profile::default(),
            ReplayStats::new("s", "ex.test", "https://ex.test"),
            Arc::new(MockDriver::new("https://ex.test")),
        )
    }

    fn step() -> StepData {
        StepData::new(FieldMapping::new("#a", Some("email")), 0)
    }

    #[tokio::test]
    async fn test_transforms_chain_in_order() {
        let ctx = context();
        let mut manager = ExtensionManager::new().with(Suffix("a")).with(Suffix("b"));
        let out = manager.transform_step(step(), &ctx).await;
        assert_eq!(out.value_to_use.as_deref(), Some("ab"));
    }

    #[tokio::test]
    async fn test_skip_is_or_and_every_extension_is_asked() {
        let ctx = context();
        let mut manager = ExtensionManager::new()
            .with(Voter { skip: true, stop: false, asked: 0 })
            .with(Voter { skip: false, stop: false, asked: 5 });

        assert!(manager.should_skip_step(&step(), &ctx).await);
        let stats = manager.collect_stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats["voter"], json!({ "asked": 1 }));
        assert_eq!(stats["voter#2"], json!({ "asked": 6 }));
    }

    #[tokio::test]
    async fn test_any_stop_vote_stops() {
        let ctx = context();
        let mut manager = ExtensionManager::new()
            .with(Voter { skip: false, stop: false, asked: 0 })
            .with(Voter { skip: false, stop: true, asked: 0 });
        assert_eq!(manager.on_error(&step(), "boom", &ctx).await, ErrorAction::Stop);

        let mut calm = ExtensionManager::new().with(Voter { skip: false, stop: false, asked: 0 });
        assert_eq!(calm.on_error(&step(), "boom", &ctx).await, ErrorAction::Continue);
    }

    #[tokio::test]
    async fn test_hook_errors_are_swallowed() {
        let ctx = context();
        let mut manager = ExtensionManager::new().with(Voter { skip: false, stop: false, asked: 0 });
        manager.before_each_step(&step(), &ctx).await;
        assert_eq!(manager.len(), 1);
    }
}
