use crate::core::BrowserDriver;
use crate::errors::Result;
use crate::replay::Profile;
use crate::types::{FieldMapping, FieldResult, ReplayStats, ValueSource};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// One field as it moves through the hook chain.
#[derive(Debug, Clone, PartialEq)]
pub struct StepData {
    pub mapping: FieldMapping,
    pub index: usize,
    pub value_to_use: Option<String>,
    pub value_source: Option<ValueSource>,
}

impl StepData {
    pub fn new(mapping: FieldMapping, index: usize) -> Self {
        Self {
            mapping,
            index,
            value_to_use: None,
            value_source: None,
        }
    }

    pub fn with_value(mut self, value: String, source: ValueSource) -> Self {
        self.value_to_use = Some(value);
        self.value_source = Some(source);
        self
    }
}

/// What an extension wants after a field failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    Continue,
    Stop,
}

/// Per-replay state handed to every hook.
pub struct ReplayContext {
    pub profile: Profile,
    pub session_name: String,
    pub replay_stats: ReplayStats,
    pub current_url: String,
    pub driver: Arc<dyn BrowserDriver>,
    pub screenshot_dir: Option<PathBuf>,
    /// Scratch space extensions may share with each other.
    pub custom_data: HashMap<String, Value>,
}

impl ReplayContext {
    pub fn new(
        profile: Profile,
        replay_stats: ReplayStats,
        driver: Arc<dyn BrowserDriver>,
    ) -> Self {
        Self {
            session_name: replay_stats.session_name.clone(),
            current_url: replay_stats.url.clone(),
            profile,
            replay_stats,
            driver,
            screenshot_dir: None,
            custom_data: HashMap::new(),
        }
    }
}

/// Hooks around the replay of one recording. Every hook has a no-op
/// default; an instance lives for exactly one replay.
#[async_trait]
pub trait ReplayExtension: Send + Sync {
    fn name(&self) -> &str;

    async fn before_all_steps(&mut self, _ctx: &mut ReplayContext) -> Result<()> {
        Ok(())
    }

    /// Runs once every field has been attempted; results are in
    /// `ctx.replay_stats.field_results`.
    async fn after_all_steps(&mut self, _ctx: &mut ReplayContext) -> Result<()> {
        Ok(())
    }

    async fn before_each_step(&mut self, _step: &StepData, _ctx: &ReplayContext) -> Result<()> {
        Ok(())
    }

    async fn after_each_step(
        &mut self,
        _step: &StepData,
        _result: &FieldResult,
        _ctx: &ReplayContext,
    ) -> Result<()> {
        Ok(())
    }

    async fn should_skip_step(&mut self, _step: &StepData, _ctx: &ReplayContext) -> bool {
        false
    }

    async fn transform_step(&mut self, step: StepData, _ctx: &ReplayContext) -> StepData {
        step
    }

    async fn on_error(&mut self, _step: &StepData, _error: &str, _ctx: &ReplayContext) -> ErrorAction {
        ErrorAction::Continue
    }

    fn stats(&self) -> Value {
        Value::Null
    }
}
