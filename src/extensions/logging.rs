use crate::errors::Result;
use crate::extensions::base::{ErrorAction, ReplayContext, ReplayExtension, StepData};
use crate::types::FieldResult;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Reports the replay lifecycle through `tracing`.
#[derive(Debug, Default)]
pub struct LoggingExtension {
    steps_logged: usize,
    errors_logged: usize,
}

impl LoggingExtension {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReplayExtension for LoggingExtension {
    fn name(&self) -> &str {
        "logging"
    }

    async fn before_all_steps(&mut self, ctx: &mut ReplayContext) -> Result<()> {
        info!(
            session = %ctx.session_name,
            domain = %ctx.replay_stats.domain,
            url = %ctx.current_url,
            profile = ?ctx.profile.name,
            "replay started"
        );
        Ok(())
    }

    async fn before_each_step(&mut self, step: &StepData, _ctx: &ReplayContext) -> Result<()> {
        debug!(
            index = step.index,
            field = step.mapping.display_name(),
            selector = %step.mapping.selector,
            "filling field"
        );
        Ok(())
    }

    async fn after_each_step(
        &mut self,
        step: &StepData,
        result: &FieldResult,
        _ctx: &ReplayContext,
    ) -> Result<()> {
        self.steps_logged += 1;
        if result.skipped {
            debug!(field = step.mapping.display_name(), "field skipped");
        } else if result.success {
            info!(
                field = step.mapping.display_name(),
                strategy = ?result.strategy,
                source = ?result.value_source,
                elapsed_ms = result.execution_time_ms,
                "field filled"
            );
        } else {
            warn!(
                field = step.mapping.display_name(),
                error = result.error.as_deref().unwrap_or("unknown"),
                "field failed"
            );
        }
        Ok(())
    }

    async fn on_error(&mut self, _step: &StepData, _error: &str, _ctx: &ReplayContext) -> ErrorAction {
        self.errors_logged += 1;
        ErrorAction::Continue
    }

    async fn after_all_steps(&mut self, ctx: &mut ReplayContext) -> Result<()> {
        let stats = &ctx.replay_stats;
        info!(
            session = %ctx.session_name,
            total = stats.total_fields,
            successful = stats.successful_fields,
            failed = stats.failed_fields,
            skipped = stats.skipped_fields,
            success_rate = format!("{:.1}%", stats.success_rate()),
            "fields done"
        );
        Ok(())
    }

    fn stats(&self) -> Value {
        json!({
            "steps_logged": self.steps_logged,
            "errors_logged": self.errors_logged,
        })
    }
}
