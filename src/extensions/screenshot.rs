use crate::errors::Result;
use crate::extensions::base::{ReplayContext, ReplayExtension, StepData};
use crate::types::FieldResult;
use crate::utils::ScreenshotManager;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Captures the page when a field fails, and optionally when it succeeds.
///
/// A failed capture is logged and forgotten.
pub struct ScreenshotExtension {
    on_error: bool,
    on_success: bool,
    fallback_dir: PathBuf,
    taken: Vec<PathBuf>,
    failures: usize,
}

impl ScreenshotExtension {
    pub fn new(on_error: bool, on_success: bool) -> Self {
        Self {
            on_error,
            on_success,
            fallback_dir: std::env::temp_dir().join("form-replay-screenshots"),
            taken: Vec::new(),
            failures: 0,
        }
    }

    /// Directory used when the replay has no screenshot directory set.
    pub fn with_fallback_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fallback_dir = dir.into();
        self
    }

    pub fn taken(&self) -> &[PathBuf] {
        &self.taken
    }

    async fn capture(&mut self, ctx: &ReplayContext, label: &str) {
        let dir = ctx
            .screenshot_dir
            .clone()
            .unwrap_or_else(|| self.fallback_dir.clone());
        match ScreenshotManager::save_to_file(ctx.driver.as_ref(), &dir, &ctx.session_name, label).await {
            Ok(path) => {
                debug!(path = %path.display(), "screenshot saved");
                self.taken.push(path);
            }
            Err(e) => {
                self.failures += 1;
                warn!(error = %e, label, "screenshot failed");
            }
        }
    }
}

#[async_trait]
impl ReplayExtension for ScreenshotExtension {
    fn name(&self) -> &str {
        "screenshot"
    }

    async fn after_each_step(
        &mut self,
        step: &StepData,
        result: &FieldResult,
        ctx: &ReplayContext,
    ) -> Result<()> {
        if result.skipped {
            return Ok(());
        }
        let wanted = if result.success { self.on_success } else { self.on_error };
        if wanted {
            let outcome = if result.success { "ok" } else { "error" };
            let label = format!("{}_{}_{}", outcome, step.index, step.mapping.display_name());
            self.capture(ctx, &label).await;
        }
        Ok(())
    }

    fn stats(&self) -> Value {
        json!({
            "screenshots_taken": self.taken.len(),
            "screenshot_failures": self.failures,
        })
    }
}
