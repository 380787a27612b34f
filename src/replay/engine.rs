use crate::core::{BrowserDriver, Config, DriverFactory};
use crate::errors::{ReplayError, Result};
use crate::extensions::{ErrorAction, ExtensionManager, ExtensionRegistry, ReplayContext, StepData};
use crate::replay::fill::{resolve_strategy, FieldFiller, FillOutcome};
use crate::replay::profile::Profile;
use crate::replay::progress::{CancelFlag, ProgressSink, ProgressStatus, ProgressUpdate};
use crate::replay::submission::submit_form;
use crate::store::{normalize_domain, MappingStore};
use crate::types::{DomainMappingRecord, FieldMapping, FieldResult, ReplayStats, Submission, ValueSource};
use crate::utils::javascript;
use crate::utils::{JavaScriptRunner, ScreenshotManager};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Replays learned mappings for a site with a profile's data.
///
/// Fields are filled one at a time in recorded order. A field that fails is
/// recorded and the next one is attempted; only failing to load the
/// mappings or to start the browser session is an `Err`.
pub struct ReplayEngine {
    store: Arc<MappingStore>,
    drivers: Arc<dyn DriverFactory>,
    registry: ExtensionRegistry,
    config: Config,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl ReplayEngine {
    pub fn new(
        store: Arc<MappingStore>,
        drivers: Arc<dyn DriverFactory>,
        registry: ExtensionRegistry,
        config: Config,
    ) -> Self {
        Self {
            store,
            drivers,
            registry,
            config,
            progress: None,
        }
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<MappingStore> {
        &self.store
    }

    pub async fn replay(&self, domain: &str, profile: Profile) -> Result<ReplayStats> {
        self.replay_with_cancel(domain, profile, &CancelFlag::new()).await
    }

    pub async fn replay_with_cancel(
        &self,
        domain: &str,
        profile: Profile,
        cancel: &CancelFlag,
    ) -> Result<ReplayStats> {
        let record = self.load_record(domain).await?;
        let (stats, _) = self.run(&record, profile, cancel, false).await?;
        Ok(stats)
    }

    /// Like [`ReplayEngine::replay`] but the browser is left open and
    /// handed back; closing it is up to the caller.
    pub async fn replay_debug(
        &self,
        domain: &str,
        profile: Profile,
    ) -> Result<(ReplayStats, Arc<dyn BrowserDriver>)> {
        let record = self.load_record(domain).await?;
        self.run(&record, profile, &CancelFlag::new(), true).await
    }

    async fn load_record(&self, domain: &str) -> Result<DomainMappingRecord> {
        self.store
            .get_full(domain)
            .await?
            .ok_or_else(|| ReplayError::MappingsNotFound(normalize_domain(domain)))
    }

    async fn wait_for_page(&self, driver: &dyn BrowserDriver) {
        let settle_ms = self.config.replay.page_settle_ms;
        if settle_ms == 0 {
            return;
        }
        match JavaScriptRunner::wait_for_condition(driver, javascript::DOCUMENT_READY_SCRIPT, settle_ms, 100).await {
            Ok(true) => {}
            Ok(false) => debug!(settle_ms, "page still loading, continuing"),
            Err(e) => debug!(error = %e, "ready check failed, continuing"),
        }
    }

    fn report(&self, status: ProgressStatus, message: impl Into<String>, progress: f32) {
        if let Some(sink) = &self.progress {
            sink.update(ProgressUpdate::new(status, message, progress));
        }
    }

    async fn run(
        &self,
        record: &DomainMappingRecord,
        profile: Profile,
        cancel: &CancelFlag,
        keep_open: bool,
    ) -> Result<(ReplayStats, Arc<dyn BrowserDriver>)> {
        let session_name = format!(
            "{}_{}",
            record.domain,
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let mut stats = ReplayStats::new(&session_name, &record.domain, &record.url);
        stats.profile_name = profile.name.clone();

        let mut extensions = self.registry.build(&self.config.extensions)?;
        self.report(ProgressStatus::Started, format!("replaying {}", record.domain), 0.0);

        let driver = match self.drivers.acquire(&self.config.browser).await {
            Ok(driver) => driver,
            Err(e) => {
                error!(domain = %record.domain, error = %e, "could not start browser");
                self.report(ProgressStatus::Failed, e.to_string(), 0.0);
                stats.finalize();
                return Err(ReplayError::SessionFailed {
                    reason: e.to_string(),
                    stats: Box::new(stats),
                });
            }
        };

        if let Err(e) = driver.navigate(&record.url).await {
            error!(url = %record.url, error = %e, "could not open form page");
            self.report(ProgressStatus::Failed, e.to_string(), 0.0);
            if let Err(close_err) = driver.close().await {
                warn!(error = %close_err, "browser close failed");
            }
            stats.finalize();
            return Err(ReplayError::SessionFailed {
                reason: e.to_string(),
                stats: Box::new(stats),
            });
        }
        self.wait_for_page(driver.as_ref()).await;

        let mut ctx = ReplayContext::new(profile, stats, Arc::clone(&driver));
        ctx.screenshot_dir = self.config.replay.screenshot_dir.clone();
        if let Ok(url) = driver.current_url().await {
            ctx.current_url = url;
        }

        extensions.before_all_steps(&mut ctx).await;
        self.fill_fields(&record.mappings, &mut extensions, &mut ctx, cancel).await;
        extensions.after_all_steps(&mut ctx).await;

        ctx.replay_stats.submission = self.maybe_submit(record, &ctx).await;

        if let Some(dir) = &self.config.replay.screenshot_dir {
            if let Err(e) =
                ScreenshotManager::save_to_file(driver.as_ref(), dir, &ctx.session_name, "final").await
            {
                warn!(error = %e, "final screenshot failed");
            }
        }

        ctx.replay_stats.extension_stats = extensions.collect_stats();
        ctx.replay_stats.finalize();

        if !keep_open {
            if let Err(e) = driver.close().await {
                warn!(error = %e, "browser close failed");
            }
        }

        let stats = ctx.replay_stats;
        info!(
            domain = %stats.domain,
            filled = stats.filled_fields(),
            total = stats.total_fields,
            submitted = stats.submission.success,
            "replay finished"
        );
        self.report(
            ProgressStatus::Completed,
            format!("{}/{} fields", stats.successful_fields, stats.total_fields),
            1.0,
        );
        Ok((stats, driver))
    }

    async fn fill_fields(
        &self,
        mappings: &[FieldMapping],
        extensions: &mut ExtensionManager,
        ctx: &mut ReplayContext,
        cancel: &CancelFlag,
    ) {
        let total = mappings.len().max(1) as f32;

        for (index, mapping) in mappings.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(remaining = mappings.len() - index, "replay cancelled");
                ctx.replay_stats.cancelled = true;
                break;
            }

            let step = StepData::new(mapping.clone(), index);
            extensions.before_each_step(&step, ctx).await;

            if extensions.should_skip_step(&step, ctx).await {
                let result = FieldResult::skipped(mapping);
                extensions.after_each_step(&step, &result, ctx).await;
                ctx.replay_stats.record(result);
                continue;
            }

            let step = extensions.transform_step(step, ctx).await;
            let result = self.fill_step(&step, ctx).await;
            extensions.after_each_step(&step, &result, ctx).await;

            let failure = (!result.success).then(|| result.error.clone().unwrap_or_default());
            ctx.replay_stats.record(result);

            self.report(
                ProgressStatus::Filling,
                mapping.display_name().to_string(),
                (index + 1) as f32 / total,
            );

            if let Some(error) = failure {
                if extensions.on_error(&step, &error, ctx).await == ErrorAction::Stop {
                    warn!(field = mapping.display_name(), "stopping after field failure");
                    ctx.replay_stats.halted = true;
                    break;
                }
            }

            if index + 1 < mappings.len() {
                pause(self.config.replay.field_delay_ms).await;
            }
        }
    }

    async fn fill_step(&self, step: &StepData, ctx: &ReplayContext) -> FieldResult {
        let started = Instant::now();
        let mapping = &step.mapping;
        let mut result = FieldResult::for_mapping(mapping);

        let resolved = match (&step.value_to_use, step.value_source) {
            (Some(value), source) => Some((value.clone(), source)),
            (None, _) => fallback_value(mapping, &ctx.profile).map(|(v, s)| (v, Some(s))),
        };
        let Some((value, source)) = resolved else {
            result.error = Some("no value available".to_string());
            return result;
        };
        result.value_source = source;

        let driver = ctx.driver.as_ref();
        let (strategy, live_input_type) = resolve_strategy(driver, mapping).await;
        result.strategy = Some(strategy);

        let filler = FieldFiller::new(driver, &self.config.replay);
        match filler.fill(mapping, strategy, live_input_type.as_deref(), &value).await {
            Ok(FillOutcome::Filled) => {
                result.success = true;
                result.value_used = value;
            }
            Ok(FillOutcome::Skipped(reason)) => {
                debug!(field = mapping.display_name(), reason = %reason, "field left as is");
                result.success = true;
                result.skipped = true;
            }
            Err(e) => {
                result.value_used = value;
                result.error = Some(e.to_string());
            }
        }
        result.execution_time_ms = started.elapsed().as_millis() as u64;
        result
    }

    async fn maybe_submit(&self, record: &DomainMappingRecord, ctx: &ReplayContext) -> Submission {
        let stats = &ctx.replay_stats;
        if !self.config.replay.submit || stats.halted || stats.cancelled {
            return Submission::default();
        }
        if stats.filled_fields() == 0 {
            return Submission {
                error_message: Some("no field was filled".to_string()),
                ..Submission::default()
            };
        }

        self.report(ProgressStatus::Submitting, "submitting form", 1.0);
        submit_form(
            ctx.driver.as_ref(),
            record.submit_selector(),
            self.config.replay.submission_wait_ms,
        )
        .await
    }
}

/// Profile value for the mapping's semantic field, else the recorded sample.
fn fallback_value(mapping: &FieldMapping, profile: &Profile) -> Option<(String, ValueSource)> {
    if let Some(value) = mapping.semantic_field.as_deref().and_then(|f| profile.get_loose(f)) {
        return Some((value.to_string(), ValueSource::Profile));
    }
    mapping
        .sample_value
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| (s.to_string(), ValueSource::Sample))
}

async fn pause(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
