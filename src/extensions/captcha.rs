use crate::core::BrowserDriver;
use crate::errors::Result;
use crate::extensions::base::{ReplayContext, ReplayExtension};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptchaKind {
    ReCaptcha,
    HCaptcha,
    Turnstile,
    Generic,
}

impl fmt::Display for CaptchaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptchaKind::ReCaptcha => "reCAPTCHA",
            CaptchaKind::HCaptcha => "hCaptcha",
            CaptchaKind::Turnstile => "Turnstile",
            CaptchaKind::Generic => "generic captcha",
        };
        f.write_str(name)
    }
}

static MARKERS: LazyLock<Vec<(Selector, CaptchaKind)>> = LazyLock::new(|| {
    [
        ("iframe[src*='recaptcha']", CaptchaKind::ReCaptcha),
        (".g-recaptcha", CaptchaKind::ReCaptcha),
        ("#recaptcha", CaptchaKind::ReCaptcha),
        ("iframe[src*='hcaptcha']", CaptchaKind::HCaptcha),
        (".h-captcha", CaptchaKind::HCaptcha),
        ("iframe[src*='challenges.cloudflare.com']", CaptchaKind::Turnstile),
        (".cf-turnstile", CaptchaKind::Turnstile),
        (".captcha-container", CaptchaKind::Generic),
    ]
    .into_iter()
    .filter_map(|(css, kind)| Selector::parse(css).ok().map(|s| (s, kind)))
    .collect()
});

/// First captcha widget found in `html`.
pub fn detect_captcha(html: &str) -> Option<CaptchaKind> {
    let document = Html::parse_document(html);
    MARKERS
        .iter()
        .find(|(selector, _)| document.select(selector).next().is_some())
        .map(|(_, kind)| *kind)
}

async fn captcha_on_page(driver: &dyn BrowserDriver) -> Option<CaptchaKind> {
    match driver.page_source().await {
        Ok(html) => detect_captcha(&html),
        Err(e) => {
            warn!(error = %e, "could not read page for captcha check");
            None
        }
    }
}

/// Gets a detected challenge out of the way. `Ok(true)` once the widget
/// no longer blocks the form.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    async fn solve(&self, kind: CaptchaKind, driver: &dyn BrowserDriver, max_wait: Duration) -> Result<bool>;
}

/// Leaves the challenge to a human at the keyboard and waits for the
/// widget to go away.
pub struct ManualSolver {
    poll_interval: Duration,
}

impl ManualSolver {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl Default for ManualSolver {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl CaptchaSolver for ManualSolver {
    async fn solve(&self, kind: CaptchaKind, driver: &dyn BrowserDriver, max_wait: Duration) -> Result<bool> {
        info!(captcha = %kind, wait_secs = max_wait.as_secs(), "waiting for captcha to be solved by hand");
        let start = Instant::now();
        loop {
            if captcha_on_page(driver).await.is_none() {
                return Ok(true);
            }
            if start.elapsed() >= max_wait {
                return Ok(false);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
struct CaptchaStats {
    captchas_detected: usize,
    captchas_solved: usize,
    captchas_failed: usize,
    captcha_types: Vec<CaptchaKind>,
    solve_times_ms: Vec<u64>,
}

/// Checks for a captcha once every field is filled, before submission.
pub struct CaptchaExtension {
    solver: Arc<dyn CaptchaSolver>,
    auto_solve: bool,
    max_wait: Duration,
    stats: CaptchaStats,
}

impl CaptchaExtension {
    pub fn new(solver: Arc<dyn CaptchaSolver>, auto_solve: bool, max_wait: Duration) -> Self {
        Self {
            solver,
            auto_solve,
            max_wait,
            stats: CaptchaStats::default(),
        }
    }
}

#[async_trait]
impl ReplayExtension for CaptchaExtension {
    fn name(&self) -> &str {
        "captcha"
    }

    async fn after_all_steps(&mut self, ctx: &mut ReplayContext) -> Result<()> {
        let Some(kind) = captcha_on_page(ctx.driver.as_ref()).await else {
            return Ok(());
        };
        info!(captcha = %kind, "captcha detected");
        self.stats.captchas_detected += 1;
        self.stats.captcha_types.push(kind);

        if !self.auto_solve {
            return Ok(());
        }

        let start = Instant::now();
        let solved = self
            .solver
            .solve(kind, ctx.driver.as_ref(), self.max_wait)
            .await?;
        self.stats.solve_times_ms.push(start.elapsed().as_millis() as u64);
        if solved {
            self.stats.captchas_solved += 1;
        } else {
            self.stats.captchas_failed += 1;
            warn!(captcha = %kind, "captcha still present");
        }
        ctx.custom_data.insert("captcha_solved".to_string(), Value::Bool(solved));
        Ok(())
    }

    fn stats(&self) -> Value {
        serde_json::to_value(&self.stats).unwrap_or(Value::Null)
    }
}
