use crate::browser::NavigationManager;
use crate::core::BrowserDriver;
use crate::recording::extractor::SUBMIT_VOCABULARY;
use crate::types::Submission;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

const EXPLICIT_SUBMIT_SELECTORS: &[&str] = &["button[type=submit]", "input[type=submit]"];

const CONVENTIONAL_SUBMIT_SELECTORS: &[&str] = &[
    "#submit",
    "#submit-button",
    "#register",
    "#signup",
    "button.submit",
    ".btn-submit",
    "[data-action=\"submit\"]",
    "[data-testid=\"submit-button\"]",
    "form button:last-of-type",
];

const SUCCESS_PHRASES: &[&str] = &[
    "thank you",
    "thanks for",
    "successfully",
    "account created",
    "registration complete",
    "confirm your email",
    "check your inbox",
    "almost done",
    "welcome",
];

const SUCCESS_URL_MARKERS: &[&str] = &["success", "thank", "confirm", "welcome", "complete", "dashboard"];

static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

/// Visible-ish text of a document, lower-cased and whitespace-collapsed.
pub fn page_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let text: Vec<&str> = match document.select(&BODY).next() {
        Some(body) => body.text().collect(),
        None => document.root_element().text().collect(),
    };
    text.join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Judges a submission from what the page looked like afterwards.
///
/// Indicators are independent and all firing ones are kept. A missing
/// status counts as 200 for the indicator but is recorded as unknown.
pub fn evaluate_submission(
    status: Option<u16>,
    page_text: &str,
    before_url: &str,
    after_url: &str,
) -> Submission {
    let mut indicators = Vec::new();

    let status_code = status.unwrap_or(200);
    if (200..300).contains(&status_code) {
        indicators.push(format!("http_status:{}", status_code));
    }

    let text = page_text.to_lowercase();
    if let Some(phrase) = SUCCESS_PHRASES.iter().find(|p| text.contains(*p)) {
        indicators.push(format!("success_text:{}", phrase));
    }

    let redirect_url = (after_url != before_url && !after_url.is_empty()).then(|| after_url.to_string());
    if let Some(url) = &redirect_url {
        let lowered = url.to_lowercase();
        if let Some(marker) = SUCCESS_URL_MARKERS.iter().find(|m| lowered.contains(*m)) {
            indicators.push(format!("redirect:{}", marker));
        }
    }

    Submission {
        attempted: true,
        success: !indicators.is_empty(),
        status_code: status,
        redirect_url,
        success_indicators: indicators,
        error_message: None,
        submit_selector: None,
    }
}

async fn present(driver: &dyn BrowserDriver, selector: &str) -> bool {
    driver.find_element(selector).await.unwrap_or(false) && driver.is_visible(selector).await.unwrap_or(false)
}

/// Finds the control that submits the form: the recorded one, explicit
/// submit inputs, buttons by wording, then common id/class names.
pub async fn locate_submit(driver: &dyn BrowserDriver, recorded: Option<&str>) -> Option<String> {
    if let Some(selector) = recorded {
        if present(driver, selector).await {
            return Some(selector.to_string());
        }
        debug!(selector, "recorded submit control not on page");
    }

    for selector in EXPLICIT_SUBMIT_SELECTORS {
        if present(driver, selector).await {
            return Some(selector.to_string());
        }
    }

    match driver.find_clickable_by_text(SUBMIT_VOCABULARY).await {
        Ok(Some(selector)) => return Some(selector),
        Ok(None) => {}
        Err(e) => debug!(error = %e, "text search for submit control failed"),
    }

    for selector in CONVENTIONAL_SUBMIT_SELECTORS {
        if present(driver, selector).await {
            return Some(selector.to_string());
        }
    }
    None
}

/// Clicks submit and reads the result. Problems end up in the returned
/// record, never as an error.
pub async fn submit_form(driver: &dyn BrowserDriver, recorded: Option<&str>, wait_ms: u64) -> Submission {
    let Some(selector) = locate_submit(driver, recorded).await else {
        warn!("no submit control found");
        return Submission {
            error_message: Some("no submit control found".to_string()),
            ..Submission::default()
        };
    };

    let before_url = driver.current_url().await.unwrap_or_default();
    if let Err(e) = driver.watch_mutations().await {
        debug!(error = %e, "mutation watch unavailable");
    }

    if let Err(e) = driver.click(&selector).await {
        warn!(selector = %selector, error = %e, "submit click failed");
        return Submission {
            attempted: true,
            error_message: Some(e.to_string()),
            submit_selector: Some(selector),
            ..Submission::default()
        };
    }

    match NavigationManager::wait_for_settle(driver, &before_url, wait_ms, 100).await {
        Ok(nav) => debug!(reason = %nav.reason, elapsed_ms = nav.duration_ms, "page settled after submit"),
        Err(e) => debug!(error = %e, "settle wait failed"),
    }

    let status = driver.response_status().await.unwrap_or(None);
    let html = driver.page_source().await.unwrap_or_default();
    let after_url = driver.current_url().await.unwrap_or_default();

    let mut submission = evaluate_submission(status, &page_text(&html), &before_url, &after_url);
    submission.submit_selector = Some(selector);
    if submission.success {
        info!(indicators = ?submission.success_indicators, "form submitted");
    } else {
        submission.error_message = Some("no success indicator after submit".to_string());
        warn!(status = ?submission.status_code, "submission not confirmed");
    }
    submission
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ClickEffect, MockDriver, MockElement};

    #[test]
    fn test_needs_at_least_one_indicator() {
        let failed = evaluate_submission(Some(404), "", "https://ex.test/join", "https://ex.test/join");
        assert!(failed.attempted);
        assert!(!failed.success);
        assert!(failed.success_indicators.is_empty());

        let ok = evaluate_submission(Some(200), "", "https://ex.test/join", "https://ex.test/join");
        assert!(ok.success);
        assert_eq!(ok.success_indicators, vec!["http_status:200".to_string()]);

        let unknown = evaluate_submission(None, "", "a", "a");
        assert!(unknown.success);
        assert_eq!(unknown.success_indicators, vec!["http_status:200".to_string()]);
        assert_eq!(unknown.status_code, None);
    }

    #[test]
    fn test_text_and_redirect_indicators_stack() {
        let result = evaluate_submission(
            Some(500),
            "Thank you for registering!",
            "https://ex.test/join",
            "https://ex.test/welcome",
        );
        assert!(result.success);
        assert_eq!(result.redirect_url.as_deref(), Some("https://ex.test/welcome"));
        assert_eq!(
            result.success_indicators,
            vec!["success_text:thank you".to_string(), "redirect:welcome".to_string()]
        );

        let elsewhere = evaluate_submission(Some(404), "page not found", "https://ex.test/a", "https://ex.test/b");
        assert!(!elsewhere.success);
        assert!(elsewhere.redirect_url.is_some());
    }

    #[test]
    fn test_page_text_collapses_markup() {
        let text = page_text("<html><body><h1>Thank\n  You</h1><p>for <b>joining</b></p></body></html>");
        assert_eq!(text, "thank you for joining");
    }

    #[tokio::test]
    async fn test_locate_prefers_recorded_then_explicit_then_wording() {
        let driver = MockDriver::new("https://ex.test")
            .with_element("#go", MockElement::button("Create account"))
            .with_element("button[type=submit]", MockElement::button("Go"));
        assert_eq!(locate_submit(&driver, Some("#go")).await.as_deref(), Some("#go"));
        assert_eq!(locate_submit(&driver, Some("#gone")).await.as_deref(), Some("button[type=submit]"));

        let worded = MockDriver::new("https://ex.test").with_element("#go", MockElement::button("Create account"));
        assert_eq!(locate_submit(&worded, None).await.as_deref(), Some("#go"));

        let conventional = MockDriver::new("https://ex.test").with_element("#signup", MockElement::input("image"));
        assert_eq!(locate_submit(&conventional, None).await.as_deref(), Some("#signup"));
    }

    #[tokio::test]
    async fn test_submit_reads_the_resulting_page() {
        let driver = MockDriver::new("https://ex.test/join")
            .with_element("button[type=submit]", MockElement::button("Join"))
            .on_click(
                "button[type=submit]",
                ClickEffect {
                    url: Some("https://ex.test/join".to_string()),
                    page_text: Some("Please fix the errors below".to_string()),
                    status: Some(422),
                },
            );
        let submission = submit_form(&driver, None, 50).await;
        assert!(submission.attempted);
        assert!(!submission.success);
        assert_eq!(submission.status_code, Some(422));
        assert_eq!(submission.submit_selector.as_deref(), Some("button[type=submit]"));
        assert!(submission.error_message.is_some());
    }

    #[tokio::test]
    async fn test_missing_control_is_reported_not_raised() {
        let driver = MockDriver::new("https://ex.test/join");
        let submission = submit_form(&driver, None, 0).await;
        assert!(!submission.attempted);
        assert!(!submission.success);
        assert_eq!(submission.error_message.as_deref(), Some("no submit control found"));
    }
}
