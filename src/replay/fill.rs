use crate::core::{BrowserDriver, ReplayConfig};
use crate::errors::{ReplayError, Result};
use crate::recording::classifier::classify_element;
use crate::recording::selector::alternate_selectors;
use crate::replay::dates::{self, DateFormat};
use crate::types::{FieldMapping, FillStrategy};
use std::time::Duration;
use tracing::debug;

const TRUTHY: &[&str] = &["true", "yes", "y", "on", "1", "checked", "agree", "accept", "x"];

pub fn is_truthy(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    TRUTHY.contains(&value.as_str())
}

/// What a fill routine did with a field that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillOutcome {
    Filled,
    /// Nothing to do on this page (e.g. no matching option); not a failure.
    Skipped(String),
}

/// Strategy for a field, checked against the element as it is now.
///
/// Live selects, checkboxes and radios always win since recorders blur
/// them together. A recorded refinement (char-by-char, date, custom
/// dropdown, password) is kept over a live plain-text verdict.
pub async fn resolve_strategy(driver: &dyn BrowserDriver, mapping: &FieldMapping) -> (FillStrategy, Option<String>) {
    let live = match driver.describe_element(&mapping.selector).await {
        Ok(Some(info)) => Some(classify_element(&info)),
        Ok(None) => None,
        Err(e) => {
            debug!(selector = %mapping.selector, error = %e, "live inspection failed");
            None
        }
    };

    let recorded = mapping.fill_strategy.or(match mapping.input_type.as_str() {
        "select" => Some(FillStrategy::DropdownSelect),
        "checkbox" => Some(FillStrategy::CheckboxClick),
        "radio" => Some(FillStrategy::RadioClick),
        _ => None,
    });

    match live {
        Some(decision) => {
            let type_bound = matches!(
                decision.fill_strategy,
                FillStrategy::DropdownSelect | FillStrategy::CheckboxClick | FillStrategy::RadioClick
            );
            let refinement = matches!(
                recorded,
                Some(
                    FillStrategy::CharByChar
                        | FillStrategy::JsDateInput
                        | FillStrategy::CustomDropdown
                        | FillStrategy::PasswordType
                )
            );
            let strategy = match recorded {
                Some(recorded) if !type_bound && refinement && decision.fill_strategy == FillStrategy::DirectType => {
                    recorded
                }
                _ => decision.fill_strategy,
            };
            (strategy, Some(decision.input_type))
        }
        None => (recorded.unwrap_or_default(), None),
    }
}

/// Element-type-specific fill routines over a [`BrowserDriver`].
pub struct FieldFiller<'a> {
    driver: &'a dyn BrowserDriver,
    config: &'a ReplayConfig,
}

impl<'a> FieldFiller<'a> {
    pub fn new(driver: &'a dyn BrowserDriver, config: &'a ReplayConfig) -> Self {
        Self { driver, config }
    }

    pub async fn fill(
        &self,
        mapping: &FieldMapping,
        strategy: FillStrategy,
        live_input_type: Option<&str>,
        value: &str,
    ) -> Result<FillOutcome> {
        let selector = mapping.selector.as_str();
        let sample = mapping.sample_value.as_deref();
        match strategy {
            FillStrategy::DirectType | FillStrategy::PasswordType => {
                let value = match_sample_date(value, sample);
                self.fill_text(selector, &value).await
            }
            FillStrategy::CharByChar => {
                let value = match_sample_date(value, sample);
                self.driver
                    .type_char_by_char(selector, &value, self.config.char_delay_ms)
                    .await?;
                Ok(FillOutcome::Filled)
            }
            FillStrategy::DropdownSelect => self.fill_select(selector, value, sample).await,
            FillStrategy::CheckboxClick => self.fill_checkbox(selector, value).await,
            FillStrategy::RadioClick => {
                self.driver.click(selector).await?;
                Ok(FillOutcome::Filled)
            }
            FillStrategy::JsDateInput => self.fill_date(selector, value, sample, live_input_type).await,
            FillStrategy::CustomDropdown => self.fill_custom_dropdown(selector, value, sample).await,
        }
    }

    async fn type_into(&self, selector: &str, value: &str) -> Result<()> {
        self.driver.clear(selector).await?;
        self.driver.type_text(selector, value).await
    }

    /// Clear then type; when the recorded locator is stale, retry through
    /// selectors rebuilt from its id/name.
    async fn fill_text(&self, selector: &str, value: &str) -> Result<FillOutcome> {
        let first_error = match self.type_into(selector, value).await {
            Ok(()) => return Ok(FillOutcome::Filled),
            Err(e) => e,
        };

        for alternate in alternate_selectors(selector) {
            if !self.driver.find_element(&alternate).await.unwrap_or(false) {
                continue;
            }
            if self.type_into(&alternate, value).await.is_ok() {
                debug!(selector, alternate = %alternate, "filled through alternate selector");
                return Ok(FillOutcome::Filled);
            }
        }
        Err(first_error)
    }

    /// By value, then by visible text, then the same with the recorded
    /// sample. No match is a skip, never a failure.
    async fn fill_select(&self, selector: &str, value: &str, sample: Option<&str>) -> Result<FillOutcome> {
        let mut candidates = vec![value];
        if let Some(sample) = sample.filter(|s| !s.is_empty() && *s != value) {
            candidates.push(sample);
        }

        for candidate in candidates {
            if self.driver.select_by_value(selector, candidate).await? {
                return Ok(FillOutcome::Filled);
            }
            if self.driver.select_by_text(selector, candidate).await? {
                return Ok(FillOutcome::Filled);
            }
        }
        Ok(FillOutcome::Skipped(format!("no option matching '{}'", value)))
    }

    async fn fill_checkbox(&self, selector: &str, value: &str) -> Result<FillOutcome> {
        let wanted = is_truthy(value);
        if self.driver.is_checked(selector).await? != wanted {
            self.driver.click(selector).await?;
        }
        Ok(FillOutcome::Filled)
    }

    /// Native date inputs take ISO; anything else gets the layout the
    /// recording used.
    async fn fill_date(
        &self,
        selector: &str,
        value: &str,
        sample: Option<&str>,
        live_input_type: Option<&str>,
    ) -> Result<FillOutcome> {
        let formatted = match dates::parse_any(value) {
            Some((year, month, day)) if live_input_type == Some("date") => {
                DateFormat::ISO.format(year, month, day)
            }
            Some((year, month, day)) => dates::reconstruct(sample, year, month, day),
            None => value.to_string(),
        };

        if self.driver.set_value_scripted(selector, &formatted).await? {
            Ok(FillOutcome::Filled)
        } else {
            Err(ReplayError::ElementNotFound(selector.to_string()))
        }
    }

    async fn fill_custom_dropdown(&self, selector: &str, value: &str, sample: Option<&str>) -> Result<FillOutcome> {
        self.driver.click(selector).await?;
        if self.config.dropdown_open_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.dropdown_open_delay_ms)).await;
        }

        if self.driver.click_option_with_text(value).await? {
            return Ok(FillOutcome::Filled);
        }
        if let Some(sample) = sample.filter(|s| !s.is_empty() && *s != value) {
            if self.driver.click_option_with_text(sample).await? {
                return Ok(FillOutcome::Filled);
            }
        }
        Ok(FillOutcome::Skipped(format!("no menu entry matching '{}'", value)))
    }
}

/// Rewrites a date value into the layout of a date-shaped sample; other
/// values pass through.
pub fn match_sample_date(value: &str, sample: Option<&str>) -> String {
    let Some(format) = sample.and_then(DateFormat::detect) else {
        return value.to_string();
    };
    match dates::parse_any(value) {
        Some((year, month, day)) => format.format(year, month, day),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDriver, MockElement};

    fn config() -> ReplayConfig {
        ReplayConfig::immediate()
    }

    #[tokio::test]
    async fn test_live_select_overrides_recorded_text() {
        let driver = MockDriver::new("https://ex.test")
            .with_element("#country", MockElement::select(&[("us", "United States")]));
        let mapping = FieldMapping::new("#country", Some("country"));
        let (strategy, input_type) = resolve_strategy(&driver, &mapping).await;
        assert_eq!(strategy, FillStrategy::DropdownSelect);
        assert_eq!(input_type.as_deref(), Some("select"));
    }

    #[tokio::test]
    async fn test_recorded_refinement_survives_plain_input() {
        let driver = MockDriver::new("https://ex.test").with_element("#phone", MockElement::input("text"));
        let mapping = FieldMapping::new("#phone", Some("phone")).with_strategy(FillStrategy::CharByChar);
        assert_eq!(resolve_strategy(&driver, &mapping).await.0, FillStrategy::CharByChar);

        let stale = FieldMapping::new("#phone", Some("phone")).with_input_type("checkbox");
        assert_eq!(resolve_strategy(&driver, &stale).await.0, FillStrategy::DirectType);

        let gone = FieldMapping::new("#nope", None).with_input_type("select");
        assert_eq!(resolve_strategy(&driver, &gone).await.0, FillStrategy::DropdownSelect);
    }

    #[tokio::test]
    async fn test_select_falls_back_to_text_then_sample_then_skips() {
        let driver = MockDriver::new("https://ex.test")
            .with_element("#state", MockElement::select(&[("TX", "Texas"), ("CA", "California")]));
        let config = config();
        let filler = FieldFiller::new(&driver, &config);
        let mapping = FieldMapping::new("#state", Some("state")).with_sample("CA");

        let out = filler.fill(&mapping, FillStrategy::DropdownSelect, None, "texas").await.unwrap();
        assert_eq!(out, FillOutcome::Filled);
        assert_eq!(driver.value_of("#state").as_deref(), Some("TX"));

        let out = filler.fill(&mapping, FillStrategy::DropdownSelect, None, "Ontario").await.unwrap();
        assert_eq!(out, FillOutcome::Filled);
        assert_eq!(driver.value_of("#state").as_deref(), Some("CA"));

        let bare = FieldMapping::new("#state", Some("state"));
        let out = filler.fill(&bare, FillStrategy::DropdownSelect, None, "Ontario").await.unwrap();
        assert!(matches!(out, FillOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn test_checkbox_only_clicks_on_state_change() {
        let driver = MockDriver::new("https://ex.test")
            .with_element("#terms", MockElement::checkbox(false))
            .with_element("#news", MockElement::checkbox(true));
        let config = config();
        let filler = FieldFiller::new(&driver, &config);

        let terms = FieldMapping::new("#terms", None);
        filler.fill(&terms, FillStrategy::CheckboxClick, None, "Yes").await.unwrap();
        let news = FieldMapping::new("#news", None);
        filler.fill(&news, FillStrategy::CheckboxClick, None, "true").await.unwrap();

        assert_eq!(driver.checked("#terms"), Some(true));
        assert_eq!(driver.checked("#news"), Some(true));
        assert_eq!(driver.clicks(), vec!["#terms".to_string()]);
    }

    #[tokio::test]
    async fn test_text_retries_through_alternate_selectors() {
        let driver = MockDriver::new("https://ex.test")
            .with_element("[name=\"user_email\"]", MockElement::input("email"));
        let config = config();
        let filler = FieldFiller::new(&driver, &config);
        let mapping = FieldMapping::new("#user_email", Some("email"));

        let out = filler.fill(&mapping, FillStrategy::DirectType, None, "a@b.com").await.unwrap();
        assert_eq!(out, FillOutcome::Filled);
        assert_eq!(driver.value_of("[name=\"user_email\"]").as_deref(), Some("a@b.com"));

        let missing = FieldMapping::new("#ghost", None);
        let err = filler.fill(&missing, FillStrategy::DirectType, None, "x").await.unwrap_err();
        assert!(matches!(err, ReplayError::ElementNotFound(_)));
    }

    #[tokio::test]
    async fn test_dates_follow_the_recorded_layout() {
        let driver = MockDriver::new("https://ex.test")
            .with_element("#dob", MockElement::input("text"))
            .with_element("#native", MockElement::input("date"));
        let config = config();
        let filler = FieldFiller::new(&driver, &config);

        let text = FieldMapping::new("#dob", Some("dateOfBirth")).with_sample("12/25/1990");
        filler.fill(&text, FillStrategy::DirectType, Some("text"), "1999-12-05").await.unwrap();
        assert_eq!(driver.value_of("#dob").as_deref(), Some("12/05/1999"));

        let native = FieldMapping::new("#native", Some("dateOfBirth")).with_sample("12/25/1990");
        filler.fill(&native, FillStrategy::JsDateInput, Some("date"), "12/05/1999").await.unwrap();
        assert_eq!(driver.value_of("#native").as_deref(), Some("1999-12-05"));
    }

    #[tokio::test]
    async fn test_custom_dropdown_opens_then_picks() {
        let driver = MockDriver::new("https://ex.test")
            .with_element("#size", MockElement::custom_dropdown(&[("s", "Small"), ("m", "Medium")]));
        let config = config();
        let filler = FieldFiller::new(&driver, &config);
        let mapping = FieldMapping::new("#size", None);

        let out = filler.fill(&mapping, FillStrategy::CustomDropdown, None, "medium").await.unwrap();
        assert_eq!(out, FillOutcome::Filled);
        assert_eq!(driver.value_of("#size").as_deref(), Some("m"));

        let out = filler.fill(&mapping, FillStrategy::CustomDropdown, None, "Huge").await.unwrap();
        assert!(matches!(out, FillOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn test_char_by_char_types_one_key_at_a_time() {
        let driver = MockDriver::new("https://ex.test")
            .with_element("#phone", MockElement::input("tel").with_value("old"));
        let config = config();
        let filler = FieldFiller::new(&driver, &config);
        let mapping = FieldMapping::new("#phone", Some("phone")).with_sample("555-987-6543");

        let out = filler
            .fill(&mapping, FillStrategy::CharByChar, Some("tel"), "555-1234")
            .await
            .unwrap();
        assert_eq!(out, FillOutcome::Filled);
        assert_eq!(driver.value_of("#phone").as_deref(), Some("555-1234"));
        assert_eq!(
            driver.typed("#phone"),
            vec!["5", "5", "5", "-", "1", "2", "3", "4"]
        );
        assert_eq!(driver.clicks(), vec!["#phone".to_string()]);
    }

    #[tokio::test]
    async fn test_radio_is_always_clicked() {
        let driver = MockDriver::new("https://ex.test")
            .with_element("#plan-pro", MockElement::radio())
            .with_element(
                "#plan-free",
                MockElement {
                    checked: true,
                    ..MockElement::radio()
                },
            );
        let config = config();
        let filler = FieldFiller::new(&driver, &config);

        for selector in ["#plan-pro", "#plan-free"] {
            let mapping = FieldMapping::new(selector, None);
            let out = filler.fill(&mapping, FillStrategy::RadioClick, Some("radio"), "on").await.unwrap();
            assert_eq!(out, FillOutcome::Filled);
        }

        assert_eq!(driver.clicks(), vec!["#plan-pro".to_string(), "#plan-free".to_string()]);
        assert_eq!(driver.checked("#plan-pro"), Some(true));
        assert_eq!(driver.checked("#plan-free"), Some(true));
    }

    #[test]
    fn test_truthy_tokens() {
        assert!(is_truthy(" YES "));
        assert!(is_truthy("1"));
        assert!(!is_truthy("false"));
        assert!(!is_truthy(""));
    }

    #[test]
    fn test_non_dates_pass_through() {
        assert_eq!(match_sample_date("555-123-4567", Some("555-987-6543")), "555-123-4567");
        assert_eq!(match_sample_date("Jane", Some("12/25/1990")), "Jane");
        assert_eq!(match_sample_date("1999-12-05", None), "1999-12-05");
    }
}
