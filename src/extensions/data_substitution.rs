use crate::extensions::base::{ErrorAction, ReplayContext, ReplayExtension, StepData};
use crate::replay::Profile;
use crate::types::{FieldMapping, FieldResult, ValueSource};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Other keys a profile may store a field under.
const FIELD_ALIASES: &[(&str, &[&str])] = &[
    ("firstName", &["first_name", "fname", "givenName", "first"]),
    ("lastName", &["last_name", "lname", "surname", "familyName", "last"]),
    ("name", &["fullName", "full_name"]),
    ("email", &["emailAddress", "email_address", "mail"]),
    ("phone", &["phoneNumber", "phone_number", "mobile", "telephone", "tel", "cell"]),
    ("address1", &["address", "street", "addressLine1", "address_line_1"]),
    ("address", &["address1", "street", "addressLine1"]),
    ("address2", &["addressLine2", "address_line_2", "apt", "suite"]),
    ("city", &["town", "suburb", "locality"]),
    ("state", &["province", "region"]),
    ("zip", &["zipCode", "zip_code", "postalCode", "postal_code", "postcode"]),
    ("company", &["companyName", "organization"]),
    ("jobTitle", &["title", "position"]),
    ("username", &["userName", "login"]),
    ("dateOfBirth", &["dob", "birthDate", "birthday"]),
];

const DEFAULT_VALUES: &[(&str, &str)] = &[
    ("firstName", "John"),
    ("lastName", "Doe"),
    ("email", "john.doe@example.com"),
    ("phone", "(555) 123-4567"),
    ("company", "Example Corp"),
    ("address1", "123 Main St"),
    ("address2", "Suite 100"),
    ("city", "New York"),
    ("state", "NY"),
    ("zip", "10001"),
    ("country", "USA"),
    ("website", "https://example.com"),
    ("jobTitle", "Software Engineer"),
];

#[derive(Debug, Clone, Default, Serialize)]
pub struct SubstitutionStats {
    pub fields_processed: usize,
    pub profile_values_used: usize,
    pub sample_values_used: usize,
    pub default_values_used: usize,
    pub validation_failures: usize,
    pub skipped_no_value: usize,
    pub fields_succeeded: usize,
    pub fields_failed: usize,
}

/// Decides the value typed into every field.
///
/// Profile (with aliases) first, then the recorded sample, then a small
/// table of defaults. Phone, zip and SSN values are reformatted when their
/// digit count matches a known shape. Validation only logs.
pub struct DataSubstitutionExtension {
    preview_mode: bool,
    continue_on_error: bool,
    stats: SubstitutionStats,
    sources: BTreeMap<String, ValueSource>,
}

impl DataSubstitutionExtension {
    pub fn new() -> Self {
        Self {
            preview_mode: false,
            continue_on_error: true,
            stats: SubstitutionStats::default(),
            sources: BTreeMap::new(),
        }
    }

    /// Replays the recorded sample values instead of profile data.
    pub fn preview(mut self, preview_mode: bool) -> Self {
        self.preview_mode = preview_mode;
        self
    }

    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn substitution_stats(&self) -> &SubstitutionStats {
        &self.stats
    }

    /// Where the value last used for `selector` came from.
    pub fn value_source(&self, selector: &str) -> Option<ValueSource> {
        self.sources.get(selector).copied()
    }

    /// Value and its origin for one mapping, before formatting.
    pub fn resolve(&self, mapping: &FieldMapping, profile: &Profile) -> Option<(String, ValueSource)> {
        let sample = mapping
            .sample_value
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| (s.to_string(), ValueSource::Sample));

        if self.preview_mode {
            return sample;
        }

        if let Some(value) = profile_value(mapping, profile) {
            return Some((value.to_string(), ValueSource::Profile));
        }
        if sample.is_some() {
            return sample;
        }

        let field = mapping.semantic_field.as_deref()?;
        if mapping.input_type == "checkbox" {
            return Some(("true".to_string(), ValueSource::Default));
        }
        DEFAULT_VALUES
            .iter()
            .find(|(key, _)| *key == field)
            .map(|(_, value)| (value.to_string(), ValueSource::Default))
    }
}

impl Default for DataSubstitutionExtension {
    fn default() -> Self {
        Self::new()
    }
}

fn profile_value<'a>(mapping: &FieldMapping, profile: &'a Profile) -> Option<&'a str> {
    if let Some(field) = mapping.semantic_field.as_deref() {
        if let Some(value) = profile.get_loose(field) {
            return Some(value);
        }
        let aliases = FIELD_ALIASES
            .iter()
            .find(|(key, _)| *key == field)
            .map(|(_, aliases)| *aliases)
            .unwrap_or(&[]);
        if let Some(value) = aliases.iter().find_map(|alias| profile.get_loose(alias)) {
            return Some(value);
        }
    }
    if !mapping.field_name.is_empty() {
        return profile.get_loose(&mapping.field_name);
    }
    None
}

/// Reformats phone, zip and SSN values whose digit count fits.
pub fn format_value(field: &str, value: &str) -> String {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    match field {
        "phone" if digits.len() == 10 => {
            format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..])
        }
        "phone" if digits.len() == 11 && digits.starts_with('1') => {
            format!("+1 ({}) {}-{}", &digits[1..4], &digits[4..7], &digits[7..])
        }
        "zip" if digits.len() == 5 => digits,
        "zip" if digits.len() == 9 => format!("{}-{}", &digits[..5], &digits[5..]),
        "ssn" if digits.len() == 9 => {
            format!("{}-{}-{}", &digits[..3], &digits[3..5], &digits[5..])
        }
        _ => value.to_string(),
    }
}

/// Shape check for values whose field has an obvious shape.
pub fn validate_value(field: &str, value: &str) -> bool {
    match field {
        "email" => value.contains('@') && value.contains('.'),
        "phone" => value.chars().filter(|c| c.is_ascii_digit()).count() >= 10,
        "website" | "url" => value.contains("://") || value.contains('.'),
        _ => true,
    }
}

#[async_trait]
impl ReplayExtension for DataSubstitutionExtension {
    fn name(&self) -> &str {
        "data_substitution"
    }

    async fn should_skip_step(&mut self, step: &StepData, ctx: &ReplayContext) -> bool {
        if self.resolve(&step.mapping, &ctx.profile).is_some() {
            return false;
        }
        debug!(field = step.mapping.display_name(), "no value available, skipping");
        self.stats.skipped_no_value += 1;
        true
    }

    async fn transform_step(&mut self, step: StepData, ctx: &ReplayContext) -> StepData {
        self.stats.fields_processed += 1;

        let Some((value, source)) = self.resolve(&step.mapping, &ctx.profile) else {
            return step;
        };

        match source {
            ValueSource::Profile => self.stats.profile_values_used += 1,
            ValueSource::Sample => self.stats.sample_values_used += 1,
            ValueSource::Default => self.stats.default_values_used += 1,
        }

        let field = step.mapping.semantic_field.clone().unwrap_or_default();
        let value = format_value(&field, &value);
        if !validate_value(&field, &value) {
            self.stats.validation_failures += 1;
            warn!(field = %field, "value failed shape validation, using it anyway");
        }

        self.sources.insert(step.mapping.selector.clone(), source);
        step.with_value(value, source)
    }

    async fn after_each_step(
        &mut self,
        _step: &StepData,
        result: &FieldResult,
        _ctx: &ReplayContext,
    ) -> crate::errors::Result<()> {
        if result.skipped {
            return Ok(());
        }
        if result.success {
            self.stats.fields_succeeded += 1;
        } else {
            self.stats.fields_failed += 1;
        }
        Ok(())
    }

    async fn on_error(&mut self, step: &StepData, error: &str, _ctx: &ReplayContext) -> ErrorAction {
        warn!(field = step.mapping.display_name(), error, "field failed");
        if self.continue_on_error {
            ErrorAction::Continue
        } else {
            ErrorAction::Stop
        }
    }

    fn stats(&self) -> Value {
        serde_json::to_value(&self.stats).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDriver;
    use crate::types::ReplayStats;
    use serde_json::json;
    use std::sync::Arc;

    fn context(profile: Value) -> ReplayContext {
        ReplayContext::new(
            Profile::from_value(&profile),
            ReplayStats::new("s", "ex.test", "https://ex.test"),
            Arc::new(MockDriver::new("https://ex.test")),
        )
    }

    #[tokio::test]
    async fn test_profile_then_sample_then_default() {
        let ctx = context(json!({ "data": { "first_name": "Jane" } }));
        let mut ext = DataSubstitutionExtension::new();

        let first = StepData::new(FieldMapping::new("#f", Some("firstName")).with_sample("John"), 0);
        let out = ext.transform_step(first, &ctx).await;
        assert_eq!(out.value_to_use.as_deref(), Some("Jane"));
        assert_eq!(out.value_source, Some(ValueSource::Profile));

        let email = StepData::new(FieldMapping::new("#e", Some("email")).with_sample("a@b.com"), 1);
        let out = ext.transform_step(email, &ctx).await;
        assert_eq!(out.value_source, Some(ValueSource::Sample));

        let city = StepData::new(FieldMapping::new("#c", Some("city")), 2);
        let out = ext.transform_step(city, &ctx).await;
        assert_eq!(out.value_to_use.as_deref(), Some("New York"));
        assert_eq!(out.value_source, Some(ValueSource::Default));
        assert_eq!(ext.value_source("#f"), Some(ValueSource::Profile));

        let stats = ext.substitution_stats();
        assert_eq!(stats.fields_processed, 3);
        assert_eq!(stats.profile_values_used, 1);
        assert_eq!(stats.sample_values_used, 1);
        assert_eq!(stats.default_values_used, 1);
    }

    #[tokio::test]
    async fn test_preview_uses_samples() {
        let ctx = context(json!({ "firstName": "Jane" }));
        let mut ext = DataSubstitutionExtension::new().preview(true);
        let step = StepData::new(FieldMapping::new("#f", Some("firstName")).with_sample("John"), 0);
        let out = ext.transform_step(step, &ctx).await;
        assert_eq!(out.value_to_use.as_deref(), Some("John"));
    }

    #[tokio::test]
    async fn test_skips_fields_without_any_value() {
        let ctx = context(json!({}));
        let mut ext = DataSubstitutionExtension::new();
        let step = StepData::new(FieldMapping::new("#q", None), 0);
        assert!(ext.should_skip_step(&step, &ctx).await);

        let step = StepData::new(FieldMapping::new("#q", None).with_sample("blue"), 0);
        assert!(!ext.should_skip_step(&step, &ctx).await);
    }

    #[tokio::test]
    async fn test_phone_is_formatted_and_validated() {
        let ctx = context(json!({ "phoneNumber": "555.123.4567" }));
        let mut ext = DataSubstitutionExtension::new();
        let step = StepData::new(FieldMapping::new("#p", Some("phone")), 0);
        let out = ext.transform_step(step, &ctx).await;
        assert_eq!(out.value_to_use.as_deref(), Some("(555) 123-4567"));
        assert_eq!(ext.substitution_stats().validation_failures, 0);
    }

    #[test]
    fn test_formatters_only_apply_to_known_shapes() {
        assert_eq!(format_value("phone", "15551234567"), "+1 (555) 123-4567");
        assert_eq!(format_value("phone", "12345"), "12345");
        assert_eq!(format_value("zip", "123456789"), "12345-6789");
        assert_eq!(format_value("ssn", "123 45 6789"), "123-45-6789");
        assert_eq!(format_value("city", "12345"), "12345");
    }

    #[test]
    fn test_validation_shapes() {
        assert!(validate_value("email", "a@b.com"));
        assert!(!validate_value("email", "nope"));
        assert!(!validate_value("phone", "555-1234"));
        assert!(validate_value("website", "example.com"));
        assert!(validate_value("firstName", ""));
    }
}
