use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Element-type-specific algorithm used to set a form element's value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStrategy {
    #[default]
    DirectType,
    DropdownSelect,
    CheckboxClick,
    RadioClick,
    JsDateInput,
    CharByChar,
    CustomDropdown,
    PasswordType,
}

impl FillStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FillStrategy::DirectType => "direct_type",
            FillStrategy::DropdownSelect => "dropdown_select",
            FillStrategy::CheckboxClick => "checkbox_click",
            FillStrategy::RadioClick => "radio_click",
            FillStrategy::JsDateInput => "js_date_input",
            FillStrategy::CharByChar => "char_by_char",
            FillStrategy::CustomDropdown => "custom_dropdown",
            FillStrategy::PasswordType => "password_type",
        }
    }
}

impl fmt::Display for FillStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Navigate,
    Change,
    Click,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssertedEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// One captured browser interaction. Input only, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedStep {
    #[serde(rename = "type")]
    pub step_type: StepType,
    #[serde(default, deserialize_with = "deserialize_selector_groups")]
    pub selectors: Vec<Vec<String>>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "assertedEvents")]
    pub asserted_events: Vec<AssertedEvent>,
}

impl RecordedStep {
    pub fn navigate(url: &str) -> Self {
        Self {
            step_type: StepType::Navigate,
            selectors: Vec::new(),
            value: None,
            url: Some(url.to_string()),
            asserted_events: Vec::new(),
        }
    }

    pub fn change(selectors: &[&[&str]], value: &str) -> Self {
        Self {
            step_type: StepType::Change,
            selectors: to_groups(selectors),
            value: Some(value.to_string()),
            url: None,
            asserted_events: Vec::new(),
        }
    }

    pub fn click(selectors: &[&[&str]]) -> Self {
        Self {
            step_type: StepType::Click,
            selectors: to_groups(selectors),
            value: None,
            url: None,
            asserted_events: Vec::new(),
        }
    }

    /// Every candidate selector across all groups, in recorded order.
    pub fn all_selectors(&self) -> impl Iterator<Item = &str> {
        self.selectors.iter().flatten().map(|s| s.as_str())
    }
}

fn to_groups(selectors: &[&[&str]]) -> Vec<Vec<String>> {
    selectors
        .iter()
        .map(|group| group.iter().map(|s| s.to_string()).collect())
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SelectorGroup {
    Many(Vec<String>),
    One(String),
}

// Recorders emit either [["#a", "xpath/..."]] or ["#a", "xpath/..."].
fn deserialize_selector_groups<'de, D>(deserializer: D) -> Result<Vec<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let groups: Option<Vec<SelectorGroup>> = Option::deserialize(deserializer)?;
    Ok(groups
        .unwrap_or_default()
        .into_iter()
        .map(|group| match group {
            SelectorGroup::Many(list) => list,
            SelectorGroup::One(single) => vec![single],
        })
        .filter(|group| !group.is_empty())
        .collect())
}

/// A whole recorder export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub steps: Vec<RecordedStep>,
}

impl Recording {
    pub fn from_json(json: &str) -> crate::errors::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| crate::errors::ExtractionError::Malformed(e.to_string()).into())
    }
}

fn default_input_type() -> String {
    "text".to_string()
}

/// Association between a page element and the profile attribute it takes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub selector: String,
    #[serde(default)]
    pub field_name: String,
    #[serde(default)]
    pub semantic_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_strategy: Option<FillStrategy>,
    #[serde(default = "default_input_type")]
    pub input_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_config: Option<Value>,
    #[serde(default)]
    pub sample_value: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl FieldMapping {
    pub fn new(selector: impl Into<String>, semantic_field: Option<&str>) -> Self {
        Self {
            selector: selector.into(),
            field_name: String::new(),
            semantic_field: semantic_field.map(|f| f.to_string()),
            fill_strategy: None,
            input_type: default_input_type(),
            fill_config: None,
            sample_value: None,
            confidence: None,
        }
    }

    pub fn with_sample(mut self, sample: &str) -> Self {
        self.sample_value = Some(sample.to_string());
        self
    }

    pub fn with_strategy(mut self, strategy: FillStrategy) -> Self {
        self.fill_strategy = Some(strategy);
        self
    }

    pub fn with_input_type(mut self, input_type: &str) -> Self {
        self.input_type = input_type.to_string();
        self
    }

    /// Strategy to use when nothing better is known.
    pub fn strategy(&self) -> FillStrategy {
        self.fill_strategy.unwrap_or_default()
    }

    pub fn display_name(&self) -> &str {
        if !self.field_name.is_empty() {
            &self.field_name
        } else if let Some(field) = &self.semantic_field {
            field
        } else {
            &self.selector
        }
    }
}

/// Everything learned about one site, keyed by bare domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainMappingRecord {
    pub domain: String,
    pub url: String,
    pub mappings: Vec<FieldMapping>,
    pub is_enhanced: bool,
    #[serde(default)]
    pub fill_config: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DomainMappingRecord {
    pub fn fields_count(&self) -> usize {
        self.mappings.len()
    }

    pub fn submit_selector(&self) -> Option<&str> {
        self.metadata_str("submit_selector")
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.fill_config
            .as_ref()
            .and_then(|config| config.get(key))
            .and_then(|v| v.as_str())
    }
}

/// Where the value typed into a field came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    Profile,
    Sample,
    Default,
}

/// Outcome of one field in one replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldResult {
    pub field_name: String,
    pub selector: String,
    pub semantic_field: Option<String>,
    pub value_used: String,
    pub value_source: Option<ValueSource>,
    pub strategy: Option<FillStrategy>,
    pub success: bool,
    pub error: Option<String>,
    pub execution_time_ms: u64,
    pub skipped: bool,
}

impl FieldResult {
    pub fn for_mapping(mapping: &FieldMapping) -> Self {
        Self {
            field_name: mapping.display_name().to_string(),
            selector: mapping.selector.clone(),
            semantic_field: mapping.semantic_field.clone(),
            value_used: String::new(),
            value_source: None,
            strategy: None,
            success: false,
            error: None,
            execution_time_ms: 0,
            skipped: false,
        }
    }

    pub fn skipped(mapping: &FieldMapping) -> Self {
        Self {
            success: true,
            skipped: true,
            ..Self::for_mapping(mapping)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub attempted: bool,
    pub success: bool,
    pub status_code: Option<u16>,
    pub redirect_url: Option<String>,
    pub success_indicators: Vec<String>,
    pub error_message: Option<String>,
    pub submit_selector: Option<String>,
}

/// Aggregate result of one replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayStats {
    pub session_name: String,
    pub domain: String,
    pub url: String,
    pub profile_name: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_fields: usize,
    pub successful_fields: usize,
    pub failed_fields: usize,
    pub skipped_fields: usize,
    pub errors: Vec<String>,
    pub field_results: Vec<FieldResult>,
    pub submission: Submission,
    pub cancelled: bool,
    pub halted: bool,
    pub extension_stats: BTreeMap<String, Value>,
}

impl ReplayStats {
    pub fn new(session_name: &str, domain: &str, url: &str) -> Self {
        Self {
            session_name: session_name.to_string(),
            domain: domain.to_string(),
            url: url.to_string(),
            profile_name: None,
            start_time: Utc::now(),
            end_time: None,
            total_fields: 0,
            successful_fields: 0,
            failed_fields: 0,
            skipped_fields: 0,
            errors: Vec::new(),
            field_results: Vec::new(),
            submission: Submission::default(),
            cancelled: false,
            halted: false,
            extension_stats: BTreeMap::new(),
        }
    }

    /// Append a field outcome; counters always move together with the list.
    pub fn record(&mut self, result: FieldResult) {
        self.total_fields += 1;
        if result.success {
            self.successful_fields += 1;
            if result.skipped {
                self.skipped_fields += 1;
            }
        } else {
            self.failed_fields += 1;
            if let Some(error) = &result.error {
                self.errors.push(format!("{}: {}", result.field_name, error));
            }
        }
        self.field_results.push(result);
    }

    pub fn finalize(&mut self) {
        if self.end_time.is_none() {
            self.end_time = Some(Utc::now());
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_fields == 0 {
            return 0.0;
        }
        self.successful_fields as f64 / self.total_fields as f64 * 100.0
    }

    pub fn filled_fields(&self) -> usize {
        self.successful_fields - self.skipped_fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_groups_accept_bare_strings() {
        let json = r##"{"type":"change","selectors":[["#email","xpath///*[@id=\"email\"]"],"aria/Email"],"value":"a@b.com"}"##;
        let step: RecordedStep = serde_json::from_str(json).unwrap();
        assert_eq!(step.step_type, StepType::Change);
        assert_eq!(step.selectors.len(), 2);
        assert_eq!(step.selectors[1], vec!["aria/Email".to_string()]);
    }

    #[test]
    fn test_unknown_step_types_are_other() {
        let json = r#"{"type":"setViewport","width":100,"height":100}"#;
        let step: RecordedStep = serde_json::from_str(json).unwrap();
        assert_eq!(step.step_type, StepType::Other);
        assert!(step.selectors.is_empty());
    }

    #[test]
    fn test_stats_counters_track_results() {
        let mapping = FieldMapping::new("#a", Some("email"));
        let mut stats = ReplayStats::new("s", "ex.test", "https://ex.test");

        stats.record(FieldResult::skipped(&mapping));
        let mut failed = FieldResult::for_mapping(&mapping);
        failed.error = Some("not found".into());
        stats.record(failed);

        assert_eq!(stats.total_fields, stats.field_results.len());
        assert_eq!(stats.successful_fields, 1);
        assert_eq!(stats.skipped_fields, 1);
        assert_eq!(stats.failed_fields, 1);
        assert_eq!(stats.filled_fields(), 0);
        assert_eq!(stats.errors.len(), 1);
        assert!((stats.success_rate() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fill_strategy_serializes_snake_case() {
        let json = serde_json::to_string(&FillStrategy::JsDateInput).unwrap();
        assert_eq!(json, "\"js_date_input\"");
        assert_eq!(FieldMapping::new("#x", None).strategy(), FillStrategy::DirectType);
    }
}
