use crate::core::{BrowserDriver, ElementInfo};
use crate::recording::selector;
use crate::types::FillStrategy;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Canonical profile attributes. Anything in here passes normalization
/// untouched.
pub const STANDARD_FIELDS: &[&str] = &[
    "email",
    "firstName",
    "lastName",
    "middleName",
    "name",
    "password",
    "phone",
    "address",
    "address1",
    "address2",
    "city",
    "state",
    "zip",
    "country",
    "company",
    "jobTitle",
    "username",
    "dateOfBirth",
    "birthYear",
    "birthMonth",
    "birthDay",
    "gender",
    "ssn",
    "website",
];

/// Accessibility label -> field. Order matters for substring matching.
const LABEL_SYNONYMS: &[(&str, &str)] = &[
    ("first name", "firstName"),
    ("firstname", "firstName"),
    ("given name", "firstName"),
    ("last name", "lastName"),
    ("lastname", "lastName"),
    ("family name", "lastName"),
    ("surname", "lastName"),
    ("middle name", "middleName"),
    ("full name", "name"),
    ("user name", "username"),
    ("username", "username"),
    ("email address", "email"),
    ("e-mail", "email"),
    ("email", "email"),
    ("phone number", "phone"),
    ("mobile number", "phone"),
    ("telephone", "phone"),
    ("cell phone", "phone"),
    ("phone", "phone"),
    ("mobile", "phone"),
    ("address line 1", "address1"),
    ("address 1", "address1"),
    ("street address", "address1"),
    ("address line 2", "address2"),
    ("address 2", "address2"),
    ("apartment", "address2"),
    ("suite", "address2"),
    ("address", "address"),
    ("street", "address1"),
    ("city", "city"),
    ("town", "city"),
    ("suburb", "city"),
    ("state", "state"),
    ("province", "state"),
    ("region", "state"),
    ("zip code", "zip"),
    ("postal code", "zip"),
    ("postcode", "zip"),
    ("zip", "zip"),
    ("postal", "zip"),
    ("country", "country"),
    ("password", "password"),
    ("birth year", "birthYear"),
    ("year of birth", "birthYear"),
    ("birth month", "birthMonth"),
    ("month of birth", "birthMonth"),
    ("birth day", "birthDay"),
    ("day of birth", "birthDay"),
    ("date of birth", "dateOfBirth"),
    ("birth date", "dateOfBirth"),
    ("birthdate", "dateOfBirth"),
    ("birthday", "dateOfBirth"),
    ("dob", "dateOfBirth"),
    ("gender", "gender"),
    ("sex", "gender"),
    ("company name", "company"),
    ("company", "company"),
    ("organization", "company"),
    ("business", "company"),
    ("job title", "jobTitle"),
    ("position", "jobTitle"),
    ("social security", "ssn"),
    ("ssn", "ssn"),
    ("website", "website"),
    ("login", "username"),
    ("name", "name"),
];

static SELECTOR_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"full[-_]?name", "name"),
        (r"first[-_]?name|fname|given[-_]?name", "firstName"),
        (r"last[-_]?name|lname|surname|family[-_]?name", "lastName"),
        (r"middle[-_]?name", "middleName"),
        (r"user[-_]?name", "username"),
        (r"e[-_]?mail", "email"),
        (r"phone|telephone|mobile", "phone"),
        (r"password|passwd|pwd", "password"),
        (r"birth[-_]?year|dob[-_]?y(ea)?r", "birthYear"),
        (r"birth[-_]?month|dob[-_]?m(on)?th", "birthMonth"),
        (r"birth[-_]?day|dob[-_]?day", "birthDay"),
        (r"birth[-_]?date|date[-_]?of[-_]?birth|dob", "dateOfBirth"),
        (r"gender|sex", "gender"),
        (r"address[-_]?(line)?[-_]?2|apartment|suite", "address2"),
        (r"address[-_]?(line)?[-_]?1|street", "address1"),
        (r"address", "address"),
        (r"city|town|suburb", "city"),
        (r"state|province|region", "state"),
        (r"zip|postal|postcode", "zip"),
        (r"country", "country"),
        (r"company|organi[sz]ation", "company"),
        (r"job[-_]?title", "jobTitle"),
        (r"ssn|social[-_]?security", "ssn"),
        (r"website|homepage", "website"),
    ]
    .into_iter()
    .filter_map(|(pattern, field)| Regex::new(pattern).ok().map(|re| (re, field)))
    .collect()
});

/// Single id/name tokens that identify a field on their own.
const TOKEN_FIELDS: &[(&str, &str)] = &[
    ("first", "firstName"),
    ("given", "firstName"),
    ("last", "lastName"),
    ("family", "lastName"),
    ("middle", "middleName"),
    ("name", "name"),
    ("mail", "email"),
    ("tel", "phone"),
    ("cell", "phone"),
    ("pass", "password"),
    ("street", "address1"),
    ("apt", "address2"),
    ("zipcode", "zip"),
    ("org", "company"),
    ("employer", "company"),
    ("title", "jobTitle"),
    ("login", "username"),
    ("user", "username"),
];

/// Compact spellings -> field, keyed with spaces and `-_/` removed.
const NORMALIZATIONS: &[(&str, &str)] = &[
    ("firstname", "firstName"),
    ("fname", "firstName"),
    ("givenname", "firstName"),
    ("lastname", "lastName"),
    ("lname", "lastName"),
    ("surname", "lastName"),
    ("familyname", "lastName"),
    ("middlename", "middleName"),
    ("fullname", "name"),
    ("yourname", "name"),
    ("emailaddress", "email"),
    ("email", "email"),
    ("mail", "email"),
    ("password", "password"),
    ("passwd", "password"),
    ("pwd", "password"),
    ("phonenumber", "phone"),
    ("telephone", "phone"),
    ("mobile", "phone"),
    ("phone", "phone"),
    ("cell", "phone"),
    ("tel", "phone"),
    ("addressline1", "address1"),
    ("streetaddress", "address1"),
    ("addressline2", "address2"),
    ("apartment", "address2"),
    ("suite", "address2"),
    ("apt", "address2"),
    ("street", "address1"),
    ("suburbcity", "city"),
    ("suburb", "city"),
    ("locality", "city"),
    ("town", "city"),
    ("city", "city"),
    ("province", "state"),
    ("region", "state"),
    ("state", "state"),
    ("zipcode", "zip"),
    ("postalcode", "zip"),
    ("postcode", "zip"),
    ("postal", "zip"),
    ("zip", "zip"),
    ("country", "country"),
    ("nation", "country"),
    ("companyname", "company"),
    ("organization", "company"),
    ("company", "company"),
    ("jobtitle", "jobTitle"),
    ("username", "username"),
    ("login", "username"),
    ("dateofbirth", "dateOfBirth"),
    ("birthdate", "dateOfBirth"),
    ("birthday", "dateOfBirth"),
    ("dob", "dateOfBirth"),
    ("birthyear", "birthYear"),
    ("birthmonth", "birthMonth"),
    ("gender", "gender"),
    ("sex", "gender"),
];

static ROLE_ANNOTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[role="[^"]*"\]"#).unwrap());

/// How a field was recognized, strongest signal first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Label(String),
    Selector(String),
}

impl Classification {
    pub fn field(&self) -> &str {
        match self {
            Classification::Label(field) | Classification::Selector(field) => field,
        }
    }
}

/// Field for one accessibility label: exact synonym, then substring either
/// way.
pub fn classify_label(label: &str) -> Option<&'static str> {
    let cleaned = ROLE_ANNOTATION.replace_all(&label.to_lowercase(), "").trim().to_string();
    if cleaned.is_empty() {
        return None;
    }

    if let Some((_, field)) = LABEL_SYNONYMS.iter().find(|(synonym, _)| *synonym == cleaned) {
        return Some(field);
    }

    LABEL_SYNONYMS
        .iter()
        .find(|(synonym, _)| {
            cleaned.contains(synonym) || (cleaned.len() >= 3 && synonym.contains(cleaned.as_str()))
        })
        .map(|(_, field)| *field)
}

/// Field for the id/name a selector pins, by pattern and then by token.
pub fn classify_selector(raw: &str) -> Option<&'static str> {
    let ids = selector::identifiers(raw);
    for ident in ids.iter() {
        let ident = ident.to_lowercase();
        if let Some((_, field)) = SELECTOR_PATTERNS.iter().find(|(re, _)| re.is_match(&ident)) {
            return Some(field);
        }
    }

    for ident in ids.iter() {
        let ident = ident.to_lowercase();
        for token in ident.split(['-', '_']).filter(|t| !t.is_empty()) {
            if let Some((_, field)) = TOKEN_FIELDS.iter().find(|(t, _)| *t == token) {
                return Some(field);
            }
        }
    }
    None
}

/// First confident hit across every label of the step, then every selector.
pub fn classify_step(groups: &[Vec<String>]) -> Option<Classification> {
    for label in selector::aria_labels(groups) {
        if let Some(field) = classify_label(&label) {
            return Some(Classification::Label(normalize_field(field)));
        }
    }

    for raw in groups.iter().flatten() {
        if let Some(field) = classify_selector(raw) {
            return Some(Classification::Selector(normalize_field(field)));
        }
    }
    None
}

/// Collapses near-duplicate field names onto the canonical set.
/// `normalize_field(normalize_field(x)) == normalize_field(x)`.
pub fn normalize_field(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() || STANDARD_FIELDS.contains(&trimmed) {
        return trimmed.to_string();
    }

    let stripped: String = trimmed
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_' | '/'))
        .collect();

    if let Some((_, field)) = NORMALIZATIONS.iter().find(|(key, _)| *key == stripped) {
        return field.to_string();
    }

    if let Some((_, field)) = NORMALIZATIONS.iter().find(|(key, _)| {
        stripped.contains(key) || (stripped.len() >= 3 && key.contains(stripped.as_str()))
    }) {
        return field.to_string();
    }

    trimmed.to_string()
}

/// Outcome of looking at an element's shape.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyDecision {
    pub fill_strategy: FillStrategy,
    pub input_type: String,
    pub fill_config: Option<Value>,
}

impl StrategyDecision {
    fn new(fill_strategy: FillStrategy, input_type: &str) -> Self {
        Self {
            fill_strategy,
            input_type: input_type.to_string(),
            fill_config: None,
        }
    }

    fn with_config(mut self, config: Value) -> Self {
        self.fill_config = Some(config);
        self
    }

    pub fn unknown() -> Self {
        Self::new(FillStrategy::DirectType, "unknown")
    }
}

fn is_dropdown_like(ancestor_classes: &[String]) -> bool {
    ancestor_classes.iter().any(|class| {
        let class = class.to_lowercase();
        class.contains("dropdown") || class.contains("select") || class.contains("combobox")
    })
}

/// Fill strategy from tag, `type` attribute and ancestor classes.
pub fn classify_fill_strategy(
    tag: &str,
    input_type: Option<&str>,
    ancestor_classes: &[String],
) -> StrategyDecision {
    let tag = tag.to_lowercase();
    let input_type = input_type
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty());

    if tag == "select" {
        return StrategyDecision::new(FillStrategy::DropdownSelect, "select");
    }

    if matches!(tag.as_str(), "button" | "div" | "span") && is_dropdown_like(ancestor_classes) {
        return StrategyDecision::new(FillStrategy::CustomDropdown, "custom-dropdown")
            .with_config(json!({ "click_to_open": true }));
    }

    if tag == "textarea" {
        return StrategyDecision::new(FillStrategy::DirectType, "textarea");
    }

    if tag != "input" {
        return StrategyDecision::unknown();
    }

    match input_type.as_deref() {
        Some("date") => StrategyDecision::new(FillStrategy::JsDateInput, "date").with_config(json!({
            "format": "YYYY-MM-DD",
            "dispatch_events": ["input", "change"]
        })),
        Some(kind @ ("datetime-local" | "datetime" | "time" | "month" | "week")) => {
            StrategyDecision::new(FillStrategy::JsDateInput, kind)
                .with_config(json!({ "dispatch_events": ["input", "change"] }))
        }
        Some("tel") => StrategyDecision::new(FillStrategy::CharByChar, "tel")
            .with_config(json!({ "delay_ms": 50, "click_first": true })),
        Some("checkbox") => StrategyDecision::new(FillStrategy::CheckboxClick, "checkbox")
            .with_config(json!({ "check_state_first": true })),
        Some("radio") => StrategyDecision::new(FillStrategy::RadioClick, "radio"),
        Some("password") => StrategyDecision::new(FillStrategy::PasswordType, "password"),
        Some(other) => StrategyDecision::new(FillStrategy::DirectType, other),
        None => StrategyDecision::new(FillStrategy::DirectType, "text"),
    }
}

pub fn classify_element(info: &ElementInfo) -> StrategyDecision {
    let mut decision = classify_fill_strategy(
        &info.tag_name,
        info.input_type.as_deref(),
        &info.ancestor_classes,
    );
    if decision.fill_strategy == FillStrategy::DropdownSelect {
        decision.fill_config = Some(json!({ "options_count": info.option_count }));
    }
    decision
}

/// Live adapter over [`classify_fill_strategy`]. Never fails: anything
/// that cannot be inspected is treated as a plain text field.
pub async fn analyze_element(driver: &dyn BrowserDriver, selector: &str) -> StrategyDecision {
    match driver.describe_element(selector).await {
        Ok(Some(info)) => {
            let decision = classify_element(&info);
            debug!(
                selector,
                strategy = %decision.fill_strategy,
                input_type = %decision.input_type,
                "analyzed field"
            );
            decision
        }
        Ok(None) => {
            debug!(selector, "element not present during analysis");
            StrategyDecision::unknown()
        }
        Err(e) => {
            warn!(selector, error = %e, "failed to analyze field");
            StrategyDecision::unknown()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDriver, MockElement};

    #[test]
    fn test_label_exact_and_substring() {
        assert_eq!(classify_label("First name"), Some("firstName"));
        assert_eq!(classify_label("Your e-mail please"), Some("email"));
        assert_eq!(classify_label("[role=\"textbox\"] Postal code"), Some("zip"));
        assert_eq!(classify_label("[role=\"button\"]"), None);
        assert_eq!(classify_label("Favourite colour"), None);
    }

    #[test]
    fn test_selector_patterns_and_tokens() {
        assert_eq!(classify_selector("#first_name"), Some("firstName"));
        assert_eq!(classify_selector("#first"), Some("firstName"));
        assert_eq!(classify_selector("input[name=\"user-email\"]"), Some("email"));
        assert_eq!(classify_selector("#dob-year"), Some("birthYear"));
        assert_eq!(classify_selector("#field-42"), None);
    }

    #[test]
    fn test_label_wins_over_selector() {
        let groups = vec![vec!["#contact".to_string()], vec!["aria/Phone number".to_string()]];
        assert_eq!(
            classify_step(&groups),
            Some(Classification::Label("phone".to_string()))
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        assert_eq!(normalize_field("city"), "city");
        assert_eq!(normalize_field("suburb/City"), "city");
        assert_eq!(normalize_field("first_name"), "firstName");
        assert_eq!(normalize_field("postalCode"), "zip");
        assert_eq!(normalize_field("favoriteColor"), "favoriteColor");

        for input in ["suburb/City", "Zip Code", "e-mail", "x", "shoeSize", "address_line_2"] {
            let once = normalize_field(input);
            assert_eq!(normalize_field(&once), once, "not idempotent for {input}");
        }
    }

    #[test]
    fn test_strategy_decision_table() {
        let none: Vec<String> = vec![];
        let cases = [
            ("select", None, FillStrategy::DropdownSelect),
            ("input", Some("date"), FillStrategy::JsDateInput),
            ("input", Some("week"), FillStrategy::JsDateInput),
            ("input", Some("tel"), FillStrategy::CharByChar),
            ("input", Some("checkbox"), FillStrategy::CheckboxClick),
            ("input", Some("radio"), FillStrategy::RadioClick),
            ("input", Some("password"), FillStrategy::PasswordType),
            ("input", Some("email"), FillStrategy::DirectType),
            ("input", None, FillStrategy::DirectType),
            ("textarea", None, FillStrategy::DirectType),
            ("button", None, FillStrategy::DirectType),
        ];
        for (tag, input_type, expected) in cases {
            assert_eq!(
                classify_fill_strategy(tag, input_type, &none).fill_strategy,
                expected,
                "{tag} {input_type:?}"
            );
        }

        let ancestors = vec!["form-row".to_string(), "react-select__control".to_string()];
        let decision = classify_fill_strategy("div", None, &ancestors);
        assert_eq!(decision.fill_strategy, FillStrategy::CustomDropdown);
        assert_eq!(decision.input_type, "custom-dropdown");
    }

    #[tokio::test]
    async fn test_analyze_missing_element_defaults() {
        let driver = MockDriver::new("https://ex.test");
        let decision = analyze_element(&driver, "#nope").await;
        assert_eq!(decision, StrategyDecision::unknown());
    }

    #[tokio::test]
    async fn test_analyze_select_reports_options() {
        let driver = MockDriver::new("https://ex.test")
            .with_element("#country", MockElement::select(&[("us", "United States"), ("ca", "Canada")]));
        let decision = analyze_element(&driver, "#country").await;
        assert_eq!(decision.fill_strategy, FillStrategy::DropdownSelect);
        assert_eq!(decision.fill_config, Some(json!({ "options_count": 2 })));
    }
}
