use crate::errors::{ExtractionError, Result};
use crate::recording::classifier::{self, Classification};
use crate::recording::selector;
use crate::store::normalize_domain;
use crate::types::{FieldMapping, RecordedStep, Recording, StepType};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

const CHECKBOX_VOCABULARY: &[&str] = &["consent", "terms", "checkbox", "agree"];
pub const SUBMIT_VOCABULARY: &[&str] = &[
    "submit", "send", "continue", "next", "finish", "create", "register", "sign up",
];
const NAME_PREFIXES: &[&str] = &["input-", "input_", "field-", "field_", "txt-", "txt_", "form-", "form_"];

/// What one recording teaches about its site.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub title: Option<String>,
    pub url: String,
    pub domain: String,
    pub mappings: Vec<FieldMapping>,
    pub submit_selector: Option<String>,
    /// Steps that were dropped, with the reason.
    pub warnings: Vec<String>,
}

struct Pending {
    mapping: FieldMapping,
    step_index: usize,
    clicks: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClickKind {
    Checkbox,
    Radio,
    Submit,
    Other,
}

pub struct RecordingExtractor;

impl RecordingExtractor {
    pub fn extract(recording: &Recording) -> Result<ExtractionResult> {
        if recording.steps.is_empty() {
            return Err(ExtractionError::EmptyRecording.into());
        }

        let url = authoritative_url(&recording.steps).ok_or(ExtractionError::MissingUrl)?;
        let domain = normalize_domain(&url);
        if domain.is_empty() {
            return Err(ExtractionError::MissingUrl.into());
        }

        let mut pending: Vec<Pending> = Vec::new();
        let mut by_selector: HashMap<String, usize> = HashMap::new();
        let mut submit_selector: Option<String> = None;
        let mut warnings = Vec::new();

        // Clicking into a text field before typing is not a submit.
        let typed_into: HashSet<String> = recording
            .steps
            .iter()
            .filter(|s| s.step_type == StepType::Change)
            .filter_map(|s| selector::resolve(&s.selectors))
            .collect();

        for (index, step) in recording.steps.iter().enumerate() {
            match step.step_type {
                StepType::Change => {
                    let Some(resolved) = selector::resolve(&step.selectors) else {
                        warn!(step = index, "change step has no usable selector, dropping it");
                        warnings.push(format!("step {}: no usable selector", index));
                        continue;
                    };
                    let value = step.value.as_deref().unwrap_or("");

                    match by_selector.get(&resolved) {
                        Some(&slot) => {
                            let entry = &mut pending[slot];
                            if !value.is_empty() {
                                entry.mapping.sample_value = Some(value.to_string());
                            }
                            entry.step_index = index;
                        }
                        None => {
                            let mut mapping = build_mapping(&resolved, step);
                            if !value.is_empty() {
                                mapping.sample_value = Some(value.to_string());
                            }
                            by_selector.insert(resolved, pending.len());
                            pending.push(Pending {
                                mapping,
                                step_index: index,
                                clicks: 0,
                            });
                        }
                    }
                }
                StepType::Click => match classify_click(step) {
                    kind @ (ClickKind::Checkbox | ClickKind::Radio) => {
                        let Some(resolved) = selector::resolve(&step.selectors) else {
                            warnings.push(format!("step {}: no usable selector", index));
                            continue;
                        };
                        let slot = match by_selector.get(&resolved) {
                            Some(&slot) => slot,
                            None => {
                                let input_type = if kind == ClickKind::Radio { "radio" } else { "checkbox" };
                                let mapping = build_mapping(&resolved, step).with_input_type(input_type);
                                by_selector.insert(resolved, pending.len());
                                pending.push(Pending {
                                    mapping,
                                    step_index: index,
                                    clicks: 0,
                                });
                                pending.len() - 1
                            }
                        };
                        let entry = &mut pending[slot];
                        entry.clicks += 1;
                        entry.step_index = index;
                        // Each click toggles a checkbox; a radio stays selected.
                        let checked = kind == ClickKind::Radio || entry.clicks % 2 == 1;
                        entry.mapping.sample_value = Some(checked.to_string());
                    }
                    ClickKind::Submit if submit_selector.is_none() => {
                        let resolved = selector::resolve(&step.selectors);
                        if resolved.as_ref().is_some_and(|s| !typed_into.contains(s)) {
                            debug!(submit = ?resolved, "submit control identified");
                            submit_selector = resolved;
                        }
                    }
                    _ => {}
                },
                StepType::Navigate | StepType::Other => {}
            }
        }

        if pending.is_empty() {
            return Err(ExtractionError::NoFormInteractions.into());
        }

        pending.sort_by_key(|p| p.step_index);
        let mappings: Vec<FieldMapping> = pending.into_iter().map(|p| p.mapping).collect();

        debug!(
            domain = %domain,
            fields = mappings.len(),
            dropped = warnings.len(),
            "extracted field mappings"
        );

        Ok(ExtractionResult {
            title: recording.title.clone(),
            url,
            domain,
            mappings,
            submit_selector,
            warnings,
        })
    }
}

/// First navigate URL; falls back to the first asserted navigation.
fn authoritative_url(steps: &[RecordedStep]) -> Option<String> {
    let navigated = steps
        .iter()
        .filter(|s| s.step_type == StepType::Navigate)
        .find_map(|s| s.url.clone().filter(|u| !u.trim().is_empty()));

    navigated.or_else(|| {
        steps
            .iter()
            .flat_map(|s| s.asserted_events.iter())
            .find_map(|e| e.url.clone().filter(|u| !u.trim().is_empty()))
    })
}

fn build_mapping(resolved: &str, step: &RecordedStep) -> FieldMapping {
    let classification = classifier::classify_step(&step.selectors);
    let semantic = classification.as_ref().map(|c| c.field().to_string());

    let mut mapping = FieldMapping::new(resolved, semantic.as_deref());
    mapping.input_type = infer_input_type(step).to_string();

    let ids = step
        .all_selectors()
        .map(selector::identifiers)
        .fold(selector::Identifiers::default(), |mut acc, ids| {
            if acc.id.is_none() {
                acc.id = ids.id;
            }
            if acc.name.is_none() {
                acc.name = ids.name;
            }
            acc
        });

    let label = selector::aria_labels(&step.selectors).into_iter().next();
    mapping.field_name = ids
        .name
        .as_deref()
        .or(ids.id.as_deref())
        .map(humanize)
        .or(label)
        .or(semantic)
        .unwrap_or_default();

    let mut confidence: f32 = 0.5;
    if ids.name.is_some() {
        confidence += 0.3;
    }
    if ids.id.is_some() {
        confidence += 0.2;
    }
    if matches!(classification, Some(Classification::Label(_))) {
        confidence += 0.2;
    }
    mapping.confidence = Some(confidence.min(1.0));
    mapping
}

fn infer_input_type(step: &RecordedStep) -> &'static str {
    let text = step.all_selectors().collect::<Vec<_>>().join(" ").to_lowercase();
    if text.contains("select") {
        "select"
    } else if text.contains("textarea") {
        "textarea"
    } else if text.contains("checkbox") {
        "checkbox"
    } else if text.contains("radio") {
        "radio"
    } else {
        "text"
    }
}

fn classify_click(step: &RecordedStep) -> ClickKind {
    let text = step
        .all_selectors()
        .map(|s| s.strip_prefix(selector::ARIA_PREFIX).unwrap_or(s))
        .map(|s| s.strip_prefix(selector::TEXT_PREFIX).unwrap_or(s))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    if text.contains("type=\"radio\"") || text.contains("type=radio") || text.contains("[role=\"radio\"]") {
        return ClickKind::Radio;
    }
    if text.contains("type=\"checkbox\"") || text.contains("type=checkbox") || text.contains("[role=\"checkbox\"]") {
        return ClickKind::Checkbox;
    }
    // Wording like "I agree and continue" belongs to a button, not a box.
    let button_shaped = text.contains("type=\"submit\"")
        || text.contains("type=submit")
        || text.contains("button");
    if button_shaped || SUBMIT_VOCABULARY.iter().any(|word| text.contains(word)) {
        return ClickKind::Submit;
    }
    if CHECKBOX_VOCABULARY.iter().any(|word| text.contains(word)) {
        return ClickKind::Checkbox;
    }
    ClickKind::Other
}

/// `"input-first_name"` -> `"First Name"`.
pub fn humanize(raw: &str) -> String {
    let mut base = raw.trim();
    for prefix in NAME_PREFIXES {
        if let Some(rest) = base.strip_prefix(prefix) {
            base = rest;
            break;
        }
    }

    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in base.chars() {
        if matches!(c, '-' | '_' | ' ' | '.' | '[' | ']') {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Problems worth reporting about a recording that do not stop extraction.
pub fn validate_recording(recording: &Recording) -> Vec<String> {
    let mut problems = Vec::new();
    if recording.title.as_deref().map_or(true, |t| t.trim().is_empty()) {
        problems.push("recording has no title".to_string());
    }
    if recording.steps.is_empty() {
        problems.push("recording has no steps".to_string());
        return problems;
    }
    if authoritative_url(&recording.steps).is_none() {
        problems.push("recording has no navigation URL".to_string());
    }
    let interactions = recording
        .steps
        .iter()
        .filter(|s| matches!(s.step_type, StepType::Change | StepType::Click))
        .count();
    if interactions == 0 {
        problems.push("recording contains no form interactions".to_string());
    }
    problems
}
