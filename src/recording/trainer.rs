use crate::core::BrowserDriver;
use crate::errors::{ReplayError, Result};
use crate::recording::classifier::analyze_element;
use crate::recording::extractor::{validate_recording, RecordingExtractor};
use crate::store::MappingStore;
use crate::types::{DomainMappingRecord, Recording};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

pub const ANALYZER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingOutcome {
    pub domain: String,
    pub url: String,
    pub fields_learned: usize,
    pub submit_selector: Option<String>,
    pub warnings: Vec<String>,
}

/// Turns recordings into stored mappings, once per site.
pub struct Trainer {
    store: Arc<MappingStore>,
}

impl Trainer {
    pub fn new(store: Arc<MappingStore>) -> Self {
        Self { store }
    }

    pub async fn train(&self, recording: &Recording) -> Result<TrainingOutcome> {
        for problem in validate_recording(recording) {
            warn!(problem = %problem, "recording check");
        }

        let extracted = RecordingExtractor::extract(recording)?;
        let metadata = json!({
            "submit_selector": &extracted.submit_selector,
            "title": &extracted.title,
            "analyzer_version": ANALYZER_VERSION,
        });

        let record = self
            .store
            .save(
                &extracted.domain,
                extracted.mappings,
                Some(&extracted.url),
                Some(metadata),
            )
            .await?;

        info!(
            domain = %record.domain,
            fields = record.fields_count(),
            "trained site from recording"
        );

        Ok(TrainingOutcome {
            domain: record.domain,
            url: record.url,
            fields_learned: record.mappings.len(),
            submit_selector: extracted.submit_selector,
            warnings: extracted.warnings,
        })
    }

    /// Visits the stored URL and records each field's live fill strategy.
    pub async fn enhance(
        &self,
        domain: &str,
        driver: &dyn BrowserDriver,
    ) -> Result<DomainMappingRecord> {
        let record = self
            .store
            .get_full(domain)
            .await?
            .ok_or_else(|| ReplayError::MappingsNotFound(domain.to_string()))?;

        driver.navigate(&record.url).await?;

        let mut mappings = record.mappings;
        for mapping in mappings.iter_mut() {
            let decision = analyze_element(driver, &mapping.selector).await;
            mapping.fill_strategy = Some(decision.fill_strategy);
            mapping.input_type = decision.input_type;
            mapping.fill_config = decision.fill_config;
        }

        let mut metadata = record.fill_config.unwrap_or_else(|| json!({}));
        if let Value::Object(map) = &mut metadata {
            map.insert("analyzer_version".to_string(), json!(ANALYZER_VERSION));
            map.insert("enhanced_at".to_string(), json!(chrono::Utc::now()));
        }

        let enhanced = self
            .store
            .save(&record.domain, mappings, Some(&record.url), Some(metadata))
            .await?;

        info!(domain = %enhanced.domain, fields = enhanced.fields_count(), "enhanced mappings");
        Ok(enhanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDriver, MockElement};
    use crate::types::{FillStrategy, RecordedStep};

    fn recording() -> Recording {
        Recording {
            title: Some("Signup".to_string()),
            steps: vec![
                RecordedStep::navigate("https://ex.test/signup"),
                RecordedStep::change(&[&["#phone"]], "5551234567"),
                RecordedStep::change(&[&["#country"]], "us"),
                RecordedStep::click(&[&["#submit"]]),
            ],
        }
    }

    #[tokio::test]
    async fn test_train_persists_metadata() {
        let store = Arc::new(MappingStore::in_memory());
        let trainer = Trainer::new(Arc::clone(&store));

        let outcome = trainer.train(&recording()).await.unwrap();
        assert_eq!(outcome.domain, "ex.test");
        assert_eq!(outcome.fields_learned, 2);

        let record = store.get_full("ex.test").await.unwrap().unwrap();
        assert_eq!(record.submit_selector(), Some("#submit"));
        assert_eq!(record.metadata_str("title"), Some("Signup"));
        assert!(!record.is_enhanced);
    }

    #[tokio::test]
    async fn test_enhance_classifies_live_fields() {
        let store = Arc::new(MappingStore::in_memory());
        let trainer = Trainer::new(Arc::clone(&store));
        trainer.train(&recording()).await.unwrap();

        let driver = MockDriver::new("about:blank")
            .with_element("#phone", MockElement::input("tel"))
            .with_element("#country", MockElement::select(&[("us", "United States")]));

        let record = trainer.enhance("ex.test", &driver).await.unwrap();
        assert!(record.is_enhanced);
        assert_eq!(record.mappings[0].fill_strategy, Some(FillStrategy::CharByChar));
        assert_eq!(record.mappings[1].fill_strategy, Some(FillStrategy::DropdownSelect));
        assert_eq!(record.submit_selector(), Some("#submit"));
        assert_eq!(driver.navigations(), vec!["https://ex.test/signup".to_string()]);
    }

    #[tokio::test]
    async fn test_enhance_unknown_domain() {
        let trainer = Trainer::new(Arc::new(MappingStore::in_memory()));
        let driver = MockDriver::new("about:blank");
        assert!(matches!(
            trainer.enhance("nowhere.test", &driver).await,
            Err(ReplayError::MappingsNotFound(_))
        ));
    }
}
