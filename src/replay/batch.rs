use crate::replay::engine::ReplayEngine;
use crate::replay::profile::Profile;
use crate::store::normalize_domain;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct BatchJob {
    pub domain: String,
    pub profile: Profile,
}

impl BatchJob {
    pub fn new(domain: &str, profile: Profile) -> Self {
        Self {
            domain: domain.to_string(),
            profile,
        }
    }
}

/// One line of a batch report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteSummary {
    pub domain: String,
    pub success: bool,
    pub fields_filled: usize,
    pub total_fields: usize,
    pub submitted: bool,
    pub error: Option<String>,
}

impl SiteSummary {
    fn failed(domain: &str, error: String) -> Self {
        Self {
            domain: normalize_domain(domain),
            success: false,
            fields_filled: 0,
            total_fields: 0,
            submitted: false,
            error: Some(error),
        }
    }
}

/// Replays many sites at once, each in its own browser session.
pub struct BatchRunner {
    engine: Arc<ReplayEngine>,
    concurrency: usize,
}

impl BatchRunner {
    pub fn new(engine: Arc<ReplayEngine>) -> Self {
        let concurrency = engine.config().replay.batch_concurrency;
        Self {
            engine,
            concurrency: concurrency.max(1),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Runs every job and returns one summary per job, in job order. A
    /// failing site never stops the others.
    pub async fn run(&self, jobs: Vec<BatchJob>) -> Vec<SiteSummary> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let domains: Vec<String> = jobs.iter().map(|job| job.domain.clone()).collect();
        let mut tasks = JoinSet::new();

        for (index, job) in jobs.into_iter().enumerate() {
            let engine = Arc::clone(&self.engine);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let summary = match semaphore.acquire_owned().await {
                    Ok(_permit) => summarize(&engine, job).await,
                    Err(e) => SiteSummary::failed(&job.domain, e.to_string()),
                };
                (index, summary)
            });
        }

        let mut summaries: Vec<Option<SiteSummary>> = vec![None; domains.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, summary)) => summaries[index] = Some(summary),
                Err(e) => warn!(error = %e, "batch task aborted"),
            }
        }

        let summaries: Vec<SiteSummary> = summaries
            .into_iter()
            .zip(domains)
            .map(|(summary, domain)| {
                summary.unwrap_or_else(|| SiteSummary::failed(&domain, "replay task aborted".to_string()))
            })
            .collect();

        let succeeded = summaries.iter().filter(|s| s.success).count();
        info!(sites = summaries.len(), succeeded, "batch finished");
        summaries
    }
}

async fn summarize(engine: &ReplayEngine, job: BatchJob) -> SiteSummary {
    match engine.replay(&job.domain, job.profile).await {
        Ok(stats) => SiteSummary {
            domain: stats.domain.clone(),
            success: stats.filled_fields() > 0
                && (!stats.submission.attempted || stats.submission.success),
            fields_filled: stats.filled_fields(),
            total_fields: stats.total_fields,
            submitted: stats.submission.success,
            error: stats.submission.error_message.clone(),
        },
        Err(e) => {
            warn!(domain = %job.domain, error = %e, "site replay failed");
            let mut summary = SiteSummary::failed(&job.domain, e.to_string());
            if let Some(stats) = e.stats() {
                summary.total_fields = stats.total_fields;
            }
            summary
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Config, ReplayConfig};
    use crate::extensions::ExtensionRegistry;
    use crate::store::MappingStore;
    use crate::testing::{MockDriver, MockDriverFactory, MockElement};
    use crate::types::FieldMapping;
    use serde_json::json;

    async fn seeded_store() -> Arc<MappingStore> {
        let store = Arc::new(MappingStore::in_memory());
        for domain in ["a.test", "b.test"] {
            store
                .save(
                    domain,
                    vec![FieldMapping::new("#email", Some("email"))],
                    Some(&format!("https://{}/join", domain)),
                    None,
                )
                .await
                .unwrap();
        }
        store
    }

    fn runner(store: Arc<MappingStore>, factory: Arc<MockDriverFactory>) -> BatchRunner {
        let config = Config {
            replay: ReplayConfig::immediate(),
            ..Config::default()
        };
        let engine = ReplayEngine::new(store, factory, ExtensionRegistry::with_builtin(), config);
        BatchRunner::new(Arc::new(engine)).with_concurrency(2)
    }

    #[tokio::test]
    async fn test_sites_are_isolated() {
        let store = seeded_store().await;
        let before_a = store.get_full("a.test").await.unwrap();
        let before_b = store.get_full("b.test").await.unwrap();

        let factory = Arc::new(MockDriverFactory::new(|| {
            MockDriver::new("about:blank")
                .with_element("#email", MockElement::input("email"))
                .with_element("button[type=submit]", MockElement::button("Join"))
        }));
        let runner = runner(store.clone(), factory.clone());
        let profile = Profile::from_value(&json!({ "email": "jane@x.com" }));

        let summaries = runner
            .run(vec![
                BatchJob::new("a.test", profile.clone()),
                BatchJob::new("missing.test", profile.clone()),
                BatchJob::new("b.test", profile),
            ])
            .await;

        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].domain, "a.test");
        assert!(summaries[0].success);
        assert_eq!(summaries[0].fields_filled, 1);
        assert!(!summaries[1].success);
        assert!(summaries[1].error.as_deref().unwrap().contains("missing.test"));
        assert!(summaries[2].success);

        let drivers = factory.issued();
        assert_eq!(drivers.len(), 2);
        let mut visited: Vec<String> = drivers.iter().flat_map(|d| d.navigations()).collect();
        visited.sort();
        assert_eq!(visited, vec!["https://a.test/join", "https://b.test/join"]);
        assert!(drivers.iter().all(|d| d.is_closed()));

        assert_eq!(store.get_full("a.test").await.unwrap(), before_a);
        assert_eq!(store.get_full("b.test").await.unwrap(), before_b);
    }

    #[tokio::test]
    async fn test_launch_failures_are_summarized() {
        let store = seeded_store().await;
        let factory = Arc::new(MockDriverFactory::failing("no chrome"));
        let runner = runner(store, factory);

        let summaries = runner.run(vec![BatchJob::new("a.test", Profile::default())]).await;
        assert!(!summaries[0].success);
        assert!(summaries[0].error.as_deref().unwrap().contains("no chrome"));
    }
}
