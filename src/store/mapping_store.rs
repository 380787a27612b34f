use crate::core::StoreConfig;
use crate::errors::{ReplayError, Result};
use crate::store::backend::{MappingBackend, MemoryBackend, RedbBackend};
use crate::store::normalize_domain;
use crate::types::{DomainMappingRecord, FieldMapping};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainSummary {
    pub domain: String,
    pub url: String,
    pub fields_count: usize,
    pub is_enhanced: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMatch {
    pub domain: String,
    pub selector: String,
    pub mapping: FieldMapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_domains: usize,
    pub total_fields: usize,
    pub enhanced_domains: usize,
    /// Semantic field -> number of domains mapping it, most common first.
    pub field_frequency: Vec<(String, usize)>,
}

/// Domain-keyed mapping records with a read-through cache.
///
/// Reads go through the cache; saves and deletes for one domain are
/// serialized and invalidate that domain's cache entry.
pub struct MappingStore {
    backend: Arc<dyn MappingBackend>,
    cache: RwLock<HashMap<String, DomainMappingRecord>>,
    write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MappingStore {
    pub fn new(backend: Arc<dyn MappingBackend>) -> Self {
        Self {
            backend,
            cache: RwLock::new(HashMap::new()),
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Arc::new(RedbBackend::open(path)?)))
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        if config.in_memory {
            warn!("mapping store is in memory, nothing will persist");
            return Ok(Self::in_memory());
        }
        info!(path = %config.path.display(), "opening mapping store");
        Self::open(&config.path)
    }

    pub async fn has(&self, domain: &str) -> Result<bool> {
        Ok(self.get_full(domain).await?.is_some())
    }

    pub async fn get(&self, domain: &str) -> Result<Option<Vec<FieldMapping>>> {
        Ok(self.get_full(domain).await?.map(|record| record.mappings))
    }

    pub async fn get_full(&self, domain: &str) -> Result<Option<DomainMappingRecord>> {
        let key = normalize_domain(domain);
        if let Some(record) = self.cache.read().await.get(&key) {
            return Ok(Some(record.clone()));
        }

        // Fill under the domain's write lock: a save must never be shadowed
        // by bytes read before it.
        let lock = self.write_lock(&key).await;
        let _guard = lock.lock().await;
        if let Some(record) = self.cache.read().await.get(&key) {
            return Ok(Some(record.clone()));
        }

        let Some(bytes) = self.blocking_get(key.clone()).await? else {
            return Ok(None);
        };
        let record: DomainMappingRecord = serde_json::from_slice(&bytes)?;
        self.cache.write().await.insert(key, record.clone());
        Ok(Some(record))
    }

    /// Replaces everything stored for `domain`.
    ///
    /// Later duplicates of a selector replace earlier ones. `url` defaults to
    /// the previous record's URL, then to `https://<domain>`. `created_at`
    /// carries over from the previous record.
    pub async fn save(
        &self,
        domain: &str,
        mappings: Vec<FieldMapping>,
        url: Option<&str>,
        metadata: Option<Value>,
    ) -> Result<DomainMappingRecord> {
        let key = normalize_domain(domain);
        if key.is_empty() {
            return Err(ReplayError::Storage(format!("invalid domain: {:?}", domain)));
        }

        let lock = self.write_lock(&key).await;
        let _guard = lock.lock().await;

        let previous = match self.blocking_get(key.clone()).await? {
            Some(bytes) => match serde_json::from_slice::<DomainMappingRecord>(&bytes) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(domain = %key, error = %e, "overwriting unreadable mapping record");
                    None
                }
            },
            None => None,
        };

        let mappings = dedupe_by_selector(mappings);
        let now = Utc::now();
        let record = DomainMappingRecord {
            url: url
                .map(|u| u.to_string())
                .or_else(|| previous.as_ref().map(|p| p.url.clone()))
                .unwrap_or_else(|| format!("https://{}", key)),
            is_enhanced: mappings.iter().any(|m| m.fill_strategy.is_some()),
            mappings,
            fill_config: metadata,
            created_at: previous.as_ref().map(|p| p.created_at).unwrap_or(now),
            updated_at: now,
            domain: key.clone(),
        };

        let bytes = serde_json::to_vec(&record)?;
        self.blocking_put(key.clone(), bytes).await?;
        self.cache.write().await.remove(&key);

        debug!(
            domain = %key,
            fields = record.mappings.len(),
            enhanced = record.is_enhanced,
            "saved mappings"
        );
        Ok(record)
    }

    pub async fn delete(&self, domain: &str) -> Result<bool> {
        let key = normalize_domain(domain);
        let lock = self.write_lock(&key).await;
        let _guard = lock.lock().await;

        let backend = Arc::clone(&self.backend);
        let existed = {
            let key = key.clone();
            tokio::task::spawn_blocking(move || backend.delete(&key))
                .await
                .map_err(ReplayError::storage)??
        };
        self.cache.write().await.remove(&key);
        Ok(existed)
    }

    /// All stored domains, sorted by domain.
    pub async fn list(&self) -> Result<Vec<DomainSummary>> {
        let mut summaries: Vec<DomainSummary> = self
            .all_records()
            .await?
            .into_iter()
            .map(|record| DomainSummary {
                fields_count: record.fields_count(),
                domain: record.domain,
                url: record.url,
                is_enhanced: record.is_enhanced,
                updated_at: record.updated_at,
            })
            .collect();
        summaries.sort_by(|a, b| a.domain.cmp(&b.domain));
        Ok(summaries)
    }

    /// The first mapping per domain whose semantic field is `field`.
    pub async fn search_by_field(&self, field: &str) -> Result<Vec<FieldMatch>> {
        let mut matches: Vec<FieldMatch> = self
            .all_records()
            .await?
            .into_iter()
            .filter_map(|record| {
                let mapping = record
                    .mappings
                    .into_iter()
                    .find(|m| m.semantic_field.as_deref() == Some(field))?;
                Some(FieldMatch {
                    domain: record.domain,
                    selector: mapping.selector.clone(),
                    mapping,
                })
            })
            .collect();
        matches.sort_by(|a, b| a.domain.cmp(&b.domain));
        Ok(matches)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let records = self.all_records().await?;
        let mut frequency: BTreeMap<String, usize> = BTreeMap::new();
        for record in &records {
            let mut seen: Vec<&str> = Vec::new();
            for field in record.mappings.iter().filter_map(|m| m.semantic_field.as_deref()) {
                if !seen.contains(&field) {
                    seen.push(field);
                    *frequency.entry(field.to_string()).or_default() += 1;
                }
            }
        }

        let mut field_frequency: Vec<(String, usize)> = frequency.into_iter().collect();
        field_frequency.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Ok(StoreStats {
            total_domains: records.len(),
            total_fields: records.iter().map(|r| r.fields_count()).sum(),
            enhanced_domains: records.iter().filter(|r| r.is_enhanced).count(),
            field_frequency,
        })
    }

    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    async fn write_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().await;
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    async fn all_records(&self) -> Result<Vec<DomainMappingRecord>> {
        let backend = Arc::clone(&self.backend);
        let rows = tokio::task::spawn_blocking(move || backend.list())
            .await
            .map_err(ReplayError::storage)??;

        let mut records = Vec::with_capacity(rows.len());
        for (key, bytes) in rows {
            match serde_json::from_slice::<DomainMappingRecord>(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => warn!(domain = %key, error = %e, "skipping unreadable mapping record"),
            }
        }
        Ok(records)
    }

    async fn blocking_get(&self, key: String) -> Result<Option<Vec<u8>>> {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || backend.get(&key))
            .await
            .map_err(ReplayError::storage)?
    }

    async fn blocking_put(&self, key: String, bytes: Vec<u8>) -> Result<()> {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || backend.put(&key, &bytes))
            .await
            .map_err(ReplayError::storage)?
    }
}

fn dedupe_by_selector(mappings: Vec<FieldMapping>) -> Vec<FieldMapping> {
    let mut out: Vec<FieldMapping> = Vec::with_capacity(mappings.len());
    for mapping in mappings {
        match out.iter_mut().find(|m| m.selector == mapping.selector) {
            Some(existing) => *existing = mapping,
            None => out.push(mapping),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FillStrategy;
    use serde_json::json;
    use std::sync::mpsc;
    use tempfile::tempdir;
    use tokio::sync::oneshot;

    /// Memory backend whose next `get` parks after reading until released.
    struct GatedBackend {
        inner: MemoryBackend,
        gate: std::sync::Mutex<Option<(oneshot::Sender<()>, mpsc::Receiver<()>)>>,
    }

    impl MappingBackend for GatedBackend {
        fn put(&self, key: &str, value: &[u8]) -> Result<()> {
            self.inner.put(key, value)
        }

        fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            let gate = self.gate.lock().unwrap().take();
            let value = self.inner.get(key);
            if let Some((entered, release)) = gate {
                let _ = entered.send(());
                let _ = release.recv();
            }
            value
        }

        fn delete(&self, key: &str) -> Result<bool> {
            self.inner.delete(key)
        }

        fn list(&self) -> Result<Vec<(String, Vec<u8>)>> {
            self.inner.list()
        }
    }

    fn mappings() -> Vec<FieldMapping> {
        vec![
            FieldMapping::new("#first", Some("firstName")).with_sample("John"),
            FieldMapping::new("#email", Some("email")).with_sample("a@b.com"),
        ]
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let store = MappingStore::in_memory();
        assert!(!store.has("ex.test").await.unwrap());

        let record = store
            .save("https://Ex.test/signup", mappings(), Some("https://ex.test/signup"), None)
            .await
            .unwrap();
        assert_eq!(record.domain, "ex.test");
        assert!(!record.is_enhanced);

        assert!(store.has("ex.test").await.unwrap());
        let loaded = store.get("EX.TEST").await.unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].selector, "#first");
    }

    #[tokio::test]
    async fn test_save_replaces_wholesale_and_dedupes() {
        let store = MappingStore::in_memory();
        let first = store.save("ex.test", mappings(), None, None).await.unwrap();

        let replacement = vec![
            FieldMapping::new("#zip", Some("zip")),
            FieldMapping::new("#zip", Some("zip")).with_strategy(FillStrategy::CharByChar),
        ];
        let second = store
            .save("ex.test", replacement, None, Some(json!({"submit_selector": "#go"})))
            .await
            .unwrap();

        assert_eq!(second.mappings.len(), 1);
        assert_eq!(second.mappings[0].fill_strategy, Some(FillStrategy::CharByChar));
        assert!(second.is_enhanced);
        assert_eq!(second.url, "https://ex.test");
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(second.submit_selector(), Some("#go"));

        let cached = store.get_full("ex.test").await.unwrap().unwrap();
        assert_eq!(cached, second);
    }

    #[tokio::test]
    async fn test_delete_list_search_stats() {
        let store = MappingStore::in_memory();
        store.save("b.test", mappings(), None, None).await.unwrap();
        store
            .save("a.test", vec![FieldMapping::new("#mail", Some("email"))], None, None)
            .await
            .unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(
            listed.iter().map(|s| s.domain.as_str()).collect::<Vec<_>>(),
            vec!["a.test", "b.test"]
        );

        let found = store.search_by_field("email").await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].selector, "#mail");

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_domains, 2);
        assert_eq!(stats.total_fields, 3);
        assert_eq!(stats.field_frequency[0], ("email".to_string(), 2));

        assert!(store.delete("a.test").await.unwrap());
        assert!(!store.delete("a.test").await.unwrap());
        assert!(store.get("a.test").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_redb_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mappings.redb");
        {
            let store = MappingStore::open(&path).unwrap();
            store.save("ex.test", mappings(), None, None).await.unwrap();
        }
        let store = MappingStore::open(&path).unwrap();
        let record = store.get_full("ex.test").await.unwrap().unwrap();
        assert_eq!(record.mappings.len(), 2);

        store.clear_cache().await;
        assert!(store.has("ex.test").await.unwrap());
    }

    #[tokio::test]
    async fn test_configured_store_persists_between_opens() {
        let dir = tempdir().unwrap();
        let config = StoreConfig {
            path: dir.path().join("data").join("mappings.redb"),
            in_memory: false,
        };
        MappingStore::from_config(&config)
            .unwrap()
            .save("ex.test", mappings(), None, None)
            .await
            .unwrap();

        let reopened = MappingStore::from_config(&config).unwrap();
        assert_eq!(reopened.get("ex.test").await.unwrap().unwrap().len(), 2);

        let scratch = MappingStore::from_config(&StoreConfig {
            in_memory: true,
            ..config
        })
        .unwrap();
        assert!(!scratch.has("ex.test").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_saves_on_different_domains() {
        let store = Arc::new(MappingStore::in_memory());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let domain = format!("site{}.test", i);
                let mapping = FieldMapping::new(format!("#f{}", i), Some("email"));
                store.save(&domain, vec![mapping], None, None).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..8 {
            let record = store.get_full(&format!("site{}.test", i)).await.unwrap().unwrap();
            assert_eq!(record.mappings.len(), 1);
            assert_eq!(record.mappings[0].selector, format!("#f{}", i));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cache_fill_never_shadows_a_concurrent_save() {
        let backend = Arc::new(GatedBackend {
            inner: MemoryBackend::new(),
            gate: std::sync::Mutex::new(None),
        });
        let store = Arc::new(MappingStore::new(backend.clone()));
        store
            .save("ex.test", vec![FieldMapping::new("#old", Some("email"))], None, None)
            .await
            .unwrap();

        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *backend.gate.lock().unwrap() = Some((entered_tx, release_rx));

        let reader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.get_full("ex.test").await.unwrap() })
        };
        entered_rx.await.unwrap();

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .save("ex.test", vec![FieldMapping::new("#new", Some("email"))], None, None)
                    .await
                    .unwrap()
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        release_tx.send(()).unwrap();

        reader.await.unwrap();
        writer.await.unwrap();

        let record = store.get_full("ex.test").await.unwrap().unwrap();
        assert_eq!(record.mappings[0].selector, "#new");
        assert!(store.has("ex.test").await.unwrap());
    }
}
