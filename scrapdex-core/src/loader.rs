//! Load pipeline: cache check, fetch, normalize, link, classify, store.

use crate::cache::{CATALOG_KEY, CacheStore};
use crate::classify::{ClassificationConfig, classify_all};
use crate::error::{Result, ScrapdexError};
use crate::fetch::{DataSource, FetchPolicy, fetch_all};
use crate::linker::{KeyResolver, ReferenceIndex, canonicalize_items};
use crate::models::{Catalog, Item, ItemDetail};
use crate::normalize::{
    merge_detail, normalize_all, normalize_item, normalize_project, normalize_quest,
    normalize_trade,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashSet;

/// Where a catalog came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrigin {
    Cache,
    Network,
}

#[derive(Debug, Clone)]
pub struct LoaderSettings {
    pub ttl: Duration,
    pub policy: FetchPolicy,
    pub classification: ClassificationConfig,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(60),
            policy: FetchPolicy::default(),
            classification: ClassificationConfig::default(),
        }
    }
}

pub struct Loader<S: DataSource> {
    source: S,
    cache: Option<CacheStore>,
    settings: LoaderSettings,
}

/// An auxiliary dataset failure degrades to an empty list.
fn or_empty(result: Result<Vec<Value>>, name: &str) -> Vec<Value> {
    match result {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!("Failed to load {} dataset, continuing without it: {}", name, e);
            Vec::new()
        }
    }
}

impl<S: DataSource> Loader<S> {
    pub fn new(source: S, cache: Option<CacheStore>, settings: LoaderSettings) -> Self {
        Self {
            source,
            cache,
            settings,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Load the catalog, reusing the cached copy while it is fresh.
    pub async fn load(&self, now: DateTime<Utc>) -> Result<(Catalog, LoadOrigin)> {
        if let Some(catalog) = self.cached(now)? {
            tracing::info!("Using cached catalog from {}", catalog.built_at);
            return Ok((catalog, LoadOrigin::Cache));
        }
        let catalog = self.fetch_catalog(now).await?;
        self.store(&catalog);
        Ok((catalog, LoadOrigin::Network))
    }

    /// Drop the cached catalog and load from the sources.
    pub async fn refresh(&self, now: DateTime<Utc>) -> Result<Catalog> {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.remove(CATALOG_KEY) {
                tracing::warn!("Failed to clear cached catalog: {}", e);
            }
        }
        let catalog = self.fetch_catalog(now).await?;
        self.store(&catalog);
        Ok(catalog)
    }

    fn cached(&self, now: DateTime<Utc>) -> Result<Option<Catalog>> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        let entry = match cache.get(CATALOG_KEY) {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(None),
            Err(ScrapdexError::Parse(e)) => {
                tracing::warn!("Ignoring unreadable cache entry: {}", e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if !entry.is_fresh(now, self.settings.ttl) {
            tracing::info!("Cached catalog from {} expired", entry.stored_at);
            return Ok(None);
        }
        match serde_json::from_str::<Catalog>(&entry.payload) {
            Ok(catalog) => Ok(Some(catalog)),
            Err(e) => {
                tracing::warn!("Ignoring unreadable cached catalog: {}", e);
                Ok(None)
            }
        }
    }

    /// Write the catalog to the cache. A failed write only costs the next load a refetch.
    fn store(&self, catalog: &Catalog) {
        let Some(cache) = &self.cache else {
            return;
        };
        let written = serde_json::to_string(catalog)
            .map_err(ScrapdexError::from)
            .and_then(|payload| cache.put(CATALOG_KEY, catalog.built_at, &payload));
        if let Err(e) = written {
            tracing::warn!("Failed to cache catalog, continuing without it: {}", e);
        }
    }

    /// Fetch all datasets concurrently and build a fresh catalog.
    pub async fn fetch_catalog(&self, now: DateTime<Utc>) -> Result<Catalog> {
        let (items, quests, projects, trades) = tokio::join!(
            self.source.fetch_items(),
            self.source.fetch_quests(),
            self.source.fetch_projects(),
            self.source.fetch_trades(),
        );

        let raw_items = items.map_err(|e| ScrapdexError::PrimaryFetch(e.to_string()))?;
        let quests = or_empty(quests, "quest");
        let projects = or_empty(projects, "project");
        let trades = or_empty(trades, "trade");

        tracing::info!(
            "Fetched {} items, {} quests, {} projects, {} trades",
            raw_items.len(),
            quests.len(),
            projects.len(),
            trades.len()
        );

        let mut seen = HashSet::new();
        let mut items: Vec<Item> = raw_items
            .iter()
            .filter_map(normalize_item)
            .filter(|item| seen.insert(item.id.clone()))
            .collect();
        if items.len() < raw_items.len() {
            tracing::debug!(
                "Skipped {} unusable or duplicate item records",
                raw_items.len() - items.len()
            );
        }

        if self.settings.policy.enrich_details {
            self.enrich(&mut items).await;
        }
        canonicalize_items(&mut items);

        let quests = normalize_all(&quests, "quest", normalize_quest);
        let projects = normalize_all(&projects, "project", normalize_project);
        let trades = normalize_all(&trades, "trade", normalize_trade);

        let classification = &self.settings.classification;
        let index = ReferenceIndex::build(
            &items,
            &quests,
            &projects,
            &trades,
            &classification.upgrade_project_keywords,
        );
        let overlaps = classify_all(&mut items, &index, classification);
        if overlaps > 0 {
            tracing::info!("{} items matched more than one category", overlaps);
        }

        Ok(Catalog {
            items,
            index,
            built_at: now,
        })
    }

    /// Merge per-item detail documents into the summary records.
    async fn enrich(&self, items: &mut [Item]) {
        let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
        let source = &self.source;
        let details = fetch_all(&self.settings.policy, ids, |id| async move {
            source.fetch_item_detail(&id).await
        })
        .await;

        let mut merged = 0;
        for (id, detail) in details {
            let Some(doc) = detail else { continue };
            if let Some(item) = items.iter_mut().find(|item| item.id == id) {
                merge_detail(item, &doc);
                merged += 1;
            }
        }
        tracing::info!("Merged {} item detail documents", merged);
    }

    /// Expanded view of one item. A failed detail fetch falls back to the summary.
    pub async fn item_detail(&self, catalog: &Catalog, id: &str) -> Result<ItemDetail> {
        let item = catalog
            .find(id)
            .ok_or_else(|| ScrapdexError::NotFound(format!("Item {}", id)))?;
        let mut detail = catalog.index.detail(item);

        match self.source.fetch_item_detail(id).await {
            Ok(Some(doc)) => merge_detail(&mut detail.item, &doc),
            Ok(None) => {}
            Err(e) => tracing::warn!("Detail for {} unavailable, using summary: {}", id, e),
        }
        let resolver = KeyResolver::new(&catalog.items);
        for reference in detail
            .item
            .recipe
            .iter_mut()
            .chain(detail.item.recycles_into.iter_mut())
        {
            if let Some(canonical) = resolver.resolve(&reference.item_id) {
                reference.item_id = canonical.to_string();
            }
        }
        if detail.crafted_from.is_empty() {
            detail.crafted_from = detail.item.recipe.clone();
        }
        if detail.recycles_into.is_empty() {
            detail.recycles_into = detail.item.recycles_into.clone();
        }
        Ok(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawItem;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockSource {
        items: Vec<Value>,
        quests: Vec<Value>,
        projects: Vec<Value>,
        fail_items: bool,
        fail_quests: bool,
        item_calls: AtomicUsize,
        detail_calls: AtomicUsize,
    }

    #[async_trait]
    impl DataSource for MockSource {
        async fn fetch_items(&self) -> Result<Vec<RawItem>> {
            self.item_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_items {
                return Err(ScrapdexError::Parse("upstream down".to_string()));
            }
            Ok(self.items.iter().cloned().map(RawItem::new).collect())
        }

        async fn fetch_quests(&self) -> Result<Vec<Value>> {
            if self.fail_quests {
                return Err(ScrapdexError::Parse("quests down".to_string()));
            }
            Ok(self.quests.clone())
        }

        async fn fetch_projects(&self) -> Result<Vec<Value>> {
            Ok(self.projects.clone())
        }

        async fn fetch_trades(&self) -> Result<Vec<Value>> {
            Ok(Vec::new())
        }

        async fn fetch_item_detail(&self, id: &str) -> Result<Option<Value>> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            if id == "wire" {
                Ok(Some(json!({"description": "Copper wire", "recipe": {"copper": 2}})))
            } else {
                Err(ScrapdexError::NotFound(id.to_string()))
            }
        }
    }

    fn wire_source() -> MockSource {
        MockSource {
            items: vec![
                json!({"id": "wire", "name": "Wire", "value": 40}),
                json!({"id": "battery", "name": "Battery", "value": 120}),
                json!({"id": "rusted_gear", "name": "Rusted Gear", "value": 300}),
            ],
            quests: vec![json!({"name": "Power Up", "objectives": [{"itemId": "battery", "count": 1}]})],
            projects: vec![json!({"name": "Bench Upgrade", "cost": [{"item": "wire", "count": 2}]})],
            ..MockSource::default()
        }
    }

    fn settings() -> LoaderSettings {
        LoaderSettings {
            ttl: Duration::minutes(30),
            ..LoaderSettings::default()
        }
    }

    #[tokio::test]
    async fn test_end_to_end_upgrade_item() {
        let loader = Loader::new(wire_source(), None, settings());
        let (catalog, origin) = loader.load(Utc::now()).await.unwrap();
        assert_eq!(origin, LoadOrigin::Network);

        let wire = catalog.find("wire").unwrap();
        assert!(wire.is_upgrade_item());
        assert!(!wire.is_safe_to_recycle());
        let usages = catalog.index.projects_using("wire");
        assert_eq!(usages.len(), 1);
        assert_eq!(usages[0].project, "Bench Upgrade");
        assert_eq!(usages[0].count, 2);

        assert!(catalog.find("battery").unwrap().is_quest_item());
        assert!(catalog.find("rusted_gear").unwrap().is_safe_to_recycle());
    }

    #[tokio::test]
    async fn test_cache_reuse_within_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(&dir.path().join("cache.sqlite")).unwrap();
        let loader = Loader::new(wire_source(), Some(cache), settings());
        let t0 = Utc::now();

        let (_, first) = loader.load(t0).await.unwrap();
        let (catalog, second) = loader.load(t0 + Duration::minutes(10)).await.unwrap();
        assert_eq!(first, LoadOrigin::Network);
        assert_eq!(second, LoadOrigin::Cache);
        assert_eq!(loader.source().item_calls.load(Ordering::SeqCst), 1);
        assert!(catalog.find("wire").unwrap().is_upgrade_item());

        let (_, third) = loader.load(t0 + Duration::minutes(31)).await.unwrap();
        assert_eq!(third, LoadOrigin::Network);
        assert_eq!(loader.source().item_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refresh_bypasses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(&dir.path().join("cache.sqlite")).unwrap();
        let loader = Loader::new(wire_source(), Some(cache), settings());
        let t0 = Utc::now();

        loader.load(t0).await.unwrap();
        loader.refresh(t0 + Duration::minutes(1)).await.unwrap();
        assert_eq!(loader.source().item_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_write_failure_still_returns_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(&dir.path().join("cache.sqlite")).unwrap();
        cache
            .connection()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_writes BEFORE INSERT ON kv_cache
                 BEGIN SELECT RAISE(ABORT, 'read-only'); END;",
            )
            .unwrap();
        let loader = Loader::new(wire_source(), Some(cache), settings());
        let t0 = Utc::now();

        let (catalog, origin) = loader.load(t0).await.unwrap();
        assert_eq!(origin, LoadOrigin::Network);
        assert!(catalog.find("wire").unwrap().is_upgrade_item());

        let refreshed = loader.refresh(t0 + Duration::minutes(1)).await.unwrap();
        assert_eq!(refreshed.items.len(), 3);
        assert_eq!(loader.source().item_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_primary_failure_is_error() {
        let source = MockSource {
            fail_items: true,
            ..wire_source()
        };
        let loader = Loader::new(source, None, settings());
        let err = loader.load(Utc::now()).await.unwrap_err();
        assert!(matches!(err, ScrapdexError::PrimaryFetch(_)));
    }

    #[tokio::test]
    async fn test_auxiliary_failure_degrades_to_no_matches() {
        let source = MockSource {
            fail_quests: true,
            ..wire_source()
        };
        let loader = Loader::new(source, None, settings());
        let (catalog, _) = loader.load(Utc::now()).await.unwrap();
        assert!(catalog.find("battery").unwrap().is_safe_to_recycle());
        assert!(catalog.find("wire").unwrap().is_upgrade_item());
    }

    #[tokio::test]
    async fn test_item_detail_falls_back_to_summary() {
        let loader = Loader::new(wire_source(), None, settings());
        let (catalog, _) = loader.load(Utc::now()).await.unwrap();

        let wire = loader.item_detail(&catalog, "wire").await.unwrap();
        assert_eq!(wire.item.description, "Copper wire");
        assert_eq!(wire.crafted_from.len(), 1);
        assert_eq!(wire.used_in[0].count, 2);

        let battery = loader.item_detail(&catalog, "battery").await.unwrap();
        assert_eq!(battery.item.name, "Battery");
        assert_eq!(battery.quests, vec!["Power Up".to_string()]);

        assert!(loader.item_detail(&catalog, "hammer").await.is_err());
    }

    #[tokio::test]
    async fn test_enrich_details_merges_documents() {
        let settings = LoaderSettings {
            policy: FetchPolicy {
                enrich_details: true,
                retries: 0,
                ..FetchPolicy::default()
            },
            ..settings()
        };
        let loader = Loader::new(wire_source(), None, settings);
        let (catalog, _) = loader.load(Utc::now()).await.unwrap();
        assert_eq!(catalog.find("wire").unwrap().description, "Copper wire");
        assert_eq!(loader.source().detail_calls.load(Ordering::SeqCst), 3);
    }
}
