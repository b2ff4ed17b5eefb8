//! Data sources and the bounded-concurrency fetch pool.

use crate::config::SourcesConfig;
use crate::error::{Result, ScrapdexError};
use crate::file_utils::{file_stem, find_files_with_extension, read_json_file};
use crate::models::RawItem;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use rayon::prelude::*;
use serde::Deserialize;
use serde_json::Value;
use std::fmt::Display;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

/// Concurrency, timeout and retry policy for outbound requests.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FetchPolicy {
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
    /// Fetch the per-item detail document for every item while loading.
    pub enrich_details: bool,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            concurrency: 8,
            timeout_secs: 15,
            retries: 2,
            retry_delay_ms: 500,
            enrich_details: false,
        }
    }
}

impl FetchPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Run `op` under the policy's timeout, retrying failures up to `retries` times.
pub async fn with_retry<T, F, Fut>(policy: &FetchPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        let outcome = match tokio::time::timeout(policy.timeout(), op()).await {
            Ok(result) => result,
            Err(_) => Err(ScrapdexError::Timeout(label.to_string())),
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.retries => {
                attempt += 1;
                tracing::debug!("{} failed (attempt {}): {}, retrying", label, attempt, e);
                tokio::time::sleep(policy.retry_delay()).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Fetch every key with at most `policy.concurrency` requests in flight.
///
/// Keys that still fail after retries are dropped from the result.
pub async fn fetch_all<K, T, F, Fut>(policy: &FetchPolicy, keys: Vec<K>, fetch: F) -> Vec<(K, T)>
where
    K: Clone + Display,
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let fetch = &fetch;
    stream::iter(keys)
        .map(|key| async move {
            let label = key.to_string();
            let result = with_retry(policy, &label, || fetch(key.clone())).await;
            (key, result)
        })
        .buffer_unordered(policy.concurrency.max(1))
        .filter_map(|(key, result)| async move {
            match result {
                Ok(value) => Some((key, value)),
                Err(e) => {
                    tracing::warn!("Dropping {}: {}", key, e);
                    None
                }
            }
        })
        .collect()
        .await
}

/// Records of a listing response: a bare array or a `data`/`items`/`results` envelope.
pub fn records_of(doc: &Value) -> Vec<Value> {
    match doc {
        Value::Array(records) => records.clone(),
        Value::Object(map) => ["data", "items", "results", "quests", "projects", "trades"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn total_pages(doc: &Value) -> Option<u32> {
    let pagination = doc.get("pagination").unwrap_or(doc);
    ["totalPages", "total_pages", "pages"]
        .iter()
        .find_map(|key| pagination.get(*key).and_then(Value::as_u64))
        .map(|n| n as u32)
}

fn has_next_page(doc: &Value) -> Option<bool> {
    let pagination = doc.get("pagination").unwrap_or(doc);
    ["hasNextPage", "has_next_page", "hasMore"]
        .iter()
        .find_map(|key| pagination.get(*key).and_then(Value::as_bool))
}

/// Collect every record of a paginated listing; `fetch_page` takes a 1-based page number.
///
/// With a known page count the remaining pages go through `fetch_all`. Otherwise pages
/// are walked in order until `hasNextPage` is false, a page comes back short or
/// `max_pages` is reached. Only the first page is required to succeed.
pub async fn walk_pages<F, Fut>(
    policy: &FetchPolicy,
    label: &str,
    limit: usize,
    max_pages: u32,
    fetch_page: F,
) -> Result<Vec<Value>>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<Value>>,
{
    let max_pages = max_pages.max(1);
    let first = with_retry(policy, label, || fetch_page(1)).await?;
    let mut records = records_of(&first);

    if let Some(total) = total_pages(&first) {
        let pages: Vec<u32> = (2..=total.min(max_pages)).collect();
        let mut rest = fetch_all(policy, pages, &fetch_page).await;
        rest.sort_by_key(|(page, _)| *page);
        for (_, doc) in rest {
            records.extend(records_of(&doc));
        }
    } else {
        let mut page = 1;
        let mut more = has_next_page(&first).unwrap_or(records.len() >= limit);
        while more && page < max_pages {
            page += 1;
            match with_retry(policy, label, || fetch_page(page)).await {
                Ok(doc) => {
                    let batch = records_of(&doc);
                    more = has_next_page(&doc).unwrap_or(batch.len() >= limit) && !batch.is_empty();
                    records.extend(batch);
                }
                Err(e) => {
                    tracing::warn!("Stopping pagination of {} at page {}: {}", label, page, e);
                    break;
                }
            }
        }
    }

    tracing::debug!("Fetched {} records from {}", records.len(), label);
    Ok(records)
}

/// Where raw records come from.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// The primary item list. Failure here is fatal to a load.
    async fn fetch_items(&self) -> Result<Vec<RawItem>>;
    async fn fetch_quests(&self) -> Result<Vec<Value>>;
    async fn fetch_projects(&self) -> Result<Vec<Value>>;
    async fn fetch_trades(&self) -> Result<Vec<Value>>;
    /// Per-item detail document; `None` when the source has none.
    async fn fetch_item_detail(&self, id: &str) -> Result<Option<Value>>;
}

#[async_trait]
impl<T: DataSource + ?Sized> DataSource for Box<T> {
    async fn fetch_items(&self) -> Result<Vec<RawItem>> {
        (**self).fetch_items().await
    }

    async fn fetch_quests(&self) -> Result<Vec<Value>> {
        (**self).fetch_quests().await
    }

    async fn fetch_projects(&self) -> Result<Vec<Value>> {
        (**self).fetch_projects().await
    }

    async fn fetch_trades(&self) -> Result<Vec<Value>> {
        (**self).fetch_trades().await
    }

    async fn fetch_item_detail(&self, id: &str) -> Result<Option<Value>> {
        (**self).fetch_item_detail(id).await
    }
}

/// Live REST endpoints plus static JSON dataset URLs.
pub struct HttpSource {
    client: reqwest::Client,
    sources: SourcesConfig,
    policy: FetchPolicy,
}

impl HttpSource {
    pub fn new(sources: SourcesConfig, policy: FetchPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(policy.timeout())
            .danger_accept_invalid_certs(sources.accept_invalid_certs)
            .user_agent(concat!("scrapdex/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            sources,
            policy,
        })
    }

    async fn get_json(&self, url: &str, page: Option<u32>) -> Result<Value> {
        let mut request = self.client.get(url);
        if let Some(page) = page {
            request = request.query(&[("page", page), ("limit", self.sources.page_limit)]);
        }
        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<Value>().await?)
    }

    async fn get_paginated(&self, url: &str) -> Result<Vec<Value>> {
        walk_pages(
            &self.policy,
            url,
            self.sources.page_limit as usize,
            self.sources.max_pages,
            |page| self.get_json(url, Some(page)),
        )
        .await
    }

    async fn get_static(&self, url: &str) -> Result<Vec<Value>> {
        let doc = with_retry(&self.policy, url, || self.get_json(url, None)).await?;
        Ok(records_of(&doc))
    }
}

#[async_trait]
impl DataSource for HttpSource {
    async fn fetch_items(&self) -> Result<Vec<RawItem>> {
        let records = self.get_paginated(&self.sources.items_url).await?;
        Ok(records.into_iter().map(RawItem::new).collect())
    }

    async fn fetch_quests(&self) -> Result<Vec<Value>> {
        self.get_paginated(&self.sources.quests_url).await
    }

    async fn fetch_projects(&self) -> Result<Vec<Value>> {
        self.get_static(&self.sources.projects_url).await
    }

    async fn fetch_trades(&self) -> Result<Vec<Value>> {
        self.get_static(&self.sources.trades_url).await
    }

    async fn fetch_item_detail(&self, id: &str) -> Result<Option<Value>> {
        let Some(template) = &self.sources.item_detail_url else {
            return Ok(None);
        };
        let url = template.replace("{id}", id);
        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let doc = response.error_for_status()?.json::<Value>().await?;
        Ok(Some(doc))
    }
}

/// Static JSON files on disk:
/// `items/*.json` (one file per item), `quests.json`, `projects.json`, `trades.json`.
pub struct LocalSource {
    dir: PathBuf,
}

impl LocalSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn dataset(&self, name: &str) -> Result<Vec<Value>> {
        let doc = read_json_file(&self.dir.join(name))?;
        Ok(records_of(&doc))
    }
}

#[async_trait]
impl DataSource for LocalSource {
    async fn fetch_items(&self) -> Result<Vec<RawItem>> {
        let items_dir = self.dir.join("items");
        if !items_dir.is_dir() {
            let records = self.dataset("items.json")?;
            return Ok(records.into_iter().map(RawItem::new).collect());
        }

        let files = find_files_with_extension(&items_dir, "json")?;
        let items: Vec<RawItem> = files
            .par_iter()
            .filter_map(|path| match read_json_file(path) {
                Ok(doc) => Some(match file_stem(path) {
                    Some(stem) => RawItem::from_file(stem, doc),
                    None => RawItem::new(doc),
                }),
                Err(e) => {
                    tracing::warn!("Failed to read {:?}: {}", path, e);
                    None
                }
            })
            .collect();
        if items.is_empty() && !files.is_empty() {
            return Err(ScrapdexError::Parse(format!(
                "No readable item files in {}",
                items_dir.display()
            )));
        }
        Ok(items)
    }

    async fn fetch_quests(&self) -> Result<Vec<Value>> {
        self.dataset("quests.json")
    }

    async fn fetch_projects(&self) -> Result<Vec<Value>> {
        self.dataset("projects.json")
    }

    async fn fetch_trades(&self) -> Result<Vec<Value>> {
        self.dataset("trades.json")
    }

    async fn fetch_item_detail(&self, id: &str) -> Result<Option<Value>> {
        let path = self.dir.join("items").join(format!("{}.json", id));
        if !path.exists() {
            return Ok(None);
        }
        read_json_file(&path).map(Some)
    }
}
