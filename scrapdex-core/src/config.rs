//! Configuration loaded from a TOML file.
//!
//! Every field has a default, so an empty file is a valid configuration:
//! ```toml
//! [sources]
//! items_url = "https://example.org/api/items"
//! item_detail_url = "https://example.org/data/items/{id}.json"
//! page_limit = 100
//!
//! [fetch]
//! concurrency = 8
//! timeout_secs = 15
//! retries = 2
//!
//! [cache]
//! ttl_minutes = 60
//!
//! [classification]
//! precedence = ["quest", "upgrade", "project"]
//! upgrade_project_keywords = ["upgrade", "bench"]
//! ```

use crate::classify::ClassificationConfig;
use crate::error::{Result, ScrapdexError};
use crate::fetch::FetchPolicy;
use crate::models::Category;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Remote endpoints, or a local data directory.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SourcesConfig {
    /// Paginated item listing (`page`, `limit` query parameters).
    pub items_url: String,
    /// Paginated quest listing.
    pub quests_url: String,
    pub projects_url: String,
    pub trades_url: String,
    /// Per-item detail document; `{id}` is replaced by the item id.
    pub item_detail_url: Option<String>,
    pub page_limit: u32,
    pub max_pages: u32,
    /// Skip TLS verification for the upstream host.
    pub accept_invalid_certs: bool,
    /// Read static JSON files from this directory instead of the network.
    pub data_dir: Option<PathBuf>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            items_url: "http://127.0.0.1:8080/api/items".to_string(),
            quests_url: "http://127.0.0.1:8080/api/quests".to_string(),
            projects_url: "http://127.0.0.1:8080/data/projects.json".to_string(),
            trades_url: "http://127.0.0.1:8080/data/trades.json".to_string(),
            item_detail_url: None,
            page_limit: 100,
            max_pages: 50,
            accept_invalid_certs: false,
            data_dir: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub ttl_minutes: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("./scrapdex.sqlite"),
            ttl_minutes: 60,
        }
    }
}

impl CacheConfig {
    /// Expiry window. Fails when `ttl_minutes` does not fit a duration.
    pub fn ttl(&self) -> Result<chrono::Duration> {
        chrono::Duration::try_minutes(self.ttl_minutes).ok_or_else(|| {
            ScrapdexError::Config(format!("cache.ttl_minutes {} is out of range", self.ttl_minutes))
        })
    }
}

/// Complete configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub sources: SourcesConfig,
    pub fetch: FetchPolicy,
    pub cache: CacheConfig,
    pub classification: ClassificationConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScrapdexError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config from {:?}: {}", path, e),
            ))
        })?;

        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| ScrapdexError::Config(format!("Failed to parse config TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch.concurrency == 0 {
            return Err(ScrapdexError::Config("fetch.concurrency must be at least 1".to_string()));
        }
        if self.sources.page_limit == 0 {
            return Err(ScrapdexError::Config("sources.page_limit must be at least 1".to_string()));
        }
        if self.cache.ttl_minutes < 0 {
            return Err(ScrapdexError::Config("cache.ttl_minutes must not be negative".to_string()));
        }
        self.cache.ttl()?;
        let precedence = &self.classification.precedence;
        if precedence.contains(&Category::Recycle) {
            return Err(ScrapdexError::Config(
                "classification.precedence must not list 'recycle', it is the default".to_string(),
            ));
        }
        for (i, category) in precedence.iter().enumerate() {
            if precedence[..i].contains(category) {
                return Err(ScrapdexError::Config(format!(
                    "classification.precedence lists '{}' twice",
                    category
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.sources.page_limit, 100);
        assert_eq!(config.cache.ttl_minutes, 60);
        assert!(config.cache.enabled);
        assert_eq!(
            config.classification.precedence,
            vec![Category::Quest, Category::Project, Category::Upgrade]
        );
        assert_eq!(config.fetch.concurrency, 8);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[sources]
items_url = "https://example.org/api/items"
item_detail_url = "https://example.org/items/{id}.json"
page_limit = 25
accept_invalid_certs = true

[fetch]
concurrency = 4
retries = 0

[cache]
ttl_minutes = 5

[classification]
precedence = ["quest", "upgrade", "project"]
quest_keywords = ["key"]
"#;

        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.sources.items_url, "https://example.org/api/items");
        assert_eq!(config.sources.page_limit, 25);
        assert!(config.sources.accept_invalid_certs);
        assert_eq!(config.fetch.concurrency, 4);
        assert_eq!(config.fetch.retries, 0);
        assert_eq!(config.fetch.timeout_secs, 15);
        assert_eq!(config.cache.ttl().unwrap(), chrono::Duration::minutes(5));
        assert_eq!(config.classification.precedence[1], Category::Upgrade);
        assert_eq!(config.classification.quest_keywords, vec!["key".to_string()]);
    }

    #[test]
    fn test_invalid_precedence_rejected() {
        let dup = "[classification]\nprecedence = [\"quest\", \"quest\"]\n";
        assert!(Config::from_str(dup).is_err());
        let recycle = "[classification]\nprecedence = [\"recycle\"]\n";
        assert!(Config::from_str(recycle).is_err());
    }

    #[test]
    fn test_out_of_range_ttl_rejected() {
        let huge = "[cache]\nttl_minutes = 9223372036854775807\n";
        assert!(matches!(Config::from_str(huge), Err(ScrapdexError::Config(_))));

        let cache = CacheConfig {
            ttl_minutes: i64::MAX,
            ..CacheConfig::default()
        };
        assert!(cache.ttl().is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(Config::from_str("[fetch]\nconcurrency = 0\n").is_err());
    }
}
