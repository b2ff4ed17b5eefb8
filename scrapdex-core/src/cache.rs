//! Local key-value cache backed by SQLite.
//!
//! Each entry holds a timestamp and a JSON payload. Freshness is a plain
//! wall-clock comparison; there is no other invalidation signal.

use crate::error::{Result, ScrapdexError};
use chrono::{DateTime, Duration, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};
use rusqlite_migration::{M, Migrations};

/// Key under which the processed catalog is stored.
pub const CATALOG_KEY: &str = "scrapdex:catalog:v1";

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        r#"
        CREATE TABLE IF NOT EXISTS kv_cache (
            key TEXT PRIMARY KEY NOT NULL,
            stored_at TEXT NOT NULL,
            payload TEXT NOT NULL
        );
        "#,
    )])
}

/// A cached payload with the time it was written.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub stored_at: DateTime<Utc>,
    pub payload: String,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        is_fresh(self.stored_at, now, ttl)
    }
}

/// True when less than `ttl` has elapsed since `stored_at`.
/// An entry stamped in the future (clock moved backwards) is stale.
pub fn is_fresh(stored_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    let elapsed = now.signed_duration_since(stored_at);
    elapsed >= Duration::zero() && elapsed < ttl
}

pub struct CacheStore {
    pool: Pool<SqliteConnectionManager>,
}

impl CacheStore {
    pub fn new(path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(ScrapdexError::Pool)?;

        let store = Self { pool };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(ScrapdexError::Pool)
    }

    fn run_migrations(&self) -> Result<()> {
        let mut conn = self.connection()?;
        migrations().to_latest(&mut conn)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.connection()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT stored_at, payload FROM kv_cache WHERE key = ?",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((stored_at, payload)) = row else {
            return Ok(None);
        };
        let stored_at = DateTime::parse_from_rfc3339(&stored_at)
            .map_err(|e| ScrapdexError::Parse(format!("Bad cache timestamp for {}: {}", key, e)))?
            .with_timezone(&Utc);
        Ok(Some(CacheEntry { stored_at, payload }))
    }

    pub fn put(&self, key: &str, stored_at: DateTime<Utc>, payload: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO kv_cache (key, stored_at, payload)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                stored_at = excluded.stored_at,
                payload = excluded.payload",
            params![key, stored_at.to_rfc3339(), payload],
        )?;
        Ok(())
    }

    /// Remove one key. Returns whether it existed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let conn = self.connection()?;
        let removed = conn.execute("DELETE FROM kv_cache WHERE key = ?", params![key])?;
        Ok(removed > 0)
    }

    pub fn clear(&self) -> Result<usize> {
        let conn = self.connection()?;
        Ok(conn.execute("DELETE FROM kv_cache", ())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, CacheStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(&dir.path().join("cache.sqlite")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_put_get_roundtrip_overwrites() {
        let (_dir, store) = store();
        let t0 = Utc::now();
        store.put(CATALOG_KEY, t0, "first").unwrap();
        store.put(CATALOG_KEY, t0 + Duration::minutes(1), "second").unwrap();

        let entry = store.get(CATALOG_KEY).unwrap().unwrap();
        assert_eq!(entry.payload, "second");
        assert_eq!(entry.stored_at.timestamp(), (t0 + Duration::minutes(1)).timestamp());
    }

    #[test]
    fn test_missing_key() {
        let (_dir, store) = store();
        assert!(store.get("absent").unwrap().is_none());
        assert!(!store.remove("absent").unwrap());
    }

    #[test]
    fn test_remove_and_clear() {
        let (_dir, store) = store();
        let now = Utc::now();
        store.put("a", now, "1").unwrap();
        store.put("b", now, "2").unwrap();
        assert!(store.remove("a").unwrap());
        assert!(store.get("a").unwrap().is_none());
        assert_eq!(store.clear().unwrap(), 1);
    }

    #[test]
    fn test_reopen_keeps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");
        CacheStore::new(&path).unwrap().put("k", Utc::now(), "v").unwrap();
        let reopened = CacheStore::new(&path).unwrap();
        assert_eq!(reopened.get("k").unwrap().unwrap().payload, "v");
    }

    #[test]
    fn test_freshness_window() {
        let stored = Utc::now();
        let ttl = Duration::minutes(10);
        assert!(is_fresh(stored, stored + Duration::minutes(9), ttl));
        assert!(!is_fresh(stored, stored + Duration::minutes(10), ttl));
        assert!(!is_fresh(stored, stored + Duration::hours(2), ttl));
    }

    #[test]
    fn test_future_timestamp_is_stale() {
        let now = Utc::now();
        let ttl = Duration::minutes(10);
        assert!(is_fresh(now, now, ttl));
        assert!(!is_fresh(now + Duration::minutes(1), now, ttl));
        assert!(!is_fresh(now + Duration::days(365), now, ttl));
    }
}
