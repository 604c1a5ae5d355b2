use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Cache key of the broadcast list view
pub const MAIL_LIST_PATH: &str = "/mails";

/// Cache key of one broadcast detail view
#[must_use]
pub fn mail_detail_path(mail_id: &str) -> String {
    format!("{MAIL_LIST_PATH}/{mail_id}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    body: String,
    rendered_at: DateTime<Utc>,
}

/// How much of the key space an invalidation covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidate {
    /// Only the exact path
    Page,
    /// The path and every path nested under it
    Layout,
}

/// Rendered views keyed by path, stored in sled.
///
/// Entries older than the configured time-to-live read as misses, so a
/// persistent cache never serves views rendered by an earlier run forever.
pub struct ViewCache {
    db: sled::Db,
    ttl: Option<Duration>,
}

impl ViewCache {
    /// Open (or create) the cache at `directory`
    pub fn open(directory: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(directory.as_ref())?;
        let db = sled::open(directory.as_ref())?;
        Ok(Self { db, ttl: None })
    }

    /// A throwaway cache that is removed on drop
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db, ttl: None })
    }

    /// Treat entries rendered more than `ttl` ago as misses
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        // A clock that moved backwards yields a negative age; keep the entry
        (Utc::now() - entry.rendered_at).to_std().is_ok_and(|age| age >= ttl)
    }

    /// Cached body for `path`, unless it has expired
    pub fn get(&self, path: &str) -> Result<Option<String>> {
        let Some(data) = self.db.get(path.as_bytes())? else {
            return Ok(None);
        };
        let entry: CacheEntry = bincode::deserialize(&data)?;
        if self.is_expired(&entry) {
            debug!(path, rendered_at = %entry.rendered_at, "View cache entry expired");
            self.db.remove(path.as_bytes())?;
            return Ok(None);
        }
        debug!(path, rendered_at = %entry.rendered_at, "View cache hit");
        Ok(Some(entry.body))
    }

    /// Store a rendered body for `path`
    pub fn put(&self, path: &str, body: &str) -> Result<()> {
        let entry = CacheEntry {
            body: body.to_string(),
            rendered_at: Utc::now(),
        };
        self.db.insert(path.as_bytes(), bincode::serialize(&entry)?)?;
        Ok(())
    }

    /// Drop cached renderings; returns how many entries were removed
    pub fn invalidate(&self, path: &str, scope: Invalidate) -> Result<usize> {
        let mut removed = usize::from(self.db.remove(path.as_bytes())?.is_some());

        if scope == Invalidate::Layout {
            let nested = format!("{}/", path.trim_end_matches('/'));
            let keys = self
                .db
                .scan_prefix(nested.as_bytes())
                .keys()
                .collect::<std::result::Result<Vec<_>, _>>()?;
            for key in keys {
                if self.db.remove(key)?.is_some() {
                    removed += 1;
                }
            }
        }

        debug!(path, ?scope, removed, "Invalidated view cache");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_invalidation_covers_nested_paths() {
        let cache = ViewCache::temporary().expect("cache");
        cache.put(MAIL_LIST_PATH, "list").expect("put");
        cache.put(&mail_detail_path("a"), "a").expect("put");
        cache.put(&mail_detail_path("b"), "b").expect("put");
        cache.put("/mailsx", "unrelated").expect("put");

        let removed = cache.invalidate(MAIL_LIST_PATH, Invalidate::Layout).expect("invalidate");
        assert_eq!(removed, 3);
        assert!(cache.get(&mail_detail_path("b")).expect("get").is_none());
        assert_eq!(cache.get("/mailsx").expect("get").as_deref(), Some("unrelated"));
    }

    #[test]
    fn test_page_invalidation_is_exact() {
        let cache = ViewCache::temporary().expect("cache");
        cache.put(MAIL_LIST_PATH, "list").expect("put");
        cache.put(&mail_detail_path("a"), "a").expect("put");

        assert_eq!(cache.invalidate(MAIL_LIST_PATH, Invalidate::Page).expect("invalidate"), 1);
        assert!(cache.get(&mail_detail_path("a")).expect("get").is_some());
    }

    #[test]
    fn test_expired_entries_read_as_misses() {
        let cache = ViewCache::temporary().expect("cache").with_ttl(Duration::ZERO);
        cache.put(MAIL_LIST_PATH, "list").expect("put");
        assert!(cache.get(MAIL_LIST_PATH).expect("get").is_none());
        // Expired entries are dropped on read
        assert_eq!(cache.invalidate(MAIL_LIST_PATH, Invalidate::Page).expect("invalidate"), 0);
    }

    #[test]
    fn test_fresh_entries_within_ttl_are_served() {
        let cache = ViewCache::temporary()
            .expect("cache")
            .with_ttl(Duration::from_secs(3600));
        cache.put(MAIL_LIST_PATH, "list").expect("put");
        assert_eq!(cache.get(MAIL_LIST_PATH).expect("get").as_deref(), Some("list"));
    }
}
