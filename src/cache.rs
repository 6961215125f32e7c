use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use serde_json::Value;
use tracing::debug;

const MAX_VIEWS: u64 = 1_000;
const VIEW_TTL: Duration = Duration::from_secs(5 * 60);

/// Rendered listing responses keyed by request URI (path plus query).
///
/// Readers take a [`generation`](Self::generation) before querying and hand
/// it back to [`put`](Self::put); a view computed across an invalidation is
/// never kept.
pub struct ViewCache {
    views: Cache<String, Value>,
    generation: AtomicU64,
}

impl Default for ViewCache {
    fn default() -> Self {
        Self::new(MAX_VIEWS, VIEW_TTL)
    }
}

fn path_of(key: &str) -> &str {
    key.split_once('?').map_or(key, |(path, _)| path)
}

impl ViewCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let views = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self {
            views,
            generation: AtomicU64::new(0),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.views.get(key).await
    }

    /// Stores `view` unless an invalidation happened since `generation` was
    /// read. Returns whether the view was kept.
    pub async fn put(&self, key: impl Into<String>, view: Value, generation: u64) -> bool {
        let key = key.into();
        self.views.insert(key.clone(), view).await;
        // Checked after the insert: a racing invalidation either bumped the
        // counter already or scans the cache after this entry landed.
        if self.generation() != generation {
            self.views.invalidate(&key).await;
            debug!(%key, "stale view discarded");
            return false;
        }
        true
    }

    /// Cached view for `key`, or `render`s and caches it. A view rendered
    /// while an invalidation ran is returned but not cached.
    pub async fn get_or_render<F, Fut>(&self, key: &str, render: F) -> anyhow::Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Value>>,
    {
        if let Some(view) = self.get(key).await {
            debug!(%key, "view cache hit");
            return Ok(view);
        }
        let generation = self.generation();
        let view = render().await?;
        self.put(key, view.clone(), generation).await;
        Ok(view)
    }

    /// Drops every cached view of `path`, whatever its query string.
    pub async fn invalidate(&self, path: &str) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let stale: Vec<_> = self
            .views
            .iter()
            .filter(|(key, _)| path_of(key) == path)
            .map(|(key, _)| key)
            .collect();
        for key in &stale {
            self.views.invalidate(key.as_str()).await;
        }
        debug!(path, dropped = stale.len(), "view cache invalidated");
        stale.len()
    }
}
