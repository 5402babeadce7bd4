//! Cached-query invalidation seam
//!
//! Applications that cache gateway query results register their cache here
//! so login and logout can flush credential-scoped data. What and how the
//! cache stores is the application's concern.

/// Application-side query cache.
pub trait QueryCache: Send + Sync {
    /// Drop every cached query result.
    fn clear(&self);
}

/// Cache seam for applications without one.
#[derive(Debug, Default)]
pub struct NoopQueryCache;

impl QueryCache for NoopQueryCache {
    fn clear(&self) {}
}
