//! Route cache
//!
//! Routing decisions depend only on the destination, the link the packet
//! arrived on and its option bits, as long as the connection table does
//! not change. [`RouteCache`] remembers the most recently used decisions
//! under that key and is cleared wholesale on any topology change.
//!
//! The cache itself is not synchronized; [`RouteState`](crate::RouteState)
//! owns it behind the router's lock.

use std::num::NonZeroUsize;
use std::sync::Arc;

use annulus_core::{Address, Connection, LinkId, RouteOptions};
use lru::LruCache;

/// Everything a cached decision depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub destination: Address,
    /// `None` for locally originated packets
    pub inbound: Option<LinkId>,
    pub options: RouteOptions,
}

/// A routing decision: at most one next hop, plus whether to deliver here
#[derive(Debug, Clone, Default)]
pub struct CachedRoute {
    pub next_hop: Option<Arc<Connection>>,
    pub deliver_locally: bool,
}

impl CachedRoute {
    /// Deliver here, forward nowhere
    pub fn local() -> Self {
        Self {
            next_hop: None,
            deliver_locally: true,
        }
    }

    /// Forward to `next`, don't deliver here
    pub fn forward(next: Arc<Connection>) -> Self {
        Self {
            next_hop: Some(next),
            deliver_locally: false,
        }
    }

    /// Neither forward nor deliver
    pub fn nowhere() -> Self {
        Self::default()
    }
}

/// Bounded LRU map from [`CacheKey`] to [`CachedRoute`]
pub struct RouteCache {
    entries: LruCache<CacheKey, CachedRoute>,
}

impl RouteCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Look up a decision, marking it most recently used
    pub fn get(&mut self, key: &CacheKey) -> Option<CachedRoute> {
        self.entries.get(key).cloned()
    }

    /// Insert or refresh a decision, evicting the least recently used entry at capacity
    pub fn put(&mut self, key: CacheKey, route: CachedRoute) {
        self.entries.put(key, route);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}
