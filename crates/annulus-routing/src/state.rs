//! Router-local mutable state
//!
//! The route cache and the cached left neighbor change together on
//! topology events and are read together on the routing path, so both
//! live under a single mutex. Every accessor copies what it needs and
//! releases the lock before returning; no table query or send ever
//! happens while it is held.
//!
//! Because the table is read outside the lock, every topology change
//! bumps a generation counter. A decision computed from a table read
//! that started before the change is not stored.

use std::num::NonZeroUsize;
use std::sync::Arc;

use annulus_core::Connection;
use parking_lot::Mutex;

use crate::cache::{CacheKey, CachedRoute, RouteCache};

struct Inner {
    cache: RouteCache,
    left_neighbor: Option<Arc<Connection>>,
    generation: u64,
}

/// Result of a cache lookup, stamped with the state generation it saw
#[derive(Debug, Clone)]
pub struct Lookup {
    pub route: Option<CachedRoute>,
    pub generation: u64,
}

/// Cache plus left neighbor, shared by a router and its listener
pub struct RouteState {
    inner: Mutex<Inner>,
}

impl RouteState {
    pub fn new(capacity: NonZeroUsize, left_neighbor: Option<Arc<Connection>>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                cache: RouteCache::new(capacity),
                left_neighbor,
                generation: 0,
            }),
        }
    }

    pub fn lookup(&self, key: &CacheKey) -> Lookup {
        let mut inner = self.inner.lock();
        Lookup {
            route: inner.cache.get(key),
            generation: inner.generation,
        }
    }

    /// Cache `route` unless the topology changed since `generation`
    pub fn store(&self, key: CacheKey, route: CachedRoute, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }
        inner.cache.put(key, route);
        true
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// The structured connection immediately left of the local address
    pub fn left_neighbor(&self) -> Option<Arc<Connection>> {
        self.inner.lock().left_neighbor.clone()
    }

    /// Drop every cached decision
    pub fn invalidate(&self) {
        let mut inner = self.inner.lock();
        inner.cache.clear();
        inner.generation += 1;
    }

    /// Drop every cached decision and install a new left neighbor
    pub fn reset(&self, left_neighbor: Option<Arc<Connection>>) {
        let mut inner = self.inner.lock();
        inner.cache.clear();
        inner.left_neighbor = left_neighbor;
        inner.generation += 1;
    }

    /// Swap in `connection` if it shares the link of the cached left neighbor
    pub fn refresh_left_neighbor(&self, connection: &Arc<Connection>) -> bool {
        let mut inner = self.inner.lock();
        match &inner.left_neighbor {
            Some(left) if left.link_id() == connection.link_id() => {
                inner.left_neighbor = Some(connection.clone());
                true
            }
            _ => false,
        }
    }

    pub fn cache_len(&self) -> usize {
        self.inner.lock().cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annulus_core::{Address, ChannelLink, RouteOptions};
    use tokio::sync::mpsc;

    fn connection(addr: u64) -> Arc<Connection> {
        let (tx_a, _rx_a) = mpsc::channel(1);
        let (tx_b, _rx_b) = mpsc::channel(1);
        let (link, _) = ChannelLink::pair(tx_a, tx_b);
        Arc::new(Connection::structured(Address::from_u64(addr), link))
    }

    fn key() -> CacheKey {
        CacheKey {
            destination: Address::from_u64(2),
            inbound: None,
            options: RouteOptions::empty(),
        }
    }

    fn state(left: Option<Arc<Connection>>) -> RouteState {
        RouteState::new(NonZeroUsize::new(8).unwrap(), left)
    }

    #[test]
    fn test_reset_clears_cache_and_sets_left() {
        let state = state(None);
        assert!(state.store(key(), CachedRoute::local(), 0));
        assert_eq!(state.cache_len(), 1);

        let left = connection(10);
        state.reset(Some(left.clone()));
        assert_eq!(state.cache_len(), 0);
        assert!(Arc::ptr_eq(&state.left_neighbor().unwrap(), &left));
    }

    #[test]
    fn test_invalidate_keeps_left() {
        let left = connection(10);
        let state = state(Some(left.clone()));
        state.store(key(), CachedRoute::local(), 0);
        state.invalidate();
        assert!(state.lookup(&key()).route.is_none());
        assert!(state.left_neighbor().is_some());
    }

    #[test]
    fn test_store_skipped_after_topology_change() {
        let state = state(None);
        let seen = state.lookup(&key());
        assert!(seen.route.is_none());

        // a change lands while the decision is being computed
        state.reset(Some(connection(10)));
        assert!(!state.store(key(), CachedRoute::local(), seen.generation));
        assert_eq!(state.cache_len(), 0);

        let fresh = state.lookup(&key());
        assert_eq!(fresh.generation, seen.generation + 1);
        assert!(state.store(key(), CachedRoute::local(), fresh.generation));
        assert_eq!(state.cache_len(), 1);
    }

    #[test]
    fn test_refresh_left_requires_same_link() {
        let left = connection(10);
        let state = state(Some(left.clone()));

        assert!(!state.refresh_left_neighbor(&connection(10)));
        assert!(Arc::ptr_eq(&state.left_neighbor().unwrap(), &left));

        let replacement = Arc::new(Connection::new(
            *left.address(),
            left.link().clone(),
            "structured.near",
        ));
        assert!(state.refresh_left_neighbor(&replacement));
        assert!(Arc::ptr_eq(&state.left_neighbor().unwrap(), &replacement));
    }
}
