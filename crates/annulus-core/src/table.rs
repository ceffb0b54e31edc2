//! Connection table contract and an in-memory implementation
//!
//! The router never locks the table for the duration of a decision.
//! Every query hands back an immutable snapshot ([`ConnectionList`] or an
//! `Arc<Connection>`) that stays valid while the table keeps changing
//! underneath.
//!
//! Topology changes are published two ways: synchronously to registered
//! [`TopologyObserver`]s and over a `tokio::sync::broadcast` channel for
//! consumers that prefer message passing.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::address::{Address, AddressSpace};
use crate::connection::{Connection, ConnectionType};
use crate::link::LinkId;

/// Capacity of the topology broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Address-sorted snapshot of the connections of one type
///
/// Indexing wraps around in both directions, so `get(-1)` is the last
/// (highest) connection and `get(len)` is the first.
#[derive(Debug, Clone)]
pub struct ConnectionList {
    main_type: ConnectionType,
    connections: Vec<Arc<Connection>>,
}

impl ConnectionList {
    /// Build a list, sorting the connections by address
    pub fn new(main_type: ConnectionType, mut connections: Vec<Arc<Connection>>) -> Self {
        connections.sort_by(|a, b| a.address().cmp(b.address()));
        Self {
            main_type,
            connections,
        }
    }

    pub fn empty(main_type: ConnectionType) -> Self {
        Self {
            main_type,
            connections: Vec::new(),
        }
    }

    /// The connection type every entry shares
    pub fn main_type(&self) -> ConnectionType {
        self.main_type
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Binary search by address
    ///
    /// `Ok(i)` when an entry has exactly this address, otherwise
    /// `Err(i)` with the index the address would be inserted at.
    pub fn index_of(&self, addr: &Address) -> Result<usize, usize> {
        self.connections
            .binary_search_by(|c| c.address().cmp(addr))
    }

    /// Circular index access; `None` only when the list is empty
    pub fn get(&self, index: isize) -> Option<&Arc<Connection>> {
        if self.connections.is_empty() {
            return None;
        }
        let len = self.connections.len() as isize;
        self.connections.get(index.rem_euclid(len) as usize)
    }

    /// Position of the connection using `link`
    pub fn index_of_link(&self, link: LinkId) -> Option<usize> {
        self.connections.iter().position(|c| c.link_id() == link)
    }

    /// The `k` connections closest to `point`, nearest first
    pub fn nearest(&self, point: &Address, space: &AddressSpace, k: usize) -> Vec<Arc<Connection>> {
        let mut ranked: Vec<_> = self
            .connections
            .iter()
            .map(|c| (space.distance(c.address(), point), c))
            .collect();
        ranked.sort_by(|a, b| a.0.cmp(&b.0));
        ranked.into_iter().take(k).map(|(_, c)| c.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Connection>> {
        self.connections.iter()
    }

    fn with(&self, connection: Arc<Connection>) -> Self {
        let mut connections = self.connections.clone();
        let idx = match self.index_of(connection.address()) {
            Ok(i) | Err(i) => i,
        };
        connections.insert(idx, connection);
        Self {
            main_type: self.main_type,
            connections,
        }
    }

    fn without(&self, link: LinkId) -> Self {
        Self {
            main_type: self.main_type,
            connections: self
                .connections
                .iter()
                .filter(|c| c.link_id() != link)
                .cloned()
                .collect(),
        }
    }

    fn replaced(&self, connection: Arc<Connection>) -> Self {
        let link = connection.link_id();
        Self {
            main_type: self.main_type,
            connections: self
                .connections
                .iter()
                .map(|c| {
                    if c.link_id() == link {
                        connection.clone()
                    } else {
                        c.clone()
                    }
                })
                .collect(),
        }
    }
}

/// A change to the set of live connections
#[derive(Debug, Clone)]
pub enum TopologyEvent {
    /// A connection was added; `list` is the new snapshot for its type
    Added {
        connection: Arc<Connection>,
        list: Arc<ConnectionList>,
    },
    /// A connection was removed; `list` is the new snapshot for its type
    Removed {
        connection: Arc<Connection>,
        list: Arc<ConnectionList>,
    },
    /// A connection object was replaced by one sharing the same link
    StatusUpdated { connection: Arc<Connection> },
}

impl TopologyEvent {
    /// The connection the event is about
    pub fn connection(&self) -> &Arc<Connection> {
        match self {
            Self::Added { connection, .. }
            | Self::Removed { connection, .. }
            | Self::StatusUpdated { connection } => connection,
        }
    }
}

/// Receives topology notifications from a [`ConnectionTable`]
///
/// Called on the thread that changed the table, after its locks are
/// released. Implementations must not block.
pub trait TopologyObserver: Send + Sync {
    fn on_topology_event(&self, event: &TopologyEvent);
}

/// Read interface the router consumes
pub trait ConnectionTable: Send + Sync {
    /// Exact lookup of a connection of the given type
    fn connection_by_address(
        &self,
        con_type: ConnectionType,
        addr: &Address,
    ) -> Option<Arc<Connection>>;

    /// The connection (of any type) that uses `link`
    fn connection_by_link(&self, link: LinkId) -> Option<Arc<Connection>>;

    /// Current sorted snapshot of one connection type
    fn snapshot(&self, con_type: ConnectionType) -> Arc<ConnectionList>;

    /// The `k` structured connections nearest to `point`
    fn k_nearest(&self, point: &Address, space: &AddressSpace, k: usize) -> Vec<Arc<Connection>> {
        self.snapshot(ConnectionType::Structured)
            .nearest(point, space, k)
    }

    /// Register an observer for add/remove/status notifications
    fn subscribe(&self, observer: Arc<dyn TopologyObserver>);
}

/// In-memory connection table
///
/// Lists are replaced wholesale on every change, so readers holding an
/// older snapshot are never affected by later writes.
pub struct MemoryConnectionTable {
    lists: RwLock<HashMap<ConnectionType, Arc<ConnectionList>>>,
    by_link: DashMap<LinkId, Arc<Connection>>,
    observers: RwLock<Vec<Arc<dyn TopologyObserver>>>,
    events: broadcast::Sender<TopologyEvent>,
    queries: AtomicU64,
}

impl MemoryConnectionTable {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            lists: RwLock::new(HashMap::new()),
            by_link: DashMap::new(),
            observers: RwLock::new(Vec::new()),
            events,
            queries: AtomicU64::new(0),
        }
    }

    /// Add a connection
    ///
    /// Returns `false` (and changes nothing) if its link is already in
    /// the table or another connection of the same type has its address.
    pub fn add(&self, connection: Arc<Connection>) -> bool {
        let main_type = connection.main_type();
        let list = {
            let mut lists = self.lists.write();
            if self.by_link.contains_key(&connection.link_id()) {
                return false;
            }
            let current = lists
                .get(&main_type)
                .cloned()
                .unwrap_or_else(|| Arc::new(ConnectionList::empty(main_type)));
            if current.index_of(connection.address()).is_ok() {
                return false;
            }
            let updated = Arc::new(current.with(connection.clone()));
            lists.insert(main_type, updated.clone());
            self.by_link
                .insert(connection.link_id(), connection.clone());
            updated
        };

        debug!(connection = %connection, count = list.len(), "Connection added");
        self.notify(TopologyEvent::Added { connection, list });
        true
    }

    /// Remove the connection using `link`
    pub fn remove_by_link(&self, link: LinkId) -> Option<Arc<Connection>> {
        let (connection, list) = {
            let mut lists = self.lists.write();
            let (_, connection) = self.by_link.remove(&link)?;
            let main_type = connection.main_type();
            let updated = Arc::new(
                lists
                    .get(&main_type)
                    .map(|l| l.without(link))
                    .unwrap_or_else(|| ConnectionList::empty(main_type)),
            );
            lists.insert(main_type, updated.clone());
            (connection, updated)
        };

        debug!(connection = %connection, count = list.len(), "Connection removed");
        self.notify(TopologyEvent::Removed {
            connection: connection.clone(),
            list,
        });
        Some(connection)
    }

    /// Replace the connection object sharing `connection`'s link
    ///
    /// The type must not change; returns `false` if the link is unknown.
    pub fn update_status(&self, connection: Arc<Connection>) -> bool {
        let link = connection.link_id();
        {
            let mut lists = self.lists.write();
            let Some(old) = self.by_link.get(&link).map(|c| c.clone()) else {
                return false;
            };
            if old.main_type() != connection.main_type() {
                return false;
            }
            let main_type = connection.main_type();
            if let Some(list) = lists.get(&main_type) {
                let updated = Arc::new(list.replaced(connection.clone()));
                lists.insert(main_type, updated);
            }
            self.by_link.insert(link, connection.clone());
        }

        trace!(connection = %connection, "Connection status updated");
        self.notify(TopologyEvent::StatusUpdated { connection });
        true
    }

    /// Receive topology events over a broadcast channel
    pub fn subscribe_events(&self) -> broadcast::Receiver<TopologyEvent> {
        self.events.subscribe()
    }

    /// Total number of connections of all types
    pub fn len(&self) -> usize {
        self.by_link.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_link.is_empty()
    }

    /// Number of read queries served so far
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    pub fn reset_query_count(&self) {
        self.queries.store(0, Ordering::Relaxed);
    }

    fn notify(&self, event: TopologyEvent) {
        let observers = self.observers.read().clone();
        for observer in &observers {
            observer.on_topology_event(&event);
        }
        // No receivers is fine
        let _ = self.events.send(event);
    }

    fn count_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for MemoryConnectionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionTable for MemoryConnectionTable {
    fn connection_by_address(
        &self,
        con_type: ConnectionType,
        addr: &Address,
    ) -> Option<Arc<Connection>> {
        self.count_query();
        let list = self.lists.read().get(&con_type).cloned()?;
        let idx = list.index_of(addr).ok()?;
        list.get(idx as isize).cloned()
    }

    fn connection_by_link(&self, link: LinkId) -> Option<Arc<Connection>> {
        self.count_query();
        self.by_link.get(&link).map(|c| c.clone())
    }

    fn snapshot(&self, con_type: ConnectionType) -> Arc<ConnectionList> {
        self.count_query();
        self.lists
            .read()
            .get(&con_type)
            .cloned()
            .unwrap_or_else(|| Arc::new(ConnectionList::empty(con_type)))
    }

    fn subscribe(&self, observer: Arc<dyn TopologyObserver>) {
        self.observers.write().push(observer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::ChannelLink;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    fn structured(addr: u64) -> Arc<Connection> {
        let (tx_a, _rx_a) = mpsc::channel(1);
        let (tx_b, _rx_b) = mpsc::channel(1);
        let (link, _) = ChannelLink::pair(tx_a, tx_b);
        Arc::new(Connection::structured(Address::from_u64(addr), link))
    }

    fn leaf(addr: u64) -> Arc<Connection> {
        let (tx_a, _rx_a) = mpsc::channel(1);
        let (tx_b, _rx_b) = mpsc::channel(1);
        let (link, _) = ChannelLink::pair(tx_a, tx_b);
        Arc::new(Connection::leaf(Address::from_u64(addr), link))
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<TopologyEvent>>,
    }

    impl TopologyObserver for Recorder {
        fn on_topology_event(&self, event: &TopologyEvent) {
            self.events.lock().push(event.clone());
        }
    }

    #[test]
    fn test_list_sorted_and_circular() {
        let list = ConnectionList::new(
            ConnectionType::Structured,
            vec![structured(128), structured(0), structured(192)],
        );
        let addrs: Vec<_> = list.iter().map(|c| *c.address()).collect();
        assert_eq!(
            addrs,
            vec![
                Address::from_u64(0),
                Address::from_u64(128),
                Address::from_u64(192)
            ]
        );
        assert_eq!(list.get(-1).unwrap().address(), &Address::from_u64(192));
        assert_eq!(list.get(3).unwrap().address(), &Address::from_u64(0));
        assert_eq!(list.get(4).unwrap().address(), &Address::from_u64(128));
        assert!(ConnectionList::empty(ConnectionType::Leaf).get(0).is_none());
    }

    #[test]
    fn test_index_of() {
        let list = ConnectionList::new(
            ConnectionType::Structured,
            vec![structured(0), structured(128)],
        );
        assert_eq!(list.index_of(&Address::from_u64(128)), Ok(1));
        assert_eq!(list.index_of(&Address::from_u64(64)), Err(1));
        assert_eq!(list.index_of(&Address::from_u64(140)), Err(2));
    }

    #[test]
    fn test_index_of_link() {
        let a = structured(10);
        let b = structured(20);
        let list = ConnectionList::new(ConnectionType::Structured, vec![b.clone(), a.clone()]);
        assert_eq!(list.index_of_link(a.link_id()), Some(0));
        assert_eq!(list.index_of_link(b.link_id()), Some(1));
        assert_eq!(list.index_of_link(LinkId(u64::MAX)), None);
    }

    #[test]
    fn test_nearest() {
        let space = AddressSpace::new(8).unwrap();
        let list = ConnectionList::new(
            ConnectionType::Structured,
            vec![structured(0), structured(64), structured(128), structured(192)],
        );
        let near = list.nearest(&Address::from_u64(140), &space, 2);
        assert_eq!(near.len(), 2);
        assert_eq!(near[0].address(), &Address::from_u64(128));
        assert_eq!(near[1].address(), &Address::from_u64(192));
    }

    #[test]
    fn test_add_and_lookup() {
        let table = MemoryConnectionTable::new();
        let c = structured(128);
        assert!(table.add(c.clone()));
        assert!(!table.add(c.clone()));
        assert!(!table.add(structured(128)));

        let found = table
            .connection_by_address(ConnectionType::Structured, &Address::from_u64(128))
            .unwrap();
        assert!(Arc::ptr_eq(&found, &c));
        assert!(table
            .connection_by_address(ConnectionType::Leaf, &Address::from_u64(128))
            .is_none());
        assert!(table.connection_by_link(c.link_id()).is_some());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_types_are_separate() {
        let table = MemoryConnectionTable::new();
        table.add(structured(10));
        table.add(leaf(10));
        assert_eq!(table.snapshot(ConnectionType::Structured).len(), 1);
        assert_eq!(table.snapshot(ConnectionType::Leaf).len(), 1);
        assert!(table.snapshot(ConnectionType::Unstructured).is_empty());
    }

    #[test]
    fn test_snapshot_is_immutable() {
        let table = MemoryConnectionTable::new();
        table.add(structured(10));
        let before = table.snapshot(ConnectionType::Structured);
        table.add(structured(20));
        assert_eq!(before.len(), 1);
        assert_eq!(table.snapshot(ConnectionType::Structured).len(), 2);
    }

    #[test]
    fn test_remove_notifies_observers() {
        let table = MemoryConnectionTable::new();
        let recorder = Arc::new(Recorder::default());
        table.subscribe(recorder.clone());

        let c = structured(10);
        table.add(c.clone());
        let removed = table.remove_by_link(c.link_id()).unwrap();
        assert!(Arc::ptr_eq(&removed, &c));
        assert!(table.remove_by_link(c.link_id()).is_none());

        let events = recorder.events.lock();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], TopologyEvent::Added { list, .. } if list.len() == 1));
        assert!(matches!(&events[1], TopologyEvent::Removed { list, .. } if list.is_empty()));
    }

    #[test]
    fn test_update_status_replaces_object() {
        let table = MemoryConnectionTable::new();
        let c = structured(10);
        table.add(c.clone());

        let refreshed = Arc::new(Connection::new(
            *c.address(),
            c.link().clone(),
            "structured.near",
        ));
        assert!(table.update_status(refreshed.clone()));

        let found = table.connection_by_link(c.link_id()).unwrap();
        assert!(Arc::ptr_eq(&found, &refreshed));
        let list = table.snapshot(ConnectionType::Structured);
        assert!(Arc::ptr_eq(list.get(0).unwrap(), &refreshed));

        assert!(!table.update_status(structured(99)));
    }

    #[tokio::test]
    async fn test_broadcast_events() {
        let table = MemoryConnectionTable::new();
        let mut rx = table.subscribe_events();
        let c = structured(42);
        table.add(c.clone());

        let event = rx.recv().await.unwrap();
        assert!(Arc::ptr_eq(event.connection(), &c));
    }

    #[test]
    fn test_query_counter() {
        let table = MemoryConnectionTable::new();
        table.add(structured(1 << 4));
        assert_eq!(table.query_count(), 0);
        table.snapshot(ConnectionType::Structured);
        table.connection_by_link(LinkId(1));
        assert_eq!(table.query_count(), 2);
        table.reset_query_count();
        assert_eq!(table.query_count(), 0);
    }
}
