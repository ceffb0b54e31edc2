//! Topology-change listener
//!
//! Keeps a router's [`RouteState`] consistent with the connection table:
//!
//! - **Added / Removed**: every cached decision is dropped. When the
//!   change is to the structured list, the left neighbor is recomputed
//!   from the new snapshot carried by the event.
//! - **StatusUpdated**: if the connection shares its link with the cached
//!   left neighbor, the cached object is replaced so identity checks on
//!   the routing path keep matching.
//!
//! The listener works either as a synchronous [`TopologyObserver`] or as
//! a task draining the table's broadcast channel via [`TopologyListener::run`].

use std::sync::{Arc, Weak};

use annulus_core::{
    Address, Connection, ConnectionList, ConnectionTable, ConnectionType, TopologyEvent,
    TopologyObserver,
};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::state::RouteState;

/// Structured connection immediately left of `local`
///
/// That is the entry at the local address's insertion point, wrapping
/// to the first entry past the end of the ring.
pub fn left_neighbor_of(local: &Address, list: &ConnectionList) -> Option<Arc<Connection>> {
    if list.is_empty() {
        return None;
    }
    let idx = match list.index_of(local) {
        Err(insert_at) => insert_at,
        Ok(found) => {
            warn!(local = %local, "Local address is present in its own connection table");
            found
        }
    };
    list.get(idx as isize).cloned()
}

/// Reacts to topology notifications on behalf of one router
///
/// Holds the table weakly; the table owns its observers.
pub struct TopologyListener<T> {
    local: Address,
    table: Weak<T>,
    state: Arc<RouteState>,
}

impl<T: ConnectionTable> TopologyListener<T> {
    pub fn new(local: Address, table: &Arc<T>, state: Arc<RouteState>) -> Self {
        Self {
            local,
            table: Arc::downgrade(table),
            state,
        }
    }

    /// Apply one topology event
    pub fn handle(&self, event: &TopologyEvent) {
        match event {
            TopologyEvent::Added { connection, list } | TopologyEvent::Removed { connection, list } => {
                if list.main_type() == ConnectionType::Structured {
                    let left = left_neighbor_of(&self.local, list);
                    debug!(
                        local = %self.local,
                        changed = %connection,
                        left = ?left.as_ref().map(|c| *c.address()),
                        "Structured connections changed"
                    );
                    self.state.reset(left);
                } else {
                    trace!(changed = %connection, "Connections changed, clearing route cache");
                    self.state.invalidate();
                }
            }
            TopologyEvent::StatusUpdated { connection } => {
                if self.state.refresh_left_neighbor(connection) {
                    trace!(connection = %connection, "Refreshed left neighbor");
                }
            }
        }
    }

    /// Drop every cached decision without touching the left neighbor
    pub fn invalidate(&self) {
        self.state.invalidate();
    }

    /// Rebuild state from a fresh table snapshot
    pub fn resync(&self) {
        let Some(table) = self.table.upgrade() else {
            self.state.reset(None);
            return;
        };
        let list = table.snapshot(ConnectionType::Structured);
        self.state.reset(left_neighbor_of(&self.local, &list));
    }

    /// Drain a broadcast channel of topology events until it closes
    ///
    /// If the receiver falls behind, state is rebuilt from the table
    /// since the missed events are gone.
    pub async fn run(self: Arc<Self>, mut events: broadcast::Receiver<TopologyEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.handle(&event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(local = %self.local, missed, "Topology listener lagged, resyncing");
                    self.resync();
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(local = %self.local, "Topology channel closed");
                    break;
                }
            }
        }
    }
}

impl<T: ConnectionTable> TopologyObserver for TopologyListener<T> {
    fn on_topology_event(&self, event: &TopologyEvent) {
        self.handle(event);
    }
}
