//! Directional router
//!
//! Class-1 destinations don't name a point on the ring; they name a
//! direction relative to whoever holds the packet. Each hop passes the
//! packet to its immediate structured neighbor on that side until the
//! hop budget runs out, and the node holding it at `hops == ttl` keeps it.

use std::sync::Arc;

use annulus_core::{
    Address, AddressClass, ConnectionTable, ConnectionType, Direction, LinkId, Packet,
    ProtocolError,
};
use tracing::{debug, trace, warn};

use crate::cache::CachedRoute;
use crate::router::{RouteOutcome, Router, route_with_retry};
use crate::stats::RouterStats;

/// Router for directional (class 1) addresses
pub struct DirectionalRouter<T> {
    local: Address,
    table: Arc<T>,
    stats: Arc<RouterStats>,
}

impl<T: ConnectionTable> DirectionalRouter<T> {
    pub fn new(local: Address, table: Arc<T>) -> Self {
        Self {
            local,
            table,
            stats: Arc::new(RouterStats::new()),
        }
    }

    /// Share a stats sink with other routers
    pub fn with_stats(mut self, stats: Arc<RouterStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &Arc<RouterStats> {
        &self.stats
    }

    /// Compute the decision for a directional packet without sending it
    pub fn decide(
        &self,
        inbound: Option<LinkId>,
        packet: &Packet,
    ) -> Result<CachedRoute, ProtocolError> {
        if packet.hops > packet.ttl {
            warn!(
                dest = %packet.destination,
                hops = packet.hops,
                ttl = packet.ttl,
                "Bad packet, hops exceed ttl"
            );
            return Err(ProtocolError::HopsExceedTtl {
                hops: packet.hops,
                ttl: packet.ttl,
            });
        }
        let Some(direction) = packet.destination.direction() else {
            return Err(ProtocolError::UnroutableClass(
                packet.destination.class().to_string(),
            ));
        };
        if packet.hops == packet.ttl {
            trace!(direction = ?direction, "Directional packet reached its last hop");
            return Ok(CachedRoute::local());
        }

        let structs = self.table.snapshot(ConnectionType::Structured);
        if structs.is_empty() {
            return Ok(CachedRoute::local());
        }

        let (left_idx, right_idx) = match structs.index_of(&self.local) {
            Err(insert_at) => (insert_at as isize, insert_at as isize - 1),
            Ok(found) => {
                warn!(local = %self.local, "Local address is present in its own connection table");
                (found as isize + 1, found as isize - 1)
            }
        };
        let idx = match direction {
            Direction::Left => left_idx,
            Direction::Right => right_idx,
        };

        match structs.get(idx) {
            Some(next) if Some(next.link_id()) != inbound => {
                debug!(direction = ?direction, next = %next, "Passing directional packet on");
                Ok(CachedRoute::forward(next.clone()))
            }
            _ => {
                debug!(direction = ?direction, "Only neighbor on that side is the inbound link");
                Ok(CachedRoute::nowhere())
            }
        }
    }

    /// Decide and forward a directional packet
    pub fn route(&self, inbound: Option<LinkId>, packet: &Packet) -> RouteOutcome {
        route_with_retry(&self.stats, packet, || self.decide(inbound, packet), || {})
    }
}

impl<T: ConnectionTable> Router for DirectionalRouter<T> {
    fn address_class(&self) -> AddressClass {
        AddressClass::Directional
    }

    fn route(&self, inbound: Option<LinkId>, packet: &Packet) -> RouteOutcome {
        DirectionalRouter::route(self, inbound, packet)
    }
}
