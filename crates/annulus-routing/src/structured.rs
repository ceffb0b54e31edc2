//! Structured (ring) router
//!
//! Routes class-0 addresses toward the node whose address is closest to
//! the destination, using only the local connection table.
//!
//! ## Decision order
//!
//! 1. **Fault**: `hops > ttl` is dropped and never cached
//! 2. **Self**: destination is the local address, deliver here
//! 3. **Last hop**: `hops == ttl` with `LAST`, deliver here
//! 4. **Cache**: reuse the decision cached for (destination, inbound link, options)
//! 5. **Table**: exact leaf, exact structured, empty table, then the two
//!    structured neighbors around the destination's insertion point,
//!    resolved by the greedy or annealing policy
//! 6. **Overrides**: `LAST`, `PATH` and `EXACT` adjust local delivery
//!
//! ## Annealing
//!
//! Packets may move away from the destination during their first
//! `max_uphill_hops` hops. After that a packet is only forwarded when the
//! next hop is strictly closer than the neighbor it arrived from, which
//! rules out loops.

use std::sync::Arc;

use alloy_primitives::U256;
use annulus_core::{
    Address, AddressClass, AddressSpace, Connection, ConnectionList, ConnectionTable,
    ConnectionType, LinkId, Packet, ProtocolError, RouteOptions,
};
use tracing::{debug, info, trace, warn};

use crate::cache::{CacheKey, CachedRoute};
use crate::config::RouterConfig;
use crate::error::{RoutingError, RoutingResult};
use crate::listener::{TopologyListener, left_neighbor_of};
use crate::router::{RouteOutcome, Router, route_with_retry};
use crate::state::RouteState;
use crate::stats::RouterStats;

/// The two structured connections bracketing a destination
struct Bracket {
    list: Arc<ConnectionList>,
    left_idx: isize,
    right_idx: isize,
    left: Arc<Connection>,
    right: Arc<Connection>,
    closest: Arc<Connection>,
    closest_dist: U256,
    other: Arc<Connection>,
    other_dist: U256,
    closest_is_left: bool,
}

/// Greedy/annealing router for structured addresses
pub struct StructuredRouter<T> {
    local: Address,
    space: AddressSpace,
    table: Arc<T>,
    state: Arc<RouteState>,
    listener: Arc<TopologyListener<T>>,
    max_uphill_hops: u16,
    stats: Arc<RouterStats>,
}

impl<T: ConnectionTable + 'static> StructuredRouter<T> {
    /// Create a router and subscribe it to the table's notifications
    pub fn new(local: Address, table: Arc<T>, config: &RouterConfig) -> RoutingResult<Self> {
        let router = Self::detached(local, table, config)?;
        router.table.subscribe(router.listener.clone());
        Ok(router)
    }

    /// Create a router without subscribing it
    ///
    /// The caller is expected to feed topology events in, usually by
    /// spawning [`TopologyListener::run`] on the table's broadcast channel.
    pub fn detached(local: Address, table: Arc<T>, config: &RouterConfig) -> RoutingResult<Self> {
        config.validate()?;
        let space = config.address_space()?;
        space.check(&local)?;
        if local.class() != AddressClass::Structured {
            return Err(RoutingError::ClassMismatch {
                local: local.to_string(),
                expected: AddressClass::Structured,
            });
        }

        let structs = table.snapshot(ConnectionType::Structured);
        let left = left_neighbor_of(&local, &structs);
        let state = Arc::new(RouteState::new(config.cache_size()?, left));
        let listener = Arc::new(TopologyListener::new(local, &table, state.clone()));

        info!(
            local = %local,
            bits = space.bits(),
            cache_capacity = config.cache_capacity,
            "Structured router ready"
        );

        Ok(Self {
            local,
            space,
            table,
            state,
            listener,
            max_uphill_hops: config.max_uphill_hops,
            stats: Arc::new(RouterStats::new()),
        })
    }
}

impl<T: ConnectionTable> StructuredRouter<T> {
    /// Share a stats sink with other routers
    pub fn with_stats(mut self, stats: Arc<RouterStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn local(&self) -> &Address {
        &self.local
    }

    pub fn space(&self) -> &AddressSpace {
        &self.space
    }

    pub fn stats(&self) -> &Arc<RouterStats> {
        &self.stats
    }

    /// Listener keeping this router's state in sync with the table
    pub fn listener(&self) -> &Arc<TopologyListener<T>> {
        &self.listener
    }

    /// Currently cached left neighbor
    pub fn left_neighbor(&self) -> Option<Arc<Connection>> {
        self.state.left_neighbor()
    }

    pub fn cached_routes(&self) -> usize {
        self.state.cache_len()
    }

    /// Compute the routing decision for a packet without sending it
    ///
    /// Fails on the `hops > ttl` fault and on destinations outside the
    /// address space; neither is cached.
    pub fn decide(&self, inbound: Option<LinkId>, packet: &Packet) -> Result<CachedRoute, ProtocolError> {
        let dest = packet.destination;
        if packet.hops > packet.ttl {
            warn!(
                dest = %dest,
                hops = packet.hops,
                ttl = packet.ttl,
                inbound = ?inbound,
                "Bad packet, hops exceed ttl"
            );
            return Err(ProtocolError::HopsExceedTtl {
                hops: packet.hops,
                ttl: packet.ttl,
            });
        }
        if let Err(e) = self.space.check(&dest) {
            warn!(
                dest = %dest,
                inbound = ?inbound,
                error = %e,
                "Bad packet, destination outside address space"
            );
            return Err(ProtocolError::DestinationOutOfSpace(dest.to_string()));
        }
        if dest == self.local {
            trace!(dest = %dest, "Packet is for us");
            return Ok(CachedRoute::local());
        }
        if packet.hops == packet.ttl && packet.has_option(RouteOptions::LAST) {
            trace!(dest = %dest, "Ttl reached with last-hop delivery");
            return Ok(CachedRoute::local());
        }

        let key = CacheKey {
            destination: dest,
            inbound,
            options: packet.options,
        };
        let seen = self.state.lookup(&key);
        let mut route = match seen.route {
            Some(route) => {
                self.stats.record_cache_hit();
                trace!(dest = %dest, "Route cache hit");
                route
            }
            None => {
                self.stats.record_cache_miss();
                trace!(dest = %dest, "Route cache miss");
                let route = self.consult_table(inbound, packet);
                if !self.state.store(key, route.clone(), seen.generation) {
                    trace!(dest = %dest, "Topology changed during lookup, not caching");
                }
                route
            }
        };

        if let Some(next) = route.next_hop.take_if(|next| Some(next.link_id()) == inbound) {
            let fault = ProtocolError::SelfReferentialForward(next.to_string());
            warn!(dest = %dest, error = %fault, "Not forwarding");
        }

        if packet.has_option(RouteOptions::LAST) {
            route.deliver_locally = route.next_hop.is_none();
        } else if packet.has_option(RouteOptions::PATH) {
            route.deliver_locally = true;
        } else if packet.has_option(RouteOptions::EXACT) {
            // the self-destined case returned above
            route.deliver_locally = false;
        }

        Ok(route)
    }

    /// Decide and forward a packet, retrying once after a permanent link failure
    pub fn route(&self, inbound: Option<LinkId>, packet: &Packet) -> RouteOutcome {
        route_with_retry(
            &self.stats,
            packet,
            || self.decide(inbound, packet),
            || self.listener.invalidate(),
        )
    }

    fn consult_table(&self, inbound: Option<LinkId>, packet: &Packet) -> CachedRoute {
        let dest = &packet.destination;

        if let Some(leaf) = self.table.connection_by_address(ConnectionType::Leaf, dest) {
            debug!(dest = %dest, next = %leaf, "Routing over leaf connection");
            return CachedRoute::forward(leaf);
        }

        let structs = self.table.snapshot(ConnectionType::Structured);
        let insert_at = match structs.index_of(dest) {
            Ok(found) => {
                return match structs.get(found as isize) {
                    Some(exact) => {
                        debug!(dest = %dest, "Routing over structured connection to destination");
                        CachedRoute::forward(exact.clone())
                    }
                    None => CachedRoute::nowhere(),
                };
            }
            Err(insert_at) => insert_at,
        };

        if structs.is_empty() {
            debug!(dest = %dest, "No structured connections, keeping packet");
            return CachedRoute::local();
        }

        let Some(bracket) = self.bracket(structs, dest, insert_at) else {
            debug!(dest = %dest, "No neighbors around destination");
            return CachedRoute::nowhere();
        };

        if packet.has_option(RouteOptions::GREEDY) {
            self.greedy(inbound, dest, &bracket)
        } else {
            self.anneal(inbound, packet, &bracket)
        }
    }

    /// Neighbors on either side of the insertion point; left is increasing
    fn bracket(&self, list: Arc<ConnectionList>, dest: &Address, insert_at: usize) -> Option<Bracket> {
        let left_idx = insert_at as isize;
        let right_idx = left_idx - 1;
        let left = list.get(left_idx)?.clone();
        let right = list.get(right_idx)?.clone();

        let l_dist = self.space.distance(dest, left.address());
        let r_dist = self.space.distance(dest, right.address());
        let (closest, closest_dist, other, other_dist, closest_is_left) = if l_dist < r_dist {
            (left.clone(), l_dist, right.clone(), r_dist, true)
        } else {
            (right.clone(), r_dist, left.clone(), l_dist, false)
        };

        Some(Bracket {
            list,
            left_idx,
            right_idx,
            left,
            right,
            closest,
            closest_dist,
            other,
            other_dist,
            closest_is_left,
        })
    }

    fn greedy(&self, inbound: Option<LinkId>, dest: &Address, b: &Bracket) -> CachedRoute {
        let our_dist = self.space.distance(dest, &self.local);
        if b.closest_dist >= our_dist {
            debug!(dest = %dest, "Greedy: no neighbor is closer, keeping packet");
            return CachedRoute::local();
        }
        if Some(b.closest.link_id()) == inbound {
            warn!(dest = %dest, inbound = ?inbound, "Got greedy packet from the closest neighbor");
            return CachedRoute::nowhere();
        }
        debug!(dest = %dest, next = %b.closest, "Greedy: forwarding to closer neighbor");
        CachedRoute::forward(b.closest.clone())
    }

    fn anneal(&self, inbound: Option<LinkId>, packet: &Packet, b: &Bracket) -> CachedRoute {
        let dest = &packet.destination;
        let arrived_on = |c: &Arc<Connection>| Some(c.link_id()) == inbound;

        let adjacent = self
            .state
            .left_neighbor()
            .is_some_and(|ours| Arc::ptr_eq(&ours, &b.left));
        if adjacent {
            // the destination sits between us and one of the bracket ends
            let next = if self.space.is_left_of(&self.local, dest) {
                &b.right
            } else {
                &b.left
            };
            debug!(dest = %dest, next = %next, "Adjacent to destination, delivering");
            return CachedRoute {
                next_hop: (!arrived_on(next)).then(|| next.clone()),
                deliver_locally: true,
            };
        }

        if packet.hops == 0 {
            debug!(dest = %dest, next = %b.closest, "Originated here, forwarding to closest");
            return CachedRoute::forward(b.closest.clone());
        }

        if packet.hops <= self.max_uphill_hops {
            if !arrived_on(&b.closest) {
                return CachedRoute::forward(b.closest.clone());
            }
            let second_idx = if b.closest_is_left {
                b.left_idx + 1
            } else {
                b.right_idx - 1
            };
            let fallback = match b.list.get(second_idx) {
                Some(second) if self.space.distance(dest, second.address()) < b.other_dist => {
                    second.clone()
                }
                _ => b.other.clone(),
            };
            if arrived_on(&fallback) {
                debug!(dest = %dest, "Uphill: every candidate is the inbound link");
                return CachedRoute::nowhere();
            }
            debug!(dest = %dest, next = %fallback, "Uphill: closest is inbound, using fallback");
            return CachedRoute::forward(fallback);
        }

        let (candidate, candidate_dist) = if arrived_on(&b.closest) && !arrived_on(&b.other) {
            (&b.other, b.other_dist)
        } else {
            (&b.closest, b.closest_dist)
        };
        let previous = inbound.and_then(|link| self.table.connection_by_link(link));
        match previous {
            Some(prev) if candidate_dist >= self.space.distance(dest, prev.address()) => {
                debug!(
                    dest = %dest,
                    candidate = %candidate,
                    previous = %prev,
                    "No progress possible, not forwarding"
                );
                CachedRoute::nowhere()
            }
            _ => CachedRoute::forward(candidate.clone()),
        }
    }
}

impl<T: ConnectionTable> Router for StructuredRouter<T> {
    fn address_class(&self) -> AddressClass {
        AddressClass::Structured
    }

    fn route(&self, inbound: Option<LinkId>, packet: &Packet) -> RouteOutcome {
        StructuredRouter::route(self, inbound, packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annulus_core::{ChannelLink, LinkFrame, MemoryConnectionTable};
    use tokio::sync::mpsc;

    use crate::router::DropReason;

    /// Node 64 on an 8-bit ring, keeping the receiving end of each link
    struct Fixture {
        table: Arc<MemoryConnectionTable>,
        inbox: mpsc::Sender<LinkFrame>,
        peers: Vec<mpsc::Receiver<LinkFrame>>,
    }

    impl Fixture {
        fn new() -> Self {
            let (inbox, _rx) = mpsc::channel(16);
            Self {
                table: Arc::new(MemoryConnectionTable::new()),
                inbox,
                peers: Vec::new(),
            }
        }

        fn connect(&mut self, addr: u64, con_type: &str) -> Arc<Connection> {
            let (peer_tx, peer_rx) = mpsc::channel(16);
            let (link, _) = ChannelLink::pair(self.inbox.clone(), peer_tx);
            self.peers.push(peer_rx);
            let conn = Arc::new(Connection::new(Address::from_u64(addr), link, con_type));
            self.table.add(conn.clone());
            conn
        }

        fn router(&self) -> StructuredRouter<MemoryConnectionTable> {
            self.router_with(RouterConfig::new())
        }

        fn router_with(&self, config: RouterConfig) -> StructuredRouter<MemoryConnectionTable> {
            let config = config.with_address_bits(8);
            StructuredRouter::new(Address::from_u64(64), self.table.clone(), &config).unwrap()
        }
    }

    fn packet(dest: u64, hops: u16, ttl: u16) -> Packet {
        Packet::new(Address::from_u64(2), Address::from_u64(dest), "data")
            .with_hops(hops)
            .with_ttl(ttl)
    }

    #[test]
    fn test_rejects_directional_local() {
        let table = Arc::new(MemoryConnectionTable::new());
        let config = RouterConfig::new().with_address_bits(8);
        let result = StructuredRouter::new(Address::from_u64(65), table, &config);
        assert!(matches!(result, Err(RoutingError::ClassMismatch { .. })));
    }

    #[test]
    fn test_rejects_local_outside_space() {
        let table = Arc::new(MemoryConnectionTable::new());
        let config = RouterConfig::new().with_address_bits(8);
        let result = StructuredRouter::new(Address::from_u64(512), table, &config);
        assert!(matches!(result, Err(RoutingError::Address(_))));
    }

    #[test]
    fn test_initial_left_neighbor() {
        let mut fx = Fixture::new();
        fx.connect(0, "structured");
        let c128 = fx.connect(128, "structured");
        let router = fx.router();
        assert!(Arc::ptr_eq(&router.left_neighbor().unwrap(), &c128));
    }

    #[test]
    fn test_forward_toward_closest() {
        let mut fx = Fixture::new();
        let c0 = fx.connect(0, "structured");
        let c128 = fx.connect(128, "structured");
        let router = fx.router();

        let outcome = router.route(Some(c0.link_id()), &packet(140, 5, 10));
        assert_eq!(outcome.forwarded, 1);
        assert!(!outcome.deliver_locally);
        assert!(Arc::ptr_eq(outcome.next_hop.as_ref().unwrap(), &c128));

        let frame = fx.peers[1].try_recv().unwrap();
        let sent = Packet::decode(frame.data).unwrap();
        assert_eq!(sent.hops, 6);
    }

    #[test]
    fn test_self_destined_ignores_options() {
        let mut fx = Fixture::new();
        fx.connect(0, "structured");
        fx.connect(128, "structured");
        let router = fx.router();

        for bits in [0u16, 0x1, 0x2, 0x4, 0x8, 0xf] {
            let p = packet(64, 1, 10).with_options(RouteOptions::from_bits(bits));
            let outcome = router.route(None, &p);
            assert!(outcome.deliver_locally);
            assert_eq!(outcome.forwarded, 0);
        }
    }

    #[test]
    fn test_hops_exceed_ttl_is_dropped_uncached() {
        let mut fx = Fixture::new();
        fx.connect(128, "structured");
        let router = fx.router();

        let outcome = router.route(None, &packet(140, 11, 10));
        assert_eq!(outcome.forwarded, 0);
        assert_eq!(outcome.dropped, Some(DropReason::HopsExceedTtl));
        assert_eq!(router.cached_routes(), 0);
    }

    #[test]
    fn test_last_hop_delivery() {
        let mut fx = Fixture::new();
        fx.connect(128, "structured");
        let router = fx.router();

        let p = packet(140, 10, 10).with_options(RouteOptions::LAST);
        let outcome = router.route(None, &p);
        assert!(outcome.deliver_locally);
        assert_eq!(outcome.forwarded, 0);
        assert_eq!(router.cached_routes(), 0);
    }

    #[test]
    fn test_ttl_reached_without_last_does_not_send() {
        let mut fx = Fixture::new();
        let c0 = fx.connect(0, "structured");
        fx.connect(128, "structured");
        let router = fx.router();

        let outcome = router.route(Some(c0.link_id()), &packet(140, 10, 10));
        assert_eq!(outcome.forwarded, 0);
        assert!(outcome.next_hop.is_some());
        assert_eq!(outcome.dropped, Some(DropReason::TtlExhausted));
    }

    #[test]
    fn test_leaf_connection_preferred() {
        let mut fx = Fixture::new();
        fx.connect(0, "structured");
        fx.connect(128, "structured");
        let leaf = fx.connect(140, "leaf");
        let router = fx.router();

        let outcome = router.route(None, &packet(140, 3, 10));
        assert!(Arc::ptr_eq(outcome.next_hop.as_ref().unwrap(), &leaf));
    }

    #[test]
    fn test_exact_structured_connection() {
        let mut fx = Fixture::new();
        fx.connect(0, "structured");
        let c128 = fx.connect(128, "structured");
        let router = fx.router();

        let outcome = router.route(None, &packet(128, 3, 10));
        assert!(Arc::ptr_eq(outcome.next_hop.as_ref().unwrap(), &c128));
    }

    #[test]
    fn test_empty_table_delivers_locally() {
        let fx = Fixture::new();
        let router = fx.router();
        let outcome = router.route(None, &packet(140, 3, 10));
        assert!(outcome.deliver_locally);
        assert_eq!(outcome.forwarded, 0);
        assert!(outcome.dropped.is_none());
    }

    #[test]
    fn test_greedy_forwards_when_closer() {
        let mut fx = Fixture::new();
        fx.connect(0, "structured");
        let c128 = fx.connect(128, "structured");
        let router = fx.router();

        let p = packet(100, 1, 10).with_options(RouteOptions::GREEDY);
        let outcome = router.route(None, &p);
        assert!(Arc::ptr_eq(outcome.next_hop.as_ref().unwrap(), &c128));
        assert!(!outcome.deliver_locally);
        assert_eq!(outcome.forwarded, 1);
    }

    #[test]
    fn test_greedy_keeps_when_no_neighbor_closer() {
        let mut fx = Fixture::new();
        fx.connect(0, "structured");
        fx.connect(192, "structured");
        let router = fx.router();

        let p = packet(100, 1, 10).with_options(RouteOptions::GREEDY);
        let outcome = router.route(None, &p);
        assert!(outcome.deliver_locally);
        assert_eq!(outcome.forwarded, 0);
    }

    #[test]
    fn test_greedy_bounce_back_is_dropped() {
        let mut fx = Fixture::new();
        fx.connect(0, "structured");
        let c128 = fx.connect(128, "structured");
        let router = fx.router();

        let p = packet(100, 1, 10).with_options(RouteOptions::GREEDY);
        let outcome = router.route(Some(c128.link_id()), &p);
        assert!(outcome.next_hop.is_none());
        assert!(!outcome.deliver_locally);
        assert_eq!(outcome.dropped, Some(DropReason::NoRoute));
    }

    #[test]
    fn test_adjacent_delivers_and_forwards_other_side() {
        let mut fx = Fixture::new();
        let c0 = fx.connect(0, "structured");
        fx.connect(128, "structured");
        let router = fx.router();

        // 100 shares our left neighbor 128; we are right of it, so the
        // other side is 128
        let outcome = router.route(Some(c0.link_id()), &packet(100, 4, 10));
        assert!(outcome.deliver_locally);
        assert_eq!(
            outcome.next_hop.as_ref().unwrap().address(),
            &Address::from_u64(128)
        );

        // 40 also shares it; we are left of it, so the other side is 0,
        // which is where the packet came from
        let outcome = router.route(Some(c0.link_id()), &packet(40, 4, 10));
        assert!(outcome.deliver_locally);
        assert!(outcome.next_hop.is_none());
    }

    #[test]
    fn test_uphill_falls_back_when_closest_is_inbound() {
        let mut fx = Fixture::new();
        fx.connect(0, "structured");
        let c128 = fx.connect(128, "structured");
        fx.connect(160, "structured");
        let router = fx.router();

        // closest to 140 is 128 (12), other is 160 (20)
        let outcome = router.route(Some(c128.link_id()), &packet(140, 1, 10));
        assert_eq!(
            outcome.next_hop.as_ref().unwrap().address(),
            &Address::from_u64(160)
        );
    }

    #[test]
    fn test_uphill_prefers_second_closest_over_other_side() {
        let mut fx = Fixture::new();
        fx.connect(0, "structured");
        fx.connect(128, "structured");
        let c136 = fx.connect(136, "structured");
        fx.connect(200, "structured");
        let router = fx.router();

        // 140 sits between 136 (4) and 200 (60); with 136 inbound the next
        // entry past it, 128 (12), still beats the other side
        let outcome = router.route(Some(c136.link_id()), &packet(140, 1, 10));
        assert_eq!(
            outcome.next_hop.as_ref().unwrap().address(),
            &Address::from_u64(128)
        );
        assert_eq!(outcome.forwarded, 1);
        assert!(!outcome.deliver_locally);
    }

    #[test]
    fn test_uphill_single_neighbor_inbound_is_not_sent_back() {
        let mut fx = Fixture::new();
        let c128 = fx.connect(128, "structured");
        let router = fx.router();

        // the only neighbor is on both sides of every destination
        let outcome = router.route(Some(c128.link_id()), &packet(140, 1, 10));
        assert!(outcome.next_hop.is_none());
        assert_eq!(outcome.forwarded, 0);
        assert!(outcome.deliver_locally);
    }

    #[test]
    fn test_uphill_goes_nowhere_when_every_candidate_is_inbound() {
        let mut fx = Fixture::new();
        let config = RouterConfig::new().with_address_bits(8);
        // no listener, so the left neighbor stays unknown after the add
        let router =
            StructuredRouter::detached(Address::from_u64(64), fx.table.clone(), &config).unwrap();
        let c128 = fx.connect(128, "structured");
        assert!(router.left_neighbor().is_none());

        let outcome = router.route(Some(c128.link_id()), &packet(140, 1, 10));
        assert!(outcome.next_hop.is_none());
        assert!(!outcome.deliver_locally);
        assert_eq!(outcome.dropped, Some(DropReason::NoRoute));
    }

    #[test]
    fn test_max_uphill_hops_extends_fallback() {
        let mut fx = Fixture::new();
        fx.connect(0, "structured");
        let c128 = fx.connect(128, "structured");
        fx.connect(160, "structured");

        // two hops in, the default router insists on progress past 128
        let strict = fx.router();
        let outcome = strict.route(Some(c128.link_id()), &packet(140, 2, 10));
        assert!(outcome.next_hop.is_none());

        let lenient = fx.router_with(RouterConfig::new().with_max_uphill_hops(2));
        let outcome = lenient.route(Some(c128.link_id()), &packet(140, 2, 10));
        assert_eq!(
            outcome.next_hop.as_ref().unwrap().address(),
            &Address::from_u64(160)
        );
        assert_eq!(outcome.forwarded, 1);
    }

    #[test]
    fn test_destination_outside_space_is_malformed() {
        let mut fx = Fixture::new();
        fx.connect(0, "structured");
        fx.connect(128, "structured");
        let router = fx.router();

        // 320 wraps to our own address in an 8-bit space
        let outcome = router.route(None, &packet(320, 0, 10));
        assert_eq!(outcome.dropped, Some(DropReason::Malformed));
        assert!(!outcome.deliver_locally);
        assert_eq!(outcome.forwarded, 0);
        assert_eq!(router.cached_routes(), 0);
        assert!(matches!(
            router.decide(None, &packet(320, 0, 10)),
            Err(ProtocolError::DestinationOutOfSpace(_))
        ));
    }

    #[test]
    fn test_general_case_requires_progress() {
        let mut fx = Fixture::new();
        fx.connect(0, "structured");
        fx.connect(128, "structured");
        let c150 = fx.connect(150, "structured");
        let router = fx.router();

        // from 150 (distance 10) to 128 (distance 12) is no progress
        let outcome = router.route(Some(c150.link_id()), &packet(140, 3, 10));
        assert!(outcome.next_hop.is_none());
        assert!(!outcome.deliver_locally);
        assert_eq!(outcome.forwarded, 0);
    }

    #[test]
    fn test_path_and_exact_overrides() {
        let mut fx = Fixture::new();
        fx.connect(0, "structured");
        fx.connect(128, "structured");
        let router = fx.router();

        let p = packet(140, 0, 10).with_options(RouteOptions::PATH);
        let outcome = router.route(None, &p);
        assert!(outcome.deliver_locally);
        assert_eq!(outcome.forwarded, 1);

        let p = packet(100, 0, 10).with_options(RouteOptions::EXACT);
        let outcome = router.route(None, &p);
        assert!(!outcome.deliver_locally);
        assert_eq!(outcome.forwarded, 1);
    }

    #[test]
    fn test_second_lookup_hits_cache() {
        let mut fx = Fixture::new();
        let c0 = fx.connect(0, "structured");
        fx.connect(128, "structured");
        let router = fx.router();

        router.route(Some(c0.link_id()), &packet(140, 5, 10));
        fx.table.reset_query_count();
        router.route(Some(c0.link_id()), &packet(140, 5, 10));
        assert_eq!(fx.table.query_count(), 0);

        let stats = router.stats().snapshot();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
    }
}
