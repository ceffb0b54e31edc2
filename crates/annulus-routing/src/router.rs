//! Router contract, outcomes and class dispatch
//!
//! Every router answers the same question for a packet: deliver it here,
//! forward it to at most one neighbor, or drop it. The answer comes back
//! as a [`RouteOutcome`]; nothing on this path returns an error or panics.

use std::fmt::{self, Display};
use std::sync::Arc;

use annulus_core::{
    Address, AddressClass, Connection, ConnectionTable, LinkId, Packet, ProtocolError,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::CachedRoute;
use crate::config::RouterConfig;
use crate::directional::DirectionalRouter;
use crate::error::RoutingResult;
use crate::stats::RouterStats;
use crate::structured::StructuredRouter;

/// Why a packet was neither forwarded nor delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropReason {
    /// Header could not be parsed, or names a destination outside the space
    Malformed,
    /// Hop count above ttl on arrival
    HopsExceedTtl,
    /// No router handles the destination's address class
    UnroutableClass,
    /// No neighbor makes progress and this node is not the destination
    NoRoute,
    /// A next hop exists but the hop budget is spent
    TtlExhausted,
    /// The link reported a recoverable failure
    TransientLinkFailure,
    /// The link failed permanently on the first try and on the retry
    LinkFailed,
}

impl Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Malformed => "malformed header",
            Self::HopsExceedTtl => "hops exceed ttl",
            Self::UnroutableClass => "unroutable address class",
            Self::NoRoute => "no route",
            Self::TtlExhausted => "ttl exhausted",
            Self::TransientLinkFailure => "transient link failure",
            Self::LinkFailed => "link failed",
        };
        f.write_str(s)
    }
}

impl From<&ProtocolError> for DropReason {
    fn from(fault: &ProtocolError) -> Self {
        match fault {
            ProtocolError::TruncatedHeader { .. } => Self::Malformed,
            ProtocolError::HopsExceedTtl { .. } => Self::HopsExceedTtl,
            ProtocolError::DestinationOutOfSpace(_) => Self::Malformed,
            ProtocolError::UnroutableClass(_) => Self::UnroutableClass,
            ProtocolError::SelfReferentialForward(_) => Self::NoRoute,
        }
    }
}

/// Result of routing one packet
///
/// `deliver_locally` is independent of forwarding: a node adjacent to the
/// destination both keeps the packet and passes it on.
#[derive(Debug, Clone, Default)]
pub struct RouteOutcome {
    /// Neighbor chosen as next hop, whether or not the send happened
    pub next_hop: Option<Arc<Connection>>,
    /// Hand the payload to the local node
    pub deliver_locally: bool,
    /// Packets sent, 0 or 1
    pub forwarded: usize,
    /// Why nothing was sent, when a send was due or the packet went nowhere
    pub dropped: Option<DropReason>,
}

impl RouteOutcome {
    /// Nothing delivered, nothing sent
    pub fn dropped(reason: DropReason) -> Self {
        Self {
            dropped: Some(reason),
            ..Self::default()
        }
    }

    pub fn is_forwarded(&self) -> bool {
        self.forwarded > 0
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.is_some()
    }
}

/// A router for one address class
pub trait Router: Send + Sync {
    /// Class of destination addresses this router handles
    fn address_class(&self) -> AddressClass;

    /// Route a packet that arrived on `inbound` (`None` if locally originated)
    fn route(&self, inbound: Option<LinkId>, packet: &Packet) -> RouteOutcome;
}

/// Send the decided packet, retrying the decision once after a permanent failure
///
/// `decide` is re-run from scratch on retry; `on_link_closed` runs after
/// the failing link is closed and before the retry.
pub(crate) fn route_with_retry(
    stats: &RouterStats,
    packet: &Packet,
    mut decide: impl FnMut() -> Result<CachedRoute, ProtocolError>,
    on_link_closed: impl Fn(),
) -> RouteOutcome {
    stats.record_routed();
    let mut last = CachedRoute::nowhere();

    for attempt in 0..=1 {
        let route = match decide() {
            Ok(route) => route,
            Err(fault) => {
                stats.record_dropped();
                return RouteOutcome::dropped(DropReason::from(&fault));
            }
        };

        let Some(next) = route.next_hop.clone() else {
            return finish(stats, route, 0, None);
        };
        if packet.hops >= packet.ttl {
            debug!(dest = %packet.destination, hops = packet.hops, "Hop budget spent, not forwarding");
            return finish(stats, route, 0, Some(DropReason::TtlExhausted));
        }

        match next.link().send(packet.incremented().encode()) {
            Ok(()) => {
                debug!(dest = %packet.destination, next = %next, hops = packet.hops + 1, "Forwarded");
                return finish(stats, route, 1, None);
            }
            Err(e) if e.is_transient() => {
                debug!(next = %next, error = %e, "Transient send failure, dropping packet");
                return finish(stats, route, 0, Some(DropReason::TransientLinkFailure));
            }
            Err(e) => {
                info!(next = %next, error = %e, attempt, "Permanent send failure, closing link");
                next.link().close();
                on_link_closed();
                if attempt == 0 {
                    stats.record_retry();
                }
                last = route;
            }
        }
    }

    warn!(dest = %packet.destination, "Giving up after retry");
    finish(stats, last, 0, Some(DropReason::LinkFailed))
}

fn finish(
    stats: &RouterStats,
    route: CachedRoute,
    forwarded: usize,
    failure: Option<DropReason>,
) -> RouteOutcome {
    if forwarded > 0 {
        stats.record_forwarded();
    }
    if route.deliver_locally {
        stats.record_delivered();
    }

    let dropped = match failure {
        Some(reason) => Some(reason),
        None if forwarded == 0 && !route.deliver_locally => Some(DropReason::NoRoute),
        None => None,
    };
    if dropped.is_some() && !route.deliver_locally {
        stats.record_dropped();
    }

    RouteOutcome {
        next_hop: route.next_hop,
        deliver_locally: route.deliver_locally,
        forwarded,
        dropped,
    }
}

/// Router selected by destination address class
pub enum ClassRouter<T> {
    Structured(StructuredRouter<T>),
    Directional(DirectionalRouter<T>),
}

impl<T: ConnectionTable> Router for ClassRouter<T> {
    fn address_class(&self) -> AddressClass {
        match self {
            Self::Structured(r) => r.address_class(),
            Self::Directional(r) => r.address_class(),
        }
    }

    fn route(&self, inbound: Option<LinkId>, packet: &Packet) -> RouteOutcome {
        match self {
            Self::Structured(r) => r.route(inbound, packet),
            Self::Directional(r) => r.route(inbound, packet),
        }
    }
}

/// The routers of one node, at most one per address class
pub struct RouterSet<T> {
    routers: Vec<ClassRouter<T>>,
    stats: Arc<RouterStats>,
}

impl<T: ConnectionTable + 'static> RouterSet<T> {
    /// Structured and directional routers sharing one stats sink
    pub fn standard(local: Address, table: Arc<T>, config: &RouterConfig) -> RoutingResult<Self> {
        let stats = Arc::new(RouterStats::new());
        let structured =
            StructuredRouter::new(local, table.clone(), config)?.with_stats(stats.clone());
        let directional = DirectionalRouter::new(local, table).with_stats(stats.clone());

        let mut set = Self::with_stats(stats);
        set.register(ClassRouter::Structured(structured));
        set.register(ClassRouter::Directional(directional));
        Ok(set)
    }
}

impl<T: ConnectionTable> RouterSet<T> {
    pub fn new() -> Self {
        Self::with_stats(Arc::new(RouterStats::new()))
    }

    pub fn with_stats(stats: Arc<RouterStats>) -> Self {
        Self {
            routers: Vec::new(),
            stats,
        }
    }

    /// Install a router, replacing any router for the same class
    pub fn register(&mut self, router: ClassRouter<T>) {
        let class = router.address_class();
        self.routers.retain(|r| r.address_class() != class);
        self.routers.push(router);
    }

    pub fn router_for(&self, class: AddressClass) -> Option<&ClassRouter<T>> {
        self.routers.iter().find(|r| r.address_class() == class)
    }

    /// The structured router, if one is registered
    pub fn structured(&self) -> Option<&StructuredRouter<T>> {
        self.routers.iter().find_map(|r| match r {
            ClassRouter::Structured(s) => Some(s),
            ClassRouter::Directional(_) => None,
        })
    }

    pub fn stats(&self) -> &Arc<RouterStats> {
        &self.stats
    }

    /// Route by the destination's class
    pub fn route(&self, inbound: Option<LinkId>, packet: &Packet) -> RouteOutcome {
        let class = packet.destination.class();
        match self.router_for(class) {
            Some(router) => router.route(inbound, packet),
            None => {
                let fault = ProtocolError::UnroutableClass(class.to_string());
                warn!(dest = %packet.destination, error = %fault, "Dropping packet");
                self.stats.record_dropped();
                RouteOutcome::dropped(DropReason::UnroutableClass)
            }
        }
    }
}

impl<T: ConnectionTable> Default for RouterSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use annulus_core::{Link, LinkError};
    use bytes::Bytes;

    #[derive(Debug)]
    struct FailingLink {
        id: LinkId,
        error: LinkError,
        closes: AtomicUsize,
    }

    impl Link for FailingLink {
        fn id(&self) -> LinkId {
            self.id
        }

        fn send(&self, _data: Bytes) -> Result<(), LinkError> {
            Err(self.error.clone())
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::Relaxed);
        }

        fn is_closed(&self) -> bool {
            self.closes.load(Ordering::Relaxed) > 0
        }
    }

    fn failing(error: LinkError) -> (Arc<FailingLink>, Arc<Connection>) {
        let link = Arc::new(FailingLink {
            id: LinkId::next(),
            error,
            closes: AtomicUsize::new(0),
        });
        let conn = Arc::new(Connection::structured(Address::from_u64(128), link.clone()));
        (link, conn)
    }

    fn packet() -> Packet {
        Packet::new(Address::from_u64(2), Address::from_u64(140), "x").with_ttl(5)
    }

    #[test]
    fn test_transient_failure_drops() {
        let stats = RouterStats::new();
        let (link, conn) = failing(LinkError::Transient("full".into()));
        let outcome = route_with_retry(
            &stats,
            &packet(),
            || Ok(CachedRoute::forward(conn.clone())),
            || panic!("transient failures must not invalidate"),
        );
        assert_eq!(outcome.forwarded, 0);
        assert_eq!(outcome.dropped, Some(DropReason::TransientLinkFailure));
        assert!(!link.is_closed());
        assert_eq!(stats.snapshot().retries, 0);
    }

    #[test]
    fn test_permanent_failure_retries_once() {
        let stats = RouterStats::new();
        let (link, conn) = failing(LinkError::Permanent("gone".into()));
        let decisions = AtomicUsize::new(0);
        let invalidations = AtomicUsize::new(0);

        let outcome = route_with_retry(
            &stats,
            &packet(),
            || {
                decisions.fetch_add(1, Ordering::Relaxed);
                Ok(CachedRoute::forward(conn.clone()))
            },
            || {
                invalidations.fetch_add(1, Ordering::Relaxed);
            },
        );

        assert_eq!(decisions.load(Ordering::Relaxed), 2);
        assert_eq!(invalidations.load(Ordering::Relaxed), 2);
        assert_eq!(link.closes.load(Ordering::Relaxed), 2);
        assert_eq!(outcome.dropped, Some(DropReason::LinkFailed));
        assert_eq!(stats.snapshot().retries, 1);
    }

    #[test]
    fn test_fault_maps_to_drop() {
        let stats = RouterStats::new();
        let outcome = route_with_retry(
            &stats,
            &packet(),
            || Err(ProtocolError::HopsExceedTtl { hops: 9, ttl: 5 }),
            || {},
        );
        assert_eq!(outcome.dropped, Some(DropReason::HopsExceedTtl));
        assert_eq!(stats.snapshot().dropped, 1);
    }

    #[test]
    fn test_local_delivery_is_not_a_drop() {
        let stats = RouterStats::new();
        let outcome = route_with_retry(&stats, &packet(), || Ok(CachedRoute::local()), || {});
        assert!(outcome.deliver_locally);
        assert!(!outcome.is_dropped());
        assert_eq!(stats.snapshot().delivered_locally, 1);
    }

    #[test]
    fn test_drop_reason_display() {
        assert_eq!(DropReason::NoRoute.to_string(), "no route");
        assert_eq!(DropReason::LinkFailed.to_string(), "link failed");
    }
}
