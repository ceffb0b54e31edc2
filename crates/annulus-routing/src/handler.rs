//! Inbound packet handling
//!
//! [`PacketHandler`] sits between the links and the routers: it parses
//! the header, hands the packet to the router for its destination class
//! and pushes anything that should be delivered here to a local sink.

use std::sync::Arc;

use annulus_core::{Address, ConnectionTable, LinkFrame, LinkId, Packet, RouteOptions};
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::router::{DropReason, RouteOutcome, RouterSet};

/// A packet handed to the local node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub source: Address,
    pub destination: Address,
    /// Link the packet arrived on, `None` if it originated here
    pub inbound: Option<LinkId>,
    pub options: RouteOptions,
    pub payload: Bytes,
}

/// Parses inbound bytes and routes them
pub struct PacketHandler<T> {
    routers: Arc<RouterSet<T>>,
    deliveries: Option<mpsc::Sender<Delivery>>,
}

impl<T: ConnectionTable> PacketHandler<T> {
    pub fn new(routers: Arc<RouterSet<T>>) -> Self {
        Self {
            routers,
            deliveries: None,
        }
    }

    /// Send local deliveries to `sink`; without one they are only reported
    pub fn with_deliveries(mut self, sink: mpsc::Sender<Delivery>) -> Self {
        self.deliveries = Some(sink);
        self
    }

    pub fn routers(&self) -> &Arc<RouterSet<T>> {
        &self.routers
    }

    /// Route raw bytes that arrived on `inbound`
    pub fn handle_incoming(&self, inbound: Option<LinkId>, raw: Bytes) -> RouteOutcome {
        let packet = match Packet::decode(raw) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(inbound = ?inbound, error = %e, "Dropping malformed packet");
                self.routers.stats().record_dropped();
                return RouteOutcome::dropped(DropReason::Malformed);
            }
        };
        trace!(packet = %packet, inbound = ?inbound, "Handling packet");
        self.dispatch(inbound, packet)
    }

    /// Route a packet originated by the local node
    pub fn send_local(&self, packet: Packet) -> RouteOutcome {
        self.dispatch(None, packet.with_hops(0))
    }

    /// Handle frames from an inbox until every sender is gone
    pub async fn run(&self, mut inbox: mpsc::Receiver<LinkFrame>) {
        while let Some(frame) = inbox.recv().await {
            self.handle_incoming(Some(frame.link), frame.data);
        }
        debug!("Inbox closed, packet handler stopping");
    }

    fn dispatch(&self, inbound: Option<LinkId>, packet: Packet) -> RouteOutcome {
        let outcome = self.routers.route(inbound, &packet);
        if outcome.deliver_locally {
            self.deliver(inbound, packet);
        }
        outcome
    }

    fn deliver(&self, inbound: Option<LinkId>, packet: Packet) {
        let Some(sink) = &self.deliveries else {
            return;
        };
        let delivery = Delivery {
            source: packet.source,
            destination: packet.destination,
            inbound,
            options: packet.options,
            payload: packet.payload,
        };
        if let Err(e) = sink.try_send(delivery) {
            warn!(error = %e, "Local delivery sink unavailable, dropping payload");
        }
    }
}
