//! Discrete ring simulation
//!
//! Every node gets its own connection table, router set and packet
//! handler; edges are pairs of channel links. Packets move only when the
//! simulation pumps the inboxes, one node at a time, so runs are
//! deterministic for a given layout.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use annulus_core::{
    Address, AddressSpace, ChannelLink, Connection, Link, LinkFrame, LinkId,
    MemoryConnectionTable, Packet, RouteOptions,
};
use annulus_logging::{NodeContextData, NodeContextGuard};
use annulus_routing::{
    Delivery, DropReason, PacketHandler, RouteOutcome, RouterConfig, RouterSet,
};
use anyhow::Context;
use bytes::{Buf, Bytes};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::topology::{NEAR, RingLayout};

/// Configuration for the simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Router settings shared by every node
    pub router: RouterConfig,
    /// Hop budget of injected packets
    pub ttl: u16,
    /// Frames each node's inbox can hold
    pub inbox_capacity: usize,
    /// Pump rounds before a message is declared stuck
    pub max_rounds: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            router: RouterConfig::new().with_address_bits(32),
            ttl: annulus_core::DEFAULT_TTL,
            inbox_capacity: 256,
            max_rounds: 1_000,
        }
    }
}

/// Simulation statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimStats {
    pub messages_sent: u64,
    /// Messages that reached a node closest to their destination
    pub messages_delivered: u64,
    /// Local deliveries across all nodes
    pub deliveries: u64,
    /// Frames handled by any node
    pub frames: u64,
    /// Messages some node handled more than once
    pub loops_detected: u64,
    /// Messages still moving when the round limit hit
    pub stuck: u64,
    pub max_hops: u16,
}

impl SimStats {
    pub fn delivery_rate(&self) -> f64 {
        if self.messages_sent == 0 {
            0.0
        } else {
            self.messages_delivered as f64 / self.messages_sent as f64
        }
    }

    pub fn avg_frames(&self) -> f64 {
        if self.messages_sent == 0 {
            0.0
        } else {
            self.frames as f64 / self.messages_sent as f64
        }
    }
}

/// What happened to one injected message
#[derive(Debug, Clone)]
pub struct MessageReport {
    pub id: u64,
    pub source: usize,
    pub destination: Address,
    /// Routing outcome at the source
    pub origin: RouteOutcome,
    /// Nodes that delivered the message locally
    pub delivered_at: Vec<usize>,
    /// Times each node handled the message from a link
    pub visits: BTreeMap<usize, usize>,
    /// Highest hop count seen on the wire
    pub max_hops: u16,
    /// Frames still queued when the round limit hit
    pub stuck: bool,
}

impl MessageReport {
    pub fn frames(&self) -> usize {
        self.visits.values().sum()
    }

    pub fn looped(&self) -> bool {
        self.visits.values().any(|&v| v > 1)
    }
}

/// One simulated node
pub struct SimNode {
    pub address: Address,
    pub table: Arc<MemoryConnectionTable>,
    pub routers: Arc<RouterSet<MemoryConnectionTable>>,
    handler: PacketHandler<MemoryConnectionTable>,
    context: NodeContextData,
    inbox_tx: mpsc::Sender<LinkFrame>,
    inbox: mpsc::Receiver<LinkFrame>,
    deliveries: mpsc::Receiver<Delivery>,
    alive: bool,
}

impl SimNode {
    fn new(address: Address, config: &SimConfig) -> anyhow::Result<Self> {
        let table = Arc::new(MemoryConnectionTable::new());
        let routers = Arc::new(
            RouterSet::standard(address, table.clone(), &config.router)
                .with_context(|| format!("router for {}", address))?,
        );
        let (sink, deliveries) = mpsc::channel(config.inbox_capacity);
        let (inbox_tx, inbox) = mpsc::channel(config.inbox_capacity);
        Ok(Self {
            address,
            table,
            handler: PacketHandler::new(routers.clone()).with_deliveries(sink),
            routers,
            context: NodeContextData::new(address),
            inbox_tx,
            inbox,
            deliveries,
            alive: true,
        })
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }
}

/// Both directions of one simulated edge
#[derive(Debug, Clone, Copy)]
struct Edge {
    /// Link owned by the lower-indexed node
    low_link: LinkId,
    /// Link owned by the higher-indexed node
    high_link: LinkId,
}

/// The simulation state
pub struct Simulation {
    pub config: SimConfig,
    pub stats: SimStats,
    space: AddressSpace,
    nodes: Vec<SimNode>,
    edges: BTreeMap<(usize, usize), Edge>,
    links: HashMap<LinkId, Arc<ChannelLink>>,
    next_message: u64,
}

impl Simulation {
    /// Create nodes for every address in `layout` and wire its edges
    pub fn new(layout: &RingLayout, config: SimConfig) -> anyhow::Result<Self> {
        config.router.validate().context("invalid router config")?;
        let space = config.router.address_space()?;

        let nodes = layout
            .addresses
            .iter()
            .map(|&address| SimNode::new(address, &config))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut sim = Self {
            config,
            stats: SimStats::default(),
            space,
            nodes,
            edges: BTreeMap::new(),
            links: HashMap::new(),
            next_message: 0,
        };
        for (&(a, b), con_type) in &layout.edges {
            sim.connect(a, b, con_type);
        }
        info!(
            nodes = sim.nodes.len(),
            edges = sim.edges.len(),
            "Simulation ready"
        );
        Ok(sim)
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    pub fn node(&self, i: usize) -> Option<&SimNode> {
        self.nodes.get(i)
    }

    pub fn space(&self) -> &AddressSpace {
        &self.space
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Indices of live nodes, in address order
    pub fn live(&self) -> Vec<usize> {
        (0..self.nodes.len()).filter(|&i| self.nodes[i].alive).collect()
    }

    pub fn is_connected(&self, a: usize, b: usize) -> bool {
        self.edges.contains_key(&(a.min(b), a.max(b)))
    }

    /// Wire an edge between two live nodes
    pub fn connect(&mut self, a: usize, b: usize, con_type: &str) -> bool {
        if a == b || self.is_connected(a, b) || a >= self.nodes.len() || b >= self.nodes.len() {
            return false;
        }
        if !self.nodes[a].alive || !self.nodes[b].alive {
            return false;
        }
        let (low, high) = (a.min(b), a.max(b));
        let (low_to_high, high_to_low) = ChannelLink::pair(
            self.nodes[low].inbox_tx.clone(),
            self.nodes[high].inbox_tx.clone(),
        );

        let (low_addr, high_addr) = (self.nodes[low].address, self.nodes[high].address);
        self.nodes[low].table.add(Arc::new(Connection::new(
            high_addr,
            low_to_high.clone(),
            con_type,
        )));
        self.nodes[high].table.add(Arc::new(Connection::new(
            low_addr,
            high_to_low.clone(),
            con_type,
        )));

        self.edges.insert(
            (low, high),
            Edge {
                low_link: low_to_high.id(),
                high_link: high_to_low.id(),
            },
        );
        self.links.insert(low_to_high.id(), low_to_high);
        self.links.insert(high_to_low.id(), high_to_low);
        true
    }

    /// Tear down an edge on both ends
    pub fn disconnect(&mut self, a: usize, b: usize) -> bool {
        let Some(edge) = self.edges.remove(&(a.min(b), a.max(b))) else {
            return false;
        };
        let (low, high) = (a.min(b), a.max(b));
        self.nodes[low].table.remove_by_link(edge.low_link);
        self.nodes[high].table.remove_by_link(edge.high_link);
        for id in [edge.low_link, edge.high_link] {
            if let Some(link) = self.links.remove(&id) {
                link.close();
            }
        }
        true
    }

    /// Take a node off the ring, dropping every edge it had
    pub fn remove_node(&mut self, i: usize) {
        let attached: Vec<(usize, usize)> = self
            .edges
            .keys()
            .filter(|&&(a, b)| a == i || b == i)
            .copied()
            .collect();
        for (a, b) in attached {
            self.disconnect(a, b);
        }
        if let Some(node) = self.nodes.get_mut(i) {
            node.alive = false;
            while node.inbox.try_recv().is_ok() {}
            info!(node = %node.address, "Node removed");
        }
    }

    /// Re-link every live node to its `near` live successors
    pub fn repair(&mut self, near: usize) -> usize {
        let live = self.live();
        let mut added = 0;
        for (pos, &i) in live.iter().enumerate() {
            for d in 1..=near {
                let j = live[(pos + d) % live.len()];
                if self.connect(i, j, NEAR) {
                    added += 1;
                }
            }
        }
        debug!(added, "Ring repaired");
        added
    }

    /// Live nodes at the minimum distance from `dest`
    pub fn closest_live(&self, dest: &Address) -> Vec<usize> {
        let live = self.live();
        let Some(best) = live
            .iter()
            .map(|&i| self.space.distance(dest, &self.nodes[i].address))
            .min()
        else {
            return Vec::new();
        };
        live.into_iter()
            .filter(|&i| self.space.distance(dest, &self.nodes[i].address) == best)
            .collect()
    }

    /// Inject a message at `source` and run the network until it is quiet
    ///
    /// A source that is out of range or removed yields a stuck report.
    pub fn send(&mut self, source: usize, dest: Address, options: RouteOptions) -> MessageReport {
        let id = self.next_message;
        self.next_message += 1;

        let Some(node) = self.nodes.get(source).filter(|n| n.alive) else {
            warn!(source, "No live node to send from");
            let report = MessageReport {
                id,
                source,
                destination: dest,
                origin: RouteOutcome::dropped(DropReason::NoRoute),
                delivered_at: Vec::new(),
                visits: BTreeMap::new(),
                max_hops: 0,
                stuck: true,
            };
            self.record(&report);
            return report;
        };
        let packet = Packet::new(node.address, dest, Bytes::copy_from_slice(&id.to_be_bytes()))
            .with_options(options)
            .with_ttl(self.config.ttl);
        let origin = {
            let _ctx = NodeContextGuard::enter(node.context.clone());
            let _span = node.context.span().entered();
            node.handler.send_local(packet)
        };

        let mut report = MessageReport {
            id,
            source,
            destination: dest,
            origin,
            delivered_at: Vec::new(),
            visits: BTreeMap::new(),
            max_hops: 0,
            stuck: false,
        };
        report.stuck = !self.pump(&mut report);
        self.collect_deliveries(&mut report);
        self.record(&report);
        report
    }

    /// Handle queued frames node by node; false if frames remain after the round limit
    fn pump(&mut self, report: &mut MessageReport) -> bool {
        for _ in 0..self.config.max_rounds {
            let mut progressed = false;
            for (i, node) in self.nodes.iter_mut().enumerate() {
                if !node.alive {
                    continue;
                }
                let _ctx = NodeContextGuard::enter(node.context.clone());
                let _span = node.context.span().entered();
                while let Ok(frame) = node.inbox.try_recv() {
                    progressed = true;
                    if let Ok(packet) = Packet::decode(frame.data.clone()) {
                        if message_id(&packet.payload) == Some(report.id) {
                            *report.visits.entry(i).or_default() += 1;
                            report.max_hops = report.max_hops.max(packet.hops);
                        }
                    }
                    node.handler.handle_incoming(Some(frame.link), frame.data);
                }
            }
            if !progressed {
                return true;
            }
        }
        warn!(id = report.id, "Message still circulating after round limit");
        false
    }

    fn collect_deliveries(&mut self, report: &mut MessageReport) {
        for (i, node) in self.nodes.iter_mut().enumerate() {
            while let Ok(delivery) = node.deliveries.try_recv() {
                if message_id(&delivery.payload) == Some(report.id) {
                    report.delivered_at.push(i);
                }
            }
        }
    }

    fn record(&mut self, report: &MessageReport) {
        self.stats.messages_sent += 1;
        self.stats.deliveries += report.delivered_at.len() as u64;
        self.stats.frames += report.frames() as u64;
        self.stats.max_hops = self.stats.max_hops.max(report.max_hops);
        if report.looped() {
            self.stats.loops_detected += 1;
        }
        if report.stuck {
            self.stats.stuck += 1;
        }
        let closest = self.closest_live(&report.destination);
        if report.delivered_at.iter().any(|i| closest.contains(i)) {
            self.stats.messages_delivered += 1;
        }
        debug!(
            id = report.id,
            dest = %report.destination,
            delivered_at = ?report.delivered_at,
            frames = report.frames(),
            "Message settled"
        );
    }

    /// One-line summary of the run so far
    pub fn summary(&self) -> String {
        format!(
            "{} messages, {:.1}% reached the closest node, {:.2} frames/message, max {} hops, {} loops",
            self.stats.messages_sent,
            self.stats.delivery_rate() * 100.0,
            self.stats.avg_frames(),
            self.stats.max_hops,
            self.stats.loops_detected
        )
    }
}

fn message_id(payload: &Bytes) -> Option<u64> {
    if payload.len() < 8 {
        return None;
    }
    Some(payload.clone().get_u64())
}
