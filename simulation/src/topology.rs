//! Ring layouts for the simulation
//!
//! A layout is a sorted set of node addresses plus the edges between
//! them. Every node is linked to its `near` successors (and so to its
//! `near` predecessors), which keeps the ring consistent; shortcut
//! edges to random far nodes are added on top.

use std::collections::{BTreeMap, BTreeSet};

use annulus_core::Address;
use anyhow::{Context, ensure};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Connection sub-type for ring-neighbor edges
pub const NEAR: &str = "structured.near";
/// Connection sub-type for random long edges
pub const SHORTCUT: &str = "structured.shortcut";

/// Node addresses in ring order and the edges between them
#[derive(Debug, Clone)]
pub struct RingLayout {
    /// Sorted ascending
    pub addresses: Vec<Address>,
    /// `(i, j)` with `i < j`, indexing `addresses`, mapped to connection sub-type
    pub edges: BTreeMap<(usize, usize), &'static str>,
}

impl RingLayout {
    /// Build a layout from explicit addresses, linking `near` successors
    pub fn from_addresses(addresses: impl IntoIterator<Item = Address>, near: usize) -> Self {
        let addresses: Vec<Address> = addresses
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut layout = Self {
            addresses,
            edges: BTreeMap::new(),
        };
        layout.link_near(near);
        layout
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Add an edge; self-loops and duplicates are ignored
    pub fn link(&mut self, a: usize, b: usize, con_type: &'static str) -> bool {
        if a == b {
            return false;
        }
        let key = (a.min(b), a.max(b));
        if self.edges.contains_key(&key) {
            return false;
        }
        self.edges.insert(key, con_type);
        true
    }

    /// Indices of the nodes `i` is linked to
    pub fn neighbors(&self, i: usize) -> Vec<usize> {
        self.edges
            .keys()
            .filter_map(|&(a, b)| match (a == i, b == i) {
                (true, _) => Some(b),
                (_, true) => Some(a),
                _ => None,
            })
            .collect()
    }

    fn link_near(&mut self, near: usize) {
        let n = self.addresses.len();
        for i in 0..n {
            for d in 1..=near {
                self.link(i, (i + d) % n, NEAR);
            }
        }
    }

    /// One line per node: address and degree
    pub fn visualize(&self) -> String {
        let mut out = format!("Ring of {} nodes, {} edges\n", self.len(), self.edges.len());
        for (i, addr) in self.addresses.iter().enumerate() {
            out.push_str(&format!("  [{:>3}] {} ({} links)\n", i, addr, self.neighbors(i).len()));
        }
        out
    }
}

/// Builder for random rings
#[derive(Debug, Clone)]
pub struct RingBuilder {
    nodes: usize,
    address_bits: u32,
    near: usize,
    shortcuts: usize,
    seed: Option<u64>,
}

impl RingBuilder {
    pub fn new(nodes: usize) -> Self {
        Self {
            nodes,
            address_bits: 32,
            near: 2,
            shortcuts: 1,
            seed: None,
        }
    }

    /// Width of the ring; the simulation draws addresses below 2^64
    pub fn address_bits(mut self, bits: u32) -> Self {
        self.address_bits = bits;
        self
    }

    /// Ring neighbors linked on each side
    pub fn near(mut self, near: usize) -> Self {
        self.near = near;
        self
    }

    /// Random far links started by each node
    pub fn shortcuts(mut self, shortcuts: usize) -> Self {
        self.shortcuts = shortcuts;
        self
    }

    /// Fix the random seed for reproducible rings
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> anyhow::Result<RingLayout> {
        ensure!(
            (2..=64).contains(&self.address_bits),
            "address_bits must be between 2 and 64, got {}",
            self.address_bits
        );
        // structured addresses are even, so half the space is usable
        let slots = 1u128 << (self.address_bits - 1);
        ensure!(
            (self.nodes as u128) <= slots / 2,
            "{} nodes do not fit sparsely in a {}-bit ring",
            self.nodes,
            self.address_bits
        );

        let mut rng = self.rng();
        let mut picked = BTreeSet::new();
        while picked.len() < self.nodes {
            let slot = rng.random_range(0..slots);
            let value = u64::try_from(slot * 2).context("address above 2^64")?;
            picked.insert(Address::from_u64(value));
        }

        let mut layout = RingLayout::from_addresses(picked, self.near);
        let n = layout.len();
        if n > 1 {
            for i in 0..n {
                for _ in 0..self.shortcuts {
                    let j = rng.random_range(0..n);
                    layout.link(i, j, SHORTCUT);
                }
            }
        }
        Ok(layout)
    }

    fn rng(&self) -> StdRng {
        let seed = self.seed.unwrap_or_else(|| rand::rng().random());
        StdRng::seed_from_u64(seed)
    }
}

/// Draw a random structured (even) address in a ring of `bits` width
pub fn random_address(rng: &mut impl Rng, bits: u32) -> Address {
    let slots = 1u128 << (bits.clamp(2, 64) - 1);
    let slot = rng.random_range(0..slots);
    // slot * 2 < 2^64 by the clamp above
    Address::from_u64((slot * 2) as u64)
}
