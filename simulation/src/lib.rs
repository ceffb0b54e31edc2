//! # Annulus Simulation
//!
//! Discrete simulation of an Annulus ring, used to check routing
//! end to end.
//!
//! ## Overview
//!
//! - **Topology** (`topology.rs`): random or explicit rings, each node
//!   linked to its nearest successors plus random shortcuts
//! - **Simulation** (`simulation.rs`): one connection table, router set
//!   and packet handler per node, channel links between them, and a pump
//!   that moves frames until the network is quiet
//! - **Scenarios** (`scenarios.rs`): random traffic and churn runs
//!
//! ## Example
//!
//! ```rust,ignore
//! use annulus_core::{Address, RouteOptions};
//! use annulus_simulation::*;
//!
//! let layout = RingBuilder::new(64).seed(7).build()?;
//! let mut sim = Simulation::new(&layout, SimConfig::default())?;
//!
//! let report = sim.send(0, Address::from_u64(0x8000_0000), RouteOptions::empty());
//! assert!(!report.looped());
//! println!("{}", sim.summary());
//! ```

pub mod scenarios;
pub mod simulation;
pub mod topology;

// Re-export main types
pub use scenarios::{random_traffic, run_churn, run_random_ring};
pub use simulation::{MessageReport, SimConfig, SimNode, SimStats, Simulation};
pub use topology::{NEAR, RingBuilder, RingLayout, SHORTCUT, random_address};
