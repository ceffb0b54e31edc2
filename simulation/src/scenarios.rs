//! Pre-defined simulation scenarios
//!
//! Each scenario builds a ring, pushes random traffic through it and
//! returns the simulation so callers can inspect stats and reports.

use annulus_core::RouteOptions;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::simulation::{MessageReport, SimConfig, Simulation};
use crate::topology::{RingBuilder, random_address};

/// Send `messages` packets between random live nodes and random destinations
pub fn random_traffic(
    sim: &mut Simulation,
    messages: usize,
    options: RouteOptions,
    rng: &mut impl Rng,
) -> Vec<MessageReport> {
    let bits = sim.space().bits();
    let mut reports = Vec::with_capacity(messages);
    for _ in 0..messages {
        let live = sim.live();
        if live.is_empty() {
            break;
        }
        let source = live[rng.random_range(0..live.len())];
        let dest = random_address(rng, bits);
        reports.push(sim.send(source, dest, options));
    }
    reports
}

/// Random ring with uniform traffic
pub fn run_random_ring(
    nodes: usize,
    messages: usize,
    options: RouteOptions,
    seed: u64,
) -> anyhow::Result<(Simulation, Vec<MessageReport>)> {
    info!(nodes, messages, options = %options, "=== Random ring ===");
    let layout = RingBuilder::new(nodes).seed(seed).build()?;
    let mut sim = Simulation::new(&layout, SimConfig::default())?;
    let mut rng = StdRng::seed_from_u64(seed ^ 0x5eed);
    let reports = random_traffic(&mut sim, messages, options, &mut rng);
    info!("{}", sim.summary());
    Ok((sim, reports))
}

/// Random ring that loses `failures` nodes halfway through and is repaired
pub fn run_churn(
    nodes: usize,
    messages: usize,
    failures: usize,
    seed: u64,
) -> anyhow::Result<(Simulation, Vec<MessageReport>)> {
    info!(nodes, messages, failures, "=== Churn ===");
    let layout = RingBuilder::new(nodes).seed(seed).near(2).build()?;
    let mut sim = Simulation::new(&layout, SimConfig::default())?;
    let mut rng = StdRng::seed_from_u64(seed ^ 0xc4a5);

    let mut reports = random_traffic(&mut sim, messages / 2, RouteOptions::empty(), &mut rng);

    for _ in 0..failures {
        let live = sim.live();
        if live.len() <= 3 {
            break;
        }
        sim.remove_node(live[rng.random_range(0..live.len())]);
    }
    let added = sim.repair(2);
    info!(added, live = sim.live().len(), "Ring repaired after failures");

    reports.extend(random_traffic(
        &mut sim,
        messages - messages / 2,
        RouteOptions::empty(),
        &mut rng,
    ));
    info!("{}", sim.summary());
    Ok((sim, reports))
}
