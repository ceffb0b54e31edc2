//! End-to-end routing checks on simulated rings

use annulus_core::{Address, Direction, RouteOptions};
use annulus_simulation::{
    RingBuilder, SimConfig, Simulation, run_churn, run_random_ring,
};

#[test]
fn test_annealing_always_reaches_closest_node() {
    annulus_logging::init_testing();
    let (sim, reports) = run_random_ring(64, 200, RouteOptions::empty(), 11).unwrap();

    assert_eq!(sim.stats.messages_sent, 200);
    assert_eq!(sim.stats.messages_delivered, 200, "{}", sim.summary());
    assert_eq!(sim.stats.loops_detected, 0);
    assert_eq!(sim.stats.stuck, 0);

    for report in &reports {
        // at most the two nodes on either side of the destination
        assert!(report.delivered_at.len() <= 2, "{:?}", report);
        assert!(!report.looped());
        assert!(report.origin.dropped.is_none() || report.origin.deliver_locally);
    }
}

#[test]
fn test_greedy_delivers_once_at_closest() {
    let (sim, reports) = run_random_ring(48, 150, RouteOptions::GREEDY, 3).unwrap();

    for report in &reports {
        assert_eq!(report.delivered_at.len(), 1, "{:?}", report);
        let closest = sim.closest_live(&report.destination);
        assert!(closest.contains(&report.delivered_at[0]));
    }
    assert_eq!(sim.stats.loops_detected, 0);
}

#[test]
fn test_last_delivers_once() {
    let (sim, reports) = run_random_ring(40, 100, RouteOptions::LAST, 5).unwrap();

    for report in &reports {
        assert_eq!(report.delivered_at.len(), 1, "{:?}", report);
    }
    assert_eq!(sim.stats.messages_delivered, 100);
}

#[test]
fn test_routing_survives_churn() {
    let (sim, reports) = run_churn(48, 200, 6, 21).unwrap();

    assert_eq!(sim.live().len(), 42);
    assert_eq!(sim.stats.loops_detected, 0);
    assert_eq!(sim.stats.messages_delivered, sim.stats.messages_sent);

    for report in &reports {
        for &i in &report.delivered_at {
            assert!(sim.node(i).unwrap().is_alive());
        }
    }
}

#[test]
fn test_directional_walk_follows_successors() {
    let layout = RingBuilder::new(16).seed(8).build().unwrap();
    let config = SimConfig {
        ttl: 3,
        ..SimConfig::default()
    };
    let mut sim = Simulation::new(&layout, config).unwrap();

    let report = sim.send(14, Address::directional(Direction::Left), RouteOptions::empty());
    assert_eq!(report.delivered_at, vec![1]);
    assert_eq!(report.frames(), 3);

    let report = sim.send(1, Address::directional(Direction::Right), RouteOptions::empty());
    assert_eq!(report.delivered_at, vec![14]);
}

#[test]
fn test_stats_serialize() {
    let (sim, _) = run_random_ring(8, 5, RouteOptions::empty(), 1).unwrap();
    let json = serde_json::to_string(&sim.stats).unwrap();
    assert!(json.contains("\"messages_sent\":5"));

    // every injection and every handled frame goes through exactly one router
    let routed: u64 = sim
        .nodes()
        .iter()
        .map(|n| n.routers.stats().snapshot().routed)
        .sum();
    assert_eq!(routed, sim.stats.frames + sim.stats.messages_sent);
}
