//! # Annulus Routing
//!
//! Routing layer for the Annulus structured overlay.
//!
//! Given a packet addressed to a point on the ring, a router decides,
//! from local knowledge only, whether to deliver it here, forward it to
//! exactly one neighbor, or drop it. Decisions are cached per
//! (destination, inbound link, options) and the cache is thrown away on
//! every topology change.
//!
//! ## Core Components
//!
//! - [`StructuredRouter`]: greedy and annealing routing of ring addresses
//! - [`DirectionalRouter`]: left/right neighbor routing of directional addresses
//! - [`RouterSet`]: dispatches packets to a [`ClassRouter`] by address class
//! - [`TopologyListener`]: keeps the route cache and left neighbor in sync with the table
//! - [`PacketHandler`]: decodes inbound bytes, routes them and hands local deliveries on
//! - [`RouteCache`]: bounded LRU of routing decisions
//!
//! ## Routing Modes
//!
//! 1. **Greedy**: forward only to a neighbor strictly closer than us, otherwise keep it
//! 2. **Annealing** (default): allow early uphill hops, then require progress
//!    relative to the previous hop
//! 3. **Last / Path / Exact**: annealing with different local-delivery rules
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use annulus_core::{Address, MemoryConnectionTable, Packet};
//! use annulus_routing::{RouterConfig, RouterSet, PacketHandler};
//!
//! let table = Arc::new(MemoryConnectionTable::new());
//! let routers = RouterSet::standard(local, table.clone(), &RouterConfig::default())?;
//! let handler = PacketHandler::new(Arc::new(routers)).with_deliveries(tx);
//!
//! // Bytes arriving on a link
//! let outcome = handler.handle_incoming(Some(link_id), raw);
//! if outcome.deliver_locally { /* payload went to the sink */ }
//! ```

pub mod cache;
pub mod config;
pub mod directional;
pub mod error;
pub mod handler;
pub mod listener;
pub mod router;
pub mod state;
pub mod stats;
pub mod structured;

// Re-export main types
pub use cache::{CacheKey, CachedRoute, RouteCache};
pub use config::RouterConfig;
pub use directional::DirectionalRouter;
pub use error::{RoutingError, RoutingResult};
pub use handler::{Delivery, PacketHandler};
pub use listener::{TopologyListener, left_neighbor_of};
pub use router::{ClassRouter, DropReason, RouteOutcome, Router, RouterSet};
pub use state::{Lookup, RouteState};
pub use stats::{RouterStats, StatsSnapshot};
pub use structured::StructuredRouter;
