//! # Annulus Core
//!
//! Core types for the Annulus structured overlay.
//!
//! This crate holds everything the router consumes but does not own:
//! the circular identifier space, the fixed-layout packet header, the
//! connection records handed out by the connection table, and the link
//! boundary used to push bytes to a neighbor.
//!
//! ## Key Types
//!
//! - [`Address`]: 160-bit identifier on the ring, tagged with an [`AddressClass`]
//! - [`AddressSpace`]: circular space of size `2^bits` with the distance metric
//! - [`Packet`]: routed packet with its hop/ttl/options header
//! - [`Connection`]: immutable record of a live neighbor connection
//! - [`ConnectionList`]: sorted, circularly indexed snapshot of connections
//!
//! ## Key Traits
//!
//! - [`Link`]: non-blocking, best-effort send to one neighbor
//! - [`ConnectionTable`]: read interface over live connections
//! - [`TopologyObserver`]: receives connection add/remove/status notifications

pub mod address;
pub mod connection;
pub mod error;
pub mod link;
pub mod packet;
pub mod table;

// Re-export main types
pub use address::*;
pub use connection::*;
pub use error::*;
pub use link::*;
pub use packet::*;
pub use table::*;
