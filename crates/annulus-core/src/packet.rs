//! Routed packet and its fixed-layout header
//!
//! Wire layout (all integers big-endian):
//!
//! ```text
//! +------+-----+--------+-------------+---------+---------+
//! | hops | ttl | source | destination | options | payload |
//! |  2   |  2  |   20   |     20      |    2    |   ...   |
//! +------+-----+--------+-------------+---------+---------+
//! ```

use std::fmt::{self, Display};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::address::{ADDRESS_SIZE, Address};
use crate::error::ProtocolError;

/// Size of the fixed header preceding the payload
pub const HEADER_LEN: usize = 2 + 2 + ADDRESS_SIZE + ADDRESS_SIZE + 2;

/// Hop budget given to packets that don't set one explicitly
pub const DEFAULT_TTL: u16 = 64;

/// Routing mode bits carried in the header
///
/// With no mode bit set the packet is routed with plain annealing.
/// Bits this crate does not know about are carried through untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteOptions(u16);

impl RouteOptions {
    /// Annealing; the last node to see the packet delivers it
    pub const LAST: Self = Self(0x0001);
    /// Annealing; every node on the path delivers it
    pub const PATH: Self = Self(0x0002);
    /// Only the node whose address equals the destination delivers it
    pub const EXACT: Self = Self(0x0004);
    /// Forward only when strictly closer, otherwise deliver
    pub const GREEDY: Self = Self(0x0008);

    /// No options: plain annealing
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build from raw header bits
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw header bits
    pub const fn bits(&self) -> u16 {
        self.0
    }

    /// Whether every bit of `other` is set
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Union of two option sets
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for RouteOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl Display for RouteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::LAST, "last"),
            (Self::PATH, "path"),
            (Self::EXACT, "exact"),
            (Self::GREEDY, "greedy"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            write!(f, "annealing")
        } else {
            write!(f, "{}", set.join("|"))
        }
    }
}

/// A routed packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Number of forwards so far
    pub hops: u16,
    /// Maximum number of forwards
    pub ttl: u16,
    /// Originating node
    pub source: Address,
    /// Point on the ring (or directional address) being routed to
    pub destination: Address,
    /// Routing mode
    pub options: RouteOptions,
    /// Opaque application payload
    pub payload: Bytes,
}

impl Packet {
    /// Create a fresh packet with zero hops and the default ttl
    pub fn new(source: Address, destination: Address, payload: impl Into<Bytes>) -> Self {
        Self {
            hops: 0,
            ttl: DEFAULT_TTL,
            source,
            destination,
            options: RouteOptions::empty(),
            payload: payload.into(),
        }
    }

    pub fn with_ttl(mut self, ttl: u16) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_hops(mut self, hops: u16) -> Self {
        self.hops = hops;
        self
    }

    pub fn with_options(mut self, options: RouteOptions) -> Self {
        self.options = options;
        self
    }

    /// Whether the header option bits include `option`
    pub fn has_option(&self, option: RouteOptions) -> bool {
        self.options.contains(option)
    }

    /// Copy of this packet with the hop count advanced by one
    pub fn incremented(&self) -> Self {
        Self {
            hops: self.hops.saturating_add(1),
            ..self.clone()
        }
    }

    /// Serialize header and payload
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u16(self.hops);
        buf.put_u16(self.ttl);
        buf.put_slice(self.source.as_bytes());
        buf.put_slice(self.destination.as_bytes());
        buf.put_u16(self.options.bits());
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse a packet, sharing the payload with the input buffer
    ///
    /// Only the length is validated here; the hop/ttl invariant is
    /// checked by the router so it can be logged with routing context.
    pub fn decode(mut raw: Bytes) -> Result<Self, ProtocolError> {
        if raw.len() < HEADER_LEN {
            return Err(ProtocolError::TruncatedHeader {
                needed: HEADER_LEN,
                actual: raw.len(),
            });
        }

        let hops = raw.get_u16();
        let ttl = raw.get_u16();
        let mut source = [0u8; ADDRESS_SIZE];
        raw.copy_to_slice(&mut source);
        let mut destination = [0u8; ADDRESS_SIZE];
        raw.copy_to_slice(&mut destination);
        let options = RouteOptions::from_bits(raw.get_u16());

        Ok(Self {
            hops,
            ttl,
            source: Address::new(source),
            destination: Address::new(destination),
            options,
            payload: raw,
        })
    }
}

impl Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} [{}/{} {}] ({} bytes)",
            self.source,
            self.destination,
            self.hops,
            self.ttl,
            self.options,
            self.payload.len()
        )
    }
}
