//! Ring addresses and the circular identifier space
//!
//! Addresses are 160-bit big-endian values. The lowest bit is the address
//! class: class 0 addresses live on the ring and are routed by distance,
//! class 1 addresses are directional ("my left neighbor", "my right
//! neighbor") and are routed relative to the local node.
//!
//! [`AddressSpace`] fixes the width of the ring (`2^bits`) and provides
//! the distance metric every routing comparison is built on.

use std::fmt::{self, Debug, Display};

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::AddressError;

/// Size of an address on the wire, in bytes
pub const ADDRESS_SIZE: usize = 20;

/// Widest supported identifier space
pub const MAX_ADDRESS_BITS: u32 = (ADDRESS_SIZE * 8) as u32;

/// Partition of the address space selected by the lowest address bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressClass {
    /// Positioned on the ring, routed greedily/annealing by distance
    Structured,
    /// Relative to the local node, routed to the left or right neighbor
    Directional,
}

impl Display for AddressClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured => write!(f, "structured"),
            Self::Directional => write!(f, "directional"),
        }
    }
}

/// Which neighbor a directional address points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Towards increasing addresses
    Left,
    /// Towards decreasing addresses
    Right,
}

/// A fixed-width overlay address
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    /// Create an address from raw big-endian bytes
    pub const fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create an address from a byte slice of exactly [`ADDRESS_SIZE`] bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, AddressError> {
        let raw: [u8; ADDRESS_SIZE] =
            bytes
                .try_into()
                .map_err(|_| AddressError::InvalidLength {
                    expected: ADDRESS_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self(raw))
    }

    /// Create an address from a small integer (mostly useful for tests and narrow spaces)
    pub fn from_u64(value: u64) -> Self {
        let mut raw = [0u8; ADDRESS_SIZE];
        raw[ADDRESS_SIZE - 8..].copy_from_slice(&value.to_be_bytes());
        Self(raw)
    }

    /// Create an address from an integer, keeping the low 160 bits
    pub fn from_uint(value: U256) -> Self {
        let wide = value.to_be_bytes::<32>();
        let mut raw = [0u8; ADDRESS_SIZE];
        raw.copy_from_slice(&wide[32 - ADDRESS_SIZE..]);
        Self(raw)
    }

    /// Parse a hex string (with or without `0x`), left-padded to 20 bytes
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let digits = s.trim_start_matches("0x");
        if digits.len() > ADDRESS_SIZE * 2 {
            return Err(AddressError::InvalidFormat(s.to_string()));
        }
        let padded = format!("{:0>width$}", digits, width = ADDRESS_SIZE * 2);
        let bytes = hex::decode(padded).map_err(|e| AddressError::InvalidFormat(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Create a directional address pointing at the given neighbor
    pub fn directional(direction: Direction) -> Self {
        let bits = match direction {
            Direction::Left => 0b01,
            Direction::Right => 0b11,
        };
        Self::from_u64(bits)
    }

    /// The address as an integer
    pub fn to_uint(&self) -> U256 {
        U256::from_be_slice(&self.0)
    }

    /// Raw big-endian bytes
    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    /// The class encoded in the lowest bit
    pub fn class(&self) -> AddressClass {
        if self.0[ADDRESS_SIZE - 1] & 1 == 0 {
            AddressClass::Structured
        } else {
            AddressClass::Directional
        }
    }

    /// Copy of this address with the class bit forced
    pub fn with_class(mut self, class: AddressClass) -> Self {
        match class {
            AddressClass::Structured => self.0[ADDRESS_SIZE - 1] &= !1,
            AddressClass::Directional => self.0[ADDRESS_SIZE - 1] |= 1,
        }
        self
    }

    /// Direction of a directional address, `None` for structured ones
    pub fn direction(&self) -> Option<Direction> {
        match self.class() {
            AddressClass::Structured => None,
            AddressClass::Directional if self.0[ADDRESS_SIZE - 1] & 0b10 == 0 => {
                Some(Direction::Left)
            }
            AddressClass::Directional => Some(Direction::Right),
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.to_uint())
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl From<[u8; ADDRESS_SIZE]> for Address {
    fn from(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }
}

/// Distance from one address to another, normalised into `[-half, half)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedDistance {
    /// Absolute value of the distance
    pub magnitude: U256,
    /// True when the target lies on the decreasing side
    pub negative: bool,
}

/// Circular identifier space of size `2^bits`
///
/// ```
/// use annulus_core::{Address, AddressSpace};
///
/// let space = AddressSpace::new(8).unwrap();
/// let d = space.distance(&Address::from_u64(250), &Address::from_u64(4));
/// assert_eq!(d, alloy_primitives::U256::from(10u64));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSpace {
    bits: u32,
    full: U256,
    half: U256,
    mask: U256,
}

impl AddressSpace {
    /// Create a space of the given width (1..=160 bits)
    pub fn new(bits: u32) -> Result<Self, AddressError> {
        if bits == 0 || bits > MAX_ADDRESS_BITS {
            return Err(AddressError::InvalidWidth {
                bits,
                max: MAX_ADDRESS_BITS,
            });
        }
        let full = U256::from(1u8) << (bits as usize);
        Ok(Self {
            bits,
            full,
            half: full >> 1usize,
            mask: full - U256::from(1u8),
        })
    }

    /// Width of the space in bits
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Number of points on the ring
    pub fn full(&self) -> U256 {
        self.full
    }

    /// Half the ring; no two points are further apart than this
    pub fn half(&self) -> U256 {
        self.half
    }

    /// Whether the address value fits in this space
    pub fn contains(&self, addr: &Address) -> bool {
        addr.to_uint() <= self.mask
    }

    /// Validate that an address fits in this space
    pub fn check(&self, addr: &Address) -> Result<(), AddressError> {
        if self.contains(addr) {
            Ok(())
        } else {
            Err(AddressError::OutOfSpace(addr.to_string()))
        }
    }

    /// Distance from `from` to `to` with its sign
    pub fn signed_distance(&self, from: &Address, to: &Address) -> SignedDistance {
        let d = to.to_uint().wrapping_sub(from.to_uint()) & self.mask;
        if d >= self.half {
            SignedDistance {
                magnitude: self.full - d,
                negative: true,
            }
        } else {
            SignedDistance {
                magnitude: d,
                negative: false,
            }
        }
    }

    /// Symmetric circular distance between two addresses
    pub fn distance(&self, a: &Address, b: &Address) -> U256 {
        self.signed_distance(a, b).magnitude
    }

    /// True when `a` sits on the increasing (left) side of `b`
    pub fn is_left_of(&self, a: &Address, b: &Address) -> bool {
        self.signed_distance(a, b).negative
    }
}
