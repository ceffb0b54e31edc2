//! Router configuration

use std::num::NonZeroUsize;

use annulus_core::{AddressError, AddressSpace, ConfigError, MAX_ADDRESS_BITS};
use serde::{Deserialize, Serialize};

/// Construction parameters shared by the routers of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Width of the identifier space in bits
    pub address_bits: u32,
    /// Number of cached routing decisions
    pub cache_capacity: usize,
    /// Hops during which a packet may move away from its destination
    pub max_uphill_hops: u16,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            address_bits: MAX_ADDRESS_BITS,
            cache_capacity: 100,
            max_uphill_hops: 1,
        }
    }
}

impl RouterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address_bits(mut self, bits: u32) -> Self {
        self.address_bits = bits;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_max_uphill_hops(mut self, hops: u16) -> Self {
        self.max_uphill_hops = hops;
        self
    }

    /// Check every field is in range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address_bits == 0 || self.address_bits > MAX_ADDRESS_BITS {
            return Err(ConfigError::InvalidValue {
                field: "address_bits",
                reason: format!(
                    "must be between 1 and {}, got {}",
                    MAX_ADDRESS_BITS, self.address_bits
                ),
            });
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// The identifier space described by `address_bits`
    pub fn address_space(&self) -> Result<AddressSpace, AddressError> {
        AddressSpace::new(self.address_bits)
    }

    /// Cache capacity as the non-zero size the cache needs
    pub fn cache_size(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.cache_capacity).ok_or_else(|| ConfigError::InvalidValue {
            field: "cache_capacity",
            reason: "must be at least 1".to_string(),
        })
    }
}
