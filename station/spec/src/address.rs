//! Dotted-quad IPv4 parsing and network membership.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Address arithmetic errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    /// Text is not a dotted-quad IPv4 literal.
    #[error("invalid IPv4 address format: {0:?}")]
    InvalidFormat(String),
    /// Mask is neither a contiguous netmask nor a contiguous hostmask.
    #[error("invalid subnet mask: {0}")]
    InvalidMask(Ipv4Addr),
    /// CIDR text without a prefix length in `0..=32`.
    #[error("invalid network {0:?}")]
    InvalidNetwork(String),
}

/// Parse a dotted-quad IPv4 literal.
pub fn parse_address(text: &str) -> Result<Ipv4Addr, AddressError> {
    text.parse::<Ipv4Addr>()
        .map_err(|_| AddressError::InvalidFormat(text.to_string()))
}

/// IPv4 network: base address with host bits cleared plus prefix length.
///
/// Serialized as CIDR text; deserialization goes through [`Network::from_prefix`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Network {
    base: Ipv4Addr,
    prefix_len: u8,
}

impl Network {
    /// Build a network from any address inside it and a dotted-quad mask.
    ///
    /// The mask may be a netmask (`255.255.255.0`) or a hostmask
    /// (`0.0.0.255`); a netmask reading wins when both apply. Bits of
    /// `address` outside the mask are dropped rather than rejected.
    pub fn from_mask(address: Ipv4Addr, mask: Ipv4Addr) -> Result<Self, AddressError> {
        let raw = u32::from(mask);
        let netmask = if is_netmask(raw) {
            raw
        } else if is_netmask(!raw) {
            !raw
        } else {
            return Err(AddressError::InvalidMask(mask));
        };
        Ok(Self {
            base: Ipv4Addr::from(u32::from(address) & netmask),
            prefix_len: netmask.count_ones() as u8,
        })
    }

    /// Build a network from an address and a prefix length (at most 32).
    pub fn from_prefix(address: Ipv4Addr, prefix_len: u8) -> Option<Self> {
        if prefix_len > 32 {
            return None;
        }
        let mut network = Self {
            base: address,
            prefix_len,
        };
        network.base = Ipv4Addr::from(u32::from(address) & network.mask_bits());
        Some(network)
    }

    /// Network base address.
    pub fn base(&self) -> Ipv4Addr {
        self.base
    }

    /// Prefix length in bits.
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Netmask as a 32-bit value.
    pub fn mask_bits(&self) -> u32 {
        match self.prefix_len {
            0 => 0,
            len => u32::MAX << (32 - u32::from(len)),
        }
    }

    /// Highest address of the network.
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.base) | !self.mask_bits())
    }

    /// Whether `address` falls inside this network.
    pub fn contains(&self, address: Ipv4Addr) -> bool {
        u32::from(address) & self.mask_bits() == u32::from(self.base)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix_len)
    }
}

impl FromStr for Network {
    type Err = AddressError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || AddressError::InvalidNetwork(text.to_string());
        let (address, prefix) = text.split_once('/').ok_or_else(invalid)?;
        let address = parse_address(address).map_err(|_| invalid())?;
        let prefix = prefix.parse::<u8>().map_err(|_| invalid())?;
        Self::from_prefix(address, prefix).ok_or_else(invalid)
    }
}

impl TryFrom<String> for Network {
    type Error = AddressError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        text.parse()
    }
}

impl From<Network> for String {
    fn from(network: Network) -> Self {
        network.to_string()
    }
}

fn is_netmask(raw: u32) -> bool {
    let host_bits = !raw;
    host_bits & host_bits.wrapping_add(1) == 0
}

/// Compute the network of `address` under `mask` (non-strict).
pub fn network_of(address: Ipv4Addr, mask: Ipv4Addr) -> Result<Network, AddressError> {
    Network::from_mask(address, mask)
}

/// Whether `network` contains `address`.
pub fn contains(network: &Network, address: Ipv4Addr) -> bool {
    network.contains(address)
}
