//! Static antenna/console table loaded once at startup.
//!
//! Every antenna owns a fixed address and a finite set of gateways it accepts.
//! Consoles are derived from the antenna table (`console_<antenna_id>`), so the
//! console/antenna binding is 1:1 by construction.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::{parse_address, AddressError};

/// Antenna identifier (e.g. `ac1`).
pub type AntennaId = String;

/// Console identifier (e.g. `console_ac1`).
pub type ConsoleId = String;

/// Prefix that binds a console to its antenna.
pub const CONSOLE_PREFIX: &str = "console_";

/// Console id bound to `antenna_id`.
pub fn console_id_for(antenna_id: &str) -> ConsoleId {
    format!("{CONSOLE_PREFIX}{antenna_id}")
}

/// Registry errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TopologyError {
    /// No antenna with this id.
    #[error("unknown antenna: {0}")]
    UnknownAntenna(String),
    /// No console with this id.
    #[error("unknown console: {0}")]
    UnknownConsole(String),
    /// Antenna id declared twice in the load table.
    #[error("duplicate antenna id: {0}")]
    DuplicateAntenna(String),
    /// Antenna declared without any gateway.
    #[error("antenna {0} has no allowed gateways")]
    NoGateways(String),
    /// Bad address literal in the load table.
    #[error("antenna {antenna}: {source}")]
    Address {
        /// Antenna whose entry failed to parse.
        antenna: String,
        /// Underlying parse error.
        #[source]
        source: AddressError,
    },
    /// Load table is not valid JSON for [`TopologySpec`].
    #[error("malformed topology table: {0}")]
    Malformed(String),
}

/// One antenna entry of the load table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AntennaSpec {
    /// Antenna id.
    pub id: AntennaId,
    /// Provisioned address.
    pub fixed_ip: String,
    /// Gateways the antenna accepts.
    pub allowed_gateways: Vec<String>,
    /// Serial number suffix printed on the unit.
    #[serde(default)]
    pub serial_suffix: Option<String>,
}

/// External load format of the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopologySpec {
    /// Antenna entries.
    pub antennas: Vec<AntennaSpec>,
}

impl TopologySpec {
    /// Decode a table from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, TopologyError> {
        serde_json::from_slice(bytes).map_err(|err| TopologyError::Malformed(err.to_string()))
    }
}

/// Validated antenna descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AntennaDescriptor {
    /// Antenna id.
    pub id: AntennaId,
    /// Provisioned address; not user-chosen.
    pub fixed_ip: Ipv4Addr,
    /// Gateways the antenna accepts.
    pub allowed_gateways: BTreeSet<Ipv4Addr>,
    /// Serial number suffix, if known.
    pub serial_suffix: Option<String>,
}

impl AntennaDescriptor {
    /// Console bound to this antenna.
    pub fn console_id(&self) -> ConsoleId {
        console_id_for(&self.id)
    }

    /// Whether `gateway` is accepted by this antenna.
    pub fn allows_gateway(&self, gateway: Ipv4Addr) -> bool {
        self.allowed_gateways.contains(&gateway)
    }

    /// Allowed gateways rendered as `a, b`.
    pub fn allowed_gateways_display(&self) -> String {
        self.allowed_gateways
            .iter()
            .map(Ipv4Addr::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Read-only antenna/console lookup.
#[derive(Debug, Clone, Default)]
pub struct TopologyRegistry {
    antennas: BTreeMap<AntennaId, AntennaDescriptor>,
    consoles: BTreeMap<ConsoleId, AntennaId>,
}

impl TopologyRegistry {
    /// Build a registry from a load table, rejecting bad literals and duplicates.
    pub fn from_spec(spec: &TopologySpec) -> Result<Self, TopologyError> {
        let mut registry = Self::default();
        for entry in &spec.antennas {
            if registry.antennas.contains_key(&entry.id) {
                return Err(TopologyError::DuplicateAntenna(entry.id.clone()));
            }
            let parse = |text: &str| {
                parse_address(text).map_err(|source| TopologyError::Address {
                    antenna: entry.id.clone(),
                    source,
                })
            };
            let fixed_ip = parse(&entry.fixed_ip)?;
            let allowed_gateways = entry
                .allowed_gateways
                .iter()
                .map(|gw| parse(gw))
                .collect::<Result<BTreeSet<_>, _>>()?;
            if allowed_gateways.is_empty() {
                return Err(TopologyError::NoGateways(entry.id.clone()));
            }
            let descriptor = AntennaDescriptor {
                id: entry.id.clone(),
                fixed_ip,
                allowed_gateways,
                serial_suffix: entry.serial_suffix.clone(),
            };
            registry
                .consoles
                .insert(descriptor.console_id(), entry.id.clone());
            registry.antennas.insert(entry.id.clone(), descriptor);
        }
        Ok(registry)
    }

    /// Decode and validate a JSON load table.
    pub fn from_json(bytes: &[u8]) -> Result<Self, TopologyError> {
        Self::from_spec(&TopologySpec::from_json(bytes)?)
    }

    /// Built-in two-pair training topology.
    pub fn reference() -> Self {
        let table = reference_spec();
        // The built-in table is a constant; a failure here is a programming error.
        Self::from_spec(&table).expect("reference topology is well-formed")
    }

    /// Descriptor for `antenna_id`.
    pub fn antenna(&self, antenna_id: &str) -> Result<&AntennaDescriptor, TopologyError> {
        self.antennas
            .get(antenna_id)
            .ok_or_else(|| TopologyError::UnknownAntenna(antenna_id.to_string()))
    }

    /// Antenna bound to `console_id`.
    pub fn antenna_for_console(
        &self,
        console_id: &str,
    ) -> Result<&AntennaDescriptor, TopologyError> {
        let antenna_id = self
            .consoles
            .get(console_id)
            .ok_or_else(|| TopologyError::UnknownConsole(console_id.to_string()))?;
        self.antenna(antenna_id)
    }

    /// Console bound to `antenna_id`.
    pub fn console_for_antenna(&self, antenna_id: &str) -> Result<ConsoleId, TopologyError> {
        self.antenna(antenna_id).map(AntennaDescriptor::console_id)
    }

    /// All antennas in id order.
    pub fn antennas(&self) -> impl Iterator<Item = &AntennaDescriptor> {
        self.antennas.values()
    }

    /// All consoles in id order.
    pub fn consoles(&self) -> impl Iterator<Item = &ConsoleId> {
        self.consoles.keys()
    }

    /// Number of console/antenna pairs.
    pub fn len(&self) -> usize {
        self.antennas.len()
    }

    /// Whether the registry has no pairs.
    pub fn is_empty(&self) -> bool {
        self.antennas.is_empty()
    }
}

/// Load table of the built-in training topology.
pub fn reference_spec() -> TopologySpec {
    let antenna = |id: &str, fixed_ip: &str, gateway: &str, serial: &str| AntennaSpec {
        id: id.into(),
        fixed_ip: fixed_ip.into(),
        allowed_gateways: vec!["192.168.222.222".into(), gateway.into()],
        serial_suffix: Some(serial.into()),
    };
    TopologySpec {
        antennas: vec![
            antenna("ac1", "192.168.1.1", "10.0.0.115", "15"),
            antenna("ac2", "192.168.2.1", "10.0.0.125", "25"),
        ],
    }
}
