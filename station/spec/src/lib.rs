//! Ground-station network specification types and validation primitives.
//!
//! This crate defines IPv4 address arithmetic, the static antenna/console
//! topology registry, the scheme catalog, and the rules that accept or reject
//! a console or antenna configuration. Everything here is pure: no I/O, no
//! global state.
#![deny(missing_docs)]

/// Dotted-quad parsing and network membership.
pub mod address;
/// Antenna descriptors and console bindings.
pub mod topology;
/// Console and antenna acceptance rules.
pub mod validation;
/// Network diagrams and per-device addressing records.
pub mod scheme;

pub use address::{contains, network_of, parse_address, AddressError, Network};
pub use scheme::{
    ClickableArea, DeviceIps, DeviceKind, Scheme, SchemeCatalog, SchemeError, SchemeId,
    DEFAULT_DNS,
};
pub use topology::{
    console_id_for, reference_spec, AntennaDescriptor, AntennaId, AntennaSpec, ConsoleId,
    TopologyError, TopologyRegistry, TopologySpec,
};
pub use validation::{
    validate_antenna_config, validate_console_config, AddressField, AntennaConfig,
    ConsoleConfig, DeviceConfig, GatewayCheck, ValidationError, RESERVED_CONSOLE_ADDRESSES,
    SERVICE_SUBNET_BASE,
};

/// Wall-clock timestamp (unix epoch millis).
pub type Timestamp = u64;

/// The only enabled frequency band.
pub const SUPPORTED_BAND: &str = "C";

/// The only enabled network topology.
pub const SUPPORTED_TOPOLOGY: &str = "point-to-point";

/// Why an operating mode selection was refused.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ModeError {
    /// Band other than [`SUPPORTED_BAND`].
    #[error("only the C band is available, got {0:?}")]
    Band(String),
    /// Topology other than [`SUPPORTED_TOPOLOGY`].
    #[error("only the point-to-point topology is available, got {0:?}")]
    Topology(String),
}

/// Check a band/topology pair against the enabled operating mode.
pub fn check_mode(band: &str, topology: &str) -> Result<(), ModeError> {
    if band != SUPPORTED_BAND {
        return Err(ModeError::Band(band.to_string()));
    }
    if topology != SUPPORTED_TOPOLOGY {
        return Err(ModeError::Topology(topology.to_string()));
    }
    Ok(())
}
