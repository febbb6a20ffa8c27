//! Acceptance rules for console and antenna addressing.
//!
//! Both validators are pure predicates over a submitted [`DeviceConfig`] and
//! the static [`AntennaDescriptor`]; they never store anything. Checks run in
//! a fixed order and the first failure is reported.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::{parse_address, Network};
use crate::topology::{AntennaDescriptor, ConsoleId};

/// Base of the shared console subnet, independent of the antenna.
pub const SERVICE_SUBNET_BASE: Ipv4Addr = Ipv4Addr::new(192, 168, 222, 0);

/// Console addresses that are never assignable: network, `.1`, control, broadcast.
pub const RESERVED_CONSOLE_ADDRESSES: [Ipv4Addr; 4] = [
    Ipv4Addr::new(192, 168, 222, 0),
    Ipv4Addr::new(192, 168, 222, 1),
    Ipv4Addr::new(192, 168, 222, 222),
    Ipv4Addr::new(192, 168, 222, 255),
];

/// Addressing submitted for a console or an antenna, kept as typed by the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceConfig {
    /// IP address text.
    pub ip: String,
    /// Subnet mask text.
    pub subnet_mask: String,
    /// Gateway text, if any.
    #[serde(default)]
    pub gateway: Option<String>,
}

impl DeviceConfig {
    /// Build a config; a blank gateway counts as absent.
    pub fn new(
        ip: impl Into<String>,
        subnet_mask: impl Into<String>,
        gateway: Option<impl Into<String>>,
    ) -> Self {
        Self {
            ip: ip.into(),
            subnet_mask: subnet_mask.into(),
            gateway: gateway
                .map(Into::into)
                .filter(|gw: &String| !gw.trim().is_empty()),
        }
    }

    /// Gateway text unless blank.
    pub fn gateway(&self) -> Option<&str> {
        self.gateway.as_deref().filter(|gw| !gw.trim().is_empty())
    }
}

/// Console configuration.
pub type ConsoleConfig = DeviceConfig;
/// Antenna configuration.
pub type AntennaConfig = DeviceConfig;

/// Whether gateways are part of the acceptance contract.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GatewayCheck {
    /// Gateway optional; an antenna gateway is checked only when supplied.
    #[default]
    Lenient,
    /// Gateway mandatory on consoles and antennas and must be allowed by the antenna.
    Strict,
}

impl GatewayCheck {
    fn gateway_required(self) -> bool {
        matches!(self, GatewayCheck::Strict)
    }
}

/// Field of a [`DeviceConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressField {
    /// IP address.
    Ip,
    /// Subnet mask.
    Mask,
    /// Gateway.
    Gateway,
}

impl fmt::Display for AddressField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AddressField::Ip => "IP address",
            AddressField::Mask => "subnet mask",
            AddressField::Gateway => "gateway",
        })
    }
}

/// Reasons a configuration is rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Field is not a dotted-quad literal.
    #[error("{field} {value:?} is not a valid IPv4 address")]
    MalformedAddress {
        /// Offending field.
        field: AddressField,
        /// Submitted text.
        value: String,
    },
    /// Mask is neither a contiguous netmask nor a contiguous hostmask.
    #[error("subnet mask {mask:?} is not a valid netmask")]
    InvalidMask {
        /// Submitted mask text.
        mask: String,
    },
    /// Console address outside the service subnet.
    #[error("console IP {ip} is not inside subnet {network}")]
    SubnetMismatch {
        /// Submitted console address.
        ip: Ipv4Addr,
        /// Service subnet under the submitted mask.
        network: Network,
    },
    /// Console address is a network, broadcast, or control address.
    #[error(
        "console IP {ip} is reserved (network, broadcast, router .1 or control .222 address)"
    )]
    ReservedAddress {
        /// Submitted console address.
        ip: Ipv4Addr,
    },
    /// Gateway missing or outside the antenna's allowed set.
    #[error("gateway {} is not allowed; allowed values: {allowed}", .gateway.as_deref().unwrap_or("(none)"))]
    GatewayNotAllowed {
        /// Submitted gateway, if any.
        gateway: Option<String>,
        /// Allowed gateways rendered for the user.
        allowed: String,
    },
    /// Bound console has no stored configuration.
    #[error("configure console {console} before its antenna")]
    ConsoleNotConfigured {
        /// Console that must be configured first.
        console: ConsoleId,
    },
    /// Antenna address differs from the provisioned one.
    #[error("antenna IP must be {expected}, got {submitted:?}")]
    WrongAntennaAddress {
        /// Provisioned address.
        expected: Ipv4Addr,
        /// Submitted text.
        submitted: String,
    },
}

fn parse_field(field: AddressField, value: &str) -> Result<Ipv4Addr, ValidationError> {
    parse_address(value).map_err(|_| ValidationError::MalformedAddress {
        field,
        value: value.to_string(),
    })
}

fn check_gateway(
    gateway: Option<&str>,
    antenna: &AntennaDescriptor,
    check: GatewayCheck,
) -> Result<(), ValidationError> {
    let not_allowed = |gateway: Option<&str>| ValidationError::GatewayNotAllowed {
        gateway: gateway.map(str::to_string),
        allowed: antenna.allowed_gateways_display(),
    };
    match gateway {
        None if check.gateway_required() => Err(not_allowed(None)),
        None => Ok(()),
        Some(text) => {
            let gw = parse_field(AddressField::Gateway, text)?;
            if antenna.allows_gateway(gw) {
                Ok(())
            } else {
                Err(not_allowed(Some(text)))
            }
        }
    }
}

/// Validate a console configuration for the console bound to `antenna`.
///
/// Order: literal syntax, reserved addresses, service subnet membership, then
/// (strict only) gateway membership.
pub fn validate_console_config(
    config: &ConsoleConfig,
    antenna: &AntennaDescriptor,
    check: GatewayCheck,
) -> Result<(), ValidationError> {
    let ip = parse_field(AddressField::Ip, &config.ip)?;
    let mask = parse_field(AddressField::Mask, &config.subnet_mask)?;
    if let Some(gw) = config.gateway() {
        parse_field(AddressField::Gateway, gw)?;
    }

    // Reserved addresses stay reserved whatever mask was submitted.
    if RESERVED_CONSOLE_ADDRESSES.contains(&ip) {
        return Err(ValidationError::ReservedAddress { ip });
    }

    let network = Network::from_mask(SERVICE_SUBNET_BASE, mask).map_err(|_| {
        ValidationError::InvalidMask {
            mask: config.subnet_mask.clone(),
        }
    })?;
    if !network.contains(ip) {
        return Err(ValidationError::SubnetMismatch { ip, network });
    }

    if check.gateway_required() {
        check_gateway(config.gateway(), antenna, check)?;
    }
    Ok(())
}

/// Validate an antenna configuration given the stored config of its console.
///
/// The console config is re-validated here; nothing is trusted from an
/// earlier acceptance.
pub fn validate_antenna_config(
    config: &AntennaConfig,
    antenna: &AntennaDescriptor,
    bound_console: Option<&ConsoleConfig>,
    check: GatewayCheck,
) -> Result<(), ValidationError> {
    let console = bound_console.ok_or_else(|| ValidationError::ConsoleNotConfigured {
        console: antenna.console_id(),
    })?;
    validate_console_config(console, antenna, check)?;

    match parse_address(&config.ip) {
        Ok(ip) if ip == antenna.fixed_ip => {}
        _ => {
            return Err(ValidationError::WrongAntennaAddress {
                expected: antenna.fixed_ip,
                submitted: config.ip.clone(),
            })
        }
    }

    if parse_address(&config.subnet_mask).is_err() {
        return Err(ValidationError::InvalidMask {
            mask: config.subnet_mask.clone(),
        });
    }

    check_gateway(config.gateway(), antenna, check)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::TopologyRegistry;
    use proptest::prelude::*;

    fn ac1() -> AntennaDescriptor {
        TopologyRegistry::reference().antenna("ac1").unwrap().clone()
    }

    fn console(ip: &str, mask: &str, gateway: Option<&str>) -> ConsoleConfig {
        DeviceConfig::new(ip, mask, gateway)
    }

    #[test]
    fn accepts_plain_console() {
        let cfg = console("192.168.222.10", "255.255.255.0", None);
        assert_eq!(validate_console_config(&cfg, &ac1(), GatewayCheck::Lenient), Ok(()));
    }

    #[test]
    fn malformed_literals_are_reported_by_field() {
        let err = validate_console_config(
            &console("192.168.222.300", "255.255.255.0", None),
            &ac1(),
            GatewayCheck::Lenient,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::MalformedAddress { field: AddressField::Ip, .. }));

        let err = validate_console_config(
            &console("192.168.222.10", "/24", None),
            &ac1(),
            GatewayCheck::Lenient,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::MalformedAddress { field: AddressField::Mask, .. }));

        let err = validate_console_config(
            &console("192.168.222.10", "255.255.255.0", Some("gw")),
            &ac1(),
            GatewayCheck::Lenient,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ValidationError::MalformedAddress { field: AddressField::Gateway, .. }
        ));
    }

    #[test]
    fn non_contiguous_mask_is_invalid() {
        let err = validate_console_config(
            &console("192.168.222.10", "255.0.255.0", None),
            &ac1(),
            GatewayCheck::Lenient,
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::InvalidMask { mask: "255.0.255.0".into() });
    }

    #[test]
    fn hostmask_form_is_accepted() {
        let cfg = console("192.168.222.10", "0.0.0.255", None);
        assert_eq!(validate_console_config(&cfg, &ac1(), GatewayCheck::Lenient), Ok(()));
        let outside = console("192.168.1.10", "0.0.0.255", None);
        assert!(matches!(
            validate_console_config(&outside, &ac1(), GatewayCheck::Lenient),
            Err(ValidationError::SubnetMismatch { .. })
        ));
    }

    #[test]
    fn console_outside_service_subnet() {
        let err = validate_console_config(
            &console("192.168.1.10", "255.255.255.0", None),
            &ac1(),
            GatewayCheck::Lenient,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "console IP 192.168.1.10 is not inside subnet 192.168.222.0/24");
    }

    #[test]
    fn reserved_addresses_rejected_under_every_mask() {
        for reserved in RESERVED_CONSOLE_ADDRESSES {
            for mask in ["255.255.255.0", "255.255.0.0", "255.255.255.252", "255.0.255.0"] {
                let cfg = console(&reserved.to_string(), mask, None);
                assert_eq!(
                    validate_console_config(&cfg, &ac1(), GatewayCheck::Lenient),
                    Err(ValidationError::ReservedAddress { ip: reserved })
                );
            }
        }
    }

    #[test]
    fn strict_console_requires_allowed_gateway() {
        let antenna = ac1();
        let no_gw = console("192.168.222.10", "255.255.255.0", None);
        let err = validate_console_config(&no_gw, &antenna, GatewayCheck::Strict).unwrap_err();
        assert_eq!(
            err.to_string(),
            "gateway (none) is not allowed; allowed values: 10.0.0.115, 192.168.222.222"
        );

        let wrong = console("192.168.222.10", "255.255.255.0", Some("10.0.0.125"));
        assert!(matches!(
            validate_console_config(&wrong, &antenna, GatewayCheck::Strict),
            Err(ValidationError::GatewayNotAllowed { .. })
        ));
        // Lenient mode ignores a syntactically valid gateway on consoles.
        assert_eq!(validate_console_config(&wrong, &antenna, GatewayCheck::Lenient), Ok(()));

        let good = console("192.168.222.10", "255.255.255.0", Some("192.168.222.222"));
        assert_eq!(validate_console_config(&good, &antenna, GatewayCheck::Strict), Ok(()));
    }

    #[test]
    fn antenna_requires_console_first() {
        let antenna = ac1();
        let cfg = DeviceConfig::new("192.168.1.1", "255.255.255.0", None::<String>);
        assert_eq!(
            validate_antenna_config(&cfg, &antenna, None, GatewayCheck::Lenient),
            Err(ValidationError::ConsoleNotConfigured { console: "console_ac1".into() })
        );
        let bad_console = console("192.168.222.222", "255.255.255.0", None);
        assert_eq!(
            validate_antenna_config(&cfg, &antenna, Some(&bad_console), GatewayCheck::Lenient),
            Err(ValidationError::ReservedAddress { ip: Ipv4Addr::new(192, 168, 222, 222) })
        );
    }

    #[test]
    fn antenna_address_is_provisioned() {
        let antenna = ac1();
        let good_console = console("192.168.222.10", "255.255.255.0", None);
        for submitted in ["192.168.1.2", "192.168.1", ""] {
            let cfg = DeviceConfig::new(submitted, "255.255.255.0", None::<String>);
            assert_eq!(
                validate_antenna_config(&cfg, &antenna, Some(&good_console), GatewayCheck::Lenient),
                Err(ValidationError::WrongAntennaAddress {
                    expected: antenna.fixed_ip,
                    submitted: submitted.into(),
                })
            );
        }
        let cfg = DeviceConfig::new("192.168.1.1", "255.255.255.0", None::<String>);
        assert_eq!(
            validate_antenna_config(&cfg, &antenna, Some(&good_console), GatewayCheck::Lenient),
            Ok(())
        );
    }

    #[test]
    fn antenna_mask_and_gateway() {
        let antenna = ac1();
        let good_console = console("192.168.222.10", "255.255.255.0", Some("10.0.0.115"));

        let bad_mask = DeviceConfig::new("192.168.1.1", "mask", None::<String>);
        assert_eq!(
            validate_antenna_config(&bad_mask, &antenna, Some(&good_console), GatewayCheck::Lenient),
            Err(ValidationError::InvalidMask { mask: "mask".into() })
        );

        let foreign_gw = DeviceConfig::new("192.168.1.1", "255.255.255.0", Some("10.0.0.125"));
        for check in [GatewayCheck::Lenient, GatewayCheck::Strict] {
            assert!(matches!(
                validate_antenna_config(&foreign_gw, &antenna, Some(&good_console), check),
                Err(ValidationError::GatewayNotAllowed { .. })
            ));
        }

        let no_gw = DeviceConfig::new("192.168.1.1", "255.255.255.0", None::<String>);
        assert_eq!(
            validate_antenna_config(&no_gw, &antenna, Some(&good_console), GatewayCheck::Lenient),
            Ok(())
        );
        assert!(matches!(
            validate_antenna_config(&no_gw, &antenna, Some(&good_console), GatewayCheck::Strict),
            Err(ValidationError::GatewayNotAllowed { gateway: None, .. })
        ));

        let own_gw = DeviceConfig::new("192.168.1.1", "255.255.255.0", Some("10.0.0.115"));
        assert_eq!(
            validate_antenna_config(&own_gw, &antenna, Some(&good_console), GatewayCheck::Strict),
            Ok(())
        );
    }

    #[test]
    fn blank_gateway_counts_as_absent() {
        let cfg = DeviceConfig::new("192.168.222.10", "255.255.255.0", Some("  "));
        assert_eq!(cfg.gateway, None);
        assert_eq!(cfg.gateway(), None);
    }

    proptest! {
        #[test]
        fn hosts_of_service_subnet_are_valid(prefix in 8u8..=30, host in any::<u32>()) {
            let mask_bits = u32::MAX << (32 - u32::from(prefix));
            let base = u32::from(SERVICE_SUBNET_BASE) & mask_bits;
            let ip = Ipv4Addr::from(base | (host & !mask_bits));
            prop_assume!(!RESERVED_CONSOLE_ADDRESSES.contains(&ip));
            let cfg = console(&ip.to_string(), &Ipv4Addr::from(mask_bits).to_string(), None);
            prop_assert_eq!(validate_console_config(&cfg, &ac1(), GatewayCheck::Lenient), Ok(()));
        }

        #[test]
        fn control_address_is_always_reserved(prefix in 0u8..=32) {
            let mask_bits = if prefix == 0 { 0 } else { u32::MAX << (32 - u32::from(prefix)) };
            let cfg = console("192.168.222.222", &Ipv4Addr::from(mask_bits).to_string(), None);
            prop_assert_eq!(
                validate_console_config(&cfg, &ac1(), GatewayCheck::Lenient),
                Err(ValidationError::ReservedAddress { ip: Ipv4Addr::new(192, 168, 222, 222) })
            );
        }
    }
}
