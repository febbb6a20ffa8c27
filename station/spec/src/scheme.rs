//! Clickable network diagrams ("schemes") and per-device addressing records.
//!
//! A scheme is a named picture of the training network; each device on it has
//! a clickable rectangle and a kind. The catalog is read-only after startup.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scheme identifier (e.g. `scheme1`).
pub type SchemeId = String;

/// DNS server recorded when a device config leaves it out.
pub const DEFAULT_DNS: &str = "8.8.8.8";

/// Kind of device drawn on a scheme.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Satellite antenna.
    Antenna,
    /// Antenna console.
    Console,
    /// Consumer PC.
    Pc,
}

/// Clickable rectangle of one device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClickableArea {
    /// Device id, unique within the scheme.
    pub device_id: String,
    /// Left edge in diagram pixels.
    pub x: i32,
    /// Top edge in diagram pixels.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Caption shown on the diagram.
    pub label: String,
    /// Device kind.
    #[serde(rename = "type")]
    pub kind: DeviceKind,
}

/// One diagram with its devices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scheme {
    /// Scheme id.
    pub id: SchemeId,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Devices in drawing order.
    pub areas: Vec<ClickableArea>,
}

impl Scheme {
    /// Area of `device_id`, if drawn on this scheme.
    pub fn area(&self, device_id: &str) -> Option<&ClickableArea> {
        self.areas.iter().find(|area| area.device_id == device_id)
    }
}

/// Catalog lookup failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemeError {
    /// No scheme with this id.
    #[error("scheme {0} not found")]
    UnknownScheme(SchemeId),
    /// Scheme exists but has no such device.
    #[error("device {device} not found on scheme {scheme}")]
    UnknownDevice {
        /// Scheme searched.
        scheme: SchemeId,
        /// Missing device id.
        device: String,
    },
}

/// Addressing a user assigned to a scheme device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceIps {
    /// IP address text.
    pub ip_address: String,
    /// Subnet mask text.
    pub subnet_mask: String,
    /// Gateway text.
    pub gateway: String,
    /// DNS server text.
    #[serde(default = "default_dns")]
    pub dns: String,
}

fn default_dns() -> String {
    DEFAULT_DNS.to_string()
}

impl DeviceIps {
    /// Replace a blank DNS with [`DEFAULT_DNS`].
    pub fn with_default_dns(mut self) -> Self {
        if self.dns.trim().is_empty() {
            self.dns = default_dns();
        }
        self
    }
}

/// Read-only set of schemes keyed by id.
#[derive(Debug, Clone, Default)]
pub struct SchemeCatalog {
    schemes: BTreeMap<SchemeId, Scheme>,
}

impl SchemeCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a scheme.
    pub fn upsert(&mut self, scheme: Scheme) {
        self.schemes.insert(scheme.id.clone(), scheme);
    }

    /// Built-in catalog: `scheme1` with both antenna/console pairs and two PCs.
    pub fn reference() -> Self {
        let area = |device_id: &str, label: &str, kind, x, y, width, height| ClickableArea {
            device_id: device_id.into(),
            x,
            y,
            width,
            height,
            label: label.into(),
            kind,
        };
        let mut catalog = Self::new();
        catalog.upsert(Scheme {
            id: "scheme1".into(),
            description: Some("Initial deployment".into()),
            areas: vec![
                area("ac1", "AC 1 (P-448TH)", DeviceKind::Antenna, 200, 600, 150, 80),
                area("ac2", "AC 2 (P-448TH)", DeviceKind::Antenna, 900, 600, 150, 80),
                area("console_ac1", "Console AC 1", DeviceKind::Console, 200, 700, 120, 40),
                area("console_ac2", "Console AC 2", DeviceKind::Console, 900, 700, 120, 40),
                area("pc1", "PC 1 (consumer)", DeviceKind::Pc, 300, 200, 100, 60),
                area("pc2", "PC 2 (consumer)", DeviceKind::Pc, 800, 200, 100, 60),
            ],
        });
        catalog
    }

    /// Scheme ids in order.
    pub fn scheme_ids(&self) -> impl Iterator<Item = &SchemeId> {
        self.schemes.keys()
    }

    /// Scheme by id.
    pub fn scheme(&self, scheme_id: &str) -> Result<&Scheme, SchemeError> {
        self.schemes
            .get(scheme_id)
            .ok_or_else(|| SchemeError::UnknownScheme(scheme_id.to_string()))
    }

    /// Device area on a scheme.
    pub fn device(&self, scheme_id: &str, device_id: &str) -> Result<&ClickableArea, SchemeError> {
        self.scheme(scheme_id)?
            .area(device_id)
            .ok_or_else(|| SchemeError::UnknownDevice {
                scheme: scheme_id.to_string(),
                device: device_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_scheme_has_six_devices() {
        let catalog = SchemeCatalog::reference();
        assert_eq!(catalog.scheme_ids().collect::<Vec<_>>(), vec!["scheme1"]);
        let scheme = catalog.scheme("scheme1").unwrap();
        assert_eq!(scheme.areas.len(), 6);
        let pcs: Vec<_> = scheme
            .areas
            .iter()
            .filter(|a| a.kind == DeviceKind::Pc)
            .map(|a| a.device_id.as_str())
            .collect();
        assert_eq!(pcs, vec!["pc1", "pc2"]);
    }

    #[test]
    fn unknown_scheme_and_device() {
        let catalog = SchemeCatalog::reference();
        assert_eq!(
            catalog.scheme("scheme9").unwrap_err(),
            SchemeError::UnknownScheme("scheme9".into())
        );
        assert_eq!(
            catalog.device("scheme1", "pc7").unwrap_err().to_string(),
            "device pc7 not found on scheme scheme1"
        );
        assert_eq!(catalog.device("scheme1", "pc2").unwrap().kind, DeviceKind::Pc);
    }

    #[test]
    fn area_serializes_kind_as_type() {
        let catalog = SchemeCatalog::reference();
        let json = serde_json::to_value(catalog.device("scheme1", "console_ac1").unwrap()).unwrap();
        assert_eq!(json["type"], "console");
        assert_eq!(json["device_id"], "console_ac1");
    }

    #[test]
    fn dns_defaults_when_missing_or_blank() {
        let ips: DeviceIps = serde_json::from_str(
            r#"{"ip_address": "192.168.10.2", "subnet_mask": "255.255.255.0", "gateway": "192.168.10.1"}"#,
        )
        .unwrap();
        assert_eq!(ips.dns, DEFAULT_DNS);

        let blank = DeviceIps {
            dns: " ".into(),
            ..ips.clone()
        };
        assert_eq!(blank.with_default_dns().dns, "8.8.8.8");
    }
}
