//! Scheme diagrams and the addressing users save for their devices.
//!
//! The catalog is fixed at startup; device configs go to a
//! [`DeviceConfigStore`]. Saves are only accepted for devices drawn on the
//! named scheme.

use std::sync::Arc;

use station_spec::{ClickableArea, DeviceIps, SchemeCatalog, SchemeError, SchemeId};
use tracing::{debug, error};

use crate::store::{DeviceConfigStore, SavedDeviceConfig, StoreError};

/// Scheme lookup and device config failures.
#[derive(Debug, thiserror::Error)]
pub enum SchemeServiceError {
    /// Unknown scheme or device.
    #[error(transparent)]
    Catalog(#[from] SchemeError),
    /// Device exists but nothing was saved for it.
    #[error("no config saved for device {device} on scheme {scheme}")]
    ConfigNotFound {
        /// Scheme searched.
        scheme: SchemeId,
        /// Device searched.
        device: String,
    },
    /// Device config store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SchemeServiceError {
    /// Whether the failure is a store fault rather than a missing entry.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SchemeServiceError::Store(_))
    }
}

/// Scheme catalog plus device config persistence.
#[derive(Clone)]
pub struct SchemeService {
    catalog: Arc<SchemeCatalog>,
    store: Arc<dyn DeviceConfigStore>,
}

impl SchemeService {
    /// Create a service.
    pub fn new(catalog: Arc<SchemeCatalog>, store: Arc<dyn DeviceConfigStore>) -> Self {
        Self { catalog, store }
    }

    /// Catalog in use.
    pub fn catalog(&self) -> &SchemeCatalog {
        &self.catalog
    }

    /// Ids of every scheme.
    pub fn list_schemes(&self) -> Vec<SchemeId> {
        self.catalog.scheme_ids().cloned().collect()
    }

    /// Clickable areas of a scheme.
    pub fn areas(&self, scheme_id: &str) -> Result<Vec<ClickableArea>, SchemeServiceError> {
        Ok(self.catalog.scheme(scheme_id)?.areas.clone())
    }

    /// Saved config of a scheme device.
    pub fn device_ips(
        &self,
        scheme_id: &str,
        device_id: &str,
    ) -> Result<SavedDeviceConfig, SchemeServiceError> {
        self.catalog.device(scheme_id, device_id)?;
        let res = self
            .store
            .device_config(scheme_id, device_id)
            .map_err(SchemeServiceError::from)
            .and_then(|saved| {
                saved.ok_or_else(|| SchemeServiceError::ConfigNotFound {
                    scheme: scheme_id.to_string(),
                    device: device_id.to_string(),
                })
            });
        if let Err(err) = &res {
            if err.is_fatal() {
                error!(scheme = scheme_id, device = device_id, error = %err, "device config read failed");
            }
        }
        res
    }

    /// Save addressing for a device drawn on the scheme. A blank DNS is stored
    /// as the default server.
    pub fn set_device_ips(
        &self,
        scheme_id: &str,
        device_id: &str,
        ips: DeviceIps,
    ) -> Result<SavedDeviceConfig, SchemeServiceError> {
        let span = tracing::info_span!(
            "set_device_ips",
            scheme = %scheme_id,
            device = %device_id
        );
        let _guard = span.enter();
        self.catalog.device(scheme_id, device_id)?;
        match self.store.save_device_config(scheme_id, device_id, ips) {
            Ok(saved) => {
                debug!(ip = %saved.ips.ip_address, "device config saved");
                Ok(saved)
            }
            Err(err) => {
                error!(error = %err, "device config write failed");
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySessionStore;

    fn service() -> SchemeService {
        SchemeService::new(
            Arc::new(SchemeCatalog::reference()),
            Arc::new(MemorySessionStore::new()),
        )
    }

    fn ips(dns: &str) -> DeviceIps {
        DeviceIps {
            ip_address: "192.168.10.2".into(),
            subnet_mask: "255.255.255.0".into(),
            gateway: "192.168.10.1".into(),
            dns: dns.into(),
        }
    }

    #[test]
    fn lists_schemes_and_areas() {
        let svc = service();
        assert_eq!(svc.list_schemes(), vec!["scheme1".to_string()]);
        let areas = svc.areas("scheme1").unwrap();
        assert_eq!(areas.len(), 6);
        assert_eq!(areas[0].device_id, "ac1");
        assert!(matches!(
            svc.areas("nope").unwrap_err(),
            SchemeServiceError::Catalog(SchemeError::UnknownScheme(_))
        ));
    }

    #[test]
    fn saved_config_reads_back_with_default_dns() {
        let svc = service();
        let saved = svc.set_device_ips("scheme1", "pc1", ips("  ")).unwrap();
        assert_eq!(saved.scheme_id, "scheme1");
        assert_eq!(saved.device_id, "pc1");
        assert_eq!(saved.ips.dns, "8.8.8.8");
        assert_eq!(svc.device_ips("scheme1", "pc1").unwrap(), saved);
    }

    #[test]
    fn unknown_device_is_refused_and_unsaved_device_is_missing() {
        let svc = service();
        let err = svc.set_device_ips("scheme1", "pc9", ips("8.8.4.4")).unwrap_err();
        assert!(matches!(
            err,
            SchemeServiceError::Catalog(SchemeError::UnknownDevice { ref device, .. }) if device == "pc9"
        ));
        assert!(!err.is_fatal());
        assert!(matches!(
            svc.device_ips("scheme1", "pc2").unwrap_err(),
            SchemeServiceError::ConfigNotFound { .. }
        ));
        assert!(matches!(
            svc.device_ips("scheme2", "pc2").unwrap_err(),
            SchemeServiceError::Catalog(SchemeError::UnknownScheme(_))
        ));
    }
}
