use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use thiserror::Error;
use tracing::warn;

use crate::device::{major_version, Device, DeviceStatus, UNAVAILABLE};
use crate::endpoint::{DeviceEnumerator, EndpointError, RawDeviceRecord};

const PROP_RELEASE: &str = "ro.build.version.release";
const PROP_MODEL: &str = "ro.product.model";
const PROP_AP_VERSION: &str = "ro.build.PDA";
const PROP_CP_VERSION: &str = "ril.sw_ver";
const PROP_CSC_VERSION: &str = "ril.official_cscver";
const PROP_FINGERPRINT: &str = "ro.build.fingerprint";
const PROP_BASE_OS: &str = "ro.build.version.base_os";
const PROP_SECURITY_PATCH: &str = "ro.build.version.security_patch";

#[derive(Debug, Error)]
#[error("device enumeration failed: {0}")]
pub struct DiscoveryError(#[from] pub EndpointError);

/// Turns raw enumeration output into Device records. Each scan is a full
/// rebuild; nothing is merged with prior state.
pub struct DeviceDirectory {
    endpoint: Arc<dyn DeviceEnumerator>,
    supported_versions: BTreeSet<String>,
}

impl DeviceDirectory {
    pub fn new(
        endpoint: Arc<dyn DeviceEnumerator>,
        supported_versions: impl IntoIterator<Item = String>,
    ) -> Self {
        DeviceDirectory {
            endpoint,
            supported_versions: supported_versions.into_iter().collect(),
        }
    }

    pub async fn discover(&self) -> Result<Vec<Device>, DiscoveryError> {
        let records = self.endpoint.enumerate_devices().await?;
        let mut devices = Vec::with_capacity(records.len());
        for record in records {
            devices.push(self.resolve(record).await);
        }
        Ok(devices)
    }

    async fn resolve(&self, record: RawDeviceRecord) -> Device {
        let status = DeviceStatus::parse(&record.state);
        if status != DeviceStatus::Connected {
            return Device::without_properties(record.id, status, record.model_hint);
        }

        // A failed property query must not sink the scan; the device keeps
        // its parsed status and falls back to sentinel fields.
        let props = match self.endpoint.query_device_properties(&record.id).await {
            Ok(props) => props,
            Err(err) => {
                warn!(device = %record.id, "property query failed: {err}");
                HashMap::new()
            }
        };

        let release = prop(&props, PROP_RELEASE);
        let version = major_version(&release).to_string();
        let is_supported = self.supported_versions.contains(&version);
        let model = props
            .get(PROP_MODEL)
            .cloned()
            .or(record.model_hint)
            .unwrap_or_else(|| UNAVAILABLE.to_string());

        Device {
            id: record.id,
            status,
            version,
            is_supported,
            model,
            ap_version: prop(&props, PROP_AP_VERSION),
            cp_version: prop(&props, PROP_CP_VERSION),
            csc_version: prop(&props, PROP_CSC_VERSION),
            fingerprint: prop(&props, PROP_FINGERPRINT),
            base_os: prop(&props, PROP_BASE_OS),
            security_patch: prop(&props, PROP_SECURITY_PATCH),
        }
    }
}

fn prop(props: &HashMap<String, String>, key: &str) -> String {
    props
        .get(key)
        .cloned()
        .unwrap_or_else(|| UNAVAILABLE.to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::sim::SimEndpoint;

    fn supported() -> Vec<String> {
        vec!["15".to_string(), "14".to_string(), "13".to_string()]
    }

    fn directory(endpoint: SimEndpoint) -> DeviceDirectory {
        DeviceDirectory::new(Arc::new(endpoint.with_latency(Duration::from_millis(1))), supported())
    }

    #[tokio::test]
    async fn discovers_the_bench() {
        let devices = directory(SimEndpoint::bench()).discover().await.unwrap();
        assert_eq!(devices.len(), 5);

        let emulator = &devices[0];
        assert_eq!(emulator.id, "emulator-5554");
        assert_eq!(emulator.status, DeviceStatus::Connected);
        assert_eq!(emulator.version, "15");
        assert!(emulator.is_supported);
        assert_eq!(emulator.model, "Pixel 8 Pro (Emulated)");
        // Samsung-only properties are absent on the emulator.
        assert_eq!(emulator.cp_version, UNAVAILABLE);

        let unauthorized = &devices[3];
        assert_eq!(unauthorized.status, DeviceStatus::Unauthorized);
        assert!(!unauthorized.is_supported);
        assert_eq!(unauthorized.version, UNAVAILABLE);

        let offline = &devices[4];
        assert_eq!(offline.status, DeviceStatus::Offline);
        assert!(!offline.is_supported);
    }

    #[tokio::test]
    async fn unknown_state_tokens_become_offline_and_never_supported() {
        let endpoint = SimEndpoint::empty().with_raw_device("XYZ", "recovery", Some("SM-X"));
        let devices = directory(endpoint).discover().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].status, DeviceStatus::Offline);
        assert!(!devices[0].is_supported);
        assert_eq!(devices[0].model, "SM-X");
    }

    #[tokio::test]
    async fn property_failure_is_isolated_to_one_device() {
        let endpoint = SimEndpoint::bench().fail_properties_for("ABC123456789");
        let devices = directory(endpoint).discover().await.unwrap();

        let degraded = devices.iter().find(|d| d.id == "ABC123456789").unwrap();
        assert_eq!(degraded.status, DeviceStatus::Connected);
        assert_eq!(degraded.version, UNAVAILABLE);
        assert!(!degraded.is_supported);
        // The enumeration model hint survives the failed query.
        assert_eq!(degraded.model, "SM-G965F");

        let healthy = devices.iter().find(|d| d.id == "emulator-5554").unwrap();
        assert!(healthy.is_supported);
        assert_eq!(healthy.version, "15");
    }

    #[tokio::test]
    async fn enumeration_failure_fails_the_scan() {
        let err = directory(SimEndpoint::bench().fail_enumeration())
            .discover()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("enumeration failed"));
    }

    #[tokio::test]
    async fn zero_devices_is_an_empty_scan() {
        let devices = directory(SimEndpoint::empty()).discover().await.unwrap();
        assert!(devices.is_empty());
    }
}
