use std::collections::BTreeSet;

use cvp_devices::{Device, DeviceStatus};

pub fn is_eligible(device: &Device) -> bool {
    device.is_supported && device.status == DeviceStatus::Connected
}

/// The operator's chosen subset of the current device list. Callers feed it
/// eligible ids only; it does not re-validate on toggle.
#[derive(Clone, Debug, Default)]
pub struct Selection {
    ids: BTreeSet<String>,
}

impl Selection {
    pub fn toggle(&mut self, device_id: &str, selected: bool) {
        if selected {
            self.ids.insert(device_id.to_string());
        } else {
            self.ids.remove(device_id);
        }
    }

    /// Replaces the set with exactly the eligible ids of `devices`.
    pub fn select_all(&mut self, devices: &[Device]) {
        self.ids = devices
            .iter()
            .filter(|device| is_eligible(device))
            .map(|device| device.id.clone())
            .collect();
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.ids.contains(device_id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The selected subset of `devices`, cloned for handing to a run.
    pub fn resolve(&self, devices: &[Device]) -> Vec<Device> {
        devices
            .iter()
            .filter(|device| self.ids.contains(&device.id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use cvp_devices::UNAVAILABLE;

    use super::*;

    fn device(id: &str, status: DeviceStatus, version: &str, supported: bool) -> Device {
        let mut device =
            Device::without_properties(id.to_string(), status, Some(format!("model-{id}")));
        device.version = version.to_string();
        device.is_supported = supported;
        device
    }

    fn bench() -> Vec<Device> {
        vec![
            device("emulator-5554", DeviceStatus::Connected, "15", true),
            device("ABC123456789", DeviceStatus::Connected, "14", true),
            device("OLD000000000", DeviceStatus::Connected, "9", false),
            device("GHI112233445", DeviceStatus::Unauthorized, UNAVAILABLE, false),
            device("JKL556677889", DeviceStatus::Offline, UNAVAILABLE, false),
        ]
    }

    #[test]
    fn select_all_keeps_exactly_the_eligible_devices() {
        let devices = bench();
        let mut selection = Selection::default();
        selection.select_all(&devices);
        assert_eq!(selection.ids(), vec!["ABC123456789", "emulator-5554"]);

        // Idempotent.
        selection.select_all(&devices);
        assert_eq!(selection.ids(), vec!["ABC123456789", "emulator-5554"]);
    }

    #[test]
    fn select_all_replaces_prior_choices() {
        let devices = bench();
        let mut selection = Selection::default();
        selection.toggle("stale-id", true);
        selection.select_all(&devices);
        assert!(!selection.contains("stale-id"));
        assert_eq!(selection.len(), 2);
    }

    #[test]
    fn toggle_adds_and_removes() {
        let mut selection = Selection::default();
        selection.toggle("emulator-5554", true);
        assert!(selection.contains("emulator-5554"));
        selection.toggle("emulator-5554", false);
        assert!(selection.is_empty());
        // Deselecting an unknown id is a no-op.
        selection.toggle("missing", false);
        assert!(selection.is_empty());
    }

    #[test]
    fn resolve_returns_selected_devices_only() {
        let devices = bench();
        let mut selection = Selection::default();
        selection.toggle("ABC123456789", true);
        let resolved = selection.resolve(&devices);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, "ABC123456789");
    }
}
