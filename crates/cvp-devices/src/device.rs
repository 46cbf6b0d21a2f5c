use serde::{Deserialize, Serialize};

/// Sentinel for descriptive fields that could not be retrieved.
pub const UNAVAILABLE: &str = "N/A";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    Connected,
    Unauthorized,
    Offline,
}

impl DeviceStatus {
    /// Maps a raw adb state token. Anything unrecognized counts as Offline.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "device" => DeviceStatus::Connected,
            "unauthorized" => DeviceStatus::Unauthorized,
            _ => DeviceStatus::Offline,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Connected => "Connected",
            DeviceStatus::Unauthorized => "Unauthorized",
            DeviceStatus::Offline => "Offline",
        }
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovered device. Built fresh on every scan, never mutated after.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub status: DeviceStatus,
    pub version: String,
    pub is_supported: bool,
    pub model: String,
    pub ap_version: String,
    pub cp_version: String,
    pub csc_version: String,
    pub fingerprint: String,
    pub base_os: String,
    pub security_patch: String,
}

impl Device {
    /// Record for a device whose properties cannot or must not be queried.
    /// Keeps the parsed status; every descriptive field is the sentinel.
    pub fn without_properties(id: String, status: DeviceStatus, model_hint: Option<String>) -> Self {
        Device {
            id,
            status,
            version: UNAVAILABLE.to_string(),
            is_supported: false,
            model: model_hint.unwrap_or_else(|| UNAVAILABLE.to_string()),
            ap_version: UNAVAILABLE.to_string(),
            cp_version: UNAVAILABLE.to_string(),
            csc_version: UNAVAILABLE.to_string(),
            fingerprint: UNAVAILABLE.to_string(),
            base_os: UNAVAILABLE.to_string(),
            security_patch: UNAVAILABLE.to_string(),
        }
    }
}

/// Text before the first `.` of a release string ("15.0.1" -> "15").
/// Sentinels pass through unchanged.
pub fn major_version(release: &str) -> &str {
    release.split('.').next().unwrap_or(release).trim()
}
