use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// One line of `adb devices -l` before any interpretation: the serial, the
/// raw state token as adb printed it, and the `model:` column when present.
#[derive(Clone, Debug)]
pub struct RawDeviceRecord {
    pub id: String,
    pub state: String,
    pub model_hint: Option<String>,
}

#[derive(Clone, Debug, Error)]
pub enum EndpointError {
    #[error("adb not found (set CVP_ADB_PATH or ANDROID_SDK_ROOT)")]
    BinaryNotFound,
    #[error("{0}")]
    Io(String),
    #[error("command exited with status {status}: {detail}")]
    Exit { status: i32, detail: String },
    #[error("{0}")]
    Other(String),
}

#[derive(Clone, Debug, Error)]
#[error("{0}")]
pub struct ExecutionError(pub String);

impl From<EndpointError> for ExecutionError {
    fn from(err: EndpointError) -> Self {
        ExecutionError(err.to_string())
    }
}

/// Device enumeration collaborator. Zero attached devices is an empty list,
/// not an error; unrecognized state tokens are passed through untouched.
#[async_trait]
pub trait DeviceEnumerator: Send + Sync {
    async fn enumerate_devices(&self) -> Result<Vec<RawDeviceRecord>, EndpointError>;

    /// Property map for one connected device. May be partial or empty.
    /// Callers must not ask for properties of non-connected devices.
    async fn query_device_properties(
        &self,
        id: &str,
    ) -> Result<HashMap<String, String>, EndpointError>;
}

/// Installation-step collaborator. Commands arrive already scoped to a
/// device (`adb -s <serial> ...`).
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &str) -> Result<(), ExecutionError>;
}
