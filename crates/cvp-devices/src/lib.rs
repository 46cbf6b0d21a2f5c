mod adb;
mod device;
mod directory;
mod endpoint;
mod sim;

pub use adb::AdbEndpoint;
pub use device::{major_version, Device, DeviceStatus, UNAVAILABLE};
pub use directory::{DeviceDirectory, DiscoveryError};
pub use endpoint::{
    CommandExecutor, DeviceEnumerator, EndpointError, ExecutionError, RawDeviceRecord,
};
pub use sim::SimEndpoint;
