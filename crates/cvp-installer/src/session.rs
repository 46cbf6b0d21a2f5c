use std::sync::Arc;

use cvp_devices::{CommandExecutor, Device, DeviceDirectory, DeviceEnumerator, DiscoveryError};
use tokio::sync::watch;

use crate::error::InstallError;
use crate::log::{LogKind, LogStream};
use crate::orchestrator::{Orchestrator, RunHandle, RunState};
use crate::policy::VersionPolicy;
use crate::selection::{is_eligible, Selection};

/// One operator session: the current device list, the selection over it,
/// and the orchestrator. Ties together the invariants the components leave
/// to their caller: a rescan drops the selection and the log stream, and
/// selection toggles only land for eligible devices.
pub struct Session {
    directory: DeviceDirectory,
    orchestrator: Orchestrator,
    devices: Vec<Device>,
    selection: Selection,
}

impl Session {
    pub fn new(
        enumerator: Arc<dyn DeviceEnumerator>,
        executor: Arc<dyn CommandExecutor>,
        policy: Arc<VersionPolicy>,
    ) -> Self {
        let logs = Arc::new(LogStream::new());
        Session {
            directory: DeviceDirectory::new(enumerator, policy.supported_versions()),
            orchestrator: Orchestrator::new(executor, policy, logs),
            devices: Vec::new(),
            selection: Selection::default(),
        }
    }

    /// Rebuilds the device list. Prior selection and log output never
    /// survive a rescan; a failed scan leaves the list empty and reports
    /// the failure as an error log entry as well as a Result.
    pub async fn scan(&mut self) -> Result<&[Device], DiscoveryError> {
        self.selection.clear();
        self.orchestrator.logs().clear();
        self.devices.clear();

        match self.directory.discover().await {
            Ok(devices) => {
                self.devices = devices;
                Ok(&self.devices)
            }
            Err(err) => {
                self.orchestrator.logs().push(
                    LogKind::Error,
                    format!("Failed to scan for devices: {err}"),
                    None,
                );
                Err(err)
            }
        }
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Selects or deselects one device. Ineligible ids are ignored.
    pub fn toggle(&mut self, device_id: &str, selected: bool) {
        if selected {
            let eligible = self
                .devices
                .iter()
                .any(|device| device.id == device_id && is_eligible(device));
            if !eligible {
                return;
            }
        }
        self.selection.toggle(device_id, selected);
    }

    pub fn select_all(&mut self) {
        self.selection.select_all(&self.devices);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn start(&self) -> Result<RunHandle, InstallError> {
        self.orchestrator.start(self.selection.resolve(&self.devices))
    }

    pub fn cancel(&self) {
        self.orchestrator.cancel();
    }

    pub fn logs(&self) -> Arc<LogStream> {
        self.orchestrator.logs()
    }

    pub fn run_state(&self) -> watch::Receiver<RunState> {
        self.orchestrator.run_state()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }
}
