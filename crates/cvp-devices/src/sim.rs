use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use async_trait::async_trait;
use tracing::debug;

use crate::endpoint::{
    CommandExecutor, DeviceEnumerator, EndpointError, ExecutionError, RawDeviceRecord,
};

const DEFAULT_LATENCY: Duration = Duration::from_millis(10);

/// Simulated endpoint: a fixed five-device bench with per-call latency and
/// injectable faults. Backs `--simulate` runs and the test suite.
pub struct SimEndpoint {
    devices: Vec<(RawDeviceRecord, HashMap<String, String>)>,
    latency: Duration,
    fail_enumeration: bool,
    failing_props: HashSet<String>,
    failing_commands: Vec<String>,
}

impl SimEndpoint {
    /// The standard test bench: three connected phones (two Samsung, one
    /// emulator), one unauthorized, one offline.
    pub fn bench() -> Self {
        let mut sim = Self::empty();
        sim.devices = vec![
            (
                record("emulator-5554", "device", Some("sdk_gphone64_x86_64")),
                props(&[
                    ("ro.build.version.release", "15"),
                    ("ro.product.model", "Pixel 8 Pro (Emulated)"),
                    (
                        "ro.build.fingerprint",
                        "google/sdk_gphone64_x86_64/generic_x86_64:15/UP1A.231005.007/1:userdebug/dev-keys",
                    ),
                    ("ro.build.version.base_os", "Android 15"),
                    ("ro.build.version.security_patch", "2024-05-01"),
                    ("ro.build.PDA", "UP1A.231005.007"),
                ]),
            ),
            (
                record("ABC123456789", "device", Some("SM-G965F")),
                props(&[
                    ("ro.build.version.release", "14"),
                    ("ro.product.model", "Galaxy S23"),
                    (
                        "ro.build.fingerprint",
                        "samsung/star2ltexx/star2lte:14/TP1A.220624.014/G965FXXU1CRB7:user/release-keys",
                    ),
                    ("ro.build.version.base_os", "Android 14"),
                    ("ro.build.version.security_patch", "2024-03-01"),
                    ("ro.build.PDA", "G965FXXU1CRB7"),
                    ("ril.sw_ver", "G965FXXU1CRB7"),
                    ("ril.official_cscver", "G965FOXM1CRB7"),
                ]),
            ),
            (
                record("DEF987654321", "device", Some("SM-S921B")),
                props(&[
                    ("ro.build.version.release", "13"),
                    ("ro.product.model", "Galaxy S24 Ultra"),
                    (
                        "ro.build.fingerprint",
                        "samsung/dm1qxxx/dm1q:13/TP1A.220624.014/S921BXXS1AXBG:user/release-keys",
                    ),
                    ("ro.build.version.base_os", "Android 13"),
                    ("ro.build.version.security_patch", "2024-04-01"),
                    ("ro.build.PDA", "S921BXXS1AXBG"),
                    ("ril.sw_ver", "S921BXXS1AXBG"),
                    ("ril.official_cscver", "S921BDBT1AXBG"),
                ]),
            ),
            (record("GHI112233445", "unauthorized", None), HashMap::new()),
            (record("JKL556677889", "offline", None), HashMap::new()),
        ];
        sim
    }

    pub fn empty() -> Self {
        SimEndpoint {
            devices: Vec::new(),
            latency: DEFAULT_LATENCY,
            fail_enumeration: false,
            failing_props: HashSet::new(),
            failing_commands: Vec::new(),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Appends a device with no queryable properties.
    pub fn with_raw_device(mut self, id: &str, state: &str, model_hint: Option<&str>) -> Self {
        self.devices.push((record(id, state, model_hint), HashMap::new()));
        self
    }

    pub fn fail_enumeration(mut self) -> Self {
        self.fail_enumeration = true;
        self
    }

    pub fn fail_properties_for(mut self, id: &str) -> Self {
        self.failing_props.insert(id.to_string());
        self
    }

    /// Any executed command containing `needle` fails. Scoped commands carry
    /// the device serial, so a serial makes a per-device fault.
    pub fn fail_commands_matching(mut self, needle: &str) -> Self {
        self.failing_commands.push(needle.to_string());
        self
    }
}

fn record(id: &str, state: &str, model_hint: Option<&str>) -> RawDeviceRecord {
    RawDeviceRecord {
        id: id.to_string(),
        state: state.to_string(),
        model_hint: model_hint.map(str::to_string),
    }
}

fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[async_trait]
impl DeviceEnumerator for SimEndpoint {
    async fn enumerate_devices(&self) -> Result<Vec<RawDeviceRecord>, EndpointError> {
        tokio::time::sleep(self.latency).await;
        if self.fail_enumeration {
            return Err(EndpointError::Other("simulated enumeration failure".into()));
        }
        Ok(self.devices.iter().map(|(record, _)| record.clone()).collect())
    }

    async fn query_device_properties(
        &self,
        id: &str,
    ) -> Result<HashMap<String, String>, EndpointError> {
        tokio::time::sleep(self.latency).await;
        if self.failing_props.contains(id) {
            return Err(EndpointError::Other(format!(
                "simulated property failure for {id}"
            )));
        }
        let props = self
            .devices
            .iter()
            .find(|(record, _)| record.id == id)
            .map(|(_, props)| props.clone())
            .unwrap_or_default();
        Ok(props)
    }
}

#[async_trait]
impl CommandExecutor for SimEndpoint {
    async fn execute(&self, command: &str) -> Result<(), ExecutionError> {
        debug!("simulated execution: {command}");
        tokio::time::sleep(self.latency).await;
        for needle in &self.failing_commands {
            if command.contains(needle.as_str()) {
                return Err(ExecutionError(format!(
                    "simulated command failure ({needle})"
                )));
            }
        }
        Ok(())
    }
}
