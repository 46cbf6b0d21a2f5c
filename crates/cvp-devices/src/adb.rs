use std::{collections::HashMap, io, path::PathBuf, process::Output, time::Duration};

use async_trait::async_trait;
use tokio::process::Command;

use crate::endpoint::{
    CommandExecutor, DeviceEnumerator, EndpointError, ExecutionError, RawDeviceRecord,
};

const GETPROP_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn adb_path() -> PathBuf {
    if let Ok(path) = std::env::var("CVP_ADB_PATH") {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("ADB_PATH") {
        return PathBuf::from(path);
    }
    if let Ok(sdk_root) =
        std::env::var("ANDROID_SDK_ROOT").or_else(|_| std::env::var("ANDROID_HOME"))
    {
        let candidate = PathBuf::from(&sdk_root).join("platform-tools").join("adb");
        if candidate.exists() {
            return candidate;
        }
        let candidate = PathBuf::from(&sdk_root)
            .join("platform-tools")
            .join("adb.exe");
        if candidate.exists() {
            return candidate;
        }
    }
    PathBuf::from("adb")
}

fn format_output(stdout: &str, stderr: &str) -> String {
    let stdout = stdout.trim();
    let stderr = stderr.trim();
    let mut out = String::new();

    if !stdout.is_empty() {
        out.push_str("stdout:\n");
        out.push_str(stdout);
        out.push('\n');
    }
    if !stderr.is_empty() {
        out.push_str("stderr:\n");
        out.push_str(stderr);
        out.push('\n');
    }

    out
}

/// Raw view of `adb devices -l`: header and blank lines skipped, the state
/// token kept verbatim, the `model:` column captured when present.
pub(crate) fn parse_devices_output(output: &str) -> Vec<RawDeviceRecord> {
    let mut records = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("List of devices attached") {
            continue;
        }

        let mut parts = line.split_whitespace();
        let id = match parts.next() {
            Some(s) => s,
            None => continue,
        };
        let state = match parts.next() {
            Some(s) => s,
            None => continue,
        };

        let model_hint = parts
            .find_map(|part| part.strip_prefix("model:"))
            .map(|value| value.to_string());

        records.push(RawDeviceRecord {
            id: id.to_string(),
            state: state.to_string(),
            model_hint,
        });
    }

    records
}

/// Parses the `[key]: [value]` dump produced by a bare `getprop`.
/// Multi-line values are rare and not needed here; those lines are skipped.
pub(crate) fn parse_getprop_output(output: &str) -> HashMap<String, String> {
    let mut props = HashMap::new();

    for line in output.lines() {
        let line = line.trim();
        let Some((key_part, value_part)) = line.split_once("]: [") else {
            continue;
        };
        let Some(key) = key_part.strip_prefix('[') else {
            continue;
        };
        let Some(value) = value_part.strip_suffix(']') else {
            continue;
        };
        if !key.is_empty() && !value.is_empty() {
            props.insert(key.to_string(), value.to_string());
        }
    }

    props
}

/// Endpoint backed by a real adb binary invoked via `tokio::process`.
pub struct AdbEndpoint {
    binary: PathBuf,
}

impl AdbEndpoint {
    pub fn new() -> Self {
        AdbEndpoint { binary: adb_path() }
    }

    pub fn with_binary(binary: PathBuf) -> Self {
        AdbEndpoint { binary }
    }

    async fn output(&self, args: &[&str]) -> Result<Output, EndpointError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        let output = cmd.output().await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                EndpointError::BinaryNotFound
            } else {
                EndpointError::Io(e.to_string())
            }
        })?;

        if output.status.success() {
            Ok(output)
        } else {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = format_output(&stdout, &stderr);
            Err(EndpointError::Exit {
                status: output.status.code().unwrap_or(-1),
                detail: if detail.trim().is_empty() {
                    "(no output)".to_string()
                } else {
                    detail.trim().to_string()
                },
            })
        }
    }
}

impl Default for AdbEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceEnumerator for AdbEndpoint {
    async fn enumerate_devices(&self) -> Result<Vec<RawDeviceRecord>, EndpointError> {
        let output = self.output(&["devices", "-l"]).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_devices_output(&stdout))
    }

    async fn query_device_properties(
        &self,
        id: &str,
    ) -> Result<HashMap<String, String>, EndpointError> {
        let args = ["-s", id, "shell", "getprop"];
        let query = self.output(&args);
        let output = tokio::time::timeout(GETPROP_TIMEOUT, query)
            .await
            .map_err(|_| EndpointError::Other(format!("getprop timed out for {id}")))??;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_getprop_output(&stdout))
    }
}

#[async_trait]
impl CommandExecutor for AdbEndpoint {
    async fn execute(&self, command: &str) -> Result<(), ExecutionError> {
        let mut words = command.split_whitespace();
        // The sequencer emits shell-level text starting with the adb token;
        // the configured binary replaces it.
        let args: Vec<&str> = match words.next() {
            Some("adb") => words.collect(),
            Some(first) => std::iter::once(first).chain(words).collect(),
            None => return Err(ExecutionError("empty command".to_string())),
        };
        if args.is_empty() {
            return Err(ExecutionError("empty command".to_string()));
        }
        self.output(&args).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICES_FIXTURE: &str = "List of devices attached\n\
        emulator-5554          device product:sdk_phone_x86_64 model:sdk_gphone64_x86_64 device:generic_x86_64 transport_id:1\n\
        ABC123456789           device product:star2lte model:SM-G965F device:star2ltexx transport_id:2\n\
        GHI112233445           unauthorized transport_id:4\n\
        JKL556677889           offline transport_id:5\n\
        MNO998877665           sideload transport_id:6\n\n";

    #[test]
    fn parses_devices_listing() {
        let records = parse_devices_output(DEVICES_FIXTURE);
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].id, "emulator-5554");
        assert_eq!(records[0].state, "device");
        assert_eq!(records[0].model_hint.as_deref(), Some("sdk_gphone64_x86_64"));
        assert_eq!(records[2].id, "GHI112233445");
        assert_eq!(records[2].state, "unauthorized");
        assert_eq!(records[2].model_hint, None);
        // Unknown state tokens pass through for the directory to interpret.
        assert_eq!(records[4].state, "sideload");
    }

    #[test]
    fn parses_empty_listing() {
        assert!(parse_devices_output("List of devices attached\n\n").is_empty());
    }

    #[test]
    fn parses_getprop_dump() {
        let dump = "[ro.build.version.release]: [15]\n\
            [ro.product.model]: [Pixel 8 Pro]\n\
            [ro.build.fingerprint]: [google/x/y:15/UP1A/1:userdebug/dev-keys]\n\
            not a property line\n\
            [empty.value]: []\n";
        let props = parse_getprop_output(dump);
        assert_eq!(props.get("ro.build.version.release").map(String::as_str), Some("15"));
        assert_eq!(props.get("ro.product.model").map(String::as_str), Some("Pixel 8 Pro"));
        assert!(!props.contains_key("empty.value"));
        assert_eq!(props.len(), 3);
    }
}
