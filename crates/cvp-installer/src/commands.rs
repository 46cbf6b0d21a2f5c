use crate::error::UnsupportedVersionError;
use crate::policy::VersionPolicy;

/// The ordered install sequence for one version: the two CTS packages, a
/// forced reinstall of the empty device owner, the device-owner assignment,
/// and the two app-ops grants. Device-agnostic; scoping happens later.
pub fn commands_for(
    policy: &VersionPolicy,
    version_id: &str,
) -> Result<Vec<String>, UnsupportedVersionError> {
    let version = policy.get(version_id).ok_or_else(|| UnsupportedVersionError {
        version: version_id.to_string(),
    })?;
    let path = policy.install_path(version);

    Ok(vec![
        format!("adb install {path}\\CtsVerifier.apk"),
        format!("adb install {path}\\CtsPermissionApp.apk"),
        format!("adb install -r -t {path}\\CtsEmptyDeviceOwner.apk"),
        "adb shell dpm set-device-owner --user 0 com.android.cts.emptydeviceowner/.EmptyDeviceAdmin"
            .to_string(),
        "adb shell appops set com.android.cts.verifier android:read_device_identifiers allow"
            .to_string(),
        "adb shell appops set com.android.cts.verifier MANAGE_EXTERNAL_STORAGE 0".to_string(),
    ])
}

/// Rewrites a generic `adb ...` command to target one device. Commands not
/// starting with the adb token pass through unchanged.
pub fn scope_to_device(command: &str, device_id: &str) -> String {
    match command.strip_prefix("adb ") {
        Some(rest) => format!("adb -s {device_id} {rest}"),
        None => command.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_matches_the_template_order() {
        let policy = VersionPolicy::builtin();
        let commands = commands_for(&policy, "15").unwrap();
        assert_eq!(commands.len(), 6);
        assert_eq!(
            commands[0],
            "adb install C:\\android-cts-verifier\\15\\CtsVerifier.apk"
        );
        assert_eq!(
            commands[1],
            "adb install C:\\android-cts-verifier\\15\\CtsPermissionApp.apk"
        );
        assert_eq!(
            commands[2],
            "adb install -r -t C:\\android-cts-verifier\\15\\CtsEmptyDeviceOwner.apk"
        );
        assert!(commands[3].starts_with("adb shell dpm set-device-owner"));
        assert!(commands[4].starts_with("adb shell appops set"));
        assert!(commands[5].starts_with("adb shell appops set"));
    }

    #[test]
    fn sequence_is_deterministic_across_calls() {
        let policy = VersionPolicy::builtin();
        let first = commands_for(&policy, "13").unwrap();
        let second = commands_for(&policy, "13").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unsupported_version_is_an_error() {
        let policy = VersionPolicy::builtin();
        let err = commands_for(&policy, "999").unwrap_err();
        assert_eq!(err.version, "999");
        assert!(err.to_string().contains("999"));
    }

    #[test]
    fn scoping_rewrites_the_adb_token() {
        assert_eq!(
            scope_to_device("adb install x.apk", "ABC123456789"),
            "adb -s ABC123456789 install x.apk"
        );
        assert_eq!(
            scope_to_device("adb shell appops set pkg OP 0", "emulator-5554"),
            "adb -s emulator-5554 shell appops set pkg OP 0"
        );
        assert_eq!(scope_to_device("fastboot reboot", "X"), "fastboot reboot");
    }
}
