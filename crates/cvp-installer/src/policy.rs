use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

const DEFAULT_INSTALL_ROOT: &str = "C:\\android-cts-verifier";

/// One supported OS major version and where its CTS Verifier packages live
/// relative to the install root.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AndroidVersion {
    pub id: String,
    pub label: String,
    pub install_dir: String,
}

#[derive(Serialize, Deserialize)]
#[serde(default)]
struct PolicyFile {
    install_root: String,
    versions: Vec<AndroidVersion>,
}

impl Default for PolicyFile {
    fn default() -> Self {
        PolicyFile {
            install_root: DEFAULT_INSTALL_ROOT.to_string(),
            versions: Vec::new(),
        }
    }
}

/// Static version-support table. Loaded once at startup, never mutated.
/// New OS versions are a config-file change, not a code change.
#[derive(Clone, Debug)]
pub struct VersionPolicy {
    install_root: String,
    versions: BTreeMap<String, AndroidVersion>,
}

impl VersionPolicy {
    /// The table shipped with the tool: Android 15, 14 and 13.
    pub fn builtin() -> Self {
        let versions = ["15", "14", "13"].map(|id| AndroidVersion {
            id: id.to_string(),
            label: format!("Android {id}"),
            install_dir: id.to_string(),
        });
        Self::from_entries(DEFAULT_INSTALL_ROOT.to_string(), versions)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, PolicyError> {
        let data = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: PolicyFile =
            serde_json::from_str(&data).map_err(|source| PolicyError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if file.versions.is_empty() {
            return Err(PolicyError::Empty {
                path: path.to_path_buf(),
            });
        }
        Ok(Self::from_entries(file.install_root, file.versions))
    }

    fn from_entries(
        install_root: String,
        entries: impl IntoIterator<Item = AndroidVersion>,
    ) -> Self {
        VersionPolicy {
            install_root,
            versions: entries
                .into_iter()
                .map(|version| (version.id.clone(), version))
                .collect(),
        }
    }

    pub fn get(&self, version_id: &str) -> Option<&AndroidVersion> {
        self.versions.get(version_id)
    }

    pub fn is_supported(&self, version_id: &str) -> bool {
        self.versions.contains_key(version_id)
    }

    pub fn supported_versions(&self) -> Vec<String> {
        self.versions.keys().cloned().collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &AndroidVersion> {
        self.versions.values()
    }

    pub fn install_path(&self, version: &AndroidVersion) -> String {
        format!("{}\\{}", self.install_root, version.install_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_covers_the_three_supported_versions() {
        let policy = VersionPolicy::builtin();
        assert_eq!(policy.supported_versions(), vec!["13", "14", "15"]);
        assert!(policy.is_supported("15"));
        assert!(!policy.is_supported("999"));
        assert_eq!(policy.get("14").unwrap().label, "Android 14");
    }

    #[test]
    fn install_path_joins_root_and_dir() {
        let policy = VersionPolicy::builtin();
        let version = policy.get("15").unwrap();
        assert_eq!(policy.install_path(version), "C:\\android-cts-verifier\\15");
    }

    #[test]
    fn loads_policy_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(
            &path,
            r#"{
                "install_root": "D:\\cts",
                "versions": [
                    {"id": "16", "label": "Android 16", "install_dir": "16-beta"}
                ]
            }"#,
        )
        .unwrap();

        let policy = VersionPolicy::from_json_file(&path).unwrap();
        assert!(policy.is_supported("16"));
        assert!(!policy.is_supported("15"));
        let version = policy.get("16").unwrap();
        assert_eq!(policy.install_path(version), "D:\\cts\\16-beta");
    }

    #[test]
    fn rejects_empty_policy_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, r#"{"versions": []}"#).unwrap();
        assert!(matches!(
            VersionPolicy::from_json_file(&path),
            Err(PolicyError::Empty { .. })
        ));
    }
}
