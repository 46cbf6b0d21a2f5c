use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unsupported version for command generation: {version}")]
pub struct UnsupportedVersionError {
    pub version: String,
}

/// Rejections from `Orchestrator::start`. Neither variant changes any state
/// or writes a log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum InstallError {
    #[error("no devices selected")]
    NothingSelected,
    #[error("an installation run is already active")]
    Busy,
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read policy file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse policy file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("policy file {path} lists no versions")]
    Empty { path: PathBuf },
}
