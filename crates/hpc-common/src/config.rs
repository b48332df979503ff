//! ---
//! hpc_section: "01-core-functionality"
//! hpc_subsection: "module"
//! hpc_type: "source"
//! hpc_scope: "code"
//! hpc_description: "Shared agent plumbing."
//! hpc_version: "v0.1.0"
//! hpc_owner: "tbd"
//! ---
//! Daemon configuration from flags and environment, plus the two
//! identity files on the gateway: the API token (rewritten on
//! rotation) and the read-only device serial.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use hpc_types::ControlType;

use crate::logging::LogFormat;

/// Command line of the controller daemon.
#[derive(Debug, Clone, Parser)]
#[command(name = "hpcd", version, about = "Cloud-synchronized heat-pump controller agent")]
pub struct AgentConfig {
    /// Cloud API base URL.
    #[arg(long, env = "HPC_SERVER", default_value = "https://cloud.hpc.example")]
    pub server: String,

    /// File the API token is loaded from and persisted back to after
    /// rotation.
    #[arg(long, env = "HPC_TOKEN_FILE", default_value = "/etc/hpc-token")]
    pub token_file: PathBuf,

    /// Device serial-number file.
    #[arg(
        long,
        env = "HPC_SERIAL_FILE",
        default_value = "/sys/firmware/devicetree/base/serial-number"
    )]
    pub serial_file: PathBuf,

    /// Run against a fixed controller type instead of asking the cloud
    /// which device is attached. Requires --address.
    #[arg(long, env = "HPC_CONTROLLER_TYPE")]
    pub controller_type: Option<ControlType>,

    /// Device address (host:port) for --controller-type.
    #[arg(long, env = "HPC_ADDRESS")]
    pub address: Option<String>,

    /// Log output format.
    #[arg(long, env = "HPC_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl AgentConfig {
    /// The fixed controller override, when both halves were given.
    pub fn controller_override(&self) -> Option<(ControlType, &str)> {
        match (self.controller_type, self.address.as_deref()) {
            (Some(control_type), Some(address)) => Some((control_type, address)),
            _ => None,
        }
    }
}

/// Read the persisted API token. Missing file and empty content both
/// mean "no token yet"; the agent then starts unauthenticated and
/// waits for provisioning.
pub fn load_token(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading token file {}", path.display()))?;
    let token = raw.trim();
    if token.is_empty() {
        return Ok(None);
    }
    Ok(Some(token.to_owned()))
}

pub fn persist_token(path: &Path, token: &str) -> Result<()> {
    fs::write(path, token).with_context(|| format!("persisting token to {}", path.display()))
}

/// Read the device serial. Device-tree files are NUL padded, so both
/// NUL bytes and whitespace are stripped; an empty result means the
/// gateway has no serial and the header is omitted.
pub fn load_serial(path: &Path) -> Result<Option<String>> {
    let raw =
        fs::read(path).with_context(|| format!("reading serial file {}", path.display()))?;
    let serial = String::from_utf8_lossy(&raw)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_owned();
    if serial.is_empty() {
        return Ok(None);
    }
    Ok(Some(serial))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn token_roundtrip() {
        let file = NamedTempFile::new().unwrap();
        assert_eq!(load_token(file.path()).unwrap(), None, "empty file");

        persist_token(file.path(), "mysecrettoken").unwrap();
        assert_eq!(
            load_token(file.path()).unwrap().as_deref(),
            Some("mysecrettoken")
        );
    }

    #[test]
    fn missing_token_file_is_not_an_error() {
        assert_eq!(load_token(Path::new("/nonexistent/hpc-token")).unwrap(), None);
    }

    #[test]
    fn token_whitespace_is_trimmed() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"mysecrettoken\n").unwrap();
        assert_eq!(
            load_token(file.path()).unwrap().as_deref(),
            Some("mysecrettoken")
        );
    }

    #[test]
    fn serial_strips_device_tree_padding() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"SER-0042\0\0\0").unwrap();
        assert_eq!(
            load_serial(file.path()).unwrap().as_deref(),
            Some("SER-0042")
        );
    }

    #[test]
    fn empty_serial_reads_as_none() {
        let file = NamedTempFile::new().unwrap();
        assert_eq!(load_serial(file.path()).unwrap(), None);
    }

    #[test]
    fn missing_serial_file_is_an_error() {
        assert!(load_serial(Path::new("/nonexistent/serial")).is_err());
    }

    #[test]
    fn controller_override_needs_both_flags() {
        let config = AgentConfig::parse_from(["hpcd", "--controller-type", "dummy"]);
        assert!(config.controller_override().is_none());

        let config = AgentConfig::parse_from([
            "hpcd",
            "--controller-type",
            "hogforsgst",
            "--address",
            "10.0.0.1:502",
        ]);
        let (control_type, address) = config.controller_override().unwrap();
        assert_eq!(control_type, ControlType::HogforsGst);
        assert_eq!(address, "10.0.0.1:502");
    }
}
