//! Daemon configuration.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bmcdump_core::{DumpKind, HostState, ManagerConfig};
use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, DaemonResult};

/// Default location of the control socket.
pub const DEFAULT_CONTROL_SOCKET: &str = "/run/bmcdump/control.sock";

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/bmcdump/bmcdumpd.toml";

/// Top-level configuration of `bmcdumpd`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Dump managers to run, one per storage root or host dump family.
    pub managers: Vec<ManagerConfig>,
    /// Directory holding host-dump records, one subdirectory per manager.
    pub persist_dir: PathBuf,
    /// Unix socket the control surface listens on.
    pub control_socket: PathBuf,
    /// Directory where the system writes core files, if core dumps should be collected.
    pub core_watch_dir: Option<PathBuf>,
    /// Pstore directory; ramoops found there at start are collected.
    pub ramoops_dir: Option<PathBuf>,
    /// Kill helpers running longer than this.
    pub helper_timeout_secs: Option<u64>,
    /// Offload helper executable.
    pub offload_handler: PathBuf,
    /// Host state assumed until told otherwise.
    pub initial_host_state: HostState,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            managers: vec![
                ManagerConfig::bmc_default(),
                ManagerConfig::host_default(),
                ManagerConfig::firmware_default(DumpKind::Hostboot, "hbdump"),
                ManagerConfig::firmware_default(DumpKind::Hardware, "hwdump"),
                ManagerConfig::firmware_default(DumpKind::Sbe, "sbedump"),
            ],
            persist_dir: PathBuf::from("/var/lib/phosphor-debug-collector/persist"),
            control_socket: PathBuf::from(DEFAULT_CONTROL_SOCKET),
            core_watch_dir: Some(PathBuf::from("/var/lib/systemd/coredump")),
            ramoops_dir: Some(PathBuf::from("/var/lib/systemd/pstore")),
            helper_timeout_secs: None,
            offload_handler: PathBuf::from("/usr/bin/bmcdump-offload"),
            initial_host_state: HostState::Unknown,
        }
    }
}

impl DaemonConfig {
    /// Loads configuration from a TOML or JSON file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => {
                let config: DaemonConfig = toml::from_str(&contents)?;
                Ok(config)
            }
            "json" => {
                let config: DaemonConfig = serde_json::from_str(&contents)?;
                Ok(config)
            }
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }

    /// Checks every manager and that no name or kind is claimed twice.
    pub fn validate(&self) -> DaemonResult<()> {
        if self.managers.is_empty() {
            return Err(DaemonError::Config {
                reason: "no dump managers configured".to_string(),
            });
        }
        let mut names = BTreeSet::new();
        let mut kinds = BTreeSet::new();
        for manager in &self.managers {
            manager.validate()?;
            if !names.insert(manager.name.as_str()) {
                return Err(DaemonError::Config {
                    reason: format!("duplicate manager name {}", manager.name),
                });
            }
            for kind in &manager.kinds {
                if !kinds.insert(*kind) {
                    return Err(DaemonError::Config {
                        reason: format!("dump kind {kind} served by more than one manager"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Helper timeout as a duration.
    pub fn helper_timeout(&self) -> Option<Duration> {
        self.helper_timeout_secs.map(Duration::from_secs)
    }
}
