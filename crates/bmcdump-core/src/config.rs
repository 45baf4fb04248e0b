//! Per-manager configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{DumpError, DumpResult};
use crate::filename::{DumpFilenameParser, TimestampFormat, BMC_DUMP_FILENAME_REGEX};
use crate::types::{DumpKind, StorageClass};

/// Storage limits of a dump root, in KB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaPolicy {
    /// Largest budget handed to a single dump.
    pub max_kb: u64,
    /// Smallest budget worth starting a dump with.
    pub min_kb: u64,
    /// Total space reserved for the dump root.
    pub allocated_kb: u64,
    /// Delete the oldest dumps instead of failing when space runs short.
    pub rotate: bool,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            max_kb: 200,
            min_kb: 20,
            allocated_kb: 1024,
            rotate: false,
        }
    }
}

/// External packaging tool of a local manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagerConfig {
    /// Tool executable.
    pub tool: PathBuf,
    /// Fixed `-t` value. BMC dumps derive the tag from the collection type when unset.
    #[serde(default)]
    pub type_tag: Option<String>,
    /// `-n` value.
    #[serde(default)]
    pub name_prefix: Option<String>,
    /// Where the host leaves raw data for notify-driven packaging; passed as `-p`.
    #[serde(default)]
    pub input_dir: Option<PathBuf>,
}

/// One dump manager: the kinds it serves and where they live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Unique manager name; also names its persistence subdirectory.
    pub name: String,
    /// Kinds served. All must share one storage class.
    pub kinds: Vec<DumpKind>,
    /// Dump root for local kinds.
    #[serde(default)]
    pub dump_dir: Option<PathBuf>,
    /// Artifact file name pattern.
    #[serde(default = "default_filename_regex")]
    pub filename_regex: String,
    /// Capture group holding the id.
    #[serde(default = "default_id_group")]
    pub id_group: usize,
    /// Capture group holding the timestamp.
    #[serde(default = "default_timestamp_group")]
    pub timestamp_group: usize,
    /// Timestamp encoding.
    #[serde(default)]
    pub timestamp_format: TimestampFormat,
    /// Packaging tool for local kinds.
    #[serde(default)]
    pub packager: Option<PackagerConfig>,
    /// Storage limits.
    #[serde(default)]
    pub quota: QuotaPolicy,
}

fn default_filename_regex() -> String {
    BMC_DUMP_FILENAME_REGEX.to_string()
}

fn default_id_group() -> usize {
    1
}

fn default_timestamp_group() -> usize {
    2
}

impl ManagerConfig {
    /// The BMC dump manager.
    pub fn bmc_default() -> Self {
        Self {
            name: "bmc".to_string(),
            kinds: vec![DumpKind::Bmc],
            dump_dir: Some(PathBuf::from("/var/lib/phosphor-debug-collector/dumps")),
            filename_regex: default_filename_regex(),
            id_group: 1,
            timestamp_group: 2,
            timestamp_format: TimestampFormat::EpochSeconds,
            packager: Some(PackagerConfig {
                tool: PathBuf::from("/usr/bin/dreport"),
                type_tag: None,
                name_prefix: None,
                input_dir: None,
            }),
            quota: QuotaPolicy::default(),
        }
    }

    /// The host-stored system and resource dump manager.
    pub fn host_default() -> Self {
        Self {
            name: "host".to_string(),
            kinds: vec![DumpKind::System, DumpKind::Resource],
            dump_dir: None,
            filename_regex: default_filename_regex(),
            id_group: 1,
            timestamp_group: 2,
            timestamp_format: TimestampFormat::EpochSeconds,
            packager: None,
            quota: QuotaPolicy::default(),
        }
    }

    /// A locally stored host-firmware dump manager collected by `opdreport`.
    pub fn firmware_default(kind: DumpKind, prefix: &str) -> Self {
        let name = kind.as_str().to_string();
        Self {
            dump_dir: Some(PathBuf::from(format!(
                "/var/lib/phosphor-debug-collector/{name}dump"
            ))),
            filename_regex: format!(r"{prefix}_([0-9]+)_([0-9]+)\.([a-zA-Z0-9]+)"),
            packager: Some(PackagerConfig {
                tool: PathBuf::from("/usr/bin/opdreport"),
                type_tag: Some(name.clone()),
                name_prefix: Some(prefix.to_string()),
                input_dir: Some(PathBuf::from(format!(
                    "/var/lib/phosphor-debug-collector/{name}dump-input"
                ))),
            }),
            kinds: vec![kind],
            quota: QuotaPolicy {
                max_kb: 1024,
                min_kb: 20,
                allocated_kb: 4096,
                rotate: true,
            },
            name,
            ..Self::host_default()
        }
    }

    /// Storage class shared by every served kind.
    pub fn storage_class(&self) -> DumpResult<StorageClass> {
        let first = self.kinds.first().ok_or_else(|| DumpError::Config {
            reason: format!("manager {} serves no dump kinds", self.name),
        })?;
        let class = first.capabilities().storage;
        if self.kinds.iter().any(|k| k.capabilities().storage != class) {
            return Err(DumpError::Config {
                reason: format!("manager {} mixes local and host dump kinds", self.name),
            });
        }
        Ok(class)
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> DumpResult<()> {
        if self.name.is_empty() {
            return Err(DumpError::Config {
                reason: "manager name is empty".to_string(),
            });
        }
        if self.storage_class()? == StorageClass::Local {
            if self.dump_dir.is_none() {
                return Err(DumpError::Config {
                    reason: format!("local manager {} has no dump_dir", self.name),
                });
            }
            if self.kinds.len() != 1 {
                return Err(DumpError::Config {
                    reason: format!("local manager {} must serve exactly one kind", self.name),
                });
            }
            self.filename_parser()?;
        }
        if self.quota.min_kb > self.quota.allocated_kb {
            return Err(DumpError::Config {
                reason: format!(
                    "manager {}: min_kb {} exceeds allocated_kb {}",
                    self.name, self.quota.min_kb, self.quota.allocated_kb
                ),
            });
        }
        Ok(())
    }

    /// Compiles the file name pattern.
    pub fn filename_parser(&self) -> DumpResult<DumpFilenameParser> {
        DumpFilenameParser::new(
            &self.filename_regex,
            self.id_group,
            self.timestamp_group,
            self.timestamp_format,
        )
    }
}
