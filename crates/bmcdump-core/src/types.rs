//! Dump kinds, statuses and the per-kind capability table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DumpError;

/// Source id of an entry that has not been correlated with an external source yet.
pub const INVALID_SOURCE_ID: u32 = 0xFFFF_FFFF;

/// Prefix of the `OriginatorType` enumeration strings.
pub const ORIGINATOR_TYPE_PREFIX: &str = "xyz.openbmc_project.Common.OriginatedBy.OriginatorTypes.";

/// Closed set of dump categories handled by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DumpKind {
    /// Service-processor dump produced by the packaging tool.
    Bmc,
    /// Host system dump, stored on the host.
    System,
    /// Host resource dump, stored on the host.
    Resource,
    /// Hardware dump offloaded from the host into local storage.
    Hardware,
    /// Hostboot dump offloaded from the host into local storage.
    Hostboot,
    /// Self-boot-engine dump offloaded into local storage.
    Sbe,
}

/// Where a dump's artifact lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageClass {
    /// Under a local dump root, one directory per id.
    Local,
    /// On the host; only metadata is kept locally.
    Host,
}

/// How an offload request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffloadRoute {
    /// Launch the local offload helper on the artifact.
    LocalHelper,
    /// Ask the host transport to stream the dump.
    HostTransport,
}

/// How a delete request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteRoute {
    /// Remove the local artifact directory.
    LocalArtifact,
    /// Ask the host to delete, then drop the local record.
    HostThenRegistry,
}

/// Host state a kind needs before a dump may be requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostRequirement {
    /// No requirement.
    None,
    /// Host must be running.
    Running,
    /// Host must be running, quiesced, or on its way to off.
    RunningQuiescedOrPoweringOff,
}

impl HostRequirement {
    /// Whether `state` satisfies this requirement.
    pub fn permits(self, state: HostState) -> bool {
        match self {
            HostRequirement::None => true,
            HostRequirement::Running => state == HostState::Running,
            HostRequirement::RunningQuiescedOrPoweringOff => matches!(
                state,
                HostState::Running | HostState::Quiesced | HostState::TransitioningToOff
            ),
        }
    }
}

/// Static behavior table entry for a [`DumpKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Where the artifact lives.
    pub storage: StorageClass,
    /// Whether entries are matched to host notifications by source id.
    pub source_correlated: bool,
    /// Whether a host notification starts local packaging of the host's data.
    pub packaged_on_notify: bool,
    /// Offload route.
    pub offload: OffloadRoute,
    /// Delete route.
    pub delete: DeleteRoute,
    /// Host state required to create.
    pub host_requirement: HostRequirement,
}

const LOCAL_CAPS: Capabilities = Capabilities {
    storage: StorageClass::Local,
    source_correlated: false,
    packaged_on_notify: false,
    offload: OffloadRoute::LocalHelper,
    delete: DeleteRoute::LocalArtifact,
    host_requirement: HostRequirement::None,
};

impl DumpKind {
    /// Every kind, in declaration order.
    pub const ALL: [DumpKind; 6] = [
        DumpKind::Bmc,
        DumpKind::System,
        DumpKind::Resource,
        DumpKind::Hardware,
        DumpKind::Hostboot,
        DumpKind::Sbe,
    ];

    /// Returns the capability table entry for this kind.
    pub fn capabilities(self) -> Capabilities {
        match self {
            DumpKind::Bmc => LOCAL_CAPS,
            DumpKind::Hardware | DumpKind::Hostboot | DumpKind::Sbe => Capabilities {
                packaged_on_notify: true,
                ..LOCAL_CAPS
            },
            DumpKind::System => Capabilities {
                storage: StorageClass::Host,
                source_correlated: true,
                packaged_on_notify: false,
                offload: OffloadRoute::HostTransport,
                delete: DeleteRoute::HostThenRegistry,
                host_requirement: HostRequirement::RunningQuiescedOrPoweringOff,
            },
            DumpKind::Resource => Capabilities {
                storage: StorageClass::Host,
                source_correlated: true,
                packaged_on_notify: false,
                offload: OffloadRoute::HostTransport,
                delete: DeleteRoute::HostThenRegistry,
                host_requirement: HostRequirement::Running,
            },
        }
    }

    /// Lowercase name used in configuration and on the control socket.
    pub fn as_str(self) -> &'static str {
        match self {
            DumpKind::Bmc => "bmc",
            DumpKind::System => "system",
            DumpKind::Resource => "resource",
            DumpKind::Hardware => "hardware",
            DumpKind::Hostboot => "hostboot",
            DumpKind::Sbe => "sbe",
        }
    }
}

impl fmt::Display for DumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DumpKind {
    type Err = DumpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DumpKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DumpError::invalid_argument("DUMP_KIND", s))
    }
}

/// Lifecycle status of a dump entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationStatus {
    /// Collection is running; no artifact yet.
    InProgress,
    /// Artifact is present and complete.
    Completed,
    /// The collection helper failed; no artifact is expected.
    Failed,
}

/// Who asked for the dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OriginatorType {
    /// An external client such as a management console.
    Client,
    /// The BMC itself.
    #[default]
    Internal,
    /// A supporting service on the BMC.
    SupportingService,
}

impl OriginatorType {
    /// Bare enumeration name.
    pub fn as_str(self) -> &'static str {
        match self {
            OriginatorType::Client => "Client",
            OriginatorType::Internal => "Internal",
            OriginatorType::SupportingService => "SupportingService",
        }
    }
}

impl FromStr for OriginatorType {
    type Err = DumpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix(ORIGINATOR_TYPE_PREFIX).unwrap_or(s) {
            "Client" => Ok(OriginatorType::Client),
            "Internal" => Ok(OriginatorType::Internal),
            "SupportingService" => Ok(OriginatorType::SupportingService),
            _ => Err(DumpError::invalid_argument("ORIGINATOR_TYPE", s)),
        }
    }
}

/// Collection subtype of a BMC dump, passed to the packaging tool as `-t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BmcDumpType {
    /// Requested by a user; at most one in flight.
    #[default]
    User,
    /// Triggered by an application core file.
    Core,
    /// Triggered by kernel ramoops records.
    Ramoops,
    /// Triggered by an error log.
    ErrorLog,
    /// Triggered by a host checkstop error log.
    Checkstop,
}

impl BmcDumpType {
    /// Tag handed to the packaging tool.
    pub fn tag(self) -> &'static str {
        match self {
            BmcDumpType::User => "user",
            BmcDumpType::Core => "core",
            BmcDumpType::Ramoops => "ramoops",
            BmcDumpType::ErrorLog => "elog",
            BmcDumpType::Checkstop => "checkstop",
        }
    }
}

/// Power/boot state of the managed host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HostState {
    /// Host firmware is running.
    Running,
    /// Host is powered off.
    Off,
    /// Host is quiesced after a failure.
    Quiesced,
    /// Host is powering down.
    TransitioningToOff,
    /// State could not be determined.
    #[default]
    Unknown,
}

impl FromStr for HostState {
    type Err = DumpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "running" => Ok(HostState::Running),
            "off" => Ok(HostState::Off),
            "quiesced" => Ok(HostState::Quiesced),
            "transitioningtooff" | "transitioning-to-off" => Ok(HostState::TransitioningToOff),
            "unknown" => Ok(HostState::Unknown),
            _ => Err(DumpError::invalid_argument("HOST_STATE", s)),
        }
    }
}
