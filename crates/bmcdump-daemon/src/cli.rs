//! Command line of `bmcdumpd`: the daemon itself plus control client commands.

use std::path::PathBuf;

use anyhow::Result;
use bmcdump_core::{CreateParams, DumpKind, HostState, ParamValue};
use clap::{Parser, Subcommand};

use crate::config::{DEFAULT_CONFIG_PATH, DEFAULT_CONTROL_SOCKET};
use crate::control::send_request;
use crate::protocol::{ControlRequest, ControlResponse};

/// bmcdumpd command line.
#[derive(Parser, Debug)]
#[command(name = "bmcdumpd")]
#[command(about = "BMC dump lifecycle manager", long_about = None)]
pub struct Cli {
    /// Control socket of the running daemon.
    #[arg(short, long, global = true, env = "BMCDUMP_SOCKET", default_value = DEFAULT_CONTROL_SOCKET)]
    pub socket: PathBuf,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the daemon.
    Serve {
        /// Configuration file (TOML or JSON).
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// List dump entries.
    List {
        /// Only this manager.
        #[arg(short, long)]
        manager: Option<String>,
    },
    /// Request a new dump.
    Create {
        /// Manager to create in.
        #[arg(short, long, default_value = "bmc")]
        manager: String,
        /// Dump type, e.g. `System` or a full `DumpType` value.
        #[arg(short = 't', long)]
        dump_type: Option<String>,
        /// Requesting client id.
        #[arg(long)]
        originator_id: Option<String>,
        /// Requesting client type.
        #[arg(long)]
        originator_type: Option<String>,
        /// Source file for the packaging tool.
        #[arg(long)]
        file_path: Option<String>,
        /// Resource selector for resource dumps.
        #[arg(long)]
        vsp_string: Option<String>,
        /// Password for resource dumps.
        #[arg(long, env = "BMCDUMP_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Error type for error-log dumps.
        #[arg(long)]
        error_type: Option<String>,
    },
    /// Delete one entry.
    Delete {
        /// Manager holding the entry.
        #[arg(short, long, default_value = "bmc")]
        manager: String,
        /// Entry id.
        id: u32,
    },
    /// Delete every entry that may be deleted.
    DeleteAll {
        /// Manager to clear.
        #[arg(short, long, default_value = "bmc")]
        manager: String,
    },
    /// Offload a completed dump.
    Offload {
        /// Manager holding the entry.
        #[arg(short, long, default_value = "bmc")]
        manager: String,
        /// Entry id.
        id: u32,
        /// Destination (`unix://`, `file://` or a path).
        uri: String,
    },
    /// Deliver a host "dump ready" notification.
    Notify {
        /// Kind of the host dump (`system` or `resource`).
        kind: DumpKind,
        /// Host-side dump id.
        source_id: u32,
        /// Size in bytes.
        size: u64,
        /// Host-supplied token.
        #[arg(long, default_value_t = 0)]
        token: u32,
    },
    /// Record the host's power state.
    HostState {
        /// `running`, `off`, `quiesced`, `transitioning-to-off` or `unknown`.
        state: HostState,
    },
}

impl Command {
    /// The control request for a client command; `None` for `serve`.
    pub fn to_request(&self) -> Option<ControlRequest> {
        let request = match self {
            Command::Serve { .. } => return None,
            Command::List { manager } => ControlRequest::List {
                manager: manager.clone(),
            },
            Command::Create {
                manager,
                dump_type,
                originator_id,
                originator_type,
                file_path,
                vsp_string,
                password,
                error_type,
            } => {
                let mut params = CreateParams::new();
                for (key, value) in [
                    ("DumpType", dump_type),
                    ("OriginatorId", originator_id),
                    ("OriginatorType", originator_type),
                    ("FilePath", file_path),
                    ("VSPString", vsp_string),
                    ("Password", password),
                    ("ErrorType", error_type),
                ] {
                    if let Some(value) = value {
                        params.insert(key.to_string(), ParamValue::from(value.clone()));
                    }
                }
                ControlRequest::Create {
                    manager: manager.clone(),
                    params,
                }
            }
            Command::Delete { manager, id } => ControlRequest::Delete {
                manager: manager.clone(),
                id: *id,
            },
            Command::DeleteAll { manager } => ControlRequest::DeleteAll {
                manager: manager.clone(),
            },
            Command::Offload { manager, id, uri } => ControlRequest::Offload {
                manager: manager.clone(),
                id: *id,
                uri: uri.clone(),
            },
            Command::Notify {
                kind,
                source_id,
                size,
                token,
            } => ControlRequest::Notify {
                kind: *kind,
                source_id: *source_id,
                size: *size,
                token: *token,
            },
            Command::HostState { state } => ControlRequest::SetHostState { state: *state },
        };
        Some(request)
    }
}

impl Cli {
    /// Runs a client command against the daemon and prints the response.
    pub async fn run(&self) -> Result<()> {
        let Some(request) = self.command.to_request() else {
            anyhow::bail!("serve is not a client command");
        };
        let response = send_request(&self.socket, &request).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
        match response {
            ControlResponse::Ok { .. } => Ok(()),
            ControlResponse::Error { kind, message } => anyhow::bail!("{kind}: {message}"),
        }
    }
}
