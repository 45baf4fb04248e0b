//! Create-request parameter parsing.
//!
//! A create request arrives as a loosely typed map of parameter names to
//! string or integer values. [`CreateRequest::from_params`] validates that
//! map once so the manager only ever sees typed fields.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DumpError, DumpResult};
use crate::types::{BmcDumpType, DumpKind, OriginatorType};

/// Optional prefix accepted on every parameter name.
pub const CREATE_PARAMS_PREFIX: &str = "xyz.openbmc_project.Dump.Create.CreateParameters.";

/// Prefix of the `DumpType` enumeration strings.
pub const DUMP_TYPE_PREFIX: &str = "xyz.openbmc_project.Dump.Create.DumpType.";

const INVALID_INPUT: &str = "INVALID INPUT";

/// A single create parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// String value.
    Str(String),
    /// Unsigned integer value.
    U64(u64),
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Str(s)
    }
}

impl From<u64> for ParamValue {
    fn from(v: u64) -> Self {
        ParamValue::U64(v)
    }
}

/// Parameter map as received from a caller.
pub type CreateParams = BTreeMap<String, ParamValue>;

/// The dump category a `DumpType` parameter asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpTypeRequest {
    /// Requested kind.
    pub kind: DumpKind,
    /// Collection subtype when `kind` is [`DumpKind::Bmc`].
    pub bmc_type: Option<BmcDumpType>,
}

impl DumpTypeRequest {
    /// Parses a `DumpType` string, bare or with [`DUMP_TYPE_PREFIX`].
    pub fn parse(value: &str) -> DumpResult<Self> {
        let bare = value.strip_prefix(DUMP_TYPE_PREFIX).unwrap_or(value);
        let bmc = |t| DumpTypeRequest {
            kind: DumpKind::Bmc,
            bmc_type: Some(t),
        };
        let other = |kind| DumpTypeRequest {
            kind,
            bmc_type: None,
        };
        match bare {
            "UserRequested" => Ok(bmc(BmcDumpType::User)),
            "ApplicationCored" => Ok(bmc(BmcDumpType::Core)),
            "Ramoops" => Ok(bmc(BmcDumpType::Ramoops)),
            "ErrorLog" => Ok(bmc(BmcDumpType::ErrorLog)),
            "System" => Ok(other(DumpKind::System)),
            "Resource" => Ok(other(DumpKind::Resource)),
            "Hostboot" => Ok(other(DumpKind::Hostboot)),
            "Hardware" => Ok(other(DumpKind::Hardware)),
            "SBE" | "Sbe" => Ok(other(DumpKind::Sbe)),
            _ => Err(DumpError::invalid_argument("BMC_DUMP_TYPE", value)),
        }
    }
}

/// Validated create request.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CreateRequest {
    /// Opaque originator id, copied onto the entry.
    pub originator_id: String,
    /// Originator type, `Internal` when absent.
    pub originator_type: OriginatorType,
    /// Requested dump type, if given.
    pub dump_type: Option<DumpTypeRequest>,
    /// Source-file hint for the packaging tool.
    pub file_path: Option<PathBuf>,
    /// Resource selector for resource dumps.
    pub vsp_string: Option<String>,
    /// Password for resource dumps.
    pub password: Option<String>,
    /// Error type that triggered an error-log dump.
    pub error_type: Option<String>,
}

impl fmt::Debug for CreateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateRequest")
            .field("originator_id", &self.originator_id)
            .field("originator_type", &self.originator_type)
            .field("dump_type", &self.dump_type)
            .field("file_path", &self.file_path)
            .field("vsp_string", &self.vsp_string)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("error_type", &self.error_type)
            .finish()
    }
}

fn expect_str(value: &ParamValue, name: &str) -> DumpResult<String> {
    match value {
        ParamValue::Str(s) => Ok(s.clone()),
        ParamValue::U64(_) => Err(DumpError::invalid_argument(name, INVALID_INPUT)),
    }
}

impl CreateRequest {
    /// Validates a raw parameter map.
    ///
    /// Unrecognized keys are ignored and missing keys take their defaults.
    /// A recognized key carrying the wrong value type is `InvalidArgument`.
    pub fn from_params(params: &CreateParams) -> DumpResult<Self> {
        let mut req = CreateRequest::default();
        for (key, value) in params {
            let name = key.strip_prefix(CREATE_PARAMS_PREFIX).unwrap_or(key);
            match name {
                "OriginatorId" => req.originator_id = expect_str(value, "ORIGINATOR_ID")?,
                "OriginatorType" => {
                    let raw = expect_str(value, "ORIGINATOR_TYPE")?;
                    req.originator_type = raw
                        .parse()
                        .map_err(|_| DumpError::invalid_argument("ORIGINATOR_TYPE", INVALID_INPUT))?;
                }
                "DumpType" => {
                    let raw = expect_str(value, "BMC_DUMP_TYPE")?;
                    req.dump_type = Some(DumpTypeRequest::parse(&raw)?);
                }
                "FilePath" => {
                    let raw = expect_str(value, "FILE_PATH")?;
                    if !raw.is_empty() {
                        req.file_path = Some(PathBuf::from(raw));
                    }
                }
                "VSPString" => req.vsp_string = Some(expect_str(value, "VSP_STRING")?),
                "Password" => req.password = Some(expect_str(value, "PASSWORD")?),
                "ErrorType" => {
                    let raw = expect_str(value, "ERROR_TYPE")?;
                    if !is_known_error_type(&raw) {
                        return Err(DumpError::invalid_argument("ERROR_TYPE", raw));
                    }
                    req.error_type = Some(raw);
                }
                other => debug!(param = other, "ignoring unrecognized create parameter"),
            }
        }
        Ok(req)
    }

    /// BMC collection subtype implied by `DumpType` and `ErrorType`.
    ///
    /// A missing `DumpType` means a user dump; an error-log dump whose error
    /// type is a checkstop is collected as a checkstop dump.
    pub fn bmc_type(&self) -> BmcDumpType {
        let base = self
            .dump_type
            .and_then(|t| t.bmc_type)
            .unwrap_or(BmcDumpType::User);
        match (base, self.error_type.as_deref()) {
            (BmcDumpType::ErrorLog, Some(e)) if e.eq_ignore_ascii_case("checkstop") => {
                BmcDumpType::Checkstop
            }
            _ => base,
        }
    }
}

fn is_known_error_type(value: &str) -> bool {
    ["checkstop", "elog"]
        .iter()
        .any(|known| known.eq_ignore_ascii_case(value))
}
