//! Dump file name parsing.
//!
//! Packaging tools name their artifacts `<prefix>_<id>_<timestamp>.<ext>`.
//! Which capture groups hold the id and the timestamp, and how the
//! timestamp is encoded, is configured per manager.

use chrono::{DateTime, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DumpError, DumpResult};

/// Default BMC dump file pattern.
pub const BMC_DUMP_FILENAME_REGEX: &str = r"obmcdump_([0-9]+)_([0-9]+)\.([a-zA-Z0-9]+)";

const HUMAN_READABLE_FORMAT: &str = "%Y%m%d%H%M%S";

/// Encoding of the timestamp field of a dump file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
    /// Integer seconds since the Unix epoch.
    #[default]
    EpochSeconds,
    /// `YYYYMMDDHHMMSS` in UTC.
    HumanReadable,
}

impl TimestampFormat {
    /// Renders `seconds` the way a packaging tool would.
    pub fn render(self, seconds: i64) -> Option<String> {
        match self {
            TimestampFormat::EpochSeconds => Some(seconds.to_string()),
            TimestampFormat::HumanReadable => DateTime::from_timestamp(seconds, 0)
                .map(|dt| dt.format(HUMAN_READABLE_FORMAT).to_string()),
        }
    }

    /// Converts a timestamp field to microseconds since the epoch.
    pub fn to_micros(self, field: &str) -> DumpResult<u64> {
        let seconds: u64 = match self {
            TimestampFormat::EpochSeconds => field
                .parse()
                .map_err(|_| DumpError::invalid_argument("TIMESTAMP", field))?,
            TimestampFormat::HumanReadable => {
                let dt = NaiveDateTime::parse_from_str(field, HUMAN_READABLE_FORMAT)
                    .map_err(|_| DumpError::invalid_argument("TIMESTAMP", field))?;
                u64::try_from(dt.and_utc().timestamp())
                    .map_err(|_| DumpError::invalid_argument("TIMESTAMP", field))?
            }
        };
        seconds
            .checked_mul(1_000_000)
            .ok_or_else(|| DumpError::invalid_argument("TIMESTAMP", field))
    }
}

/// Id and timestamp recovered from a dump file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDumpFile {
    /// Dump id.
    pub id: u32,
    /// Timestamp in microseconds.
    pub timestamp_us: u64,
}

/// Compiled file name pattern of one manager.
#[derive(Debug, Clone)]
pub struct DumpFilenameParser {
    regex: Regex,
    id_group: usize,
    timestamp_group: usize,
    format: TimestampFormat,
}

impl DumpFilenameParser {
    /// Compiles `pattern`; both group indices must exist in it.
    pub fn new(
        pattern: &str,
        id_group: usize,
        timestamp_group: usize,
        format: TimestampFormat,
    ) -> DumpResult<Self> {
        let regex = Regex::new(pattern).map_err(|e| DumpError::Config {
            reason: format!("invalid dump filename pattern {pattern:?}: {e}"),
        })?;
        let groups = regex.captures_len();
        for group in [id_group, timestamp_group] {
            if group == 0 || group >= groups {
                return Err(DumpError::Config {
                    reason: format!("pattern {pattern:?} has no capture group {group}"),
                });
            }
        }
        Ok(Self {
            regex,
            id_group,
            timestamp_group,
            format,
        })
    }

    /// Parser for the default BMC naming scheme.
    pub fn bmc_default() -> DumpResult<Self> {
        Self::new(BMC_DUMP_FILENAME_REGEX, 1, 2, TimestampFormat::EpochSeconds)
    }

    /// Timestamp encoding this parser expects.
    pub fn format(&self) -> TimestampFormat {
        self.format
    }

    /// Extracts id and timestamp from a bare file name.
    pub fn parse(&self, file_name: &str) -> DumpResult<ParsedDumpFile> {
        let caps = self
            .regex
            .captures(file_name)
            .ok_or_else(|| DumpError::invalid_argument("FILENAME", file_name))?;
        let id_field = caps
            .get(self.id_group)
            .map(|m| m.as_str())
            .ok_or_else(|| DumpError::invalid_argument("FILENAME", file_name))?;
        let ts_field = caps
            .get(self.timestamp_group)
            .map(|m| m.as_str())
            .ok_or_else(|| DumpError::invalid_argument("FILENAME", file_name))?;
        let id = id_field
            .parse::<u32>()
            .map_err(|_| DumpError::invalid_argument("DUMP_ID", id_field))?;
        let timestamp_us = self.format.to_micros(ts_field)?;
        Ok(ParsedDumpFile { id, timestamp_us })
    }
}
