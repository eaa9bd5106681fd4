use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device id used when a line carries no id segment.
pub const UNKNOWN_DEVICE: &str = "unknown";

/// Severity levels emitted by the firmware, lowest first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Verbose,
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl Level {
    pub const ALL: [Level; 6] = [
        Level::Verbose,
        Level::Debug,
        Level::Info,
        Level::Warning,
        Level::Error,
        Level::Fatal,
    ];

    /// Case-insensitive lookup; `None` for anything the firmware does not define.
    pub fn from_name(name: &str) -> Option<Level> {
        Level::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(name.trim()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Verbose => "verbose",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured line received from a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub priority: u32,
    /// ISO 8601 timestamp exactly as the device sent it
    pub timestamp: String,
    /// Lowercase hex id, or `unknown`
    #[serde(rename = "device")]
    pub device_id: String,
    pub millis: u64,
    /// Level text as emitted, e.g. `INFO`
    pub level: String,
    pub core: u32,
    pub function: String,
    pub message: String,
    #[serde(skip)]
    pub raw: String,
}

impl LogRecord {
    /// Recognized severity; unrecognized level text ranks as the lowest level.
    pub fn severity(&self) -> Level {
        Level::from_name(&self.level).unwrap_or(Level::Verbose)
    }

    pub fn level_label(&self) -> String {
        self.level.to_uppercase()
    }

    pub fn has_device_id(&self) -> bool {
        self.device_id != UNKNOWN_DEVICE
    }

    /// Renders the record back into the wire grammar it was parsed from.
    pub fn to_wire_line(&self) -> String {
        let device = if self.has_device_id() { self.device_id.as_str() } else { "" };
        format!(
            "<{}>{} {}[{}]: [{}][Core{}] {}: {}",
            self.priority,
            self.timestamp,
            device,
            self.millis,
            self.level,
            self.core,
            self.function,
            self.message
        )
    }
}
