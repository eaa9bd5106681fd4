//! Optional single log file receiving every datagram.

use crate::error::{ListenerError, Result};
use crate::log_entry::LogRecord;
use chrono::{DateTime, Local};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

const RECEIVED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const BANNER_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Structured,
    Raw,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            LogFormat::Structured => "structured",
            LogFormat::Raw => "raw",
            LogFormat::Json => "json",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    received_at: String,
    source_ip: String,
    source_port: u16,
    #[serde(flatten)]
    record: Option<LogRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw: Option<&'a str>,
}

pub struct ConsolidatedLog {
    path: PathBuf,
    format: LogFormat,
    file: File,
}

impl ConsolidatedLog {
    /// Opens `path` for appending (creating parent directories) and writes the banner.
    pub fn open(path: impl Into<PathBuf>, format: LogFormat, now: DateTime<Local>) -> Result<Self> {
        let path = path.into();
        let wrap = |source| ListenerError::ConsolidatedLog {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(wrap)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(wrap)?;

        let mut log = Self { path, format, file };
        log.write_line(&format!(
            "\n=== UDP Log Session Started: {} ===",
            now.format(BANNER_FORMAT)
        ))?;
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// Writes one datagram, parsed or not, in the configured format.
    pub fn write(
        &mut self,
        record: Option<&LogRecord>,
        raw: &str,
        source: SocketAddr,
        received_at: DateTime<Local>,
    ) -> Result<()> {
        let line = render(self.format, record, raw, source, received_at)?;
        self.write_line(&line)
    }

    pub fn close(mut self, now: DateTime<Local>) -> Result<()> {
        self.write_line(&format!(
            "=== UDP Log Session Ended: {} ===\n",
            now.format(BANNER_FORMAT)
        ))
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.file, "{}", line)
            .and_then(|_| self.file.flush())
            .map_err(|source| ListenerError::ConsolidatedLog {
                path: self.path.clone(),
                source,
            })
    }
}

pub fn render(
    format: LogFormat,
    record: Option<&LogRecord>,
    raw: &str,
    source: SocketAddr,
    received_at: DateTime<Local>,
) -> Result<String> {
    let received = received_at.format(RECEIVED_AT_FORMAT).to_string();
    let ip = source.ip();

    let line = match (format, record) {
        (LogFormat::Json, record) => serde_json::to_string(&JsonLine {
            received_at: received,
            source_ip: ip.to_string(),
            source_port: source.port(),
            record: record.map(|r| LogRecord {
                level: r.level.to_lowercase(),
                ..r.clone()
            }),
            raw: record.is_none().then(|| raw.trim()),
        })?,
        (LogFormat::Structured, Some(record)) => {
            format!("{} [{}] {}", received, ip, record.to_wire_line())
        }
        (LogFormat::Structured, None) => format!("{} [{}] [RAW] {}", received, ip, raw.trim()),
        (LogFormat::Raw, Some(record)) => format!("{} [{}] {}", received, ip, record.raw.trim()),
        (LogFormat::Raw, None) => format!("{} [{}] {}", received, ip, raw.trim()),
    };
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use chrono::TimeZone;

    const LINE: &str = "<14>2025-01-01T00:00:00.000Z 001122334455[50000]: [INFO][Core0] src/main.cpp[loop]: hello";

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn source() -> SocketAddr {
        "192.168.1.20:5140".parse().unwrap()
    }

    #[test]
    fn structured_line_round_trips_through_parser() {
        let record = parser::parse(LINE).unwrap();
        let line = render(LogFormat::Structured, Some(&record), LINE, source(), at()).unwrap();

        let prefix = "2025-01-01 12:00:00.000 [192.168.1.20] ";
        assert!(line.starts_with(prefix));
        let reparsed = parser::parse(&line[prefix.len()..]).unwrap();
        assert_eq!(LogRecord { raw: String::new(), ..reparsed }, LogRecord { raw: String::new(), ..record });
    }

    #[test]
    fn structured_round_trip_keeps_unknown_device() {
        let line = "<14>2025-01-01T00:00:00.000Z [7]: [warning][Core1] f.cpp[g]: x: y";
        let record = parser::parse(line).unwrap();
        let rendered = render(LogFormat::Structured, Some(&record), line, source(), at()).unwrap();
        let stripped = rendered.splitn(4, ' ').nth(3).unwrap();
        assert_eq!(parser::parse(stripped).unwrap().device_id, "unknown");
        assert_eq!(parser::parse(stripped).unwrap().message, "x: y");
    }

    #[test]
    fn structured_unparsed_line() {
        let line = render(LogFormat::Structured, None, "garbage\n", source(), at()).unwrap();
        assert_eq!(line, "2025-01-01 12:00:00.000 [192.168.1.20] [RAW] garbage");
    }

    #[test]
    fn raw_format_keeps_original_text() {
        let record = parser::parse(LINE).unwrap();
        let line = render(LogFormat::Raw, Some(&record), LINE, source(), at()).unwrap();
        assert_eq!(line, format!("2025-01-01 12:00:00.000 [192.168.1.20] {}", LINE));
    }

    #[test]
    fn json_format_has_all_fields() {
        let record = parser::parse(LINE).unwrap();
        let line = render(LogFormat::Json, Some(&record), LINE, source(), at()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["received_at"], "2025-01-01 12:00:00.000");
        assert_eq!(value["source_ip"], "192.168.1.20");
        assert_eq!(value["source_port"], 5140);
        assert_eq!(value["priority"], 14);
        assert_eq!(value["timestamp"], "2025-01-01T00:00:00.000Z");
        assert_eq!(value["device"], "001122334455");
        assert_eq!(value["millis"], 50000);
        assert_eq!(value["level"], "info");
        assert_eq!(value["core"], 0);
        assert_eq!(value["function"], "src/main.cpp[loop]");
        assert_eq!(value["message"], "hello");
        assert!(value.get("raw").is_none());
    }

    #[test]
    fn format_names_match_flag_values() {
        for format in LogFormat::value_variants() {
            let name = format.to_possible_value().unwrap().get_name().to_string();
            assert_eq!(format.to_string(), name);
        }
    }

    #[test]
    fn json_format_unparsed_keeps_raw() {
        let line = render(LogFormat::Json, None, "oops", source(), at()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["raw"], "oops");
        assert!(value.get("device").is_none());
    }

    #[test]
    fn open_appends_with_banners() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("all.log");

        let mut log = ConsolidatedLog::open(&path, LogFormat::Raw, at()).unwrap();
        log.write(None, "one", source(), at()).unwrap();
        log.close(at()).unwrap();

        let log = ConsolidatedLog::open(&path, LogFormat::Raw, at()).unwrap();
        log.close(at()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("=== UDP Log Session Started").count(), 2);
        assert_eq!(content.matches("=== UDP Log Session Ended").count(), 2);
        assert!(content.contains("[192.168.1.20] one\n"));
    }
}
