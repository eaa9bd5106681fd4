//! Live terminal output: filtering and colorized rendering.

use crate::log_entry::{Level, LogRecord};
use chrono::{DateTime, Local};
use colored::{Color, ColoredString, Colorize};
use std::net::IpAddr;

/// Decides which parsed records reach the terminal.
#[derive(Debug, Clone, Default)]
pub struct DisplayFilter {
    min_level: Level,
    exclude_functions: Vec<String>,
    exclude_files: Vec<String>,
}

impl DisplayFilter {
    pub fn new(min_level: Level, exclude_functions: &[String], exclude_files: &[String]) -> Self {
        let lower = |items: &[String]| -> Vec<String> {
            items
                .iter()
                .map(|s| s.to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };
        Self {
            min_level,
            exclude_functions: lower(exclude_functions),
            exclude_files: lower(exclude_files),
        }
    }

    pub fn min_level(&self) -> Level {
        self.min_level
    }

    pub fn exclude_functions(&self) -> &[String] {
        &self.exclude_functions
    }

    pub fn exclude_files(&self) -> &[String] {
        &self.exclude_files
    }

    /// File paths are embedded in the function field, so both lists match against it.
    pub fn should_show(&self, record: &LogRecord) -> bool {
        if record.severity() < self.min_level {
            return false;
        }
        let function = record.function.to_lowercase();
        !self
            .exclude_functions
            .iter()
            .chain(&self.exclude_files)
            .any(|needle| function.contains(needle.as_str()))
    }
}

/// Renders terminal lines. With `color` off the styling is dropped regardless of
/// what `colored` would decide for the process.
#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    color: bool,
}

impl Formatter {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn paint(&self, styled: ColoredString) -> String {
        if self.color {
            styled.to_string()
        } else {
            (*styled).to_string()
        }
    }

    fn level_color(level: Level) -> Color {
        match level {
            Level::Verbose => Color::BrightBlack,
            Level::Debug => Color::Cyan,
            Level::Info => Color::Green,
            Level::Warning => Color::Yellow,
            Level::Error => Color::Red,
            Level::Fatal => Color::Magenta,
        }
    }

    /// `delta` is milliseconds since the device's previously displayed record.
    pub fn record(&self, record: &LogRecord, delta: Option<u64>) -> String {
        let delta = delta.map(|d| format!(" (+{:03}ms)", d)).unwrap_or_default();
        let level = format!("{:<7}", record.level_label());
        let level = match Level::from_name(&record.level) {
            Some(known) => self.paint(level.color(Self::level_color(known))),
            None => level,
        };
        format!(
            "{} [{}ms{}] {} [Core{}] {}: {}",
            self.paint(record.timestamp.bright_blue()),
            record.millis,
            delta,
            level,
            record.core,
            self.paint(record.function.bright_yellow()),
            record.message
        )
    }

    pub fn unparsed(&self, text: &str, from: IpAddr, received_at: DateTime<Local>) -> String {
        let line = format!(
            "{} [RAW from {}]: {}",
            received_at.format("%Y-%m-%d %H:%M:%S"),
            from,
            text.trim()
        );
        self.paint(line.dimmed())
    }

    pub fn heading(&self, text: &str) -> String {
        self.paint(text.bold())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_entry::UNKNOWN_DEVICE;
    use chrono::TimeZone;

    fn record(level: &str, function: &str) -> LogRecord {
        LogRecord {
            priority: 14,
            timestamp: "2025-01-01T00:00:00.000Z".to_string(),
            device_id: UNKNOWN_DEVICE.to_string(),
            millis: 1234,
            level: level.to_string(),
            core: 1,
            function: function.to_string(),
            message: "hello".to_string(),
            raw: String::new(),
        }
    }

    #[test]
    fn warning_threshold_passes_exactly_upper_levels() {
        let filter = DisplayFilter::new(Level::Warning, &[], &[]);
        for level in Level::ALL {
            let shown = filter.should_show(&record(level.as_str(), "main"));
            assert_eq!(shown, level >= Level::Warning, "level {level}");
        }
    }

    #[test]
    fn threshold_compares_case_insensitively() {
        let filter = DisplayFilter::new(Level::Info, &[], &[]);
        assert!(filter.should_show(&record("ERROR", "main")));
        assert!(!filter.should_show(&record("DEBUG", "main")));
    }

    #[test]
    fn unknown_level_is_lowest() {
        assert!(DisplayFilter::new(Level::Verbose, &[], &[]).should_show(&record("TRACE", "main")));
        assert!(!DisplayFilter::new(Level::Debug, &[], &[]).should_show(&record("TRACE", "main")));
    }

    #[test]
    fn excluded_function_and_file_substrings() {
        let filter = DisplayFilter::new(
            Level::Verbose,
            &["_PrintMeterValues".to_string()],
            &["src/ade7953.cpp".to_string()],
        );
        assert!(!filter.should_show(&record("info", "src/ade7953.cpp[readMeter]")));
        assert!(!filter.should_show(&record("info", "src/meter.cpp[_printMeterValues]")));
        assert!(filter.should_show(&record("info", "src/utils.cpp[printStatus]")));
    }

    #[test]
    fn renders_plain_record_with_delta() {
        let f = Formatter::new(false);
        assert_eq!(
            f.record(&record("info", "src/main.cpp[loop]"), Some(7)),
            "2025-01-01T00:00:00.000Z [1234ms (+007ms)] INFO    [Core1] src/main.cpp[loop]: hello"
        );
        assert_eq!(
            f.record(&record("info", "src/main.cpp[loop]"), None),
            "2025-01-01T00:00:00.000Z [1234ms] INFO    [Core1] src/main.cpp[loop]: hello"
        );
    }

    #[test]
    fn colors_level_and_function() {
        colored::control::set_override(true);
        let line = Formatter::new(true).record(&record("error", "main"), None);
        assert!(line.contains("\x1b[31mERROR  \x1b[0m"));
        assert!(line.contains("\x1b[93mmain\x1b[0m"));
    }

    #[test]
    fn unparsed_is_dimmed() {
        let at = Local.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let ip: IpAddr = "10.0.0.5".parse().unwrap();
        assert_eq!(
            Formatter::new(false).unparsed("junk\n", ip, at),
            "2025-01-01 12:00:00 [RAW from 10.0.0.5]: junk"
        );
        colored::control::set_override(true);
        assert!(Formatter::new(true).unparsed("junk", ip, at).starts_with("\x1b[2m"));
    }
}
