use chrono::{DateTime, Local};
use log::info;
use std::path::PathBuf;

/// Lifetime counters; one increment per datagram per stage passed.
#[derive(Debug, Clone)]
pub struct ListenerStats {
    pub total_received: u64,
    pub parsed: u64,
    pub filtered_for_display: u64,
    pub persisted: u64,
    pub start_time: DateTime<Local>,
}

impl ListenerStats {
    pub fn new(start_time: DateTime<Local>) -> Self {
        Self {
            total_received: 0,
            parsed: 0,
            filtered_for_display: 0,
            persisted: 0,
            start_time,
        }
    }

    pub fn displayed(&self) -> u64 {
        self.parsed.saturating_sub(self.filtered_for_display)
    }
}

/// Final report printed at shutdown.
#[derive(Debug, Clone)]
pub struct Summary {
    pub stats: ListenerStats,
    pub ended_at: DateTime<Local>,
    pub device_files_created: usize,
    pub devices_seen: usize,
    pub reboots_detected: u64,
    pub log_file: Option<PathBuf>,
}

impl Summary {
    pub fn runtime_secs(&self) -> f64 {
        (self.ended_at - self.stats.start_time).num_milliseconds() as f64 / 1000.0
    }

    pub fn lines(&self) -> Vec<String> {
        let stats = &self.stats;
        let mut lines = vec![
            format!("Runtime: {:.1} seconds", self.runtime_secs()),
            format!("Total messages: {}", stats.total_received),
            format!("Parsed messages: {}", stats.parsed),
            format!("Filtered messages: {}", stats.filtered_for_display),
            format!("Displayed messages: {}", stats.displayed()),
            format!("Persisted messages: {}", stats.persisted),
        ];
        if let Some(ref path) = self.log_file {
            lines.push(format!("Log file: {}", path.display()));
        }
        lines.push(format!("Devices seen: {}", self.devices_seen));
        lines.push(format!("Device-specific log files created: {}", self.device_files_created));
        lines.push(format!("Device reboots detected: {}", self.reboots_detected));
        lines
    }

    pub fn report(&self) {
        info!("Statistics:");
        for line in self.lines() {
            info!("{}", line);
        }
    }
}
