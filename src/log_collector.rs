use crate::config::Config;
use crate::consolidated::ConsolidatedLog;
use crate::device_log::DeviceLogs;
use crate::display::{DisplayFilter, Formatter};
use crate::log_entry::LogRecord;
use crate::parser;
use crate::receiver::{Receiver, Transport};
use crate::session::{SessionTracker, Transition};
use crate::stats::{ListenerStats, Summary};
use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How long a receive may block before the shutdown flag is checked again.
const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Datagrams traced individually in debug mode.
const TRACED_DATAGRAMS: u64 = 5;
/// Pause after a failed receive, doubled per consecutive failure.
const INITIAL_BACKOFF: Duration = Duration::from_millis(50);
const MAX_BACKOFF: Duration = POLL_INTERVAL;
const BACKOFF_MULTIPLIER: u32 = 2;

/// Processes datagrams one at a time: parse, session update, persistence, display.
pub struct Listener<W: Write> {
    tracker: SessionTracker,
    device_logs: Option<DeviceLogs>,
    consolidated: Option<ConsolidatedLog>,
    filter: DisplayFilter,
    formatter: Formatter,
    show_unparsed: bool,
    stats: ListenerStats,
    out: W,
}

impl<W: Write> Listener<W> {
    /// A consolidated log that cannot be opened is reported and skipped.
    pub fn new(config: &Config, out: W, now: DateTime<Local>) -> Self {
        let persistence = &config.persistence;

        let device_logs = persistence.device_logs.then(|| {
            DeviceLogs::new(&persistence.device_log_dir, &persistence.device_log_prefix)
        });

        let consolidated = persistence.log_file.as_ref().and_then(|path| {
            match ConsolidatedLog::open(path, persistence.log_format, now) {
                Ok(log) => Some(log),
                Err(e) => {
                    error!("Error opening log file: {}", e);
                    None
                }
            }
        });

        Self {
            tracker: SessionTracker::new(config.reboot.clone()),
            device_logs,
            consolidated,
            filter: config.display_filter(),
            formatter: Formatter::new(config.display.color),
            show_unparsed: config.display.show_unparsed,
            stats: ListenerStats::new(now),
            out,
        }
    }

    #[cfg(test)]
    fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    #[cfg(test)]
    fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    /// Writes the startup banner to the display sink.
    pub fn announce(&mut self, transport: &Transport) {
        let title = match transport {
            Transport::Unicast { .. } => "UDP Log Listener",
            Transport::Multicast { .. } => "UDP Log Listener (Multicast)",
        };
        let mut lines = vec![
            self.formatter.heading(title),
            format!("Listening on {}", transport),
            format!("Filter: {} and above", self.filter.min_level()),
        ];
        if !self.filter.exclude_files().is_empty() {
            lines.push(format!("Excluding files: {}", self.filter.exclude_files().join(", ")));
        }
        if !self.filter.exclude_functions().is_empty() {
            lines.push(format!(
                "Excluding functions: {}",
                self.filter.exclude_functions().join(", ")
            ));
        }
        if let Some(ref log) = self.consolidated {
            lines.push(format!(
                "Logging to file: {} (format: {})",
                log.path().display(),
                log.format()
            ));
        }
        lines.push(
            match self.device_logs {
                Some(_) => "Device-specific logging: enabled",
                None => "Device-specific logging: disabled",
            }
            .to_string(),
        );
        lines.push("Press Ctrl+C to stop\n".to_string());
        debug!("Reboot policy: {:?}", self.tracker.policy());

        for line in lines {
            self.emit(&line);
        }
    }

    /// Runs one datagram through every stage. Never fails; problems are logged.
    pub fn handle_datagram(&mut self, payload: &[u8], source: SocketAddr, now: DateTime<Local>) {
        self.stats.total_received += 1;

        let text = parser::decode(payload);
        let record = parser::parse(&text);

        let mut persisted = false;
        if let Some(ref record) = record {
            self.stats.parsed += 1;
            persisted |= self.persist_to_device_log(record, now);
        }

        if let Some(ref mut log) = self.consolidated {
            match log.write(record.as_ref(), &text, source, now) {
                Ok(()) => persisted = true,
                Err(e) => error!("Error writing to log file: {}", e),
            }
        }

        if persisted {
            self.stats.persisted += 1;
        }

        match record {
            Some(ref record) => self.display_record(record),
            None if self.show_unparsed => {
                let line = self.formatter.unparsed(&text, source.ip(), now);
                self.emit(&line);
            }
            None => {}
        }
    }

    /// Updates the device's session and appends the record to its current file.
    fn persist_to_device_log(&mut self, record: &LogRecord, now: DateTime<Local>) -> bool {
        let transition = self
            .tracker
            .observe(&record.device_id, record.millis, &record.message, now);

        match transition {
            Transition::Rebooted(ref reason) => {
                info!("Device {} reboot detected: {}", record.device_id, reason)
            }
            Transition::Started => info!("New device: {}", record.device_id),
            Transition::Continued => {}
        }

        let Some(ref mut device_logs) = self.device_logs else {
            return false;
        };

        if transition.is_new_session() {
            if let Some(session) = self.tracker.session(&record.device_id) {
                if let Err(e) = device_logs.start_session(session, transition.reboot_reason(), now) {
                    error!("Error creating device log file: {}", e);
                }
            }
        }

        match device_logs.append(record, now) {
            Ok(written) => written,
            Err(e) => {
                error!("Error writing to device log file: {}", e);
                false
            }
        }
    }

    fn display_record(&mut self, record: &LogRecord) {
        if !self.filter.should_show(record) {
            self.stats.filtered_for_display += 1;
            return;
        }
        let delta = self.tracker.display_delta(&record.device_id, record.millis);
        let line = self.formatter.record(record, delta);
        self.emit(&line);
    }

    fn emit(&mut self, line: &str) {
        if let Err(e) = writeln!(self.out, "{}", line).and_then(|_| self.out.flush()) {
            warn!("Failed to write to display: {}", e);
        }
    }

    /// Stamps and closes every open file and returns the final report.
    pub fn shutdown(mut self, now: DateTime<Local>) -> Summary {
        let device_files_created = match self.device_logs {
            Some(ref mut logs) => {
                if logs.open_count() > 0 {
                    info!("Closing {} device log(s)", logs.open_count());
                }
                logs.close_all(now);
                logs.files_created()
            }
            None => 0,
        };

        let log_file = self.consolidated.take().map(|log| {
            let path = log.path().to_path_buf();
            if let Err(e) = log.close(now) {
                error!("Error closing log file: {}", e);
            }
            path
        });

        Summary {
            stats: self.stats,
            ended_at: now,
            device_files_created,
            devices_seen: self.tracker.device_count(),
            reboots_detected: self.tracker.reboots_detected(),
            log_file,
        }
    }
}

/// Receives until `shutdown` is set, then drains and returns the summary.
pub async fn run<W: Write>(
    mut listener: Listener<W>,
    mut receiver: Receiver,
    shutdown: Arc<AtomicBool>,
) -> Summary {
    let mut received: u64 = 0;
    let mut backoff = INITIAL_BACKOFF;

    while !shutdown.load(Ordering::SeqCst) {
        match receiver.recv_timeout(POLL_INTERVAL).await {
            Ok(Some(datagram)) => {
                backoff = INITIAL_BACKOFF;
                received += 1;
                if received <= TRACED_DATAGRAMS {
                    let preview: String = parser::decode(&datagram.payload).chars().take(100).collect();
                    debug!("Received message #{} from {}: {}...", received, datagram.source, preview);
                }
                listener.handle_datagram(&datagram.payload, datagram.source, Local::now());
            }
            Ok(None) => {
                if received == 0 {
                    debug!("Socket timeout (no messages received yet)...");
                }
            }
            Err(e) => {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                error!("Error receiving data: {}", e);
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
            }
        }
    }

    info!("Listen loop ended (received {} messages total)", received);
    receiver.close();
    listener.shutdown(Local::now())
}

fn next_backoff(current: Duration) -> Duration {
    std::cmp::min(current * BACKOFF_MULTIPLIER, MAX_BACKOFF)
}
