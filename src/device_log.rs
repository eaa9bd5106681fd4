//! Per-device, per-session log files.
//!
//! Each device has at most one open file at a time. Starting a new session
//! stamps and closes the previous file before the next one is created, so a
//! file never holds records from two sessions.

use crate::error::{ListenerError, Result};
use crate::log_entry::LogRecord;
use crate::session::{DeviceSession, RebootReason};
use chrono::{DateTime, Local};
use log::{error, info};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

const WALL_CLOCK_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct DeviceLogFile {
    path: PathBuf,
    file: File,
}

impl DeviceLogFile {
    fn create(
        path: PathBuf,
        session: &DeviceSession,
        reason: Option<&RebootReason>,
    ) -> Result<Self> {
        let file = File::create(&path).map_err(|source| ListenerError::DeviceLog {
            path: path.clone(),
            source,
        })?;
        let mut log_file = Self { path, file };

        let mut header = format!(
            "=== Device Log: {} ===\n=== Session Started: {} ===\n",
            session.device_id,
            session.started_at.format(WALL_CLOCK_FORMAT)
        );
        if let Some(reason) = reason {
            header.push_str(&format!("=== Device Reboot Detected: {} ===\n", reason));
        }
        header.push('\n');
        log_file.write_str(&header)?;

        Ok(log_file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_str(&mut self, text: &str) -> Result<()> {
        self.file
            .write_all(text.as_bytes())
            .and_then(|_| self.file.flush())
            .map_err(|source| ListenerError::DeviceLog {
                path: self.path.clone(),
                source,
            })
    }

    fn append(&mut self, record: &LogRecord, received_at: DateTime<Local>) -> Result<()> {
        let line = format!(
            "{} {} [{}ms] {:<7} [Core{}] {}: {}\n",
            received_at.format(WALL_CLOCK_FORMAT),
            record.device_id,
            record.millis,
            record.level_label(),
            record.core,
            record.function,
            record.message
        );
        self.write_str(&line)
    }

    /// Writes the footer and syncs; the handle is released when `self` drops.
    fn finish(mut self, ended_at: DateTime<Local>) -> Result<()> {
        self.write_str(&format!(
            "\n=== Session Ended: {} ===\n",
            ended_at.format(WALL_CLOCK_FORMAT)
        ))?;
        self.file.sync_all().map_err(|source| ListenerError::DeviceLog {
            path: self.path.clone(),
            source,
        })
    }
}

/// Owns the open session file of every device.
pub struct DeviceLogs {
    dir: PathBuf,
    prefix: String,
    files: HashMap<String, DeviceLogFile>,
    created: usize,
}

impl DeviceLogs {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            files: HashMap::new(),
            created: 0,
        }
    }

    pub fn path_for(&self, device_id: &str, session_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}_{}.txt", self.prefix, sanitize(device_id), session_id))
    }

    /// Closes the device's current file (if any), then opens the file for `session`.
    ///
    /// On failure the device is left without an open file until the next session starts.
    pub fn start_session(
        &mut self,
        session: &DeviceSession,
        reason: Option<&RebootReason>,
        now: DateTime<Local>,
    ) -> Result<&Path> {
        if let Err(e) = self.close(&session.device_id, now) {
            error!("Error closing previous device log for {}: {}", session.device_id, e);
        }

        fs::create_dir_all(&self.dir).map_err(|source| ListenerError::DeviceLog {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path_for(&session.device_id, &session.session_id);
        let file = DeviceLogFile::create(path, session, reason)?;
        info!("Created device log: {}", file.path().display());
        self.created += 1;

        let file = self.files.entry(session.device_id.clone()).or_insert(file);
        Ok(file.path())
    }

    /// Appends one record line. Returns `false` when the device has no open file.
    pub fn append(&mut self, record: &LogRecord, received_at: DateTime<Local>) -> Result<bool> {
        match self.files.get_mut(&record.device_id) {
            Some(file) => file.append(record, received_at).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn close(&mut self, device_id: &str, now: DateTime<Local>) -> Result<()> {
        match self.files.remove(device_id) {
            Some(file) => file.finish(now),
            None => Ok(()),
        }
    }

    /// Footer-stamps and closes every open file. Returns how many were closed cleanly.
    pub fn close_all(&mut self, now: DateTime<Local>) -> usize {
        let mut closed = 0;
        for (device_id, file) in self.files.drain() {
            match file.finish(now) {
                Ok(()) => {
                    info!("Closed device log for: {}", device_id);
                    closed += 1;
                }
                Err(e) => error!("Error closing device log for {}: {}", device_id, e),
            }
        }
        closed
    }

    pub fn open_count(&self) -> usize {
        self.files.len()
    }

    pub fn files_created(&self) -> usize {
        self.created
    }
}

fn sanitize(device_id: &str) -> String {
    device_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
