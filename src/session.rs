//! Per-device session tracking and reboot inference.

use chrono::{DateTime, Local};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

const SESSION_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

/// When a low uptime counter or a marker line counts as a device restart.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RebootPolicy {
    /// Phrase the firmware logs right after boot
    pub marker_phrase: String,
    /// A counter below this (ms) may indicate a fresh boot
    pub max_boot_millis: u64,
    /// The previous counter must have exceeded this (ms) for a reset to be trusted
    pub min_prior_uptime_millis: u64,
}

impl Default for RebootPolicy {
    fn default() -> Self {
        Self {
            marker_phrase: "Guess who's back".to_string(),
            max_boot_millis: 600_000,
            min_prior_uptime_millis: 1_800_000,
        }
    }
}

impl RebootPolicy {
    /// Returns the reboot reason, if any. Marker phrase wins over the counter check.
    pub fn detect(&self, last_seen: Option<u64>, millis: u64, message: &str) -> Option<RebootReason> {
        if !self.marker_phrase.is_empty() && message.contains(&self.marker_phrase) {
            return Some(RebootReason::MarkerPhrase(self.marker_phrase.clone()));
        }

        let last = last_seen?;
        if millis < self.max_boot_millis && last > self.min_prior_uptime_millis && millis < last {
            return Some(RebootReason::CounterReset { from: last, to: millis });
        }

        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebootReason {
    MarkerPhrase(String),
    CounterReset { from: u64, to: u64 },
}

impl fmt::Display for RebootReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebootReason::MarkerPhrase(phrase) => write!(f, "'{}' message", phrase),
            RebootReason::CounterReset { from, to } => {
                write!(f, "millis reset from {}ms to {}ms", from, to)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceSession {
    pub device_id: String,
    pub session_id: String,
    pub started_at: DateTime<Local>,
    pub last_seen_millis: u64,
    /// Last millis shown on the terminal; only feeds display deltas
    pub last_display_millis: Option<u64>,
}

/// Outcome of feeding one record to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// First message ever seen from this device, without a reboot marker
    Started,
    Continued,
    Rebooted(RebootReason),
}

impl Transition {
    pub fn is_new_session(&self) -> bool {
        !matches!(self, Transition::Continued)
    }

    pub fn reboot_reason(&self) -> Option<&RebootReason> {
        match self {
            Transition::Rebooted(reason) => Some(reason),
            _ => None,
        }
    }
}

pub struct SessionTracker {
    policy: RebootPolicy,
    sessions: HashMap<String, DeviceSession>,
    reboots: u64,
}

impl SessionTracker {
    pub fn new(policy: RebootPolicy) -> Self {
        Self {
            policy,
            sessions: HashMap::new(),
            reboots: 0,
        }
    }

    /// Applies one `MessageArrived` event and returns what happened to the device's session.
    pub fn observe(&mut self, device_id: &str, millis: u64, message: &str, now: DateTime<Local>) -> Transition {
        let Some(session) = self.sessions.get_mut(device_id) else {
            let reason = self.policy.detect(None, millis, message);
            self.sessions.insert(
                device_id.to_string(),
                DeviceSession {
                    device_id: device_id.to_string(),
                    session_id: next_session_id(None, now),
                    started_at: now,
                    last_seen_millis: millis,
                    last_display_millis: None,
                },
            );
            return match reason {
                Some(reason) => {
                    self.reboots += 1;
                    Transition::Rebooted(reason)
                }
                None => Transition::Started,
            };
        };

        let reason = self
            .policy
            .detect(Some(session.last_seen_millis), millis, message);
        session.last_seen_millis = millis;

        match reason {
            Some(reason) => {
                session.session_id = next_session_id(Some(&session.session_id), now);
                session.started_at = now;
                session.last_display_millis = None;
                self.reboots += 1;
                Transition::Rebooted(reason)
            }
            None => Transition::Continued,
        }
    }

    pub fn session(&self, device_id: &str) -> Option<&DeviceSession> {
        self.sessions.get(device_id)
    }

    /// Records a displayed millis value and returns the delta to the previous one.
    /// Negative deltas are suppressed.
    pub fn display_delta(&mut self, device_id: &str, millis: u64) -> Option<u64> {
        let session = self.sessions.get_mut(device_id)?;
        let previous = session.last_display_millis.replace(millis)?;
        millis.checked_sub(previous)
    }

    pub fn device_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn reboots_detected(&self) -> u64 {
        self.reboots
    }

    pub fn policy(&self) -> &RebootPolicy {
        &self.policy
    }
}

/// Second-resolution id; repeats within the same second for one device get a `-N` suffix.
fn next_session_id(previous: Option<&str>, now: DateTime<Local>) -> String {
    let base = now.format(SESSION_ID_FORMAT).to_string();
    let Some(previous) = previous else {
        return base;
    };
    let Some(suffix) = previous.strip_prefix(base.as_str()) else {
        return base;
    };
    let seq = match suffix {
        "" => 1,
        s => match s.strip_prefix('-').and_then(|n| n.parse::<u32>().ok()) {
            Some(n) => n,
            None => return base,
        },
    };
    format!("{}-{}", base, seq + 1)
}
