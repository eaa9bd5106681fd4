use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to join multicast group {group}: {source}")]
    JoinMulticast {
        group: String,
        #[source]
        source: std::io::Error,
    },

    #[error("receive error: {0}")]
    Receive(#[source] std::io::Error),

    #[error("device log error for {path:?}: {source}")]
    DeviceLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("consolidated log error for {path:?}: {source}")]
    ConsolidatedLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ListenerError {
    pub fn is_permission_denied(&self) -> bool {
        match self {
            ListenerError::Bind { source, .. } | ListenerError::JoinMulticast { source, .. } => {
                source.kind() == std::io::ErrorKind::PermissionDenied
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ListenerError>;
