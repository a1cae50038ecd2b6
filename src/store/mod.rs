//! Durable log of decoded QR events

pub mod json_file;

use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::Region;

pub use json_file::JsonFileStore;

/// Only kind of code the pipeline emits
pub const KIND_QRCODE: &str = "QRCODE";

/// Layout of `QrEvent::timestamp`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One persisted detection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrEvent {
    pub data: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    #[serde(rename = "time", alias = "timestamp")]
    pub timestamp: String,
    pub region: String,
}

impl QrEvent {
    pub fn new(data: impl Into<String>, region: Region, at: DateTime<Local>) -> Self {
        Self {
            data: data.into(),
            kind: KIND_QRCODE.to_string(),
            timestamp: at.format(TIMESTAMP_FORMAT).to_string(),
            region: region.label().to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("event log {path} is unreadable: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("event log {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize event log: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Append-only event log.
///
/// Implementations serialize writers; readers always observe a complete log.
pub trait EventStore: Send + Sync {
    fn append(&self, event: QrEvent) -> Result<(), StorageError>;

    /// Every event in append order; empty when nothing was ever stored
    fn read_all(&self) -> Result<Vec<QrEvent>, StorageError>;

    fn read_last(&self) -> Result<Option<QrEvent>, StorageError> {
        Ok(self.read_all()?.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn event_uses_log_field_names() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let event = QrEvent::new("MB-42", Region::North, at);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["data"], "MB-42");
        assert_eq!(json["type"], "QRCODE");
        assert_eq!(json["time"], "2024-03-09 07:05:01");
        assert_eq!(json["region"], "Miền Bắc");
    }

    #[test]
    fn accepts_spelled_out_aliases() {
        let raw = r#"{"data":"x","kind":"QRCODE","timestamp":"2024-01-01 00:00:00","region":"Miền khác"}"#;
        let event: QrEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.kind, KIND_QRCODE);
        assert_eq!(event.timestamp, "2024-01-01 00:00:00");
    }
}
