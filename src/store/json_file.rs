//! Event log kept as one pretty-printed JSON array

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use super::{EventStore, QrEvent, StorageError};

/// JSON-array backed store. Every append rewrites the whole file through a temp file + rename.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<QrEvent>, StorageError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_slice(&raw).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn persist(&self, events: &[QrEvent]) -> Result<(), StorageError> {
        let body = serde_json::to_vec_pretty(events).map_err(StorageError::Serialize)?;
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);

        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(&body).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);

        fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

impl EventStore for JsonFileStore {
    fn append(&self, event: QrEvent) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut events = self.load()?;
        events.push(event);
        self.persist(&events)?;

        debug!(path = %self.path.display(), total = events.len(), "Appended QR event");
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<QrEvent>, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Region;
    use chrono::Local;
    use std::sync::Arc;

    fn event(data: &str) -> QrEvent {
        QrEvent::new(data, crate::classify::classify(data), Local::now())
    }

    #[test]
    fn empty_store_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("qr_data.json"));
        assert!(store.read_all().unwrap().is_empty());
        assert_eq!(store.read_last().unwrap(), None);
    }

    #[test]
    fn appends_preserve_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("qr_data.json"));
        let (e1, e2) = (event("MB-1"), event("MN-2"));

        store.append(e1.clone()).unwrap();
        store.append(e2.clone()).unwrap();

        assert_eq!(store.read_all().unwrap(), vec![e1, e2.clone()]);
        assert_eq!(store.read_last().unwrap(), Some(e2));
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qr_data.json");
        JsonFileStore::new(&path).append(event("MT-7")).unwrap();

        let reopened = JsonFileStore::new(&path);
        let events = reopened.read_all().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].region, Region::Central.label());
    }

    #[test]
    fn file_is_indented_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qr_data.json");
        JsonFileStore::new(&path).append(event("kho mien bac")).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[\n"));
        assert!(text.contains("\"region\": \"Miền Bắc\""));
        assert!(!dir.path().join("qr_data.json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_an_error_not_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qr_data.json");
        fs::write(&path, b"{ not json").unwrap();
        let store = JsonFileStore::new(&path);

        assert!(matches!(store.read_all(), Err(StorageError::Corrupt { .. })));
        assert!(matches!(store.read_last(), Err(StorageError::Corrupt { .. })));
        // Appending must not clobber a log it cannot parse
        assert!(store.append(event("MB-1")).is_err());
        assert_eq!(fs::read(&path).unwrap(), b"{ not json");
    }

    #[test]
    fn append_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nope").join("qr_data.json"));
        assert!(matches!(store.append(event("MB-1")), Err(StorageError::Io { .. })));
    }

    #[test]
    fn concurrent_appends_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path().join("qr_data.json")));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || store.append(event(&format!("MB-{i}"))).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.read_all().unwrap().len(), 8);
    }
}
