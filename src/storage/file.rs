//! Directory-backed gateway: one JSON file per key.

use super::gateway::PersistenceGateway;
use crate::error::GatewayError;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// File extension for stored values.
const VALUE_EXTENSION: &str = "json";

/// Gateway that keeps each key in `<dir>/<key>.json`.
///
/// Each write goes to its own uniquely named temporary file in the same
/// directory, which is then renamed over the target. Readers see either the
/// previous value or a complete new one, even with several writers on one
/// key; the last rename wins.
#[derive(Clone, Debug)]
pub struct FileGateway {
    /// Base directory for values.
    path: PathBuf,
}

impl FileGateway {
    /// Create a gateway rooted at `path`, creating the directory if needed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the value stored under `key`. Returns whether one existed.
    pub fn remove(&self, key: &str) -> Result<bool, GatewayError> {
        match fs::remove_file(self.value_path(key)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn value_path(&self, key: &str) -> Result<PathBuf, GatewayError> {
        validate_key(key)?;
        Ok(self.path.join(format!("{}.{}", key, VALUE_EXTENSION)))
    }
}

impl PersistenceGateway for FileGateway {
    fn get_string(&self, key: &str) -> Result<Option<String>, GatewayError> {
        match fs::read_to_string(self.value_path(key)?) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_value(&self, key: &str, value: &serde_json::Value) -> Result<(), GatewayError> {
        let target = self.value_path(key)?;

        let bytes = serde_json::to_vec(value)?;
        let mut tmp = NamedTempFile::new_in(&self.path)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;

        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Keys become file names, so only a conservative character set is allowed.
fn validate_key(key: &str) -> Result<(), GatewayError> {
    if key.is_empty() {
        return Err(GatewayError::InvalidKey("empty key".into()));
    }
    let safe = key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !safe || key.starts_with('.') {
        return Err(GatewayError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_store_and_retrieve() {
        let dir = TempDir::new().unwrap();
        let gateway = FileGateway::new(dir.path().join("storage")).unwrap();

        gateway.set_value("AppStateKey", &json!({"message": "hi"})).unwrap();

        let raw = gateway.get_string("AppStateKey").unwrap().unwrap();
        assert_eq!(raw, r#"{"message":"hi"}"#);
        assert!(dir.path().join("storage/AppStateKey.json").exists());
    }

    #[test]
    fn test_missing_key_is_none() {
        let dir = TempDir::new().unwrap();
        let gateway = FileGateway::new(dir.path()).unwrap();

        assert!(gateway.get_string("absent").unwrap().is_none());
    }

    #[test]
    fn test_overwrite() {
        let dir = TempDir::new().unwrap();
        let gateway = FileGateway::new(dir.path()).unwrap();

        gateway.set_value("k", &json!(1)).unwrap();
        gateway.set_value("k", &json!(2)).unwrap();

        assert_eq!(gateway.get_string("k").unwrap().as_deref(), Some("2"));

        // Only the value file remains; no temporaries are left behind.
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_concurrent_writers_never_publish_partial_values() {
        let dir = TempDir::new().unwrap();
        let gateway = FileGateway::new(dir.path()).unwrap();

        let large = |tag: &str| json!({"tag": tag, "payload": "x".repeat(200 * 1024)});
        gateway.set_value("k", &large("seed")).unwrap();

        let rounds = 50;
        let (write_failures, unparseable_reads) = std::thread::scope(|scope| {
            let writers: Vec<_> = ["a", "b"]
                .into_iter()
                .map(|tag| {
                    let gateway = &gateway;
                    let value = large(tag);
                    scope.spawn(move || {
                        (0..rounds)
                            .filter(|_| gateway.set_value("k", &value).is_err())
                            .count()
                    })
                })
                .collect();

            let mut unparseable = 0;
            while !writers.iter().all(|w| w.is_finished()) {
                let raw = gateway.get_string("k").unwrap().unwrap();
                if serde_json::from_str::<serde_json::Value>(&raw).is_err() {
                    unparseable += 1;
                }
            }

            let failures: usize = writers.into_iter().map(|w| w.join().unwrap()).sum();
            (failures, unparseable)
        });

        assert_eq!(write_failures, 0);
        assert_eq!(unparseable_reads, 0);

        let raw = gateway.get_string("k").unwrap().unwrap();
        let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(stored["tag"] == "a" || stored["tag"] == "b");
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let gateway = FileGateway::new(dir.path()).unwrap();

        gateway.set_value("k", &json!(true)).unwrap();
        assert!(gateway.remove("k").unwrap());
        assert!(!gateway.remove("k").unwrap());
        assert!(gateway.get_string("k").unwrap().is_none());
    }

    #[test]
    fn test_rejects_unsafe_keys() {
        let dir = TempDir::new().unwrap();
        let gateway = FileGateway::new(dir.path()).unwrap();

        for key in ["", "../escape", "a/b", ".hidden"] {
            assert!(
                matches!(gateway.get_string(key), Err(GatewayError::InvalidKey(_))),
                "key {:?} should be rejected",
                key
            );
        }
    }
}
