//! Key-value persistence gateway and its in-memory implementation.

use crate::error::GatewayError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Key-value store the container persists snapshots into.
///
/// Values are written as JSON and read back as raw strings. Implementations
/// are shared between the container and its persist worker.
pub trait PersistenceGateway: Send + Sync {
    /// Raw stored string for `key`, or `None` when nothing is stored.
    fn get_string(&self, key: &str) -> Result<Option<String>, GatewayError>;

    /// Serialize `value` and store it under `key`, replacing any previous value.
    fn set_value(&self, key: &str, value: &serde_json::Value) -> Result<(), GatewayError>;
}

/// Process-local gateway backed by a map.
///
/// Can be told to fail reads or writes, which makes it the gateway of
/// choice for exercising error paths.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    entries: Mutex<HashMap<String, String>>,
    writes: AtomicU64,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw string without going through serialization.
    pub fn insert_raw(&self, key: impl Into<String>, raw: impl Into<String>) {
        self.entries.lock().insert(key.into(), raw.into());
    }

    /// The raw string currently stored under `key`.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    /// Number of successful `set_value` calls.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl PersistenceGateway for MemoryGateway {
    fn get_string(&self, key: &str) -> Result<Option<String>, GatewayError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(GatewayError::Backend(format!("read of '{}' rejected", key)));
        }
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set_value(&self, key: &str, value: &serde_json::Value) -> Result<(), GatewayError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(GatewayError::Backend(format!("write of '{}' rejected", key)));
        }
        let raw = serde_json::to_string(value)?;
        self.entries.lock().insert(key.to_string(), raw);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
