//! Durable storage for the last processed [`EventCursor`].
//!
//! The transport loads the cursor at every connect; the
//! [`EventReceiver`](crate::EventReceiver) saves it once the consumer has
//! handled the event. Storage is injected through the
//! [`CursorStore`] trait so the client stays portable and testable:
//!
//! - [`MemoryCursorStore`]: process-local, lost on restart (tests, ephemeral clients)
//! - [`FileCursorStore`]: one key in a small JSON file, survives restarts

use crate::cursor::EventCursor;
use crate::error::{LinkError, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default storage key for the stream cursor.
pub const DEFAULT_CURSOR_KEY: &str = "skyclust.sse.last_event_id";

/// Key-value access to the persisted cursor.
///
/// `load` must tolerate an empty store (first run) by returning `Ok(None)`.
pub trait CursorStore: Send + Sync {
    fn load(&self) -> Result<Option<EventCursor>>;
    fn save(&self, cursor: &EventCursor) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// In-memory cursor store.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursor: Mutex<Option<EventCursor>>,
    saves: Mutex<u64>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cursor(cursor: EventCursor) -> Self {
        Self {
            cursor: Mutex::new(Some(cursor)),
            saves: Mutex::new(0),
        }
    }

    /// Number of successful `save` calls (diagnostics).
    pub fn save_count(&self) -> u64 {
        *self.saves.lock()
    }
}

impl CursorStore for MemoryCursorStore {
    fn load(&self) -> Result<Option<EventCursor>> {
        Ok(self.cursor.lock().clone())
    }

    fn save(&self, cursor: &EventCursor) -> Result<()> {
        *self.cursor.lock() = Some(cursor.clone());
        *self.saves.lock() += 1;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.cursor.lock() = None;
        Ok(())
    }
}

/// File-backed cursor store.
///
/// The file holds a flat JSON object so several clients can share one state
/// file under different keys. Writes go through a temp file + rename.
#[derive(Debug)]
pub struct FileCursorStore {
    path: PathBuf,
    key: String,
    lock: Mutex<()>,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_key(path, DEFAULT_CURSOR_KEY)
    }

    pub fn with_key(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// File contents; `None` when missing or blank.
    fn read_raw(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(None),
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn parse_map(&self, raw: &str) -> Result<BTreeMap<String, String>> {
        serde_json::from_str(raw).map_err(|e| {
            LinkError::CursorStoreError(format!(
                "Corrupt cursor file {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>> {
        match self.read_raw()? {
            Some(raw) => self.parse_map(&raw),
            None => Ok(BTreeMap::new()),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(map)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl CursorStore for FileCursorStore {
    fn load(&self) -> Result<Option<EventCursor>> {
        let _guard = self.lock.lock();
        let map = self.read_map()?;
        Ok(map.get(&self.key).and_then(|v| EventCursor::from_field(v)))
    }

    /// A corrupt file is replaced rather than left to fail every later save.
    fn save(&self, cursor: &EventCursor) -> Result<()> {
        let _guard = self.lock.lock();
        let mut map = match self.read_raw()? {
            Some(raw) => self.parse_map(&raw).unwrap_or_else(|e| {
                log::warn!("[skyclust-link] {}; rewriting it", e);
                BTreeMap::new()
            }),
            None => BTreeMap::new(),
        };
        map.insert(self.key.clone(), cursor.as_str().to_string());
        self.write_map(&map)
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock();
        let mut map = self.read_map()?;
        if map.remove(&self.key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}
