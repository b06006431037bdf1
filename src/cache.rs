//! File-based cache for analysis results.
//!
//! One JSON file per analyzed source, named by a digest of its absolute
//! path, stored in the platform cache directory (`results` subdir) unless
//! settings name another. An entry is reused only while the source is
//! unchanged and no plugin vetoes it.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::detect::Diagnostic;
use crate::plugin::PluginRegistry;

/// A persisted analysis result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Seconds since the epoch when the entry was written.
    pub timestamp: f64,
    /// Hex digest of the source bytes.
    pub file_hash: String,
    pub errors: Vec<Diagnostic>,
}

/// In-memory + file-based result cache.
#[derive(Debug)]
pub struct ResultCache {
    dir: Option<PathBuf>,
    memory: RwLock<HashMap<String, CacheEntry>>,
    /// Serializes writers in this process.
    write_lock: Mutex<()>,
}

impl ResultCache {
    /// Open a cache rooted at `dir`. `None`, or a directory that cannot
    /// be created, gives a cache that never hits.
    pub fn new(dir: Option<PathBuf>) -> Self {
        let dir = dir.and_then(|dir| match fs::create_dir_all(&dir) {
            Ok(()) => Some(dir),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "cannot create cache directory, caching disabled");
                None
            }
        });

        Self {
            dir,
            memory: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Stable key for a source path.
    pub fn key_for(path: &Path) -> String {
        let absolute = absolute_path(path);
        blake3::hash(absolute.to_string_lossy().as_bytes())
            .to_hex()
            .to_string()
    }

    /// Stored diagnostics for `path`, if the entry is still valid.
    pub fn get(&self, path: &Path, registry: &PluginRegistry) -> Option<Vec<Diagnostic>> {
        self.dir.as_ref()?;
        let key = Self::key_for(path);

        let cached = self.memory.read().ok().and_then(|m| m.get(&key).cloned());
        let entry = match cached {
            Some(entry) => entry,
            None => self.read_entry(&key)?,
        };

        let bytes = fs::read(path).ok()?;
        let modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .map(epoch_seconds)
            .ok()?;

        let fresh = entry.timestamp >= modified && entry.file_hash == content_hash(&bytes);
        if !fresh || !registry.run_cache_invalidate(path, &entry) {
            debug!(path = %path.display(), "cache entry stale");
            if let Ok(mut memory) = self.memory.write() {
                memory.remove(&key);
            }
            return None;
        }

        debug!(path = %path.display(), "cache hit");
        if let Ok(mut memory) = self.memory.write() {
            memory.insert(key, entry.clone());
        }
        Some(entry.errors)
    }

    /// Store diagnostics for `path`, replacing any earlier entry.
    ///
    /// Returns whether the entry reached disk.
    pub fn put(&self, path: &Path, diagnostics: &[Diagnostic]) -> bool {
        let Some(dir) = &self.dir else {
            return false;
        };
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot hash source for cache");
                return false;
            }
        };

        let key = Self::key_for(path);
        let entry = CacheEntry {
            timestamp: epoch_seconds(SystemTime::now()),
            file_hash: content_hash(&bytes),
            errors: diagnostics.to_vec(),
        };

        let written = {
            let _guard = self
                .write_lock
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            write_entry(&dir.join(format!("{}.json", key)), &entry)
        };
        if let Err(e) = written {
            warn!(path = %path.display(), error = %format!("{:#}", e), "cache write failed");
            return false;
        }

        if let Ok(mut memory) = self.memory.write() {
            memory.insert(key, entry);
        }
        true
    }

    /// Drop the entry for `path`.
    pub fn invalidate(&self, path: &Path) {
        let key = Self::key_for(path);
        if let Ok(mut memory) = self.memory.write() {
            memory.remove(&key);
        }
        if let Some(file) = self.entry_path(&key) {
            let _guard = self
                .write_lock
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let _ = fs::remove_file(file);
        }
    }

    /// Remove every entry. Returns how many files were deleted.
    pub fn clear(&self) -> anyhow::Result<usize> {
        if let Ok(mut memory) = self.memory.write() {
            memory.clear();
        }
        let Some(dir) = &self.dir else {
            return Ok(0);
        };

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut removed = 0;
        for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(format!("{}.json", key)))
    }

    fn read_entry(&self, key: &str) -> Option<CacheEntry> {
        let file = self.entry_path(key)?;
        let content = fs::read_to_string(&file).ok()?;
        match serde_json::from_str(&content) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(file = %file.display(), error = %e, "unreadable cache entry");
                None
            }
        }
    }
}

fn write_entry(file: &Path, entry: &CacheEntry) -> anyhow::Result<()> {
    let json = serde_json::to_string(entry)?;
    let tmp = file.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, file).with_context(|| format!("replacing {}", file.display()))?;
    Ok(())
}

/// Hex digest of file bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

fn absolute_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    })
}

fn epoch_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64()
}
