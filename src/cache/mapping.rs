//! JSON-file mapping cache implementation

use crate::integrations::IssueHandle;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current on-disk format version
const FORMAT_VERSION: u32 = 1;

/// On-disk layout of the cache file
#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    entries: BTreeMap<String, IssueHandle>,
}

/// Persistent task-identifier → issue-handle map
///
/// Entries are written through to disk on every change. A missing or
/// unreadable file loads as an empty cache.
#[derive(Debug)]
pub struct MappingCache {
    /// Backing file; `None` keeps the cache in memory only
    path: Option<PathBuf>,
    entries: BTreeMap<String, IssueHandle>,
    updated_at: Option<DateTime<Utc>>,
}

impl MappingCache {
    /// Default cache location (~/.cache/tjs/mapping.json)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".cache");
        path.push("tjs");
        path.push("mapping.json");
        path
    }

    /// Cache that is never persisted
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: BTreeMap::new(),
            updated_at: None,
        }
    }

    /// Load the cache stored at `path`
    ///
    /// Never fails: a missing file is a first run, a corrupt one is logged and
    /// treated the same way.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut cache = Self {
            path: Some(path.clone()),
            ..Self::in_memory()
        };

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No mapping cache yet, starting cold");
                return cache;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read mapping cache, starting cold");
                return cache;
            }
        };

        match serde_json::from_str::<CacheFile>(&content) {
            Ok(file) if file.version == FORMAT_VERSION => {
                tracing::debug!(
                    path = %path.display(),
                    entries = file.entries.len(),
                    "Loaded mapping cache"
                );
                cache.entries = file.entries;
                cache.updated_at = file.updated_at;
            }
            Ok(file) => {
                tracing::warn!(
                    path = %path.display(),
                    version = file.version,
                    "Unsupported mapping cache version, starting cold"
                );
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Corrupt mapping cache, starting cold");
            }
        }

        cache
    }

    /// Look up the issue mapped to a task identifier
    pub fn get(&self, identifier: &str) -> Option<&IssueHandle> {
        self.entries.get(identifier)
    }

    /// Record a mapping and persist immediately
    pub fn put(&mut self, identifier: impl Into<String>, handle: IssueHandle) -> Result<()> {
        let identifier = identifier.into();
        tracing::debug!(task = %identifier, issue = %handle.key, "Caching issue mapping");
        self.entries.insert(identifier, handle);
        self.save()
    }

    /// Drop every entry and persist immediately
    pub fn reset(&mut self) -> Result<()> {
        tracing::info!(entries = self.entries.len(), "Resetting mapping cache");
        self.entries.clear();
        self.save()
    }

    /// Write the whole mapping to disk
    ///
    /// Writes a temp file next to the target and renames it into place so a
    /// crash never leaves a half-written cache.
    pub fn save(&mut self) -> Result<()> {
        self.updated_at = Some(Utc::now());

        let Some(ref path) = self.path else {
            return Ok(());
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let file = CacheFile {
            version: FORMAT_VERSION,
            updated_at: self.updated_at,
            entries: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| e.error)?;

        tracing::trace!(path = %path.display(), entries = self.entries.len(), "Mapping cache saved");
        Ok(())
    }

    /// All entries, ordered by identifier
    pub fn entries(&self) -> impl Iterator<Item = (&String, &IssueHandle)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.entries.len(),
            updated_at: self.updated_at,
            path: self.path.clone(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entry_count: usize,
    pub updated_at: Option<DateTime<Utc>>,
    pub path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn handle(key: &str, id: &str) -> IssueHandle {
        IssueHandle::new(key, id)
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let cache = MappingCache::load(dir.path().join("missing.json"));
        assert!(cache.is_empty());
        assert!(cache.path().is_some());
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mapping.json");
        std::fs::write(&path, "{ not json").unwrap();

        let cache = MappingCache::load(&path);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_load_unknown_version_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mapping.json");
        std::fs::write(
            &path,
            r#"{"version": 99, "entries": {"1": {"key": "VS-1", "id": "10001"}}}"#,
        )
        .unwrap();

        assert!(MappingCache::load(&path).is_empty());
    }

    #[test]
    fn test_put_then_fresh_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("mapping.json");

        let mut cache = MappingCache::load(&path);
        cache.put("7", handle("VS-12", "10012")).unwrap();
        assert!(path.exists());

        let reloaded = MappingCache::load(&path);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("7"), Some(&handle("VS-12", "10012")));
        assert!(reloaded.stats().updated_at.is_some());
    }

    #[test]
    fn test_put_overwrites() {
        let mut cache = MappingCache::in_memory();
        cache.put("7", handle("VS-1", "1")).unwrap();
        cache.put("7", handle("VS-2", "2")).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("7").unwrap().key, "VS-2");
    }

    #[test]
    fn test_reset_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mapping.json");

        let mut cache = MappingCache::load(&path);
        cache.put("1", handle("VS-1", "1")).unwrap();
        cache.put("2", handle("VS-2", "2")).unwrap();
        cache.reset().unwrap();
        assert!(cache.is_empty());

        assert!(MappingCache::load(&path).is_empty());
    }

    #[test]
    fn test_in_memory_never_touches_disk() {
        let mut cache = MappingCache::in_memory();
        cache.put("1", handle("VS-1", "1")).unwrap();
        assert!(cache.path().is_none());
        assert_eq!(cache.stats().entry_count, 1);
    }

    #[test]
    fn test_entries_ordered() {
        let mut cache = MappingCache::in_memory();
        cache.put("b", handle("VS-2", "2")).unwrap();
        cache.put("a", handle("VS-1", "1")).unwrap();
        let keys: Vec<_> = cache.entries().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_default_path() {
        assert!(MappingCache::default_path().ends_with(".cache/tjs/mapping.json"));
    }
}
