//! Persistent cache for LLM naming suggestions
//!
//! Keyed by `registry:schemaName`. Cache hits are free: they count against
//! neither the cost ceiling nor the LLM rate budget. The file format carries
//! a version field for forward evolution.

use crate::error::{MigrateError, MigrateResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Cache file format version
pub const CACHE_VERSION: u32 = 1;

/// A naming suggestion produced by the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameSuggestion {
    pub original_name: String,
    pub suggested_name: String,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    suggestion: NameSuggestion,
    #[serde(default)]
    model: String,
    cached_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: HashMap<String, CacheEntry>,
}

/// Thread-safe suggestion cache; many readers, one writer
pub struct SuggestionCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    modified: RwLock<bool>,
}

impl SuggestionCache {
    /// An empty, in-memory cache
    pub fn empty() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            modified: RwLock::new(false),
        }
    }

    /// Load a cache from disk; a missing file yields an empty cache
    pub fn load(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let path = path.as_ref();
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::empty()),
            Err(e) => return Err(e.into()),
        };

        let file: CacheFile = serde_json::from_str(&data).map_err(|e| {
            MigrateError::Serialization(format!("corrupt LLM cache {}: {e}", path.display()))
        })?;

        debug!(path = %path.display(), entries = file.entries.len(), "LLM cache loaded");
        Ok(Self {
            entries: RwLock::new(file.entries),
            modified: RwLock::new(false),
        })
    }

    pub fn get(&self, key: &str) -> Option<NameSuggestion> {
        self.entries.read().get(key).map(|e| e.suggestion.clone())
    }

    pub fn insert(&self, key: impl Into<String>, suggestion: NameSuggestion, model: &str) {
        self.entries.write().insert(
            key.into(),
            CacheEntry {
                suggestion,
                model: model.to_string(),
                cached_at: Utc::now(),
            },
        );
        *self.modified.write() = true;
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Persist to disk; skipped when nothing changed since the last save
    pub fn save(&self, path: impl AsRef<Path>) -> MigrateResult<()> {
        if !*self.modified.read() {
            return Ok(());
        }

        let file = CacheFile {
            version: CACHE_VERSION,
            entries: self.entries.read().clone(),
        };
        let data = serde_json::to_vec_pretty(&file)?;
        std::fs::write(path.as_ref(), data)?;
        *self.modified.write() = false;
        Ok(())
    }
}
