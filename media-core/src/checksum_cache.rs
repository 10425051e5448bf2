//! Memoized checksums keyed by (system, filename).
//!
//! Short images may carry a checksum that was computed in an earlier session
//! or supplied out-of-band. The cache is a JSON file:
//!
//! ```json
//! { "systems": { "nes": { "smb.nes": { "length": 40976, "crc": 1072525322 } } } }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MediaResult;

/// A remembered checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedChecksum {
    pub length: u64,
    pub crc: u32,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ChecksumCache {
    #[serde(default)]
    systems: BTreeMap<String, BTreeMap<String, CachedChecksum>>,
    #[serde(skip)]
    dirty: bool,
}

impl ChecksumCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`. A missing file yields an empty cache.
    pub fn load(path: &Path) -> MediaResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let text = std::fs::read_to_string(path)?;
        let cache = serde_json::from_str(&text)?;
        Ok(cache)
    }

    /// Write to `path` if anything changed since loading.
    pub fn save(&mut self, path: &Path) -> MediaResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        self.dirty = false;
        Ok(())
    }

    pub fn lookup(&self, system: &str, filename: &str) -> Option<CachedChecksum> {
        self.systems.get(system)?.get(filename).copied()
    }

    pub fn remember(&mut self, system: &str, filename: &str, entry: CachedChecksum) {
        let previous = self
            .systems
            .entry(system.to_string())
            .or_default()
            .insert(filename.to_string(), entry);
        if previous != Some(entry) {
            self.dirty = true;
        }
    }

    pub fn forget(&mut self, system: &str, filename: &str) -> bool {
        let removed = self
            .systems
            .get_mut(system)
            .and_then(|files| files.remove(filename))
            .is_some();
        self.dirty |= removed;
        removed
    }

    pub fn len(&self) -> usize {
        self.systems.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}
