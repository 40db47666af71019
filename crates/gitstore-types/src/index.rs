//! The staging index document.
//!
//! The storage engine persists this value whole and never looks inside it.
//! The shape is owned by the VCS client; it lives here only so callers and
//! backends agree on one serializable type.

use serde::{Deserialize, Serialize};

use crate::hash::ObjectHash;

/// Index format version written when nothing has been stored yet.
pub const DEFAULT_INDEX_VERSION: u32 = 2;

/// File mode recorded for an index entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileMode {
    /// Normal file (0o100644).
    Regular,
    /// Executable file (0o100755).
    Executable,
    /// Symbolic link (0o120000).
    Symlink,
    /// Submodule commit (0o160000).
    Submodule,
}

impl FileMode {
    pub fn mode_bits(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Submodule => 0o160000,
        }
    }

    pub fn from_mode_bits(bits: u32) -> Option<Self> {
        match bits {
            0o100644 => Some(Self::Regular),
            0o100755 => Some(Self::Executable),
            0o120000 => Some(Self::Symlink),
            0o160000 => Some(Self::Submodule),
            _ => None,
        }
    }
}

/// A tracked path in the staging index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Path relative to the worktree root.
    pub name: String,
    /// Blob hash of the staged content.
    pub hash: ObjectHash,
    pub mode: FileMode,
    pub size: u32,
    /// Merge stage (0 when not conflicted).
    #[serde(default)]
    pub stage: u8,
    #[serde(default)]
    pub skip_worktree: bool,
    #[serde(default)]
    pub intent_to_add: bool,
}

impl IndexEntry {
    pub fn new(name: impl Into<String>, hash: ObjectHash, mode: FileMode, size: u32) -> Self {
        Self {
            name: name.into(),
            hash,
            mode,
            size,
            stage: 0,
            skip_worktree: false,
            intent_to_add: false,
        }
    }
}

/// The staging index: version plus entries kept sorted by path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub version: u32,
    pub entries: Vec<IndexEntry>,
    /// Hash of the tree last written from this index, if still valid.
    #[serde(default)]
    pub cache_tree: Option<ObjectHash>,
}

impl Default for Index {
    fn default() -> Self {
        Self {
            version: DEFAULT_INDEX_VERSION,
            entries: Vec::new(),
            cache_tree: None,
        }
    }
}

impl Index {
    /// Insert or replace the entry for `entry.name`, keeping entries sorted.
    pub fn upsert(&mut self, entry: IndexEntry) {
        match self
            .entries
            .binary_search_by(|e| e.name.as_str().cmp(entry.name.as_str()))
        {
            Ok(pos) => self.entries[pos] = entry,
            Err(pos) => self.entries.insert(pos, entry),
        }
        self.cache_tree = None;
    }

    /// Remove the entry at `name`, returning it if present.
    pub fn remove(&mut self, name: &str) -> Option<IndexEntry> {
        let pos = self
            .entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()?;
        self.cache_tree = None;
        Some(self.entries.remove(pos))
    }

    pub fn entry(&self, name: &str) -> Option<&IndexEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|pos| &self.entries[pos])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> IndexEntry {
        IndexEntry::new(name, ObjectHash::from_raw([1; 20]), FileMode::Regular, 3)
    }

    #[test]
    fn default_is_empty_version_two() {
        let idx = Index::default();
        assert_eq!(idx.version, 2);
        assert!(idx.is_empty());
        assert!(idx.cache_tree.is_none());
    }

    #[test]
    fn upsert_keeps_sorted_and_replaces() {
        let mut idx = Index::default();
        idx.upsert(entry("zebra.txt"));
        idx.upsert(entry("alpha.txt"));
        idx.upsert(entry("middle/file.rs"));
        let names: Vec<&str> = idx.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["alpha.txt", "middle/file.rs", "zebra.txt"]);

        let mut replacement = entry("alpha.txt");
        replacement.size = 99;
        idx.upsert(replacement);
        assert_eq!(idx.len(), 3);
        assert_eq!(idx.entry("alpha.txt").unwrap().size, 99);
    }

    #[test]
    fn remove_invalidates_cache_tree() {
        let mut idx = Index::default();
        idx.upsert(entry("a"));
        idx.cache_tree = Some(ObjectHash::from_raw([9; 20]));
        assert!(idx.remove("a").is_some());
        assert!(idx.remove("a").is_none());
        assert!(idx.cache_tree.is_none());
    }

    #[test]
    fn mode_bits_roundtrip() {
        for mode in [
            FileMode::Regular,
            FileMode::Executable,
            FileMode::Symlink,
            FileMode::Submodule,
        ] {
            assert_eq!(FileMode::from_mode_bits(mode.mode_bits()), Some(mode));
        }
        assert!(FileMode::from_mode_bits(0o777).is_none());
    }

    #[test]
    fn json_document_tolerates_missing_optional_fields() {
        let json = r#"{"version":3,"entries":[{"name":"a","hash":"0101010101010101010101010101010101010101","mode":"Regular","size":1}]}"#;
        let idx: Index = serde_json::from_str(json).unwrap();
        assert_eq!(idx.version, 3);
        assert_eq!(idx.entries[0].stage, 0);
        assert!(idx.cache_tree.is_none());
    }
}
