//! The staging index: a sorted, persistent manifest of tracked paths.
//!
//! Entries are kept strictly increasing under the (name bytes, stage) key.
//! The on-disk format is the version-2 wire layout with a trailing digest;
//! updates are atomic through the lockfile + rename protocol.

pub mod entry;
mod read;
mod refresh;
mod write;

use std::cmp::Ordering;
use std::path::Path;

use bstr::{BStr, BString, ByteSlice};
use grit_hash::ObjectId;

pub use entry::{IndexEntry, StatData, StatOptions};
pub use refresh::{RefreshIssue, RefreshOptions, RefreshOutcome};

/// Errors from index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("invalid index header: {0}")]
    InvalidHeader(String),

    #[error("unsupported index version: {0}")]
    UnsupportedVersion(u32),

    #[error("index digest mismatch")]
    DigestMismatch,

    #[error("index entries out of order at entry {0}")]
    OutOfOrder(usize),

    #[error("invalid index entry at offset {offset}: {reason}")]
    InvalidEntry { offset: usize, reason: String },

    #[error("invalid path: {0}")]
    InvalidPath(BString),

    #[error("cannot add {0}: not allowed by policy")]
    AddRefused(BString),

    #[error("'{0}' collides with an existing entry")]
    Collision(BString),

    #[error("index is locked by another process")]
    Busy,

    #[error(transparent)]
    Lock(grit_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Merge stage of an index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Resolved (stage 0).
    Normal,
    /// Common ancestor in a conflict (stage 1).
    Base,
    /// Our side (stage 2).
    Ours,
    /// Their side (stage 3).
    Theirs,
}

impl Stage {
    pub fn as_u8(&self) -> u8 {
        match self {
            Stage::Normal => 0,
            Stage::Base => 1,
            Stage::Ours => 2,
            Stage::Theirs => 3,
        }
    }

    pub fn from_u8(n: u8) -> Option<Self> {
        match n {
            0 => Some(Stage::Normal),
            1 => Some(Stage::Base),
            2 => Some(Stage::Ours),
            3 => Some(Stage::Theirs),
            _ => None,
        }
    }
}

/// Insertion policy for [`Index::insert`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InsertPolicy {
    /// A brand-new path may be added.
    pub ok_to_add: bool,
    /// Colliding file/directory entries are removed to make room.
    pub ok_to_replace: bool,
}

impl InsertPolicy {
    pub const ADD: Self = Self {
        ok_to_add: true,
        ok_to_replace: false,
    };
    pub const ADD_REPLACE: Self = Self {
        ok_to_add: true,
        ok_to_replace: true,
    };
}

/// The in-memory index: entries sorted by (name, stage).
#[derive(Default)]
pub struct Index {
    entries: Vec<IndexEntry>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a file. A missing file is an empty index.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        read::load(path.as_ref())
    }

    /// Save atomically: write `<path>.lock`, then rename over `<path>`.
    /// A held lock means another writer; the caller sees `Busy`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IndexError> {
        write::save(self, path.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter()
    }

    /// Binary search on the (name, stage) key: the position when present,
    /// the insertion point when not.
    pub fn find(&self, name: &BStr, stage: Stage) -> Result<usize, usize> {
        let key = (name.as_bytes(), stage.as_u8());
        self.entries.binary_search_by(|e| cmp_key(e.key(), key))
    }

    /// Get an entry by name and stage.
    pub fn get(&self, name: &BStr, stage: Stage) -> Option<&IndexEntry> {
        self.find(name, stage).ok().map(|pos| &self.entries[pos])
    }

    /// Insert or replace an entry, maintaining sort order and the
    /// file-versus-directory exclusion.
    ///
    /// An exact (name, stage) match is replaced in place. Inserting a
    /// stage-0 entry removes every other stage of the same name. A new
    /// path needs `ok_to_add`; colliding entries ("a" vs "a/b" at the same
    /// stage) are refused unless `ok_to_replace` removes them first.
    pub fn insert(&mut self, entry: IndexEntry, policy: InsertPolicy) -> Result<(), IndexError> {
        if !grit_utils::path::verify_path(entry.path.as_bstr()) {
            return Err(IndexError::InvalidPath(entry.path));
        }

        let mut pos = match self.find(entry.path.as_bstr(), entry.stage) {
            Ok(pos) => {
                self.entries[pos] = entry;
                return Ok(());
            }
            Err(pos) => pos,
        };

        let mut ok_to_add = policy.ok_to_add;

        // A resolved entry supersedes every conflict stage of its name.
        if entry.stage == Stage::Normal {
            // Equal-stage keys sort adjacent; stage 0 sits first, so the
            // other stages of this name start at the insertion point.
            while pos < self.entries.len() && self.entries[pos].path == entry.path {
                self.entries.remove(pos);
                ok_to_add = true;
            }
        }

        let colliding = self.collisions(&entry);
        if !colliding.is_empty() {
            if !policy.ok_to_replace {
                return Err(IndexError::Collision(entry.path));
            }
            for ix in colliding.into_iter().rev() {
                self.entries.remove(ix);
            }
            // Removals moved things around; re-derive the insertion point.
            pos = match self.find(entry.path.as_bstr(), entry.stage) {
                Ok(_) => unreachable!("colliding entries were just removed"),
                Err(pos) => pos,
            };
            ok_to_add = true;
        }

        if !ok_to_add {
            return Err(IndexError::AddRefused(entry.path));
        }

        self.entries.insert(pos, entry);
        Ok(())
    }

    /// Remove every stage of `name`. Returns true if anything went.
    pub fn remove(&mut self, name: &BStr) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.path.as_bstr() != name);
        self.entries.len() < before
    }

    /// Entries that exclude `entry` by the file/directory rule, at the
    /// same stage: any leading directory of the new path tracked as a
    /// file, or any tracked file under the new path taken as a directory.
    fn collisions(&self, entry: &IndexEntry) -> Vec<usize> {
        let mut found = Vec::new();
        let path: &[u8] = entry.path.as_ref();

        // "a/b/c" is blocked by "a" or "a/b" at the same stage.
        for (ix, slash) in path.iter().enumerate() {
            if *slash != b'/' {
                continue;
            }
            if let Ok(pos) = self.find(BStr::new(&path[..ix]), entry.stage) {
                found.push(pos);
            }
        }

        // "a" is blocked by any "a/..." at the same stage.
        let mut prefix = BString::from(entry.path.clone());
        prefix.push(b'/');
        let start = match self.find(prefix.as_bstr(), Stage::Normal) {
            Ok(pos) | Err(pos) => pos,
        };
        for (ix, e) in self.entries.iter().enumerate().skip(start) {
            if !e.path.starts_with(&prefix) {
                break;
            }
            if e.stage == entry.stage {
                found.push(ix);
            }
        }

        found.sort_unstable();
        found
    }

    /// Does any entry of this name carry a conflict stage?
    pub fn has_conflict(&self, name: &BStr) -> bool {
        let start = match self.find(name, Stage::Normal) {
            Ok(pos) | Err(pos) => pos,
        };
        self.entries[start..]
            .iter()
            .take_while(|e| e.path.as_bstr() == name)
            .any(|e| e.stage != Stage::Normal)
    }

    /// Check strict (name, stage) ordering; the first offender's position
    /// is reported.
    pub fn check_order(&self) -> Result<(), IndexError> {
        for (ix, pair) in self.entries.windows(2).enumerate() {
            if cmp_key(pair[0].key(), pair[1].key()) != Ordering::Less {
                return Err(IndexError::OutOfOrder(ix + 1));
            }
        }
        Ok(())
    }

    /// The digest of each stage-0 entry, for reachability roots.
    pub fn stage0_oids(&self) -> Vec<ObjectId> {
        self.entries
            .iter()
            .filter(|e| e.stage == Stage::Normal)
            .map(|e| e.oid)
            .collect()
    }

    pub(crate) fn entries_mut(&mut self) -> &mut Vec<IndexEntry> {
        &mut self.entries
    }
}

fn cmp_key(a: (&[u8], u8), b: (&[u8], u8)) -> Ordering {
    a.0.cmp(b.0).then(a.1.cmp(&b.1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use grit_object::FileMode;

    pub(crate) fn entry(path: &str, stage: Stage) -> IndexEntry {
        IndexEntry {
            path: BString::from(path),
            oid: ObjectId::NULL,
            mode: FileMode::Regular,
            stage,
            stat: StatData::default(),
            needs_update: false,
        }
    }

    #[test]
    fn insert_keeps_sorted_order() {
        let mut index = Index::new();
        for name in ["zebra", "alpha", "m/n", "m-n", "m"] {
            index
                .insert(entry(name, Stage::Normal), InsertPolicy::ADD)
                .unwrap();
        }
        index.check_order().unwrap();
        let names: Vec<_> = index.iter().map(|e| e.path.to_string()).collect();
        // Plain byte order on names: '-' < '/' so "m-n" before "m/n".
        assert_eq!(names, vec!["alpha", "m", "m-n", "m/n", "zebra"]);
    }

    #[test]
    fn exact_match_replaces_in_place() {
        let mut index = Index::new();
        index
            .insert(entry("file", Stage::Normal), InsertPolicy::ADD)
            .unwrap();
        let mut updated = entry("file", Stage::Normal);
        updated.mode = FileMode::Executable;
        // Replacement needs no policy bits at all.
        index.insert(updated, InsertPolicy::default()).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.entries()[0].mode, FileMode::Executable);
    }

    #[test]
    fn new_path_needs_ok_to_add() {
        let mut index = Index::new();
        assert!(matches!(
            index.insert(entry("file", Stage::Normal), InsertPolicy::default()),
            Err(IndexError::AddRefused(_))
        ));
    }

    #[test]
    fn stage0_supersedes_conflict_stages() {
        let mut index = Index::new();
        for stage in [Stage::Base, Stage::Ours, Stage::Theirs] {
            index.insert(entry("conflicted", stage), InsertPolicy::ADD).unwrap();
        }
        assert!(index.has_conflict(BStr::new("conflicted")));

        // The resolved entry may land even without ok_to_add: it replaces.
        index
            .insert(entry("conflicted", Stage::Normal), InsertPolicy::default())
            .unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.entries()[0].stage, Stage::Normal);
        assert!(!index.has_conflict(BStr::new("conflicted")));
    }

    #[test]
    fn file_blocks_directory() {
        let mut index = Index::new();
        index.insert(entry("a", Stage::Normal), InsertPolicy::ADD).unwrap();
        assert!(matches!(
            index.insert(entry("a/b", Stage::Normal), InsertPolicy::ADD),
            Err(IndexError::Collision(_))
        ));

        index
            .insert(entry("a/b", Stage::Normal), InsertPolicy::ADD_REPLACE)
            .unwrap();
        assert!(index.get(BStr::new("a"), Stage::Normal).is_none());
        assert!(index.get(BStr::new("a/b"), Stage::Normal).is_some());
    }

    #[test]
    fn directory_blocks_file() {
        let mut index = Index::new();
        index.insert(entry("d/x", Stage::Normal), InsertPolicy::ADD).unwrap();
        index.insert(entry("d/y", Stage::Normal), InsertPolicy::ADD).unwrap();
        assert!(matches!(
            index.insert(entry("d", Stage::Normal), InsertPolicy::ADD),
            Err(IndexError::Collision(_))
        ));

        index
            .insert(entry("d", Stage::Normal), InsertPolicy::ADD_REPLACE)
            .unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.get(BStr::new("d"), Stage::Normal).is_some());
    }

    #[test]
    fn sibling_prefix_is_not_a_collision() {
        let mut index = Index::new();
        index.insert(entry("ab", Stage::Normal), InsertPolicy::ADD).unwrap();
        // "ab" does not block "ab.c" or "a".
        index.insert(entry("ab.c", Stage::Normal), InsertPolicy::ADD).unwrap();
        index.insert(entry("a", Stage::Normal), InsertPolicy::ADD).unwrap();
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn remove_takes_all_stages() {
        let mut index = Index::new();
        for stage in [Stage::Base, Stage::Ours] {
            index.insert(entry("gone", stage), InsertPolicy::ADD).unwrap();
        }
        index.insert(entry("stays", Stage::Normal), InsertPolicy::ADD).unwrap();

        assert!(index.remove(BStr::new("gone")));
        assert!(!index.remove(BStr::new("gone")));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn find_reports_insertion_point() {
        let mut index = Index::new();
        index.insert(entry("b", Stage::Normal), InsertPolicy::ADD).unwrap();
        assert_eq!(index.find(BStr::new("a"), Stage::Normal), Err(0));
        assert_eq!(index.find(BStr::new("b"), Stage::Normal), Ok(0));
        assert_eq!(index.find(BStr::new("c"), Stage::Normal), Err(1));
    }

    #[test]
    fn rejects_unacceptable_paths() {
        let mut index = Index::new();
        for bad in ["", "/abs", "a//b", "a/../b", ".git/config", "dir/"] {
            assert!(matches!(
                index.insert(entry(bad, Stage::Normal), InsertPolicy::ADD),
                Err(IndexError::InvalidPath(_))
            ));
        }
    }
}
