//! Refreshing the stat cache against the working tree.

use std::path::{Path, PathBuf};

use bstr::{BString, ByteSlice};
use grit_hash::Hasher;

use crate::entry::{self, StatOptions, DATA_CHANGED, MODE_CHANGED, TYPE_CHANGED};
use crate::{Index, IndexError, Stage};

/// Refresh behavior switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshOptions {
    /// Do not report entries whose working file has vanished.
    pub ignore_missing: bool,
    /// Stat comparison switches.
    pub stat: StatOptions,
}

/// What refresh concluded about one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The working file is gone.
    Missing,
    /// Content, type, or mode differs; the entry is marked and the stat
    /// cache left alone.
    NeedsUpdate,
}

/// One reported entry.
#[derive(Debug, Clone)]
pub struct RefreshIssue {
    pub path: BString,
    pub outcome: RefreshOutcome,
}

impl Index {
    /// Re-stat every stage-0 entry against the working tree under `root`.
    ///
    /// Entries whose stat fields drifted but whose content digests still
    /// match are rewritten in place with the fresh stat cache. Entries
    /// whose content, type, or mode changed are marked `needs_update` and
    /// reported; vanished files are reported unless `ignore_missing`.
    /// Conflict stages are never refreshed.
    pub fn refresh(
        &mut self,
        root: impl AsRef<Path>,
        opts: RefreshOptions,
    ) -> Result<Vec<RefreshIssue>, IndexError> {
        let root = root.as_ref();
        let mut issues = Vec::new();

        for entry in self.entries_mut().iter_mut() {
            if entry.stage != Stage::Normal || entry.mode.is_gitlink() {
                continue;
            }

            let file_path = join_tracked(root, entry.path.as_bstr());
            let meta = match std::fs::symlink_metadata(&file_path) {
                Ok(meta) => meta,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    if !opts.ignore_missing {
                        issues.push(RefreshIssue {
                            path: entry.path.clone(),
                            outcome: RefreshOutcome::Missing,
                        });
                    }
                    continue;
                }
                Err(e) => return Err(IndexError::Io(e)),
            };

            let changed = entry::changes(entry.mode, &entry.stat, &meta, opts.stat);
            if changed == 0 {
                continue;
            }

            // A type or mode flip can never refresh clean.
            if changed & (TYPE_CHANGED | MODE_CHANGED) != 0 {
                entry.needs_update = true;
                issues.push(RefreshIssue {
                    path: entry.path.clone(),
                    outcome: RefreshOutcome::NeedsUpdate,
                });
                continue;
            }

            // Stat drift: only believable if the content still matches.
            let same = match working_digest(&file_path, &meta) {
                Some(digest) => digest == entry.oid,
                None => false,
            };
            if same && changed & DATA_CHANGED == 0 {
                entry.stat = crate::StatData::from_metadata(&meta);
            } else {
                entry.needs_update = true;
                issues.push(RefreshIssue {
                    path: entry.path.clone(),
                    outcome: RefreshOutcome::NeedsUpdate,
                });
            }
        }

        Ok(issues)
    }
}

/// Digest the working-tree content the way it would be staged (symlinks
/// hash their target).
fn working_digest(path: &Path, meta: &std::fs::Metadata) -> Option<grit_hash::ObjectId> {
    let content = if meta.file_type().is_symlink() {
        std::fs::read_link(path)
            .ok()?
            .into_os_string()
            .into_encoded_bytes()
    } else {
        std::fs::read(path).ok()?
    };
    Some(Hasher::digest_object("blob", &content))
}

/// Join a byte path onto the root.
pub(crate) fn join_tracked(root: &Path, tracked: &bstr::BStr) -> PathBuf {
    let mut path = root.to_path_buf();
    for component in tracked.split_str(b"/") {
        path.push(String::from_utf8_lossy(component).into_owned());
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::entry;
    use crate::InsertPolicy;
    use grit_object::FileMode;

    fn stage_file(
        index: &mut Index,
        root: &Path,
        name: &str,
        content: &[u8],
    ) -> grit_hash::ObjectId {
        let path = root.join(name);
        std::fs::write(&path, content).unwrap();
        let meta = std::fs::metadata(&path).unwrap();

        let mut e = entry(name, Stage::Normal);
        e.oid = Hasher::digest_object("blob", content);
        e.stat = crate::StatData::from_metadata(&meta);
        e.mode = FileMode::Regular;
        let oid = e.oid;
        index.insert(e, InsertPolicy::ADD).unwrap();
        oid
    }

    #[test]
    fn clean_tree_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = Index::new();
        stage_file(&mut index, dir.path(), "file", b"content\n");

        let issues = index.refresh(dir.path(), RefreshOptions::default()).unwrap();
        assert!(issues.is_empty());
    }

    #[test]
    fn touched_file_refreshes_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = Index::new();
        stage_file(&mut index, dir.path(), "file", b"content\n");

        // Same bytes, different mtime.
        let mut stale = index.entries()[0].stat;
        stale.mtime_secs = stale.mtime_secs.wrapping_sub(100);
        index.entries_mut()[0].stat = stale;

        let issues = index.refresh(dir.path(), RefreshOptions::default()).unwrap();
        assert!(issues.is_empty());
        assert_ne!(index.entries()[0].stat.mtime_secs, stale.mtime_secs);
        assert!(!index.entries()[0].needs_update);
    }

    #[test]
    fn edited_file_needs_update() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = Index::new();
        stage_file(&mut index, dir.path(), "file", b"old contents\n");

        std::fs::write(dir.path().join("file"), b"new contents!\n").unwrap();

        let issues = index.refresh(dir.path(), RefreshOptions::default()).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].outcome, RefreshOutcome::NeedsUpdate);
        assert!(index.entries()[0].needs_update);
    }

    #[test]
    fn missing_file_reported_unless_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = Index::new();
        stage_file(&mut index, dir.path(), "doomed", b"x");
        std::fs::remove_file(dir.path().join("doomed")).unwrap();

        let issues = index.refresh(dir.path(), RefreshOptions::default()).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].outcome, RefreshOutcome::Missing);

        let issues = index
            .refresh(
                dir.path(),
                RefreshOptions {
                    ignore_missing: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(issues.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn exec_flip_needs_update() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let mut index = Index::new();
        stage_file(&mut index, dir.path(), "script", b"#!/bin/sh\n");

        let path = dir.path().join("script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let issues = index.refresh(dir.path(), RefreshOptions::default()).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].outcome, RefreshOutcome::NeedsUpdate);
    }
}
