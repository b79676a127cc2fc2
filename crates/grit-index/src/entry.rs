//! Index entry types: IndexEntry, StatData, the change mask.

use bstr::BString;
use grit_hash::ObjectId;
use grit_object::FileMode;

use crate::Stage;

/// A single entry in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// File path (relative to the working tree root).
    pub path: BString,
    /// Digest of the staged blob.
    pub oid: ObjectId,
    /// File mode as stored on disk (type bits + permission).
    pub mode: FileMode,
    /// Merge stage (0 = resolved, 1 = base, 2 = ours, 3 = theirs).
    pub stage: Stage,
    /// Stat cache from the working tree.
    pub stat: StatData,
    /// Needs-update mark set by refresh; never persisted.
    pub needs_update: bool,
}

impl IndexEntry {
    /// The (name, stage) sort key.
    pub fn key(&self) -> (&[u8], u8) {
        (self.path.as_ref(), self.stage.as_u8())
    }
}

/// File system stat fields cached in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatData {
    pub ctime_secs: u32,
    pub ctime_nsecs: u32,
    pub mtime_secs: u32,
    pub mtime_nsecs: u32,
    pub dev: u32,
    pub ino: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
}

/// Change mask bits produced by [`StatData::changes`].
pub const MTIME_CHANGED: u32 = 0x0001;
pub const CTIME_CHANGED: u32 = 0x0002;
pub const OWNER_CHANGED: u32 = 0x0004;
pub const MODE_CHANGED: u32 = 0x0008;
pub const INODE_CHANGED: u32 = 0x0010;
pub const DATA_CHANGED: u32 = 0x0020;
pub const TYPE_CHANGED: u32 = 0x0040;

/// Which optional stat fields participate in comparison.
///
/// Nanoseconds are unreliable (not all filesystems store them, and the
/// inode cache can report them before a flush zeroes them out); device
/// ids move around on network filesystems.
#[derive(Debug, Clone, Copy)]
pub struct StatOptions {
    pub check_nsec: bool,
    pub check_dev: bool,
}

impl Default for StatOptions {
    fn default() -> Self {
        Self {
            check_nsec: false,
            check_dev: true,
        }
    }
}

impl StatData {
    /// Capture from file system metadata.
    #[cfg(unix)]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            ctime_secs: meta.ctime() as u32,
            ctime_nsecs: meta.ctime_nsec() as u32,
            mtime_secs: meta.mtime() as u32,
            mtime_nsecs: meta.mtime_nsec() as u32,
            dev: meta.dev() as u32,
            ino: meta.ino() as u32,
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.len() as u32,
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::time::UNIX_EPOCH;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .unwrap_or_default();
        Self {
            ctime_secs: mtime.as_secs() as u32,
            ctime_nsecs: mtime.subsec_nanos(),
            mtime_secs: mtime.as_secs() as u32,
            mtime_nsecs: mtime.subsec_nanos(),
            dev: 0,
            ino: 0,
            uid: 0,
            gid: 0,
            size: meta.len() as u32,
        }
    }
}

/// Compare a cached entry against fresh metadata, returning a change mask.
///
/// Only the owner-execute bit counts as a mode change for regular files;
/// a change of file type (regular/symlink/directory) is `TYPE_CHANGED`.
pub fn changes(
    entry_mode: FileMode,
    cached: &StatData,
    meta: &std::fs::Metadata,
    opts: StatOptions,
) -> u32 {
    let fresh = StatData::from_metadata(meta);
    let mut changed = 0;

    if cached.mtime_secs != fresh.mtime_secs {
        changed |= MTIME_CHANGED;
    }
    if cached.ctime_secs != fresh.ctime_secs {
        changed |= CTIME_CHANGED;
    }
    if opts.check_nsec {
        if cached.mtime_nsecs != fresh.mtime_nsecs {
            changed |= MTIME_CHANGED;
        }
        if cached.ctime_nsecs != fresh.ctime_nsecs {
            changed |= CTIME_CHANGED;
        }
    }

    if cached.uid != fresh.uid || cached.gid != fresh.gid {
        changed |= OWNER_CHANGED;
    }

    let disk_mode = metadata_mode(meta);
    if (entry_mode.raw() ^ disk_mode) & 0o170000 != 0 {
        changed |= TYPE_CHANGED;
    } else if entry_mode.is_blob() && 0o100 & (entry_mode.raw() ^ disk_mode) != 0 {
        changed |= MODE_CHANGED;
    }

    if cached.ino != fresh.ino || (opts.check_dev && cached.dev != fresh.dev) {
        changed |= INODE_CHANGED;
    }
    if cached.size != fresh.size {
        changed |= DATA_CHANGED;
    }

    changed
}

/// The index-relevant mode of on-disk metadata.
#[cfg(unix)]
fn metadata_mode(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mode()
}

#[cfg(not(unix))]
fn metadata_mode(meta: &std::fs::Metadata) -> u32 {
    if meta.is_dir() {
        0o040000
    } else {
        0o100644
    }
}

/// The mode an index entry records for a file with the given disk mode.
///
/// Permission bits collapse to 0644/0755 by the owner-execute bit.
pub fn entry_mode_for(disk_mode: u32) -> FileMode {
    match disk_mode & 0o170000 {
        0o120000 => FileMode::Symlink,
        0o160000 => FileMode::Gitlink,
        _ => {
            if disk_mode & 0o100 != 0 {
                FileMode::Executable
            } else {
                FileMode::Regular
            }
        }
    }
}
