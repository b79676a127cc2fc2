//! File-level patch application: checks, write-out, index sync.

use std::fs;
use std::path::{Path, PathBuf};

use bstr::{BStr, BString, ByteSlice};
use grit_index::{entry, Index, IndexEntry, InsertPolicy, Stage, StatData, StatOptions};
use grit_object::ObjectType;
use grit_odb::ObjectDb;

use crate::fragment::apply_fragments;
use crate::{ApplyError, FilePatch};

/// How to run the applier.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Verify everything, write nothing.
    pub check_only: bool,
    /// Cross-check against the index and keep it in sync.
    pub use_index: bool,
}

/// What application produced: per-fragment offset notes and warnings.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub notes: Vec<String>,
}

/// Applies parsed patches to a working tree, optionally keeping the
/// index consistent.
///
/// Checks run for every file before anything is written; a failure after
/// write-out has begun aborts the run but already-written files stay
/// written (reported, not rolled back).
pub struct Applier<'a> {
    root: PathBuf,
    options: ApplyOptions,
    index_context: Option<IndexContext<'a>>,
}

struct IndexContext<'a> {
    odb: &'a ObjectDb,
    index: &'a mut Index,
}

/// A checked patch with the content it will write.
struct Prepared<'a> {
    patch: &'a FilePatch,
    /// Resolved new mode (type bits + permission).
    mode: u32,
    /// The produced content; `None` for deletions.
    result: Option<Vec<u8>>,
}

impl<'a> Applier<'a> {
    pub fn new(root: impl AsRef<Path>, options: ApplyOptions) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            options,
            index_context: None,
        }
    }

    /// Supply the object database and index for `--index` runs.
    pub fn with_index(mut self, odb: &'a ObjectDb, index: &'a mut Index) -> Self {
        self.index_context = Some(IndexContext { odb, index });
        self
    }

    /// Check every patch, then (unless checking only) write the results
    /// out and update the index.
    pub fn apply(&mut self, patches: &[FilePatch]) -> Result<ApplyReport, ApplyError> {
        let mut report = ApplyReport::default();

        let mut prepared = Vec::with_capacity(patches.len());
        for patch in patches {
            prepared.push(self.check_patch(patch, &mut report)?);
        }

        if self.options.check_only {
            return Ok(report);
        }

        for p in &prepared {
            self.write_out(p)?;
        }

        Ok(report)
    }

    /// Verify one patch against the working tree (and index), and compute
    /// its result buffer.
    fn check_patch<'p>(
        &mut self,
        patch: &'p FilePatch,
        report: &mut ApplyReport,
    ) -> Result<Prepared<'p>, ApplyError> {
        let mut old_mode = patch.old_mode;
        let mut buf = Vec::new();

        if let Some(old_name) = patch.old_name() {
            let path = self.tracked_path(old_name.as_bstr());
            let meta = fs::symlink_metadata(&path)
                .map_err(|_| ApplyError::ReadFailed(old_name.clone()))?;

            if let Some(ctx) = &self.index_context {
                let Ok(pos) = ctx.index.find(old_name.as_bstr(), Stage::Normal) else {
                    return Err(ApplyError::NotInIndex(old_name.clone()));
                };
                let ie = &ctx.index.entries()[pos];
                if entry::changes(ie.mode, &ie.stat, &meta, StatOptions::default()) != 0 {
                    return Err(ApplyError::IndexMismatch(old_name.clone()));
                }
            }

            let disk_mode = disk_mode(&meta);
            if old_mode == 0 {
                old_mode = disk_mode;
            }
            if (disk_mode ^ old_mode) & 0o170000 != 0 {
                return Err(ApplyError::WrongType(old_name.clone()));
            }

            buf = read_old_data(&path, &meta).ok_or_else(|| {
                ApplyError::ReadFailed(old_name.clone())
            })?;
        }

        // Mode defaulting and the type-change cross-check.
        let mut new_mode = patch.new_mode;
        if patch.is_new {
            if new_mode == 0 {
                new_mode = 0o100644;
            }
            if let Some(ctx) = &self.index_context {
                let new_name = patch.new_name().expect("creation has a new name");
                if ctx.index.get(new_name.as_bstr(), Stage::Normal).is_some() {
                    return Err(ApplyError::AlreadyInIndex(new_name.clone()));
                }
                let target = self.tracked_path(new_name.as_bstr());
                if fs::symlink_metadata(&target).is_ok() {
                    return Err(ApplyError::AlreadyExists(new_name.clone()));
                }
            }
        } else {
            if new_mode == 0 {
                new_mode = old_mode;
            }
            if patch.old_name().is_some()
                && patch.new_name().is_some()
                && (old_mode ^ new_mode) & 0o170000 != 0
            {
                return Err(ApplyError::TypeChange {
                    name: patch.display_name().clone(),
                    old_mode,
                    new_mode,
                });
            }
        }

        apply_fragments(&mut buf, patch, &mut report.notes)?;

        if patch.is_delete {
            if !buf.is_empty() {
                return Err(ApplyError::RemovalLeavesContents);
            }
            return Ok(Prepared {
                patch,
                mode: old_mode,
                result: None,
            });
        }

        Ok(Prepared {
            patch,
            mode: new_mode,
            result: Some(buf),
        })
    }

    /// Write one checked result: remove the old path, create the new one.
    fn write_out(&mut self, prepared: &Prepared<'_>) -> Result<(), ApplyError> {
        let patch = prepared.patch;

        // Rename or modification boils down to the same thing as deletion
        // first: remove the old, then write the new. Removing before the
        // create also makes mode flips take (the file is made fresh with
        // the new permissions). A copy keeps its source.
        if !patch.is_copy {
            if let Some(old_name) = patch.old_name() {
                let path = self.tracked_path(old_name.as_bstr());
                if fs::symlink_metadata(&path).is_ok() {
                    fs::remove_file(&path)?;
                }
                if let Some(ctx) = &mut self.index_context {
                    ctx.index.remove(old_name.as_bstr());
                }
            }
        }

        let Some(result) = &prepared.result else {
            return Ok(());
        };
        let new_name = patch.new_name().expect("non-delete has a new name");
        let path = self.tracked_path(new_name.as_bstr());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        if prepared.mode & 0o170000 == 0o120000 {
            // Symlink: content is the target, sans trailing newline.
            let mut target = result.clone();
            if target.last() == Some(&b'\n') {
                target.pop();
            }
            create_symlink(&target, &path)?;
            self.stage_result(new_name, prepared.mode, &target, &path)?;
        } else {
            write_regular(&path, result, prepared.mode)?;
            self.stage_result(new_name, prepared.mode, result, &path)?;
        }

        Ok(())
    }

    /// Store the blob and replace the index entry for a written file.
    fn stage_result(
        &mut self,
        name: &BString,
        mode: u32,
        content: &[u8],
        path: &Path,
    ) -> Result<(), ApplyError> {
        let Some(ctx) = &mut self.index_context else {
            return Ok(());
        };

        let oid = ctx.odb.write(ObjectType::Blob, content)?;
        let meta = fs::symlink_metadata(path)?;
        ctx.index.insert(
            IndexEntry {
                path: name.clone(),
                oid,
                mode: entry::entry_mode_for(mode),
                stage: Stage::Normal,
                stat: StatData::from_metadata(&meta),
                needs_update: false,
            },
            InsertPolicy::ADD_REPLACE,
        )?;
        Ok(())
    }

    fn tracked_path(&self, name: &BStr) -> PathBuf {
        let mut path = self.root.clone();
        for component in name.split_str(b"/") {
            path.push(String::from_utf8_lossy(component).into_owned());
        }
        path
    }
}

/// The old side's bytes: file content, or the link target for symlinks.
fn read_old_data(path: &Path, meta: &fs::Metadata) -> Option<Vec<u8>> {
    if meta.file_type().is_symlink() {
        Some(
            fs::read_link(path)
                .ok()?
                .into_os_string()
                .into_encoded_bytes(),
        )
    } else if meta.is_file() {
        fs::read(path).ok()
    } else {
        None
    }
}

#[cfg(unix)]
fn disk_mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mode()
}

#[cfg(not(unix))]
fn disk_mode(meta: &fs::Metadata) -> u32 {
    if meta.is_dir() {
        0o040000
    } else {
        0o100644
    }
}

/// Create or replace a regular file; permissions honor only the
/// execute bit (0666 or 0777 before the umask).
fn write_regular(path: &Path, content: &[u8], mode: u32) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let perm = if mode & 0o100 != 0 { 0o777 } else { 0o666 };
        // O_CREAT|O_TRUNC; the caller removed any previous file, so the
        // permission bits here take effect (masked by the umask).
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(perm)
            .open(path)?;
        file.write_all(content)
    }
    #[cfg(not(unix))]
    {
        let _ = mode;
        fs::write(path, content)
    }
}

#[cfg(unix)]
fn create_symlink(target: &[u8], path: &Path) -> std::io::Result<()> {
    use std::os::unix::ffi::OsStrExt;
    if fs::symlink_metadata(path).is_ok() {
        fs::remove_file(path)?;
    }
    std::os::unix::fs::symlink(std::ffi::OsStr::from_bytes(target), path)
}

#[cfg(not(unix))]
fn create_symlink(_target: &[u8], _path: &Path) -> std::io::Result<()> {
    Err(std::io::Error::other("symlinks unsupported on this platform"))
}
