//! Unified-diff patch application.
//!
//! A patch stream is parsed into per-file patches with their hunks, each
//! hunk matched against the current file image (at its stated position
//! first, then by alternating backward/forward whole-line probes), and
//! applied by splicing. File-level bookkeeping covers creations,
//! deletions, renames, mode flips, and optional index synchronization.

mod applier;
mod fragment;
mod parse;

pub use applier::{Applier, ApplyOptions, ApplyReport};
pub use fragment::{apply_fragments, locate_fragment};
pub use parse::parse_patches;

use bstr::BString;

/// Errors from patch parsing and application.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("corrupt patch at line {line}: {reason}")]
    BadPatch { line: usize, reason: String },

    #[error("patch failed: {name}:{pos}")]
    PatchFailed { name: BString, pos: usize },

    #[error("{0}: does not exist in index")]
    NotInIndex(BString),

    #[error("{0}: does not match index")]
    IndexMismatch(BString),

    #[error("{0}: already exists in index")]
    AlreadyInIndex(BString),

    #[error("{0}: already exists in working directory")]
    AlreadyExists(BString),

    #[error("{0}: wrong type")]
    WrongType(BString),

    #[error("new mode ({new_mode:o}) of {name} does not match old mode ({old_mode:o})")]
    TypeChange {
        name: BString,
        old_mode: u32,
        new_mode: u32,
    },

    #[error("removal patch leaves file contents")]
    RemovalLeavesContents,

    #[error("unable to read {0}")]
    ReadFailed(BString),

    #[error(transparent)]
    Index(#[from] grit_index::IndexError),

    #[error(transparent)]
    Odb(#[from] grit_odb::OdbError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One `@@`-delimited hunk, reduced to byte images of both sides.
#[derive(Debug, Clone, Default)]
pub struct Fragment {
    /// 1-based line position on the old side (0 for a creation).
    pub old_pos: usize,
    pub old_lines: usize,
    /// 1-based line position on the new side (0 for a deletion).
    pub new_pos: usize,
    pub new_lines: usize,
    /// Context plus removed lines, i.e. what must match the file.
    pub old_image: Vec<u8>,
    /// Context plus added lines, i.e. what replaces the match.
    pub new_image: Vec<u8>,
    /// Pure additions in this hunk.
    pub added: usize,
    /// Pure removals in this hunk.
    pub removed: usize,
}

/// One file's patch.
#[derive(Debug, Clone, Default)]
pub struct FilePatch {
    pub old_name: Option<BString>,
    pub new_name: Option<BString>,
    /// Modes as stated by the headers; 0 when unstated.
    pub old_mode: u32,
    pub new_mode: u32,
    pub is_new: bool,
    pub is_delete: bool,
    pub is_rename: bool,
    pub is_copy: bool,
    pub fragments: Vec<Fragment>,
}

impl FilePatch {
    /// The path this patch reads from, when any.
    pub fn old_name(&self) -> Option<&BString> {
        self.old_name.as_ref()
    }

    /// The path this patch produces, when any.
    pub fn new_name(&self) -> Option<&BString> {
        self.new_name.as_ref()
    }

    /// The name to report this patch under.
    pub fn display_name(&self) -> &BString {
        self.new_name
            .as_ref()
            .or(self.old_name.as_ref())
            .expect("patch with no names")
    }

    /// Lines added and removed (for the stat display).
    pub fn count_changes(&self) -> (usize, usize) {
        self.fragments
            .iter()
            .fold((0, 0), |(a, r), frag| (a + frag.added, r + frag.removed))
    }
}
