//! Packfile reading, pack index support, and the delta codec.
//!
//! A pack is a concatenation of zlib-compressed objects, some stored as
//! deltas against a base named by digest, with a companion sorted index.
//! Packs are memory-mapped on first use and unmapped under a total-bytes
//! budget; see [`PackSet`].

pub mod build;
pub mod delta;
pub mod entry;
pub mod index;
mod pack;
mod set;

pub use index::PackIndex;
pub use pack::PackFile;
pub use set::{PackData, PackSet};

use grit_hash::ObjectId;
use grit_object::ObjectType;

/// Errors that can occur during pack operations.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("invalid pack header: {0}")]
    InvalidHeader(String),

    #[error("invalid pack index: {0}")]
    InvalidIndex(String),

    #[error("pack index digest mismatch for {0}")]
    IndexDigestMismatch(std::path::PathBuf),

    #[error("pack digest disagrees with index for {0}")]
    PackDigestMismatch(std::path::PathBuf),

    #[error("delta base size mismatch: delta says {declared}, base is {actual}")]
    DeltaBaseSize { declared: usize, actual: usize },

    #[error("malformed delta at offset {offset}: {reason}")]
    DeltaShape { offset: usize, reason: String },

    #[error("delta base {0} not present in the same pack")]
    DeltaBaseMissing(ObjectId),

    #[error("delta chain too deep (>{max_depth} levels) at offset {offset}")]
    DeltaChainTooDeep { offset: u64, max_depth: usize },

    #[error("corrupt pack entry at offset {0}")]
    CorruptEntry(u64),

    #[error("unsupported pack version: {0}")]
    UnsupportedVersion(u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),
}

/// Type of a packed object entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackEntryType {
    Commit,
    Tree,
    Blob,
    Tag,
    /// Delta whose base is named by digest and must live in the same pack.
    Delta { base: ObjectId },
}

impl PackEntryType {
    /// Convert a non-delta pack entry type to an ObjectType.
    pub fn to_object_type(self) -> Option<ObjectType> {
        match self {
            Self::Commit => Some(ObjectType::Commit),
            Self::Tree => Some(ObjectType::Tree),
            Self::Blob => Some(ObjectType::Blob),
            Self::Tag => Some(ObjectType::Tag),
            Self::Delta { .. } => None,
        }
    }

    /// Type number as used in pack entry headers.
    pub fn type_number(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
            Self::Delta { .. } => 7,
        }
    }

    pub fn from_object_type(ty: ObjectType) -> Self {
        match ty {
            ObjectType::Commit => Self::Commit,
            ObjectType::Tree => Self::Tree,
            ObjectType::Blob => Self::Blob,
            ObjectType::Tag => Self::Tag,
        }
    }
}

/// Pack format constants.
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_VERSION: u32 = 2;
pub const PACK_HEADER_SIZE: usize = 12;

/// Soft cap on cumulative mapped pack bytes.
pub const PACK_MAPPED_LIMIT: u64 = 64 << 20;

/// Maximum delta chain depth before we bail out.
pub const MAX_DELTA_CHAIN_DEPTH: usize = 512;
