//! Object model: blob, tree, commit, tag parsing and serialization.
//!
//! Objects are identified by the digest of their canonical form
//! `"<type> <size>\0<content>"`. This crate provides Rust types for the
//! four object kinds, their parsing and serialization, and the interning
//! table that holds one record per digest with the cross-reference graph
//! used by reachability walks.

mod blob;
mod commit;
pub mod header;
mod intern;
mod tag;
mod tree;

pub use blob::Blob;
pub use commit::{Commit, Signature};
pub use intern::{ObjectRecord, ObjectTable, FLAG_REACHABLE};
pub use tag::Tag;
pub use tree::{EntryOrder, FileMode, Tree, TreeEntry};

use bstr::BString;
use grit_hash::{HashError, Hasher, ObjectId};

/// Errors produced by object operations.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("invalid object type: {0}")]
    InvalidType(BString),

    #[error("invalid object header: {0}")]
    InvalidHeader(String),

    #[error("truncated object: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid tree entry at offset {offset}: {reason}")]
    InvalidTreeEntry { offset: usize, reason: String },

    #[error("invalid commit: {0}")]
    BadCommit(String),

    #[error("invalid tag: missing '{field}' header")]
    MissingTagField { field: &'static str },

    #[error("invalid file mode: {0}")]
    InvalidFileMode(String),

    #[error(transparent)]
    Hash(#[from] HashError),
}

/// The four kinds of stored objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectType {
    /// Parse from the type string in object headers.
    pub fn from_bytes(s: &[u8]) -> Result<Self, ObjectError> {
        match s {
            b"blob" => Ok(Self::Blob),
            b"tree" => Ok(Self::Tree),
            b"commit" => Ok(Self::Commit),
            b"tag" => Ok(Self::Tag),
            _ => Err(ObjectError::InvalidType(BString::from(s))),
        }
    }

    /// The canonical byte representation.
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Self::Blob => b"blob",
            Self::Tree => b"tree",
            Self::Commit => b"commit",
            Self::Tag => b"tag",
        }
    }

    /// The canonical name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ObjectType {
    type Err = ObjectError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}

/// A parsed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
    Tag(Tag),
}

impl Object {
    /// Parse from canonical bytes (header + content).
    pub fn parse(data: &[u8]) -> Result<Self, ObjectError> {
        let (obj_type, content_size, header_len) = header::parse_header(data)?;
        let content = &data[header_len..];
        if content.len() < content_size {
            return Err(ObjectError::Truncated {
                expected: content_size,
                actual: content.len(),
            });
        }
        Self::parse_content(obj_type, &content[..content_size])
    }

    /// Parse from content bytes with known type (no header).
    pub fn parse_content(obj_type: ObjectType, content: &[u8]) -> Result<Self, ObjectError> {
        match obj_type {
            ObjectType::Blob => Ok(Self::Blob(Blob::new(content.to_vec()))),
            ObjectType::Tree => Ok(Self::Tree(Tree::parse(content)?)),
            ObjectType::Commit => Ok(Self::Commit(Commit::parse(content)?)),
            ObjectType::Tag => Ok(Self::Tag(Tag::parse(content)?)),
        }
    }

    /// Serialize to the canonical form (header + content).
    pub fn serialize(&self) -> Vec<u8> {
        let content = self.serialize_content();
        let hdr = header::write_header(self.object_type(), content.len());
        let mut out = Vec::with_capacity(hdr.len() + content.len());
        out.extend_from_slice(&hdr);
        out.extend_from_slice(&content);
        out
    }

    /// Serialize just the content (no header).
    pub fn serialize_content(&self) -> Vec<u8> {
        match self {
            Self::Blob(b) => b.data.clone(),
            Self::Tree(t) => t.serialize_content(),
            Self::Commit(c) => c.serialize_content(),
            Self::Tag(t) => t.serialize_content(),
        }
    }

    /// The object's kind.
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Blob(_) => ObjectType::Blob,
            Self::Tree(_) => ObjectType::Tree,
            Self::Commit(_) => ObjectType::Commit,
            Self::Tag(_) => ObjectType::Tag,
        }
    }

    /// Compute the identity digest of the canonical form.
    pub fn compute_id(&self) -> ObjectId {
        Hasher::digest_object(self.object_type().name(), &self.serialize_content())
    }

    /// All digests this object refers to, in parse order.
    pub fn references(&self) -> Vec<ObjectId> {
        self.typed_references()
            .into_iter()
            .map(|(oid, _)| oid)
            .collect()
    }

    /// All outgoing references with the kind each position implies:
    /// tree entries name blobs or trees, commit headers name a tree and
    /// parent commits, a tag names what its `type` header says.
    pub fn typed_references(&self) -> Vec<(ObjectId, ObjectType)> {
        match self {
            Self::Blob(_) => Vec::new(),
            Self::Tree(t) => t
                .entries
                .iter()
                .map(|e| {
                    let kind = if e.is_tree() {
                        ObjectType::Tree
                    } else if e.mode.is_gitlink() {
                        ObjectType::Commit
                    } else {
                        ObjectType::Blob
                    };
                    (e.oid, kind)
                })
                .collect(),
            Self::Commit(c) => {
                let mut refs = Vec::with_capacity(1 + c.parents.len());
                refs.push((c.tree, ObjectType::Tree));
                refs.extend(c.parents.iter().map(|p| (*p, ObjectType::Commit)));
                refs
            }
            Self::Tag(t) => vec![(t.target, t.target_type)],
        }
    }
}
