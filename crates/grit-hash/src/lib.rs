//! Content digests and object identity for grit.
//!
//! Every stored artifact is identified by the SHA-1 digest of its canonical
//! byte sequence. This crate provides the `ObjectId` type (with its hex
//! spelling), streaming digest computation, and the fanout table used by
//! pack indices.

mod error;
pub mod fanout;
pub mod hasher;
mod oid;

pub use error::HashError;
pub use hasher::Hasher;
pub use oid::ObjectId;

/// Length of a raw digest in bytes.
pub const DIGEST_LEN: usize = 20;

/// Length of a digest in hex characters.
pub const HEX_LEN: usize = 40;
