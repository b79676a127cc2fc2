//! Minimal pack writing: enough to compact objects for storage and to
//! produce fixtures for the readers.
//!
//! Entries go in insertion order; delta entries name their base by digest
//! and the base must be added to the same pack. The companion v1 index is
//! produced alongside.

use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::ZlibEncoder;
use grit_hash::{Hasher, ObjectId};
use grit_object::ObjectType;

use crate::entry::encode_entry_header;
use crate::index::serialize_index;
use crate::{delta, PackError, PACK_SIGNATURE, PACK_VERSION};

/// Accumulates objects, then writes `<name>.pack` and `<name>.idx`.
pub struct PackBuilder {
    body: Vec<u8>,
    entries: Vec<(ObjectId, u64)>,
    count: u32,
}

impl PackBuilder {
    pub fn new() -> Self {
        Self {
            body: Vec::new(),
            entries: Vec::new(),
            count: 0,
        }
    }

    /// Number of objects added so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a plain (non-delta) object. Returns its digest.
    pub fn add_object(&mut self, obj_type: ObjectType, content: &[u8]) -> ObjectId {
        let oid = Hasher::digest_object(obj_type.name(), content);
        let type_num = match obj_type {
            ObjectType::Commit => 1,
            ObjectType::Tree => 2,
            ObjectType::Blob => 3,
            ObjectType::Tag => 4,
        };

        let offset = 12 + self.body.len() as u64;
        self.body
            .extend_from_slice(&encode_entry_header(type_num, content.len() as u64));
        self.body.extend_from_slice(&deflate(content));

        self.entries.push((oid, offset));
        self.count += 1;
        oid
    }

    /// Append `target` stored as a delta against `base`. The caller names
    /// the base digest; for a readable pack the base must be in this pack
    /// too. Returns the target's digest.
    pub fn add_delta(
        &mut self,
        obj_type: ObjectType,
        base_oid: ObjectId,
        base: &[u8],
        target: &[u8],
    ) -> ObjectId {
        let oid = Hasher::digest_object(obj_type.name(), target);
        let delta_bytes = compute_delta(base, target);

        let offset = 12 + self.body.len() as u64;
        self.body
            .extend_from_slice(&encode_entry_header(7, delta_bytes.len() as u64));
        self.body.extend_from_slice(base_oid.as_bytes());
        self.body.extend_from_slice(&deflate(&delta_bytes));

        self.entries.push((oid, offset));
        self.count += 1;
        oid
    }

    /// Write `<name>.pack` and `<name>.idx` into `dir`.
    pub fn write_to(self, dir: impl AsRef<Path>, name: &str) -> Result<PathBuf, PackError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let mut pack = Vec::with_capacity(12 + self.body.len() + 20);
        pack.extend_from_slice(PACK_SIGNATURE);
        pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
        pack.extend_from_slice(&self.count.to_be_bytes());
        pack.extend_from_slice(&self.body);

        let pack_digest = Hasher::digest(&pack);
        pack.extend_from_slice(pack_digest.as_bytes());

        let pack_path = dir.join(format!("{name}.pack"));
        std::fs::write(&pack_path, &pack)?;

        let idx = serialize_index(&self.entries, &pack_digest);
        std::fs::write(dir.join(format!("{name}.idx")), idx)?;

        Ok(pack_path)
    }
}

impl Default for PackBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A deliberately simple delta: one copy when the prefix matches, one
/// insert for the rest. Enough to exercise the decoder and compact
/// near-identical objects; no window search.
pub fn compute_delta(base: &[u8], target: &[u8]) -> Vec<u8> {
    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count()
        .min(0x10000);

    let mut ins = Vec::new();
    if common > 0 {
        ins.extend_from_slice(&delta::encode_copy(0, common));
    }
    if common < target.len() {
        ins.extend_from_slice(&delta::encode_insert(&target[common..]));
    }
    delta::assemble(base.len(), target.len(), &ins)
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(data).expect("in-memory deflate");
    enc.finish().expect("in-memory deflate")
}
