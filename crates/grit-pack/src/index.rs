//! Pack index (v1) reading and lookup.
//!
//! The index provides digest → pack offset mapping:
//!
//! ```text
//! Fanout:  256 × 4-byte big-endian cumulative counts
//! Entries: N × (4-byte big-endian offset | 20-byte digest), sorted by digest
//! Trailer: 20-byte pack digest | 20-byte index digest
//! ```
//!
//! The fanout must be monotonic and the file size exact; the digest
//! trailers are checked by [`PackIndex::verify`].

use std::path::{Path, PathBuf};

use grit_hash::{fanout, Hasher, ObjectId};
use memmap2::Mmap;

use crate::PackError;

const FANOUT_SIZE: usize = 4 * 256;
const ENTRY_SIZE: usize = 24;
const TRAILER_SIZE: usize = 40;

/// A memory-mapped pack index.
pub struct PackIndex {
    data: Mmap,
    fanout: [u32; 256],
    num_objects: u32,
    idx_path: PathBuf,
}

impl PackIndex {
    /// Open and structurally validate a pack index file.
    pub fn open(idx_path: impl AsRef<Path>) -> Result<Self, PackError> {
        let idx_path = idx_path.as_ref().to_path_buf();
        let file = std::fs::File::open(&idx_path)?;
        let data = unsafe { Mmap::map(&file)? };

        if data.len() < FANOUT_SIZE + TRAILER_SIZE {
            return Err(PackError::InvalidIndex("index file too small".into()));
        }

        let mut table = [0u32; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            let pos = i * 4;
            *slot = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
        }
        fanout::validate(&table)
            .map_err(|_| PackError::InvalidIndex("non-monotonic fanout".into()))?;

        let num_objects = table[255];
        let expected = FANOUT_SIZE + num_objects as usize * ENTRY_SIZE + TRAILER_SIZE;
        if data.len() != expected {
            return Err(PackError::InvalidIndex(format!(
                "wrong index file size: {} != {expected}",
                data.len()
            )));
        }

        Ok(Self {
            data,
            fanout: table,
            num_objects,
            idx_path,
        })
    }

    /// Look up a digest, returning the offset in the pack file.
    pub fn lookup(&self, oid: &ObjectId) -> Option<u64> {
        let (mut low, mut high) = fanout::range(&self.fanout, oid.first_byte());
        let target = oid.as_bytes();

        while low < high {
            let mid = low + (high - low) / 2;
            match self.oid_bytes_at(mid).cmp(target) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return Some(self.offset_at(mid)),
            }
        }
        None
    }

    /// The digest at the given sorted position.
    pub fn oid_at(&self, pos: usize) -> ObjectId {
        ObjectId::from_bytes(self.oid_bytes_at(pos)).expect("index entry digest")
    }

    /// The pack offset at the given sorted position.
    pub fn offset_at(&self, pos: usize) -> u64 {
        let at = FANOUT_SIZE + pos * ENTRY_SIZE;
        u32::from_be_bytes([
            self.data[at],
            self.data[at + 1],
            self.data[at + 2],
            self.data[at + 3],
        ]) as u64
    }

    fn oid_bytes_at(&self, pos: usize) -> &[u8] {
        let at = FANOUT_SIZE + pos * ENTRY_SIZE + 4;
        &self.data[at..at + 20]
    }

    /// Number of objects in this index.
    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    /// The pack digest recorded in the trailer.
    pub fn pack_digest(&self) -> ObjectId {
        let at = self.data.len() - TRAILER_SIZE;
        ObjectId::from_bytes(&self.data[at..at + 20]).expect("index trailer")
    }

    /// The index's own trailing digest.
    pub fn index_digest(&self) -> ObjectId {
        let at = self.data.len() - 20;
        ObjectId::from_bytes(&self.data[at..]).expect("index trailer")
    }

    /// Recompute the index digest and compare it to the trailer.
    pub fn verify(&self) -> Result<(), PackError> {
        let computed = Hasher::digest(&self.data[..self.data.len() - 20]);
        if computed != self.index_digest() {
            return Err(PackError::IndexDigestMismatch(self.idx_path.clone()));
        }
        Ok(())
    }

    /// Path to the .idx file.
    pub fn path(&self) -> &Path {
        &self.idx_path
    }

    /// Iterate over all (digest, offset) pairs in digest order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, u64)> + '_ {
        (0..self.num_objects as usize).map(move |pos| (self.oid_at(pos), self.offset_at(pos)))
    }
}

/// Serialize a v1 index from `(digest, offset)` pairs and the pack digest.
pub fn serialize_index(entries: &[(ObjectId, u64)], pack_digest: &ObjectId) -> Vec<u8> {
    let mut sorted: Vec<_> = entries.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let oids: Vec<ObjectId> = sorted.iter().map(|(oid, _)| *oid).collect();
    let table = fanout::build(&oids);

    let mut buf = Vec::with_capacity(FANOUT_SIZE + sorted.len() * ENTRY_SIZE + TRAILER_SIZE);
    for count in table {
        buf.extend_from_slice(&count.to_be_bytes());
    }
    for (oid, offset) in &sorted {
        buf.extend_from_slice(&(*offset as u32).to_be_bytes());
        buf.extend_from_slice(oid.as_bytes());
    }
    buf.extend_from_slice(pack_digest.as_bytes());

    let digest = Hasher::digest(&buf);
    buf.extend_from_slice(digest.as_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> ObjectId {
        let mut bytes = [n; 20];
        bytes[19] = n;
        ObjectId(bytes)
    }

    fn write_index(dir: &Path, entries: &[(ObjectId, u64)]) -> PathBuf {
        let path = dir.join("test.idx");
        std::fs::write(&path, serialize_index(entries, &ObjectId::NULL)).unwrap();
        path
    }

    #[test]
    fn lookup_present_and_absent() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![(oid(3), 12u64), (oid(100), 99), (oid(250), 7)];
        let idx = PackIndex::open(write_index(dir.path(), &entries)).unwrap();

        assert_eq!(idx.num_objects(), 3);
        assert_eq!(idx.lookup(&oid(3)), Some(12));
        assert_eq!(idx.lookup(&oid(100)), Some(99));
        assert_eq!(idx.lookup(&oid(250)), Some(7));
        assert_eq!(idx.lookup(&oid(77)), None);
    }

    #[test]
    fn iter_is_sorted_by_digest() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![(oid(200), 1u64), (oid(1), 2), (oid(50), 3)];
        let idx = PackIndex::open(write_index(dir.path(), &entries)).unwrap();

        let digests: Vec<_> = idx.iter().map(|(oid, _)| oid).collect();
        let mut sorted = digests.clone();
        sorted.sort();
        assert_eq!(digests, sorted);
    }

    #[test]
    fn verify_detects_flip() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_index(dir.path(), &[(oid(5), 1)]);

        PackIndex::open(&path).unwrap().verify().unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let n = bytes.len();
        bytes[n - 45] ^= 0x01; // inside an entry digest
        std::fs::write(&path, &bytes).unwrap();
        let idx = PackIndex::open(&path).unwrap();
        assert!(matches!(
            idx.verify(),
            Err(PackError::IndexDigestMismatch(_))
        ));
    }

    #[test]
    fn wrong_size_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_index(dir.path(), &[(oid(5), 1)]);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.push(0);
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            PackIndex::open(&path),
            Err(PackError::InvalidIndex(_))
        ));
    }

    #[test]
    fn non_monotonic_fanout_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_index(dir.path(), &[(oid(5), 1)]);
        let mut bytes = std::fs::read(&path).unwrap();
        // Bump an early fanout bucket above the total.
        bytes[0..4].copy_from_slice(&9u32.to_be_bytes());
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            PackIndex::open(&path),
            Err(PackError::InvalidIndex(_))
        ));
    }

    #[test]
    fn empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let idx = PackIndex::open(write_index(dir.path(), &[])).unwrap();
        assert_eq!(idx.num_objects(), 0);
        assert_eq!(idx.lookup(&oid(1)), None);
        idx.verify().unwrap();
    }
}
