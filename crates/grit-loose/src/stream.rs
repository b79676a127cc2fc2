//! Verified stream copy: ingest a loose-object stream from elsewhere.
//!
//! The incoming bytes are a zlib stream of a canonical object. They are
//! inflated and digested in one pass; if the observed digest matches the
//! claimed one, the object is re-deflated into local storage, otherwise
//! nothing is written.

use std::io::Read;

use flate2::read::ZlibDecoder;
use grit_hash::{Hasher, ObjectId};
use grit_object::header;

use crate::{LooseError, LooseStore};

impl LooseStore {
    /// Copy one object from a compressed stream, verifying its digest.
    ///
    /// Returns the digest on success; fails with `HashMismatch` when the
    /// stream's content does not hash to `expected`, in which case the
    /// store is untouched.
    pub fn stream_copy(
        &self,
        reader: &mut dyn Read,
        expected: &ObjectId,
    ) -> Result<ObjectId, LooseError> {
        if self.contains(expected) {
            // Drain the stream so the sender is not left blocked.
            std::io::copy(reader, &mut std::io::sink())?;
            return Ok(*expected);
        }

        let mut decoder = ZlibDecoder::new(reader);
        let mut canonical = Vec::new();
        decoder
            .read_to_end(&mut canonical)
            .map_err(|e| LooseError::Decompress {
                oid: expected.to_hex(),
                source: e,
            })?;

        let actual = Hasher::digest(&canonical);
        if actual != *expected {
            return Err(LooseError::HashMismatch {
                path: self.object_path(expected),
                expected: expected.to_hex(),
                actual: actual.to_hex(),
            });
        }

        let (obj_type, size, header_len) = header::parse_header(&canonical)?;
        let content = &canonical[header_len..];
        if content.len() != size {
            return Err(LooseError::Corrupt {
                oid: expected.to_hex(),
                reason: format!("stream size {} does not match header {}", content.len(), size),
            });
        }

        self.write(obj_type, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use grit_object::ObjectType;
    use std::io::Write;

    fn deflated(canonical: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(canonical).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn copies_matching_stream() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());

        let canonical = b"blob 6\0hello\n";
        let expected = Hasher::digest(canonical);
        let compressed = deflated(canonical);

        let got = store.stream_copy(&mut &compressed[..], &expected).unwrap();
        assert_eq!(got, expected);
        let (ty, content) = store.read(&expected).unwrap().unwrap();
        assert_eq!(ty, ObjectType::Blob);
        assert_eq!(content, b"hello\n");
    }

    #[test]
    fn rejects_mismatched_stream() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());

        let compressed = deflated(b"blob 4\0evil");
        let claimed = Hasher::digest(b"blob 6\0hello\n");

        assert!(matches!(
            store.stream_copy(&mut &compressed[..], &claimed),
            Err(LooseError::HashMismatch { .. })
        ));
        assert!(!store.contains(&claimed));
    }

    #[test]
    fn existing_object_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());
        let oid = store.write(ObjectType::Blob, b"cached").unwrap();

        // Garbage stream: must not matter, the object is already here.
        let garbage = [0u8; 16];
        let got = store.stream_copy(&mut &garbage[..], &oid).unwrap();
        assert_eq!(got, oid);
    }
}
