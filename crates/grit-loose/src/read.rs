use std::fs;
use std::io::Read;

use flate2::read::ZlibDecoder;
use grit_hash::{Hasher, ObjectId};
use grit_object::{header, ObjectType};

use crate::{LooseError, LooseStore};

impl LooseStore {
    /// Check if a loose object exists.
    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.object_path(oid).is_file()
    }

    /// Read a loose object's canonical bytes and split them into
    /// `(type, size, content)`.
    ///
    /// Returns `Ok(None)` if the object does not exist, `Err` if it exists
    /// but is corrupt.
    pub fn read(&self, oid: &ObjectId) -> Result<Option<(ObjectType, Vec<u8>)>, LooseError> {
        let Some(raw) = self.read_canonical(oid)? else {
            return Ok(None);
        };
        let (obj_type, size, header_len) = header::parse_header(&raw)?;
        let content = &raw[header_len..];
        if content.len() != size {
            return Err(LooseError::Corrupt {
                oid: oid.to_hex(),
                reason: format!("size {} does not match header {}", content.len(), size),
            });
        }
        Ok(Some((obj_type, content.to_vec())))
    }

    /// Read the full decompressed canonical form (header + content).
    pub fn read_canonical(&self, oid: &ObjectId) -> Result<Option<Vec<u8>>, LooseError> {
        let path = self.object_path(oid);
        let compressed = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LooseError::Io(e)),
        };
        decompress_all(&compressed, oid).map(Some)
    }

    /// Read just the header (type + size) without decompressing the body.
    pub fn read_header(
        &self,
        oid: &ObjectId,
    ) -> Result<Option<(ObjectType, usize)>, LooseError> {
        let path = self.object_path(oid);
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LooseError::Io(e)),
        };

        // Inflate only enough to see the null terminator. Headers are short;
        // 64 bytes is plenty of room.
        let mut decoder = ZlibDecoder::new(file);
        let mut buf = [0u8; 64];
        let mut filled = 0;

        loop {
            if filled >= buf.len() {
                return Err(LooseError::Corrupt {
                    oid: oid.to_hex(),
                    reason: "header exceeds 64 bytes".into(),
                });
            }
            let n = decoder
                .read(&mut buf[filled..])
                .map_err(|e| LooseError::Decompress {
                    oid: oid.to_hex(),
                    source: e,
                })?;
            if n == 0 {
                return Err(LooseError::Corrupt {
                    oid: oid.to_hex(),
                    reason: "unexpected EOF before header null terminator".into(),
                });
            }
            filled += n;
            if buf[..filled].contains(&0) {
                break;
            }
        }

        let (obj_type, content_size, _header_len) = header::parse_header(&buf[..filled])?;
        Ok(Some((obj_type, content_size)))
    }

    /// Read a loose object and verify its digest matches the name it is
    /// stored under. The check is over the full canonical form.
    pub fn read_verified(
        &self,
        oid: &ObjectId,
    ) -> Result<Option<(ObjectType, Vec<u8>)>, LooseError> {
        let Some(raw) = self.read_canonical(oid)? else {
            return Ok(None);
        };

        let actual = Hasher::digest(&raw);
        if actual != *oid {
            return Err(LooseError::HashMismatch {
                path: self.object_path(oid),
                expected: oid.to_hex(),
                actual: actual.to_hex(),
            });
        }

        let (obj_type, _size, header_len) = header::parse_header(&raw)?;
        Ok(Some((obj_type, raw[header_len..].to_vec())))
    }
}

/// Zlib-decompress the full contents of a loose object file.
fn decompress_all(compressed: &[u8], oid: &ObjectId) -> Result<Vec<u8>, LooseError> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| LooseError::Decompress {
            oid: oid.to_hex(),
            source: e,
        })?;
    Ok(decompressed)
}
