//! Digest-streamed writing.
//!
//! Wraps any writer and feeds every byte through a SHA-1 context, so that
//! a file can carry its own digest as a trailer and be verified later
//! without a second pass. Pack files, pack indices, and the staging index
//! all end in such a trailer.

use std::io::{self, Write};

use grit_hash::{Hasher, ObjectId};

/// A writer that digests everything written through it.
pub struct HashedWriter<W: Write> {
    inner: W,
    hasher: Hasher,
}

impl<W: Write> HashedWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
        }
    }

    /// Finalize, returning the inner writer and the digest of everything
    /// written.
    pub fn finish(self) -> (W, ObjectId) {
        (self.inner, self.hasher.finalize())
    }

    /// Finalize and append the digest itself as a 20-byte trailer, returning
    /// the inner writer and the digest.
    pub fn finish_with_trailer(self) -> io::Result<(W, ObjectId)> {
        let (mut inner, digest) = self.finish();
        inner.write_all(digest.as_bytes())?;
        Ok((inner, digest))
    }
}

impl<W: Write> Write for HashedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Verify a byte buffer whose last 20 bytes are the digest of the rest.
pub fn verify_trailer(data: &[u8]) -> Option<ObjectId> {
    if data.len() < 20 {
        return None;
    }
    let (content, trailer) = data.split_at(data.len() - 20);
    let computed = Hasher::digest(content);
    if computed.as_bytes() == trailer {
        Some(computed)
    } else {
        None
    }
}
