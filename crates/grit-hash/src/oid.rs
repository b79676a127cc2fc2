use std::fmt;
use std::str::FromStr;

use crate::{HashError, DIGEST_LEN, HEX_LEN};

/// A content digest: the SHA-1 of an object's canonical byte sequence.
///
/// Ordering is plain byte comparison, which is also the order used by pack
/// indices and the object interning table. The hex form is always the
/// 40-character lowercase spelling; parsing accepts either case.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub [u8; DIGEST_LEN]);

impl ObjectId {
    /// The null id (all zeros).
    pub const NULL: Self = Self([0u8; DIGEST_LEN]);

    /// Create an ObjectId from raw digest bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HashError> {
        let mut digest = [0u8; DIGEST_LEN];
        if bytes.len() != digest.len() {
            return Err(HashError::WrongLength(bytes.len()));
        }
        digest.copy_from_slice(bytes);
        Ok(Self(digest))
    }

    /// Parse the 40-character hex spelling of a digest.
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        let malformed = || HashError::MalformedHex(hex.to_string());

        let raw = hex.as_bytes();
        if raw.len() != HEX_LEN {
            return Err(malformed());
        }
        let mut digest = [0u8; DIGEST_LEN];
        for (byte, pair) in digest.iter_mut().zip(raw.chunks_exact(2)) {
            let hi = nibble(pair[0]).ok_or_else(malformed)?;
            let lo = nibble(pair[1]).ok_or_else(malformed)?;
            *byte = (hi << 4) | lo;
        }
        Ok(Self(digest))
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Check if this is the null (all-zeros) id.
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// The hex string representation (lowercase).
    pub fn to_hex(&self) -> String {
        self.to_string()
    }

    /// The first byte of the digest (for fanout table indexing).
    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    /// The loose object path component: `"xx/xxxx..."`.
    pub fn loose_path(&self) -> String {
        let hex = self.to_hex();
        format!("{}/{}", &hex[..2], &hex[2..])
    }
}

/// Value of one hex digit, either case.
fn nibble(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ObjectId({:02x}{:02x}{:02x}{:02x})",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

impl FromStr for ObjectId {
    type Err = HashError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
