//! Index file reading (version 2 wire format).

use std::path::Path;

use bstr::BString;
use grit_hash::{Hasher, ObjectId};
use grit_object::FileMode;

use crate::entry::{IndexEntry, StatData};
use crate::{Index, IndexError, Stage};

/// Magic bytes at the start of every index file.
pub(crate) const INDEX_SIGNATURE: &[u8; 4] = b"DIRC";
pub(crate) const INDEX_VERSION: u32 = 2;

/// Fixed-layout prefix of an entry: stat(40) + digest(20) + flags(2).
const ENTRY_FIXED: usize = 62;

/// Load an index file; a missing file is an empty index.
pub(crate) fn load(path: &Path) -> Result<Index, IndexError> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Index::new()),
        Err(e) => return Err(IndexError::Io(e)),
    };
    let data = unsafe { memmap2::Mmap::map(&file)? };
    parse(&data)
}

/// Parse an index image.
pub(crate) fn parse(data: &[u8]) -> Result<Index, IndexError> {
    if data.len() < 12 + 20 {
        return Err(IndexError::InvalidHeader("index file too short".into()));
    }

    // The trailing digest covers everything before it.
    let content = &data[..data.len() - 20];
    let trailer = &data[data.len() - 20..];
    if Hasher::digest(content).as_bytes() != trailer {
        return Err(IndexError::DigestMismatch);
    }

    if &data[0..4] != INDEX_SIGNATURE {
        return Err(IndexError::InvalidHeader(format!(
            "bad signature: {:?}",
            &data[0..4]
        )));
    }
    let version = read_u32(&data[4..]);
    if version != INDEX_VERSION {
        return Err(IndexError::UnsupportedVersion(version));
    }
    let entry_count = read_u32(&data[8..]) as usize;

    let mut cursor = 12;
    let content_end = content.len();
    let mut entries = Vec::with_capacity(entry_count);

    for _ in 0..entry_count {
        let (entry, next) = parse_entry(data, cursor, content_end)?;
        entries.push(entry);
        cursor = next;
    }

    let index = Index { entries };
    // The sort order is an on-disk invariant, not a convention.
    index.check_order()?;
    Ok(index)
}

fn parse_entry(
    data: &[u8],
    start: usize,
    content_end: usize,
) -> Result<(IndexEntry, usize), IndexError> {
    if start + ENTRY_FIXED > content_end {
        return Err(IndexError::InvalidEntry {
            offset: start,
            reason: "entry too short".into(),
        });
    }

    let stat = StatData {
        ctime_secs: read_u32(&data[start..]),
        ctime_nsecs: read_u32(&data[start + 4..]),
        mtime_secs: read_u32(&data[start + 8..]),
        mtime_nsecs: read_u32(&data[start + 12..]),
        dev: read_u32(&data[start + 16..]),
        ino: read_u32(&data[start + 20..]),
        uid: read_u32(&data[start + 28..]),
        gid: read_u32(&data[start + 32..]),
        size: read_u32(&data[start + 36..]),
    };
    let mode_raw = read_u32(&data[start + 24..]);

    let oid = ObjectId::from_bytes(&data[start + 40..start + 60]).map_err(|_| {
        IndexError::InvalidEntry {
            offset: start,
            reason: "invalid digest".into(),
        }
    })?;

    let flags = read_u16(&data[start + 60..]);
    let stage_bits = ((flags >> 12) & 0x03) as u8;
    let name_len_field = (flags & 0x0fff) as usize;

    let stage = Stage::from_u8(stage_bits).ok_or_else(|| IndexError::InvalidEntry {
        offset: start,
        reason: format!("invalid stage {stage_bits}"),
    })?;

    // The name follows, NUL-terminated; the length field is a clamp, not
    // an authority (long names overflow the 12 bits).
    let name_start = start + ENTRY_FIXED;
    let nul = data[name_start..content_end]
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| IndexError::InvalidEntry {
            offset: start,
            reason: "unterminated name".into(),
        })?;
    let path = BString::from(&data[name_start..name_start + nul]);

    if name_len_field < 0x0fff && name_len_field != path.len() {
        return Err(IndexError::InvalidEntry {
            offset: start,
            reason: format!(
                "name length field {} does not match name of {} bytes",
                name_len_field,
                path.len()
            ),
        });
    }

    let entry_size = ondisk_entry_size(path.len());
    let next = start + entry_size;
    if next > content_end {
        return Err(IndexError::InvalidEntry {
            offset: start,
            reason: "entry overruns index".into(),
        });
    }

    let entry = IndexEntry {
        path,
        oid,
        mode: FileMode::from_raw(mode_raw),
        stage,
        stat,
        needs_update: false,
    };
    Ok((entry, next))
}

/// Total on-disk entry size: fixed prefix + name, NUL-padded to the next
/// 8-byte boundary (at least one NUL).
pub(crate) fn ondisk_entry_size(name_len: usize) -> usize {
    (ENTRY_FIXED + name_len + 8) & !7
}

fn read_u32(data: &[u8]) -> u32 {
    u32::from_be_bytes([data[0], data[1], data[2], data[3]])
}

fn read_u16(data: &[u8]) -> u16 {
    u16::from_be_bytes([data[0], data[1]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_sizes_align_to_eight() {
        assert_eq!(ondisk_entry_size(1), 64);
        assert_eq!(ondisk_entry_size(2), 72);
        assert_eq!(ondisk_entry_size(9), 72);
        assert_eq!(ondisk_entry_size(10), 80);
        for len in 1..200 {
            let size = ondisk_entry_size(len);
            assert_eq!(size % 8, 0);
            assert!(size > ENTRY_FIXED + len, "needs at least one NUL");
        }
    }

    #[test]
    fn short_file_rejected() {
        assert!(matches!(
            parse(b"DIRC"),
            Err(IndexError::InvalidHeader(_))
        ));
    }
}
