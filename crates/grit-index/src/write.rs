//! Index file writing.

use std::io::Write;
use std::path::Path;

use grit_utils::hashed_file::HashedWriter;
use grit_utils::{LockFile, UtilError};

use crate::entry::IndexEntry;
use crate::read::{ondisk_entry_size, INDEX_SIGNATURE, INDEX_VERSION};
use crate::{Index, IndexError};

/// Write the index atomically through its lockfile.
pub(crate) fn save(index: &Index, path: &Path) -> Result<(), IndexError> {
    let mut lock = match LockFile::take(path) {
        Ok(lock) => lock,
        Err(UtilError::Busy(_)) => return Err(IndexError::Busy),
        Err(e) => return Err(IndexError::Lock(e)),
    };

    let mut out = HashedWriter::new(&mut lock);
    out.write_all(INDEX_SIGNATURE)?;
    out.write_all(&INDEX_VERSION.to_be_bytes())?;
    out.write_all(&(index.len() as u32).to_be_bytes())?;

    for entry in index.iter() {
        write_entry(&mut out, entry)?;
    }

    out.finish_with_trailer()?;
    lock.commit().map_err(IndexError::Lock)?;
    Ok(())
}

/// One fixed-layout entry: stat, digest, flags, name, NUL padding.
fn write_entry(out: &mut impl Write, entry: &IndexEntry) -> std::io::Result<()> {
    out.write_all(&entry.stat.ctime_secs.to_be_bytes())?;
    out.write_all(&entry.stat.ctime_nsecs.to_be_bytes())?;
    out.write_all(&entry.stat.mtime_secs.to_be_bytes())?;
    out.write_all(&entry.stat.mtime_nsecs.to_be_bytes())?;
    out.write_all(&entry.stat.dev.to_be_bytes())?;
    out.write_all(&entry.stat.ino.to_be_bytes())?;
    out.write_all(&entry.mode.raw().to_be_bytes())?;
    out.write_all(&entry.stat.uid.to_be_bytes())?;
    out.write_all(&entry.stat.gid.to_be_bytes())?;
    out.write_all(&entry.stat.size.to_be_bytes())?;

    out.write_all(entry.oid.as_bytes())?;

    let name_len = entry.path.len().min(0x0fff) as u16;
    let flags: u16 = name_len | ((entry.stage.as_u8() as u16) << 12);
    out.write_all(&flags.to_be_bytes())?;

    out.write_all(&entry.path)?;

    let written = 62 + entry.path.len();
    let padding = ondisk_entry_size(entry.path.len()) - written;
    out.write_all(&[0u8; 8][..padding])?;
    Ok(())
}
