//! A single packfile: lazy mapping and entry access.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use memmap2::Mmap;

use crate::index::PackIndex;
use crate::{PackError, PACK_HEADER_SIZE, PACK_SIGNATURE, PACK_VERSION};

/// Mapping state: filled on first use, possibly dropped under budget
/// pressure once no reads are outstanding.
pub(crate) struct MapState {
    pub(crate) map: Option<Arc<Mmap>>,
    pub(crate) use_count: u32,
    pub(crate) last_used: u64,
    validated: bool,
}

/// A packfile with its index.
///
/// The index is mapped eagerly (it is small and consulted for every
/// lookup); the pack data itself is mapped on first use, bracketed by
/// use counts, and may be evicted by the owning [`crate::PackSet`] when
/// the mapped-bytes budget is exceeded.
pub struct PackFile {
    pack_path: PathBuf,
    index: PackIndex,
    pack_size: u64,
    pub(crate) state: Mutex<MapState>,
}

impl PackFile {
    /// Open a pack by its `.pack` path; the `.idx` must sit alongside.
    ///
    /// Only the index is read here. The pack header and trailer are
    /// checked against the index on first map.
    pub fn open(pack_path: impl AsRef<Path>) -> Result<Self, PackError> {
        let pack_path = pack_path.as_ref().to_path_buf();
        let idx_path = pack_path.with_extension("idx");
        let index = PackIndex::open(&idx_path)?;
        let pack_size = std::fs::metadata(&pack_path)?.len();

        let min = (PACK_HEADER_SIZE + 20) as u64;
        if pack_size < min {
            return Err(PackError::InvalidHeader("pack file too small".into()));
        }

        Ok(Self {
            pack_path,
            index,
            pack_size,
            state: Mutex::new(MapState {
                map: None,
                use_count: 0,
                last_used: 0,
                validated: false,
            }),
        })
    }

    /// Map the pack in (if necessary), validate it once, and register one
    /// outstanding use. Returns the mapping and whether it was newly
    /// created (for budget accounting).
    pub(crate) fn map_in(&self, tick: u64) -> Result<(Arc<Mmap>, bool), PackError> {
        let mut state = self.state.lock().unwrap();
        let mut newly_mapped = false;

        if state.map.is_none() {
            let file = std::fs::File::open(&self.pack_path)?;
            let map = unsafe { Mmap::map(&file)? };
            if !state.validated {
                self.validate(&map)?;
                state.validated = true;
            }
            state.map = Some(Arc::new(map));
            newly_mapped = true;
        }

        state.use_count += 1;
        state.last_used = tick;
        let map = state.map.as_ref().unwrap().clone();
        Ok((map, newly_mapped))
    }

    /// Release one outstanding use.
    pub(crate) fn unuse(&self) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(state.use_count > 0);
        state.use_count = state.use_count.saturating_sub(1);
    }

    /// Header and trailer consistency against the index.
    fn validate(&self, data: &Mmap) -> Result<(), PackError> {
        if data.len() < PACK_HEADER_SIZE + 20 {
            return Err(PackError::InvalidHeader("pack file too small".into()));
        }
        if &data[0..4] != PACK_SIGNATURE {
            return Err(PackError::InvalidHeader("bad pack signature".into()));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != PACK_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        let count = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
        if count != self.index.num_objects() {
            return Err(PackError::InvalidHeader(format!(
                "pack has {count} objects but index has {}",
                self.index.num_objects()
            )));
        }
        // The pack's trailing digest must be the one the index recorded.
        let trailer = &data[data.len() - 20..];
        if trailer != self.index.pack_digest().as_bytes() {
            return Err(PackError::PackDigestMismatch(self.pack_path.clone()));
        }
        Ok(())
    }

    /// Does this pack contain the digest?
    pub fn contains(&self, oid: &grit_hash::ObjectId) -> bool {
        self.index.lookup(oid).is_some()
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    pub fn path(&self) -> &Path {
        &self.pack_path
    }

    /// On-disk size of the pack data file.
    pub fn size(&self) -> u64 {
        self.pack_size
    }

    /// The LRU tick of a mapped, idle pack; `None` if unmapped or in use.
    pub(crate) fn evictable_at(&self) -> Option<u64> {
        let state = self.state.lock().unwrap();
        match (&state.map, state.use_count) {
            (Some(_), 0) => Some(state.last_used),
            _ => None,
        }
    }

    /// Drop the mapping if it is idle. Returns the bytes released.
    pub(crate) fn evict(&self) -> Option<u64> {
        let mut state = self.state.lock().unwrap();
        if state.use_count == 0 && state.map.is_some() {
            state.map = None;
            Some(self.pack_size)
        } else {
            None
        }
    }
}
