//! The set of packs under one objects directory, with the mapping budget.

use std::io::Read;
use std::ops::Deref;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use flate2::bufread::ZlibDecoder;
use grit_hash::{Hasher, ObjectId};
use grit_object::ObjectType;
use memmap2::Mmap;

use crate::entry::parse_entry_header;
use crate::pack::PackFile;
use crate::{delta, PackEntryType, PackError, MAX_DELTA_CHAIN_DEPTH, PACK_MAPPED_LIMIT};

/// All packs of one objects directory.
///
/// Reads are bracketed by use counts; when the cumulative mapped bytes
/// exceed the soft cap, the least-recently-used idle mapping is dropped.
/// A mapping with an outstanding read is never evicted.
pub struct PackSet {
    packs: Vec<PackFile>,
    mapped_bytes: Mutex<u64>,
    tick: AtomicU64,
    budget: u64,
}

/// Guard over one pack's mapped data; releases the use count on drop.
pub struct PackData<'a> {
    pack: &'a PackFile,
    map: Arc<Mmap>,
}

impl Deref for PackData<'_> {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.map
    }
}

impl Drop for PackData<'_> {
    fn drop(&mut self) {
        self.pack.unuse();
    }
}

impl PackSet {
    /// Scan a `pack/` directory for `.idx` files and open each pack.
    ///
    /// Packs whose index fails validation are skipped; their objects are
    /// simply not served from here.
    pub fn open_dir(pack_dir: impl AsRef<Path>) -> Result<Self, PackError> {
        let pack_dir = pack_dir.as_ref();
        let mut packs = Vec::new();

        if pack_dir.is_dir() {
            let mut idx_paths: Vec<_> = std::fs::read_dir(pack_dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "idx"))
                .collect();
            idx_paths.sort();

            for idx_path in idx_paths {
                let pack_path = idx_path.with_extension("pack");
                if !pack_path.is_file() {
                    continue;
                }
                if let Ok(pack) = PackFile::open(&pack_path) {
                    packs.push(pack);
                }
            }
        }

        Ok(Self {
            packs,
            mapped_bytes: Mutex::new(0),
            tick: AtomicU64::new(0),
            budget: PACK_MAPPED_LIMIT,
        })
    }

    /// Override the mapped-bytes budget (tests exercise tiny budgets).
    pub fn set_budget(&mut self, bytes: u64) {
        self.budget = bytes;
    }

    pub fn packs(&self) -> &[PackFile] {
        &self.packs
    }

    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }

    /// Does any pack resolve the digest?
    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.packs.iter().any(|p| p.contains(oid))
    }

    /// Total bytes currently mapped.
    pub fn mapped_bytes(&self) -> u64 {
        *self.mapped_bytes.lock().unwrap()
    }

    /// Bracket a read: map the pack in and pin it for the guard's lifetime.
    pub fn use_pack(&self, pack_ix: usize) -> Result<PackData<'_>, PackError> {
        let pack = &self.packs[pack_ix];
        let tick = self.tick.fetch_add(1, Ordering::Relaxed) + 1;
        let (map, newly_mapped) = pack.map_in(tick)?;

        if newly_mapped {
            let mut mapped = self.mapped_bytes.lock().unwrap();
            *mapped += pack.size();
            // Evict LRU idle mappings until we fit again (or nothing is
            // evictable; pinned mappings stay put).
            while *mapped > self.budget {
                let victim = self
                    .packs
                    .iter()
                    .enumerate()
                    .filter(|(ix, _)| *ix != pack_ix)
                    .filter_map(|(ix, p)| p.evictable_at().map(|at| (at, ix)))
                    .min();
                match victim {
                    Some((_, ix)) => match self.packs[ix].evict() {
                        Some(freed) => *mapped -= freed,
                        None => break,
                    },
                    None => break,
                }
            }
        }

        Ok(PackData { pack, map })
    }

    /// Read an object by digest out of whichever pack holds it.
    pub fn read(&self, oid: &ObjectId) -> Result<Option<(ObjectType, Vec<u8>)>, PackError> {
        for (ix, pack) in self.packs.iter().enumerate() {
            if let Some(offset) = pack.index().lookup(oid) {
                return self.read_at(ix, offset).map(Some);
            }
        }
        Ok(None)
    }

    /// Type and reconstructed size by digest, without materializing the
    /// payload. For a delta entry only its size prologue is inflated.
    pub fn info(&self, oid: &ObjectId) -> Result<Option<(ObjectType, usize)>, PackError> {
        for (ix, pack) in self.packs.iter().enumerate() {
            if let Some(offset) = pack.index().lookup(oid) {
                return self.info_at(ix, offset).map(Some);
            }
        }
        Ok(None)
    }

    /// Resolve an entry at a pack offset, applying the delta chain.
    ///
    /// Delta bases must live in the same pack; a base the pack's index
    /// does not know fails with `DeltaBaseMissing`.
    fn read_at(&self, pack_ix: usize, offset: u64) -> Result<(ObjectType, Vec<u8>), PackError> {
        let pack = &self.packs[pack_ix];
        let data = self.use_pack(pack_ix)?;

        let mut chain: Vec<Vec<u8>> = Vec::new();
        let mut at = offset;

        for _depth in 0..MAX_DELTA_CHAIN_DEPTH {
            let entry = parse_entry_header(&data, at)?;
            let payload = inflate_entry(&data, entry.data_offset, entry.inflated_size, at)?;

            match entry.entry_type {
                PackEntryType::Delta { base } => {
                    chain.push(payload);
                    match pack.index().lookup(&base) {
                        Some(base_offset) => at = base_offset,
                        None => return Err(PackError::DeltaBaseMissing(base)),
                    }
                }
                plain => {
                    let obj_type = plain.to_object_type().expect("non-delta entry type");
                    let mut bytes = payload;
                    for d in chain.iter().rev() {
                        bytes = delta::apply(&bytes, d)?;
                    }
                    return Ok((obj_type, bytes));
                }
            }
        }

        Err(PackError::DeltaChainTooDeep {
            offset,
            max_depth: MAX_DELTA_CHAIN_DEPTH,
        })
    }

    /// Like `read_at` but resolves only headers: the type comes from the
    /// chain's base entry, the size from the outermost delta prologue.
    fn info_at(&self, pack_ix: usize, offset: u64) -> Result<(ObjectType, usize), PackError> {
        let pack = &self.packs[pack_ix];
        let data = self.use_pack(pack_ix)?;

        let mut result_size: Option<usize> = None;
        let mut at = offset;

        for _depth in 0..MAX_DELTA_CHAIN_DEPTH {
            let entry = parse_entry_header(&data, at)?;
            match entry.entry_type {
                PackEntryType::Delta { base } => {
                    if result_size.is_none() {
                        let prologue =
                            inflate_prefix(&data, entry.data_offset, 2 * 10, at)?;
                        let (_base_size, result) = delta::read_sizes(&prologue)?;
                        result_size = Some(result);
                    }
                    match pack.index().lookup(&base) {
                        Some(base_offset) => at = base_offset,
                        None => return Err(PackError::DeltaBaseMissing(base)),
                    }
                }
                plain => {
                    let obj_type = plain.to_object_type().expect("non-delta entry type");
                    return Ok((obj_type, result_size.unwrap_or(entry.inflated_size)));
                }
            }
        }

        Err(PackError::DeltaChainTooDeep {
            offset,
            max_depth: MAX_DELTA_CHAIN_DEPTH,
        })
    }

    /// Full validity check of one pack: index digest, pack digest, and
    /// the index/pack digest cross-reference.
    pub fn verify_pack(&self, pack_ix: usize) -> Result<(), PackError> {
        let pack = &self.packs[pack_ix];
        pack.index().verify()?;

        let data = self.use_pack(pack_ix)?;
        let computed = Hasher::digest(&data[..data.len() - 20]);
        if computed.as_bytes() != &data[data.len() - 20..] {
            return Err(PackError::PackDigestMismatch(pack.path().to_path_buf()));
        }
        // map_in already checked trailer == index.pack_digest; re-assert to
        // keep this entry point self-contained.
        if computed != pack.index().pack_digest() {
            return Err(PackError::PackDigestMismatch(pack.path().to_path_buf()));
        }
        Ok(())
    }
}

/// Inflate one entry's zlib stream, insisting on the declared size.
fn inflate_entry(
    data: &[u8],
    data_offset: u64,
    declared: usize,
    entry_offset: u64,
) -> Result<Vec<u8>, PackError> {
    let mut decoder = ZlibDecoder::new(&data[data_offset as usize..]);
    let mut out = Vec::with_capacity(declared);
    decoder
        .read_to_end(&mut out)
        .map_err(|_| PackError::CorruptEntry(entry_offset))?;
    if out.len() != declared {
        return Err(PackError::CorruptEntry(entry_offset));
    }
    Ok(out)
}

/// Inflate at most `max` bytes of an entry's stream (for delta prologues).
fn inflate_prefix(
    data: &[u8],
    data_offset: u64,
    max: usize,
    entry_offset: u64,
) -> Result<Vec<u8>, PackError> {
    let mut decoder = ZlibDecoder::new(&data[data_offset as usize..]);
    let mut out = vec![0u8; max];
    let mut filled = 0;
    while filled < max {
        let n = decoder
            .read(&mut out[filled..])
            .map_err(|_| PackError::CorruptEntry(entry_offset))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    out.truncate(filled);
    Ok(out)
}
