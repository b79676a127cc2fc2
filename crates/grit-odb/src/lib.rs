//! Unified object database.
//!
//! One interface over the union of the primary object directory, a chain
//! of alternate directories, and the packs under each. Loose storage is
//! searched first, then packs, in chain order. Writes always land loose
//! in the primary directory.

pub mod alternates;
mod cache;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use grit_hash::ObjectId;
use grit_loose::LooseStore;
use grit_object::{Object, ObjectType};
use grit_pack::PackSet;

use cache::ObjectCache;

/// Errors from unified object database operations.
#[derive(Debug, thiserror::Error)]
pub enum OdbError {
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    #[error("corrupt object {oid}: {reason}")]
    Corrupt { oid: ObjectId, reason: String },

    #[error(transparent)]
    Loose(#[from] grit_loose::LooseError),

    #[error(transparent)]
    Pack(#[from] grit_pack::PackError),

    #[error("object parse error: {0}")]
    Object(#[from] grit_object::ObjectError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Lightweight object info (type + size, no content).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectInfo {
    pub obj_type: ObjectType,
    pub size: usize,
}

/// One object directory: its loose store and its packs.
pub struct OdbLayer {
    dir: PathBuf,
    loose: LooseStore,
    packs: PackSet,
}

impl OdbLayer {
    fn open(dir: impl AsRef<Path>) -> Result<Self, OdbError> {
        let dir = dir.as_ref().to_path_buf();
        let loose = LooseStore::open(&dir);
        let packs = PackSet::open_dir(dir.join("pack"))?;
        Ok(Self { dir, loose, packs })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn loose(&self) -> &LooseStore {
        &self.loose
    }

    pub fn packs(&self) -> &PackSet {
        &self.packs
    }
}

/// Unified object database across the primary directory and alternates.
pub struct ObjectDb {
    primary: OdbLayer,
    alternates: Vec<OdbLayer>,
    cache: Mutex<ObjectCache>,
}

impl ObjectDb {
    /// Open the database rooted at `objects_dir`. The alternates chain is
    /// taken from `GIT_ALTERNATE_OBJECT_DIRECTORIES` (colon-separated).
    pub fn open(objects_dir: impl AsRef<Path>) -> Result<Self, OdbError> {
        let chain = std::env::var("GIT_ALTERNATE_OBJECT_DIRECTORIES")
            .map(|v| alternates::parse_chain(&v))
            .unwrap_or_default();
        Self::open_with_alternates(objects_dir, &chain)
    }

    /// Open with an explicit alternates chain.
    pub fn open_with_alternates(
        objects_dir: impl AsRef<Path>,
        chain: &[PathBuf],
    ) -> Result<Self, OdbError> {
        let primary = OdbLayer::open(objects_dir)?;
        let mut alternates = Vec::with_capacity(chain.len());
        for dir in chain {
            // A vanished alternate just drops out of the search path.
            if dir.is_dir() {
                alternates.push(OdbLayer::open(dir)?);
            }
        }
        Ok(Self {
            primary,
            alternates,
            cache: Mutex::new(ObjectCache::new(1024)),
        })
    }

    /// Every layer in search order: primary first, then the chain.
    pub fn layers(&self) -> impl Iterator<Item = &OdbLayer> {
        std::iter::once(&self.primary).chain(self.alternates.iter())
    }

    pub fn primary(&self) -> &OdbLayer {
        &self.primary
    }

    /// Does any layer hold the object?
    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.layers()
            .any(|l| l.loose.contains(oid) || l.packs.contains(oid))
    }

    /// Read an object's type and content (loose everywhere first, then
    /// packs). `Ok(None)` when nothing holds the digest.
    pub fn read(&self, oid: &ObjectId) -> Result<Option<(ObjectType, Vec<u8>)>, OdbError> {
        for layer in self.layers() {
            if let Some(found) = layer.loose.read(oid)? {
                return Ok(Some(found));
            }
        }
        for layer in self.layers() {
            if let Some(found) = layer.packs.read(oid)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Read and fail with `NotFound` when absent.
    pub fn read_required(&self, oid: &ObjectId) -> Result<(ObjectType, Vec<u8>), OdbError> {
        self.read(oid)?.ok_or(OdbError::NotFound(*oid))
    }

    /// Read and parse, with an LRU cache over parsed objects.
    pub fn read_object(&self, oid: &ObjectId) -> Result<Option<Object>, OdbError> {
        {
            let mut cache = self.cache.lock().unwrap();
            if let Some(obj) = cache.get(oid) {
                return Ok(Some(obj.clone()));
            }
        }

        let Some((obj_type, content)) = self.read(oid)? else {
            return Ok(None);
        };
        let obj = Object::parse_content(obj_type, &content)?;

        let mut cache = self.cache.lock().unwrap();
        cache.insert(*oid, obj.clone());
        Ok(Some(obj))
    }

    /// Type and size without materializing pack payloads.
    pub fn info(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, OdbError> {
        for layer in self.layers() {
            if let Some((obj_type, size)) = layer.loose.read_header(oid)? {
                return Ok(Some(ObjectInfo { obj_type, size }));
            }
        }
        for layer in self.layers() {
            if let Some((obj_type, size)) = layer.packs.info(oid)? {
                return Ok(Some(ObjectInfo { obj_type, size }));
            }
        }
        Ok(None)
    }

    /// Store content as a new loose object in the primary directory.
    pub fn write(&self, obj_type: ObjectType, content: &[u8]) -> Result<ObjectId, OdbError> {
        Ok(self.primary.loose.write(obj_type, content)?)
    }

    /// Store a parsed object.
    pub fn write_object(&self, obj: &Object) -> Result<ObjectId, OdbError> {
        self.write(obj.object_type(), &obj.serialize_content())
    }

    /// Ingest a verified loose-object stream into the primary directory.
    pub fn stream_copy(
        &self,
        reader: &mut dyn std::io::Read,
        expected: &ObjectId,
    ) -> Result<ObjectId, OdbError> {
        Ok(self.primary.loose.stream_copy(reader, expected)?)
    }

    /// Every digest stored anywhere: loose and packed, all layers.
    ///
    /// Duplicates are possible when the same object is both loose and
    /// packed; callers that care deduplicate.
    pub fn iter_all_oids(&self) -> Result<Vec<ObjectId>, OdbError> {
        let mut oids = Vec::new();
        for layer in self.layers() {
            for oid in layer.loose.iter()? {
                oids.push(oid?);
            }
            for pack in layer.packs.packs() {
                for (oid, _offset) in pack.index().iter() {
                    oids.push(oid);
                }
            }
        }
        oids.sort();
        oids.dedup();
        Ok(oids)
    }

    /// Digests present only loose or only packed, for integrity passes
    /// that treat pack-resident objects separately ("standalone" mode).
    pub fn iter_loose_oids(&self) -> Result<Vec<ObjectId>, OdbError> {
        let mut oids = Vec::new();
        for layer in self.layers() {
            for oid in layer.loose.iter()? {
                oids.push(oid?);
            }
        }
        oids.sort();
        oids.dedup();
        Ok(oids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_blob() {
        let dir = tempfile::tempdir().unwrap();
        let odb = ObjectDb::open_with_alternates(dir.path(), &[]).unwrap();

        let oid = odb.write(ObjectType::Blob, b"hello\n").unwrap();
        assert_eq!(oid.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
        assert!(odb.contains(&oid));

        let (ty, content) = odb.read(&oid).unwrap().unwrap();
        assert_eq!(ty, ObjectType::Blob);
        assert_eq!(content, b"hello\n");

        let info = odb.info(&oid).unwrap().unwrap();
        assert_eq!(info.obj_type, ObjectType::Blob);
        assert_eq!(info.size, 6);
    }

    #[test]
    fn read_required_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let odb = ObjectDb::open_with_alternates(dir.path(), &[]).unwrap();
        let ghost = ObjectId::from_hex("0000000000000000000000000000000000000042").unwrap();
        assert!(matches!(
            odb.read_required(&ghost),
            Err(OdbError::NotFound(oid)) if oid == ghost
        ));
    }

    #[test]
    fn parsed_reads_are_cached() {
        let dir = tempfile::tempdir().unwrap();
        let odb = ObjectDb::open_with_alternates(dir.path(), &[]).unwrap();
        let oid = odb.write(ObjectType::Blob, b"cache me").unwrap();

        let first = odb.read_object(&oid).unwrap().unwrap();
        let second = odb.read_object(&oid).unwrap().unwrap();
        assert_eq!(first, second);
    }
}
