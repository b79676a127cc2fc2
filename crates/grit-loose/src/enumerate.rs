//! Enumeration of loose objects by fan-out directory.

use std::fs;
use std::path::PathBuf;

use grit_hash::ObjectId;

use crate::{LooseError, LooseStore};

/// Iterator over every digest stored loose under an objects directory.
///
/// Walks the 256 two-hex-digit fan-out directories; filenames that do not
/// form a valid digest are skipped silently (temp files, stray editors).
pub struct LooseIter {
    dirs: Vec<PathBuf>,
    current: Option<(String, fs::ReadDir)>,
}

impl LooseStore {
    /// Iterate over all loose objects in this store.
    pub fn iter(&self) -> Result<LooseIter, LooseError> {
        let mut dirs = Vec::new();
        if self.objects_dir().is_dir() {
            for entry in fs::read_dir(self.objects_dir())? {
                let entry = entry?;
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.len() == 2 && name.chars().all(|c| c.is_ascii_hexdigit()) {
                    dirs.push(entry.path());
                }
            }
        }
        dirs.sort();
        dirs.reverse(); // pop from the back in ascending order
        Ok(LooseIter {
            dirs,
            current: None,
        })
    }
}

impl Iterator for LooseIter {
    type Item = Result<ObjectId, LooseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((prefix, rd)) = &mut self.current {
                for entry in rd.by_ref() {
                    let entry = match entry {
                        Ok(e) => e,
                        Err(e) => return Some(Err(LooseError::Io(e))),
                    };
                    let name = entry.file_name();
                    let name = name.to_string_lossy();
                    if name.len() != 38 {
                        continue;
                    }
                    let hex = format!("{prefix}{name}");
                    if let Ok(oid) = ObjectId::from_hex(&hex) {
                        return Some(Ok(oid));
                    }
                }
                self.current = None;
            }

            let dir = self.dirs.pop()?;
            let prefix = dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match fs::read_dir(&dir) {
                Ok(rd) => self.current = Some((prefix, rd)),
                Err(e) => return Some(Err(LooseError::Io(e))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grit_object::ObjectType;

    #[test]
    fn enumerates_written_objects() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());

        let mut written = vec![
            store.write(ObjectType::Blob, b"one").unwrap(),
            store.write(ObjectType::Blob, b"two").unwrap(),
            store.write(ObjectType::Blob, b"three").unwrap(),
        ];
        written.sort();

        let mut seen: Vec<_> = store.iter().unwrap().map(|r| r.unwrap()).collect();
        seen.sort();
        assert_eq!(seen, written);
    }

    #[test]
    fn empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());
        assert_eq!(store.iter().unwrap().count(), 0);
    }

    #[test]
    fn skips_stray_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());
        let oid = store.write(ObjectType::Blob, b"real").unwrap();

        fs::write(dir.path().join("tmp_obj_1234"), b"junk").unwrap();
        fs::create_dir(dir.path().join("pack")).unwrap();
        fs::write(dir.path().join("da").join("not-an-object"), b"junk").ok();
        fs::create_dir_all(dir.path().join("ab")).unwrap();
        fs::write(dir.path().join("ab").join("short"), b"junk").unwrap();

        let seen: Vec<_> = store.iter().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(seen, vec![oid]);
    }
}
