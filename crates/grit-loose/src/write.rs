use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::ZlibEncoder;
use grit_hash::{Hasher, ObjectId};
use grit_object::{header, ObjectType};

use crate::{LooseError, LooseStore};

impl LooseStore {
    /// Write content with a known type. Returns the digest.
    ///
    /// Idempotent: writing an object that already exists is a no-op. The
    /// file becomes visible atomically via link (rename across devices),
    /// so readers either see nothing or a complete object. A concurrent
    /// writer racing on the same digest also succeeds.
    pub fn write(&self, obj_type: ObjectType, content: &[u8]) -> Result<ObjectId, LooseError> {
        let hdr = header::write_header(obj_type, content.len());

        let oid = {
            let mut hasher = Hasher::new();
            hasher.update(&hdr);
            hasher.update(content);
            hasher.finalize()
        };

        if self.contains(&oid) {
            return Ok(oid);
        }

        let final_path = self.object_path(&oid);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Deflate into a temp file in the objects dir (same filesystem).
        let tmp_path = self.write_to_temp(&hdr, content)?;
        link_into_place(&tmp_path, &final_path)?;

        Ok(oid)
    }

    /// Compress header + content into a uniquely named temp file.
    fn write_to_temp(&self, hdr: &[u8], content: &[u8]) -> Result<PathBuf, LooseError> {
        let tmp_path = self.objects_dir().join(format!(
            "tmp_obj_{}",
            std::process::id()
                ^ std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .subsec_nanos()
        ));

        let file = fs::File::create(&tmp_path)?;
        let mut encoder = ZlibEncoder::new(file, self.compression);
        encoder.write_all(hdr)?;
        encoder.write_all(content)?;
        encoder.finish()?;

        // Objects are immutable once written (0444).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o444))?;
        }

        Ok(tmp_path)
    }
}

/// Move a finished temp file to its content-addressed location.
///
/// `link` then `unlink` keeps the visible path complete at all times;
/// `EEXIST` means another writer stored the same content first, which is
/// success. Cross-device setups fall back to `rename`.
fn link_into_place(tmp: &Path, final_path: &Path) -> Result<(), LooseError> {
    match fs::hard_link(tmp, final_path) {
        Ok(()) => {
            let _ = fs::remove_file(tmp);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            let _ = fs::remove_file(tmp);
            Ok(())
        }
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            match fs::rename(tmp, final_path) {
                Ok(()) => Ok(()),
                Err(_) if final_path.exists() => {
                    let _ = fs::remove_file(tmp);
                    Ok(())
                }
                Err(e) => {
                    let _ = fs::remove_file(tmp);
                    Err(LooseError::Io(e))
                }
            }
        }
        Err(_) if final_path.exists() => {
            // Some filesystems report the race differently; the object
            // being present is all that matters.
            let _ = fs::remove_file(tmp);
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(tmp);
            Err(LooseError::Io(e))
        }
    }
}
