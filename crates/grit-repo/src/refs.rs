//! Loose ref reading.
//!
//! A ref file holds a 40-hex digest and a newline. `HEAD` is either a
//! symbolic link into `refs/heads/` or a file reading `ref: <name>`.

use std::fs;
use std::path::{Path, PathBuf};

use grit_hash::ObjectId;

use crate::RepoError;

/// One loose ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefEntry {
    /// Name relative to the repository directory, e.g. `refs/heads/master`.
    pub name: String,
    pub target: ObjectId,
}

/// Read one ref file into a digest.
pub fn read_ref(git_dir: &Path, name: &str) -> Result<Option<ObjectId>, RepoError> {
    let path = git_dir.join(name);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RepoError::Io(e)),
    };
    let hex = content.trim_end();
    ObjectId::from_hex(hex)
        .map(Some)
        .map_err(|_| RepoError::BadRef {
            name: name.to_string(),
            reason: format!("not a digest: {hex:?}"),
        })
}

/// Resolve HEAD to a digest, following one level of `ref: ` indirection
/// (or a symlink). A HEAD naming a branch with no commits yet is `None`.
pub fn resolve_head(git_dir: &Path) -> Result<Option<ObjectId>, RepoError> {
    let head_path = git_dir.join("HEAD");

    // Symlinked HEAD points directly at the ref file.
    if let Ok(meta) = fs::symlink_metadata(&head_path) {
        if meta.file_type().is_symlink() {
            let target = fs::read_link(&head_path)?;
            let name = target.to_string_lossy().into_owned();
            return read_ref(git_dir, &name);
        }
    }

    let content = match fs::read_to_string(&head_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RepoError::Io(e)),
    };
    let content = content.trim_end();

    if let Some(name) = content.strip_prefix("ref: ") {
        return read_ref(git_dir, name.trim());
    }

    // Detached: HEAD holds the digest itself.
    ObjectId::from_hex(content)
        .map(Some)
        .map_err(|_| RepoError::BadRef {
            name: "HEAD".into(),
            reason: format!("not a ref or digest: {content:?}"),
        })
}

/// Enumerate every loose ref under `refs/`, sorted by name.
pub fn enumerate(git_dir: &Path) -> Result<Vec<RefEntry>, RepoError> {
    let refs_dir = git_dir.join("refs");
    let mut out = Vec::new();
    if refs_dir.is_dir() {
        walk(&refs_dir, &refs_dir, git_dir, &mut out)?;
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

fn walk(
    dir: &Path,
    refs_root: &Path,
    git_dir: &Path,
    out: &mut Vec<RefEntry>,
) -> Result<(), RepoError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk(&path, refs_root, git_dir, out)?;
        } else {
            let rel: PathBuf = path
                .strip_prefix(git_dir)
                .unwrap_or(&path)
                .to_path_buf();
            let name = rel.to_string_lossy().into_owned();
            if let Some(target) = read_ref(git_dir, &name)? {
                out.push(RefEntry { name, target });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "ce013625030ba8dba906f756967f9e9ca394464a";

    fn setup() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path().join(".git");
        fs::create_dir_all(git_dir.join("refs/heads")).unwrap();
        fs::create_dir_all(git_dir.join("refs/tags")).unwrap();
        (dir, git_dir)
    }

    #[test]
    fn read_plain_ref() {
        let (_keep, git_dir) = setup();
        fs::write(
            git_dir.join("refs/heads/master"),
            format!("{DIGEST}\n"),
        )
        .unwrap();

        let oid = read_ref(&git_dir, "refs/heads/master").unwrap().unwrap();
        assert_eq!(oid.to_hex(), DIGEST);
        assert_eq!(read_ref(&git_dir, "refs/heads/absent").unwrap(), None);
    }

    #[test]
    fn head_through_ref_file() {
        let (_keep, git_dir) = setup();
        fs::write(git_dir.join("HEAD"), b"ref: refs/heads/master\n").unwrap();
        assert_eq!(resolve_head(&git_dir).unwrap(), None);

        fs::write(git_dir.join("refs/heads/master"), format!("{DIGEST}\n")).unwrap();
        let oid = resolve_head(&git_dir).unwrap().unwrap();
        assert_eq!(oid.to_hex(), DIGEST);
    }

    #[test]
    fn detached_head() {
        let (_keep, git_dir) = setup();
        fs::write(git_dir.join("HEAD"), format!("{DIGEST}\n")).unwrap();
        let oid = resolve_head(&git_dir).unwrap().unwrap();
        assert_eq!(oid.to_hex(), DIGEST);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_head() {
        let (_keep, git_dir) = setup();
        fs::write(git_dir.join("refs/heads/trunk"), format!("{DIGEST}\n")).unwrap();
        std::os::unix::fs::symlink("refs/heads/trunk", git_dir.join("HEAD")).unwrap();
        let oid = resolve_head(&git_dir).unwrap().unwrap();
        assert_eq!(oid.to_hex(), DIGEST);
    }

    #[test]
    fn enumerate_sorted() {
        let (_keep, git_dir) = setup();
        fs::write(git_dir.join("refs/heads/zeta"), format!("{DIGEST}\n")).unwrap();
        fs::write(git_dir.join("refs/heads/alpha"), format!("{DIGEST}\n")).unwrap();
        fs::write(git_dir.join("refs/tags/v1"), format!("{DIGEST}\n")).unwrap();

        let refs = enumerate(&git_dir).unwrap();
        let names: Vec<_> = refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["refs/heads/alpha", "refs/heads/zeta", "refs/tags/v1"]
        );
    }

    #[test]
    fn garbage_ref_is_an_error() {
        let (_keep, git_dir) = setup();
        fs::write(git_dir.join("refs/heads/bad"), b"not a digest\n").unwrap();
        assert!(matches!(
            read_ref(&git_dir, "refs/heads/bad"),
            Err(RepoError::BadRef { .. })
        ));
    }
}
