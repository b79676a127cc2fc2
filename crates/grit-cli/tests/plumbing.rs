//! End-to-end plumbing through the binary.

use std::path::Path;
use std::process::{Command, Output};

fn grit(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_grit"))
        .args(args)
        .current_dir(dir)
        .env_remove("GIT_DIR")
        .env_remove("GIT_OBJECT_DIRECTORY")
        .env_remove("GIT_ALTERNATE_OBJECT_DIRECTORIES")
        .env_remove("GIT_INDEX_FILE")
        .output()
        .expect("spawn grit")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn init_hash_cat_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    assert!(grit(dir.path(), &["init", "-q"]).status.success());

    std::fs::write(dir.path().join("hello"), "hello\n").unwrap();
    let out = grit(dir.path(), &["hash-object", "-w", "hello"]);
    assert!(out.status.success());
    let oid = stdout(&out).trim().to_string();
    assert_eq!(oid, "ce013625030ba8dba906f756967f9e9ca394464a");

    let out = grit(dir.path(), &["cat-file", "blob", &oid]);
    assert!(out.status.success());
    assert_eq!(stdout(&out), "hello\n");

    let out = grit(dir.path(), &["cat-file", "-t", &oid]);
    assert_eq!(stdout(&out).trim(), "blob");
    let out = grit(dir.path(), &["cat-file", "-s", &oid]);
    assert_eq!(stdout(&out).trim(), "6");
}

#[test]
fn stage_list_write_tree() {
    let dir = tempfile::tempdir().unwrap();
    assert!(grit(dir.path(), &["init", "-q"]).status.success());

    std::fs::write(dir.path().join("a.txt"), "alpha\n").unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("sub/b.txt"), "beta\n").unwrap();

    assert!(grit(dir.path(), &["update-index", "--add", "a.txt", "sub/b.txt"])
        .status
        .success());

    let out = grit(dir.path(), &["ls-files"]);
    assert_eq!(stdout(&out), "a.txt\nsub/b.txt\n");

    let out = grit(dir.path(), &["ls-files", "--stage"]);
    let listing = stdout(&out);
    assert!(listing.contains("100644"));
    assert!(listing.contains("a.txt"));

    let out = grit(dir.path(), &["write-tree"]);
    assert!(out.status.success());
    let tree = stdout(&out);
    let tree = tree.trim();
    let out = grit(dir.path(), &["cat-file", "-t", tree]);
    assert_eq!(stdout(&out).trim(), "tree");
}

#[test]
fn fsck_reports_damage_and_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    assert!(grit(dir.path(), &["init", "-q"]).status.success());

    std::fs::write(dir.path().join("f"), "payload\n").unwrap();
    let out = grit(dir.path(), &["hash-object", "-w", "f"]);
    let oid = stdout(&out).trim().to_string();

    // Clean store: fsck is quiet about errors (the blob dangles).
    let out = grit(dir.path(), &["fsck"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("dangling"));

    // Damage the object and fsck must fail.
    let path = dir
        .path()
        .join(".git/objects")
        .join(&oid[..2])
        .join(&oid[2..]);
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(0o644);
    }
    std::fs::set_permissions(&path, perms).unwrap();
    let mut bytes = std::fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xff;
    std::fs::write(&path, bytes).unwrap();

    let out = grit(dir.path(), &["fsck"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stdout(&out).contains(&oid));
}

#[test]
fn apply_patch_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    assert!(grit(dir.path(), &["init", "-q"]).status.success());
    std::fs::write(dir.path().join("story"), "once\nupon\na time\n").unwrap();

    let patch = "\
--- a/story
+++ b/story
@@ -1,3 +1,3 @@
 once
-upon
+UPON
 a time
";
    std::fs::write(dir.path().join("fix.patch"), patch).unwrap();

    let out = grit(dir.path(), &["apply", "--check", "fix.patch"]);
    assert!(out.status.success());
    assert_eq!(
        std::fs::read(dir.path().join("story")).unwrap(),
        b"once\nupon\na time\n"
    );

    let out = grit(dir.path(), &["apply", "fix.patch"]);
    assert!(out.status.success());
    assert_eq!(
        std::fs::read(dir.path().join("story")).unwrap(),
        b"once\nUPON\na time\n"
    );
}

#[test]
fn apply_with_index_updates_staging() {
    let dir = tempfile::tempdir().unwrap();
    assert!(grit(dir.path(), &["init", "-q"]).status.success());
    std::fs::write(dir.path().join("code"), "fn main() {}\n").unwrap();
    assert!(grit(dir.path(), &["update-index", "--add", "code"])
        .status
        .success());

    let patch = "\
--- a/code
+++ b/code
@@ -1,1 +1,1 @@
-fn main() {}
+fn main() { run() }
";
    std::fs::write(dir.path().join("c.patch"), patch).unwrap();
    let out = grit(dir.path(), &["apply", "--index", "c.patch"]);
    assert!(out.status.success(), "{:?}", out);

    // The staged digest now matches the patched content.
    let expected = {
        std::fs::write(dir.path().join("expected"), "fn main() { run() }\n").unwrap();
        let out = grit(dir.path(), &["hash-object", "expected"]);
        stdout(&out).trim().to_string()
    };
    let out = grit(dir.path(), &["ls-files", "--stage"]);
    assert!(stdout(&out).contains(&expected));
}

#[test]
fn unknown_object_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    assert!(grit(dir.path(), &["init", "-q"]).status.success());
    let out = grit(
        dir.path(),
        &["cat-file", "blob", "0000000000000000000000000000000000000001"],
    );
    assert_eq!(out.status.code(), Some(128));
    assert!(String::from_utf8_lossy(&out.stderr).contains("fatal"));
}
