use std::cmp::Ordering;

use bstr::{BStr, BString, ByteSlice};
use grit_hash::ObjectId;

use crate::ObjectError;

/// File mode for tree entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// Regular file (100644)
    Regular,
    /// Executable file (100755)
    Executable,
    /// Symbolic link (120000)
    Symlink,
    /// Commit placeholder in a tree (160000)
    Gitlink,
    /// Subdirectory (040000)
    Tree,
    /// Non-standard mode, preserved byte-for-byte for round-trip
    Other(u32),
}

impl FileMode {
    /// Parse from octal ASCII bytes (e.g., `b"100644"`).
    pub fn from_bytes(s: &[u8]) -> Result<Self, ObjectError> {
        let raw = parse_octal(s)
            .ok_or_else(|| ObjectError::InvalidFileMode(String::from_utf8_lossy(s).into()))?;
        Ok(Self::from_raw(raw))
    }

    /// Create from the raw numeric value.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0o100644 => Self::Regular,
            0o100755 => Self::Executable,
            0o120000 => Self::Symlink,
            0o160000 => Self::Gitlink,
            0o040000 => Self::Tree,
            other => Self::Other(other),
        }
    }

    /// Serialize to octal ASCII (no leading zero for directories).
    pub fn as_bytes(&self) -> BString {
        BString::from(format!("{:o}", self.raw()))
    }

    /// The raw numeric value.
    pub fn raw(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Gitlink => 0o160000,
            Self::Tree => 0o40000,
            Self::Other(v) => *v,
        }
    }

    /// Is this a directory entry?
    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Tree) || (self.raw() & 0o170000) == 0o040000
    }

    /// Is this a file entry?
    pub fn is_blob(&self) -> bool {
        matches!(self, Self::Regular | Self::Executable)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self, Self::Symlink)
    }

    pub fn is_gitlink(&self) -> bool {
        matches!(self, Self::Gitlink)
    }

    /// One of the modes a well-formed tree is expected to carry.
    ///
    /// 100664 survives in old archives; callers decide whether to tolerate
    /// it (it is a warning, not an error, unless strict checking is on).
    pub fn is_standard(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

/// Parse an octal ASCII string to u32.
fn parse_octal(s: &[u8]) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    let mut val: u32 = 0;
    for &b in s {
        if !(b'0'..=b'7').contains(&b) {
            return None;
        }
        val = val.checked_mul(8)?.checked_add(u32::from(b - b'0'))?;
    }
    Some(val)
}

/// A single entry in a tree object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: FileMode,
    pub name: BString,
    pub oid: ObjectId,
}

impl TreeEntry {
    pub fn is_tree(&self) -> bool {
        self.mode.is_tree()
    }

    /// Compare entries using canonical tree ordering.
    pub fn cmp_entries(a: &TreeEntry, b: &TreeEntry) -> Ordering {
        base_name_compare(a.name.as_ref(), a.is_tree(), b.name.as_ref(), b.is_tree())
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        Self::cmp_entries(self, other)
    }
}

/// Canonical tree entry name comparison.
///
/// Directory names compare as if they carried a trailing `/`: the file
/// `"a.c"` sorts before the directory `"a"` because `'.' < '/'`.
fn base_name_compare(name1: &[u8], is_dir1: bool, name2: &[u8], is_dir2: bool) -> Ordering {
    let min_len = name1.len().min(name2.len());
    let cmp = name1[..min_len].cmp(&name2[..min_len]);
    if cmp != Ordering::Equal {
        return cmp;
    }
    let c1 = if name1.len() > min_len {
        name1[min_len]
    } else if is_dir1 {
        b'/'
    } else {
        0
    };
    let c2 = if name2.len() > min_len {
        name2[min_len]
    } else if is_dir2 {
        b'/'
    } else {
        0
    };
    c1.cmp(&c2)
}

/// Verdict on a successive pair of tree entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOrder {
    Ordered,
    /// The pair is out of canonical order.
    Unordered,
    /// The pair shares one name; a file/directory pair with the same name
    /// counts as a duplicate too.
    Duplicate,
}

/// Check the canonical ordering of a successive entry pair.
pub fn entry_order(a: &TreeEntry, b: &TreeEntry) -> EntryOrder {
    let name1: &[u8] = a.name.as_ref();
    let name2: &[u8] = b.name.as_ref();
    let min_len = name1.len().min(name2.len());
    match name1[..min_len].cmp(&name2[..min_len]) {
        Ordering::Less => return EntryOrder::Ordered,
        Ordering::Greater => return EntryOrder::Unordered,
        Ordering::Equal => {}
    }
    if name1.len() == name2.len() {
        // Identical names, whatever the modes say.
        return EntryOrder::Duplicate;
    }
    let c1 = if name1.len() > min_len {
        name1[min_len]
    } else if a.is_tree() {
        b'/'
    } else {
        0
    };
    let c2 = if name2.len() > min_len {
        name2[min_len]
    } else if b.is_tree() {
        b'/'
    } else {
        0
    };
    if c1 < c2 {
        EntryOrder::Ordered
    } else {
        EntryOrder::Unordered
    }
}

/// A tree object, one directory level.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse tree content from the binary format.
    ///
    /// Each entry is `<octal-mode> <name>\0<20-byte digest>`. Ordering is
    /// not enforced here; [`Tree::check_order`] reports on it so that
    /// integrity tools can examine malformed trees instead of refusing to
    /// load them.
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let mut entries = Vec::new();
        let mut pos = 0;

        while pos < content.len() {
            let space_pos = content[pos..]
                .iter()
                .position(|&b| b == b' ')
                .ok_or_else(|| ObjectError::InvalidTreeEntry {
                    offset: pos,
                    reason: "missing space after mode".into(),
                })?
                + pos;

            let mode = FileMode::from_bytes(&content[pos..space_pos]).map_err(|_| {
                ObjectError::InvalidTreeEntry {
                    offset: pos,
                    reason: "invalid mode".into(),
                }
            })?;

            let name_start = space_pos + 1;
            let null_pos = content[name_start..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| ObjectError::InvalidTreeEntry {
                    offset: name_start,
                    reason: "missing null after name".into(),
                })?
                + name_start;

            let name = BString::from(&content[name_start..null_pos]);
            if name.is_empty() {
                return Err(ObjectError::InvalidTreeEntry {
                    offset: name_start,
                    reason: "empty name".into(),
                });
            }

            let oid_start = null_pos + 1;
            if oid_start + 20 > content.len() {
                return Err(ObjectError::InvalidTreeEntry {
                    offset: oid_start,
                    reason: "truncated digest".into(),
                });
            }
            let oid = ObjectId::from_bytes(&content[oid_start..oid_start + 20])?;

            entries.push(TreeEntry { mode, name, oid });
            pos = oid_start + 20;
        }

        Ok(Self { entries })
    }

    /// Serialize tree content, entries in canonical order.
    pub fn serialize_content(&self) -> Vec<u8> {
        let mut sorted = self.entries.clone();
        sorted.sort();

        let mut out = Vec::new();
        for entry in &sorted {
            out.extend_from_slice(&entry.mode.as_bytes());
            out.push(b' ');
            out.extend_from_slice(&entry.name);
            out.push(0);
            out.extend_from_slice(entry.oid.as_bytes());
        }
        out
    }

    /// Sort entries into canonical order.
    pub fn sort(&mut self) {
        self.entries.sort();
    }

    /// Scan successive entry pairs for ordering violations.
    ///
    /// Returns the worst finding: `Duplicate` dominates `Unordered`.
    pub fn check_order(&self) -> EntryOrder {
        let mut worst = EntryOrder::Ordered;
        for pair in self.entries.windows(2) {
            match entry_order(&pair[0], &pair[1]) {
                EntryOrder::Duplicate => return EntryOrder::Duplicate,
                EntryOrder::Unordered => worst = EntryOrder::Unordered,
                EntryOrder::Ordered => {}
            }
        }
        worst
    }

    /// Lookup an entry by name.
    pub fn find(&self, name: &BStr) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name.as_bstr() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(mode: FileMode, name: &str) -> TreeEntry {
        TreeEntry {
            mode,
            name: BString::from(name),
            oid: ObjectId::NULL,
        }
    }

    #[test]
    fn file_mode_roundtrip() {
        for mode in [
            FileMode::Regular,
            FileMode::Executable,
            FileMode::Symlink,
            FileMode::Gitlink,
            FileMode::Tree,
        ] {
            assert_eq!(FileMode::from_bytes(&mode.as_bytes()).unwrap(), mode);
        }
        assert_eq!(FileMode::from_bytes(b"100664").unwrap(), FileMode::Other(0o100664));
        assert!(FileMode::from_bytes(b"10064x").is_err());
    }

    #[test]
    fn dir_sorts_with_trailing_slash() {
        // "a.c" before dir "a" because '.' (0x2e) < '/' (0x2f)
        let file = entry(FileMode::Regular, "a.c");
        let dir = entry(FileMode::Tree, "a");
        assert_eq!(TreeEntry::cmp_entries(&file, &dir), Ordering::Less);
        assert_eq!(entry_order(&file, &dir), EntryOrder::Ordered);
        assert_eq!(entry_order(&dir, &file), EntryOrder::Unordered);
    }

    #[test]
    fn dir_sorts_after_hyphenated() {
        // dir "foo" is "foo/", which is after "foo-bar"
        let dir = entry(FileMode::Tree, "foo");
        let file = entry(FileMode::Regular, "foo-bar");
        assert_eq!(TreeEntry::cmp_entries(&dir, &file), Ordering::Greater);
    }

    #[test]
    fn same_name_is_duplicate_even_across_kinds() {
        let file = entry(FileMode::Regular, "a");
        let dir = entry(FileMode::Tree, "a");
        assert_eq!(entry_order(&file, &dir), EntryOrder::Duplicate);
        assert_eq!(entry_order(&file, &file.clone()), EntryOrder::Duplicate);
    }

    #[test]
    fn check_order_findings() {
        let ordered = Tree {
            entries: vec![entry(FileMode::Regular, "a"), entry(FileMode::Regular, "b")],
        };
        assert_eq!(ordered.check_order(), EntryOrder::Ordered);

        let unordered = Tree {
            entries: vec![entry(FileMode::Regular, "b"), entry(FileMode::Regular, "a")],
        };
        assert_eq!(unordered.check_order(), EntryOrder::Unordered);

        let dups = Tree {
            entries: vec![entry(FileMode::Regular, "a"), entry(FileMode::Tree, "a")],
        };
        assert_eq!(dups.check_order(), EntryOrder::Duplicate);
    }

    #[test]
    fn parse_and_serialize_roundtrip() {
        let oid = ObjectId::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap();
        let tree = Tree {
            entries: vec![
                TreeEntry {
                    mode: FileMode::Regular,
                    name: BString::from("hello.txt"),
                    oid,
                },
                TreeEntry {
                    mode: FileMode::Tree,
                    name: BString::from("src"),
                    oid,
                },
            ],
        };
        let bytes = tree.serialize_content();
        let parsed = Tree::parse(&bytes).unwrap();
        assert_eq!(parsed.entries.len(), 2);
        assert_eq!(parsed.entries[0].name, "hello.txt");
        assert_eq!(parsed.entries[1].name, "src");
        assert_eq!(parsed.check_order(), EntryOrder::Ordered);
        // Stable across re-serialization.
        assert_eq!(parsed.serialize_content(), bytes);
    }

    #[test]
    fn serialize_orders_dir_suffix() {
        // Spec scenario: "a" (file) and "a.c" (dir): the dir "a.c" still
        // sorts after "a" by prefix; but a dir "a" would sort after "a.c".
        let tree = Tree {
            entries: vec![entry(FileMode::Tree, "a"), entry(FileMode::Regular, "a.c")],
        };
        let bytes = tree.serialize_content();
        let parsed = Tree::parse(&bytes).unwrap();
        assert_eq!(parsed.entries[0].name, "a.c");
        assert_eq!(parsed.entries[1].name, "a");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Tree::parse(b"100644 noterm").is_err());
        assert!(Tree::parse(b"xyz name\0aaaaaaaaaaaaaaaaaaaa").is_err());
        let mut short = Vec::new();
        short.extend_from_slice(b"100644 f\0shortid");
        assert!(Tree::parse(&short).is_err());
        assert!(Tree::parse(b"100644 \0aaaaaaaaaaaaaaaaaaaa").is_err());
    }

    #[test]
    fn parse_empty_tree() {
        assert!(Tree::parse(b"").unwrap().is_empty());
    }
}
