//! The integrity check: scan, mark, report.

use grit_hash::{Hasher, ObjectId};
use grit_object::{EntryOrder, Object, ObjectTable, ObjectType, FLAG_REACHABLE};
use grit_odb::ObjectDb;

use crate::{mark_reachable, WalkError};

/// Switches for the integrity check.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsckOptions {
    /// Report parentless commits.
    pub show_root: bool,
    /// Report tag objects as they are seen.
    pub show_tags: bool,
    /// Report parseable objects not reached from any tip.
    pub show_unreachable: bool,
    /// Scan only loose objects and treat pack-resident references as
    /// satisfied elsewhere.
    pub standalone: bool,
    /// Treat tolerated legacy modes (group-writable files) as errors.
    pub strict: bool,
}

/// How bad a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Damage: the repository is not fully intact.
    Error,
    /// Tolerated oddity.
    Warning,
    /// Requested observation (dangling, root, tag).
    Note,
}

/// One finding from the check.
#[derive(Debug, Clone)]
pub struct Finding {
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    fn error(message: String) -> Self {
        Self {
            severity: Severity::Error,
            message,
        }
    }
    fn warning(message: String) -> Self {
        Self {
            severity: Severity::Warning,
            message,
        }
    }
    fn note(message: String) -> Self {
        Self {
            severity: Severity::Note,
            message,
        }
    }
}

/// The integrity checker.
///
/// Usage: `scan` the store, `use_roots`/`mark` with the tips, then
/// `report`. Every phase appends findings instead of failing fast, so a
/// damaged object never hides the rest of the scan.
pub struct Fsck<'a> {
    odb: &'a ObjectDb,
    options: FsckOptions,
    table: ObjectTable,
    findings: Vec<Finding>,
}

impl<'a> Fsck<'a> {
    pub fn new(odb: &'a ObjectDb, options: FsckOptions) -> Self {
        Self {
            odb,
            options,
            table: ObjectTable::new(),
            findings: Vec::new(),
        }
    }

    pub fn table(&self) -> &ObjectTable {
        &self.table
    }

    /// Scan the whole store: verify digests, parse, intern, and run
    /// per-object structure checks.
    pub fn scan(&mut self) -> Result<(), WalkError> {
        let oids = if self.options.standalone {
            self.odb.iter_loose_oids()?
        } else {
            self.odb.iter_all_oids()?
        };

        for oid in oids {
            self.scan_object(oid)?;
        }
        Ok(())
    }

    fn scan_object(&mut self, oid: ObjectId) -> Result<(), WalkError> {
        let (obj_type, content) = match self.odb.read(&oid) {
            Ok(Some(found)) => found,
            Ok(None) => {
                // Listed but unreadable (raced away); the report pass will
                // call it missing if something refers to it.
                self.table.intern(oid);
                return Ok(());
            }
            Err(e) => {
                self.table.intern(oid);
                self.findings
                    .push(Finding::error(format!("{}: {}", oid.to_hex(), e)));
                return Ok(());
            }
        };

        // The name of every object is the digest of its canonical form.
        let actual = Hasher::digest_object(obj_type.name(), &content);
        if actual != oid {
            self.table.intern(oid);
            self.findings.push(Finding::error(format!(
                "{}: hash mismatch, actual {}",
                oid.to_hex(),
                actual.to_hex()
            )));
            return Ok(());
        }

        let obj = match Object::parse_content(obj_type, &content) {
            Ok(obj) => obj,
            Err(e) => {
                self.table.intern(oid);
                self.findings.push(Finding::error(format!(
                    "bad {} {}: {}",
                    obj_type,
                    oid.to_hex(),
                    e
                )));
                return Ok(());
            }
        };

        self.table.note_parsed(oid, &obj);
        self.check_object(&oid, &obj);
        Ok(())
    }

    /// Type-specific structure checks.
    fn check_object(&mut self, oid: &ObjectId, obj: &Object) {
        match obj {
            Object::Blob(_) => {}
            Object::Tree(tree) => self.check_tree(oid, tree),
            Object::Commit(commit) => {
                if self.options.show_root && commit.is_root() {
                    self.findings
                        .push(Finding::note(format!("root {}", oid.to_hex())));
                }
            }
            Object::Tag(tag) => {
                if self.options.show_tags {
                    self.findings.push(Finding::note(format!(
                        "tagged {} {} ({}) in {}",
                        tag.target_type,
                        tag.target.to_hex(),
                        tag.name,
                        oid.to_hex()
                    )));
                }
            }
        }
    }

    fn check_tree(&mut self, oid: &ObjectId, tree: &grit_object::Tree) {
        let mut has_full_path = false;
        let mut has_bad_modes = false;

        for entry in &tree.entries {
            if entry.name.contains(&b'/') {
                has_full_path = true;
            }
            match entry.mode.raw() {
                0o100644 | 0o100755 | 0o120000 | 0o040000 | 0o160000 => {}
                // Tolerated relic unless strict checking is on.
                0o100664 if !self.options.strict => {}
                _ => has_bad_modes = true,
            }
        }

        match tree.check_order() {
            EntryOrder::Ordered => {}
            EntryOrder::Unordered => self.findings.push(Finding::error(format!(
                "tree {} is not properly sorted",
                oid.to_hex()
            ))),
            EntryOrder::Duplicate => self.findings.push(Finding::error(format!(
                "tree {} has duplicate file entries",
                oid.to_hex()
            ))),
        }

        if has_full_path {
            self.findings.push(Finding::warning(format!(
                "tree {} has full pathnames in it",
                oid.to_hex()
            )));
        }
        if has_bad_modes {
            self.findings.push(Finding::warning(format!(
                "tree {} has bad file modes in it",
                oid.to_hex()
            )));
        }
    }

    /// Mark everything reachable from `tips`.
    pub fn mark(&mut self, tips: &[ObjectId]) {
        mark_reachable(&mut self.table, tips);
    }

    /// Treat `oids` as externally used and reachable (index contents).
    pub fn use_roots(&mut self, oids: &[ObjectId]) {
        for oid in oids {
            let handle = self.table.intern(*oid);
            self.table.record_mut(handle).used = true;
        }
        mark_reachable(&mut self.table, oids);
    }

    /// The report pass over the interned population.
    pub fn report(mut self) -> Vec<Finding> {
        let kind_name = |kind: Option<ObjectType>| {
            kind.map(|k| k.name()).unwrap_or("unknown")
        };

        // Handles in digest order for stable output.
        let handles: Vec<usize> = self.table.iter_sorted().map(|(h, _)| h).collect();

        for handle in handles {
            let record = self.table.record(handle);

            if !record.parsed {
                // Never loaded. Fine when a pack or alternate can serve it
                // (suppressed in standalone mode); damage otherwise.
                if self.options.standalone && self.odb.contains(&record.oid) {
                    continue;
                }
                if !self.odb.contains(&record.oid) {
                    self.findings.push(Finding::error(format!(
                        "missing {} {}",
                        kind_name(record.kind),
                        record.oid.to_hex()
                    )));
                }
                continue;
            }

            // A parsed record with a reference to a present-but-unparseable
            // object is a broken link.
            for &target in &record.refs {
                let target_rec = self.table.record(target);
                if !target_rec.parsed && self.odb.contains(&target_rec.oid) {
                    self.findings.push(Finding::error(format!(
                        "broken link from {:>7} {}\n              to {:>7} {}",
                        kind_name(record.kind),
                        record.oid.to_hex(),
                        kind_name(target_rec.kind),
                        target_rec.oid.to_hex()
                    )));
                }
            }

            if self.options.show_unreachable && !self.table.is_marked(handle, FLAG_REACHABLE) {
                let record = self.table.record(handle);
                self.findings.push(Finding::note(format!(
                    "unreachable {} {}",
                    kind_name(record.kind),
                    record.oid.to_hex()
                )));
                continue;
            }

            let record = self.table.record(handle);
            if !record.used {
                self.findings.push(Finding::note(format!(
                    "dangling {} {}",
                    kind_name(record.kind),
                    record.oid.to_hex()
                )));
            }
        }

        self.findings
    }
}
