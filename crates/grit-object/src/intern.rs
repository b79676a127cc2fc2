//! The object interning table.
//!
//! Every digest a walk encounters resolves to at most one record. Records
//! are created on first mention (by a ref, a parent pointer, a tree entry)
//! and filled in when the object is actually parsed. Edges between records
//! are stored as table handles rather than owning pointers, so parse order
//! is free and reference cycles in corrupted inputs are representable.
//!
//! The table is an explicit value threaded through the walk APIs; nothing
//! here is process-global.

use grit_hash::ObjectId;

use crate::{Object, ObjectType};

/// Record flag: reached from a walk tip.
pub const FLAG_REACHABLE: u8 = 1 << 0;

/// One interned object record.
#[derive(Debug)]
pub struct ObjectRecord {
    pub oid: ObjectId,
    /// Type tag, known once the object has been seen or parsed.
    pub kind: Option<ObjectType>,
    /// The object's body has been parsed successfully.
    pub parsed: bool,
    /// Some other record refers to this one.
    pub used: bool,
    /// Walk marks.
    pub flags: u8,
    /// Outgoing references, as table handles.
    pub refs: Vec<usize>,
}

/// Digest-keyed interning table with stable handles.
///
/// Records live in an append-only arena (handles never move); a separate
/// digest-sorted list of handles provides binary-search lookup.
#[derive(Debug, Default)]
pub struct ObjectTable {
    records: Vec<ObjectRecord>,
    sorted: Vec<usize>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Find the handle for a digest, if interned.
    pub fn lookup(&self, oid: &ObjectId) -> Option<usize> {
        self.sorted
            .binary_search_by(|&ix| self.records[ix].oid.cmp(oid))
            .ok()
            .map(|pos| self.sorted[pos])
    }

    /// Intern a digest, creating an empty record if it is new.
    pub fn intern(&mut self, oid: ObjectId) -> usize {
        match self
            .sorted
            .binary_search_by(|&ix| self.records[ix].oid.cmp(&oid))
        {
            Ok(pos) => self.sorted[pos],
            Err(pos) => {
                let handle = self.records.len();
                self.records.push(ObjectRecord {
                    oid,
                    kind: None,
                    parsed: false,
                    used: false,
                    flags: 0,
                    refs: Vec::new(),
                });
                self.sorted.insert(pos, handle);
                handle
            }
        }
    }

    pub fn record(&self, handle: usize) -> &ObjectRecord {
        &self.records[handle]
    }

    pub fn record_mut(&mut self, handle: usize) -> &mut ObjectRecord {
        &mut self.records[handle]
    }

    /// Record a successful parse: set the type tag, add the outgoing edges
    /// (noting the kind each reference position implies), and mark every
    /// referenced record as used.
    pub fn note_parsed(&mut self, oid: ObjectId, obj: &Object) -> usize {
        let handle = self.intern(oid);
        let mut edges = Vec::new();
        for (target, expected_kind) in obj.typed_references() {
            let target_handle = self.intern(target);
            let target_rec = &mut self.records[target_handle];
            target_rec.used = true;
            if target_rec.kind.is_none() {
                target_rec.kind = Some(expected_kind);
            }
            edges.push(target_handle);
        }
        let rec = &mut self.records[handle];
        rec.kind = Some(obj.object_type());
        rec.parsed = true;
        rec.refs = edges;
        handle
    }

    /// Set a flag bit; returns false if it was already set.
    pub fn mark(&mut self, handle: usize, flag: u8) -> bool {
        let rec = &mut self.records[handle];
        if rec.flags & flag != 0 {
            return false;
        }
        rec.flags |= flag;
        true
    }

    pub fn is_marked(&self, handle: usize, flag: u8) -> bool {
        self.records[handle].flags & flag != 0
    }

    /// Iterate handles in digest order.
    pub fn iter_sorted(&self) -> impl Iterator<Item = (usize, &ObjectRecord)> {
        self.sorted.iter().map(move |&ix| (ix, &self.records[ix]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Blob, Commit, Tree};
    use crate::commit::Signature;

    fn oid(n: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        ObjectId(bytes)
    }

    #[test]
    fn intern_is_idempotent() {
        let mut table = ObjectTable::new();
        let a = table.intern(oid(1));
        let b = table.intern(oid(1));
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn lookup_by_digest() {
        let mut table = ObjectTable::new();
        assert_eq!(table.lookup(&oid(9)), None);
        let handle = table.intern(oid(9));
        assert_eq!(table.lookup(&oid(9)), Some(handle));
    }

    #[test]
    fn handles_stay_stable_across_inserts() {
        let mut table = ObjectTable::new();
        let high = table.intern(oid(200));
        // Inserting a smaller digest re-sorts the lookup list but must not
        // invalidate existing handles.
        let low = table.intern(oid(1));
        assert_eq!(table.record(high).oid, oid(200));
        assert_eq!(table.record(low).oid, oid(1));

        let order: Vec<_> = table.iter_sorted().map(|(_, r)| r.oid).collect();
        assert_eq!(order, vec![oid(1), oid(200)]);
    }

    #[test]
    fn note_parsed_links_edges() {
        let mut table = ObjectTable::new();
        let commit = Commit {
            tree: oid(10),
            parents: vec![oid(11), oid(12)],
            author: Signature::parse(b"A <a@b> 0 +0000").unwrap(),
            committer: Signature::parse(b"A <a@b> 0 +0000").unwrap(),
            message: Default::default(),
        };
        let handle = table.note_parsed(oid(1), &Object::Commit(commit));

        let rec = table.record(handle);
        assert!(rec.parsed);
        assert_eq!(rec.kind, Some(ObjectType::Commit));
        assert_eq!(rec.refs.len(), 3);
        for &edge in &rec.refs {
            assert!(table.record(edge).used);
            assert!(!table.record(edge).parsed);
        }
    }

    #[test]
    fn blob_has_no_edges() {
        let mut table = ObjectTable::new();
        let handle = table.note_parsed(oid(2), &Object::Blob(Blob::new(vec![1, 2, 3])));
        assert!(table.record(handle).refs.is_empty());
    }

    #[test]
    fn cycles_are_representable() {
        // A corrupted pair of trees that point at each other must intern
        // without blowing up.
        let mut table = ObjectTable::new();
        let t1 = Tree {
            entries: vec![crate::TreeEntry {
                mode: crate::FileMode::Tree,
                name: "loop".into(),
                oid: oid(2),
            }],
        };
        let t2 = Tree {
            entries: vec![crate::TreeEntry {
                mode: crate::FileMode::Tree,
                name: "back".into(),
                oid: oid(1),
            }],
        };
        let h1 = table.note_parsed(oid(1), &Object::Tree(t1));
        let h2 = table.note_parsed(oid(2), &Object::Tree(t2));
        assert_eq!(table.record(h1).refs, vec![h2]);
        assert_eq!(table.record(h2).refs, vec![h1]);
        assert!(table.record(h1).used && table.record(h2).used);
    }

    #[test]
    fn mark_reports_first_set_only() {
        let mut table = ObjectTable::new();
        let h = table.intern(oid(1));
        assert!(table.mark(h, FLAG_REACHABLE));
        assert!(!table.mark(h, FLAG_REACHABLE));
        assert!(table.is_marked(h, FLAG_REACHABLE));
    }
}
