//! Object-graph traversal and integrity checking.
//!
//! The walk interns every object it sees into an [`ObjectTable`], marks
//! what is reachable from the given tips, and then reports on the whole
//! population: damaged objects, dangling objects, broken links, missing
//! references. Scanning continues past individual failures; the report
//! carries everything found.

mod fsck;

pub use fsck::{Fsck, FsckOptions, Finding, Severity};

use grit_hash::ObjectId;
use grit_object::{ObjectTable, FLAG_REACHABLE};
use grit_odb::ObjectDb;

/// Errors that abort a walk outright (I/O, not object damage).
#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error(transparent)]
    Odb(#[from] grit_odb::OdbError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Depth-first reachability marking over interned records.
///
/// Edges exist only for parsed records; an unparsed record is a frontier
/// the report pass deals with (missing or pack-resident).
pub fn mark_reachable(table: &mut ObjectTable, tips: &[ObjectId]) {
    let mut stack: Vec<usize> = tips.iter().filter_map(|oid| table.lookup(oid)).collect();

    while let Some(handle) = stack.pop() {
        if !table.mark(handle, FLAG_REACHABLE) {
            continue;
        }
        stack.extend(table.record(handle).refs.iter().copied());
    }
}

/// List every object reachable from `tips`, parsing through the database.
///
/// Unlike the fsck scan this walks on demand: only reachable objects are
/// read. Unreadable references are returned as the second list rather
/// than aborting the walk.
pub fn reachable_objects(
    odb: &ObjectDb,
    tips: &[ObjectId],
) -> Result<(Vec<ObjectId>, Vec<ObjectId>), WalkError> {
    let mut table = ObjectTable::new();
    let mut reached = Vec::new();
    let mut unavailable = Vec::new();
    let mut stack: Vec<ObjectId> = tips.to_vec();

    while let Some(oid) = stack.pop() {
        let handle = table.intern(oid);
        if !table.mark(handle, FLAG_REACHABLE) {
            continue;
        }
        match odb.read_object(&oid) {
            Ok(Some(obj)) => {
                table.note_parsed(oid, &obj);
                reached.push(oid);
                stack.extend(obj.references());
            }
            Ok(None) | Err(_) => unavailable.push(oid),
        }
    }

    Ok((reached, unavailable))
}
