use anyhow::{bail, Result};
use bstr::BString;
use clap::Args;
use grit_hash::ObjectId;
use grit_index::{Index, IndexEntry, Stage};
use grit_object::{FileMode, ObjectType, Tree, TreeEntry};
use grit_odb::ObjectDb;

use super::open_repo;
use crate::Cli;

#[derive(Args)]
pub struct WriteTreeArgs {
    /// Allow missing objects (entries whose blobs are not stored)
    #[arg(long)]
    missing_ok: bool,
}

pub fn run(args: &WriteTreeArgs, cli: &Cli) -> Result<i32> {
    let repo = open_repo(cli)?;
    let index = Index::load(repo.index_file())?;

    if index.iter().any(|e| e.stage != Stage::Normal) {
        bail!("unmerged paths in the index; resolve them first");
    }
    if !args.missing_ok {
        for entry in index.iter() {
            if !repo.odb().contains(&entry.oid) {
                bail!("invalid object {} for {}", entry.oid, entry.path);
            }
        }
    }

    let entries: Vec<&IndexEntry> = index.iter().collect();
    let oid = build_tree(&entries, b"", repo.odb())?;
    println!("{oid}");
    Ok(0)
}

/// Recursively build tree objects from the sorted entry run.
fn build_tree(entries: &[&IndexEntry], prefix: &[u8], odb: &ObjectDb) -> Result<ObjectId> {
    let mut tree = Tree::new();
    let mut i = 0;

    while i < entries.len() {
        let entry = entries[i];
        let rest = &entry.path[prefix.len()..];

        if let Some(slash) = rest.iter().position(|&b| b == b'/') {
            // A subtree: gather the contiguous entries below it.
            let dir_name = &rest[..slash];
            let subtree_end = entries[i..]
                .iter()
                .position(|e| {
                    let p = &e.path[prefix.len()..];
                    !(p.starts_with(dir_name) && p.get(slash) == Some(&b'/'))
                })
                .map(|pos| i + pos)
                .unwrap_or(entries.len());

            let mut sub_prefix = prefix.to_vec();
            sub_prefix.extend_from_slice(dir_name);
            sub_prefix.push(b'/');
            let sub_oid = build_tree(&entries[i..subtree_end], &sub_prefix, odb)?;

            tree.entries.push(TreeEntry {
                mode: FileMode::Tree,
                name: BString::from(dir_name),
                oid: sub_oid,
            });
            i = subtree_end;
        } else {
            tree.entries.push(TreeEntry {
                mode: entry.mode,
                name: BString::from(rest),
                oid: entry.oid,
            });
            i += 1;
        }
    }

    tree.sort();
    Ok(odb.write(ObjectType::Tree, &tree.serialize_content())?)
}
