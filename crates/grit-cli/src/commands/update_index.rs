use anyhow::{bail, Result};
use bstr::BString;
use clap::Args;
use grit_hash::ObjectId;
use grit_index::{entry, Index, IndexEntry, InsertPolicy, RefreshOptions, Stage, StatData};
use grit_object::{FileMode, ObjectType};

use super::open_repo;
use crate::Cli;

#[derive(Args)]
pub struct UpdateIndexArgs {
    /// Allow adding files not yet tracked
    #[arg(long)]
    add: bool,

    /// Allow replacing entries that collide with the new one
    #[arg(long)]
    replace: bool,

    /// Remove named paths whose working file is gone
    #[arg(long)]
    remove: bool,

    /// Remove named paths even if the working file still exists
    #[arg(long)]
    force_remove: bool,

    /// Re-stat every entry instead of taking paths
    #[arg(long)]
    refresh: bool,

    /// With --refresh or --remove: missing files are not an error
    #[arg(long)]
    ignore_missing: bool,

    /// Register an object directly: <mode> <digest> <path>
    #[arg(long, num_args = 3, value_names = ["mode", "object", "path"])]
    cacheinfo: Vec<String>,

    /// Paths to update
    paths: Vec<String>,
}

pub fn run(args: &UpdateIndexArgs, cli: &Cli) -> Result<i32> {
    let repo = open_repo(cli)?;
    let index_path = repo.index_file().to_path_buf();
    let mut index = Index::load(&index_path)?;

    let policy = InsertPolicy {
        ok_to_add: args.add,
        ok_to_replace: args.replace,
    };

    if args.refresh {
        let issues = index.refresh(
            ".",
            RefreshOptions {
                ignore_missing: args.ignore_missing,
                ..Default::default()
            },
        )?;
        for issue in &issues {
            println!("{}: needs update", issue.path);
        }
        index.save(&index_path)?;
        return Ok(if issues.is_empty() { 0 } else { 1 });
    }

    if !args.cacheinfo.is_empty() {
        let [mode, object, path] = &args.cacheinfo[..] else {
            bail!("--cacheinfo needs <mode> <object> <path>");
        };
        let mode = u32::from_str_radix(mode, 8)?;
        let oid = ObjectId::from_hex(object)?;
        index.insert(
            IndexEntry {
                path: BString::from(path.as_str()),
                oid,
                mode: FileMode::from_raw(mode),
                stage: Stage::Normal,
                stat: StatData::default(),
                needs_update: false,
            },
            policy,
        )?;
    }

    for path in &args.paths {
        let name = BString::from(path.as_str());
        if args.force_remove {
            index.remove(name.as_ref());
            continue;
        }

        match std::fs::symlink_metadata(path) {
            Ok(meta) => add_working_file(&repo, &mut index, name, &meta, policy)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if args.remove || args.ignore_missing {
                    index.remove(name.as_ref());
                } else {
                    bail!("{path}: does not exist and --remove not passed");
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    index.save(&index_path)?;
    Ok(0)
}

/// Hash the working file, store its blob, and stage the entry.
fn add_working_file(
    repo: &grit_repo::Repository,
    index: &mut Index,
    name: BString,
    meta: &std::fs::Metadata,
    policy: InsertPolicy,
) -> Result<()> {
    let content = if meta.file_type().is_symlink() {
        std::fs::read_link(std::path::Path::new(&name.to_string()))?
            .into_os_string()
            .into_encoded_bytes()
    } else {
        std::fs::read(name.to_string())?
    };

    let oid = repo.odb().write(ObjectType::Blob, &content)?;
    let mode = if meta.file_type().is_symlink() {
        FileMode::Symlink
    } else {
        entry::entry_mode_for(disk_mode(meta))
    };

    index.insert(
        IndexEntry {
            path: name,
            oid,
            mode,
            stage: Stage::Normal,
            stat: StatData::from_metadata(meta),
            needs_update: false,
        },
        policy,
    )?;
    Ok(())
}

#[cfg(unix)]
fn disk_mode(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mode()
}

#[cfg(not(unix))]
fn disk_mode(_meta: &std::fs::Metadata) -> u32 {
    0o100644
}
