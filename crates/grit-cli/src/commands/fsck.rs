use std::io::Write;

use anyhow::Result;
use clap::Args;
use grit_hash::ObjectId;
use grit_index::Index;
use grit_walk::{Fsck, FsckOptions, Severity};

use super::open_repo;
use crate::Cli;

#[derive(Args)]
pub struct FsckArgs {
    /// Report unreachable objects
    #[arg(long)]
    unreachable: bool,

    /// Report root commits
    #[arg(long)]
    root: bool,

    /// Report tag objects
    #[arg(long)]
    tags: bool,

    /// Count blobs recorded in the index as roots
    #[arg(long)]
    cache: bool,

    /// Check only loose objects; pack-resident references are fine
    #[arg(long)]
    standalone: bool,

    /// Check packs and alternates too (the default)
    #[arg(long)]
    full: bool,

    /// Strict checking: legacy group-writable file modes are errors
    #[arg(long)]
    strict: bool,

    /// Heads to walk from (defaults to every ref plus HEAD)
    heads: Vec<String>,
}

pub fn run(args: &FsckArgs, cli: &Cli) -> Result<i32> {
    let repo = open_repo(cli)?;
    let stderr = std::io::stderr();
    let mut err_out = stderr.lock();

    let options = FsckOptions {
        show_root: args.root,
        show_tags: args.tags,
        show_unreachable: args.unreachable,
        standalone: args.standalone && !args.full,
        strict: args.strict,
    };

    let mut fsck = Fsck::new(repo.odb(), options);
    fsck.scan()?;

    let tips: Vec<ObjectId> = if args.heads.is_empty() {
        repo.all_tips()?
    } else {
        let mut tips = Vec::with_capacity(args.heads.len());
        for head in &args.heads {
            tips.push(ObjectId::from_hex(head)?);
        }
        tips
    };
    fsck.mark(&tips);

    if args.cache {
        let index = Index::load(repo.index_file())?;
        fsck.use_roots(&index.stage0_oids());
    }

    let mut failed = false;
    for finding in fsck.report() {
        match finding.severity {
            Severity::Error => {
                failed = true;
                println!("{}", finding.message);
            }
            Severity::Warning => writeln!(err_out, "warning: {}", finding.message)?,
            Severity::Note => println!("{}", finding.message),
        }
    }

    Ok(if failed { 1 } else { 0 })
}
