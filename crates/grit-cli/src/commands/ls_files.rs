use anyhow::Result;
use clap::Args;
use grit_index::Index;

use super::open_repo;
use crate::Cli;

#[derive(Args)]
pub struct LsFilesArgs {
    /// Show staged contents' mode, digest, and stage number
    #[arg(short = 's', long)]
    stage: bool,
}

pub fn run(args: &LsFilesArgs, cli: &Cli) -> Result<i32> {
    let repo = open_repo(cli)?;
    let index = Index::load(repo.index_file())?;

    for entry in index.iter() {
        if args.stage {
            println!(
                "{:06o} {} {}\t{}",
                entry.mode.raw(),
                entry.oid,
                entry.stage.as_u8(),
                entry.path
            );
        } else {
            println!("{}", entry.path);
        }
    }
    Ok(0)
}
