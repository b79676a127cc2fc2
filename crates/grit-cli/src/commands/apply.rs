use std::io::Read;

use anyhow::Result;
use clap::Args;
use grit_apply::{parse_patches, Applier, ApplyOptions};
use grit_index::Index;

use super::open_repo;
use crate::Cli;

#[derive(Args)]
pub struct ApplyArgs {
    /// Check whether the patch would apply; write nothing
    #[arg(long)]
    check: bool,

    /// Apply the patch to the index as well as the working tree
    #[arg(long)]
    index: bool,

    /// Show a diffstat instead of applying
    #[arg(long)]
    stat: bool,

    /// Remove <n> leading path components
    #[arg(short = 'p', default_value = "1")]
    strip: usize,

    /// Patch files (standard input when empty)
    patches: Vec<std::path::PathBuf>,
}

pub fn run(args: &ApplyArgs, cli: &Cli) -> Result<i32> {
    let mut input = Vec::new();
    if args.patches.is_empty() {
        std::io::stdin().read_to_end(&mut input)?;
    } else {
        for path in &args.patches {
            input.extend_from_slice(&std::fs::read(path)?);
        }
    }

    let patches = parse_patches(&input, args.strip)?;

    if args.stat {
        for patch in &patches {
            let (added, removed) = patch.count_changes();
            println!("{}\t{}\t{}", added, removed, patch.display_name());
        }
        return Ok(0);
    }

    let options = ApplyOptions {
        check_only: args.check,
        use_index: args.index,
    };

    let report = if args.index {
        let repo = open_repo(cli)?;
        let index_path = repo.index_file().to_path_buf();
        let mut index = Index::load(&index_path)?;

        let report = Applier::new(".", options)
            .with_index(repo.odb(), &mut index)
            .apply(&patches)?;

        if !args.check {
            index.save(&index_path)?;
        }
        report
    } else {
        Applier::new(".", options).apply(&patches)?
    };

    for note in &report.notes {
        eprintln!("{note}");
    }
    Ok(0)
}
