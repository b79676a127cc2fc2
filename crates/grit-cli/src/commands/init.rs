use anyhow::Result;
use clap::Args;
use grit_repo::Repository;

use super::environment;
use crate::Cli;

#[derive(Args)]
pub struct InitArgs {
    /// Be quiet
    #[arg(short, long)]
    quiet: bool,
}

pub fn run(args: &InitArgs, cli: &Cli) -> Result<i32> {
    let env = environment(cli);
    let existed = env.git_dir().is_dir();
    let repo = Repository::init(env)?;

    if !args.quiet {
        if existed {
            println!(
                "Reinitialized existing repository in {}",
                repo.git_dir().display()
            );
        } else {
            println!("Initialized empty repository in {}", repo.git_dir().display());
        }
    }
    Ok(0)
}
