pub mod apply;
pub mod cat_file;
pub mod fsck;
pub mod hash_object;
pub mod init;
pub mod ls_files;
pub mod update_index;
pub mod write_tree;

use anyhow::Result;
use clap::Subcommand;
use grit_repo::{Environment, Repository};

use crate::Cli;

#[derive(Subcommand)]
pub enum Commands {
    /// Create an empty repository or reinitialize an existing one
    Init(init::InitArgs),
    /// Compute an object's digest and optionally store it
    HashObject(hash_object::HashObjectArgs),
    /// Provide content or type and size information for stored objects
    CatFile(cat_file::CatFileArgs),
    /// Register file contents from the working tree in the index
    UpdateIndex(update_index::UpdateIndexArgs),
    /// Show information about files in the index
    LsFiles(ls_files::LsFilesArgs),
    /// Create a tree object from the current index
    WriteTree(write_tree::WriteTreeArgs),
    /// Verify the connectivity and validity of objects in the database
    Fsck(fsck::FsckArgs),
    /// Apply a patch to files and/or to the index
    Apply(apply::ApplyArgs),
}

pub fn run(cli: Cli) -> Result<i32> {
    match &cli.command {
        Commands::Init(args) => init::run(args, &cli),
        Commands::HashObject(args) => hash_object::run(args, &cli),
        Commands::CatFile(args) => cat_file::run(args, &cli),
        Commands::UpdateIndex(args) => update_index::run(args, &cli),
        Commands::LsFiles(args) => ls_files::run(args, &cli),
        Commands::WriteTree(args) => write_tree::run(args, &cli),
        Commands::Fsck(args) => fsck::run(args, &cli),
        Commands::Apply(args) => apply::run(args, &cli),
    }
}

/// The environment this invocation resolves to.
pub fn environment(cli: &Cli) -> Environment {
    match &cli.git_dir {
        Some(dir) => Environment::at(dir.clone()),
        None => Environment::from_env(),
    }
}

/// Open the repository or fail with a one-line diagnostic.
pub fn open_repo(cli: &Cli) -> Result<Repository> {
    Ok(Repository::from_env(environment(cli))?)
}
