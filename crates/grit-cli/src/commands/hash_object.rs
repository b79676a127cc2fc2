use std::io::Read;

use anyhow::Result;
use clap::Args;
use grit_hash::Hasher;
use grit_object::ObjectType;

use super::open_repo;
use crate::Cli;

#[derive(Args)]
pub struct HashObjectArgs {
    /// Object type
    #[arg(short = 't', default_value = "blob")]
    obj_type: ObjectTypeArg,

    /// Actually write the object into the object database
    #[arg(short = 'w')]
    write: bool,

    /// Read the object from standard input
    #[arg(long)]
    stdin: bool,

    /// Files to hash
    files: Vec<std::path::PathBuf>,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ObjectTypeArg {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl From<ObjectTypeArg> for ObjectType {
    fn from(arg: ObjectTypeArg) -> Self {
        match arg {
            ObjectTypeArg::Blob => ObjectType::Blob,
            ObjectTypeArg::Tree => ObjectType::Tree,
            ObjectTypeArg::Commit => ObjectType::Commit,
            ObjectTypeArg::Tag => ObjectType::Tag,
        }
    }
}

pub fn run(args: &HashObjectArgs, cli: &Cli) -> Result<i32> {
    let obj_type: ObjectType = args.obj_type.into();

    let mut inputs: Vec<Vec<u8>> = Vec::new();
    if args.stdin {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        inputs.push(buf);
    }
    for file in &args.files {
        inputs.push(std::fs::read(file)?);
    }

    if args.write {
        let repo = open_repo(cli)?;
        for content in &inputs {
            let oid = repo.odb().write(obj_type, content)?;
            println!("{oid}");
        }
    } else {
        for content in &inputs {
            println!("{}", Hasher::digest_object(obj_type.name(), content));
        }
    }
    Ok(0)
}
