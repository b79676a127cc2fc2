use std::io::Write;

use anyhow::{bail, Result};
use clap::Args;
use grit_hash::ObjectId;

use super::open_repo;
use crate::Cli;

#[derive(Args)]
pub struct CatFileArgs {
    /// Show object type
    #[arg(short = 't', conflicts_with = "size")]
    type_only: bool,

    /// Show object size
    #[arg(short = 's', conflicts_with = "type_only")]
    size: bool,

    /// Expected type; the content is printed raw
    #[arg(value_name = "type")]
    expected_type: Option<String>,

    /// Object digest
    #[arg(value_name = "object")]
    object: Option<String>,
}

pub fn run(args: &CatFileArgs, cli: &Cli) -> Result<i32> {
    let repo = open_repo(cli)?;
    let odb = repo.odb();

    // With -t/-s the single positional is the object; otherwise the
    // first names the type and the second the object.
    let object = if args.type_only || args.size {
        args.expected_type.as_ref()
    } else {
        args.object.as_ref()
    };
    let Some(object) = object else {
        bail!("object name required");
    };
    let oid = ObjectId::from_hex(object)?;

    if args.type_only || args.size {
        let Some(info) = odb.info(&oid)? else {
            bail!("object {} not found", oid);
        };
        if args.type_only {
            println!("{}", info.obj_type);
        } else {
            println!("{}", info.size);
        }
        return Ok(0);
    }

    let expected = args.expected_type.as_deref().unwrap_or("blob");
    let (obj_type, content) = odb.read_required(&oid)?;
    if obj_type.name() != expected {
        bail!("object {} is a {}, not a {}", oid, obj_type, expected);
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    out.write_all(&content)?;
    Ok(0)
}
