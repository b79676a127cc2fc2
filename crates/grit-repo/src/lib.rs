//! Repository layout and context.
//!
//! Resolves where everything lives (repository directory, object
//! directory, index file, alternates chain) from the environment, reads
//! HEAD and the loose refs, and creates the directory skeleton.

mod env;
mod refs;

pub use env::Environment;
pub use refs::{read_ref, RefEntry};

use std::path::{Path, PathBuf};

use grit_hash::ObjectId;
use grit_odb::ObjectDb;

/// Errors from repository-level operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("not a repository: {0}")]
    NotARepository(PathBuf),

    #[error("bad ref {name}: {reason}")]
    BadRef { name: String, reason: String },

    #[error(transparent)]
    Odb(#[from] grit_odb::OdbError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An open repository: resolved paths plus the object database.
pub struct Repository {
    env: Environment,
    odb: ObjectDb,
}

impl Repository {
    /// Open the repository the environment points at.
    pub fn open() -> Result<Self, RepoError> {
        Self::from_env(Environment::from_env())
    }

    /// Open with explicit settings (tests, embedding).
    pub fn from_env(env: Environment) -> Result<Self, RepoError> {
        if !env.git_dir().is_dir() {
            return Err(RepoError::NotARepository(env.git_dir().to_path_buf()));
        }
        let odb = ObjectDb::open_with_alternates(env.object_dir(), env.alternates())?;
        Ok(Self { env, odb })
    }

    /// Create the repository skeleton and open it: `objects/{info,pack}`,
    /// `refs/{heads,tags}`, and a HEAD pointing at `refs/heads/master`.
    pub fn init(env: Environment) -> Result<Self, RepoError> {
        let git_dir = env.git_dir();
        std::fs::create_dir_all(env.object_dir().join("info"))?;
        std::fs::create_dir_all(env.object_dir().join("pack"))?;
        std::fs::create_dir_all(git_dir.join("refs").join("heads"))?;
        std::fs::create_dir_all(git_dir.join("refs").join("tags"))?;

        let head = git_dir.join("HEAD");
        if !head.exists() {
            std::fs::write(&head, b"ref: refs/heads/master\n")?;
        }
        Self::from_env(env)
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn odb(&self) -> &ObjectDb {
        &self.odb
    }

    pub fn git_dir(&self) -> &Path {
        self.env.git_dir()
    }

    pub fn index_file(&self) -> &Path {
        self.env.index_file()
    }

    /// The digest HEAD resolves to, if the branch exists yet.
    pub fn head(&self) -> Result<Option<ObjectId>, RepoError> {
        refs::resolve_head(self.git_dir())
    }

    /// All loose refs under `refs/`, name-sorted.
    pub fn refs(&self) -> Result<Vec<RefEntry>, RepoError> {
        refs::enumerate(self.git_dir())
    }

    /// Every ref tip plus HEAD: the walk roots for integrity checks.
    pub fn all_tips(&self) -> Result<Vec<ObjectId>, RepoError> {
        let mut tips: Vec<ObjectId> = self.refs()?.into_iter().map(|r| r.target).collect();
        if let Some(head) = self.head()? {
            tips.push(head);
        }
        tips.sort();
        tips.dedup();
        Ok(tips)
    }
}
