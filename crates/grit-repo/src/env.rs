//! Environment-driven path resolution.
//!
//! Everything configurable comes in through the environment:
//!
//! - `GIT_DIR`: repository directory (default `.git`)
//! - `GIT_OBJECT_DIRECTORY`: object directory (default `<GIT_DIR>/objects`)
//! - `GIT_ALTERNATE_OBJECT_DIRECTORIES`: colon-separated extra object dirs
//! - `GIT_INDEX_FILE`: index path (default `<GIT_DIR>/index`)

use std::path::{Path, PathBuf};

use grit_odb::alternates;

/// Resolved repository paths.
#[derive(Debug, Clone)]
pub struct Environment {
    git_dir: PathBuf,
    object_dir: PathBuf,
    index_file: PathBuf,
    alternates: Vec<PathBuf>,
}

impl Environment {
    /// Resolve from the process environment.
    pub fn from_env() -> Self {
        let git_dir = std::env::var_os("GIT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".git"));
        let object_dir = std::env::var_os("GIT_OBJECT_DIRECTORY")
            .map(PathBuf::from)
            .unwrap_or_else(|| git_dir.join("objects"));
        let index_file = std::env::var_os("GIT_INDEX_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| git_dir.join("index"));
        let alternates = std::env::var("GIT_ALTERNATE_OBJECT_DIRECTORIES")
            .map(|v| alternates::parse_chain(&v))
            .unwrap_or_default();

        Self {
            git_dir,
            object_dir,
            index_file,
            alternates,
        }
    }

    /// Defaults rooted at an explicit repository directory.
    pub fn at(git_dir: impl Into<PathBuf>) -> Self {
        let git_dir = git_dir.into();
        let object_dir = git_dir.join("objects");
        let index_file = git_dir.join("index");
        Self {
            git_dir,
            object_dir,
            index_file,
            alternates: Vec::new(),
        }
    }

    /// Override the object directory.
    pub fn with_object_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.object_dir = dir.into();
        self
    }

    /// Override the index file.
    pub fn with_index_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_file = path.into();
        self
    }

    /// Override the alternates chain.
    pub fn with_alternates(mut self, chain: Vec<PathBuf>) -> Self {
        self.alternates = chain;
        self
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn object_dir(&self) -> &Path {
        &self.object_dir
    }

    pub fn index_file(&self) -> &Path {
        &self.index_file
    }

    pub fn alternates(&self) -> &[PathBuf] {
        &self.alternates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_root_defaults() {
        let env = Environment::at("/repo/.git");
        assert_eq!(env.git_dir(), Path::new("/repo/.git"));
        assert_eq!(env.object_dir(), Path::new("/repo/.git/objects"));
        assert_eq!(env.index_file(), Path::new("/repo/.git/index"));
        assert!(env.alternates().is_empty());
    }

    #[test]
    fn overrides_compose() {
        let env = Environment::at("/repo/.git")
            .with_object_dir("/elsewhere/objects")
            .with_index_file("/tmp/scratch-index")
            .with_alternates(vec![PathBuf::from("/shared/objects")]);
        assert_eq!(env.object_dir(), Path::new("/elsewhere/objects"));
        assert_eq!(env.index_file(), Path::new("/tmp/scratch-index"));
        assert_eq!(env.alternates(), [PathBuf::from("/shared/objects")]);
    }
}
