pub mod error;
pub mod hashed_file;
pub mod lockfile;
pub mod path;

// Re-export core types at crate root for convenience
pub use bstr::{BStr, BString, ByteSlice, ByteVec};
pub use error::UtilError;
pub use hashed_file::HashedWriter;
pub use lockfile::LockFile;

pub type Result<T> = std::result::Result<T, UtilError>;
