//! The alternate object directory chain.
//!
//! `GIT_ALTERNATE_OBJECT_DIRECTORIES` holds a colon-separated list of
//! supplementary object directories searched when the primary lacks an
//! object. Empty segments are skipped; order is search order. Alternates
//! are read-only from this repository's point of view.

use std::path::PathBuf;

/// Parse a colon-separated chain into paths, dropping empty segments.
pub fn parse_chain(value: &str) -> Vec<PathBuf> {
    value
        .split(':')
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_colon() {
        assert_eq!(
            parse_chain("/a/objects:/b/objects"),
            vec![PathBuf::from("/a/objects"), PathBuf::from("/b/objects")]
        );
    }

    #[test]
    fn skips_empty_segments() {
        assert_eq!(
            parse_chain("::/only/one::"),
            vec![PathBuf::from("/only/one")]
        );
        assert!(parse_chain("").is_empty());
    }
}
