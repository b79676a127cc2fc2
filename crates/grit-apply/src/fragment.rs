//! Hunk matching and buffer splicing.

use bstr::BString;

use crate::{ApplyError, FilePatch, Fragment};

/// Find where a fragment's old image sits in `buf`.
///
/// The 1-based `line` hint is tried first; on an exact miss the search
/// expands outward one whole line at a time, alternating forward and
/// backward. Matching is plain byte comparison, no fuzz. Returns the
/// byte offset and the signed line distance from the hint.
pub fn locate_fragment(buf: &[u8], fragment: &[u8], line: usize) -> Option<(usize, isize)> {
    if fragment.len() > buf.len() {
        return None;
    }

    // Seek to the start of the hinted line.
    let mut start = 0;
    if line > 1 {
        let mut remaining = line - 1;
        let mut offset = 0;
        while offset + fragment.len() <= buf.len() {
            if buf[offset] == b'\n' {
                offset += 1;
                start = offset;
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
            } else {
                offset += 1;
            }
        }
    }

    if buf[start..].starts_with(fragment) {
        return Some((start, 0));
    }

    // Expand the search outward, one line forward, one line backward.
    let mut forwards = start;
    let mut backwards = start;
    let mut step = 0usize;
    loop {
        let probe;
        if step & 1 == 1 {
            // One line back.
            if backwards == 0 {
                if forwards + fragment.len() > buf.len() {
                    return None;
                }
                step += 1;
                continue;
            }
            backwards -= 1;
            while backwards > 0 && buf[backwards - 1] != b'\n' {
                backwards -= 1;
            }
            probe = backwards;
        } else {
            // One line ahead.
            while forwards + fragment.len() <= buf.len() {
                let b = buf[forwards];
                forwards += 1;
                if b == b'\n' {
                    break;
                }
            }
            probe = forwards;
        }

        if probe + fragment.len() <= buf.len() && buf[probe..].starts_with(fragment) {
            let mut lines = (step >> 1) as isize + 1;
            if step & 1 == 1 {
                lines = -lines;
            }
            return Some((probe, lines));
        }
        step += 1;
    }
}

/// Apply every fragment of `patch` to `buf` in order.
///
/// Fragments that land away from their stated position append a note to
/// `report` ("Fragment applied at offset N"); a fragment that matches
/// nowhere fails the whole file.
pub fn apply_fragments(
    buf: &mut Vec<u8>,
    patch: &FilePatch,
    report: &mut Vec<String>,
) -> Result<(), ApplyError> {
    for frag in &patch.fragments {
        let (offset, line_delta) = locate_fragment(buf, &frag.old_image, frag.old_pos)
            .ok_or_else(|| ApplyError::PatchFailed {
                name: patch
                    .old_name
                    .clone()
                    .or_else(|| patch.new_name.clone())
                    .unwrap_or_else(|| BString::from("?")),
                pos: frag.old_pos,
            })?;

        if line_delta != 0 {
            report.push(format!("Fragment applied at offset {line_delta:+}"));
        }

        buf.splice(
            offset..offset + frag.old_image.len(),
            frag.new_image.iter().copied(),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_patches;

    #[test]
    fn exact_position_match() {
        let buf = b"one\ntwo\nthree\n";
        assert_eq!(locate_fragment(buf, b"two\n", 2), Some((4, 0)));
    }

    #[test]
    fn forward_offset_reported() {
        // Three lines of preface push the fragment three lines down.
        let buf = b"p1\np2\np3\nalpha\nbeta\n";
        assert_eq!(locate_fragment(buf, b"alpha\nbeta\n", 1), Some((9, 3)));
    }

    #[test]
    fn backward_offset_reported() {
        let buf = b"alpha\nbeta\ntail1\ntail2\ntail3\n";
        // Hinted two lines too far down; the match is at the top.
        assert_eq!(locate_fragment(buf, b"alpha\nbeta\n", 3), Some((0, -2)));
    }

    #[test]
    fn no_match_anywhere() {
        assert_eq!(locate_fragment(b"aaa\nbbb\n", b"zzz\n", 1), None);
    }

    #[test]
    fn oversized_fragment() {
        assert_eq!(locate_fragment(b"short\n", b"much longer than buffer\n", 1), None);
    }

    #[test]
    fn splice_grows_and_shrinks() {
        let text = "\
--- a/f
+++ b/f
@@ -1,3 +1,4 @@
 keep
-drop
+grew
+lines
 tail
";
        let patches = parse_patches(text.as_bytes(), 1).unwrap();
        let mut buf = b"keep\ndrop\ntail\n".to_vec();
        let mut report = Vec::new();
        apply_fragments(&mut buf, &patches[0], &mut report).unwrap();
        assert_eq!(buf, b"keep\ngrew\nlines\ntail\n");
        assert!(report.is_empty());
    }

    #[test]
    fn offset_application_reports() {
        let text = "\
--- a/f
+++ b/f
@@ -1,2 +1,2 @@
 alpha
-beta
+BETA
";
        let patches = parse_patches(text.as_bytes(), 1).unwrap();
        // The file grew a 3-line preface since the patch was generated.
        let mut buf = b"p1\np2\np3\nalpha\nbeta\n".to_vec();
        let mut report = Vec::new();
        apply_fragments(&mut buf, &patches[0], &mut report).unwrap();
        assert_eq!(buf, b"p1\np2\np3\nalpha\nBETA\n");
        assert_eq!(report, vec!["Fragment applied at offset +3".to_string()]);
    }

    #[test]
    fn failed_fragment_names_position() {
        let text = "\
--- a/f
+++ b/f
@@ -5,2 +5,2 @@
 nothing
-like this
+at all
";
        let patches = parse_patches(text.as_bytes(), 1).unwrap();
        let mut buf = b"completely\ndifferent\ncontents\n".to_vec();
        let mut report = Vec::new();
        match apply_fragments(&mut buf, &patches[0], &mut report) {
            Err(ApplyError::PatchFailed { name, pos }) => {
                assert_eq!(name, "f");
                assert_eq!(pos, 5);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn last_line_no_newline() {
        let text = "\
--- a/f
+++ b/f
@@ -1,2 +1,2 @@
 first
-second
+2nd
\\ No newline at end of file
";
        let patches = parse_patches(text.as_bytes(), 1).unwrap();
        // Old file ends with newline; patch strips it.
        let mut buf = b"first\nsecond\n".to_vec();
        let mut report = Vec::new();
        // The old image still carries the newline (the marker was on the
        // new side), so this matches and the result loses the newline.
        apply_fragments(&mut buf, &patches[0], &mut report).unwrap();
        assert_eq!(buf, b"first\n2nd");
    }
}
