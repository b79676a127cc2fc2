//! Unified-diff parsing.
//!
//! Accepts git extended headers (`diff --git`, mode lines, rename/copy
//! lines, `index`) as well as plain `---`/`+++` diffs. Paths have `strip`
//! leading components removed (the `a/`/`b/` prefixes count as one).

use bstr::{BStr, BString, ByteSlice};

use crate::{ApplyError, FilePatch, Fragment};

/// Parse a complete patch stream into per-file patches.
pub fn parse_patches(input: &[u8], strip: usize) -> Result<Vec<FilePatch>, ApplyError> {
    let mut lines = Lines::new(input);
    let mut patches = Vec::new();

    while let Some(line) = lines.peek() {
        if line.starts_with(b"diff --git ") {
            patches.push(parse_git_patch(&mut lines, strip)?);
        } else if line.starts_with(b"--- ") {
            patches.push(parse_plain_patch(&mut lines, strip)?);
        } else {
            // Mail headers, commentary between patches: skip.
            lines.next();
        }
    }

    Ok(patches)
}

/// Byte-line cursor with 1-based numbering for diagnostics.
struct Lines<'a> {
    rest: &'a [u8],
    number: usize,
}

impl<'a> Lines<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self {
            rest: input,
            number: 0,
        }
    }

    /// The upcoming line, without its newline.
    fn peek(&self) -> Option<&'a [u8]> {
        if self.rest.is_empty() {
            return None;
        }
        match self.rest.find_byte(b'\n') {
            Some(nl) => Some(&self.rest[..nl]),
            None => Some(self.rest),
        }
    }

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.rest.is_empty() {
            return None;
        }
        self.number += 1;
        match self.rest.find_byte(b'\n') {
            Some(nl) => {
                let line = &self.rest[..nl];
                self.rest = &self.rest[nl + 1..];
                Some(line)
            }
            None => {
                let line = self.rest;
                self.rest = b"";
                Some(line)
            }
        }
    }

    fn bad(&self, reason: impl Into<String>) -> ApplyError {
        ApplyError::BadPatch {
            line: self.number,
            reason: reason.into(),
        }
    }
}

/// A git-format patch: `diff --git` plus extended headers plus hunks.
fn parse_git_patch(lines: &mut Lines<'_>, strip: usize) -> Result<FilePatch, ApplyError> {
    let header = lines.next().expect("caller peeked diff --git");
    let rest = &header[b"diff --git ".len()..];
    let (default_old, default_new) = parse_git_header_names(rest, strip);

    let mut patch = FilePatch {
        old_name: default_old,
        new_name: default_new,
        ..Default::default()
    };
    let mut explicit_new = false;
    let mut explicit_delete = false;

    // Extended header lines until the hunks (or the next file) begin.
    while let Some(line) = lines.peek() {
        if line.starts_with(b"@@ ") || line.starts_with(b"diff --git ") {
            break;
        }
        let line = lines.next().unwrap();

        if let Some(rest) = line.strip_prefix(b"--- ".as_ref()) {
            patch.old_name = parse_side_name(rest, strip);
        } else if let Some(rest) = line.strip_prefix(b"+++ ".as_ref()) {
            patch.new_name = parse_side_name(rest, strip);
        } else if let Some(rest) = line.strip_prefix(b"old mode ".as_ref()) {
            patch.old_mode = parse_octal(rest).ok_or_else(|| lines.bad("bad old mode"))?;
        } else if let Some(rest) = line.strip_prefix(b"new mode ".as_ref()) {
            patch.new_mode = parse_octal(rest).ok_or_else(|| lines.bad("bad new mode"))?;
        } else if let Some(rest) = line.strip_prefix(b"new file mode ".as_ref()) {
            explicit_new = true;
            patch.new_mode = parse_octal(rest).ok_or_else(|| lines.bad("bad new file mode"))?;
        } else if let Some(rest) = line.strip_prefix(b"deleted file mode ".as_ref()) {
            explicit_delete = true;
            patch.old_mode = parse_octal(rest).ok_or_else(|| lines.bad("bad deleted file mode"))?;
        } else if let Some(rest) = line.strip_prefix(b"rename from ".as_ref()) {
            patch.is_rename = true;
            patch.old_name = Some(strip_components(rest.as_bstr(), strip.saturating_sub(1)));
        } else if let Some(rest) = line.strip_prefix(b"rename to ".as_ref()) {
            patch.is_rename = true;
            patch.new_name = Some(strip_components(rest.as_bstr(), strip.saturating_sub(1)));
        } else if let Some(rest) = line.strip_prefix(b"copy from ".as_ref()) {
            patch.is_copy = true;
            patch.old_name = Some(strip_components(rest.as_bstr(), strip.saturating_sub(1)));
        } else if let Some(rest) = line.strip_prefix(b"copy to ".as_ref()) {
            patch.is_copy = true;
            patch.new_name = Some(strip_components(rest.as_bstr(), strip.saturating_sub(1)));
        } else if line.starts_with(b"index ")
            || line.starts_with(b"similarity index ")
            || line.starts_with(b"dissimilarity index ")
        {
            // Informational; application does not depend on them.
        } else if line.is_empty() {
            // Blank line ends this patch's headers when no hunks follow.
            break;
        } else {
            return Err(lines.bad(format!(
                "unrecognized header line: {:?}",
                line.as_bstr()
            )));
        }
    }

    parse_fragments(lines, &mut patch)?;
    finalize(lines, &mut patch, explicit_new, explicit_delete)?;
    Ok(patch)
}

/// A traditional diff: `---` / `+++` then hunks.
fn parse_plain_patch(lines: &mut Lines<'_>, strip: usize) -> Result<FilePatch, ApplyError> {
    let old_line = lines.next().expect("caller peeked ---");
    let mut patch = FilePatch {
        old_name: parse_side_name(&old_line[4..], strip),
        ..Default::default()
    };

    match lines.next() {
        Some(line) if line.starts_with(b"+++ ") => {
            patch.new_name = parse_side_name(&line[4..], strip);
        }
        _ => return Err(lines.bad("--- not followed by +++")),
    }

    parse_fragments(lines, &mut patch)?;
    finalize(lines, &mut patch, false, false)?;
    Ok(patch)
}

/// Read `@@` fragments until something else begins.
fn parse_fragments(lines: &mut Lines<'_>, patch: &mut FilePatch) -> Result<(), ApplyError> {
    while let Some(line) = lines.peek() {
        if !line.starts_with(b"@@ ") {
            break;
        }
        let header = lines.next().unwrap();
        let mut frag = parse_fragment_header(header).ok_or_else(|| {
            lines.bad(format!("bad fragment header: {:?}", header.as_bstr()))
        })?;
        parse_fragment_body(lines, &mut frag)?;
        patch.fragments.push(frag);
    }
    Ok(())
}

/// `@@ -oldpos[,oldlines] +newpos[,newlines] @@ ...`
fn parse_fragment_header(line: &[u8]) -> Option<Fragment> {
    let inner = line.strip_prefix(b"@@ ".as_ref())?;
    let end = inner.find(b" @@")?;
    let ranges = &inner[..end];

    let mut parts = ranges.splitn_str(2, b" ");
    let old = parts.next()?.strip_prefix(b"-".as_ref())?;
    let new = parts.next()?.strip_prefix(b"+".as_ref())?;

    let (old_pos, old_lines) = parse_range(old)?;
    let (new_pos, new_lines) = parse_range(new)?;

    Some(Fragment {
        old_pos,
        old_lines,
        new_pos,
        new_lines,
        ..Default::default()
    })
}

fn parse_range(s: &[u8]) -> Option<(usize, usize)> {
    let mut parts = s.splitn_str(2, b",");
    let pos = parse_decimal(parts.next()?)?;
    let lines = match parts.next() {
        Some(n) => parse_decimal(n)?,
        None => 1,
    };
    Some((pos, lines))
}

/// Fragment body: exactly `old_lines` + `new_lines` worth of prefixed
/// lines (context counting for both), with `\ No newline` markers
/// stripping the preceding line's newline.
fn parse_fragment_body(lines: &mut Lines<'_>, frag: &mut Fragment) -> Result<(), ApplyError> {
    // (destination, bytes) where destination: 0 = both, 1 = old, 2 = new.
    let mut parsed: Vec<(u8, Vec<u8>)> = Vec::new();
    let mut old_left = frag.old_lines;
    let mut new_left = frag.new_lines;

    while old_left > 0 || new_left > 0 {
        let line = lines.next().ok_or_else(|| lines.bad("truncated fragment"))?;
        let (dest, content) = match line.first() {
            Some(b' ') => (0u8, &line[1..]),
            // A genuinely empty line counts as empty context.
            None => (0, &line[..]),
            Some(b'-') => (1, &line[1..]),
            Some(b'+') => (2, &line[1..]),
            Some(b'\\') => {
                strip_last_newline(&mut parsed, lines)?;
                continue;
            }
            _ => return Err(lines.bad(format!("unexpected line: {:?}", line.as_bstr()))),
        };

        match dest {
            0 => {
                if old_left == 0 || new_left == 0 {
                    return Err(lines.bad("fragment line counts disagree with header"));
                }
                old_left -= 1;
                new_left -= 1;
            }
            1 => {
                if old_left == 0 {
                    return Err(lines.bad("fragment line counts disagree with header"));
                }
                old_left -= 1;
                frag.removed += 1;
            }
            _ => {
                if new_left == 0 {
                    return Err(lines.bad("fragment line counts disagree with header"));
                }
                new_left -= 1;
                frag.added += 1;
            }
        }

        let mut bytes = content.to_vec();
        bytes.push(b'\n');
        parsed.push((dest, bytes));
    }

    // A trailing no-newline marker may follow the last line.
    if lines.peek().is_some_and(|l| l.starts_with(b"\\")) {
        strip_last_newline(&mut parsed, lines)?;
        lines.next();
    }

    for (dest, bytes) in parsed {
        if dest != 2 {
            frag.old_image.extend_from_slice(&bytes);
        }
        if dest != 1 {
            frag.new_image.extend_from_slice(&bytes);
        }
    }
    Ok(())
}

/// Handle `\ No newline at end of file`.
fn strip_last_newline(
    parsed: &mut [(u8, Vec<u8>)],
    lines: &Lines<'_>,
) -> Result<(), ApplyError> {
    match parsed.last_mut() {
        Some((_, bytes)) if bytes.last() == Some(&b'\n') => {
            bytes.pop();
            Ok(())
        }
        _ => Err(lines.bad("no-newline marker with nothing before it")),
    }
}

/// Infer creation/deletion and run the cross-checks.
fn finalize(
    lines: &Lines<'_>,
    patch: &mut FilePatch,
    explicit_new: bool,
    explicit_delete: bool,
) -> Result<(), ApplyError> {
    let old_lines: usize = patch.fragments.iter().map(|f| f.old_lines).sum();
    let new_lines: usize = patch.fragments.iter().map(|f| f.new_lines).sum();
    let has_fragments = !patch.fragments.is_empty();

    // `--- /dev/null` parses as a missing name.
    patch.is_new = explicit_new || (has_fragments && patch.old_name.is_none());
    patch.is_delete = explicit_delete || (has_fragments && patch.new_name.is_none());

    // A hunk with no old side also means creation, no new side deletion.
    if has_fragments && old_lines == 0 && !patch.is_delete {
        patch.is_new = true;
    }
    if has_fragments && new_lines == 0 && !patch.is_new {
        patch.is_delete = true;
    }

    if patch.is_new && old_lines != 0 {
        return Err(lines.bad("new file depends on old contents"));
    }
    if patch.is_delete && new_lines != 0 {
        return Err(lines.bad("deleted file still has contents"));
    }
    if patch.is_new {
        patch.old_name = None;
    }
    if patch.is_delete {
        patch.new_name = None;
    }
    if patch.old_name.is_none() && patch.new_name.is_none() {
        return Err(lines.bad("patch lacks filename information"));
    }

    // A pure mode change, rename, or copy carries no fragments; anything
    // else must.
    if !has_fragments
        && patch.old_mode == 0
        && patch.new_mode == 0
        && !patch.is_rename
        && !patch.is_copy
    {
        return Err(lines.bad("patch with no hunks and no mode change"));
    }

    Ok(())
}

/// `a/old b/new` from a `diff --git` line.
fn parse_git_header_names(rest: &[u8], strip: usize) -> (Option<BString>, Option<BString>) {
    if let Some(ix) = rest.find(b" b/") {
        let old = &rest[..ix];
        let new = &rest[ix + 1..];
        return (
            Some(strip_components(old.as_bstr(), strip)),
            Some(strip_components(new.as_bstr(), strip)),
        );
    }
    let mut parts = rest.splitn_str(2, b" ");
    let old = parts.next().map(|p| strip_components(p.as_bstr(), strip));
    let new = parts.next().map(|p| strip_components(p.as_bstr(), strip));
    (old.clone(), new.or(old))
}

/// A `---`/`+++` name: `/dev/null` means "no file"; a trailing tab
/// (timestamp separator) is cut.
fn parse_side_name(raw: &[u8], strip: usize) -> Option<BString> {
    let name = match raw.find_byte(b'\t') {
        Some(tab) => &raw[..tab],
        None => raw,
    };
    if name == b"/dev/null" {
        return None;
    }
    Some(strip_components(name.as_bstr(), strip))
}

/// Remove `strip` leading path components (never the last one).
fn strip_components(path: &BStr, strip: usize) -> BString {
    let mut rest: &[u8] = path;
    for _ in 0..strip {
        match rest.find_byte(b'/') {
            Some(ix) if ix + 1 < rest.len() => rest = &rest[ix + 1..],
            _ => break,
        }
    }
    BString::from(rest)
}

fn parse_decimal(s: &[u8]) -> Option<usize> {
    if s.is_empty() || !s.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(s).ok()?.parse().ok()
}

fn parse_octal(s: &[u8]) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    u32::from_str_radix(std::str::from_utf8(s).ok()?, 8).ok()
}
