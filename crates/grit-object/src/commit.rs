use bstr::{BString, ByteSlice};
use grit_hash::ObjectId;

use crate::ObjectError;

/// An identity line: `name <email> epoch zone`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Everything before the timestamp, e.g. `Jane Doe <jane@example.com>`.
    pub ident: BString,
    /// Seconds since the epoch.
    pub when: i64,
    /// Timezone as written, e.g. `-0700`. Must be numeric.
    pub tz: BString,
}

impl Signature {
    /// Parse the value of an `author`/`committer`/`tagger` header.
    ///
    /// The last two whitespace-separated fields are the epoch seconds and a
    /// numeric `±HHMM` zone; three-letter zone names are rejected.
    pub fn parse(value: &[u8]) -> Result<Self, ObjectError> {
        let bad = |what: &str| ObjectError::BadCommit(format!("bad identity line: {what}"));

        let mut fields = value.rsplitn(3, |&b| b == b' ');
        let tz = fields.next().ok_or_else(|| bad("empty"))?;
        let when = fields.next().ok_or_else(|| bad("missing date"))?;
        let ident = fields.next().ok_or_else(|| bad("missing name"))?;

        if tz.len() != 5
            || !(tz[0] == b'+' || tz[0] == b'-')
            || !tz[1..].iter().all(u8::is_ascii_digit)
        {
            return Err(bad("non-numeric timezone"));
        }
        let when: i64 = std::str::from_utf8(when)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| bad("non-numeric date"))?;

        Ok(Self {
            ident: BString::from(ident),
            when,
            tz: BString::from(tz),
        })
    }

    /// Serialize back to the header value form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::from(self.ident.as_slice());
        out.push(b' ');
        out.extend_from_slice(self.when.to_string().as_bytes());
        out.push(b' ');
        out.extend_from_slice(&self.tz);
        out
    }
}

/// A commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Digest of the root tree.
    pub tree: ObjectId,
    /// Parent commit digests (empty for a root commit).
    pub parents: Vec<ObjectId>,
    /// Author identity and timestamp.
    pub author: Signature,
    /// Committer identity and timestamp.
    pub committer: Signature,
    /// Commit message (everything after the blank separator line).
    pub message: BString,
}

impl Commit {
    /// The commit date: committer timestamp, seconds since the epoch.
    pub fn date(&self) -> i64 {
        self.committer.when
    }

    /// Is this a root commit (no parents)?
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Parse commit content from raw bytes (no object header).
    ///
    /// The framing is strict: `tree <40 hex>\n`, zero or more
    /// `parent <40 hex>\n`, then `author ...`. Anything else fails.
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let bad = |what: &str| ObjectError::BadCommit(what.into());

        let mut rest = content
            .strip_prefix(b"tree ")
            .ok_or_else(|| bad("missing tree header"))?;
        let (tree, r) = take_hex_line(rest).ok_or_else(|| bad("malformed tree header"))?;
        rest = r;

        let mut parents = Vec::new();
        while let Some(after) = rest.strip_prefix(b"parent ") {
            let (parent, r) = take_hex_line(after).ok_or_else(|| bad("malformed parent header"))?;
            parents.push(parent);
            rest = r;
        }

        let after_author = rest
            .strip_prefix(b"author ")
            .ok_or_else(|| bad("missing author header"))?;
        let (author_val, r) = take_line(after_author).ok_or_else(|| bad("unterminated author"))?;
        let author = Signature::parse(author_val)?;
        rest = r;

        let after_committer = rest
            .strip_prefix(b"committer ")
            .ok_or_else(|| bad("missing committer header"))?;
        let (committer_val, r) =
            take_line(after_committer).ok_or_else(|| bad("unterminated committer"))?;
        let committer = Signature::parse(committer_val)?;
        rest = r;

        // A blank line separates headers from the message; a headers-only
        // commit (no message) is tolerated.
        let message = match rest.first() {
            Some(b'\n') => BString::from(&rest[1..]),
            None => BString::default(),
            Some(_) => return Err(bad("junk after committer header")),
        };

        Ok(Self {
            tree,
            parents,
            author,
            committer,
            message,
        })
    }

    /// Serialize commit content (no object header).
    pub fn serialize_content(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"tree ");
        out.extend_from_slice(self.tree.to_hex().as_bytes());
        out.push(b'\n');
        for parent in &self.parents {
            out.extend_from_slice(b"parent ");
            out.extend_from_slice(parent.to_hex().as_bytes());
            out.push(b'\n');
        }
        out.extend_from_slice(b"author ");
        out.extend_from_slice(&self.author.to_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"committer ");
        out.extend_from_slice(&self.committer.to_bytes());
        out.push(b'\n');
        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }
}

/// Split a `<40 hex>\n` prefix off `data`.
fn take_hex_line(data: &[u8]) -> Option<(ObjectId, &[u8])> {
    if data.len() < 41 || data[40] != b'\n' {
        return None;
    }
    let hex = std::str::from_utf8(&data[..40]).ok()?;
    let oid = ObjectId::from_hex(hex).ok()?;
    Some((oid, &data[41..]))
}

/// Split one `\n`-terminated line off `data`.
fn take_line(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let nl = data.find_byte(b'\n')?;
    Some((&data[..nl], &data[nl + 1..]))
}
