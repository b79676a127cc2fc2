use bstr::{BString, ByteSlice};
use grit_hash::ObjectId;

use crate::commit::Signature;
use crate::{ObjectError, ObjectType};

/// An annotated tag object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Digest of the tagged object.
    pub target: ObjectId,
    /// Kind of the tagged object.
    pub target_type: ObjectType,
    /// Tag name.
    pub name: BString,
    /// Tagger identity and timestamp.
    pub tagger: Signature,
    /// Tag message.
    pub message: BString,
}

impl Tag {
    /// Parse tag content from raw bytes (no object header).
    ///
    /// Framing: `object <40 hex>\n`, `type <name>\n`, `tag <name>\n`,
    /// `tagger ...\n`, blank line, message.
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let (target_hex, rest) = field(content, b"object ")
            .ok_or(ObjectError::MissingTagField { field: "object" })?;
        let target = std::str::from_utf8(target_hex)
            .ok()
            .and_then(|s| ObjectId::from_hex(s).ok())
            .ok_or(ObjectError::MissingTagField { field: "object" })?;

        let (type_name, rest) =
            field(rest, b"type ").ok_or(ObjectError::MissingTagField { field: "type" })?;
        let target_type = ObjectType::from_bytes(type_name)?;

        let (name, rest) =
            field(rest, b"tag ").ok_or(ObjectError::MissingTagField { field: "tag" })?;

        let (tagger_val, rest) =
            field(rest, b"tagger ").ok_or(ObjectError::MissingTagField { field: "tagger" })?;
        let tagger = Signature::parse(tagger_val)?;

        let message = match rest.first() {
            Some(b'\n') => BString::from(&rest[1..]),
            None => BString::default(),
            Some(_) => return Err(ObjectError::MissingTagField { field: "message" }),
        };

        Ok(Self {
            target,
            target_type,
            name: BString::from(name),
            tagger,
            message,
        })
    }

    /// Serialize tag content (no object header).
    pub fn serialize_content(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"object ");
        out.extend_from_slice(self.target.to_hex().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"type ");
        out.extend_from_slice(self.target_type.as_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"tag ");
        out.extend_from_slice(&self.name);
        out.push(b'\n');
        out.extend_from_slice(b"tagger ");
        out.extend_from_slice(&self.tagger.to_bytes());
        out.push(b'\n');
        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }
}

/// Strip `key` then split one line off.
fn field<'a>(data: &'a [u8], key: &[u8]) -> Option<(&'a [u8], &'a [u8])> {
    let rest = data.strip_prefix(key)?;
    let nl = rest.find_byte(b'\n')?;
    Some((&rest[..nl], &rest[nl + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        "object ce013625030ba8dba906f756967f9e9ca394464a\n\
         type commit\n\
         tag v0.99\n\
         tagger T Agger <tagger@example.com> 1116234662 -0700\n\
         \n\
         Test release\n"
            .as_bytes()
            .to_vec()
    }

    #[test]
    fn parse_full_tag() {
        let tag = Tag::parse(&sample()).unwrap();
        assert_eq!(
            tag.target.to_hex(),
            "ce013625030ba8dba906f756967f9e9ca394464a"
        );
        assert_eq!(tag.target_type, ObjectType::Commit);
        assert_eq!(tag.name, "v0.99");
        assert_eq!(tag.message, "Test release\n");
    }

    #[test]
    fn serialize_roundtrip() {
        let tag = Tag::parse(&sample()).unwrap();
        assert_eq!(tag.serialize_content(), sample());
    }

    #[test]
    fn header_order_is_fixed() {
        let out_of_order = "type commit\n\
                            object ce013625030ba8dba906f756967f9e9ca394464a\n\
                            tag v1\n\
                            tagger T <t@t> 0 +0000\n\n";
        assert!(Tag::parse(out_of_order.as_bytes()).is_err());
    }

    #[test]
    fn missing_fields() {
        assert!(matches!(
            Tag::parse(b"object ce013625030ba8dba906f756967f9e9ca394464a\n"),
            Err(ObjectError::MissingTagField { field: "type" })
        ));
        assert!(matches!(
            Tag::parse(b""),
            Err(ObjectError::MissingTagField { field: "object" })
        ));
    }
}
