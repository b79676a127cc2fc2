//! The delta instruction codec.
//!
//! A delta stream opens with two variable-length sizes (base and result),
//! then a run of instructions:
//!
//! ```text
//! [1SSOOOO?] [offset bytes] [size bytes]   copy from base
//! [0NNNNNNN] [N literal bytes]             insert
//! ```
//!
//! Copy offsets assemble from up to four gated bytes (bits 0-3,
//! little-endian), copy sizes from up to two gated bytes (bits 4-5); a
//! copy size of zero means 65536. Bit 6 is a legacy variant that copies
//! from the already-produced prefix of the result instead of the base.
//! A zero command byte is invalid.

use crate::PackError;

/// Read a variable-length size from a delta header.
///
/// Seven value bits per byte, low to high; the high bit continues.
/// Returns `(value, bytes_consumed)`.
pub fn read_size(data: &[u8]) -> Option<(usize, usize)> {
    let mut value: usize = 0;
    let mut shift = 0;
    let mut pos = 0;

    loop {
        let &byte = data.get(pos)?;
        pos += 1;
        value |= ((byte & 0x7f) as usize) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            break;
        }
    }
    Some((value, pos))
}

/// Write a variable-length size.
pub fn write_size(mut value: usize) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
    out
}

/// Apply a delta instruction stream to a base, producing the result.
pub fn apply(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, PackError> {
    let shape = |offset: usize, reason: &str| PackError::DeltaShape {
        offset,
        reason: reason.into(),
    };

    let mut pos = 0;

    let (base_size, consumed) =
        read_size(&delta[pos..]).ok_or_else(|| shape(0, "truncated base size"))?;
    pos += consumed;

    let (result_size, consumed) =
        read_size(&delta[pos..]).ok_or_else(|| shape(pos, "truncated result size"))?;
    pos += consumed;

    if base_size != base.len() {
        return Err(PackError::DeltaBaseSize {
            declared: base_size,
            actual: base.len(),
        });
    }

    let mut result: Vec<u8> = Vec::with_capacity(result_size);

    while pos < delta.len() {
        let cmd = delta[pos];
        pos += 1;

        if cmd & 0x80 != 0 {
            // Copy instruction.
            let mut offset: usize = 0;
            let mut size: usize = 0;

            for (bit, shift) in [(0x01u8, 0), (0x02, 8), (0x04, 16), (0x08, 24)] {
                if cmd & bit != 0 {
                    let &b = delta
                        .get(pos)
                        .ok_or_else(|| shape(pos, "truncated copy offset"))?;
                    offset |= (b as usize) << shift;
                    pos += 1;
                }
            }
            for (bit, shift) in [(0x10u8, 0), (0x20, 8)] {
                if cmd & bit != 0 {
                    let &b = delta
                        .get(pos)
                        .ok_or_else(|| shape(pos, "truncated copy size"))?;
                    size |= (b as usize) << shift;
                    pos += 1;
                }
            }
            if size == 0 {
                size = 0x10000;
            }

            if cmd & 0x40 != 0 {
                // Legacy variant: copy from the produced prefix of the result.
                if offset + size > result.len() {
                    return Err(shape(pos, "result copy out of bounds"));
                }
                for i in offset..offset + size {
                    let b = result[i];
                    result.push(b);
                }
            } else {
                if offset + size > base.len() {
                    return Err(shape(pos, "base copy out of bounds"));
                }
                result.extend_from_slice(&base[offset..offset + size]);
            }
        } else if cmd != 0 {
            // Insert instruction.
            let n = cmd as usize;
            if pos + n > delta.len() {
                return Err(shape(pos, "truncated insert data"));
            }
            result.extend_from_slice(&delta[pos..pos + n]);
            pos += n;
        } else {
            return Err(shape(pos - 1, "zero command byte"));
        }
    }

    // The stream must account for exactly the declared result.
    if pos != delta.len() {
        return Err(shape(pos, "trailing bytes after instructions"));
    }
    if result.len() != result_size {
        return Err(shape(
            pos,
            &format!(
                "result size mismatch: declared {result_size}, produced {}",
                result.len()
            ),
        ));
    }

    Ok(result)
}

/// Read only the size prologue of a delta: `(base_size, result_size)`.
pub fn read_sizes(delta: &[u8]) -> Result<(usize, usize), PackError> {
    let shape = |offset: usize, reason: &str| PackError::DeltaShape {
        offset,
        reason: reason.into(),
    };
    let (base_size, consumed) =
        read_size(delta).ok_or_else(|| shape(0, "truncated base size"))?;
    let (result_size, _) =
        read_size(&delta[consumed..]).ok_or_else(|| shape(consumed, "truncated result size"))?;
    Ok((base_size, result_size))
}

/// Encode a copy-from-base instruction.
pub fn encode_copy(offset: usize, size: usize) -> Vec<u8> {
    debug_assert!(size > 0 && size <= 0x10000);
    let mut out = vec![0x80u8];
    let mut cmd = 0x80u8;

    for (i, bit) in [(0usize, 0x01u8), (1, 0x02), (2, 0x04), (3, 0x08)] {
        let byte = ((offset >> (i * 8)) & 0xff) as u8;
        if byte != 0 {
            cmd |= bit;
            out.push(byte);
        }
    }
    // Size 0x10000 is encoded as zero size bytes.
    if size != 0x10000 {
        for (i, bit) in [(0usize, 0x10u8), (1, 0x20)] {
            let byte = ((size >> (i * 8)) & 0xff) as u8;
            if byte != 0 {
                cmd |= bit;
                out.push(byte);
            }
        }
    }
    out[0] = cmd;
    out
}

/// Encode an insert instruction (at most 127 bytes per chunk).
pub fn encode_insert(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in data.chunks(0x7f) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
    out
}

/// Assemble a full delta from a size pair and raw instruction bytes.
pub fn assemble(base_size: usize, result_size: usize, instructions: &[u8]) -> Vec<u8> {
    let mut delta = write_size(base_size);
    delta.extend_from_slice(&write_size(result_size));
    delta.extend_from_slice(instructions);
    delta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_codec_roundtrip() {
        for v in [0usize, 1, 15, 16, 127, 128, 65536, 1 << 20, usize::MAX >> 8] {
            let encoded = write_size(v);
            assert_eq!(read_size(&encoded), Some((v, encoded.len())));
        }
    }

    #[test]
    fn apply_copy_and_insert() {
        let base = b"ABCDEFGHIJ";
        let mut ins = Vec::new();
        ins.extend_from_slice(&encode_copy(0, 3));
        ins.extend_from_slice(&encode_insert(b"xyz"));
        ins.extend_from_slice(&encode_copy(7, 3));

        let delta = assemble(base.len(), 9, &ins);
        assert_eq!(apply(base, &delta).unwrap(), b"ABCxyzHIJ");
    }

    #[test]
    fn pangram_rewrite() {
        // base: the 44-byte pangram; "fox jumps " becomes "slow red "
        // via copy(0,16) + insert + copy(26,18).
        let base = b"The quick brown fox jumps over the lazy dog\n";
        assert_eq!(base.len(), 44);
        let mut ins = Vec::new();
        ins.extend_from_slice(&encode_copy(0, 16));
        ins.extend_from_slice(&encode_insert(b"slow red "));
        ins.extend_from_slice(&encode_copy(26, 18));

        let delta = assemble(44, 43, &ins);
        assert_eq!(
            apply(base, &delta).unwrap(),
            b"The quick brown slow red over the lazy dog\n"
        );
    }

    #[test]
    fn base_size_mismatch() {
        let delta = assemble(100, 5, &encode_copy(0, 5));
        assert!(matches!(
            apply(b"Hello", &delta),
            Err(PackError::DeltaBaseSize {
                declared: 100,
                actual: 5
            })
        ));
    }

    #[test]
    fn result_size_mismatch() {
        let delta = assemble(5, 10, &encode_copy(0, 5));
        assert!(matches!(apply(b"Hello", &delta), Err(PackError::DeltaShape { .. })));
    }

    #[test]
    fn zero_command_rejected() {
        let delta = assemble(5, 1, &[0x00]);
        assert!(matches!(apply(b"Hello", &delta), Err(PackError::DeltaShape { .. })));
    }

    #[test]
    fn copy_out_of_bounds() {
        let delta = assemble(5, 100, &encode_copy(0, 100));
        assert!(apply(b"short", &delta).is_err());
    }

    #[test]
    fn copy_size_zero_means_65536() {
        let base = vec![7u8; 0x10000];
        // encode_copy(_, 0x10000) emits no size bytes, so the gated size is 0.
        let ins = encode_copy(0, 0x10000);
        assert_eq!(ins.len(), 1, "no offset or size bytes expected");
        let delta = assemble(base.len(), 0x10000, &ins);
        assert_eq!(apply(&base, &delta).unwrap().len(), 0x10000);
    }

    #[test]
    fn result_prefix_copy_variant() {
        // Build by hand: insert "ab", then copy 2 bytes from the result
        // itself (cmd 0x40 | 0x01 offset gate | 0x10 size gate).
        let base = b"";
        let mut ins = Vec::new();
        ins.extend_from_slice(&encode_insert(b"ab"));
        ins.extend_from_slice(&[0x80 | 0x40 | 0x10, 0x02]); // offset 0, size 2, from result
        let delta = assemble(0, 4, &ins);
        assert_eq!(apply(base, &delta).unwrap(), b"abab");
    }

    #[test]
    fn result_prefix_copy_bounds_checked() {
        let mut ins = Vec::new();
        ins.extend_from_slice(&encode_insert(b"ab"));
        ins.extend_from_slice(&[0x80 | 0x40 | 0x10, 0x0a]); // wants 10 bytes of a 2-byte prefix
        let delta = assemble(0, 12, &ins);
        assert!(apply(b"", &delta).is_err());
    }

    #[test]
    fn empty_instruction_stream() {
        let delta = assemble(8, 0, &[]);
        assert_eq!(apply(b"anything", &delta).unwrap(), b"");
    }

    #[test]
    fn read_sizes_only() {
        let delta = assemble(123456, 654321, &[0x01, 0xff]);
        assert_eq!(read_sizes(&delta).unwrap(), (123456, 654321));
    }
}
