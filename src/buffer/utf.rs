//! Modified UTF-8: a 2-byte big-endian length followed by the encoded UTF-16
//! units. NUL is written as two bytes and surrogates are encoded one unit at a
//! time, so every UTF-16 unit maps to 1, 2 or 3 bytes.

use std::io;

pub(crate) const MAX_ENCODED_LEN: usize = u16::MAX as usize;

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn encode(s: &str) -> io::Result<Vec<u8>> {
    let mut body = Vec::with_capacity(s.len() + 2);
    body.extend_from_slice(&[0, 0]);
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007F => body.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                body.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                body.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                body.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                body.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                body.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    let len = body.len() - 2;
    if len > MAX_ENCODED_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("encoded string too long: {len} bytes"),
        ));
    }
    body[..2].copy_from_slice(&(len as u16).to_be_bytes());
    Ok(body)
}

pub(crate) fn decode(body: &[u8]) -> io::Result<String> {
    let mut units = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        let a = u16::from(body[i]);
        match a >> 4 {
            0..=7 => {
                units.push(a);
                i += 1;
            }
            12 | 13 => {
                let b = u16::from(continuation(body, i + 1)?);
                units.push(((a & 0x1F) << 6) | (b & 0x3F));
                i += 2;
            }
            14 => {
                let b = u16::from(continuation(body, i + 1)?);
                let c = u16::from(continuation(body, i + 2)?);
                units.push(((a & 0x0F) << 12) | ((b & 0x3F) << 6) | (c & 0x3F));
                i += 3;
            }
            _ => return Err(malformed(i)),
        }
    }
    String::from_utf16(&units).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn continuation(body: &[u8], at: usize) -> io::Result<u8> {
    match body.get(at) {
        Some(b) if b & 0xC0 == 0x80 => Ok(*b),
        _ => Err(malformed(at)),
    }
}

fn malformed(at: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("malformed modified UTF-8 at byte {at}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nul_uses_two_bytes() {
        let enc = encode("a\0b").unwrap();
        assert_eq!(enc, vec![0, 4, b'a', 0xC0, 0x80, b'b']);
        assert_eq!(decode(&enc[2..]).unwrap(), "a\0b");
    }

    #[test]
    fn supplementary_characters_use_surrogate_triplets() {
        let enc = encode("\u{1F600}").unwrap();
        assert_eq!(enc.len(), 2 + 6);
        assert_eq!(decode(&enc[2..]).unwrap(), "\u{1F600}");
    }

    #[test]
    fn rejects_truncated_sequence() {
        assert!(decode(&[0xE2, 0x82]).is_err());
    }
}
