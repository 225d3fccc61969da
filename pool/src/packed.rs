//! Variable-length signed integers used throughout the module file format.
//!
//! The low bits of the first byte select the encoding:
//!
//! | First byte  | Bytes | Range                    |
//! |-------------|-------|--------------------------|
//! | `xxxxxxx1`  | 1     | 7-bit signed             |
//! | `xxxxx010`  | 2     | 13-bit signed, little-endian |
//! | `xxxxx100`  | 3     | 21-bit signed, little-endian |
//! | `nnnnn000`  | 2..=9 | `nnnnn + 1` big-endian two's-complement bytes |

use std::io::{self, Read, Write};

pub fn write_packed(w: &mut dyn Write, n: i64) -> io::Result<()> {
    if (-64..=63).contains(&n) {
        w.write_all(&[((n << 1) | 1) as u8])
    } else if (-4096..=4095).contains(&n) {
        w.write_all(&(((n << 3) | 0b010) as u16).to_le_bytes())
    } else if (-(1 << 20)..(1 << 20)).contains(&n) {
        let v = ((n << 3) | 0b100) as u32;
        w.write_all(&v.to_le_bytes()[..3])
    } else {
        let bytes = n.to_be_bytes();
        let len = significant_bytes(n);
        w.write_all(&[((len - 1) << 3) as u8])?;
        w.write_all(&bytes[8 - len..])
    }
}

pub fn read_packed(r: &mut dyn Read) -> io::Result<i64> {
    let b0 = read_u8(r)?;
    if b0 & 1 != 0 {
        return Ok(((b0 as i8) >> 1) as i64);
    }
    match b0 & 0b111 {
        0b010 => {
            let b1 = read_u8(r)?;
            Ok((i16::from_le_bytes([b0, b1]) >> 3) as i64)
        }
        0b100 => {
            let mut rest = [0u8; 2];
            r.read_exact(&mut rest)?;
            let v = i32::from_le_bytes([0, b0, rest[0], rest[1]]);
            Ok((v >> 11) as i64)
        }
        0b000 => {
            let len = (b0 >> 3) as usize + 1;
            if len > 8 {
                return Err(invalid_data("packed integer longer than 8 bytes"));
            }
            let mut bytes = [0u8; 8];
            r.read_exact(&mut bytes[8 - len..])?;
            if bytes[8 - len] & 0x80 != 0 {
                bytes[..8 - len].fill(0xFF);
            }
            Ok(i64::from_be_bytes(bytes))
        }
        _ => Err(invalid_data("malformed packed integer")),
    }
}

/// Read a packed integer that must be a non-negative count or index.
pub fn read_magnitude(r: &mut dyn Read) -> io::Result<u32> {
    let n = read_packed(r)?;
    u32::try_from(n).map_err(|_| invalid_data("expected a non-negative magnitude"))
}

pub fn write_string(w: &mut dyn Write, s: &str) -> io::Result<()> {
    write_packed(w, s.len() as i64)?;
    w.write_all(s.as_bytes())
}

pub fn read_string(r: &mut dyn Read) -> io::Result<String> {
    let len = read_magnitude(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| invalid_data("invalid UTF-8"))
}

pub fn read_u8(r: &mut dyn Read) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub fn invalid_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

fn significant_bytes(n: i64) -> usize {
    (1..8)
        .find(|&len| {
            let bits = len * 8;
            let min = -(1i64 << (bits - 1));
            let max = (1i64 << (bits - 1)) - 1;
            (min..=max).contains(&n)
        })
        .unwrap_or(8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(n: i64) -> Vec<u8> {
        let mut buf = Vec::new();
        write_packed(&mut buf, n).unwrap();
        buf
    }

    fn decode(bytes: &[u8]) -> i64 {
        read_packed(&mut &bytes[..]).unwrap()
    }

    #[test]
    fn encoding_sizes() {
        assert_eq!(encode(0), [0b1]);
        assert_eq!(encode(-1), [0xFF]);
        assert_eq!(encode(63).len(), 1);
        assert_eq!(encode(64).len(), 2);
        assert_eq!(encode(-4096).len(), 2);
        assert_eq!(encode(4096).len(), 3);
        assert_eq!(encode(1 << 20).len(), 4);
        assert_eq!(encode(i64::MIN).len(), 9);
        for n in [64, -4096, 4096, 1 << 20, 1 << 24, i64::MIN] {
            assert_eq!(decode(&encode(n)), n, "{n}");
        }
    }

    #[test]
    fn boundaries_decode() {
        for n in [
            0, 1, -1, 63, -64, 64, -65, 4095, -4096, 4096, -4097, (1 << 20) - 1, -(1 << 20),
            1 << 20, 1 << 24, -(1 << 24), i32::MAX as i64, i32::MIN as i64, 1 << 40, -(1 << 40),
            i64::MAX, i64::MIN,
        ] {
            assert_eq!(decode(&encode(n)), n, "{n}");
        }
    }

    #[test]
    fn long_headers_do_not_look_like_short_tags() {
        for len in 2..=8u8 {
            let header = (len - 1) << 3;
            assert_eq!(header & 0b111, 0, "{len}");
        }
        assert_eq!(encode(1 << 24)[0], 0b0001_1000);
        assert_eq!(encode(i64::MAX)[0], 0b0011_1000);
    }

    #[test]
    fn rejects_bad_prefix() {
        assert!(read_packed(&mut &[0b110u8][..]).is_err());
        assert!(read_packed(&mut &[0b0100_0000u8][..]).is_err());
        assert!(read_magnitude(&mut &encode(-3)[..]).is_err());
    }
}
