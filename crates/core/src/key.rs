//! Order-preserving key packing
//!
//! Packs a [`Key`] into bytes whose lexicographic order matches the key's
//! tuple order, following the FoundationDB tuple layer for the subset of
//! types a key part can hold.
//!
//! | Code | Type | Encoding |
//! |------|------|----------|
//! | 0x01 | Bytes | raw bytes, `0x00` escaped as `0x00 0xFF`, `0x00` terminator |
//! | 0x02 | String | UTF-8 bytes, escaped like Bytes |
//! | 0x0C-0x1C | Int | `0x14` is zero; positive `0x14 + len` + big-endian; negative `0x14 - len` + one's complement |
//! | 0x21 | Float | 8 bytes big-endian; positive: sign bit flipped, negative: all bits flipped |
//! | 0x26/0x27 | Bool | false / true |
//! | 0x30 | Date | 8 bytes big-endian, sign bit flipped |
//! | 0x31 | BigInt | 16 bytes big-endian, sign bit flipped |
//!
//! ## Contract
//!
//! - `Key::unpack(&key.pack()) == key`
//! - `a < b` iff `a.pack() < b.pack()`
//! - Every packed element starts with a code below `0xFF`, so
//!   `prefix.pack() + [0xFF]` is an exclusive upper bound for every key that
//!   extends `prefix`.

use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::types::{Key, KeyPart};

const BYTES_CODE: u8 = 0x01;
const STRING_CODE: u8 = 0x02;
const INT_ZERO_CODE: u8 = 0x14;
const DOUBLE_CODE: u8 = 0x21;
const FALSE_CODE: u8 = 0x26;
const TRUE_CODE: u8 = 0x27;
const DATE_CODE: u8 = 0x30;
const BIGINT_CODE: u8 = 0x31;
const NULL_ESCAPE: u8 = 0xFF;

/// Byte appended to a packed prefix to form an exclusive range end
pub const PREFIX_END: u8 = 0xFF;

impl Key {
    /// Pack the key into order-preserving bytes
    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.len() * 8);
        for part in self.parts() {
            pack_part(part, &mut buf);
        }
        buf
    }

    /// Unpack bytes produced by [`Key::pack`]
    pub fn unpack(data: &[u8]) -> Result<Key> {
        let mut parts = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let (part, consumed) = unpack_part(data, offset)?;
            parts.push(part);
            offset += consumed;
        }
        Ok(Key::from(parts))
    }

    /// Exclusive upper bound of the range of keys strictly extending this key
    pub fn prefix_end(&self) -> Vec<u8> {
        let mut end = self.pack();
        end.push(PREFIX_END);
        end
    }
}

fn pack_part(part: &KeyPart, buf: &mut Vec<u8>) {
    match part {
        KeyPart::Bytes(b) => {
            buf.push(BYTES_CODE);
            pack_escaped(b, buf);
        }
        KeyPart::String(s) => {
            buf.push(STRING_CODE);
            pack_escaped(s.as_bytes(), buf);
        }
        KeyPart::Int(i) => pack_int(*i, buf),
        KeyPart::Float(f) => {
            buf.push(DOUBLE_CODE);
            let bits = f.to_bits();
            let transformed = if bits & 0x8000_0000_0000_0000 != 0 {
                !bits
            } else {
                bits ^ 0x8000_0000_0000_0000
            };
            buf.extend_from_slice(&transformed.to_be_bytes());
        }
        KeyPart::Bool(false) => buf.push(FALSE_CODE),
        KeyPart::Bool(true) => buf.push(TRUE_CODE),
        KeyPart::Date(ms) => {
            buf.push(DATE_CODE);
            buf.extend_from_slice(&((*ms as u64) ^ (1 << 63)).to_be_bytes());
        }
        KeyPart::BigInt(i) => {
            buf.push(BIGINT_CODE);
            buf.extend_from_slice(&((*i as u128) ^ (1 << 127)).to_be_bytes());
        }
    }
}

fn pack_escaped(data: &[u8], buf: &mut Vec<u8>) {
    for &b in data {
        buf.push(b);
        if b == 0x00 {
            buf.push(NULL_ESCAPE);
        }
    }
    buf.push(0x00);
}

/// Number of big-endian bytes needed to hold `n`
fn byte_len(n: u64) -> usize {
    (8 - (n.leading_zeros() / 8) as usize).max(1)
}

fn pack_int(i: i64, buf: &mut Vec<u8>) {
    if i == 0 {
        buf.push(INT_ZERO_CODE);
        return;
    }
    let abs = i.unsigned_abs();
    let size = byte_len(abs);
    let bytes = if i > 0 {
        buf.push(INT_ZERO_CODE + size as u8);
        abs.to_be_bytes()
    } else {
        buf.push(INT_ZERO_CODE - size as u8);
        let mask = if size == 8 {
            u64::MAX
        } else {
            (1u64 << (size * 8)) - 1
        };
        ((!abs) & mask).to_be_bytes()
    };
    buf.extend_from_slice(&bytes[8 - size..]);
}

fn unpack_part(data: &[u8], offset: usize) -> Result<(KeyPart, usize)> {
    let code = data[offset];
    match code {
        BYTES_CODE => {
            let (bytes, consumed) = unpack_escaped(data, offset + 1)?;
            Ok((KeyPart::Bytes(bytes), consumed + 1))
        }
        STRING_CODE => {
            let (bytes, consumed) = unpack_escaped(data, offset + 1)?;
            let s = String::from_utf8(bytes)
                .map_err(|e| Error::InvalidKey(format!("invalid UTF-8 at {}: {}", offset, e)))?;
            Ok((KeyPart::String(s), consumed + 1))
        }
        DOUBLE_CODE => {
            let end = offset + 9;
            if end > data.len() {
                return Err(Error::InvalidKey(format!(
                    "truncated float at offset {}",
                    offset
                )));
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&data[offset + 1..end]);
            let transformed = u64::from_be_bytes(raw);
            let bits = if transformed & 0x8000_0000_0000_0000 != 0 {
                transformed ^ 0x8000_0000_0000_0000
            } else {
                !transformed
            };
            Ok((KeyPart::Float(f64::from_bits(bits)), 9))
        }
        FALSE_CODE => Ok((KeyPart::Bool(false), 1)),
        TRUE_CODE => Ok((KeyPart::Bool(true), 1)),
        DATE_CODE => {
            let raw: [u8; 8] = fixed(data, offset, "date")?;
            let ms = (u64::from_be_bytes(raw) ^ (1 << 63)) as i64;
            Ok((KeyPart::Date(ms), 9))
        }
        BIGINT_CODE => {
            let raw: [u8; 16] = fixed(data, offset, "bigint")?;
            let i = (u128::from_be_bytes(raw) ^ (1 << 127)) as i128;
            Ok((KeyPart::BigInt(i), 17))
        }
        c if (0x0C..=0x1C).contains(&c) => unpack_int(data, offset),
        c => Err(Error::InvalidKey(format!(
            "unknown type code 0x{:02X} at offset {}",
            c, offset
        ))),
    }
}

/// The `N` bytes following the type code at `offset`
fn fixed<const N: usize>(data: &[u8], offset: usize, what: &str) -> Result<[u8; N]> {
    data.get(offset + 1..offset + 1 + N)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| Error::InvalidKey(format!("truncated {} at offset {}", what, offset)))
}

fn unpack_escaped(data: &[u8], start: usize) -> Result<(Vec<u8>, usize)> {
    let mut out = Vec::new();
    let mut i = start;
    while i < data.len() {
        let b = data[i];
        if b == 0x00 {
            if i + 1 < data.len() && data[i + 1] == NULL_ESCAPE {
                out.push(0x00);
                i += 2;
            } else {
                return Ok((out, i - start + 1));
            }
        } else {
            out.push(b);
            i += 1;
        }
    }
    Err(Error::InvalidKey(format!(
        "missing terminator for element starting at {}",
        start
    )))
}

fn unpack_int(data: &[u8], offset: usize) -> Result<(KeyPart, usize)> {
    let code = data[offset];
    if code == INT_ZERO_CODE {
        return Ok((KeyPart::Int(0), 1));
    }
    let positive = code > INT_ZERO_CODE;
    let size = if positive {
        (code - INT_ZERO_CODE) as usize
    } else {
        (INT_ZERO_CODE - code) as usize
    };
    if size > 8 || offset + 1 + size > data.len() {
        return Err(Error::InvalidKey(format!(
            "truncated integer at offset {}",
            offset
        )));
    }
    let mut raw = 0u64;
    for &b in &data[offset + 1..offset + 1 + size] {
        raw = (raw << 8) | b as u64;
    }
    let value = if positive {
        i64::try_from(raw)
            .map_err(|_| Error::InvalidKey(format!("integer overflow at offset {}", offset)))?
    } else {
        let mask = if size == 8 {
            u64::MAX
        } else {
            (1u64 << (size * 8)) - 1
        };
        let abs = (!raw) & mask;
        if abs > i64::MAX as u64 + 1 {
            return Err(Error::InvalidKey(format!(
                "integer overflow at offset {}",
                offset
            )));
        }
        (abs as i128).wrapping_neg() as i64
    };
    Ok((KeyPart::Int(value), 1 + size))
}

/// Validate a key against the substrate's size limit
pub fn validate_key_with_limits(key: &Key, limits: &Limits) -> Result<()> {
    let len = key.pack().len();
    if len > limits.max_key_bytes {
        return Err(Error::LimitExceeded(format!(
            "key {} is {} bytes, max {}",
            key, len, limits.max_key_bytes
        )));
    }
    Ok(())
}
