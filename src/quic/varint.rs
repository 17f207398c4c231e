//! QUIC variable-length integer encoding
//!
//! | 2MSB | Length  | Usable Bits | Range                   |
//! |------|---------|-------------|-------------------------|
//! | 00   | 1 byte  | 6           | 0-63                    |
//! | 01   | 2 bytes | 14          | 0-16383                 |
//! | 10   | 4 bytes | 30          | 0-1073741823            |
//! | 11   | 8 bytes | 62          | 0-4611686018427387903   |

use crate::quic::error::{FormatError, Result};
use bytes::{Buf, BufMut};

/// Maximum value representable as a varint (2^62 - 1).
pub const MAX_VARINT: u64 = (1 << 62) - 1;

/// Number of bytes needed to encode `value`.
pub const fn varint_len(value: u64) -> usize {
    if value <= 63 {
        1
    } else if value <= 16383 {
        2
    } else if value <= 1_073_741_823 {
        4
    } else {
        8
    }
}

/// Encode `value` onto the end of `buf`, returning the number of bytes written.
///
/// Nothing is written when the value is out of range.
pub fn encode_varint<B: BufMut>(value: u64, buf: &mut B) -> Result<usize> {
    if value > MAX_VARINT {
        return Err(FormatError::VarIntOutOfRange(value).into());
    }

    let len = varint_len(value);
    match len {
        1 => buf.put_u8(value as u8),
        2 => buf.put_u16(0x4000 | value as u16),
        4 => buf.put_u32(0x8000_0000 | value as u32),
        _ => buf.put_u64(0xc000_0000_0000_0000 | value),
    }

    Ok(len)
}

/// Decode a varint from the front of `data`.
///
/// Returns `(value, bytes_consumed)`. The width is taken from the first byte.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let first = *data.first().ok_or(FormatError::Truncated {
        needed: 1,
        available: 0,
    })?;
    let len = 1usize << (first >> 6);

    if data.len() < len {
        return Err(FormatError::Truncated {
            needed: len,
            available: data.len(),
        }
        .into());
    }

    let value = data[1..len]
        .iter()
        .fold(u64::from(first & 0x3f), |acc, &b| (acc << 8) | u64::from(b));

    Ok((value, len))
}

/// Read a varint from `buf`, advancing it by exactly the encoded width.
///
/// The buffer is left untouched on error.
pub fn read_varint<B: Buf>(buf: &mut B) -> Result<u64> {
    if !buf.has_remaining() {
        return Err(FormatError::Truncated {
            needed: 1,
            available: 0,
        }
        .into());
    }

    let len = 1usize << (buf.chunk()[0] >> 6);
    if buf.remaining() < len {
        return Err(FormatError::Truncated {
            needed: len,
            available: buf.remaining(),
        }
        .into());
    }

    let mut raw = [0u8; 8];
    buf.copy_to_slice(&mut raw[..len]);
    let (value, _) = decode_varint(&raw[..len])?;
    Ok(value)
}
