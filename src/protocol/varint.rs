//! Base-128 varint codec (protobuf encoding, little-endian groups of 7 bits).

use bytes::{BufMut, BytesMut};

/// Longest encoding of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

/// Result of decoding a varint from the front of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarintResult {
    /// Decoded value and number of bytes consumed.
    Value(u64, usize),
    /// Buffer ended before the final byte.
    Incomplete,
    /// More than `MAX_VARINT_LEN` bytes, or bits beyond 64.
    Overflow,
}

/// Append `value` to `out`.
pub fn encode(mut value: u64, out: &mut BytesMut) {
    while value >= 0x80 {
        out.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    out.put_u8(value as u8);
}

/// Number of bytes `encode` writes for `value`.
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Decode a varint from the front of `input`.
pub fn decode(input: &[u8]) -> VarintResult {
    let mut value: u64 = 0;

    for (i, &byte) in input.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            return VarintResult::Overflow;
        }
        let low = u64::from(byte & 0x7F);
        let shift = 7 * i as u32;
        // The tenth byte may only carry the top bit of a u64.
        if i == MAX_VARINT_LEN - 1 && low > 1 {
            return VarintResult::Overflow;
        }
        value |= low << shift;
        if byte & 0x80 == 0 {
            return VarintResult::Value(value, i + 1);
        }
    }

    if input.len() >= MAX_VARINT_LEN {
        VarintResult::Overflow
    } else {
        VarintResult::Incomplete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_byte() {
        let mut out = BytesMut::new();
        encode(7, &mut out);
        assert_eq!(&out[..], &[0x07]);
        assert_eq!(decode(&out), VarintResult::Value(7, 1));
    }

    #[test]
    fn test_multi_byte() {
        let mut out = BytesMut::new();
        encode(300, &mut out);
        assert_eq!(&out[..], &[0xAC, 0x02]);
        assert_eq!(decode(&out), VarintResult::Value(300, 2));
        assert_eq!(encoded_len(300), 2);
    }

    #[test]
    fn test_encoded_len() {
        assert_eq!(encoded_len(0), 1);
        assert_eq!(encoded_len(127), 1);
        assert_eq!(encoded_len(128), 2);
        assert_eq!(encoded_len(u64::MAX), MAX_VARINT_LEN);
    }

    #[test]
    fn test_max_value() {
        let mut out = BytesMut::new();
        encode(u64::MAX, &mut out);
        assert_eq!(out.len(), MAX_VARINT_LEN);
        assert_eq!(decode(&out), VarintResult::Value(u64::MAX, MAX_VARINT_LEN));
    }

    #[test]
    fn test_incomplete() {
        assert_eq!(decode(&[]), VarintResult::Incomplete);
        assert_eq!(decode(&[0x80, 0x80]), VarintResult::Incomplete);
    }

    #[test]
    fn test_overflow() {
        assert_eq!(decode(&[0xFF; 11]), VarintResult::Overflow);
        let mut too_wide = [0xFF; 10];
        too_wide[9] = 0x02;
        assert_eq!(decode(&too_wide), VarintResult::Overflow);
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        assert_eq!(decode(&[0x05, 0xFF, 0xFF]), VarintResult::Value(5, 1));
    }
}
