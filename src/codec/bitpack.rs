//! Fixed-width bit packing
//!
//! Values are written MSB-first into a 64-bit accumulator. Whenever at least
//! one full byte is buffered the top byte is emitted; the final partial byte
//! is padded with zero bits. The accumulator never holds more than
//! 7 + 32 bits, so a `u64` is always wide enough.

use crate::error::CodecError;

/// Smallest supported width in bits
pub const MIN_BITS_PER_VALUE: u8 = 1;

/// Largest supported width in bits
pub const MAX_BITS_PER_VALUE: u8 = 32;

/// Reject widths outside `1..=32`.
pub fn check_width(bits_per_value: u8) -> Result<(), CodecError> {
    if (MIN_BITS_PER_VALUE..=MAX_BITS_PER_VALUE).contains(&bits_per_value) {
        Ok(())
    } else {
        Err(CodecError::InvalidWidth(bits_per_value))
    }
}

/// Minimum width able to hold `max_value` (never less than one bit)
pub fn bits_required(max_value: u32) -> u8 {
    let bits = (u32::BITS - max_value.leading_zeros()) as u8;
    bits.max(MIN_BITS_PER_VALUE)
}

/// Number of bytes `count` values occupy at `bits_per_value`, padding included.
///
/// `None` when the bit count does not fit in `usize`.
pub fn packed_len(count: usize, bits_per_value: u8) -> Option<usize> {
    count
        .checked_mul(usize::from(bits_per_value))
        .map(|bits| bits.div_ceil(8))
}

/// Pack `values` at a fixed width.
pub fn encode(values: &[u32], bits_per_value: u8) -> Result<Vec<u8>, CodecError> {
    check_width(bits_per_value)?;

    let width = u32::from(bits_per_value);
    let mut out = Vec::with_capacity(packed_len(values.len(), bits_per_value).unwrap_or(0));
    let mut acc: u64 = 0;
    let mut buffered: u32 = 0;

    for &value in values {
        if width < 32 && value >> width != 0 {
            return Err(CodecError::ValueOverflow {
                value,
                bits: bits_per_value,
            });
        }

        acc = (acc << width) | u64::from(value);
        buffered += width;

        while buffered >= 8 {
            buffered -= 8;
            out.push((acc >> buffered) as u8);
        }
        acc &= (1u64 << buffered) - 1;
    }

    if buffered > 0 {
        out.push((acc << (8 - buffered)) as u8);
    }

    Ok(out)
}

/// Unpack exactly `count` values of `bits_per_value` bits from `bytes`.
///
/// Trailing padding bits and any bytes beyond the last value are ignored.
pub fn decode(bytes: &[u8], bits_per_value: u8, count: usize) -> Result<Vec<u32>, CodecError> {
    check_width(bits_per_value)?;

    let needed = match packed_len(count, bits_per_value) {
        Some(needed) if needed <= bytes.len() => needed,
        needed => {
            return Err(CodecError::Truncated {
                needed: needed.unwrap_or(usize::MAX),
                available: bytes.len(),
            });
        }
    };

    let width = u32::from(bits_per_value);
    let mask: u64 = (1u64 << width) - 1;
    let mut values = Vec::with_capacity(count);
    let mut acc: u64 = 0;
    let mut buffered: u32 = 0;

    for &byte in &bytes[..needed] {
        if values.len() == count {
            break;
        }
        acc = (acc << 8) | u64::from(byte);
        buffered += 8;

        while buffered >= width && values.len() < count {
            buffered -= width;
            values.push(((acc >> buffered) & mask) as u32);
        }
        acc &= (1u64 << buffered) - 1;
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_every_width() {
        for bits in 1..=32u8 {
            let max = if bits == 32 { u32::MAX } else { (1u32 << bits) - 1 };
            let values: Vec<u32> = (0..37u32)
                .map(|i| if i % 5 == 0 { max } else { i.wrapping_mul(2_654_435_761) & max })
                .collect();

            let packed = encode(&values, bits).unwrap();
            assert_eq!(Some(packed.len()), packed_len(values.len(), bits));

            let decoded = decode(&packed, bits, values.len()).unwrap();
            assert_eq!(decoded, values, "width {}", bits);
        }
    }

    #[test]
    fn test_overflow_below_32_bits() {
        for bits in 1..32u8 {
            let err = encode(&[1u32 << bits], bits).unwrap_err();
            assert_eq!(
                err,
                CodecError::ValueOverflow {
                    value: 1u32 << bits,
                    bits
                }
            );
        }
    }

    #[test]
    fn test_width_32_accepts_full_range() {
        let packed = encode(&[u32::MAX, 0, 1], 32).unwrap();
        assert_eq!(packed.len(), 12);
        assert_eq!(&packed[..4], &[0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_invalid_width() {
        assert_eq!(encode(&[1], 0).unwrap_err(), CodecError::InvalidWidth(0));
        assert_eq!(encode(&[1], 33).unwrap_err(), CodecError::InvalidWidth(33));
        assert_eq!(decode(&[0], 0, 1).unwrap_err(), CodecError::InvalidWidth(0));
    }

    #[test]
    fn test_msb_first_layout_and_padding() {
        // 3-bit values 5 (101), 3 (011), 7 (111) => 1010 1111 1000 0000
        let packed = encode(&[5, 3, 7], 3).unwrap();
        assert_eq!(packed, vec![0b1010_1111, 0b1000_0000]);
    }

    #[test]
    fn test_decode_ignores_padding() {
        let packed = encode(&[1, 0, 1], 1).unwrap();
        assert_eq!(packed, vec![0b1010_0000]);
        assert_eq!(decode(&packed, 1, 3).unwrap(), vec![1, 0, 1]);
    }

    #[test]
    fn test_decode_truncated() {
        let packed = encode(&[1, 2, 3, 4], 12).unwrap();
        let err = decode(&packed[..packed.len() - 1], 12, 4).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { .. }));
    }

    #[test]
    fn test_decode_huge_count_is_truncated() {
        let err = decode(&[0u8; 4], 32, usize::MAX / 8).unwrap_err();
        assert_eq!(
            err,
            CodecError::Truncated {
                needed: usize::MAX,
                available: 4
            }
        );

        // product fits but the input is far too short
        let err = decode(&[0u8; 4], 1, usize::MAX / 2).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { available: 4, .. }));
    }

    #[test]
    fn test_packed_len_overflow() {
        assert_eq!(packed_len(3, 12), Some(5));
        assert_eq!(packed_len(usize::MAX, 2), None);
    }

    #[test]
    fn test_empty_input() {
        assert!(encode(&[], 7).unwrap().is_empty());
        assert!(decode(&[], 7, 0).unwrap().is_empty());
    }

    #[test]
    fn test_bits_required() {
        assert_eq!(bits_required(0), 1);
        assert_eq!(bits_required(1), 1);
        assert_eq!(bits_required(2), 2);
        assert_eq!(bits_required(255), 8);
        assert_eq!(bits_required(256), 9);
        assert_eq!(bits_required(u32::MAX), 32);
    }
}
