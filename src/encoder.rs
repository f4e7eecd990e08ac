//! Record encoding
//!
//! This module packs accelerometer readings and timestamp anchors into the
//! 6-byte big-endian records consumed by the companion receiver. The top bit of
//! byte 0 is the only discriminator the receiver looks at:
//!
//! ```text
//! reading: |0xxxxxxx xxxxxxxx|yyyyyyyy yyyyyyyy|zzzzzzzz zzzzzzzz|
//! anchor:  |1vvvvvvv vvvvvvvv vvvvvvvv vvvvvvvv vvvvvvvv vvvvvvvv|
//! ```

use crate::types::{Record, Sample, RECORD_SIZE, TAG_BIT};

/// Widest integer `encode_integer` writes
pub const MAX_INTEGER_LEN: usize = 6;

/// Write `len` bytes of `value`, most significant byte first, into
/// `dest[offset..offset + len]`. Bits of `value` above `8 * len` are dropped.
///
/// # Panics
/// Panics if `len` is not in `1..=6` or the target range is outside `dest`.
pub fn encode_integer(dest: &mut [u8], offset: usize, value: u64, len: usize) {
    assert!(
        (1..=MAX_INTEGER_LEN).contains(&len),
        "integer length {len} out of range"
    );
    for (i, byte) in dest[offset..offset + len].iter_mut().enumerate() {
        let shift = 8 * (len - 1 - i);
        *byte = (value >> shift) as u8;
    }
}

/// Encode one sample as a reading record (tag bit cleared).
///
/// The capture time is not written; the receiver interpolates it from the
/// preceding anchor.
pub fn encode_reading(sample: &Sample) -> Record {
    let mut bytes = [0u8; RECORD_SIZE];
    encode_integer(&mut bytes, 0, u64::from(sample.x as u16), 2);
    encode_integer(&mut bytes, 2, u64::from(sample.y as u16), 2);
    encode_integer(&mut bytes, 4, u64::from(sample.z as u16), 2);
    bytes[0] &= !TAG_BIT;
    Record::from_bytes(bytes)
}

/// Bits of an anchor value that survive encoding
pub const ANCHOR_VALUE_BITS: u32 = 44;

/// Encode an anchor record carrying the low 44 bits of `value` (tag bit set).
///
/// Millisecond timestamps need 44 bits until roughly the year 2527, which
/// leaves the tag bit free.
pub fn encode_anchor(value: u64) -> Record {
    let mut bytes = [0u8; RECORD_SIZE];
    let value = value & ((1u64 << ANCHOR_VALUE_BITS) - 1);
    encode_integer(&mut bytes, 0, value, RECORD_SIZE);
    bytes[0] |= TAG_BIT;
    Record::from_bytes(bytes)
}

/// Anchor for a wall-clock or capture time in ms. Negative times clamp to 0.
pub fn encode_timestamp_anchor(time_ms: i64) -> Record {
    encode_anchor(u64::try_from(time_ms).unwrap_or(0))
}

/// Encode a batch of samples as reading records, preserving arrival order,
/// optionally preceded by an anchor for the first sample's capture time.
pub fn encode_batch(samples: &[Sample], with_anchor: bool) -> Vec<Record> {
    let mut records = Vec::with_capacity(samples.len() + 1);
    if with_anchor {
        if let Some(first) = samples.first() {
            records.push(encode_timestamp_anchor(first.capture_time));
        }
    }
    records.extend(samples.iter().map(encode_reading));
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode_big_endian;
    use crate::types::RecordKind;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_encode_integer_six_bytes() {
        let mut buf = [0u8; 6];
        encode_integer(&mut buf, 0, 0x0123_4567_89AB, 6);
        assert_eq!(buf, [0x01, 0x23, 0x45, 0x67, 0x89, 0xAB]);
    }

    #[test]
    fn test_encode_integer_at_offset() {
        let mut buf = [0xEEu8; 6];
        encode_integer(&mut buf, 2, 0xBEEF, 2);
        assert_eq!(buf, [0xEE, 0xEE, 0xBE, 0xEF, 0xEE, 0xEE]);
    }

    #[test]
    #[should_panic]
    fn test_encode_integer_rejects_seven_bytes() {
        let mut buf = [0u8; 8];
        encode_integer(&mut buf, 0, 1, 7);
    }

    #[test]
    fn test_encode_reading_layout() {
        let record = encode_reading(&Sample::new(0x0102, -2, 0x0506, 0));
        assert_eq!(record.as_bytes(), &[0x01, 0x02, 0xFF, 0xFE, 0x05, 0x06]);
        assert_eq!(record.kind(), RecordKind::Reading);
    }

    #[test]
    fn test_tag_bit_overrides_negative_x() {
        let record = encode_reading(&Sample::new(-1, 0, 32767, 0));
        assert_eq!(record.as_bytes(), &[0x7F, 0xFF, 0x00, 0x00, 0x7F, 0xFF]);
        assert_eq!(record.as_bytes()[0] & TAG_BIT, 0);
    }

    #[test]
    fn test_encode_anchor_sets_tag() {
        let record = encode_anchor(1_450_000_000_000);
        assert_eq!(record.kind(), RecordKind::Anchor);
        let mut expected = [0u8; 6];
        encode_integer(&mut expected, 0, 1_450_000_000_000, 6);
        expected[0] |= 0x80;
        assert_eq!(record.as_bytes(), &expected);
    }

    #[test]
    fn test_encode_anchor_keeps_low_44_bits() {
        let record = encode_anchor((0b111 << 44) | 0x0123_4567_89AB);
        assert_eq!(record.as_bytes(), &[0x81, 0x23, 0x45, 0x67, 0x89, 0xAB]);
        assert_eq!(encode_anchor(u64::MAX).as_bytes(), &[0x8F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_negative_timestamp_clamps() {
        assert_eq!(encode_timestamp_anchor(-5), encode_anchor(0));
    }

    #[test]
    fn test_encode_batch_with_anchor() {
        let samples = [Sample::new(1, 2, 3, 1000), Sample::new(4, 5, 6, 1100)];
        let records = encode_batch(&samples, true);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], encode_anchor(1000));
        assert_eq!(records[1], encode_reading(&samples[0]));
        assert_eq!(records[2], encode_reading(&samples[1]));

        let plain = encode_batch(&samples, false);
        assert_eq!(plain.len(), 2);
        assert!(encode_batch(&[], true).is_empty());
    }

    proptest! {
        #[test]
        fn prop_encode_integer_round_trips(len in 1usize..=6, raw in any::<u64>()) {
            let value = raw & ((1u64 << (8 * len)) - 1);
            let mut buf = [0u8; 6];
            encode_integer(&mut buf, 0, value, len);
            prop_assert_eq!(decode_big_endian(&buf[..len]), value);
        }

        #[test]
        fn prop_readings_never_tagged(x in any::<i16>(), y in any::<i16>(), z in any::<i16>(), t in any::<i64>()) {
            let record = encode_reading(&Sample::new(x, y, z, t));
            prop_assert_eq!(record.as_bytes()[0] & TAG_BIT, 0);
        }

        #[test]
        fn prop_anchors_always_tagged(value in any::<u64>()) {
            prop_assert_eq!(encode_anchor(value).as_bytes()[0] & TAG_BIT, TAG_BIT);
        }
    }
}
