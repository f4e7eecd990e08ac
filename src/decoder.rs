//! Record decoding
//!
//! The inverse of the encoder, used to verify the wire format and to inspect
//! recorded session files. Reading times are reconstructed the way the
//! companion receiver does it: the most recent anchor plus the reading's
//! offset since that anchor divided by the effective sampling rate.

use crate::error::DatalogError;
use crate::types::{Record, SamplingRate, RECORD_SIZE, TAG_BIT};
use serde::{Deserialize, Serialize};

/// Read a big-endian unsigned integer of up to 8 bytes
pub fn decode_big_endian(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
}

/// Contents of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedRecord {
    Reading { x: i16, y: i16, z: i16 },
    Anchor(u64),
}

/// Decode a single record.
///
/// `x` shares its top byte with the tag bit, so it is sign-extended from 15
/// bits; values outside ±16383 mG do not survive the round trip.
pub fn decode_record(record: &Record) -> DecodedRecord {
    let bytes = record.as_bytes();
    if record.is_anchor() {
        let mut value = *bytes;
        value[0] &= !TAG_BIT;
        DecodedRecord::Anchor(decode_big_endian(&value))
    } else {
        let raw_x = decode_big_endian(&bytes[0..2]) as u16;
        DecodedRecord::Reading {
            x: ((raw_x << 1) as i16) >> 1,
            y: decode_big_endian(&bytes[2..4]) as u16 as i16,
            z: decode_big_endian(&bytes[4..6]) as u16 as i16,
        }
    }
}

/// Split a logged byte stream into records
pub fn records_from_bytes(bytes: &[u8]) -> Result<Vec<Record>, DatalogError> {
    if bytes.len() % RECORD_SIZE != 0 {
        return Err(DatalogError::TruncatedStream(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(RECORD_SIZE)
        .map(|chunk| {
            let mut record = [0u8; RECORD_SIZE];
            record.copy_from_slice(chunk);
            Record::from_bytes(record)
        })
        .collect())
}

/// A reading with its reconstructed capture time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedReading {
    pub timestamp_ms: u64,
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl TimedReading {
    pub const CSV_HEADER: &'static str = "Time(ms),X(mG),Y(mG),Z(mG)";

    pub fn to_csv(&self) -> String {
        format!(
            "{:14},{:+5},{:+5},{:+5}",
            self.timestamp_ms, self.x, self.y, self.z
        )
    }
}

/// Incremental decoder for one session's record stream
#[derive(Debug, Clone)]
pub struct StreamDecoder {
    rate: SamplingRate,
    anchor: Option<u64>,
    offset: u64,
    position: usize,
    anchors: usize,
    readings: usize,
}

impl StreamDecoder {
    /// `rate` must be the rate the device actually sampled at
    pub fn new(rate: SamplingRate) -> Self {
        Self {
            rate,
            anchor: None,
            offset: 0,
            position: 0,
            anchors: 0,
            readings: 0,
        }
    }

    /// Feed the next record. Anchors yield `None`.
    pub fn push(&mut self, record: &Record) -> Result<Option<TimedReading>, DatalogError> {
        let position = self.position;
        self.position += 1;
        match decode_record(record) {
            DecodedRecord::Anchor(time) => {
                self.anchor = Some(time);
                self.offset = 0;
                self.anchors += 1;
                Ok(None)
            }
            DecodedRecord::Reading { x, y, z } => {
                let anchor = self.anchor.ok_or(DatalogError::StreamOutOfSync(position))?;
                let timestamp_ms = anchor + self.offset * 1000 / u64::from(self.rate.hz());
                self.offset += 1;
                self.readings += 1;
                Ok(Some(TimedReading {
                    timestamp_ms,
                    x,
                    y,
                    z,
                }))
            }
        }
    }

    /// Decode a whole stream
    pub fn decode_all(
        records: &[Record],
        rate: SamplingRate,
    ) -> Result<Vec<TimedReading>, DatalogError> {
        let mut decoder = Self::new(rate);
        let mut readings = Vec::with_capacity(records.len());
        for record in records {
            if let Some(reading) = decoder.push(record)? {
                readings.push(reading);
            }
        }
        Ok(readings)
    }

    pub fn anchors(&self) -> usize {
        self.anchors
    }

    pub fn readings(&self) -> usize {
        self.readings
    }

    /// Most recent anchor value seen
    pub fn last_anchor(&self) -> Option<u64> {
        self.anchor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{encode_anchor, encode_batch, encode_reading};
    use crate::types::Sample;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_decode_big_endian() {
        assert_eq!(decode_big_endian(&[0x01, 0x23, 0x45, 0x67, 0x89, 0xAB]), 0x0123_4567_89AB);
        assert_eq!(decode_big_endian(&[0xFF]), 0xFF);
        assert_eq!(decode_big_endian(&[]), 0);
    }

    #[test]
    fn test_decode_negative_reading() {
        let record = encode_reading(&Sample::new(-1, -2, -4000, 0));
        assert_eq!(
            decode_record(&record),
            DecodedRecord::Reading { x: -1, y: -2, z: -4000 }
        );
    }

    #[test]
    fn test_decode_anchor_clears_tag() {
        assert_eq!(
            decode_record(&encode_anchor(1_700_000_000_123)),
            DecodedRecord::Anchor(1_700_000_000_123)
        );
    }

    #[test]
    fn test_records_from_bytes() {
        let bytes = [0x80, 0, 0, 0, 0, 1, 0, 1, 0, 2, 0, 3];
        let records = records_from_bytes(&bytes).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(decode_record(&records[0]), DecodedRecord::Anchor(1));
        assert_eq!(
            decode_record(&records[1]),
            DecodedRecord::Reading { x: 1, y: 2, z: 3 }
        );
        assert!(matches!(
            records_from_bytes(&bytes[..7]),
            Err(DatalogError::TruncatedStream(7))
        ));
    }

    #[test]
    fn test_stream_interpolates_from_anchor() {
        let samples: Vec<Sample> = (0..5)
            .map(|i| Sample::new(i, 0, 0, 10_000 + i64::from(i) * 40))
            .collect();
        let mut records = encode_batch(&samples[..3], true);
        records.extend(encode_batch(&samples[3..], true));

        let readings = StreamDecoder::decode_all(&records, SamplingRate::Hz25).unwrap();
        let times: Vec<u64> = readings.iter().map(|r| r.timestamp_ms).collect();
        assert_eq!(times, vec![10_000, 10_040, 10_080, 10_120, 10_160]);
    }

    #[test]
    fn test_reading_before_anchor_is_out_of_sync() {
        let records = [encode_reading(&Sample::new(1, 1, 1, 0)), encode_anchor(5)];
        assert!(matches!(
            StreamDecoder::decode_all(&records, SamplingRate::Hz10),
            Err(DatalogError::StreamOutOfSync(0))
        ));
    }

    #[test]
    fn test_decoder_counts() {
        let mut decoder = StreamDecoder::new(SamplingRate::Hz10);
        decoder.push(&encode_anchor(100)).unwrap();
        let reading = decoder
            .push(&encode_reading(&Sample::new(7, 8, 9, 0)))
            .unwrap()
            .unwrap();
        decoder.push(&encode_anchor(900)).unwrap();

        assert_eq!(reading, TimedReading { timestamp_ms: 100, x: 7, y: 8, z: 9 });
        assert_eq!(decoder.anchors(), 2);
        assert_eq!(decoder.readings(), 1);
        assert_eq!(decoder.last_anchor(), Some(900));
    }

    #[test]
    fn test_csv_format() {
        let reading = TimedReading { timestamp_ms: 1_450_000_000_000, x: 12, y: -980, z: 0 };
        assert_eq!(reading.to_csv(), " 1450000000000,  +12, -980,   +0");
    }

    proptest! {
        #[test]
        fn prop_reading_round_trip_within_sensor_range(
            x in -16384i16..=16383,
            y in any::<i16>(),
            z in any::<i16>(),
        ) {
            let decoded = decode_record(&encode_reading(&Sample::new(x, y, z, 0)));
            prop_assert_eq!(decoded, DecodedRecord::Reading { x, y, z });
        }

        #[test]
        fn prop_anchor_round_trip(value in 0u64..(1u64 << 44)) {
            prop_assert_eq!(decode_record(&encode_anchor(value)), DecodedRecord::Anchor(value));
        }
    }
}
