use crate::buffer::Batch;
use crate::domain::{FieldValue, SampledEvent};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::io::Write;
use thiserror::Error;

/// Columns added to every row.
pub const TIME_COLUMN: &str = "_time";
pub const DATE_COLUMN: &str = "_date";
pub const SAMPLE_RATE_COLUMN: &str = "_sample_rate";

const RESERVED: [&str; 3] = [TIME_COLUMN, DATE_COLUMN, SAMPLE_RATE_COLUMN];

// rough per-row size used to presize the body
const ESTIMATED_ROW_SIZE: usize = 256;

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("IO error during serialization: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Batch is empty")]
    EmptyBatch,
}

/// One `JSONEachRow` row: the event's fields plus the reserved columns.
struct Row<'a>(&'a SampledEvent);

impl Serialize for Row<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let SampledEvent { event, rate } = self.0;
        let mut map = serializer.serialize_map(Some(event.len() + RESERVED.len()))?;
        for (name, value) in event.fields() {
            if !RESERVED.contains(&name.as_str()) {
                map.serialize_entry(name, value)?;
            }
        }
        let ts = event.timestamp();
        map.serialize_entry(TIME_COLUMN, &FieldValue::Timestamp(ts))?;
        map.serialize_entry(DATE_COLUMN, &ts.format("%Y-%m-%d").to_string())?;
        map.serialize_entry(SAMPLE_RATE_COLUMN, rate)?;
        map.end()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchSerializer;

impl BatchSerializer {
    pub fn new() -> Self {
        Self
    }

    /// Newline-delimited rows for `INSERT ... FORMAT JSONEachRow`.
    pub fn serialize_ndjson(&self, batch: &Batch) -> Result<Vec<u8>, SerializationError> {
        if batch.is_empty() {
            return Err(SerializationError::EmptyBatch);
        }

        let mut buffer = Vec::with_capacity(batch.size() * ESTIMATED_ROW_SIZE);
        for event in batch.events() {
            serde_json::to_writer(&mut buffer, &Row(event))?;
            buffer.write_all(b"\n")?;
        }
        Ok(buffer)
    }

    pub fn serialize_compressed(&self, batch: &Batch) -> Result<Vec<u8>, SerializationError> {
        let raw = self.serialize_ndjson(batch)?;
        let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 4), Compression::fast());
        encoder.write_all(&raw)?;
        Ok(encoder.finish()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BatchType;
    use crate::domain::Event;
    use chrono::{TimeZone, Utc};
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn batch() -> Batch {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 17, 4, 5).unwrap();
        let mut first = Event::with_timestamp(ts);
        first.insert("status", 200_i64);
        first.insert("_time", "spoofed");
        let mut second = Event::with_timestamp(ts);
        second.insert("path", "/a");
        Batch::new(
            vec![SampledEvent::new(first, 4), SampledEvent::new(second, 1)],
            BatchType::Final,
        )
    }

    #[test]
    fn test_rows_carry_reserved_columns() {
        let body = BatchSerializer::new().serialize_ndjson(&batch()).unwrap();
        let text = String::from_utf8(body).unwrap();
        let rows: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["status"], 200);
        assert_eq!(rows[0]["_time"], "2024-03-09 17:04:05");
        assert_eq!(rows[0]["_date"], "2024-03-09");
        assert_eq!(rows[0]["_sample_rate"], 4);
        assert_eq!(rows[1]["path"], "/a");
        assert_eq!(rows[1]["_sample_rate"], 1);
        // an event field cannot shadow a reserved column
        assert_eq!(text.lines().next().unwrap().matches("_time").count(), 1);
    }

    #[test]
    fn test_compressed_round_trip() {
        let serializer = BatchSerializer::new();
        let plain = serializer.serialize_ndjson(&batch()).unwrap();
        let gz = serializer.serialize_compressed(&batch()).unwrap();

        let mut decoded = Vec::new();
        GzDecoder::new(&gz[..]).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, plain);
    }

    #[test]
    fn test_empty_batch_rejected() {
        let empty = Batch::new(Vec::new(), BatchType::Final);
        assert!(matches!(
            BatchSerializer::new().serialize_ndjson(&empty),
            Err(SerializationError::EmptyBatch)
        ));
    }
}
