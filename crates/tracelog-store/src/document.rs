use serde::{Deserialize, Serialize};
use serde_json::Value;

use tracelog_types::{Position, TraceRecord, TraceTime};

use crate::error::{StoreError, StoreResult};

/// Unit of storage in a trace store.
///
/// `time` and `serial` are lifted out of the body so stores can filter and
/// order without interpreting it; the body is opaque to the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub time: TraceTime,
    pub serial: u64,
    pub body: Value,
}

impl Document {
    pub fn new(time: TraceTime, serial: u64, body: Value) -> Self {
        Self { time, serial, body }
    }

    pub fn position(&self) -> Position {
        Position::new(self.time, self.serial)
    }
}

/// Maps trace records to and from store documents.
pub trait DocumentMapper: Send + Sync {
    fn serialize(&self, record: &TraceRecord) -> StoreResult<Document>;

    fn deserialize(&self, document: &Document) -> StoreResult<TraceRecord>;
}

/// [`DocumentMapper`] storing the record as a JSON object body.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonMapper;

impl DocumentMapper for JsonMapper {
    fn serialize(&self, record: &TraceRecord) -> StoreResult<Document> {
        let body =
            serde_json::to_value(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Document::new(record.time, record.serial, body))
    }

    fn deserialize(&self, document: &Document) -> StoreResult<TraceRecord> {
        let record: TraceRecord = serde_json::from_value(document.body.clone())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        // The indexed fields are authoritative.
        Ok(TraceRecord {
            time: document.time,
            serial: document.serial,
            ..record
        })
    }
}
