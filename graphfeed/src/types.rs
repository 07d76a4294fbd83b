// Copyright (c) Graphfeed Contributors
// SPDX-License-Identifier: Apache-2.0

//! Payload shapes shared across the pipeline.
//!
//! Records are opaque JSON objects; the pipeline only ever reads three
//! fields: `contractAddress` (the origin key), `uts` (the ordering field
//! that becomes the watermark), and the entity kind a record was returned
//! under. Everything else passes through untouched to the downstream
//! handler.

use serde_json::Value;

use crate::error::{IngestError, IngestResult};

/// A single indexed record, opaque beyond the required fields.
pub type Record = Value;

/// Key extracted from a push notification. The notification payload is a
/// trigger only; after extraction its contents are discarded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushTrigger {
    pub entity_kind: String,
    pub contract_address: String,
}

/// Extracts the `(entity_kind, contract_address)` key from a push payload
/// shaped as `{ [entityKind]: [record, ...] }`.
pub fn extract_trigger(payload: &Value) -> IngestResult<PushTrigger> {
    let object = payload
        .as_object()
        .ok_or_else(|| IngestError::MalformedRecord("push payload is not an object".to_string()))?;
    let (entity_kind, records) = object
        .iter()
        .next()
        .ok_or_else(|| IngestError::MalformedRecord("push payload has no entity key".to_string()))?;
    let first = records
        .as_array()
        .and_then(|records| records.first())
        .ok_or_else(|| {
            IngestError::MalformedRecord(format!("push payload for '{}' has no records", entity_kind))
        })?;
    let contract_address = record_address(first)?;

    Ok(PushTrigger {
        entity_kind: entity_kind.clone(),
        contract_address: contract_address.to_string(),
    })
}

/// Reads the origin address of a record.
pub fn record_address(record: &Record) -> IngestResult<&str> {
    record
        .get("contractAddress")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            IngestError::MalformedRecord("record is missing field 'contractAddress'".to_string())
        })
}

/// Reads the ordering field of a record. Graph nodes serialize big integers
/// either as JSON numbers or as decimal strings; both are accepted, floats
/// are not (they would lose precision at chain scale).
pub fn record_uts(record: &Record) -> IngestResult<u64> {
    let uts = record
        .get("uts")
        .ok_or_else(|| IngestError::MalformedRecord("record is missing field 'uts'".to_string()))?;
    match uts {
        Value::Number(n) => n.as_u64().ok_or_else(|| {
            IngestError::MalformedRecord(format!("record field 'uts' is not a u64: {}", n))
        }),
        Value::String(s) => s.parse::<u64>().map_err(|_| {
            IngestError::MalformedRecord(format!("record field 'uts' is not a u64: '{}'", s))
        }),
        other => Err(IngestError::MalformedRecord(format!(
            "record field 'uts' has unsupported type: {}",
            other
        ))),
    }
}

/// An ordered batch of records for one `(address, entity_kind)` key, as
/// reconstructed by a catch-up fetch. Order is the indexed-data service's
/// native order for the query; the pipeline never re-sorts.
#[derive(Clone, Debug)]
pub struct EntityBatch {
    entity_kind: String,
    records: Vec<Record>,
}

impl EntityBatch {
    pub fn new(entity_kind: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            entity_kind: entity_kind.into(),
            records,
        }
    }

    pub fn entity_kind(&self) -> &str {
        &self.entity_kind
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The maximum `uts` across the batch. Any record with a missing or
    /// unparseable `uts` fails the whole batch.
    pub fn max_uts(&self) -> IngestResult<u64> {
        let mut max = None;
        for record in &self.records {
            let uts = record_uts(record)?;
            max = Some(max.map_or(uts, |m: u64| m.max(uts)));
        }
        max.ok_or_else(|| IngestError::MalformedRecord("batch is empty".to_string()))
    }
}
