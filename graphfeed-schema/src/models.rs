// Copyright (c) Graphfeed Contributors
// SPDX-License-Identifier: Apache-2.0

//! Row models and validation rules for the `contract_entities` table.
//!
//! Validation is deliberately separate from storage so the rules can be
//! exercised without a live database. The store implementations call
//! [`validate_cursor_key`] / [`validate_watermark`] before touching the
//! persistence engine.

use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::schema::contract_entities;

/// Longest entity-kind discriminator the store accepts.
pub const MAX_ENTITY_KIND_LEN: usize = 100;

/// Per-key ingestion cursor. The watermark (`uts`) is the timestamp of the
/// most recently ingested record for `(contract_address, entity_kind)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractEntity {
    pub contract_address: String,
    pub entity_kind: String,
    pub uts: u64,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = contract_entities)]
pub struct ContractEntityRow {
    pub contract_address: String,
    pub entity_kind: String,
    pub uts: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ContractEntityRow {
    pub fn into_cursor(self) -> ContractEntity {
        ContractEntity {
            contract_address: self.contract_address,
            entity_kind: self.entity_kind,
            // The CHECK constraint keeps stored values non-negative.
            uts: self.uts.max(0) as u64,
        }
    }
}

/// Reason a cursor key or watermark failed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationError {
    InvalidAddress(String),
    InvalidEntityKind(String),
    WatermarkOutOfRange(u64),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidAddress(addr) => {
                write!(
                    f,
                    "invalid contract address '{}': expected 0x-prefixed 40 hex characters",
                    addr
                )
            }
            ValidationError::InvalidEntityKind(kind) => {
                write!(
                    f,
                    "invalid entity kind '{}': expected 1-{} alphanumeric characters",
                    kind, MAX_ENTITY_KIND_LEN
                )
            }
            ValidationError::WatermarkOutOfRange(uts) => {
                write!(f, "watermark {} does not fit a signed 64-bit column", uts)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Contract addresses are `0x` followed by exactly 40 hex characters.
pub fn validate_address(address: &str) -> Result<(), ValidationError> {
    let hex = address
        .strip_prefix("0x")
        .ok_or_else(|| ValidationError::InvalidAddress(address.to_string()))?;
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::InvalidAddress(address.to_string()));
    }
    Ok(())
}

/// Entity kinds are non-empty, bounded, alphanumeric discriminators.
pub fn validate_entity_kind(entity_kind: &str) -> Result<(), ValidationError> {
    if entity_kind.is_empty()
        || entity_kind.len() > MAX_ENTITY_KIND_LEN
        || !entity_kind.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(ValidationError::InvalidEntityKind(entity_kind.to_string()));
    }
    Ok(())
}

/// Watermarks are stored in an `Int8` column; values above `i64::MAX` would
/// silently wrap through an `as` cast, so they are rejected here instead.
pub fn validate_watermark(uts: u64) -> Result<i64, ValidationError> {
    i64::try_from(uts).map_err(|_| ValidationError::WatermarkOutOfRange(uts))
}

/// Validates both halves of a cursor key.
pub fn validate_cursor_key(address: &str, entity_kind: &str) -> Result<(), ValidationError> {
    validate_address(address)?;
    validate_entity_kind(entity_kind)?;
    Ok(())
}
