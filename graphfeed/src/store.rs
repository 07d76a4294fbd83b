// Copyright (c) Graphfeed Contributors
// SPDX-License-Identifier: Apache-2.0

//! Cursor persistence contract.
//!
//! One cursor per `(contract_address, entity_kind)` key holds the watermark:
//! the `uts` of the most recently ingested record. A missing cursor reads as
//! watermark 0. Cursors are created on first successful ingestion, advanced
//! after every handled batch, and never deleted by this subsystem.

use std::collections::HashMap;

use graphfeed_schema::models::{validate_cursor_key, validate_watermark, ContractEntity};
use tokio::sync::RwLock;

use crate::error::{IngestError, IngestResult};

#[async_trait::async_trait]
pub trait ContractEntityStore: Send + Sync {
    /// Point lookup, no side effects.
    async fn get(
        &self,
        contract_address: &str,
        entity_kind: &str,
    ) -> IngestResult<Option<ContractEntity>>;

    /// Upserts the cursor for the key. Safe to call concurrently for
    /// different keys; per-key callers are serialized by the dispatcher.
    async fn advance(
        &self,
        contract_address: &str,
        entity_kind: &str,
        uts: u64,
    ) -> IngestResult<()>;
}

/// Map-backed store for tests and embedded use.
#[derive(Debug, Default)]
pub struct InMemoryContractEntityStore {
    entries: RwLock<HashMap<(String, String), u64>>,
}

impl InMemoryContractEntityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ContractEntityStore for InMemoryContractEntityStore {
    async fn get(
        &self,
        contract_address: &str,
        entity_kind: &str,
    ) -> IngestResult<Option<ContractEntity>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&(contract_address.to_string(), entity_kind.to_string()))
            .map(|uts| ContractEntity {
                contract_address: contract_address.to_string(),
                entity_kind: entity_kind.to_string(),
                uts: *uts,
            }))
    }

    async fn advance(
        &self,
        contract_address: &str,
        entity_kind: &str,
        uts: u64,
    ) -> IngestResult<()> {
        validate_cursor_key(contract_address, entity_kind).map_err(|e| {
            IngestError::Storage(format!(
                "Failed to update a contract entity for address {} and kind {} to {}: {}",
                contract_address, entity_kind, uts, e
            ))
        })?;
        validate_watermark(uts).map_err(|e| {
            IngestError::Storage(format!(
                "Failed to update a contract entity for address {} and kind {} to {}: {}",
                contract_address, entity_kind, uts, e
            ))
        })?;

        let mut entries = self.entries.write().await;
        let entry = entries
            .entry((contract_address.to_string(), entity_kind.to_string()))
            .or_insert(0);
        // The watermark never moves backwards.
        *entry = (*entry).max(uts);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "0x0000000000000000000000000000000000000002";
    const KIND: &str = "stakeRequesteds";

    #[tokio::test]
    async fn test_get_absent_returns_none() {
        let store = InMemoryContractEntityStore::new();
        assert_eq!(store.get(ADDRESS, KIND).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_advance_creates_then_updates() {
        let store = InMemoryContractEntityStore::new();
        store.advance(ADDRESS, KIND, 1000).await.unwrap();
        assert_eq!(store.get(ADDRESS, KIND).await.unwrap().unwrap().uts, 1000);

        store.advance(ADDRESS, KIND, 1001).await.unwrap();
        assert_eq!(store.get(ADDRESS, KIND).await.unwrap().unwrap().uts, 1001);
    }

    #[tokio::test]
    async fn test_advance_never_decreases() {
        let store = InMemoryContractEntityStore::new();
        store.advance(ADDRESS, KIND, 1001).await.unwrap();
        store.advance(ADDRESS, KIND, 900).await.unwrap();
        assert_eq!(store.get(ADDRESS, KIND).await.unwrap().unwrap().uts, 1001);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = InMemoryContractEntityStore::new();
        store.advance(ADDRESS, KIND, 5).await.unwrap();
        store
            .advance(ADDRESS, "stakeIntentDeclareds", 7)
            .await
            .unwrap();

        assert_eq!(store.get(ADDRESS, KIND).await.unwrap().unwrap().uts, 5);
        assert_eq!(
            store
                .get(ADDRESS, "stakeIntentDeclareds")
                .await
                .unwrap()
                .unwrap()
                .uts,
            7
        );
    }

    #[tokio::test]
    async fn test_advance_rejects_invalid_address() {
        let store = InMemoryContractEntityStore::new();
        let err = store.advance("not-an-address", KIND, 5).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Failed to update a contract entity"));
        assert!(msg.contains("not-an-address"));
    }

    #[tokio::test]
    async fn test_advance_rejects_overflowing_watermark() {
        let store = InMemoryContractEntityStore::new();
        let err = store
            .advance(ADDRESS, KIND, i64::MAX as u64 + 1)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Storage(_)));
        assert_eq!(store.get(ADDRESS, KIND).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_advances_on_distinct_keys() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryContractEntityStore::new());
        let mut handles = Vec::new();
        for i in 0..8u64 {
            let store = store.clone();
            let address = format!("0x{:040x}", i);
            handles.push(tokio::spawn(async move {
                store.advance(&address, KIND, 100 + i).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        for i in 0..8u64 {
            let address = format!("0x{:040x}", i);
            assert_eq!(store.get(&address, KIND).await.unwrap().unwrap().uts, 100 + i);
        }
    }
}
