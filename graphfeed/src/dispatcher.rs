// Copyright (c) Graphfeed Contributors
// SPDX-License-Identifier: Apache-2.0

//! Live-event dispatcher.
//!
//! Reacts to push notifications by re-deriving the authoritative batch
//! through a catch-up fetch, handing it to the downstream handler, and only
//! then advancing the watermark. Notifications for the same
//! `(address, entity_kind)` key are serialized on a per-key mutex so two
//! overlapping deliveries cannot both read a stale watermark; distinct keys
//! proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::debug;

use crate::error::IngestResult;
use crate::fetcher::CatchUpFetcher;
use crate::handler::TransactionHandler;
use crate::metrics::IngestMetrics;
use crate::store::ContractEntityStore;
use crate::types::extract_trigger;

/// One async mutex per cursor key. Entries are created on first use and
/// kept for the dispatcher's lifetime; the key space is bounded by the
/// watched contracts and declared entity kinds.
#[derive(Default)]
struct KeyLocks {
    inner: Mutex<HashMap<(String, String), Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
    fn for_key(&self, contract_address: &str, entity_kind: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.inner.lock().expect("key lock map poisoned");
        locks
            .entry((contract_address.to_string(), entity_kind.to_string()))
            .or_default()
            .clone()
    }
}

pub struct LiveDispatcher {
    fetcher: CatchUpFetcher,
    handler: Arc<dyn TransactionHandler>,
    store: Arc<dyn ContractEntityStore>,
    locks: KeyLocks,
    metrics: Arc<IngestMetrics>,
}

impl LiveDispatcher {
    pub fn new(
        fetcher: CatchUpFetcher,
        handler: Arc<dyn TransactionHandler>,
        store: Arc<dyn ContractEntityStore>,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        Self {
            fetcher,
            handler,
            store,
            locks: KeyLocks::default(),
            metrics,
        }
    }

    /// Processes one push notification. The payload is a trigger only: its
    /// key is extracted and its contents discarded. The handler runs to
    /// completion strictly before the watermark is persisted, so a failure
    /// anywhere leaves the cursor untouched and the next notification
    /// re-fetches the same batch.
    pub async fn on_push(&self, payload: &Value) -> IngestResult<()> {
        let trigger = extract_trigger(payload)?;
        self.metrics
            .notifications_received
            .with_label_values(&[&trigger.entity_kind])
            .inc();

        let lock = self
            .locks
            .for_key(&trigger.contract_address, &trigger.entity_kind);
        let _guard = lock.lock().await;

        let batch = self
            .fetcher
            .fetch(&trigger.entity_kind, &trigger.contract_address)
            .await?;
        if batch.is_empty() {
            // Spurious or duplicate notification; the key is already caught up.
            debug!(
                "No new records for ({}, {})",
                trigger.contract_address, trigger.entity_kind
            );
            return Ok(());
        }

        // Validate ordering fields before any side effect so a malformed
        // record fails the batch without a partial advance.
        let max_uts = batch.max_uts()?;
        self.metrics
            .records_fetched
            .with_label_values(&[&trigger.entity_kind])
            .inc_by(batch.len() as u64);

        self.handler.handle(&batch).await?;

        self.store
            .advance(&trigger.contract_address, &trigger.entity_kind, max_uts)
            .await?;

        self.metrics
            .batches_handled
            .with_label_values(&[&trigger.entity_kind])
            .inc();
        self.metrics
            .last_ingested_uts
            .with_label_values(&[&trigger.contract_address, &trigger.entity_kind])
            .set(max_uts.min(i64::MAX as u64) as i64);

        Ok(())
    }
}
