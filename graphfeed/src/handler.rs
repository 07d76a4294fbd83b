// Copyright (c) Graphfeed Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::error::IngestResult;
use crate::types::EntityBatch;
use tracing::info;

/// Downstream transaction-processing pipeline. Invoked once per non-empty
/// catch-up batch, before the watermark for the batch is persisted, so a
/// failure here leads to the same batch being re-delivered on the next push
/// (at-least-once). Implementations must be idempotent or effect-deduplicating.
#[async_trait::async_trait]
pub trait TransactionHandler: Send + Sync {
    async fn handle(&self, batch: &EntityBatch) -> IngestResult<()>;
}

/// Handler that only logs what it receives. Stands in for a real pipeline in
/// the binary until one is wired up.
#[derive(Debug, Default)]
pub struct LoggingTransactionHandler;

#[async_trait::async_trait]
impl TransactionHandler for LoggingTransactionHandler {
    async fn handle(&self, batch: &EntityBatch) -> IngestResult<()> {
        info!(
            "Received {} {} record(s)",
            batch.len(),
            batch.entity_kind()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_logging_handler_accepts_batch() {
        let handler = LoggingTransactionHandler;
        let batch = EntityBatch::new(
            "stakeRequesteds",
            vec![json!({"id": "a", "uts": 1000})],
        );
        handler.handle(&batch).await.unwrap();
    }
}
