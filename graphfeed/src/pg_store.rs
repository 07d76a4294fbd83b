// Copyright (c) Graphfeed Contributors
// SPDX-License-Identifier: Apache-2.0

//! Postgres-backed cursor store over the `contract_entities` table.

use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use graphfeed_pg_db::Db;
use graphfeed_schema::models::{
    validate_cursor_key, validate_watermark, ContractEntity, ContractEntityRow,
};
use graphfeed_schema::schema::contract_entities;
use tracing::debug;

use crate::error::{IngestError, IngestResult};
use crate::store::ContractEntityStore;

#[derive(Clone)]
pub struct PgContractEntityStore {
    db: Db,
}

impl PgContractEntityStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl ContractEntityStore for PgContractEntityStore {
    async fn get(
        &self,
        contract_address: &str,
        entity_kind: &str,
    ) -> IngestResult<Option<ContractEntity>> {
        use contract_entities::dsl;

        let mut conn = self.db.connect().await.map_err(|e| {
            IngestError::Storage(format!(
                "Failed to fetch a contract entity for address {} and kind {}: {}",
                contract_address, entity_kind, e
            ))
        })?;

        let row: Option<ContractEntityRow> = dsl::contract_entities
            .filter(dsl::contract_address.eq(contract_address))
            .filter(dsl::entity_kind.eq(entity_kind))
            .select(ContractEntityRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(|e| {
                IngestError::Storage(format!(
                    "Failed to fetch a contract entity for address {} and kind {}: {}",
                    contract_address, entity_kind, e
                ))
            })?;

        Ok(row.map(ContractEntityRow::into_cursor))
    }

    async fn advance(
        &self,
        contract_address: &str,
        entity_kind: &str,
        uts: u64,
    ) -> IngestResult<()> {
        use diesel::dsl::now;
        use contract_entities::dsl;

        let storage_err = |detail: String| {
            IngestError::Storage(format!(
                "Failed to update a contract entity for address {} and kind {} to {}: {}",
                contract_address, entity_kind, uts, detail
            ))
        };

        validate_cursor_key(contract_address, entity_kind)
            .map_err(|e| storage_err(e.to_string()))?;
        let uts_column = validate_watermark(uts).map_err(|e| storage_err(e.to_string()))?;

        let mut conn = self
            .db
            .connect()
            .await
            .map_err(|e| storage_err(e.to_string()))?;

        // Upsert: insert or update on conflict
        diesel::insert_into(dsl::contract_entities)
            .values((
                dsl::contract_address.eq(contract_address),
                dsl::entity_kind.eq(entity_kind),
                dsl::uts.eq(uts_column),
                dsl::updated_at.eq(now),
            ))
            .on_conflict((dsl::contract_address, dsl::entity_kind))
            .do_update()
            .set((dsl::uts.eq(uts_column), dsl::updated_at.eq(now)))
            .execute(&mut conn)
            .await
            .map_err(|e| storage_err(e.to_string()))?;

        debug!(
            "Advanced watermark for ({}, {}) to {}",
            contract_address, entity_kind, uts
        );

        Ok(())
    }
}
