// Copyright (c) Graphfeed Contributors
// SPDX-License-Identifier: Apache-2.0

//! Durable ingestion of graph-indexed contract events.
//!
//! A best-effort push channel triggers watermark-based catch-up pulls, so
//! the downstream transaction pipeline sees every record for a
//! `(contract address, entity kind)` key in order even when the push
//! channel drops notifications.
//!
//! ```text
//! graph node ──push──▶ Subscriber ──▶ LiveDispatcher
//!                                        │  per-key lock
//!                                        ▼
//!                                  CatchUpFetcher ──pull──▶ graph node
//!                                        │
//!                                        ▼
//!                              TransactionHandler
//!                                        │
//!                                        ▼
//!                              ContractEntityStore (watermark advance)
//! ```

pub mod dispatcher;
pub mod error;
pub mod fetcher;
pub mod graph_client;
pub mod graph_node_client;
pub mod handler;
pub mod metrics;
pub mod pg_store;
pub mod queries;
pub mod store;
pub mod subscriber;
pub mod types;

#[cfg(test)]
pub mod test_utils;
