// Copyright (c) Graphfeed Contributors
// SPDX-License-Identifier: Apache-2.0

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use prometheus::{
    register_int_counter_vec_with_registry, register_int_gauge_vec_with_registry, IntCounterVec,
    IntGaugeVec, Registry, TextEncoder,
};
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Clone, Debug)]
pub struct IngestMetrics {
    /// Push notifications seen, per entity kind (including spurious ones).
    pub(crate) notifications_received: IntCounterVec,
    /// Non-empty batches handed to the downstream handler, per entity kind.
    pub(crate) batches_handled: IntCounterVec,
    /// Records pulled by catch-up fetches, per entity kind.
    pub(crate) records_fetched: IntCounterVec,
    /// Dispatch failures, labeled by error type.
    pub(crate) dispatch_errors: IntCounterVec,
    /// Last persisted watermark per (contract address, entity kind).
    pub(crate) last_ingested_uts: IntGaugeVec,
}

impl IngestMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            notifications_received: register_int_counter_vec_with_registry!(
                "graphfeed_notifications_received",
                "Total number of push notifications received",
                &["entity_kind"],
                registry,
            )
            .unwrap(),
            batches_handled: register_int_counter_vec_with_registry!(
                "graphfeed_batches_handled",
                "Total number of batches handed to the downstream handler",
                &["entity_kind"],
                registry,
            )
            .unwrap(),
            records_fetched: register_int_counter_vec_with_registry!(
                "graphfeed_records_fetched",
                "Total number of records pulled by catch-up fetches",
                &["entity_kind"],
                registry,
            )
            .unwrap(),
            dispatch_errors: register_int_counter_vec_with_registry!(
                "graphfeed_dispatch_errors",
                "Total number of failed notification dispatches",
                &["error_type"],
                registry,
            )
            .unwrap(),
            last_ingested_uts: register_int_gauge_vec_with_registry!(
                "graphfeed_last_ingested_uts",
                "Watermark of the most recently ingested record per cursor key",
                &["contract_address", "entity_kind"],
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Arc<Self> {
        let registry = Registry::new();
        Arc::new(Self::new(&registry))
    }
}

async fn metrics_handler(State(registry): State<Registry>) -> String {
    TextEncoder::new()
        .encode_to_string(&registry.gather())
        .unwrap_or_default()
}

/// Serves the registry at `GET /metrics` until the process exits.
pub async fn start_metrics_server(
    addr: SocketAddr,
    registry: Registry,
) -> anyhow::Result<JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);
    Ok(tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    }))
}
