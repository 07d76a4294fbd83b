// Copyright (c) Graphfeed Contributors
// SPDX-License-Identifier: Apache-2.0

//! Seam to the graph-indexing service.
//!
//! The live channel is modeled as an abstract notification source: a
//! subscription yields opaque notification payloads plus a cancellable
//! handle, and nothing downstream ever treats a payload as authoritative —
//! the dispatcher re-derives every batch through a pull query.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{IngestError, IngestResult};

/// Client for the indexed-data service: one pull-query operation and one
/// push-subscription operation.
#[async_trait::async_trait]
pub trait GraphClient: Send + Sync {
    /// Issues a single pull query and returns the response's `data` object.
    async fn query(&self, query: &str, variables: Value) -> IngestResult<Value>;

    /// Establishes a push subscription for `query`. Notification payloads
    /// are delivered on the returned channel until the handle is cancelled
    /// or the channel fails.
    async fn subscribe(&self, query: &str) -> IngestResult<LiveSubscription>;
}

/// An established push subscription: the notification stream plus the handle
/// needed to tear it down.
pub struct LiveSubscription {
    pub notifications: mpsc::Receiver<Value>,
    pub handle: SubscriptionHandle,
}

/// Live handle for one push subscription. Dropping the handle without
/// calling [`SubscriptionHandle::unsubscribe`] leaves the background task
/// running until its channel closes.
pub struct SubscriptionHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn new(cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self { cancel, task }
    }

    /// Cancels the subscription and awaits the background task.
    pub async fn unsubscribe(self) -> IngestResult<()> {
        self.cancel.cancel();
        self.task
            .await
            .map_err(|e| IngestError::Subscription(format!("subscription task failed: {}", e)))
    }
}
