// Copyright (c) Graphfeed Contributors
// SPDX-License-Identifier: Apache-2.0

//! Named-subscription lifecycle.
//!
//! The subscriber owns the declared set of push subscriptions, brings them
//! up and tears them down as a unit, and keeps the live handles for
//! supervision while active. Each established subscription gets a pump task
//! that forwards notifications into the dispatcher; a failed dispatch is
//! logged and counted but never wedges the channel.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::dispatcher::LiveDispatcher;
use crate::error::{IngestError, IngestResult};
use crate::graph_client::{GraphClient, SubscriptionHandle};
use crate::metrics::IngestMetrics;

/// A declared push-query definition, identified by a label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedSubscription {
    pub name: String,
    pub query: String,
}

struct ActiveSubscription {
    handle: SubscriptionHandle,
    pump: JoinHandle<()>,
}

pub struct Subscriber {
    client: Arc<dyn GraphClient>,
    dispatcher: Arc<LiveDispatcher>,
    subscriptions: Vec<NamedSubscription>,
    active: BTreeMap<String, ActiveSubscription>,
    metrics: Arc<IngestMetrics>,
}

impl Subscriber {
    pub fn new(
        client: Arc<dyn GraphClient>,
        dispatcher: Arc<LiveDispatcher>,
        subscriptions: Vec<NamedSubscription>,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        Self {
            client,
            dispatcher,
            subscriptions,
            active: BTreeMap::new(),
            metrics,
        }
    }

    /// Establishes every declared subscription, in declaration order. The
    /// first failure aborts activation with the originating error; handles
    /// already established are kept and can be torn down with
    /// [`Subscriber::deactivate_all`]. Call once per subscriber lifetime.
    pub async fn activate_all(&mut self) -> IngestResult<()> {
        for subscription in &self.subscriptions {
            if subscription.query.trim().is_empty() {
                return Err(IngestError::MissingParameter("subscription_query"));
            }

            let live = self.client.subscribe(&subscription.query).await?;
            let pump = tokio::spawn(pump_notifications(
                subscription.name.clone(),
                live.notifications,
                self.dispatcher.clone(),
                self.metrics.clone(),
            ));
            info!("[{}] Subscription established", subscription.name);
            self.active.insert(
                subscription.name.clone(),
                ActiveSubscription {
                    handle: live.handle,
                    pump,
                },
            );
        }
        Ok(())
    }

    /// Cancels every live subscription and awaits its teardown, in name
    /// order. All failures are aggregated into a single error instead of
    /// aborting at the first one; the handle set is empty on return either
    /// way, so a fresh [`Subscriber::activate_all`] is safe.
    pub async fn deactivate_all(&mut self) -> IngestResult<()> {
        let mut failures = Vec::new();
        for (name, active) in std::mem::take(&mut self.active) {
            if let Err(e) = active.handle.unsubscribe().await {
                failures.push(format!("{}: {}", name, e));
            }
            // The pump drains on its own once the subscription task drops
            // the notification sender; in-flight dispatches complete.
            let _ = active.pump.await;
            info!("[{}] Subscription closed", name);
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(IngestError::Subscription(format!(
                "failed to unsubscribe: {}",
                failures.join("; ")
            )))
        }
    }

    /// Names of the currently live subscriptions, for supervision.
    pub fn active_names(&self) -> Vec<&str> {
        self.active.keys().map(String::as_str).collect()
    }

    pub fn is_active(&self) -> bool {
        !self.active.is_empty()
    }
}

async fn pump_notifications(
    name: String,
    mut notifications: mpsc::Receiver<Value>,
    dispatcher: Arc<LiveDispatcher>,
    metrics: Arc<IngestMetrics>,
) {
    while let Some(payload) = notifications.recv().await {
        if let Err(e) = dispatcher.on_push(&payload).await {
            metrics
                .dispatch_errors
                .with_label_values(&[e.error_type()])
                .inc();
            error!("[{}] Failed to process notification: {}", name, e);
        }
    }
    info!("[{}] Notification channel closed", name);
}
