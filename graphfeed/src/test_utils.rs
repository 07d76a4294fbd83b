// Copyright (c) Graphfeed Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scripted collaborators for pipeline tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{IngestError, IngestResult};
use crate::graph_client::{GraphClient, LiveSubscription, SubscriptionHandle};
use crate::handler::TransactionHandler;
use crate::types::EntityBatch;

#[derive(Default)]
struct MockGraphClientInner {
    pages: Mutex<VecDeque<Value>>,
    queries: Mutex<Vec<(String, Value)>>,
    senders: Mutex<Vec<(u64, String, mpsc::Sender<Value>)>>,
    next_subscription_id: AtomicU64,
    subscription_count: AtomicUsize,
    fail_subscribe_after: Mutex<Option<usize>>,
    fail_unsubscribe: AtomicBool,
    fail_query: Mutex<Option<String>>,
}

/// Graph client whose pull queries return scripted pages in order and whose
/// subscriptions are in-memory channels driven by the test.
#[derive(Default)]
pub struct MockGraphClient {
    inner: Arc<MockGraphClientInner>,
}

impl MockGraphClient {
    /// Queries return the given responses in order; a query past the end of
    /// the script is an error so tests notice over-fetching.
    pub fn with_pages(pages: Vec<Value>) -> Self {
        let client = Self::default();
        *client.inner.pages.lock().unwrap() = pages.into();
        client
    }

    /// Every query fails with the given message.
    pub fn failing_queries(message: &str) -> Self {
        let client = Self::default();
        *client.inner.fail_query.lock().unwrap() = Some(message.to_string());
        client
    }

    /// Subscriptions beyond the first `count` fail to establish.
    pub fn fail_subscribe_after(&self, count: usize) {
        *self.inner.fail_subscribe_after.lock().unwrap() = Some(count);
    }

    /// Every unsubscribe fails during teardown.
    pub fn fail_unsubscribe(&self) {
        self.inner.fail_unsubscribe.store(true, Ordering::SeqCst);
    }

    /// Every pull query issued so far, with its variables.
    pub fn recorded_queries(&self) -> Vec<(String, Value)> {
        self.inner.queries.lock().unwrap().clone()
    }

    /// Number of subscriptions ever established.
    pub fn subscription_count(&self) -> usize {
        self.inner.subscription_count.load(Ordering::SeqCst)
    }

    /// Delivers a push notification to the live subscription whose query
    /// mentions `entity_kind`.
    pub async fn push_notification(&self, entity_kind: &str, payload: Value) {
        let sender = {
            let senders = self.inner.senders.lock().unwrap();
            senders
                .iter()
                .find(|(_, query, _)| query.contains(entity_kind))
                .map(|(_, _, sender)| sender.clone())
                .expect("no live subscription for entity kind")
        };
        sender.send(payload).await.expect("subscription channel closed");
    }
}

#[async_trait::async_trait]
impl GraphClient for MockGraphClient {
    async fn query(&self, query: &str, variables: Value) -> IngestResult<Value> {
        self.inner
            .queries
            .lock()
            .unwrap()
            .push((query.to_string(), variables));

        if let Some(message) = self.inner.fail_query.lock().unwrap().clone() {
            return Err(IngestError::Query(message));
        }

        self.inner
            .pages
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| IngestError::Query("no scripted pages left".to_string()))
    }

    async fn subscribe(&self, query: &str) -> IngestResult<LiveSubscription> {
        if let Some(limit) = *self.inner.fail_subscribe_after.lock().unwrap() {
            if self.inner.subscription_count.load(Ordering::SeqCst) >= limit {
                return Err(IngestError::Subscription(
                    "injected subscribe failure".to_string(),
                ));
            }
        }

        let id = self.inner.next_subscription_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = mpsc::channel(16);
        self.inner
            .senders
            .lock()
            .unwrap()
            .push((id, query.to_string(), sender));
        self.inner.subscription_count.fetch_add(1, Ordering::SeqCst);

        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            child.cancelled().await;
            // Drop the sender so the pump's channel closes.
            inner
                .senders
                .lock()
                .unwrap()
                .retain(|(sender_id, _, _)| *sender_id != id);
            if inner.fail_unsubscribe.load(Ordering::SeqCst) {
                panic!("injected unsubscribe failure");
            }
        });

        Ok(LiveSubscription {
            notifications: receiver,
            handle: SubscriptionHandle::new(cancel, task),
        })
    }
}

/// Handler that records every batch it is given and can be told to fail or
/// stall on demand.
#[derive(Default)]
pub struct CountingHandler {
    invocations: AtomicUsize,
    batches: Mutex<Vec<EntityBatch>>,
    fail_next: AtomicBool,
    delay_ms: AtomicU64,
}

impl CountingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn batches(&self) -> Vec<EntityBatch> {
        self.batches.lock().unwrap().clone()
    }

    /// The next invocation fails (and clears the flag).
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn set_delay_ms(&self, delay_ms: u64) {
        self.delay_ms.store(delay_ms, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl TransactionHandler for CountingHandler {
    async fn handle(&self, batch: &EntityBatch) -> IngestResult<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }

        self.batches.lock().unwrap().push(batch.clone());
        self.invocations.fetch_add(1, Ordering::SeqCst);

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(IngestError::Query("injected handler failure".to_string()));
        }
        Ok(())
    }
}
