// Copyright (c) Graphfeed Contributors
// SPDX-License-Identifier: Apache-2.0

//! Concrete client for a graph-indexing node.
//!
//! Pull queries go over HTTP POST; push subscriptions speak the Apollo
//! subscriptions-transport-ws protocol over one WebSocket connection per
//! subscription (`connection_init` / `start` / `data` / `ka` / `complete`,
//! `stop` on cancellation).

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{IngestError, IngestResult};
use crate::graph_client::{GraphClient, LiveSubscription, SubscriptionHandle};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const NOTIFICATION_BUFFER: usize = 64;

// One subscription per connection, so a fixed operation id suffices.
const OPERATION_ID: &str = "1";

pub struct GraphNodeClient {
    http: reqwest::Client,
    query_url: Url,
    subscription_url: Url,
}

impl GraphNodeClient {
    pub fn new(query_url: Url, subscription_url: Url) -> IngestResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| IngestError::Query(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            query_url,
            subscription_url,
        })
    }
}

#[async_trait::async_trait]
impl GraphClient for GraphNodeClient {
    async fn query(&self, query: &str, variables: Value) -> IngestResult<Value> {
        if query.trim().is_empty() {
            return Err(IngestError::MissingParameter("query"));
        }

        let response = self
            .http
            .post(self.query_url.clone())
            .json(&json!({"query": query, "variables": variables}))
            .send()
            .await
            .map_err(|e| IngestError::Query(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Query(format!(
                "graph node returned {}",
                status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| IngestError::Query(format!("invalid response body: {}", e)))?;

        if let Some(errors) = body.get("errors") {
            if errors.as_array().is_some_and(|e| !e.is_empty()) {
                return Err(IngestError::Query(errors.to_string()));
            }
        }

        body.get("data")
            .cloned()
            .ok_or_else(|| IngestError::Query("response has no data".to_string()))
    }

    async fn subscribe(&self, query: &str) -> IngestResult<LiveSubscription> {
        if query.trim().is_empty() {
            return Err(IngestError::MissingParameter("subscription_query"));
        }

        let mut request = self
            .subscription_url
            .as_str()
            .into_client_request()
            .map_err(|e| IngestError::Subscription(format!("invalid subscription url: {}", e)))?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static("graphql-ws"),
        );

        let (mut ws, _) = connect_async(request)
            .await
            .map_err(|e| IngestError::Subscription(format!("failed to connect: {}", e)))?;

        let init = json!({"type": "connection_init", "payload": {}});
        let start = json!({
            "id": OPERATION_ID,
            "type": "start",
            "payload": {"query": query},
        });
        for message in [init, start] {
            ws.send(Message::Text(message.to_string().into()))
                .await
                .map_err(|e| IngestError::Subscription(format!("handshake failed: {}", e)))?;
        }

        let (sender, receiver) = mpsc::channel(NOTIFICATION_BUFFER);
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let task = tokio::spawn(run_subscription(ws, sender, child));

        Ok(LiveSubscription {
            notifications: receiver,
            handle: SubscriptionHandle::new(cancel, task),
        })
    }
}

async fn run_subscription(
    mut ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    sender: mpsc::Sender<Value>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let stop = json!({"id": OPERATION_ID, "type": "stop"});
                let _ = ws.send(Message::Text(stop.to_string().into())).await;
                let _ = ws.close(None).await;
                break;
            }
            frame = ws.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let message: Value = match serde_json::from_str(&text) {
                            Ok(message) => message,
                            Err(e) => {
                                warn!("Discarding unparseable frame: {}", e);
                                continue;
                            }
                        };
                        match message.get("type").and_then(Value::as_str) {
                            Some("connection_ack") => debug!("Subscription acknowledged"),
                            Some("ka") => {}
                            Some("data") => {
                                if let Some(data) = message.pointer("/payload/data") {
                                    if sender.send(data.clone()).await.is_err() {
                                        // Receiver gone; tear the channel down.
                                        let _ = ws.close(None).await;
                                        break;
                                    }
                                } else {
                                    warn!("Data frame without payload: {}", text);
                                }
                            }
                            Some("error") => {
                                error!("Subscription error frame: {}", text);
                            }
                            Some("complete") => {
                                info!("Subscription completed by server");
                                break;
                            }
                            _ => {}
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        warn!("Push channel closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("Push channel failed: {}", e);
                        break;
                    }
                }
            }
        }
    }
}
