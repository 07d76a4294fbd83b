// Copyright (c) Graphfeed Contributors
// SPDX-License-Identifier: Apache-2.0

/// Error type for ingestion operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum IngestError {
    /// A required configuration value is empty or absent. Raised before any
    /// network traffic, never retried.
    #[error("Mandatory parameter '{0}' is missing or invalid.")]
    MissingParameter(&'static str),

    /// No query template is registered for the discriminator.
    #[error("Unknown entity kind: {0}")]
    UnknownEntityKind(String),

    /// Pull-query transport or GraphQL-level failure.
    #[error("Graph query failed: {0}")]
    Query(String),

    /// Push-channel establishment or teardown failure.
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Cursor persistence failure; the message carries the key and attempted
    /// value so the caller can log and decide on retry.
    #[error("{0}")]
    Storage(String),

    /// A record is missing a field the pipeline requires. Fails the whole
    /// batch so the watermark is never advanced past unparseable data.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Notification channel closed
    #[error("Notification channel closed")]
    ChannelClosed,
}

impl IngestError {
    /// Returns a short string identifying the error type for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            IngestError::MissingParameter(_) => "missing_parameter",
            IngestError::UnknownEntityKind(_) => "unknown_entity_kind",
            IngestError::Query(_) => "query_error",
            IngestError::Subscription(_) => "subscription_error",
            IngestError::Storage(_) => "storage_error",
            IngestError::MalformedRecord(_) => "malformed_record",
            IngestError::ChannelClosed => "channel_closed",
        }
    }
}

/// Result type for ingestion operations
pub type IngestResult<T> = Result<T, IngestError>;
