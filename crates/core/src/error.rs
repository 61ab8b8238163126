//! Domain-significant error enums. Callers match on variants; orchestration
//! code (the worker loop, binaries) wraps these in `anyhow::Result` with
//! `.context(...)` instead.

use uuid::Uuid;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
    #[error("runtime guard violated: {0}")]
    RuntimeGuard(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum QueueError {
    #[error("claim lease failed: {0}")]
    ClaimFailed(String),
    #[error("forbidden workflow transition: {from:?} -> {to:?}")]
    ForbiddenTransition { from: String, to: String },
    #[error("store error: {0}")]
    Store(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("connector error: {0}")]
    Connector(#[from] connectors::ConnectorError),
    #[error("dispatch exhausted retries for message {message_id}")]
    RetryExhausted { message_id: Uuid },
    #[error("store error: {0}")]
    Store(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BookingError {
    #[error("forbidden: agent {requested} may not book for agent {actual}")]
    Forbidden { requested: Uuid, actual: Uuid },
    #[error("idempotency conflict for key {idempotency_key}")]
    IdempotencyConflict { idempotency_key: String },
    #[error("no candidate slot covers the requested interval")]
    SlotUnavailable,
    #[error("booking conflicts with an existing appointment")]
    BookingConflict,
    #[error("booking failed: {0}")]
    Failed(String),
}
