//! Execution gateway boundary
//!
//! The wire protocol, driver and connection pool live outside this crate.
//! They are consumed through the [`Gateway`] trait: one non-blocking
//! request/response call that takes a structured [`Statement`] and returns
//! raw rows plus optional timing metadata.
//!
//! Observability is process-wide rather than per call. The owning
//! [`Keyspace`](crate::Keyspace) broadcasts a [`GatewayEvent`] for every
//! timed statement, every failure and every driver log line.

use async_trait::async_trait;
use casio_core::{Error, Result, Row, Statement};
use std::fmt;
use std::time::Duration;
use tokio::sync::broadcast;

/// Timing metadata a driver may attach to a result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMetadata {
    /// Host that served the query
    pub host: String,
    /// Time spent executing on the server
    pub query_latency: Duration,
    /// Time spent waiting for a pooled connection
    pub pool_latency: Duration,
}

/// Raw rows plus optional metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Result rows in store order
    pub rows: Vec<Row>,
    /// Timing metadata, when the driver reports it
    pub metadata: Option<QueryMetadata>,
}

impl QueryResult {
    /// Result with rows and no metadata
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            metadata: None,
        }
    }
}

/// Capability to execute statements against the store
///
/// Implementations own the connection pool, retries and timeouts.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Execute one statement
    async fn execute(&self, statement: &Statement) -> Result<QueryResult>;

    /// Called once when the gateway is bound to a keyspace.
    ///
    /// Drivers that produce their own log lines forward them through the sink.
    fn attach(&self, _events: EventSink) {}
}

/// Severity of a forwarded driver log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Verbose diagnostics
    Debug,
    /// Normal operation
    Info,
    /// Recoverable trouble
    Warn,
    /// Failure
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// Process-wide observability event
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// A statement completed and the driver reported timing
    Timing {
        /// Rendered statement text
        statement: String,
        /// Host that served it
        host: String,
        /// Server-side latency
        query_latency: Duration,
        /// Pool wait latency
        pool_latency: Duration,
        /// Rows returned
        rows: usize,
    },
    /// A statement failed
    Error {
        /// Rendered statement text
        statement: String,
        /// The failure, as returned to the caller
        error: Error,
    },
    /// A driver log line
    Log {
        /// Severity
        level: LogLevel,
        /// Message text
        message: String,
    },
}

/// Sending half of the event channel
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<GatewayEvent>,
}

impl EventSink {
    /// Channel with room for `capacity` undelivered events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Broadcast an event; dropped silently when nobody listens
    pub fn emit(&self, event: GatewayEvent) {
        let _ = self.tx.send(event);
    }

    /// Broadcast a log line
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(GatewayEvent::Log {
            level,
            message: message.into(),
        });
    }

    /// New receiver for events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.tx.subscribe()
    }
}
