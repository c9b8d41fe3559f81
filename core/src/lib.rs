//! Blocking client core for an HTTP message-queue service.
//!
//! # Overview
//! Messages are published to, consumed from and acknowledged on
//! `/topics/{topic}/messages` with XML bodies and signed headers. A call goes
//! through four pieces:
//!
//! - `protocol` encodes the typed request and decodes the typed response.
//! - `signer` computes the `Authorization` header.
//! - `pool` lends out a bounded set of reusable transport connections.
//! - `dispatcher` ties them together for exactly one round trip.
//!
//! `MqClient` owns the endpoint, credentials and pool, and is the handle
//! callers share across threads.
//!
//! # Design
//! - Request and response encoding is pure: `protocol` works on plain
//!   `HttpRequest`/`HttpResponse` data, so every codec path is testable
//!   from canned bytes without a server.
//! - Only `transport` performs I/O, behind the `Connector`/`Connection`
//!   traits. The default is a blocking `ureq` agent per pooled connection.
//! - No internal retries. Errors say whether the client, the server or the
//!   transport failed; retry policy belongs to the caller.

pub mod client;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod pool;
pub mod properties;
pub mod protocol;
pub mod signer;
pub mod transport;
pub mod types;

pub use client::MqClient;
pub use config::{ClientConfig, ConfigError, Credentials, Endpoint};
pub use error::{ErrorInfo, MqError, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use pool::{ConnectionPool, PoolStatus, PooledConnection};
pub use protocol::{
    AckMessageRequest, AckMessageResponse, AckMode, ConsumeMessageRequest, ConsumeMessageResponse, ConsumeMode,
    ParseState, PublishMessageRequest, PublishMessageResponse, Request, Response,
};
pub use transport::{Connection, Connector, UreqConnection, UreqConnector};
pub use types::{AckFailure, Message, TopicMessage};

// Shared across caller threads.
const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    let _ = assert_send_sync::<MqClient>;
    let _ = assert_send_sync::<ConnectionPool<UreqConnector>>;
    let _ = assert_send_sync::<MqError>;
    let _ = assert_send_sync::<Credentials>;
};
