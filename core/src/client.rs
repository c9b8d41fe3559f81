//! Shared, thread-safe client handle.
//!
//! # Design
//! `MqClient` owns everything a call needs: the endpoint, the current
//! credentials and the connection pool. Construction is the explicit init
//! step; `shutdown` (or drop) is the teardown. One client is meant to be
//! shared by many threads; each call borrows one pooled connection for the
//! duration of a single exchange.
//!
//! Credentials sit behind an `ArcSwap` so they can be rotated while calls are
//! in flight. A call loads them once, so it signs with either the old set or
//! the new one, never a mix.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::{ClientConfig, Credentials, Endpoint};
use crate::dispatcher;
use crate::error::{MqError, Result};
use crate::pool::{ConnectionPool, PoolStatus};
use crate::protocol::{
    AckMessageRequest, AckMessageResponse, ConsumeMessageRequest, PublishMessageRequest, PublishMessageResponse,
    Request, Response,
};
use crate::transport::{Connector, UreqConnector};
use crate::types::Message;

pub struct MqClient<C: Connector = UreqConnector> {
    endpoint: Endpoint,
    credentials: ArcSwap<Credentials>,
    pool: ConnectionPool<C>,
}

impl MqClient<UreqConnector> {
    /// Client over the default blocking HTTP transport.
    pub fn new(config: ClientConfig, credentials: Credentials) -> Result<Self> {
        let connector = UreqConnector::new(config.connect_timeout(), config.timeout());
        Self::with_connector(config, credentials, connector)
    }
}

impl<C: Connector> MqClient<C> {
    pub fn with_connector(config: ClientConfig, credentials: Credentials, connector: C) -> Result<Self> {
        config.validate().map_err(|e| MqError::client(e.to_string()))?;
        let endpoint = config.endpoint().map_err(|e| MqError::client(e.to_string()))?;
        tracing::debug!(
            endpoint = endpoint.base(),
            pool_size = config.pool_size,
            access_id = %credentials.access_id,
            "creating message queue client"
        );
        Ok(Self {
            endpoint,
            credentials: ArcSwap::from_pointee(credentials),
            pool: ConnectionPool::new(
                connector,
                config.pool_size,
                config.connect_timeout(),
                config.idle_timeout(),
            ),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Credentials used by the next call.
    pub fn credentials(&self) -> Arc<Credentials> {
        self.credentials.load_full()
    }

    /// Replace the access id, key and session token for all later calls.
    pub fn update_credentials(&self, credentials: Credentials) {
        tracing::debug!(access_id = %credentials.access_id, "credentials updated");
        self.credentials.store(Arc::new(credentials));
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Close the connection pool. Calls made afterwards fail with
    /// `MqError::PoolClosed`.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    /// Dispatch one request and return its decoded response.
    pub fn send(&self, request: impl Into<Request>) -> Result<Response> {
        let credentials = self.credentials.load_full();
        dispatcher::send(request.into(), &self.endpoint, &credentials, &self.pool)
    }

    /// Receive up to the requested batch of messages.
    ///
    /// An empty topic is reported by the service as a `MessageNotExist`
    /// server error, not as an empty list.
    pub fn consume_message(&self, request: ConsumeMessageRequest) -> Result<Vec<Message>> {
        match self.send(request)? {
            Response::Consume(response) => Ok(response.into_messages()),
            other => Err(unexpected(&other)),
        }
    }

    /// Acknowledge receipt handles. Handles the service refused are listed in
    /// `AckMessageResponse::failures`; the call itself still succeeds.
    pub fn ack_message(&self, request: AckMessageRequest) -> Result<AckMessageResponse> {
        match self.send(request)? {
            Response::Ack(response) => Ok(response),
            other => Err(unexpected(&other)),
        }
    }

    pub fn publish_message(&self, request: PublishMessageRequest) -> Result<PublishMessageResponse> {
        match self.send(request)? {
            Response::Publish(response) => Ok(response),
            other => Err(unexpected(&other)),
        }
    }
}

fn unexpected(response: &Response) -> MqError {
    MqError::client(format!(
        "unexpected response variant for HTTP {}: {}",
        response.status(),
        response.raw().body_text()
    ))
}
