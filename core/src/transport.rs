//! Blocking HTTP transport.
//!
//! # Design
//! A `Connector` creates connection handles; the pool owns them and lends
//! one to each in-flight call. The default `UreqConnector` gives every handle
//! its own `ureq::Agent` holding at most one keep-alive session, so a pooled
//! handle maps to one reusable HTTP connection.
//!
//! Transport failures are reported as `MqError::Transport`; HTTP error
//! statuses are NOT failures here and come back as ordinary responses for the
//! codec to interpret.

use std::time::Duration;

use crate::constants::{AGENT, CONTENT_LENGTH, HOST, USER_AGENT};
use crate::error::{MqError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// One reusable transport session.
pub trait Connection: Send {
    /// Perform one request/response exchange.
    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse>;

    /// Whether the session can still be lent out. Checked before reuse.
    fn is_alive(&self) -> bool {
        true
    }
}

/// Factory for connections, shared by every caller of a pool.
pub trait Connector: Send + Sync {
    type Connection: Connection;

    fn connect(&self) -> Result<Self::Connection>;
}

#[derive(Debug, Clone)]
pub struct UreqConnector {
    connect_timeout: Duration,
    timeout: Duration,
}

impl UreqConnector {
    /// `timeout` bounds the whole exchange, including a server-side long
    /// poll, so it must be longer than any requested wait.
    pub fn new(connect_timeout: Duration, timeout: Duration) -> Self {
        Self {
            connect_timeout,
            timeout,
        }
    }
}

impl Connector for UreqConnector {
    type Connection = UreqConnection;

    fn connect(&self) -> Result<UreqConnection> {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(Some(self.connect_timeout))
            .timeout_global(Some(self.timeout))
            .max_idle_connections(1)
            .max_idle_connections_per_host(1)
            .build()
            .new_agent();
        Ok(UreqConnection { agent })
    }
}

pub struct UreqConnection {
    agent: ureq::Agent,
}

impl Connection for UreqConnection {
    fn execute(&mut self, request: &HttpRequest) -> Result<HttpResponse> {
        let body = request.body.as_deref().unwrap_or_default();
        let result = match request.method {
            HttpMethod::Get => with_headers(self.agent.get(&request.url), &request.headers).call(),
            HttpMethod::Post => with_headers(self.agent.post(&request.url), &request.headers).send(body.as_bytes()),
            HttpMethod::Delete => with_headers(self.agent.delete(&request.url), &request.headers)
                .force_send_body()
                .send(body.as_bytes()),
        };
        let mut response = result.map_err(|e| MqError::transport(format!("{} {}: {e}", request.method, request.url)))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(|e| MqError::transport(format!("reading response body: {e}")))?;

        Ok(HttpResponse { status, headers, body })
    }
}

/// Copy signed headers onto the builder. `Host` and `Content-Length` are
/// derived by ureq from the URL and body and must not be sent twice.
fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, headers: &[(String, String)]) -> ureq::RequestBuilder<B> {
    for (key, value) in headers {
        if key.eq_ignore_ascii_case(HOST) || key.eq_ignore_ascii_case(CONTENT_LENGTH) {
            continue;
        }
        builder = builder.header(key.as_str(), value.as_str());
    }
    builder.header(USER_AGENT, AGENT)
}
