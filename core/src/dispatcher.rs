//! One round trip: sign, borrow a connection, exchange, release, decode.
//!
//! # Design
//! `prepare` is pure: it fills in the required headers, signs, and returns
//! the `HttpRequest` that goes on the wire. `send` adds the I/O. The pooled
//! connection is held by a scoped guard that is dropped before decoding, so
//! it goes back to the pool on every path, including decode failures. A
//! transport failure marks the guard broken and the pool discards the handle.
//!
//! There is no retry. One call is exactly one exchange.

use chrono::{DateTime, Utc};

use crate::config::{Credentials, Endpoint};
use crate::constants::{
    AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, CURRENT_VERSION, DATE, DEFAULT_CONTENT_TYPE, HOST, MQ_VERSION,
    SECURITY_TOKEN,
};
use crate::error::Result;
use crate::http::HttpRequest;
use crate::pool::ConnectionPool;
use crate::protocol::{Request, Response};
use crate::signer;
use crate::transport::{Connection, Connector};

/// RFC 1123 date in GMT, the format the `Date` header requires.
pub fn http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Populate the required headers on `request`, sign it, and build the wire
/// request. `date` is the `Date` header value.
pub fn prepare(request: &mut Request, endpoint: &Endpoint, credentials: &Credentials, date: &str) -> Result<HttpRequest> {
    if let Some(token) = credentials.security_token.as_deref().filter(|t| !t.is_empty()) {
        request.set_header(SECURITY_TOKEN, token);
    }

    let canonical_resource = request.canonical_resource().to_string();
    let body = request.body().to_string();

    request.set_header(HOST, endpoint.host());
    request.set_header(CONTENT_TYPE, DEFAULT_CONTENT_TYPE);
    request.set_header(DATE, date);
    request.set_header(MQ_VERSION, CURRENT_VERSION);
    if !body.is_empty() {
        request.set_header(CONTENT_LENGTH, body.len().to_string());
    }

    let authorization = signer::authorization(
        request.method(),
        &canonical_resource,
        &credentials.access_id,
        &credentials.access_key,
        request.headers(),
    )?;
    request.set_header(AUTHORIZATION, authorization);

    Ok(HttpRequest {
        method: request.method(),
        url: endpoint.url_for(&canonical_resource),
        headers: request
            .headers()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        body: (!body.is_empty()).then_some(body),
    })
}

/// Perform one operation and return its decoded response.
///
/// Server and client errors from decoding are returned as `Err`; a partial
/// acknowledgement failure is data on the `Ok` response.
pub fn send<C: Connector>(
    mut request: Request,
    endpoint: &Endpoint,
    credentials: &Credentials,
    pool: &ConnectionPool<C>,
) -> Result<Response> {
    let http_request = prepare(&mut request, endpoint, credentials, &http_date(Utc::now()))?;

    let raw = {
        let mut connection = pool.acquire()?;
        match connection.execute(&http_request) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(method = %http_request.method, url = %http_request.url, error = %e, "exchange failed, discarding connection");
                connection.mark_broken();
                return Err(e);
            }
        }
    };

    tracing::debug!(
        method = %http_request.method,
        url = %http_request.url,
        status = raw.status,
        "exchange complete"
    );

    let mut response = request.response_for(raw);
    response.decode()?;
    Ok(response)
}
