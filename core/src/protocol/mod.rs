//! Typed operations and their XML-over-HTTP encoding.
//!
//! # Design
//! The protocol has a closed set of operations, so requests and responses
//! are enums with one variant per operation rather than trait objects. Each
//! variant knows its method, query string and body (encode) and how to read
//! its response (decode); `Request` and `Response` dispatch on the tag.
//!
//! Every operation targets `/topics/{topic}/messages`. The query string is
//! assembled literally, without percent-encoding; values that need escaping
//! (the consume tag filter) are encoded when they are set.

mod ack;
mod consume;
mod publish;
pub(crate) mod xml;

use std::cell::OnceCell;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::http::{HttpMethod, HttpResponse};

pub use ack::{AckMessageRequest, AckMessageResponse, AckMode};
pub use consume::{ConsumeMessageRequest, ConsumeMessageResponse, ConsumeMode};
pub use publish::{PublishMessageRequest, PublishMessageResponse};

/// Decode progress of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Unparsed,
    Parsed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Consume(ConsumeMessageRequest),
    Ack(AckMessageRequest),
    Publish(PublishMessageRequest),
}

impl Operation {
    pub fn method(&self) -> HttpMethod {
        match self {
            Operation::Consume(_) => HttpMethod::Get,
            Operation::Ack(_) => HttpMethod::Delete,
            Operation::Publish(_) => HttpMethod::Post,
        }
    }

    pub fn topic(&self) -> &str {
        match self {
            Operation::Consume(op) => op.topic(),
            Operation::Ack(op) => op.topic(),
            Operation::Publish(op) => op.topic(),
        }
    }

    fn query_string(&self) -> String {
        match self {
            Operation::Consume(op) => op.query_string(),
            Operation::Ack(op) => op.query_string(),
            Operation::Publish(op) => op.query_string(),
        }
    }

    fn body(&self) -> String {
        match self {
            Operation::Consume(_) => String::new(),
            Operation::Ack(op) => op.body(),
            Operation::Publish(op) => op.body(),
        }
    }
}

/// A request on its way through the dispatcher.
///
/// Owned by a single call. The canonical resource and the body are computed
/// on first use and cached, so repeated calls return the same string.
#[derive(Debug, Clone)]
pub struct Request {
    operation: Operation,
    headers: BTreeMap<String, String>,
    canonical_resource: OnceCell<String>,
    body: OnceCell<String>,
}

impl Request {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            headers: BTreeMap::new(),
            canonical_resource: OnceCell::new(),
            body: OnceCell::new(),
        }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn method(&self) -> HttpMethod {
        self.operation.method()
    }

    pub fn resource_path(&self) -> String {
        format!("/topics/{}/messages", self.operation.topic())
    }

    pub fn query_string(&self) -> String {
        self.operation.query_string()
    }

    /// Path plus `?query` when the query is non-empty.
    pub fn canonical_resource(&self) -> &str {
        self.canonical_resource.get_or_init(|| {
            let mut resource = self.resource_path();
            let query = self.query_string();
            if !query.is_empty() {
                resource.push('?');
                resource.push_str(&query);
            }
            resource
        })
    }

    /// XML body; empty for operations without one.
    pub fn body(&self) -> &str {
        self.body.get_or_init(|| self.operation.body())
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Case-insensitive lookup.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Insert or replace a header. Names compare case-insensitively, so at
    /// most one entry per name exists and the latest spelling wins.
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(&key));
        self.headers.insert(key, value.into());
    }

    /// Wrap a raw response in the variant that matches this request.
    pub fn response_for(&self, raw: HttpResponse) -> Response {
        match self.operation {
            Operation::Consume(_) => Response::Consume(ConsumeMessageResponse::new(raw)),
            Operation::Ack(_) => Response::Ack(AckMessageResponse::new(raw)),
            Operation::Publish(_) => Response::Publish(PublishMessageResponse::new(raw)),
        }
    }
}

impl From<ConsumeMessageRequest> for Request {
    fn from(op: ConsumeMessageRequest) -> Self {
        Request::new(Operation::Consume(op))
    }
}

impl From<AckMessageRequest> for Request {
    fn from(op: AckMessageRequest) -> Self {
        Request::new(Operation::Ack(op))
    }
}

impl From<PublishMessageRequest> for Request {
    fn from(op: PublishMessageRequest) -> Self {
        Request::new(Operation::Publish(op))
    }
}

#[derive(Debug, Clone)]
pub enum Response {
    Consume(ConsumeMessageResponse),
    Ack(AckMessageResponse),
    Publish(PublishMessageResponse),
}

impl Response {
    pub fn raw(&self) -> &HttpResponse {
        match self {
            Response::Consume(r) => r.raw(),
            Response::Ack(r) => r.raw(),
            Response::Publish(r) => r.raw(),
        }
    }

    pub fn status(&self) -> u16 {
        self.raw().status
    }

    pub fn state(&self) -> ParseState {
        match self {
            Response::Consume(r) => r.state(),
            Response::Ack(r) => r.state(),
            Response::Publish(r) => r.state(),
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            Response::Consume(r) => r.is_success(),
            Response::Ack(r) => r.is_success(),
            Response::Publish(r) => r.is_success(),
        }
    }

    pub fn decode(&mut self) -> Result<()> {
        match self {
            Response::Consume(r) => r.decode(),
            Response::Ack(r) => r.decode(),
            Response::Publish(r) => r.decode(),
        }
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TopicMessage;

    #[test]
    fn canonical_resource_includes_query() {
        let req: Request = ConsumeMessageRequest::new("orders", "GID_a", 2).into();
        assert_eq!(req.method(), HttpMethod::Get);
        assert_eq!(req.canonical_resource(), "/topics/orders/messages?consumer=GID_a&numOfMessages=2");
        assert_eq!(req.body(), "");
    }

    #[test]
    fn canonical_resource_without_query_has_no_question_mark() {
        let op = PublishMessageRequest::new("orders", &TopicMessage::new("x")).unwrap();
        let req: Request = op.into();
        assert_eq!(req.method(), HttpMethod::Post);
        assert_eq!(req.canonical_resource(), "/topics/orders/messages");
    }

    #[test]
    fn canonical_resource_is_idempotent() {
        let mut req: Request = AckMessageRequest::new("orders", "GID_a", ["h"]).into();
        let first = req.canonical_resource().to_string();
        let second = req.canonical_resource().to_string();
        assert_eq!(first, second);
        // Headers do not take part in the canonical resource.
        req.set_header("x-mq-extra", "1");
        assert_eq!(req.canonical_resource(), first);
    }

    #[test]
    fn header_names_are_unique_ignoring_case() {
        let mut req: Request = ConsumeMessageRequest::new("orders", "GID_a", 1).into();
        req.set_header("content-type", "application/json");
        req.set_header("Content-Type", "text/xml");
        assert_eq!(req.headers().len(), 1);
        assert_eq!(req.header("CONTENT-TYPE"), Some("text/xml"));
        assert_eq!(req.headers().keys().next().map(String::as_str), Some("Content-Type"));
    }

    #[test]
    fn response_variant_follows_request() {
        let req: Request = AckMessageRequest::new("orders", "GID_a", ["h"]).into();
        let resp = req.response_for(HttpResponse {
            status: 204,
            ..Default::default()
        });
        assert!(matches!(resp, Response::Ack(_)));
        assert_eq!(resp.state(), ParseState::Unparsed);
        assert!(resp.is_success());
    }

    #[test]
    fn response_decode_dispatches() {
        let req: Request = ConsumeMessageRequest::new("orders", "GID_a", 2).into();
        let mut resp = req.response_for(HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: b"<Messages><Message><MessageId>1</MessageId></Message></Messages>".to_vec(),
        });
        resp.decode().unwrap();
        assert_eq!(resp.state(), ParseState::Parsed);
        match resp {
            Response::Consume(r) => assert_eq!(r.messages()[0].message_id(), "1"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
