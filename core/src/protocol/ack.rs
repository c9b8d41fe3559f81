//! AckMessage: `DELETE /topics/{topic}/messages`.
//!
//! Acknowledgement is a batch operation. A 204 means every handle was
//! accepted. Any other status carries either a generic `<Error>` document,
//! which fails the whole call, or a list of per-handle `<Error>` entries,
//! which is returned as data and leaves the call successful.

use crate::constants::{ERROR_CODE, ERROR_MESSAGE, ERROR_TAG, RECEIPT_HANDLE, RECEIPT_HANDLES};
use crate::error::Result;
use crate::http::HttpResponse;
use crate::protocol::xml::{self, XmlWriter};
use crate::protocol::{non_empty, ParseState};
use crate::types::AckFailure;

/// How the acknowledged handles are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    #[default]
    Normal,
    /// Commit a transactional half message (`trans=commit`).
    Commit,
    /// Roll back a transactional half message (`trans=rollback`).
    Rollback,
}

impl AckMode {
    fn trans(&self) -> Option<&'static str> {
        match self {
            AckMode::Normal => None,
            AckMode::Commit => Some("commit"),
            AckMode::Rollback => Some("rollback"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckMessageRequest {
    topic: String,
    consumer: String,
    receipt_handles: Vec<String>,
    instance_id: Option<String>,
    mode: AckMode,
}

impl AckMessageRequest {
    pub fn new(
        topic: impl Into<String>,
        consumer: impl Into<String>,
        receipt_handles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            topic: topic.into(),
            consumer: consumer.into(),
            receipt_handles: receipt_handles.into_iter().map(Into::into).collect(),
            instance_id: None,
            mode: AckMode::Normal,
        }
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    pub fn with_mode(mut self, mode: AckMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn receipt_handles(&self) -> &[String] {
        &self.receipt_handles
    }

    pub(crate) fn query_string(&self) -> String {
        let mut query = format!("consumer={}", self.consumer);
        if let Some(ns) = non_empty(&self.instance_id) {
            query.push_str("&ns=");
            query.push_str(ns);
        }
        if let Some(trans) = self.mode.trans() {
            query.push_str("&trans=");
            query.push_str(trans);
        }
        query
    }

    pub(crate) fn body(&self) -> String {
        let mut writer = XmlWriter::new(RECEIPT_HANDLES);
        for handle in &self.receipt_handles {
            writer.element(RECEIPT_HANDLE, handle);
        }
        writer.finish()
    }
}

#[derive(Debug, Clone)]
pub struct AckMessageResponse {
    raw: HttpResponse,
    state: ParseState,
    failures: Vec<AckFailure>,
}

impl AckMessageResponse {
    pub fn new(raw: HttpResponse) -> Self {
        Self {
            raw,
            state: ParseState::Unparsed,
            failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.raw.status == 204
    }

    pub fn raw(&self) -> &HttpResponse {
        &self.raw
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Handles the service refused. Handles not listed were acknowledged.
    pub fn failures(&self) -> &[AckFailure] {
        &self.failures
    }

    pub fn all_acknowledged(&self) -> bool {
        self.state == ParseState::Parsed && self.failures.is_empty()
    }

    pub fn decode(&mut self) -> Result<()> {
        if self.state == ParseState::Parsed {
            return Ok(());
        }
        match self.parse() {
            Ok(failures) => {
                self.failures = failures;
                self.state = ParseState::Parsed;
                Ok(())
            }
            Err(e) => {
                self.state = ParseState::Failed;
                Err(e)
            }
        }
    }

    fn parse(&self) -> Result<Vec<AckFailure>> {
        if self.is_success() {
            return Ok(Vec::new());
        }
        let root = xml::parse_document(&self.raw.body)?;
        if root.name == ERROR_TAG {
            return Err(xml::common_error(&root, self.raw.status, &self.raw.body));
        }
        Ok(root
            .children_named(ERROR_TAG)
            .map(|entry| AckFailure {
                receipt_handle: entry.child_text(RECEIPT_HANDLE).unwrap_or_default().to_string(),
                error_code: entry.child_text(ERROR_CODE).unwrap_or_default().to_string(),
                error_message: entry.child_text(ERROR_MESSAGE).unwrap_or_default().to_string(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MqError;

    fn response(status: u16, body: &str) -> AckMessageResponse {
        AckMessageResponse::new(HttpResponse {
            status,
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
        })
    }

    #[test]
    fn query_and_body() {
        let req = AckMessageRequest::new("orders", "GID_a", ["h1", "h2"])
            .with_instance_id("inst")
            .with_mode(AckMode::Commit);
        assert_eq!(req.query_string(), "consumer=GID_a&ns=inst&trans=commit");
        assert_eq!(
            req.body(),
            r#"<?xml version="1.0" encoding="UTF-8"?><ReceiptHandles xmlns="http://mq.aliyuncs.com/doc/v1"><ReceiptHandle>h1</ReceiptHandle><ReceiptHandle>h2</ReceiptHandle></ReceiptHandles>"#
        );
    }

    #[test]
    fn rollback_mode() {
        let req = AckMessageRequest::new("orders", "GID_a", ["h1"]).with_mode(AckMode::Rollback);
        assert_eq!(req.query_string(), "consumer=GID_a&trans=rollback");
    }

    #[test]
    fn no_content_means_all_acknowledged_without_parsing() {
        // The body is garbage on purpose: a 204 must not be parsed.
        let mut resp = response(204, "<<<not xml");
        resp.decode().unwrap();
        assert!(resp.failures().is_empty());
        assert!(resp.all_acknowledged());
    }

    #[test]
    fn partial_failure_is_data_not_error() {
        let mut resp = response(
            200,
            "<Errors>\
             <Error><ErrorCode>ReceiptHandleError</ErrorCode><ErrorMessage>bad A</ErrorMessage><ReceiptHandle>A</ReceiptHandle></Error>\
             <Error><ErrorCode>ReceiptHandleError</ErrorCode><ErrorMessage>bad B</ErrorMessage><ReceiptHandle>B</ReceiptHandle></Error>\
             </Errors>",
        );
        resp.decode().unwrap();
        let handles: Vec<_> = resp.failures().iter().map(|f| f.receipt_handle.as_str()).collect();
        assert_eq!(handles, ["A", "B"]);
        assert_eq!(resp.failures()[1].error_message, "bad B");
        assert!(!resp.all_acknowledged());
    }

    #[test]
    fn generic_error_fails_the_call() {
        let mut resp = response(
            404,
            "<Error><Code>TopicNotExist</Code><Message>no topic</Message><RequestId>R</RequestId><HostId>H</HostId></Error>",
        );
        let err = resp.decode().unwrap_err();
        assert_eq!(err.error_info().map(|i| i.code.as_str()), Some("TopicNotExist"));
        assert_eq!(resp.state(), ParseState::Failed);
    }

    #[test]
    fn non_success_with_unreadable_body_is_client_error() {
        let mut resp = response(500, "gateway exploded");
        assert!(matches!(resp.decode().unwrap_err(), MqError::Client { .. }));
    }
}
