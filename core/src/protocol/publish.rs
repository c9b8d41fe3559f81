//! PublishMessage: `POST /topics/{topic}/messages`.

use crate::constants::{MESSAGE, MESSAGE_BODY, MESSAGE_BODY_MD5, MESSAGE_ID, MESSAGE_PROPERTIES, MESSAGE_TAG, RECEIPT_HANDLE};
use crate::error::Result;
use crate::http::HttpResponse;
use crate::properties;
use crate::protocol::xml::{self, XmlWriter};
use crate::protocol::{non_empty, ParseState};
use crate::types::TopicMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishMessageRequest {
    topic: String,
    instance_id: Option<String>,
    body: String,
    tag: Option<String>,
    properties: String,
}

impl PublishMessageRequest {
    /// Build a publish request for `message`.
    ///
    /// Fails with a client error if any property key or value contains a
    /// forbidden character; nothing is sent in that case.
    pub fn new(topic: impl Into<String>, message: &TopicMessage) -> Result<Self> {
        Ok(Self {
            topic: topic.into(),
            instance_id: None,
            body: message.body().to_string(),
            tag: message.tag().map(str::to_string),
            properties: properties::encode(message.properties())?,
        })
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub(crate) fn query_string(&self) -> String {
        match non_empty(&self.instance_id) {
            Some(ns) => format!("ns={ns}"),
            None => String::new(),
        }
    }

    pub(crate) fn body(&self) -> String {
        let mut writer = XmlWriter::new(MESSAGE);
        writer.element(MESSAGE_BODY, &self.body);
        if let Some(tag) = non_empty(&self.tag) {
            writer.element(MESSAGE_TAG, tag);
        }
        if !self.properties.is_empty() {
            writer.element(MESSAGE_PROPERTIES, &self.properties);
        }
        writer.finish()
    }
}

#[derive(Debug, Clone)]
pub struct PublishMessageResponse {
    raw: HttpResponse,
    state: ParseState,
    message_id: String,
    message_body_md5: String,
    receipt_handle: Option<String>,
}

impl PublishMessageResponse {
    pub fn new(raw: HttpResponse) -> Self {
        Self {
            raw,
            state: ParseState::Unparsed,
            message_id: String::new(),
            message_body_md5: String::new(),
            receipt_handle: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.raw.status == 201
    }

    pub fn raw(&self) -> &HttpResponse {
        &self.raw
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn message_body_md5(&self) -> &str {
        &self.message_body_md5
    }

    /// Present only for transactional (half message) publishes; use it to
    /// commit or roll back.
    pub fn receipt_handle(&self) -> Option<&str> {
        self.receipt_handle.as_deref()
    }

    pub fn decode(&mut self) -> Result<()> {
        if self.state == ParseState::Parsed {
            return Ok(());
        }
        if let Err(e) = self.parse() {
            self.state = ParseState::Failed;
            return Err(e);
        }
        self.state = ParseState::Parsed;
        Ok(())
    }

    fn parse(&mut self) -> Result<()> {
        let root = xml::parse_document(&self.raw.body)?;
        if !self.is_success() {
            return Err(xml::common_error(&root, self.raw.status, &self.raw.body));
        }
        self.message_id = root.child_text(MESSAGE_ID).unwrap_or_default().to_string();
        self.message_body_md5 = root.child_text(MESSAGE_BODY_MD5).unwrap_or_default().to_string();
        self.receipt_handle = root
            .child_text(RECEIPT_HANDLE)
            .filter(|h| !h.is_empty())
            .map(str::to_string);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MqError;

    fn response(status: u16, body: &str) -> PublishMessageResponse {
        PublishMessageResponse::new(HttpResponse {
            status,
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
        })
    }

    #[test]
    fn body_contains_tagged_message_under_namespace() {
        let req = PublishMessageRequest::new("orders", &TopicMessage::new("hello").with_tag("t1")).unwrap();
        let body = req.body();
        assert!(body.contains(r#"<Message xmlns="http://mq.aliyuncs.com/doc/v1">"#));
        assert!(body.contains("<MessageBody>hello</MessageBody><MessageTag>t1</MessageTag>"));
        assert!(!body.contains("Properties"));
        assert_eq!(req.query_string(), "");
    }

    #[test]
    fn properties_are_serialized() {
        let mut message = TopicMessage::new("b");
        message.set_message_key("k1");
        message.put_property("a", "1");
        let req = PublishMessageRequest::new("orders", &message).unwrap().with_instance_id("inst");
        assert!(req.body().contains("<Properties>KEYS:k1|a:1|</Properties>"));
        assert_eq!(req.query_string(), "ns=inst");
    }

    #[test]
    fn forbidden_property_character_is_rejected() {
        let mut message = TopicMessage::new("b");
        message.put_property("url", "http://x");
        let err = PublishMessageRequest::new("orders", &message).unwrap_err();
        assert!(matches!(err, MqError::Client { .. }));
    }

    #[test]
    fn decodes_created() {
        let mut resp = response(
            201,
            "<Message><MessageId>M1</MessageId><MessageBodyMD5>ABC</MessageBodyMD5></Message>",
        );
        resp.decode().unwrap();
        assert_eq!(resp.message_id(), "M1");
        assert_eq!(resp.message_body_md5(), "ABC");
        assert_eq!(resp.receipt_handle(), None);
    }

    #[test]
    fn decodes_half_message_receipt_handle() {
        let mut resp = response(
            201,
            "<Message><MessageId>M1</MessageId><MessageBodyMD5>ABC</MessageBodyMD5><ReceiptHandle>RH</ReceiptHandle></Message>",
        );
        resp.decode().unwrap();
        assert_eq!(resp.receipt_handle(), Some("RH"));
    }

    #[test]
    fn error_status_raises_server_error() {
        let mut resp = response(
            403,
            "<Error><Code>AccessDenied</Code><Message>no</Message><RequestId>R</RequestId><HostId>H</HostId></Error>",
        );
        let err = resp.decode().unwrap_err();
        assert_eq!(err.error_info().map(|i| i.http_status), Some(403));
        assert_eq!(resp.state(), ParseState::Failed);
    }
}
