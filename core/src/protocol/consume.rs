//! ConsumeMessage: `GET /topics/{topic}/messages`.

use crate::constants::{
    CONSUMED_TIMES, FIRST_CONSUME_TIME, MESSAGE, MESSAGE_BODY, MESSAGE_BODY_MD5, MESSAGE_ID,
    MESSAGE_PROPERTIES, MESSAGE_TAG, NEXT_CONSUME_TIME, PUBLISH_TIME, RECEIPT_HANDLE,
};
use crate::error::{MqError, Result};
use crate::http::HttpResponse;
use crate::properties;
use crate::protocol::xml::{self, Element};
use crate::protocol::{non_empty, ParseState};
use crate::types::Message;

/// Which queue a consume call reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumeMode {
    #[default]
    Normal,
    /// Ordered consumption (`trans=order`).
    Orderly,
    /// Peek transactional half messages (`trans=pop`).
    HalfMessage,
}

impl ConsumeMode {
    fn trans(&self) -> Option<&'static str> {
        match self {
            ConsumeMode::Normal => None,
            ConsumeMode::Orderly => Some("order"),
            ConsumeMode::HalfMessage => Some("pop"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeMessageRequest {
    topic: String,
    consumer: String,
    batch_size: u32,
    instance_id: Option<String>,
    wait_seconds: Option<u32>,
    tag: Option<String>,
    mode: ConsumeMode,
}

impl ConsumeMessageRequest {
    pub fn new(topic: impl Into<String>, consumer: impl Into<String>, batch_size: u32) -> Self {
        Self {
            topic: topic.into(),
            consumer: consumer.into(),
            batch_size,
            instance_id: None,
            wait_seconds: None,
            tag: None,
            mode: ConsumeMode::Normal,
        }
    }

    /// Namespace (instance) the topic lives in.
    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    /// Long-poll for up to `seconds` when nothing is available. Zero disables
    /// long polling.
    pub fn with_wait_seconds(mut self, seconds: u32) -> Self {
        self.wait_seconds = Some(seconds);
        self
    }

    /// Only receive messages carrying `tag`. The filter is URL-encoded here
    /// because the query string itself is never escaped.
    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = Some(encode_tag(tag));
        self
    }

    pub fn with_mode(mut self, mode: ConsumeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn mode(&self) -> ConsumeMode {
        self.mode
    }

    pub(crate) fn query_string(&self) -> String {
        let mut query = format!("consumer={}&numOfMessages={}", self.consumer, self.batch_size);
        if let Some(ns) = non_empty(&self.instance_id) {
            query.push_str("&ns=");
            query.push_str(ns);
        }
        if let Some(wait) = self.wait_seconds.filter(|w| *w > 0) {
            query.push_str(&format!("&waitseconds={wait}"));
        }
        if let Some(tag) = non_empty(&self.tag) {
            query.push_str("&tag=");
            query.push_str(tag);
        }
        if let Some(trans) = self.mode.trans() {
            query.push_str("&trans=");
            query.push_str(trans);
        }
        query
    }
}

#[derive(Debug, Clone)]
pub struct ConsumeMessageResponse {
    raw: HttpResponse,
    state: ParseState,
    messages: Vec<Message>,
}

impl ConsumeMessageResponse {
    pub fn new(raw: HttpResponse) -> Self {
        Self {
            raw,
            state: ParseState::Unparsed,
            messages: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.raw.status == 200
    }

    pub fn raw(&self) -> &HttpResponse {
        &self.raw
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Messages in document order. Empty until decoded.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn decode(&mut self) -> Result<()> {
        if self.state == ParseState::Parsed {
            return Ok(());
        }
        match self.parse() {
            Ok(messages) => {
                self.messages = messages;
                self.state = ParseState::Parsed;
                Ok(())
            }
            Err(e) => {
                self.state = ParseState::Failed;
                Err(e)
            }
        }
    }

    fn parse(&self) -> Result<Vec<Message>> {
        let root = xml::parse_document(&self.raw.body)?;
        if !self.is_success() {
            return Err(xml::common_error(&root, self.raw.status, &self.raw.body));
        }
        root.children_named(MESSAGE).map(message_from_xml).collect()
    }
}

fn message_from_xml(node: &Element) -> Result<Message> {
    let mut message = Message::default();
    for child in &node.children {
        let text = child.text.as_str();
        match child.name.as_str() {
            MESSAGE_ID => message.message_id = text.to_string(),
            RECEIPT_HANDLE => message.receipt_handle = text.to_string(),
            MESSAGE_BODY => message.body = text.to_string(),
            MESSAGE_BODY_MD5 => message.body_md5 = text.to_string(),
            MESSAGE_TAG => message.tag = text.to_string(),
            PUBLISH_TIME => message.publish_time = number(PUBLISH_TIME, text)?,
            FIRST_CONSUME_TIME => message.first_consume_time = number(FIRST_CONSUME_TIME, text)?,
            NEXT_CONSUME_TIME => message.next_consume_time = number(NEXT_CONSUME_TIME, text)?,
            CONSUMED_TIMES => message.consumed_times = number(CONSUMED_TIMES, text)?,
            MESSAGE_PROPERTIES => message.properties = properties::decode(text),
            _ => {}
        }
    }
    Ok(message)
}

/// Form encoding with the service's unreserved set: alphanumerics and
/// `-_.~` stay literal, space becomes `+`, every other byte is `%XX`.
fn encode_tag(tag: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(tag.as_bytes()).collect();
    encoded.replace('*', "%2A").replace("%7E", "~")
}

/// Blank text reads as absent; anything else must parse.
fn number<T: std::str::FromStr>(field: &str, text: &str) -> Result<Option<T>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse()
        .map(Some)
        .map_err(|_| MqError::client(format!("invalid {field} in message: {text:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> ConsumeMessageResponse {
        ConsumeMessageResponse::new(HttpResponse {
            status,
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
        })
    }

    #[test]
    fn query_with_all_options_in_fixed_order() {
        let req = ConsumeMessageRequest::new("orders", "GID_a", 3)
            .with_instance_id("MQ_INST_1")
            .with_wait_seconds(10)
            .with_tag("t1 t2")
            .with_mode(ConsumeMode::Orderly);
        assert_eq!(
            req.query_string(),
            "consumer=GID_a&numOfMessages=3&ns=MQ_INST_1&waitseconds=10&tag=t1+t2&trans=order"
        );
    }

    #[test]
    fn query_omits_unset_and_zero_options() {
        let req = ConsumeMessageRequest::new("orders", "GID_a", 1)
            .with_instance_id("")
            .with_wait_seconds(0);
        assert_eq!(req.query_string(), "consumer=GID_a&numOfMessages=1");
    }

    #[test]
    fn half_message_mode_uses_pop() {
        let req = ConsumeMessageRequest::new("t", "GID", 16).with_mode(ConsumeMode::HalfMessage);
        assert!(req.query_string().ends_with("&trans=pop"));
    }

    #[test]
    fn tag_filter_is_url_encoded() {
        let req = ConsumeMessageRequest::new("t", "GID", 1).with_tag("a||b");
        assert!(req.query_string().ends_with("&tag=a%7C%7Cb"));
    }

    #[test]
    fn tag_filter_keeps_tilde_and_escapes_star() {
        let req = ConsumeMessageRequest::new("t", "GID", 1).with_tag("a~b*c d-_.");
        assert!(req.query_string().ends_with("&tag=a~b%2Ac+d-_."));
    }

    #[test]
    fn decodes_one_message_with_every_field() {
        let mut resp = response(
            200,
            "<Messages><Message>\
             <MessageId>M1</MessageId><ReceiptHandle>RH1</ReceiptHandle>\
             <MessageBody>hello</MessageBody><MessageBodyMD5>5D41402ABC4B2A76B9719D911017C592</MessageBodyMD5>\
             <MessageTag>t1</MessageTag><PublishTime>1000</PublishTime>\
             <FirstConsumeTime>2000</FirstConsumeTime><NextConsumeTime>3000</NextConsumeTime>\
             <ConsumedTimes>1</ConsumedTimes><Properties>KEYS:k1|a:b|</Properties>\
             </Message></Messages>",
        );
        resp.decode().unwrap();
        assert_eq!(resp.state(), ParseState::Parsed);
        let messages = resp.messages();
        assert_eq!(messages.len(), 1);
        let m = &messages[0];
        assert_eq!(m.message_id(), "M1");
        assert_eq!(m.receipt_handle(), "RH1");
        assert_eq!(m.body(), "hello");
        assert_eq!(m.body_md5(), "5D41402ABC4B2A76B9719D911017C592");
        assert_eq!(m.tag(), "t1");
        assert_eq!(m.publish_time(), Some(1000));
        assert_eq!(m.first_consume_time(), Some(2000));
        assert_eq!(m.next_consume_time(), Some(3000));
        assert_eq!(m.consumed_times(), Some(1));
        assert_eq!(m.message_key(), Some("k1"));
        assert_eq!(m.property("a"), Some("b"));
    }

    #[test]
    fn decode_is_idempotent_once_parsed() {
        let mut resp = response(200, "<Messages><Message><MessageId>M1</MessageId></Message></Messages>");
        resp.decode().unwrap();
        resp.decode().unwrap();
        assert_eq!(resp.messages().len(), 1);
    }

    #[test]
    fn server_error_on_500() {
        let mut resp = response(
            500,
            "<Error><Code>InternalError</Code><Message>x</Message><RequestId>R-9</RequestId><HostId>h</HostId></Error>",
        );
        let err = resp.decode().unwrap_err();
        assert_eq!(resp.state(), ParseState::Failed);
        let info = err.error_info().unwrap();
        assert_eq!(info.code, "InternalError");
        assert_eq!(info.request_id, "R-9");
        assert_eq!(info.http_status, 500);
    }

    #[test]
    fn non_numeric_time_is_client_error() {
        let mut resp = response(200, "<Messages><Message><PublishTime>soon</PublishTime></Message></Messages>");
        let err = resp.decode().unwrap_err();
        assert!(matches!(err, MqError::Client { .. }));
    }

    #[test]
    fn blank_numeric_fields_read_as_absent() {
        let mut resp = response(
            200,
            "<Messages><Message><MessageId>M</MessageId>\
             <FirstConsumeTime></FirstConsumeTime><ConsumedTimes> </ConsumedTimes>\
             <PublishTime>1000</PublishTime></Message></Messages>",
        );
        resp.decode().unwrap();
        let m = &resp.messages()[0];
        assert_eq!(m.message_id(), "M");
        assert_eq!(m.first_consume_time(), None);
        assert_eq!(m.consumed_times(), None);
        assert_eq!(m.publish_time(), Some(1000));
    }

    #[test]
    fn unparseable_success_body_is_client_error() {
        let mut resp = response(200, "");
        assert!(matches!(resp.decode().unwrap_err(), MqError::Client { .. }));
        assert_eq!(resp.state(), ParseState::Failed);
    }
}
