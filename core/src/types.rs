//! Domain types exchanged with the message-queue service.
//!
//! # Design
//! `Message` is what the service delivers. It is only ever built by the
//! codec from a response payload and is read-only afterwards, so its fields
//! are crate-private behind getters. Outgoing messages use the separate,
//! mutable `TopicMessage` builder.

use std::collections::BTreeMap;

use crate::constants::{PROP_KEYS, PROP_SHARDING_KEY, PROP_START_DELIVER_TIME, PROP_TRANS_CHECK};

/// A message delivered by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub(crate) message_id: String,
    pub(crate) receipt_handle: String,
    pub(crate) body: String,
    pub(crate) body_md5: String,
    pub(crate) tag: String,
    pub(crate) properties: BTreeMap<String, String>,
    pub(crate) publish_time: Option<i64>,
    pub(crate) first_consume_time: Option<i64>,
    pub(crate) next_consume_time: Option<i64>,
    pub(crate) consumed_times: Option<u32>,
}

impl Message {
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Token used to acknowledge (or commit/rollback) this delivery.
    pub fn receipt_handle(&self) -> &str {
        &self.receipt_handle
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn body_md5(&self) -> &str {
        &self.body_md5
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Publish time in epoch milliseconds.
    pub fn publish_time(&self) -> Option<i64> {
        self.publish_time
    }

    pub fn first_consume_time(&self) -> Option<i64> {
        self.first_consume_time
    }

    /// When the message becomes visible again if it is not acknowledged.
    pub fn next_consume_time(&self) -> Option<i64> {
        self.next_consume_time
    }

    pub fn consumed_times(&self) -> Option<u32> {
        self.consumed_times
    }

    pub fn message_key(&self) -> Option<&str> {
        self.property(PROP_KEYS)
    }

    pub fn start_deliver_time(&self) -> Option<i64> {
        self.property(PROP_START_DELIVER_TIME)?.parse().ok()
    }

    pub fn trans_check_immunity_time(&self) -> Option<u32> {
        self.property(PROP_TRANS_CHECK)?.parse().ok()
    }

    pub fn sharding_key(&self) -> Option<&str> {
        self.property(PROP_SHARDING_KEY)
    }
}

/// Builder for a message to publish.
///
/// Property keys and values are validated when the publish request is built,
/// not when they are set here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicMessage {
    body: String,
    tag: Option<String>,
    properties: BTreeMap<String, String>,
}

impl TopicMessage {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.tag = Some(tag.into());
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn put_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn set_message_key(&mut self, key: impl Into<String>) {
        self.put_property(PROP_KEYS, key);
    }

    /// Deliver no earlier than `millis` (epoch milliseconds).
    pub fn set_start_deliver_time(&mut self, millis: i64) {
        self.put_property(PROP_START_DELIVER_TIME, millis.to_string());
    }

    /// Seconds before the service first checks the transaction status of a
    /// half message. Setting this makes a publish transactional.
    pub fn set_trans_check_immunity_time(&mut self, seconds: u32) {
        self.put_property(PROP_TRANS_CHECK, seconds.to_string());
    }

    /// Partition key for ordered topics.
    pub fn set_sharding_key(&mut self, key: impl Into<String>) {
        self.put_property(PROP_SHARDING_KEY, key);
    }
}

/// One receipt handle the service refused to acknowledge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AckFailure {
    pub receipt_handle: String,
    pub error_code: String,
    pub error_message: String,
}
