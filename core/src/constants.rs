//! Wire-level constants: header names, fixed header values, XML tags and
//! reserved message property keys.

pub const HOST: &str = "Host";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_MD5: &str = "Content-MD5";
pub const DATE: &str = "Date";
pub const AUTHORIZATION: &str = "Authorization";
pub const USER_AGENT: &str = "User-Agent";
pub const SECURITY_TOKEN: &str = "security-token";
pub const MQ_VERSION: &str = "x-mq-version";

/// Headers whose lower-cased name starts with this prefix are signed.
pub const MQ_HEADER_PREFIX: &str = "x-mq-";

pub const CURRENT_VERSION: &str = "2015-06-06";
pub const DEFAULT_CONTENT_TYPE: &str = "text/xml;charset=UTF-8";
pub const AUTHORIZATION_SCHEME: &str = "MQ";
pub const AGENT: &str = concat!("mq-rust-sdk/", env!("CARGO_PKG_VERSION"));

pub const XML_NAMESPACE: &str = "http://mq.aliyuncs.com/doc/v1";
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

// XML element names.
pub const ERROR_TAG: &str = "Error";
pub const CODE: &str = "Code";
pub const MESSAGE: &str = "Message";
pub const REQUEST_ID: &str = "RequestId";
pub const HOST_ID: &str = "HostId";
pub const ERROR_CODE: &str = "ErrorCode";
pub const ERROR_MESSAGE: &str = "ErrorMessage";
pub const MESSAGE_ID: &str = "MessageId";
pub const MESSAGE_BODY: &str = "MessageBody";
pub const MESSAGE_BODY_MD5: &str = "MessageBodyMD5";
pub const MESSAGE_TAG: &str = "MessageTag";
pub const MESSAGE_PROPERTIES: &str = "Properties";
pub const RECEIPT_HANDLE: &str = "ReceiptHandle";
pub const RECEIPT_HANDLES: &str = "ReceiptHandles";
pub const PUBLISH_TIME: &str = "PublishTime";
pub const FIRST_CONSUME_TIME: &str = "FirstConsumeTime";
pub const NEXT_CONSUME_TIME: &str = "NextConsumeTime";
pub const CONSUMED_TIMES: &str = "ConsumedTimes";

// Reserved message properties.
pub const PROP_KEYS: &str = "KEYS";
pub const PROP_TRANS_CHECK: &str = "__TransCheckT";
pub const PROP_START_DELIVER_TIME: &str = "__STARTDELIVERTIME";
pub const PROP_SHARDING_KEY: &str = "__SHARDINGKEY";

// Service error codes callers commonly match on.
pub const TOPIC_NOT_EXIST: &str = "TopicNotExist";
pub const SUBSCRIPTION_NOT_EXIST: &str = "SubscriptionNotExist";
pub const MESSAGE_NOT_EXIST: &str = "MessageNotExist";
pub const STATE_CONFLICT: &str = "StateConflict";
pub const REQUEST_TIMEOUT: &str = "RequestTimeout";
