//! In-memory message-queue service speaking the XML-over-HTTP protocol.
//!
//! # Design
//! Every topic (scoped by its `ns` instance id) keeps a ready queue, the
//! messages currently on loan keyed by receipt handle, and the transactional
//! half messages waiting for commit or rollback. All state sits behind one
//! async mutex; handlers hold it only while touching the queues, never across
//! a long-poll sleep.
//!
//! Authentication is checked for shape only (`MQ <id>:<signature>`). Topics
//! whose name starts with `missing` do not exist.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use md5::{Digest, Md5};
use quick_xml::{escape::escape, events::Event, Reader};
use serde::Deserialize;
use tokio::{net::TcpListener, sync::Mutex};
use uuid::Uuid;

pub const NAMESPACE: &str = "http://mq.aliyuncs.com/doc/v1";
const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const CONTENT_TYPE: &str = "text/xml;charset=UTF-8";
const HOST_ID: &str = "mock-server";
const TRANS_CHECK_PROPERTY: &str = "__TransCheckT";
const INVISIBLE_MILLIS: i64 = 300_000;
const MAX_BATCH: u32 = 16;
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Clone, Debug)]
pub struct StoredMessage {
    pub id: String,
    pub body: String,
    pub body_md5: String,
    pub tag: String,
    pub properties: String,
    pub publish_time: i64,
    pub first_consume_time: Option<i64>,
    pub next_consume_time: i64,
    pub consumed_times: u32,
}

/// Messages leased by a consume come back to `ready` once their
/// `next_consume_time` passes without an ack; the old handle is then dead.
#[derive(Default)]
struct Topic {
    ready: VecDeque<StoredMessage>,
    in_flight: HashMap<String, StoredMessage>,
    half: Vec<(String, StoredMessage)>,
}

type Db = Arc<Mutex<HashMap<String, Topic>>>;

#[derive(Debug, Deserialize)]
pub struct ConsumeParams {
    pub consumer: String,
    #[serde(rename = "numOfMessages")]
    pub num_of_messages: u32,
    pub ns: Option<String>,
    pub waitseconds: Option<u64>,
    pub tag: Option<String>,
    pub trans: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AckParams {
    pub consumer: String,
    pub ns: Option<String>,
    pub trans: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PublishParams {
    pub ns: Option<String>,
}

pub fn app() -> Router {
    let db: Db = Arc::default();
    Router::new()
        .route(
            "/topics/{topic}/messages",
            get(consume_messages).post(publish_message).delete(ack_messages),
        )
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn consume_messages(
    State(db): State<Db>,
    Path(topic): Path<String>,
    Query(params): Query<ConsumeParams>,
    headers: HeaderMap,
) -> Response {
    if let Err(rejection) = precheck(&headers, &topic) {
        return rejection;
    }
    let key = topic_key(params.ns.as_deref(), &topic);
    let wait = Duration::from_secs(params.waitseconds.unwrap_or(0));
    let deadline = tokio::time::Instant::now() + wait;

    loop {
        let batch = {
            let mut topics = db.lock().await;
            take_batch(topics.entry(key.clone()).or_default(), &params, now_millis())
        };
        if !batch.is_empty() {
            tracing::info!(topic = %key, consumer = %params.consumer, count = batch.len(), "messages consumed");
            let mut body = format!(r#"{XML_DECLARATION}<Messages xmlns="{NAMESPACE}">"#);
            for (handle, message) in &batch {
                body.push_str(&message_xml(handle, message));
            }
            body.push_str("</Messages>");
            return xml_response(StatusCode::OK, body);
        }
        if tokio::time::Instant::now() >= deadline {
            return error_response(StatusCode::NOT_FOUND, "MessageNotExist", "Message not exist.");
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn publish_message(
    State(db): State<Db>,
    Path(topic): Path<String>,
    Query(params): Query<PublishParams>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Err(rejection) = precheck(&headers, &topic) {
        return rejection;
    }
    let elements = match element_texts(&body) {
        Ok(elements) => elements,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, "InvalidArgument", &e),
    };
    let Some(message_body) = find(&elements, "MessageBody") else {
        return error_response(StatusCode::BAD_REQUEST, "InvalidArgument", "MessageBody is required.");
    };
    let properties = find(&elements, "Properties").unwrap_or_default().to_string();

    let message = StoredMessage {
        id: new_id(),
        body_md5: hex::encode_upper(Md5::digest(message_body.as_bytes())),
        body: message_body.to_string(),
        tag: find(&elements, "MessageTag").unwrap_or_default().to_string(),
        publish_time: now_millis(),
        first_consume_time: None,
        next_consume_time: 0,
        consumed_times: 0,
        properties,
    };

    let key = topic_key(params.ns.as_deref(), &topic);
    let mut out = format!(
        r#"{XML_DECLARATION}<Message xmlns="{NAMESPACE}"><MessageId>{}</MessageId><MessageBodyMD5>{}</MessageBodyMD5>"#,
        message.id, message.body_md5
    );
    let mut topics = db.lock().await;
    let entry = topics.entry(key.clone()).or_default();
    if is_half_message(&message.properties) {
        let handle = new_handle();
        out.push_str(&format!("<ReceiptHandle>{handle}</ReceiptHandle>"));
        tracing::info!(topic = %key, message_id = %message.id, "half message published");
        entry.half.push((handle, message));
    } else {
        tracing::info!(topic = %key, message_id = %message.id, "message published");
        entry.ready.push_back(message);
    }
    out.push_str("</Message>");
    xml_response(StatusCode::CREATED, out)
}

async fn ack_messages(
    State(db): State<Db>,
    Path(topic): Path<String>,
    Query(params): Query<AckParams>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Err(rejection) = precheck(&headers, &topic) {
        return rejection;
    }
    let handles: Vec<String> = match element_texts(&body) {
        Ok(elements) => elements
            .into_iter()
            .filter(|(name, _)| name == "ReceiptHandle")
            .map(|(_, text)| text)
            .collect(),
        Err(e) => return error_response(StatusCode::BAD_REQUEST, "InvalidArgument", &e),
    };
    if handles.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "InvalidArgument", "ReceiptHandles is empty.");
    }

    let key = topic_key(params.ns.as_deref(), &topic);
    let mut topics = db.lock().await;
    let entry = topics.entry(key.clone()).or_default();
    let mut failed = Vec::new();
    for handle in handles {
        let resolved = match params.trans.as_deref() {
            Some("commit") => match take_half(entry, &handle) {
                Some(mut message) => {
                    message.first_consume_time = None;
                    message.consumed_times = 0;
                    entry.ready.push_back(message);
                    true
                }
                None => false,
            },
            Some("rollback") => take_half(entry, &handle).is_some(),
            _ => entry.in_flight.remove(&handle).is_some(),
        };
        if !resolved {
            failed.push(handle);
        }
    }
    tracing::info!(topic = %key, consumer = %params.consumer, failed = failed.len(), "messages acknowledged");

    if failed.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }
    let mut out = format!(r#"{XML_DECLARATION}<Errors xmlns="{NAMESPACE}">"#);
    for handle in &failed {
        out.push_str(&format!(
            "<Error><ErrorCode>ReceiptHandleError</ErrorCode><ErrorMessage>The receipt handle you provide is not valid.</ErrorMessage><ReceiptHandle>{}</ReceiptHandle></Error>",
            escape(handle.as_str())
        ));
    }
    out.push_str("</Errors>");
    xml_response(StatusCode::NOT_FOUND, out)
}

fn take_batch(topic: &mut Topic, params: &ConsumeParams, now: i64) -> Vec<(String, StoredMessage)> {
    let limit = params.num_of_messages.clamp(1, MAX_BATCH) as usize;
    if params.trans.as_deref() == Some("pop") {
        return topic
            .half
            .iter_mut()
            .take(limit)
            .map(|(handle, message)| {
                mark_consumed(message, now);
                (handle.clone(), message.clone())
            })
            .collect();
    }

    requeue_expired(topic, now);
    let mut batch = Vec::new();
    let mut index = 0;
    while batch.len() < limit && index < topic.ready.len() {
        if !tag_matches(params.tag.as_deref(), &topic.ready[index].tag) {
            index += 1;
            continue;
        }
        if let Some(mut message) = topic.ready.remove(index) {
            mark_consumed(&mut message, now);
            let handle = new_handle();
            topic.in_flight.insert(handle.clone(), message.clone());
            batch.push((handle, message));
        }
    }
    batch
}

fn requeue_expired(topic: &mut Topic, now: i64) {
    let expired: Vec<String> = topic
        .in_flight
        .iter()
        .filter(|(_, message)| message.next_consume_time <= now)
        .map(|(handle, _)| handle.clone())
        .collect();
    let mut returned: Vec<StoredMessage> = expired
        .iter()
        .filter_map(|handle| topic.in_flight.remove(handle))
        .collect();
    returned.sort_by_key(|message| std::cmp::Reverse(message.publish_time));
    for message in returned {
        topic.ready.push_front(message);
    }
}

fn take_half(topic: &mut Topic, handle: &str) -> Option<StoredMessage> {
    let index = topic.half.iter().position(|(h, _)| h == handle)?;
    Some(topic.half.remove(index).1)
}

fn mark_consumed(message: &mut StoredMessage, now: i64) {
    message.consumed_times += 1;
    message.first_consume_time.get_or_insert(now);
    message.next_consume_time = now + INVISIBLE_MILLIS;
}

/// `a||b` matches either tag; no filter matches everything.
pub fn tag_matches(filter: Option<&str>, tag: &str) -> bool {
    match filter.map(str::trim) {
        None | Some("") => true,
        Some(filter) => filter.split("||").any(|t| t.trim() == tag),
    }
}

pub fn is_half_message(properties: &str) -> bool {
    properties
        .split('|')
        .filter_map(|entry| entry.split_once(':'))
        .any(|(key, _)| key == TRANS_CHECK_PROPERTY)
}

/// Accepts any `MQ <id>:<signature>` value with both parts non-empty.
pub fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("MQ "))
        .and_then(|credential| credential.split_once(':'))
        .is_some_and(|(id, signature)| !id.is_empty() && !signature.is_empty())
}

#[allow(clippy::result_large_err)]
fn precheck(headers: &HeaderMap, topic: &str) -> Result<(), Response> {
    if !authorized(headers) {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "AccessDenied",
            "The request signature is missing or malformed.",
        ));
    }
    if topic.starts_with("missing") {
        return Err(error_response(
            StatusCode::NOT_FOUND,
            "TopicNotExist",
            "The topic you provided does not exist.",
        ));
    }
    Ok(())
}

/// Name and text of every element in document order of closing.
pub fn element_texts(body: &str) -> Result<Vec<(String, String)>, String> {
    let mut reader = Reader::from_str(body);
    let mut open: Vec<(String, String)> = Vec::new();
    let mut closed = Vec::new();
    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(start) => open.push((String::from_utf8_lossy(start.local_name().as_ref()).into_owned(), String::new())),
            Event::Empty(start) => closed.push((String::from_utf8_lossy(start.local_name().as_ref()).into_owned(), String::new())),
            Event::Text(text) => {
                if let Some((_, current)) = open.last_mut() {
                    current.push_str(&text.unescape().map_err(|e| e.to_string())?);
                }
            }
            Event::CData(data) => {
                if let Some((_, current)) = open.last_mut() {
                    current.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                let element = open.pop().ok_or_else(|| "unbalanced end tag".to_string())?;
                closed.push(element);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if !open.is_empty() || closed.is_empty() {
        return Err("document is incomplete".to_string());
    }
    Ok(closed)
}

fn find<'a>(elements: &'a [(String, String)], name: &str) -> Option<&'a str> {
    elements.iter().find(|(n, _)| n == name).map(|(_, text)| text.as_str())
}

fn message_xml(handle: &str, message: &StoredMessage) -> String {
    let mut out = format!(
        "<Message><MessageId>{}</MessageId><ReceiptHandle>{}</ReceiptHandle><MessageBody>{}</MessageBody><MessageBodyMD5>{}</MessageBodyMD5>",
        message.id,
        escape(handle),
        escape(message.body.as_str()),
        message.body_md5
    );
    if !message.tag.is_empty() {
        out.push_str(&format!("<MessageTag>{}</MessageTag>", escape(message.tag.as_str())));
    }
    let first = message.first_consume_time.unwrap_or(message.publish_time);
    out.push_str(&format!(
        "<PublishTime>{}</PublishTime><FirstConsumeTime>{}</FirstConsumeTime><NextConsumeTime>{}</NextConsumeTime><ConsumedTimes>{}</ConsumedTimes>",
        message.publish_time,
        first,
        message.next_consume_time,
        message.consumed_times
    ));
    if !message.properties.is_empty() {
        out.push_str(&format!("<Properties>{}</Properties>", escape(message.properties.as_str())));
    }
    out.push_str("</Message>");
    out
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    let body = format!(
        r#"{XML_DECLARATION}<Error xmlns="{NAMESPACE}"><Code>{}</Code><Message>{}</Message><RequestId>{}</RequestId><HostId>{HOST_ID}</HostId></Error>"#,
        escape(code),
        escape(message),
        new_id()
    );
    tracing::debug!(status = status.as_u16(), code, "error response");
    xml_response(status, body)
}

fn xml_response(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response()
}

fn topic_key(ns: Option<&str>, topic: &str) -> String {
    match ns.filter(|ns| !ns.is_empty()) {
        Some(ns) => format!("{ns}/{topic}"),
        None => topic.to_string(),
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string().to_uppercase()
}

fn new_handle() -> String {
    format!("RH-{}", Uuid::new_v4().simple())
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
