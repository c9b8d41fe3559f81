//! Message property string codec.
//!
//! Properties travel as a single text element: `key:value|key:value|`.
//! Keys and values must not contain any of the delimiter or XML-sensitive
//! characters, so the encoder refuses them outright.

use std::collections::BTreeMap;

use crate::error::{MqError, Result};

const FORBIDDEN: &[char] = &['&', '"', '\'', '<', '>', ':', '|'];

/// True if `s` contains a character that cannot appear in a property.
pub fn contains_forbidden(s: &str) -> bool {
    s.contains(FORBIDDEN)
}

/// Serialize a property map, rejecting forbidden characters.
pub fn encode(properties: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::new();
    for (key, value) in properties {
        if contains_forbidden(key) || contains_forbidden(value) {
            return Err(MqError::client(format!(
                "message property [{key}:{value}] can't contain: & \" ' < > : |"
            )));
        }
        out.push_str(key);
        out.push(':');
        out.push_str(value);
        out.push('|');
    }
    Ok(out)
}

/// Parse a property string received from the service.
///
/// Each `|`-terminated segment is split on its first `:`. A segment with no
/// `:` becomes a key with an empty value; empty segments are skipped.
pub fn decode(raw: &str) -> BTreeMap<String, String> {
    raw.split('|')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once(':') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (segment.to_string(), String::new()),
        })
        .collect()
}
