//! Request signing.
//!
//! The string to sign is
//!
//! ```text
//! METHOD \n
//! Content-MD5 \n
//! Content-Type \n
//! Date \n
//! x-mq-a:value \n      (every x-mq-* header, lower-cased key, sorted)
//! canonical resource
//! ```
//!
//! signed with HMAC-SHA1 under the access key and base64-encoded. Headers
//! outside the fixed three and the `x-mq-` prefix never reach the digest.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::constants::{AUTHORIZATION_SCHEME, CONTENT_MD5, CONTENT_TYPE, DATE, MQ_HEADER_PREFIX};
use crate::error::{MqError, Result};
use crate::http::HttpMethod;

type HmacSha1 = Hmac<Sha1>;

/// Build the canonical string for `method`, `canonical_resource` and the
/// signed subset of `headers`.
pub fn string_to_sign(
    method: HttpMethod,
    canonical_resource: &str,
    headers: &BTreeMap<String, String>,
) -> String {
    let mut mq_headers: Vec<(String, &str)> = headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
        .filter(|(k, _)| k.starts_with(MQ_HEADER_PREFIX))
        .collect();
    mq_headers.sort();

    let mut out = String::new();
    for part in [
        method.as_str(),
        header_value(headers, CONTENT_MD5),
        header_value(headers, CONTENT_TYPE),
        header_value(headers, DATE),
    ] {
        out.push_str(part);
        out.push('\n');
    }
    for (key, value) in mq_headers {
        out.push_str(&key);
        out.push(':');
        out.push_str(value);
        out.push('\n');
    }
    out.push_str(canonical_resource);
    out
}

fn header_value<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> &'a str {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
        .unwrap_or_default()
}

/// Base64 HMAC-SHA1 of `data` under `access_key`.
pub fn sign(data: &str, access_key: &str) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(access_key.as_bytes())
        .map_err(|_| MqError::client("invalid access key length"))?;
    mac.update(data.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Value for the `Authorization` header: `MQ <accessId>:<signature>`.
pub fn authorization(
    method: HttpMethod,
    canonical_resource: &str,
    access_id: &str,
    access_key: &str,
    headers: &BTreeMap<String, String>,
) -> Result<String> {
    let signature = sign(&string_to_sign(method, canonical_resource, headers), access_key)?;
    Ok(format!("{AUTHORIZATION_SCHEME} {access_id}:{signature}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn base_headers() -> BTreeMap<String, String> {
        headers(&[
            ("Content-Type", "text/xml;charset=UTF-8"),
            ("Date", "Thu, 17 Oct 2024 08:00:00 GMT"),
            ("x-mq-version", "2015-06-06"),
            ("Host", "example.mq.test"),
        ])
    }

    const RESOURCE: &str = "/topics/orders/messages?consumer=GID&numOfMessages=1";

    #[test]
    fn canonical_layout() {
        let s = string_to_sign(HttpMethod::Get, RESOURCE, &base_headers());
        assert_eq!(
            s,
            "GET\n\ntext/xml;charset=UTF-8\nThu, 17 Oct 2024 08:00:00 GMT\nx-mq-version:2015-06-06\n/topics/orders/messages?consumer=GID&numOfMessages=1"
        );
    }

    #[test]
    fn reserved_headers_are_sorted_and_lowercased() {
        let mut h = base_headers();
        h.insert("X-MQ-Zeta".to_string(), "z".to_string());
        h.insert("x-mq-alpha".to_string(), " a ".to_string());
        let s = string_to_sign(HttpMethod::Post, "/r", &h);
        assert!(s.contains("x-mq-alpha:a\nx-mq-version:2015-06-06\nx-mq-zeta:z\n/r"));
    }

    #[test]
    fn deterministic() {
        let a = authorization(HttpMethod::Get, RESOURCE, "id", "secret", &base_headers()).unwrap();
        let b = authorization(HttpMethod::Get, RESOURCE, "id", "secret", &base_headers()).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("MQ id:"));
    }

    #[test]
    fn method_reserved_header_and_resource_change_signature() {
        let base = authorization(HttpMethod::Get, RESOURCE, "id", "secret", &base_headers()).unwrap();

        let other_method = authorization(HttpMethod::Delete, RESOURCE, "id", "secret", &base_headers()).unwrap();
        assert_ne!(base, other_method);

        let mut h = base_headers();
        h.insert("x-mq-version".to_string(), "2099-01-01".to_string());
        assert_ne!(base, authorization(HttpMethod::Get, RESOURCE, "id", "secret", &h).unwrap());

        let mut h = base_headers();
        h.insert("Date".to_string(), "Fri, 18 Oct 2024 08:00:00 GMT".to_string());
        assert_ne!(base, authorization(HttpMethod::Get, RESOURCE, "id", "secret", &h).unwrap());

        assert_ne!(base, authorization(HttpMethod::Get, "/topics/other/messages", "id", "secret", &base_headers()).unwrap());
        assert_ne!(base, authorization(HttpMethod::Get, RESOURCE, "id", "other", &base_headers()).unwrap());
    }

    #[test]
    fn unreserved_headers_do_not_change_signature() {
        let base = authorization(HttpMethod::Get, RESOURCE, "id", "secret", &base_headers()).unwrap();
        let mut h = base_headers();
        h.insert("X-Custom".to_string(), "anything".to_string());
        h.insert("security-token".to_string(), "sts".to_string());
        h.insert("Host".to_string(), "elsewhere".to_string());
        assert_eq!(base, authorization(HttpMethod::Get, RESOURCE, "id", "secret", &h).unwrap());
    }
}
