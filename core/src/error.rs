//! Error types for the message-queue client.
//!
//! # Design
//! Callers need to tell three failure sources apart when deciding whether to
//! retry: the client itself (bad input, unreadable response), the service
//! (a structured `<Error>` payload), and the transport (socket, timeout).
//! Each gets its own variant. Pool timeouts and pool shutdown are client-side
//! conditions but keep dedicated variants so they can be matched directly.
//!
//! Per-handle acknowledgement failures are NOT errors; they are data on a
//! successful `AckMessageResponse`.

use std::fmt;
use std::time::Duration;

/// Structured error payload returned by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    pub request_id: String,
    pub host_id: String,
    pub http_status: u16,
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HTTP {} {}: {} (request id: {}, host id: {})",
            self.http_status, self.code, self.message, self.request_id, self.host_id
        )
    }
}

/// Errors returned by every client operation.
#[derive(Debug, thiserror::Error)]
pub enum MqError {
    /// Malformed outgoing data or an unexpected/unparseable response payload.
    #[error("client error: {message}")]
    Client { message: String },

    /// The service answered with a structured error payload.
    #[error("server error: {0}")]
    Server(ErrorInfo),

    /// Connection, timeout or socket failure reported by the HTTP stack.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// No pooled connection became available before the connect timeout.
    #[error("connection pool exhausted after waiting {waited:?}")]
    PoolExhausted { waited: Duration },

    /// The client was shut down.
    #[error("connection pool is closed")]
    PoolClosed,
}

impl MqError {
    pub(crate) fn client(message: impl Into<String>) -> Self {
        MqError::Client {
            message: message.into(),
        }
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        MqError::Transport {
            message: message.into(),
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            MqError::Client { .. } | MqError::PoolExhausted { .. } | MqError::PoolClosed
        )
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, MqError::Server(_))
    }

    pub fn is_transport_error(&self) -> bool {
        matches!(self, MqError::Transport { .. })
    }

    /// The service error payload, if this is a server error.
    pub fn error_info(&self) -> Option<&ErrorInfo> {
        match self {
            MqError::Server(info) => Some(info),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MqError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_matches_variant() {
        assert!(MqError::client("bad").is_client_error());
        assert!(MqError::PoolClosed.is_client_error());
        assert!(MqError::PoolExhausted {
            waited: Duration::from_secs(1)
        }
        .is_client_error());
        assert!(MqError::transport("reset").is_transport_error());

        let server = MqError::Server(ErrorInfo {
            code: "TopicNotExist".to_string(),
            http_status: 404,
            ..Default::default()
        });
        assert!(server.is_server_error());
        assert!(!server.is_client_error());
        assert_eq!(server.error_info().map(|i| i.code.as_str()), Some("TopicNotExist"));
    }

    #[test]
    fn display_includes_code_and_request_id() {
        let info = ErrorInfo {
            code: "InternalError".to_string(),
            message: "boom".to_string(),
            request_id: "req-1".to_string(),
            host_id: "host".to_string(),
            http_status: 500,
        };
        let text = MqError::Server(info).to_string();
        assert!(text.contains("InternalError"));
        assert!(text.contains("req-1"));
        assert!(text.contains("500"));
    }
}
