use std::time::Duration;

use pipemux_frame::ProtocolType;
use uuid::Uuid;

/// Errors that can occur on a pipemux connection.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] pipemux_transport::TransportError),

    /// Packet-level error.
    #[error("frame error: {0}")]
    Frame(#[from] pipemux_frame::FrameError),

    /// A header record or body failed to (de)serialize.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A body read as text is not valid UTF-8.
    #[error("body is not valid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// No transport is attached.
    #[error("not connected")]
    NotConnected,

    /// A transport is already attached.
    #[error("already connected")]
    AlreadyConnected,

    /// `connect` needs a transport source and none was configured.
    #[error("no transport source configured")]
    NoTransportSource,

    /// A waiter for this request id is already pending.
    #[error("request id {0} already has a pending response")]
    DuplicateRequestId(Uuid),

    /// The exchange was abandoned, typically because the connection dropped.
    #[error("request cancelled")]
    Cancelled,

    /// The peer sent payloads that do not form a valid exchange.
    #[error("protocol violation: {0}")]
    Violation(String),

    /// The peer used a payload type this implementation does not handle.
    #[error("{} payloads are not supported", .0.name())]
    Unsupported(ProtocolType),

    /// A message carries more content feeds than feed ids can address.
    #[error("too many content feeds ({0}, max 256)")]
    TooManyFeeds(usize),

    /// No response arrived in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
