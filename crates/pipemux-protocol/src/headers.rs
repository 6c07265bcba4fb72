//! JSON header records carried as payload content.

use serde::{Deserialize, Serialize};

use crate::message::Headers;

/// Content of a `Request` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestHeader {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub content_feed_count: u32,
}

/// Content of a `Response` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseHeader {
    pub status_code: u16,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub content_feed_count: u32,
}

/// Content of a `ContentHeader` payload; announces the feed carried by the
/// next `Content` payload of the same request id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHeader {
    pub id: u8,
    #[serde(default)]
    pub headers: Headers,
    pub direction: ContentDirection,
}

/// Which side of the exchange a feed belongs to. Encoded as a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ContentDirection {
    Request,
    Response,
}

impl From<ContentDirection> for u8 {
    fn from(value: ContentDirection) -> Self {
        match value {
            ContentDirection::Request => 0,
            ContentDirection::Response => 1,
        }
    }
}

impl TryFrom<u8> for ContentDirection {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Request),
            1 => Ok(Self::Response),
            other => Err(format!("unknown content direction {other}")),
        }
    }
}
