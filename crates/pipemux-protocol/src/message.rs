//! Application-facing request and response types.
//!
//! Outbound messages ([`Request`], [`Response`]) own their content feeds;
//! inbound ones ([`ReceiveRequest`], [`ReceiveResponse`]) are produced by
//! reassembly and carry each feed's id as sent by the peer.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Header map of a message or content feed.
pub type Headers = BTreeMap<String, String>;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";
pub const APPLICATION_JSON_UTF8: &str = "application/json; charset=utf-8";

/// One headered body attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentFeed {
    pub headers: Headers,
    pub body: Bytes,
}

impl ContentFeed {
    /// A feed with no headers.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            headers: Headers::new(),
            body: body.into(),
        }
    }

    /// A UTF-8 text feed.
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(body.into()).with_header(CONTENT_TYPE, TEXT_PLAIN_UTF8)
    }

    /// A feed holding `value` serialized as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(body).with_header(CONTENT_TYPE, APPLICATION_JSON_UTF8))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// An outbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: Headers,
    pub feeds: Vec<ContentFeed>,
}

impl Request {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new("POST", path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new("PUT", path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new("DELETE", path)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_header(name, value);
        self
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn with_feed(mut self, feed: ContentFeed) -> Self {
        self.feeds.push(feed);
        self
    }

    /// Replace all feeds with a single text body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.set_body(body);
        self
    }

    /// Replace all feeds with a single text body.
    pub fn set_body(&mut self, body: impl Into<String>) {
        self.feeds = vec![ContentFeed::text(body)];
    }

    /// Replace all feeds with a single JSON body.
    pub fn set_json_body<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.feeds = vec![ContentFeed::json(value)?];
        Ok(())
    }
}

/// An outbound response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    pub feeds: Vec<ContentFeed>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            feeds: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn forbidden() -> Self {
        Self::new(403)
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn internal_server_error() -> Self {
        Self::new(500)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_header(name, value);
        self
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn with_feed(mut self, feed: ContentFeed) -> Self {
        self.feeds.push(feed);
        self
    }

    /// Replace all feeds with a single text body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.set_body(body);
        self
    }

    /// Replace all feeds with a single text body.
    pub fn set_body(&mut self, body: impl Into<String>) {
        self.feeds = vec![ContentFeed::text(body)];
    }

    /// Replace all feeds with a single JSON body.
    pub fn set_json_body<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.feeds = vec![ContentFeed::json(value)?];
        Ok(())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One reassembled content feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFeed {
    pub id: u8,
    pub headers: Headers,
    pub content: Bytes,
}

/// A fully reassembled inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub method: String,
    pub path: String,
    pub headers: Headers,
    pub feeds: Vec<ReceivedFeed>,
}

impl ReceiveRequest {
    /// The first feed's bytes as text; empty when there is no feed.
    pub fn body_as_string(&self) -> Result<String> {
        body_as_string(&self.feeds)
    }

    /// The first feed's bytes parsed as JSON.
    pub fn body_as_json<T: DeserializeOwned>(&self) -> Result<T> {
        body_as_json(&self.feeds)
    }
}

/// A fully reassembled inbound response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveResponse {
    pub status: u16,
    pub headers: Headers,
    pub feeds: Vec<ReceivedFeed>,
}

impl ReceiveResponse {
    /// The first feed's bytes as text; empty when there is no feed.
    pub fn body_as_string(&self) -> Result<String> {
        body_as_string(&self.feeds)
    }

    /// The first feed's bytes parsed as JSON.
    pub fn body_as_json<T: DeserializeOwned>(&self) -> Result<T> {
        body_as_json(&self.feeds)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn body_as_string(feeds: &[ReceivedFeed]) -> Result<String> {
    let bytes = feeds.first().map(|feed| feed.content.to_vec()).unwrap_or_default();
    Ok(String::from_utf8(bytes)?)
}

fn body_as_json<T: DeserializeOwned>(feeds: &[ReceivedFeed]) -> Result<T> {
    let bytes = feeds.first().map(|feed| feed.content.as_ref()).unwrap_or_default();
    Ok(serde_json::from_slice(bytes)?)
}
