//! Incremental reassembly of inbound messages.
//!
//! A builder consumes one payload per call and moves through
//! `AwaitingHeader -> AwaitingFeeds -> Complete`. Feed slots are keyed by
//! feed id; the message completes when every declared slot is filled.

use std::collections::{BTreeMap, BTreeSet};

use pipemux_frame::{Payload, ProtocolType};
use serde::de::DeserializeOwned;

use crate::error::{ProtocolError, Result};
use crate::headers::{ContentDirection, ContentHeader, RequestHeader, ResponseHeader};
use crate::message::{ReceiveRequest, ReceiveResponse, ReceivedFeed};
use crate::serializer::MAX_CONTENT_FEEDS;

/// A header record that opens an exchange.
pub trait MessageHeader: DeserializeOwned {
    /// Payload type that carries this header.
    const KIND: ProtocolType;
    /// Direction every feed of this message must declare.
    const DIRECTION: ContentDirection;
    /// The reassembled message.
    type Message;

    fn feed_count(&self) -> u32;
    fn finish(self, feeds: Vec<ReceivedFeed>) -> Self::Message;
}

impl MessageHeader for RequestHeader {
    const KIND: ProtocolType = ProtocolType::Request;
    const DIRECTION: ContentDirection = ContentDirection::Request;
    type Message = ReceiveRequest;

    fn feed_count(&self) -> u32 {
        self.content_feed_count
    }

    fn finish(self, feeds: Vec<ReceivedFeed>) -> ReceiveRequest {
        ReceiveRequest {
            method: self.method,
            path: self.path,
            headers: self.headers,
            feeds,
        }
    }
}

impl MessageHeader for ResponseHeader {
    const KIND: ProtocolType = ProtocolType::Response;
    const DIRECTION: ContentDirection = ContentDirection::Response;
    type Message = ReceiveResponse;

    fn feed_count(&self) -> u32 {
        self.content_feed_count
    }

    fn finish(self, feeds: Vec<ReceivedFeed>) -> ReceiveResponse {
        ReceiveResponse {
            status: self.status_code,
            headers: self.headers,
            feeds,
        }
    }
}

pub type ReceiveRequestBuilder = MessageBuilder<RequestHeader>;
pub type ReceiveResponseBuilder = MessageBuilder<ResponseHeader>;

enum BuildState<H> {
    AwaitingHeader,
    AwaitingFeeds { header: H, slots: FeedSlots },
    Complete,
}

/// Reassembles one request or response from its payloads.
pub struct MessageBuilder<H> {
    state: BuildState<H>,
}

impl<H: MessageHeader> MessageBuilder<H> {
    pub fn new() -> Self {
        Self {
            state: BuildState::AwaitingHeader,
        }
    }

    /// Feed the next payload of the exchange.
    ///
    /// Returns the message once the header and every declared feed have
    /// arrived. Any error leaves the builder complete; further payloads are
    /// violations.
    pub fn push(&mut self, payload: Payload) -> Result<Option<H::Message>> {
        match std::mem::replace(&mut self.state, BuildState::Complete) {
            BuildState::AwaitingHeader => {
                expect_kind(&payload, H::KIND)?;
                let header: H = serde_json::from_slice(&payload.content)?;
                let slots = FeedSlots::new(header.feed_count())?;
                self.advance(header, slots)
            }
            BuildState::AwaitingFeeds { header, mut slots } => {
                slots.accept(payload, H::DIRECTION)?;
                self.advance(header, slots)
            }
            BuildState::Complete => Err(ProtocolError::Violation(format!(
                "{} payload after the message completed",
                kind_name(&payload)
            ))),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, BuildState::Complete)
    }

    fn advance(&mut self, header: H, slots: FeedSlots) -> Result<Option<H::Message>> {
        if slots.is_complete() {
            return Ok(Some(header.finish(slots.into_feeds())));
        }
        self.state = BuildState::AwaitingFeeds { header, slots };
        Ok(None)
    }
}

impl<H: MessageHeader> Default for MessageBuilder<H> {
    fn default() -> Self {
        Self::new()
    }
}

struct FeedSlots {
    remaining: BTreeSet<u8>,
    announced: Option<ContentHeader>,
    filled: BTreeMap<u8, ReceivedFeed>,
}

impl FeedSlots {
    fn new(count: u32) -> Result<Self> {
        let count = count as usize;
        if count > MAX_CONTENT_FEEDS {
            return Err(ProtocolError::Violation(format!(
                "header declares {count} content feeds (max {MAX_CONTENT_FEEDS})"
            )));
        }
        Ok(Self {
            remaining: (0..=u8::MAX).take(count).collect(),
            announced: None,
            filled: BTreeMap::new(),
        })
    }

    fn accept(&mut self, payload: Payload, direction: ContentDirection) -> Result<()> {
        match payload.protocol_type() {
            Ok(ProtocolType::ContentHeader) => {
                if self.announced.is_some() {
                    return Err(ProtocolError::Violation(
                        "content header while a feed is still pending".into(),
                    ));
                }
                let header: ContentHeader = serde_json::from_slice(&payload.content)?;
                if header.direction != direction {
                    return Err(ProtocolError::Violation(format!(
                        "feed {} declares direction {:?}, expected {direction:?}",
                        header.id, header.direction
                    )));
                }
                if !self.remaining.contains(&header.id) {
                    return Err(ProtocolError::Violation(format!(
                        "feed id {} is out of range or already filled",
                        header.id
                    )));
                }
                self.announced = Some(header);
                Ok(())
            }
            Ok(ProtocolType::Content) => {
                let Some(header) = self.announced.take() else {
                    return Err(ProtocolError::Violation(
                        "content without a preceding content header".into(),
                    ));
                };
                if payload.type_header.is_some_and(|id| id != header.id) {
                    return Err(ProtocolError::Violation(format!(
                        "content for feed {:?} follows header for feed {}",
                        payload.type_header, header.id
                    )));
                }
                self.remaining.remove(&header.id);
                self.filled.insert(
                    header.id,
                    ReceivedFeed {
                        id: header.id,
                        headers: header.headers,
                        content: payload.content,
                    },
                );
                Ok(())
            }
            Ok(kind @ (ProtocolType::ContentStream | ProtocolType::Cancel)) => {
                Err(ProtocolError::Unsupported(kind))
            }
            Ok(kind) => Err(ProtocolError::Violation(format!(
                "{} payload while awaiting content feeds",
                kind.name()
            ))),
            Err(tag) => Err(ProtocolError::Violation(format!(
                "unknown payload type {tag}"
            ))),
        }
    }

    fn is_complete(&self) -> bool {
        self.remaining.is_empty() && self.announced.is_none()
    }

    fn into_feeds(self) -> Vec<ReceivedFeed> {
        self.filled.into_values().collect()
    }
}

fn expect_kind(payload: &Payload, expected: ProtocolType) -> Result<()> {
    match payload.protocol_type() {
        Ok(kind) if kind == expected => Ok(()),
        Ok(kind @ (ProtocolType::ContentStream | ProtocolType::Cancel)) => {
            Err(ProtocolError::Unsupported(kind))
        }
        Ok(kind) => Err(ProtocolError::Violation(format!(
            "expected {} payload, got {}",
            expected.name(),
            kind.name()
        ))),
        Err(tag) => Err(ProtocolError::Violation(format!(
            "unknown payload type {tag}"
        ))),
    }
}

fn kind_name(payload: &Payload) -> &'static str {
    pipemux_frame::protocol_type_name(payload.payload_type)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use uuid::Uuid;

    use super::*;
    use crate::message::{ContentFeed, Request, Response};
    use crate::serializer::{request_payloads, response_payloads};

    fn build_request(payloads: Vec<Payload>) -> Result<Option<ReceiveRequest>> {
        let mut builder = ReceiveRequestBuilder::new();
        let mut result = None;
        for payload in payloads {
            result = builder.push(payload)?;
        }
        Ok(result)
    }

    #[test]
    fn request_without_feeds_completes_on_header() {
        let payloads = request_payloads(Uuid::new_v4(), &Request::get("/status")).unwrap();
        let mut builder = ReceiveRequestBuilder::new();
        let request = builder.push(payloads[0].clone()).unwrap().unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/status");
        assert!(request.feeds.is_empty());
        assert!(builder.is_complete());
    }

    #[test]
    fn request_with_feeds_completes_after_last_content() {
        let request = Request::post("/x")
            .with_header("X-Trace", "1")
            .with_feed(ContentFeed::text("hello"))
            .with_feed(ContentFeed::new(&b"\x00\x01"[..]));
        let payloads = request_payloads(Uuid::new_v4(), &request).unwrap();
        let last = payloads.len() - 1;

        let mut builder = ReceiveRequestBuilder::new();
        for (index, payload) in payloads.into_iter().enumerate() {
            let done = builder.push(payload).unwrap();
            assert_eq!(done.is_some(), index == last, "payload {index}");
            if let Some(received) = done {
                assert_eq!(received.headers.get("X-Trace").map(String::as_str), Some("1"));
                assert_eq!(received.feeds.len(), 2);
                assert_eq!(received.body_as_string().unwrap(), "hello");
                assert_eq!(received.feeds[1].content, Bytes::from_static(b"\x00\x01"));
            }
        }
    }

    #[test]
    fn response_builder_reads_status_and_body() {
        let payloads =
            response_payloads(Uuid::new_v4(), &Response::ok().with_body("world")).unwrap();
        let mut builder = ReceiveResponseBuilder::new();
        let mut response = None;
        for payload in payloads {
            response = builder.push(payload).unwrap();
        }
        let response = response.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body_as_string().unwrap(), "world");
    }

    #[test]
    fn content_before_its_header_is_a_violation() {
        let mut payloads =
            request_payloads(Uuid::new_v4(), &Request::post("/x").with_body("a")).unwrap();
        payloads.swap(1, 2);
        let err = build_request(payloads).unwrap_err();
        assert!(matches!(err, ProtocolError::Violation(_)));
    }

    #[test]
    fn out_of_range_feed_id_is_a_violation() {
        let id = Uuid::new_v4();
        let mut payloads = request_payloads(id, &Request::post("/x").with_body("a")).unwrap();
        let header = ContentHeader {
            id: 5,
            headers: Default::default(),
            direction: ContentDirection::Request,
        };
        payloads[1] = Payload::new(
            ProtocolType::ContentHeader,
            id,
            serde_json::to_vec(&header).unwrap(),
        );
        let err = build_request(payloads).unwrap_err();
        assert!(matches!(err, ProtocolError::Violation(_)));
    }

    #[test]
    fn wrong_direction_is_a_violation() {
        let id = Uuid::new_v4();
        let mut payloads = request_payloads(id, &Request::post("/x").with_body("a")).unwrap();
        let foreign = response_payloads(id, &Response::ok().with_body("a")).unwrap();
        payloads[1] = foreign[1].clone();
        let err = build_request(payloads).unwrap_err();
        assert!(matches!(err, ProtocolError::Violation(_)));
    }

    #[test]
    fn content_stream_is_unsupported() {
        let id = Uuid::new_v4();
        let mut payloads = request_payloads(id, &Request::post("/x").with_body("a")).unwrap();
        payloads[1] = Payload::new(ProtocolType::ContentStream, id, Bytes::new());
        let err = build_request(payloads).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Unsupported(ProtocolType::ContentStream)
        ));
    }

    #[test]
    fn unknown_type_tag_is_a_violation() {
        let id = Uuid::new_v4();
        let mut payloads = request_payloads(id, &Request::post("/x").with_body("a")).unwrap();
        payloads[1].payload_type = 99;
        let err = build_request(payloads).unwrap_err();
        assert!(matches!(err, ProtocolError::Violation(msg) if msg.contains("99")));
    }

    #[test]
    fn response_payload_cannot_open_a_request() {
        let payloads = response_payloads(Uuid::new_v4(), &Response::not_found()).unwrap();
        let err = build_request(payloads).unwrap_err();
        assert!(matches!(err, ProtocolError::Violation(_)));
    }

    #[test]
    fn payload_after_completion_is_a_violation() {
        let id = Uuid::new_v4();
        let payloads = request_payloads(id, &Request::get("/")).unwrap();
        let mut builder = ReceiveRequestBuilder::new();
        builder.push(payloads[0].clone()).unwrap();
        let err = builder.push(payloads[0].clone()).unwrap_err();
        assert!(matches!(err, ProtocolError::Violation(_)));
    }

    #[test]
    fn oversized_feed_count_is_a_violation() {
        let header = RequestHeader {
            method: "POST".into(),
            path: "/".into(),
            headers: Default::default(),
            content_feed_count: 1000,
        };
        let payload = Payload::new(
            ProtocolType::Request,
            Uuid::new_v4(),
            serde_json::to_vec(&header).unwrap(),
        );
        let err = ReceiveRequestBuilder::new().push(payload).unwrap_err();
        assert!(matches!(err, ProtocolError::Violation(_)));
    }
}
