//! Outbound messages to payload sequences.
//!
//! A message becomes its header payload followed by one
//! `ContentHeader` + `Content` pair per feed, with feed ids `0..n`.

use pipemux_frame::{Payload, ProtocolType};
use uuid::Uuid;

use crate::error::{ProtocolError, Result};
use crate::headers::{ContentDirection, ContentHeader, RequestHeader, ResponseHeader};
use crate::message::{ContentFeed, Request, Response};

/// Feed ids are one byte wide.
pub const MAX_CONTENT_FEEDS: usize = 256;

pub fn request_payloads(request_id: Uuid, request: &Request) -> Result<Vec<Payload>> {
    let header = RequestHeader {
        method: request.method.clone(),
        path: request.path.clone(),
        headers: request.headers.clone(),
        content_feed_count: feed_count(&request.feeds)?,
    };
    let mut payloads = Vec::with_capacity(1 + 2 * request.feeds.len());
    payloads.push(Payload::new(
        ProtocolType::Request,
        request_id,
        serde_json::to_vec(&header)?,
    ));
    push_feeds(
        request_id,
        &request.feeds,
        ContentDirection::Request,
        &mut payloads,
    )?;
    Ok(payloads)
}

pub fn response_payloads(request_id: Uuid, response: &Response) -> Result<Vec<Payload>> {
    let header = ResponseHeader {
        status_code: response.status,
        headers: response.headers.clone(),
        content_feed_count: feed_count(&response.feeds)?,
    };
    let mut payloads = Vec::with_capacity(1 + 2 * response.feeds.len());
    payloads.push(Payload::new(
        ProtocolType::Response,
        request_id,
        serde_json::to_vec(&header)?,
    ));
    push_feeds(
        request_id,
        &response.feeds,
        ContentDirection::Response,
        &mut payloads,
    )?;
    Ok(payloads)
}

fn feed_count(feeds: &[ContentFeed]) -> Result<u32> {
    if feeds.len() > MAX_CONTENT_FEEDS {
        return Err(ProtocolError::TooManyFeeds(feeds.len()));
    }
    Ok(feeds.len() as u32)
}

fn push_feeds(
    request_id: Uuid,
    feeds: &[ContentFeed],
    direction: ContentDirection,
    out: &mut Vec<Payload>,
) -> Result<()> {
    for (id, feed) in (0..=u8::MAX).zip(feeds) {
        let header = ContentHeader {
            id,
            headers: feed.headers.clone(),
            direction,
        };
        out.push(Payload::new(
            ProtocolType::ContentHeader,
            request_id,
            serde_json::to_vec(&header)?,
        ));
        out.push(Payload::content(request_id, id, feed.body.clone()));
    }
    Ok(())
}
