use pipemux_protocol::{
    handler_fn, Connection, ContentFeed, PipeAcceptor, ReceiveRequest, ReconnectPolicy, Response,
};
use tracing::info;

use crate::cmd::send::parse_duration;
use crate::cmd::ServeArgs;
use crate::exit::{io_error, protocol_error, CliResult, SUCCESS};

pub async fn run(args: ServeArgs) -> CliResult<i32> {
    let reaccept_delay = parse_duration(&args.reaccept_delay)?;
    let acceptor =
        PipeAcceptor::bind(&args.base).map_err(|err| protocol_error("bind failed", err))?;

    let connection = Connection::builder()
        .source(acceptor)
        .handler(handler_fn(|request: ReceiveRequest| async move {
            info!(
                method = %request.method,
                path = %request.path,
                feeds = request.feeds.len(),
                "request"
            );
            Some(echo_response(&request))
        }))
        .reconnect(ReconnectPolicy::every(reaccept_delay))
        .build();
    info!(base = %args.base.display(), "serving");

    tokio::select! {
        accepted = connection.connect() => {
            accepted.map_err(|err| protocol_error("accept failed", err))?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|err| io_error("signal handler failed", err))?;
            info!("interrupted before first client");
            return Ok(SUCCESS);
        }
    }

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| io_error("signal handler failed", err))?;
    info!("shutting down");
    Ok(SUCCESS)
}

/// 200 carrying the request's feeds back unchanged.
fn echo_response(request: &ReceiveRequest) -> Response {
    let mut response = Response::ok();
    response.feeds = request
        .feeds
        .iter()
        .map(|feed| ContentFeed {
            headers: feed.headers.clone(),
            body: feed.content.clone(),
        })
        .collect();
    response
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use pipemux_protocol::{Headers, ReceivedFeed};

    use super::*;

    #[test]
    fn echo_keeps_feed_order_headers_and_bytes() {
        let mut headers = Headers::new();
        headers.insert("Content-Type".into(), "text/plain".into());
        let request = ReceiveRequest {
            method: "POST".into(),
            path: "/x".into(),
            headers: Headers::new(),
            feeds: vec![
                ReceivedFeed {
                    id: 0,
                    headers,
                    content: Bytes::from_static(b"hello"),
                },
                ReceivedFeed {
                    id: 1,
                    headers: Headers::new(),
                    content: Bytes::new(),
                },
            ],
        };

        let response = echo_response(&request);
        assert_eq!(response.status, 200);
        assert_eq!(response.feeds.len(), 2);
        assert_eq!(response.feeds[0].body, Bytes::from_static(b"hello"));
        assert_eq!(
            response.feeds[0].headers.get("Content-Type").map(String::as_str),
            Some("text/plain")
        );
        assert!(response.feeds[1].body.is_empty());
    }
}
