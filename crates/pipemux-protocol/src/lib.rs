//! Multiplexed request/response connections for pipemux.
//!
//! This is the "just works" layer. Attach a transport, send HTTP-like
//! requests and get their responses back, while any number of exchanges
//! share the one pipe pair.
//!
//! ```no_run
//! use pipemux_protocol::{connect, Request};
//!
//! # async fn demo() -> pipemux_protocol::Result<()> {
//! let connection = connect("/tmp/app/bot").await?;
//! let response = connection
//!     .send_request(&Request::post("/x").with_body("hello"))
//!     .await?;
//! println!("{} {}", response.status, response.body_as_string()?);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod builder;
pub mod connection;
pub mod connector;
pub mod error;
pub mod handler;
pub mod headers;
pub mod listener;
pub mod message;
pub mod packet_manager;
pub mod request_manager;
pub mod serializer;
pub mod source;
pub mod wait_queue;

pub use adapter::ProtocolAdapter;
pub use builder::{MessageBuilder, MessageHeader, ReceiveRequestBuilder, ReceiveResponseBuilder};
pub use connection::{Connection, ConnectionBuilder, ConnectionConfig, ReconnectPolicy};
pub use connector::{connect, connect_with_config, PipeConnector};
pub use error::{ProtocolError, Result};
pub use handler::{handler_fn, HandlerFn, RequestHandler};
pub use headers::{ContentDirection, ContentHeader, RequestHeader, ResponseHeader};
pub use listener::PipeAcceptor;
pub use message::{
    ContentFeed, Headers, ReceiveRequest, ReceiveResponse, ReceivedFeed, Request, Response,
    APPLICATION_JSON_UTF8, CONTENT_TYPE, TEXT_PLAIN_UTF8,
};
pub use packet_manager::{
    ContentBuffer, DisconnectEvent, DisconnectReason, PacketHandler, PacketManager,
};
pub use request_manager::{PendingResponse, RequestManager};
pub use serializer::{request_payloads, response_payloads, MAX_CONTENT_FEEDS};
pub use source::TransportSource;
pub use wait_queue::WaitQueue;
