use std::future::Future;

use futures_core::future::BoxFuture;

use crate::message::{ReceiveRequest, Response};

/// Application logic that answers inbound requests.
///
/// Returning `None` sends nothing back; the peer's waiter stays pending until
/// it times out or the connection drops.
pub trait RequestHandler: Send + Sync + 'static {
    fn process_request(&self, request: ReceiveRequest) -> BoxFuture<'_, Option<Response>>;
}

/// A [`RequestHandler`] backed by an async closure.
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap an async closure as a [`RequestHandler`].
///
/// ```
/// use pipemux_protocol::{handler_fn, Response};
///
/// let echo = handler_fn(|request| async move {
///     let body = request.body_as_string().unwrap_or_default();
///     Some(Response::ok().with_body(body))
/// });
/// # let _ = echo;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(ReceiveRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Response>> + Send + 'static,
{
    HandlerFn { f }
}

impl<F, Fut> RequestHandler for HandlerFn<F>
where
    F: Fn(ReceiveRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Response>> + Send + 'static,
{
    fn process_request(&self, request: ReceiveRequest) -> BoxFuture<'_, Option<Response>> {
        Box::pin((self.f)(request))
    }
}
