//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! A router holds handlers of *different* types in one map, so each handler
//! is hidden behind a trait object (`dyn ErasedHandler`) with a uniform
//! signature:
//!
//! ```text
//! async fn echo(req: Request) -> Result<Response, Fault> { … }   ← user writes this
//!        ↓ Endpoint::new("echo", echo)
//! echo.into_boxed_handler()                                     ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(echo))                                     ← stored as BoxedHandler
//!        ↓
//! handler.call(req)  at request time                            ← one vtable dispatch
//!        ↓
//! Box::pin(async { echo(req).await.into_handler_result() })     ← BoxFuture
//! ```
//!
//! Handler return types are normalised through [`IntoHandlerResult`]: a
//! handler may return a [`Response`], `Option<Response>`, `()`, or a
//! `Result` of any of those with an error convertible into
//! [`BoxError`]. `None` and `()` mean "no response body"; the server then
//! replies with an empty success response.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::fault::BoxError;
use crate::request::Request;
use crate::response::Response;

/// What every handler resolves to once normalised.
pub type HandlerResult = Result<Option<Response>, BoxError>;

/// A heap-allocated, type-erased future resolving to a [`HandlerResult`].
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` because it appears in the return type of the public
/// `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid endpoint handler.
///
/// Automatically satisfied for any `async fn` (or closure returning a future)
/// with the signature:
///
/// ```text
/// async fn name(req: Request) -> impl IntoHandlerResult
/// ```
///
/// Sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoHandlerResult + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoHandlerResult + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Bridges a concrete handler `F` to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoHandlerResult + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_handler_result() })
    }
}

// ── IntoHandlerResult ─────────────────────────────────────────────────────────

/// Conversion of a handler's return value into a [`HandlerResult`].
pub trait IntoHandlerResult {
    fn into_handler_result(self) -> HandlerResult;
}

impl IntoHandlerResult for Response {
    fn into_handler_result(self) -> HandlerResult { Ok(Some(self)) }
}

impl IntoHandlerResult for Option<Response> {
    fn into_handler_result(self) -> HandlerResult { Ok(self) }
}

impl IntoHandlerResult for () {
    fn into_handler_result(self) -> HandlerResult { Ok(None) }
}

impl<E: Into<BoxError>> IntoHandlerResult for Result<Response, E> {
    fn into_handler_result(self) -> HandlerResult {
        self.map(Some).map_err(Into::into)
    }
}

impl<E: Into<BoxError>> IntoHandlerResult for Result<Option<Response>, E> {
    fn into_handler_result(self) -> HandlerResult {
        self.map_err(Into::into)
    }
}

impl<E: Into<BoxError>> IntoHandlerResult for Result<(), E> {
    fn into_handler_result(self) -> HandlerResult {
        self.map(|()| None).map_err(Into::into)
    }
}
