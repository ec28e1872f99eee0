//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! Every route's pipeline ends in a handler of its own concrete type, yet the
//! router keeps all pipelines in one table. Handlers are therefore hidden
//! behind a trait object (`dyn ErasedHandler`) and stored uniformly.
//!
//! ```text
//! async fn echo(ctx: Context) -> Context { … }       ← user writes this
//!        ↓ Route::new(echo)
//! echo.into_boxed_handler()                         ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(echo))                         ← heap-allocated wrapper
//!        ↓  stored in the route's Pipeline as BoxedHandler
//! handler.call(ctx)  at request time                ← one vtable dispatch
//!        ↓
//! Box::pin(async { echo(ctx).await.into_response() })
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future.
///
/// Used wherever a trait has to return a future and still be usable as a
/// trait object: handlers, middleware and transports.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: Context) -> BoxFuture<'static, Response>;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid terminal handler.
///
/// You never implement this yourself. It is satisfied by any `async fn` with
/// the signature:
///
/// ```text
/// async fn name(ctx: Context) -> impl IntoResponse
/// ```
///
/// Returning the `Context` itself sends whatever the pipeline wrote into it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Newtype wrapper that holds a concrete handler `F` and implements
/// [`ErasedHandler`].
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture<'static, Response> {
        let fut = (self.0)(ctx);
        Box::pin(async move { fut.await.into_response() })
    }
}
