//! Middleware stages.
//!
//! Middleware runs before the payload is decoded and sees the raw request. It
//! is the right place for cross-cutting concerns: tracing, request-id
//! injection, header inspection. Stages run in declaration order; a stage
//! that returns [`Flow::Halt`] ends the pipeline and the response is whatever
//! has been written to the [`Context`] so far.
//!
//! Any `Fn(&mut Context) -> Flow` is a middleware:
//!
//! ```rust
//! use accord::{Context, Route, StatusCode};
//! use accord::middleware::Flow;
//!
//! fn require_token(ctx: &mut Context) -> Flow {
//!     if ctx.header("x-token").is_some() {
//!         Flow::Continue
//!     } else {
//!         ctx.set_status(StatusCode::UNAUTHORIZED);
//!         Flow::Halt
//!     }
//! }
//!
//! # async fn handler(ctx: Context) -> Context { ctx }
//! let route = Route::new(handler).middleware(require_token);
//! ```
//!
//! Implement [`Middleware`] directly when a stage needs to await.

mod trace;

pub use trace::Trace;

use crate::context::Context;
use crate::handler::BoxFuture;

/// What the pipeline does after a middleware stage.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flow {
    /// Run the next stage.
    Continue,
    /// Stop here and send what has been written.
    Halt,
}

/// A pipeline stage that runs before decoding.
pub trait Middleware: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Flow>;
}

impl<F> Middleware for F
where
    F: Fn(&mut Context) -> Flow + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Flow> {
        let flow = self(ctx);
        Box::pin(std::future::ready(flow))
    }
}
