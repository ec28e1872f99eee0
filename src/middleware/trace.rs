use tracing::info;

use crate::context::Context;
use crate::handler::BoxFuture;

use super::{Flow, Middleware};

/// Logs every request with its method, URI, route label and negotiated data
/// type. Never halts.
#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

impl Middleware for Trace {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Flow> {
        info!(
            method = %ctx.method(),
            uri = %ctx.uri(),
            route = %ctx.route().label,
            data_type = ctx.data_type().name(),
            "request"
        );
        Box::pin(std::future::ready(Flow::Continue))
    }
}
