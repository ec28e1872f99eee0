//! Per-route pipelines.
//!
//! Every registered route runs the same fixed sequence of stages:
//!
//! ```text
//! middleware[0] → middleware[1] → … → decoder → handler
//! ```
//!
//! The stages are kept in a plain list and driven by a loop in
//! [`Pipeline::run`]. Middleware sees the raw request; the decoder sees it
//! after every middleware has run; the handler only runs when decoding
//! succeeded.

use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, warn};

use crate::client::ServiceClients;
use crate::codec::DataType;
use crate::context::Context;
use crate::contract::RouteContract;
use crate::decoder::{AnyPayload, Decoder};
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{Flow, Middleware};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// The stages a service attaches to one of its route contracts.
pub struct Route {
    handler: BoxedHandler,
    middlewares: Vec<Arc<dyn Middleware>>,
    decoder: Option<Arc<dyn Decoder>>,
}

impl Route {
    pub fn new(handler: impl Handler) -> Self {
        Self { handler: handler.into_boxed_handler(), middlewares: Vec::new(), decoder: None }
    }

    /// Appends a middleware stage. Stages run in the order they are added.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Replaces the default [`AnyPayload`] decoder.
    pub fn decoder(mut self, decoder: impl Decoder) -> Self {
        self.decoder = Some(Arc::new(decoder));
        self
    }
}

/// A route's composed stages, ready to serve requests.
pub struct Pipeline {
    route: Arc<RouteContract>,
    declared: DataType,
    middlewares: Vec<Arc<dyn Middleware>>,
    decoder: Arc<dyn Decoder>,
    handler: BoxedHandler,
    clients: Arc<ServiceClients>,
}

impl Pipeline {
    /// Composes `stages` for `route`, whose effective encoding is `declared`.
    pub fn compose(
        route: RouteContract,
        declared: DataType,
        stages: Route,
        clients: Arc<ServiceClients>,
    ) -> Self {
        Self {
            route: Arc::new(route),
            declared,
            middlewares: stages.middlewares,
            decoder: stages.decoder.unwrap_or_else(|| Arc::new(AnyPayload)),
            handler: stages.handler,
            clients,
        }
    }

    pub fn route(&self) -> &RouteContract {
        &self.route
    }

    /// Runs one request through every stage.
    pub async fn run(&self, request: Request) -> Response {
        let data_type = negotiate(&request, self.declared);
        let mut ctx = Context::new(request, Arc::clone(&self.route), data_type, Arc::clone(&self.clients));

        for (index, middleware) in self.middlewares.iter().enumerate() {
            if middleware.call(&mut ctx).await == Flow::Halt {
                debug!(route = %self.route.label, index, "middleware halted pipeline");
                return ctx.into_response();
            }
        }

        if let Err(err) = self.decoder.decode(&mut ctx) {
            warn!(route = %self.route.label, data_type = data_type.name(), error = %err, "rejected request payload");
            return Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .text(err.to_string());
        }

        self.handler.call(ctx).await
    }
}

/// The request's `Content-Type` wins when it names a known body type;
/// otherwise the route's declared encoding applies.
fn negotiate(request: &Request, declared: DataType) -> DataType {
    request
        .header(http::header::CONTENT_TYPE.as_str())
        .and_then(DataType::from_content_type)
        .unwrap_or(declared)
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::codec::{self, Encoded};
    use crate::error::Error;
    use crate::method::Method;
    use crate::request::tests::request;

    fn tag(marker: &'static str) -> impl Fn(&mut Context) -> Flow + Send + Sync + 'static {
        move |ctx: &mut Context| {
            ctx.write_str(marker);
            Flow::Continue
        }
    }

    async fn echo_fields(mut ctx: Context) -> Context {
        let path = ctx.route().path.clone();
        ctx.write_str(&path);
        let fields = ctx.payload::<Value>().map(|v| {
            format!("[Foo]={}[Bar]={}", v["Foo"].as_str().unwrap_or(""), v["Bar"].as_str().unwrap_or(""))
        });
        if let Some(fields) = fields {
            ctx.write_str(&fields);
        }
        ctx
    }

    fn pipeline(route: Route, declared: DataType) -> Pipeline {
        let contract = RouteContract::new("Echo", Method::Post, "/echo");
        Pipeline::compose(contract, declared, route, Arc::new(ServiceClients::default()))
    }

    fn binary_body() -> Vec<u8> {
        let payload = serde_json::json!({ "Foo": "foo", "Bar": "bar" });
        match codec::encode(DataType::Binary, &payload).unwrap() {
            Encoded::Body { bytes, .. } => bytes,
            other => panic!("expected a body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stages_run_in_declaration_order() {
        let p = pipeline(Route::new(echo_fields).middleware(tag("a")).middleware(tag("b")), DataType::Binary);
        let res = p.run(request(Method::Post, "/echo", Some("application/msgpack"), &binary_body())).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"ab/echo[Foo]=foo[Bar]=bar");
    }

    #[tokio::test]
    async fn middleware_sees_the_request_before_decoding() {
        let saw_payload = |ctx: &mut Context| {
            let marker = if ctx.has_payload() { "decoded" } else { "raw" };
            ctx.write_str(marker);
            Flow::Continue
        };
        let p = pipeline(Route::new(echo_fields).middleware(saw_payload), DataType::Binary);
        let res = p.run(request(Method::Post, "/echo", None, &binary_body())).await;
        assert!(res.body().starts_with(b"raw/echo[Foo]=foo"));
    }

    #[tokio::test]
    async fn decode_failure_short_circuits_with_bad_request() {
        let reached = |ctx: &mut Context| -> crate::error::Result<()> {
            ctx.set_payload(());
            Err(Error::DecodeRejected { format: "custom", reason: "nope".into() })
        };
        async fn unreachable_handler(_ctx: Context) -> &'static str {
            "handler ran"
        }
        let p = pipeline(Route::new(unreachable_handler).middleware(tag("a")).decoder(reached), DataType::Json);
        let res = p.run(request(Method::Post, "/echo", None, b"{}")).await;
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(res.body(), b"rejected custom payload: nope");
    }

    #[tokio::test]
    async fn malformed_json_never_reaches_the_handler() {
        async fn handler(_ctx: Context) -> &'static str {
            "handler ran"
        }
        let p = pipeline(Route::new(handler), DataType::Json);
        let res = p.run(request(Method::Post, "/echo", Some("application/json"), b"{oops")).await;
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert!(String::from_utf8_lossy(res.body()).starts_with("rejected json payload"));
    }

    #[tokio::test]
    async fn halting_middleware_skips_the_rest() {
        let halt = |ctx: &mut Context| {
            ctx.set_status(StatusCode::FORBIDDEN);
            ctx.write_str("stop");
            Flow::Halt
        };
        let p = pipeline(Route::new(echo_fields).middleware(halt).middleware(tag("never")), DataType::Binary);
        let res = p.run(request(Method::Post, "/echo", None, &binary_body())).await;
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(res.body(), b"stop");
    }

    #[test]
    fn content_type_overrides_declared_encoding() {
        let req = request(Method::Post, "/echo", Some("application/json; charset=utf-8"), b"{}");
        assert_eq!(negotiate(&req, DataType::Binary), DataType::Json);

        let req = request(Method::Post, "/echo", Some("text/plain"), b"x");
        assert_eq!(negotiate(&req, DataType::Form), DataType::Form);

        let req = request(Method::Get, "/echo/1", None, b"");
        assert_eq!(negotiate(&req, DataType::RouteParams), DataType::RouteParams);
    }
}
