//! Per-request context handed down a route's pipeline.
//!
//! Middleware, the decoding stage and the terminal handler all work on the
//! same `Context`: they read the request, write into the shared response,
//! and the decoding stage leaves the decoded payload behind for the handler.

use std::any::Any;
use std::sync::Arc;

use http::{StatusCode, Uri};

use crate::client::{ServiceClient, ServiceClients};
use crate::codec::DataType;
use crate::contract::RouteContract;
use crate::error::Result;
use crate::form::Fields;
use crate::method::Method;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

pub struct Context {
    request: Request,
    route: Arc<RouteContract>,
    data_type: DataType,
    payload: Option<Box<dyn Any + Send + Sync>>,
    clients: Arc<ServiceClients>,
    response: Response,
}

impl Context {
    pub(crate) fn new(
        request: Request,
        route: Arc<RouteContract>,
        data_type: DataType,
        clients: Arc<ServiceClients>,
    ) -> Self {
        Self {
            request,
            route,
            data_type,
            payload: None,
            clients,
            response: Response::status(StatusCode::OK),
        }
    }

    // ── Request ───────────────────────────────────────────────────────────────

    pub fn request(&self) -> &Request { &self.request }
    pub fn method(&self) -> Method { self.request.method() }
    pub fn uri(&self) -> &Uri { self.request.uri() }
    pub fn path(&self) -> &str { self.request.path() }
    pub fn body(&self) -> &[u8] { self.request.body() }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    /// A path parameter captured by the router.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.request.param(key)
    }

    /// The query string as multi-valued fields.
    pub fn query(&self) -> Result<Fields> {
        self.request.query_fields()
    }

    /// The contract of the route being served.
    pub fn route(&self) -> &RouteContract {
        &self.route
    }

    /// The data type the body is decoded as: the request's `Content-Type`
    /// when it names one, otherwise the route's declared encoding.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    // ── Payload ───────────────────────────────────────────────────────────────

    /// The decoded payload, if the decoding stage produced one of type `T`.
    ///
    /// The default decoder stores a [`serde_json::Value`] for JSON and binary
    /// bodies and [`Fields`] for form bodies.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.as_ref()?.downcast_ref()
    }

    /// Takes the decoded payload out of the context.
    ///
    /// Leaves the payload in place when it is not a `T`.
    pub fn take_payload<T: Any>(&mut self) -> Option<T> {
        let boxed = self.payload.take()?;
        match boxed.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                self.payload = Some(other);
                None
            }
        }
    }

    /// False when decoding was skipped: empty body, or a route-param /
    /// query-param route.
    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    pub fn set_payload<T: Any + Send + Sync>(&mut self, payload: T) {
        self.payload = Some(Box::new(payload));
    }

    // ── Service clients ───────────────────────────────────────────────────────

    /// Clients for every service the owning service subscribes to.
    pub fn clients(&self) -> &ServiceClients {
        &self.clients
    }

    /// The client for the subscribed service labelled `label`.
    pub fn client(&self, label: &str) -> Option<&ServiceClient> {
        self.clients.get(label)
    }

    // ── Response writer ───────────────────────────────────────────────────────

    /// Appends bytes to the response body.
    pub fn write(&mut self, bytes: &[u8]) {
        self.response.body.extend_from_slice(bytes);
    }

    pub fn write_str(&mut self, s: &str) {
        self.write(s.as_bytes());
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.response.status = status;
    }

    /// Sets a response header, replacing any earlier value under `name`.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.response.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.response.headers.push((name.to_owned(), value.to_owned()));
    }

    /// What has been written so far.
    pub fn written(&self) -> &[u8] {
        &self.response.body
    }
}

impl IntoResponse for Context {
    fn into_response(self) -> Response {
        self.response
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("route", &self.route.label)
            .field("method", &self.request.method())
            .field("uri", self.request.uri())
            .field("data_type", &self.data_type)
            .field("has_payload", &self.payload.is_some())
            .finish_non_exhaustive()
    }
}
