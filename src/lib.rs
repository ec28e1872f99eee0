//! # accord
//!
//! Contract-driven request/response plumbing for services that talk to each
//! other over HTTP.
//!
//! ## The contract
//!
//! A [`ServiceContract`] says where a service lives and which routes it
//! serves; each [`RouteContract`] says how its payload travels ([`DataType`]).
//! The same contract value drives both ends:
//!
//! - the **server** side registers one [`Pipeline`] per route and decodes
//!   inbound payloads by the route's data type;
//! - the **client** side resolves URLs, encodes payloads, fills in path
//!   params and query strings, and dispatches through a [`Transport`].
//!
//! What accord does:
//!
//! - URL resolution: `protocol://host:port/namespace/version/path`
//! - Payload codecs: MessagePack (default), JSON, form, route params, query params
//! - Ordered pipelines: middleware, then decoding, then the handler
//! - Radix-tree routing via [`matchit`], graceful shutdown on SIGTERM / Ctrl-C
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use accord::{Context, DataType, Method, RouteContract, Service, ServiceContract};
//!
//! #[tokio::main]
//! async fn main() -> accord::Result<()> {
//!     let users = Arc::new(
//!         ServiceContract::new("UserService")
//!             .namespace("users")
//!             .route(RouteContract::new("GetUser", Method::Get, "/users/:id")
//!                 .with_encoding(DataType::RouteParams))
//!             .route(RouteContract::new("CreateUser", Method::Post, "/users")
//!                 .with_encoding(DataType::Json)),
//!     );
//!
//!     Service::new(users)
//!         .route("GetUser", get_user)
//!         .route("CreateUser", create_user)
//!         .serve()
//!         .await
//! }
//!
//! async fn get_user(mut ctx: Context) -> Context {
//!     let id = ctx.param("id").unwrap_or("unknown").to_owned();
//!     ctx.write_str(&format!(r#"{{"id":"{id}"}}"#));
//!     ctx
//! }
//!
//! async fn create_user(mut ctx: Context) -> Context {
//!     // The default decoder leaves a serde_json::Value behind for JSON bodies.
//!     let name = ctx
//!         .payload::<serde_json::Value>()
//!         .and_then(|v| v["name"].as_str())
//!         .unwrap_or_default()
//!         .to_owned();
//!     ctx.set_status(accord::StatusCode::CREATED);
//!     ctx.write_str(&name);
//!     ctx
//! }
//! ```

mod client;
mod codec;
mod config;
mod context;
mod contract;
mod decoder;
mod error;
mod handler;
mod method;
mod pipeline;
mod request;
mod response;
mod router;
mod server;
mod service;

pub mod form;
pub mod middleware;
pub mod template;

pub use client::{ClientResponse, HyperTransport, ServiceClient, ServiceClients, ServiceRequest, Transport};
pub use codec::{DataType, Encoded, decode, encode};
pub use config::{ClientConfig, Defaults};
pub use context::Context;
pub use contract::{Protocol, RouteContract, ServiceContract};
pub use decoder::{AnyPayload, Decoder, Typed};
pub use error::{BoxError, Error, Result};
pub use form::Fields;
pub use handler::{BoxFuture, Handler};
pub use http::StatusCode;
pub use method::Method;
pub use pipeline::{Pipeline, Route};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
pub use service::{RunningService, Service};
