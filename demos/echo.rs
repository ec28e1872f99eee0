//! Echo service plus a caller, in one process.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example echo
//!
//! The echo service answers four routes: one per body encoding plus `Hello`,
//! which takes its name from the path. The caller sends the same payload to
//! each body route, greets `Hello`, and prints what comes back. While the demo
//! is running the service also answers curl:
//!   curl -X POST http://localhost:8080/echo/v0/json \
//!        -H 'content-type: application/json' \
//!        -d '{"Foo":"foo","Bar":"bar","FooBar":["foo","bar"]}'

use std::sync::Arc;

use accord::middleware::Trace;
use accord::{
    Context, DataType, Fields, Method, Route, RouteContract, Service, ServiceClient,
    ServiceContract, ServiceRequest, Typed,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
struct Echo {
    #[serde(rename = "Foo")]
    foo: String,
    #[serde(rename = "Bar")]
    bar: String,
    #[serde(rename = "FooBar")]
    foo_bar: Vec<String>,
}

#[tokio::main]
async fn main() -> accord::Result<()> {
    tracing_subscriber::fmt::init();

    let contract = Arc::new(
        ServiceContract::new("EchoService")
            .description("Echoes payloads back in every encoding")
            .namespace("echo")
            .route(RouteContract::new("BinaryEcho", Method::Post, "/binary"))
            .route(RouteContract::new("JsonEcho", Method::Post, "/json").with_encoding(DataType::Json))
            .route(RouteContract::new("FormEcho", Method::Post, "/form").with_encoding(DataType::Form))
            .route(RouteContract::new("Hello", Method::Get, "/hello/:name").with_encoding(DataType::RouteParams)),
    );

    let running = Service::new(Arc::clone(&contract))
        .route_with("BinaryEcho", Route::new(echo_struct).middleware(Trace).decoder(Typed::<Echo>::new()))
        .route_with("JsonEcho", Route::new(echo_struct).middleware(Trace).decoder(Typed::<Echo>::new()))
        .route_with("FormEcho", Route::new(echo_form).middleware(Trace))
        .route_with("Hello", Route::new(hello).middleware(Trace))
        .start()
        .await?;

    let client = ServiceClient::new(contract);
    let payload = Echo { foo: "foo".into(), bar: "bar".into(), foo_bar: vec!["foo".into(), "bar".into()] };

    for label in ["BinaryEcho", "JsonEcho", "FormEcho"] {
        let res = client.send(label, ServiceRequest::with_body(&payload)).await?;
        println!("{label}: {} {}", res.status(), res.text());
    }
    let res = client.send("Hello", ServiceRequest::new().param("name", "accord")).await?;
    println!("Hello: {} {}", res.status(), res.text());

    println!("serving on {}; Ctrl-C to stop", running.local_addr());
    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("failed to wait for Ctrl-C: {e}");
    }
    running.stop().await
}

async fn echo_struct(mut ctx: Context) -> Context {
    if let Some(echo) = ctx.take_payload::<Echo>() {
        ctx.write_str(&format!("Foo={} Bar={} FooBar={}", echo.foo, echo.bar, echo.foo_bar.join(",")));
    }
    ctx
}

async fn echo_form(mut ctx: Context) -> Context {
    let line = ctx.payload::<Fields>().and_then(|f| f.encode().ok()).unwrap_or_default();
    ctx.write_str(&line);
    ctx
}

async fn hello(mut ctx: Context) -> Context {
    let name = ctx.param("name").unwrap_or("stranger").to_owned();
    ctx.write_str(&format!("hello, {name}"));
    ctx
}
