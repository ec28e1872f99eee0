//! The decoding stage.
//!
//! Runs after middleware and before the handler. It reads the body as the
//! context's negotiated [`DataType`] and stores the result with
//! [`Context::set_payload`]. An `Err` aborts the pipeline with `400 Bad
//! Request` and the error text as the body.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::codec::{self, DataType};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::form::Fields;

/// Turns the request body into the context's payload.
pub trait Decoder: Send + Sync + 'static {
    fn decode(&self, ctx: &mut Context) -> Result<()>;
}

impl<F> Decoder for F
where
    F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
{
    fn decode(&self, ctx: &mut Context) -> Result<()> {
        self(ctx)
    }
}

/// Default decoder for routes that do not name a payload type.
///
/// JSON and binary bodies become a [`serde_json::Value`]; form bodies become
/// [`Fields`]. Route-param and query-param routes, and empty bodies, leave
/// the context without a payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnyPayload;

impl Decoder for AnyPayload {
    fn decode(&self, ctx: &mut Context) -> Result<()> {
        let data_type = ctx.data_type();
        match data_type {
            DataType::Binary | DataType::Json => {
                let value = codec::decode::<Value>(data_type, ctx.body()).map_err(reject(data_type))?;
                if let Some(value) = value {
                    ctx.set_payload(value);
                }
            }
            DataType::Form => {
                if !ctx.body().is_empty() {
                    let fields = Fields::parse(ctx.body()).map_err(reject(data_type))?;
                    ctx.set_payload(fields);
                }
            }
            DataType::RouteParams | DataType::QueryParams => {}
        }
        Ok(())
    }
}

/// Decodes the body straight into `T`.
///
/// ```rust
/// use accord::{Context, Route, Typed};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Echo { text: String }
///
/// async fn echo(mut ctx: Context) -> Context {
///     if let Some(echo) = ctx.take_payload::<Echo>() {
///         ctx.write_str(&echo.text);
///     }
///     ctx
/// }
///
/// let route = Route::new(echo).decoder(Typed::<Echo>::new());
/// ```
pub struct Typed<T>(PhantomData<fn() -> T>);

impl<T> Typed<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Typed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Decoder for Typed<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn decode(&self, ctx: &mut Context) -> Result<()> {
        let data_type = ctx.data_type();
        let payload = codec::decode::<T>(data_type, ctx.body()).map_err(reject(data_type))?;
        if let Some(payload) = payload {
            ctx.set_payload(payload);
        }
        Ok(())
    }
}

fn reject(data_type: DataType) -> impl FnOnce(Error) -> Error {
    move |err| Error::DecodeRejected {
        format: data_type.name(),
        reason: match err {
            Error::Encoding { source, .. } => source.to_string(),
            other => other.to_string(),
        },
    }
}
