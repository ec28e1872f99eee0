//! Payload codec.
//!
//! A route's [`DataType`] decides how its payload travels:
//!
//! | DataType | Outbound | Inbound |
//! |---|---|---|
//! | `Binary` (default) | MessagePack body, `application/msgpack` | MessagePack |
//! | `Json` | JSON body, `application/json` | JSON |
//! | `Form` | flattened fields, `application/x-www-form-urlencoded` | form fields |
//! | `RouteParams` | flattened fields fill the path template | left to the router |
//! | `QueryParams` | flattened fields become the query string | left to the router |
//!
//! MessagePack is written with named fields, so bodies stay self-describing
//! and decode into either the sending type or a [`serde_json::Value`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::form::{self, Fields};
use crate::response::ContentType;

/// How a route's payload is put on the wire.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    #[default]
    Binary,
    Json,
    Form,
    RouteParams,
    QueryParams,
}

impl DataType {
    /// Short lowercase name used in logs and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Binary      => "binary",
            Self::Json        => "json",
            Self::Form        => "form",
            Self::RouteParams => "route params",
            Self::QueryParams => "query params",
        }
    }

    /// Content type of the body this data type produces, if it produces one.
    pub fn content_type(self) -> Option<ContentType> {
        match self {
            Self::Binary => Some(ContentType::MsgPack),
            Self::Json   => Some(ContentType::Json),
            Self::Form   => Some(ContentType::FormData),
            Self::RouteParams | Self::QueryParams => None,
        }
    }

    /// Maps a `Content-Type` header value back to a body-carrying data type.
    ///
    /// Parameters such as `; charset=utf-8` are ignored.
    pub fn from_content_type(value: &str) -> Option<Self> {
        let essence = value.split(';').next().unwrap_or_default().trim();
        let is = |name: &str| essence.eq_ignore_ascii_case(name);
        if is("application/json") {
            Some(Self::Json)
        } else if is("application/msgpack")
            || is("application/x-msgpack")
            || is("application/octet-stream")
        {
            Some(Self::Binary)
        } else if is("application/x-www-form-urlencoded") {
            Some(Self::Form)
        } else {
            None
        }
    }
}

/// An encoded outbound payload.
#[derive(Debug)]
pub enum Encoded {
    /// Bytes for the request body.
    Body { bytes: Vec<u8>, content_type: ContentType },
    /// Fields that fill the route's path template.
    Path(Fields),
    /// Fields appended to the URL as a query string.
    Query(Fields),
}

/// Encodes `payload` the way `data_type` prescribes.
pub fn encode<T: Serialize + ?Sized>(data_type: DataType, payload: &T) -> Result<Encoded> {
    match data_type {
        DataType::Binary => Ok(Encoded::Body {
            bytes: rmp_serde::to_vec_named(payload).map_err(|e| Error::encoding("binary", e))?,
            content_type: ContentType::MsgPack,
        }),
        DataType::Json => Ok(Encoded::Body {
            bytes: serde_json::to_vec(payload).map_err(|e| Error::encoding("json", e))?,
            content_type: ContentType::Json,
        }),
        DataType::Form => Ok(Encoded::Body {
            bytes: form::flatten(payload)?.encode()?.into_bytes(),
            content_type: ContentType::FormData,
        }),
        DataType::RouteParams => Ok(Encoded::Path(form::flatten(payload)?)),
        DataType::QueryParams => Ok(Encoded::Query(form::flatten(payload)?)),
    }
}

/// Decodes a request body the way `data_type` prescribes.
///
/// Returns `Ok(None)` for an empty body and for `RouteParams` / `QueryParams`,
/// whose values live in the URL rather than the body.
pub fn decode<T: DeserializeOwned>(data_type: DataType, body: &[u8]) -> Result<Option<T>> {
    if body.is_empty() {
        return Ok(None);
    }
    let value = match data_type {
        DataType::Binary => rmp_serde::from_slice(body).map_err(|e| Error::encoding("binary", e))?,
        DataType::Json => serde_json::from_slice(body).map_err(|e| Error::encoding("json", e))?,
        DataType::Form => form::from_fields(Fields::parse(body)?)?,
        DataType::RouteParams | DataType::QueryParams => return Ok(None),
    };
    Ok(Some(value))
}
