//! Unified error type.

use std::time::Duration;

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed cause carried by codec and transport failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by accord's fallible operations.
///
/// Contract violations (`RouteNotFound`, `DuplicateRoute`) are raised while a
/// [`Service`](crate::Service) is being built, before anything listens.
/// Codec errors are returned to whoever asked for the encode or decode; the
/// pipeline turns an inbound decode failure into a `400` response.
#[derive(Debug, Error)]
pub enum Error {
    /// The label is not declared by the service contract.
    #[error("route `{label}` not found in service `{service}`")]
    RouteNotFound { service: String, label: String },

    /// A `:name` placeholder in a path template had no value.
    #[error("missing value for route param `{name}`")]
    MissingRouteParam { name: String },

    /// The underlying serializer failed.
    #[error("{format} encoding failed: {source}")]
    Encoding {
        format: &'static str,
        #[source]
        source: BoxError,
    },

    /// A payload field could not be turned into a string.
    #[error("could not convert field `{field}` to string: {reason}")]
    TypeConversion { field: String, reason: String },

    /// An inbound payload failed to decode as its declared type.
    #[error("rejected {format} payload: {reason}")]
    DecodeRejected { format: &'static str, reason: String },

    /// A route label is declared or registered more than once.
    #[error("route `{label}` is registered more than once in service `{service}`")]
    DuplicateRoute { service: String, label: String },

    /// The router refused a path template, usually because it conflicts with
    /// one already registered for the same method.
    #[error("invalid route path `{path}`: {reason}")]
    InvalidRoute { path: String, reason: String },

    /// The resolved URL or the request built from it is not valid.
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The transport failed to deliver the request.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// The request did not complete within the caller-supplied timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Binding or accepting on the listener failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn encoding(
        format: &'static str,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Encoding { format, source: source.into() }
    }

    pub(crate) fn route_not_found(service: &str, label: &str) -> Self {
        Self::RouteNotFound { service: service.to_owned(), label: label.to_owned() }
    }

    /// True for errors caused by the inbound payload rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::DecodeRejected { .. } | Self::TypeConversion { .. } | Self::MissingRouteParam { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_not_found_names_service_and_label() {
        let err = Error::route_not_found("EchoService", "Missing");
        assert_eq!(err.to_string(), "route `Missing` not found in service `EchoService`");
    }

    #[test]
    fn encoding_keeps_source() {
        let cause = std::io::Error::other("boom");
        let err = Error::encoding("json", cause);
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("boom"));
    }

    #[test]
    fn decode_rejection_is_a_client_error() {
        let err = Error::DecodeRejected { format: "json", reason: "eof".into() };
        assert!(err.is_client_error());
        assert!(!Error::Timeout(Duration::from_secs(1)).is_client_error());
    }
}
