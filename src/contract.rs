//! Route and service contracts, and URL resolution.
//!
//! A contract is plain data shared by the service that serves it and by every
//! client that calls it. Build it once at startup, wrap it in an `Arc`, and
//! never mutate it again.
//!
//! ```rust
//! use accord::{DataType, Method, RouteContract, ServiceContract};
//!
//! let echo = ServiceContract::new("EchoService")
//!     .namespace("echo")
//!     .route(RouteContract::new("SimpleEcho", Method::Get, "/echo"))
//!     .route(RouteContract::new("PostEcho", Method::Post, "/echo").with_encoding(DataType::Json));
//!
//! assert_eq!(echo.route_url("PostEcho").unwrap(), "http://localhost:8080/echo/v0/echo");
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::codec::DataType;
use crate::config::Defaults;
use crate::error::{Error, Result};
use crate::method::Method;

/// URL scheme a service is reached on.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http  => "http",
            Self::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── RouteContract ─────────────────────────────────────────────────────────────

/// Declaration of one endpoint.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RouteContract {
    /// Unique within its service. Used for lookups, logs and errors.
    pub label: String,
    /// Free text for humans.
    pub description: String,
    pub method: Method,
    /// Path template, relative to the service prefix. `:name` marks a
    /// variable segment.
    pub path: String,
    /// Payload encoding. `None` falls back to the service's default.
    pub encoding: Option<DataType>,
}

impl RouteContract {
    pub fn new(label: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            method,
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_encoding(mut self, encoding: DataType) -> Self {
        self.encoding = Some(encoding);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

// ── ServiceContract ───────────────────────────────────────────────────────────

/// Declaration of a service: where it lives, what it serves, and which other
/// services it calls.
#[derive(Clone, Debug)]
pub struct ServiceContract {
    pub label: String,
    pub description: String,
    pub host: String,
    pub port: u16,
    pub namespace: String,
    pub version: String,
    pub protocol: Protocol,
    /// Encoding for routes that do not declare one.
    pub encoding: DataType,
    pub routes: Vec<RouteContract>,
    pub subscriptions: Vec<Arc<ServiceContract>>,
}

impl Default for ServiceContract {
    fn default() -> Self {
        Self::with_defaults("", &Defaults::default())
    }
}

impl ServiceContract {
    /// A contract with [`Defaults::default()`].
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_defaults(label, &Defaults::default())
    }

    /// A contract whose identity and encoding come from `defaults`.
    pub fn with_defaults(label: impl Into<String>, defaults: &Defaults) -> Self {
        Self {
            label: label.into(),
            description: String::new(),
            host: defaults.host.clone(),
            port: defaults.port,
            namespace: defaults.namespace.clone(),
            version: defaults.version.clone(),
            protocol: defaults.protocol,
            encoding: defaults.encoding,
            routes: Vec::new(),
            subscriptions: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn encoding(mut self, encoding: DataType) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn route(mut self, route: RouteContract) -> Self {
        self.routes.push(route);
        self
    }

    /// Declares a dependency on another service.
    pub fn subscribe(mut self, service: Arc<ServiceContract>) -> Self {
        self.subscriptions.push(service);
        self
    }

    /// The route declared under `label`.
    pub fn route_contract(&self, label: &str) -> Option<&RouteContract> {
        self.routes.iter().find(|r| r.label == label)
    }

    /// Like [`route_contract`](Self::route_contract), failing with
    /// [`Error::RouteNotFound`].
    pub fn require_route(&self, label: &str) -> Result<&RouteContract> {
        self.route_contract(label)
            .ok_or_else(|| Error::route_not_found(&self.label, label))
    }

    /// The effective encoding of `route`.
    pub fn encoding_of(&self, route: &RouteContract) -> DataType {
        route.encoding.unwrap_or(self.encoding)
    }

    /// Checks that every route label is unique.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.routes.len());
        for route in &self.routes {
            if !seen.insert(route.label.as_str()) {
                return Err(Error::DuplicateRoute {
                    service: self.label.clone(),
                    label: route.label.clone(),
                });
            }
        }
        Ok(())
    }

    /// `host:port`, suitable for binding a listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bracketed_host(), self.port)
    }

    /// `protocol://host:port`.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.bracketed_host(), self.port)
    }

    /// `/namespace/version`, each part present only when non-empty.
    ///
    /// Surrounding slashes in either part are normalized, so `"/"` counts as
    /// an empty namespace and `"api/"` becomes `/api`.
    pub fn prefix(&self) -> String {
        let mut out = String::with_capacity(self.namespace.len() + self.version.len() + 2);
        for part in [&self.namespace, &self.version] {
            let part = part.trim_matches('/');
            if !part.is_empty() {
                out.push('/');
                out.push_str(part);
            }
        }
        out
    }

    /// Absolute URL of `label`, with its path template left unsubstituted.
    pub fn route_url(&self, label: &str) -> Result<String> {
        let route = self.require_route(label)?;
        let base = self.base_url();
        let prefix = self.prefix();
        let mut url = String::with_capacity(base.len() + prefix.len() + route.path.len());
        url.push_str(&base);
        url.push_str(&prefix);
        url.push_str(&route.path);
        Ok(url)
    }

    fn bracketed_host(&self) -> std::borrow::Cow<'_, str> {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host).into()
        } else {
            self.host.as_str().into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_service() -> ServiceContract {
        ServiceContract::new("EchoService")
            .host("myhost.com")
            .port(9000)
            .namespace("nomiddlewaretest")
            .route(RouteContract::new("SimpleEcho", Method::Get, "/echo"))
            .route(RouteContract::new("GetUser", Method::Get, "/users/:id"))
    }

    #[test]
    fn resolves_host_port_prefix_and_raw_template_in_order() {
        let sc = echo_service();
        assert_eq!(sc.route_url("SimpleEcho").unwrap(), "http://myhost.com:9000/nomiddlewaretest/v0/echo");
        assert_eq!(sc.route_url("GetUser").unwrap(), "http://myhost.com:9000/nomiddlewaretest/v0/users/:id");
    }

    #[test]
    fn unknown_label_is_route_not_found() {
        match echo_service().route_url("Nope") {
            Err(Error::RouteNotFound { service, label }) => {
                assert_eq!(service, "EchoService");
                assert_eq!(label, "Nope");
            }
            other => panic!("expected RouteNotFound, got {other:?}"),
        }
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let sc = ServiceContract::new("Bare").route(RouteContract::new("Ping", Method::Get, "/ping"));
        assert_eq!(sc.route_url("Ping").unwrap(), "http://localhost:8080/v0/ping");
        assert_eq!(sc.listen_addr(), "localhost:8080");
    }

    #[test]
    fn prefix_normalizes_slashes() {
        let sc = ServiceContract::new("S").namespace("/").version("/v1/");
        assert_eq!(sc.prefix(), "/v1");
        let sc = ServiceContract::new("S").namespace("api/").version("");
        assert_eq!(sc.prefix(), "/api");
    }

    #[test]
    fn injected_defaults_are_used() {
        let defaults = Defaults {
            host: "10.0.0.5".into(),
            protocol: Protocol::Https,
            encoding: DataType::Json,
            ..Defaults::default()
        };
        let sc = ServiceContract::with_defaults("S", &defaults)
            .route(RouteContract::new("R", Method::Post, "/r"))
            .route(RouteContract::new("F", Method::Post, "/f").with_encoding(DataType::Form));
        assert_eq!(sc.base_url(), "https://10.0.0.5:8080");
        assert_eq!(sc.encoding_of(sc.route_contract("R").unwrap()), DataType::Json);
        assert_eq!(sc.encoding_of(sc.route_contract("F").unwrap()), DataType::Form);
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let sc = ServiceContract::new("S").host("::1").port(81);
        assert_eq!(sc.listen_addr(), "[::1]:81");
    }

    #[test]
    fn duplicate_labels_fail_validation() {
        let sc = echo_service().route(RouteContract::new("SimpleEcho", Method::Post, "/other"));
        assert!(matches!(sc.validate(), Err(Error::DuplicateRoute { .. })));
        assert!(echo_service().validate().is_ok());
    }

    #[test]
    fn route_lookup_returns_the_matching_contract() {
        let sc = echo_service();
        assert_eq!(sc.route_contract("GetUser").map(|r| r.path.as_str()), Some("/users/:id"));
        assert_eq!(sc.route_contract("SimpleEcho").map(|r| r.path.as_str()), Some("/echo"));
    }
}
