//! Outbound dispatch to other services.
//!
//! A [`ServiceClient`] wraps a peer's [`ServiceContract`]. Sending a request
//! resolves the route's URL, encodes the payload with the route's
//! [`DataType`] (or a per-request override), fills in path params and the
//! query string, and hands the result to a [`Transport`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use accord::{Method, RouteContract, ServiceClient, ServiceContract, ServiceRequest};
//!
//! # async fn run() -> accord::Result<()> {
//! let users = Arc::new(
//!     ServiceContract::new("UserService")
//!         .route(RouteContract::new("GetUser", Method::Get, "/users/:id")),
//! );
//! let client = ServiceClient::new(users);
//! let res = client.send("GetUser", ServiceRequest::new().param("id", "42")).await?;
//! println!("{}", res.text());
//! # Ok(())
//! # }
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::codec::{self, DataType, Encoded};
use crate::config::ClientConfig;
use crate::contract::ServiceContract;
use crate::error::{Error, Result};
use crate::form::Fields;
use crate::handler::BoxFuture;
use crate::template;

// ── ServiceRequest ────────────────────────────────────────────────────────────

/// One outbound call: an optional payload plus anything the caller wants to
/// set by hand.
#[derive(Clone, Debug)]
pub struct ServiceRequest<B = ()> {
    route_params: BTreeMap<String, String>,
    query: Fields,
    body: Option<B>,
    data_type: Option<DataType>,
    timeout: Option<Duration>,
}

impl ServiceRequest<()> {
    /// A request without a payload.
    pub fn new() -> Self {
        Self::empty(None)
    }
}

impl Default for ServiceRequest<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> ServiceRequest<B> {
    /// A request carrying `body`, encoded with the route's data type.
    pub fn with_body(body: B) -> Self {
        Self::empty(Some(body))
    }

    fn empty(body: Option<B>) -> Self {
        Self {
            route_params: BTreeMap::new(),
            query: Fields::new(),
            body,
            data_type: None,
            timeout: None,
        }
    }

    /// Sets a path param by hand. Takes precedence over a same-named field of
    /// a `RouteParams` payload.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.route_params.insert(name.into(), value.into());
        self
    }

    /// Adds a query string value.
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.append(name, value);
        self
    }

    /// Encodes this request's payload as `data_type` instead of the route's.
    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    /// Overrides the client's configured timeout for this request only.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn body(&self) -> Option<&B> {
        self.body.as_ref()
    }
}

// ── ClientResponse ────────────────────────────────────────────────────────────

/// A peer's response, with the body fully read.
#[derive(Clone, Debug)]
pub struct ClientResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ClientResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self { status, headers, body }
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// The body as UTF-8, with invalid sequences replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::encoding("json", e))
    }

    /// Decodes the body according to its `Content-Type`, falling back to
    /// binary. `None` for an empty body.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        let data_type = self
            .header(http::header::CONTENT_TYPE.as_str())
            .and_then(DataType::from_content_type)
            .unwrap_or(DataType::Binary);
        codec::decode(data_type, &self.body)
    }
}

// ── Transport ─────────────────────────────────────────────────────────────────

/// Delivers a prepared request and reads back the response.
///
/// [`HyperTransport`] is the default. Swap in your own to add TLS, retries or
/// a test double.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: http::Request<Full<Bytes>>) -> BoxFuture<'static, Result<ClientResponse>>;
}

/// Plain-HTTP transport over hyper's pooled client.
///
/// `https` URLs are refused with [`Error::Transport`].
#[derive(Clone, Debug)]
pub struct HyperTransport {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HyperTransport {
    pub fn new() -> Self {
        Self { client: Client::builder(TokioExecutor::new()).build_http() }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HyperTransport {
    fn send(&self, request: http::Request<Full<Bytes>>) -> BoxFuture<'static, Result<ClientResponse>> {
        let client = self.client.clone();
        Box::pin(async move {
            if request.uri().scheme_str() != Some("http") {
                return Err(Error::Transport(
                    format!("unsupported scheme in `{}`", request.uri()).into(),
                ));
            }
            let response = client.request(request).await.map_err(|e| Error::Transport(e.into()))?;
            let (parts, body) = response.into_parts();
            let body = body.collect().await.map_err(|e| Error::Transport(e.into()))?.to_bytes();
            Ok(ClientResponse::new(parts.status, parts.headers, body))
        })
    }
}

// ── ServiceClient ─────────────────────────────────────────────────────────────

/// Calls the routes of one peer service.
#[derive(Clone)]
pub struct ServiceClient {
    contract: Arc<ServiceContract>,
    transport: Arc<dyn Transport>,
    config: ClientConfig,
}

impl ServiceClient {
    /// A client over a fresh [`HyperTransport`].
    pub fn new(contract: Arc<ServiceContract>) -> Self {
        Self::with_transport(contract, Arc::new(HyperTransport::new()))
    }

    pub fn with_transport(contract: Arc<ServiceContract>, transport: Arc<dyn Transport>) -> Self {
        Self { contract, transport, config: ClientConfig::default() }
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn contract(&self) -> &ServiceContract {
        &self.contract
    }

    /// The peer service's label.
    pub fn label(&self) -> &str {
        &self.contract.label
    }

    /// Builds the outbound request for route `label` without sending it.
    ///
    /// Steps, in order: look up the route, pick the data type, encode the
    /// payload, substitute path params, append the query string.
    pub fn prepare<B: Serialize>(
        &self,
        label: &str,
        request: &ServiceRequest<B>,
    ) -> Result<http::Request<Full<Bytes>>> {
        let route = self.contract.require_route(label)?;
        let data_type = request.data_type.unwrap_or_else(|| self.contract.encoding_of(route));

        let mut params = request.route_params.clone();
        let mut query = request.query.clone();
        let mut body = Bytes::new();
        let mut content_type = None;

        if let Some(payload) = &request.body {
            match codec::encode(data_type, payload)? {
                Encoded::Body { bytes, content_type: ct } => {
                    body = Bytes::from(bytes);
                    content_type = Some(ct);
                }
                Encoded::Path(fields) => {
                    for (name, values) in fields {
                        if let Some(value) = values.into_iter().next() {
                            params.entry(name).or_insert(value);
                        }
                    }
                }
                Encoded::Query(fields) => query.merge(fields),
            }
        }

        let url = self.contract.route_url(label)?;
        let url = template::substitute_in_url(&url, &route.path, &params)?;
        let url = template::append_query(&url, &query)?;
        let uri: Uri = url
            .parse()
            .map_err(|e: http::uri::InvalidUri| Error::InvalidUrl { url: url.clone(), reason: e.to_string() })?;

        let mut builder = http::Request::builder()
            .method(http::Method::from(route.method))
            .uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header(http::header::CONTENT_TYPE, ct.as_str());
        }
        builder
            .body(Full::new(body))
            .map_err(|e| Error::InvalidUrl { url, reason: e.to_string() })
    }

    /// Sends `request` to route `label` and reads the whole response.
    ///
    /// Any status is returned as `Ok`; only failures to build, deliver or
    /// time the request are errors.
    pub async fn send<B: Serialize>(&self, label: &str, request: ServiceRequest<B>) -> Result<ClientResponse> {
        let timeout = request.timeout.or(self.config.timeout);
        let outbound = self.prepare(label, &request)?;
        drop(request);

        debug!(
            service = %self.contract.label,
            route = label,
            method = %outbound.method(),
            uri = %outbound.uri(),
            "sending request"
        );

        let pending = self.transport.send(outbound);
        let response = match timeout {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(service = %self.contract.label, route = label, ?limit, "request timed out");
                    return Err(Error::Timeout(limit));
                }
            },
            None => pending.await?,
        };

        debug!(service = %self.contract.label, route = label, status = %response.status(), "response received");
        Ok(response)
    }

    /// [`send`](Self::send) without a payload.
    pub async fn call(&self, label: &str) -> Result<ClientResponse> {
        self.send(label, ServiceRequest::new()).await
    }
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClient")
            .field("service", &self.contract.label)
            .field("base_url", &self.contract.base_url())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ── ServiceClients ────────────────────────────────────────────────────────────

/// The clients a service holds for its subscriptions, keyed by peer label.
#[derive(Clone, Debug, Default)]
pub struct ServiceClients {
    clients: Vec<ServiceClient>,
}

impl ServiceClients {
    /// One client per subscription of `contract`, all sharing `transport`.
    pub(crate) fn for_subscriptions(
        contract: &ServiceContract,
        transport: &Arc<dyn Transport>,
        config: &ClientConfig,
    ) -> Self {
        let clients = contract
            .subscriptions
            .iter()
            .map(|peer| {
                ServiceClient::with_transport(Arc::clone(peer), Arc::clone(transport))
                    .with_config(config.clone())
            })
            .collect();
        Self { clients }
    }

    pub fn get(&self, label: &str) -> Option<&ServiceClient> {
        self.clients.iter().find(|c| c.label() == label)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ServiceClient> {
        self.clients.iter()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::contract::RouteContract;
    use crate::method::Method;

    /// What a [`Recorder`] saw.
    #[derive(Clone, Debug)]
    pub(crate) struct Seen {
        pub method: http::Method,
        pub uri: String,
        pub content_type: Option<String>,
        pub body: Bytes,
    }

    /// Records every request and answers `200 OK` with an empty body.
    #[derive(Clone, Default)]
    pub(crate) struct Recorder {
        pub seen: Arc<Mutex<Vec<Seen>>>,
    }

    impl Recorder {
        pub(crate) fn last(&self) -> Seen {
            self.seen.lock().unwrap().last().cloned().expect("no request recorded")
        }

        pub(crate) fn count(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl Transport for Recorder {
        fn send(&self, request: http::Request<Full<Bytes>>) -> BoxFuture<'static, Result<ClientResponse>> {
            let seen = Arc::clone(&self.seen);
            Box::pin(async move {
                let (parts, body) = request.into_parts();
                let body = body.collect().await.map_err(|e| Error::Transport(e.into()))?.to_bytes();
                seen.lock().unwrap().push(Seen {
                    method: parts.method,
                    uri: parts.uri.to_string(),
                    content_type: parts
                        .headers
                        .get(http::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_owned),
                    body,
                });
                Ok(ClientResponse::new(StatusCode::OK, HeaderMap::new(), Bytes::new()))
            })
        }
    }

    struct Stalled;

    impl Transport for Stalled {
        fn send(&self, _request: http::Request<Full<Bytes>>) -> BoxFuture<'static, Result<ClientResponse>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(ClientResponse::new(StatusCode::OK, HeaderMap::new(), Bytes::new()))
            })
        }
    }

    fn users() -> Arc<ServiceContract> {
        Arc::new(
            ServiceContract::new("UserService")
                .host("users.local")
                .port(9000)
                .namespace("api")
                .route(RouteContract::new("GetUser", Method::Get, "/users/:id").with_encoding(DataType::RouteParams))
                .route(RouteContract::new("Search", Method::Get, "/users").with_encoding(DataType::QueryParams))
                .route(RouteContract::new("Create", Method::Post, "/users").with_encoding(DataType::Json))
                .route(RouteContract::new("Import", Method::Put, "/users/import")),
        )
    }

    fn client() -> (ServiceClient, Recorder) {
        let recorder = Recorder::default();
        (ServiceClient::with_transport(users(), Arc::new(recorder.clone())), recorder)
    }

    #[tokio::test]
    async fn json_routes_send_a_json_body() {
        let (client, recorder) = client();
        let res = client.send("Create", ServiceRequest::with_body(json!({ "name": "ana" }))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let seen = recorder.last();
        assert_eq!(seen.method, http::Method::POST);
        assert_eq!(seen.uri, "http://users.local:9000/api/v0/users");
        assert_eq!(seen.content_type.as_deref(), Some("application/json"));
        assert_eq!(&seen.body[..], br#"{"name":"ana"}"#);
    }

    #[tokio::test]
    async fn routes_without_encoding_use_the_service_default() {
        let (client, recorder) = client();
        client.send("Import", ServiceRequest::with_body(json!({ "n": 1 }))).await.unwrap();
        assert_eq!(recorder.last().content_type.as_deref(), Some("application/msgpack"));
    }

    #[tokio::test]
    async fn route_params_fill_the_path_template() {
        let (client, recorder) = client();
        client.send("GetUser", ServiceRequest::with_body(json!({ "id": 42 }))).await.unwrap();
        let seen = recorder.last();
        assert_eq!(seen.uri, "http://users.local:9000/api/v0/users/42");
        assert_eq!(seen.content_type, None);
        assert!(seen.body.is_empty());
    }

    #[tokio::test]
    async fn explicit_params_win_over_payload_fields() {
        let (client, recorder) = client();
        let req = ServiceRequest::with_body(json!({ "id": 1 })).param("id", "7");
        client.send("GetUser", req).await.unwrap();
        assert!(recorder.last().uri.ends_with("/users/7"));
    }

    #[tokio::test]
    async fn query_params_become_the_query_string() {
        let (client, recorder) = client();
        let req = ServiceRequest::with_body(json!({ "tag": ["a", "b"], "q": "x y" })).query("page", "2");
        client.send("Search", req).await.unwrap();
        assert_eq!(recorder.last().uri, "http://users.local:9000/api/v0/users?page=2&q=x+y&tag=a&tag=b");
    }

    #[tokio::test]
    async fn missing_param_fails_before_sending() {
        let (client, recorder) = client();
        let err = client.call("GetUser").await.unwrap_err();
        assert!(matches!(err, Error::MissingRouteParam { ref name } if name == "id"));
        assert_eq!(recorder.count(), 0);
    }

    #[tokio::test]
    async fn unknown_route_is_not_sent() {
        let (client, recorder) = client();
        let err = client.call("Nope").await.unwrap_err();
        assert!(matches!(err, Error::RouteNotFound { .. }));
        assert_eq!(recorder.count(), 0);
    }

    #[tokio::test]
    async fn per_request_data_type_overrides_the_route() {
        let (client, recorder) = client();
        let req = ServiceRequest::with_body(json!({ "Foo": "foo" })).data_type(DataType::Form);
        client.send("Create", req).await.unwrap();
        let seen = recorder.last();
        assert_eq!(seen.content_type.as_deref(), Some("application/x-www-form-urlencoded"));
        assert_eq!(&seen.body[..], b"Foo=foo");
    }

    #[tokio::test]
    async fn unconvertible_fields_fail_encoding() {
        let (client, recorder) = client();
        let req = ServiceRequest::with_body(json!({ "id": { "nested": true } }));
        let err = client.send("GetUser", req).await.unwrap_err();
        assert!(matches!(err, Error::TypeConversion { .. }));
        assert_eq!(recorder.count(), 0);
    }

    #[tokio::test]
    async fn slow_peers_time_out() {
        let client = ServiceClient::with_transport(users(), Arc::new(Stalled))
            .with_config(ClientConfig::with_timeout(Duration::from_secs(60)));
        let req = ServiceRequest::new().timeout(Duration::from_millis(20));
        let err = client.send("Search", req).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn hyper_transport_refuses_https() {
        let req = http::Request::builder()
            .uri("https://users.local/api")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let err = HyperTransport::new().send(req).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn responses_decode_by_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, "application/json".parse().unwrap());
        let res = ClientResponse::new(StatusCode::OK, headers, Bytes::from_static(br#"{"id":3}"#));
        let value: serde_json::Value = res.decode().unwrap().unwrap();
        assert_eq!(value["id"], 3);
        assert_eq!(res.text(), r#"{"id":3}"#);
    }

    #[test]
    fn subscriptions_get_one_client_each() {
        let caller = ServiceContract::new("Caller").subscribe(users());
        let transport: Arc<dyn Transport> = Arc::new(Recorder::default());
        let clients = ServiceClients::for_subscriptions(&caller, &transport, &ClientConfig::default());
        assert_eq!(clients.len(), 1);
        assert!(clients.get("UserService").is_some());
        assert!(clients.get("Caller").is_none());
    }
}
