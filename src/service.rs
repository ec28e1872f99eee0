//! Serving a contract.
//!
//! A [`Service`] pairs a [`ServiceContract`] with the stages of each route it
//! implements, builds clients for every subscription, and runs the server.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use accord::{Context, DataType, Method, RouteContract, Service, ServiceContract};
//! use accord::middleware::Trace;
//!
//! async fn echo(mut ctx: Context) -> Context {
//!     let body = ctx.body().to_vec();
//!     ctx.write(&body);
//!     ctx
//! }
//!
//! #[tokio::main]
//! async fn main() -> accord::Result<()> {
//!     let contract = Arc::new(
//!         ServiceContract::new("EchoService")
//!             .namespace("echo")
//!             .route(RouteContract::new("Echo", Method::Post, "/echo").with_encoding(DataType::Json)),
//!     );
//!
//!     Service::new(contract)
//!         .route_with("Echo", accord::Route::new(echo).middleware(Trace))
//!         .serve()
//!         .await
//! }
//! ```

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::client::{HyperTransport, ServiceClients, Transport};
use crate::config::ClientConfig;
use crate::contract::ServiceContract;
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::pipeline::{Pipeline, Route};
use crate::router::Router;
use crate::server::Server;

/// A contract plus the code behind its routes.
pub struct Service {
    contract: Arc<ServiceContract>,
    routes: Vec<(String, Route)>,
    client_config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
}

impl Service {
    pub fn new(contract: Arc<ServiceContract>) -> Self {
        Self {
            contract,
            routes: Vec::new(),
            client_config: ClientConfig::default(),
            transport: None,
        }
    }

    /// Serves route `label` with `handler` alone.
    pub fn route(self, label: impl Into<String>, handler: impl Handler) -> Self {
        self.route_with(label, Route::new(handler))
    }

    /// Serves route `label` with a full set of stages.
    pub fn route_with(mut self, label: impl Into<String>, route: Route) -> Self {
        self.routes.push((label.into(), route));
        self
    }

    /// Settings for the clients built for each subscription.
    pub fn client_config(mut self, config: ClientConfig) -> Self {
        self.client_config = config;
        self
    }

    /// Transport shared by every subscription client. Defaults to
    /// [`HyperTransport`].
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn contract(&self) -> &ServiceContract {
        &self.contract
    }

    /// Composes every registered route into a [`Router`].
    ///
    /// Fails when the contract repeats a label, a label is not in the
    /// contract, or a label is registered twice. Contract routes with no
    /// registration are logged and left unserved.
    pub fn into_router(self) -> Result<Router> {
        let contract = self.contract;
        contract.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::new()),
        };
        let clients = Arc::new(ServiceClients::for_subscriptions(&contract, &transport, &self.client_config));
        let prefix = contract.prefix();

        let mut router = Router::new();
        let mut registered = HashSet::with_capacity(self.routes.len());

        for (label, stages) in self.routes {
            let route = contract.require_route(&label)?.clone();
            if !registered.insert(label.clone()) {
                return Err(Error::DuplicateRoute { service: contract.label.clone(), label });
            }

            let path = format!("{prefix}{}", route.path);
            let declared = contract.encoding_of(&route);
            info!(
                service = %contract.label,
                route = %label,
                method = %route.method,
                %path,
                data_type = declared.name(),
                "registered route"
            );
            let method = route.method;
            router.insert(method, &path, Pipeline::compose(route, declared, stages, Arc::clone(&clients)))?;
        }

        for route in contract.routes.iter().filter(|r| !registered.contains(&r.label)) {
            warn!(service = %contract.label, route = %route.label, "route declared but not served");
        }

        Ok(router)
    }

    /// Binds the contract's `host:port` and serves in the background.
    pub async fn start(self) -> Result<RunningService> {
        let addr = self.contract.listen_addr();
        let router = self.into_router()?;
        let server = Server::bind(addr).await?;
        RunningService::spawn(server, router)
    }

    /// Serves in the background on an already bound listener.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_on(self, listener: TcpListener) -> Result<RunningService> {
        let router = self.into_router()?;
        RunningService::spawn(Server::from_listener(listener), router)
    }

    /// Binds the contract's `host:port` and serves until SIGTERM or Ctrl-C.
    pub async fn serve(self) -> Result<()> {
        let addr = self.contract.listen_addr();
        let router = self.into_router()?;
        Server::bind(addr).await?.serve(router).await
    }
}

/// Handle to a service serving in the background.
///
/// Dropping the handle stops the server without waiting for it.
pub struct RunningService {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<()>>>,
}

impl RunningService {
    fn spawn(server: Server, router: Router) -> Result<Self> {
        let local_addr = server.local_addr()?;
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(server.serve_with_shutdown(router, async move {
            let _ = rx.await;
        }));
        Ok(Self { local_addr, shutdown: Some(tx), task: Some(task) })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting, drains in-flight connections, and waits for the
    /// server to finish.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.take() {
            Some(task) => task.await.map_err(|e| Error::Io(std::io::Error::other(e)))?,
            None => Ok(()),
        }
    }
}

impl Drop for RunningService {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl std::fmt::Debug for RunningService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningService").field("local_addr", &self.local_addr).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::Recorder;
    use crate::codec::DataType;
    use crate::context::Context;
    use crate::contract::RouteContract;
    use crate::method::Method;

    async fn ok(ctx: Context) -> Context {
        ctx
    }

    fn contract() -> Arc<ServiceContract> {
        Arc::new(
            ServiceContract::new("EchoService")
                .namespace("echo")
                .route(RouteContract::new("Get", Method::Get, "/echo/:id"))
                .route(RouteContract::new("Post", Method::Post, "/echo").with_encoding(DataType::Json)),
        )
    }

    #[test]
    fn registers_routes_under_the_prefix() {
        let router = Service::new(contract()).route("Get", ok).route("Post", ok).into_router().unwrap();
        assert_eq!(router.len(), 2);

        let (pipeline, params) = router.lookup(Method::Get, "/echo/v0/echo/7").unwrap();
        assert_eq!(pipeline.route().label, "Get");
        assert_eq!(params.get("id").map(String::as_str), Some("7"));
        assert!(router.lookup(Method::Get, "/echo/7").is_none());
    }

    #[test]
    fn unknown_label_is_route_not_found() {
        let err = Service::new(contract()).route("Missing", ok).into_router().unwrap_err();
        assert!(matches!(err, Error::RouteNotFound { ref label, .. } if label == "Missing"));
    }

    #[test]
    fn registering_a_label_twice_fails() {
        let err = Service::new(contract()).route("Post", ok).route("Post", ok).into_router().unwrap_err();
        assert!(matches!(err, Error::DuplicateRoute { .. }));
    }

    #[test]
    fn duplicate_contract_labels_fail() {
        let contract = Arc::new(
            ServiceContract::new("S")
                .route(RouteContract::new("A", Method::Get, "/a"))
                .route(RouteContract::new("A", Method::Get, "/b")),
        );
        let err = Service::new(contract).route("A", ok).into_router().unwrap_err();
        assert!(matches!(err, Error::DuplicateRoute { .. }));
    }

    #[test]
    fn custom_transport_is_accepted() {
        let caller = Arc::new(ServiceContract::new("Caller").subscribe(contract()));
        let router = Service::new(caller).transport(Recorder::default()).into_router().unwrap();
        assert!(router.is_empty());
    }

    #[tokio::test]
    async fn start_on_reports_the_bound_address_and_stops() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let running = Service::new(contract()).route("Get", ok).start_on(listener).unwrap();
        assert_eq!(running.local_addr(), addr);
        running.stop().await.unwrap();
    }
}
