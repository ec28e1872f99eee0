//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()`, so no new connections are made.
//! 2. Letting every in-flight request run to completion, then closing its
//!    connection.
//! 3. Returning from [`Server::serve`], which lets `main` exit cleanly.
//!
//! [`Server::serve_with_shutdown`] does the same on any future you hand it;
//! [`RunningService`](crate::RunningService) uses it to stop on demand.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// The HTTP server.
pub struct Server {
    listener: TcpListener,
}

impl Server {
    /// Binds a listener on `addr`.
    ///
    /// ```rust,no_run
    /// # async fn run() -> accord::Result<()> {
    /// use accord::Server;
    /// let server = Server::bind("0.0.0.0:3000").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        Ok(Self { listener: TcpListener::bind(addr).await? })
    }

    /// Serves on a listener the caller already bound.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { listener }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, router: Router) -> Result<()> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Like [`serve`](Self::serve), but stops when `signal` resolves.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        signal: impl Future<Output = ()>,
    ) -> Result<()> {
        let addr = self.local_addr()?;
        let listener = self.listener;

        // Shared across connection tasks without copying the routing table.
        let router = Arc::new(router);

        info!(%addr, routes = router.len(), "accord listening");

        // Tracks every spawned connection task so shutdown can wait for them.
        let mut tasks = tokio::task::JoinSet::new();

        // Tells open connections to finish their current request and close,
        // so idle keep-alive connections do not hold up the drain.
        let (drain_tx, drain_rx) = watch::channel(());

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Checked first so a shutdown stops accepting immediately,
                // even if more connections are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let io = TokioIo::new(stream);
                    let mut drain = drain_rx.clone();

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            async move { dispatch(router, req).await }
                        });

                        // HTTP/1.1 or HTTP/2, whichever the client negotiates.
                        let builder = ConnBuilder::new(TokioExecutor::new());
                        let conn = builder.serve_connection(io, svc);
                        tokio::pin!(conn);

                        let res = tokio::select! {
                            res = conn.as_mut() => res,
                            _ = drain.changed() => {
                                conn.as_mut().graceful_shutdown();
                                conn.await
                            }
                        };
                        if let Err(e) = res {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the set stays bounded.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        let _ = drain_tx.send(());
        while tasks.join_next().await.is_some() {}

        info!(%addr, "accord stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Routes one request and produces one response.
///
/// The error type is [`Infallible`]: every failure becomes a status code, so
/// hyper never sees an error.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<Incoming>,
) -> std::result::Result<http::Response<Full<Bytes>>, Infallible> {
    let response = route(&router, req).await;
    Ok(response.into_inner())
}

async fn route(router: &Router, req: hyper::Request<Incoming>) -> Response {
    let Some(method) = Method::from_http(req.method()) else {
        debug!(method = %req.method(), uri = %req.uri(), "unsupported method");
        return Response::status(StatusCode::METHOD_NOT_ALLOWED);
    };

    let Some((pipeline, params)) = router.lookup(method, req.uri().path()) else {
        let status = if router.matches_any(req.uri().path()) {
            StatusCode::METHOD_NOT_ALLOWED
        } else {
            StatusCode::NOT_FOUND
        };
        debug!(%method, uri = %req.uri(), %status, "no route");
        return Response::status(status);
    };

    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(%method, uri = %parts.uri, "failed to read request body: {e}");
            return Response::status(StatusCode::BAD_REQUEST);
        }
    };

    let request = Request::new(method, parts.uri, parts.headers, body, params);
    let response = pipeline.run(request).await;
    debug!(route = %pipeline.route().label, status = %response.status_code(), "served");
    response
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by `kubectl` and the
/// Kubernetes control plane) and **SIGINT** (Ctrl-C, for local dev).
/// On Windows only Ctrl-C is available. A handler that cannot be installed is
/// logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // Never resolves: on non-Unix platforms the SIGTERM arm is disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
