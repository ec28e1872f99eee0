//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. Each leaf is the composed
//! [`Pipeline`] of one route contract.

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;
use percent_encoding::percent_decode_str;

use crate::error::{Error, Result};
use crate::method::Method;
use crate::pipeline::Pipeline;
use crate::template;

/// The dispatch table of a service.
///
/// Built by [`Service::into_router`](crate::Service::into_router); pass it to
/// [`Server::serve`](crate::Server::serve).
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Arc<Pipeline>>>,
    count: usize,
}

impl Router {
    pub(crate) fn new() -> Self {
        Self { routes: HashMap::new(), count: 0 }
    }

    /// Registers `pipeline` under a `:name` path template.
    pub(crate) fn insert(&mut self, method: Method, path: &str, pipeline: Pipeline) -> Result<()> {
        let router_path = template::to_router_path(path);
        self.routes
            .entry(method)
            .or_default()
            .insert(router_path, Arc::new(pipeline))
            .map_err(|e| Error::InvalidRoute { path: path.to_owned(), reason: e.to_string() })?;
        self.count += 1;
        Ok(())
    }

    /// Matches `path` against the tree for `method`. Captured params come back
    /// percent-decoded.
    pub(crate) fn lookup(
        &self,
        method: Method,
        path: &str,
    ) -> Option<(Arc<Pipeline>, HashMap<String, String>)> {
        let tree = self.routes.get(&method)?;
        let matched = tree.at(path).ok()?;
        let pipeline = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), percent_decode_str(v).decode_utf8_lossy().into_owned()))
            .collect();
        Some((pipeline, params))
    }

    /// Number of registered routes across every method.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// True when some method has a route at `path`. Used to tell `404` from
    /// `405`.
    pub(crate) fn matches_any(&self, path: &str) -> bool {
        self.routes.values().any(|tree| tree.at(path).is_ok())
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router").field("routes", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ServiceClients;
    use crate::codec::DataType;
    use crate::context::Context;
    use crate::contract::RouteContract;
    use crate::pipeline::Route;

    async fn ok(ctx: Context) -> Context {
        ctx
    }

    fn pipeline(path: &str) -> Pipeline {
        let contract = RouteContract::new("R", Method::Get, path);
        Pipeline::compose(contract, DataType::Binary, Route::new(ok), Arc::new(ServiceClients::default()))
    }

    #[test]
    fn captures_colon_params() {
        let mut router = Router::new();
        router.insert(Method::Get, "/v0/users/:id", pipeline("/users/:id")).unwrap();

        let (matched, params) = router.lookup(Method::Get, "/v0/users/42").unwrap();
        assert_eq!(matched.route().path, "/users/:id");
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert!(router.lookup(Method::Post, "/v0/users/42").is_none());
        assert!(router.matches_any("/v0/users/42"));
        assert!(!router.matches_any("/v0/nope"));
    }

    #[test]
    fn captured_params_are_percent_decoded() {
        let mut router = Router::new();
        router.insert(Method::Get, "/v0/users/:id", pipeline("/users/:id")).unwrap();

        let (_, params) = router.lookup(Method::Get, "/v0/users/ana%20maria%2Fx").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("ana maria/x"));
    }

    #[test]
    fn conflicting_paths_are_rejected() {
        let mut router = Router::new();
        router.insert(Method::Get, "/echo", pipeline("/echo")).unwrap();
        let err = router.insert(Method::Get, "/echo", pipeline("/echo")).unwrap_err();
        assert!(matches!(err, Error::InvalidRoute { .. }));
        router.insert(Method::Post, "/echo", pipeline("/echo")).unwrap();
        assert_eq!(router.len(), 2);
    }
}
