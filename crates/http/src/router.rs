//! Exact-match routing
//!
//! Routes are keyed by method, then by the exact path with the query string
//! already stripped. The table lives behind a shared handle so it can be
//! cleared and repopulated at runtime without touching live connections:
//! bound sockets look their route up per request.

use std::collections::HashMap;
use std::rc::Rc;

use bytes::Bytes;
use http::{HeaderMap, Method};

use wisp_core::socket::SocketRef;

/// A route handler: socket, raw query string, headers, body.
///
/// Handlers must eventually respond on the socket, directly or after async
/// work through the promise primitives.
pub type RouteHandler = Rc<dyn Fn(&SocketRef, &str, &HeaderMap, Bytes)>;

#[derive(Default)]
pub struct Router {
    routes: HashMap<Method, HashMap<String, RouteHandler>>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router").field("routes", &self.routes.keys().collect::<Vec<_>>()).finish()
    }
}

impl Router {
    pub fn new() -> Self {
        Default::default()
    }

    /// Register a handler for an exact method + path pair. Registering the
    /// same pair again replaces the old handler.
    pub fn register<F>(&mut self, method: Method, path: impl Into<String>, handler: F)
    where
        F: Fn(&SocketRef, &str, &HeaderMap, Bytes) + 'static,
    {
        self.routes.entry(method).or_default().insert(path.into(), Rc::new(handler));
    }

    pub fn lookup(&self, method: &Method, path: &str) -> Option<RouteHandler> {
        self.routes.get(method).and_then(|paths| paths.get(path)).cloned()
    }

    /// Drop every route. Live connections keep running and see the table as
    /// it stands at their next request.
    pub fn clear(&mut self) {
        self.routes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.routes.values().all(|paths| paths.is_empty())
    }
}
