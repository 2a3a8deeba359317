//! Wiring the HTTP layer onto a dispatcher

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;
use tracing::info;

use wisp_core::stream::bind_frames;
use wisp_core::Dispatcher;

use crate::connection::HttpConnection;
use crate::request::MAX_HEADER_BYTES;
use crate::router::Router;

pub struct HttpServiceBuilder {
    router: Option<Router>,
    max_header_bytes: usize,
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("router must be set")]
    MissingRouter,
}

impl HttpServiceBuilder {
    fn new() -> Self {
        Self { router: None, max_header_bytes: MAX_HEADER_BYTES }
    }

    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Cap on bytes buffered while waiting for a complete header block.
    pub fn max_header_bytes(mut self, limit: usize) -> Self {
        self.max_header_bytes = limit;
        self
    }

    pub fn build(self) -> Result<HttpService, BuildError> {
        let router = self.router.ok_or(BuildError::MissingRouter)?;
        Ok(HttpService { router: Rc::new(RefCell::new(router)), max_header_bytes: self.max_header_bytes })
    }
}

/// The per-worker HTTP service: a shared routing table plus the accept
/// handler that equips every new inbound socket with a request loop.
#[derive(Debug)]
pub struct HttpService {
    router: Rc<RefCell<Router>>,
    max_header_bytes: usize,
}

impl HttpService {
    pub fn builder() -> HttpServiceBuilder {
        HttpServiceBuilder::new()
    }

    /// Shared handle to the routing table. Clearing and repopulating it
    /// affects live connections from their next request on.
    pub fn router(&self) -> Rc<RefCell<Router>> {
        self.router.clone()
    }

    /// Become the dispatcher's accept handler: every socket materialized
    /// from an unknown inbound descriptor gets an HTTP request loop.
    pub fn install(&self, dispatcher: &Rc<Dispatcher>) {
        let router = self.router.clone();
        let limit = self.max_header_bytes;
        info!(worker = dispatcher.worker(), "http service installed");
        dispatcher.set_accept_handler(move |socket| {
            // the completion promise of a server connection carries nothing
            let _ = bind_frames(socket, HttpConnection::new(router.clone()), Some(limit));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_without_router_fails() {
        let err = HttpService::builder().build().unwrap_err();
        assert!(matches!(err, BuildError::MissingRouter));
    }

    #[test]
    fn build_with_router() {
        let service = HttpService::builder().router(Router::new()).build().unwrap();
        assert!(service.router().borrow().is_empty());
    }
}
