//! Per-connection request loop
//!
//! [`HttpConnection`] is the frame consumer bound to every inbound socket.
//! It alternates between two frame requests: the header block up to the
//! blank line, then (when `Content-Length` says so) the body verbatim. After
//! dispatch it either asks for the next header block or finishes, depending
//! on the connection's close-after-write flag.

use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use bytes::Bytes;
use tracing::{debug, error};

use wisp_core::socket::SocketRef;
use wisp_core::stream::{Directive, FrameConsumer, FrameKind};

use crate::error::ParseError;
use crate::request::RequestHead;
use crate::response::Respond;
use crate::router::Router;

const HEADER_END: &[u8] = b"\r\n\r\n";

pub struct HttpConnection {
    router: Rc<RefCell<Router>>,
    state: ConnState,
}

enum ConnState {
    /// Waiting for the next header block.
    Header,
    /// Header parsed, waiting for a sized body.
    Body { head: RequestHead },
}

impl HttpConnection {
    pub fn new(router: Rc<RefCell<Router>>) -> Self {
        Self { router, state: ConnState::Header }
    }

    fn read_header() -> Directive<()> {
        Directive::Read(FrameKind::Until(Bytes::from_static(HEADER_END)))
    }

    fn dispatch(&mut self, socket: &SocketRef, head: RequestHead, body: Bytes) -> Directive<()> {
        socket.set_close_after_write(head.wants_close());

        let handler = self.router.borrow().lookup(head.method(), head.path());
        match handler {
            Some(handler) => {
                // a handler bug must not take the worker down
                let outcome =
                    catch_unwind(AssertUnwindSafe(|| handler(socket, head.query(), head.headers(), body)));
                if outcome.is_err() {
                    error!(method = %head.method(), path = head.path(), "handler panicked");
                }
            }
            None => {
                debug!(method = %head.method(), path = head.path(), "no route");
                socket.set_close_after_write(true);
                let body = format!("{} was not found on this server", head.path());
                socket.http_response("404 Not found", "text/plain", body.as_bytes());
            }
        }

        if socket.close_after_write() {
            Directive::Done(())
        } else {
            Self::read_header()
        }
    }
}

impl FrameConsumer for HttpConnection {
    type Output = ();
    type Error = ParseError;

    fn begin(&mut self, _socket: &SocketRef) -> Result<Directive<()>, ParseError> {
        Ok(Self::read_header())
    }

    fn on_frame(&mut self, socket: &SocketRef, frame: Bytes) -> Result<Directive<()>, ParseError> {
        match std::mem::replace(&mut self.state, ConnState::Header) {
            ConnState::Header => {
                // malformed input closes the connection, no response attempted
                let head = RequestHead::parse(&frame).map_err(|e| {
                    socket.close();
                    e
                })?;
                let length = head.content_length().map_err(|e| {
                    socket.close();
                    e
                })?;
                if length > 0 {
                    self.state = ConnState::Body { head };
                    Ok(Directive::Read(FrameKind::Exact(length)))
                } else {
                    Ok(self.dispatch(socket, head, Bytes::new()))
                }
            }
            ConnState::Body { head } => Ok(self.dispatch(socket, head, frame)),
        }
    }

    fn on_eof(&mut self, socket: &SocketRef) -> Option<()> {
        // peer went away before completing a request
        debug!(fd = %socket.fd(), "connection closed by peer");
        None
    }
}
