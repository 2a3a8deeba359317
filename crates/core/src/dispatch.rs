//! Worker-level registry and callback router
//!
//! The [`Dispatcher`] owns the descriptor-to-socket map of one worker and is
//! the surface the loop driver calls back into. The loop's init callback is
//! where the embedder builds the worker's dispatcher (and keeps it across
//! reconfiguration); sockets for accepted connections are then materialized
//! lazily, on their first inbound byte, so the driver never needs a separate
//! accept notification.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use bytes::Bytes;
use tracing::{debug, info};

use crate::driver::{DriverError, Fd, SharedDriver};
use crate::socket::{Socket, SocketRef};

type AcceptHandler = Rc<dyn Fn(&SocketRef)>;

/// Per-worker descriptor registry. Workers share nothing, so each one builds
/// its own dispatcher around its own driver handle.
pub struct Dispatcher {
    driver: SharedDriver,
    worker: usize,
    sockets: RefCell<HashMap<Fd, SocketRef>>,
    accept_handler: RefCell<Option<AcceptHandler>>,
}

impl Dispatcher {
    pub fn new(driver: SharedDriver, worker: usize) -> Rc<Self> {
        Rc::new(Self {
            driver,
            worker,
            sockets: RefCell::new(HashMap::new()),
            accept_handler: RefCell::new(None),
        })
    }

    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Runs on every socket materialized from an unknown inbound descriptor,
    /// before its first bytes are delivered. This is where the default
    /// protocol binding gets installed.
    pub fn set_accept_handler(&self, handler: impl Fn(&SocketRef) + 'static) {
        *self.accept_handler.borrow_mut() = Some(Rc::new(handler));
    }

    pub fn socket(&self, fd: Fd) -> Option<SocketRef> {
        self.sockets.borrow().get(&fd).cloned()
    }

    pub fn socket_count(&self) -> usize {
        self.sockets.borrow().len()
    }

    /// Inbound bytes from the loop. Unknown descriptors materialize a
    /// connected socket first.
    pub fn on_data(&self, fd: Fd, bytes: Bytes) {
        let socket = match self.socket(fd) {
            Some(socket) => socket,
            None => {
                debug!(worker = self.worker, fd = %fd, "first byte, new inbound socket");
                let socket = Socket::accepted(fd, self.driver.clone());
                self.sockets.borrow_mut().insert(fd, socket.clone());
                let handler = self.accept_handler.borrow().clone();
                if let Some(handler) = handler {
                    handler(&socket);
                }
                socket
            }
        };
        socket.emit_data(bytes);
    }

    /// Writability from the loop.
    pub fn on_write(&self, fd: Fd) {
        if let Some(socket) = self.socket(fd) {
            socket.handle_writable();
        }
    }

    /// Close from the loop. The registry entry is removed before the close
    /// hook runs, so user code never observes a registered closed socket.
    pub fn on_close(&self, fd: Fd) {
        let socket = self.sockets.borrow_mut().remove(&fd);
        match socket {
            Some(socket) => socket.handle_close(),
            None => debug!(worker = self.worker, fd = %fd, "close for unknown descriptor"),
        }
    }

    /// Start an outbound connection. The socket is registered immediately;
    /// it becomes connected (and its connect hook fires) on the first
    /// writability event.
    pub fn connect(&self, host: &str, port: u16) -> Result<SocketRef, DriverError> {
        let fd = self.driver.borrow_mut().connect(host, port)?;
        info!(worker = self.worker, fd = %fd, host, port, "outbound connect started");
        let socket = Socket::outbound(fd, self.driver.clone());
        self.sockets.borrow_mut().insert(fd, socket.clone());
        Ok(socket)
    }
}
