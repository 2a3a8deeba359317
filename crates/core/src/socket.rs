//! Per-connection socket object
//!
//! A [`Socket`] owns the write queue and the half-closed state machine for a
//! single descriptor, and carries the four overridable event hooks (connect,
//! data, write, close). Hooks default to no-ops and are installed through
//! explicit setters; bindings such as [`crate::stream::bind`] replace them
//! wholesale, so a socket exposes exactly one consumer per event at a time.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::driver::{Fd, SharedDriver};

/// Shared handle to a socket. Everything on [`Socket`] goes through interior
/// mutability, so the handle is freely clonable within the worker.
pub type SocketRef = Rc<Socket>;

type EventHook = Box<dyn FnMut(&SocketRef)>;
type DataHook = Box<dyn FnMut(&SocketRef, Bytes)>;

/// Per-descriptor state: write queue, connection flags and event hooks.
pub struct Socket {
    fd: Fd,
    driver: SharedDriver,
    state: RefCell<State>,
    connect_hook: RefCell<Option<EventHook>>,
    data_hook: RefCell<Option<DataHook>>,
    write_hook: RefCell<Option<EventHook>>,
    close_hook: RefCell<Option<EventHook>>,
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket").field("fd", &self.fd).finish()
    }
}

#[derive(Default)]
struct State {
    connected: bool,
    writable: bool,
    close_after_write: bool,
    closing: bool,
    closed: bool,
    queue: VecDeque<Pending>,
}

struct Pending {
    data: Bytes,
    offset: usize,
}

impl Socket {
    fn new(fd: Fd, driver: SharedDriver, state: State) -> SocketRef {
        Rc::new(Self {
            fd,
            driver,
            state: RefCell::new(state),
            connect_hook: RefCell::new(None),
            data_hook: RefCell::new(None),
            write_hook: RefCell::new(None),
            close_hook: RefCell::new(None),
        })
    }

    /// A socket materialized by the first inbound byte of an accepted
    /// connection. The peer is already there, so it starts connected and
    /// writable.
    pub(crate) fn accepted(fd: Fd, driver: SharedDriver) -> SocketRef {
        Self::new(fd, driver, State { connected: true, writable: true, ..Default::default() })
    }

    /// A socket for an in-flight outbound connect. The first writability
    /// event promotes it to connected.
    pub(crate) fn outbound(fd: Fd, driver: SharedDriver) -> SocketRef {
        Self::new(fd, driver, State::default())
    }

    pub fn fd(&self) -> Fd {
        self.fd
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    pub fn is_writable(&self) -> bool {
        self.state.borrow().writable
    }

    /// True once the dispatcher has delivered the driver's close.
    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    pub fn close_after_write(&self) -> bool {
        self.state.borrow().close_after_write
    }

    /// Marks the socket to close once the current write queue drains.
    pub fn set_close_after_write(&self, close: bool) {
        self.state.borrow_mut().close_after_write = close;
    }

    /// Queue or send `data`. Returns `false` when the socket is already
    /// closed or the driver reports the descriptor dead (the socket is then
    /// closed); `true` means the bytes were accepted and will reach the peer
    /// in call order.
    pub fn write(&self, data: impl Into<Bytes>) -> bool {
        self.write_opt(data, None)
    }

    /// [`Socket::write`] with an explicit close-after-write update.
    pub fn write_opt(&self, data: impl Into<Bytes>, close: Option<bool>) -> bool {
        let data = data.into();
        {
            let mut state = self.state.borrow_mut();
            if state.closing || state.closed {
                return false;
            }
            if let Some(close) = close {
                state.close_after_write = close;
            }
            if !state.writable {
                state.queue.push_back(Pending { data, offset: 0 });
                return true;
            }
        }

        // writable with an empty queue: hand the bytes straight to the driver
        let written = self.driver.borrow_mut().write(self.fd, &data);
        let mut state = self.state.borrow_mut();
        match written {
            Err(cause) => {
                debug!(fd = %self.fd, cause = %cause, "write failed, closing");
                drop(state);
                self.close();
                false
            }
            Ok(accepted) if accepted < data.len() => {
                trace!(fd = %self.fd, accepted, len = data.len(), "partial write, queueing remainder");
                state.writable = false;
                state.queue.push_back(Pending { data, offset: accepted });
                true
            }
            Ok(_) => {
                if state.close_after_write {
                    drop(state);
                    self.close();
                }
                true
            }
        }
    }

    /// Request a close. Idempotent; pending writes are dropped. The close
    /// hook fires later, when the dispatcher delivers the driver's close.
    pub fn close(&self) {
        {
            let mut state = self.state.borrow_mut();
            if state.closing || state.closed {
                return;
            }
            state.closing = true;
            state.queue.clear();
        }
        trace!(fd = %self.fd, "close requested");
        self.driver.borrow_mut().close(self.fd);
    }

    /// Writability from the loop: promote to connected on the first event,
    /// then drain the queue head by head.
    pub(crate) fn handle_writable(self: &Rc<Self>) {
        let first = {
            let mut state = self.state.borrow_mut();
            if state.closing || state.closed {
                return;
            }
            state.writable = true;
            !std::mem::replace(&mut state.connected, true)
        };
        if first {
            run_hook(self, &self.connect_hook);
        }
        if self.flush() {
            run_hook(self, &self.write_hook);
        }
    }

    /// Drains queued writes while the driver keeps accepting whole entries.
    /// Returns `false` when the socket closed along the way.
    fn flush(self: &Rc<Self>) -> bool {
        loop {
            let (data, offset) = {
                let state = self.state.borrow();
                match state.queue.front() {
                    Some(head) => (head.data.clone(), head.offset),
                    None => return true,
                }
            };
            let written = self.driver.borrow_mut().write(self.fd, &data[offset..]);
            let mut state = self.state.borrow_mut();
            match written {
                Err(cause) => {
                    debug!(fd = %self.fd, cause = %cause, "flush failed, closing");
                    drop(state);
                    self.close();
                    return false;
                }
                Ok(accepted) if offset + accepted < data.len() => {
                    state.writable = false;
                    if let Some(head) = state.queue.front_mut() {
                        head.offset = offset + accepted;
                    }
                    return true;
                }
                Ok(_) => {
                    state.queue.pop_front();
                    // close-after-write waits for the whole queue, not just
                    // the entry that carried the flag
                    if state.queue.is_empty() && state.close_after_write {
                        drop(state);
                        self.close();
                        return false;
                    }
                }
            }
        }
    }

    /// Close from the loop. Latches `closed` so the hook fires at most once.
    pub(crate) fn handle_close(self: &Rc<Self>) {
        {
            let mut state = self.state.borrow_mut();
            if state.closed {
                return;
            }
            state.closed = true;
            state.queue.clear();
        }
        run_hook(self, &self.close_hook);
    }

    pub(crate) fn emit_data(self: &Rc<Self>, chunk: Bytes) {
        let taken = self.data_hook.borrow_mut().take();
        if let Some(mut hook) = taken {
            hook(self, chunk);
            let mut slot = self.data_hook.borrow_mut();
            // the hook may have replaced itself while running
            if slot.is_none() {
                *slot = Some(hook);
            }
        }
    }

    pub fn set_connect_hook(&self, hook: impl FnMut(&SocketRef) + 'static) {
        *self.connect_hook.borrow_mut() = Some(Box::new(hook));
    }

    pub fn set_data_hook(&self, hook: impl FnMut(&SocketRef, Bytes) + 'static) {
        *self.data_hook.borrow_mut() = Some(Box::new(hook));
    }

    pub fn set_write_hook(&self, hook: impl FnMut(&SocketRef) + 'static) {
        *self.write_hook.borrow_mut() = Some(Box::new(hook));
    }

    pub fn set_close_hook(&self, hook: impl FnMut(&SocketRef) + 'static) {
        *self.close_hook.borrow_mut() = Some(Box::new(hook));
    }

    #[cfg(test)]
    pub(crate) fn queued(&self) -> usize {
        self.state.borrow().queue.len()
    }
}

/// Take-call-restore so a hook may replace itself (or install a no-op) from
/// inside its own invocation.
fn run_hook(socket: &SocketRef, cell: &RefCell<Option<EventHook>>) {
    let taken = cell.borrow_mut().take();
    if let Some(mut hook) = taken {
        hook(socket);
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            *slot = Some(hook);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::sim::SimDriver;

    fn setup() -> (Rc<RefCell<SimDriver>>, SocketRef) {
        let driver = Rc::new(RefCell::new(SimDriver::new()));
        let fd = driver.borrow_mut().alloc_fd();
        let socket = Socket::accepted(fd, driver.clone());
        (driver, socket)
    }

    #[test]
    fn writable_socket_writes_through() {
        let (driver, socket) = setup();

        assert!(socket.write(&b"hello"[..]));
        assert_eq!(driver.borrow().output(socket.fd()), b"hello");
        assert_eq!(socket.queued(), 0);
        assert!(socket.is_writable());
    }

    #[test]
    fn partial_write_queues_remainder() {
        let (driver, socket) = setup();
        driver.borrow_mut().limit_writes(socket.fd(), [400]);

        assert!(socket.write(vec![b'x'; 1000]));
        assert!(!socket.is_writable());
        assert_eq!(socket.queued(), 1);
        assert_eq!(driver.borrow().output(socket.fd()).len(), 400);

        // writes while the queue is non-empty never touch the driver
        assert!(socket.write(vec![b'y'; 50]));
        assert_eq!(socket.queued(), 2);
        assert_eq!(driver.borrow().output(socket.fd()).len(), 400);

        // the next writability event drains everything in call order
        socket.handle_writable();
        let output = driver.borrow().output(socket.fd());
        assert_eq!(output.len(), 1050);
        assert_eq!(&output[..1000], &vec![b'x'; 1000][..]);
        assert_eq!(&output[1000..], &vec![b'y'; 50][..]);
        assert_eq!(socket.queued(), 0);
        assert!(socket.is_writable());
    }

    #[test]
    fn drain_honors_repeated_partial_acceptance() {
        let (driver, socket) = setup();
        driver.borrow_mut().limit_writes(socket.fd(), [2, 3]);

        assert!(socket.write(&b"abcdefgh"[..]));
        assert_eq!(driver.borrow().output(socket.fd()), b"ab");

        socket.handle_writable();
        assert_eq!(driver.borrow().output(socket.fd()), b"abcde");
        assert!(!socket.is_writable());

        socket.handle_writable();
        assert_eq!(driver.borrow().output(socket.fd()), b"abcdefgh");
        assert!(socket.is_writable());
    }

    #[test]
    fn close_after_write_closes_once_drained() {
        let (driver, socket) = setup();

        assert!(socket.write_opt(&b"bye"[..], Some(true)));
        assert_eq!(driver.borrow().output(socket.fd()), b"bye");
        assert!(driver.borrow().close_requested(socket.fd()));

        // terminal: later writes fail
        assert!(!socket.write(&b"more"[..]));
    }

    #[test]
    fn close_after_write_waits_for_drain() {
        let (driver, socket) = setup();
        driver.borrow_mut().limit_writes(socket.fd(), [1]);

        assert!(socket.write_opt(&b"bye"[..], Some(true)));
        assert!(!driver.borrow().close_requested(socket.fd()));

        socket.handle_writable();
        assert_eq!(driver.borrow().output(socket.fd()), b"bye");
        assert!(driver.borrow().close_requested(socket.fd()));
    }

    #[test]
    fn write_hook_fires_after_the_queue_drains() {
        let (driver, socket) = setup();
        driver.borrow_mut().limit_writes(socket.fd(), [1]);
        let fired = Rc::new(RefCell::new(0));
        let counter = fired.clone();
        socket.set_write_hook(move |_socket| *counter.borrow_mut() += 1);

        assert!(socket.write(&b"abc"[..]));
        assert_eq!(*fired.borrow(), 0);

        socket.handle_writable();
        assert_eq!(*fired.borrow(), 1);
    }

    #[test]
    fn dead_descriptor_closes_socket() {
        let (driver, socket) = setup();
        driver.borrow_mut().kill(socket.fd());

        assert!(!socket.write(&b"lost"[..]));
        assert!(driver.borrow().close_requested(socket.fd()));
    }

    #[test]
    fn close_is_idempotent() {
        let (driver, socket) = setup();

        socket.close();
        socket.close();
        assert_eq!(driver.borrow_mut().take_closed(), vec![socket.fd()]);
    }

    #[test]
    fn close_hook_fires_once() {
        let (_driver, socket) = setup();
        let fired = Rc::new(RefCell::new(0));
        let counter = fired.clone();
        socket.set_close_hook(move |_socket| *counter.borrow_mut() += 1);

        socket.handle_close();
        socket.handle_close();
        assert_eq!(*fired.borrow(), 1);
        assert!(socket.is_closed());
    }

    #[test]
    fn outbound_promotes_connected_on_first_writability() {
        let driver = Rc::new(RefCell::new(SimDriver::new()));
        let fd = driver.borrow_mut().alloc_fd();
        let socket = Socket::outbound(fd, driver.clone());
        let connects = Rc::new(RefCell::new(0));
        let counter = connects.clone();
        socket.set_connect_hook(move |_socket| *counter.borrow_mut() += 1);

        // queued before the connect completes
        assert!(socket.write(&b"early"[..]));
        assert!(!socket.is_connected());
        assert_eq!(driver.borrow().output(fd), b"");

        socket.handle_writable();
        assert!(socket.is_connected());
        assert_eq!(*connects.borrow(), 1);
        assert_eq!(driver.borrow().output(fd), b"early");

        socket.handle_writable();
        assert_eq!(*connects.borrow(), 1);
    }

    #[test]
    fn data_hook_may_replace_itself() {
        let (_driver, socket) = setup();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let log = seen.clone();
        socket.set_data_hook(move |socket, chunk| {
            log.borrow_mut().push((1, chunk.clone()));
            let log = log.clone();
            socket.set_data_hook(move |_socket, chunk| {
                log.borrow_mut().push((2, chunk));
            });
        });

        socket.emit_data(Bytes::from_static(b"a"));
        socket.emit_data(Bytes::from_static(b"b"));
        let seen = seen.borrow();
        assert_eq!(seen.as_slice(), &[(1, Bytes::from_static(b"a")), (2, Bytes::from_static(b"b"))]);
    }
}
