//! The boundary between this crate and the native event loop.
//!
//! The loop driver owns the descriptors and performs the actual non-blocking
//! I/O. Everything above it is notified through the dispatcher entry points
//! ([`crate::Dispatcher::on_data`], [`crate::Dispatcher::on_write`],
//! [`crate::Dispatcher::on_close`]), which the loop invokes sequentially.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

/// Opaque descriptor handle owned by the event-loop driver.
///
/// Unique within a worker until the descriptor closes; the driver may recycle
/// values afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fd(u64);

impl Fd {
    pub const fn new(raw: u64) -> Self {
        Fd(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd#{}", self.0)
    }
}

/// Failures reported by the loop driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The descriptor is dead; nothing more can be written to it.
    #[error("descriptor is dead")]
    Dead,

    /// A non-blocking connect could not be initiated.
    #[error("connect to {host}:{port} failed: {reason}")]
    ConnectFailed { host: String, port: u16, reason: String },
}

impl DriverError {
    /// Creates a new ConnectFailed error
    pub fn connect_failed<S: ToString>(host: impl Into<String>, port: u16, reason: S) -> Self {
        Self::ConnectFailed { host: host.into(), port, reason: reason.to_string() }
    }
}

/// Non-blocking operations the core may ask of the loop.
///
/// Contract:
/// - `write` accepts as many bytes as the kernel will take and returns the
///   count; `Err` means the descriptor is dead. It never invokes a dispatcher
///   entry point reentrantly.
/// - `close` only schedules: the close itself is observed later through
///   [`crate::Dispatcher::on_close`].
/// - `connect` starts a non-blocking connect; completion is signalled by a
///   later writability event for the returned descriptor.
pub trait Driver {
    fn write(&mut self, fd: Fd, data: &[u8]) -> Result<usize, DriverError>;

    fn close(&mut self, fd: Fd) -> bool;

    fn connect(&mut self, host: &str, port: u16) -> Result<Fd, DriverError>;
}

/// The driver handle shared by the dispatcher and every socket of a worker.
pub type SharedDriver = Rc<RefCell<dyn Driver>>;
