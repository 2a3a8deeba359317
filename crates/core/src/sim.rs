//! In-memory loop driver
//!
//! [`SimDriver`] stands in for the native event loop in tests and examples.
//! The caller plays the loop: it allocates descriptors, pumps
//! `on_data`/`on_write`/`on_close` into the dispatcher, and reads back the
//! bytes the "peer" received. Write acceptance can be throttled per
//! descriptor to exercise the partial-write paths.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::driver::{Driver, DriverError, Fd};

#[derive(Default)]
pub struct SimDriver {
    next_fd: u64,
    outputs: HashMap<Fd, Vec<u8>>,
    write_caps: HashMap<Fd, VecDeque<usize>>,
    dead: HashSet<Fd>,
    closed: Vec<Fd>,
    connects: Vec<(Fd, String, u16)>,
    refuse_connects: Option<String>,
}

impl SimDriver {
    pub fn new() -> Self {
        Default::default()
    }

    /// Allocate a descriptor, as the loop would for an accepted connection.
    pub fn alloc_fd(&mut self) -> Fd {
        self.next_fd += 1;
        Fd::new(self.next_fd)
    }

    /// Bytes the peer has received on this descriptor so far.
    pub fn output(&self, fd: Fd) -> Vec<u8> {
        self.outputs.get(&fd).cloned().unwrap_or_default()
    }

    /// Cap the sizes the next writes will accept, forcing partial writes.
    /// Once the caps run out, writes accept everything again.
    pub fn limit_writes(&mut self, fd: Fd, caps: impl IntoIterator<Item = usize>) {
        self.write_caps.entry(fd).or_default().extend(caps);
    }

    /// Make every further write on the descriptor report it dead.
    pub fn kill(&mut self, fd: Fd) {
        self.dead.insert(fd);
    }

    /// Whether a close has been requested for the descriptor.
    pub fn close_requested(&self, fd: Fd) -> bool {
        self.closed.contains(&fd)
    }

    /// Drain the recorded close requests, oldest first. The caller is
    /// expected to feed these back as `on_close` events.
    pub fn take_closed(&mut self) -> Vec<Fd> {
        std::mem::take(&mut self.closed)
    }

    /// Recorded outbound connects, in call order.
    pub fn connects(&self) -> &[(Fd, String, u16)] {
        &self.connects
    }

    /// Make every further connect fail synchronously.
    pub fn refuse_connects(&mut self, reason: &str) {
        self.refuse_connects = Some(reason.to_string());
    }
}

impl Driver for SimDriver {
    fn write(&mut self, fd: Fd, data: &[u8]) -> Result<usize, DriverError> {
        if self.dead.contains(&fd) {
            return Err(DriverError::Dead);
        }
        let cap = self.write_caps.get_mut(&fd).and_then(|caps| caps.pop_front()).unwrap_or(data.len());
        let accepted = cap.min(data.len());
        self.outputs.entry(fd).or_default().extend_from_slice(&data[..accepted]);
        Ok(accepted)
    }

    fn close(&mut self, fd: Fd) -> bool {
        self.closed.push(fd);
        true
    }

    fn connect(&mut self, host: &str, port: u16) -> Result<Fd, DriverError> {
        if let Some(reason) = &self.refuse_connects {
            return Err(DriverError::connect_failed(host, port, reason));
        }
        let fd = self.alloc_fd();
        self.connects.push((fd, host.to_string(), port));
        Ok(fd)
    }
}
