//! Pull-style consumption of socket events
//!
//! [`bind`] turns a socket's pushed data/close events into an ordered feed
//! for a [`ChunkConsumer`]; [`bind_frames`] layers a [`FrameReader`] on top
//! so protocol code sees whole frames (a byte count or a delimiter) instead
//! of arbitrary chunks.

mod binding;
mod reader;

pub use binding::{await_connect, bind, bind_with, ChunkConsumer, Flow};
pub use reader::{bind_frames, Directive, FrameConsumer, FrameKind, FrameReader};
