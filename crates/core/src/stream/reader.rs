use std::fmt::Display;

use bytes::{Bytes, BytesMut};
use tracing::{error, trace};

use crate::promise::{promise, Resolver, Subscriber};
use crate::socket::SocketRef;
use crate::stream::binding::{bind, ChunkConsumer, Flow};

/// How the next frame is delimited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// Exactly this many bytes.
    Exact(usize),
    /// Bytes up to and including the delimiter.
    Until(Bytes),
}

/// What a [`FrameConsumer`] wants after handling a frame.
pub enum Directive<T> {
    Read(FrameKind),
    Done(T),
}

/// A protocol reader fed completed frames by a [`FrameReader`].
///
/// The consumer never sees raw chunks: it names the shape of the next frame
/// and gets called back once the frame is complete, however the bytes were
/// chunked on the wire.
pub trait FrameConsumer {
    type Output;
    type Error: Display;

    /// The first frame request. Runs once, before any bytes arrive.
    fn begin(&mut self, socket: &SocketRef) -> Result<Directive<Self::Output>, Self::Error>;

    /// Handle one completed frame and direct the next read.
    fn on_frame(&mut self, socket: &SocketRef, frame: Bytes) -> Result<Directive<Self::Output>, Self::Error>;

    /// The stream ended while a frame request was outstanding. Cleanup; the
    /// returned value resolves the completion promise.
    fn on_eof(&mut self, socket: &SocketRef) -> Option<Self::Output>;
}

/// Accumulates chunks and carves them into the frames an inner
/// [`FrameConsumer`] asks for. One chunk may complete several frames.
pub struct FrameReader<C: FrameConsumer> {
    inner: C,
    resolver: Resolver<Option<C::Output>>,
    buffer: BytesMut,
    want: Option<FrameKind>,
    /// buffer length already searched for the pending delimiter
    scanned: usize,
    max_buffered: Option<usize>,
    alive: bool,
}

impl<C: FrameConsumer> FrameReader<C>
where
    C::Output: 'static,
{
    fn new(inner: C, resolver: Resolver<Option<C::Output>>, max_buffered: Option<usize>) -> Self {
        Self { inner, resolver, buffer: BytesMut::new(), want: None, scanned: 0, max_buffered, alive: true }
    }

    fn start(&mut self, socket: &SocketRef) {
        match self.inner.begin(socket) {
            Ok(directive) => {
                self.apply(directive);
                self.drain(socket);
            }
            Err(cause) => self.fail(cause),
        }
    }

    fn apply(&mut self, directive: Directive<C::Output>) {
        match directive {
            Directive::Read(kind) => {
                self.want = Some(kind);
                self.scanned = 0;
            }
            Directive::Done(value) => {
                self.alive = false;
                self.resolver.resolve(Some(value));
            }
        }
    }

    fn fail(&mut self, cause: impl Display) {
        error!(cause = %cause, "frame consumer failed");
        self.alive = false;
        self.resolver.resolve(None);
    }

    /// Hand over every frame the buffer can currently satisfy.
    fn drain(&mut self, socket: &SocketRef) {
        while self.alive {
            let frame = match self.want.clone() {
                Some(FrameKind::Exact(len)) => {
                    if self.buffer.len() < len {
                        break;
                    }
                    self.buffer.split_to(len).freeze()
                }
                Some(FrameKind::Until(delimiter)) => {
                    // a delimiter straddling the last chunk boundary starts
                    // before the bytes already searched
                    let from = self.scanned.saturating_sub(delimiter.len());
                    match find(&self.buffer[from..], &delimiter) {
                        Some(at) => {
                            let end = from + at + delimiter.len();
                            self.scanned = 0;
                            self.buffer.split_to(end).freeze()
                        }
                        None => {
                            self.scanned = self.buffer.len();
                            if let Some(max) = self.max_buffered {
                                if self.buffer.len() > max {
                                    self.fail(format!("no delimiter within {max} buffered bytes"));
                                }
                            }
                            break;
                        }
                    }
                }
                None => break,
            };
            trace!(len = frame.len(), "frame complete");
            self.want = None;
            match self.inner.on_frame(socket, frame) {
                Ok(directive) => self.apply(directive),
                Err(cause) => self.fail(cause),
            }
        }
    }
}

impl<C: FrameConsumer> ChunkConsumer for FrameReader<C>
where
    C::Output: 'static,
{
    fn on_chunk(&mut self, socket: &SocketRef, chunk: Bytes) -> Flow {
        if !self.alive {
            return Flow::Done;
        }
        self.buffer.extend_from_slice(&chunk);
        self.drain(socket);
        if self.alive {
            Flow::Continue
        } else {
            Flow::Done
        }
    }

    fn on_eof(&mut self, socket: &SocketRef) {
        if !self.alive {
            return;
        }
        self.alive = false;
        let value = self.inner.on_eof(socket);
        self.resolver.resolve(value);
    }
}

/// Bind a frame-consuming protocol reader to the socket.
///
/// The returned task resolves with `Some` of the consumer's final value, or
/// `None` when the consumer failed at any point (including before its first
/// frame request). `max_buffered`, when set, bounds how many bytes may pile
/// up while a delimiter search is pending.
pub fn bind_frames<C>(socket: &SocketRef, consumer: C, max_buffered: Option<usize>) -> Subscriber<Option<C::Output>>
where
    C: FrameConsumer + 'static,
    C::Output: 'static,
{
    let (resolver, subscriber) = promise();
    let mut reader = FrameReader::new(consumer, resolver, max_buffered);
    reader.start(socket);
    if reader.alive {
        bind(socket, reader);
    }
    subscriber
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}
