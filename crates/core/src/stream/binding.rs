use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bytes::Bytes;

use crate::promise::{promise, Resolver, Subscriber};
use crate::socket::SocketRef;

/// Whether the consumer wants more chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Done,
}

/// Ordered view over a socket's data events.
///
/// Chunks arrive in delivery order; exactly one [`ChunkConsumer::on_eof`]
/// follows the last chunk once the connection closes, whether or not any
/// chunks arrived before. A consumer that returns [`Flow::Done`] is never
/// called again.
pub trait ChunkConsumer {
    fn on_chunk(&mut self, socket: &SocketRef, chunk: Bytes) -> Flow;

    fn on_eof(&mut self, socket: &SocketRef);
}

struct BindingState<C> {
    consumer: RefCell<C>,
    /// a chunk is being consumed right now
    running: Cell<bool>,
    /// close arrived while running; deliver eof after the current feed
    ended: Cell<bool>,
    dead: Cell<bool>,
}

/// Install `consumer` over the socket's data and close events.
pub fn bind<C: ChunkConsumer + 'static>(socket: &SocketRef, consumer: C) {
    let state = Rc::new(BindingState {
        consumer: RefCell::new(consumer),
        running: Cell::new(false),
        ended: Cell::new(false),
        dead: Cell::new(false),
    });

    let data_state = state.clone();
    socket.set_data_hook(move |socket, chunk| {
        if data_state.dead.get() {
            return;
        }
        data_state.running.set(true);
        let flow = data_state.consumer.borrow_mut().on_chunk(socket, chunk);
        data_state.running.set(false);
        match flow {
            Flow::Done => retire(&data_state, socket),
            Flow::Continue if data_state.ended.get() => {
                // the close raced with this chunk; deliver the sentinel now
                data_state.consumer.borrow_mut().on_eof(socket);
                retire(&data_state, socket);
            }
            Flow::Continue => {}
        }
    });

    socket.set_close_hook(move |socket| {
        if state.dead.get() {
            return;
        }
        if state.running.get() {
            state.ended.set(true);
        } else {
            state.consumer.borrow_mut().on_eof(socket);
            retire(&state, socket);
        }
    });
}

/// Drop further events on the floor: the consumer is finished, so the data
/// hook becomes a no-op.
fn retire<C>(state: &Rc<BindingState<C>>, socket: &SocketRef) {
    state.dead.set(true);
    socket.set_data_hook(|_socket, _chunk| {});
}

/// [`bind`] with a completion promise: the consumer is built around the
/// resolver and the subscribe side is handed back to the caller.
pub fn bind_with<T, C, F>(socket: &SocketRef, make: F) -> Subscriber<T>
where
    T: 'static,
    C: ChunkConsumer + 'static,
    F: FnOnce(Resolver<T>) -> C,
{
    let (resolver, subscriber) = promise();
    bind(socket, make(resolver));
    subscriber
}

/// A task that resolves when the socket's connect completes. Replaces the
/// socket's connect hook.
pub fn await_connect(socket: &SocketRef) -> Subscriber<()> {
    let (resolver, subscriber) = promise();
    socket.set_connect_hook(move |_socket| resolver.resolve(()));
    subscriber
}
