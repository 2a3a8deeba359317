//! One-shot value passing
//!
//! A promise is a single cell with a producer side ([`Resolver`]) and a
//! consumer side ([`Subscriber`]). The two tolerate either call order: a
//! value delivered before anyone subscribed is buffered, and a subscriber
//! installed after resolution fires immediately. There is no cancellation;
//! a promise whose resolver is dropped simply never fires.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

type Sink<T> = Box<dyn FnOnce(T)>;

struct Shared<T> {
    resolved: bool,
    value: Option<T>,
    sink: Option<Sink<T>>,
}

/// Create a one-shot resolve/subscribe pair.
pub fn promise<T: 'static>() -> (Resolver<T>, Subscriber<T>) {
    let shared = Rc::new(RefCell::new(Shared { resolved: false, value: None, sink: None }));
    (Resolver { shared: shared.clone() }, Subscriber { shared })
}

/// Producer side of a promise.
pub struct Resolver<T> {
    shared: Rc<RefCell<Shared<T>>>,
}

/// Consumer side of a promise. Consumed by [`Subscriber::subscribe`], so a
/// promise can never grow a second sink.
pub struct Subscriber<T> {
    shared: Rc<RefCell<Shared<T>>>,
}

impl<T: 'static> Resolver<T> {
    /// Deliver the value. The first call wins; later calls are ignored.
    pub fn resolve(&self, value: T) {
        let ready = {
            let mut shared = self.shared.borrow_mut();
            if shared.resolved {
                debug!("promise already resolved, ignoring");
                return;
            }
            shared.resolved = true;
            match shared.sink.take() {
                Some(sink) => Some((sink, value)),
                None => {
                    shared.value = Some(value);
                    None
                }
            }
        };
        // run the sink outside the borrow: it may wire up further promises
        if let Some((sink, value)) = ready {
            sink(value);
        }
    }
}

impl<T: 'static> Subscriber<T> {
    /// Install the sink. Fires immediately when the value already arrived.
    pub fn subscribe(self, sink: impl FnOnce(T) + 'static) {
        let buffered = {
            let mut shared = self.shared.borrow_mut();
            if shared.resolved {
                shared.value.take()
            } else {
                shared.sink = Some(Box::new(sink));
                return;
            }
        };
        if let Some(value) = buffered {
            sink(value);
        }
    }
}
