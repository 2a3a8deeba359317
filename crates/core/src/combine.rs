//! Combinators over promises

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::promise::{promise, Resolver, Subscriber};

/// Next move of a [`chain`] step.
pub enum Step<T> {
    /// Feed the value to the next step immediately.
    Value(T),
    /// Wait on another task before continuing.
    Await(Subscriber<T>),
}

/// One step of a [`chain`]: consumes the previous value, produces the next.
pub type ChainStep<T> = Box<dyn FnOnce(T) -> Step<T>>;

/// Resolve once every input task has resolved, with the values in input
/// order regardless of resolution order. An empty input resolves
/// immediately.
pub fn gather<T: 'static>(tasks: Vec<Subscriber<T>>) -> Subscriber<Vec<T>> {
    let (resolver, output) = promise();
    let pending = tasks.len();
    if pending == 0 {
        resolver.resolve(Vec::new());
        return output;
    }

    let slots: Rc<RefCell<Vec<Option<T>>>> =
        Rc::new(RefCell::new(std::iter::repeat_with(|| None).take(pending).collect()));
    let remaining = Rc::new(Cell::new(pending));
    let resolver = Rc::new(resolver);

    for (index, task) in tasks.into_iter().enumerate() {
        let slots = slots.clone();
        let remaining = remaining.clone();
        let resolver = resolver.clone();
        task.subscribe(move |value| {
            slots.borrow_mut()[index] = Some(value);
            remaining.set(remaining.get() - 1);
            if remaining.get() == 0 {
                // every slot is filled once the countdown reaches zero
                let values = slots.borrow_mut().drain(..).map(|slot| slot.unwrap()).collect();
                resolver.resolve(values);
            }
        });
    }
    output
}

/// Pipe the resolved value of `first` through `steps`, awaiting any step
/// that returns a task instead of a value. The final value resolves the
/// returned subscriber.
pub fn chain<T: 'static>(first: Subscriber<T>, steps: Vec<ChainStep<T>>) -> Subscriber<T> {
    let (resolver, output) = promise();
    first.subscribe(move |value| advance(value, steps.into(), resolver));
    output
}

fn advance<T: 'static>(value: T, mut steps: VecDeque<ChainStep<T>>, resolver: Resolver<T>) {
    match steps.pop_front() {
        None => resolver.resolve(value),
        Some(step) => match step(value) {
            Step::Value(next) => advance(next, steps, resolver),
            Step::Await(task) => task.subscribe(move |next| advance(next, steps, resolver)),
        },
    }
}
