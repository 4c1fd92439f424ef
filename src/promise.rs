//! The settle-once promise: state machine, listener registry and derived
//! chains.
//!
//! A [`Promise`] latches exactly one outcome: an ordered list of fulfillment
//! values, or a rejection error stored exactly as given. Settlement attempts
//! after the latch are silent no-ops. Dispatch is synchronous: listeners run
//! on the caller's stack before `fulfill`/`reject` returns, and a listener
//! registered after settlement runs immediately with the stored outcome. The
//! registry never misses a settled promise.
//!
//! # Examples
//!
//! ```
//! use promise_once::{Promise, Resolution};
//!
//! let p: Promise<&str, String> = Promise::new();
//! let first = p.then(|values| Resolution::value(values[0]));
//! first.on_fulfill(|values| assert_eq!(values, ["hi"]));
//! p.fulfill(["hi"]);
//! ```

use std::fmt;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use crate::sink::{self, UnhandledRejection};

/// Lifecycle of a promise. Transitions only out of `Unresolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unresolved,
    Fulfilled,
    Rejected,
}

/// What a `then` handler resolved to. Handlers return this tagged result
/// instead of throwing; an [`Resolution::Error`] rejects the derived promise
/// the way a thrown exception would.
pub enum Resolution<T, E> {
    /// Fulfill the derived promise with these values.
    Values(Vec<T>),
    /// Adopt another promise's eventual outcome (recursive chaining).
    Adopt(Promise<T, E>),
    /// Reject the derived promise.
    Error(E),
}

impl<T, E> Resolution<T, E> {
    /// Fulfill with no payload.
    pub fn empty() -> Self {
        Resolution::Values(Vec::new())
    }

    /// Fulfill with a single value.
    pub fn value(value: T) -> Self {
        Resolution::Values(vec![value])
    }
}

type FulfillFn<T> = Box<dyn FnOnce(&[T]) + Send>;
type RejectFn<E> = Box<dyn FnOnce(&E) + Send>;
type OnFulfilled<T, E> = Box<dyn FnOnce(&[T]) -> Resolution<T, E> + Send>;
type OnRejected<T, E> = Box<dyn FnOnce(&E) -> Resolution<T, E> + Send>;
type TerminalFn<E> = Box<dyn FnOnce(&E) -> Result<(), E> + Send>;

struct Inner<T, E> {
    state: State,
    values: Vec<T>,
    error: Option<E>,
    on_fulfill: Vec<FulfillFn<T>>,
    on_reject: Vec<RejectFn<E>>,
    /// Final rejection handler installed by `end_with`.
    terminal: Option<TerminalFn<E>>,
    /// `end` was called: route an unobserved rejection to the failure sink
    /// instead of panicking.
    ended: bool,
    /// At least one rejection observer has seen the stored error.
    observed: bool,
    /// This promise is a link in a `then` chain. An unobserved rejection
    /// here is the end of the chain and fails loud; a root promise merely
    /// stores the error until an observer arrives.
    chained: bool,
}

/// A cheap cloneable handle to the shared settle-once state. Clones observe
/// and settle the same underlying promise.
pub struct Promise<T, E> {
    inner: Arc<Mutex<Inner<T, E>>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock().unwrap().state;
        f.debug_struct("Promise").field("state", &state).finish()
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Debug + Send + 'static,
{
    /// Create an unresolved promise.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Unresolved,
                values: Vec::new(),
                error: None,
                on_fulfill: Vec::new(),
                on_reject: Vec::new(),
                terminal: None,
                ended: false,
                observed: false,
                chained: false,
            })),
        }
    }

    /// Create an unresolved promise seeded with a combined observer,
    /// shorthand for [`Promise::on_resolve`].
    pub fn with_observer<F>(observer: F) -> Self
    where
        F: FnOnce(Result<&[T], &E>) + Send + 'static,
    {
        let promise = Self::new();
        promise.on_resolve(observer);
        promise
    }

    /// Create an already-fulfilled promise.
    pub fn fulfilled(values: impl Into<Vec<T>>) -> Self {
        let promise = Self::new();
        promise.fulfill(values);
        promise
    }

    pub fn state(&self) -> State {
        self.inner.lock().unwrap().state
    }

    /// The stored fulfillment values, empty while unresolved or rejected.
    pub fn values(&self) -> Vec<T> {
        self.inner.lock().unwrap().values.clone()
    }

    /// The stored rejection error, if rejected.
    pub fn error(&self) -> Option<E> {
        self.inner.lock().unwrap().error.clone()
    }

    /// Latch the promise fulfilled and dispatch every fulfill listener on
    /// this stack, in registration order. No-op if already settled.
    pub fn fulfill(&self, values: impl Into<Vec<T>>) -> &Self {
        let (listeners, values) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state != State::Unresolved {
                return self;
            }
            inner.state = State::Fulfilled;
            inner.values = values.into();
            inner.on_reject.clear();
            inner.terminal = None;
            (
                std::mem::take(&mut inner.on_fulfill),
                inner.values.clone(),
            )
        };
        tracing::trace!(listeners = listeners.len(), "promise fulfilled");
        for listener in listeners {
            listener(&values);
        }
        self
    }

    /// Latch the promise rejected and dispatch every reject listener on this
    /// stack, in registration order. The error is stored exactly as given.
    /// No-op if already settled.
    ///
    /// A rejection reaching the end of a `then` chain with no reject
    /// listener is never dropped: it panics here, on the settlement stack,
    /// unless [`Promise::end`] marked the chain handled, in which case it
    /// goes to the failure sink. A root promise with no observers simply
    /// stores the error; late registration still sees it.
    pub fn reject(&self, error: E) -> &Self {
        let (listeners, terminal, ended, chained, error) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state != State::Unresolved {
                return self;
            }
            inner.state = State::Rejected;
            inner.error = Some(error.clone());
            inner.on_fulfill.clear();
            let listeners = std::mem::take(&mut inner.on_reject);
            let terminal = inner.terminal.take();
            inner.observed = !listeners.is_empty() || terminal.is_some();
            (listeners, terminal, inner.ended, inner.chained, error)
        };
        tracing::trace!(listeners = listeners.len(), "promise rejected");
        let unobserved = listeners.is_empty() && terminal.is_none();
        for listener in listeners {
            listener(&error);
        }
        if let Some(terminal) = terminal {
            if let Err(err) = terminal(&error) {
                sink::report(UnhandledRejection::of(&err));
            }
        } else if unobserved {
            if ended {
                sink::report(UnhandledRejection::of(&error));
            } else if chained {
                panic!("unhandled promise rejection: {error:?}");
            } else {
                tracing::trace!("rejection stored with no observers yet");
            }
        }
        self
    }

    /// Convenience dispatcher: `Err` rejects, `Ok` fulfills.
    pub fn resolve(&self, outcome: Result<Vec<T>, E>) -> &Self {
        match outcome {
            Ok(values) => self.fulfill(values),
            Err(error) => self.reject(error),
        }
    }

    /// Register a fulfill listener. Runs immediately with the stored values
    /// if the promise already fulfilled.
    pub fn on_fulfill<F>(&self, listener: F) -> &Self
    where
        F: FnOnce(&[T]) + Send + 'static,
    {
        let settled = {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                State::Unresolved => {
                    inner.on_fulfill.push(Box::new(listener));
                    return self;
                }
                State::Fulfilled => Some(inner.values.clone()),
                State::Rejected => None,
            }
        };
        if let Some(values) = settled {
            listener(&values);
        }
        self
    }

    /// Register a reject listener. Runs immediately with the stored error if
    /// the promise already rejected.
    pub fn on_reject<F>(&self, listener: F) -> &Self
    where
        F: FnOnce(&E) + Send + 'static,
    {
        let settled = {
            let mut inner = self.inner.lock().unwrap();
            match inner.state {
                State::Unresolved => {
                    inner.on_reject.push(Box::new(listener));
                    return self;
                }
                State::Rejected => {
                    inner.observed = true;
                    inner.error.clone()
                }
                State::Fulfilled => None,
            }
        };
        if let Some(error) = settled {
            listener(&error);
        }
        self
    }

    /// Register for both outcomes: the listener receives `Ok(values)` on
    /// fulfillment or `Err(error)` on rejection, exactly once either way.
    pub fn on_resolve<F>(&self, listener: F) -> &Self
    where
        F: FnOnce(Result<&[T], &E>) + Send + 'static,
    {
        // One event ever fires, so the two registrations share one slot.
        let slot = Arc::new(Mutex::new(Some(listener)));
        let fulfill_slot = slot.clone();
        self.on_fulfill(move |values| {
            if let Some(listener) = fulfill_slot.lock().unwrap().take() {
                listener(Ok(values));
            }
        });
        self.on_reject(move |error| {
            if let Some(listener) = slot.lock().unwrap().take() {
                listener(Err(error));
            }
        })
    }

    /// Derive a new promise from this one's outcome. Exactly one handler
    /// path fires per settlement; an absent handler propagates the outcome
    /// unchanged. Handler errors reject the derived promise only; sibling
    /// listeners on this promise are unaffected.
    fn derive(
        &self,
        on_fulfilled: Option<OnFulfilled<T, E>>,
        on_rejected: Option<OnRejected<T, E>>,
    ) -> Promise<T, E> {
        let derived = Promise::new();
        let target = derived.clone();
        self.on_fulfill(move |values| match on_fulfilled {
            Some(handler) => target.settle_with(handler(values)),
            None => {
                target.fulfill(values.to_vec());
            }
        });
        let target = derived.clone();
        self.on_reject(move |error| match on_rejected {
            Some(handler) => target.settle_with(handler(error)),
            None => {
                target.reject(error.clone());
            }
        });
        // Marked after registration: an already-settled source propagates
        // during `on_reject` above, and that rejection must store quietly so
        // the caller can still attach the chain's handler.
        derived.inner.lock().unwrap().chained = true;
        derived
    }

    fn settle_with(&self, resolution: Resolution<T, E>) {
        match resolution {
            Resolution::Values(values) => {
                self.fulfill(values);
            }
            Resolution::Adopt(promise) => {
                promise.chain(self);
            }
            Resolution::Error(error) => {
                self.reject(error);
            }
        }
    }

    /// Derived promise with a fulfillment handler; rejection propagates
    /// unchanged.
    pub fn then<F>(&self, on_fulfilled: F) -> Promise<T, E>
    where
        F: FnOnce(&[T]) -> Resolution<T, E> + Send + 'static,
    {
        self.derive(Some(Box::new(on_fulfilled)), None)
    }

    /// Derived promise with both handlers.
    pub fn then_catch<F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<T, E>
    where
        F: FnOnce(&[T]) -> Resolution<T, E> + Send + 'static,
        R: FnOnce(&E) -> Resolution<T, E> + Send + 'static,
    {
        self.derive(Some(Box::new(on_fulfilled)), Some(Box::new(on_rejected)))
    }

    /// Derived promise with a rejection handler; fulfillment propagates
    /// unchanged.
    pub fn catch<R>(&self, on_rejected: R) -> Promise<T, E>
    where
        R: FnOnce(&E) -> Resolution<T, E> + Send + 'static,
    {
        self.derive(None, Some(Box::new(on_rejected)))
    }

    /// Handlerless link: a derived promise settling exactly as this one
    /// does.
    pub fn forward(&self) -> Promise<T, E> {
        self.derive(None, None)
    }

    /// Forward this promise's settlement into an independently created
    /// promise: same values on fulfillment, same error on rejection.
    pub fn chain(&self, other: &Promise<T, E>) -> &Self {
        let tail = other.clone();
        self.on_fulfill(move |values| {
            tail.fulfill(values.to_vec());
        });
        let tail = other.clone();
        self.on_reject(move |error| {
            tail.reject(error.clone());
        })
    }

    /// Terminal marker: declares the chain handled. An otherwise-unobserved
    /// rejection, past or future, goes to the failure sink instead of
    /// panicking. Returns the promise it was called on.
    pub fn end(&self) -> &Self {
        let unobserved = {
            let mut inner = self.inner.lock().unwrap();
            inner.ended = true;
            if inner.state == State::Rejected && !inner.observed {
                inner.observed = true;
                inner.error.clone()
            } else {
                None
            }
        };
        if let Some(error) = unobserved {
            sink::report(UnhandledRejection::of(&error));
        }
        self
    }

    /// Terminal marker with a final rejection handler. The handler is
    /// isolated: an `Err` it returns goes to the failure sink, never back
    /// into the settlement call that triggered it.
    pub fn end_with<R>(&self, on_reject: R) -> &Self
    where
        R: FnOnce(&E) -> Result<(), E> + Send + 'static,
    {
        let settled = {
            let mut inner = self.inner.lock().unwrap();
            inner.ended = true;
            match inner.state {
                State::Unresolved => {
                    inner.terminal = Some(Box::new(on_reject));
                    return self;
                }
                State::Rejected => {
                    inner.observed = true;
                    inner.error.clone()
                }
                State::Fulfilled => None,
            }
        };
        if let Some(error) = settled {
            if let Err(err) = on_reject(&error) {
                sink::report(UnhandledRejection::of(&err));
            }
        }
        self
    }
}

impl<T, E> Default for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Debug + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn fulfill_latches_once() {
        let p: Promise<i32, String> = Promise::new();
        p.fulfill([1, 2]);
        p.fulfill([9]);
        p.reject("late".into());
        assert_eq!(p.state(), State::Fulfilled);
        assert_eq!(p.values(), [1, 2]);
        assert_eq!(p.error(), None);
    }

    #[test]
    fn listeners_fire_in_registration_order() {
        let p: Promise<i32, String> = Promise::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in 0..3 {
            let order = order.clone();
            p.on_fulfill(move |_| order.lock().unwrap().push(tag));
        }
        p.fulfill([7]);
        assert_eq!(*order.lock().unwrap(), [0, 1, 2]);
    }

    #[test]
    fn late_listener_runs_immediately() {
        let p: Promise<&str, String> = Promise::new();
        p.fulfill(["a", "b"]);
        let called = Arc::new(AtomicUsize::new(0));
        let called2 = called.clone();
        p.on_fulfill(move |values| {
            assert_eq!(values, ["a", "b"]);
            called2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(called.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn then_without_handler_propagates_values() {
        let p: Promise<&str, String> = Promise::new();
        let derived = p.forward();
        p.fulfill(["a", "b", "c"]);
        assert_eq!(derived.values(), ["a", "b", "c"]);
    }

    #[test]
    fn then_handler_error_rejects_derived_only() {
        let _guard = sink::TEST_SINK_LOCK.lock().unwrap();
        let p: Promise<i32, &str> = Promise::new();
        let sibling_ran = Arc::new(AtomicUsize::new(0));
        let sibling_ran2 = sibling_ran.clone();
        p.on_fulfill(move |_| {
            sibling_ran2.fetch_add(1, Ordering::SeqCst);
        });
        let derived = p.then(|_| Resolution::Error("boo"));
        derived.end();
        p.fulfill([1]);
        assert_eq!(derived.state(), State::Rejected);
        assert_eq!(derived.error(), Some("boo"));
        assert_eq!(p.state(), State::Fulfilled);
        assert_eq!(sibling_ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn then_adopts_returned_promise() {
        let p: Promise<&str, String> = Promise::new();
        let inner_promise: Promise<&str, String> = Promise::new();
        let adopted = inner_promise.clone();
        let derived = p.then(move |_| Resolution::Adopt(adopted));
        p.fulfill(Vec::new());
        assert_eq!(derived.state(), State::Unresolved);
        inner_promise.fulfill(["a", "b", "c"]);
        assert_eq!(derived.values(), ["a", "b", "c"]);
    }

    #[test]
    fn chain_built_off_rejected_source_stores_quietly() {
        let p: Promise<(), &str> = Promise::new();
        p.reject("bad");
        let caught = Arc::new(AtomicUsize::new(0));
        let caught2 = caught.clone();
        // Construction must not fail loud; the handler attached next
        // observes the stored rejection.
        p.forward().end_with(move |err| {
            assert_eq!(*err, "bad");
            caught2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(caught.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_error_on_fulfilled_source_stores_quietly() {
        let caught = Arc::new(AtomicUsize::new(0));
        let caught2 = caught.clone();
        let derived = Promise::<(), &str>::fulfilled(Vec::new())
            .then(|_| Resolution::Error("shucks"));
        assert_eq!(derived.error(), Some("shucks"));
        derived.end_with(move |err| {
            assert_eq!(*err, "shucks");
            caught2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(caught.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn catch_recovers_a_rejection() {
        let p: Promise<&str, String> = Promise::new();
        let recovered = p.catch(|err| {
            assert_eq!(err, "nope");
            Resolution::value("fallback")
        });
        p.reject("nope".into());
        assert_eq!(recovered.state(), State::Fulfilled);
        assert_eq!(recovered.values(), ["fallback"]);
    }

    #[test]
    fn rejection_not_coerced() {
        let p: Promise<(), i32> = Promise::with_observer(|outcome| {
            assert_eq!(outcome, Err(&3));
        });
        p.reject(3);
    }

    #[test]
    fn end_returns_same_promise() {
        let p: Promise<(), String> = Promise::new();
        let p2 = p.end().clone();
        assert!(Arc::ptr_eq(&p.inner, &p2.inner));
    }
}
