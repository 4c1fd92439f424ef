//! The deferred factory: a promise paired with private settlement control.
//!
//! A producer hands out the promise (by clone) and keeps the [`Deferred`]
//! for itself, so external callers observe the outcome without settling it.
//! This is an encapsulation convention, not an enforced restriction; the
//! settlement operations still exist on `Promise` for code that owns both
//! ends.

use std::fmt::Debug;

use crate::promise::Promise;

/// A fresh promise plus its three settlement triggers.
#[derive(Debug)]
pub struct Deferred<T, E> {
    promise: Promise<T, E>,
}

impl<T, E> Deferred<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Debug + Send + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            promise: Promise::new(),
        }
    }

    /// A handle to the enclosed promise, for handing to consumers.
    pub fn promise(&self) -> Promise<T, E> {
        self.promise.clone()
    }

    pub fn fulfill(&self, values: impl Into<Vec<T>>) {
        self.promise.fulfill(values);
    }

    pub fn reject(&self, error: E) {
        self.promise.reject(error);
    }

    /// The dual-purpose node-style trigger: `Err` rejects, `Ok` fulfills.
    pub fn resolve(&self, outcome: Result<Vec<T>, E>) {
        self.promise.resolve(outcome);
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Debug + Send + 'static,
{
    /// Create a deferred: an unresolved promise with settlement control held
    /// apart from the promise handle itself.
    pub fn deferred() -> Deferred<T, E> {
        Deferred::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promise::State;

    #[test]
    fn resolve_ok_fulfills() {
        let d: Deferred<&str, String> = Promise::deferred();
        let p = d.promise();
        assert_eq!(p.state(), State::Unresolved);
        d.resolve(Ok(vec!["x"]));
        assert_eq!(p.values(), ["x"]);
    }

    #[test]
    fn resolve_err_rejects() {
        let _guard = crate::sink::TEST_SINK_LOCK.lock().unwrap();
        let d: Deferred<(), String> = Promise::deferred();
        let p = d.promise();
        p.end();
        d.resolve(Err("e".into()));
        assert_eq!(p.state(), State::Rejected);
        assert_eq!(p.error(), Some("e".into()));
    }
}
