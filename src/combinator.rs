//! Aggregate combinators: joins over several promises, built entirely on the
//! public listener API. First error wins; remaining settlements are ignored
//! for the join's own outcome.

use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use crate::promise::Promise;

struct CountJoin {
    remaining: usize,
    done: bool,
}

struct ValueJoin<T> {
    slots: Vec<Option<Vec<T>>>,
    remaining: usize,
    done: bool,
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Debug + Send + 'static,
{
    /// Count-only join gated on this promise's fulfillment.
    ///
    /// When this promise fulfills, `producer` runs synchronously and returns
    /// the promises to wait on, or `Err` for a failure during their eager
    /// construction, which rejects the returned promise outright. The
    /// returned promise fulfills with no payload once every element
    /// fulfills, and rejects with the first error as soon as it is known,
    /// without waiting for the rest.
    pub fn all<F>(&self, producer: F) -> Promise<T, E>
    where
        F: FnOnce() -> Result<Vec<Promise<T, E>>, E> + Send + 'static,
    {
        let result: Promise<T, E> = Promise::new();
        let target = result.clone();
        self.on_fulfill(move |_| {
            let promises = match producer() {
                Ok(promises) => promises,
                Err(error) => {
                    target.reject(error);
                    return;
                }
            };
            if promises.is_empty() {
                target.fulfill(Vec::new());
                return;
            }
            let join = Arc::new(Mutex::new(CountJoin {
                remaining: promises.len(),
                done: false,
            }));
            for promise in &promises {
                let join = join.clone();
                let target = target.clone();
                promise.on_resolve(move |outcome| {
                    let mut join = join.lock().unwrap();
                    if join.done {
                        return;
                    }
                    match outcome {
                        Ok(_) => {
                            join.remaining -= 1;
                            if join.remaining == 0 {
                                join.done = true;
                                drop(join);
                                target.fulfill(Vec::new());
                            }
                        }
                        Err(error) => {
                            join.done = true;
                            let error = error.clone();
                            drop(join);
                            target.reject(error);
                        }
                    }
                });
            }
        });
        let target = result.clone();
        self.on_reject(move |error| {
            target.reject(error.clone());
        });
        result
    }

    /// Positional join over an explicit list of promises.
    ///
    /// Fulfills with one value-sequence per input, aligned to input order.
    /// Rejects with the first error observed from any input; once rejected,
    /// later settlements of the other inputs are ignored. An empty list
    /// fulfills immediately.
    pub fn when(futures: impl Into<Vec<Promise<T, E>>>) -> Promise<Vec<T>, E> {
        let futures = futures.into();
        let result: Promise<Vec<T>, E> = Promise::new();
        if futures.is_empty() {
            result.fulfill(Vec::new());
            return result;
        }
        let join = Arc::new(Mutex::new(ValueJoin {
            slots: vec![None; futures.len()],
            remaining: futures.len(),
            done: false,
        }));
        for (index, future) in futures.iter().enumerate() {
            let join = join.clone();
            let target = result.clone();
            future.on_resolve(move |outcome| {
                let mut join = join.lock().unwrap();
                if join.done {
                    return;
                }
                match outcome {
                    Ok(values) => {
                        join.slots[index] = Some(values.to_vec());
                        join.remaining -= 1;
                        if join.remaining == 0 {
                            join.done = true;
                            let collected: Vec<Vec<T>> = join
                                .slots
                                .iter_mut()
                                .map(|slot| slot.take().unwrap_or_default())
                                .collect();
                            drop(join);
                            target.fulfill(collected);
                        }
                    }
                    Err(error) => {
                        join.done = true;
                        let error = error.clone();
                        drop(join);
                        target.reject(error);
                    }
                }
            });
        }
        result
    }
}
