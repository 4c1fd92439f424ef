//! A settle-once promise primitive.
//!
//! [`Promise`] is an in-memory container for a value or error that becomes
//! available at most once. Producers settle it with [`Promise::fulfill`],
//! [`Promise::reject`] or the node-style [`Promise::resolve`]; consumers
//! register listeners, derive chains with [`Promise::then`], and aggregate
//! with [`Promise::all`], [`Promise::when`] and [`Promise::hook`].
//!
//! Dispatch is synchronous and single-threaded-cooperative: settling a
//! promise runs every listener on the caller's stack before returning, and
//! a listener registered after settlement runs immediately with the stored
//! outcome. There is no deferral to a later turn and no I/O; suspension is
//! the host's business.
//!
//! Rejections are never lost silently. One that reaches the end of a `then`
//! chain without a handler panics on the settlement stack; marking the
//! chain with [`Promise::end`] routes it to the process-wide failure sink
//! instead (see [`sink`]).
//!
//! # Examples
//!
//! ```
//! use promise_once::{Promise, Resolution};
//!
//! let deferred = Promise::<u32, String>::deferred();
//! let promise = deferred.promise();
//!
//! promise
//!     .then(|values| Resolution::value(values[0] + 1))
//!     .on_fulfill(|values| assert_eq!(values, [42]));
//!
//! deferred.fulfill([41]);
//! ```

mod combinator;
mod deferred;
mod hook;
mod promise;
pub mod sink;

pub use deferred::Deferred;
pub use hook::{Hook, ParallelDone, SerialDone};
pub use promise::{Promise, Resolution, State};
pub use sink::UnhandledRejection;
