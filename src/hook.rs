//! Staged hook orchestrator: an ordered list of hooks with chained serial
//! completion and independent parallel completion.
//!
//! Each hook receives two consume-on-fire trigger tokens. The serial token
//! gates the next hook; the parallel token only counts toward overall
//! completion. Tokens may outlive the hook body, so a hook can hand them to
//! external code that fires them later. The orchestrator's promise fulfills
//! once every serial trigger has fired in order and every parallel trigger
//! has fired in any order; the first hook error rejects it and halts the
//! run.

use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use crate::promise::Promise;

/// A hook body. Returning `Err` rejects the orchestrator's promise
/// immediately; remaining hooks are not invoked.
pub type Hook<E> = Box<dyn FnOnce(SerialDone<E>, ParallelDone<E>) -> Result<(), E> + Send>;

struct HookRun<E> {
    hooks: Vec<Option<Hook<E>>>,
    /// Index of the next hook to invoke.
    next: usize,
    serial_done: usize,
    parallel_done: usize,
    failed: bool,
    /// A hook body is currently executing. Triggers fired inside it only
    /// update the counts; the body's own `advance` loop picks the work up
    /// once the body returns, so a hook's error is seen before any later
    /// hook runs.
    active: bool,
}

/// Serial-completion trigger for one hook. Consumed on fire, so it can
/// fire at most once.
pub struct SerialDone<E> {
    run: Arc<Mutex<HookRun<E>>>,
    result: Promise<(), E>,
}

impl<E: Clone + Debug + Send + 'static> SerialDone<E> {
    pub fn done(self) {
        self.run.lock().unwrap().serial_done += 1;
        advance(&self.run, &self.result);
    }
}

/// Parallel-completion trigger for one hook. Consumed on fire.
pub struct ParallelDone<E> {
    run: Arc<Mutex<HookRun<E>>>,
    result: Promise<(), E>,
}

impl<E: Clone + Debug + Send + 'static> ParallelDone<E> {
    pub fn done(self) {
        self.run.lock().unwrap().parallel_done += 1;
        advance(&self.run, &self.result);
    }
}

enum Next<E> {
    Run(Hook<E>),
    Finish,
    Wait,
}

/// Invoke every hook whose serial gate is open, then fulfill once both
/// counts are complete. Hook bodies run with the run lock released so their
/// triggers may fire synchronously.
fn advance<E: Clone + Debug + Send + 'static>(
    run: &Arc<Mutex<HookRun<E>>>,
    result: &Promise<(), E>,
) {
    loop {
        let next = {
            let mut state = run.lock().unwrap();
            if state.failed || state.active {
                return;
            }
            if state.next < state.hooks.len() && state.serial_done >= state.next {
                let index = state.next;
                state.next += 1;
                match state.hooks[index].take() {
                    Some(hook) => {
                        state.active = true;
                        Next::Run(hook)
                    }
                    None => Next::Wait,
                }
            } else if state.serial_done == state.hooks.len()
                && state.parallel_done == state.hooks.len()
            {
                Next::Finish
            } else {
                Next::Wait
            }
        };
        match next {
            Next::Run(hook) => {
                let serial = SerialDone {
                    run: run.clone(),
                    result: result.clone(),
                };
                let parallel = ParallelDone {
                    run: run.clone(),
                    result: result.clone(),
                };
                let outcome = hook(serial, parallel);
                run.lock().unwrap().active = false;
                if let Err(error) = outcome {
                    run.lock().unwrap().failed = true;
                    result.reject(error);
                    return;
                }
            }
            Next::Finish => {
                // Idempotent if a reentrant trigger already got here.
                result.fulfill(Vec::new());
                return;
            }
            Next::Wait => return,
        }
    }
}

impl<E> Promise<(), E>
where
    E: Clone + Debug + Send + 'static,
{
    /// Run `hooks` in staged order. See the module docs for the completion
    /// contract.
    pub fn hook(hooks: Vec<Hook<E>>) -> Promise<(), E> {
        let result: Promise<(), E> = Promise::new();
        let run = Arc::new(Mutex::new(HookRun {
            hooks: hooks.into_iter().map(Some).collect(),
            next: 0,
            serial_done: 0,
            parallel_done: 0,
            failed: false,
            active: false,
        }));
        advance(&run, &result);
        result
    }
}
