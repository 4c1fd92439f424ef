//! The failure sink: the one external collaborator of the crate. Rejections
//! that reach an `end` boundary without being observed are reported here
//! instead of being re-raised into the settlement call.
//!
//! The sink is an explicit, process-wide collaborator. When none is
//! installed, reports go to the log.

use std::sync::RwLock;

use thiserror::Error;

/// Report handed to the failure sink for a rejection nobody observed.
///
/// Rejection payloads are generic and never coerced, so the report carries
/// their debug rendering rather than the value itself.
#[derive(Debug, Error)]
#[error("unhandled promise rejection: {0}")]
pub struct UnhandledRejection(pub String);

impl UnhandledRejection {
    pub(crate) fn of<E: std::fmt::Debug>(err: &E) -> Self {
        UnhandledRejection(format!("{err:?}"))
    }
}

type Sink = Box<dyn Fn(UnhandledRejection) + Send + Sync>;

static SINK: RwLock<Option<Sink>> = RwLock::new(None);

/// Install the process-wide failure sink, replacing any previous one.
pub fn set_failure_sink<F>(sink: F)
where
    F: Fn(UnhandledRejection) + Send + Sync + 'static,
{
    *SINK.write().unwrap() = Some(Box::new(sink));
}

/// Remove the installed sink, restoring the default log reporter.
pub fn take_failure_sink() {
    *SINK.write().unwrap() = None;
}

/// The sink slot is process-wide; unit tests that install a sink or route a
/// rejection to it serialize on this lock.
#[cfg(test)]
pub(crate) static TEST_SINK_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

pub(crate) fn report(rejection: UnhandledRejection) {
    let sink = SINK.read().unwrap();
    match sink.as_ref() {
        Some(sink) => sink(rejection),
        None => tracing::error!(%rejection, "rejection reached end of chain with no handler"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn installed_sink_receives_reports() {
        let _guard = TEST_SINK_LOCK.lock().unwrap();
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(vec![]));
        let seen2 = seen.clone();
        set_failure_sink(move |r| seen2.lock().unwrap().push(r.to_string()));

        report(UnhandledRejection::of(&"boom"));
        take_failure_sink();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("boom"));
    }
}
