//! Failure boundaries for background work.
//!
//! Every long-lived or fan-out task runs behind one of these so that a
//! panic is logged against the task's name and never unwinds into sibling
//! tasks or the lifecycle manager.

use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::task::JoinHandle;
use tracing::{debug, error};

/// How a supervised task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Panicked(String),
    Aborted,
}

/// Spawn `future` on the runtime with a watcher that contains its panics.
pub fn spawn_supervised<F>(name: impl Into<String>, future: F) -> JoinHandle<TaskOutcome>
where
    F: Future<Output = ()> + Send + 'static,
{
    let name = name.into();
    let inner = tokio::spawn(future);
    tokio::spawn(async move {
        match inner.await {
            Ok(()) => {
                debug!(task = %name, "task finished");
                TaskOutcome::Completed
            }
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic().as_ref());
                error!(task = %name, panic = %message, "task panicked, fault contained");
                TaskOutcome::Panicked(message)
            }
            Err(_) => {
                debug!(task = %name, "task aborted");
                TaskOutcome::Aborted
            }
        }
    })
}

/// Run a synchronous closure, converting a panic into a logged `None`.
pub fn catch_fault<T>(name: &str, f: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            error!(task = %name, panic = %panic_message(payload.as_ref()), "fault contained");
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
