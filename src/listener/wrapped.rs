//! Dispatches listener invocation onto an [`Executor`] instead of the
//! calling thread (normally the reactor thread pumping readiness
//! events). Useful for listeners that do enough work that running them
//! inline would stall the reactor for every other registered channel.

use std::sync::Arc;

use crate::executor::Executor;

use super::invoke_listener;
use super::Listener;

/// Wraps a `Listener<C>` plus an `Executor`. Dispatch submits the
/// listener invocation as a task rather than running it inline; if the
/// executor rejects the task, `on_reject` runs instead (inline, on the
/// dispatching thread), typically to safe-close the channel.
pub struct ExecutorWrappedListener<C: ?Sized + 'static> {
    listener: Arc<dyn Listener<C>>,
    executor: Arc<dyn Executor>,
    on_reject: Box<dyn Fn() + Send + Sync>,
}

impl<C: ?Sized + 'static> ExecutorWrappedListener<C> {
    pub fn new(
        listener: Arc<dyn Listener<C>>,
        executor: Arc<dyn Executor>,
        on_reject: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        ExecutorWrappedListener {
            listener,
            executor,
            on_reject: Box::new(on_reject),
        }
    }
}

impl<C: Send + Sync + 'static> ExecutorWrappedListener<C> {
    /// Submits the listener invocation as a task; runs `on_reject`
    /// inline if the executor won't accept it.
    pub fn dispatch(&self, channel: Arc<C>) {
        let listener = self.listener.clone();
        let submitted = self.executor.submit(Box::new(move || {
            invoke_listener(listener.as_ref(), channel.as_ref());
        }));
        if submitted.is_err() {
            (self.on_reject)();
        }
    }
}
