//! Listener/setter plumbing (the listener layer).
//!
//! A [`Listener<C>`] is a single-method callback consuming a channel
//! reference. A [`ListenerSetter<C>`] is the *only* way to attach or
//! replace one -- it is an [`arc_swap::ArcSwapOption`] cell, so `set` is
//! a single atomic pointer swap: a concurrent `invoke` sees either the
//! old or the new listener, never a torn value. [`invoke`](ListenerSetter::invoke)
//! is the channel-listener invoker: it never lets a listener panic
//! escape to the caller (the selector, in production), logging instead
//! and returning whether invocation happened at all.

mod delegating;
mod wrapped;

pub use delegating::DelegatingSetter;
pub use wrapped::ExecutorWrappedListener;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

/// A callback invoked on readiness or close, consuming a reference to
/// the channel it fired on.
pub trait Listener<C: ?Sized>: Send + Sync {
    fn on_ready(&self, channel: &C);
}

impl<C: ?Sized, F> Listener<C> for F
where
    F: Fn(&C) + Send + Sync,
{
    fn on_ready(&self, channel: &C) {
        self(channel)
    }
}

/// Lets an `Arc<T>` stand in for `T` wherever a `Listener<C>` is wanted,
/// so wrapper types (the framing reader/writer, the SSL overlay) can
/// install themselves as their own read/write-ready listener without a
/// separate closure-shim type.
impl<C: ?Sized, T: Listener<C> + ?Sized> Listener<C> for Arc<T> {
    fn on_ready(&self, channel: &C) {
        (**self).on_ready(channel)
    }
}

/// The atomic cell a channel exposes for one of its listener slots
/// (read-ready, write-ready, or close). Empty (`None`) by default.
pub struct ListenerSetter<C: ?Sized> {
    slot: ArcSwapOption<dyn Listener<C>>,
}

impl<C: ?Sized> Default for ListenerSetter<C> {
    fn default() -> Self {
        ListenerSetter {
            slot: ArcSwapOption::const_empty(),
        }
    }
}

impl<C: ?Sized> ListenerSetter<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the listener, or clears it if `listener` is `None`. A
    /// single atomic pointer swap.
    pub fn set(&self, listener: Option<Arc<dyn Listener<C>>>) {
        self.slot.store(listener);
    }

    /// The currently-installed listener, if any.
    pub fn get(&self) -> Option<Arc<dyn Listener<C>>> {
        self.slot.load_full()
    }

    /// Invokes the installed listener (if any) with `channel`, catching
    /// any panic it raises, logging it, and never propagating it.
    /// Returns `true` if a listener was installed and ran to completion
    /// without panicking, `false` if there was no listener or it
    /// panicked.
    pub fn invoke(&self, channel: &C) -> bool {
        match self.get() {
            Some(listener) => invoke_listener(listener.as_ref(), channel),
            None => false,
        }
    }
}

/// The channel-listener invoker: calls `listener.on_ready(channel)`,
/// catching and logging any panic instead of letting it escape. Exposed
/// standalone so [`DelegatingSetter`] and [`ExecutorWrappedListener`] can
/// reuse the same never-panics contract without going through a setter.
pub fn invoke_listener<C: ?Sized>(listener: &dyn Listener<C>, channel: &C) -> bool {
    let result = catch_unwind(AssertUnwindSafe(|| listener.on_ready(channel)));
    if let Err(payload) = result {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "listener panicked with a non-string payload".to_string());
        log::error!("listener invocation failed, swallowing: {message}");
        false
    } else {
        true
    }
}

/// Runs `close`, logging (rather than propagating) any error. Used
/// wherever a failure path needs to close a channel but has no
/// meaningful way to report a second error on top of the first.
pub fn safe_close<F: FnOnce() -> crate::error::Result<()>>(close: F) {
    if let Err(e) = close() {
        log::warn!("error while closing channel: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Chan;

    #[test]
    fn set_is_visible_to_next_invoke() {
        let setter: ListenerSetter<Chan> = ListenerSetter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        setter.set(Some(Arc::new(move |_: &Chan| {
            count2.fetch_add(1, Ordering::SeqCst);
        })));
        assert!(setter.invoke(&Chan));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_slot_invoke_is_a_no_op() {
        let setter: ListenerSetter<Chan> = ListenerSetter::new();
        assert!(!setter.invoke(&Chan));
    }

    #[test]
    fn panicking_listener_is_caught_and_logged() {
        let setter: ListenerSetter<Chan> = ListenerSetter::new();
        setter.set(Some(Arc::new(|_: &Chan| panic!("boom"))));
        assert!(!setter.invoke(&Chan), "invoke must report failure, not panic");
    }

    #[test]
    fn replacing_listener_is_atomic() {
        let setter: ListenerSetter<Chan> = ListenerSetter::new();
        setter.set(Some(Arc::new(|_: &Chan| {})));
        setter.set(None);
        assert!(!setter.invoke(&Chan));
    }

    #[test]
    fn safe_close_logs_and_swallows_error() {
        safe_close(|| Err(crate::error::Error::Closed));
        safe_close(|| Ok(()));
    }
}
