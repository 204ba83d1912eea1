//! A setter that exposes listener slots of type `C` while storing them
//! in an upstream [`ListenerSetter<U>`] of a different channel type --
//! used by wrapper channels (framing, blocking, SSL) that want their own
//! listener API but don't want their own slot storage. Whatever listener
//! is set is invoked with the wrapper's own channel reference, not the
//! upstream's.

use std::sync::Arc;

use super::{Listener, ListenerSetter};

pub struct DelegatingSetter<'a, U: ?Sized, C: ?Sized> {
    upstream: &'a ListenerSetter<U>,
    real_channel: Arc<C>,
}

impl<'a, U, C> DelegatingSetter<'a, U, C>
where
    U: ?Sized + 'static,
    C: ?Sized + Send + Sync + 'static,
{
    pub fn new(upstream: &'a ListenerSetter<U>, real_channel: Arc<C>) -> Self {
        DelegatingSetter {
            upstream,
            real_channel,
        }
    }

    /// Installs `listener`, wrapped so it fires with the wrapper's own
    /// channel instead of whatever the upstream setter's channel type is.
    pub fn set(&self, listener: Option<Arc<dyn Listener<C>>>) {
        match listener {
            Some(listener) => {
                let real_channel = self.real_channel.clone();
                self.upstream
                    .set(Some(Arc::new(move |_upstream_channel: &U| {
                        listener.on_ready(real_channel.as_ref());
                    })));
            }
            None => self.upstream.set(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Raw;
    struct Wrapper(u32);

    #[test]
    fn delegating_setter_invokes_with_wrapper_channel() {
        let upstream: ListenerSetter<Raw> = ListenerSetter::new();
        let wrapper = Arc::new(Wrapper(42));
        let delegate = DelegatingSetter::new(&upstream, wrapper);

        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        delegate.set(Some(Arc::new(move |w: &Wrapper| {
            seen2.store(w.0 as usize, Ordering::SeqCst);
        })));

        assert!(upstream.invoke(&Raw));
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn clearing_delegating_setter_clears_upstream() {
        let upstream: ListenerSetter<Raw> = ListenerSetter::new();
        let wrapper = Arc::new(Wrapper(0));
        let delegate = DelegatingSetter::new(&upstream, wrapper);

        delegate.set(Some(Arc::new(|_: &Wrapper| {})));
        delegate.set(None);
        assert!(!upstream.invoke(&Raw));
    }
}
