//! Connectors, channel sources and destinations (the connection layer).
//!
//! A [`ChannelSource`] is the factory abstraction everything else here
//! composes: `open` returns a [`Future`] that resolves to the channel.
//! [`Connector`] and [`ChannelDestination`] are the outbound/inbound
//! specializations; [`ClosingCancellable`] is the advisory-cancellation
//! glue a connector attaches to its in-flight future so `cancel()` can
//! race the operation to a close; [`RetrySource`] wraps any
//! `ChannelSource` with a bounded retry policy.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::channel::Channel;
use crate::error::Error;
use crate::future::{done, pair, Cancellable, Future, FutureResult, Notifier, Status};
use crate::listener::{safe_close, Listener};

/// A factory for channels: each call to `open` starts one attempt and
/// returns a future for its outcome. `open_listener`, if given, is
/// invoked with the channel as soon as it exists, independently of (and
/// not ordered with respect to) the returned future settling.
pub trait ChannelSource<C: Send + Sync + 'static>: Send + Sync {
    fn open(&self, open_listener: Option<Arc<dyn Listener<C>>>) -> Future<Arc<C>>;
}

/// Initiates an outbound connection to `address`. `bind_listener` fires
/// after the local bind completes, `open_listener` after the connection
/// is fully established; the two are independent.
pub trait Connector<C: Send + Sync + 'static>: Send + Sync {
    fn connect(
        &self,
        address: SocketAddr,
        open_listener: Option<Arc<dyn Listener<C>>>,
        bind_listener: Option<Arc<dyn Listener<C>>>,
    ) -> Future<Arc<C>>;
}

/// Accepts a single inbound connection on a local bind.
pub trait ChannelDestination<C: Send + Sync + 'static>: Send + Sync {
    fn accept(&self, open_listener: Option<Arc<dyn Listener<C>>>) -> Future<Arc<C>>;
}

/// Binds a channel so that `cancel()` on a future wearing this
/// cancellable safe-closes it. Forwarding `cancel` to this (via
/// `Future::set_cancellable`) is how a connector makes an in-flight
/// connection attempt abortable.
pub struct ClosingCancellable<C> {
    channel: Arc<C>,
}

impl<C: Channel + Send + Sync + 'static> ClosingCancellable<C> {
    pub fn new(channel: Arc<C>) -> Arc<Self> {
        Arc::new(ClosingCancellable { channel })
    }
}

impl<C: Channel + Send + Sync + 'static> Cancellable for ClosingCancellable<C> {
    fn cancel(&self) {
        safe_close(|| self.channel.close());
    }
}

struct RetryState<C: Send + Sync + 'static> {
    inner: Arc<dyn ChannelSource<C>>,
    max_attempts: u32,
}

/// Wraps a [`ChannelSource`] so that a *failed* attempt is retried up to
/// `max_attempts` times before the final cause is surfaced wrapped in
/// [`Error::RetriesExhausted`]. `Done`/`Cancelled` outcomes pass through
/// on the first attempt that produces them.
pub struct RetrySource<C: Send + Sync + 'static> {
    state: Arc<RetryState<C>>,
}

impl<C: Send + Sync + 'static> Clone for RetrySource<C> {
    fn clone(&self) -> Self {
        RetrySource {
            state: self.state.clone(),
        }
    }
}

impl<C: Send + Sync + 'static> RetrySource<C> {
    /// `max_attempts` must be at least `1` (a single attempt, no retry).
    pub fn new(inner: Arc<dyn ChannelSource<C>>, max_attempts: u32) -> Self {
        assert!(max_attempts >= 1, "max_attempts must be >= 1");
        RetrySource {
            state: Arc::new(RetryState {
                inner,
                max_attempts,
            }),
        }
    }
}

impl<C: Send + Sync + 'static> ChannelSource<C> for RetrySource<C> {
    fn open(&self, open_listener: Option<Arc<dyn Listener<C>>>) -> Future<Arc<C>> {
        let (future, sink) = pair();
        attempt(self.state.clone(), 1, open_listener, sink);
        future
    }
}

struct RetryNotifier;

impl<C: Send + Sync + 'static> Notifier<Arc<C>, (Arc<RetryState<C>>, u32, Option<Arc<dyn Listener<C>>>, FutureResult<Arc<C>>)>
    for RetryNotifier
{
    fn handle(
        &self,
        future: &Future<Arc<C>>,
        (state, attempt_no, open_listener, sink): (
            Arc<RetryState<C>>,
            u32,
            Option<Arc<dyn Listener<C>>>,
            FutureResult<Arc<C>>,
        ),
    ) {
        match future.status() {
            Status::Done => {
                sink.set_value(future.get().expect("done"));
            }
            Status::Cancelled => {
                sink.set_cancelled();
            }
            Status::Failed => {
                let cause = future.get_exception().expect("failed");
                if attempt_no >= state.max_attempts {
                    sink.set_failure(Error::RetriesExhausted {
                        attempts: attempt_no,
                        cause: Box::new(cause),
                    });
                } else {
                    attempt(state, attempt_no + 1, open_listener, sink);
                }
            }
            Status::Waiting => unreachable!("notifier only fires on terminal state"),
        }
    }
}

fn attempt<C: Send + Sync + 'static>(
    state: Arc<RetryState<C>>,
    attempt_no: u32,
    open_listener: Option<Arc<dyn Listener<C>>>,
    sink: FutureResult<Arc<C>>,
) {
    let attempt_future = state.inner.open(open_listener.clone());
    attempt_future.add_notifier(RetryNotifier, (state, attempt_no, open_listener, sink));
}

/// A `ChannelSource` that has already produced `channel`, for call sites
/// that want to hand a freshly-accepted or already-connected channel
/// through the same factory interface the rest of this layer expects.
pub fn ready<C: Send + Sync + 'static>(channel: Arc<C>) -> Future<Arc<C>> {
    done(channel)
}
