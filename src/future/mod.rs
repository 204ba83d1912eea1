//! The asynchronous-result object (the future/result type): a thread-safe,
//! single-assignment future for the outcome of a deferred I/O operation.
//!
//! [`Future<T>`] / [`FutureResult<T>`] are two ends of the same cell,
//! created together by [`pair`]. `Future` is the read side: `status`,
//! `await_`, `get`, `add_notifier`, `cancel`. `FutureResult` is the
//! write-only side bound 1:1 to it: `set_value`, `set_failure`,
//! `set_cancelled`, of which exactly one succeeds.
//!
//! `T` must be `Clone + Send + Sync + 'static`: the terminal value may be
//! read by `get()` from multiple threads and handed to every registered
//! notifier, so it is cloned out under the lock rather than moved once.
//! Channel types are cheap handles already (see the channel layer), so this is
//! not a burdensome bound in practice.

mod interrupt;

pub use interrupt::Interrupt;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};

/// The four states a future can be in. `Waiting` is the only non-terminal
/// one; transitions out of it happen at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Waiting,
    Done,
    Failed,
    Cancelled,
}

enum State<T> {
    Waiting,
    Done(T),
    Failed(Error),
    Cancelled,
}

impl<T> State<T> {
    fn status(&self) -> Status {
        match self {
            State::Waiting => Status::Waiting,
            State::Done(_) => Status::Done,
            State::Failed(_) => Status::Failed,
            State::Cancelled => Status::Cancelled,
        }
    }
}

/// A handle a future can forward `cancel()` requests to. Cancellation is
/// advisory: the future itself never flips to `Cancelled` just
/// because `cancel()` was called; a `Cancellable` that wants that to
/// happen must call `set_cancelled` on the bound `FutureResult` itself
/// once it wins the race with the in-flight operation (see the retry source
/// `ClosingCancellable`).
pub trait Cancellable: Send + Sync {
    fn cancel(&self);
}

type Thunk = Box<dyn FnOnce() + Send>;

struct Inner<T> {
    state: Mutex<State<T>>,
    condvar: Condvar,
    notifiers: Mutex<Vec<Thunk>>,
    cancellable: Mutex<Option<Arc<dyn Cancellable>>>,
}

impl<T> Inner<T> {
    fn new() -> Self {
        Inner {
            state: Mutex::new(State::Waiting),
            condvar: Condvar::new(),
            notifiers: Mutex::new(Vec::new()),
            cancellable: Mutex::new(None),
        }
    }

    /// Attempts the one allowed transition out of `Waiting`. Returns
    /// `true` if this call performed it, `false` if the future was
    /// already terminal (a no-op, per the result-sink contract).
    fn complete(&self, new_state: State<T>) -> bool {
        {
            let mut state = self.state.lock();
            if !matches!(&*state, State::Waiting) {
                return false;
            }
            *state = new_state;
        }
        // Notify waiters and drain pending notifiers *after* releasing
        // the state lock: a notifier is free to call back into this
        // future (e.g. `status()`, registering another notifier), and
        // must not deadlock doing so.
        self.condvar.notify_all();
        let pending: Vec<Thunk> = std::mem::take(&mut *self.notifiers.lock());
        for thunk in pending {
            thunk();
        }
        true
    }

    /// Registers a notifier thunk, firing it immediately if already
    /// terminal (synchronously, on the calling thread) or queuing it
    /// otherwise.
    fn add_notifier(&self, thunk: Thunk) {
        let is_terminal = {
            let state = self.state.lock();
            !matches!(&*state, State::Waiting)
        };
        if is_terminal {
            thunk();
        } else {
            let mut notifiers = self.notifiers.lock();
            // Re-check under lock: completion may have raced us between
            // the read above and taking this lock.
            let state = self.state.lock();
            if matches!(&*state, State::Waiting) {
                notifiers.push(thunk);
            } else {
                drop(state);
                drop(notifiers);
                thunk();
            }
        }
    }
}

/// The read side of a future: a single-assignment result holder for a
/// deferred operation (the future/result type).
pub struct Future<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Future {
            inner: self.inner.clone(),
        }
    }
}

/// The write-only side bound 1:1 to a [`Future`]. Exactly one of
/// `set_value`/`set_failure`/`set_cancelled` may succeed; later calls on
/// any of them are no-ops (the future/result type's "result sink").
pub struct FutureResult<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for FutureResult<T> {
    fn clone(&self) -> Self {
        FutureResult {
            inner: self.inner.clone(),
        }
    }
}

/// Creates a bound future/result-sink pair, both initially `Waiting`.
pub fn pair<T>() -> (Future<T>, FutureResult<T>) {
    let inner = Arc::new(Inner::new());
    (
        Future {
            inner: inner.clone(),
        },
        FutureResult { inner },
    )
}

/// A completed future, for call sites that already have the value in
/// hand and want to present it through the `Future` interface.
pub fn done<T>(value: T) -> Future<T> {
    let (future, sink) = pair();
    sink.set_value(value);
    future
}

/// An already-failed future.
pub fn failed<T>(err: Error) -> Future<T> {
    let (future, sink) = pair();
    sink.set_failure(err);
    future
}

impl<T: Clone + Send + Sync + 'static> Future<T> {
    pub fn status(&self) -> Status {
        self.inner.state.lock().status()
    }

    /// Binds a cancellable that `cancel()` forwards to. Only the first
    /// binding takes effect; intended to be called once by whatever
    /// produces this future.
    pub fn set_cancellable(&self, cancellable: Arc<dyn Cancellable>) {
        let mut slot = self.inner.cancellable.lock();
        if slot.is_none() {
            *slot = Some(cancellable);
        }
    }

    /// Idempotent, advisory cancellation request. A no-op if the
    /// future is already terminal or has no attached cancellable.
    /// Returns `self` for chaining.
    pub fn cancel(&self) -> &Self {
        if self.status() == Status::Waiting {
            let cancellable = self.inner.cancellable.lock().clone();
            if let Some(c) = cancellable {
                c.cancel();
            }
        }
        self
    }

    /// Blocks indefinitely until the future is terminal.
    pub fn await_(&self) -> Status {
        let mut state = self.inner.state.lock();
        self.inner
            .condvar
            .wait_while(&mut state, |s| matches!(s, State::Waiting));
        state.status()
    }

    /// Blocks up to `timeout`, returning whatever status is observed
    /// (possibly still `Waiting` if the deadline passed first).
    pub fn await_timeout(&self, timeout: Duration) -> Status {
        let mut state = self.inner.state.lock();
        if !matches!(&*state, State::Waiting) {
            return state.status();
        }
        let _ = self
            .inner
            .condvar
            .wait_while_for(&mut state, |s| matches!(s, State::Waiting), timeout);
        state.status()
    }

    /// Like [`await_`](Self::await_), but periodically checks `interrupt`
    /// and returns `Err(Error::Interrupted)` if it becomes set before the
    /// future turns terminal.
    pub fn await_interruptibly(&self, interrupt: &Interrupt) -> Result<Status> {
        self.await_interruptibly_timeout(None, interrupt)
    }

    pub fn await_interruptibly_timeout(
        &self,
        timeout: Option<Duration>,
        interrupt: &Interrupt,
    ) -> Result<Status> {
        const POLL: Duration = Duration::from_millis(20);
        let deadline = timeout.map(|d| Instant::now() + d);
        loop {
            if interrupt.is_set() {
                return Err(Error::Interrupted);
            }
            let slice = match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Ok(self.status());
                    }
                    POLL.min(d - now)
                }
                None => POLL,
            };
            let status = self.await_timeout(slice);
            if status != Status::Waiting {
                return Ok(status);
            }
        }
    }

    /// Returns the value, or fails with `Error::Cancelled` or the stored
    /// failure. Blocks until terminal.
    pub fn get(&self) -> Result<T> {
        match self.await_() {
            Status::Done => {
                let state = self.inner.state.lock();
                match &*state {
                    State::Done(v) => Ok(v.clone()),
                    _ => unreachable!("status() just said Done"),
                }
            }
            Status::Failed => Err(self.get_exception().expect("status is Failed")),
            Status::Cancelled => Err(Error::Cancelled),
            Status::Waiting => unreachable!("await_ only returns on terminal state"),
        }
    }

    /// The stored failure, if and only if the future is `Failed`.
    pub fn get_exception(&self) -> Option<Error> {
        let state = self.inner.state.lock();
        match &*state {
            State::Failed(e) => Some(render_error(e)),
            _ => None,
        }
    }

    /// Registers `notifier` with `attachment`, firing immediately
    /// (synchronously, on the calling thread) if the future is already
    /// terminal, or queuing it to fire exactly once on whichever thread
    /// later completes the future.
    pub fn add_notifier<A, N>(&self, notifier: N, attachment: A)
    where
        A: Send + 'static,
        N: Notifier<T, A> + 'static,
    {
        let future = self.clone();
        let thunk: Thunk = Box::new(move || notifier.handle(&future, attachment));
        self.inner.add_notifier(thunk);
    }
}

/// Renders the stored error back out. `Error` does not implement `Clone`
/// (it wraps `std::io::Error`, which does not), so a terminal failure is
/// stored once and re-rendered as a fresh `Error::Io`-shaped value for
/// every reader; the original variant's *kind* is preserved, its
/// `source()` chain is not.
fn render_error(e: &Error) -> Error {
    use std::io::Error as IoError;
    match e {
        Error::BufferUnderflow => Error::BufferUnderflow,
        Error::BufferOverflow => Error::BufferOverflow,
        Error::Closed => Error::Closed,
        Error::Cancelled => Error::Cancelled,
        Error::ReadTimeout(d) => Error::ReadTimeout(*d),
        Error::WriteTimeout(d) => Error::WriteTimeout(*d),
        Error::UnsupportedOption(s) => Error::UnsupportedOption(s.clone()),
        Error::OversizedMessage { size, max } => Error::OversizedMessage {
            size: *size,
            max: *max,
        },
        Error::FramingError(s) => Error::FramingError(s.clone()),
        Error::Interrupted => Error::Interrupted,
        Error::RetriesExhausted { attempts, cause } => Error::RetriesExhausted {
            attempts: *attempts,
            cause: Box::new(render_error(cause)),
        },
        Error::Io(io) => Error::Io(IoError::new(io.kind(), io.to_string())),
    }
}

impl<T> FutureResult<T> {
    /// Completes the future with `value`. Returns `false` if it was
    /// already terminal.
    pub fn set_value(&self, value: T) -> bool {
        self.inner.complete(State::Done(value))
    }

    /// Completes the future with `err`. Returns `false` if it was
    /// already terminal.
    pub fn set_failure(&self, err: Error) -> bool {
        self.inner.complete(State::Failed(err))
    }

    /// Completes the future as cancelled. Returns `false` if it was
    /// already terminal.
    pub fn set_cancelled(&self) -> bool {
        self.inner.complete(State::Cancelled)
    }
}

/// A notifier: fires exactly once, carrying the terminal future and the
/// attachment supplied at registration time (the future/result type).
pub trait Notifier<T, A = ()>: Send + Sync {
    fn handle(&self, future: &Future<T>, attachment: A);
}

/// Adapts a plain closure into a [`Notifier`].
pub struct FnNotifier<F>(pub F);

impl<T, A, F> Notifier<T, A> for FnNotifier<F>
where
    F: Fn(&Future<T>, A) + Send + Sync,
{
    fn handle(&self, future: &Future<T>, attachment: A) {
        (self.0)(future, attachment)
    }
}

/// Dispatches on terminal state instead of making the callback inspect
/// `status()` itself (the future/result type's "handling notifier" variant).
pub trait HandlingNotifier<T, A = ()>: Send + Sync {
    fn handle_done(&self, _value: T, _attachment: A) {}
    fn handle_failed(&self, _err: &Error, _attachment: A) {}
    fn handle_cancelled(&self, _attachment: A) {}
}

/// Wraps a [`HandlingNotifier`] so it can be passed to `add_notifier`.
pub struct Handling<N>(pub N);

impl<T, A, N> Notifier<T, A> for Handling<N>
where
    T: Clone + Send + Sync + 'static,
    N: HandlingNotifier<T, A> + Send + Sync,
{
    fn handle(&self, future: &Future<T>, attachment: A) {
        match future.status() {
            Status::Done => self.0.handle_done(future.get().expect("done"), attachment),
            Status::Failed => self
                .0
                .handle_failed(&future.get_exception().expect("failed"), attachment),
            Status::Cancelled => self.0.handle_cancelled(attachment),
            Status::Waiting => unreachable!("notifier only fires on terminal state"),
        }
    }
}

/// Forwards a terminal future's state 1:1 into another future's result
/// sink (the future/result type's "manager notifier").
pub struct ManagerNotifier;

impl<T> Notifier<T, FutureResult<T>> for ManagerNotifier
where
    T: Clone + Send + Sync + 'static,
{
    fn handle(&self, future: &Future<T>, sink: FutureResult<T>) {
        match future.status() {
            Status::Done => {
                sink.set_value(future.get().expect("done"));
            }
            Status::Failed => {
                sink.set_failure(future.get_exception().expect("failed"));
            }
            Status::Cancelled => {
                sink.set_cancelled();
            }
            Status::Waiting => unreachable!("notifier only fires on terminal state"),
        }
    }
}

struct CastingNotifier;

impl<I, O, F> Notifier<I, (F, FutureResult<O>)> for CastingNotifier
where
    I: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
    F: FnOnce(I) -> O + Send,
{
    fn handle(&self, future: &Future<I>, (project, sink): (F, FutureResult<O>)) {
        match future.status() {
            Status::Done => {
                sink.set_value(project(future.get().expect("done")));
            }
            Status::Failed => {
                sink.set_failure(future.get_exception().expect("failed"));
            }
            Status::Cancelled => {
                sink.set_cancelled();
            }
            Status::Waiting => unreachable!("notifier only fires on terminal state"),
        }
    }
}

/// Re-types `Future<I>` as `Future<O>` by projecting `I -> O` at read
/// time (the future/result type's "casting" wrapper). Replaces the source's
/// dynamic, class-based payload casting with an explicit projection
/// function supplied here.
pub fn cast<I, O, F>(future: &Future<I>, project: F) -> Future<O>
where
    I: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
    F: FnOnce(I) -> O + Send + 'static,
{
    let (out, sink) = pair::<O>();
    future.add_notifier(CastingNotifier, (project, sink));
    out
}
