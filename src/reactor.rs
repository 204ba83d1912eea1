//! Reference reactor (the reactor supplement): owns one `mio::Poll`,
//! runs a background thread that calls `poll.poll(&mut events, timeout)`,
//! and dispatches each readiness event to the registered target's
//! matching direction(s).
//!
//! This is a minimal, swappable bridge, not a required production
//! component -- the core's contracts ([`crate::channel::Registrar`], the
//! component D setters) do not depend on this particular dispatch loop.
//! Anything implementing `Registrar` against its own selector integration
//! works equally well.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use mio::{Events, Poll, Registry, Token, Waker};
use parking_lot::Mutex;

const WAKE_TOKEN: Token = Token(usize::MAX);
const DEFAULT_TICK: Duration = Duration::from_millis(200);

/// Receives readiness dispatch for one registered `mio::Token`. Net-glue
/// channels (component J) implement this by invoking their own
/// read/write listener setters.
pub trait ReadinessTarget: Send + Sync {
    fn on_readable(&self);
    fn on_writable(&self);
}

/// Owns the poll loop. `Drop` stops the background thread.
pub struct Reactor {
    registry: Registry,
    waker: Arc<Waker>,
    next_token: AtomicUsize,
    targets: Arc<Mutex<HashMap<Token, Arc<dyn ReadinessTarget>>>>,
    running: Arc<std::sync::atomic::AtomicBool>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl Reactor {
    /// Starts the background poll thread immediately.
    pub fn start() -> io::Result<Arc<Self>> {
        let mut poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        let targets: Arc<Mutex<HashMap<Token, Arc<dyn ReadinessTarget>>>> = Arc::new(Mutex::new(HashMap::new()));
        let running = Arc::new(std::sync::atomic::AtomicBool::new(true));

        let thread_targets = targets.clone();
        let thread_running = running.clone();
        let join = std::thread::Builder::new()
            .name("nbio-reactor".to_string())
            .spawn(move || Self::run(poll, thread_targets, thread_running))?;

        Ok(Arc::new(Reactor {
            registry,
            waker,
            next_token: AtomicUsize::new(0),
            targets,
            running,
            join: Mutex::new(Some(join)),
        }))
    }

    fn run(
        mut poll: Poll,
        targets: Arc<Mutex<HashMap<Token, Arc<dyn ReadinessTarget>>>>,
        running: Arc<std::sync::atomic::AtomicBool>,
    ) {
        let mut events = Events::with_capacity(256);
        while running.load(Ordering::Acquire) {
            match poll.poll(&mut events, Some(DEFAULT_TICK)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::error!("reactor poll failed, stopping dispatch loop: {e}");
                    return;
                }
            }
            for event in events.iter() {
                let token = event.token();
                if token == WAKE_TOKEN {
                    continue;
                }
                let target = targets.lock().get(&token).cloned();
                let Some(target) = target else { continue };
                if event.is_readable() {
                    target.on_readable();
                }
                if event.is_writable() {
                    target.on_writable();
                }
            }
        }
    }

    /// The registry channels register their `mio::event::Source` against.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Allocates a fresh token for a new registration.
    pub fn next_token(&self) -> Token {
        Token(self.next_token.fetch_add(1, Ordering::Relaxed))
    }

    /// Binds `token` to `target`; readiness events for `token` are
    /// dispatched to it until [`deregister`](Self::deregister) is called.
    pub fn register(&self, token: Token, target: Arc<dyn ReadinessTarget>) {
        self.targets.lock().insert(token, target);
    }

    pub fn deregister(&self, token: Token) {
        self.targets.lock().remove(&token);
    }

    /// Stops the background thread and waits for it to exit. Idempotent.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            let _ = self.waker.wake();
        }
        if let Some(join) = self.join.lock().take() {
            let _ = join.join();
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::time::Duration as StdDuration;

    struct CountingTarget {
        readable: StdAtomicUsize,
        writable: StdAtomicUsize,
    }

    impl ReadinessTarget for CountingTarget {
        fn on_readable(&self) {
            self.readable.fetch_add(1, Ordering::SeqCst);
        }
        fn on_writable(&self) {
            self.writable.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn start_and_shutdown_is_clean() {
        let reactor = Reactor::start().unwrap();
        std::thread::sleep(StdDuration::from_millis(10));
        reactor.shutdown();
    }

    #[test]
    fn register_and_deregister_do_not_panic_without_a_live_socket() {
        let reactor = Reactor::start().unwrap();
        let target = Arc::new(CountingTarget {
            readable: StdAtomicUsize::new(0),
            writable: StdAtomicUsize::new(0),
        });
        let token = reactor.next_token();
        reactor.register(token, target.clone());
        reactor.deregister(token);
        reactor.shutdown();
    }
}
