//! A cooperative interruption flag for `Future::await_interruptibly`.
//!
//! Rust has no OS-level thread interruption primitive; callers that want
//! an early-wake signal share an `Interrupt` with whatever might want to
//! wake a waiter and call [`Interrupt::set`] from another thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Interrupt(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear_and_can_be_set() {
        let i = Interrupt::new();
        assert!(!i.is_set());
        i.set();
        assert!(i.is_set());
        i.clear();
        assert!(!i.is_set());
    }
}
