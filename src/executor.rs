//! The executor interface consumed by executor-wrapped listeners and the
//! SSL task runner.
//!
//! This crate never creates its own thread pool; it only consumes one
//! supplied by the caller through this single-method trait, plus two
//! trivial adapters.

/// A single-method task submission interface.
pub trait Executor: Send + Sync {
    /// Submits `task` for execution. Returns `Err(Rejected)` if the
    /// executor cannot accept it right now (queue full, shut down); the
    /// caller decides what to do (an executor-wrapped listener safe-closes
    /// the enclosing channel on rejection).
    fn submit(&self, task: Box<dyn FnOnce() + Send>) -> Result<(), Rejected>;
}

/// Returned by [`Executor::submit`] when the executor could not accept
/// the task.
#[derive(Debug)]
pub struct Rejected;

/// Runs every submitted task inline, on the submitting thread. Never
/// rejects.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectExecutor;

impl Executor for DirectExecutor {
    fn submit(&self, task: Box<dyn FnOnce() + Send>) -> Result<(), Rejected> {
        task();
        Ok(())
    }
}

/// Accepts every task but drops it without running it. Used primarily in
/// tests that want to observe the "task never ran" path without needing
/// a real thread pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullExecutor;

impl Executor for NullExecutor {
    fn submit(&self, task: Box<dyn FnOnce() + Send>) -> Result<(), Rejected> {
        drop(task);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn direct_executor_runs_inline() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        DirectExecutor.submit(Box::new(move || ran2.store(true, Ordering::SeqCst)))
            .unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn null_executor_accepts_but_drops() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        NullExecutor
            .submit(Box::new(move || ran2.store(true, Ordering::SeqCst)))
            .unwrap();
        assert!(!ran.load(Ordering::SeqCst));
    }
}
