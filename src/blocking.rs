//! Blocking adapter (the `BlockingByteChannel`): turns a readiness-based
//! stream channel into a standard blocking byte channel with independent,
//! mutable read and write timeouts.
//!
//! Built entirely out of the non-blocking primitives in [`crate::channel`]:
//! `read`/`write` loop a non-blocking attempt and `await_readable`/
//! `await_writable` with a shrinking deadline, rather than adding any new
//! suspension point of their own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::channel::{Channel, ReadResult, ReadableByteChannel, SuspendableRead, SuspendableWrite, WritableByteChannel};
use crate::error::{Error, Result};

/// `0` is the sentinel for "no timeout" (wait indefinitely), matching the
/// setter contract: a timeout of zero means block forever.
const NO_TIMEOUT_MS: u64 = 0;

/// Wraps a channel that is readable, writable and suspendable in both
/// directions, exposing blocking `read`/`write`/`flush`/`shutdown_writes`
/// with independently configurable timeouts.
///
/// Timeout setters mutate an atomic and take effect starting with the
/// *next* blocking call; a call already in flight keeps running against
/// whatever deadline it computed when it started.
pub struct BlockingByteChannel<C> {
    channel: Arc<C>,
    read_timeout_ms: AtomicU64,
    write_timeout_ms: AtomicU64,
}

/// Normalizes a [`Duration`] to whole milliseconds for the atomic timeout
/// cell, clamping any positive sub-millisecond value up to `1` rather
/// than truncating it to `0` (which would silently mean "no timeout").
fn normalize_millis(d: Duration) -> u64 {
    let millis = d.as_millis() as u64;
    if millis == 0 && !d.is_zero() {
        1
    } else {
        millis
    }
}

impl<C> BlockingByteChannel<C> {
    /// Wraps `channel` with no timeout on either direction (equivalent to
    /// calling [`set_read_timeout`](Self::set_read_timeout)/
    /// [`set_write_timeout`](Self::set_write_timeout) with `Duration::ZERO`).
    pub fn new(channel: Arc<C>) -> Self {
        BlockingByteChannel {
            channel,
            read_timeout_ms: AtomicU64::new(NO_TIMEOUT_MS),
            write_timeout_ms: AtomicU64::new(NO_TIMEOUT_MS),
        }
    }

    pub fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    pub fn set_read_timeout(&self, timeout: Duration) {
        self.read_timeout_ms
            .store(normalize_millis(timeout), Ordering::SeqCst);
    }

    pub fn set_write_timeout(&self, timeout: Duration) {
        self.write_timeout_ms
            .store(normalize_millis(timeout), Ordering::SeqCst);
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.load(Ordering::SeqCst))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms.load(Ordering::SeqCst))
    }

    fn deadline(millis: u64) -> Option<Instant> {
        if millis == NO_TIMEOUT_MS {
            None
        } else {
            Some(Instant::now() + Duration::from_millis(millis))
        }
    }

    /// `None` deadline means "keep waiting"; `Some(d)` returns the
    /// remaining slice, or `None` if `d` has already passed (caller must
    /// treat that as an immediate timeout).
    fn remaining(deadline: Option<Instant>) -> Option<Option<Duration>> {
        match deadline {
            None => Some(None),
            Some(d) => {
                let now = Instant::now();
                if now >= d {
                    None
                } else {
                    Some(Some(d - now))
                }
            }
        }
    }
}

impl<C: ReadableByteChannel + SuspendableRead> BlockingByteChannel<C> {
    /// Blocks until at least one byte lands in `buf`, the peer signals
    /// end-of-input (returns `Ok(0)`, matching `std::io::Read`), or the
    /// read timeout elapses (`Error::ReadTimeout`). Never consumes bytes
    /// on the timeout path.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let deadline = Self::deadline(self.read_timeout_ms.load(Ordering::SeqCst));
        loop {
            match self.channel.read(buf)? {
                ReadResult::Read(n) => return Ok(n),
                ReadResult::EndOfInput => return Ok(0),
                ReadResult::WouldBlock => {
                    let slice = Self::remaining(deadline)
                        .ok_or_else(|| Error::ReadTimeout(self.read_timeout()))?;
                    self.channel.await_readable(slice)?;
                    if Self::remaining(deadline).is_none() {
                        return Err(Error::ReadTimeout(self.read_timeout()));
                    }
                }
            }
        }
    }
}

impl<C: WritableByteChannel + SuspendableWrite> BlockingByteChannel<C> {
    /// Blocks until all of `buf` has been handed to the channel, or the
    /// write timeout elapses (`Error::WriteTimeout`).
    pub fn write(&self, buf: &[u8]) -> Result<()> {
        let deadline = Self::deadline(self.write_timeout_ms.load(Ordering::SeqCst));
        let mut offset = 0;
        while offset < buf.len() {
            let n = self.channel.write(&buf[offset..])?;
            if n > 0 {
                offset += n;
                continue;
            }
            let slice = Self::remaining(deadline)
                .ok_or_else(|| Error::WriteTimeout(self.write_timeout()))?;
            self.channel.await_writable(slice)?;
            if Self::remaining(deadline).is_none() {
                return Err(Error::WriteTimeout(self.write_timeout()));
            }
        }
        Ok(())
    }

    /// Loops `channel.flush()` interleaved with `await_writable` until
    /// fully flushed or the write timeout elapses.
    pub fn flush(&self) -> Result<()> {
        let deadline = Self::deadline(self.write_timeout_ms.load(Ordering::SeqCst));
        loop {
            if self.channel.flush()? {
                return Ok(());
            }
            let slice = Self::remaining(deadline)
                .ok_or_else(|| Error::WriteTimeout(self.write_timeout()))?;
            self.channel.await_writable(slice)?;
            if Self::remaining(deadline).is_none() {
                return Err(Error::WriteTimeout(self.write_timeout()));
            }
        }
    }

    /// Blocks until the write direction is fully shut down, or the write
    /// timeout elapses.
    pub fn shutdown_writes(&self) -> Result<()> {
        let deadline = Self::deadline(self.write_timeout_ms.load(Ordering::SeqCst));
        loop {
            if self.channel.shutdown_writes()? {
                return Ok(());
            }
            let slice = Self::remaining(deadline)
                .ok_or_else(|| Error::WriteTimeout(self.write_timeout()))?;
            self.channel.await_writable(slice)?;
            if Self::remaining(deadline).is_none() {
                return Err(Error::WriteTimeout(self.write_timeout()));
            }
        }
    }
}

impl<C: Channel> BlockingByteChannel<C> {
    pub fn close(&self) -> Result<()> {
        self.channel.close()
    }
}
