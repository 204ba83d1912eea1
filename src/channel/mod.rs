//! Channel contracts: the capability traits a concrete channel
//! implements in any combination, plus the slots shared by every
//! channel regardless of which capabilities it advertises.
//!
//! Modeled the way a non-blocking byte channel was always modeled here:
//! small, orthogonal, composable capability traits rather than one
//! fat interface. A TCP stream advertises most of them; a UDP socket
//! advertises the message read/write pair instead of the byte pair; a
//! length-framed overlay advertises message read/write over an inner
//! byte channel it fully owns.

mod message;

pub use message::{MessageReadChannel, MessageWriteChannel};

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::listener::{Listener, ListenerSetter};

/// Non-blocking read of raw bytes into `buf`. See [`ReadResult`] for how
/// "not ready" is distinguished from end-of-input; a call that would
/// block must not consume any bytes.
pub trait ReadableByteChannel {
    fn read(&self, buf: &mut [u8]) -> Result<ReadResult>;
}

/// The three outcomes of a non-blocking byte read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadResult {
    /// `n` bytes were read into the buffer.
    Read(usize),
    /// Nothing was ready; the buffer was not touched.
    WouldBlock,
    /// The peer has shut down writes; no more bytes will ever arrive.
    EndOfInput,
}

impl ReadResult {
    pub fn bytes(self) -> usize {
        match self {
            ReadResult::Read(n) => n,
            _ => 0,
        }
    }
}

/// Non-blocking write of raw bytes from `buf`.
pub trait WritableByteChannel {
    /// Returns the number of bytes written; `0` means "not ready,
    /// nothing consumed".
    fn write(&self, buf: &[u8]) -> Result<usize>;
}

/// Non-blocking scattering read across multiple buffers, filled in order.
pub trait ScatteringByteChannel: ReadableByteChannel {
    fn read_vectored(&self, bufs: &mut [io::IoSliceMut<'_>]) -> Result<ReadResult>;
}

/// Non-blocking gathering write across multiple buffers, drained in order.
pub trait GatheringByteChannel: WritableByteChannel {
    fn write_vectored(&self, bufs: &[io::IoSlice<'_>]) -> Result<usize>;
}

/// Control over whether a channel's read direction produces readiness
/// events, plus the ability to block (with or without a timeout) until
/// it does.
pub trait SuspendableRead {
    fn suspend_reads(&self);
    fn resume_reads(&self);
    fn is_read_resumed(&self) -> bool;

    /// Blocks the calling thread until the channel is readable, the
    /// interrupt flag is set, or the optional timeout elapses. `None`
    /// blocks indefinitely.
    fn await_readable(&self, timeout: Option<Duration>) -> Result<()>;

    fn read_setter(&self) -> &ListenerSetter<Self>
    where
        Self: Sized;
}

/// Write-direction counterpart to [`SuspendableRead`], plus the
/// non-blocking `flush`/`shutdown_writes` operations every writable
/// channel exposes regardless of framing.
pub trait SuspendableWrite {
    fn suspend_writes(&self);
    fn resume_writes(&self);
    fn is_write_resumed(&self) -> bool;

    fn await_writable(&self, timeout: Option<Duration>) -> Result<()>;

    /// Flushes any internally buffered output. Returns `true` once
    /// fully flushed, `false` if more flushing is needed once writable
    /// again (never blocks).
    fn flush(&self) -> Result<bool>;

    /// Half-closes the write direction. Non-blocking; returns `true`
    /// once complete. After this completes, further `write` calls fail
    /// with [`crate::error::Error::Closed`].
    fn shutdown_writes(&self) -> Result<bool>;

    fn write_setter(&self) -> &ListenerSetter<Self>
    where
        Self: Sized;
}

/// A channel bound to a local address.
pub trait BoundChannel {
    fn local_addr(&self) -> Result<SocketAddr>;
}

/// A channel connected to a remote peer address.
pub trait ConnectedChannel {
    fn peer_addr(&self) -> Result<SocketAddr>;
}

/// Every channel this crate hands out, regardless of capability set,
/// carries a close slot and an open/closed lifecycle.
pub trait Channel: Send + Sync {
    /// Idempotent. Fires the close listener exactly once, on the first
    /// call that actually transitions the channel to closed.
    fn close(&self) -> Result<()>;

    fn is_open(&self) -> bool;

    fn close_setter(&self) -> &ListenerSetter<Self>
    where
        Self: Sized;
}

/// Registers a channel's readiness with whatever selector is driving
/// it. Concrete channels backed by an OS socket implement this against
/// their `mio` registration; channels with no underlying selector
/// registration (e.g. a pure in-memory test double) may implement it
/// as a no-op.
pub trait Registrar {
    fn set_interest(&self, readable: bool, writable: bool) -> Result<()>;
}

/// Convenience used by setters that want their closures to see the
/// owning `Arc<C>` rather than a bare `&C` -- most listeners attached
/// through this crate's public API are registered this way, since the
/// channel handed to application code is always an `Arc`.
pub fn set_listener<C, F>(setter: &ListenerSetter<C>, channel: Arc<C>, f: F)
where
    C: Send + Sync + 'static,
    F: Fn(&Arc<C>) + Send + Sync + 'static,
{
    setter.set(Some(Arc::new(move |_: &C| f(&channel))));
}

/// Installs `listener` directly, bypassing the `Arc`-capturing helper
/// above, for callers that already have a `Listener<C>` implementation.
pub fn set_raw_listener<C: Send + Sync + 'static>(
    setter: &ListenerSetter<C>,
    listener: Option<Arc<dyn Listener<C>>>,
) {
    setter.set(listener);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_result_bytes_helper() {
        assert_eq!(ReadResult::Read(7).bytes(), 7);
        assert_eq!(ReadResult::WouldBlock.bytes(), 0);
        assert_eq!(ReadResult::EndOfInput.bytes(), 0);
    }
}
