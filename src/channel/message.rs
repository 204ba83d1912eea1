//! Message-oriented channel capabilities: whole-message, all-or-nothing
//! transfers, as opposed to the byte-stream capabilities in the parent
//! module. UDP sockets and the length-framed overlay both implement
//! these instead of the raw byte pair.

use std::io;

use crate::error::Result;

/// Delivers at most one message per call. `receive` never partially
/// delivers a message: either the whole message lands in `buf` (or
/// `bufs`) or nothing does.
pub trait MessageReadChannel {
    /// Returns `0` if no message is pending, otherwise the message
    /// length (which may exceed `buf.len()`, in which case the tail is
    /// silently discarded, matching datagram-socket semantics).
    fn receive(&self, buf: &mut [u8]) -> Result<usize>;

    fn receive_vectored(&self, bufs: &mut [io::IoSliceMut<'_>]) -> Result<usize>;
}

/// Sends whole messages. A `send` either transfers the entire message
/// or none of it -- there is no partial-message success.
pub trait MessageWriteChannel {
    /// Returns `true` if the message was sent, `false` if the channel
    /// was not writable (nothing was sent; the caller should retry once
    /// write-readiness fires).
    fn send(&self, buf: &[u8]) -> Result<bool>;

    fn send_vectored(&self, bufs: &[io::IoSlice<'_>]) -> Result<bool>;
}
