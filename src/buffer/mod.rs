//! Buffer utilities (the buffer layer).
//!
//! [`ByteBuffer`] is a position/limit/capacity cursor over a contiguous
//! `Vec<u8>`, modeled on the classic NIO `ByteBuffer`: `remaining = limit -
//! position`, and everything here is either a non-destructive metadata
//! manipulation (`flip`, `clear`, `mark`, `reset`, `rewind`, `skip`,
//! `unget`) or a safe slice-with-advance operation. It replaces the
//! teacher's retired, unsafe, pre-1.0 `Buf`/`MutBuf`/`RingBuf` trio with a
//! safe equivalent built on a plain `Vec<u8>`.

mod decode;
mod mutf8;
mod hex;
mod pool;

pub use decode::{read_ascii_line, read_ascii_z, read_latin1_line, read_latin1_z, Decoder};
pub use mutf8::{read_modified_utf8_line, read_modified_utf8_z};
pub use hex::hex_dump;
pub use pool::{NoopPool, Pool};

use crate::error::{Error, Result};

/// A position/limit/capacity view over a `Vec<u8>`.
///
/// Invariant: `0 <= position <= limit <= capacity == data.len()` at all
/// times. Every method that can violate this fails instead, leaving the
/// buffer untouched.
#[derive(Debug, Clone)]
pub struct ByteBuffer {
    data: Vec<u8>,
    position: usize,
    limit: usize,
    mark: Option<usize>,
}

impl ByteBuffer {
    /// Allocates a new buffer of `capacity` bytes, position `0`, limit
    /// `capacity` (i.e. ready for writing).
    pub fn with_capacity(capacity: usize) -> Self {
        ByteBuffer {
            data: vec![0u8; capacity],
            position: 0,
            limit: capacity,
            mark: None,
        }
    }

    /// Wraps an existing `Vec<u8>`, position `0`, limit `data.len()`.
    pub fn wrap(data: Vec<u8>) -> Self {
        let limit = data.len();
        ByteBuffer {
            data,
            position: 0,
            limit,
            mark: None,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    pub fn has_remaining(&self) -> bool {
        self.position < self.limit
    }

    /// Sets the position. Fails with [`Error::BufferUnderflow`] if `pos >
    /// limit` (there is nowhere valid to put the cursor).
    pub fn set_position(&mut self, pos: usize) -> Result<()> {
        if pos > self.limit {
            return Err(Error::BufferUnderflow);
        }
        if let Some(m) = self.mark {
            if m > pos {
                self.mark = None;
            }
        }
        self.position = pos;
        Ok(())
    }

    /// Sets the limit. Fails with [`Error::BufferOverflow`] if `limit >
    /// capacity`.
    pub fn set_limit(&mut self, limit: usize) -> Result<()> {
        if limit > self.data.len() {
            return Err(Error::BufferOverflow);
        }
        self.limit = limit;
        if self.position > limit {
            self.position = limit;
        }
        if let Some(m) = self.mark {
            if m > limit {
                self.mark = None;
            }
        }
        Ok(())
    }

    /// Marks the current position for a later [`reset`](Self::reset).
    pub fn mark(&mut self) {
        self.mark = Some(self.position);
    }

    /// Resets the position to the last [`mark`](Self::mark). Fails if no
    /// mark has been set.
    pub fn reset(&mut self) -> Result<()> {
        match self.mark {
            Some(m) => {
                self.position = m;
                Ok(())
            }
            None => Err(Error::BufferUnderflow),
        }
    }

    /// Sets position to `0` and limit to capacity; discards the mark.
    pub fn clear(&mut self) {
        self.position = 0;
        self.limit = self.data.len();
        self.mark = None;
    }

    /// Sets limit to the current position and position to `0`: the
    /// standard NIO idiom for switching a buffer from "just written" to
    /// "about to read".
    pub fn flip(&mut self) {
        self.limit = self.position;
        self.position = 0;
        self.mark = None;
    }

    /// Sets position to `0`, keeps the limit; discards the mark.
    pub fn rewind(&mut self) {
        self.position = 0;
        self.mark = None;
    }

    /// The readable/writable region as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[self.position..self.limit]
    }

    /// Advances the position by `n` without reading, failing with
    /// [`Error::BufferUnderflow`] if `n` exceeds what remains.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        if n > self.remaining() {
            return Err(Error::BufferUnderflow);
        }
        self.position += n;
        Ok(())
    }

    /// The inverse of [`skip`](Self::skip): rewinds the position by `n`,
    /// failing with [`Error::BufferUnderflow`] if `n` exceeds the current
    /// position.
    pub fn unget(&mut self, n: usize) -> Result<()> {
        if n > self.position {
            return Err(Error::BufferUnderflow);
        }
        self.position -= n;
        Ok(())
    }

    /// Returns a read-only view over `n` bytes from the front of the
    /// remaining region (`n >= 0`) or from the back (`n < 0`, counting
    /// from `limit`), advancing `self`'s position past the returned
    /// range. Fails with [`Error::BufferUnderflow`] if `n.unsigned_abs()`
    /// exceeds `remaining()`; on failure the buffer is untouched.
    ///
    /// Scenario from the testable-properties list: a buffer positioned at
    /// `2` with limit `10`, `slice(-3)` returns bytes `7..10` and leaves
    /// the source at position `7`, limit `10`.
    pub fn slice(&mut self, n: i64) -> Result<&[u8]> {
        let remaining = self.remaining();
        let count = n.unsigned_abs() as usize;
        if count > remaining {
            return Err(Error::BufferUnderflow);
        }
        let (start, end, new_position) = if n >= 0 {
            (self.position, self.position + count, self.position + count)
        } else {
            (self.limit - count, self.limit, self.limit - count)
        };
        self.position = new_position;
        Ok(&self.data[start..end])
    }

    /// Fills the next `n` bytes of the remaining region with `v`,
    /// advancing the position by `n`. Fails with
    /// [`Error::BufferOverflow`] if `n` exceeds what remains.
    pub fn fill(&mut self, v: u8, n: usize) -> Result<()> {
        if n > self.remaining() {
            return Err(Error::BufferOverflow);
        }
        let start = self.position;
        self.data[start..start + n].fill(v);
        self.position += n;
        Ok(())
    }

    /// Appends bytes at the limit, growing the backing storage if
    /// necessary, and advances the limit (not the position) past them.
    /// Used by writers staging outbound data (the framing layer, the blocking adapter).
    pub fn append(&mut self, bytes: &[u8]) {
        if self.limit + bytes.len() > self.data.len() {
            self.data.resize(self.limit + bytes.len(), 0);
        }
        self.data[self.limit..self.limit + bytes.len()].copy_from_slice(bytes);
        self.limit += bytes.len();
    }

    /// Drops everything before `position`, shifting the remaining bytes
    /// to the front and resetting position to `0`. Used to compact a
    /// staging buffer after a partial write has drained some of it.
    pub fn compact(&mut self) {
        let remaining = self.remaining();
        self.data.copy_within(self.position..self.limit, 0);
        self.data.truncate(remaining.max(0));
        self.position = 0;
        self.limit = remaining;
        self.mark = None;
    }
}

/// Scatter primitive: writes as much of `src` as fits across
/// `dsts[..]` in order, returning the total number of bytes moved.
/// Each destination buffer's position is advanced by what it received;
/// none is touched once full. `src`'s position is not itself advanced by
/// this function -- callers that want that semantics wrap it.
pub fn put_into(dsts: &mut [ByteBuffer], src: &[u8]) -> usize {
    let mut moved = 0;
    let mut rest = src;
    for dst in dsts.iter_mut() {
        if rest.is_empty() {
            break;
        }
        let can_take = dst.remaining().min(rest.len());
        if can_take == 0 {
            continue;
        }
        let (chunk, remainder) = rest.split_at(can_take);
        let start = dst.position;
        dst.data[start..start + can_take].copy_from_slice(chunk);
        dst.position += can_take;
        moved += can_take;
        rest = remainder;
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_negative_count_from_end() {
        let mut buf = ByteBuffer::wrap(vec![0u8; 10]);
        buf.set_position(2).unwrap();
        let view = buf.slice(-3).unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(buf.position(), 7);
        assert_eq!(buf.limit(), 10);
    }

    #[test]
    fn slice_underflow_leaves_position_untouched() {
        let mut buf = ByteBuffer::wrap(vec![0u8; 4]);
        buf.set_position(1).unwrap();
        let err = buf.slice(10).unwrap_err();
        assert!(matches!(err, Error::BufferUnderflow));
        assert_eq!(buf.position(), 1);
    }

    #[test]
    fn skip_and_unget_round_trip() {
        let mut buf = ByteBuffer::wrap(vec![0u8; 8]);
        buf.skip(5).unwrap();
        assert_eq!(buf.position(), 5);
        buf.unget(5).unwrap();
        assert_eq!(buf.position(), 0);
        assert!(buf.unget(1).is_err());
    }

    #[test]
    fn flip_then_read_then_compact() {
        let mut buf = ByteBuffer::with_capacity(16);
        buf.as_mut_slice()[..5].copy_from_slice(b"hello");
        buf.skip(5).unwrap();
        buf.flip();
        assert_eq!(buf.as_slice(), b"hello");
        buf.skip(2).unwrap();
        buf.compact();
        assert_eq!(buf.remaining(), 3);
        assert_eq!(buf.as_slice(), b"llo");
    }

    #[test]
    fn put_into_scatters_across_buffers() {
        let mut dsts = vec![ByteBuffer::with_capacity(2), ByteBuffer::with_capacity(4)];
        let moved = put_into(&mut dsts, b"hello!");
        assert_eq!(moved, 6);
        assert_eq!(&dsts[0].data[..2], b"he");
        assert_eq!(&dsts[1].data[..4], b"llo!");
    }

    #[test]
    fn fill_advances_position_and_checks_overflow() {
        let mut buf = ByteBuffer::with_capacity(4);
        buf.fill(0xAB, 4).unwrap();
        assert_eq!(buf.remaining(), 0);
        assert!(buf.fill(0xAB, 1).is_err());
    }
}
