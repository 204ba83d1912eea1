//! Length-framed message overlay (the framing layer): turns a byte-stream
//! channel pair into a message channel pair using a 4-byte big-endian
//! length prefix.
//!
//! [`FramedReader`] installs itself as the read-ready listener on a
//! stream channel and drives a `reading-length -> reading-body ->
//! dispatch` state machine. [`FramedWriter`] implements
//! [`MessageWriteChannel`] over the same kind of stream channel, staging
//! any part of a frame the underlying write couldn't take immediately
//! and draining the stage on the next write-ready event.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::ByteBuffer;
use crate::channel::{
    set_listener, Channel, MessageWriteChannel, ReadResult, ReadableByteChannel, SuspendableRead,
    SuspendableWrite, WritableByteChannel,
};
use crate::error::{Error, Result};
use crate::listener::safe_close;
use crate::options::{OptionMap, MAX_INBOUND_MESSAGE_SIZE, MAX_OUTBOUND_MESSAGE_SIZE};

const LENGTH_PREFIX_BYTES: usize = 4;

/// Receives one complete length-prefixed message at a time.
pub trait MessageHandler<C: ?Sized>: Send + Sync {
    /// `payload` is a read-only view over exactly the accumulated
    /// message body; it is only valid for the duration of this call.
    fn on_message(&self, channel: &C, payload: &[u8]);

    /// The channel has already been closed by the reader (oversized
    /// frame or a lower-level I/O failure); `err` is informational.
    fn on_framing_error(&self, channel: &C, err: &Error) {
        let _ = (channel, err);
    }
}

enum ReadState {
    ReadingLength { buf: [u8; LENGTH_PREFIX_BYTES], filled: usize },
    ReadingBody { body: Vec<u8>, filled: usize },
}

impl ReadState {
    fn initial() -> Self {
        ReadState::ReadingLength {
            buf: [0u8; LENGTH_PREFIX_BYTES],
            filled: 0,
        }
    }
}

/// Installed as the read-ready listener on a `ReadableByteChannel +
/// Channel` stream source; reassembles length-prefixed messages and
/// hands each one to a [`MessageHandler`] exactly once.
pub struct FramedReader<C: ?Sized> {
    inner: Arc<C>,
    max_inbound: usize,
    handler: Arc<dyn MessageHandler<C>>,
    state: Mutex<ReadState>,
}

impl<C> FramedReader<C>
where
    C: ReadableByteChannel + SuspendableRead + Channel + Send + Sync + 'static,
{
    pub fn new(inner: Arc<C>, max_inbound: usize, handler: Arc<dyn MessageHandler<C>>) -> Arc<Self> {
        let reader = Arc::new(FramedReader {
            inner: inner.clone(),
            max_inbound,
            handler,
            state: Mutex::new(ReadState::initial()),
        });
        set_listener(inner.read_setter(), inner, {
            let reader = reader.clone();
            move |_channel: &Arc<C>| reader.pump()
        });
        reader
    }

    /// Consumes as much as is currently available, dispatching any
    /// number of complete messages before returning on `WouldBlock` or
    /// `EndOfInput`.
    fn pump(&self) {
        loop {
            let mut state = self.state.lock();
            let read_result = match &mut *state {
                ReadState::ReadingLength { buf, filled } => {
                    self.inner.read(&mut buf[*filled..LENGTH_PREFIX_BYTES])
                }
                ReadState::ReadingBody { body, filled } => self.inner.read(&mut body[*filled..]),
            };
            match read_result {
                Ok(ReadResult::WouldBlock) => return,
                Ok(ReadResult::EndOfInput) => {
                    drop(state);
                    safe_close(|| self.inner.close());
                    return;
                }
                Ok(ReadResult::Read(0)) => return,
                Ok(ReadResult::Read(n)) => {
                    let dispatch = self.advance(&mut state, n);
                    drop(state);
                    if !self.inner.is_open() {
                        // `advance` closed the channel (oversized frame);
                        // it already reported the error to the handler.
                        return;
                    }
                    if let Some(payload) = dispatch {
                        self.handler.on_message(&self.inner, &payload);
                    }
                    // Loop around: re-enter reading-length and keep
                    // draining whatever else is already available.
                }
                Err(e) => {
                    drop(state);
                    safe_close(|| self.inner.close());
                    self.handler.on_framing_error(&self.inner, &e);
                    return;
                }
            }
        }
    }

    /// Advances the state machine by `n` freshly-read bytes. Returns the
    /// dispatched payload if a message just completed.
    fn advance(&self, state: &mut ReadState, n: usize) -> Option<Vec<u8>> {
        match state {
            ReadState::ReadingLength { buf, filled } => {
                *filled += n;
                if *filled < LENGTH_PREFIX_BYTES {
                    return None;
                }
                let len = u32::from_be_bytes(*buf) as usize;
                if len > self.max_inbound {
                    let err = Error::framing(format!(
                        "inbound message of {len} bytes exceeds the {}-byte limit",
                        self.max_inbound
                    ));
                    safe_close(|| self.inner.close());
                    self.handler.on_framing_error(&self.inner, &err);
                    *state = ReadState::initial();
                    return None;
                }
                if len == 0 {
                    *state = ReadState::initial();
                    return Some(Vec::new());
                }
                *state = ReadState::ReadingBody {
                    body: vec![0u8; len],
                    filled: 0,
                };
                None
            }
            ReadState::ReadingBody { filled, body } => {
                *filled += n;
                if *filled < body.len() {
                    return None;
                }
                let payload = std::mem::take(body);
                *state = ReadState::initial();
                Some(payload)
            }
        }
    }
}

/// Exposes [`MessageWriteChannel`] over a `WritableByteChannel +
/// SuspendableWrite` stream sink, prepending the length prefix to every
/// message.
pub struct FramedWriter<C: ?Sized> {
    inner: Arc<C>,
    max_outbound: usize,
    staging: Mutex<ByteBuffer>,
}

impl<C> FramedWriter<C>
where
    C: WritableByteChannel + SuspendableWrite + Send + Sync + 'static,
{
    pub fn new(inner: Arc<C>, max_outbound: usize) -> Arc<Self> {
        let writer = Arc::new(FramedWriter {
            inner: inner.clone(),
            max_outbound,
            staging: Mutex::new(ByteBuffer::with_capacity(0)),
        });
        set_listener(inner.write_setter(), inner, {
            let writer = writer.clone();
            move |_channel: &Arc<C>| {
                if let Err(e) = writer.drain_staging() {
                    log::warn!("framed writer failed to drain staged bytes: {e}");
                }
            }
        });
        writer
    }

    /// Writes as much of the staged frame as the channel will currently
    /// take. Returns `true` once the stage is fully drained.
    fn drain_staging(&self) -> Result<bool> {
        let mut staging = self.staging.lock();
        while staging.has_remaining() {
            let n = self.inner.write(staging.as_slice())?;
            if n == 0 {
                return Ok(false);
            }
            staging.skip(n)?;
        }
        Ok(true)
    }
}

impl<C> MessageWriteChannel for FramedWriter<C>
where
    C: WritableByteChannel + SuspendableWrite + Send + Sync + 'static,
{
    fn send(&self, buf: &[u8]) -> Result<bool> {
        let total = LENGTH_PREFIX_BYTES + buf.len();
        if total > self.max_outbound {
            return Err(Error::OversizedMessage {
                size: total,
                max: self.max_outbound,
            });
        }
        if !self.drain_staging()? {
            // A previous message hasn't fully drained yet; all-or-nothing
            // means this call touches nothing.
            return Ok(false);
        }
        let mut frame = Vec::with_capacity(total);
        frame.extend_from_slice(&(buf.len() as u32).to_be_bytes());
        frame.extend_from_slice(buf);

        let mut offset = 0;
        while offset < frame.len() {
            let n = self.inner.write(&frame[offset..])?;
            if n == 0 {
                break;
            }
            offset += n;
        }
        if offset < frame.len() {
            let mut staging = self.staging.lock();
            *staging = ByteBuffer::wrap(frame[offset..].to_vec());
        }
        Ok(true)
    }

    fn send_vectored(&self, bufs: &[io::IoSlice<'_>]) -> Result<bool> {
        let flat: Vec<u8> = bufs.iter().flat_map(|s| s.iter().copied()).collect();
        self.send(&flat)
    }
}

/// Plugs a stream channel pair into a message channel pair: reads
/// dispatch through `handler`, writes go through the returned
/// [`FramedWriter`]. Size limits come from `options`
/// ([`MAX_INBOUND_MESSAGE_SIZE`]/[`MAX_OUTBOUND_MESSAGE_SIZE`], unbounded
/// if unset).
pub fn overlay<C>(
    inner: Arc<C>,
    options: &OptionMap,
    handler: Arc<dyn MessageHandler<C>>,
) -> (Arc<FramedReader<C>>, Arc<FramedWriter<C>>)
where
    C: ReadableByteChannel
        + WritableByteChannel
        + SuspendableRead
        + SuspendableWrite
        + Channel
        + Send
        + Sync
        + 'static,
{
    let max_inbound = options.get(&MAX_INBOUND_MESSAGE_SIZE, usize::MAX);
    let max_outbound = options.get(&MAX_OUTBOUND_MESSAGE_SIZE, usize::MAX);
    let reader = FramedReader::new(inner.clone(), max_inbound, handler);
    let writer = FramedWriter::new(inner, max_outbound);
    (reader, writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::ListenerSetter;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// An in-memory duplex stream double: readable from a pre-seeded
    /// byte queue, writable into an in-memory sink, both feedable in
    /// arbitrarily small chunks to exercise partial reads/writes.
    struct MemoryStream {
        inbound: Mutex<std::collections::VecDeque<u8>>,
        inbound_chunk: usize,
        outbound: Mutex<Vec<u8>>,
        outbound_capacity: Mutex<usize>,
        closed: AtomicBool,
        read_setter: ListenerSetter<Self>,
        write_setter: ListenerSetter<Self>,
        close_setter: ListenerSetter<Self>,
    }

    impl MemoryStream {
        fn new(inbound: Vec<u8>, inbound_chunk: usize, outbound_capacity: usize) -> Arc<Self> {
            Arc::new(MemoryStream {
                inbound: Mutex::new(inbound.into()),
                inbound_chunk,
                outbound: Mutex::new(Vec::new()),
                outbound_capacity: Mutex::new(outbound_capacity),
                closed: AtomicBool::new(false),
                read_setter: ListenerSetter::new(),
                write_setter: ListenerSetter::new(),
                close_setter: ListenerSetter::new(),
            })
        }

        fn allow_more_writes(&self, n: usize) {
            *self.outbound_capacity.lock() += n;
        }
    }

    impl ReadableByteChannel for MemoryStream {
        fn read(&self, buf: &mut [u8]) -> Result<ReadResult> {
            let mut inbound = self.inbound.lock();
            if inbound.is_empty() {
                return Ok(ReadResult::WouldBlock);
            }
            let n = buf.len().min(inbound.len()).min(self.inbound_chunk.max(1));
            for slot in buf.iter_mut().take(n) {
                *slot = inbound.pop_front().unwrap();
            }
            Ok(ReadResult::Read(n))
        }
    }

    impl WritableByteChannel for MemoryStream {
        fn write(&self, buf: &[u8]) -> Result<usize> {
            let mut cap = self.outbound_capacity.lock();
            let n = buf.len().min(*cap);
            *cap -= n;
            self.outbound.lock().extend_from_slice(&buf[..n]);
            Ok(n)
        }
    }

    impl SuspendableWrite for MemoryStream {
        fn suspend_writes(&self) {}
        fn resume_writes(&self) {}
        fn is_write_resumed(&self) -> bool {
            true
        }
        fn await_writable(&self, _timeout: Option<std::time::Duration>) -> Result<()> {
            Ok(())
        }
        fn flush(&self) -> Result<bool> {
            Ok(true)
        }
        fn shutdown_writes(&self) -> Result<bool> {
            Ok(true)
        }
        fn write_setter(&self) -> &ListenerSetter<Self> {
            &self.write_setter
        }
    }

    impl Channel for MemoryStream {
        fn close(&self) -> Result<()> {
            if !self.closed.swap(true, Ordering::SeqCst) {
                self.close_setter.invoke(self);
            }
            Ok(())
        }
        fn is_open(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }
        fn close_setter(&self) -> &ListenerSetter<Self> {
            &self.close_setter
        }
    }

    impl SuspendableRead for MemoryStream {
        fn suspend_reads(&self) {}
        fn resume_reads(&self) {}
        fn is_read_resumed(&self) -> bool {
            true
        }
        fn await_readable(&self, _timeout: Option<std::time::Duration>) -> Result<()> {
            Ok(())
        }
        fn read_setter(&self) -> &ListenerSetter<Self> {
            &self.read_setter
        }
    }

    struct Collecting {
        messages: Mutex<Vec<Vec<u8>>>,
        error: Mutex<Option<String>>,
    }

    impl Collecting {
        fn new() -> Arc<Self> {
            Arc::new(Collecting {
                messages: Mutex::new(Vec::new()),
                error: Mutex::new(None),
            })
        }
    }

    impl MessageHandler<MemoryStream> for Collecting {
        fn on_message(&self, _channel: &MemoryStream, payload: &[u8]) {
            self.messages.lock().push(payload.to_vec());
        }

        fn on_framing_error(&self, _channel: &MemoryStream, err: &Error) {
            *self.error.lock() = Some(err.to_string());
        }
    }

    fn wire_for(payloads: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for p in payloads {
            out.extend_from_slice(&(p.len() as u32).to_be_bytes());
            out.extend_from_slice(p);
        }
        out
    }

    #[test]
    fn reads_three_messages_byte_at_a_time() {
        let wire = wire_for(&[&[0x41, 0x42, 0x43], &[], &[0xFFu8; 65535]]);
        let stream = MemoryStream::new(wire, 1, usize::MAX);
        let handler = Collecting::new();
        let reader = FramedReader::new(stream.clone(), usize::MAX, handler.clone());

        // Drive readiness until the inbound queue is drained.
        while !stream.inbound.lock().is_empty() {
            reader.pump();
        }
        reader.pump();

        let messages = handler.messages.lock();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], vec![0x41, 0x42, 0x43]);
        assert_eq!(messages[1], Vec::<u8>::new());
        assert_eq!(messages[2], vec![0xFFu8; 65535]);
    }

    #[test]
    fn oversized_inbound_frame_closes_channel_and_reports_error() {
        let wire = wire_for(&[&[0u8; 10]]);
        let stream = MemoryStream::new(wire, usize::MAX, usize::MAX);
        let handler = Collecting::new();
        let reader = FramedReader::new(stream.clone(), 4, handler.clone());

        reader.pump();

        assert!(!stream.is_open());
        assert!(handler.messages.lock().is_empty());
        assert!(handler.error.lock().is_some());
    }

    #[test]
    fn writer_round_trips_through_a_slow_reader() {
        let stream = MemoryStream::new(Vec::new(), usize::MAX, 0);
        let writer = FramedWriter::new(stream.clone(), usize::MAX);

        assert!(writer.send(&[0x41, 0x42, 0x43]).unwrap());
        // Nothing could be written yet -- the whole frame is staged.
        assert_eq!(stream.outbound.lock().len(), 0);

        stream.allow_more_writes(1000);
        assert!(writer.drain_staging().unwrap());
        assert_eq!(&stream.outbound.lock()[..], &wire_for(&[&[0x41, 0x42, 0x43]])[..]);
    }

    #[test]
    fn oversized_outbound_message_is_rejected_without_touching_the_wire() {
        let stream = MemoryStream::new(Vec::new(), usize::MAX, 1000);
        let writer = FramedWriter::new(stream.clone(), 4);

        let err = writer.send(&[1, 2, 3, 4, 5]).unwrap_err();
        assert!(matches!(err, Error::OversizedMessage { .. }));
        assert!(stream.outbound.lock().is_empty());
    }
}
