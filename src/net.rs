//! Net glue (the net-glue supplement): concrete channels over
//! `mio::net`, driven by the [`crate::reactor::Reactor`].
//!
//! [`TcpChannel`] and [`UdpChannel`] are the channel implementations;
//! [`TcpConnector`] and [`TcpDestination`] are the outbound/inbound
//! factories from the connection layer ([`crate::connect`]). Socket
//! options mio does not expose directly (keepalive, linger, buffer
//! sizes, reuse-address) are applied through a borrowed `socket2::Socket`
//! built from the raw fd, the same trick the teacher's own
//! `TcpStream::connect` uses `socket2` for non-blocking socket creation.

use std::io::{self, IoSlice, IoSliceMut, Read, Write};
use std::mem::ManuallyDrop;
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::net::{TcpListener as MioTcpListener, TcpStream as MioTcpStream, UdpSocket as MioUdpSocket};
use mio::{Interest, Token};
use parking_lot::{Condvar, Mutex};
use socket2::{Domain, Protocol, Socket, Type};

use crate::channel::{
    set_listener, BoundChannel, Channel, ConnectedChannel, GatheringByteChannel, MessageReadChannel,
    MessageWriteChannel, ReadResult, ReadableByteChannel, Registrar, ScatteringByteChannel, SuspendableRead,
    SuspendableWrite, WritableByteChannel,
};
use crate::connect::{ChannelDestination, ClosingCancellable, Connector};
use crate::error::{Error, Result};
use crate::future::{failed, pair, Future, FutureResult};
use crate::listener::{safe_close, Listener, ListenerSetter};
use crate::options::{
    OptionMap, BROADCAST, KEEP_ALIVE, LINGER, MULTICAST_TTL, RECEIVE_BUFFER_SIZE, REUSE_ADDRESS,
    SEND_BUFFER_SIZE, TCP_NODELAY,
};
use crate::reactor::{Reactor, ReadinessTarget};

/// Borrows the socket behind `fd` long enough to apply an option mio
/// doesn't expose, without taking ownership of (and so risking a double
/// close of) the underlying descriptor.
fn with_borrowed_socket<F, T>(fd: std::os::unix::io::RawFd, f: F) -> io::Result<T>
where
    F: FnOnce(&Socket) -> io::Result<T>,
{
    let socket = ManuallyDrop::new(unsafe { Socket::from_raw_fd(fd) });
    f(&socket)
}

fn apply_tcp_options(stream: &MioTcpStream, options: &OptionMap) -> Result<()> {
    if let Some(nodelay) = options.get_opt(&TCP_NODELAY) {
        stream.set_nodelay(nodelay)?;
    }
    let fd = stream.as_raw_fd();
    if let Some(keep_alive) = options.get_opt(&KEEP_ALIVE) {
        with_borrowed_socket(fd, |s| s.set_keepalive(keep_alive))?;
    }
    if let Some(linger) = options.get_opt(&LINGER) {
        with_borrowed_socket(fd, |s| s.set_linger(linger.map(|secs| Duration::from_secs(secs as u64))))?;
    }
    if let Some(size) = options.get_opt(&RECEIVE_BUFFER_SIZE) {
        with_borrowed_socket(fd, |s| s.set_recv_buffer_size(size))?;
    }
    if let Some(size) = options.get_opt(&SEND_BUFFER_SIZE) {
        with_borrowed_socket(fd, |s| s.set_send_buffer_size(size))?;
    }
    Ok(())
}

fn apply_udp_options(socket: &MioUdpSocket, options: &OptionMap) -> Result<()> {
    if let Some(broadcast) = options.get_opt(&BROADCAST) {
        socket.set_broadcast(broadcast)?;
    }
    if let Some(ttl) = options.get_opt(&MULTICAST_TTL) {
        socket.set_multicast_ttl_v4(ttl as u32)?;
    }
    let fd = socket.as_raw_fd();
    if let Some(size) = options.get_opt(&RECEIVE_BUFFER_SIZE) {
        with_borrowed_socket(fd, |s| s.set_recv_buffer_size(size))?;
    }
    if let Some(size) = options.get_opt(&SEND_BUFFER_SIZE) {
        with_borrowed_socket(fd, |s| s.set_send_buffer_size(size))?;
    }
    Ok(())
}

/// Shared readable/writable flag pair plus the condvar any
/// `await_readable`/`await_writable` implementation waits on. Consulted,
/// not authoritative: `resume`/`suspend` on the owning channel still
/// gate whether the matching listener is ever invoked.
struct ReadyGate {
    state: Mutex<(bool, bool)>,
    condvar: Condvar,
}

impl ReadyGate {
    fn new() -> Self {
        ReadyGate {
            state: Mutex::new((false, false)),
            condvar: Condvar::new(),
        }
    }

    fn mark_readable(&self) {
        self.state.lock().0 = true;
        self.condvar.notify_all();
    }

    fn mark_writable(&self) {
        self.state.lock().1 = true;
        self.condvar.notify_all();
    }

    /// Clears the readable flag, then waits for it (or `timeout`) to
    /// elapse. Always returns `Ok(())`; callers (see `BlockingByteChannel`)
    /// recheck their own deadline afterwards regardless of whether
    /// readiness was actually observed here.
    fn await_readable(&self, timeout: Option<Duration>) -> Result<()> {
        let mut state = self.state.lock();
        state.0 = false;
        match timeout {
            None => {
                self.condvar.wait_while(&mut state, |s| !s.0);
            }
            Some(d) => {
                let _ = self.condvar.wait_while_for(&mut state, |s| !s.0, d);
            }
        }
        Ok(())
    }

    fn await_writable(&self, timeout: Option<Duration>) -> Result<()> {
        let mut state = self.state.lock();
        state.1 = false;
        match timeout {
            None => {
                self.condvar.wait_while(&mut state, |s| !s.1);
            }
            Some(d) => {
                let _ = self.condvar.wait_while_for(&mut state, |s| !s.1, d);
            }
        }
        Ok(())
    }
}

/// A non-blocking TCP byte channel backed by a registered `mio::net::TcpStream`.
pub struct TcpChannel {
    stream: Mutex<MioTcpStream>,
    reactor: Arc<Reactor>,
    token: Token,
    read_resumed: AtomicBool,
    write_resumed: AtomicBool,
    gate: ReadyGate,
    read_setter: ListenerSetter<Self>,
    write_setter: ListenerSetter<Self>,
    close_setter: ListenerSetter<Self>,
    closed: AtomicBool,
}

impl TcpChannel {
    fn from_stream(mut stream: MioTcpStream, reactor: Arc<Reactor>) -> Result<Arc<Self>> {
        let token = reactor.next_token();
        reactor
            .registry()
            .register(&mut stream, token, Interest::READABLE | Interest::WRITABLE)?;
        let channel = Arc::new(TcpChannel {
            stream: Mutex::new(stream),
            reactor: reactor.clone(),
            token,
            read_resumed: AtomicBool::new(true),
            write_resumed: AtomicBool::new(true),
            gate: ReadyGate::new(),
            read_setter: ListenerSetter::new(),
            write_setter: ListenerSetter::new(),
            close_setter: ListenerSetter::new(),
            closed: AtomicBool::new(false),
        });
        reactor.register(token, channel.clone());
        Ok(channel)
    }

    pub fn apply_options(&self, options: &OptionMap) -> Result<()> {
        apply_tcp_options(&self.stream.lock(), options)
    }
}

impl ReadinessTarget for TcpChannel {
    fn on_readable(&self) {
        self.gate.mark_readable();
        if self.read_resumed.load(Ordering::Acquire) {
            self.read_setter.invoke(self);
        }
    }

    fn on_writable(&self) {
        self.gate.mark_writable();
        if self.write_resumed.load(Ordering::Acquire) {
            self.write_setter.invoke(self);
        }
    }
}

impl ReadableByteChannel for TcpChannel {
    fn read(&self, buf: &mut [u8]) -> Result<ReadResult> {
        match self.stream.lock().read(buf) {
            Ok(0) => Ok(ReadResult::EndOfInput),
            Ok(n) => Ok(ReadResult::Read(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ReadResult::WouldBlock),
            Err(e) => Err(e.into()),
        }
    }
}

impl WritableByteChannel for TcpChannel {
    fn write(&self, buf: &[u8]) -> Result<usize> {
        match self.stream.lock().write(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

impl ScatteringByteChannel for TcpChannel {
    fn read_vectored(&self, bufs: &mut [IoSliceMut<'_>]) -> Result<ReadResult> {
        match self.stream.lock().read_vectored(bufs) {
            Ok(0) => Ok(ReadResult::EndOfInput),
            Ok(n) => Ok(ReadResult::Read(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ReadResult::WouldBlock),
            Err(e) => Err(e.into()),
        }
    }
}

impl GatheringByteChannel for TcpChannel {
    fn write_vectored(&self, bufs: &[IoSlice<'_>]) -> Result<usize> {
        match self.stream.lock().write_vectored(bufs) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

impl SuspendableRead for TcpChannel {
    fn suspend_reads(&self) {
        self.read_resumed.store(false, Ordering::Release);
    }

    fn resume_reads(&self) {
        self.read_resumed.store(true, Ordering::Release);
    }

    fn is_read_resumed(&self) -> bool {
        self.read_resumed.load(Ordering::Acquire)
    }

    fn await_readable(&self, timeout: Option<Duration>) -> Result<()> {
        self.gate.await_readable(timeout)
    }

    fn read_setter(&self) -> &ListenerSetter<Self> {
        &self.read_setter
    }
}

impl SuspendableWrite for TcpChannel {
    fn suspend_writes(&self) {
        self.write_resumed.store(false, Ordering::Release);
    }

    fn resume_writes(&self) {
        self.write_resumed.store(true, Ordering::Release);
    }

    fn is_write_resumed(&self) -> bool {
        self.write_resumed.load(Ordering::Acquire)
    }

    fn await_writable(&self, timeout: Option<Duration>) -> Result<()> {
        self.gate.await_writable(timeout)
    }

    fn flush(&self) -> Result<bool> {
        self.stream.lock().flush()?;
        Ok(true)
    }

    fn shutdown_writes(&self) -> Result<bool> {
        self.stream.lock().shutdown(std::net::Shutdown::Write)?;
        Ok(true)
    }

    fn write_setter(&self) -> &ListenerSetter<Self> {
        &self.write_setter
    }
}

impl BoundChannel for TcpChannel {
    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.lock().local_addr()?)
    }
}

impl ConnectedChannel for TcpChannel {
    fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.lock().peer_addr()?)
    }
}

impl Channel for TcpChannel {
    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.reactor.deregister(self.token);
        {
            let mut stream = self.stream.lock();
            let _ = self.reactor.registry().deregister(&mut *stream);
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.close_setter.invoke(self);
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn close_setter(&self) -> &ListenerSetter<Self> {
        &self.close_setter
    }
}

impl Registrar for TcpChannel {
    fn set_interest(&self, readable: bool, writable: bool) -> Result<()> {
        let mut stream = self.stream.lock();
        if !readable && !writable {
            self.reactor.registry().deregister(&mut *stream)?;
            return Ok(());
        }
        let interest = match (readable, writable) {
            (true, true) => Interest::READABLE | Interest::WRITABLE,
            (true, false) => Interest::READABLE,
            (false, true) => Interest::WRITABLE,
            (false, false) => unreachable!("handled above"),
        };
        self.reactor.registry().reregister(&mut *stream, self.token, interest)?;
        Ok(())
    }
}

/// Outbound TCP connector. Registers write-readiness immediately after
/// the non-blocking `connect()` call and resolves its future once the
/// connect attempt completes (success or error), detected via
/// `take_error`.
pub struct TcpConnector {
    reactor: Arc<Reactor>,
    options: OptionMap,
}

impl TcpConnector {
    pub fn new(reactor: Arc<Reactor>, options: OptionMap) -> Self {
        TcpConnector { reactor, options }
    }
}

struct ConnectWatcher {
    channel: Arc<TcpChannel>,
    open_listener: Option<Arc<dyn Listener<TcpChannel>>>,
    sink: FutureResult<Arc<TcpChannel>>,
    options: OptionMap,
}

impl Listener<TcpChannel> for ConnectWatcher {
    fn on_ready(&self, channel: &TcpChannel) {
        let outcome = channel.stream.lock().take_error();
        channel.write_setter().set(None);
        match outcome {
            Ok(None) => {
                if let Err(e) = channel.apply_options(&self.options) {
                    safe_close(|| channel.close());
                    self.sink.set_failure(e);
                    return;
                }
                if let Some(listener) = &self.open_listener {
                    listener.on_ready(&self.channel);
                }
                self.sink.set_value(self.channel.clone());
            }
            Ok(Some(err)) => {
                safe_close(|| channel.close());
                self.sink.set_failure(err.into());
            }
            Err(err) => {
                safe_close(|| channel.close());
                self.sink.set_failure(err.into());
            }
        }
    }
}

impl Connector<TcpChannel> for TcpConnector {
    fn connect(
        &self,
        address: SocketAddr,
        open_listener: Option<Arc<dyn Listener<TcpChannel>>>,
        bind_listener: Option<Arc<dyn Listener<TcpChannel>>>,
    ) -> Future<Arc<TcpChannel>> {
        let (future, sink) = pair();

        let stream = match MioTcpStream::connect(address) {
            Ok(s) => s,
            Err(e) => {
                return failed(e.into());
            }
        };
        let channel = match TcpChannel::from_stream(stream, self.reactor.clone()) {
            Ok(c) => c,
            Err(e) => {
                sink.set_failure(e);
                return future;
            }
        };

        future.set_cancellable(ClosingCancellable::new(channel.clone()));

        if let Some(listener) = &bind_listener {
            listener.on_ready(&channel);
        }

        set_listener(channel.close_setter(), channel.clone(), {
            let sink = sink.clone();
            move |_c| {
                sink.set_failure(Error::Closed);
            }
        });

        channel.write_setter.set(Some(Arc::new(ConnectWatcher {
            channel: channel.clone(),
            open_listener,
            sink,
            options: self.options.clone(),
        })));

        future
    }
}

struct AcceptRequest {
    open_listener: Option<Arc<dyn Listener<TcpChannel>>>,
    sink: FutureResult<Arc<TcpChannel>>,
}

struct TcpDestinationState {
    listener: Mutex<MioTcpListener>,
    reactor: Arc<Reactor>,
    options: OptionMap,
    token: Token,
    pending: Mutex<std::collections::VecDeque<AcceptRequest>>,
}

impl ReadinessTarget for TcpDestinationState {
    fn on_readable(&self) {
        loop {
            let request = {
                let mut pending = self.pending.lock();
                match pending.pop_front() {
                    Some(r) => r,
                    None => return,
                }
            };
            match self.listener.lock().accept() {
                Ok((stream, _peer)) => match TcpChannel::from_stream(stream, self.reactor.clone()) {
                    Ok(channel) => {
                        if let Err(e) = channel.apply_options(&self.options) {
                            safe_close(|| channel.close());
                            request.sink.set_failure(e);
                            continue;
                        }
                        if let Some(listener) = &request.open_listener {
                            listener.on_ready(&channel);
                        }
                        request.sink.set_value(channel);
                    }
                    Err(e) => {
                        request.sink.set_failure(e);
                    }
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.pending.lock().push_front(request);
                    return;
                }
                Err(e) => {
                    request.sink.set_failure(e.into());
                }
            }
        }
    }

    fn on_writable(&self) {}
}

impl Drop for TcpDestinationState {
    fn drop(&mut self) {
        self.reactor.deregister(self.token);
        let _ = self.reactor.registry().deregister(&mut *self.listener.lock());
    }
}

/// An inbound TCP bind. Each [`accept`](ChannelDestination::accept) call
/// queues one pending request, served in order as connections arrive.
pub struct TcpDestination {
    state: Arc<TcpDestinationState>,
}

/// Builds the listening socket through `socket2` rather than
/// `mio::net::TcpListener::bind` so [`REUSE_ADDRESS`] can be honored
/// explicitly; mio enables `SO_REUSEADDR` unconditionally, so this is
/// only reachable to turn it *off*, which `TcpListener::bind` has no
/// way to express.
fn bind_tcp_listener(address: SocketAddr, options: &OptionMap) -> io::Result<MioTcpListener> {
    let domain = if address.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(options.get(&REUSE_ADDRESS, true))?;
    socket.set_nonblocking(true)?;
    socket.bind(&address.into())?;
    socket.listen(1024)?;
    Ok(MioTcpListener::from_std(socket.into()))
}

impl TcpDestination {
    pub fn bind(reactor: Arc<Reactor>, address: SocketAddr, options: OptionMap) -> Result<Self> {
        let mut listener = bind_tcp_listener(address, &options)?;
        let token = reactor.next_token();
        reactor.registry().register(&mut listener, token, Interest::READABLE)?;
        let state = Arc::new(TcpDestinationState {
            listener: Mutex::new(listener),
            reactor: reactor.clone(),
            options,
            token,
            pending: Mutex::new(std::collections::VecDeque::new()),
        });
        reactor.register(token, state.clone());
        Ok(TcpDestination { state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.state.listener.lock().local_addr()?)
    }
}

impl ChannelDestination<TcpChannel> for TcpDestination {
    fn accept(&self, open_listener: Option<Arc<dyn Listener<TcpChannel>>>) -> Future<Arc<TcpChannel>> {
        let (future, sink) = pair();
        self.state.pending.lock().push_back(AcceptRequest { open_listener, sink });
        // Opportunistic: a connection may already be queued in the
        // kernel backlog from before this request was registered.
        self.state.on_readable();
        future
    }
}

/// A connected UDP message channel.
pub struct UdpChannel {
    socket: Mutex<MioUdpSocket>,
    peer: SocketAddr,
    reactor: Arc<Reactor>,
    token: Token,
    read_resumed: AtomicBool,
    write_resumed: AtomicBool,
    gate: ReadyGate,
    read_setter: ListenerSetter<Self>,
    write_setter: ListenerSetter<Self>,
    close_setter: ListenerSetter<Self>,
    closed: AtomicBool,
}

impl UdpChannel {
    pub fn connect(reactor: Arc<Reactor>, local: SocketAddr, peer: SocketAddr, options: &OptionMap) -> Result<Arc<Self>> {
        let mut socket = MioUdpSocket::bind(&local)?;
        socket.connect(peer)?;
        apply_udp_options(&socket, options)?;
        let token = reactor.next_token();
        reactor
            .registry()
            .register(&mut socket, token, Interest::READABLE | Interest::WRITABLE)?;
        let channel = Arc::new(UdpChannel {
            socket: Mutex::new(socket),
            peer,
            reactor: reactor.clone(),
            token,
            read_resumed: AtomicBool::new(true),
            write_resumed: AtomicBool::new(true),
            gate: ReadyGate::new(),
            read_setter: ListenerSetter::new(),
            write_setter: ListenerSetter::new(),
            close_setter: ListenerSetter::new(),
            closed: AtomicBool::new(false),
        });
        reactor.register(token, channel.clone());
        Ok(channel)
    }
}

impl ReadinessTarget for UdpChannel {
    fn on_readable(&self) {
        self.gate.mark_readable();
        if self.read_resumed.load(Ordering::Acquire) {
            self.read_setter.invoke(self);
        }
    }

    fn on_writable(&self) {
        self.gate.mark_writable();
        if self.write_resumed.load(Ordering::Acquire) {
            self.write_setter.invoke(self);
        }
    }
}

impl MessageReadChannel for UdpChannel {
    fn receive(&self, buf: &mut [u8]) -> Result<usize> {
        match self.socket.lock().recv(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn receive_vectored(&self, bufs: &mut [IoSliceMut<'_>]) -> Result<usize> {
        let total: usize = bufs.iter().map(|b| b.len()).sum();
        let mut flat = vec![0u8; total];
        let n = self.receive(&mut flat)?;
        let mut remaining = &flat[..n];
        for buf in bufs.iter_mut() {
            let take = remaining.len().min(buf.len());
            buf[..take].copy_from_slice(&remaining[..take]);
            remaining = &remaining[take..];
            if remaining.is_empty() {
                break;
            }
        }
        Ok(n)
    }
}

impl MessageWriteChannel for UdpChannel {
    fn send(&self, buf: &[u8]) -> Result<bool> {
        match self.socket.lock().send(buf) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn send_vectored(&self, bufs: &[IoSlice<'_>]) -> Result<bool> {
        let flat: Vec<u8> = bufs.iter().flat_map(|s| s.iter().copied()).collect();
        self.send(&flat)
    }
}

impl SuspendableRead for UdpChannel {
    fn suspend_reads(&self) {
        self.read_resumed.store(false, Ordering::Release);
    }

    fn resume_reads(&self) {
        self.read_resumed.store(true, Ordering::Release);
    }

    fn is_read_resumed(&self) -> bool {
        self.read_resumed.load(Ordering::Acquire)
    }

    fn await_readable(&self, timeout: Option<Duration>) -> Result<()> {
        self.gate.await_readable(timeout)
    }

    fn read_setter(&self) -> &ListenerSetter<Self> {
        &self.read_setter
    }
}

impl SuspendableWrite for UdpChannel {
    fn suspend_writes(&self) {
        self.write_resumed.store(false, Ordering::Release);
    }

    fn resume_writes(&self) {
        self.write_resumed.store(true, Ordering::Release);
    }

    fn is_write_resumed(&self) -> bool {
        self.write_resumed.load(Ordering::Acquire)
    }

    fn await_writable(&self, timeout: Option<Duration>) -> Result<()> {
        self.gate.await_writable(timeout)
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

impl BoundChannel for UdpChannel {
    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.lock().local_addr()?)
    }
}

impl ConnectedChannel for UdpChannel {
    fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.peer)
    }
}

impl Channel for UdpChannel {
    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.reactor.deregister(self.token);
        let _ = self.reactor.registry().deregister(&mut *self.socket.lock());
        self.close_setter.invoke(self);
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn close_setter(&self) -> &ListenerSetter<Self> {
        &self.close_setter
    }
}

impl Registrar for UdpChannel {
    fn set_interest(&self, readable: bool, writable: bool) -> Result<()> {
        let mut socket = self.socket.lock();
        if !readable && !writable {
            self.reactor.registry().deregister(&mut *socket)?;
            return Ok(());
        }
        let interest = match (readable, writable) {
            (true, true) => Interest::READABLE | Interest::WRITABLE,
            (true, false) => Interest::READABLE,
            (false, true) => Interest::WRITABLE,
            (false, false) => unreachable!("handled above"),
        };
        self.reactor.registry().reregister(&mut *socket, self.token, interest)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener as StdTcpListener, UdpSocket as StdUdpSocket};

    fn free_addr() -> SocketAddr {
        let listener = StdUdpSocket::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }

    #[test]
    fn tcp_connect_and_accept_round_trip() {
        let reactor = Reactor::start().unwrap();
        let std_listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let addr = std_listener.local_addr().unwrap();
        drop(std_listener);

        let destination = TcpDestination::bind(reactor.clone(), addr, OptionMap::default()).unwrap();
        let accept_future = destination.accept(None);

        let connector = TcpConnector::new(reactor.clone(), OptionMap::default());
        let connect_future = connector.connect(addr, None, None);

        let server_side = accept_future.await_timeout(Duration::from_secs(2));
        assert_eq!(server_side, crate::future::Status::Done);
        let client_side = connect_future.await_timeout(Duration::from_secs(2));
        assert_eq!(client_side, crate::future::Status::Done);
    }

    #[test]
    fn tcp_connect_to_closed_port_fails() {
        let reactor = Reactor::start().unwrap();
        let addr = free_addr();
        let connector = TcpConnector::new(reactor.clone(), OptionMap::default());
        let future = connector.connect(addr, None, None);
        let status = future.await_timeout(Duration::from_secs(2));
        assert_ne!(status, crate::future::Status::Waiting);
        assert_ne!(status, crate::future::Status::Done);
    }

    #[test]
    fn udp_channel_send_and_receive_between_two_sockets() {
        let reactor = Reactor::start().unwrap();
        let a_addr = free_addr();
        let b_addr = free_addr();
        let a = UdpChannel::connect(reactor.clone(), a_addr, b_addr, &OptionMap::default()).unwrap();
        let b = UdpChannel::connect(reactor.clone(), b_addr, a_addr, &OptionMap::default()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if a.send(b"ping").unwrap() {
                break;
            }
            assert!(Instant::now() < deadline, "never became writable");
        }

        let mut buf = [0u8; 16];
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let n = b.receive(&mut buf).unwrap();
            if n > 0 {
                assert_eq!(&buf[..n], b"ping");
                break;
            }
            assert!(Instant::now() < deadline, "never became readable");
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}
