//! Black-box, end-to-end scenarios over real loopback TCP, combining the
//! reactor, connector/destination, length-framed overlay and blocking
//! adapter the way an application actually would -- none of these
//! exercise a single module in isolation the way the unit tests do.

#![cfg(all(feature = "os-poll", feature = "net"))]

use std::net::TcpListener as StdTcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use rand::Rng;

use nbio::blocking::BlockingByteChannel;
use nbio::channel::{Channel, MessageWriteChannel, SuspendableRead, SuspendableWrite};
use nbio::connect::{ChannelDestination, Connector};
use nbio::framing::{self, MessageHandler};
use nbio::future::Status;
use nbio::net::{TcpChannel, TcpConnector, TcpDestination};
use nbio::options::{OptionMap, OptionMapBuilder, MAX_INBOUND_MESSAGE_SIZE, MAX_OUTBOUND_MESSAGE_SIZE};
use nbio::reactor::Reactor;

/// Mirrors the teacher's own `tests/util::init`: installs the env logger
/// exactly once so `RUST_LOG=trace` works across these black-box tests
/// without each one racing to initialize it.
fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        drop(env_logger::try_init());
    });
}

fn free_port() -> std::net::SocketAddr {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn connect_pair(reactor: Arc<Reactor>) -> (Arc<TcpChannel>, Arc<TcpChannel>) {
    init();
    let addr = free_port();
    let destination = TcpDestination::bind(reactor.clone(), addr, OptionMap::default()).unwrap();
    let accept_future = destination.accept(None);
    let connector = TcpConnector::new(reactor.clone(), OptionMap::default());
    let connect_future = connector.connect(addr, None, None);

    assert_eq!(accept_future.await_timeout(Duration::from_secs(2)), Status::Done);
    assert_eq!(connect_future.await_timeout(Duration::from_secs(2)), Status::Done);

    (accept_future.get().unwrap(), connect_future.get().unwrap())
}

struct CollectingHandler {
    messages: Mutex<Vec<Vec<u8>>>,
    framing_errors: AtomicUsize,
}

impl CollectingHandler {
    fn new() -> Arc<Self> {
        Arc::new(CollectingHandler {
            messages: Mutex::new(Vec::new()),
            framing_errors: AtomicUsize::new(0),
        })
    }
}

impl MessageHandler<TcpChannel> for CollectingHandler {
    fn on_message(&self, _channel: &TcpChannel, payload: &[u8]) {
        self.messages.lock().unwrap().push(payload.to_vec());
    }

    fn on_framing_error(&self, _channel: &TcpChannel, _err: &nbio::error::Error) {
        self.framing_errors.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scenario 3 from the testable-properties list: three payloads --
/// `[0x41, 0x42, 0x43]`, an empty message, and a large (close to 65535
/// bytes) payload of `0xFF` -- written through the length-framed overlay
/// over a real TCP socket arrive in order on the other side with
/// identical contents.
#[test]
fn framing_round_trip_over_real_tcp() {
    let reactor = Reactor::start().unwrap();
    let (server, client) = connect_pair(reactor.clone());

    let handler = CollectingHandler::new();
    let (reader, _writer) = framing::overlay(server.clone(), &OptionMap::default(), handler.clone());
    server.resume_reads();
    // Keep the reader alive for the duration of the test; it installs
    // itself as the server channel's read listener.
    std::mem::forget(reader);

    let (_reader2, writer) = framing::overlay(client.clone(), &OptionMap::default(), CollectingHandler::new());
    client.resume_writes();

    // Exercise a message whose length varies across runs rather than a
    // single fixed size, same spirit as the teacher's own randomized
    // pipe-name suffixes in tests/unix_listener.rs.
    let big_len = 65535 - rand::thread_rng().gen_range(0..1024);
    let big = vec![0xFFu8; big_len];
    writer.send(&[0x41, 0x42, 0x43]).unwrap();
    writer.send(&[]).unwrap();
    writer.send(&big).unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        if handler.messages.lock().unwrap().len() == 3 {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "messages never arrived");
        std::thread::sleep(Duration::from_millis(10));
    }

    let got = handler.messages.lock().unwrap();
    assert_eq!(got[0], vec![0x41, 0x42, 0x43]);
    assert_eq!(got[1], Vec::<u8>::new());
    assert_eq!(got[2], big);
}

/// Scenario 4: an outbound max of 4 bytes rejects a 5-byte send with
/// `oversized-message` and nothing reaches the wire for that call.
#[test]
fn oversized_message_is_rejected_before_touching_the_wire() {
    let reactor = Reactor::start().unwrap();
    let (server, client) = connect_pair(reactor.clone());

    let options = OptionMapBuilder::new().set(&MAX_OUTBOUND_MESSAGE_SIZE, 4).build();
    let handler = CollectingHandler::new();
    let (reader, _writer) = framing::overlay(server.clone(), &OptionMap::default(), handler.clone());
    server.resume_reads();
    std::mem::forget(reader);

    let (_reader2, writer) = framing::overlay(client.clone(), &options, CollectingHandler::new());
    client.resume_writes();

    let err = writer.send(&[0x01, 0x02, 0x03, 0x04, 0x05]).unwrap_err();
    assert!(matches!(err, nbio::error::Error::OversizedMessage { .. }));

    std::thread::sleep(Duration::from_millis(100));
    assert!(handler.messages.lock().unwrap().is_empty());
}

/// Scenario 6: a blocking read over a channel that never becomes
/// readable times out with `read-timeout` after at least the configured
/// deadline, and consumes nothing.
#[test]
fn blocking_read_times_out_on_an_idle_socket() {
    let reactor = Reactor::start().unwrap();
    let (_server, client) = connect_pair(reactor.clone());

    let blocking = BlockingByteChannel::new(client);
    blocking.set_read_timeout(Duration::from_millis(50));

    let mut buf = [0u8; 16];
    let started = std::time::Instant::now();
    let err = blocking.read(&mut buf).unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, nbio::error::Error::ReadTimeout(_)));
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(500), "took suspiciously long: {elapsed:?}");
}

/// The inbound maximum is honored too: a frame claiming a length over
/// the configured inbound max closes the channel and notifies the
/// handler with a framing error instead of buffering unbounded memory.
#[test]
fn oversized_inbound_frame_triggers_framing_error() {
    let reactor = Reactor::start().unwrap();
    let (server, client) = connect_pair(reactor.clone());

    let options = OptionMapBuilder::new().set(&MAX_INBOUND_MESSAGE_SIZE, 4).build();
    let handler = CollectingHandler::new();
    let (reader, _writer) = framing::overlay(server.clone(), &options, handler.clone());
    server.resume_reads();
    std::mem::forget(reader);

    let (_reader2, writer) = framing::overlay(client.clone(), &OptionMap::default(), CollectingHandler::new());
    client.resume_writes();

    writer.send(&[0u8; 10]).unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    loop {
        if handler.framing_errors.load(Ordering::SeqCst) > 0 || !server.is_open() {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "framing error never observed");
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(handler.framing_errors.load(Ordering::SeqCst), 1);
}
