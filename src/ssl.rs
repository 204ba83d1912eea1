//! SSL/TLS overlay glue (the SSL layer), gated behind the `ssl` feature.
//!
//! The TLS engine itself is treated as an oracle behind the [`TlsEngine`]
//! trait -- no protocol state machine lives in this crate, matching the
//! scope note that the handshake and record layer are an external
//! collaborator. This module only owns the orchestration: wrap/unwrap
//! scheduling driven off the underlying byte-stream channel's readiness,
//! handshake-driven task dispatch onto the configured [`Executor`], and
//! option -> engine configuration. [`SslOverlay`] installs itself on the
//! inner channel's setters the same way [`crate::framing::FramedReader`]
//! does, then re-exposes its own read/write/close setters for whatever
//! sits on top of it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::channel::{
    set_listener, Channel, ReadResult, ReadableByteChannel, SuspendableRead, SuspendableWrite,
    WritableByteChannel,
};
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::listener::{safe_close, ListenerSetter};
use crate::options::{
    ClientAuthMode, OptionMap, Sequence, SSL_CLIENT_AUTH_MODE, SSL_ENABLED_CIPHER_SUITES,
    SSL_ENABLED_PROTOCOLS, SSL_SESSION_CREATION, SSL_USE_CLIENT_MODE,
};

/// What the engine wants to happen next, mirroring the classical
/// handshake-status oracle shape this overlay is built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    NotHandshaking,
    NeedWrap,
    NeedUnwrap,
    NeedTask,
    Finished,
}

/// The outcome of one `wrap`/`unwrap` call: how many input bytes were
/// consumed, how many output bytes were produced, and what the engine
/// wants next.
#[derive(Debug, Clone, Copy)]
pub struct EngineStep {
    pub consumed: usize,
    pub produced: usize,
    pub status: HandshakeStatus,
}

/// Configuration derived from the option map, handed to the engine at
/// construction.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub client_mode: bool,
    pub client_auth: ClientAuthMode,
    pub session_creation: bool,
    pub enabled_cipher_suites: Option<Vec<String>>,
    pub enabled_protocols: Option<Vec<String>>,
}

/// The engine oracle: wrap (app-plain -> net-cipher), unwrap
/// (net-cipher -> app-plain), handshake status, and begin-handshake,
/// plus delegated-task pickup for handshake steps the engine wants run
/// off the calling thread.
pub trait TlsEngine: Send + Sync {
    fn configure(&self, config: &TlsConfig) -> Result<()>;

    fn begin_handshake(&self) -> Result<()>;

    fn handshake_status(&self) -> HandshakeStatus;

    /// Encrypts as much of `app_plain` as fits, appending to whatever
    /// `net_cipher` already holds.
    fn wrap(&self, app_plain: &[u8], net_cipher: &mut Vec<u8>) -> Result<EngineStep>;

    /// Decrypts as much of `net_cipher` as is a complete record,
    /// appending decrypted application bytes to `app_plain`.
    fn unwrap(&self, net_cipher: &[u8], app_plain: &mut Vec<u8>) -> Result<EngineStep>;

    /// Takes one pending delegated task (e.g. certificate validation),
    /// if the engine has one queued. Running it advances
    /// `handshake_status()` past `NeedTask`.
    fn take_delegated_task(&self) -> Option<Box<dyn FnOnce() + Send>>;
}

/// Builds a [`TlsConfig`] from an option map, the way the overlay is
/// expected to be configured. `default_client_mode` is used when
/// [`SSL_USE_CLIENT_MODE`] is unset, derived from whether the overlay
/// was constructed as a client or server wrapper.
pub fn config_from_options(options: &OptionMap, default_client_mode: bool) -> TlsConfig {
    TlsConfig {
        client_mode: options.get(&SSL_USE_CLIENT_MODE, default_client_mode),
        client_auth: options.get(&SSL_CLIENT_AUTH_MODE, ClientAuthMode::NotRequested),
        session_creation: options.get(&SSL_SESSION_CREATION, true),
        enabled_cipher_suites: options
            .get_opt(&SSL_ENABLED_CIPHER_SUITES)
            .map(|s: Sequence<String>| s.as_slice().to_vec()),
        enabled_protocols: options
            .get_opt(&SSL_ENABLED_PROTOCOLS)
            .map(|s: Sequence<String>| s.as_slice().to_vec()),
    }
}

/// Intersects the caller-requested sequence (if any) with what the
/// engine actually supports, failing with `unsupported-option` if the
/// intersection is empty while a non-empty request was made.
pub fn intersect_supported(requested: &Option<Vec<String>>, supported: &[String]) -> Result<Vec<String>> {
    match requested {
        None => Ok(supported.to_vec()),
        Some(req) => {
            let chosen: Vec<String> = req.iter().filter(|r| supported.contains(r)).cloned().collect();
            if chosen.is_empty() && !req.is_empty() {
                return Err(Error::unsupported_option(format!(
                    "none of the requested values ({req:?}) are supported ({supported:?})"
                )));
            }
            Ok(chosen)
        }
    }
}

struct Pending {
    /// Decrypted application bytes, ready for `read` to drain.
    app_in: Vec<u8>,
    /// Ciphertext not yet flushed to the underlying stream.
    net_out: Vec<u8>,
    net_out_sent: usize,
}

impl Pending {
    fn new() -> Self {
        Pending {
            app_in: Vec::new(),
            net_out: Vec::new(),
            net_out_sent: 0,
        }
    }

    fn net_out_remaining(&self) -> &[u8] {
        &self.net_out[self.net_out_sent..]
    }

    fn compact_net_out(&mut self) {
        if self.net_out_sent == self.net_out.len() {
            self.net_out.clear();
            self.net_out_sent = 0;
        }
    }
}

/// A bidirectional byte channel that runs TLS over an inner stream
/// channel. Installs itself on the inner channel's read/write setters
/// at construction and re-exposes its own setters, so it slots into the
/// channel stack the same way the inner channel itself would.
pub struct SslOverlay<C: ?Sized> {
    inner: Arc<C>,
    engine: Arc<dyn TlsEngine>,
    executor: Arc<dyn Executor>,
    pending: Mutex<Pending>,
    read_setter: ListenerSetter<Self>,
    write_setter: ListenerSetter<Self>,
    close_setter: ListenerSetter<Self>,
}

impl<C> SslOverlay<C>
where
    C: ReadableByteChannel + WritableByteChannel + SuspendableRead + SuspendableWrite + Channel + Send + Sync + 'static,
{
    pub fn new(
        inner: Arc<C>,
        engine: Arc<dyn TlsEngine>,
        executor: Arc<dyn Executor>,
        config: &TlsConfig,
    ) -> Result<Arc<Self>> {
        if let Err(e) = engine.configure(config) {
            safe_close(|| inner.close());
            return Err(e);
        }
        if let Err(e) = engine.begin_handshake() {
            safe_close(|| inner.close());
            return Err(e);
        }
        let overlay = Arc::new(SslOverlay {
            inner: inner.clone(),
            engine,
            executor,
            pending: Mutex::new(Pending::new()),
            read_setter: ListenerSetter::new(),
            write_setter: ListenerSetter::new(),
            close_setter: ListenerSetter::new(),
        });

        set_listener(inner.read_setter(), inner.clone(), {
            let overlay = overlay.clone();
            move |_channel: &Arc<C>| overlay.on_inner_readable()
        });
        set_listener(inner.write_setter(), inner.clone(), {
            let overlay = overlay.clone();
            move |_channel: &Arc<C>| overlay.on_inner_writable()
        });
        set_listener(inner.close_setter(), inner, {
            let overlay = overlay.clone();
            move |_channel: &Arc<C>| overlay.close_setter.invoke(&overlay)
        });

        Ok(overlay)
    }

    pub fn handshake_status(&self) -> HandshakeStatus {
        self.engine.handshake_status()
    }

    fn on_inner_readable(&self) {
        let had_app_data = !self.pending.lock().app_in.is_empty();
        if let Err(e) = self.pump() {
            log::warn!("TLS handshake/record pump failed on read-ready: {e}");
            return;
        }
        let has_app_data_now = !self.pending.lock().app_in.is_empty();
        if has_app_data_now && !had_app_data {
            self.read_setter.invoke(self);
        }
    }

    fn on_inner_writable(&self) {
        if let Err(e) = self.flush_net_out() {
            log::warn!("TLS overlay failed to drain staged ciphertext: {e}");
            return;
        }
        if let Err(e) = self.pump() {
            log::warn!("TLS handshake pump failed on write-ready: {e}");
            return;
        }
        if matches!(
            self.engine.handshake_status(),
            HandshakeStatus::NotHandshaking | HandshakeStatus::Finished
        ) {
            self.write_setter.invoke(self);
        }
    }

    /// Drives the handshake (and any staged plaintext delivery) as far
    /// as current readiness allows, without blocking. Safe to call
    /// repeatedly, e.g. from the inner channel's read/write listeners.
    fn pump(&self) -> Result<()> {
        loop {
            match self.engine.handshake_status() {
                HandshakeStatus::NeedTask => {
                    if let Some(task) = self.engine.take_delegated_task() {
                        if self.executor.submit(task).is_err() {
                            safe_close(|| self.inner.close());
                            return Err(Error::Closed);
                        }
                    } else {
                        return Ok(());
                    }
                }
                HandshakeStatus::NeedWrap => {
                    self.pump_wrap(&[])?;
                }
                HandshakeStatus::NeedUnwrap => {
                    if !self.pump_unwrap()? {
                        return Ok(());
                    }
                }
                HandshakeStatus::NotHandshaking | HandshakeStatus::Finished => return Ok(()),
            }
        }
    }

    /// Feeds `app_plain` (possibly empty, for a handshake-only wrap)
    /// through the engine and stages/flushes the resulting ciphertext.
    fn pump_wrap(&self, app_plain: &[u8]) -> Result<usize> {
        let mut pending = self.pending.lock();
        let step = self.engine.wrap(app_plain, &mut pending.net_out)?;
        drop(pending);
        self.flush_net_out()?;
        Ok(step.consumed)
    }

    /// Writes as much staged ciphertext as the inner channel will take.
    fn flush_net_out(&self) -> Result<bool> {
        let mut pending = self.pending.lock();
        while !pending.net_out_remaining().is_empty() {
            let n = self.inner.write(pending.net_out_remaining())?;
            if n == 0 {
                return Ok(false);
            }
            pending.net_out_sent += n;
        }
        pending.compact_net_out();
        Ok(true)
    }

    /// Reads one chunk of ciphertext from the inner stream and unwraps
    /// it. Returns `true` if progress was made, `false` on `WouldBlock`.
    fn pump_unwrap(&self) -> Result<bool> {
        let mut net_in = [0u8; 16 * 1024];
        match self.inner.read(&mut net_in)? {
            ReadResult::WouldBlock => Ok(false),
            ReadResult::EndOfInput => {
                safe_close(|| self.inner.close());
                Err(Error::Closed)
            }
            ReadResult::Read(n) => {
                let mut pending = self.pending.lock();
                self.engine.unwrap(&net_in[..n], &mut pending.app_in)?;
                Ok(true)
            }
        }
    }
}

impl<C> ReadableByteChannel for SslOverlay<C>
where
    C: ReadableByteChannel + WritableByteChannel + SuspendableRead + SuspendableWrite + Channel + Send + Sync + 'static,
{
    fn read(&self, buf: &mut [u8]) -> Result<ReadResult> {
        {
            let mut pending = self.pending.lock();
            if !pending.app_in.is_empty() {
                let n = buf.len().min(pending.app_in.len());
                buf[..n].copy_from_slice(&pending.app_in[..n]);
                pending.app_in.drain(..n);
                return Ok(ReadResult::Read(n));
            }
        }
        if !matches!(
            self.engine.handshake_status(),
            HandshakeStatus::NotHandshaking | HandshakeStatus::Finished
        ) {
            self.pump()?;
            return Ok(ReadResult::WouldBlock);
        }
        if !self.pump_unwrap()? {
            return Ok(ReadResult::WouldBlock);
        }
        let mut pending = self.pending.lock();
        if pending.app_in.is_empty() {
            return Ok(ReadResult::WouldBlock);
        }
        let n = buf.len().min(pending.app_in.len());
        buf[..n].copy_from_slice(&pending.app_in[..n]);
        pending.app_in.drain(..n);
        Ok(ReadResult::Read(n))
    }
}

impl<C> WritableByteChannel for SslOverlay<C>
where
    C: ReadableByteChannel + WritableByteChannel + SuspendableRead + SuspendableWrite + Channel + Send + Sync + 'static,
{
    fn write(&self, buf: &[u8]) -> Result<usize> {
        if !matches!(
            self.engine.handshake_status(),
            HandshakeStatus::NotHandshaking | HandshakeStatus::Finished
        ) {
            self.pump()?;
            if !matches!(
                self.engine.handshake_status(),
                HandshakeStatus::NotHandshaking | HandshakeStatus::Finished
            ) {
                return Ok(0);
            }
        }
        if !self.flush_net_out()? {
            return Ok(0);
        }
        self.pump_wrap(buf)
    }
}

impl<C> SuspendableRead for SslOverlay<C>
where
    C: ReadableByteChannel + WritableByteChannel + SuspendableRead + SuspendableWrite + Channel + Send + Sync + 'static,
{
    fn suspend_reads(&self) {
        self.inner.suspend_reads();
    }
    fn resume_reads(&self) {
        self.inner.resume_reads();
    }
    fn is_read_resumed(&self) -> bool {
        self.inner.is_read_resumed()
    }
    fn await_readable(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.await_readable(timeout)
    }
    fn read_setter(&self) -> &ListenerSetter<Self> {
        &self.read_setter
    }
}

impl<C> SuspendableWrite for SslOverlay<C>
where
    C: ReadableByteChannel + WritableByteChannel + SuspendableRead + SuspendableWrite + Channel + Send + Sync + 'static,
{
    fn suspend_writes(&self) {
        self.inner.suspend_writes();
    }
    fn resume_writes(&self) {
        self.inner.resume_writes();
    }
    fn is_write_resumed(&self) -> bool {
        self.inner.is_write_resumed()
    }
    fn await_writable(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.await_writable(timeout)
    }
    fn flush(&self) -> Result<bool> {
        self.flush_net_out()
    }
    fn shutdown_writes(&self) -> Result<bool> {
        self.inner.shutdown_writes()
    }
    fn write_setter(&self) -> &ListenerSetter<Self> {
        &self.write_setter
    }
}

impl<C> Channel for SslOverlay<C>
where
    C: ReadableByteChannel + WritableByteChannel + SuspendableRead + SuspendableWrite + Channel + Send + Sync + 'static,
{
    fn close(&self) -> Result<()> {
        self.inner.close()
    }
    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
    fn close_setter(&self) -> &ListenerSetter<Self> {
        &self.close_setter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct MockEngine {
        status: Mutex<HandshakeStatus>,
        handshakes: AtomicU32,
    }

    impl MockEngine {
        fn new() -> Arc<Self> {
            Arc::new(MockEngine {
                status: Mutex::new(HandshakeStatus::NotHandshaking),
                handshakes: AtomicU32::new(0),
            })
        }
    }

    impl TlsEngine for MockEngine {
        fn configure(&self, _config: &TlsConfig) -> Result<()> {
            Ok(())
        }
        fn begin_handshake(&self) -> Result<()> {
            self.handshakes.fetch_add(1, Ordering::SeqCst);
            *self.status.lock() = HandshakeStatus::Finished;
            Ok(())
        }
        fn handshake_status(&self) -> HandshakeStatus {
            *self.status.lock()
        }
        fn wrap(&self, app_plain: &[u8], net_cipher: &mut Vec<u8>) -> Result<EngineStep> {
            // "encrypt" by XOR-ing with a fixed key, purely to prove data
            // flows through wrap/unwrap -- not a real cipher.
            let start = net_cipher.len();
            net_cipher.extend(app_plain.iter().map(|b| b ^ 0x5A));
            Ok(EngineStep {
                consumed: app_plain.len(),
                produced: net_cipher.len() - start,
                status: HandshakeStatus::Finished,
            })
        }
        fn unwrap(&self, net_cipher: &[u8], app_plain: &mut Vec<u8>) -> Result<EngineStep> {
            let start = app_plain.len();
            app_plain.extend(net_cipher.iter().map(|b| b ^ 0x5A));
            Ok(EngineStep {
                consumed: net_cipher.len(),
                produced: app_plain.len() - start,
                status: HandshakeStatus::Finished,
            })
        }
        fn take_delegated_task(&self) -> Option<Box<dyn FnOnce() + Send>> {
            None
        }
    }

    struct MemoryStream {
        inbound: Mutex<std::collections::VecDeque<u8>>,
        outbound: Mutex<Vec<u8>>,
        closed: AtomicBool,
        read_setter: ListenerSetter<Self>,
        write_setter: ListenerSetter<Self>,
        close_setter: ListenerSetter<Self>,
    }

    impl MemoryStream {
        fn new(inbound: Vec<u8>) -> Arc<Self> {
            Arc::new(MemoryStream {
                inbound: Mutex::new(inbound.into()),
                outbound: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                read_setter: ListenerSetter::new(),
                write_setter: ListenerSetter::new(),
                close_setter: ListenerSetter::new(),
            })
        }
    }

    impl ReadableByteChannel for MemoryStream {
        fn read(&self, buf: &mut [u8]) -> Result<ReadResult> {
            let mut inbound = self.inbound.lock();
            if inbound.is_empty() {
                return Ok(ReadResult::WouldBlock);
            }
            let n = buf.len().min(inbound.len());
            for slot in buf.iter_mut().take(n) {
                *slot = inbound.pop_front().unwrap();
            }
            Ok(ReadResult::Read(n))
        }
    }

    impl WritableByteChannel for MemoryStream {
        fn write(&self, buf: &[u8]) -> Result<usize> {
            self.outbound.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    impl SuspendableRead for MemoryStream {
        fn suspend_reads(&self) {}
        fn resume_reads(&self) {}
        fn is_read_resumed(&self) -> bool {
            true
        }
        fn await_readable(&self, _timeout: Option<Duration>) -> Result<()> {
            Ok(())
        }
        fn read_setter(&self) -> &ListenerSetter<Self> {
            &self.read_setter
        }
    }

    impl SuspendableWrite for MemoryStream {
        fn suspend_writes(&self) {}
        fn resume_writes(&self) {}
        fn is_write_resumed(&self) -> bool {
            true
        }
        fn await_writable(&self, _timeout: Option<Duration>) -> Result<()> {
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

    fn config() -> TlsConfig {
        TlsConfig {
            client_mode: true,
            client_auth: ClientAuthMode::NotRequested,
            session_creation: true,
            enabled_cipher_suites: None,
            enabled_protocols: None,
        }
    }

    #[test]
    fn handshake_runs_during_construction() {
        let engine = MockEngine::new();
        let stream = MemoryStream::new(Vec::new());
        let overlay = SslOverlay::new(stream, engine.clone(), Arc::new(crate::executor::DirectExecutor), &config()).unwrap();
        assert_eq!(overlay.handshake_status(), HandshakeStatus::Finished);
        assert_eq!(engine.handshakes.load(Ordering::SeqCst), 1);
    }

    /// An engine whose `configure` succeeds only when told to, so each
    /// of the two fallible construction steps can be failed in isolation.
    struct FailingEngine {
        configure_ok: bool,
    }

    impl TlsEngine for FailingEngine {
        fn configure(&self, _config: &TlsConfig) -> Result<()> {
            if self.configure_ok {
                Ok(())
            } else {
                Err(Error::Closed)
            }
        }
        fn begin_handshake(&self) -> Result<()> {
            if self.configure_ok {
                Err(Error::Closed)
            } else {
                Ok(())
            }
        }
        fn handshake_status(&self) -> HandshakeStatus {
            HandshakeStatus::NotHandshaking
        }
        fn wrap(&self, _app_plain: &[u8], _net_cipher: &mut Vec<u8>) -> Result<EngineStep> {
            unreachable!("construction fails before any wrap/unwrap call")
        }
        fn unwrap(&self, _net_cipher: &[u8], _app_plain: &mut Vec<u8>) -> Result<EngineStep> {
            unreachable!("construction fails before any wrap/unwrap call")
        }
        fn take_delegated_task(&self) -> Option<Box<dyn FnOnce() + Send>> {
            None
        }
    }

    #[test]
    fn failed_configure_safe_closes_the_inner_channel() {
        let stream = MemoryStream::new(Vec::new());
        let err = SslOverlay::new(
            stream.clone(),
            Arc::new(FailingEngine { configure_ok: false }),
            Arc::new(crate::executor::DirectExecutor),
            &config(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Closed));
        assert!(!stream.is_open());
    }

    #[test]
    fn failed_begin_handshake_safe_closes_the_inner_channel() {
        let stream = MemoryStream::new(Vec::new());
        let err = SslOverlay::new(
            stream.clone(),
            Arc::new(FailingEngine { configure_ok: true }),
            Arc::new(crate::executor::DirectExecutor),
            &config(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Closed));
        assert!(!stream.is_open());
    }

    #[test]
    fn write_then_read_round_trips_through_the_mock_cipher() {
        let stream = MemoryStream::new(Vec::new());
        let overlay = SslOverlay::new(
            stream.clone(),
            MockEngine::new(),
            Arc::new(crate::executor::DirectExecutor),
            &config(),
        )
        .unwrap();

        let n = overlay.write(b"hello").unwrap();
        assert_eq!(n, 5);
        assert_eq!(stream.outbound.lock().len(), 5);
        assert_ne!(&stream.outbound.lock()[..], b"hello");

        // Feed the "ciphertext" the peer would have produced back in as
        // inbound bytes on a fresh overlay and confirm it decrypts.
        let cipher = stream.outbound.lock().clone();
        let inbound_stream = MemoryStream::new(cipher);
        let overlay2 = SslOverlay::new(
            inbound_stream,
            MockEngine::new(),
            Arc::new(crate::executor::DirectExecutor),
            &config(),
        )
        .unwrap();
        let mut buf = [0u8; 16];
        let result = overlay2.read(&mut buf).unwrap();
        assert_eq!(result, ReadResult::Read(5));
        assert_eq!(&buf[..5], b"hello");
    }

    #[test]
    fn closing_overlay_closes_inner_channel() {
        let stream = MemoryStream::new(Vec::new());
        let overlay = SslOverlay::new(
            stream.clone(),
            MockEngine::new(),
            Arc::new(crate::executor::DirectExecutor),
            &config(),
        )
        .unwrap();
        overlay.close().unwrap();
        assert!(!stream.is_open());
    }

    #[test]
    fn intersect_supported_keeps_only_engine_supported_values() {
        let supported = vec!["TLSv1.2".to_string(), "TLSv1.3".to_string()];
        let requested = Some(vec!["TLSv1.0".to_string(), "TLSv1.3".to_string()]);
        let chosen = intersect_supported(&requested, &supported).unwrap();
        assert_eq!(chosen, vec!["TLSv1.3".to_string()]);
    }

    #[test]
    fn intersect_supported_fails_when_nothing_overlaps() {
        let supported = vec!["TLSv1.3".to_string()];
        let requested = Some(vec!["TLSv1.0".to_string()]);
        assert!(intersect_supported(&requested, &supported).is_err());
    }
}
