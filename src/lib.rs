//! `nbio`: a portable, readiness-based non-blocking I/O framework.
//!
//! This crate is the core abstraction layer described in its design
//! notes -- not a selector implementation, not a protocol parser, not a
//! connection pool. It covers exactly three tightly coupled subsystems:
//!
//! 1. [`future`]: a thread-safe asynchronous-result object (single-
//!    assignment future) with synchronous/interruptible waits, composable
//!    notifiers, chaining/casting, and cooperative cancellation.
//! 2. [`channel`] + [`listener`] + [`blocking`]: readiness-based stream
//!    and message channel contracts, the listener-setter binding pattern,
//!    and the blocking adapter that turns readiness into bounded blocking
//!    calls with per-direction timeouts.
//! 3. [`options`] + [`framing`]: a typed, copy-on-write option map used to
//!    configure channels uniformly, and the length-framed message overlay
//!    that turns a byte-stream channel pair into a message channel pair.
//!
//! Everything else in the tree ([`buffer`], [`connect`], [`executor`],
//! [`net`], [`reactor`], [`ssl`]) is ambient stack or external-collaborator
//! glue the core is built against, not the core itself: the selector/event
//! loop, the TCP/UDP socket providers, the SSL engine, thread pools and
//! buffer allocation are all treated as pluggable collaborators behind
//! small traits, per the scope note that they are consumed, not specified,
//! by this crate.
#![deny(unsafe_op_in_unsafe_fn)]

pub mod blocking;
pub mod buffer;
pub mod channel;
pub mod connect;
pub mod error;
pub mod executor;
pub mod framing;
pub mod future;
pub mod listener;
pub mod options;

#[cfg(feature = "os-poll")]
pub mod reactor;

#[cfg(feature = "net")]
pub mod net;

#[cfg(feature = "ssl")]
pub mod ssl;

pub use blocking::BlockingByteChannel;
pub use error::{Error, Result};
pub use future::{done, failed, pair, Future, FutureResult, Status};
pub use options::{Opt, OptionMap, OptionMapBuilder, Sequence};
