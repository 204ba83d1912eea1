//! Option system (the option system).
//!
//! An [`Opt<T>`] is a typed key; an [`OptionMap`] is an immutable mapping
//! from options to typed values built via [`OptionMapBuilder`], which
//! copies the underlying map only when it is actually shared (classic
//! `Arc::make_mut` copy-on-write). Values come in two kinds: single
//! ([`Opt<T>`] for a plain `T`) and ordered-sequence ([`Opt<Sequence<T>>`]
//! for a `Vec<T>`), both parseable from text (`name=value` or
//! `name=v1,v2,v3`).

mod registry;
mod ssl;
mod socket;

pub use ssl::{ClientAuthMode, SSL_CLIENT_AUTH_MODE, SSL_ENABLED_CIPHER_SUITES,
              SSL_ENABLED_PROTOCOLS, SSL_SESSION_CREATION, SSL_USE_CLIENT_MODE};
pub use socket::{BROADCAST, KEEP_ALIVE, LINGER, MULTICAST_TTL, RECEIVE_BUFFER_SIZE,
                 REUSE_ADDRESS, SEND_BUFFER_SIZE, TCP_NODELAY};
pub use registry::parse_into;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Maximum size (in bytes) of an inbound framed message (the framing layer).
pub const MAX_INBOUND_MESSAGE_SIZE: Opt<usize> = Opt::new("max-inbound-message-size");
/// Maximum size (in bytes) of an outbound framed message (the framing layer).
pub const MAX_OUTBOUND_MESSAGE_SIZE: Opt<usize> = Opt::new("max-outbound-message-size");

/// A typed configuration key. Two `Opt<T>`s with the same name and the
/// same `T` are interchangeable; the name is the map's storage key, `T`
/// is only checked at `get`/`set` call sites via the type system.
pub struct Opt<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Opt<T> {
    pub const fn new(name: &'static str) -> Self {
        Opt {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for Opt<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Opt<T> {}

impl<T> fmt::Debug for Opt<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opt({})", self.name)
    }
}

/// An ordered-sequence-valued option's value kind.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sequence<T>(pub Vec<T>);

impl<T> Sequence<T> {
    pub fn new(values: Vec<T>) -> Self {
        Sequence(values)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.0
    }
}

impl<T> FromIterator<T> for Sequence<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Sequence(iter.into_iter().collect())
    }
}

/// Parses a value of `T` from its textual form, used for both scalar and
/// (via the blanket `Sequence<T>` impl) comma-separated sequence values.
pub trait FromOptionStr: Sized {
    fn from_option_str(s: &str) -> Result<Self>;
}

impl FromOptionStr for bool {
    fn from_option_str(s: &str) -> Result<Self> {
        match s {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(Error::unsupported_option(format!("not a bool: {other}"))),
        }
    }
}

impl FromOptionStr for usize {
    fn from_option_str(s: &str) -> Result<Self> {
        s.parse()
            .map_err(|_| Error::unsupported_option(format!("not an integer: {s}")))
    }
}

impl FromOptionStr for u8 {
    fn from_option_str(s: &str) -> Result<Self> {
        s.parse()
            .map_err(|_| Error::unsupported_option(format!("not a byte value: {s}")))
    }
}

impl FromOptionStr for String {
    fn from_option_str(s: &str) -> Result<Self> {
        Ok(s.to_string())
    }
}

impl<T: FromOptionStr> FromOptionStr for Sequence<T> {
    fn from_option_str(s: &str) -> Result<Self> {
        s.split(',')
            .map(|part| T::from_option_str(part.trim()))
            .collect::<Result<Vec<T>>>()
            .map(Sequence)
    }
}

/// An immutable map from options to typed values.
#[derive(Default, Clone)]
pub struct OptionMap {
    values: Arc<HashMap<&'static str, Arc<dyn Any + Send + Sync>>>,
}

impl fmt::Debug for OptionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionMap")
            .field("len", &self.values.len())
            .finish()
    }
}

impl OptionMap {
    pub fn builder() -> OptionMapBuilder {
        OptionMapBuilder::new()
    }

    /// Returns the value for `opt`, or `default` if unset or stored under
    /// a different type than `T` (which can only happen if two distinct
    /// `Opt<T>`/`Opt<U>` share a name, a caller bug; we fail soft here
    /// rather than panic since this is a read path).
    pub fn get<T: Clone + Send + Sync + 'static>(&self, opt: &Opt<T>, default: T) -> T {
        self.values
            .get(opt.name())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
            .unwrap_or(default)
    }

    pub fn get_opt<T: Clone + Send + Sync + 'static>(&self, opt: &Opt<T>) -> Option<T> {
        self.values
            .get(opt.name())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    pub fn contains<T>(&self, opt: &Opt<T>) -> bool {
        self.values.contains_key(opt.name())
    }

    pub fn to_builder(&self) -> OptionMapBuilder {
        OptionMapBuilder {
            values: self.values.clone(),
        }
    }
}

/// Builds an [`OptionMap`] by appending or replacing entries. Cloning a
/// builder (or deriving one via [`OptionMap::to_builder`]) is cheap; the
/// backing map is only actually copied by [`set`](Self::set) when it is
/// shared with another builder or a built `OptionMap` (copy-on-write via
/// `Arc::make_mut`).
#[derive(Default, Clone)]
pub struct OptionMapBuilder {
    values: Arc<HashMap<&'static str, Arc<dyn Any + Send + Sync>>>,
}

impl OptionMapBuilder {
    pub fn new() -> Self {
        OptionMapBuilder {
            values: Arc::new(HashMap::new()),
        }
    }

    pub fn set<T: Send + Sync + 'static>(mut self, opt: &Opt<T>, value: T) -> Self {
        Arc::make_mut(&mut self.values).insert(opt.name(), Arc::new(value));
        self
    }

    /// Parses `text` as `T` and sets it, used by the textual
    /// `name=value`/`name=v1,v2,v3` form. Unknown option names are
    /// the caller's concern (see [`parse_into`] for the name-driven
    /// entry point that fails with [`Error::UnsupportedOption`]).
    pub fn set_from_str<T: FromOptionStr + Send + Sync + 'static>(
        self,
        opt: &Opt<T>,
        text: &str,
    ) -> Result<Self> {
        let value = T::from_option_str(text)?;
        Ok(self.set(opt, value))
    }

    pub fn build(self) -> OptionMap {
        OptionMap {
            values: self.values,
        }
    }
}

impl fmt::Debug for OptionMapBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionMapBuilder")
            .field("len", &self.values.len())
            .finish()
    }
}
