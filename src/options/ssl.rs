//! SSL-related options consumed by the SSL layer.

use super::{FromOptionStr, Opt, Sequence};
use crate::error::{Error, Result};

/// Client-certificate requirements for a server-mode SSL overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuthMode {
    NotRequested,
    Requested,
    Required,
}

impl FromOptionStr for ClientAuthMode {
    fn from_option_str(s: &str) -> Result<Self> {
        match s {
            "NOT_REQUESTED" => Ok(ClientAuthMode::NotRequested),
            "REQUESTED" => Ok(ClientAuthMode::Requested),
            "REQUIRED" => Ok(ClientAuthMode::Required),
            other => Err(Error::unsupported_option(format!(
                "not a client-auth mode: {other}"
            ))),
        }
    }
}

pub const SSL_CLIENT_AUTH_MODE: Opt<ClientAuthMode> = Opt::new("ssl-client-auth-mode");
pub const SSL_USE_CLIENT_MODE: Opt<bool> = Opt::new("ssl-use-client-mode");
pub const SSL_SESSION_CREATION: Opt<bool> = Opt::new("ssl-session-creation");
pub const SSL_ENABLED_CIPHER_SUITES: Opt<Sequence<String>> = Opt::new("ssl-enabled-cipher-suites");
pub const SSL_ENABLED_PROTOCOLS: Opt<Sequence<String>> = Opt::new("ssl-enabled-protocols");
