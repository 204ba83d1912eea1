//! Name-driven textual option parsing (`name=value` / `name=v1,v2,v3`).
//!
//! [`OptionMapBuilder::set_from_str`] is used when the call site already
//! knows an option's type. [`parse_into`] is the counterpart for purely
//! textual configuration (e.g. a config file of `name=value` lines)
//! where the name arrives as a runtime string; it dispatches to the
//! right typed parser and fails with [`Error::UnsupportedOption`] for
//! any name it doesn't recognize.

use super::{
    OptionMapBuilder, BROADCAST, KEEP_ALIVE, LINGER, MULTICAST_TTL, RECEIVE_BUFFER_SIZE,
    REUSE_ADDRESS, SEND_BUFFER_SIZE, SSL_CLIENT_AUTH_MODE, SSL_ENABLED_CIPHER_SUITES,
    SSL_ENABLED_PROTOCOLS, SSL_SESSION_CREATION, SSL_USE_CLIENT_MODE, TCP_NODELAY,
};
use crate::error::{Error, Result};
use crate::options::{MAX_INBOUND_MESSAGE_SIZE, MAX_OUTBOUND_MESSAGE_SIZE};

/// Parses a single `name=value` (or `name=v1,v2,v3`) entry into `builder`.
/// Returns [`Error::UnsupportedOption`] for any name not in the table
/// below -- this is the single place that table is enumerated.
pub fn parse_into(builder: OptionMapBuilder, name: &str, value: &str) -> Result<OptionMapBuilder> {
    match name {
        "max-inbound-message-size" => builder.set_from_str(&MAX_INBOUND_MESSAGE_SIZE, value),
        "max-outbound-message-size" => builder.set_from_str(&MAX_OUTBOUND_MESSAGE_SIZE, value),
        "ssl-client-auth-mode" => builder.set_from_str(&SSL_CLIENT_AUTH_MODE, value),
        "ssl-use-client-mode" => builder.set_from_str(&SSL_USE_CLIENT_MODE, value),
        "ssl-session-creation" => builder.set_from_str(&SSL_SESSION_CREATION, value),
        "ssl-enabled-cipher-suites" => builder.set_from_str(&SSL_ENABLED_CIPHER_SUITES, value),
        "ssl-enabled-protocols" => builder.set_from_str(&SSL_ENABLED_PROTOCOLS, value),
        "keep-alive" => builder.set_from_str(&KEEP_ALIVE, value),
        "tcp-nodelay" => builder.set_from_str(&TCP_NODELAY, value),
        "linger" => builder.set_from_str(&LINGER, value),
        "receive-buffer-size" => builder.set_from_str(&RECEIVE_BUFFER_SIZE, value),
        "send-buffer-size" => builder.set_from_str(&SEND_BUFFER_SIZE, value),
        "reuse-address" => builder.set_from_str(&REUSE_ADDRESS, value),
        "broadcast" => builder.set_from_str(&BROADCAST, value),
        "multicast-ttl" => builder.set_from_str(&MULTICAST_TTL, value),
        other => Err(Error::unsupported_option(other)),
    }
}

/// Parses a full `name=value` line, splitting on the first `=`.
pub fn parse_line(builder: OptionMapBuilder, line: &str) -> Result<OptionMapBuilder> {
    let (name, value) = line
        .split_once('=')
        .ok_or_else(|| Error::unsupported_option(line))?;
    parse_into(builder, name.trim(), value.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionMap;

    #[test]
    fn unknown_name_is_unsupported() {
        let err = parse_line(OptionMap::builder(), "not-a-real-option=1").unwrap_err();
        assert!(matches!(err, Error::UnsupportedOption(_)));
    }

    #[test]
    fn known_scalar_and_sequence_names_parse() {
        let map = parse_line(OptionMap::builder(), "tcp-nodelay=true")
            .and_then(|b| parse_line(b, "ssl-enabled-protocols=TLSv1.2,TLSv1.3"))
            .unwrap()
            .build();
        assert!(map.get(&TCP_NODELAY, false));
        assert_eq!(
            map.get_opt(&SSL_ENABLED_PROTOCOLS).unwrap().as_slice(),
            &["TLSv1.2".to_string(), "TLSv1.3".to_string()]
        );
    }
}
