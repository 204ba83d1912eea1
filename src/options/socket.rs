//! Socket-level options consumed by the net adapters.

use super::{FromOptionStr, Opt};
use crate::error::{Error, Result};

pub const KEEP_ALIVE: Opt<bool> = Opt::new("keep-alive");
pub const TCP_NODELAY: Opt<bool> = Opt::new("tcp-nodelay");
/// `None` means "linger disabled"; `Some(secs)` sets `SO_LINGER` to that
/// many seconds.
pub const LINGER: Opt<Option<u32>> = Opt::new("linger");
pub const RECEIVE_BUFFER_SIZE: Opt<usize> = Opt::new("receive-buffer-size");
pub const SEND_BUFFER_SIZE: Opt<usize> = Opt::new("send-buffer-size");
pub const REUSE_ADDRESS: Opt<bool> = Opt::new("reuse-address");
pub const BROADCAST: Opt<bool> = Opt::new("broadcast");
pub const MULTICAST_TTL: Opt<u8> = Opt::new("multicast-ttl");

impl FromOptionStr for Option<u32> {
    fn from_option_str(s: &str) -> Result<Self> {
        match s {
            "off" | "none" | "disabled" => Ok(None),
            other => other
                .parse::<u32>()
                .map(Some)
                .map_err(|_| Error::unsupported_option(format!("not a linger value: {other}"))),
        }
    }
}
