use std::fmt;
use std::io;
use thiserror::Error;

pub type Result<T, E = PingError> = std::result::Result<T, E>;

/// Which header a checksum belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Ipv4,
    Icmp,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Ipv4 => f.write_str("IPv4"),
            Layer::Icmp => f.write_str("ICMP"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Malformed {
    #[error("reply too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("reply truncated: header claims {total_len} bytes, received {received}")]
    Truncated { total_len: usize, received: usize },

    #[error("invalid IP version: expected 4, got {0}")]
    BadVersion(u8),

    #[error("invalid IP header length: {0} words")]
    BadHeaderLength(u8),
}

#[derive(Error, Debug)]
pub enum PingError {
    #[error("permission denied opening raw socket (root or CAP_NET_RAW required)")]
    PermissionDenied(#[source] io::Error),

    #[error("failed to open raw socket")]
    SocketUnavailable(#[source] io::Error),

    #[error("failed to resolve {host}: {reason}")]
    ResolutionFailure { host: String, reason: String },

    #[error("failed to transmit packet")]
    TransmitFailure(#[source] io::Error),

    #[error("no reply received")]
    NoReply(#[source] io::Error),

    #[error("malformed reply: {0}")]
    MalformedReply(#[from] Malformed),

    #[error("{layer} checksum mismatch: embedded {embedded:#06x}, computed {computed:#06x}")]
    IntegrityFailure {
        layer: Layer,
        embedded: u16,
        computed: u16,
    },

    #[error("datagram of {len} bytes does not fit a single IPv4 packet (max {max})")]
    OversizedDatagram { len: usize, max: usize },
}

impl PingError {
    pub(crate) fn resolution(host: &str, reason: impl fmt::Display) -> PingError {
        PingError::ResolutionFailure {
            host: host.to_string(),
            reason: reason.to_string(),
        }
    }

    /// EPERM/EACCES from `socket(2)` mean the process lacks CAP_NET_RAW.
    pub(crate) fn from_open(err: io::Error) -> PingError {
        match err.kind() {
            io::ErrorKind::PermissionDenied => PingError::PermissionDenied(err),
            _ => PingError::SocketUnavailable(err),
        }
    }
}
