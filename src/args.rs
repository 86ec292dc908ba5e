use clap::{Parser, ValueEnum};
use std::net::Ipv4Addr;

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub(crate) enum ResolverKind {
    #[default]
    System,
    Dns,
}

#[derive(Parser, Debug)]
#[command(version, about = "Send a single ICMP echo request over a raw socket")]
pub(crate) struct Args {
    /// Hostname or IPv4 address
    pub(crate) destination: String,
    #[arg(short = 's', long, default_value = "abcdefghijklmnopqrstuvwabcdefghi")]
    pub(crate) payload: String,
    /// Random when omitted
    #[arg(long)]
    pub(crate) identifier: Option<u16>,
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    pub(crate) sequence: i16,
    /// Give up waiting for a reply after this many seconds
    #[arg(short = 'w', long)]
    pub(crate) deadline: Option<f64>,
    /// Reject replies whose checksums do not match
    #[arg(long)]
    pub(crate) verify: bool,
    /// Accept the first ICMP packet instead of waiting for our echo reply
    #[arg(long)]
    pub(crate) any_reply: bool,
    #[arg(long, value_enum, default_value_t)]
    pub(crate) resolver: ResolverKind,
    /// Implies `--resolver dns`
    #[arg(long)]
    pub(crate) nameserver: Option<Ipv4Addr>,
    /// Build the IPv4 header ourselves and send it without waiting for a reply
    #[arg(long)]
    pub(crate) spoof: bool,
    #[arg(long, default_value_t = Ipv4Addr::LOCALHOST, requires = "spoof")]
    pub(crate) source: Ipv4Addr,
    #[arg(long, default_value_t = 64, requires = "spoof")]
    pub(crate) ttl: u8,
    #[arg(long, default_value_t = 0, requires = "spoof")]
    pub(crate) ip_option: u8,
    #[arg(long, requires = "spoof")]
    pub(crate) legacy_fragment: bool,
    #[arg(short, long)]
    pub(crate) verbose: bool,
}
