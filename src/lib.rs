//! ICMP Echo over raw IPv4 sockets: header construction per RFC 791/792,
//! the Internet checksum, transmission and reply decoding.

pub mod checksum;
pub mod decode;
pub mod dns;
pub mod error;
pub mod icmp;
pub mod packet;
pub mod ping;

pub use checksum::{checksum, zero_checksum_field, ChecksumField};
pub use decode::{decode_reply, verify_reply, DecodedReply, IcmpFields, Ipv4Fields};
pub use dns::{DnsResolver, Resolve, SystemResolver};
pub use error::{Layer, Malformed, PingError, Result};
pub use icmp::build_echo_datagram;
pub use packet::{build_packet, FragmentField, PacketOptions};
pub use ping::{send_raw, spawn_ping, PingConfig, PingResult, Pinger};

/// One echo exchange with the default configuration: system resolver, no
/// deadline, 1024-byte receive buffer.
pub fn ping(
    destination: &str,
    payload: &[u8],
    identifier: u16,
    sequence: i16,
) -> Result<PingResult> {
    Pinger::default().ping(destination, payload, identifier, sequence)
}

/// Echo request wrapped in a caller-controlled IPv4 header, ready for
/// [`send_raw`].
pub fn build_spoofed_packet(
    payload: &[u8],
    identifier: u16,
    sequence: i16,
    options: &PacketOptions,
) -> Result<Vec<u8>> {
    let datagram = build_echo_datagram(payload, identifier, sequence);
    build_packet(&datagram, identifier, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn spoofed_packet_decodes() {
        let options = PacketOptions {
            source: Ipv4Addr::new(10, 1, 2, 3),
            destination: Ipv4Addr::new(10, 3, 2, 1),
            ttl: 5,
            ..PacketOptions::default()
        };
        let packet = build_spoofed_packet(b"abcdefghijklmnopqrstuvwabcdefghi", 777, 1, &options)
            .unwrap();
        assert_eq!(packet.len(), 20 + 8 + 32);
        let reply = decode_reply(&packet).unwrap();
        assert_eq!(reply.ip.ttl, 5);
        assert_eq!(reply.ip.source, Ipv4Addr::new(10, 1, 2, 3));
        assert_eq!(reply.ip.identification, 777);
        assert_eq!(reply.icmp.identifier, 777);
        assert_eq!(reply.icmp.sequence, 1);
        verify_reply(&packet).unwrap();
    }
}
