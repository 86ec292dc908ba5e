use crate::checksum::checksum;
use crate::error::{PingError, Result};
use std::net::Ipv4Addr;
use zerocopy::byteorder::network_endian;
use zerocopy::IntoBytes;
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const IPV4_HEADER_LEN: usize = 20;
pub const IPPROTO_ICMP: u8 = 1;
const LEGACY_FRAGMENT_UNIT: usize = 1416;

/// Fixed 20-byte IPv4 header (RFC 791 section 3.1).
#[repr(C)]
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Debug, Clone, Copy)]
pub struct Ipv4Header {
    pub version_ihl: u8,
    pub type_of_service: u8,
    pub total_len: network_endian::U16,
    pub identification: network_endian::U16,
    pub flags_frag_offset: network_endian::U16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: network_endian::U16,
    pub source_address: [u8; 4],
    pub destination_address: [u8; 4],
}

impl Ipv4Header {
    pub fn version(&self) -> u8 {
        self.version_ihl >> 4
    }

    /// Header length in 32-bit words.
    pub fn ihl(&self) -> u8 {
        self.version_ihl & 0x0f
    }

    pub fn header_len(&self) -> usize {
        self.ihl() as usize * 4
    }

    pub fn source(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.source_address)
    }

    pub fn destination(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.destination_address)
    }
}

/// How the flags/fragment-offset word is filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FragmentField {
    /// Zero; the packet must fit without fragmentation.
    #[default]
    SingleFragment,
    /// `1416 * (len / 1416) / 8`, as the legacy sender wrote it.
    LegacyEstimate,
}

#[derive(Debug, Clone)]
pub struct PacketOptions {
    pub ttl: u8,
    pub protocol: u8,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    /// Single option byte; 0 means no options.
    pub ip_option: u8,
    pub fragment: FragmentField,
}

impl Default for PacketOptions {
    fn default() -> Self {
        PacketOptions {
            ttl: 64,
            protocol: IPPROTO_ICMP,
            source: Ipv4Addr::LOCALHOST,
            destination: Ipv4Addr::LOCALHOST,
            ip_option: 0,
            fragment: FragmentField::default(),
        }
    }
}

impl FragmentField {
    fn encode(self, datagram_len: usize) -> u16 {
        match self {
            FragmentField::SingleFragment => 0,
            FragmentField::LegacyEstimate => {
                (LEGACY_FRAGMENT_UNIT * (datagram_len / LEGACY_FRAGMENT_UNIT) / 8) as u16
            }
        }
    }
}

/// Option byte followed by zero padding up to the next 32-bit boundary.
fn encode_options(ip_option: u8) -> Vec<u8> {
    if ip_option == 0 {
        return Vec::new();
    }
    let mut options = vec![ip_option];
    options.resize(options.len().next_multiple_of(4), 0);
    options
}

/// Prepends an IPv4 header to `datagram`. Returns `header || datagram`.
pub fn build_packet(
    datagram: &[u8],
    identifier: u16,
    options: &PacketOptions,
) -> Result<Vec<u8>> {
    let ip_options = encode_options(options.ip_option);
    let header_len = IPV4_HEADER_LEN + ip_options.len();
    let total_len = header_len + datagram.len();
    if total_len > u16::MAX as usize {
        return Err(PingError::OversizedDatagram {
            len: datagram.len(),
            max: u16::MAX as usize - header_len,
        });
    }

    let header = Ipv4Header {
        version_ihl: (4 << 4) | (header_len / 4) as u8,
        type_of_service: 0,
        total_len: (total_len as u16).into(),
        identification: identifier.into(),
        flags_frag_offset: options.fragment.encode(datagram.len()).into(),
        ttl: options.ttl,
        protocol: options.protocol,
        checksum: 0.into(),
        source_address: options.source.octets(),
        destination_address: options.destination.octets(),
    };

    let mut packet = Vec::with_capacity(total_len);
    packet.extend_from_slice(header.as_bytes());
    packet.extend_from_slice(&ip_options);
    let header_checksum = checksum(&packet);
    packet[10..12].copy_from_slice(&header_checksum.to_be_bytes());
    packet.extend_from_slice(datagram);
    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{verify, ChecksumField};
    use crate::icmp::build_echo_datagram;

    #[test]
    fn default_packet_layout() {
        let datagram = build_echo_datagram(b"", 0, 0);
        let packet = build_packet(&datagram, 0, &PacketOptions::default()).unwrap();
        assert_eq!(packet.len(), 28);
        assert_eq!(&packet[0..2], &[0x45, 0x00]);
        assert_eq!(&packet[2..4], &[0x00, 0x1C]);
        assert_eq!(packet[8], 64);
        assert_eq!(packet[9], 1);
        assert_eq!(&packet[12..16], &[127, 0, 0, 1]);
        assert_eq!(&packet[16..20], &[127, 0, 0, 1]);
        assert_eq!(&packet[20..], datagram.as_slice());
    }

    #[test]
    fn header_checksum_is_valid() {
        let datagram = build_echo_datagram(b"hello", 0xbeef, 3);
        let options = PacketOptions {
            source: Ipv4Addr::new(10, 0, 0, 1),
            destination: Ipv4Addr::new(192, 168, 1, 20),
            ..PacketOptions::default()
        };
        let packet = build_packet(&datagram, 0xbeef, &options).unwrap();
        assert_eq!(checksum(&packet[..IPV4_HEADER_LEN]), 0);
        let (embedded, computed) = verify(&packet[..IPV4_HEADER_LEN], ChecksumField::Ip).unwrap();
        assert_eq!(embedded, computed);
        assert_eq!(&packet[4..6], &[0xbe, 0xef]);
    }

    #[test]
    fn options_extend_header() {
        let datagram = build_echo_datagram(b"", 1, 1);
        let options = PacketOptions {
            ip_option: 0x01,
            ..PacketOptions::default()
        };
        let packet = build_packet(&datagram, 1, &options).unwrap();
        assert_eq!(packet.len(), 24 + 8);
        assert_eq!(packet[0], 0x46);
        assert_eq!(u16::from_be_bytes([packet[2], packet[3]]), 32);
        assert_eq!(&packet[20..24], &[0x01, 0, 0, 0]);
        assert_eq!(checksum(&packet[..24]), 0);
        assert_eq!(&packet[24..], datagram.as_slice());
    }

    #[test]
    fn legacy_fragment_estimate() {
        let datagram = vec![0u8; 1416];
        let options = PacketOptions {
            fragment: FragmentField::LegacyEstimate,
            ..PacketOptions::default()
        };
        let packet = build_packet(&datagram, 0, &options).unwrap();
        assert_eq!(u16::from_be_bytes([packet[6], packet[7]]), 177);

        let small = build_packet(&[0u8; 100], 0, &options).unwrap();
        assert_eq!(&small[6..8], &[0, 0]);
    }

    #[test]
    fn oversized_datagram_rejected() {
        let datagram = vec![0u8; u16::MAX as usize];
        let err = build_packet(&datagram, 0, &PacketOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            PingError::OversizedDatagram { max: 65515, .. }
        ));

        let legacy = PacketOptions {
            fragment: FragmentField::LegacyEstimate,
            ..PacketOptions::default()
        };
        let err = build_packet(&[0u8; 70_000], 0, &legacy).unwrap_err();
        assert!(matches!(
            err,
            PingError::OversizedDatagram {
                len: 70_000,
                max: 65515
            }
        ));

        let largest = build_packet(&[0u8; 65515], 0, &legacy).unwrap();
        assert_eq!(&largest[2..4], &[0xff, 0xff]);
    }
}
