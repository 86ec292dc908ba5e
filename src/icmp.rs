use crate::checksum::checksum;
use zerocopy::byteorder::network_endian;
use zerocopy::IntoBytes;
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const ICMP_HEADER_LEN: usize = 8;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpType {
    EchoReply = 0,
    EchoRequest = 8,
}

/// Fixed part of an ICMP Echo Request/Reply (RFC 792).
#[repr(C)]
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Debug, Clone, Copy)]
pub struct IcmpEchoHeader {
    pub icmp_type: u8,
    pub icmp_code: u8,
    pub checksum: network_endian::U16,
    pub identifier: network_endian::U16,
    pub sequence_number: network_endian::I16,
}

impl IcmpEchoHeader {
    pub fn new(icmp_type: IcmpType, identifier: u16, sequence: i16) -> IcmpEchoHeader {
        IcmpEchoHeader {
            icmp_type: icmp_type as u8,
            icmp_code: 0,
            checksum: 0.into(),
            identifier: identifier.into(),
            sequence_number: sequence.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EchoDatagram {
    pub header: IcmpEchoHeader,
    payload: Vec<u8>,
}

impl EchoDatagram {
    pub fn request(payload: &[u8], identifier: u16, sequence: i16) -> EchoDatagram {
        let header = IcmpEchoHeader::new(IcmpType::EchoRequest, identifier, sequence);
        let mut datagram = EchoDatagram {
            header,
            payload: payload.to_vec(),
        };
        datagram.calculate_checksum();
        datagram
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(ICMP_HEADER_LEN + self.payload.len());
        buffer.extend_from_slice(self.header.as_bytes());
        buffer.extend_from_slice(&self.payload);
        buffer
    }

    fn calculate_checksum(&mut self) {
        self.header.checksum = 0.into();
        self.header.checksum = checksum(&self.to_bytes()).into();
    }
}

/// Type 8, code 0, identifier and sequence in network order, then the
/// payload; checksum spliced into bytes 2..4.
pub fn build_echo_datagram(payload: &[u8], identifier: u16, sequence: i16) -> Vec<u8> {
    EchoDatagram::request(payload, identifier, sequence).to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{verify, ChecksumField};

    #[test]
    fn empty_echo_request() {
        assert_eq!(
            build_echo_datagram(b"", 0, 0),
            vec![0x08, 0x00, 0xF7, 0xFF, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn identifier_and_sequence_are_big_endian() {
        let bytes = build_echo_datagram(b"", 0x1234, -2);
        assert_eq!(&bytes[4..6], &[0x12, 0x34]);
        assert_eq!(&bytes[6..8], &[0xff, 0xfe]);
    }

    #[test]
    fn checksum_covers_payload() {
        let bytes = build_echo_datagram(b"abcdefghijklmnopqrstuvwabcdefghi", 4321, 1);
        assert_eq!(bytes.len(), ICMP_HEADER_LEN + 32);
        assert_eq!(checksum(&bytes), 0);
        let (embedded, computed) = verify(&bytes, ChecksumField::Icmp).unwrap();
        assert_eq!(embedded, computed);
    }

    #[test]
    fn odd_payload_still_validates() {
        let bytes = build_echo_datagram(b"abc", 7, 7);
        let (embedded, computed) = verify(&bytes, ChecksumField::Icmp).unwrap();
        assert_eq!(embedded, computed);
    }
}
