use crate::checksum::{verify, ChecksumField};
use crate::error::{Layer, Malformed, PingError, Result};
use crate::icmp::{IcmpEchoHeader, IcmpType, ICMP_HEADER_LEN};
use crate::packet::{Ipv4Header, IPV4_HEADER_LEN};
use std::fmt;
use std::net::Ipv4Addr;
use zerocopy::FromBytes;

pub const MIN_REPLY_LEN: usize = IPV4_HEADER_LEN + ICMP_HEADER_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Fields {
    pub version: u8,
    pub ihl: u8,
    pub type_of_service: u8,
    pub total_length: u16,
    pub identification: u16,
    pub flags: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

impl Ipv4Fields {
    /// Field name and display value, in header order.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Version", self.version.to_string()),
            ("IHL", self.ihl.to_string()),
            ("Type of service", self.type_of_service.to_string()),
            ("Total Length", self.total_length.to_string()),
            ("ID", self.identification.to_string()),
            ("Flags", self.flags.to_string()),
            ("TTL", self.ttl.to_string()),
            ("Protocol", self.protocol.to_string()),
            ("Checksum", format!("{:#x}", self.checksum)),
            ("Source IP", self.source.to_string()),
            ("Destination IP", self.destination.to_string()),
        ]
    }
}

impl From<&Ipv4Header> for Ipv4Fields {
    fn from(header: &Ipv4Header) -> Self {
        Ipv4Fields {
            version: header.version(),
            ihl: header.ihl(),
            type_of_service: header.type_of_service,
            total_length: header.total_len.get(),
            identification: header.identification.get(),
            flags: header.flags_frag_offset.get(),
            ttl: header.ttl,
            protocol: header.protocol,
            checksum: header.checksum.get(),
            source: header.source(),
            destination: header.destination(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpFields {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence: i16,
}

impl IcmpFields {
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Type", self.icmp_type.to_string()),
            ("Code", self.code.to_string()),
            ("Checksum", format!("{:#x}", self.checksum)),
            ("Identifier", self.identifier.to_string()),
            ("Number", self.sequence.to_string()),
        ]
    }

    pub fn is_echo_reply_for(&self, identifier: u16) -> bool {
        self.icmp_type == IcmpType::EchoReply as u8
            && self.code == 0
            && self.identifier == identifier
    }
}

impl From<&IcmpEchoHeader> for IcmpFields {
    fn from(header: &IcmpEchoHeader) -> Self {
        IcmpFields {
            icmp_type: header.icmp_type,
            code: header.icmp_code,
            checksum: header.checksum.get(),
            identifier: header.identifier.get(),
            sequence: header.sequence_number.get(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedReply {
    pub ip: Ipv4Fields,
    pub icmp: IcmpFields,
}

fn write_fields(f: &mut fmt::Formatter<'_>, fields: &[(&'static str, String)]) -> fmt::Result {
    let mut first = true;
    for (name, value) in fields {
        if !first {
            f.write_str(", ")?;
        }
        first = false;
        write!(f, "{name}: {value}")?;
    }
    Ok(())
}

impl fmt::Display for DecodedReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IP {")?;
        write_fields(f, &self.ip.fields())?;
        f.write_str("} ICMP {")?;
        write_fields(f, &self.icmp.fields())?;
        f.write_str("}")
    }
}

fn ip_header(bytes: &[u8]) -> Result<Ipv4Header> {
    if bytes.len() < MIN_REPLY_LEN {
        return Err(Malformed::TooShort {
            expected: MIN_REPLY_LEN,
            actual: bytes.len(),
        }
        .into());
    }
    let (header, _) = Ipv4Header::read_from_prefix(bytes).map_err(|_| Malformed::TooShort {
        expected: IPV4_HEADER_LEN,
        actual: bytes.len(),
    })?;
    if header.version() != 4 {
        return Err(Malformed::BadVersion(header.version()).into());
    }
    if header.ihl() < 5 {
        return Err(Malformed::BadHeaderLength(header.ihl()).into());
    }
    let needed = header.header_len() + ICMP_HEADER_LEN;
    if bytes.len() < needed {
        return Err(Malformed::TooShort {
            expected: needed,
            actual: bytes.len(),
        }
        .into());
    }
    Ok(header)
}

/// Parses the IPv4 header and the ICMP echo header that follows it. The
/// checksums are reported as received; see [`verify_reply`].
pub fn decode_reply(bytes: &[u8]) -> Result<DecodedReply> {
    let header = ip_header(bytes)?;
    let (icmp, _) = IcmpEchoHeader::read_from_prefix(&bytes[header.header_len()..])
        .map_err(|_| Malformed::TooShort {
            expected: header.header_len() + ICMP_HEADER_LEN,
            actual: bytes.len(),
        })?;
    Ok(DecodedReply {
        ip: Ipv4Fields::from(&header),
        icmp: IcmpFields::from(&icmp),
    })
}

/// Recomputes both checksums of a received packet. A packet cut short by the
/// receive buffer cannot be checked and is reported as truncated.
pub fn verify_reply(bytes: &[u8]) -> Result<()> {
    let header = ip_header(bytes)?;
    let header_len = header.header_len();
    let total_len = header.total_len.get() as usize;
    if total_len > bytes.len() {
        return Err(Malformed::Truncated {
            total_len,
            received: bytes.len(),
        }
        .into());
    }
    let end = total_len.max(header_len + ICMP_HEADER_LEN);

    let checks = [
        (Layer::Ipv4, &bytes[..header_len], ChecksumField::Ip),
        (Layer::Icmp, &bytes[header_len..end], ChecksumField::Icmp),
    ];
    for (layer, region, field) in checks {
        if let Some((embedded, computed)) = verify(region, field) {
            if embedded != computed {
                return Err(PingError::IntegrityFailure {
                    layer,
                    embedded,
                    computed,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icmp::build_echo_datagram;
    use crate::packet::{build_packet, PacketOptions};

    fn sample() -> Vec<u8> {
        let datagram = build_echo_datagram(b"ping", 0x0102, -1);
        let options = PacketOptions {
            source: Ipv4Addr::new(192, 0, 2, 7),
            destination: Ipv4Addr::new(198, 51, 100, 9),
            ..PacketOptions::default()
        };
        build_packet(&datagram, 0x0102, &options).unwrap()
    }

    #[test]
    fn round_trip_through_builder() {
        let reply = decode_reply(&sample()).unwrap();
        assert_eq!(reply.ip.version, 4);
        assert_eq!(reply.ip.ihl, 5);
        assert_eq!(reply.ip.total_length, 32);
        assert_eq!(reply.ip.source.to_string(), "192.0.2.7");
        assert_eq!(reply.ip.destination.to_string(), "198.51.100.9");
        assert_eq!(reply.icmp.icmp_type, 8);
        assert_eq!(reply.icmp.identifier, 0x0102);
        assert_eq!(reply.icmp.sequence, -1);
    }

    #[test]
    fn checksums_render_as_hex() {
        let reply = decode_reply(&sample()).unwrap();
        let ip = reply.ip.fields();
        let checksum = &ip.iter().find(|(name, _)| *name == "Checksum").unwrap().1;
        assert!(checksum.starts_with("0x"));
        assert_eq!(reply.icmp.fields()[0], ("Type", "8".to_string()));
    }

    #[test]
    fn short_buffer_is_malformed() {
        for len in [0, 1, 19, 20, 27] {
            let err = decode_reply(&sample()[..len]).unwrap_err();
            assert!(matches!(
                err,
                PingError::MalformedReply(Malformed::TooShort { expected: 28, .. })
            ));
        }
    }

    #[test]
    fn wrong_version_is_malformed() {
        let mut bytes = sample();
        bytes[0] = 0x65;
        assert!(matches!(
            decode_reply(&bytes),
            Err(PingError::MalformedReply(Malformed::BadVersion(6)))
        ));
    }

    #[test]
    fn options_shift_icmp_header() {
        let datagram = build_echo_datagram(b"", 9, 9);
        let options = PacketOptions {
            ip_option: 7,
            ..PacketOptions::default()
        };
        let packet = build_packet(&datagram, 9, &options).unwrap();
        let reply = decode_reply(&packet).unwrap();
        assert_eq!(reply.ip.ihl, 6);
        assert_eq!(reply.icmp.identifier, 9);

        assert!(matches!(
            decode_reply(&packet[..30]),
            Err(PingError::MalformedReply(Malformed::TooShort { expected: 32, .. }))
        ));
    }

    #[test]
    fn decoding_ignores_bad_checksum() {
        let mut bytes = sample();
        bytes[22] ^= 0xff;
        assert!(decode_reply(&bytes).is_ok());
        assert!(matches!(
            verify_reply(&bytes),
            Err(PingError::IntegrityFailure {
                layer: Layer::Icmp,
                ..
            })
        ));
    }

    #[test]
    fn only_echo_replies_with_our_identifier_match() {
        let request = decode_reply(&sample()).unwrap();
        assert!(!request.icmp.is_echo_reply_for(0x0102));

        let mut reply = request.icmp.clone();
        reply.icmp_type = 0;
        assert!(reply.is_echo_reply_for(0x0102));
        assert!(!reply.is_echo_reply_for(0x0103));
        reply.code = 1;
        assert!(!reply.is_echo_reply_for(0x0102));
    }

    #[test]
    fn verify_rejects_truncated_reply() {
        let datagram = build_echo_datagram(&[0x5a; 1500], 0x1111, 1);
        let packet = build_packet(&datagram, 0x1111, &PacketOptions::default()).unwrap();
        let cut = &packet[..1024];
        assert!(decode_reply(cut).is_ok());
        assert!(matches!(
            verify_reply(cut),
            Err(PingError::MalformedReply(Malformed::Truncated {
                total_len: 1528,
                received: 1024,
            }))
        ));
        verify_reply(&packet).unwrap();
    }

    #[test]
    fn verify_accepts_built_packet() {
        verify_reply(&sample()).unwrap();
    }

    #[test]
    fn verify_flags_ip_header() {
        let mut bytes = sample();
        bytes[8] = 1;
        assert!(matches!(
            verify_reply(&bytes),
            Err(PingError::IntegrityFailure {
                layer: Layer::Ipv4,
                ..
            })
        ));
    }
}
