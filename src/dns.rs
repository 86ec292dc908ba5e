use crate::error::{PingError, Result};
use log::{debug, trace};
use rand::Rng;
use std::fs;
use std::io;
use std::mem::size_of;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;
use zerocopy::byteorder::network_endian::{U16, U32};
use zerocopy::{FromBytes, IntoBytes};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout};

const DNS_PORT: u16 = 53;
const QUERY_TIMEOUT: Duration = Duration::from_secs(3);
const TYPE_A: u16 = 1;
const CLASS_IN: u16 = 1;
const POINTER_MASK: u8 = 0xc0;
const MAX_POINTER_HOPS: usize = 16;
const MAX_LABEL_LEN: usize = 63;

/// Turns a hostname or dotted-quad literal into an IPv4 address.
pub trait Resolve: Send + Sync {
    fn resolve(&self, host: &str) -> Result<Ipv4Addr>;
}

/// Uses the operating system resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl Resolve for SystemResolver {
    fn resolve(&self, host: &str) -> Result<Ipv4Addr> {
        if let Ok(addr) = host.parse() {
            return Ok(addr);
        }
        let addrs = (host, 0)
            .to_socket_addrs()
            .map_err(|e| PingError::resolution(host, e))?;
        addrs
            .filter_map(|addr| match addr.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .next()
            .ok_or_else(|| PingError::resolution(host, "no IPv4 address"))
    }
}

/// Sends its own A query over UDP.
#[derive(Debug, Default, Clone)]
pub struct DnsResolver {
    /// Falls back to the first `nameserver` in `/etc/resolv.conf`.
    pub nameserver: Option<Ipv4Addr>,
}

impl Resolve for DnsResolver {
    fn resolve(&self, host: &str) -> Result<Ipv4Addr> {
        if let Ok(addr) = host.parse() {
            return Ok(addr);
        }
        let server = match self.nameserver {
            Some(server) => server,
            None => get_dns_server().map_err(|e| PingError::resolution(host, e))?,
        };
        let response = dns_query(host, server).map_err(|e| PingError::resolution(host, e))?;
        response
            .first_a_record()
            .ok_or_else(|| PingError::resolution(host, "no A record in response"))
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, Immutable, KnownLayout)]
struct DnsHeader {
    id: U16,
    flags: U16,
    questions: U16,
    answer_rr: U16,
    authority_rr: U16,
    additional_rr: U16,
}

impl DnsHeader {
    fn new_query(id: u16) -> DnsHeader {
        DnsHeader {
            id: id.into(),
            // standard query, recursion desired
            flags: 0x0100.into(),
            questions: 1.into(),
            answer_rr: 0.into(),
            authority_rr: 0.into(),
            additional_rr: 0.into(),
        }
    }
}

/// Type, class, TTL and data length of a resource record.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, Immutable, KnownLayout)]
struct RecordFields {
    rtype: U16,
    rclass: U16,
    ttl: U32,
    data_len: U16,
}

/// Labels must be 1..=63 bytes (RFC 1035 section 2.3.4).
fn encode_domain_name(domain: &str) -> io::Result<Vec<u8>> {
    let mut encoded = Vec::with_capacity(domain.len() + 2);
    for part in domain.strip_suffix('.').unwrap_or(domain).split('.') {
        let len = match part.len() {
            0 => return Err(invalid("empty label in domain name")),
            len @ 1..=MAX_LABEL_LEN => len as u8,
            _ => return Err(invalid("label longer than 63 bytes")),
        };
        encoded.push(len);
        encoded.extend_from_slice(part.as_bytes());
    }
    encoded.push(0);
    Ok(encoded)
}

fn build_query(id: u16, domain: &str) -> io::Result<Vec<u8>> {
    let mut buffer = DnsHeader::new_query(id).as_bytes().to_vec();
    buffer.extend(encode_domain_name(domain)?);
    buffer.extend_from_slice(&TYPE_A.to_be_bytes());
    buffer.extend_from_slice(&CLASS_IN.to_be_bytes());
    Ok(buffer)
}

/// Offset just past the name starting at `offset`.
fn skip_name(buffer: &[u8], mut offset: usize) -> Option<usize> {
    loop {
        let len = *buffer.get(offset)?;
        if len == 0 {
            return Some(offset + 1);
        }
        if len & POINTER_MASK == POINTER_MASK {
            buffer.get(offset + 1)?;
            return Some(offset + 2);
        }
        offset += 1 + len as usize;
    }
}

/// Reads a possibly compressed name.
fn read_name(buffer: &[u8], mut offset: usize) -> Option<String> {
    let mut labels = Vec::new();
    let mut hops = 0;
    loop {
        let len = *buffer.get(offset)?;
        if len == 0 {
            return Some(labels.join("."));
        }
        if len & POINTER_MASK == POINTER_MASK {
            hops += 1;
            if hops > MAX_POINTER_HOPS {
                return None;
            }
            let low = *buffer.get(offset + 1)?;
            offset = (u16::from_be_bytes([len & !POINTER_MASK, low])) as usize;
            continue;
        }
        let label = buffer.get(offset + 1..offset + 1 + len as usize)?;
        labels.push(String::from_utf8_lossy(label).into_owned());
        offset += 1 + len as usize;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsAnswer {
    pub name: String,
    pub rtype: u16,
    pub ttl: u32,
    pub data: Vec<u8>,
}

impl DnsAnswer {
    fn ipv4(&self) -> Option<Ipv4Addr> {
        let octets: [u8; 4] = self.data.as_slice().try_into().ok()?;
        (self.rtype == TYPE_A).then(|| Ipv4Addr::from(octets))
    }
}

#[derive(Debug, Clone)]
pub struct DnsResponse {
    pub id: u16,
    pub answers: Vec<DnsAnswer>,
}

impl DnsResponse {
    /// `None` for anything truncated or structurally wrong.
    fn from_bytes(buffer: &[u8]) -> Option<DnsResponse> {
        let (header, _) = DnsHeader::read_from_prefix(buffer).ok()?;
        let mut offset = size_of::<DnsHeader>();
        for _ in 0..header.questions.get() {
            offset = skip_name(buffer, offset)? + 4;
        }
        let mut answers = Vec::new();
        for _ in 0..header.answer_rr.get() {
            let name = read_name(buffer, offset)?;
            offset = skip_name(buffer, offset)?;
            let (fields, _) = RecordFields::read_from_prefix(buffer.get(offset..)?).ok()?;
            offset += size_of::<RecordFields>();
            let end = offset + fields.data_len.get() as usize;
            let data = buffer.get(offset..end)?.to_vec();
            offset = end;
            if fields.rclass.get() != CLASS_IN {
                continue;
            }
            answers.push(DnsAnswer {
                name,
                rtype: fields.rtype.get(),
                ttl: fields.ttl.get(),
                data,
            });
        }
        Some(DnsResponse {
            id: header.id.get(),
            answers,
        })
    }

    /// CNAME records are skipped; the first A record wins.
    pub fn first_a_record(&self) -> Option<Ipv4Addr> {
        self.answers.iter().find_map(DnsAnswer::ipv4)
    }
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

pub fn dns_query(domain: &str, server: Ipv4Addr) -> io::Result<DnsResponse> {
    let id = rand::thread_rng().gen_range(0..=u16::MAX);
    let query = build_query(id, domain)?;
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_read_timeout(Some(QUERY_TIMEOUT))?;
    socket.connect(SocketAddr::new(server.into(), DNS_PORT))?;
    debug!("querying {server} for A {domain} (id {id:#06x})");
    socket.send(&query)?;
    let mut buf = [0; 1024];
    let received = socket.recv(&mut buf)?;
    trace!("dns response: {received} bytes");
    let response = DnsResponse::from_bytes(&buf[..received])
        .ok_or_else(|| invalid("truncated DNS response"))?;
    if response.id != id {
        return Err(invalid("DNS response id mismatch"));
    }
    Ok(response)
}

fn parse_nameserver(content: &str) -> Option<Ipv4Addr> {
    content
        .lines()
        .filter_map(|line| line.trim().strip_prefix("nameserver"))
        .find_map(|rest| rest.split_whitespace().next()?.parse().ok())
}

fn get_dns_server() -> io::Result<Ipv4Addr> {
    let content = fs::read_to_string("/etc/resolv.conf")?;
    parse_nameserver(&content).ok_or_else(|| invalid("no IPv4 nameserver in /etc/resolv.conf"))
}
