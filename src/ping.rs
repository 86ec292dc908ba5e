use crate::decode::{decode_reply, verify_reply, DecodedReply};
use crate::dns::{Resolve, SystemResolver};
use crate::error::{PingError, Result};
use crate::icmp::build_echo_datagram;
use log::{debug, trace};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

pub const DEFAULT_RECV_BUFFER: usize = 1024;

/// Outcome of one echo request/reply exchange.
#[derive(Debug, Clone)]
pub struct PingResult {
    pub sent_at: SystemTime,
    pub elapsed: Duration,
    pub reply: DecodedReply,
    pub raw_reply: Vec<u8>,
    pub peer: Ipv4Addr,
}

#[derive(Clone)]
pub struct PingConfig {
    /// Bound on the blocking receive. `None` waits forever.
    pub deadline: Option<Duration>,
    pub recv_buffer: usize,
    /// Recompute both checksums of the reply and fail on mismatch.
    pub verify_checksums: bool,
    /// Skip ICMP traffic that is not an Echo Reply carrying our identifier.
    pub match_identifier: bool,
    pub resolver: Arc<dyn Resolve>,
}

impl Default for PingConfig {
    fn default() -> Self {
        PingConfig {
            deadline: None,
            recv_buffer: DEFAULT_RECV_BUFFER,
            verify_checksums: false,
            match_identifier: true,
            resolver: Arc::new(SystemResolver),
        }
    }
}

#[derive(Clone, Default)]
pub struct Pinger {
    config: PingConfig,
}

fn open_socket(protocol: Protocol) -> Result<Socket> {
    let socket =
        Socket::new(Domain::IPV4, Type::RAW, Some(protocol)).map_err(PingError::from_open)?;
    trace!("opened raw socket for protocol {protocol:?}");
    Ok(socket)
}

fn no_reply_within(deadline: Duration) -> PingError {
    PingError::NoReply(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("no reply within {deadline:?}"),
    ))
}

/// Transmits a fully built packet (IP header included) and closes the socket
/// without waiting for anything back.
pub fn send_raw(packet: &[u8], destination: Ipv4Addr) -> Result<()> {
    let socket = open_socket(Protocol::from(libc::IPPROTO_RAW))?;
    let target: SockAddr = SocketAddrV4::new(destination, 0).into();
    let sent = socket
        .send_to(packet, &target)
        .map_err(PingError::TransmitFailure)?;
    debug!("sent {sent} raw bytes to {destination}");
    Ok(())
}

impl Pinger {
    pub fn new(config: PingConfig) -> Pinger {
        Pinger { config }
    }

    /// Builds an echo request and exchanges it with `destination`.
    pub fn ping(
        &self,
        destination: &str,
        payload: &[u8],
        identifier: u16,
        sequence: i16,
    ) -> Result<PingResult> {
        let datagram = build_echo_datagram(payload, identifier, sequence);
        self.send_ping(&datagram, destination)
    }

    /// Sends an already built ICMP datagram; the kernel supplies the IP
    /// header. The socket is dropped on every return path.
    pub fn send_ping(&self, datagram: &[u8], destination: &str) -> Result<PingResult> {
        let target = self.config.resolver.resolve(destination)?;
        let socket = open_socket(Protocol::ICMPV4)?;
        let target_addr: SockAddr = SocketAddrV4::new(target, 0).into();

        let sent_at = SystemTime::now();
        let start = Instant::now();
        socket
            .send_to(datagram, &target_addr)
            .map_err(PingError::TransmitFailure)?;
        debug!("sent {} byte echo request to {target}", datagram.len());

        let identifier = datagram
            .get(4..6)
            .map(|id| u16::from_be_bytes([id[0], id[1]]));
        let mut buf = vec![0u8; self.config.recv_buffer];
        loop {
            if let Some(deadline) = self.config.deadline {
                let remaining = deadline
                    .checked_sub(start.elapsed())
                    .filter(|left| !left.is_zero())
                    .ok_or_else(|| no_reply_within(deadline))?;
                socket
                    .set_read_timeout(Some(remaining))
                    .map_err(PingError::NoReply)?;
            }

            let (len, peer) = recv_from(&socket, &mut buf).map_err(|e| {
                match (e.kind(), self.config.deadline) {
                    (io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut, Some(deadline)) => {
                        no_reply_within(deadline)
                    }
                    _ => PingError::NoReply(e),
                }
            })?;
            let elapsed = start.elapsed();
            let raw_reply = buf[..len].to_vec();
            let reply = decode_reply(&raw_reply)?;

            if self.config.match_identifier {
                if let Some(identifier) = identifier {
                    if !reply.icmp.is_echo_reply_for(identifier) {
                        trace!(
                            "skipping ICMP type {} id {} from {}",
                            reply.icmp.icmp_type,
                            reply.icmp.identifier,
                            reply.ip.source
                        );
                        continue;
                    }
                }
            }
            if self.config.verify_checksums {
                verify_reply(&raw_reply)?;
            }

            debug!("reply from {peer} after {elapsed:?}");
            return Ok(PingResult {
                sent_at,
                elapsed,
                reply,
                raw_reply,
                peer,
            });
        }
    }
}

fn recv_from(socket: &Socket, buf: &mut [u8]) -> io::Result<(usize, Ipv4Addr)> {
    // SAFETY: `u8` and `MaybeUninit<u8>` share a layout and the buffer is
    // already initialized; recv only ever writes initialized bytes into it.
    let uninit = unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) };
    let (len, addr) = socket.recv_from(uninit)?;
    let peer = match addr.as_socket() {
        Some(SocketAddr::V4(v4)) => *v4.ip(),
        _ => Ipv4Addr::UNSPECIFIED,
    };
    Ok((len, peer))
}

/// Runs one ping on its own thread and delivers the outcome over a channel.
/// Each task owns its socket; nothing is shared between tasks.
pub fn spawn_ping(
    pinger: Pinger,
    destination: String,
    payload: Vec<u8>,
    identifier: u16,
    sequence: i16,
) -> Receiver<Result<PingResult>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = pinger.ping(&destination, &payload, identifier, sequence);
        // receiver may have given up
        let _ = tx.send(result);
    });
    rx
}
