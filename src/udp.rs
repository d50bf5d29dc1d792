use crate::wol;
use log::{debug, info};
use std::io;
use std::net::{SocketAddr, SocketAddrV6, ToSocketAddrs, UdpSocket};
use std::sync::{RwLock, RwLockReadGuard};

/// Port used when the destination does not name one (the "discard" service).
pub const DEFAULT_PORT: u16 = 9;
const UNSPECIFIED_BIND_ADDR_V6: &str = "[::]:0";
const UNSPECIFIED_BIND_ADDR_V4: &str = "0.0.0.0:0";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid address")]
    InvalidAddress(String),
    #[error("unable to resolve {host}: {source}")]
    ResolutionError {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Packet(#[from] wol::Error),
    #[error("unable to send magic packet: {0}")]
    TransmissionError(#[source] io::Error),
    #[error("unable to bind udp socket: {0}")]
    SocketUnavailable(#[source] io::Error),
    #[error("client is closed")]
    Closed,
}

impl Error {
    /// Whether the caller supplied bad input, as opposed to the network or
    /// the client itself failing.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidAddress(_) | Self::Packet(_))
    }
}

/// Splits `host`, `host:port`, `[host]` or `[host]:port`. A missing port is
/// replaced with [`DEFAULT_PORT`]; every other malformed shape is rejected.
pub fn split_host_port(addr: &str) -> Result<(&str, u16), Error> {
    let invalid = || Error::InvalidAddress(addr.to_string());

    let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
        let end = rest.find(']').ok_or_else(invalid)?;
        let host = &rest[..end];
        let port = match &rest[end + 1..] {
            "" => None,
            tail => Some(tail.strip_prefix(':').ok_or_else(invalid)?),
        };
        (host, port)
    } else {
        match addr.matches(':').count() {
            0 => (addr, None),
            1 => {
                let (host, port) = addr.split_once(':').ok_or_else(invalid)?;
                (host, Some(port))
            }
            _ => return Err(invalid()),
        }
    };

    if host.contains(['[', ']']) {
        return Err(invalid());
    }
    let port = match port {
        None => DEFAULT_PORT,
        Some(p) if !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()) => {
            p.parse().map_err(|_| invalid())?
        }
        Some(_) => return Err(invalid()),
    };
    if host.is_empty() {
        return Err(invalid());
    }
    Ok((host, port))
}

/// Sends magic packets as UDP datagrams from a single socket bound to an
/// ephemeral port. The client can be shared between threads; every call to
/// [`UdpClient::wake`] writes through the same socket until it is closed.
pub struct UdpClient {
    local_addr: SocketAddr,
    socket: RwLock<Option<UdpSocket>>,
}

impl UdpClient {
    /// Binds to any available port on all interfaces. The socket is dual
    /// stack when the host supports IPv6, IPv4 only otherwise.
    pub fn new() -> Result<Self, Error> {
        Self::bind(UNSPECIFIED_BIND_ADDR_V6).or_else(|e| {
            debug!("ipv6 unavailable ({}), falling back to ipv4", e);
            Self::bind(UNSPECIFIED_BIND_ADDR_V4)
        })
    }

    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self, Error> {
        let socket = UdpSocket::bind(addr).map_err(Error::SocketUnavailable)?;
        socket.set_broadcast(true).map_err(Error::SocketUnavailable)?;
        let local_addr = socket.local_addr().map_err(Error::SocketUnavailable)?;
        debug!("bound wake socket to {}", local_addr);
        Ok(Self {
            local_addr,
            socket: RwLock::new(Some(socket)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_closed(&self) -> bool {
        self.socket().is_none()
    }

    /// Releases the socket. Any later call to `wake` fails with
    /// [`Error::Closed`].
    pub fn close(&self) {
        let mut socket = self.socket.write().unwrap_or_else(|e| e.into_inner());
        if socket.take().is_some() {
            info!("closed wake socket {}", self.local_addr);
        }
    }

    fn socket(&self) -> RwLockReadGuard<'_, Option<UdpSocket>> {
        self.socket.read().unwrap_or_else(|e| e.into_inner())
    }

    fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr, Error> {
        let resolution_error = |source| Error::ResolutionError {
            host: host.to_string(),
            source,
        };
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(resolution_error)?
            .collect();
        // Prefer IPv4, magic packets are mostly sent to IPv4 broadcast
        // addresses.
        let addr = addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| {
                resolution_error(io::Error::new(
                    io::ErrorKind::NotFound,
                    "no addresses found",
                ))
            })?;
        Ok(self.to_local_family(addr))
    }

    // An IPv6 socket reaches IPv4 destinations through their mapped form.
    fn to_local_family(&self, addr: SocketAddr) -> SocketAddr {
        match (self.local_addr, addr) {
            (SocketAddr::V6(_), SocketAddr::V4(v4)) => {
                SocketAddrV6::new(v4.ip().to_ipv6_mapped(), v4.port(), 0, 0).into()
            }
            _ => addr,
        }
    }

    /// Sends a magic packet for `target` to `addr`, which is either an IP
    /// address or a host name, with an optional port. Success only means the
    /// datagram was handed to the network stack.
    pub fn wake(&self, addr: &str, target: &[u8], password: &str) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let (host, port) = split_host_port(addr)?;
        let dest = self.resolve(host, port)?;
        let frame = wol::encode(target, password.as_bytes())?;

        let guard = self.socket();
        let socket = guard.as_ref().ok_or(Error::Closed)?;
        socket
            .send_to(&frame, dest)
            .map_err(Error::TransmissionError)?;
        debug!("sent {} byte magic packet to {}", frame.len(), dest);
        Ok(())
    }
}
