//! Address resolution and socket setup.
//!
//! Everything that happens before a connection has its worker threads lives
//! here: resolving host names, creating and configuring sockets, binding
//! listeners. Every socket this crate creates or accepts gets the same
//! defaults: Nagle's algorithm disabled (`TCP_NODELAY`) for low-latency
//! small writes, and address reuse (`SO_REUSEADDR`) enabled.

use std::{
    fmt, io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
};

use socket2::{Domain, Protocol, SockRef, Socket, Type};
use thiserror::Error;

/// Listen backlog applied to every server socket.
pub(crate) const LISTEN_BACKLOG: i32 = 128;

/// Error raised while setting up a connection or a server.
///
/// Setup errors are surfaced synchronously from the factory calls
/// ([`connect`](`crate::connect`) and [`listen`](`crate::listen`)); nothing
/// is retried.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Name resolution for the target host failed.
    #[error("failed to resolve address for {host}:{port}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// Resolution succeeded but produced no address of the requested family.
    #[error("no matching address found for {host}:{port}")]
    NoMatchingAddress { host: String, port: u16 },

    /// Creating or configuring a socket failed.
    #[error("failed to create socket")]
    Socket(#[source] io::Error),

    /// Binding the listen socket failed (port already in use, permissions).
    #[error("failed to bind to port {port}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    /// Putting the bound socket into listening mode failed.
    #[error("failed to listen on socket")]
    Listen(#[source] io::Error),

    /// Every resolved candidate address refused the connection.
    #[error("unable to connect to {host}:{port}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// Querying the local or peer address of a socket failed.
    #[error("failed to query socket address")]
    Address(#[source] io::Error),

    /// Spawning a worker thread failed.
    #[error("failed to spawn worker thread")]
    Spawn(#[source] io::Error),
}

/// The IP address family used when resolving and opening sockets.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// Let the resolver pick; servers prefer a dual-stack IPv6 socket.
    #[default]
    Unspecified,
    /// IPv4 only.
    Ipv4,
    /// IPv6 only.
    Ipv6,
}

impl AddressFamily {
    fn admits(self, addr: &SocketAddr) -> bool {
        match self {
            AddressFamily::Unspecified => true,
            AddressFamily::Ipv4 => addr.is_ipv4(),
            AddressFamily::Ipv6 => addr.is_ipv6(),
        }
    }
}

/// A resolved endpoint address: family, printable host, and port.
///
/// Populated from the OS after bind, accept, or connect by querying the
/// socket's local and peer names.
///
/// # Examples
///
/// ```
/// use std::net::SocketAddr;
///
/// use hawser::AddressInfo;
///
/// let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
/// let info = AddressInfo::from(addr);
/// assert_eq!(info.to_string(), "127.0.0.1:8080");
///
/// let addr: SocketAddr = "[::1]:8080".parse().unwrap();
/// assert_eq!(AddressInfo::from(addr).to_string(), "[::1]:8080");
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AddressInfo {
    /// Address family of the endpoint.
    pub family: AddressFamily,
    /// Printable form of the IP address.
    pub address: String,
    /// Port number in host byte order.
    pub port: u16,
}

impl From<SocketAddr> for AddressInfo {
    fn from(addr: SocketAddr) -> Self {
        Self {
            family: if addr.is_ipv4() {
                AddressFamily::Ipv4
            } else {
                AddressFamily::Ipv6
            },
            address: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

impl fmt::Display for AddressInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.family {
            AddressFamily::Unspecified => write!(f, "<unspecified address family>"),
            AddressFamily::Ipv4 => write!(f, "{}:{}", self.address, self.port),
            AddressFamily::Ipv6 => write!(f, "[{}]:{}", self.address, self.port),
        }
    }
}

/// Applies the per-socket defaults to a freshly created socket.
fn configure(socket: &Socket) -> io::Result<()> {
    socket.set_nodelay(true)?;
    socket.set_reuse_address(true)?;
    // Writes to a closed peer must surface as errors, never signals.
    #[cfg(target_vendor = "apple")]
    socket.set_nosigpipe(true)?;
    Ok(())
}

/// Applies the per-socket defaults to an accepted stream and restores
/// blocking mode (accepted sockets may inherit the listener's
/// non-blocking flag on some platforms).
pub(crate) fn configure_accepted(stream: &TcpStream) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    let socket = SockRef::from(stream);
    socket.set_nodelay(true)?;
    socket.set_reuse_address(true)?;
    #[cfg(target_vendor = "apple")]
    socket.set_nosigpipe(true)?;
    Ok(())
}

fn connect_one(addr: SocketAddr) -> io::Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    configure(&socket)?;
    socket.connect(&addr.into())?;
    Ok(socket.into())
}

/// Resolves `host:port` and connects to the first candidate of the
/// requested family that accepts.
pub(crate) fn open_client(
    family: AddressFamily,
    host: &str,
    port: u16,
) -> Result<TcpStream, SetupError> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| SetupError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;

    let mut last_error = None;
    for addr in addrs.filter(|addr| family.admits(addr)) {
        match connect_one(addr) {
            Ok(stream) => return Ok(stream),
            Err(source) => last_error = Some(source),
        }
    }

    Err(match last_error {
        Some(source) => SetupError::Connect {
            host: host.to_owned(),
            port,
            source,
        },
        None => SetupError::NoMatchingAddress {
            host: host.to_owned(),
            port,
        },
    })
}

fn bind_one(addr: SocketAddr, port: u16) -> Result<TcpListener, SetupError> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(SetupError::Socket)?;
    configure(&socket).map_err(SetupError::Socket)?;
    if addr.is_ipv6() {
        // Accept IPv4-mapped peers too, where the platform allows it.
        let _ = socket.set_only_v6(false);
    }
    socket
        .bind(&addr.into())
        .map_err(|source| SetupError::Bind { port, source })?;
    socket.listen(LISTEN_BACKLOG).map_err(SetupError::Listen)?;
    // The accept loop polls at a short tick instead of parking in accept().
    socket.set_nonblocking(true).map_err(SetupError::Socket)?;
    Ok(socket.into())
}

/// Creates a non-blocking listener bound to the wildcard address of the
/// requested family.
pub(crate) fn open_listener(family: AddressFamily, port: u16) -> Result<TcpListener, SetupError> {
    let v4 = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let v6 = SocketAddr::from((Ipv6Addr::UNSPECIFIED, port));
    match family {
        AddressFamily::Ipv4 => bind_one(v4, port),
        AddressFamily::Ipv6 => bind_one(v6, port),
        AddressFamily::Unspecified => bind_one(v6, port).or_else(|_| bind_one(v4, port)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_info_display() {
        let v4 = AddressInfo {
            family: AddressFamily::Ipv4,
            address: "192.168.0.1".into(),
            port: 4242,
        };
        assert_eq!(v4.to_string(), "192.168.0.1:4242");

        let v6 = AddressInfo {
            family: AddressFamily::Ipv6,
            address: "::1".into(),
            port: 4242,
        };
        assert_eq!(v6.to_string(), "[::1]:4242");

        let unspec = AddressInfo::default();
        assert_eq!(unspec.to_string(), "<unspecified address family>");
    }

    #[test]
    fn address_info_from_socket_addr() {
        let addr: SocketAddr = "10.0.0.1:80".parse().unwrap();
        let info = AddressInfo::from(addr);
        assert_eq!(info.family, AddressFamily::Ipv4);
        assert_eq!(info.address, "10.0.0.1");
        assert_eq!(info.port, 80);
    }

    #[test]
    fn family_admits() {
        let v4: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let v6: SocketAddr = "[::1]:1".parse().unwrap();

        assert!(AddressFamily::Unspecified.admits(&v4));
        assert!(AddressFamily::Unspecified.admits(&v6));
        assert!(AddressFamily::Ipv4.admits(&v4));
        assert!(!AddressFamily::Ipv4.admits(&v6));
        assert!(AddressFamily::Ipv6.admits(&v6));
        assert!(!AddressFamily::Ipv6.admits(&v4));
    }

    #[test]
    fn listener_binds_ephemeral_port() {
        let listener = open_listener(AddressFamily::Ipv4, 0).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }
}
