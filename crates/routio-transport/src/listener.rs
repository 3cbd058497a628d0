#[cfg(unix)]
use std::os::fd::{AsRawFd, RawFd};

use crate::endpoint::Endpoint;
use crate::error::Result;
#[cfg(not(unix))]
use crate::error::TransportError;
use crate::stream::IpcStream;
use crate::tcp::TcpTransport;
#[cfg(unix)]
use crate::uds::UnixDomainSocket;

/// A bound listener for any supported [`Endpoint`].
pub enum IpcListener {
    #[cfg(unix)]
    Unix(UnixDomainSocket),
    Tcp(TcpTransport),
}

impl IpcListener {
    /// Bind the endpoint.
    pub fn bind(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            #[cfg(unix)]
            Endpoint::Unix(path) => Ok(Self::Unix(UnixDomainSocket::bind(path)?)),
            #[cfg(not(unix))]
            Endpoint::Unix(path) => Err(TransportError::Bind {
                endpoint: path.display().to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "unix domain sockets are not available on this platform",
                ),
            }),
            Endpoint::Tcp(addr) => Ok(Self::Tcp(TcpTransport::bind(addr)?)),
        }
    }

    /// Accept a pending connection without blocking.
    pub fn try_accept(&self) -> Result<Option<IpcStream>> {
        match self {
            #[cfg(unix)]
            Self::Unix(socket) => socket.try_accept(),
            Self::Tcp(socket) => socket.try_accept(),
        }
    }

    /// Switch between blocking and non-blocking accept.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        match self {
            #[cfg(unix)]
            Self::Unix(socket) => socket.set_nonblocking(nonblocking),
            Self::Tcp(socket) => socket.set_nonblocking(nonblocking),
        }
    }

    /// The endpoint this listener is reachable at.
    ///
    /// For TCP this reports the resolved port, so binding `:0` yields a
    /// connectable endpoint.
    pub fn local_endpoint(&self) -> Endpoint {
        match self {
            #[cfg(unix)]
            Self::Unix(socket) => Endpoint::unix(socket.path()),
            Self::Tcp(socket) => Endpoint::Tcp(socket.local_addr().to_string()),
        }
    }
}

#[cfg(unix)]
impl AsRawFd for IpcListener {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Self::Unix(socket) => socket.as_raw_fd(),
            Self::Tcp(socket) => socket.as_raw_fd(),
        }
    }
}

impl std::fmt::Debug for IpcListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcListener")
            .field("endpoint", &self.local_endpoint().to_string())
            .finish()
    }
}

/// Connect to an endpoint (blocking connect, the stream stays blocking).
pub fn connect(endpoint: &Endpoint) -> Result<IpcStream> {
    match endpoint {
        #[cfg(unix)]
        Endpoint::Unix(path) => UnixDomainSocket::connect(path),
        #[cfg(not(unix))]
        Endpoint::Unix(path) => Err(TransportError::Connect {
            endpoint: path.display().to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "unix domain sockets are not available on this platform",
            ),
        }),
        Endpoint::Tcp(addr) => TcpTransport::connect(addr),
    }
}
