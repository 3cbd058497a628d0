use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
#[cfg(unix)]
use std::os::fd::{AsRawFd, RawFd};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::IpcStream;

/// TCP listener for routers and peers reachable over the network.
///
/// Frames are not encrypted; TCP only widens reachability.
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Bind and listen on `host:port`. Port `0` picks an ephemeral port.
    pub fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|source| TransportError::Bind {
            endpoint: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "listening on tcp");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking unless the listener is non-blocking).
    pub fn accept(&self) -> Result<IpcStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        configure(&stream)?;
        debug!(%peer, "accepted tcp connection");
        Ok(IpcStream::from_tcp(stream))
    }

    /// Accept a pending connection without blocking.
    pub fn try_accept(&self) -> Result<Option<IpcStream>> {
        match self.listener.accept() {
            Ok((stream, peer)) => {
                configure(&stream)?;
                debug!(%peer, "accepted tcp connection");
                Ok(Some(IpcStream::from_tcp(stream)))
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(None),
            Err(err) => Err(TransportError::Accept(err)),
        }
    }

    /// Connect to a listening TCP endpoint (blocking).
    pub fn connect(addr: &str) -> Result<IpcStream> {
        let stream = TcpStream::connect(addr).map_err(|source| TransportError::Connect {
            endpoint: addr.to_string(),
            source,
        })?;
        configure(&stream)?;
        debug!(addr, "connected over tcp");
        Ok(IpcStream::from_tcp(stream))
    }

    /// Switch the listener between blocking and non-blocking accept.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener.set_nonblocking(nonblocking)?;
        Ok(())
    }

    /// The bound address (with the resolved port when bound to port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

// Frames are small and latency matters more than throughput.
fn configure(stream: &TcpStream) -> Result<()> {
    stream.set_nodelay(true)?;
    Ok(())
}

#[cfg(unix)]
impl AsRawFd for TcpTransport {
    fn as_raw_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }
}
