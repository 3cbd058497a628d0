//! Stream transports for routio.
//!
//! Provides a unified byte-stream type over the supported transports:
//! - Unix domain sockets (Linux/macOS)
//! - TCP
//!
//! plus endpoint parsing. Descriptors are exposed through `AsRawFd` so an
//! event loop can poll them.
//! This is the lowest layer of routio. Everything else builds on top of
//! the [`IpcStream`] type provided here.

pub mod endpoint;
pub mod error;
pub mod listener;
pub mod stream;
pub mod tcp;

#[cfg(unix)]
pub mod uds;

pub use endpoint::{Endpoint, DEFAULT_ENDPOINT, ENDPOINT_ENV};
pub use error::{Result, TransportError};
pub use listener::{connect, IpcListener};
pub use stream::IpcStream;
pub use tcp::TcpTransport;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
