use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, TransportError};

/// Environment variable consulted by [`Endpoint::from_env_or_default`].
pub const ENDPOINT_ENV: &str = "ROUTIO_ENDPOINT";

/// Endpoint used when nothing else is configured.
pub const DEFAULT_ENDPOINT: &str = "/tmp/routio.sock";

/// Address of a router or peer.
///
/// Accepted textual forms:
/// - `unix:/run/routio.sock` or a bare path such as `/tmp/routio.sock`
/// - `tcp://127.0.0.1:5600`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Filesystem-path Unix domain socket.
    Unix(PathBuf),
    /// TCP `host:port`.
    Tcp(String),
}

impl Endpoint {
    /// Unix domain socket endpoint.
    pub fn unix(path: impl AsRef<Path>) -> Self {
        Self::Unix(path.as_ref().to_path_buf())
    }

    /// TCP endpoint from a `host:port` string.
    pub fn tcp(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        validate_tcp_addr(&addr)?;
        Ok(Self::Tcp(addr))
    }

    /// Parse an endpoint string.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid(input, "endpoint must not be empty"));
        }

        if let Some(addr) = trimmed.strip_prefix("tcp://") {
            return Self::tcp(addr).map_err(|_| invalid(input, "expected tcp://<host>:<port>"));
        }

        let path = trimmed
            .strip_prefix("unix://")
            .or_else(|| trimmed.strip_prefix("unix:"))
            .unwrap_or(trimmed);
        if path.is_empty() {
            return Err(invalid(input, "socket path must not be empty"));
        }
        if path.contains("://") {
            return Err(invalid(input, "unsupported endpoint scheme"));
        }
        Ok(Self::Unix(PathBuf::from(path)))
    }

    /// Endpoint from `ROUTIO_ENDPOINT`, or [`DEFAULT_ENDPOINT`] when unset.
    pub fn from_env_or_default() -> Result<Self> {
        match std::env::var(ENDPOINT_ENV) {
            Ok(value) if !value.trim().is_empty() => Self::parse(&value),
            _ => Self::parse(DEFAULT_ENDPOINT),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            Self::Unix(_) => "unix-domain-socket",
            Self::Tcp(_) => "tcp",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn validate_tcp_addr(addr: &str) -> Result<()> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| invalid(addr, "missing port"))?;
    if host.is_empty() {
        return Err(invalid(addr, "missing host"));
    }
    port.parse::<u16>()
        .map_err(|_| invalid(addr, "port must be a number between 0 and 65535"))?;
    Ok(())
}

fn invalid(input: &str, reason: &str) -> TransportError {
    TransportError::InvalidEndpoint {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_path_as_unix() {
        let endpoint = Endpoint::parse("/tmp/routio.sock").unwrap();
        assert_eq!(endpoint, Endpoint::unix("/tmp/routio.sock"));
    }

    #[test]
    fn parses_unix_scheme() {
        assert_eq!(
            Endpoint::parse("unix:/run/r.sock").unwrap(),
            Endpoint::unix("/run/r.sock")
        );
        assert_eq!(
            Endpoint::parse("unix:///run/r.sock").unwrap(),
            Endpoint::unix("/run/r.sock")
        );
    }

    #[test]
    fn parses_tcp() {
        let endpoint = Endpoint::parse("tcp://127.0.0.1:5600").unwrap();
        assert_eq!(endpoint, Endpoint::Tcp("127.0.0.1:5600".to_string()));
        assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:5600");
        assert_eq!(endpoint.transport_name(), "tcp");
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(Endpoint::parse("").is_err());
        assert!(Endpoint::parse("tcp://localhost").is_err());
        assert!(Endpoint::parse("tcp://:80").is_err());
        assert!(Endpoint::parse("tcp://host:99999").is_err());
        assert!(Endpoint::parse("http://example.com").is_err());
        assert!(Endpoint::parse("unix:").is_err());
    }

    #[test]
    fn display_roundtrips_through_parse() {
        let endpoint = Endpoint::unix("/tmp/x.sock");
        assert_eq!(Endpoint::parse(&endpoint.to_string()).unwrap(), endpoint);
    }
}
