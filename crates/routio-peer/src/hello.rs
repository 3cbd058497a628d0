use routio_frame::{Frame, FrameKind};
use serde::{Deserialize, Serialize};

use crate::error::{PeerError, Result};

/// Protocol name announced in every HELLO.
pub const PROTOCOL_NAME: &str = "routio";
/// Protocol version spoken by this build.
pub const PROTOCOL_VERSION: &str = "1.0";

const MAX_PROTOCOL_LEN: usize = 32;
const MAX_VERSION_LEN: usize = 16;
const MAX_NAME_LEN: usize = 128;
const MAX_PEER_ID_LEN: usize = 128;

/// Which side of a connection a session is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Opened the connection and speaks first.
    Initiator,
    /// Accepted the connection and answers with the assigned peer id.
    Acceptor,
}

/// Session identification exchanged as the first frame in each direction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hello {
    /// Protocol name. Must be `routio` by default.
    pub protocol: String,
    /// Protocol version string, `<major>.<minor>`.
    pub version: String,
    /// Human-readable name of the sending process.
    pub name: String,
    /// Identifier the acceptor assigned to the initiator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
}

/// Configuration for hello validation.
#[derive(Debug, Clone)]
pub struct HelloConfig {
    /// Expected protocol name.
    pub protocol_name: String,
    /// Local protocol version.
    pub protocol_version: String,
    /// Maximum HELLO payload size in bytes.
    pub max_hello_payload: usize,
}

impl Default for HelloConfig {
    fn default() -> Self {
        Self {
            protocol_name: PROTOCOL_NAME.to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            max_hello_payload: 16 * 1024,
        }
    }
}

impl Hello {
    /// The local hello for a process called `name`.
    pub fn new(config: &HelloConfig, name: impl Into<String>) -> Self {
        Self {
            protocol: config.protocol_name.clone(),
            version: config.protocol_version.clone(),
            name: name.into(),
            peer_id: None,
        }
    }

    pub fn with_peer_id(mut self, peer_id: impl Into<String>) -> Self {
        self.peer_id = Some(peer_id.into());
        self
    }

    /// Check our own hello before it goes on the wire.
    pub fn validate(&self) -> Result<()> {
        validate_protocol_name(&self.protocol)?;
        validate_version(&self.version)?;
        validate_name(&self.name)?;
        if let Some(peer_id) = &self.peer_id {
            validate_peer_id(peer_id)?;
        }
        Ok(())
    }

    pub fn to_frame(&self) -> Result<Frame> {
        self.validate()?;
        Ok(Frame::hello(serde_json::to_vec(self)?))
    }

    /// Parse and validate the remote hello.
    ///
    /// `role` is the local role: the initiator's minor version must be at
    /// least the acceptor's, whichever side runs the check.
    pub fn from_frame(frame: &Frame, config: &HelloConfig, role: Role) -> Result<Self> {
        if frame.kind != FrameKind::Hello {
            return Err(PeerError::Protocol(format!(
                "expected HELLO, got {}",
                frame.kind
            )));
        }
        if frame.payload.len() > config.max_hello_payload {
            return Err(PeerError::Protocol(format!(
                "hello payload too large: {} (max {})",
                frame.payload.len(),
                config.max_hello_payload
            )));
        }

        let hello: Hello = serde_json::from_slice(&frame.payload)
            .map_err(|err| PeerError::Protocol(format!("malformed hello: {err}")))?;
        hello.validate()?;

        if hello.protocol != config.protocol_name {
            return Err(PeerError::Protocol(format!(
                "unknown protocol '{}' (expected '{}')",
                hello.protocol, config.protocol_name
            )));
        }

        let compatible = match role {
            Role::Acceptor => is_version_compatible(&hello.version, &config.protocol_version)?,
            Role::Initiator => is_version_compatible(&config.protocol_version, &hello.version)?,
        };
        if !compatible {
            return Err(PeerError::Protocol(format!(
                "incompatible version '{}' (local '{}')",
                hello.version, config.protocol_version
            )));
        }

        Ok(hello)
    }
}

fn validate_protocol_name(protocol: &str) -> Result<()> {
    if protocol.is_empty() || protocol.len() > MAX_PROTOCOL_LEN {
        return Err(PeerError::Protocol(format!(
            "invalid protocol name length: {}",
            protocol.len()
        )));
    }
    Ok(())
}

fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() || version.len() > MAX_VERSION_LEN {
        return Err(PeerError::Protocol(format!(
            "invalid protocol version length: {}",
            version.len()
        )));
    }
    let _ = parse_version(version)?;
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(PeerError::Protocol(format!(
            "invalid name length: {}",
            name.len()
        )));
    }
    Ok(())
}

fn validate_peer_id(peer_id: &str) -> Result<()> {
    if peer_id.is_empty() || peer_id.len() > MAX_PEER_ID_LEN {
        return Err(PeerError::Protocol(format!(
            "invalid peer_id length: {}",
            peer_id.len()
        )));
    }
    Ok(())
}

fn is_version_compatible(initiator_version: &str, acceptor_version: &str) -> Result<bool> {
    let (initiator_major, initiator_minor) = parse_version(initiator_version)?;
    let (acceptor_major, acceptor_minor) = parse_version(acceptor_version)?;

    Ok(initiator_major == acceptor_major && initiator_minor >= acceptor_minor)
}

fn parse_version(version: &str) -> Result<(u16, u16)> {
    let mut parts = version.split('.');

    let major = parts.next().ok_or_else(|| {
        PeerError::Protocol(format!("invalid version '{}': missing major", version))
    })?;
    let minor = parts.next().ok_or_else(|| {
        PeerError::Protocol(format!("invalid version '{}': missing minor", version))
    })?;

    if parts.next().is_some() {
        return Err(PeerError::Protocol(format!(
            "invalid version '{}': expected '<major>.<minor>'",
            version
        )));
    }

    let major = major.parse::<u16>().map_err(|_| {
        PeerError::Protocol(format!("invalid version '{}': non-numeric major", version))
    })?;
    let minor = minor.parse::<u16>().map_err(|_| {
        PeerError::Protocol(format!("invalid version '{}': non-numeric minor", version))
    })?;

    Ok((major, minor))
}
