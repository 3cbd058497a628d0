//! Frame kinds.
//!
//! DATA carries a published message. SUBSCRIBE, UNSUBSCRIBE and ADVERTISE
//! are control frames naming a channel with an empty payload. HELLO opens
//! every session and carries a JSON identification payload.

use crate::error::{FrameError, Result};

/// The kind byte of a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    Data = 1,
    Subscribe = 2,
    Unsubscribe = 3,
    Advertise = 4,
    Hello = 5,
}

impl FrameKind {
    /// Parse a kind byte.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Data),
            2 => Ok(Self::Subscribe),
            3 => Ok(Self::Unsubscribe),
            4 => Ok(Self::Advertise),
            5 => Ok(Self::Hello),
            other => Err(FrameError::InvalidKind(other)),
        }
    }

    /// The kind byte written on the wire.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable name for logs and CLI output.
    pub fn name(self) -> &'static str {
        match self {
            Self::Data => "DATA",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Advertise => "ADVERTISE",
            Self::Hello => "HELLO",
        }
    }

    /// Subscription management frames (never carry a payload).
    pub fn is_control(self) -> bool {
        matches!(self, Self::Subscribe | Self::Unsubscribe | Self::Advertise)
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_kinds_parse() {
        for kind in [
            FrameKind::Data,
            FrameKind::Subscribe,
            FrameKind::Unsubscribe,
            FrameKind::Advertise,
            FrameKind::Hello,
        ] {
            assert_eq!(FrameKind::from_u8(kind.as_u8()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_kind_rejected() {
        assert!(matches!(
            FrameKind::from_u8(0),
            Err(FrameError::InvalidKind(0))
        ));
        assert!(matches!(
            FrameKind::from_u8(42),
            Err(FrameError::InvalidKind(42))
        ));
    }

    #[test]
    fn control_classification() {
        assert!(FrameKind::Subscribe.is_control());
        assert!(FrameKind::Advertise.is_control());
        assert!(!FrameKind::Data.is_control());
        assert!(!FrameKind::Hello.is_control());
        assert_eq!(FrameKind::Unsubscribe.to_string(), "UNSUBSCRIBE");
    }
}
