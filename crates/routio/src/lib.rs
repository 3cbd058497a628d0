//! Typed publish/subscribe messaging between processes.
//!
//! routio moves typed messages over named channels. A client publishes on a
//! `(name, signature)` pair and every subscriber of exactly that pair gets
//! the payload, whether it lives in the same client, in a directly
//! connected peer, or behind a router.
//!
//! # Crate Structure
//!
//! - [`transport`]: Unix domain sockets, TCP and endpoints
//! - [`frame`]: the wire frame codec and non-blocking frame I/O
//! - [`message`]: type signatures and the field codec
//! - [`schema`]: compiled schema descriptors (behind `schema` feature)
//! - [`peer`]: mio-driven event loop, clients and router (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use routio_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use routio_frame::*;
}

/// Re-export message codec types.
pub mod message {
    pub use routio_message::*;
}

/// Re-export schema types (requires `schema` feature).
#[cfg(feature = "schema")]
pub mod schema {
    pub use routio_schema::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use routio_peer::*;
}

#[cfg(feature = "peer")]
pub use routio_peer::{
    Channel, Client, ClientConfig, IoLoop, PeerError, Publisher, Router, RouterConfig, Subscriber,
};
pub use routio_message::{Decode, Encode, MessageReader, MessageWriter, TypeSignature, Typed};
pub use routio_transport::Endpoint;
