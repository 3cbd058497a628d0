//! Event loop, clients and router for routio.
//!
//! This is the "just works" layer. Create an [`IoLoop`], add a [`Client`]
//! to it, and publish or subscribe on typed channels. Clients talk to each
//! other directly ([`Client::listen`] / [`Client::connect_peer`]), through
//! a [`Router`] ([`Client::connect`]), or to themselves through loopback.
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use routio_peer::{Channel, Client, IoLoop};
//!
//! let client = Client::with_name("demo");
//! let mut ioloop = IoLoop::new();
//! ioloop.add_handler(client.clone()).unwrap();
//!
//! let channel = Channel::parse("greetings", "string").unwrap();
//! let received = Rc::new(Cell::new(0));
//! let seen = received.clone();
//! let _sub = client
//!     .subscriber(channel.clone(), move |mut reader| {
//!         assert_eq!(reader.read_string()?, "Hello there");
//!         seen.set(seen.get() + 1);
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! client.publisher(channel).unwrap().send("Hello there").unwrap();
//! ioloop.wait(0).unwrap();
//! assert_eq!(received.get(), 1);
//! ```

pub mod channel;
pub mod client;
pub mod connection;
pub mod error;
pub mod hello;
pub mod ioloop;
pub mod pubsub;
pub mod router;

pub use channel::{Channel, ChannelRegistry, SubscriptionId};
pub use client::{Client, ClientConfig, LinkKind};
pub use connection::{Connection, ConnectionConfig, ConnectionId, Inbound};
pub use error::{BoxError, PeerError, Result};
pub use hello::{Hello, HelloConfig, Role, PROTOCOL_NAME, PROTOCOL_VERSION};
pub use ioloop::{Attachment, Handler, HandlerId, Interest, IoLoop, Readiness, Ready};
pub use pubsub::{
    BackpressurePolicy, Publisher, SendReport, Subscriber, TypedPublisher, TypedSubscriber,
};
pub use router::{Router, RouterConfig, RouterStatistics, SessionInfo, SessionState};
