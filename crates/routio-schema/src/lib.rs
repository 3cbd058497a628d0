//! Compiled message descriptors for routio.
//!
//! The external schema compiler turns declarative message templates into
//! JSON descriptors: an id plus an ordered list of `(name, kind)` fields.
//! This crate loads those descriptors and uses them to encode and decode
//! dynamic [`Record`]s with the routio message codec. Messages of a schema
//! travel on channels with the signature `schema:<id>`.

pub mod config;
pub mod descriptor;
pub mod error;
pub mod record;
pub mod registry;

pub use config::RegistryConfig;
pub use descriptor::{FieldDescriptor, FieldKind, SchemaDescriptor};
pub use error::{Result, SchemaError};
pub use record::Record;
pub use registry::SchemaRegistry;
