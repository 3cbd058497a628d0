//! Compiled message descriptors.
//!
//! The schema compiler emits one JSON document per message type:
//!
//! ```json
//! {
//!   "id": "geometry.Pose",
//!   "fields": [
//!     { "name": "header", "kind": "header" },
//!     { "name": "position", "kind": { "message": "geometry.Point" } },
//!     { "name": "covariance", "kind": { "repeated": "d" } }
//!   ]
//! }
//! ```
//!
//! A kind is a builtin signature code, `{"message": id}` for a nested
//! message, or `{"repeated": kind}`.

use std::collections::HashSet;

use routio_message::TypeSignature;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};

/// How one field is encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// A primitive or builtin type.
    Builtin(TypeSignature),
    /// Another descriptor's fields, inlined without an envelope.
    Message(String),
    /// Count followed by that many elements.
    Repeated(Box<FieldKind>),
}

impl FieldKind {
    /// The nested message id, looking through `repeated`.
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Self::Builtin(_) => None,
            Self::Message(id) => Some(id),
            Self::Repeated(inner) => inner.message_id(),
        }
    }

    fn from_raw(raw: RawKind) -> Result<Self> {
        match raw {
            RawKind::Name(name) => match TypeSignature::parse(&name) {
                Ok(TypeSignature::Schema(_)) | Err(_) => Err(SchemaError::CompileFailed(format!(
                    "unknown field kind '{name}' (use {{\"message\": id}} for nested messages)"
                ))),
                Ok(sig) => Ok(Self::Builtin(sig)),
            },
            RawKind::Message { message } => {
                TypeSignature::schema(message.as_str())
                    .map_err(|err| SchemaError::CompileFailed(err.to_string()))?;
                Ok(Self::Message(message))
            }
            RawKind::Repeated { repeated } => Ok(Self::Repeated(Box::new(Self::from_raw(*repeated)?))),
        }
    }

    fn to_raw(&self) -> RawKind {
        match self {
            Self::Builtin(sig) => RawKind::Name(sig.to_string()),
            Self::Message(id) => RawKind::Message {
                message: id.clone(),
            },
            Self::Repeated(inner) => RawKind::Repeated {
                repeated: Box::new(inner.to_raw()),
            },
        }
    }
}

/// One named field of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

/// An ordered field list identified by a schema id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    pub id: String,
    pub fields: Vec<FieldDescriptor>,
}

impl SchemaDescriptor {
    /// Parse and check a compiled descriptor document.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawDescriptor = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    /// Render back to the compiler's JSON format.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_raw())?)
    }

    /// Channel signature for messages of this descriptor.
    pub fn signature(&self) -> Result<TypeSignature> {
        TypeSignature::schema(self.id.as_str())
            .map_err(|err| SchemaError::CompileFailed(err.to_string()))
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn from_raw(raw: RawDescriptor) -> Result<Self> {
        TypeSignature::schema(raw.id.as_str())
            .map_err(|err| SchemaError::CompileFailed(err.to_string()))?;

        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(raw.fields.len());
        for field in raw.fields {
            if field.name.is_empty() {
                return Err(SchemaError::CompileFailed(format!(
                    "schema {} has a field without a name",
                    raw.id
                )));
            }
            if !seen.insert(field.name.clone()) {
                return Err(SchemaError::CompileFailed(format!(
                    "schema {} declares field '{}' twice",
                    raw.id, field.name
                )));
            }
            fields.push(FieldDescriptor {
                kind: FieldKind::from_raw(field.kind)?,
                name: field.name,
            });
        }

        Ok(Self { id: raw.id, fields })
    }

    fn to_raw(&self) -> RawDescriptor {
        RawDescriptor {
            id: self.id.clone(),
            fields: self
                .fields
                .iter()
                .map(|f| RawField {
                    name: f.name.clone(),
                    kind: f.kind.to_raw(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDescriptor {
    id: String,
    fields: Vec<RawField>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawField {
    name: String,
    kind: RawKind,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum RawKind {
    Name(String),
    Message { message: String },
    Repeated { repeated: Box<RawKind> },
}
