use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use bytes::Bytes;
use routio_message::{MessageReader, MessageWriter, TypeSignature, Value};
use tracing::debug;

use crate::config::RegistryConfig;
use crate::descriptor::{FieldKind, SchemaDescriptor};
use crate::error::{Result, SchemaError};
use crate::record::Record;

const SCHEMA_FILE_SUFFIX: &str = ".schema.json";

/// Id-keyed registry of compiled message descriptors.
///
/// Encodes and decodes [`Record`]s field by field in descriptor order.
pub struct SchemaRegistry {
    descriptors: HashMap<String, SchemaDescriptor>,
    config: RegistryConfig,
}

impl SchemaRegistry {
    /// Create an empty registry with default config.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with explicit config.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            descriptors: HashMap::new(),
            config,
        }
    }

    /// Register a descriptor from its JSON document. Returns the schema id.
    pub fn register(&mut self, descriptor_json: &str) -> Result<String> {
        let descriptor = SchemaDescriptor::from_json(descriptor_json)?;
        let id = descriptor.id.clone();
        self.register_descriptor(descriptor);
        Ok(id)
    }

    /// Register (or replace) a parsed descriptor.
    ///
    /// Nested references may point at descriptors registered later; call
    /// [`SchemaRegistry::check_references`] once everything is loaded.
    pub fn register_descriptor(&mut self, descriptor: SchemaDescriptor) {
        debug!(schema = %descriptor.id, fields = descriptor.fields.len(), "registered schema");
        self.descriptors.insert(descriptor.id.clone(), descriptor);
    }

    /// Load descriptors from a directory.
    pub fn from_directory(path: &Path) -> Result<Self> {
        Self::from_directory_with_config(path, RegistryConfig::default())
    }

    /// Load descriptors from a directory with explicit config.
    ///
    /// Only `*.schema.json` regular files are read. Symlinked descriptor
    /// files are refused, as are files above the size limit.
    pub fn from_directory_with_config(path: &Path, config: RegistryConfig) -> Result<Self> {
        let mut registry = Self::with_config(config);
        let mut loaded_schema_count = 0usize;

        let entries = std::fs::read_dir(path)
            .map_err(|err| SchemaError::LoadFailed(format!("{}: {err}", path.display())))?;

        for entry in entries {
            let entry = entry.map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if !file_name.ends_with(SCHEMA_FILE_SUFFIX) {
                continue;
            }
            let entry_path = entry.path();
            let path_metadata = std::fs::symlink_metadata(&entry_path)
                .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            let file_type = path_metadata.file_type();

            if file_type.is_symlink() {
                return Err(SchemaError::LoadFailed(format!(
                    "refusing to load schema symlink: {file_name}"
                )));
            }
            if !file_type.is_file() {
                continue;
            }

            loaded_schema_count = loaded_schema_count.saturating_add(1);
            if loaded_schema_count > registry.config.max_schemas_from_directory {
                return Err(SchemaError::LoadFailed(format!(
                    "schema count exceeds configured max ({}): {}",
                    registry.config.max_schemas_from_directory, loaded_schema_count
                )));
            }

            let file = std::fs::File::open(&entry_path).map_err(|err| {
                SchemaError::LoadFailed(format!(
                    "failed opening schema {}: {err}",
                    entry_path.display()
                ))
            })?;
            let opened_metadata = file
                .metadata()
                .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;

            #[cfg(unix)]
            {
                if !same_file_identity(&path_metadata, &opened_metadata) {
                    return Err(SchemaError::LoadFailed(format!(
                        "schema file changed during load: {file_name}"
                    )));
                }
            }

            if opened_metadata.len() > registry.config.max_schema_file_size as u64 {
                return Err(SchemaError::LoadFailed(format!(
                    "schema file too large ({} bytes): {file_name}",
                    opened_metadata.len()
                )));
            }

            let max_bytes = registry.config.max_schema_file_size;
            let read_limit = u64::try_from(max_bytes.saturating_add(1)).unwrap_or(u64::MAX);
            let mut content = String::new();
            file.take(read_limit)
                .read_to_string(&mut content)
                .map_err(|err| {
                    SchemaError::LoadFailed(format!(
                        "failed reading schema {}: {err}",
                        entry_path.display()
                    ))
                })?;
            if content.len() > max_bytes {
                return Err(SchemaError::LoadFailed(format!(
                    "schema file too large while reading: {file_name}"
                )));
            }

            let descriptor = SchemaDescriptor::from_json(&content)?;
            if registry.has_schema(&descriptor.id) {
                return Err(SchemaError::LoadFailed(format!(
                    "schema id {} defined twice (second in {file_name})",
                    descriptor.id
                )));
            }
            registry.register_descriptor(descriptor);
        }

        registry.check_references()?;
        Ok(registry)
    }

    /// Load from embedded descriptor documents.
    pub fn from_embedded(descriptors: &[&str]) -> Result<Self> {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor)?;
        }
        registry.check_references()?;
        Ok(registry)
    }

    /// Verify every nested reference resolves and no descriptor contains
    /// itself without a `repeated` in between (such a message has no finite
    /// encoding).
    pub fn check_references(&self) -> Result<()> {
        for descriptor in self.descriptors.values() {
            for field in &descriptor.fields {
                if let Some(target) = field.kind.message_id() {
                    if !self.descriptors.contains_key(target) {
                        return Err(SchemaError::CompileFailed(format!(
                            "schema {} field '{}' references unknown schema {target}",
                            descriptor.id, field.name
                        )));
                    }
                }
            }
        }

        let mut done = HashSet::new();
        for id in self.descriptors.keys() {
            let mut path = Vec::new();
            self.visit_direct(id, &mut path, &mut done)?;
        }
        Ok(())
    }

    fn visit_direct<'a>(
        &'a self,
        id: &'a str,
        path: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Result<()> {
        if done.contains(id) {
            return Ok(());
        }
        if path.contains(&id) {
            return Err(SchemaError::CompileFailed(format!(
                "schema {id} contains itself: {} -> {id}",
                path.join(" -> ")
            )));
        }
        let Some(descriptor) = self.descriptors.get(id) else {
            return Ok(());
        };
        path.push(id);
        for field in &descriptor.fields {
            if let FieldKind::Message(target) = &field.kind {
                self.visit_direct(target, path, done)?;
            }
        }
        path.pop();
        done.insert(id);
        Ok(())
    }

    /// Look up a descriptor.
    pub fn get(&self, id: &str) -> Option<&SchemaDescriptor> {
        self.descriptors.get(id)
    }

    /// Check if a descriptor is registered under `id`.
    pub fn has_schema(&self, id: &str) -> bool {
        self.descriptors.contains_key(id)
    }

    /// Registered schema ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.descriptors.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Channel signature for a registered schema.
    pub fn signature(&self, id: &str) -> Result<TypeSignature> {
        self.descriptor(id)?.signature()
    }

    /// Append a record's fields to `writer` in descriptor order.
    ///
    /// The record is checked completely before anything is written.
    pub fn encode(&self, id: &str, record: &Record, writer: &mut MessageWriter) -> Result<()> {
        let descriptor = self.descriptor(id)?;
        self.check_record(descriptor, record.fields(), 1)?;
        write_record(descriptor, record.fields(), self, writer);
        Ok(())
    }

    /// Encode a record as a standalone payload.
    pub fn encode_message(&self, id: &str, record: &Record) -> Result<Bytes> {
        let mut writer = MessageWriter::new();
        self.encode(id, record, &mut writer)?;
        Ok(writer.finish())
    }

    /// Read a record of schema `id` from the reader's cursor.
    ///
    /// On failure the cursor is left where it was.
    pub fn decode(&self, id: &str, reader: &mut MessageReader) -> Result<Record> {
        let descriptor = self.descriptor(id)?;
        let snapshot = reader.clone();
        match self.read_record(descriptor, reader, 1) {
            Ok(fields) => Ok(Record::from(fields)),
            Err(err) => {
                *reader = snapshot;
                Err(err)
            }
        }
    }

    /// Decode a standalone payload. In strict mode trailing bytes are an error.
    pub fn decode_message(&self, id: &str, payload: impl Into<Bytes>) -> Result<Record> {
        let mut reader = MessageReader::new(payload);
        let record = self.decode(id, &mut reader)?;
        if self.config.strict_mode && !reader.is_empty() {
            return Err(SchemaError::ValidationFailed {
                schema: id.to_string(),
                message: format!("{} trailing bytes after last field", reader.remaining()),
            });
        }
        Ok(record)
    }

    /// Check that a payload published under `signature` decodes.
    ///
    /// Non-schema signatures always pass. Unknown schema ids pass unless
    /// `fail_on_missing_schema` is set.
    pub fn validate(&self, signature: &TypeSignature, payload: &[u8]) -> Result<()> {
        let Some(id) = signature.schema_id() else {
            return Ok(());
        };
        if !self.has_schema(id) {
            if self.config.fail_on_missing_schema {
                return Err(SchemaError::NoSchema(id.to_string()));
            }
            return Ok(());
        }
        self.decode_message(id, Bytes::copy_from_slice(payload))
            .map(|_| ())
    }

    /// Get registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn descriptor(&self, id: &str) -> Result<&SchemaDescriptor> {
        self.descriptors
            .get(id)
            .ok_or_else(|| SchemaError::NoSchema(id.to_string()))
    }

    fn check_depth(&self, id: &str, depth: usize) -> Result<()> {
        if depth > self.config.max_nesting_depth {
            return Err(SchemaError::DepthExceeded {
                schema: id.to_string(),
                max: self.config.max_nesting_depth,
            });
        }
        Ok(())
    }

    fn check_record(
        &self,
        descriptor: &SchemaDescriptor,
        fields: &[(String, Value)],
        depth: usize,
    ) -> Result<()> {
        self.check_depth(&descriptor.id, depth)?;

        let mismatch = |message: String| SchemaError::ValidationFailed {
            schema: descriptor.id.clone(),
            message,
        };

        for (name, _) in fields {
            if descriptor.field(name).is_none() {
                return Err(mismatch(format!("unknown field '{name}'")));
            }
        }
        for field in &descriptor.fields {
            let value = find(fields, &field.name)
                .ok_or_else(|| mismatch(format!("missing field '{}'", field.name)))?;
            self.check_value(&descriptor.id, &field.name, &field.kind, value, depth)?;
        }
        Ok(())
    }

    fn check_value(
        &self,
        schema: &str,
        field: &str,
        kind: &FieldKind,
        value: &Value,
        depth: usize,
    ) -> Result<()> {
        let mismatch = || SchemaError::ValidationFailed {
            schema: schema.to_string(),
            message: format!(
                "field '{field}' expects {}, got {}",
                kind_label(kind),
                value.kind_name()
            ),
        };

        match (kind, value) {
            (FieldKind::Builtin(sig), value) => {
                if builtin_matches(sig, value) {
                    Ok(())
                } else {
                    Err(mismatch())
                }
            }
            (FieldKind::Message(id), Value::Record(fields)) => {
                let nested = self.descriptor(id)?;
                self.check_record(nested, fields, depth + 1)
            }
            (FieldKind::Repeated(inner), Value::Repeated(items)) => {
                for item in items {
                    self.check_value(schema, field, inner, item, depth)?;
                }
                Ok(())
            }
            _ => Err(mismatch()),
        }
    }

    fn read_record(
        &self,
        descriptor: &SchemaDescriptor,
        reader: &mut MessageReader,
        depth: usize,
    ) -> Result<Vec<(String, Value)>> {
        self.check_depth(&descriptor.id, depth)?;
        let mut fields = Vec::with_capacity(descriptor.fields.len());
        for field in &descriptor.fields {
            let value = self.read_kind(&field.kind, reader, depth)?;
            fields.push((field.name.clone(), value));
        }
        Ok(fields)
    }

    fn read_kind(&self, kind: &FieldKind, reader: &mut MessageReader, depth: usize) -> Result<Value> {
        match kind {
            FieldKind::Builtin(sig) => Ok(Value::read(reader, sig)?),
            FieldKind::Message(id) => {
                let nested = self.descriptor(id)?;
                Ok(Value::Record(self.read_record(nested, reader, depth + 1)?))
            }
            FieldKind::Repeated(inner) => {
                let count = reader.begin_repeated()?;
                let mut items = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    items.push(self.read_kind(inner, reader, depth)?);
                }
                Ok(Value::Repeated(items))
            }
        }
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes an already checked record.
fn write_record(
    descriptor: &SchemaDescriptor,
    fields: &[(String, Value)],
    registry: &SchemaRegistry,
    writer: &mut MessageWriter,
) {
    for field in &descriptor.fields {
        if let Some(value) = find(fields, &field.name) {
            write_value(&field.kind, value, registry, writer);
        }
    }
}

fn write_value(kind: &FieldKind, value: &Value, registry: &SchemaRegistry, writer: &mut MessageWriter) {
    match (kind, value) {
        (FieldKind::Message(id), Value::Record(fields)) => {
            if let Some(nested) = registry.get(id) {
                write_record(nested, fields, registry, writer);
            }
        }
        (FieldKind::Repeated(inner), Value::Repeated(items)) => {
            writer.begin_repeated(items.len());
            for item in items {
                write_value(inner, item, registry, writer);
            }
        }
        (_, value) => value.write(writer),
    }
}

fn find<'a>(fields: &'a [(String, Value)], name: &str) -> Option<&'a Value> {
    fields.iter().find_map(|(n, v)| (n == name).then_some(v))
}

fn builtin_matches(sig: &TypeSignature, value: &Value) -> bool {
    matches!(
        (sig, value),
        (TypeSignature::Bool, Value::Bool(_))
            | (TypeSignature::Char, Value::Char(_))
            | (TypeSignature::I8, Value::I8(_))
            | (TypeSignature::I16, Value::I16(_))
            | (TypeSignature::I32, Value::I32(_))
            | (TypeSignature::I64, Value::I64(_))
            | (TypeSignature::U8, Value::U8(_))
            | (TypeSignature::U16, Value::U16(_))
            | (TypeSignature::U32, Value::U32(_))
            | (TypeSignature::U64, Value::U64(_))
            | (TypeSignature::F32, Value::F32(_))
            | (TypeSignature::F64, Value::F64(_))
            | (TypeSignature::String, Value::String(_))
            | (TypeSignature::Bytes, Value::Bytes(_))
            | (TypeSignature::Timestamp, Value::Timestamp(_))
            | (TypeSignature::Header, Value::Header(_))
            | (TypeSignature::Dictionary, Value::Dictionary(_))
            | (TypeSignature::Tensor, Value::Tensor(_))
    )
}

fn kind_label(kind: &FieldKind) -> String {
    match kind {
        FieldKind::Builtin(sig) => sig.to_string(),
        FieldKind::Message(id) => format!("message {id}"),
        FieldKind::Repeated(inner) => format!("repeated {}", kind_label(inner)),
    }
}

#[cfg(unix)]
fn same_file_identity(
    path_metadata: &std::fs::Metadata,
    opened_metadata: &std::fs::Metadata,
) -> bool {
    use std::os::unix::fs::MetadataExt;
    path_metadata.dev() == opened_metadata.dev() && path_metadata.ino() == opened_metadata.ino()
}
