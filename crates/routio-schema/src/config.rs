/// Controls descriptor loading and schema-driven decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// When true, decoding rejects payloads with bytes left after the last field.
    pub strict_mode: bool,
    /// When true, validating a payload of an unknown schema returns
    /// `SchemaError::NoSchema` instead of passing it through.
    pub fail_on_missing_schema: bool,
    /// Maximum number of descriptors loaded from a directory.
    pub max_schemas_from_directory: usize,
    /// Maximum bytes allowed per descriptor file loaded from a directory.
    pub max_schema_file_size: usize,
    /// Maximum depth of nested messages when encoding or decoding.
    pub max_nesting_depth: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            fail_on_missing_schema: false,
            max_schemas_from_directory: 256,
            max_schema_file_size: 256 * 1024,
            max_nesting_depth: 16,
        }
    }
}
