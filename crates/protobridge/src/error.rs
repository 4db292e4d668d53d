//! Error types for the bridge

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Fieldless classification of a [`BridgeError`], handy for matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NoSuchField,
    NoSuchOneof,
    NotAssignable,
    TypeMismatch,
    InvalidEnumValue,
    UnsupportedOperation,
    UnknownExtensionField,
    ConversionOverflow,
    TypeNotFound,
    InvalidSchema,
    IndexOutOfRange,
    KeyNotFound,
    ReadOnly,
    Decode,
    TextParse,
}

/// Bridge error types
///
/// Every variant that concerns a field carries the dotted path to it, so
/// nested failures read as `outer.items.value`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    /// The message type has no field with this name
    #[error("no such field: {path}")]
    NoSuchField {
        /// Dotted path of the missing field
        path: String,
    },

    /// The message type has no oneof group with this name
    #[error("no such oneof: {path}")]
    NoSuchOneof {
        /// Dotted path of the missing group
        path: String,
    },

    /// Attempt to replace a composite field or a whole container
    #[error("field {path} is not assignable: {reason}")]
    NotAssignable {
        /// Dotted field path
        path: String,
        /// What was attempted
        reason: String,
    },

    /// Value kind incompatible with a field or element type
    #[error("type mismatch at {path}: expected {expected}, got {got}")]
    TypeMismatch {
        /// Dotted field path (empty for top-level arguments)
        path: String,
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// Integer or name not declared by the enum
    #[error("invalid value {value} for enum {enum_name} at {path}")]
    InvalidEnumValue {
        /// Dotted field path
        path: String,
        /// Offending value, rendered
        value: String,
        /// Full name of the enum
        enum_name: String,
    },

    /// Operation impossible under the current aliasing guarantees
    #[error("unsupported operation on {path}: {reason}")]
    UnsupportedOperation {
        /// Dotted field path
        path: String,
        /// Why it is refused
        reason: String,
    },

    /// Decoded bytes carried an extension number with no linked definition
    #[error("{message}")]
    UnknownExtensionField {
        /// Dotted path ending in the field number, e.g. `nested.base_msg.1003`
        path: String,
        /// The unresolved field number
        number: u32,
        /// Full diagnostic including the remediation hint
        message: String,
    },

    /// Re-serialization would exceed the representable wire size
    #[error("message of type {type_name} is {size} bytes, over the {limit} byte conversion limit")]
    ConversionOverflow {
        /// Full type name of the message being converted
        type_name: String,
        /// Size in bytes
        size: usize,
        /// Configured limit
        limit: usize,
    },

    /// Type name could not be resolved in any registered pool
    #[error("message type not found: {0}")]
    TypeNotFound(String),

    /// File descriptors could not be built into a pool
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Sequence index outside the container bounds
    #[error("index {index} out of range for {path} (len {len})")]
    IndexOutOfRange {
        /// Dotted field path
        path: String,
        /// Requested index
        index: isize,
        /// Current length
        len: usize,
    },

    /// Map key or sequence value not present
    #[error("key {key} not found in {path}")]
    KeyNotFound {
        /// Dotted field path
        path: String,
        /// Offending key, rendered
        key: String,
    },

    /// Mutation attempted through a const view
    #[error("cannot mutate {path} through a read-only view")]
    ReadOnly {
        /// Dotted field path
        path: String,
    },

    /// Wire bytes could not be decoded
    #[error("failed to decode {type_name}: {reason}")]
    Decode {
        /// Target type
        type_name: String,
        /// Decoder message
        reason: String,
    },

    /// Text form could not be parsed
    #[error("failed to parse text for {type_name}: {reason}")]
    TextParse {
        /// Target type
        type_name: String,
        /// Parser message
        reason: String,
    },
}

impl BridgeError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::NoSuchField { .. } => ErrorKind::NoSuchField,
            BridgeError::NoSuchOneof { .. } => ErrorKind::NoSuchOneof,
            BridgeError::NotAssignable { .. } => ErrorKind::NotAssignable,
            BridgeError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            BridgeError::InvalidEnumValue { .. } => ErrorKind::InvalidEnumValue,
            BridgeError::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            BridgeError::UnknownExtensionField { .. } => ErrorKind::UnknownExtensionField,
            BridgeError::ConversionOverflow { .. } => ErrorKind::ConversionOverflow,
            BridgeError::TypeNotFound(_) => ErrorKind::TypeNotFound,
            BridgeError::InvalidSchema(_) => ErrorKind::InvalidSchema,
            BridgeError::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            BridgeError::KeyNotFound { .. } => ErrorKind::KeyNotFound,
            BridgeError::ReadOnly { .. } => ErrorKind::ReadOnly,
            BridgeError::Decode { .. } => ErrorKind::Decode,
            BridgeError::TextParse { .. } => ErrorKind::TextParse,
        }
    }

    /// Dotted field path this error refers to, if any
    pub fn path(&self) -> Option<&str> {
        match self {
            BridgeError::NoSuchField { path }
            | BridgeError::NoSuchOneof { path }
            | BridgeError::NotAssignable { path, .. }
            | BridgeError::TypeMismatch { path, .. }
            | BridgeError::InvalidEnumValue { path, .. }
            | BridgeError::UnsupportedOperation { path, .. }
            | BridgeError::UnknownExtensionField { path, .. }
            | BridgeError::IndexOutOfRange { path, .. }
            | BridgeError::KeyNotFound { path, .. }
            | BridgeError::ReadOnly { path } => Some(path),
            _ => None,
        }
    }

    pub(crate) fn mismatch(
        path: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        BridgeError::TypeMismatch {
            path: path.into(),
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub(crate) fn not_assignable(path: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::NotAssignable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(path: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::UnsupportedOperation {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<prost::DecodeError> for BridgeError {
    fn from(e: prost::DecodeError) -> Self {
        BridgeError::Decode {
            type_name: String::new(),
            reason: e.to_string(),
        }
    }
}
