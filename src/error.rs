//! Error types for the binding layer.
//!
//! Errors are split by phase, and each phase has its own enum:
//!
//! ```text
//! ConversionError   - extracting a typed value from a boundary slot
//! RuntimeError      - a property access or call that failed at dispatch time
//! RegistrationError - a usertype registration that is structurally invalid
//! ```
//!
//! Access-time failures (member not found, write rejected) all travel through
//! [`RuntimeError`]; the distinction between an indexing failure and a
//! rejected write is carried in the variant and its message, not in a
//! separate channel.

use thiserror::Error;

/// Errors that occur when converting between Rust values and boundary slots.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Slot holds an incompatible type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// Integer does not fit in the requested type.
    #[error("integer overflow: value {value} does not fit in {target_type}")]
    IntegerOverflow { value: i64, target_type: &'static str },

    /// Float cannot be represented in the requested type.
    #[error("float conversion error: value {value} cannot be represented as {target_type}")]
    FloatConversion {
        value: f64,
        target_type: &'static str,
    },
}

/// Errors raised through the runtime's error channel during member access,
/// dispatch, or native calls.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Argument or return value conversion failed.
    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// Requested member was not found after exhausting the local map, all
    /// declared bases, and any custom fallback.
    #[error("no member '{key}' on type '{type_name}'")]
    IndexingFailure { type_name: String, key: String },

    /// Write attempted against a read-only member.
    #[error("cannot write to member '{member}' of type '{type_name}'")]
    WriteRejected { type_name: String, member: String },

    /// Value is not callable.
    #[error("value of type '{type_name}' is not callable")]
    NotCallable { type_name: &'static str },

    /// Receiver is not an object or table.
    #[error("cannot index a value of type '{type_name}'")]
    InvalidReceiver { type_name: &'static str },

    /// Stale object handle (the instance was collected).
    #[error("stale object handle: slot {index} has been freed")]
    StaleHandle { index: u32 },

    /// Descriptor-table handle does not name a live table.
    #[error("invalid table handle: slot {index}")]
    InvalidTable { index: u32 },

    /// Member-table handle does not name an installed member table.
    #[error("invalid member table handle: slot {index}")]
    InvalidMemberTable { index: u32 },

    /// Instance downcast failed for a receiver.
    #[error("receiver type mismatch: expected {expected}")]
    ReceiverTypeMismatch { expected: &'static str },

    /// Instance cell is already borrowed in an incompatible way.
    #[error("instance of type '{type_name}' is already borrowed")]
    BorrowConflict { type_name: &'static str },

    /// Argument index out of bounds.
    #[error("argument index {index} out of bounds (call has {count} arguments)")]
    ArgumentIndexOutOfBounds { index: usize, count: usize },

    /// No usertype registered under the given name.
    #[error("no usertype registered under the name '{name}'")]
    UnregisteredType { name: String },

    /// Generic runtime failure.
    #[error("runtime error: {message}")]
    Other { message: String },
}

impl RuntimeError {
    /// Create a generic runtime error with a message.
    pub fn other(message: impl Into<String>) -> Self {
        RuntimeError::Other {
            message: message.into(),
        }
    }
}

/// Errors detected while a usertype registration is being finalized.
///
/// These correspond to structurally invalid declarations; they are never
/// raised during dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The base class list contains the type being registered.
    #[error("base class list for '{type_name}' contains the type itself")]
    SelfBase { type_name: String },

    /// The same base appears twice in the declared list.
    #[error("base class '{base}' declared twice for '{type_name}'")]
    DuplicateBase { type_name: String, base: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_type_mismatch_message() {
        let err = ConversionError::TypeMismatch {
            expected: "int",
            actual: "string",
        };
        assert!(err.to_string().contains("type mismatch"));
        assert!(err.to_string().contains("int"));
        assert!(err.to_string().contains("string"));
    }

    #[test]
    fn conversion_integer_overflow_message() {
        let err = ConversionError::IntegerOverflow {
            value: 256,
            target_type: "i8",
        };
        assert!(err.to_string().contains("256"));
        assert!(err.to_string().contains("i8"));
    }

    #[test]
    fn runtime_from_conversion() {
        let err: RuntimeError = ConversionError::TypeMismatch {
            expected: "float",
            actual: "bool",
        }
        .into();
        assert!(matches!(err, RuntimeError::Conversion(_)));
    }

    #[test]
    fn indexing_failure_names_key_and_type() {
        let err = RuntimeError::IndexingFailure {
            type_name: "Point".to_string(),
            key: "missing".to_string(),
        };
        assert!(err.to_string().contains("missing"));
        assert!(err.to_string().contains("Point"));
    }

    #[test]
    fn write_rejection_names_member() {
        let err = RuntimeError::WriteRejected {
            type_name: "Readonly".to_string(),
            member: "compute".to_string(),
        };
        assert!(err.to_string().contains("compute"));
        assert!(err.to_string().contains("Readonly"));
    }

    #[test]
    fn self_base_message() {
        let err = RegistrationError::SelfBase {
            type_name: "Derived".to_string(),
        };
        assert!(err.to_string().contains("Derived"));
    }

    #[test]
    fn duplicate_base_message() {
        let err = RegistrationError::DuplicateBase {
            type_name: "Derived".to_string(),
            base: "Base".to_string(),
        };
        assert!(err.to_string().contains("Base"));
        assert!(err.to_string().contains("twice"));
    }
}
