//! Boundary value representation.
//!
//! [`Dynamic`] is the value type that crosses the host/script boundary: every
//! argument, return value, member, and key is one of these. It is
//! deliberately small; the general value model of the embedding runtime is
//! out of scope, and this crate only needs enough to express keys, members,
//! and instances.

use std::fmt;
use std::rc::Rc;

use crate::callable::Callable;
use crate::heap::ObjectHandle;
use crate::table::TableHandle;

/// A dynamically-typed boundary value.
#[derive(Clone)]
pub enum Dynamic {
    /// Absent / no value
    Nil,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value (owned)
    Str(String),
    /// Type-erased callable
    Callable(Callable),
    /// Handle to a host object instance
    Object(ObjectHandle),
    /// Handle to a descriptor or shim table
    Table(TableHandle),
}

impl Dynamic {
    /// Get a human-readable name for this value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Dynamic::Nil => "nil",
            Dynamic::Bool(_) => "bool",
            Dynamic::Int(_) => "int",
            Dynamic::Float(_) => "float",
            Dynamic::Str(_) => "string",
            Dynamic::Callable(_) => "callable",
            Dynamic::Object(_) => "object",
            Dynamic::Table(_) => "table",
        }
    }

    /// Check if this value is nil.
    pub fn is_nil(&self) -> bool {
        matches!(self, Dynamic::Nil)
    }

    /// Borrow the string content, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Dynamic::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Render this value for use in an error message about a failed access.
    pub fn describe(&self) -> String {
        match self {
            Dynamic::Nil => "nil".to_string(),
            Dynamic::Bool(b) => b.to_string(),
            Dynamic::Int(v) => v.to_string(),
            Dynamic::Float(v) => v.to_string(),
            Dynamic::Str(s) => s.clone(),
            other => format!("<{}>", other.type_name()),
        }
    }
}

impl PartialEq for Dynamic {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Dynamic::Nil, Dynamic::Nil) => true,
            (Dynamic::Bool(a), Dynamic::Bool(b)) => a == b,
            (Dynamic::Int(a), Dynamic::Int(b)) => a == b,
            (Dynamic::Float(a), Dynamic::Float(b)) => a == b,
            (Dynamic::Str(a), Dynamic::Str(b)) => a == b,
            (Dynamic::Callable(a), Dynamic::Callable(b)) => a.ptr_eq(b),
            (Dynamic::Object(a), Dynamic::Object(b)) => a == b,
            (Dynamic::Table(a), Dynamic::Table(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Dynamic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dynamic::Nil => write!(f, "Nil"),
            Dynamic::Bool(b) => write!(f, "Bool({b})"),
            Dynamic::Int(v) => write!(f, "Int({v})"),
            Dynamic::Float(v) => write!(f, "Float({v})"),
            Dynamic::Str(s) => write!(f, "Str({s:?})"),
            Dynamic::Callable(_) => write!(f, "Callable(...)"),
            Dynamic::Object(h) => write!(f, "Object({h:?})"),
            Dynamic::Table(h) => write!(f, "Table({h:?})"),
        }
    }
}

/// Shared, interiorly-mutable storage for one host instance.
///
/// The non-owning reference representation aliases the same cell as the
/// instance it refers to, so identity comparisons can use [`Rc::ptr_eq`].
pub type InstanceCell = Rc<std::cell::RefCell<dyn std::any::Any>>;
