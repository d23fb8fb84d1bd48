//! Reserved member-name sentinels.
//!
//! The registration builder recognizes a handful of member names and routes
//! them to dedicated slots instead of (or in addition to) the plain name
//! map: call-construction, the custom index/new-index fallbacks, the
//! destructor hook, and the relational operators.

/// Conventional name for the constructor entry in the function map.
pub const CONSTRUCTOR: &str = "new";

/// A recognized metamethod name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaMethod {
    /// Custom index fallback (`__index`)
    Index,
    /// Custom new-index fallback (`__newindex`)
    NewIndex,
    /// Call-construction (`__call`)
    Call,
    /// Destructor hook (`__gc`)
    GarbageCollect,
    /// Equality (`__eq`)
    EqualTo,
    /// Ordering (`__lt`)
    LessThan,
    /// Ordering (`__le`)
    LessThanOrEqualTo,
}

impl MetaMethod {
    /// The boundary-visible name of this metamethod.
    pub const fn name(self) -> &'static str {
        match self {
            MetaMethod::Index => "__index",
            MetaMethod::NewIndex => "__newindex",
            MetaMethod::Call => "__call",
            MetaMethod::GarbageCollect => "__gc",
            MetaMethod::EqualTo => "__eq",
            MetaMethod::LessThan => "__lt",
            MetaMethod::LessThanOrEqualTo => "__le",
        }
    }

    /// Recognize a reserved name.
    pub fn from_name(name: &str) -> Option<MetaMethod> {
        match name {
            "__index" => Some(MetaMethod::Index),
            "__newindex" => Some(MetaMethod::NewIndex),
            "__call" => Some(MetaMethod::Call),
            "__gc" => Some(MetaMethod::GarbageCollect),
            "__eq" => Some(MetaMethod::EqualTo),
            "__lt" => Some(MetaMethod::LessThan),
            "__le" => Some(MetaMethod::LessThanOrEqualTo),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for method in [
            MetaMethod::Index,
            MetaMethod::NewIndex,
            MetaMethod::Call,
            MetaMethod::GarbageCollect,
            MetaMethod::EqualTo,
            MetaMethod::LessThan,
            MetaMethod::LessThanOrEqualTo,
        ] {
            assert_eq!(MetaMethod::from_name(method.name()), Some(method));
        }
    }

    #[test]
    fn ordinary_names_are_not_reserved() {
        assert_eq!(MetaMethod::from_name("speak"), None);
        assert_eq!(MetaMethod::from_name("new"), None);
        assert_eq!(MetaMethod::from_name("__unknown"), None);
    }
}
