//! Deterministic hash-based registry identity.
//!
//! This module provides [`TypeKey`], a 64-bit hash identifying the registry
//! slots a registered usertype installs: one descriptor table per ownership
//! representation plus the type-level shim. Keys are computed
//! deterministically from the registered type name with domain-specific
//! mixing constants, so repeated registration of the same name lands on the
//! same slots (and overwrites them) while structurally similar types never
//! collide.

use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Domain-specific mixing constants for key computation.
///
/// Each descriptor-table variant gets its own domain so the three parallel
/// tables of one type occupy distinct registry slots.
pub mod key_constants {
    /// Domain marker for plain type identity
    pub const TYPE: u64 = 0x6d3a91c24fb07e58;

    /// Domain marker for the non-owning reference descriptor table
    pub const METATABLE_REFERENCE: u64 = 0x1f84c2d9a60b5e37;

    /// Domain marker for the exclusively-owned descriptor table
    pub const METATABLE_OWNED: u64 = 0x8b5d70e3c19f2a46;

    /// Domain marker for the by-value descriptor table
    pub const METATABLE_VALUE: u64 = 0x4c2e85f1d7a39b60;

    /// Domain marker for the type-level shim table
    pub const SHIM: u64 = 0xe1793bd05c68f42a;
}

/// The three ownership representations a registered usertype exposes.
///
/// All three route member access through the same shared member table; the
/// variant decides which descriptor table an instance carries and how its
/// collection behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Non-owning reference to an instance kept alive elsewhere.
    Reference,
    /// Exclusively-owned, heap-boxed instance.
    Owned,
    /// Value-semantics instance.
    Value,
}

impl Variant {
    /// All variants, in materialization order.
    pub const ALL: [Variant; 3] = [Variant::Reference, Variant::Owned, Variant::Value];

    fn domain(self) -> u64 {
        match self {
            Variant::Reference => key_constants::METATABLE_REFERENCE,
            Variant::Owned => key_constants::METATABLE_OWNED,
            Variant::Value => key_constants::METATABLE_VALUE,
        }
    }
}

/// A deterministic 64-bit registry key.
///
/// The same type name always produces the same key for a given slot kind.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeKey(pub u64);

impl TypeKey {
    /// Key identifying the type itself (used for the member-table registry).
    #[inline]
    pub fn from_name(name: &str) -> Self {
        TypeKey(key_constants::TYPE ^ xxh64(name.as_bytes(), 0))
    }

    /// Key for the descriptor table of one ownership variant.
    #[inline]
    pub fn metatable(name: &str, variant: Variant) -> Self {
        TypeKey(variant.domain() ^ xxh64(name.as_bytes(), 0))
    }

    /// Key for the type-level shim table.
    #[inline]
    pub fn shim(name: &str) -> Self {
        TypeKey(key_constants::SHIM ^ xxh64(name.as_bytes(), 0))
    }

    /// Get the underlying u64 value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({:#018x})", self.0)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_determinism() {
        assert_eq!(TypeKey::from_name("Point"), TypeKey::from_name("Point"));
        assert_eq!(
            TypeKey::metatable("Point", Variant::Owned),
            TypeKey::metatable("Point", Variant::Owned)
        );
        assert_eq!(TypeKey::shim("Point"), TypeKey::shim("Point"));
    }

    #[test]
    fn key_uniqueness_across_names() {
        assert_ne!(TypeKey::from_name("Point"), TypeKey::from_name("Player"));
    }

    #[test]
    fn variant_tables_occupy_distinct_slots() {
        let reference = TypeKey::metatable("Point", Variant::Reference);
        let owned = TypeKey::metatable("Point", Variant::Owned);
        let value = TypeKey::metatable("Point", Variant::Value);
        assert_ne!(reference, owned);
        assert_ne!(reference, value);
        assert_ne!(owned, value);
    }

    #[test]
    fn shim_distinct_from_variants_and_type() {
        let shim = TypeKey::shim("Point");
        assert_ne!(shim, TypeKey::from_name("Point"));
        for variant in Variant::ALL {
            assert_ne!(shim, TypeKey::metatable("Point", variant));
        }
    }

    #[test]
    fn key_display_is_hex() {
        let key = TypeKey::from_name("Point");
        assert!(format!("{key}").starts_with("0x"));
        assert!(format!("{key:?}").starts_with("TypeKey(0x"));
    }
}
