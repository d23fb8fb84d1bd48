//! The shared per-type member table.
//!
//! One [`MemberTable`] exists per registered usertype. It is built once when
//! registration completes, never mutated afterwards, and shared by reference
//! among every descriptor-table variant of that type. The arena issues
//! stable handles on insertion, so no global uniqueness counter is needed to
//! keep repeated registrations of structurally similar types apart.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::accessor::VarAccessor;
use crate::bases::BaseChain;
use crate::callable::Callable;
use crate::error::RuntimeError;
use crate::value::Dynamic;

/// Handle to an installed member table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemberTableHandle(pub u32);

/// The per-type table of named members, immutable after registration.
pub struct MemberTable {
    /// Name the type was registered under, used in error messages.
    pub type_name: String,
    /// Named function-style members (callables and constants).
    pub functions: FxHashMap<String, Dynamic>,
    /// Named variable accessors. Checked before `functions` on every
    /// dispatch, so a variable always shadows a same-named function.
    pub variables: FxHashMap<String, Box<dyn VarAccessor>>,
    /// Custom catch-all index handler, if registered.
    pub index_fallback: Option<Callable>,
    /// Custom catch-all new-index handler, if registered.
    pub new_index_fallback: Option<Callable>,
    /// Declared base classes, walked in declaration order on local miss.
    pub bases: Arc<BaseChain>,
}

/// Arena storage for member tables.
///
/// Inserted tables are wrapped in `Arc`; lookups clone the `Arc` out so the
/// dispatcher can hold the table across nested runtime re-entry.
#[derive(Default)]
pub struct MemberTableArena {
    maps: Vec<Arc<MemberTable>>,
}

impl MemberTableArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a member table, returning its handle.
    pub fn insert(&mut self, table: MemberTable) -> MemberTableHandle {
        let index = self.maps.len() as u32;
        self.maps.push(Arc::new(table));
        MemberTableHandle(index)
    }

    /// Look up an installed member table.
    pub fn get(&self, handle: MemberTableHandle) -> Result<Arc<MemberTable>, RuntimeError> {
        self.maps
            .get(handle.0 as usize)
            .cloned()
            .ok_or(RuntimeError::InvalidMemberTable { index: handle.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_table(name: &str) -> MemberTable {
        MemberTable {
            type_name: name.to_string(),
            functions: FxHashMap::default(),
            variables: FxHashMap::default(),
            index_fallback: None,
            new_index_fallback: None,
            bases: Arc::new(BaseChain::default()),
        }
    }

    #[test]
    fn arena_issues_sequential_handles() {
        let mut arena = MemberTableArena::new();
        let a = arena.insert(empty_table("A"));
        let b = arena.insert(empty_table("B"));
        assert_ne!(a, b);
        assert_eq!(arena.get(a).unwrap().type_name, "A");
        assert_eq!(arena.get(b).unwrap().type_name, "B");
    }

    #[test]
    fn arena_rejects_unknown_handle() {
        let arena = MemberTableArena::new();
        assert!(matches!(
            arena.get(MemberTableHandle(0)),
            Err(RuntimeError::InvalidMemberTable { index: 0 })
        ));
    }

    #[test]
    fn lookups_share_one_table() {
        let mut arena = MemberTableArena::new();
        let handle = arena.insert(empty_table("A"));
        let first = arena.get(handle).unwrap();
        let second = arena.get(handle).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
