//! Descriptor tables.
//!
//! Each registered usertype materializes into several of these: one per
//! ownership representation, a secondary metatable behind each of those, and
//! the type-level shim. A table is a flat field map plus an index strategy —
//! either the table answers lookups from its own fields (the fast path for
//! simple leaf types), or every access routes through a [`Dispatcher`] bound
//! to the type's shared member table.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::bases::BaseChain;
use crate::dispatch::Dispatcher;
use crate::error::RuntimeError;
use crate::member_table::MemberTableHandle;
use crate::value::Dynamic;

/// Handle to a descriptor table in the [`TableArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TableHandle(pub u32);

/// How a table answers member accesses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexStrategy {
    /// The table is its own index target: lookups read the flat field map
    /// directly and writes insert into it, with no dispatch involved.
    SelfTable,
    /// Every access goes through the bound dispatcher.
    Dispatch(Dispatcher),
}

/// One boundary-visible descriptor table.
pub struct Table {
    /// Flat fields, populated from the type's function map at
    /// materialization time.
    pub fields: FxHashMap<String, Dynamic>,
    /// How accesses against this table resolve.
    pub index: IndexStrategy,
    /// The table's own metatable, if any (carries call-construction and
    /// static-style dispatch).
    pub meta: Option<TableHandle>,
    /// The shared member table this table was materialized from. Present on
    /// every variant of a registered type, including flat-path ones, so base
    /// propagation stays resolvable.
    pub map: Option<MemberTableHandle>,
    /// Base-class check/cast surface, installed when the type declared bases.
    pub base_ops: Option<Arc<BaseChain>>,
}

impl Table {
    /// Create an empty table with the flat strategy.
    pub fn new() -> Self {
        Self {
            fields: FxHashMap::default(),
            index: IndexStrategy::SelfTable,
            meta: None,
            map: None,
            base_ops: None,
        }
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

/// Arena storage for descriptor tables.
///
/// Tables live as long as the machine; handles are plain indices.
#[derive(Default)]
pub struct TableArena {
    tables: Vec<Table>,
}

impl TableArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a table, returning its handle.
    pub fn insert(&mut self, table: Table) -> TableHandle {
        let index = self.tables.len() as u32;
        self.tables.push(table);
        TableHandle(index)
    }

    /// Look up a table.
    pub fn get(&self, handle: TableHandle) -> Result<&Table, RuntimeError> {
        self.tables
            .get(handle.0 as usize)
            .ok_or(RuntimeError::InvalidTable { index: handle.0 })
    }

    /// Look up a table mutably.
    pub fn get_mut(&mut self, handle: TableHandle) -> Result<&mut Table, RuntimeError> {
        self.tables
            .get_mut(handle.0 as usize)
            .ok_or(RuntimeError::InvalidTable { index: handle.0 })
    }
}
