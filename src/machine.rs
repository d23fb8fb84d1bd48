//! The embedding machine.
//!
//! [`Machine`] owns the heap, the table arenas, and the registry mapping
//! deterministic type keys to installed tables. It is the boundary surface a
//! host embeds: registration materializes into it, instances are created
//! through it, and every scripted member access enters through
//! [`Machine::index`] / [`Machine::new_index`].

use std::any::{Any, TypeId};
use std::rc::Rc;

use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::callable::{CallFrame, Callable};
use crate::error::RuntimeError;
use crate::heap::{ObjectHandle, ObjectHeap, Ownership};
use crate::member_table::{MemberTable, MemberTableArena, MemberTableHandle};
use crate::meta::MetaMethod;
use crate::table::{IndexStrategy, TableArena, TableHandle};
use crate::type_key::{TypeKey, Variant};
use crate::value::{Dynamic, InstanceCell};

/// Runtime state for one embedding.
pub struct Machine {
    heap: ObjectHeap,
    tables: TableArena,
    member_tables: MemberTableArena,
    registry: FxHashMap<TypeKey, TableHandle>,
    member_registry: FxHashMap<TypeKey, MemberTableHandle>,
}

impl Machine {
    /// Create an empty machine.
    pub fn new() -> Self {
        Self {
            heap: ObjectHeap::new(),
            tables: TableArena::new(),
            member_tables: MemberTableArena::new(),
            registry: FxHashMap::default(),
            member_registry: FxHashMap::default(),
        }
    }

    pub fn heap(&self) -> &ObjectHeap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut ObjectHeap {
        &mut self.heap
    }

    pub fn tables(&self) -> &TableArena {
        &self.tables
    }

    pub fn tables_mut(&mut self) -> &mut TableArena {
        &mut self.tables
    }

    pub fn member_tables_mut(&mut self) -> &mut MemberTableArena {
        &mut self.member_tables
    }

    /// Bind a registry key to a descriptor table. Re-binding a key
    /// overwrites the previous slot.
    pub fn register_table(&mut self, key: TypeKey, handle: TableHandle) {
        self.registry.insert(key, handle);
    }

    /// Look up a registry key.
    pub fn registry_get(&self, key: TypeKey) -> Option<TableHandle> {
        self.registry.get(&key).copied()
    }

    /// Bind a type key to its member table.
    pub fn register_member_table(&mut self, key: TypeKey, handle: MemberTableHandle) {
        self.member_registry.insert(key, handle);
    }

    /// Look up a type's member table by key.
    pub fn member_table_by_key(&self, key: TypeKey) -> Option<MemberTableHandle> {
        self.member_registry.get(&key).copied()
    }

    /// Resolve a member-table handle.
    pub fn member_table(&self, handle: MemberTableHandle) -> Result<Arc<MemberTable>, RuntimeError> {
        self.member_tables.get(handle)
    }

    /// The type-level shim table registered under `type_name`, if any.
    pub fn shim_of(&self, type_name: &str) -> Option<TableHandle> {
        self.registry_get(TypeKey::shim(type_name))
    }

    /// Create an instance of a registered type, choosing the descriptor
    /// table for its ownership representation.
    pub fn create<T: Any>(
        &mut self,
        type_name: &str,
        value: T,
        ownership: Ownership,
    ) -> Result<ObjectHandle, RuntimeError> {
        let variant = match ownership {
            Ownership::Reference => Variant::Reference,
            Ownership::Owned => Variant::Owned,
            Ownership::Value => Variant::Value,
        };
        let meta = self
            .registry_get(TypeKey::metatable(type_name, variant))
            .ok_or_else(|| RuntimeError::UnregisteredType {
                name: type_name.to_string(),
            })?;
        Ok(self.heap.allocate(value, ownership, meta))
    }

    /// Create a non-owning alias of an existing instance. The alias shares
    /// the source's storage cell and carries the reference descriptor
    /// table, so collecting it never destroys the instance.
    pub fn create_alias(
        &mut self,
        type_name: &str,
        source: ObjectHandle,
    ) -> Result<ObjectHandle, RuntimeError> {
        let meta = self
            .registry_get(TypeKey::metatable(type_name, Variant::Reference))
            .ok_or_else(|| RuntimeError::UnregisteredType {
                name: type_name.to_string(),
            })?;
        let cell = self.heap.cell(source)?;
        Ok(self.heap.adopt(cell, source.type_id, Ownership::Reference, meta))
    }

    /// Whether the instance can be viewed as host type `B`: either its
    /// concrete type is `B`, or its descriptor table declares `B` as a base
    /// and the stored value matches.
    pub fn instance_is<B: Any>(&self, handle: ObjectHandle) -> Result<bool, RuntimeError> {
        let instance = self.heap.instance(handle)?;
        if instance.type_id == TypeId::of::<B>() {
            return Ok(true);
        }
        let Some(chain) = self.tables.get(instance.meta)?.base_ops.as_ref() else {
            return Ok(false);
        };
        let guard = instance
            .cell
            .try_borrow()
            .map_err(|_| RuntimeError::BorrowConflict {
                type_name: std::any::type_name::<B>(),
            })?;
        Ok(chain.check_is(&*guard, TypeId::of::<B>()))
    }

    /// Re-view an instance as base type `B`, sharing its storage cell.
    /// `None` when `B` is neither the concrete type nor a declared base
    /// whose type matches the stored value.
    pub fn cast_to_base<B: Any>(
        &self,
        handle: ObjectHandle,
    ) -> Result<Option<InstanceCell>, RuntimeError> {
        let instance = self.heap.instance(handle)?;
        if instance.type_id == TypeId::of::<B>() {
            return Ok(Some(Rc::clone(&instance.cell)));
        }
        let Some(chain) = self.tables.get(instance.meta)?.base_ops.as_ref() else {
            return Ok(None);
        };
        Ok(chain.cast_to(&instance.cell, TypeId::of::<B>()))
    }

    /// Invoke a boundary value as a function.
    ///
    /// Callables are invoked directly. A table is callable when its
    /// metatable carries `__call`; the table itself is prepended as the
    /// first argument, which is how call-construction reaches the
    /// registered constructor.
    pub fn call(&mut self, target: Dynamic, args: Vec<Dynamic>) -> Result<Vec<Dynamic>, RuntimeError> {
        match target {
            Dynamic::Callable(callable) => self.call_callable(callable, args),
            Dynamic::Table(handle) => {
                let hook = self
                    .tables
                    .get(handle)?
                    .meta
                    .map(|meta| self.tables.get(meta))
                    .transpose()?
                    .and_then(|meta| meta.fields.get(MetaMethod::Call.name()).cloned());
                let Some(Dynamic::Callable(callable)) = hook else {
                    return Err(RuntimeError::NotCallable { type_name: "table" });
                };
                let mut full_args = Vec::with_capacity(args.len() + 1);
                full_args.push(Dynamic::Table(handle));
                full_args.extend(args);
                self.call_callable(callable, full_args)
            }
            other => Err(RuntimeError::NotCallable {
                type_name: other.type_name(),
            }),
        }
    }

    /// Invoke a callable with the given arguments, collecting its results.
    pub fn call_callable(
        &mut self,
        callable: Callable,
        args: Vec<Dynamic>,
    ) -> Result<Vec<Dynamic>, RuntimeError> {
        let mut frame = CallFrame::new(args);
        callable.call(self, &mut frame)?;
        Ok(frame.results)
    }

    /// Read `receiver[key]`.
    ///
    /// Objects resolve through their descriptor table's strategy. Tables
    /// answer from their own fields first, then route through their
    /// metatable's dispatcher; a flat miss is `Nil`, not an error.
    pub fn index(&mut self, receiver: Dynamic, key: Dynamic) -> Result<Dynamic, RuntimeError> {
        match receiver {
            Dynamic::Object(handle) => {
                let meta = self.heap.meta_of(handle)?;
                let strategy = self.tables.get(meta)?.index;
                match strategy {
                    IndexStrategy::SelfTable => Ok(self.flat_read(meta, &key)?),
                    IndexStrategy::Dispatch(dispatcher) => {
                        let mut frame = CallFrame::new(vec![Dynamic::Object(handle), key]);
                        dispatcher.index(self, &mut frame)?;
                        Ok(Self::first_result(frame))
                    }
                }
            }
            Dynamic::Table(handle) => {
                if let Some(found) = self.raw_table_read(handle, &key)? {
                    return Ok(found);
                }
                let Some(dispatcher) = self.meta_dispatcher(handle)? else {
                    return Ok(Dynamic::Nil);
                };
                let mut frame = CallFrame::new(vec![Dynamic::Table(handle), key]);
                dispatcher.index(self, &mut frame)?;
                Ok(Self::first_result(frame))
            }
            other => Err(RuntimeError::InvalidReceiver {
                type_name: other.type_name(),
            }),
        }
    }

    /// Write `receiver[key] = value`.
    pub fn new_index(
        &mut self,
        receiver: Dynamic,
        key: Dynamic,
        value: Dynamic,
    ) -> Result<(), RuntimeError> {
        match receiver {
            Dynamic::Object(handle) => {
                let meta = self.heap.meta_of(handle)?;
                let (strategy, map) = {
                    let table = self.tables.get(meta)?;
                    (table.index, table.map)
                };
                match strategy {
                    // A flat descriptor table serves reads only; instances
                    // carry no write handler, so every write is rejected.
                    IndexStrategy::SelfTable => {
                        let type_name = match map {
                            Some(map) => self.member_table(map)?.type_name.clone(),
                            None => "object".to_string(),
                        };
                        Err(RuntimeError::WriteRejected {
                            type_name,
                            member: key.describe(),
                        })
                    }
                    IndexStrategy::Dispatch(dispatcher) => {
                        let mut frame =
                            CallFrame::new(vec![Dynamic::Object(handle), key, value]);
                        dispatcher.new_index(self, &mut frame)?;
                        Ok(())
                    }
                }
            }
            Dynamic::Table(handle) => {
                if let Some(dispatcher) = self.meta_dispatcher(handle)? {
                    let mut frame = CallFrame::new(vec![Dynamic::Table(handle), key, value]);
                    dispatcher.new_index(self, &mut frame)?;
                    return Ok(());
                }
                self.flat_write(handle, key, value)
            }
            other => Err(RuntimeError::InvalidReceiver {
                type_name: other.type_name(),
            }),
        }
    }

    /// Collect an instance: run its descriptor table's destructor hook if
    /// one is present, then free the slot. The reference descriptor table
    /// carries no hook, so aliases free without destroying. Collecting an
    /// already-dead handle is a no-op.
    pub fn collect(&mut self, handle: ObjectHandle) -> Result<(), RuntimeError> {
        if !self.heap.is_live(handle) {
            return Ok(());
        }
        let meta = self.heap.meta_of(handle)?;
        let hook = self
            .tables
            .get(meta)?
            .fields
            .get(MetaMethod::GarbageCollect.name())
            .cloned();
        if let Some(Dynamic::Callable(hook)) = hook {
            self.call_callable(hook, vec![Dynamic::Object(handle)])?;
        }
        self.heap.free(handle);
        Ok(())
    }

    fn flat_read(&self, table: TableHandle, key: &Dynamic) -> Result<Dynamic, RuntimeError> {
        let Some(name) = key.as_str() else {
            return Ok(Dynamic::Nil);
        };
        Ok(self
            .tables
            .get(table)?
            .fields
            .get(name)
            .cloned()
            .unwrap_or(Dynamic::Nil))
    }

    fn raw_table_read(
        &self,
        table: TableHandle,
        key: &Dynamic,
    ) -> Result<Option<Dynamic>, RuntimeError> {
        let Some(name) = key.as_str() else {
            return Ok(None);
        };
        Ok(self.tables.get(table)?.fields.get(name).cloned())
    }

    fn flat_write(
        &mut self,
        table: TableHandle,
        key: Dynamic,
        value: Dynamic,
    ) -> Result<(), RuntimeError> {
        let name = match key {
            Dynamic::Str(name) => name,
            other => {
                return Err(RuntimeError::other(format!(
                    "cannot use a {} key on a flat table",
                    other.type_name()
                )));
            }
        };
        self.tables.get_mut(table)?.fields.insert(name, value);
        Ok(())
    }

    fn meta_dispatcher(&self, table: TableHandle) -> Result<Option<crate::dispatch::Dispatcher>, RuntimeError> {
        let Some(meta) = self.tables.get(table)?.meta else {
            return Ok(None);
        };
        match self.tables.get(meta)?.index {
            IndexStrategy::Dispatch(dispatcher) => Ok(Some(dispatcher)),
            IndexStrategy::SelfTable => Ok(None),
        }
    }

    fn first_result(frame: CallFrame) -> Dynamic {
        frame.results.into_iter().next().unwrap_or(Dynamic::Nil)
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}
