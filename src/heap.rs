//! Heap storage for host instances with generational handles.
//!
//! Instances are stored in a slot vector with generation tracking: freeing a
//! slot bumps its generation, so stale handles are detected instead of
//! resolving to an unrelated instance. Every live slot records which
//! ownership representation it carries and which descriptor table governs
//! its member access.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::table::TableHandle;
use crate::value::InstanceCell;

/// How an instance slot relates to the underlying host value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Non-owning alias; collection never runs the destructor.
    Reference,
    /// Exclusively owned; collection runs the destructor, then frees.
    Owned,
    /// Value semantics; collection runs the destructor, then frees.
    Value,
}

/// Handle to a host instance on the heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    /// Index into the heap's slot vector
    pub index: u32,
    /// Generation for stale-handle detection
    pub generation: u32,
    /// Rust TypeId of the stored value, for runtime type verification
    pub type_id: TypeId,
}

/// A live instance: its storage cell plus the bookkeeping dispatch needs.
pub struct Instance {
    /// Shared storage for the host value.
    pub cell: InstanceCell,
    /// Ownership representation of this slot.
    pub ownership: Ownership,
    /// Descriptor table consulted on every member access.
    pub meta: TableHandle,
    /// TypeId of the stored value.
    pub type_id: TypeId,
}

struct HeapSlot {
    generation: u32,
    value: Option<Instance>,
}

/// Generational instance storage.
pub struct ObjectHeap {
    slots: Vec<HeapSlot>,
    free_list: Vec<u32>,
}

impl ObjectHeap {
    /// Create a new empty heap.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
        }
    }

    /// Allocate a fresh instance holding `value`.
    pub fn allocate<T: Any>(&mut self, value: T, ownership: Ownership, meta: TableHandle) -> ObjectHandle {
        let cell: InstanceCell = Rc::new(RefCell::new(value));
        self.adopt(cell, TypeId::of::<T>(), ownership, meta)
    }

    /// Install an existing cell as a new slot.
    ///
    /// This is how the reference representation aliases an instance that is
    /// owned by another slot (or by the host outright).
    pub fn adopt(
        &mut self,
        cell: InstanceCell,
        type_id: TypeId,
        ownership: Ownership,
        meta: TableHandle,
    ) -> ObjectHandle {
        let instance = Instance {
            cell,
            ownership,
            meta,
            type_id,
        };
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(instance);
            ObjectHandle {
                index,
                generation: slot.generation,
                type_id,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(HeapSlot {
                generation: 0,
                value: Some(instance),
            });
            ObjectHandle {
                index,
                generation: 0,
                type_id,
            }
        }
    }

    /// Look up a live instance, rejecting stale handles.
    pub fn instance(&self, handle: ObjectHandle) -> Result<&Instance, RuntimeError> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
            .ok_or(RuntimeError::StaleHandle {
                index: handle.index,
            })
    }

    /// The descriptor table governing this instance's member access.
    pub fn meta_of(&self, handle: ObjectHandle) -> Result<TableHandle, RuntimeError> {
        Ok(self.instance(handle)?.meta)
    }

    /// Clone out the instance's storage cell.
    pub fn cell(&self, handle: ObjectHandle) -> Result<InstanceCell, RuntimeError> {
        Ok(Rc::clone(&self.instance(handle)?.cell))
    }

    /// Check whether a handle still names a live instance.
    pub fn is_live(&self, handle: ObjectHandle) -> bool {
        self.instance(handle).is_ok()
    }

    /// Run `f` against an immutable borrow of the instance as `T`.
    pub fn with_ref<T: Any, R>(
        &self,
        handle: ObjectHandle,
        f: impl FnOnce(&T) -> R,
    ) -> Result<R, RuntimeError> {
        let instance = self.instance(handle)?;
        let guard = instance
            .cell
            .try_borrow()
            .map_err(|_| RuntimeError::BorrowConflict {
                type_name: std::any::type_name::<T>(),
            })?;
        let value = guard
            .downcast_ref::<T>()
            .ok_or(RuntimeError::ReceiverTypeMismatch {
                expected: std::any::type_name::<T>(),
            })?;
        Ok(f(value))
    }

    /// Run `f` against a mutable borrow of the instance as `T`.
    pub fn with_mut<T: Any, R>(
        &self,
        handle: ObjectHandle,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, RuntimeError> {
        let instance = self.instance(handle)?;
        let mut guard = instance
            .cell
            .try_borrow_mut()
            .map_err(|_| RuntimeError::BorrowConflict {
                type_name: std::any::type_name::<T>(),
            })?;
        let value = guard
            .downcast_mut::<T>()
            .ok_or(RuntimeError::ReceiverTypeMismatch {
                expected: std::any::type_name::<T>(),
            })?;
        Ok(f(value))
    }

    /// Free a slot immediately, bumping its generation.
    pub fn free(&mut self, handle: ObjectHandle) {
        if let Some(slot) = self.slots.get_mut(handle.index as usize)
            && slot.generation == handle.generation
            && slot.value.is_some()
        {
            slot.value = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free_list.push(handle.index);
        }
    }
}

impl Default for ObjectHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHeap")
            .field("slot_count", &self.slots.len())
            .field("free_count", &self.free_list.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> TableHandle {
        TableHandle(0)
    }

    #[test]
    fn allocate_and_read() {
        let mut heap = ObjectHeap::new();
        let handle = heap.allocate(42i32, Ownership::Value, meta());
        let doubled = heap.with_ref::<i32, _>(handle, |v| v * 2).unwrap();
        assert_eq!(doubled, 84);
    }

    #[test]
    fn allocate_and_mutate() {
        let mut heap = ObjectHeap::new();
        let handle = heap.allocate(1i32, Ownership::Owned, meta());
        heap.with_mut::<i32, _>(handle, |v| *v = 100).unwrap();
        assert_eq!(heap.with_ref::<i32, _>(handle, |v| *v).unwrap(), 100);
    }

    #[test]
    fn wrong_type_is_reported() {
        let mut heap = ObjectHeap::new();
        let handle = heap.allocate(42i32, Ownership::Value, meta());
        let err = heap.with_ref::<String, _>(handle, |s| s.len()).unwrap_err();
        assert!(matches!(err, RuntimeError::ReceiverTypeMismatch { .. }));
    }

    #[test]
    fn freed_slot_rejects_stale_handle() {
        let mut heap = ObjectHeap::new();
        let handle = heap.allocate(1i32, Ownership::Owned, meta());
        heap.free(handle);
        assert!(!heap.is_live(handle));
        assert!(matches!(
            heap.instance(handle),
            Err(RuntimeError::StaleHandle { .. })
        ));
    }

    #[test]
    fn slot_reuse_bumps_generation() {
        let mut heap = ObjectHeap::new();
        let first = heap.allocate(1i32, Ownership::Owned, meta());
        heap.free(first);
        let second = heap.allocate(2i32, Ownership::Owned, meta());
        assert_eq!(first.index, second.index);
        assert_ne!(first.generation, second.generation);
        assert!(!heap.is_live(first));
        assert!(heap.is_live(second));
    }

    #[test]
    fn adopted_cell_aliases_source() {
        let mut heap = ObjectHeap::new();
        let owner = heap.allocate(5i32, Ownership::Owned, meta());
        let cell = heap.cell(owner).unwrap();
        let alias = heap.adopt(cell, owner.type_id, Ownership::Reference, meta());

        heap.with_mut::<i32, _>(alias, |v| *v = 9).unwrap();
        assert_eq!(heap.with_ref::<i32, _>(owner, |v| *v).unwrap(), 9);
        assert!(Rc::ptr_eq(
            &heap.cell(owner).unwrap(),
            &heap.cell(alias).unwrap()
        ));
    }
}
