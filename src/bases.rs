//! Base-class propagation.
//!
//! A registered type may declare host-side base classes. Each declared base
//! becomes a type-erased [`BaseClass`] entry in the derived type's
//! [`BaseChain`]; on a local dispatch miss the chain is walked in
//! declaration order and the first base that resolves the key wins,
//! shadowing later bases.
//!
//! The chain also carries the runtime check/cast surface: `check_is` answers
//! "is this instance (also) a B", and `cast_to` re-views an instance cell as
//! the base type. Instances are stored type-erased behind a shared cell, so
//! the cast is a checked pass-through of the same cell, not a pointer
//! adjustment.

use std::any::{Any, TypeId};
use std::marker::PhantomData;

use crate::callable::CallFrame;
use crate::dispatch::{self, Resolution};
use crate::error::RuntimeError;
use crate::machine::Machine;
use crate::type_key::TypeKey;
use crate::value::InstanceCell;

/// Type-erased view of one declared base class.
pub trait BaseClass {
    /// Registry key of the base's member table.
    fn type_key(&self) -> TypeKey;

    /// Name the base was registered under.
    fn type_name(&self) -> &str;

    /// Host type identity of the declared base. Distinct from
    /// `Any::type_id` on the descriptor object itself, which method-call
    /// syntax would otherwise resolve to.
    fn declared_type_id(&self) -> TypeId;

    /// Whether this instance's concrete type is the base type.
    fn check_is(&self, instance: &dyn Any) -> bool;

    /// Re-view an instance cell as the base type, if the contents match.
    fn cast_to(&self, cell: InstanceCell) -> Option<InstanceCell>;

    /// Try to resolve a read against the base's own member table.
    fn try_index(
        &self,
        machine: &mut Machine,
        frame: &mut CallFrame,
        name: &str,
    ) -> Result<Resolution, RuntimeError>;

    /// Try to resolve a write against the base's own member table.
    fn try_new_index(
        &self,
        machine: &mut Machine,
        frame: &mut CallFrame,
        name: &str,
    ) -> Result<Resolution, RuntimeError>;
}

/// Concrete [`BaseClass`] for a statically known base type `B`.
///
/// Resolution is late-bound through the machine's member-table registry, so
/// a base registered after the derived type still participates.
pub struct BaseDescriptor<B: Any> {
    name: String,
    key: TypeKey,
    _marker: PhantomData<fn() -> B>,
}

impl<B: Any> BaseDescriptor<B> {
    /// Describe a base registered under `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let key = TypeKey::from_name(&name);
        Self {
            name,
            key,
            _marker: PhantomData,
        }
    }

    fn resolve(
        &self,
        machine: &mut Machine,
        frame: &mut CallFrame,
        name: &str,
        is_index: bool,
    ) -> Result<Resolution, RuntimeError> {
        let Some(handle) = machine.member_table_by_key(self.key) else {
            // Base never registered; treat as empty.
            return Ok(Resolution::Miss);
        };
        let map = machine.member_table(handle)?;
        dispatch::lookup(machine, &map, frame, name, is_index, false)
    }
}

impl<B: Any> BaseClass for BaseDescriptor<B> {
    fn type_key(&self) -> TypeKey {
        self.key
    }

    fn type_name(&self) -> &str {
        &self.name
    }

    fn declared_type_id(&self) -> TypeId {
        TypeId::of::<B>()
    }

    fn check_is(&self, instance: &dyn Any) -> bool {
        instance.is::<B>()
    }

    fn cast_to(&self, cell: InstanceCell) -> Option<InstanceCell> {
        let matches = cell.try_borrow().map(|v| v.is::<B>()).unwrap_or(false);
        matches.then_some(cell)
    }

    fn try_index(
        &self,
        machine: &mut Machine,
        frame: &mut CallFrame,
        name: &str,
    ) -> Result<Resolution, RuntimeError> {
        self.resolve(machine, frame, name, true)
    }

    fn try_new_index(
        &self,
        machine: &mut Machine,
        frame: &mut CallFrame,
        name: &str,
    ) -> Result<Resolution, RuntimeError> {
        self.resolve(machine, frame, name, false)
    }
}

/// Ordered list of a type's declared bases.
#[derive(Default)]
pub struct BaseChain {
    bases: Vec<Box<dyn BaseClass>>,
}

impl BaseChain {
    /// Empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a base. Declaration order is resolution order.
    pub fn push(&mut self, base: Box<dyn BaseClass>) {
        self.bases.push(base);
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn BaseClass> {
        self.bases.iter().map(Box::as_ref)
    }

    /// Walk the chain for a read; first hit wins.
    ///
    /// A base whose bound accessor cannot view the receiver (the downcast
    /// fails) counts as "not found here, try next", never as a hard error:
    /// later bases and the caller's fallback tail still get their turn.
    pub fn walk_index(
        &self,
        machine: &mut Machine,
        frame: &mut CallFrame,
        name: &str,
    ) -> Result<Resolution, RuntimeError> {
        for base in &self.bases {
            match base.try_index(machine, frame, name) {
                Ok(Resolution::Hit(count)) => return Ok(Resolution::Hit(count)),
                Ok(Resolution::Miss) => {}
                Err(RuntimeError::ReceiverTypeMismatch { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(Resolution::Miss)
    }

    /// Walk the chain for a write; first hit wins. Receiver mismatches are
    /// skipped the same way as on the read path.
    pub fn walk_new_index(
        &self,
        machine: &mut Machine,
        frame: &mut CallFrame,
        name: &str,
    ) -> Result<Resolution, RuntimeError> {
        for base in &self.bases {
            match base.try_new_index(machine, frame, name) {
                Ok(Resolution::Hit(count)) => return Ok(Resolution::Hit(count)),
                Ok(Resolution::Miss) => {}
                Err(RuntimeError::ReceiverTypeMismatch { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(Resolution::Miss)
    }

    /// Whether the instance is one of the declared bases (or matches `want`
    /// exactly, which the caller checks first in practice).
    pub fn check_is(&self, instance: &dyn Any, want: TypeId) -> bool {
        self.bases
            .iter()
            .any(|base| base.declared_type_id() == want && base.check_is(instance))
    }

    /// Cast an instance cell to the base registered with `want`, if any.
    pub fn cast_to(&self, cell: &InstanceCell, want: TypeId) -> Option<InstanceCell> {
        self.bases
            .iter()
            .find(|base| base.declared_type_id() == want)
            .and_then(|base| base.cast_to(InstanceCell::clone(cell)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Animal;
    struct Rock;

    #[test]
    fn descriptor_reports_identity() {
        let base = BaseDescriptor::<Animal>::new("Animal");
        assert_eq!(base.type_name(), "Animal");
        assert_eq!(base.type_key(), TypeKey::from_name("Animal"));
        assert_eq!(base.declared_type_id(), TypeId::of::<Animal>());
    }

    #[test]
    fn check_is_matches_concrete_type() {
        let base = BaseDescriptor::<Animal>::new("Animal");
        assert!(base.check_is(&Animal));
        assert!(!base.check_is(&Rock));
    }

    #[test]
    fn cast_to_passes_matching_cell_through() {
        let base = BaseDescriptor::<Animal>::new("Animal");
        let cell: InstanceCell = Rc::new(RefCell::new(Animal));
        let cast = base.cast_to(InstanceCell::clone(&cell));
        assert!(cast.is_some_and(|c| Rc::ptr_eq(&c, &cell)));

        let other: InstanceCell = Rc::new(RefCell::new(Rock));
        assert!(base.cast_to(other).is_none());
    }

    #[test]
    fn unregistered_base_is_a_miss() {
        let mut machine = Machine::new();
        let base = BaseDescriptor::<Animal>::new("NeverRegistered");
        let mut frame = CallFrame::new(vec![crate::value::Dynamic::Nil]);
        let resolved = base.try_index(&mut machine, &mut frame, "speak").unwrap();
        assert_eq!(resolved, Resolution::Miss);
    }

    #[test]
    fn chain_checks_by_declared_type() {
        let mut chain = BaseChain::new();
        chain.push(Box::new(BaseDescriptor::<Animal>::new("Animal")));

        assert!(chain.check_is(&Animal, TypeId::of::<Animal>()));
        assert!(!chain.check_is(&Rock, TypeId::of::<Animal>()));
        assert!(!chain.check_is(&Animal, TypeId::of::<Rock>()));
    }
}
