//! Usertype registration.
//!
//! [`UsertypeBuilder`] accumulates one type's members, then
//! [`UsertypeBuilder::register`] validates the declaration and materializes
//! the descriptor tables into a machine. Members are tagged [`Member`]
//! values: the tag decides the map an entry lands in and variables always
//! displace a same-named function, never the other way around. Reserved
//! names (`__call`, `__index`, `__newindex`, `__gc`, the comparators) route
//! to dedicated slots.
//!
//! Registering any variable, or a custom index/new-index handler, flips the
//! type off the flat-table fast path: every access must then go through the
//! dispatcher.

use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::rc::Rc;

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::accessor::{FieldBinding, PropertyBinding, VarAccessor};
use crate::bases::{BaseClass, BaseDescriptor};
use crate::callable::Callable;
use crate::error::{RegistrationError, RuntimeError};
use crate::heap::Ownership;
use crate::machine::Machine;
use crate::materialize;
use crate::meta::{CONSTRUCTOR, MetaMethod};
use crate::value::Dynamic;

bitflags! {
    /// Structural facts about a registration that decide table shape.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RegistrationFlags: u8 {
        /// Flat field lookup cannot serve this type; accesses must route
        /// through the dispatcher.
        const MUST_DISPATCH = 1;
        /// The variant tables need a secondary metatable of their own.
        const SECONDARY_META = 1 << 1;
    }
}

/// One member being registered, tagged by kind.
pub enum Member {
    /// A callable member (method or free function bound under a name).
    Function(Callable),
    /// A plain value member, readable but not computed.
    Constant(Dynamic),
    /// A get/set variable accessor.
    Var(Box<dyn VarAccessor>),
}

/// Accumulated declaration state, consumed by materialization.
pub(crate) struct RegistrationState {
    pub(crate) type_name: String,
    pub(crate) self_type: TypeId,
    pub(crate) functions: FxHashMap<String, Dynamic>,
    pub(crate) variables: FxHashMap<String, Box<dyn VarAccessor>>,
    pub(crate) call_construct: Option<Callable>,
    pub(crate) destructor: Option<Callable>,
    pub(crate) index_fallback: Option<Callable>,
    pub(crate) new_index_fallback: Option<Callable>,
    pub(crate) bases: Vec<Box<dyn BaseClass>>,
    pub(crate) eq: Option<Callable>,
    pub(crate) lt: Option<Callable>,
    pub(crate) le: Option<Callable>,
    pub(crate) flags: RegistrationFlags,
}

/// Builder for exposing one host type `T` to script code.
pub struct UsertypeBuilder<T: Any> {
    state: RegistrationState,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any> UsertypeBuilder<T> {
    /// Start a registration for `T` under `name`, with a synthesized
    /// constructor that default-constructs the instance.
    pub fn new(name: impl Into<String>) -> Self
    where
        T: Default,
    {
        let name = name.into();
        let ctor_name = name.clone();
        Self::without_constructor(name).constructor(Callable::from_fn(move |machine, frame| {
            let handle = machine.create(&ctor_name, T::default(), Ownership::Owned)?;
            frame.push(Dynamic::Object(handle));
            Ok(1)
        }))
    }

    /// Start a registration for `T` under `name` with a caller-supplied
    /// constructor.
    pub fn with_constructor(name: impl Into<String>, ctor: Callable) -> Self {
        Self::without_constructor(name).constructor(ctor)
    }

    /// Start a registration for `T` under `name` with no constructor
    /// exposed; instances can only enter script code from the host side.
    pub fn without_constructor(name: impl Into<String>) -> Self {
        Self {
            state: RegistrationState {
                type_name: name.into(),
                self_type: TypeId::of::<T>(),
                functions: FxHashMap::default(),
                variables: FxHashMap::default(),
                call_construct: None,
                destructor: None,
                index_fallback: None,
                new_index_fallback: None,
                bases: Vec::new(),
                eq: None,
                lt: None,
                le: None,
                flags: RegistrationFlags::empty(),
            },
            _marker: PhantomData,
        }
    }

    /// Register a member under `name`. Tag routing:
    ///
    /// - variables go to the variables map, displacing a same-named
    ///   function, and force dispatch
    /// - reserved function names route to their dedicated slots
    /// - everything else lands in the function map, displacing a same-named
    ///   variable
    ///
    /// Last registration under a name wins.
    pub fn insert(mut self, name: impl Into<String>, member: Member) -> Self {
        let name = name.into();
        match member {
            Member::Var(accessor) => {
                self.state.functions.remove(&name);
                self.state.variables.insert(name, accessor);
                self.state.flags |=
                    RegistrationFlags::MUST_DISPATCH | RegistrationFlags::SECONDARY_META;
            }
            Member::Function(callable) => match MetaMethod::from_name(&name) {
                Some(MetaMethod::Call) => {
                    self.state.call_construct = Some(callable);
                }
                Some(MetaMethod::Index) => {
                    self.state.index_fallback = Some(callable.clone());
                    self.state.flags |= RegistrationFlags::MUST_DISPATCH;
                    self.state.variables.remove(&name);
                    self.state.functions.insert(name, Dynamic::Callable(callable));
                }
                Some(MetaMethod::NewIndex) => {
                    self.state.new_index_fallback = Some(callable.clone());
                    self.state.flags |= RegistrationFlags::MUST_DISPATCH;
                    self.state.variables.remove(&name);
                    self.state.functions.insert(name, Dynamic::Callable(callable));
                }
                Some(MetaMethod::GarbageCollect) => {
                    self.state.destructor = Some(callable);
                }
                Some(MetaMethod::EqualTo) => {
                    self.state.eq = Some(callable);
                }
                Some(MetaMethod::LessThan) => {
                    self.state.lt = Some(callable);
                }
                Some(MetaMethod::LessThanOrEqualTo) => {
                    self.state.le = Some(callable);
                }
                None => {
                    self.state.variables.remove(&name);
                    self.state.functions.insert(name, Dynamic::Callable(callable));
                }
            },
            Member::Constant(value) => {
                self.state.variables.remove(&name);
                self.state.functions.insert(name, value);
            }
        }
        self
    }

    /// Register a callable member.
    pub fn function(self, name: impl Into<String>, callable: Callable) -> Self {
        self.insert(name, Member::Function(callable))
    }

    /// Register a constant value member.
    pub fn constant(self, name: impl Into<String>, value: Dynamic) -> Self {
        self.insert(name, Member::Constant(value))
    }

    /// Register a variable through any accessor implementation.
    pub fn variable(self, name: impl Into<String>, accessor: impl VarAccessor + 'static) -> Self {
        self.insert(name, Member::Var(Box::new(accessor)))
    }

    /// Register a read/write field.
    pub fn field<V>(self, name: impl Into<String>, get: fn(&T) -> V, set: fn(&mut T, V)) -> Self
    where
        V: crate::convert::IntoSlot + crate::convert::FromSlot + 'static,
    {
        self.variable(name, FieldBinding::new(get, set))
    }

    /// Register a read-only field.
    pub fn field_readonly<V>(self, name: impl Into<String>, get: fn(&T) -> V) -> Self
    where
        V: crate::convert::IntoSlot + crate::convert::FromSlot + 'static,
    {
        self.variable(name, FieldBinding::readonly(get))
    }

    /// Register a computed read/write property.
    pub fn property<V>(
        self,
        name: impl Into<String>,
        get: impl Fn(&T) -> V + 'static,
        set: impl Fn(&mut T, V) + 'static,
    ) -> Self
    where
        V: crate::convert::IntoSlot + crate::convert::FromSlot + 'static,
    {
        self.variable(name, PropertyBinding::new(get, set))
    }

    /// Register a computed read-only property.
    pub fn property_readonly<V>(
        self,
        name: impl Into<String>,
        get: impl Fn(&T) -> V + 'static,
    ) -> Self
    where
        V: crate::convert::IntoSlot + crate::convert::FromSlot + 'static,
    {
        self.variable(name, PropertyBinding::readonly(get))
    }

    /// Register the constructor under the conventional name.
    pub fn constructor(self, ctor: Callable) -> Self {
        self.insert(CONSTRUCTOR, Member::Function(ctor))
    }

    /// Register a destructor hook, run before an owned or value instance is
    /// freed.
    pub fn destructor(self, dtor: Callable) -> Self {
        self.insert(MetaMethod::GarbageCollect.name(), Member::Function(dtor))
    }

    /// Make the type-level table callable as a constructor
    /// (`Point(...)` in addition to `Point.new(...)`).
    pub fn call_constructor(self, ctor: Callable) -> Self {
        self.insert(MetaMethod::Call.name(), Member::Function(ctor))
    }

    /// Register a catch-all handler for reads that miss every member and
    /// every base.
    pub fn index_fallback(self, handler: Callable) -> Self {
        self.insert(MetaMethod::Index.name(), Member::Function(handler))
    }

    /// Register a catch-all handler for writes that miss every member and
    /// every base.
    pub fn new_index_fallback(self, handler: Callable) -> Self {
        self.insert(MetaMethod::NewIndex.name(), Member::Function(handler))
    }

    /// Declare a base class registered under `base_name`. Declaration order
    /// is resolution order on a local miss. Declaring any base forces the
    /// dispatch path, since a flat field map cannot walk a chain.
    pub fn base<B: Any>(mut self, base_name: impl Into<String>) -> Self {
        self.state.bases.push(Box::new(BaseDescriptor::<B>::new(base_name)));
        self.state.flags |= RegistrationFlags::MUST_DISPATCH;
        self
    }

    /// Synthesize value equality from the host type's `PartialEq`.
    ///
    /// Without this, registration still installs an identity-based `__eq`.
    pub fn native_eq(self) -> Self
    where
        T: PartialEq,
    {
        let eq = Callable::from_fn(|machine: &mut Machine, frame| {
            let lhs = frame.this()?;
            let equal = match frame.arg_slot(1)? {
                Dynamic::Object(rhs) => {
                    let rhs = *rhs;
                    let lhs_cell = machine.heap().cell(lhs)?;
                    let rhs_cell = machine.heap().cell(rhs)?;
                    if Rc::ptr_eq(&lhs_cell, &rhs_cell) {
                        true
                    } else {
                        let lhs_guard = lhs_cell.try_borrow().map_err(|_| {
                            RuntimeError::BorrowConflict {
                                type_name: std::any::type_name::<T>(),
                            }
                        })?;
                        let rhs_guard = rhs_cell.try_borrow().map_err(|_| {
                            RuntimeError::BorrowConflict {
                                type_name: std::any::type_name::<T>(),
                            }
                        })?;
                        match (lhs_guard.downcast_ref::<T>(), rhs_guard.downcast_ref::<T>()) {
                            (Some(a), Some(b)) => a == b,
                            _ => false,
                        }
                    }
                }
                _ => false,
            };
            frame.push(Dynamic::Bool(equal));
            Ok(1)
        });
        self.insert(MetaMethod::EqualTo.name(), Member::Function(eq))
    }

    /// Synthesize ordering comparators from the host type's `PartialOrd`.
    ///
    /// Ordering against a non-object or a different host type is an error,
    /// unlike equality which degrades to `false`.
    pub fn native_ordering(self) -> Self
    where
        T: PartialOrd,
    {
        let lt = Self::ordering_callable(|ord| ord == std::cmp::Ordering::Less);
        let le = Self::ordering_callable(|ord| ord != std::cmp::Ordering::Greater);
        self.insert(MetaMethod::LessThan.name(), Member::Function(lt))
            .insert(MetaMethod::LessThanOrEqualTo.name(), Member::Function(le))
    }

    fn ordering_callable(accept: fn(std::cmp::Ordering) -> bool) -> Callable
    where
        T: PartialOrd,
    {
        Callable::from_fn(move |machine: &mut Machine, frame| {
            let lhs = frame.this()?;
            let &Dynamic::Object(rhs) = frame.arg_slot(1)? else {
                return Err(RuntimeError::ReceiverTypeMismatch {
                    expected: std::any::type_name::<T>(),
                });
            };
            let lhs_cell = machine.heap().cell(lhs)?;
            let rhs_cell = machine.heap().cell(rhs)?;
            let lhs_guard =
                lhs_cell
                    .try_borrow()
                    .map_err(|_| RuntimeError::BorrowConflict {
                        type_name: std::any::type_name::<T>(),
                    })?;
            let rhs_guard =
                rhs_cell
                    .try_borrow()
                    .map_err(|_| RuntimeError::BorrowConflict {
                        type_name: std::any::type_name::<T>(),
                    })?;
            let ordering = match (lhs_guard.downcast_ref::<T>(), rhs_guard.downcast_ref::<T>()) {
                (Some(a), Some(b)) => a.partial_cmp(b),
                _ => {
                    return Err(RuntimeError::ReceiverTypeMismatch {
                        expected: std::any::type_name::<T>(),
                    });
                }
            };
            frame.push(Dynamic::Bool(ordering.is_some_and(accept)));
            Ok(1)
        })
    }

    /// Validate the declaration and materialize it into `machine`.
    ///
    /// Returns the type-level shim table as a boundary value; the caller
    /// binds it under the type name in script scope.
    pub fn register(self, machine: &mut Machine) -> Result<Dynamic, RegistrationError> {
        let mut seen: Vec<TypeId> = Vec::with_capacity(self.state.bases.len());
        for base in &self.state.bases {
            if base.declared_type_id() == self.state.self_type {
                return Err(RegistrationError::SelfBase {
                    type_name: self.state.type_name.clone(),
                });
            }
            if seen.contains(&base.declared_type_id()) {
                return Err(RegistrationError::DuplicateBase {
                    type_name: self.state.type_name.clone(),
                    base: base.type_name().to_string(),
                });
            }
            seen.push(base.declared_type_id());
        }
        Ok(materialize::materialize(machine, self.state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, PartialEq, PartialOrd)]
    struct Point {
        x: i64,
        y: i64,
    }

    struct Animal;

    fn noop() -> Callable {
        Callable::from_fn(|_, _| Ok(0))
    }

    #[test]
    fn functions_land_in_function_map() {
        let builder = UsertypeBuilder::<Point>::without_constructor("Point")
            .function("speak", noop());
        assert!(builder.state.functions.contains_key("speak"));
        assert!(builder.state.flags.is_empty());
    }

    #[test]
    fn variables_displace_functions_and_force_dispatch() {
        let builder = UsertypeBuilder::<Point>::without_constructor("Point")
            .function("x", noop())
            .field("x", |p: &Point| p.x, |p, v| p.x = v);
        assert!(!builder.state.functions.contains_key("x"));
        assert!(builder.state.variables.contains_key("x"));
        assert!(builder.state.flags.contains(RegistrationFlags::MUST_DISPATCH));
        assert!(builder.state.flags.contains(RegistrationFlags::SECONDARY_META));
    }

    #[test]
    fn functions_displace_variables() {
        let builder = UsertypeBuilder::<Point>::without_constructor("Point")
            .field("x", |p: &Point| p.x, |p, v| p.x = v)
            .function("x", noop());
        assert!(builder.state.functions.contains_key("x"));
        assert!(!builder.state.variables.contains_key("x"));
    }

    #[test]
    fn reserved_names_route_to_slots() {
        let builder = UsertypeBuilder::<Point>::without_constructor("Point")
            .call_constructor(noop())
            .destructor(noop())
            .index_fallback(noop())
            .new_index_fallback(noop());
        assert!(builder.state.call_construct.is_some());
        assert!(builder.state.destructor.is_some());
        assert!(builder.state.index_fallback.is_some());
        assert!(builder.state.new_index_fallback.is_some());
        // The fallbacks stay visible as members; __call and __gc do not.
        assert!(builder.state.functions.contains_key("__index"));
        assert!(builder.state.functions.contains_key("__newindex"));
        assert!(!builder.state.functions.contains_key("__call"));
        assert!(!builder.state.functions.contains_key("__gc"));
        assert!(builder.state.flags.contains(RegistrationFlags::MUST_DISPATCH));
    }

    #[test]
    fn default_constructor_is_seeded() {
        let builder = UsertypeBuilder::<Point>::new("Point");
        assert!(builder.state.functions.contains_key(CONSTRUCTOR));
    }

    #[test]
    fn self_base_is_rejected() {
        let mut machine = Machine::new();
        let err = UsertypeBuilder::<Point>::without_constructor("Point")
            .base::<Point>("Point")
            .register(&mut machine)
            .unwrap_err();
        assert!(matches!(err, RegistrationError::SelfBase { .. }));
    }

    #[test]
    fn duplicate_base_is_rejected() {
        let mut machine = Machine::new();
        let err = UsertypeBuilder::<Point>::without_constructor("Point")
            .base::<Animal>("Animal")
            .base::<Animal>("Animal")
            .register(&mut machine)
            .unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateBase { .. }));
    }

    #[test]
    fn distinct_bases_are_accepted() {
        struct Shape;
        let mut machine = Machine::new();
        let registered = UsertypeBuilder::<Point>::without_constructor("Point")
            .base::<Animal>("Animal")
            .base::<Shape>("Shape")
            .register(&mut machine);
        assert!(registered.is_ok());
    }

    #[test]
    fn last_registration_wins() {
        let first = noop();
        let second = noop();
        let builder = UsertypeBuilder::<Point>::without_constructor("Point")
            .function("speak", first)
            .function("speak", second.clone());
        match builder.state.functions.get("speak") {
            Some(Dynamic::Callable(c)) => assert!(c.ptr_eq(&second)),
            other => panic!("unexpected entry: {other:?}"),
        }
    }
}
