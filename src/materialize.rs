//! Table materialization.
//!
//! Turns a validated registration into the runtime structures a machine
//! dispatches against: one shared member table, one descriptor table per
//! ownership variant (each with its secondary metatable), and the type-level
//! shim. All of them register under deterministic keys derived from the type
//! name, so re-registering a name overwrites its slots in place.
//!
//! Per-variant differences are confined to the `__gc` entry: the reference
//! variant omits it entirely so collection never destroys an instance the
//! host still owns, while the owned and value variants carry the registered
//! destructor hook (or a no-op stand-in).

use std::rc::Rc;
use std::sync::Arc;

use crate::bases::BaseChain;
use crate::builder::{RegistrationFlags, RegistrationState};
use crate::callable::Callable;
use crate::dispatch::Dispatcher;
use crate::machine::Machine;
use crate::member_table::MemberTable;
use crate::meta::MetaMethod;
use crate::table::{IndexStrategy, Table};
use crate::type_key::{TypeKey, Variant};
use crate::value::Dynamic;

/// Install a registration into the machine. Returns the type-level shim as
/// a boundary value.
pub(crate) fn materialize(machine: &mut Machine, state: RegistrationState) -> Dynamic {
    let mut chain = BaseChain::new();
    for base in state.bases {
        chain.push(base);
    }
    let chain = Arc::new(chain);

    let member_table = MemberTable {
        type_name: state.type_name.clone(),
        functions: state.functions.clone(),
        variables: state.variables,
        index_fallback: state.index_fallback,
        new_index_fallback: state.new_index_fallback,
        bases: Arc::clone(&chain),
    };
    let map = machine.member_tables_mut().insert(member_table);
    machine.register_member_table(TypeKey::from_name(&state.type_name), map);

    let strategy = if state.flags.contains(RegistrationFlags::MUST_DISPATCH) {
        IndexStrategy::Dispatch(Dispatcher {
            map,
            top_level: false,
        })
    } else {
        IndexStrategy::SelfTable
    };

    for variant in Variant::ALL {
        let mut table = Table::new();
        table.fields = state.functions.clone();
        match variant {
            Variant::Reference => {
                table.fields.remove(MetaMethod::GarbageCollect.name());
            }
            Variant::Owned | Variant::Value => {
                let hook = state
                    .destructor
                    .clone()
                    .unwrap_or_else(|| Callable::from_fn(|_, _| Ok(0)));
                table
                    .fields
                    .insert(MetaMethod::GarbageCollect.name().to_string(), Dynamic::Callable(hook));
            }
        }

        let eq = state.eq.clone().unwrap_or_else(identity_eq);
        table
            .fields
            .insert(MetaMethod::EqualTo.name().to_string(), Dynamic::Callable(eq));
        if let Some(lt) = state.lt.clone() {
            table
                .fields
                .insert(MetaMethod::LessThan.name().to_string(), Dynamic::Callable(lt));
        }
        if let Some(le) = state.le.clone() {
            table.fields.insert(
                MetaMethod::LessThanOrEqualTo.name().to_string(),
                Dynamic::Callable(le),
            );
        }

        table.index = strategy;
        table.map = Some(map);
        if !chain.is_empty() {
            table.base_ops = Some(Arc::clone(&chain));
        }

        let mut secondary = Table::new();
        if let Some(ctor) = state.call_construct.clone() {
            secondary
                .fields
                .insert(MetaMethod::Call.name().to_string(), Dynamic::Callable(ctor));
        }
        if state.flags.contains(RegistrationFlags::SECONDARY_META) {
            secondary.index = IndexStrategy::Dispatch(Dispatcher {
                map,
                top_level: false,
            });
            secondary.map = Some(map);
        }
        table.meta = Some(machine.tables_mut().insert(secondary));

        let handle = machine.tables_mut().insert(table);
        machine.register_table(TypeKey::metatable(&state.type_name, variant), handle);
    }

    let mut shim = Table::new();
    shim.fields = state.functions.clone();
    shim.fields.remove(MetaMethod::GarbageCollect.name());
    shim.map = Some(map);

    let mut shim_meta = Table::new();
    shim_meta.index = IndexStrategy::Dispatch(Dispatcher {
        map,
        top_level: true,
    });
    shim_meta.map = Some(map);
    if let Some(ctor) = state.call_construct {
        shim_meta
            .fields
            .insert(MetaMethod::Call.name().to_string(), Dynamic::Callable(ctor));
    }
    shim.meta = Some(machine.tables_mut().insert(shim_meta));

    let shim_handle = machine.tables_mut().insert(shim);
    machine.register_table(TypeKey::shim(&state.type_name), shim_handle);
    Dynamic::Table(shim_handle)
}

/// Default `__eq`: true only when both operands name the same instance.
fn identity_eq() -> Callable {
    Callable::from_fn(|machine, frame| {
        let lhs = frame.this()?;
        let equal = match frame.arg_slot(1)? {
            Dynamic::Object(rhs) => {
                let rhs = *rhs;
                if lhs == rhs {
                    true
                } else {
                    match (machine.heap().cell(lhs), machine.heap().cell(rhs)) {
                        (Ok(a), Ok(b)) => Rc::ptr_eq(&a, &b),
                        _ => false,
                    }
                }
            }
            _ => false,
        };
        frame.push(Dynamic::Bool(equal));
        Ok(1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::UsertypeBuilder;

    #[derive(Default)]
    struct Point {
        x: i64,
    }

    fn noop() -> Callable {
        Callable::from_fn(|_, _| Ok(0))
    }

    #[test]
    fn registers_all_table_slots() {
        let mut machine = Machine::new();
        let shim = UsertypeBuilder::<Point>::new("Point")
            .register(&mut machine)
            .unwrap();
        assert!(matches!(shim, Dynamic::Table(_)));

        for variant in Variant::ALL {
            assert!(machine
                .registry_get(TypeKey::metatable("Point", variant))
                .is_some());
        }
        assert!(machine.registry_get(TypeKey::shim("Point")).is_some());
        assert!(machine
            .member_table_by_key(TypeKey::from_name("Point"))
            .is_some());
    }

    #[test]
    fn plain_type_keeps_flat_strategy() {
        let mut machine = Machine::new();
        UsertypeBuilder::<Point>::new("Point")
            .function("speak", noop())
            .register(&mut machine)
            .unwrap();

        let handle = machine
            .registry_get(TypeKey::metatable("Point", Variant::Value))
            .unwrap();
        let table = machine.tables().get(handle).unwrap();
        assert_eq!(table.index, IndexStrategy::SelfTable);
        assert!(table.fields.contains_key("speak"));
    }

    #[test]
    fn variables_force_dispatch_strategy() {
        let mut machine = Machine::new();
        UsertypeBuilder::<Point>::new("Point")
            .field("x", |p: &Point| p.x, |p, v| p.x = v)
            .register(&mut machine)
            .unwrap();

        let handle = machine
            .registry_get(TypeKey::metatable("Point", Variant::Value))
            .unwrap();
        let table = machine.tables().get(handle).unwrap();
        assert!(matches!(table.index, IndexStrategy::Dispatch(_)));
    }

    #[test]
    fn reference_variant_omits_destructor_hook() {
        let mut machine = Machine::new();
        UsertypeBuilder::<Point>::new("Point")
            .destructor(noop())
            .register(&mut machine)
            .unwrap();

        let reference = machine
            .registry_get(TypeKey::metatable("Point", Variant::Reference))
            .unwrap();
        let owned = machine
            .registry_get(TypeKey::metatable("Point", Variant::Owned))
            .unwrap();
        assert!(!machine
            .tables()
            .get(reference)
            .unwrap()
            .fields
            .contains_key("__gc"));
        assert!(machine
            .tables()
            .get(owned)
            .unwrap()
            .fields
            .contains_key("__gc"));
    }

    #[test]
    fn every_variant_gets_equality() {
        let mut machine = Machine::new();
        UsertypeBuilder::<Point>::new("Point")
            .register(&mut machine)
            .unwrap();

        for variant in Variant::ALL {
            let handle = machine
                .registry_get(TypeKey::metatable("Point", variant))
                .unwrap();
            assert!(machine.tables().get(handle).unwrap().fields.contains_key("__eq"));
        }
    }

    #[test]
    fn re_registration_overwrites_slots() {
        let mut machine = Machine::new();
        UsertypeBuilder::<Point>::new("Point")
            .register(&mut machine)
            .unwrap();
        let first = machine
            .registry_get(TypeKey::metatable("Point", Variant::Value))
            .unwrap();

        UsertypeBuilder::<Point>::new("Point")
            .function("speak", noop())
            .register(&mut machine)
            .unwrap();
        let second = machine
            .registry_get(TypeKey::metatable("Point", Variant::Value))
            .unwrap();

        assert_ne!(first, second);
        assert!(machine
            .tables()
            .get(second)
            .unwrap()
            .fields
            .contains_key("speak"));
    }
}
