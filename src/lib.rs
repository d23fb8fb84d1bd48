//! Runtime member resolution and dispatch for statically-typed host objects
//! exposed to a dynamically-typed embedded scripting runtime.
//!
//! A host registers a Rust type once through [`UsertypeBuilder`], naming its
//! functions, variables, bases, and fallbacks. Registration materializes a
//! shared per-type member table plus a family of descriptor tables — one per
//! ownership representation, each with its secondary metatable, and the
//! type-level shim — into a [`Machine`]. After that, every scripted member
//! access resolves through one dispatch path: variables shadow functions,
//! bases are walked in declaration order, and a custom fallback catches what
//! nothing else does.
//!
//! Types whose members are all plain functions and constants skip dispatch
//! entirely: their descriptor tables answer lookups from a flat field map.
//!
//! ```
//! use hostbind::{Dynamic, Machine, UsertypeBuilder};
//!
//! #[derive(Default)]
//! struct Point { x: i64, y: i64 }
//!
//! let mut machine = Machine::new();
//! UsertypeBuilder::<Point>::new("Point")
//!     .field("x", |p: &Point| p.x, |p, v| p.x = v)
//!     .field("y", |p: &Point| p.y, |p, v| p.y = v)
//!     .register(&mut machine)
//!     .unwrap();
//!
//! let shim = machine.shim_of("Point").unwrap();
//! let ctor = machine
//!     .index(Dynamic::Table(shim), Dynamic::Str("new".into()))
//!     .unwrap();
//! let point = machine.call(ctor, vec![]).unwrap().remove(0);
//!
//! machine
//!     .new_index(point.clone(), Dynamic::Str("x".into()), Dynamic::Int(3))
//!     .unwrap();
//! let x = machine
//!     .index(point, Dynamic::Str("x".into()))
//!     .unwrap();
//! assert_eq!(x, Dynamic::Int(3));
//! ```

pub mod accessor;
pub mod bases;
pub mod builder;
pub mod callable;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod heap;
pub mod machine;
pub mod member_table;
pub mod meta;
pub mod table;
pub mod type_key;
pub mod value;

mod materialize;

pub use accessor::{FieldBinding, PropertyBinding, VarAccessor};
pub use bases::{BaseChain, BaseClass, BaseDescriptor};
pub use builder::{Member, RegistrationFlags, UsertypeBuilder};
pub use callable::{CallFrame, Callable, HostCallable};
pub use convert::{FromSlot, IntoSlot};
pub use dispatch::{Dispatcher, Resolution};
pub use error::{ConversionError, RegistrationError, RuntimeError};
pub use heap::{ObjectHandle, ObjectHeap, Ownership};
pub use machine::Machine;
pub use member_table::{MemberTable, MemberTableArena, MemberTableHandle};
pub use meta::MetaMethod;
pub use table::{IndexStrategy, Table, TableArena, TableHandle};
pub use type_key::{TypeKey, Variant};
pub use value::{Dynamic, InstanceCell};
