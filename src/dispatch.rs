//! Index / new-index dispatch.
//!
//! A [`Dispatcher`] is what a descriptor table binds as its metamethod pair
//! when flat lookup cannot express the type's semantics: it holds a handle
//! to the shared member table and a flag marking whether it serves the
//! type-level shim. Every `obj.member` read and `obj.member = value` write
//! on a dispatch-strategy table lands in [`Dispatcher::index`] /
//! [`Dispatcher::new_index`].
//!
//! Resolution order, first match wins:
//!
//! 1. non-string keys skip member lookup entirely and go to the fallback
//!    tail
//! 2. variable accessors (always shadow same-named functions)
//! 3. function entries (immutable from the script side; see the write quirk
//!    below)
//! 4. base-class propagation, declaration order, first hit short-circuits
//! 5. the custom catch-all handler, if registered
//! 6. failure through the runtime error channel
//!
//! Write quirk: a write to an existing function name consults the custom
//! new-index fallback only when the access did not originate at the top
//! level; a top-level write to a function name is always a rejection.

use std::sync::Arc;

use crate::callable::{CallFrame, Callable};
use crate::error::RuntimeError;
use crate::machine::Machine;
use crate::member_table::{MemberTable, MemberTableHandle};
use crate::value::Dynamic;

/// Outcome of one resolution attempt against a member table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A binding answered the access, producing this many results.
    Hit(usize),
    /// Not found here; the caller may try elsewhere.
    Miss,
}

/// Entry points for one type's member dispatch, bound to its shared member
/// table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dispatcher {
    /// The shared member table consulted on every access.
    pub map: MemberTableHandle,
    /// True when this dispatcher serves the type-level shim rather than
    /// instances.
    pub top_level: bool,
}

impl Dispatcher {
    /// Handle a property read. Frame slots: receiver, key.
    pub fn index(&self, machine: &mut Machine, frame: &mut CallFrame) -> Result<usize, RuntimeError> {
        self.entry(machine, frame, true)
    }

    /// Handle a property write. Frame slots: receiver, key, value.
    pub fn new_index(
        &self,
        machine: &mut Machine,
        frame: &mut CallFrame,
    ) -> Result<usize, RuntimeError> {
        self.entry(machine, frame, false)
    }

    fn entry(
        &self,
        machine: &mut Machine,
        frame: &mut CallFrame,
        is_index: bool,
    ) -> Result<usize, RuntimeError> {
        let map = machine.member_table(self.map)?;
        let key = frame.arg_slot(1)?.clone();

        if let Dynamic::Str(name) = &key {
            let name = name.clone();
            if let Resolution::Hit(count) =
                lookup(machine, &map, frame, &name, is_index, self.top_level)?
            {
                return Ok(count);
            }
        }

        let fallback = if is_index {
            map.index_fallback.clone()
        } else {
            map.new_index_fallback.clone()
        };
        if let Some(handler) = fallback {
            return forward(machine, frame, handler);
        }

        Err(if is_index {
            RuntimeError::IndexingFailure {
                type_name: map.type_name.clone(),
                key: key.describe(),
            }
        } else {
            RuntimeError::WriteRejected {
                type_name: map.type_name.clone(),
                member: key.describe(),
            }
        })
    }
}

/// Resolve a string key against one member table: variables, then
/// functions, then declared bases. Never consults the catch-all fallback;
/// that belongs to the entry-point tail.
pub(crate) fn lookup(
    machine: &mut Machine,
    map: &Arc<MemberTable>,
    frame: &mut CallFrame,
    name: &str,
    is_index: bool,
    top_level_origin: bool,
) -> Result<Resolution, RuntimeError> {
    if let Some(accessor) = map.variables.get(name) {
        if is_index {
            return accessor.read(machine, frame).map(Resolution::Hit);
        }
        if !accessor.is_writable() {
            return Err(RuntimeError::WriteRejected {
                type_name: map.type_name.clone(),
                member: name.to_string(),
            });
        }
        return accessor.write(machine, frame).map(Resolution::Hit);
    }

    if let Some(value) = map.functions.get(name) {
        if is_index {
            frame.push(value.clone());
            return Ok(Resolution::Hit(1));
        }
        if let Some(handler) = &map.new_index_fallback
            && !top_level_origin
        {
            return forward(machine, frame, handler.clone()).map(Resolution::Hit);
        }
        return Err(RuntimeError::WriteRejected {
            type_name: map.type_name.clone(),
            member: name.to_string(),
        });
    }

    if !map.bases.is_empty() {
        let resolved = if is_index {
            map.bases.walk_index(machine, frame, name)?
        } else {
            map.bases.walk_new_index(machine, frame, name)?
        };
        if let Resolution::Hit(count) = resolved {
            return Ok(Resolution::Hit(count));
        }
    }

    Ok(Resolution::Miss)
}

/// Delegate an access to a user-supplied handler: forward the original call
/// arguments unchanged and pass its results through unmodified.
pub(crate) fn forward(
    machine: &mut Machine,
    frame: &mut CallFrame,
    handler: Callable,
) -> Result<usize, RuntimeError> {
    let results = machine.call_callable(handler, frame.args.clone())?;
    let count = results.len();
    frame.results.extend(results);
    Ok(count)
}
