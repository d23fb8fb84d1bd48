//! Type-erased callables and the per-call frame.
//!
//! [`Callable`] wraps any host function behind an `Arc`, so the same
//! underlying target can be referenced from every descriptor table that
//! names it without re-wrapping. Cloning a `Callable` shares the target;
//! it never duplicates it.
//!
//! [`CallFrame`] carries the arguments and results of one boundary call.
//! For member dispatch the convention follows the runtime's metamethod
//! calling convention: slot 0 is the receiver, slot 1 the key, and (for
//! writes) slot 2 the value being assigned.

use std::fmt;
use std::sync::Arc;

use crate::convert::FromSlot;
use crate::error::RuntimeError;
use crate::heap::ObjectHandle;
use crate::machine::Machine;
use crate::value::Dynamic;

/// Trait for host functions callable from script code.
pub trait HostCallable {
    /// Invoke the function. Returns the number of results pushed onto the
    /// frame, or raises through the runtime error channel.
    fn call(&self, machine: &mut Machine, frame: &mut CallFrame) -> Result<usize, RuntimeError>;
}

impl<F> HostCallable for F
where
    F: Fn(&mut Machine, &mut CallFrame) -> Result<usize, RuntimeError>,
{
    fn call(&self, machine: &mut Machine, frame: &mut CallFrame) -> Result<usize, RuntimeError> {
        (self)(machine, frame)
    }
}

/// A type-erased, shareable reference to a host function.
pub struct Callable {
    inner: Arc<dyn HostCallable>,
}

impl Callable {
    /// Wrap a closure or function as a callable.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&mut Machine, &mut CallFrame) -> Result<usize, RuntimeError> + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// Invoke this callable with the given frame.
    pub fn call(&self, machine: &mut Machine, frame: &mut CallFrame) -> Result<usize, RuntimeError> {
        self.inner.call(machine, frame)
    }

    /// Check whether two callables share the same underlying target.
    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Clone for Callable {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable").finish_non_exhaustive()
    }
}

/// Arguments and results of one boundary call.
#[derive(Debug, Default)]
pub struct CallFrame {
    /// Incoming arguments. For metamethod dispatch, slot 0 is the receiver.
    pub args: Vec<Dynamic>,
    /// Values produced by the call, in push order.
    pub results: Vec<Dynamic>,
}

impl CallFrame {
    /// Create a frame carrying the given arguments.
    pub fn new(args: Vec<Dynamic>) -> Self {
        Self {
            args,
            results: Vec::new(),
        }
    }

    /// Number of incoming arguments.
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Get a raw reference to an argument slot.
    pub fn arg_slot(&self, index: usize) -> Result<&Dynamic, RuntimeError> {
        self.args
            .get(index)
            .ok_or(RuntimeError::ArgumentIndexOutOfBounds {
                index,
                count: self.args.len(),
            })
    }

    /// Extract a typed argument.
    pub fn arg<T: FromSlot>(&self, index: usize) -> Result<T, RuntimeError> {
        Ok(T::from_slot(self.arg_slot(index)?)?)
    }

    /// The receiver of a member access (argument slot 0), which must be a
    /// host object.
    pub fn this(&self) -> Result<ObjectHandle, RuntimeError> {
        match self.arg_slot(0)? {
            Dynamic::Object(h) => Ok(*h),
            other => Err(RuntimeError::InvalidReceiver {
                type_name: other.type_name(),
            }),
        }
    }

    /// Push one result value.
    pub fn push(&mut self, value: Dynamic) {
        self.results.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_arg_extraction() {
        let frame = CallFrame::new(vec![Dynamic::Int(7), Dynamic::Str("k".into())]);
        assert_eq!(frame.arg_count(), 2);
        assert_eq!(frame.arg::<i64>(0).unwrap(), 7);
        assert_eq!(frame.arg::<String>(1).unwrap(), "k");
    }

    #[test]
    fn frame_arg_out_of_bounds() {
        let frame = CallFrame::new(vec![]);
        assert!(matches!(
            frame.arg_slot(0),
            Err(RuntimeError::ArgumentIndexOutOfBounds { index: 0, count: 0 })
        ));
    }

    #[test]
    fn frame_this_requires_object() {
        let frame = CallFrame::new(vec![Dynamic::Int(1)]);
        assert!(matches!(
            frame.this(),
            Err(RuntimeError::InvalidReceiver { type_name: "int" })
        ));
    }

    #[test]
    fn callable_clone_shares_target() {
        let c = Callable::from_fn(|_, frame| {
            frame.push(Dynamic::Int(1));
            Ok(1)
        });
        let d = c.clone();
        assert!(c.ptr_eq(&d));
        let e = Callable::from_fn(|_, _| Ok(0));
        assert!(!c.ptr_eq(&e));
    }

    #[test]
    fn callable_invocation() {
        let mut machine = Machine::new();
        let c = Callable::from_fn(|_, frame| {
            let a: i64 = frame.arg(0)?;
            frame.push(Dynamic::Int(a * 2));
            Ok(1)
        });
        let mut frame = CallFrame::new(vec![Dynamic::Int(21)]);
        let n = c.call(&mut machine, &mut frame).unwrap();
        assert_eq!(n, 1);
        assert_eq!(frame.results, vec![Dynamic::Int(42)]);
    }
}
