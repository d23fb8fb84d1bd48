//! Variable accessors.
//!
//! A [`VarAccessor`] wraps the get/set pair for one exposed field or
//! computed property. Accessors live in the member table's variables map and
//! are consulted before same-named functions, because a get/set pair carries
//! read/write semantics a flat function entry cannot express.
//!
//! The dispatch calling convention applies: frame slot 0 is the receiver,
//! slot 1 the key, slot 2 (writes only) the assigned value.

use std::any::Any;

use crate::callable::CallFrame;
use crate::convert::{FromSlot, IntoSlot};
use crate::error::RuntimeError;
use crate::machine::Machine;

/// Polymorphic get/set pair for one exposed member.
pub trait VarAccessor {
    /// Produce the member's value onto the frame. Returns the result count.
    fn read(&self, machine: &mut Machine, frame: &mut CallFrame) -> Result<usize, RuntimeError>;

    /// Consume the assigned value from the frame. Returns the result count
    /// (zero on success).
    fn write(&self, machine: &mut Machine, frame: &mut CallFrame) -> Result<usize, RuntimeError>;

    /// Whether a setter was registered.
    fn is_writable(&self) -> bool;
}

/// Direct field pass-through accessor, built from plain function pointers.
pub struct FieldBinding<T, V> {
    get: fn(&T) -> V,
    set: Option<fn(&mut T, V)>,
}

impl<T, V> FieldBinding<T, V> {
    /// Read-only field binding.
    pub fn readonly(get: fn(&T) -> V) -> Self {
        Self { get, set: None }
    }

    /// Read/write field binding.
    pub fn new(get: fn(&T) -> V, set: fn(&mut T, V)) -> Self {
        Self {
            get,
            set: Some(set),
        }
    }
}

impl<T, V> VarAccessor for FieldBinding<T, V>
where
    T: Any,
    V: IntoSlot + FromSlot,
{
    fn read(&self, machine: &mut Machine, frame: &mut CallFrame) -> Result<usize, RuntimeError> {
        let this = frame.this()?;
        let value = machine.heap().with_ref::<T, V>(this, self.get)?;
        frame.push(value.into_slot());
        Ok(1)
    }

    fn write(&self, machine: &mut Machine, frame: &mut CallFrame) -> Result<usize, RuntimeError> {
        let Some(set) = self.set else {
            return Err(RuntimeError::other("write through read-only accessor"));
        };
        let this = frame.this()?;
        let value: V = frame.arg(2)?;
        machine.heap().with_mut::<T, ()>(this, |t| set(t, value))?;
        Ok(0)
    }

    fn is_writable(&self) -> bool {
        self.set.is_some()
    }
}

/// Computed property accessor backed by closures.
pub struct PropertyBinding<T, V> {
    get: Box<dyn Fn(&T) -> V>,
    set: Option<Box<dyn Fn(&mut T, V)>>,
}

impl<T, V> PropertyBinding<T, V> {
    /// Read-only computed property.
    pub fn readonly(get: impl Fn(&T) -> V + 'static) -> Self {
        Self {
            get: Box::new(get),
            set: None,
        }
    }

    /// Read/write computed property.
    pub fn new(get: impl Fn(&T) -> V + 'static, set: impl Fn(&mut T, V) + 'static) -> Self {
        Self {
            get: Box::new(get),
            set: Some(Box::new(set)),
        }
    }
}

impl<T, V> VarAccessor for PropertyBinding<T, V>
where
    T: Any,
    V: IntoSlot + FromSlot,
{
    fn read(&self, machine: &mut Machine, frame: &mut CallFrame) -> Result<usize, RuntimeError> {
        let this = frame.this()?;
        let value = machine.heap().with_ref::<T, V>(this, |t| (self.get)(t))?;
        frame.push(value.into_slot());
        Ok(1)
    }

    fn write(&self, machine: &mut Machine, frame: &mut CallFrame) -> Result<usize, RuntimeError> {
        let Some(set) = &self.set else {
            return Err(RuntimeError::other("write through read-only accessor"));
        };
        let this = frame.this()?;
        let value: V = frame.arg(2)?;
        machine.heap().with_mut::<T, ()>(this, |t| set(t, value))?;
        Ok(0)
    }

    fn is_writable(&self) -> bool {
        self.set.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Ownership;
    use crate::table::Table;
    use crate::value::Dynamic;

    struct Point {
        x: i64,
        y: i64,
    }

    fn machine_with_point() -> (Machine, crate::heap::ObjectHandle) {
        let mut machine = Machine::new();
        let meta = machine.tables_mut().insert(Table::new());
        let handle = machine
            .heap_mut()
            .allocate(Point { x: 3, y: 4 }, Ownership::Value, meta);
        (machine, handle)
    }

    #[test]
    fn field_binding_reads() {
        let (mut machine, handle) = machine_with_point();
        let accessor = FieldBinding::<Point, i64>::new(|p| p.x, |p, v| p.x = v);

        let mut frame = CallFrame::new(vec![Dynamic::Object(handle), Dynamic::Str("x".into())]);
        let n = accessor.read(&mut machine, &mut frame).unwrap();
        assert_eq!(n, 1);
        assert_eq!(frame.results, vec![Dynamic::Int(3)]);
    }

    #[test]
    fn field_binding_write_round_trip() {
        let (mut machine, handle) = machine_with_point();
        let accessor = FieldBinding::<Point, i64>::new(|p| p.y, |p, v| p.y = v);

        let mut frame = CallFrame::new(vec![
            Dynamic::Object(handle),
            Dynamic::Str("y".into()),
            Dynamic::Int(99),
        ]);
        accessor.write(&mut machine, &mut frame).unwrap();

        let mut read_frame =
            CallFrame::new(vec![Dynamic::Object(handle), Dynamic::Str("y".into())]);
        accessor.read(&mut machine, &mut read_frame).unwrap();
        assert_eq!(read_frame.results, vec![Dynamic::Int(99)]);
    }

    #[test]
    fn readonly_field_reports_not_writable() {
        let accessor = FieldBinding::<Point, i64>::readonly(|p| p.x);
        assert!(!accessor.is_writable());
    }

    #[test]
    fn property_binding_computes() {
        let (mut machine, handle) = machine_with_point();
        let accessor = PropertyBinding::<Point, i64>::readonly(|p| p.x * p.x + p.y * p.y);

        let mut frame = CallFrame::new(vec![
            Dynamic::Object(handle),
            Dynamic::Str("norm2".into()),
        ]);
        accessor.read(&mut machine, &mut frame).unwrap();
        assert_eq!(frame.results, vec![Dynamic::Int(25)]);
    }

    #[test]
    fn write_rejects_bad_value_type() {
        let (mut machine, handle) = machine_with_point();
        let accessor = FieldBinding::<Point, i64>::new(|p| p.x, |p, v| p.x = v);

        let mut frame = CallFrame::new(vec![
            Dynamic::Object(handle),
            Dynamic::Str("x".into()),
            Dynamic::Str("not a number".into()),
        ]);
        assert!(matches!(
            accessor.write(&mut machine, &mut frame),
            Err(RuntimeError::Conversion(_))
        ));
    }
}
